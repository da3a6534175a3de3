//! # Relay Shared
//!
//! Wire types shared between the relay server and its clients.

pub mod dto;
pub mod response;

pub use response::ErrorResponse;
