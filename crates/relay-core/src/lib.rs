//! # Relay Core
//!
//! The domain layer of the relay admission subsystem.
//! This crate holds quota, key and abuse-verdict logic plus the ports the
//! infrastructure crate implements. It has zero infrastructure dependencies.

pub mod domain;
pub mod error;
pub mod ports;

pub use error::{AdmissionError, KeyParseError, QuotaError};
