//! Relay admission handler.

use actix_web::{HttpRequest, HttpResponse, web};

use relay_core::domain::{RateLimiterKey, Tier};
use relay_core::ports::RateLimitOutcome;
use relay_infra::abuse::{AbuseCheck, AbuseDecision};
use relay_shared::dto::{AdmissionResponse, RelayRequest};

use crate::middleware::error::{AppError, AppResult};
use crate::state::AppState;

/// POST /api/relay
///
/// Rate limiter first, then the abuse gate. Only admitted requests reach the relayer.
pub async fn relay(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<RelayRequest>,
) -> AppResult<HttpResponse> {
    let body = body.into_inner();
    let tier = body.tier;

    let client_ip = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();

    let key = RateLimiterKey::new(body.operation.clone(), tier, body.signer);
    let (remaining, reset_after) = match state.rate_limiter.consume(&key).await? {
        RateLimitOutcome::Admitted {
            remaining,
            reset_after,
        } => (remaining, reset_after),
        blocked @ RateLimitOutcome::Blocked { .. } => {
            tracing::warn!(key = %key, "Rate limit exceeded");
            return Err(AppError::RateLimited {
                retry_after: blocked.retry_after(),
            });
        }
    };

    let check = AbuseCheck {
        user_handle: body.user_handle,
        client_ip,
        signer_is_app: tier == Tier::App,
        create_or_deactivate: body.create_or_deactivate,
    };
    if state.abuse_gate.decide(&check).await? == AbuseDecision::Denied {
        return Err(AppError::AbuseBlocked);
    }

    Ok(HttpResponse::Accepted()
        .insert_header(("X-RateLimit-Remaining", remaining.to_string()))
        .json(AdmissionResponse {
            operation: body.operation,
            remaining_points: remaining,
            resets_in_secs: reset_after.as_secs(),
        }))
}
