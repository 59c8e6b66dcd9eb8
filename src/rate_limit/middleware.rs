use super::engine::RateLimiter;
use super::types::{Decision, Outcome, RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET};
use crate::error::Result;
use crate::store::epoch_millis;
use axum::{
    extract::{Request, State},
    http::{header::RETRY_AFTER, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

const SECOND_MS: u64 = 1000;
const MINUTE_MS: u64 = SECOND_MS * 60;
const HOUR_MS: u64 = MINUTE_MS * 60;
const DAY_MS: u64 = HOUR_MS * 24;

/// Axum middleware function for rate limiting
///
/// Install with `axum::middleware::from_fn_with_state(limiter, rate_limit_middleware)`.
/// Denied requests never reach the inner service. Store failures surface as
/// the error's own response.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let (parts, body) = request.into_parts();
    let outcome = limiter.check(&parts).await?;
    let request = Request::from_parts(parts, body);

    let decision = match outcome {
        Outcome::Bypass => return Ok(next.run(request).await),
        Outcome::Limited(decision) => decision,
    };

    if decision.allowed {
        let mut response = next.run(request).await;
        add_rate_limit_headers(response.headers_mut(), &decision);
        return Ok(response);
    }

    Ok(create_rate_limit_response(&decision, epoch_millis()))
}

/// Add the `X-RateLimit-*` headers for a decision
pub fn add_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.total));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(decision.reset_epoch_secs));
}

/// Create a 429 Too Many Requests response with rate limit headers
fn create_rate_limit_response(decision: &Decision, now_ms: u64) -> Response {
    let mut headers = HeaderMap::new();
    add_rate_limit_headers(&mut headers, decision);
    headers.insert(
        RETRY_AFTER,
        HeaderValue::from(decision.retry_after_secs(now_ms)),
    );

    let body = format!(
        "Rate limit exceeded, retry in {}",
        format_duration_long(decision.millis_until_reset(now_ms))
    );

    (StatusCode::TOO_MANY_REQUESTS, headers, body).into_response()
}

/// Render milliseconds in the largest whole unit, e.g. "2 minutes" or "500 ms"
pub fn format_duration_long(ms: u64) -> String {
    for (unit, name) in [
        (DAY_MS, "day"),
        (HOUR_MS, "hour"),
        (MINUTE_MS, "minute"),
        (SECOND_MS, "second"),
    ] {
        if ms >= unit {
            // Rounded to the nearest unit; plural from 1.5 units up
            let count = ms.saturating_add(unit / 2) / unit;
            let suffix = if ms.saturating_mul(2) >= unit * 3 { "s" } else { "" };
            return format!("{} {}{}", count, name, suffix);
        }
    }

    format!("{} ms", ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_long() {
        assert_eq!(format_duration_long(0), "0 ms");
        assert_eq!(format_duration_long(500), "500 ms");
        assert_eq!(format_duration_long(1000), "1 second");
        assert_eq!(format_duration_long(1499), "1 second");
        assert_eq!(format_duration_long(1500), "2 seconds");
        assert_eq!(format_duration_long(2000), "2 seconds");
        assert!(format_duration_long(u64::MAX).ends_with(" days"));
        assert_eq!(format_duration_long(60_000), "1 minute");
        assert_eq!(format_duration_long(120_000), "2 minutes");
        assert_eq!(format_duration_long(3_600_000), "1 hour");
        assert_eq!(format_duration_long(2 * DAY_MS), "2 days");
    }

    #[test]
    fn test_rate_limit_response() {
        let decision = Decision {
            allowed: false,
            total: 100,
            remaining: 0,
            reset_epoch_secs: 1_000,
        };
        let response = create_rate_limit_response(&decision, 970_000);

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let headers = response.headers();
        assert_eq!(headers.get("X-RateLimit-Limit").unwrap(), "100");
        assert_eq!(headers.get("X-RateLimit-Remaining").unwrap(), "0");
        assert_eq!(headers.get("X-RateLimit-Reset").unwrap(), "1000");
        assert_eq!(headers.get("Retry-After").unwrap(), "30");
    }

    #[test]
    fn test_rate_limit_response_after_reset_passed() {
        let decision = Decision {
            allowed: false,
            total: 1,
            remaining: 0,
            reset_epoch_secs: 1_000,
        };
        let response = create_rate_limit_response(&decision, 1_005_000);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "0");
    }

    #[tokio::test]
    async fn test_rate_limit_response_body() {
        let decision = Decision {
            allowed: false,
            total: 1,
            remaining: 0,
            reset_epoch_secs: 1_000,
        };
        let response = create_rate_limit_response(&decision, 880_000);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(body.to_vec()).unwrap(),
            "Rate limit exceeded, retry in 2 minutes"
        );
    }
}
