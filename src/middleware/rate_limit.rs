use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

#[derive(Debug)]
struct Bucket {
    opened: Instant,
    served: u32,
}

/// Fixed one-second window shared by every caller of a router.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    per_second: u32,
    bucket: Arc<Mutex<Bucket>>,
}

impl RateLimiter {
    pub fn per_second(limit: u32) -> Self {
        Self {
            per_second: limit.max(1),
            bucket: Arc::new(Mutex::new(Bucket {
                opened: Instant::now(),
                served: 0,
            })),
        }
    }

    fn try_acquire(&self, now: Instant) -> bool {
        let mut bucket = self
            .bucket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if now.duration_since(bucket.opened) >= Duration::from_secs(1) {
            bucket.opened = now;
            bucket.served = 0;
        }
        if bucket.served >= self.per_second {
            return false;
        }
        bucket.served += 1;
        true
    }
}

pub async fn rps_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !limiter.try_acquire(Instant::now()) {
        tracing::debug!(path = %req.uri().path(), "Request rate limited");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, "1")],
            Json(json!({"error": "rate_limited", "message": "Too many requests"})),
        )
            .into_response();
    }
    next.run(req).await
}
