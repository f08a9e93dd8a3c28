//! Liveness endpoint.

use axum::Json;
use serde::Serialize;

/// Body of `GET /health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Health {
    /// Always `"ok"` while the process serves requests
    pub status: &'static str,
}

/// `GET /health`: the process is up. Dependencies are not checked.
#[allow(clippy::unused_async)]
pub async fn health_check() -> Json<Health> {
    Json(Health { status: "ok" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_ok() {
        let Json(health) = health_check().await;
        assert_eq!(health, Health { status: "ok" });
    }
}
