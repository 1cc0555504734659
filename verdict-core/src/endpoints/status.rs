use axum::debug_handler;
use axum::response::Json;
use serde::{Deserialize, Serialize};

/// A handler for a simple liveness check; performs no side effects.
#[debug_handler]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
    })
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "OK");
        assert_eq!(
            serde_json::to_value(&response.0).unwrap(),
            json!({"status": "OK"})
        );
    }
}
