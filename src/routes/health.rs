use axum::{response::IntoResponse, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
}

pub async fn healthcheck() -> impl IntoResponse {
    Json(Health {
        status: "available",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_serializes_to_the_status_key() {
        let health = Health {
            status: "available",
        };
        assert_eq!(
            serde_json::to_string(&health).unwrap(),
            r#"{"status":"available"}"#
        );
    }
}
