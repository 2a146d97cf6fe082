use axum::{Json, Router, extract::State, routing::get, routing::post};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::model::ExtractionModel;
use crate::service::ExtractionService;

pub mod extract;

use extract::extract_bill_data_handler;

const SERVICE_NAME: &str = "bill-extraction-service";

pub struct AppState<M> {
    pub service: Arc<ExtractionService<M>>,
    pub start_time: Instant,
}

pub fn router<M: ExtractionModel>(service: Arc<ExtractionService<M>>) -> Router {
    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler::<M>))
        .route("/extract-bill-data", post(extract_bill_data_handler::<M>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ==================== Health ====================

async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct RootResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn health_handler<M: ExtractionModel>(
    State(state): State<Arc<AppState<M>>>,
) -> Json<HealthResponse> {
    let model = state.service.model();
    let model_available = model.health_check().await;

    Json(HealthResponse {
        status: if model_available { "healthy" } else { "degraded" },
        model_available,
        model: model.model_name().to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model_available: bool,
    model: String,
    timestamp: String,
    version: &'static str,
    uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::model::testing::{ScriptedModel, reply};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn app(model: ScriptedModel) -> Router {
        let service =
            ExtractionService::with_model(Arc::new(AppConfig::default()), model).unwrap();
        router(Arc::new(service))
    }

    #[tokio::test]
    async fn test_root() {
        let (status, body) = get_json(app(ScriptedModel::new(|_| reply("{}"))), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "bill-extraction-service");
    }

    #[tokio::test]
    async fn test_health_reports_model() {
        let (status, body) = get_json(app(ScriptedModel::new(|_| reply("{}"))), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model_available"], true);
        assert_eq!(body["model"], "scripted");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_health_degraded_without_model() {
        let model = ScriptedModel::new(|_| reply("{}")).unhealthy();
        let (status, body) = get_json(app(model), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["model_available"], false);
    }
}
