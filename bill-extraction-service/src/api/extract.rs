//! Bill extraction endpoint.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::bill::{ReconciledDocument, TokenUsage, aggregate};
use crate::error::{ServiceError, format_error_chain};
use crate::model::ExtractionModel;
use crate::service::ExtractionOutcome;

use super::AppState;

/// Extraction request
#[derive(Debug, Deserialize)]
pub struct ExtractionRequest {
    /// http(s) URL, `file://` URL or local path of the bill
    pub document: String,
}

/// Response envelope, used for failures as well
#[derive(Debug, Serialize)]
pub struct ExtractionResponse {
    pub is_success: bool,
    pub token_usage: TokenUsage,
    pub data: ReconciledDocument,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl ExtractionResponse {
    pub fn success(outcome: ExtractionOutcome) -> Self {
        Self {
            is_success: true,
            token_usage: outcome.token_usage,
            data: outcome.document,
            error: None,
            code: None,
        }
    }

    /// Failure envelope with the same `data` shape, emptied
    pub fn failure(message: String, code: &'static str) -> Self {
        Self {
            is_success: false,
            token_usage: TokenUsage::default(),
            data: aggregate(Vec::new()),
            error: Some(message),
            code: Some(code),
        }
    }
}

/// Extract the line items of one bill
pub async fn extract_bill_data_handler<M: ExtractionModel>(
    State(state): State<Arc<AppState<M>>>,
    payload: Result<Json<ExtractionRequest>, JsonRejection>,
) -> Result<Json<ExtractionResponse>, ServiceError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("extract_bill_data", request_id = %request_id);

    async move {
        let Json(request) = payload.map_err(|rejection| ServiceError::InvalidRequest {
            message: rejection.body_text(),
        })?;

        let document = request.document.trim();
        if document.is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: "document must not be empty".to_string(),
            });
        }

        info!(document = %document, "Extraction requested");

        match state.service.extract_document(document).await {
            Ok(outcome) => Ok(Json(ExtractionResponse::success(outcome))),
            Err(e) => {
                error!(error = %format_error_chain(&e), "Extraction failed");
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use crate::api::router;
    use crate::config::AppConfig;
    use crate::model::testing::{ScriptedModel, crop_id, reply};
    use crate::service::ExtractionService;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::{Value, json};
    use std::io::{Cursor, Write};
    use std::sync::Arc;
    use tempfile::NamedTempFile;
    use tower::ServiceExt;

    fn app(model: ScriptedModel) -> Router {
        let mut config = AppConfig::default();
        config.acquisition.allow_local_paths = true;
        config.crops.column_splits = vec![2];
        config.crops.max_crops_per_page = 2;
        let service = ExtractionService::with_model(Arc::new(config), model).unwrap();
        router(Arc::new(service))
    }

    async fn post_json(app: Router, body: String) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/extract-bill-data")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn bill_image() -> NamedTempFile {
        let page = RgbImage::from_fn(240, 160, |x, y| {
            if (40..200).contains(&x) && (30..130).contains(&y) {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(page)
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&bytes.into_inner()).unwrap();
        file.flush().unwrap();
        file
    }

    fn empty_data() -> Value {
        json!({"pagewise_line_items": [], "total_item_count": 0})
    }

    #[tokio::test]
    async fn test_extract_success_envelope() {
        let model = ScriptedModel::new(|prompt| match crop_id(prompt) {
            Some("p1_full") => reply(
                r#"{"page_type": "Pharmacy", "bill_items": [
                    {"item_name": "Livi 300mg Tab", "item_amount": 448, "item_rate": 32, "item_quantity": 14}
                ]}"#,
            ),
            _ => reply(
                r#"{"bill_items": [
                    {"item_name": " Livi 300mg Tab ", "item_amount": "448.00"},
                    {"item_name": "Consultation", "item_amount": null}
                ]}"#,
            ),
        });
        let file = bill_image();

        let (status, body) = post_json(
            app(model),
            json!({"document": file.path().to_str().unwrap()}).to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_success"], true);
        assert_eq!(
            body["token_usage"],
            json!({"total_tokens": 330, "input_tokens": 300, "output_tokens": 30})
        );
        assert_eq!(
            body["data"],
            json!({
                "pagewise_line_items": [{
                    "page_no": "1",
                    "page_type": "Pharmacy",
                    "bill_items": [
                        {"item_name": "Livi 300mg Tab", "item_amount": 448.0, "item_rate": 32.0, "item_quantity": 14.0},
                        {"item_name": "Consultation", "item_amount": null, "item_rate": null, "item_quantity": null}
                    ]
                }],
                "total_item_count": 2
            })
        );
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let (status, body) = post_json(
            app(ScriptedModel::new(|_| reply("{}"))),
            "{\"doc\": 1}".to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["is_success"], false);
        assert_eq!(body["code"], "invalid_request");
        assert_eq!(body["data"], empty_data());
    }

    #[tokio::test]
    async fn test_blank_document_is_bad_request() {
        let (status, body) = post_json(
            app(ScriptedModel::new(|_| reply("{}"))),
            json!({"document": "   "}).to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_missing_document_envelope() {
        let (status, body) = post_json(
            app(ScriptedModel::new(|_| reply("{}"))),
            json!({"document": "/nonexistent/bills/missing.pdf"}).to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["is_success"], false);
        assert_eq!(body["code"], "document_not_found");
        assert_eq!(
            body["token_usage"],
            json!({"total_tokens": 0, "input_tokens": 0, "output_tokens": 0})
        );
        assert_eq!(body["data"], empty_data());
        assert!(
            body["error"]
                .as_str()
                .unwrap()
                .contains("/nonexistent/bills/missing.pdf")
        );
    }

    #[tokio::test]
    async fn test_local_document_forbidden_by_default() {
        let service = ExtractionService::with_model(
            Arc::new(AppConfig::default()),
            ScriptedModel::new(|_| reply("{}")),
        )
        .unwrap();
        let file = bill_image();

        let (status, body) = post_json(
            router(Arc::new(service)),
            json!({"document": file.path().to_str().unwrap()}).to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["is_success"], false);
        assert_eq!(body["code"], "local_paths_disabled");
        assert_eq!(body["data"], empty_data());
    }
}
