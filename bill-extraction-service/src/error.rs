use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::api::extract::ExtractionResponse;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors raised while fetching a document and turning it into page images
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Unsupported document location: {document}")]
    InvalidLocation { document: String },

    #[error("Local documents are not accepted: {document}")]
    LocalPathsDisabled { document: String },

    #[error("Failed to download document from {url}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Document download from {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Document not found: {path}")]
    NotFound { path: String },

    #[error("Failed to read document")]
    Io(#[source] std::io::Error),

    #[error("Document too large: {size} bytes (max {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("Unsupported document format: {format}")]
    UnsupportedFormat { format: String },

    #[error("PDF renderer unavailable: {message}")]
    PdfiumUnavailable { message: String },

    #[error("Failed to render page {page}: {message}")]
    Render { page: usize, message: String },

    #[error("Failed to decode document image")]
    Decode(#[source] image::ImageError),

    #[error("Document has {count} pages (max {max})")]
    TooManyPages { count: usize, max: usize },

    #[error("Document contains no pages")]
    NoPages,
}

/// Multimodal model client errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Connection failed to model server at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    #[error("Generation failed (status {status}): {message}")]
    Generation { status: u16, message: String },

    #[error("Model request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Invalid response from model server")]
    InvalidResponse {
        #[source]
        source: serde_json::Error,
    },

    #[error("Model output is not a bill extraction: {message}")]
    MalformedOutput { message: String },

    #[error("Failed to encode crop image")]
    Encoding(#[source] image::ImageError),
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Acquisition(AcquisitionError::UnsupportedFormat { .. }) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ServiceError::Acquisition(
                AcquisitionError::TooLarge { .. } | AcquisitionError::TooManyPages { .. },
            ) => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::Acquisition(AcquisitionError::PdfiumUnavailable { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::Acquisition(AcquisitionError::LocalPathsDisabled { .. }) => {
                StatusCode::FORBIDDEN
            }
            ServiceError::Acquisition(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Model(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Config { .. } | ServiceError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Acquisition(AcquisitionError::InvalidLocation { .. }) => {
                "invalid_document_location"
            }
            ServiceError::Acquisition(AcquisitionError::LocalPathsDisabled { .. }) => {
                "local_paths_disabled"
            }
            ServiceError::Acquisition(AcquisitionError::Download { .. }) => "download_failed",
            ServiceError::Acquisition(AcquisitionError::HttpStatus { .. }) => "download_status",
            ServiceError::Acquisition(AcquisitionError::NotFound { .. }) => "document_not_found",
            ServiceError::Acquisition(AcquisitionError::Io(_)) => "io_error",
            ServiceError::Acquisition(AcquisitionError::TooLarge { .. }) => "document_too_large",
            ServiceError::Acquisition(AcquisitionError::UnsupportedFormat { .. }) => {
                "unsupported_format"
            }
            ServiceError::Acquisition(AcquisitionError::PdfiumUnavailable { .. }) => {
                "pdf_renderer_unavailable"
            }
            ServiceError::Acquisition(AcquisitionError::Render { .. }) => "render_failed",
            ServiceError::Acquisition(AcquisitionError::Decode(_)) => "image_decode_failed",
            ServiceError::Acquisition(AcquisitionError::TooManyPages { .. }) => "too_many_pages",
            ServiceError::Acquisition(AcquisitionError::NoPages) => "no_pages",
            ServiceError::Model(ModelError::Connection { .. }) => "model_connection",
            ServiceError::Model(ModelError::ModelNotFound { .. }) => "model_not_found",
            ServiceError::Model(ModelError::Generation { .. }) => "model_generation",
            ServiceError::Model(ModelError::Timeout { .. }) => "model_timeout",
            ServiceError::Model(ModelError::InvalidResponse { .. }) => "model_invalid_response",
            ServiceError::Model(ModelError::MalformedOutput { .. }) => "model_malformed_output",
            ServiceError::Model(ModelError::Encoding(_)) => "crop_encoding_failed",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let body = ExtractionResponse::failure(format_error_chain(&self), code);

        (status, Json(body)).into_response()
    }
}

/// Render an error and all of its sources as a single `a: b: c` line.
pub fn format_error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
