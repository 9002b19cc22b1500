use crate::classifier::ClassifierError;
use crate::config::ConfigError;
use crate::downloader::DownloadError;
use crate::oauth::OAuthError;
use crate::range::RangeError;
use crate::sheets::ExportError;
use thiserror::Error;

/// Anything a request handler or startup can fail with.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("No table has been uploaded for this session")]
    NoTable,

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    OAuth(#[from] OAuthError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "web")]
mod response {
    use super::AppError;
    use axum::Json;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use serde_json::json;

    impl AppError {
        pub fn status(&self) -> StatusCode {
            match self {
                AppError::BadRequest(_) | AppError::Range(_) => StatusCode::BAD_REQUEST,
                AppError::Download(
                    crate::downloader::DownloadError::UnknownFormat(_)
                    | crate::downloader::DownloadError::TooLarge { .. },
                ) => StatusCode::BAD_REQUEST,
                AppError::NoTable => StatusCode::NOT_FOUND,
                AppError::Export(crate::sheets::ExportError::NotConfigured)
                | AppError::OAuth(crate::oauth::OAuthError::NotConfigured) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                AppError::Classifier(_) | AppError::Export(_) | AppError::OAuth(_) => {
                    StatusCode::BAD_GATEWAY
                }
                AppError::Config(_) | AppError::Download(_) | AppError::Io(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        }
    }

    impl IntoResponse for AppError {
        fn into_response(self) -> Response {
            let status = self.status();
            if status.is_server_error() {
                log::error!("{}", self);
            }
            (
                status,
                Json(json!({ "status": "error", "message": self.to_string() })),
            )
                .into_response()
        }
    }
}
