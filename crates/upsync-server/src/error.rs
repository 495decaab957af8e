//! Service error type and its protocol rendering.
//!
//! Protocol operations surface failures as SOAP faults; content routes use
//! plain HTTP statuses. Both funnel through one `IntoResponse` impl so the
//! mapping from error kind to wire shape lives in a single place.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use upsync_core::Error;

use crate::soap;

/// Error type for request handlers.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A core error bubbled out of the engine or a store.
    #[error(transparent)]
    Core(#[from] Error),
}

impl ServiceError {
    fn fault(status: StatusCode, code: &str, message: &str) -> Response {
        let body = soap::render_fault(code, message);
        (
            status,
            [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
            body,
        )
            .into_response()
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let Self::Core(error) = self;
        match &error {
            Error::CatalogUnavailable => Self::fault(
                StatusCode::INTERNAL_SERVER_ERROR,
                "soap:Server",
                &error.to_string(),
            ),
            Error::UnknownRevision { .. } | Error::InvalidInput(_) => Self::fault(
                StatusCode::INTERNAL_SERVER_ERROR,
                "soap:Client",
                &error.to_string(),
            ),
            Error::NotImplemented { .. } => Self::fault(
                StatusCode::INTERNAL_SERVER_ERROR,
                "soap:Server",
                &error.to_string(),
            ),
            Error::ContentNotFound { key } => {
                tracing::debug!(key = %key, "content miss");
                StatusCode::NOT_FOUND.into_response()
            }
            Error::Metadata { .. } | Error::Internal { .. } => {
                tracing::error!(error = %error, "request failed");
                Self::fault(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "soap:Server",
                    "internal server error",
                )
            }
            Error::Io(source) => {
                tracing::error!(error = %source, "stream I/O failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Result type for request handlers.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_miss_maps_to_plain_404() {
        let response = ServiceError::Core(Error::ContentNotFound {
            key: "cd/abcd".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unknown_revision_maps_to_client_fault() {
        let response =
            ServiceError::Core(Error::UnknownRevision { revision: 7 }).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
