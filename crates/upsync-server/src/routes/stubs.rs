//! Stub web services.
//!
//! The auth and reporting endpoints accept anything and return benign
//! replies; registration is never required and event batches are always
//! acknowledged.

use axum::response::Response;

use crate::routes::client::xml_response;

/// Handles `POST /SimpleAuthWebService/SimpleAuth.asmx`.
pub async fn simple_auth(body: String) -> Response {
    tracing::debug!(bytes = body.len(), "authorization cookie issued");
    xml_response(crate::soap::render_authorization_cookie())
}

/// Handles `POST /ReportingWebService/WebService.asmx`.
pub async fn reporting(body: String) -> Response {
    tracing::debug!(bytes = body.len(), "report batch accepted");
    xml_response(crate::soap::render_report_event_batch())
}
