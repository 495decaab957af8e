//! The client web service endpoint.
//!
//! One POST route hosts every operation; dispatch is on the `SOAPAction`
//! header suffix. Sync and extended-info calls run the engine on a
//! blocking thread because metadata streams may touch disk.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, header};
use axum::response::Response;

use upsync_catalog::Cookie;
use upsync_core::Error;

use crate::error::ServiceResult;
use crate::soap;
use crate::state::AppState;

/// Operations the protocol names but this server does not implement.
const UNIMPLEMENTED: &[&str] = &[
    "GetExtendedUpdateInfo2",
    "GetFileLocations",
    "GetTimestamps",
    "RefreshCache",
    "RegisterComputer",
    "StartCategoryScan",
    "SyncPrinterCatalog",
];

/// Handles `POST /ClientWebService/client.asmx`.
///
/// # Errors
///
/// Protocol failures surface as SOAP faults via [`crate::error::ServiceError`].
pub async fn client_web_service(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ServiceResult<Response> {
    let action = headers
        .get("SOAPAction")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| Error::InvalidInput("missing SOAPAction header".to_string()))?;
    let operation = soap::operation_from_action(action)?;
    tracing::debug!(operation, "client web service call");

    match operation {
        "GetConfig" | "GetConfig2" => Ok(xml_response(soap::render_config(
            operation,
            state.started_at,
            &state.properties,
        ))),
        "GetCookie" => Ok(xml_response(soap::render_get_cookie(&Cookie::fresh()))),
        "SyncUpdates" => {
            let request = soap::parse_sync_updates(&body)?;
            let engine = state.engine.clone();
            let reply = tokio::task::spawn_blocking(move || engine.sync_updates(&request))
                .await
                .map_err(Error::internal)??;
            Ok(xml_response(soap::render_sync_reply(&reply)))
        }
        "GetExtendedUpdateInfo" => {
            let query = soap::parse_extended_info(&body)?;
            let engine = state.engine.clone();
            let info = tokio::task::spawn_blocking(move || {
                engine.extended_update_info(&query.revisions, &query.fragments, &query.locales)
            })
            .await
            .map_err(Error::internal)??;
            Ok(xml_response(soap::render_extended_info(&info)))
        }
        other if UNIMPLEMENTED.contains(&other) => Err(Error::not_implemented(other).into()),
        other => Err(Error::InvalidInput(format!("unknown operation {other}")).into()),
    }
}

pub(crate) fn xml_response(body: String) -> Response {
    Response::builder()
        .header(header::CONTENT_TYPE, "text/xml; charset=utf-8")
        .body(Body::from(body))
        .unwrap_or_default()
}
