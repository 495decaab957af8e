//! SOAP 1.1 envelope parsing and response rendering.
//!
//! Requests are deserialized with serde into per-operation structs; only
//! the fields the engine consumes are modeled, everything else in the
//! envelope is ignored. Responses are rendered by hand: the envelope
//! namespaces and element order are fixed by the protocol, so a template
//! is both simpler and easier to diff against captured traffic than a
//! serializer round-trip.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::SecondsFormat;
use serde::Deserialize;

use upsync_catalog::{Cookie, ExtendedInfo, FragmentType, SyncReply, SyncRequest};
use upsync_core::{Error, Result};

/// The client web service namespace.
pub const CLIENT_NS: &str =
    "http://www.microsoft.com/SoftwareDistribution/Server/ClientWebService";

/// Extracts the operation name from a `SOAPAction` header value.
///
/// The client sends the full quoted action URI; the operation is its last
/// path segment.
///
/// # Errors
///
/// Returns an error when the header value is empty after unquoting.
pub fn operation_from_action(action: &str) -> Result<&str> {
    let trimmed = action.trim().trim_matches('"');
    let operation = trimmed.rsplit('/').next().unwrap_or_default();
    if operation.is_empty() {
        return Err(Error::InvalidInput(format!(
            "SOAPAction '{action}' names no operation"
        )));
    }
    Ok(operation)
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "Body")]
    body: T,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IntList {
    #[serde(rename = "int")]
    items: Vec<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LocaleList {
    #[serde(rename = "string")]
    items: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FragmentTypeList {
    #[serde(rename = "XmlUpdateFragmentType")]
    items: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SyncUpdatesBody {
    #[serde(rename = "SyncUpdates")]
    call: SyncUpdatesCall,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SyncUpdatesCall {
    parameters: SyncParameters,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SyncParameters {
    #[serde(rename = "InstalledNonLeafUpdateIDs")]
    installed_non_leaf: IntList,
    #[serde(rename = "OtherCachedUpdateIDs")]
    other_cached: IntList,
    #[serde(rename = "SkipSoftwareSync")]
    skip_software_sync: Option<bool>,
}

/// Parses a `SyncUpdates` request envelope.
///
/// # Errors
///
/// Returns an error when the envelope does not deserialize.
pub fn parse_sync_updates(envelope: &str) -> Result<SyncRequest> {
    let parsed: Envelope<SyncUpdatesBody> = from_xml(envelope)?;
    let parameters = parsed.body.call.parameters;
    Ok(SyncRequest {
        installed_non_leaf_revisions: parameters.installed_non_leaf.items,
        other_cached_revisions: parameters.other_cached.items,
        skip_software_sync: parameters.skip_software_sync.unwrap_or(false),
    })
}

#[derive(Debug, Deserialize)]
struct ExtendedInfoBody {
    #[serde(rename = "GetExtendedUpdateInfo")]
    call: ExtendedInfoCall,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtendedInfoCall {
    #[serde(rename = "revisionIDs")]
    revision_ids: IntList,
    #[serde(rename = "infoTypes")]
    info_types: FragmentTypeList,
    locales: LocaleList,
}

/// A decoded `GetExtendedUpdateInfo` request.
#[derive(Debug, Default)]
pub struct ExtendedQuery {
    /// Requested revision handles, in request order.
    pub revisions: Vec<i32>,
    /// Requested fragment kinds; unknown kinds are dropped.
    pub fragments: Vec<FragmentType>,
    /// Requested languages, in preference order.
    pub locales: Vec<String>,
}

/// Parses a `GetExtendedUpdateInfo` request envelope.
///
/// # Errors
///
/// Returns an error when the envelope does not deserialize.
pub fn parse_extended_info(envelope: &str) -> Result<ExtendedQuery> {
    let parsed: Envelope<ExtendedInfoBody> = from_xml(envelope)?;
    let call = parsed.body.call;
    Ok(ExtendedQuery {
        revisions: call.revision_ids.items,
        fragments: call
            .info_types
            .items
            .iter()
            .filter_map(|kind| FragmentType::parse(kind))
            .collect(),
        locales: call.locales.items,
    })
}

fn from_xml<T: serde::de::DeserializeOwned>(envelope: &str) -> Result<T> {
    serde_xml_rs::from_str(envelope)
        .map_err(|e| Error::InvalidInput(format!("malformed SOAP envelope: {e}")))
}

/// Escapes text for use in XML content or attribute values.
#[must_use]
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Wraps a rendered body in the SOAP envelope.
#[must_use]
pub fn render_envelope(inner: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema"><soap:Body>{inner}</soap:Body></soap:Envelope>"#
    )
}

/// Renders a SOAP fault envelope.
#[must_use]
pub fn render_fault(code: &str, message: &str) -> String {
    render_envelope(&format!(
        "<soap:Fault><faultcode>{}</faultcode><faultstring>{}</faultstring></soap:Fault>",
        xml_escape(code),
        xml_escape(message)
    ))
}

fn render_cookie_fields(cookie: &Cookie) -> String {
    format!(
        "<Expiration>{}</Expiration><EncryptedData>{}</EncryptedData>",
        cookie
            .expiration
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        BASE64.encode(&cookie.encrypted_data)
    )
}

/// Renders a `GetCookie` response envelope.
#[must_use]
pub fn render_get_cookie(cookie: &Cookie) -> String {
    render_envelope(&format!(
        r#"<GetCookieResponse xmlns="{CLIENT_NS}"><GetCookieResult>{}</GetCookieResult></GetCookieResponse>"#,
        render_cookie_fields(cookie)
    ))
}

/// Renders a `SyncUpdates` response envelope.
#[must_use]
pub fn render_sync_reply(reply: &SyncReply) -> String {
    let mut result = String::new();
    if !reply.new_updates.is_empty() {
        result.push_str("<NewUpdates>");
        for offer in &reply.new_updates {
            let deployment = &offer.deployment;
            result.push_str(&format!(
                "<UpdateInfo><ID>{}</ID>\
                 <Deployment><ID>{}</ID><Action>{}</Action><IsAssigned>{}</IsAssigned>\
                 <LastChangeTime>{}</LastChangeTime><AutoSelect>{}</AutoSelect>\
                 <AutoDownload>{}</AutoDownload><SupersedenceBehavior>{}</SupersedenceBehavior>\
                 </Deployment><IsLeaf>{}</IsLeaf><IsShared>{}</IsShared><Xml>{}</Xml></UpdateInfo>",
                offer.id,
                deployment.id,
                deployment.action.as_str(),
                deployment.is_assigned,
                deployment.last_change_time,
                deployment.auto_select,
                deployment.auto_download,
                deployment.supersedence_behavior,
                offer.is_leaf,
                offer.is_shared,
                xml_escape(&offer.xml),
            ));
        }
        result.push_str("</NewUpdates>");
    }
    result.push_str(&format!(
        "<Truncated>{}</Truncated><NewCookie>{}</NewCookie><DriverSyncNotNeeded>{}</DriverSyncNotNeeded>",
        reply.truncated,
        render_cookie_fields(&reply.new_cookie),
        reply.driver_sync_not_needed,
    ));
    render_envelope(&format!(
        r#"<SyncUpdatesResponse xmlns="{CLIENT_NS}"><SyncUpdatesResult>{result}</SyncUpdatesResult></SyncUpdatesResponse>"#
    ))
}

/// Renders a `GetExtendedUpdateInfo` response envelope.
#[must_use]
pub fn render_extended_info(info: &ExtendedInfo) -> String {
    let mut result = String::new();
    if !info.updates.is_empty() {
        result.push_str("<Updates>");
        for update in &info.updates {
            result.push_str(&format!(
                "<UpdateData><ID>{}</ID><Xml>{}</Xml></UpdateData>",
                update.id,
                xml_escape(&update.xml)
            ));
        }
        result.push_str("</Updates>");
    }
    if !info.file_locations.is_empty() {
        result.push_str("<FileLocations>");
        for location in &info.file_locations {
            result.push_str(&format!(
                "<FileLocation><FileDigest>{}</FileDigest><Url>{}</Url></FileLocation>",
                BASE64.encode(&location.digest),
                xml_escape(&location.url)
            ));
        }
        result.push_str("</FileLocations>");
    }
    render_envelope(&format!(
        r#"<GetExtendedUpdateInfoResponse xmlns="{CLIENT_NS}"><GetExtendedUpdateInfoResult>{result}</GetExtendedUpdateInfoResult></GetExtendedUpdateInfoResponse>"#
    ))
}

/// Renders a `GetConfig`/`GetConfig2` response envelope.
#[must_use]
pub fn render_config(
    operation: &str,
    last_change: chrono::DateTime<chrono::Utc>,
    properties: &serde_json::Value,
) -> String {
    let mut result = format!(
        "<LastChange>{}</LastChange><IsRegistrationRequired>false</IsRegistrationRequired>\
         <AllowedEventIds xsi:nil=\"true\" />\
         <AuthInfo>\
         <AuthPlugInInfo><PlugInID>PidValidator</PlugInID><ServiceUrl /><Parameter /></AuthPlugInInfo>\
         <AuthPlugInInfo><PlugInID>Anonymous</PlugInID><ServiceUrl /><Parameter /></AuthPlugInInfo>\
         </AuthInfo>",
        last_change.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    result.push_str("<Properties>");
    if let serde_json::Value::Object(map) = properties {
        for (key, value) in map {
            render_json_element(key, value, &mut result);
        }
    }
    result.push_str("</Properties>");
    render_envelope(&format!(
        r#"<{operation}Response xmlns="{CLIENT_NS}"><{operation}Result>{result}</{operation}Result></{operation}Response>"#
    ))
}

fn render_json_element(key: &str, value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            out.push_str(&format!("<{key}>"));
            for (child_key, child) in map {
                render_json_element(child_key, child, out);
            }
            out.push_str(&format!("</{key}>"));
        }
        serde_json::Value::Array(items) => {
            for item in items {
                render_json_element(key, item, out);
            }
        }
        serde_json::Value::Null => out.push_str(&format!("<{key} />")),
        scalar => {
            let text = match scalar {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.push_str(&format!("<{key}>{}</{key}>", xml_escape(&text)));
        }
    }
}

/// Canned `GetAuthorizationCookie` reply for the stub auth service.
#[must_use]
pub fn render_authorization_cookie() -> String {
    render_envelope(&format!(
        r#"<GetAuthorizationCookieResponse xmlns="http://www.microsoft.com/SoftwareDistribution/Server/SimpleAuthWebService"><GetAuthorizationCookieResult><PlugInId>Anonymous</PlugInId><CookieData>{}</CookieData></GetAuthorizationCookieResult></GetAuthorizationCookieResponse>"#,
        BASE64.encode([0u8; 12])
    ))
}

/// Canned reply for the stub reporting service; accepts every batch.
#[must_use]
pub fn render_report_event_batch() -> String {
    render_envelope(
        r#"<ReportEventBatchResponse xmlns="http://www.microsoft.com/SoftwareDistribution/ReportingWebService"><ReportEventBatchResult>true</ReportEventBatchResult></ReportEventBatchResponse>"#,
    )
}
