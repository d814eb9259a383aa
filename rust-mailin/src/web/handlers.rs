//! Mail-in endpoint handlers.
//!
//! Each mail handler:
//! 1. Verifies authentication
//! 2. Converts the provider payload into a `RawMail`
//! 3. Resolves and dispatches it on the blocking pool
//! 4. Reports whether content was created
//!
//! The address listing lets the site show a member where to send mail.

use std::sync::Arc;

use axum::{
    extract::{Form, FromRequest, Multipart, Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::address::{address_book, bare_address, supported_types, MailinAddress, TypeSummary};
use crate::dispatch::{Mailin, Outcome};
use crate::message::Attachment;
use crate::process::{process_cloudflare, process_mailgun, resolve, CloudflarePayload, MailgunPayload, RawMail};
use crate::token::tokens_equal;
use crate::web::signature::{is_signature_verification_enabled, verify_mailgun_signature};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub mailin: Arc<Mailin>,
}

impl AppState {
    pub fn new(config: Config, mailin: Mailin) -> Self {
        Self {
            config: Arc::new(config),
            mailin: Arc::new(mailin),
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Responses
// =============================================================================

/// Mail-in response.
#[derive(Debug, Serialize)]
pub struct MailinResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Type that created content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Why nothing was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl MailinResponse {
    fn rejected(status: &'static str) -> Self {
        Self {
            status,
            message_id: None,
            content_type: None,
            reason: None,
        }
    }

    fn from_outcome(message_id: String, outcome: Outcome) -> Self {
        match outcome {
            Outcome::Created { content_type } => Self {
                status: "created",
                message_id: Some(message_id),
                content_type: Some(content_type),
                reason: None,
            },
            Outcome::Skipped(reason) => Self {
                status: "ignored",
                message_id: Some(message_id),
                content_type: None,
                reason: Some(reason.as_str()),
            },
        }
    }
}

type MailinReply = (StatusCode, Json<MailinResponse>);

fn reject(status: StatusCode, label: &'static str) -> MailinReply {
    (status, Json(MailinResponse::rejected(label)))
}

// =============================================================================
// Mailgun
// =============================================================================

/// Mailgun inbound route endpoint.
///
/// Accepts urlencoded posts and, for messages with attachments, multipart
/// posts whose `attachment-N` parts become the message's attachments.
///
/// This endpoint:
/// 1. Verifies the HMAC signature (if configured)
/// 2. Checks the recipient domain (if configured)
/// 3. Dispatches the message
pub async fn mailgun_mailin(State(state): State<AppState>, request: Request) -> impl IntoResponse {
    let payload = match read_mailgun_payload(&state, request).await {
        Ok(payload) => payload,
        Err(reply) => return reply,
    };

    info!(
        recipient = %payload.recipient,
        subject = %payload.subject,
        has_signature = !payload.signature.is_empty(),
        attachment_count = payload.attachments.len(),
        "mailgun_mailin_received"
    );

    if is_signature_verification_enabled(&state.config.mailgun_signing_key) {
        let signing_key = state.config.mailgun_signing_key.as_deref().unwrap_or_default();
        if !verify_mailgun_signature(
            signing_key,
            &payload.timestamp,
            &payload.token,
            &payload.signature,
            state.config.mailgun_signature_max_age,
        ) {
            warn!(recipient = %payload.recipient, "mailgun_signature_invalid");
            return reject(StatusCode::UNAUTHORIZED, "unauthorized");
        }
    }

    if let Some(reply) = check_domain(&state.config, &payload.recipient) {
        return reply;
    }

    deliver(state.mailin, process_mailgun(payload)).await
}

/// Read a Mailgun post in either of the encodings Mailgun uses.
async fn read_mailgun_payload(state: &AppState, request: Request) -> Result<MailgunPayload, MailinReply> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"));

    if !is_multipart {
        return match Form::<MailgunPayload>::from_request(request, state).await {
            Ok(Form(payload)) => Ok(payload),
            Err(e) => {
                warn!(error = %e, "mailgun_form_rejected");
                Err(reject(e.status(), "invalid_payload"))
            }
        };
    }

    let multipart = Multipart::from_request(request, state).await.map_err(|e| {
        warn!(error = %e, "mailgun_multipart_rejected");
        reject(e.status(), "invalid_payload")
    })?;

    read_multipart(multipart).await.map_err(|e| {
        warn!(error = %e, "mailgun_multipart_unreadable");
        reject(StatusCode::BAD_REQUEST, "invalid_payload")
    })
}

/// Collect text parts into the payload and file parts into attachments.
async fn read_multipart(mut multipart: Multipart) -> Result<MailgunPayload, String> {
    let mut fields = serde_json::Map::new();
    let mut attachments = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);

        if file_name.is_none() && !is_attachment_part(&name) {
            let value = field.text().await.map_err(|e| e.to_string())?;
            fields.insert(name, serde_json::Value::String(value));
            continue;
        }

        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await.map_err(|e| e.to_string())?;

        attachments.push(Attachment {
            filename: file_name.unwrap_or(name),
            content_type,
            data: data.to_vec(),
        });
    }

    let mut payload: MailgunPayload =
        serde_json::from_value(serde_json::Value::Object(fields)).map_err(|e| e.to_string())?;
    payload.attachments = attachments;

    Ok(payload)
}

/// `attachment-1`, `attachment-2`, ... but not `attachment-count`.
fn is_attachment_part(name: &str) -> bool {
    name.strip_prefix("attachment-")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

// =============================================================================
// Cloudflare
// =============================================================================

/// Cloudflare Email Worker endpoint.
///
/// This endpoint:
/// 1. Verifies the X-Custom-Auth header (if configured)
/// 2. Checks the recipient domain (if configured)
/// 3. Dispatches the message
pub async fn cloudflare_mailin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CloudflarePayload>,
) -> impl IntoResponse {
    info!(
        from = %payload.from_field,
        to = %payload.to,
        raw_content_length = payload.raw_content.len(),
        "cloudflare_mailin_received"
    );

    let auth_header = headers
        .get("X-Custom-Auth")
        .and_then(|v| v.to_str().ok());

    let expected_token = state.config.cloudflare_auth_token.as_deref();

    match (auth_header, expected_token) {
        (Some(provided), Some(expected)) if tokens_equal(expected, provided) => {}
        (None, Some(_)) => {
            warn!(to = %payload.to, "cloudflare_auth_missing");
            return reject(StatusCode::UNAUTHORIZED, "unauthorized");
        }
        (Some(_), Some(_)) => {
            warn!(to = %payload.to, "cloudflare_auth_invalid");
            return reject(StatusCode::UNAUTHORIZED, "unauthorized");
        }
        (_, None) => {
            warn!("cloudflare_auth_not_configured");
        }
    }

    if let Some(reply) = check_domain(&state.config, &payload.to) {
        return reply;
    }

    deliver(state.mailin, process_cloudflare(payload)).await
}

// =============================================================================
// Addresses
// =============================================================================

/// A member's mail-in addresses and the types they can create.
#[derive(Debug, Serialize)]
pub struct AddressesResponse {
    pub username: String,
    /// Personal address first, then one per group
    pub addresses: Vec<MailinAddress>,
    pub types: Vec<TypeSummary>,
}

/// List a member's mail-in addresses.
///
/// The addresses embed the member's secret tokens, so the site must present
/// the configured bearer token; the listing is off while none is configured.
pub async fn mailin_addresses(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> Result<Json<AddressesResponse>, MailinReply> {
    let Some(expected) = state.config.addresses_auth_token.as_deref() else {
        warn!("mailin_addresses_disabled");
        return Err(reject(StatusCode::FORBIDDEN, "forbidden"));
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if !tokens_equal(expected, provided.trim()) {
        warn!(username = %username, "mailin_addresses_unauthorized");
        return Err(reject(StatusCode::UNAUTHORIZED, "unauthorized"));
    }

    let Some(domain) = state.config.mailin_domain.clone() else {
        warn!("mailin_addresses_no_domain");
        return Err(reject(StatusCode::SERVICE_UNAVAILABLE, "not_configured"));
    };

    let config = state.config.clone();
    let mailin = state.mailin.clone();
    let lookup = username.clone();

    let listing = tokio::task::spawn_blocking(move || {
        let host = mailin.host();
        let user = host.user_by_username(&lookup)?;
        let groups = host.groups_of(&user);
        let addresses = address_book(&user, &groups, host, &config.mailin_recipient, &domain);
        Some(AddressesResponse {
            username: user.username,
            addresses,
            types: supported_types(&mailin.get_types()),
        })
    })
    .await;

    match listing {
        Ok(Some(listing)) => {
            info!(
                username = %username,
                address_count = listing.addresses.len(),
                "mailin_addresses_listed"
            );
            Ok(Json(listing))
        }
        Ok(None) => {
            info!(username = %username, "mailin_addresses_unknown_user");
            Err(reject(StatusCode::NOT_FOUND, "not_found"))
        }
        Err(e) => {
            error!(username = %username, error = %e, "mailin_addresses_failed");
            Err(reject(StatusCode::INTERNAL_SERVER_ERROR, "error"))
        }
    }
}

// =============================================================================
// Shared
// =============================================================================

/// Reject recipients outside the configured mail-in domain.
fn check_domain(config: &Config, recipient: &str) -> Option<MailinReply> {
    let domain = config.mailin_domain.as_deref()?;
    if recipient_in_domain(recipient, domain) {
        return None;
    }

    warn!(
        recipient = %recipient,
        expected_domain = %domain,
        "mailin_invalid_recipient_domain"
    );
    Some(reject(StatusCode::BAD_REQUEST, "invalid_domain"))
}

fn recipient_in_domain(recipient: &str, domain: &str) -> bool {
    let address = bare_address(recipient).to_ascii_lowercase();
    address.ends_with(&format!("@{}", domain.to_ascii_lowercase()))
}

/// Resolve and dispatch on the blocking pool; host lookups and writes are
/// synchronous.
async fn deliver(mailin: Arc<Mailin>, mail: RawMail) -> MailinReply {
    let message_id = mail.message_id.clone();

    let result = tokio::task::spawn_blocking(move || {
        let message = resolve(mail, mailin.host());
        mailin.process(&message)
    })
    .await;

    match result {
        Ok(outcome) => {
            info!(
                message_id = %message_id,
                created = outcome.is_terminated(),
                "mailin_dispatch_complete"
            );
            (
                StatusCode::OK,
                Json(MailinResponse::from_outcome(message_id, outcome)),
            )
        }
        Err(e) => {
            error!(message_id = %message_id, error = %e, "mailin_dispatch_failed");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "error")
        }
    }
}
