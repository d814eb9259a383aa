//! Mailgun route signatures.
//!
//! Every message Mailgun forwards to a route carries `timestamp`, `token`
//! and `signature` fields; the signature is the hex HMAC-SHA256 of
//! `timestamp + token` under the account's signing key.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Why a route post was not accepted as coming from Mailgun.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    MissingFields,
    BadTimestamp,
    /// Signed outside the allowed window, in either direction
    Expired { age_seconds: u64 },
    NotHex,
    Mismatch,
}

impl SignatureError {
    pub fn as_str(self) -> &'static str {
        match self {
            SignatureError::MissingFields => "missing_fields",
            SignatureError::BadTimestamp => "bad_timestamp",
            SignatureError::Expired { .. } => "expired",
            SignatureError::NotHex => "not_hex",
            SignatureError::Mismatch => "mismatch",
        }
    }
}

/// The signature fields of one route post.
#[derive(Debug, Clone, Copy)]
pub struct RouteSignature<'a> {
    pub timestamp: &'a str,
    pub token: &'a str,
    pub signature: &'a str,
}

impl RouteSignature<'_> {
    /// Check the post against `signing_key`, accepting timestamps at most
    /// `max_age_seconds` away from `now`.
    pub fn check(&self, signing_key: &str, now: u64, max_age_seconds: u64) -> Result<(), SignatureError> {
        if [self.timestamp, self.token, self.signature]
            .iter()
            .any(|field| field.trim().is_empty())
        {
            return Err(SignatureError::MissingFields);
        }

        let signed_at: u64 = self
            .timestamp
            .trim()
            .parse()
            .map_err(|_| SignatureError::BadTimestamp)?;

        let age_seconds = now.abs_diff(signed_at);
        if age_seconds > max_age_seconds {
            return Err(SignatureError::Expired { age_seconds });
        }

        let provided = hex::decode(self.signature.trim()).map_err(|_| SignatureError::NotHex)?;

        // Any key length is valid for HMAC
        let mut mac = HmacSha256::new_from_slice(signing_key.as_bytes())
            .map_err(|_| SignatureError::Mismatch)?;
        mac.update(self.timestamp.as_bytes());
        mac.update(self.token.as_bytes());

        mac.verify_slice(&provided)
            .map_err(|_| SignatureError::Mismatch)
    }
}

/// Verify a Mailgun route post against the current clock.
///
/// Failures are logged; the caller only needs the verdict.
pub fn verify_mailgun_signature(
    signing_key: &str,
    timestamp: &str,
    token: &str,
    signature: &str,
    max_age_seconds: u64,
) -> bool {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let post = RouteSignature {
        timestamp,
        token,
        signature,
    };

    match post.check(signing_key, now, max_age_seconds) {
        Ok(()) => true,
        Err(e) => {
            let age_seconds = match e {
                SignatureError::Expired { age_seconds } => Some(age_seconds),
                _ => None,
            };
            warn!(
                reason = e.as_str(),
                age_seconds = ?age_seconds,
                max_age_seconds = max_age_seconds,
                "mailgun_signature_rejected"
            );
            false
        }
    }
}

/// Is a signing key configured?
pub fn is_signature_verification_enabled(signing_key: &Option<String>) -> bool {
    signing_key
        .as_deref()
        .is_some_and(|key| !key.trim().is_empty())
}

#[cfg(test)]
pub(crate) fn sign(signing_key: &str, timestamp: &str, token: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(signing_key.as_bytes()).unwrap();
    mac.update(timestamp.as_bytes());
    mac.update(token.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
