//! Mail-in addresses.
//!
//! Every user gets a personal address and one address per group they
//! belong to, all of the form `<recipient>+<token>@<domain>`.

use serde::Serialize;

use crate::dispatch::{token_context, MAILIN_CONTEXT};
use crate::entity::{Group, Target, User};
use crate::host::TokenStore;
use crate::registry::TypeRegistry;

/// A named mail-in address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailinAddress {
    /// Display name of the target
    pub name: String,
    pub email: String,
}

/// A content type as presented to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeSummary {
    /// Subject label, e.g. `BLOG`
    pub label: String,
    /// Body labels, e.g. `DESCRIPTION`
    pub fields: Vec<String>,
}

/// Extract the token from a plus-addressed recipient.
///
/// For "mailin+abc123@example.com", returns Some("abc123").
/// For "mailin@example.com", returns None.
pub fn recipient_token(recipient: &str) -> Option<String> {
    let address = bare_address(recipient);
    let local = address.split('@').next()?;
    local
        .split_once('+')
        .map(|(_, token)| token.to_string())
        .filter(|token| !token.is_empty())
}

/// Strip a display name and angle brackets: `Jane <jane@example.com>`
/// becomes `jane@example.com`.
pub fn bare_address(value: &str) -> &str {
    let value = value.trim();
    match (value.rfind('<'), value.rfind('>')) {
        (Some(start), Some(end)) if start < end => value[start + 1..end].trim(),
        _ => value,
    }
}

/// Build `<recipient>+<token>@<domain>`.
pub fn mailin_address(recipient: &str, token: &str, domain: &str) -> String {
    format!("{}+{}@{}", recipient, token, domain)
}

/// All mail-in addresses of a user: personal first, then one per group.
///
/// Entities without an issued token are left out.
pub fn address_book<S>(
    user: &User,
    groups: &[Group],
    tokens: &S,
    recipient: &str,
    domain: &str,
) -> Vec<MailinAddress>
where
    S: TokenStore + ?Sized,
{
    let mut addresses = Vec::new();

    let personal = Target::User(user.clone());
    if let Some(token) = tokens.notification_token(&personal, MAILIN_CONTEXT) {
        addresses.push(MailinAddress {
            name: user.display_name.clone(),
            email: mailin_address(recipient, &token, domain),
        });
    }

    for group in groups {
        let target = Target::Group(group.clone());
        let context = token_context(&target, user);
        if let Some(token) = tokens.notification_token(&target, &context) {
            addresses.push(MailinAddress {
                name: group.display_name.clone(),
                email: mailin_address(recipient, &token, domain),
            });
        }
    }

    addresses
}

/// Supported types with their labels, in match order.
pub fn supported_types(types: &TypeRegistry) -> Vec<TypeSummary> {
    types
        .iter()
        .map(|descriptor| TypeSummary {
            label: descriptor.name().to_ascii_uppercase(),
            fields: descriptor
                .fields()
                .iter()
                .map(|f| f.to_ascii_uppercase())
                .collect(),
        })
        .collect()
}
