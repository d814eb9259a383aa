//! Configuration module for environment variable parsing.
//!
//! Everything the mail-in core needs to know about the host environment is
//! carried in [`Config`] and [`Capabilities`]; nothing reads global state
//! after start-up.

use std::collections::BTreeSet;
use std::env;

use tracing::warn;

/// Optional feature areas of the host site.
///
/// A content type is only offered while its capability is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    enabled: BTreeSet<String>,
}

impl Capabilities {
    pub const BLOG: &'static str = "blog";
    pub const BOOKMARKS: &'static str = "bookmarks";
    pub const FILE: &'static str = "file";
    pub const DISCUSSIONS: &'static str = "discussions";
    /// Storing email attachments alongside blogs, bookmarks and discussions
    pub const ATTACHMENTS: &'static str = "attachments";

    /// Capabilities enabled when nothing is configured.
    pub const DEFAULT: &'static [&'static str] =
        &[Self::BLOG, Self::BOOKMARKS, Self::FILE, Self::DISCUSSIONS];

    /// Build from a list of capability names. Names are case-insensitive.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let enabled = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_ascii_lowercase())
            .filter(|n| !n.is_empty())
            .collect();
        Self { enabled }
    }

    /// No capability enabled.
    pub fn none() -> Self {
        Self {
            enabled: BTreeSet::new(),
        }
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(&name.to_ascii_lowercase())
    }

    pub fn enable(&mut self, name: &str) {
        self.enabled.insert(name.to_ascii_lowercase());
    }

    pub fn disable(&mut self, name: &str) {
        self.enabled.remove(&name.to_ascii_lowercase());
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.enabled.iter().map(String::as_str)
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::from_names(Self::DEFAULT)
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Enabled content capabilities
    pub capabilities: Capabilities,

    /// Local part used for mail-in addresses (`<recipient>+<token>@<domain>`)
    pub mailin_recipient: String,

    /// Domain mail-in addresses live on
    pub mailin_domain: Option<String>,

    /// Port for the web server to listen on
    pub port: u16,

    /// Mailgun signing key for HMAC signature verification
    pub mailgun_signing_key: Option<String>,

    /// Maximum age in seconds for Mailgun webhook timestamps
    pub mailgun_signature_max_age: u64,

    /// Cloudflare authentication token for webhook verification
    pub cloudflare_auth_token: Option<String>,

    /// Bearer token the site presents to list a member's mail-in
    /// addresses; the listing is disabled while unset
    pub addresses_auth_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            capabilities: Capabilities::default(),
            mailin_recipient: "mailin".to_string(),
            mailin_domain: None,
            port: 8080,
            mailgun_signing_key: None,
            mailgun_signature_max_age: 300,
            cloudflare_auth_token: None,
            addresses_auth_token: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            capabilities: parse_csv("MAILIN_CAPABILITIES")
                .map(Capabilities::from_names)
                .unwrap_or(defaults.capabilities),

            mailin_recipient: env::var("MAILIN_RECIPIENT")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.mailin_recipient),

            mailin_domain: non_empty_var("MAILIN_DOMAIN"),

            port: parse_number("PORT", defaults.port),

            mailgun_signing_key: non_empty_var("MAILGUN_SIGNING_KEY"),

            mailgun_signature_max_age: parse_number(
                "MAILGUN_SIGNATURE_MAX_AGE",
                defaults.mailgun_signature_max_age,
            ),

            cloudflare_auth_token: non_empty_var("CLOUDFLARE_AUTH_TOKEN"),

            addresses_auth_token: non_empty_var("MAILIN_ADDRESSES_TOKEN"),
        }
    }
}

/// Read a variable, treating blank values as unset.
fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a numeric variable, falling back to the default on absence or error.
fn parse_number<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid numeric value, using default");
            default
        }
    }
}

/// Parse a comma-separated list of strings.
fn parse_csv(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}
