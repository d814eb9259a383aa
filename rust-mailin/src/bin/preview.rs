//! Mailin Preview - show how a raw email would be read.
//!
//! Parses an RFC 5322 message (file argument or stdin) and prints, for every
//! enabled content type whose subject label matches, the fields extracted
//! from the body. Nothing is created.
//!
//! ```text
//! mailin-preview message.eml
//! cat message.eml | mailin-preview
//! ```

use std::io::Read;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mailin::parser::{self, FieldMap};
use mailin::process::parse_raw_email;
use mailin::{Config, TypeRegistry};

#[derive(Serialize)]
struct Preview<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    fields: FieldMap,
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout stays clean JSON
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true).with_writer(std::io::stderr))
        .init();

    let raw = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read stdin")?;
            buffer
        }
    };

    let email = parse_raw_email(&raw).context("Failed to parse email")?;
    let subject = email.subject.unwrap_or_default();
    let text = email.text.unwrap_or_default();

    let config = Config::from_env();
    let types = TypeRegistry::build(&config.capabilities, &[]);

    info!(
        subject = %subject,
        types = ?types.names().collect::<Vec<_>>(),
        "preview_start"
    );

    let previews: Vec<Preview> = types
        .iter()
        .filter_map(|descriptor| {
            parser::parse(&subject, &text, descriptor).map(|fields| Preview {
                content_type: descriptor.name(),
                fields,
            })
        })
        .collect();

    info!(matched = previews.len(), "preview_complete");

    println!(
        "{}",
        serde_json::to_string_pretty(&previews).context("Failed to serialize preview")?
    );

    Ok(())
}
