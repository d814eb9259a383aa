//! Plain text extraction from HTML mail bodies.

use scraper::{Html, Node};
use tracing::debug;

/// Elements that start a new line in the extracted text.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "blockquote", "br", "dd", "div", "dl", "dt", "footer", "h1", "h2",
    "h3", "h4", "h5", "h6", "header", "hr", "li", "ol", "p", "pre", "section", "table", "tr",
    "ul",
];

/// Elements whose text is never shown.
const HIDDEN_ELEMENTS: &[&str] = &["head", "script", "style", "template"];

/// Extract readable text from an HTML document.
///
/// Block elements and `<br>` become line breaks, runs of whitespace inside
/// text collapse to one space, and each line is trimmed. This keeps
/// `LABEL: value` lines of an HTML-only mail on separate lines.
pub fn text_content(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();

    for node in document.root_element().descendants() {
        match node.value() {
            Node::Element(element) => {
                if BLOCK_ELEMENTS.contains(&element.name()) {
                    raw.push('\n');
                }
            }
            Node::Text(text) => {
                let hidden = node.ancestors().any(|ancestor| {
                    ancestor
                        .value()
                        .as_element()
                        .map(|e| HIDDEN_ELEMENTS.contains(&e.name()))
                        .unwrap_or(false)
                });
                if !hidden {
                    push_collapsed(&mut raw, text);
                }
            }
            _ => {}
        }
    }

    let lines: Vec<&str> = raw.lines().map(str::trim).collect();
    let text = lines.join("\n").trim().to_string();

    debug!(
        html_length = html.len(),
        text_length = text.len(),
        "html_text_extracted"
    );

    text
}

/// Append text with whitespace runs collapsed to a single space.
fn push_collapsed(out: &mut String, text: &str) {
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(c);
            in_space = false;
        }
    }
}
