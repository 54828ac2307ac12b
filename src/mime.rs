//! Gmail payload decoding and draft encoding
//!
//! Walks the MIME part tree returned by the Gmail API to recover readable
//! body text, with an HTML-stripping fallback, and builds the base64url
//! RFC 822 payload accepted by the drafts endpoint. Both routines are total:
//! malformed input degrades to an empty string rather than an error.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use regex::Regex;

use crate::models::{DraftRequest, EncodedMessage, MessagePart};

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));
static WHITESPACE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Extract readable body text from a MIME part tree
///
/// Depth-first, earliest-match traversal: a `text/plain` part with inline
/// data wins outright, a `text/html` part is stripped to text, and otherwise
/// child parts are visited in document order until one yields a non-empty
/// result. A plain or HTML part that carries data short-circuits even when
/// decoding produces an empty string, so sibling order decides which
/// alternative is used.
///
/// Returns an empty string when the tree is absent or holds no inline text.
pub fn extract_body(part: Option<&MessagePart>) -> String {
    let Some(part) = part else {
        return String::new();
    };

    let mime_type = part.mime_type.as_deref().unwrap_or_default();
    let data = part
        .body
        .as_ref()
        .and_then(|body| body.data.as_deref())
        .filter(|data| !data.is_empty());

    if mime_type == "text/plain"
        && let Some(data) = data
    {
        return decode_base64_text(data);
    }

    if mime_type == "text/html"
        && let Some(data) = data
    {
        return html_to_text(&decode_base64_text(data));
    }

    if let Some(children) = &part.parts {
        for child in children {
            let text = extract_body(Some(child));
            if !text.is_empty() {
                return text;
            }
        }
    }

    String::new()
}

/// Build the draft payload for a compose request
///
/// Assembles the RFC 822 headers (`To`, `Subject`, `Content-Type`, plus
/// `In-Reply-To`/`References` when replying to a specific message), joins
/// them with CRLF, appends the body after a blank line, and encodes the
/// whole octet sequence as unpadded base64url. The thread id is carried
/// alongside the encoded bytes, never embedded in them.
pub fn encode_draft(request: &DraftRequest) -> EncodedMessage {
    let mut headers = vec![
        format!("To: {}", request.to),
        format!("Subject: {}", request.subject),
        "Content-Type: text/plain; charset=utf-8".to_owned(),
    ];

    if let Some(reply_to) = request.in_reply_to.as_deref().filter(|v| !v.is_empty()) {
        headers.push(format!("In-Reply-To: {reply_to}"));
        headers.push(format!("References: {reply_to}"));
    }

    let message = format!("{}\r\n\r\n{}", headers.join("\r\n"), request.body);

    EncodedMessage {
        raw: URL_SAFE_NO_PAD.encode(message.as_bytes()),
        thread_id: request.thread_id.clone(),
    }
}

/// Decode base64 body data leniently
///
/// Gmail emits the URL-safe alphabet, but stored fixtures and other
/// producers use the standard one, so both are accepted with or without
/// padding. Undecodable input yields an empty string and invalid UTF-8 is
/// replaced rather than rejected.
fn decode_base64_text(data: &str) -> String {
    let bytes = URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .or_else(|_| STANDARD.decode(data))
        .unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Reduce an HTML fragment to plain text
///
/// Drops every angle-bracket-delimited tag, collapses whitespace runs to a
/// single space, and trims the ends.
fn html_to_text(html: &str) -> String {
    let stripped = TAG_PATTERN.replace_all(html, "");
    WHITESPACE_PATTERN
        .replace_all(&stripped, " ")
        .trim()
        .to_owned()
}
