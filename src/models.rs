//! Input/output DTOs and schema-bearing types
//!
//! Defines the MCP tool input contracts (annotated with `JsonSchema` for
//! automatic schema generation), the serde mirrors of the Gmail REST
//! resources, and the message view assembled after body extraction. Every
//! wire field is optional; conversions coalesce missing values rather than
//! fail, so a sparse API response never aborts a tool call.

use chrono::{DateTime, SecondsFormat};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::mime::extract_body;

/// Validated compose request for a new draft
///
/// Produced by the tool layer after input validation, consumed by the draft
/// encoder.
#[derive(Debug, Clone)]
pub struct DraftRequest {
    /// Recipient address list as written into the `To:` header
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Plain text body
    pub body: String,
    /// Existing thread to attach the draft to
    pub thread_id: Option<String>,
    /// RFC 822 Message-ID being replied to
    pub in_reply_to: Option<String>,
}

/// Draft payload ready for the Gmail drafts endpoint
#[derive(Debug, Clone)]
pub struct EncodedMessage {
    /// Unpadded base64url encoding of the RFC 822 octets
    pub raw: String,
    /// Thread id carried alongside the raw bytes, never embedded in them
    pub thread_id: Option<String>,
}

/// Message view derived from a full Gmail resource
///
/// Assembled fresh on every fetch from the wire resource plus the body
/// extractor. Never cached or persisted.
#[derive(Debug, Clone)]
pub struct ExtractedMessage {
    /// Gmail message id
    pub id: String,
    /// Owning thread id
    pub thread_id: String,
    /// `From` header value
    pub sender: String,
    /// `To` header value
    pub recipient: String,
    /// `Subject` header value
    pub subject: String,
    /// `Date` header value, falling back to the internal receive timestamp
    pub date: String,
    /// Server-generated preview snippet
    pub snippet: String,
    /// Applied label ids
    pub labels: Vec<String>,
    /// Whether the `UNREAD` label is applied
    pub unread: bool,
    /// Body text recovered from the MIME part tree
    pub body: String,
}

impl ExtractedMessage {
    /// Build the view from a `format=full` message resource
    ///
    /// Missing headers and fields become empty strings; the body comes from
    /// the MIME part traversal.
    pub fn from_resource(resource: MessageResource) -> Self {
        let headers = resource
            .payload
            .as_ref()
            .and_then(|payload| payload.headers.as_deref())
            .unwrap_or_default();

        let sender = header_value(headers, "From").unwrap_or_default();
        let recipient = header_value(headers, "To").unwrap_or_default();
        let subject = header_value(headers, "Subject").unwrap_or_default();
        let date = header_value(headers, "Date")
            .or_else(|| internal_date_rfc3339(resource.internal_date.as_deref()))
            .unwrap_or_default();
        let body = extract_body(resource.payload.as_ref());

        let labels = resource.label_ids.unwrap_or_default();
        Self {
            id: resource.id.unwrap_or_default(),
            thread_id: resource.thread_id.unwrap_or_default(),
            sender,
            recipient,
            subject,
            date,
            snippet: resource.snippet.unwrap_or_default(),
            unread: labels.iter().any(|label| label == "UNREAD"),
            labels,
            body,
        }
    }
}

/// Account profile resource
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Authenticated account address
    pub email_address: Option<String>,
    /// Total message count
    pub messages_total: Option<u64>,
    /// Total thread count
    pub threads_total: Option<u64>,
    /// Mailbox history cursor
    pub history_id: Option<String>,
}

/// Message listing response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    /// Matching message references in listing order
    pub messages: Option<Vec<MessageRef>>,
    /// Continuation token for the next page
    pub next_page_token: Option<String>,
    /// Server estimate of the total match count
    pub result_size_estimate: Option<u64>,
}

/// Minimal message reference (listing entries, draft message stubs)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: Option<String>,
    pub thread_id: Option<String>,
}

/// Full message resource (`format=full`)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResource {
    pub id: Option<String>,
    pub thread_id: Option<String>,
    pub label_ids: Option<Vec<String>>,
    pub snippet: Option<String>,
    /// Receive timestamp in epoch milliseconds, serialized as a string
    pub internal_date: Option<String>,
    pub payload: Option<MessagePart>,
}

/// One node of the message MIME part tree
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    pub mime_type: Option<String>,
    pub filename: Option<String>,
    pub headers: Option<Vec<MessageHeader>>,
    pub body: Option<MessageBody>,
    pub parts: Option<Vec<MessagePart>>,
}

/// Single RFC 822 header carried on a MIME part
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageHeader {
    pub name: Option<String>,
    pub value: Option<String>,
}

/// Inline body of a MIME part
///
/// Large bodies arrive as an `attachment_id` reference instead of inline
/// `data`; the extractor only consumes inline data.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    pub attachment_id: Option<String>,
    pub size: Option<u64>,
    /// Base64url-encoded octets
    pub data: Option<String>,
}

/// Draft resource returned by draft creation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DraftResource {
    pub id: Option<String>,
    pub message: Option<MessageRef>,
}

/// Label resource
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: Option<String>,
    pub name: Option<String>,
    /// `system` or `user`
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message_list_visibility: Option<String>,
    pub label_list_visibility: Option<String>,
    pub messages_total: Option<u64>,
    pub messages_unread: Option<u64>,
    pub threads_total: Option<u64>,
    pub threads_unread: Option<u64>,
}

/// Label listing response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelList {
    pub labels: Option<Vec<Label>>,
}

/// Filter listing response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterList {
    /// The API returns the collection under a singular `filter` key
    pub filter: Option<Vec<Filter>>,
}

/// Filter resource
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Filter {
    pub id: Option<String>,
    pub criteria: Option<FilterCriteria>,
    pub action: Option<FilterAction>,
}

/// Matching criteria of a filter
///
/// Serialized into creation requests as well, so absent fields are skipped
/// rather than sent as nulls.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negated_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_attachment: Option<bool>,
}

/// Actions a filter applies to matching mail
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_label_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove_label_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward: Option<String>,
}

/// Input: list recent messages with typed filters
///
/// Used by `gmail_list_messages`. The filters are assembled into a Gmail
/// search expression server-side.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListMessagesInput {
    /// Maximum messages to return (1..50, default 10)
    #[serde(default = "default_max_results", alias = "maxResults")]
    pub max_results: u32,
    /// Restrict to unread messages
    #[serde(default, alias = "unreadOnly")]
    pub unread_only: bool,
    /// Filter by sender address or name
    pub from: Option<String>,
    /// Filter by recipient address or name
    pub to: Option<String>,
    /// Filter by subject text
    pub subject: Option<String>,
    /// Inbox category (`primary`, `social`, `promotions`, `updates`, `forums`)
    pub category: Option<String>,
    /// Only messages newer than this many days
    #[serde(alias = "newerThanDays")]
    pub newer_than_days: Option<u16>,
    /// Only messages older than this many days
    #[serde(alias = "olderThanDays")]
    pub older_than_days: Option<u16>,
}

/// Input: search messages with a raw Gmail query
///
/// Used by `gmail_search_messages`. The query string is passed to the API
/// verbatim (e.g. `from:alice is:unread older_than:7d`).
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchMessagesInput {
    /// Gmail search expression, passed through unchanged
    pub query: String,
    /// Maximum messages to return (1..50, default 10)
    #[serde(default = "default_max_results", alias = "maxResults")]
    pub max_results: u32,
}

/// Input: fetch one message with its decoded body
///
/// Used by `gmail_get_message`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetMessageInput {
    /// Gmail message id
    #[serde(alias = "messageId")]
    pub message_id: String,
}

/// Input: compose an unsent draft
///
/// Used by `gmail_create_draft`. Supplying `in_reply_to` adds the reply
/// headers; supplying `thread_id` files the draft on an existing thread.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateDraftInput {
    /// Recipient address list for the `To:` header
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Plain text body
    pub body: String,
    /// Existing thread to attach the draft to
    #[serde(alias = "threadId")]
    pub thread_id: Option<String>,
    /// RFC 822 Message-ID being replied to
    #[serde(alias = "inReplyTo")]
    pub in_reply_to: Option<String>,
}

/// Input: fetch one label with counts
///
/// Used by `gmail_get_label`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetLabelInput {
    /// Label id (e.g. `INBOX`, `Label_12`)
    #[serde(alias = "labelId")]
    pub label_id: String,
}

/// Input: create a user label
///
/// Used by `gmail_create_label`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateLabelInput {
    /// Display name of the new label
    pub name: String,
    /// Message list visibility (`show` or `hide`)
    #[serde(alias = "messageListVisibility")]
    pub message_list_visibility: Option<String>,
    /// Label list visibility (`labelShow`, `labelShowIfUnread`, `labelHide`)
    #[serde(alias = "labelListVisibility")]
    pub label_list_visibility: Option<String>,
}

/// Input: create a filter from criteria and actions
///
/// Used by `gmail_create_filter`. At least one criterion and one action are
/// required.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateFilterInput {
    /// Match on sender
    pub from: Option<String>,
    /// Match on recipient
    pub to: Option<String>,
    /// Match on subject text
    pub subject: Option<String>,
    /// Match on a Gmail search expression
    pub query: Option<String>,
    /// Exclude matches of a Gmail search expression
    #[serde(alias = "negatedQuery")]
    pub negated_query: Option<String>,
    /// Match only messages with attachments
    #[serde(alias = "hasAttachment")]
    pub has_attachment: Option<bool>,
    /// Label ids to apply to matching mail
    #[serde(alias = "addLabelIds")]
    pub add_label_ids: Option<Vec<String>>,
    /// Label ids to remove from matching mail
    #[serde(alias = "removeLabelIds")]
    pub remove_label_ids: Option<Vec<String>>,
    /// Address to forward matching mail to (must be a verified alias)
    pub forward: Option<String>,
}

/// Input: delete a filter by id
///
/// Used by `gmail_delete_filter`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteFilterInput {
    /// Filter id as reported by `gmail_list_filters`
    #[serde(alias = "filterId")]
    pub filter_id: String,
}

/// First header value matching the name, case-insensitive
///
/// Trims surrounding whitespace and treats blank values as absent.
pub fn header_value(headers: &[MessageHeader], target: &str) -> Option<String> {
    headers
        .iter()
        .find(|header| {
            header
                .name
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(target))
        })
        .and_then(|header| header.value.as_deref())
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Render the epoch-millisecond receive timestamp as RFC 3339
fn internal_date_rfc3339(internal_date: Option<&str>) -> Option<String> {
    let millis = internal_date?.parse::<i64>().ok()?;
    let stamp = DateTime::from_timestamp_millis(millis)?;
    Some(stamp.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Default value for `max_results` in listings
///
/// Chosen as a reasonable balance between response size and follow-up
/// round-trips. Most callers need only the first few relevant messages.
fn default_max_results() -> u32 {
    10
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builds_view_from_full_resource() {
        let resource: MessageResource = serde_json::from_value(json!({
            "id": "msg-1",
            "threadId": "thread-1",
            "labelIds": ["INBOX", "UNREAD"],
            "snippet": "preview text",
            "internalDate": "1700000000000",
            "payload": {
                "mimeType": "text/plain",
                "headers": [
                    {"name": "From", "value": " alice@example.com "},
                    {"name": "To", "value": "bob@example.com"},
                    {"name": "Subject", "value": "Greetings"},
                    {"name": "Date", "value": "Tue, 14 Nov 2023 22:13:20 +0000"}
                ],
                "body": {"data": "SGVsbG8gV29ybGQ="}
            }
        }))
        .expect("resource should deserialize");

        let view = ExtractedMessage::from_resource(resource);
        assert_eq!(view.id, "msg-1");
        assert_eq!(view.thread_id, "thread-1");
        assert_eq!(view.sender, "alice@example.com");
        assert_eq!(view.recipient, "bob@example.com");
        assert_eq!(view.subject, "Greetings");
        assert_eq!(view.date, "Tue, 14 Nov 2023 22:13:20 +0000");
        assert_eq!(view.snippet, "preview text");
        assert!(view.unread);
        assert_eq!(view.labels, vec!["INBOX", "UNREAD"]);
        assert_eq!(view.body, "Hello World");
    }

    #[test]
    fn coalesces_missing_fields_to_defaults() {
        let view = ExtractedMessage::from_resource(MessageResource::default());
        assert_eq!(view.id, "");
        assert_eq!(view.thread_id, "");
        assert_eq!(view.sender, "");
        assert_eq!(view.date, "");
        assert!(view.labels.is_empty());
        assert!(!view.unread);
        assert_eq!(view.body, "");
    }

    #[test]
    fn falls_back_to_internal_date_when_header_missing() {
        let resource: MessageResource = serde_json::from_value(json!({
            "id": "msg-2",
            "internalDate": "1700000000000"
        }))
        .expect("resource should deserialize");

        let view = ExtractedMessage::from_resource(resource);
        assert_eq!(view.date, "2023-11-14T22:13:20Z");
    }

    #[test]
    fn header_lookup_ignores_case_and_blank_values() {
        let headers = vec![
            MessageHeader {
                name: Some("subject".to_owned()),
                value: Some("  ".to_owned()),
            },
            MessageHeader {
                name: Some("SUBJECT".to_owned()),
                value: Some("Second".to_owned()),
            },
        ];

        assert_eq!(header_value(&headers, "Subject"), None);
        assert_eq!(header_value(&headers[1..], "Subject").as_deref(), Some("Second"));
    }

    #[test]
    fn list_input_accepts_camel_case_aliases() {
        let input: ListMessagesInput = serde_json::from_value(json!({
            "maxResults": 25,
            "unreadOnly": true,
            "newerThanDays": 7
        }))
        .expect("input should deserialize");

        assert_eq!(input.max_results, 25);
        assert!(input.unread_only);
        assert_eq!(input.newer_than_days, Some(7));
    }

    #[test]
    fn filter_list_uses_singular_collection_key() {
        let list: FilterList = serde_json::from_value(json!({
            "filter": [{"id": "f-1", "criteria": {"from": "alice@example.com"}}]
        }))
        .expect("filter list should deserialize");

        let filters = list.filter.unwrap_or_default();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].id.as_deref(), Some("f-1"));
    }
}
