//! Gmail REST client facade
//!
//! Thin typed wrappers over the handful of Gmail v1 endpoints the tools
//! call. Each wrapper issues one bearer-authenticated request, maps non-2xx
//! statuses onto the application error model, and deserializes into the
//! optional-field wire structs. No retries, no caching, no pagination state.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{
    DraftResource, EncodedMessage, Filter, FilterAction, FilterCriteria, FilterList, Label,
    LabelList, MessageList, MessageResource, Profile,
};

/// Typed Gmail v1 client bound to the configured base URL
///
/// The base URL is injectable through configuration so tests can point the
/// client at a local mock server.
#[derive(Debug, Clone)]
pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
}

impl GmailClient {
    /// Build a client with the configured connect/request timeouts
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the underlying HTTP client cannot be built.
    pub fn new(config: &ServerConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("cannot build http client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.clone(),
        })
    }

    /// Fetch the account profile
    pub async fn get_profile(&self, access_token: &str) -> AppResult<Profile> {
        self.get_json(access_token, "/gmail/v1/users/me/profile", &[])
            .await
    }

    /// List message references matching an optional search expression
    ///
    /// Results arrive newest first; the expression uses the Gmail search
    /// dialect and is passed through verbatim.
    pub async fn list_messages(
        &self,
        access_token: &str,
        max_results: u32,
        query: Option<&str>,
    ) -> AppResult<MessageList> {
        let mut params = vec![("maxResults", max_results.to_string())];
        if let Some(query) = query.filter(|q| !q.trim().is_empty()) {
            params.push(("q", query.to_owned()));
        }

        self.get_json(access_token, "/gmail/v1/users/me/messages", &params)
            .await
    }

    /// Fetch one message with its full MIME part tree
    pub async fn get_message(
        &self,
        access_token: &str,
        message_id: &str,
    ) -> AppResult<MessageResource> {
        let endpoint = format!("/gmail/v1/users/me/messages/{message_id}");
        self.get_json(access_token, &endpoint, &[("format", "full".to_owned())])
            .await
    }

    /// Create an unsent draft from an encoded payload
    ///
    /// The thread id travels next to the raw bytes in the request body, per
    /// the drafts endpoint contract.
    pub async fn create_draft(
        &self,
        access_token: &str,
        encoded: &EncodedMessage,
    ) -> AppResult<DraftResource> {
        let body = DraftCreateRequest {
            message: DraftCreateMessage {
                raw: encoded.raw.clone(),
                thread_id: encoded.thread_id.clone(),
            },
        };

        self.post_json(access_token, "/gmail/v1/users/me/drafts", &body)
            .await
    }

    /// List all labels on the account
    pub async fn list_labels(&self, access_token: &str) -> AppResult<LabelList> {
        self.get_json(access_token, "/gmail/v1/users/me/labels", &[])
            .await
    }

    /// Fetch one label with its message and thread counts
    pub async fn get_label(&self, access_token: &str, label_id: &str) -> AppResult<Label> {
        let endpoint = format!("/gmail/v1/users/me/labels/{label_id}");
        self.get_json(access_token, &endpoint, &[]).await
    }

    /// Create a user label
    pub async fn create_label(
        &self,
        access_token: &str,
        name: &str,
        message_list_visibility: Option<&str>,
        label_list_visibility: Option<&str>,
    ) -> AppResult<Label> {
        let body = LabelCreateRequest {
            name: name.to_owned(),
            message_list_visibility: message_list_visibility.map(ToOwned::to_owned),
            label_list_visibility: label_list_visibility.map(ToOwned::to_owned),
        };

        self.post_json(access_token, "/gmail/v1/users/me/labels", &body)
            .await
    }

    /// List all filters on the account
    pub async fn list_filters(&self, access_token: &str) -> AppResult<FilterList> {
        self.get_json(access_token, "/gmail/v1/users/me/settings/filters", &[])
            .await
    }

    /// Create a filter from criteria and actions
    pub async fn create_filter(
        &self,
        access_token: &str,
        criteria: &FilterCriteria,
        action: &FilterAction,
    ) -> AppResult<Filter> {
        let body = FilterCreateRequest { criteria, action };
        self.post_json(access_token, "/gmail/v1/users/me/settings/filters", &body)
            .await
    }

    /// Delete a filter by id
    pub async fn delete_filter(&self, access_token: &str, filter_id: &str) -> AppResult<()> {
        let endpoint = format!("/gmail/v1/users/me/settings/filters/{filter_id}");
        let url = self.endpoint_url(&endpoint)?;
        let response = self
            .http
            .delete(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(map_api_error(status, &body))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        access_token: &str,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> AppResult<T> {
        let url = self.endpoint_url(endpoint)?;
        let mut request = self.http.get(url).bearer_auth(access_token);
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request.send().await.map_err(map_send_error)?;
        parse_json_response(response).await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        access_token: &str,
        endpoint: &str,
        body: &B,
    ) -> AppResult<T> {
        let url = self.endpoint_url(endpoint)?;
        let response = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await
            .map_err(map_send_error)?;

        parse_json_response(response).await
    }

    fn endpoint_url(&self, endpoint: &str) -> AppResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| AppError::Internal(format!("invalid api base url: {e}")))?;
        url.set_path(endpoint.trim_start_matches('/'));
        Ok(url)
    }
}

#[derive(Debug, Serialize)]
struct DraftCreateRequest {
    message: DraftCreateMessage,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DraftCreateMessage {
    raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LabelCreateRequest {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_list_visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    label_list_visibility: Option<String>,
}

#[derive(Debug, Serialize)]
struct FilterCreateRequest<'a> {
    criteria: &'a FilterCriteria,
    action: &'a FilterAction,
}

#[derive(Debug, serde::Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, serde::Deserialize)]
struct ApiError {
    code: Option<u16>,
    status: Option<String>,
    message: Option<String>,
    errors: Option<Vec<ApiErrorDetail>>,
}

#[derive(Debug, serde::Deserialize)]
struct ApiErrorDetail {
    reason: Option<String>,
}

async fn parse_json_response<T: DeserializeOwned>(response: reqwest::Response) -> AppResult<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("gmail api returned unreadable JSON: {e}")));
    }

    let body = response.text().await.unwrap_or_default();
    Err(map_api_error(status, &body))
}

/// Map transport failures onto the application error model
fn map_send_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(format!("gmail api request timed out: {e}"))
    } else {
        AppError::Internal(format!("gmail api request failed: {e}"))
    }
}

/// Map a non-2xx status and error envelope onto the application error model
///
/// 401/403 surface as authentication failures so the caller knows to re-run
/// the auth flow; 404 keeps its identity for messages, labels, and filters
/// addressed by id.
fn map_api_error(status: StatusCode, body: &str) -> AppError {
    let message = parse_api_error_message(body).unwrap_or_else(|| {
        let body = body.trim();
        if body.is_empty() {
            "no error details in response body".to_owned()
        } else {
            body.to_owned()
        }
    });

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return AppError::AuthFailed(format!(
            "gmail api authorization failed ({status}): {message}; re-run the auth subcommand if this persists"
        ));
    }

    if status == StatusCode::NOT_FOUND {
        return AppError::NotFound(format!("gmail resource not found: {message}"));
    }

    AppError::Upstream(format!("gmail api request failed ({status}): {message}"))
}

/// Condense the Gmail error envelope into one line
fn parse_api_error_message(body: &str) -> Option<String> {
    let envelope = serde_json::from_str::<ApiErrorEnvelope>(body).ok()?;
    let mut parts = Vec::new();

    if let Some(message) = envelope.error.message {
        parts.push(message);
    }

    if let Some(status) = envelope.error.status {
        parts.push(format!("status={status}"));
    }

    if let Some(code) = envelope.error.code {
        parts.push(format!("code={code}"));
    }

    if let Some(reason) = envelope
        .error
        .errors
        .and_then(|errors| errors.into_iter().find_map(|detail| detail.reason))
    {
        parts.push(format!("reason={reason}"));
    }

    if parts.is_empty() {
        return None;
    }

    Some(parts.join(", "))
}
