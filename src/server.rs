//! MCP server implementation with tool handlers
//!
//! Implements the `ServerHandler` trait and registers 11 MCP tools. Handles
//! input validation, Gmail API orchestration, and text response formatting.
//! Application failures are logged and returned as error-flagged text
//! content, never as protocol errors.

use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ErrorData, ServerCapabilities, ServerInfo};
use rmcp::{ServerHandler, tool, tool_handler, tool_router};

use crate::auth::Authenticator;
use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult};
use crate::gmail::GmailClient;
use crate::mime;
use crate::models::{
    CreateDraftInput, CreateFilterInput, CreateLabelInput, DeleteFilterInput, DraftRequest,
    ExtractedMessage, Filter, FilterAction, FilterCriteria, GetLabelInput, GetMessageInput, Label,
    ListMessagesInput, Profile, SearchMessagesInput,
};

/// Maximum messages per listing or search page
const MAX_LIST_RESULTS: u32 = 50;
/// Accepted inbox categories for the listing filter
const CATEGORIES: [&str; 5] = ["primary", "social", "promotions", "updates", "forums"];
/// Accepted values for a label's message list visibility
const MESSAGE_LIST_VISIBILITY: [&str; 2] = ["show", "hide"];
/// Accepted values for a label's label list visibility
const LABEL_LIST_VISIBILITY: [&str; 3] = ["labelShow", "labelShowIfUnread", "labelHide"];

/// Gmail MCP server
///
/// Holds the shared authenticator and REST facade. Implements MCP tool
/// handlers via `#[tool]` attribute macro and `ServerHandler` trait.
#[derive(Clone)]
pub struct GmailServer {
    /// Token source shared across tool calls (refreshes lazily)
    authenticator: Arc<Authenticator>,
    /// Gmail REST facade
    client: GmailClient,
    /// Tool router for dispatching MCP tool calls
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl GmailServer {
    /// Create a new MCP server instance
    ///
    /// Builds the HTTP facade from the configured endpoint and timeouts; the
    /// authenticator is shared across all tool calls.
    pub fn new(config: &ServerConfig, authenticator: Authenticator) -> AppResult<Self> {
        let client = GmailClient::new(config)?;
        Ok(Self {
            authenticator: Arc::new(authenticator),
            client,
            tool_router: Self::tool_router(),
        })
    }

    /// Tool: Get the authorized account profile
    ///
    /// Returns the account address plus message, thread, and history
    /// counters.
    #[tool(
        name = "gmail_get_profile",
        description = "Get the authorized Gmail account profile and mailbox counts"
    )]
    async fn get_profile(&self) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool("gmail_get_profile", started, self.get_profile_impl().await)
    }

    /// Tool: List recent messages with typed filters
    ///
    /// Assembles the filters into a Gmail search expression, lists matching
    /// ids, and fetches each message in full.
    #[tool(
        name = "gmail_list_messages",
        description = "List recent messages with optional filters (unread, sender, recipient, subject, category, age)"
    )]
    async fn list_messages(
        &self,
        Parameters(input): Parameters<ListMessagesInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "gmail_list_messages",
            started,
            self.list_messages_impl(input).await,
        )
    }

    /// Tool: Search messages with a raw Gmail query
    ///
    /// The query string goes to the API verbatim, so the full Gmail search
    /// dialect is available.
    #[tool(
        name = "gmail_search_messages",
        description = "Search messages with a raw Gmail query (e.g. 'from:alice is:unread older_than:7d')"
    )]
    async fn search_messages(
        &self,
        Parameters(input): Parameters<SearchMessagesInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "gmail_search_messages",
            started,
            self.search_messages_impl(input).await,
        )
    }

    /// Tool: Fetch one message with its decoded body
    #[tool(
        name = "gmail_get_message",
        description = "Fetch one message by id with headers and decoded text body"
    )]
    async fn get_message(
        &self,
        Parameters(input): Parameters<GetMessageInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "gmail_get_message",
            started,
            self.get_message_impl(input).await,
        )
    }

    /// Tool: Create an unsent draft
    ///
    /// Optionally files the draft on an existing thread and adds reply
    /// headers when a Message-ID is supplied.
    #[tool(
        name = "gmail_create_draft",
        description = "Create an unsent draft, optionally as a reply on an existing thread"
    )]
    async fn create_draft(
        &self,
        Parameters(input): Parameters<CreateDraftInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "gmail_create_draft",
            started,
            self.create_draft_impl(input).await,
        )
    }

    /// Tool: List all labels on the account
    #[tool(
        name = "gmail_list_labels",
        description = "List all labels on the account, grouped into system and user labels"
    )]
    async fn list_labels(&self) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool("gmail_list_labels", started, self.list_labels_impl().await)
    }

    /// Tool: Get one label with its counters
    #[tool(
        name = "gmail_get_label",
        description = "Get one label by id with its message and thread counts"
    )]
    async fn get_label(
        &self,
        Parameters(input): Parameters<GetLabelInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool("gmail_get_label", started, self.get_label_impl(input).await)
    }

    /// Tool: Create a user label
    #[tool(
        name = "gmail_create_label",
        description = "Create a user label with optional visibility settings"
    )]
    async fn create_label(
        &self,
        Parameters(input): Parameters<CreateLabelInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "gmail_create_label",
            started,
            self.create_label_impl(input).await,
        )
    }

    /// Tool: List all mail filters
    #[tool(
        name = "gmail_list_filters",
        description = "List all mail filters with their criteria and actions"
    )]
    async fn list_filters(&self) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "gmail_list_filters",
            started,
            self.list_filters_impl().await,
        )
    }

    /// Tool: Create a mail filter
    ///
    /// Requires at least one matching criterion and at least one action.
    #[tool(
        name = "gmail_create_filter",
        description = "Create a mail filter from matching criteria and label/forward actions"
    )]
    async fn create_filter(
        &self,
        Parameters(input): Parameters<CreateFilterInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "gmail_create_filter",
            started,
            self.create_filter_impl(input).await,
        )
    }

    /// Tool: Delete a mail filter
    #[tool(name = "gmail_delete_filter", description = "Delete a mail filter by id")]
    async fn delete_filter(
        &self,
        Parameters(input): Parameters<DeleteFilterInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            "gmail_delete_filter",
            started,
            self.delete_filter_impl(input).await,
        )
    }
}

/// Provides server info and capabilities to MCP client.
#[tool_handler(router = self.tool_router)]
impl ServerHandler for GmailServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_instructions(
                "Gmail MCP server for a single authorized account. Sign in once with the 'auth' subcommand; tools then list and read mail, compose drafts, and manage labels and filters.",
            )
    }
}

/// Tool implementation methods
///
/// Private methods handle the actual business logic for each tool, separated
/// from the public `#[tool]` methods that handle response formatting.
impl GmailServer {
    async fn get_profile_impl(&self) -> AppResult<String> {
        let token = self.authenticator.access_token().await?;
        let profile = self.client.get_profile(&token).await?;
        Ok(format_profile(&profile))
    }

    async fn list_messages_impl(&self, input: ListMessagesInput) -> AppResult<String> {
        let query = build_gmail_query(&input)?;
        self.collect_messages(clamp_max_results(input.max_results), query.as_deref())
            .await
    }

    async fn search_messages_impl(&self, input: SearchMessagesInput) -> AppResult<String> {
        validate_query(&input.query)?;
        self.collect_messages(clamp_max_results(input.max_results), Some(&input.query))
            .await
    }

    /// List matching ids, then fetch every message concurrently
    ///
    /// Output preserves the remote listing order (newest first).
    async fn collect_messages(&self, max_results: u32, query: Option<&str>) -> AppResult<String> {
        let token = self.authenticator.access_token().await?;
        let listing = self
            .client
            .list_messages(&token, max_results, query)
            .await?;

        let refs = listing.messages.unwrap_or_default();
        let fetches = refs
            .iter()
            .filter_map(|reference| reference.id.as_deref())
            .map(|id| self.client.get_message(&token, id));
        let resources = try_join_all(fetches).await?;

        let messages = resources
            .into_iter()
            .map(ExtractedMessage::from_resource)
            .collect::<Vec<_>>();
        Ok(format_message_list(&messages))
    }

    async fn get_message_impl(&self, input: GetMessageInput) -> AppResult<String> {
        validate_resource_id(&input.message_id, "message_id")?;
        let token = self.authenticator.access_token().await?;
        let resource = self.client.get_message(&token, &input.message_id).await?;
        Ok(format_message(&ExtractedMessage::from_resource(resource)))
    }

    async fn create_draft_impl(&self, input: CreateDraftInput) -> AppResult<String> {
        let request = validate_draft_input(input)?;
        let encoded = mime::encode_draft(&request);
        let token = self.authenticator.access_token().await?;
        let draft = self.client.create_draft(&token, &encoded).await?;

        let mut text = format!(
            "Draft created with id {}",
            draft.id.as_deref().unwrap_or("unknown")
        );
        if let Some(message_id) = draft.message.as_ref().and_then(|message| message.id.as_deref())
        {
            text.push_str(&format!("\nOpen in Gmail: {}", compose_url(message_id)));
        }
        Ok(text)
    }

    async fn list_labels_impl(&self) -> AppResult<String> {
        let token = self.authenticator.access_token().await?;
        let labels = self
            .client
            .list_labels(&token)
            .await?
            .labels
            .unwrap_or_default();
        Ok(format_label_list(&labels))
    }

    async fn get_label_impl(&self, input: GetLabelInput) -> AppResult<String> {
        validate_resource_id(&input.label_id, "label_id")?;
        let token = self.authenticator.access_token().await?;
        let label = self.client.get_label(&token, &input.label_id).await?;
        Ok(format_label_detail(&label))
    }

    async fn create_label_impl(&self, input: CreateLabelInput) -> AppResult<String> {
        validate_label_input(&input)?;
        let name = input.name.trim();
        let token = self.authenticator.access_token().await?;
        let label = self
            .client
            .create_label(
                &token,
                name,
                input.message_list_visibility.as_deref(),
                input.label_list_visibility.as_deref(),
            )
            .await?;
        Ok(format!(
            "Created label '{}' with id {}",
            label.name.as_deref().unwrap_or(name),
            label.id.as_deref().unwrap_or("unknown"),
        ))
    }

    async fn list_filters_impl(&self) -> AppResult<String> {
        let token = self.authenticator.access_token().await?;
        let filters = self
            .client
            .list_filters(&token)
            .await?
            .filter
            .unwrap_or_default();
        Ok(format_filter_list(&filters))
    }

    async fn create_filter_impl(&self, input: CreateFilterInput) -> AppResult<String> {
        let (criteria, action) = validate_filter_input(input)?;
        let token = self.authenticator.access_token().await?;
        let filter = self.client.create_filter(&token, &criteria, &action).await?;
        Ok(format!(
            "Created filter {}\nCriteria: {}\nActions: {}",
            filter.id.as_deref().unwrap_or("unknown"),
            non_empty_or(describe_criteria(&criteria), "none"),
            non_empty_or(describe_action(&action), "none"),
        ))
    }

    async fn delete_filter_impl(&self, input: DeleteFilterInput) -> AppResult<String> {
        validate_resource_id(&input.filter_id, "filter_id")?;
        let token = self.authenticator.access_token().await?;
        self.client.delete_filter(&token, &input.filter_id).await?;
        Ok(format!("Deleted filter {}", input.filter_id))
    }
}

/// Calculate elapsed milliseconds
fn duration_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Convert business logic output into an MCP tool response
///
/// Failures become error-flagged text content so the calling agent always
/// receives a readable result instead of a protocol error.
fn finalize_tool(
    tool: &str,
    started: Instant,
    result: AppResult<String>,
) -> Result<CallToolResult, ErrorData> {
    match result {
        Ok(text) => {
            tracing::debug!(tool, duration_ms = duration_ms(started), "tool call completed");
            Ok(CallToolResult::success(vec![Content::text(text)]))
        }
        Err(e) => {
            tracing::warn!(
                tool,
                duration_ms = duration_ms(started),
                error = %e,
                "tool call failed"
            );
            Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
        }
    }
}

/// Compose link for a draft's backing message
fn compose_url(message_id: &str) -> String {
    format!("https://mail.google.com/mail/u/0/#drafts?compose={message_id}")
}

/// Clamp the requested page size into the accepted window
fn clamp_max_results(requested: u32) -> u32 {
    requested.clamp(1, MAX_LIST_RESULTS)
}

/// Build a Gmail search expression from typed listing filters
///
/// Returns `None` when no filter is set, so the listing stays unfiltered.
fn build_gmail_query(input: &ListMessagesInput) -> AppResult<Option<String>> {
    let mut parts = Vec::new();
    if input.unread_only {
        parts.push("is:unread".to_owned());
    }
    if let Some(v) = &input.from {
        parts.push(query_term("from", v)?);
    }
    if let Some(v) = &input.to {
        parts.push(query_term("to", v)?);
    }
    if let Some(v) = &input.subject {
        parts.push(query_term("subject", v)?);
    }
    if let Some(v) = &input.category {
        parts.push(format!("category:{}", validate_category(v)?));
    }
    if let Some(days) = input.newer_than_days {
        validate_day_window(days, "newer_than_days")?;
        parts.push(format!("newer_than:{days}d"));
    }
    if let Some(days) = input.older_than_days {
        validate_day_window(days, "older_than_days")?;
        parts.push(format!("older_than:{days}d"));
    }

    if parts.is_empty() {
        Ok(None)
    } else {
        Ok(Some(parts.join(" ")))
    }
}

/// Field term for the search expression, quoting values that contain spaces
fn query_term(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    validate_search_text(value)?;
    if value.contains('"') {
        return Err(AppError::InvalidInput(format!(
            "{field} must not contain double quotes"
        )));
    }
    if value.chars().any(char::is_whitespace) {
        Ok(format!("{field}:\"{value}\""))
    } else {
        Ok(format!("{field}:{value}"))
    }
}

/// Validate search text field bounds and characters
fn validate_search_text(input: &str) -> AppResult<()> {
    if input.is_empty() || input.len() > 256 {
        return Err(AppError::InvalidInput(
            "search text fields must be 1..256 chars".to_owned(),
        ));
    }
    validate_no_controls(input, "search text")
}

/// Validate a raw Gmail search expression
fn validate_query(query: &str) -> AppResult<()> {
    if query.is_empty() || query.len() > 1024 {
        return Err(AppError::InvalidInput(
            "query must be 1..1024 characters".to_owned(),
        ));
    }
    validate_no_controls(query, "query")
}

/// Validate and normalize an inbox category
fn validate_category(value: &str) -> AppResult<String> {
    let normalized = value.trim().to_ascii_lowercase();
    if !CATEGORIES.contains(&normalized.as_str()) {
        return Err(AppError::InvalidInput(format!(
            "category must be one of: {}",
            CATEGORIES.join(", ")
        )));
    }
    Ok(normalized)
}

/// Validate a relative day window
fn validate_day_window(days: u16, field: &str) -> AppResult<()> {
    if !(1..=3650).contains(&days) {
        return Err(AppError::InvalidInput(format!(
            "{field} must be in range 1..3650"
        )));
    }
    Ok(())
}

/// Validate a Gmail resource id (message, thread, label, or filter)
fn validate_resource_id(id: &str, field: &str) -> AppResult<()> {
    if id.is_empty() || id.len() > 128 {
        return Err(AppError::InvalidInput(format!(
            "{field} must be 1..128 characters"
        )));
    }
    if !id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
    {
        return Err(AppError::InvalidInput(format!(
            "{field} must match [A-Za-z0-9_-]+"
        )));
    }
    Ok(())
}

/// Reject control characters in user-provided values
///
/// Keeps header fields and search text free of CR/LF injection.
fn validate_no_controls(value: &str, field: &str) -> AppResult<()> {
    if value.chars().any(|ch| ch.is_ascii_control()) {
        return Err(AppError::InvalidInput(format!(
            "{field} must not contain control characters"
        )));
    }
    Ok(())
}

/// Validate compose fields and assemble a draft request
fn validate_draft_input(input: CreateDraftInput) -> AppResult<DraftRequest> {
    if input.to.trim().is_empty() {
        return Err(AppError::invalid("to must not be empty"));
    }
    if input.subject.trim().is_empty() {
        return Err(AppError::invalid("subject must not be empty"));
    }
    validate_no_controls(&input.to, "to")?;
    validate_no_controls(&input.subject, "subject")?;

    let thread_id = input.thread_id.filter(|v| !v.trim().is_empty());
    if let Some(v) = &thread_id {
        validate_resource_id(v, "thread_id")?;
    }
    let in_reply_to = input.in_reply_to.filter(|v| !v.is_empty());
    if let Some(v) = &in_reply_to {
        validate_no_controls(v, "in_reply_to")?;
    }

    Ok(DraftRequest {
        to: input.to,
        subject: input.subject,
        body: input.body,
        thread_id,
        in_reply_to,
    })
}

/// Validate label creation fields
fn validate_label_input(input: &CreateLabelInput) -> AppResult<()> {
    let name = input.name.trim();
    if name.is_empty() || name.len() > 225 {
        return Err(AppError::InvalidInput(
            "name must be 1..225 characters".to_owned(),
        ));
    }
    validate_no_controls(name, "name")?;

    if let Some(v) = &input.message_list_visibility
        && !MESSAGE_LIST_VISIBILITY.contains(&v.as_str())
    {
        return Err(AppError::InvalidInput(format!(
            "message_list_visibility must be one of: {}",
            MESSAGE_LIST_VISIBILITY.join(", ")
        )));
    }
    if let Some(v) = &input.label_list_visibility
        && !LABEL_LIST_VISIBILITY.contains(&v.as_str())
    {
        return Err(AppError::InvalidInput(format!(
            "label_list_visibility must be one of: {}",
            LABEL_LIST_VISIBILITY.join(", ")
        )));
    }
    Ok(())
}

/// Validate filter fields and assemble the criteria and action payloads
///
/// A filter must match on something and do something, so at least one
/// criterion and one action are required.
fn validate_filter_input(input: CreateFilterInput) -> AppResult<(FilterCriteria, FilterAction)> {
    for (value, field) in [
        (&input.from, "from"),
        (&input.to, "to"),
        (&input.subject, "subject"),
        (&input.query, "query"),
        (&input.negated_query, "negated_query"),
        (&input.forward, "forward"),
    ] {
        if let Some(v) = value {
            validate_no_controls(v, field)?;
        }
    }

    let criteria = FilterCriteria {
        from: clean(input.from),
        to: clean(input.to),
        subject: clean(input.subject),
        query: clean(input.query),
        negated_query: clean(input.negated_query),
        has_attachment: input.has_attachment,
    };
    let action = FilterAction {
        add_label_ids: input.add_label_ids.filter(|ids| !ids.is_empty()),
        remove_label_ids: input.remove_label_ids.filter(|ids| !ids.is_empty()),
        forward: clean(input.forward),
    };

    if let Some(ids) = &action.add_label_ids {
        for id in ids {
            validate_resource_id(id, "add_label_ids")?;
        }
    }
    if let Some(ids) = &action.remove_label_ids {
        for id in ids {
            validate_resource_id(id, "remove_label_ids")?;
        }
    }

    if criteria.from.is_none()
        && criteria.to.is_none()
        && criteria.subject.is_none()
        && criteria.query.is_none()
        && criteria.negated_query.is_none()
        && criteria.has_attachment.is_none()
    {
        return Err(AppError::invalid(
            "at least one filter criterion is required",
        ));
    }
    if action.add_label_ids.is_none()
        && action.remove_label_ids.is_none()
        && action.forward.is_none()
    {
        return Err(AppError::invalid("at least one filter action is required"));
    }
    Ok((criteria, action))
}

/// Trimmed value if non-empty
fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Profile text block
fn format_profile(profile: &Profile) -> String {
    format!(
        "Email: {}\nMessages total: {}\nThreads total: {}\nHistory id: {}",
        profile.email_address.as_deref().unwrap_or("unknown"),
        profile.messages_total.unwrap_or_default(),
        profile.threads_total.unwrap_or_default(),
        profile.history_id.as_deref().unwrap_or("unknown"),
    )
}

/// Full message text block with headers, labels, and extracted body
fn format_message(message: &ExtractedMessage) -> String {
    let mut text = format!(
        "Message ID: {}\nThread ID: {}\nSubject: {}\nFrom: {}\nTo: {}\nDate: {}\n",
        message.id,
        message.thread_id,
        message.subject,
        message.sender,
        message.recipient,
        message.date,
    );
    if !message.labels.is_empty() {
        text.push_str(&format!("Labels: {}\n", message.labels.join(", ")));
    }
    text.push('\n');
    text.push_str(&message.body);
    text
}

/// Listing text block, one entry per message
fn format_message_list(messages: &[ExtractedMessage]) -> String {
    if messages.is_empty() {
        return "No messages found.".to_owned();
    }
    let entries = messages
        .iter()
        .map(format_message_entry)
        .collect::<Vec<_>>()
        .join("\n");
    format!("Found {} message(s):\n\n{entries}", messages.len())
}

fn format_message_entry(message: &ExtractedMessage) -> String {
    let marker = if message.unread { " (unread)" } else { "" };
    format!(
        "ID: {}\nFrom: {}\nSubject: {}{marker}\nDate: {}\nSnippet: {}\n",
        message.id, message.sender, message.subject, message.date, message.snippet,
    )
}

/// Label listing grouped into system and user labels
fn format_label_list(labels: &[Label]) -> String {
    if labels.is_empty() {
        return "No labels found.".to_owned();
    }
    let (system, user): (Vec<&Label>, Vec<&Label>) = labels
        .iter()
        .partition(|label| label.kind.as_deref() == Some("system"));

    let mut text = format!(
        "Found {} label(s) ({} system, {} user):\n",
        labels.len(),
        system.len(),
        user.len()
    );
    if !system.is_empty() {
        text.push_str("\nSystem labels:\n");
        for label in &system {
            text.push_str(&format_label_entry(label));
        }
    }
    if !user.is_empty() {
        text.push_str("\nUser labels:\n");
        for label in &user {
            text.push_str(&format_label_entry(label));
        }
    }
    text
}

fn format_label_entry(label: &Label) -> String {
    format!(
        "- {} ({})\n",
        label.name.as_deref().unwrap_or("unnamed"),
        label.id.as_deref().unwrap_or("?"),
    )
}

/// Single label text block with counters
fn format_label_detail(label: &Label) -> String {
    format!(
        "ID: {}\nName: {}\nType: {}\nMessages: {} total, {} unread\nThreads: {} total, {} unread",
        label.id.as_deref().unwrap_or("unknown"),
        label.name.as_deref().unwrap_or("unknown"),
        label.kind.as_deref().unwrap_or("unknown"),
        label.messages_total.unwrap_or_default(),
        label.messages_unread.unwrap_or_default(),
        label.threads_total.unwrap_or_default(),
        label.threads_unread.unwrap_or_default(),
    )
}

/// Filter listing text block
fn format_filter_list(filters: &[Filter]) -> String {
    if filters.is_empty() {
        return "No filters found.".to_owned();
    }
    let entries = filters
        .iter()
        .map(format_filter_entry)
        .collect::<Vec<_>>()
        .join("\n");
    format!("Found {} filter(s):\n\n{entries}", filters.len())
}

fn format_filter_entry(filter: &Filter) -> String {
    let criteria = filter
        .criteria
        .as_ref()
        .map(describe_criteria)
        .unwrap_or_default();
    let action = filter
        .action
        .as_ref()
        .map(describe_action)
        .unwrap_or_default();
    format!(
        "ID: {}\nCriteria: {}\nActions: {}\n",
        filter.id.as_deref().unwrap_or("?"),
        non_empty_or(criteria, "none"),
        non_empty_or(action, "none"),
    )
}

/// One-line summary of filter matching criteria
fn describe_criteria(criteria: &FilterCriteria) -> String {
    let mut parts = Vec::new();
    if let Some(v) = &criteria.from {
        parts.push(format!("from: {v}"));
    }
    if let Some(v) = &criteria.to {
        parts.push(format!("to: {v}"));
    }
    if let Some(v) = &criteria.subject {
        parts.push(format!("subject: {v}"));
    }
    if let Some(v) = &criteria.query {
        parts.push(format!("query: {v}"));
    }
    if let Some(v) = &criteria.negated_query {
        parts.push(format!("not matching: {v}"));
    }
    if criteria.has_attachment == Some(true) {
        parts.push("has attachment".to_owned());
    }
    parts.join(", ")
}

/// One-line summary of filter actions
fn describe_action(action: &FilterAction) -> String {
    let mut parts = Vec::new();
    if let Some(ids) = &action.add_label_ids
        && !ids.is_empty()
    {
        parts.push(format!("add labels {}", ids.join(", ")));
    }
    if let Some(ids) = &action.remove_label_ids
        && !ids.is_empty()
    {
        parts.push(format!("remove labels {}", ids.join(", ")));
    }
    if let Some(forward) = &action.forward {
        parts.push(format!("forward to {forward}"));
    }
    parts.join("; ")
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_owned()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing_input() -> ListMessagesInput {
        ListMessagesInput {
            max_results: 10,
            unread_only: false,
            from: None,
            to: None,
            subject: None,
            category: None,
            newer_than_days: None,
            older_than_days: None,
        }
    }

    fn message(id: &str, unread: bool) -> ExtractedMessage {
        ExtractedMessage {
            id: id.to_owned(),
            thread_id: format!("thread-{id}"),
            sender: "alice@example.com".to_owned(),
            recipient: "bob@example.com".to_owned(),
            subject: "Weekly report".to_owned(),
            date: "Tue, 14 Nov 2023 22:13:20 +0000".to_owned(),
            snippet: "Numbers attached".to_owned(),
            labels: vec!["INBOX".to_owned()],
            unread,
            body: "Hello".to_owned(),
        }
    }

    fn label(id: &str, name: &str, kind: &str) -> Label {
        Label {
            id: Some(id.to_owned()),
            name: Some(name.to_owned()),
            kind: Some(kind.to_owned()),
            ..Label::default()
        }
    }

    #[test]
    fn query_builder_assembles_all_filters() {
        let input = ListMessagesInput {
            unread_only: true,
            from: Some("alice@example.com".to_owned()),
            to: Some("bob@example.com".to_owned()),
            subject: Some("weekly report".to_owned()),
            category: Some("Primary".to_owned()),
            newer_than_days: Some(7),
            older_than_days: Some(30),
            ..listing_input()
        };
        let query = build_gmail_query(&input).unwrap().unwrap();
        assert_eq!(
            query,
            "is:unread from:alice@example.com to:bob@example.com subject:\"weekly report\" category:primary newer_than:7d older_than:30d"
        );
    }

    #[test]
    fn query_builder_returns_none_without_filters() {
        assert!(build_gmail_query(&listing_input()).unwrap().is_none());
    }

    #[test]
    fn query_builder_rejects_unknown_categories() {
        let input = ListMessagesInput {
            category: Some("spam".to_owned()),
            ..listing_input()
        };
        let err = build_gmail_query(&input).expect_err("category should be rejected");
        assert!(err.to_string().contains("category"));
    }

    #[test]
    fn query_terms_quote_spaced_values_and_reject_quotes() {
        assert_eq!(
            query_term("from", "ann smith").unwrap(),
            "from:\"ann smith\""
        );
        assert_eq!(query_term("from", "ann").unwrap(), "from:ann");
        let err = query_term("from", "ann\"smith").expect_err("quote should be rejected");
        assert!(err.to_string().contains("double quotes"));
    }

    #[test]
    fn raw_queries_are_bounded_and_control_free() {
        validate_query("from:alice is:unread").unwrap();
        validate_query("").expect_err("empty query should be rejected");
        let err = validate_query("evil\r\nquery").expect_err("controls should be rejected");
        assert!(err.to_string().contains("control"));
    }

    #[test]
    fn max_results_clamps_into_the_accepted_window() {
        assert_eq!(clamp_max_results(0), 1);
        assert_eq!(clamp_max_results(10), 10);
        assert_eq!(clamp_max_results(500), MAX_LIST_RESULTS);
    }

    #[test]
    fn resource_ids_reject_path_characters() {
        validate_resource_id("18c2f9d8a1b4e0f7", "message_id").unwrap();
        validate_resource_id("Label_12", "label_id").unwrap();
        let err = validate_resource_id("../secrets", "message_id")
            .expect_err("separator should be rejected");
        assert!(err.to_string().contains("message_id"));
        validate_resource_id("", "label_id").expect_err("empty id should be rejected");
    }

    #[test]
    fn draft_validation_requires_recipient_and_subject() {
        let input = CreateDraftInput {
            to: "  ".to_owned(),
            subject: "Hi".to_owned(),
            body: "Body".to_owned(),
            thread_id: None,
            in_reply_to: None,
        };
        let err = validate_draft_input(input).expect_err("blank recipient should be rejected");
        assert!(err.to_string().contains("to"));

        let input = CreateDraftInput {
            to: "bob@example.com".to_owned(),
            subject: String::new(),
            body: "Body".to_owned(),
            thread_id: None,
            in_reply_to: None,
        };
        let err = validate_draft_input(input).expect_err("blank subject should be rejected");
        assert!(err.to_string().contains("subject"));
    }

    #[test]
    fn draft_validation_rejects_header_injection() {
        let input = CreateDraftInput {
            to: "victim@example.com\r\nBcc: attacker@example.com".to_owned(),
            subject: "Hi".to_owned(),
            body: "Body".to_owned(),
            thread_id: None,
            in_reply_to: None,
        };
        let err = validate_draft_input(input).expect_err("injected header should be rejected");
        assert!(err.to_string().contains("control"));
    }

    #[test]
    fn draft_validation_drops_blank_optional_fields() {
        let input = CreateDraftInput {
            to: "bob@example.com".to_owned(),
            subject: "Hi".to_owned(),
            body: "Body".to_owned(),
            thread_id: Some("   ".to_owned()),
            in_reply_to: Some(String::new()),
        };
        let request = validate_draft_input(input).unwrap();
        assert!(request.thread_id.is_none());
        assert!(request.in_reply_to.is_none());
    }

    #[test]
    fn filter_validation_requires_criteria_and_action() {
        let input = CreateFilterInput {
            from: None,
            to: None,
            subject: None,
            query: None,
            negated_query: None,
            has_attachment: None,
            add_label_ids: Some(vec!["TRASH".to_owned()]),
            remove_label_ids: None,
            forward: None,
        };
        let err = validate_filter_input(input).expect_err("missing criteria should be rejected");
        assert!(err.to_string().contains("criterion"));

        let input = CreateFilterInput {
            from: Some("news@example.com".to_owned()),
            to: None,
            subject: None,
            query: None,
            negated_query: None,
            has_attachment: None,
            add_label_ids: Some(Vec::new()),
            remove_label_ids: None,
            forward: None,
        };
        let err = validate_filter_input(input).expect_err("missing action should be rejected");
        assert!(err.to_string().contains("action"));
    }

    #[test]
    fn filter_validation_trims_and_assembles_payloads() {
        let input = CreateFilterInput {
            from: Some("  news@example.com  ".to_owned()),
            to: None,
            subject: None,
            query: None,
            negated_query: None,
            has_attachment: Some(true),
            add_label_ids: Some(vec!["Label_7".to_owned()]),
            remove_label_ids: None,
            forward: None,
        };
        let (criteria, action) = validate_filter_input(input).unwrap();
        assert_eq!(criteria.from.as_deref(), Some("news@example.com"));
        assert_eq!(criteria.has_attachment, Some(true));
        assert_eq!(
            action.add_label_ids.as_deref(),
            Some(&["Label_7".to_owned()][..])
        );
    }

    #[test]
    fn label_visibility_values_are_checked() {
        let input = CreateLabelInput {
            name: "Receipts".to_owned(),
            message_list_visibility: Some("visible".to_owned()),
            label_list_visibility: None,
        };
        let err = validate_label_input(&input).expect_err("unknown visibility should be rejected");
        assert!(err.to_string().contains("message_list_visibility"));

        let input = CreateLabelInput {
            name: "Receipts".to_owned(),
            message_list_visibility: Some("show".to_owned()),
            label_list_visibility: Some("labelShowIfUnread".to_owned()),
        };
        validate_label_input(&input).unwrap();
    }

    #[test]
    fn compose_url_embeds_the_message_id() {
        assert_eq!(
            compose_url("18c2f9d8a1b4e0f7"),
            "https://mail.google.com/mail/u/0/#drafts?compose=18c2f9d8a1b4e0f7"
        );
    }

    #[test]
    fn message_block_carries_headers_labels_and_body() {
        let text = format_message(&message("m1", false));
        assert!(text.starts_with("Message ID: m1\nThread ID: thread-m1\n"));
        assert!(text.contains("Labels: INBOX\n"));
        assert!(text.ends_with("\n\nHello"));
    }

    #[test]
    fn listing_counts_entries_and_marks_unread() {
        let text = format_message_list(&[message("m1", true), message("m2", false)]);
        assert!(text.starts_with("Found 2 message(s):\n\n"));
        assert!(text.contains("Subject: Weekly report (unread)\n"));
        let first = text.find("ID: m1").unwrap();
        let second = text.find("ID: m2").unwrap();
        assert!(first < second);
    }

    #[test]
    fn empty_listing_reports_no_matches() {
        assert_eq!(format_message_list(&[]), "No messages found.");
    }

    #[test]
    fn labels_group_by_type_with_counts() {
        let labels = vec![
            label("INBOX", "INBOX", "system"),
            label("Label_7", "Receipts", "user"),
        ];
        let text = format_label_list(&labels);
        assert!(text.starts_with("Found 2 label(s) (1 system, 1 user):\n"));
        let system = text.find("System labels:\n- INBOX (INBOX)").unwrap();
        let user = text.find("User labels:\n- Receipts (Label_7)").unwrap();
        assert!(system < user);
    }

    #[test]
    fn filters_describe_criteria_and_actions() {
        let filter = Filter {
            id: Some("flt-1".to_owned()),
            criteria: Some(FilterCriteria {
                from: Some("news@example.com".to_owned()),
                has_attachment: Some(true),
                ..FilterCriteria::default()
            }),
            action: Some(FilterAction {
                add_label_ids: Some(vec!["Label_7".to_owned()]),
                forward: Some("archive@example.com".to_owned()),
                ..FilterAction::default()
            }),
        };
        let text = format_filter_entry(&filter);
        assert_eq!(
            text,
            "ID: flt-1\nCriteria: from: news@example.com, has attachment\nActions: add labels Label_7; forward to archive@example.com\n"
        );
    }

    #[test]
    fn bare_filters_fall_back_to_none_markers() {
        let text = format_filter_entry(&Filter::default());
        assert_eq!(text, "ID: ?\nCriteria: none\nActions: none\n");
    }
}
