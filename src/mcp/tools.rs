//! MCP Tool definitions and handlers
//!
//! Defines all available tools and their implementations. Argument structs
//! double as the source of each tool's input schema.

use std::sync::Arc;

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use validator::Validate;

use crate::config::Config;
use crate::error::{McpError, Result, ValidationError};
use crate::google::api::{str_field, ApiClient, Credentials};
use crate::google::auth::{extract_auth_code, Authenticator};
use crate::google::calendar::{parse_rfc3339, AttendeeUpdate, EventChanges, NewEvent};
use crate::google::gmail::ComposeParams;
use crate::google::people::ContactFields;
use crate::google::{CalendarService, GmailService, PeopleService};
use crate::mcp::types::{CallToolResult, Tool};

fn default_max_results() -> i64 {
    100
}

fn default_contacts_page_size() -> i64 {
    100
}

fn default_search_page_size() -> i64 {
    10
}

fn default_true() -> bool {
    true
}

// ==================== Tool Arguments ====================

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct ListMessagesArgs {
    /// Gmail search query (e.g., 'from:me is:unread')
    #[serde(default)]
    pub query: String,

    /// Maximum number of messages to return (default: 100)
    #[serde(default = "default_max_results")]
    #[validate(range(min = 1))]
    pub max_results: i64,

    /// When true, fetches full message details (from, subject, snippet, date).
    /// When false/omitted, returns only message IDs.
    #[serde(default)]
    pub hydrate: bool,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct MessageIdArgs {
    /// The message ID
    #[validate(length(min = 1))]
    pub message_id: String,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct ComposeArgs {
    /// Recipient email address
    pub to: String,

    /// Email subject (auto-prefixed with Re: for replies)
    pub subject: String,

    /// Email body content; HTML is detected automatically
    pub body: String,

    /// Message ID to reply to (auto-fetches threading headers)
    #[serde(default)]
    pub in_reply_to: Option<String>,

    /// Carbon copy recipients
    #[serde(default)]
    pub cc: Option<String>,

    /// Blind carbon copy recipients
    #[serde(default)]
    pub bcc: Option<String>,
}

impl From<ComposeArgs> for ComposeParams {
    fn from(args: ComposeArgs) -> Self {
        ComposeParams {
            to: args.to,
            subject: args.subject,
            body: args.body,
            in_reply_to: args.in_reply_to,
            cc: args.cc.unwrap_or_default(),
            bcc: args.bcc.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct DraftIdArgs {
    /// The draft ID to send
    #[validate(length(min = 1))]
    pub draft_id: String,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct ModifyLabelsArgs {
    /// The message ID to modify
    #[validate(length(min = 1))]
    pub message_id: String,

    /// Label IDs to add (e.g., STARRED, IMPORTANT)
    #[serde(default)]
    pub add_labels: Vec<String>,

    /// Label IDs to remove (e.g., UNREAD, INBOX)
    #[serde(default)]
    pub remove_labels: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CreateLabelArgs {
    /// Display name of the new label
    #[validate(length(min = 1))]
    pub name: String,

    /// Message list visibility: show or hide
    #[serde(default)]
    pub message_list_visibility: Option<String>,

    /// Label list visibility: labelShow, labelShowIfUnread or labelHide
    #[serde(default)]
    pub label_list_visibility: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct ListEventsArgs {
    /// Maximum number of events to return (default: 100)
    #[serde(default = "default_max_results")]
    #[validate(range(min = 1))]
    pub max_results: i64,

    /// RFC3339 timestamp for earliest event
    #[serde(default)]
    pub time_min: Option<String>,

    /// RFC3339 timestamp for latest event
    #[serde(default)]
    pub time_max: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct EventIdArgs {
    /// The event ID
    #[validate(length(min = 1))]
    pub event_id: String,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CreateEventArgs {
    /// Event title/summary
    pub summary: String,

    /// Event description
    #[serde(default)]
    pub description: String,

    /// Start time in RFC3339 format
    pub start_time: String,

    /// End time in RFC3339 format
    pub end_time: String,

    /// Email addresses of required attendees
    #[serde(default)]
    pub attendees: Vec<String>,

    /// Email addresses of optional attendees
    #[serde(default)]
    pub optional_attendees: Vec<String>,

    /// Send invite emails to attendees (default: true)
    #[serde(default = "default_true")]
    pub send_notifications: bool,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct UpdateEventArgs {
    /// The event ID to update
    #[validate(length(min = 1))]
    pub event_id: String,

    /// New event title/summary
    #[serde(default)]
    pub summary: Option<String>,

    /// New event description
    #[serde(default)]
    pub description: Option<String>,

    /// New start time in RFC3339 format
    #[serde(default)]
    pub start_time: Option<String>,

    /// New end time in RFC3339 format
    #[serde(default)]
    pub end_time: Option<String>,

    /// Full replacement - replaces ALL required attendees
    #[serde(default)]
    pub attendees: Option<Vec<String>>,

    /// Full replacement - replaces ALL optional attendees
    #[serde(default)]
    pub optional_attendees: Option<Vec<String>>,

    /// Incremental - add as required attendees
    #[serde(default)]
    pub add_attendees: Option<Vec<String>>,

    /// Incremental - add as optional attendees
    #[serde(default)]
    pub add_optional_attendees: Option<Vec<String>>,

    /// Incremental - remove by email
    #[serde(default)]
    pub remove_attendees: Option<Vec<String>>,

    /// Send update emails (default: true)
    #[serde(default = "default_true")]
    pub send_notifications: bool,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct ListContactsArgs {
    /// Maximum number of contacts to return (default: 100)
    #[serde(default = "default_contacts_page_size")]
    #[validate(range(min = 1))]
    pub page_size: i64,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct SearchContactsArgs {
    /// Search query (name, email, phone, etc)
    #[validate(length(min = 1))]
    pub query: String,

    /// Maximum number of results (default: 10)
    #[serde(default = "default_search_page_size")]
    #[validate(range(min = 1))]
    pub page_size: i64,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct ResourceNameArgs {
    /// Resource name of the person (e.g., people/12345)
    #[validate(length(min = 1))]
    pub resource_name: String,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CreateContactArgs {
    /// First name
    pub given_name: String,

    /// Last name
    #[serde(default)]
    pub family_name: Option<String>,

    /// Email address
    #[serde(default)]
    pub email: Option<String>,

    /// Phone number
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct UpdateContactArgs {
    /// Resource name of the person (e.g., people/12345)
    #[validate(length(min = 1))]
    pub resource_name: String,

    /// First name
    #[serde(default)]
    pub given_name: Option<String>,

    /// Last name
    #[serde(default)]
    pub family_name: Option<String>,

    /// Email address
    #[serde(default)]
    pub email: Option<String>,

    /// Phone number
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct NoArgs {
    /// No arguments needed; you can omit this
    #[serde(default)]
    pub noop: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct AuthInitArgs {
    /// Force new auth flow even if current auth is valid
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct AuthCompleteArgs {
    /// The FULL redirect URL from the browser, or just the authorization code
    #[validate(length(min = 1))]
    pub code: String,
}

// ==================== Tool Responses ====================

#[derive(Debug, Serialize)]
struct AuthStatusResponse {
    valid: bool,
    message: String,
}

#[derive(Debug, Serialize, Default)]
struct AuthInfoResponse {
    valid: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    access_token: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    expiry: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    expires_in: String,
    has_refresh: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    message: String,
}

#[derive(Debug, Serialize)]
struct AuthInitResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth_url: Option<String>,
    message: String,
}

#[derive(Debug, Serialize)]
struct AuthOutcomeResponse {
    success: bool,
    message: String,
}

const NOT_INITIALIZED: &str = "authenticator not initialized";

/// Tool handler
pub struct ToolHandler {
    gmail: GmailService,
    calendar: CalendarService,
    people: PeopleService,

    /// OAuth authenticator backing the auth_* tools (absent in ish mode)
    auth: Option<Arc<Authenticator>>,

    /// Whether auth is simulated by the fake backend
    ish_mode: bool,
}

impl ToolHandler {
    /// Create a new tool handler
    pub fn new(
        gmail: GmailService,
        calendar: CalendarService,
        people: PeopleService,
        auth: Option<Arc<Authenticator>>,
        ish_mode: bool,
    ) -> Self {
        Self {
            gmail,
            calendar,
            people,
            auth,
            ish_mode,
        }
    }

    /// Wire the services from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let credentials = Credentials::from_config(config)?;
        let auth = match &credentials {
            Credentials::OAuth(auth) => Some(auth.clone()),
            Credentials::Static(_) => None,
        };

        let api = ApiClient::new(credentials, config.retry);
        Ok(Self::new(
            GmailService::new(api.clone(), config.endpoints.gmail.clone()),
            CalendarService::new(api.clone(), config.endpoints.calendar.clone()),
            PeopleService::new(api, config.endpoints.people.clone()),
            auth,
            config.is_ish_mode(),
        ))
    }

    pub fn gmail(&self) -> &GmailService {
        &self.gmail
    }

    pub fn calendar(&self) -> &CalendarService {
        &self.calendar
    }

    pub fn people(&self) -> &PeopleService {
        &self.people
    }

    /// List all available tools
    pub fn list_tools(&self) -> Vec<Tool> {
        vec![
            tool_def::<ListMessagesArgs>("gmail_list_messages", "List Gmail messages"),
            tool_def::<MessageIdArgs>("gmail_get_message", "Get a specific email message by ID"),
            tool_def::<ComposeArgs>("gmail_send_message", "Send an email. Use in_reply_to to reply to an existing message (auto-fetches threading headers)."),
            tool_def::<ComposeArgs>("gmail_create_draft", "Create a draft email. Use in_reply_to to create a reply draft (auto-fetches threading headers)."),
            tool_def::<DraftIdArgs>("gmail_send_draft", "Send an existing draft"),
            tool_def::<ModifyLabelsArgs>("gmail_modify_labels", "Add or remove labels from a message (archive, star, mark as read, etc.)"),
            tool_def::<NoArgs>("gmail_list_labels", "List all Gmail labels (system and user-created) with their IDs"),
            tool_def::<CreateLabelArgs>("gmail_create_label", "Create a new Gmail label"),
            tool_def::<MessageIdArgs>("gmail_trash_message", "Move a message to trash"),
            tool_def::<MessageIdArgs>("gmail_delete_message", "Permanently delete a message"),
            tool_def::<ListEventsArgs>("calendar_list_events", "List calendar events"),
            tool_def::<EventIdArgs>("calendar_get_event", "Get a specific calendar event by ID"),
            tool_def::<CreateEventArgs>("calendar_create_event", "Create a new calendar event"),
            tool_def::<UpdateEventArgs>("calendar_update_event", "Update an existing calendar event. Attendees can be replaced (attendees/optional_attendees) or edited incrementally (add_attendees/add_optional_attendees/remove_attendees), but not both."),
            tool_def::<EventIdArgs>("calendar_delete_event", "Delete a calendar event"),
            tool_def::<ListContactsArgs>("people_list_contacts", "List contacts"),
            tool_def::<SearchContactsArgs>("people_search_contacts", "Search contacts by name, email, or phone number"),
            tool_def::<ResourceNameArgs>("people_get_contact", "Get detailed information about a specific contact"),
            tool_def::<CreateContactArgs>("people_create_contact", "Create a new contact"),
            tool_def::<UpdateContactArgs>("people_update_contact", "Update an existing contact"),
            tool_def::<ResourceNameArgs>("people_delete_contact", "Delete a contact"),
            tool_def::<NoArgs>("auth_status", "Check if OAuth authentication is valid by making a test API call"),
            tool_def::<NoArgs>("auth_info", "Get OAuth token metadata (expiry, refresh availability) without making API calls"),
            tool_def::<AuthInitArgs>("auth_init", "Start OAuth authentication flow. Returns an auth_url the USER must visit in their browser to authorize, then pass the result to auth_complete. Returns current status if already authenticated (use force=true to re-authenticate)."),
            tool_def::<AuthCompleteArgs>("auth_complete", "Complete OAuth flow by exchanging the authorization code for tokens. Accepts the FULL redirect URL from the browser (the code is extracted automatically) or the bare code."),
            tool_def::<NoArgs>("auth_revoke", "Delete the stored OAuth token, forcing re-authentication"),
        ]
    }

    /// Call a tool by name; failures become error results
    pub async fn call_tool(&self, name: &str, args: Value) -> CallToolResult {
        match self.dispatch(name, args).await {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!("Tool {} failed: {}", name, e);
                CallToolResult::error(e.to_string())
            }
        }
    }

    async fn dispatch(&self, name: &str, args: Value) -> Result<CallToolResult> {
        match name {
            "gmail_list_messages" => self.gmail_list_messages(parse_args(args)?).await,
            "gmail_get_message" => {
                let args: MessageIdArgs = parse_args(args)?;
                json_result(self.gmail.get_message(&args.message_id).await?)
            }
            "gmail_send_message" => {
                let args: ComposeArgs = parse_args(args)?;
                json_result(self.gmail.send_message(args.into()).await?)
            }
            "gmail_create_draft" => {
                let args: ComposeArgs = parse_args(args)?;
                json_result(self.gmail.create_draft(args.into()).await?)
            }
            "gmail_send_draft" => {
                let args: DraftIdArgs = parse_args(args)?;
                json_result(self.gmail.send_draft(&args.draft_id).await?)
            }
            "gmail_modify_labels" => {
                let args: ModifyLabelsArgs = parse_args(args)?;
                let modified = self
                    .gmail
                    .modify_labels(&args.message_id, &args.add_labels, &args.remove_labels)
                    .await?;
                json_result(modified)
            }
            "gmail_list_labels" => {
                let labels = self.gmail.list_labels().await?;
                json_result(json!({ "count": labels.len(), "labels": labels }))
            }
            "gmail_create_label" => {
                let args: CreateLabelArgs = parse_args(args)?;
                let label = self
                    .gmail
                    .create_label(
                        &args.name,
                        args.message_list_visibility.as_deref(),
                        args.label_list_visibility.as_deref(),
                    )
                    .await?;
                json_result(label)
            }
            "gmail_trash_message" => {
                let args: MessageIdArgs = parse_args(args)?;
                json_result(self.gmail.trash_message(&args.message_id).await?)
            }
            "gmail_delete_message" => {
                let args: MessageIdArgs = parse_args(args)?;
                self.gmail.delete_message(&args.message_id).await?;
                Ok(CallToolResult::text(format!(
                    "Message {} deleted successfully",
                    args.message_id
                )))
            }
            "calendar_list_events" => self.calendar_list_events(parse_args(args)?).await,
            "calendar_get_event" => {
                let args: EventIdArgs = parse_args(args)?;
                json_result(self.calendar.get_event(&args.event_id).await?)
            }
            "calendar_create_event" => self.calendar_create_event(parse_args(args)?).await,
            "calendar_update_event" => self.calendar_update_event(parse_args(args)?).await,
            "calendar_delete_event" => {
                let args: EventIdArgs = parse_args(args)?;
                self.calendar.delete_event(&args.event_id).await?;
                Ok(CallToolResult::text(format!(
                    "Event {} deleted successfully",
                    args.event_id
                )))
            }
            "people_list_contacts" => {
                let args: ListContactsArgs = parse_args(args)?;
                let contacts = self.people.list_contacts(args.page_size).await?;
                json_result(json!({ "count": contacts.len(), "contacts": contacts }))
            }
            "people_search_contacts" => {
                let args: SearchContactsArgs = parse_args(args)?;
                let contacts = self
                    .people
                    .search_contacts(&args.query, args.page_size)
                    .await?;
                json_result(json!({ "count": contacts.len(), "contacts": contacts }))
            }
            "people_get_contact" => {
                let args: ResourceNameArgs = parse_args(args)?;
                json_result(self.people.get_person(&args.resource_name).await?)
            }
            "people_create_contact" => {
                let args: CreateContactArgs = parse_args(args)?;
                let fields = ContactFields {
                    given_name: Some(args.given_name),
                    family_name: args.family_name,
                    email: args.email,
                    phone: args.phone,
                };
                json_result(self.people.create_contact(&fields.to_person()).await?)
            }
            "people_update_contact" => self.people_update_contact(parse_args(args)?).await,
            "people_delete_contact" => {
                let args: ResourceNameArgs = parse_args(args)?;
                self.people.delete_contact(&args.resource_name).await?;
                Ok(CallToolResult::text(format!(
                    "Contact {} deleted successfully",
                    args.resource_name
                )))
            }
            "auth_status" => self.auth_status().await,
            "auth_info" => self.auth_info().await,
            "auth_init" => self.auth_init(args).await,
            "auth_complete" => self.auth_complete(args).await,
            "auth_revoke" => self.auth_revoke().await,
            _ => Err(McpError::UnknownTool {
                name: name.to_string(),
            }
            .into()),
        }
    }

    // ==================== Tool Handlers ====================

    async fn gmail_list_messages(&self, args: ListMessagesArgs) -> Result<CallToolResult> {
        let messages = self
            .gmail
            .list_messages(&args.query, args.max_results)
            .await?;

        let mut summaries = Vec::with_capacity(messages.len());
        for message in &messages {
            if !args.hydrate {
                summaries.push(message_stub(message));
                continue;
            }

            // A message that fails to load degrades to its ids
            match self.gmail.get_message(str_field(message, "id")).await {
                Ok(full) => summaries.push(message_summary(&full)),
                Err(e) => {
                    tracing::warn!("Skipping details for message: {}", e);
                    summaries.push(message_stub(message));
                }
            }
        }

        json_result(json!({ "count": summaries.len(), "messages": summaries }))
    }

    async fn calendar_list_events(&self, args: ListEventsArgs) -> Result<CallToolResult> {
        let time_min = optional_time("time_min", args.time_min.as_deref())?;
        let time_max = optional_time("time_max", args.time_max.as_deref())?;

        let events = self
            .calendar
            .list_events(args.max_results, time_min, time_max)
            .await?;

        json_result(json!({ "count": events.len(), "events": events }))
    }

    async fn calendar_create_event(&self, args: CreateEventArgs) -> Result<CallToolResult> {
        let event = NewEvent {
            start: parse_rfc3339("start_time", &args.start_time)?,
            end: parse_rfc3339("end_time", &args.end_time)?,
            summary: args.summary,
            description: args.description,
            attendees: args.attendees,
            optional_attendees: args.optional_attendees,
        };

        json_result(
            self.calendar
                .create_event(&event, args.send_notifications)
                .await?,
        )
    }

    async fn calendar_update_event(&self, args: UpdateEventArgs) -> Result<CallToolResult> {
        // Rejected before touching the API
        let attendees = AttendeeUpdate::from_lists(
            args.attendees,
            args.optional_attendees,
            args.add_attendees,
            args.add_optional_attendees,
            args.remove_attendees,
        )?;

        let changes = EventChanges {
            summary: args.summary,
            description: args.description,
            start: optional_time("start_time", args.start_time.as_deref())?,
            end: optional_time("end_time", args.end_time.as_deref())?,
            attendees,
        };

        let mut event = self.calendar.get_event(&args.event_id).await?;
        changes.apply_to(&mut event);

        json_result(
            self.calendar
                .update_event(&args.event_id, &event, args.send_notifications)
                .await?,
        )
    }

    async fn people_update_contact(&self, args: UpdateContactArgs) -> Result<CallToolResult> {
        let fields = ContactFields {
            given_name: args.given_name,
            family_name: args.family_name,
            email: args.email,
            phone: args.phone,
        };

        let mut person = self.people.get_person(&args.resource_name).await?;
        let mask = fields.merge_into(&mut person);
        if mask.is_empty() {
            return Err(ValidationError::Conflict("no fields to update".to_string()).into());
        }

        json_result(
            self.people
                .update_contact(&args.resource_name, &person, &mask.join(","))
                .await?,
        )
    }

    async fn auth_status(&self) -> Result<CallToolResult> {
        let response = if self.ish_mode {
            AuthStatusResponse {
                valid: true,
                message: "ISH mode - auth is simulated".to_string(),
            }
        } else {
            // Lightweight API call to verify auth works
            match self.gmail.list_messages("", 1).await {
                Ok(_) => AuthStatusResponse {
                    valid: true,
                    message: "authentication is valid".to_string(),
                },
                Err(e) => AuthStatusResponse {
                    valid: false,
                    message: format!("auth check failed: {}", e),
                },
            }
        };

        json_response(&response)
    }

    async fn auth_info(&self) -> Result<CallToolResult> {
        if self.ish_mode {
            return json_response(&AuthInfoResponse {
                valid: true,
                has_refresh: true,
                message: "ISH mode - token info is simulated".to_string(),
                ..Default::default()
            });
        }

        let Some(auth) = &self.auth else {
            return json_response(&AuthInfoResponse {
                message: NOT_INITIALIZED.to_string(),
                ..Default::default()
            });
        };

        let info = auth.token_info().await;
        let mut response = AuthInfoResponse {
            valid: info.valid,
            access_token: info.access_token,
            has_refresh: info.has_refresh,
            ..Default::default()
        };
        if let Some(expiry) = info.expiry {
            response.expiry = expiry.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
            response.expires_in = format_duration(info.expires_in_secs.unwrap_or_default());
        }

        json_response(&response)
    }

    async fn auth_init(&self, args: Value) -> Result<CallToolResult> {
        if self.ish_mode {
            return json_response(&AuthInitResponse {
                status: "valid",
                auth_url: None,
                message: "ISH mode - auth is simulated, no action needed".to_string(),
            });
        }

        let Some(auth) = &self.auth else {
            return json_response(&AuthInitResponse {
                status: "error",
                auth_url: None,
                message: NOT_INITIALIZED.to_string(),
            });
        };

        let args: AuthInitArgs = parse_args(args)?;
        if !args.force && auth.token_info().await.valid {
            return json_response(&AuthInitResponse {
                status: "valid",
                auth_url: None,
                message: "current authentication is valid - use force=true to re-authenticate"
                    .to_string(),
            });
        }

        json_response(&AuthInitResponse {
            status: "auth_required",
            auth_url: Some(auth.auth_url()),
            message: "visit the auth_url in a browser and authorize the app. After authorizing, copy the FULL URL from your browser (it will look like http://localhost:8080/?code=...) and provide it to auth_complete".to_string(),
        })
    }

    async fn auth_complete(&self, args: Value) -> Result<CallToolResult> {
        if self.ish_mode {
            return json_response(&AuthOutcomeResponse {
                success: true,
                message: "ISH mode - auth completion simulated".to_string(),
            });
        }

        let Some(auth) = &self.auth else {
            return json_response(&AuthOutcomeResponse {
                success: false,
                message: NOT_INITIALIZED.to_string(),
            });
        };

        let args: AuthCompleteArgs = parse_args(args)?;
        let code = extract_auth_code(&args.code);

        let response = match auth.exchange_code(&code).await {
            Ok(()) => AuthOutcomeResponse {
                success: true,
                message: "authentication completed successfully - token saved".to_string(),
            },
            Err(e) => AuthOutcomeResponse {
                success: false,
                message: format!("token exchange failed: {}", e),
            },
        };

        json_response(&response)
    }

    async fn auth_revoke(&self) -> Result<CallToolResult> {
        if self.ish_mode {
            return json_response(&AuthOutcomeResponse {
                success: true,
                message: "ISH mode - auth revocation simulated".to_string(),
            });
        }

        let Some(auth) = &self.auth else {
            return json_response(&AuthOutcomeResponse {
                success: false,
                message: NOT_INITIALIZED.to_string(),
            });
        };

        let response = match auth.revoke_token().await {
            Ok(()) => AuthOutcomeResponse {
                success: true,
                message: "token revoked - use auth_init to start new authentication flow"
                    .to_string(),
            },
            Err(e) => AuthOutcomeResponse {
                success: false,
                message: format!("failed to revoke token: {}", e),
            },
        };

        json_response(&response)
    }
}

// ==================== Helpers ====================

/// Deserialize and validate tool arguments (missing arguments = `{}`)
fn parse_args<T: DeserializeOwned + Validate>(args: Value) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args };

    let parsed: T = serde_json::from_value(args).map_err(|e| McpError::InvalidArguments {
        message: e.to_string(),
    })?;
    parsed.validate().map_err(|e| McpError::InvalidArguments {
        message: e.to_string(),
    })?;

    Ok(parsed)
}

fn json_result(value: Value) -> Result<CallToolResult> {
    Ok(CallToolResult::json(value))
}

fn json_response<T: Serialize>(response: &T) -> Result<CallToolResult> {
    json_result(serde_json::to_value(response)?)
}

fn optional_time(
    field: &str,
    value: Option<&str>,
) -> Result<Option<chrono::DateTime<chrono::FixedOffset>>> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| parse_rfc3339(field, v))
        .transpose()
}

/// Message reduced to its ids
fn message_stub(message: &Value) -> Value {
    json!({
        "id": str_field(message, "id"),
        "threadId": str_field(message, "threadId"),
    })
}

/// Message reduced to ids, snippet, labels and common headers
fn message_summary(message: &Value) -> Value {
    let mut summary = Map::new();
    summary.insert("id".to_string(), json!(str_field(message, "id")));
    summary.insert("threadId".to_string(), json!(str_field(message, "threadId")));

    let headers = message
        .pointer("/payload/headers")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for header in &headers {
        let key = match str_field(header, "name").to_ascii_lowercase().as_str() {
            "from" => "from",
            "to" => "to",
            "subject" => "subject",
            "date" => "date",
            _ => continue,
        };
        let value = str_field(header, "value");
        if !value.is_empty() {
            summary.insert(key.to_string(), json!(value));
        }
    }

    let snippet = str_field(message, "snippet");
    if !snippet.is_empty() {
        summary.insert("snippet".to_string(), json!(snippet));
    }
    if let Some(labels) = message
        .get("labelIds")
        .and_then(Value::as_array)
        .filter(|labels| !labels.is_empty())
    {
        summary.insert("labelIds".to_string(), Value::Array(labels.clone()));
    }

    Value::Object(summary)
}

/// Render seconds like `1h2m3s`
fn format_duration(total_secs: i64) -> String {
    let sign = if total_secs < 0 { "-" } else { "" };
    let secs = total_secs.unsigned_abs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);

    if hours > 0 {
        format!("{}{}h{}m{}s", sign, hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}{}m{}s", sign, minutes, seconds)
    } else {
        format!("{}{}s", sign, seconds)
    }
}

/// Tool definition with a schema generated from its argument type
fn tool_def<T: JsonSchema>(name: &str, description: &str) -> Tool {
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema: input_schema::<T>(),
    }
}

fn input_schema<T: JsonSchema>() -> Value {
    let generator = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.meta_schema = None;
        })
        .into_generator();
    let schema = generator.into_root_schema_for::<T>();

    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| json!({}));
    if let Some(object) = value.as_object_mut() {
        object.remove("title");
        object.insert("type".to_string(), json!("object"));
        object
            .entry("properties")
            .or_insert_with(|| Value::Object(Map::new()));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_schema_marks_required_fields() {
        let schema = input_schema::<ComposeArgs>();
        assert_eq!(schema["type"], "object");
        assert!(schema.get("title").is_none());

        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(required.contains(&"to"));
        assert!(required.contains(&"subject"));
        assert!(required.contains(&"body"));
        assert!(!required.contains(&"in_reply_to"));
        assert_eq!(
            schema["properties"]["to"]["description"],
            "Recipient email address"
        );
    }

    #[test]
    fn test_input_schema_defaults() {
        let schema = input_schema::<ListMessagesArgs>();
        assert_eq!(schema["properties"]["max_results"]["default"], 100);
        assert!(schema.get("required").is_none());
    }

    #[test]
    fn test_parse_args_defaults_and_null() {
        let args: ListMessagesArgs = parse_args(Value::Null).unwrap();
        assert_eq!(args.max_results, 100);
        assert!(!args.hydrate);
        assert!(args.query.is_empty());

        let args: SearchContactsArgs = parse_args(json!({"query": "ada"})).unwrap();
        assert_eq!(args.page_size, 10);

        let args: CreateEventArgs = parse_args(json!({
            "summary": "s",
            "start_time": "2024-01-01T10:00:00Z",
            "end_time": "2024-01-01T11:00:00Z"
        }))
        .unwrap();
        assert!(args.send_notifications);
    }

    #[test]
    fn test_parse_args_rejects_missing_and_empty() {
        let missing = parse_args::<MessageIdArgs>(json!({})).unwrap_err();
        assert!(missing.to_string().contains("message_id"));

        let empty = parse_args::<MessageIdArgs>(json!({"message_id": ""}));
        assert!(empty.is_err());

        let range = parse_args::<ListMessagesArgs>(json!({"max_results": 0}));
        assert!(range.is_err());

        let unnamed = parse_args::<CreateLabelArgs>(json!({"name": ""}));
        assert!(unnamed.is_err());
    }

    #[test]
    fn test_message_summary() {
        let message = json!({
            "id": "m1",
            "threadId": "t1",
            "snippet": "Hello there",
            "labelIds": ["INBOX", "UNREAD"],
            "payload": {
                "headers": [
                    {"name": "From", "value": "alice@example.com"},
                    {"name": "subject", "value": "Hi"},
                    {"name": "X-Other", "value": "ignored"}
                ]
            }
        });

        let summary = message_summary(&message);
        assert_eq!(
            summary,
            json!({
                "id": "m1",
                "threadId": "t1",
                "from": "alice@example.com",
                "subject": "Hi",
                "snippet": "Hello there",
                "labelIds": ["INBOX", "UNREAD"]
            })
        );
        assert_eq!(message_stub(&message), json!({"id": "m1", "threadId": "t1"}));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(3723), "1h2m3s");
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(600), "10m0s");
        assert_eq!(format_duration(-5), "-5s");
    }

    #[test]
    fn test_tool_count() {
        let handler = ToolHandler::from_config(&Config::ish("http://localhost:9000", "testuser"))
            .unwrap();
        let tools = handler.list_tools();
        assert_eq!(tools.len(), 26);
        assert!(tools.iter().all(|t| t.input_schema["type"] == "object"));
    }
}
