//! Gmail API service
//!
//! Messages, drafts, labels and the user profile. Responses are passed
//! through as JSON.

use serde_json::{json, Value};

use crate::config::google::USER_ID;
use crate::error::{Result, ValidationError};
use crate::google::api::{array_field, failed, path_segment, str_field, ApiClient};
use crate::google::mime::{build_references, ensure_reply_subject, OutgoingMessage};

/// Headers of an original message needed to thread a reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadingHeaders {
    pub thread_id: String,
    pub message_id: String,
    pub references: String,
    pub subject: String,
    pub from: String,
}

impl ThreadingHeaders {
    fn from_message(message: &Value) -> Self {
        let mut headers = ThreadingHeaders {
            thread_id: str_field(message, "threadId").to_string(),
            ..Default::default()
        };

        let payload_headers = message
            .get("payload")
            .map(|p| array_field(p, "headers"))
            .unwrap_or_default();

        for header in &payload_headers {
            let value = str_field(header, "value").to_string();
            match str_field(header, "name").to_ascii_lowercase().as_str() {
                "message-id" => headers.message_id = value,
                "references" => headers.references = value,
                "subject" => headers.subject = value,
                "from" => headers.from = value,
                _ => {}
            }
        }

        headers
    }
}

/// Parameters for composing an email
#[derive(Debug, Clone, Default)]
pub struct ComposeParams {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Gmail ID of the message being replied to
    pub in_reply_to: Option<String>,
    pub cc: String,
    pub bcc: String,
}

/// Gmail API service
#[derive(Clone)]
pub struct GmailService {
    api: ApiClient,
    base_url: String,
}

impl GmailService {
    pub fn new(api: ApiClient, base_url: impl Into<String>) -> Self {
        Self {
            api,
            base_url: base_url.into(),
        }
    }

    fn user_url(&self, path: &str) -> String {
        format!("{}/gmail/v1/users/{}/{}", self.base_url, USER_ID, path)
    }

    /// List messages matching a Gmail search query
    pub async fn list_messages(&self, query: &str, max_results: i64) -> Result<Vec<Value>> {
        let mut params = vec![("maxResults", max_results.to_string())];
        if !query.is_empty() {
            params.push(("q", query.to_string()));
        }

        let response = self
            .api
            .get(&self.user_url("messages"), &params)
            .await
            .map_err(|e| failed(e, "unable to list messages"))?;

        Ok(array_field(&response, "messages"))
    }

    /// Get a message in full format
    pub async fn get_message(&self, message_id: &str) -> Result<Value> {
        self.api
            .get(&self.user_url(&format!("messages/{}", path_segment(message_id))), &[])
            .await
            .map_err(|e| failed(e, "unable to get message"))
    }

    /// Fetch only the headers needed to thread a reply
    pub async fn get_message_headers(&self, message_id: &str) -> Result<ThreadingHeaders> {
        let params = [
            ("format", "metadata".to_string()),
            ("metadataHeaders", "Message-ID".to_string()),
            ("metadataHeaders", "References".to_string()),
            ("metadataHeaders", "Subject".to_string()),
            ("metadataHeaders", "From".to_string()),
        ];

        let message = self
            .api
            .get(&self.user_url(&format!("messages/{}", path_segment(message_id))), &params)
            .await
            .map_err(|e| failed(e, "unable to get message headers"))?;

        Ok(ThreadingHeaders::from_message(&message))
    }

    /// Send an email, threading it when replying
    pub async fn send_message(&self, params: ComposeParams) -> Result<Value> {
        let message = self
            .compose(params, "unable to fetch original message for send reply")
            .await?;

        self.api
            .post(&self.user_url("messages/send"), &[], &message)
            .await
            .map_err(|e| failed(e, "unable to send message"))
    }

    /// Create a draft, threading it when replying
    pub async fn create_draft(&self, params: ComposeParams) -> Result<Value> {
        let message = self
            .compose(params, "unable to fetch original message for draft reply")
            .await?;

        self.api
            .post(&self.user_url("drafts"), &[], &json!({ "message": message }))
            .await
            .map_err(|e| failed(e, "unable to create draft"))
    }

    /// Validate and render a message resource (`raw` plus optional `threadId`)
    async fn compose(&self, params: ComposeParams, reply_context: &str) -> Result<Value> {
        if params.to.is_empty() {
            return Err(ValidationError::EmptyField {
                field: "recipient address (to)".to_string(),
            }
            .into());
        }
        if params.subject.is_empty() {
            return Err(ValidationError::EmptyField {
                field: "subject".to_string(),
            }
            .into());
        }

        let mut outgoing = OutgoingMessage {
            to: params.to,
            cc: params.cc,
            bcc: params.bcc,
            subject: params.subject,
            body: params.body,
            ..Default::default()
        };
        let mut thread_id = String::new();

        if let Some(original_id) = params.in_reply_to.filter(|id| !id.is_empty()) {
            let original = self
                .get_message_headers(&original_id)
                .await
                .map_err(|e| e.context(reply_context))?;

            thread_id = original.thread_id;
            if !original.message_id.is_empty() {
                outgoing.references = build_references(&original.message_id, &original.references);
                outgoing.in_reply_to = original.message_id;
            }
            outgoing.subject = ensure_reply_subject(&outgoing.subject);
        }

        let mut message = json!({ "raw": outgoing.encode_raw() });
        if !thread_id.is_empty() {
            message["threadId"] = json!(thread_id);
        }
        Ok(message)
    }

    /// List drafts
    pub async fn list_drafts(&self, max_results: i64) -> Result<Vec<Value>> {
        let response = self
            .api
            .get(
                &self.user_url("drafts"),
                &[("maxResults", max_results.to_string())],
            )
            .await
            .map_err(|e| failed(e, "unable to list drafts"))?;

        Ok(array_field(&response, "drafts"))
    }

    /// Send an existing draft
    pub async fn send_draft(&self, draft_id: &str) -> Result<Value> {
        self.api
            .post(&self.user_url("drafts/send"), &[], &json!({ "id": draft_id }))
            .await
            .map_err(|e| failed(e, "unable to send draft"))
    }

    /// Add and remove labels on a message
    pub async fn modify_labels(
        &self,
        message_id: &str,
        add_labels: &[String],
        remove_labels: &[String],
    ) -> Result<Value> {
        let body = json!({
            "addLabelIds": add_labels,
            "removeLabelIds": remove_labels,
        });

        self.api
            .post(
                &self.user_url(&format!("messages/{}/modify", path_segment(message_id))),
                &[],
                &body,
            )
            .await
            .map_err(|e| failed(e, "unable to modify labels"))
    }

    /// Move a message to trash
    pub async fn trash_message(&self, message_id: &str) -> Result<Value> {
        self.api
            .post(
                &self.user_url(&format!("messages/{}/trash", path_segment(message_id))),
                &[],
                &json!({}),
            )
            .await
            .map_err(|e| failed(e, "unable to trash message"))
    }

    /// Permanently delete a message
    pub async fn delete_message(&self, message_id: &str) -> Result<()> {
        self.api
            .delete(&self.user_url(&format!("messages/{}", path_segment(message_id))), &[])
            .await
            .map_err(|e| failed(e, "unable to delete message"))?;
        Ok(())
    }

    /// List system and user labels
    pub async fn list_labels(&self) -> Result<Vec<Value>> {
        let response = self
            .api
            .get(&self.user_url("labels"), &[])
            .await
            .map_err(|e| failed(e, "unable to list labels"))?;

        Ok(array_field(&response, "labels"))
    }

    /// Create a user label. Visibility settings are left to Gmail's
    /// defaults when not given.
    pub async fn create_label(
        &self,
        name: &str,
        message_list_visibility: Option<&str>,
        label_list_visibility: Option<&str>,
    ) -> Result<Value> {
        let mut body = json!({ "name": name });
        if let Some(visibility) = message_list_visibility {
            body["messageListVisibility"] = json!(visibility);
        }
        if let Some(visibility) = label_list_visibility {
            body["labelListVisibility"] = json!(visibility);
        }

        self.api
            .post(&self.user_url("labels"), &[], &body)
            .await
            .map_err(|e| failed(e, "unable to create label"))
    }

    /// Profile of the authenticated user (email address, totals)
    pub async fn get_profile(&self) -> Result<Value> {
        self.api
            .get(&self.user_url("profile"), &[])
            .await
            .map_err(|e| failed(e, "unable to get profile"))
    }
}
