//! Google Calendar service
//!
//! Event operations on the user's primary calendar, plus the attendee
//! update rules used when editing an event.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Local, SecondsFormat};
use serde_json::{json, Map, Value};

use crate::config::google::CALENDAR_ID;
use crate::error::{Result, ValidationError};
use crate::google::api::{array_field, failed, path_segment, str_field, ApiClient};

/// Format a timestamp the way the Calendar API expects
pub fn format_rfc3339(time: &DateTime<FixedOffset>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current time in the host's local offset
pub fn local_now() -> DateTime<FixedOffset> {
    let now = Local::now();
    now.with_timezone(now.offset())
}

/// Parse an RFC 3339 argument, naming the field on failure
pub fn parse_rfc3339(field: &str, value: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).map_err(|e| {
        ValidationError::InvalidParameter {
            name: format!("{} format", field),
            message: e.to_string(),
        }
        .into()
    })
}

/// A new event to insert
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub summary: String,
    pub description: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub attendees: Vec<String>,
    pub optional_attendees: Vec<String>,
}

impl NewEvent {
    /// Event resource; required attendees come before optional ones
    pub fn to_resource(&self) -> Value {
        let mut event = json!({
            "summary": self.summary,
            "start": { "dateTime": format_rfc3339(&self.start) },
            "end": { "dateTime": format_rfc3339(&self.end) },
        });
        if !self.description.is_empty() {
            event["description"] = json!(self.description);
        }

        let attendees: Vec<Value> = self
            .attendees
            .iter()
            .map(|email| attendee(email, false))
            .chain(
                self.optional_attendees
                    .iter()
                    .map(|email| attendee(email, true)),
            )
            .collect();
        if !attendees.is_empty() {
            event["attendees"] = Value::Array(attendees);
        }

        event
    }
}

fn attendee(email: &str, optional: bool) -> Value {
    let mut attendee = json!({ "email": email });
    if optional {
        attendee["optional"] = json!(true);
    }
    attendee
}

/// How the attendee list of an existing event changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendeeUpdate {
    /// Leave attendees untouched
    Keep,

    /// Rebuild the list from scratch
    Replace {
        required: Vec<String>,
        optional: Vec<String>,
    },

    /// Edit the existing list
    Incremental {
        add: Vec<String>,
        add_optional: Vec<String>,
        remove: Vec<String>,
    },
}

impl AttendeeUpdate {
    /// Pick the update mode from the supplied lists; mixing modes is an error
    pub fn from_lists(
        attendees: Option<Vec<String>>,
        optional_attendees: Option<Vec<String>>,
        add_attendees: Option<Vec<String>>,
        add_optional_attendees: Option<Vec<String>>,
        remove_attendees: Option<Vec<String>>,
    ) -> Result<Self> {
        let replacing = attendees.is_some() || optional_attendees.is_some();
        let incremental = add_attendees.is_some()
            || add_optional_attendees.is_some()
            || remove_attendees.is_some();

        match (replacing, incremental) {
            (true, true) => Err(ValidationError::Conflict(
                "cannot mix full replacement (attendees/optional_attendees) with incremental updates (add_attendees/add_optional_attendees/remove_attendees)".to_string(),
            )
            .into()),
            (true, false) => Ok(AttendeeUpdate::Replace {
                required: attendees.unwrap_or_default(),
                optional: optional_attendees.unwrap_or_default(),
            }),
            (false, true) => Ok(AttendeeUpdate::Incremental {
                add: add_attendees.unwrap_or_default(),
                add_optional: add_optional_attendees.unwrap_or_default(),
                remove: remove_attendees.unwrap_or_default(),
            }),
            (false, false) => Ok(AttendeeUpdate::Keep),
        }
    }

    /// New attendee list, or `None` when attendees stay as they are
    pub fn apply(&self, existing: &[Value]) -> Option<Vec<Value>> {
        // Keyed by lowercase email
        let mut by_email: BTreeMap<String, Value> = BTreeMap::new();

        match self {
            AttendeeUpdate::Keep => return None,
            AttendeeUpdate::Replace { required, optional } => {
                let entries = required
                    .iter()
                    .map(|email| (email, false))
                    .chain(optional.iter().map(|email| (email, true)));
                for (email, is_optional) in entries {
                    if email.is_empty() {
                        continue;
                    }
                    // Later entries win, so optional overrides required
                    by_email.insert(email.to_lowercase(), attendee(email, is_optional));
                }
            }
            AttendeeUpdate::Incremental {
                add,
                add_optional,
                remove,
            } => {
                for current in existing {
                    let email = str_field(current, "email").to_lowercase();
                    by_email.insert(email, current.clone());
                }
                let additions = add
                    .iter()
                    .map(|email| (email, false))
                    .chain(add_optional.iter().map(|email| (email, true)));
                for (email, is_optional) in additions {
                    by_email
                        .entry(email.to_lowercase())
                        .or_insert_with(|| attendee(email, is_optional));
                }
                for email in remove {
                    by_email.remove(&email.to_lowercase());
                }
            }
        }

        let mut attendees: Vec<Value> = by_email.into_values().collect();
        attendees.sort_by(|a, b| str_field(a, "email").cmp(str_field(b, "email")));
        Some(attendees)
    }
}

/// Field changes for an existing event
#[derive(Debug, Clone)]
pub struct EventChanges {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
    pub attendees: AttendeeUpdate,
}

impl EventChanges {
    /// Apply the changes to a fetched event resource
    pub fn apply_to(&self, event: &mut Value) {
        if !event.is_object() {
            *event = Value::Object(Map::new());
        }

        if let Some(summary) = self.summary.as_deref().filter(|s| !s.is_empty()) {
            event["summary"] = json!(summary);
        }
        if let Some(description) = self.description.as_deref().filter(|s| !s.is_empty()) {
            event["description"] = json!(description);
        }
        if let Some(start) = &self.start {
            set_date_time(event, "start", start);
        }
        if let Some(end) = &self.end {
            set_date_time(event, "end", end);
        }

        let existing = array_field(event, "attendees");
        if let Some(attendees) = self.attendees.apply(&existing) {
            event["attendees"] = Value::Array(attendees);
        }
    }
}

fn set_date_time(event: &mut Value, key: &str, time: &DateTime<FixedOffset>) {
    if !event.get(key).map_or(false, Value::is_object) {
        event[key] = json!({});
    }
    event[key]["dateTime"] = json!(format_rfc3339(time));
}

/// Google Calendar API service
#[derive(Clone)]
pub struct CalendarService {
    api: ApiClient,
    base_url: String,
}

impl CalendarService {
    pub fn new(api: ApiClient, base_url: impl Into<String>) -> Self {
        Self {
            api,
            base_url: base_url.into(),
        }
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/{}/events", self.base_url, CALENDAR_ID)
    }

    fn event_url(&self, event_id: &str) -> String {
        format!("{}/{}", self.events_url(), path_segment(event_id))
    }

    /// List single events ordered by start time
    pub async fn list_events(
        &self,
        max_results: i64,
        time_min: Option<DateTime<FixedOffset>>,
        time_max: Option<DateTime<FixedOffset>>,
    ) -> Result<Vec<Value>> {
        let mut params = vec![
            ("maxResults", max_results.to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        if let Some(time_min) = time_min {
            params.push(("timeMin", format_rfc3339(&time_min)));
        }
        if let Some(time_max) = time_max {
            params.push(("timeMax", format_rfc3339(&time_max)));
        }

        let response = self
            .api
            .get(&self.events_url(), &params)
            .await
            .map_err(|e| failed(e, "unable to list events"))?;

        Ok(array_field(&response, "items"))
    }

    pub async fn get_event(&self, event_id: &str) -> Result<Value> {
        self.api
            .get(&self.event_url(event_id), &[])
            .await
            .map_err(|e| failed(e, "unable to get event"))
    }

    pub async fn create_event(&self, event: &NewEvent, send_notifications: bool) -> Result<Value> {
        self.api
            .post(
                &self.events_url(),
                &[("sendNotifications", send_notifications.to_string())],
                &event.to_resource(),
            )
            .await
            .map_err(|e| failed(e, "unable to create event"))
    }

    /// Replace an event with an edited resource
    pub async fn update_event(
        &self,
        event_id: &str,
        event: &Value,
        send_notifications: bool,
    ) -> Result<Value> {
        self.api
            .put(
                &self.event_url(event_id),
                &[("sendNotifications", send_notifications.to_string())],
                event,
            )
            .await
            .map_err(|e| failed(e, "unable to update event"))
    }

    pub async fn delete_event(&self, event_id: &str) -> Result<()> {
        self.api
            .delete(&self.event_url(event_id), &[])
            .await
            .map_err(|e| failed(e, "unable to delete event"))?;
        Ok(())
    }
}
