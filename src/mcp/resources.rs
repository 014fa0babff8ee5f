//! MCP resources
//!
//! Read-only JSON views over the mailbox, the calendar and the contacts,
//! addressed by `gsuite://` URIs. Every read queries the services afresh.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, FixedOffset, Timelike};
use serde_json::{json, Map, Value};

use crate::error::{McpError, Result};
use crate::google::api::str_field;
use crate::google::calendar::{format_rfc3339, local_now};
use crate::google::{CalendarService, GmailService, PeopleService};
use crate::mcp::tools::ToolHandler;
use crate::mcp::types::{ReadResourceResult, Resource, ResourceContents};

pub const JSON_MIME: &str = "application/json";

pub const CALENDAR_TODAY: &str = "gsuite://calendar/today";
pub const CALENDAR_THIS_WEEK: &str = "gsuite://calendar/this-week";
pub const GMAIL_UNREAD: &str = "gsuite://gmail/unread";
pub const GMAIL_UNREAD_IMPORTANT: &str = "gsuite://gmail/unread/important";
pub const CONTACTS_RECENT: &str = "gsuite://contacts/recent";
pub const CALENDAR_UPCOMING: &str = "gsuite://calendar/upcoming";
pub const CALENDAR_AVAILABILITY: &str = "gsuite://calendar/availability";
pub const GMAIL_DRAFTS: &str = "gsuite://gmail/drafts";

/// Working hours per day counted as available time
const WORKDAY_HOURS: f64 = 10.0;

const RESOURCES: [(&str, &str, &str); 8] = [
    (CALENDAR_TODAY, "Today's Calendar", "Events on the calendar for today"),
    (CALENDAR_THIS_WEEK, "This Week's Calendar", "Events for the current Monday-to-Sunday week, grouped by day"),
    (GMAIL_UNREAD, "Unread Emails", "The 20 most recent unread messages"),
    (GMAIL_UNREAD_IMPORTANT, "Important Unread Emails", "Unread messages Gmail marks as important"),
    (CONTACTS_RECENT, "Recent Contacts", "The first 20 contacts in the address book"),
    (CALENDAR_UPCOMING, "Upcoming Meetings", "The next 5 events within a week"),
    (CALENDAR_AVAILABILITY, "Calendar Availability", "Busy and free hours for each of the next 7 days"),
    (GMAIL_DRAFTS, "Draft Emails", "Drafts waiting to be sent"),
];

/// Serves `resources/list` and `resources/read`
#[derive(Clone)]
pub struct ResourceHandler {
    gmail: GmailService,
    calendar: CalendarService,
    people: PeopleService,
}

impl ResourceHandler {
    pub fn new(gmail: GmailService, calendar: CalendarService, people: PeopleService) -> Self {
        Self {
            gmail,
            calendar,
            people,
        }
    }

    /// Share the services already wired for the tools
    pub fn from_tools(tools: &ToolHandler) -> Self {
        Self::new(
            tools.gmail().clone(),
            tools.calendar().clone(),
            tools.people().clone(),
        )
    }

    pub fn list_resources(&self) -> Vec<Resource> {
        RESOURCES
            .iter()
            .map(|(uri, name, description)| Resource {
                uri: uri.to_string(),
                name: name.to_string(),
                description: Some(description.to_string()),
                mime_type: Some(JSON_MIME.to_string()),
            })
            .collect()
    }

    /// Read a resource relative to the current local time
    pub async fn read(&self, uri: &str) -> Result<ReadResourceResult> {
        self.read_at(uri, local_now()).await
    }

    pub async fn read_at(&self, uri: &str, now: DateTime<FixedOffset>) -> Result<ReadResourceResult> {
        let value = match uri {
            CALENDAR_TODAY => self.today(now).await?,
            CALENDAR_THIS_WEEK => self.this_week(now).await?,
            GMAIL_UNREAD => {
                let messages = self
                    .gmail
                    .list_messages("is:unread", 20)
                    .await
                    .map_err(|e| e.context("failed to fetch unread emails"))?;
                json!({
                    "unread_count": messages.len(),
                    "messages": messages,
                    "timestamp": format_rfc3339(&now),
                })
            }
            GMAIL_UNREAD_IMPORTANT => {
                let messages = self
                    .gmail
                    .list_messages("is:unread is:important", 10)
                    .await
                    .map_err(|e| e.context("failed to fetch important emails"))?;
                json!({
                    "important_unread_count": messages.len(),
                    "messages": messages,
                    "timestamp": format_rfc3339(&now),
                })
            }
            CONTACTS_RECENT => {
                let contacts = self
                    .people
                    .list_contacts(20)
                    .await
                    .map_err(|e| e.context("failed to fetch recent contacts"))?;
                json!({
                    "contact_count": contacts.len(),
                    "contacts": contacts,
                    "timestamp": format_rfc3339(&now),
                })
            }
            CALENDAR_UPCOMING => {
                let until = now + ChronoDuration::days(7);
                let events = self
                    .calendar
                    .list_events(5, Some(now), Some(until))
                    .await
                    .map_err(|e| e.context("failed to fetch upcoming meetings"))?;
                json!({
                    "upcoming_count": events.len(),
                    "events": events,
                    "time_range": {
                        "from": format_rfc3339(&now),
                        "to": format_rfc3339(&until),
                    },
                })
            }
            CALENDAR_AVAILABILITY => {
                let events = self
                    .calendar
                    .list_events(100, Some(now), Some(now + ChronoDuration::days(7)))
                    .await
                    .map_err(|e| e.context("failed to fetch calendar for availability"))?;
                json!({
                    "period": "next 7 days",
                    "availability": availability(&events, now),
                    "generated_at": format_rfc3339(&now),
                })
            }
            GMAIL_DRAFTS => {
                let drafts = self
                    .gmail
                    .list_drafts(10)
                    .await
                    .map_err(|e| e.context("failed to fetch drafts"))?;
                json!({
                    "draft_count": drafts.len(),
                    "drafts": drafts,
                    "timestamp": format_rfc3339(&now),
                })
            }
            _ => {
                return Err(McpError::UnknownResource {
                    uri: uri.to_string(),
                }
                .into())
            }
        };

        Ok(ReadResourceResult {
            contents: vec![ResourceContents {
                uri: uri.to_string(),
                mime_type: Some(JSON_MIME.to_string()),
                text: serde_json::to_string_pretty(&value)?,
            }],
        })
    }

    async fn today(&self, now: DateTime<FixedOffset>) -> Result<Value> {
        let start = start_of_day(now);
        let events = self
            .calendar
            .list_events(50, Some(start), Some(start + ChronoDuration::days(1)))
            .await
            .map_err(|e| e.context("failed to fetch today's events"))?;

        Ok(json!({
            "date": start.format("%Y-%m-%d").to_string(),
            "event_count": events.len(),
            "events": events,
        }))
    }

    async fn this_week(&self, now: DateTime<FixedOffset>) -> Result<Value> {
        let days_since_monday = i64::from(now.weekday().num_days_from_monday());
        let start = start_of_day(now) - ChronoDuration::days(days_since_monday);
        let end = start + ChronoDuration::days(7);

        let events = self
            .calendar
            .list_events(100, Some(start), Some(end))
            .await
            .map_err(|e| e.context("failed to fetch this week's events"))?;

        Ok(json!({
            "week_start": start.format("%Y-%m-%d").to_string(),
            "week_end": end.format("%Y-%m-%d").to_string(),
            "event_count": events.len(),
            "events_by_day": group_by_day(&events),
        }))
    }
}

/// Midnight of `now`'s day, in `now`'s offset
fn start_of_day(now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    now - ChronoDuration::seconds(i64::from(now.num_seconds_from_midnight()))
        - ChronoDuration::nanoseconds(i64::from(now.nanosecond()))
}

/// Timed start of an event, if it has one that parses
fn timed(event: &Value, field: &str) -> Option<DateTime<FixedOffset>> {
    let time = event.get(field).map(|t| str_field(t, "dateTime"))?;
    DateTime::parse_from_rfc3339(time).ok()
}

/// Calendar date an event starts on: its timed start, or the all-day date
fn event_date(event: &Value) -> Option<String> {
    if let Some(start) = timed(event, "start") {
        return Some(start.format("%Y-%m-%d").to_string());
    }
    let date = event.get("start").map(|s| str_field(s, "date"))?;
    (!date.is_empty()).then(|| date.to_string())
}

/// Events keyed by start date; events without a usable start are left out
fn group_by_day(events: &[Value]) -> Map<String, Value> {
    let mut by_day = Map::new();
    for event in events {
        let Some(date) = event_date(event) else {
            continue;
        };
        if let Value::Array(day) = by_day.entry(date).or_insert_with(|| json!([])) {
            day.push(event.clone());
        }
    }
    by_day
}

fn availability_status(busy_hours: f64) -> &'static str {
    if busy_hours < 3.0 {
        "available"
    } else if busy_hours < 6.0 {
        "moderate"
    } else if busy_hours < 8.0 {
        "busy"
    } else {
        "very_busy"
    }
}

/// Busy and free hours for the 7 days starting at `now`.
///
/// Only timed events count; all-day events and events without a parsable
/// end are ignored. An event is attributed to the day it starts on.
fn availability(events: &[Value], now: DateTime<FixedOffset>) -> Map<String, Value> {
    let mut days = Map::new();

    for offset in 0..7 {
        let day = now + ChronoDuration::days(offset);
        let key = day.format("%Y-%m-%d").to_string();

        let mut busy_hours = 0.0;
        let mut event_count = 0;
        for event in events {
            let (Some(start), Some(end)) = (timed(event, "start"), timed(event, "end")) else {
                continue;
            };
            if start.format("%Y-%m-%d").to_string() != key {
                continue;
            }
            busy_hours += (end - start).num_seconds() as f64 / 3600.0;
            event_count += 1;
        }

        days.insert(
            key,
            json!({
                "day_name": day.format("%A").to_string(),
                "busy_hours": busy_hours,
                "free_hours": (WORKDAY_HOURS - busy_hours).max(0.0),
                "event_count": event_count,
                "status": availability_status(busy_hours),
            }),
        );
    }

    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn at(time: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(time).unwrap()
    }

    fn timed_event(id: &str, start: &str, end: &str) -> Value {
        json!({"id": id, "start": {"dateTime": start}, "end": {"dateTime": end}})
    }

    #[test]
    fn test_start_of_day_keeps_offset() {
        let start = start_of_day(at("2024-03-14T17:45:12.250+02:00"));
        assert_eq!(start, at("2024-03-14T00:00:00+02:00"));
    }

    #[test]
    fn test_group_by_day() {
        let events = vec![
            timed_event("a", "2024-03-11T09:00:00Z", "2024-03-11T10:00:00Z"),
            json!({"id": "b", "start": {"date": "2024-03-12"}, "end": {"date": "2024-03-13"}}),
            timed_event("c", "2024-03-11T15:00:00Z", "2024-03-11T16:00:00Z"),
            json!({"id": "d", "start": {}}),
        ];

        let grouped = group_by_day(&events);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["2024-03-11"].as_array().unwrap().len(), 2);
        assert_eq!(grouped["2024-03-12"][0]["id"], "b");
    }

    #[test]
    fn test_availability_status_thresholds() {
        assert_eq!(availability_status(0.0), "available");
        assert_eq!(availability_status(2.5), "available");
        assert_eq!(availability_status(3.0), "moderate");
        assert_eq!(availability_status(6.0), "busy");
        assert_eq!(availability_status(7.9), "busy");
        assert_eq!(availability_status(8.0), "very_busy");
    }

    #[test]
    fn test_availability_counts_timed_events() {
        let now = at("2024-03-11T08:00:00Z");
        let events = vec![
            timed_event("a", "2024-03-11T09:00:00Z", "2024-03-11T10:30:00Z"),
            timed_event("b", "2024-03-11T13:00:00Z", "2024-03-11T15:00:00Z"),
            timed_event("c", "2024-03-12T08:00:00Z", "2024-03-12T20:00:00Z"),
            json!({"id": "all-day", "start": {"date": "2024-03-13"}, "end": {"date": "2024-03-14"}}),
        ];

        let days = availability(&events, now);
        assert_eq!(days.len(), 7);

        let monday = &days["2024-03-11"];
        assert_eq!(monday["day_name"], "Monday");
        assert_eq!(monday["busy_hours"], 3.5);
        assert_eq!(monday["free_hours"], 6.5);
        assert_eq!(monday["event_count"], 2);
        assert_eq!(monday["status"], "moderate");

        let tuesday = &days["2024-03-12"];
        assert_eq!(tuesday["free_hours"], 0.0);
        assert_eq!(tuesday["status"], "very_busy");

        assert_eq!(days["2024-03-13"]["event_count"], 0);
        assert!(days.contains_key("2024-03-17"));
    }

    #[tokio::test]
    async fn test_list_and_unknown_uri() {
        let config = Config::ish("http://127.0.0.1:9", "testuser");
        let handler = ResourceHandler::from_tools(&ToolHandler::from_config(&config).unwrap());

        let resources = handler.list_resources();
        assert_eq!(resources.len(), 8);
        assert!(resources
            .iter()
            .all(|r| r.uri.starts_with("gsuite://") && r.mime_type.as_deref() == Some(JSON_MIME)));

        let err = handler.read("gsuite://calendar/yesterday").await.unwrap_err();
        assert!(err.to_string().contains("gsuite://calendar/yesterday"));
    }
}
