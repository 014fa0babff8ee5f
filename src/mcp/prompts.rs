//! MCP prompts
//!
//! Workflow templates that walk the model through common mailbox, calendar
//! and contact tasks using the tools this server exposes.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDate};

use crate::error::{McpError, Result};
use crate::google::calendar::{format_rfc3339, local_now};
use crate::mcp::types::{
    GetPromptResult, Prompt, PromptArgument, PromptMessage, Role, ToolResultContent,
};

/// (name, description, required)
type ArgumentDef = (&'static str, &'static str, bool);

struct PromptDef {
    name: &'static str,
    description: &'static str,
    arguments: &'static [ArgumentDef],
}

const PROMPTS: [PromptDef; 8] = [
    PromptDef {
        name: "email_triage",
        description: "Sort unread email into what needs action and what can be archived",
        arguments: &[("priority", "Which mail to focus on: urgent, normal or all", false)],
    },
    PromptDef {
        name: "schedule_meeting",
        description: "Find free slots on the calendar and book a meeting",
        arguments: &[
            ("duration", "Meeting length in minutes (default: 30)", false),
            ("attendees", "Comma-separated attendee email addresses", false),
        ],
    },
    PromptDef {
        name: "compose_email",
        description: "Draft a well-structured email",
        arguments: &[
            ("context", "What the email is about", true),
            ("tone", "Tone to write in, e.g. formal, casual or friendly", false),
        ],
    },
    PromptDef {
        name: "find_contact",
        description: "Look up a contact and their details",
        arguments: &[("search_term", "Name, email address or organization to look for", true)],
    },
    PromptDef {
        name: "calendar_summary",
        description: "Summarize the calendar over a period",
        arguments: &[("period", "today, tomorrow, this_week or next_week", false)],
    },
    PromptDef {
        name: "follow_up_reminder",
        description: "Schedule a reminder to follow up on an email or meeting",
        arguments: &[
            ("context", "What needs following up", true),
            ("when", "tomorrow, next_week or a date as YYYY-MM-DD", false),
        ],
    },
    PromptDef {
        name: "email_reply",
        description: "Reply to an email inside its existing thread",
        arguments: &[
            ("subject", "Subject of the email being answered", false),
            ("sender", "Who sent the email being answered", false),
            ("context", "Anything the reply should cover", false),
        ],
    },
    PromptDef {
        name: "add_contact_from_email",
        description: "Pull contact details out of an email and save them",
        arguments: &[
            ("email_subject", "Subject of the email holding the contact details", true),
            ("sender", "Sender name or address", false),
        ],
    },
];

pub fn list_prompts() -> Vec<Prompt> {
    PROMPTS
        .iter()
        .map(|def| Prompt {
            name: def.name.to_string(),
            description: Some(def.description.to_string()),
            arguments: def
                .arguments
                .iter()
                .map(|(name, description, required)| PromptArgument {
                    name: name.to_string(),
                    description: Some(description.to_string()),
                    required: *required,
                })
                .collect(),
        })
        .collect()
}

/// Render a prompt relative to the current local time
pub fn get_prompt(name: &str, arguments: &BTreeMap<String, String>) -> Result<GetPromptResult> {
    render_prompt(name, arguments, local_now())
}

/// Argument lookup where an empty string counts as absent
struct Args<'a>(&'a BTreeMap<String, String>);

impl<'a> Args<'a> {
    fn get(&self, name: &str) -> Option<&'a str> {
        self.0
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn or(&self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    fn required(&self, name: &str) -> Result<&'a str> {
        self.get(name).ok_or_else(|| {
            McpError::MissingPromptArgument {
                name: name.to_string(),
            }
            .into()
        })
    }
}

pub fn render_prompt(
    name: &str,
    arguments: &BTreeMap<String, String>,
    now: DateTime<FixedOffset>,
) -> Result<GetPromptResult> {
    let args = Args(arguments);
    let (description, text) = match name {
        "email_triage" => email_triage(&args),
        "schedule_meeting" => schedule_meeting(&args),
        "compose_email" => compose_email(&args),
        "find_contact" => find_contact(&args)?,
        "calendar_summary" => calendar_summary(&args),
        "follow_up_reminder" => follow_up_reminder(&args, now)?,
        "email_reply" => email_reply(&args),
        "add_contact_from_email" => add_contact_from_email(&args)?,
        _ => {
            return Err(McpError::UnknownPrompt {
                name: name.to_string(),
            }
            .into())
        }
    };

    Ok(GetPromptResult {
        description: Some(description.to_string()),
        messages: vec![PromptMessage {
            role: Role::User,
            content: ToolResultContent::Text { text },
        }],
    })
}

fn email_triage(args: &Args) -> (&'static str, String) {
    let priority = args.or("priority", "all");
    let query = if priority == "urgent" {
        "is:unread is:important"
    } else {
        "is:unread"
    };

    let text = format!(
        r#"Let's triage the inbox.

1. Fetch the {priority} unread mail with gmail_list_messages, query "{query}", hydrate=true.
2. Put every message in one bucket:
   - needs action now
   - can wait for a reply later
   - for information only
   - nothing to do
3. Propose an action per bucket: a short reply for urgent items, archiving for the rest, unsubscribing from senders that are noise.

Never delete mail. Archive it by removing the INBOX label with gmail_modify_labels, and use labels to organize what stays.

Start by fetching the unread messages."#
    );

    ("Inbox triage workflow for unread email", text)
}

fn schedule_meeting(args: &Args) -> (&'static str, String) {
    let duration = args.or("duration", "30");
    let attendees = args
        .get("attendees")
        .map(|list| format!(" with {}", list))
        .unwrap_or_default();

    let text = format!(
        r#"Let's book a {duration}-minute meeting{attendees}.

1. Read the next 7 days of the calendar with calendar_list_events.
2. Find open {duration}-minute slots that:
   - do not overlap an existing event
   - fall between 9 AM and 5 PM
   - leave 15 minutes before and after other meetings
   - avoid the 12-1 PM lunch hour
3. Offer 3 to 5 of the best slots. When attendees are in other time zones, give each time in both zones.
4. Once a slot is chosen, create the event with calendar_create_event.

Start by checking the calendar."#
    );

    ("Find a free slot and schedule a meeting", text)
}

fn compose_email(args: &Args) -> (&'static str, String) {
    let context = args.or("context", "a professional email");
    let tone = args.or("tone", "professional");

    let text = format!(
        r#"Let's write {context}, in a {tone} tone.

First find out whether this is a new message or a reply. For a reply, locate the original with gmail_list_messages so the answer stays in its thread.

Shape of the email:
1. A specific subject line
2. A greeting that suits the tone
3. One line of context
4. The message itself in two or three short paragraphs
5. A clear next step for the reader
6. A sign-off

Keep it under 200 words and use bullets for lists.

Always save the result as a draft with gmail_create_draft; do not send it. For replies, pass the original message id as in_reply_to so threading headers are filled in.

Tell me who it is for, what it needs to say, and whether it answers an existing email."#
    );

    ("Draft a clear, well-structured email", text)
}

fn find_contact(args: &Args) -> Result<(&'static str, String)> {
    let term = args.required("search_term")?;

    let text = format!(
        r#"Let's find "{term}" in the contacts.

1. Search with people_search_contacts, query "{term}".
2. For each match show the name, organization, email addresses and phone numbers.
3. Load the best match in full with people_get_contact.
4. Offer next steps: write to them, set up a meeting or correct their details.

Before creating a new contact, always search for an existing one first to avoid duplicates.

Start the search now."#
    );

    Ok(("Look up a contact and show their details", text))
}

fn calendar_summary(args: &Args) -> (&'static str, String) {
    let period = args.or("period", "today").to_ascii_lowercase();
    let (label, window) = match period.as_str() {
        "today" => ("today's schedule", "the next 24 hours"),
        "tomorrow" => ("tomorrow's schedule", "tomorrow, 24 to 48 hours from now"),
        "this_week" => ("this week's schedule", "the next 7 days"),
        "next_week" => ("next week's schedule", "7 to 14 days from now"),
        _ => ("the schedule for the period", "the requested period"),
    };

    let text = format!(
        r#"Let's summarize {label}.

1. Fetch the events for {window} with calendar_list_events.
2. Group them by day and separate meetings with other people, blocked focus time and all-day events.
3. Total the hours spent in meetings, the free time left and the busiest day.
4. Call out recurring meetings, large meetings and anything tied to a deadline.

Finish with a day-by-day list and a short note on how heavy the load is."#
    );

    ("Summarize the calendar for a period", text)
}

/// Resolve `when` to the reminder instant and how to describe it.
/// Anything unrecognised falls back to tomorrow.
fn reminder_time(when: &str, now: DateTime<FixedOffset>) -> (String, String) {
    let tomorrow = (
        format_rfc3339(&(now + ChronoDuration::days(1))),
        "tomorrow at 9 AM".to_string(),
    );

    match when.to_ascii_lowercase().as_str() {
        "tomorrow" => tomorrow,
        "next_week" => (
            format_rfc3339(&(now + ChronoDuration::days(7))),
            "next week at 9 AM".to_string(),
        ),
        other => match NaiveDate::parse_from_str(other, "%Y-%m-%d") {
            Ok(date) => (
                format!("{}T00:00:00Z", date.format("%Y-%m-%d")),
                format!("{} at 9 AM", date.format("%B %-d")),
            ),
            Err(_) => tomorrow,
        },
    }
}

fn follow_up_reminder(
    args: &Args,
    now: DateTime<FixedOffset>,
) -> Result<(&'static str, String)> {
    let context = args.required("context")?;
    let (at, described) = reminder_time(args.or("when", "tomorrow"), now);

    let text = format!(
        r#"Let's make sure "{context}" gets followed up.

1. Add a reminder to the calendar for {described} with calendar_create_event:
   - summary "Follow up: {context}"
   - a description listing what needs to happen
2. As a backup, email yourself with gmail_send_message:
   - subject "Follow-up needed: {context}"
   - the context and the concrete next steps in the body

Reminder time: {at}

Create the reminder now."#
    );

    Ok(("Set up a follow-up reminder", text))
}

/// Gmail search query for the message being answered
fn reply_query(subject: Option<&str>, sender: Option<&str>) -> String {
    match (subject, sender) {
        (Some(subject), Some(sender)) => format!("subject:\"{}\" from:{}", subject, sender),
        (Some(subject), None) => format!("subject:\"{}\"", subject),
        (None, Some(sender)) => format!("from:{}", sender),
        (None, None) => String::new(),
    }
}

fn email_reply(args: &Args) -> (&'static str, String) {
    let query = reply_query(args.get("subject"), args.get("sender"));
    let extra = args
        .get("context")
        .map(|context| format!("\n\nThe reply should cover:\n{}", context))
        .unwrap_or_default();

    let text = format!(
        r#"Let's answer an email without breaking its thread.

1. Find the original with gmail_list_messages, query: {query}
2. Read it in full with gmail_get_message: the body, every To and Cc recipient and the subject.
3. Create the reply with gmail_create_draft:
   - to: the address being answered, given explicitly
   - in_reply_to: the original message id, so thread id, In-Reply-To and References are set
   - subject: the original subject; "Re:" is added when missing
   - body: the answer, with no signature unless asked for
4. Confirm the draft landed in the original conversation.{extra}

Always draft; never send directly.

Start by searching for the original message."#
    );

    ("Reply to an email within its thread", text)
}

fn add_contact_from_email(args: &Args) -> Result<(&'static str, String)> {
    let subject = args.required("email_subject")?;
    let query = reply_query(Some(subject), args.get("sender"));

    let text = format!(
        r#"Let's turn the details in an email into a contact.

1. Find and read the email with gmail_list_messages and gmail_get_message, query: {query}
2. Collect what it says about the person: name, email addresses, phone numbers, organization, job title and location, plus how you know them.
3. Check for an existing entry first with people_search_contacts, by email address and by name. Never create a contact without checking.
4. Save the person with people_create_contact, or update the existing entry with people_update_contact.
5. If the email is about a possible engagement or partnership, note it as an opportunity to follow up.

Start by finding the email."#
    );

    Ok(("Save contact details found in an email", text))
}
