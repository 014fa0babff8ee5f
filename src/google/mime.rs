//! RFC 2822 message construction for the Gmail send and draft endpoints

use base64::{engine::general_purpose::URL_SAFE, Engine};

/// Tags whose presence marks a body as HTML
const HTML_MARKERS: &[&str] = &[
    "<html", "<!doctype", "<body", "<div", "<p>", "<br>", "<br/>", "<br />", "<span", "<a ",
    "<table",
];

/// Detect an HTML body by looking for common tags (case-insensitive)
pub fn is_html(body: &str) -> bool {
    let lower = body.to_lowercase();
    HTML_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Strip CR and LF so a value cannot inject extra headers
pub fn sanitize_header(value: &str) -> String {
    value.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

/// References header for a reply: the original chain plus its Message-ID
pub fn build_references(original_message_id: &str, original_references: &str) -> String {
    match (original_message_id, original_references) {
        ("", references) => references.to_string(),
        (id, "") => id.to_string(),
        (id, references) => format!("{} {}", references, id),
    }
}

/// Prefix "Re: " unless the subject already starts with it
pub fn ensure_reply_subject(subject: &str) -> String {
    let already_reply = subject
        .get(..3)
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case("re:"));
    if already_reply {
        subject.to_string()
    } else {
        format!("Re: {}", subject)
    }
}

/// Outgoing email
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub to: String,
    pub cc: String,
    pub bcc: String,
    pub subject: String,
    pub body: String,
    pub in_reply_to: String,
    pub references: String,
}

impl OutgoingMessage {
    /// Render headers and body, choosing text/html or text/plain
    pub fn render(&self) -> String {
        let mut message = String::new();
        let mut header = |name: &str, value: &str| {
            if !value.is_empty() {
                message.push_str(&format!("{}: {}\r\n", name, sanitize_header(value)));
            }
        };

        header("To", &self.to);
        header("Cc", &self.cc);
        header("Bcc", &self.bcc);
        header("Subject", &self.subject);
        header("In-Reply-To", &self.in_reply_to);
        header("References", &self.references);

        let content_type = if is_html(&self.body) {
            "text/html"
        } else {
            "text/plain"
        };
        message.push_str(&format!(
            "Content-Type: {}; charset=\"UTF-8\"\r\n",
            content_type
        ));
        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("\r\n");
        message.push_str(&self.body);
        message
    }

    /// Rendered message as the base64url `raw` field
    pub fn encode_raw(&self) -> String {
        URL_SAFE.encode(self.render().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_html() {
        assert!(is_html("<p>Hello</p>"));
        assert!(is_html("<!DOCTYPE html><html></html>"));
        assert!(is_html("Line one<BR>Line two"));
        assert!(is_html("see <a href=\"x\">link</a>"));
        assert!(!is_html("Plain text with a < sign"));
        assert!(!is_html("<pre>code</pre>"));
    }

    #[test]
    fn test_sanitize_header() {
        assert_eq!(
            sanitize_header("Hello\r\nBcc: attacker@example.com"),
            "HelloBcc: attacker@example.com"
        );
    }

    #[test]
    fn test_build_references() {
        assert_eq!(build_references("<b@x>", "<a@x>"), "<a@x> <b@x>");
        assert_eq!(build_references("<b@x>", ""), "<b@x>");
        assert_eq!(build_references("", "<a@x>"), "<a@x>");
    }

    #[test]
    fn test_ensure_reply_subject() {
        assert_eq!(ensure_reply_subject("Meeting"), "Re: Meeting");
        assert_eq!(ensure_reply_subject("RE: Meeting"), "RE: Meeting");
        assert_eq!(ensure_reply_subject("re:Meeting"), "re:Meeting");
        assert_eq!(ensure_reply_subject(""), "Re: ");
    }

    #[test]
    fn test_render_plain_message() {
        let message = OutgoingMessage {
            to: "bob@example.com".to_string(),
            subject: "Hi".to_string(),
            body: "Just text".to_string(),
            ..Default::default()
        };
        assert_eq!(
            message.render(),
            "To: bob@example.com\r\nSubject: Hi\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\nMIME-Version: 1.0\r\n\r\nJust text"
        );
    }

    #[test]
    fn test_render_reply_html_message() {
        let message = OutgoingMessage {
            to: "bob@example.com".to_string(),
            cc: "carol@example.com".to_string(),
            subject: "Re: Hi".to_string(),
            body: "<div>Thanks</div>".to_string(),
            in_reply_to: "<orig@mail>".to_string(),
            references: "<orig@mail>".to_string(),
            ..Default::default()
        };
        let rendered = message.render();
        assert!(rendered.contains("Cc: carol@example.com\r\n"));
        assert!(!rendered.contains("Bcc:"));
        assert!(rendered.contains("In-Reply-To: <orig@mail>\r\n"));
        assert!(rendered.contains("Content-Type: text/html; charset=\"UTF-8\"\r\n"));
        assert!(rendered.ends_with("\r\n\r\n<div>Thanks</div>"));
    }

    #[test]
    fn test_encode_raw_is_url_safe() {
        let message = OutgoingMessage {
            to: "a@b.c".to_string(),
            subject: "??>>".to_string(),
            body: "???>>>".to_string(),
            ..Default::default()
        };
        let raw = message.encode_raw();
        assert!(!raw.contains('+'));
        assert!(!raw.contains('/'));
        let decoded = URL_SAFE.decode(raw).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), message.render());
    }
}
