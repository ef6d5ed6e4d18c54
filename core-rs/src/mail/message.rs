//! Composing notifications and reading them back
//!
//! Messages are built with `lettre`. Reading a delivered message back out of
//! a mailbox handles unfolded headers with RFC 2047 encoded words,
//! single-part and multipart bodies, base64 and quoted-printable transfer
//! encodings.

use std::time::SystemTime;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::{Address, Message};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::compare::Mismatch;
use crate::errors::{EpnError, Result, TransportError};

static ENCODED_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"=\?([^?]+)\?([bBqQ])\?([^?]*)\?=").expect("encoded word pattern")
});

static ADJACENT_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\?=\s+=\?").expect("adjacent encoded word pattern"));

static BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)boundary\s*=\s*"?([^";]+)"?"#).expect("boundary pattern"));

/// Decoded leaf part of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePart {
    pub content_type: String,
    pub body: Vec<u8>,
}

impl MessagePart {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Parsed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    headers: Vec<(String, String)>,
    parts: Vec<MessagePart>,
}

impl MailMessage {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(raw).replace("\r\n", "\n");
        let text = strip_envelope_line(&text);
        let (head, body) = split_head_body(text);
        let headers = parse_headers(head);
        let parts = parse_entity(&headers, body)?;
        Ok(Self { headers, parts })
    }

    /// First header with this name, encoded words decoded
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| decode_header_value(value))
    }

    pub fn parts(&self) -> &[MessagePart] {
        &self.parts
    }

    /// Decoded text of every non-multipart part
    pub fn text_parts(&self) -> impl Iterator<Item = String> + '_ {
        self.parts.iter().map(MessagePart::text)
    }

    pub fn body_contains(&self, needle: &str) -> bool {
        self.text_parts().any(|text| text.contains(needle))
    }

    /// Check headers and body against what the notifier should have sent
    pub fn validate(&self, expected: &ExpectedMail) -> std::result::Result<(), Mismatch> {
        let checks = [
            ("To", &expected.to),
            ("From", &expected.from),
            ("Subject", &expected.subject),
        ];
        for (name, want) in checks {
            let got = self.header(name);
            let same = match got.as_deref() {
                Some(value) if name == "Subject" => value == want,
                Some(value) => same_mailbox(value, want),
                None => false,
            };
            if !same {
                return Err(Mismatch::Mail(format!(
                    "{} header is {:?}, expected {:?}",
                    name, got, want
                )));
            }
        }
        if !self.body_contains(&expected.body_contains) {
            return Err(Mismatch::Mail(format!(
                "no part of the body contains {:?}",
                expected.body_contains
            )));
        }
        Ok(())
    }
}

/// What a delivered notification must look like
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedMail {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body_contains: String,
}

/// Address headers compare by mailbox, so quoting of the display name is
/// not significant
fn same_mailbox(got: &str, want: &str) -> bool {
    match (got.parse::<Mailbox>(), want.parse::<Mailbox>()) {
        (Ok(got), Ok(want)) => got == want,
        _ => got == want,
    }
}

/// Builds a single-part `text/plain` notification
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    from: String,
    to: String,
    subject: String,
    body: String,
    charset: String,
    date: Option<DateTime<Utc>>,
}

impl MessageBuilder {
    /// `from` is the full header value, e.g. `IPA-EPN <noreply@ipa.test>`
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: String::new(),
            body: String::new(),
            charset: "utf-8".to_string(),
            date: None,
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Raw RFC 5322 bytes, ready for a transport
    ///
    /// A recipient or sender that is not a valid address is rejected before
    /// anything is handed to the transport.
    pub fn build(&self) -> std::result::Result<Vec<u8>, TransportError> {
        let rejected = |reason: String| TransportError::Rejected {
            recipient: self.to.clone(),
            reason,
        };

        let from: Mailbox = self
            .from
            .parse()
            .map_err(|e| rejected(format!("invalid sender {:?}: {}", self.from, e)))?;
        let to: Address = self
            .to
            .parse()
            .map_err(|e| rejected(format!("invalid recipient: {}", e)))?;
        let content_type = ContentType::parse(&format!("text/plain; charset={}", self.charset))
            .map_err(|e| rejected(format!("invalid charset {:?}: {}", self.charset, e)))?;

        let mut builder = Message::builder()
            .from(from)
            .to(Mailbox::new(None, to))
            .subject(self.subject.clone())
            .header(content_type);
        if let Some(date) = self.date {
            builder = builder.date(SystemTime::from(date));
        }
        let message = builder
            .body(self.body.clone())
            .map_err(|e| rejected(e.to_string()))?;
        Ok(message.formatted())
    }
}

fn strip_envelope_line(text: &str) -> &str {
    // mbox spool files start with "From <sender> <date>"
    if text.starts_with("From ") {
        match text.find('\n') {
            Some(end) => &text[end + 1..],
            None => "",
        }
    } else {
        text
    }
}

fn split_head_body(text: &str) -> (&str, &str) {
    match text.find("\n\n") {
        Some(index) => (&text[..index], &text[index + 2..]),
        None => (text, ""),
    }
}

fn parse_headers(head: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();
    for line in head.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    headers
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn parse_entity(headers: &[(String, String)], body: &str) -> Result<Vec<MessagePart>> {
    let content_type = header_value(headers, "Content-Type")
        .unwrap_or("text/plain")
        .to_string();

    if content_type.to_ascii_lowercase().starts_with("multipart/") {
        let boundary = BOUNDARY
            .captures(&content_type)
            .map(|caps| caps[1].trim().to_string())
            .ok_or_else(|| EpnError::Mail(format!("multipart without boundary: {}", content_type)))?;
        return parse_multipart(body, &boundary);
    }

    let encoding = header_value(headers, "Content-Transfer-Encoding")
        .unwrap_or("7bit")
        .to_ascii_lowercase();
    let body = decode_body(body, &encoding)?;
    Ok(vec![MessagePart { content_type, body }])
}

fn parse_multipart(body: &str, boundary: &str) -> Result<Vec<MessagePart>> {
    let delimiter = format!("--{}", boundary);
    let mut parts = Vec::new();
    for chunk in body.split(delimiter.as_str()).skip(1) {
        if chunk.starts_with("--") {
            break;
        }
        let chunk = chunk.strip_prefix('\n').unwrap_or(chunk);
        let chunk = chunk.strip_suffix('\n').unwrap_or(chunk);
        let (head, part_body) = split_head_body(chunk);
        let part_headers = parse_headers(head);
        parts.extend(parse_entity(&part_headers, part_body)?);
    }
    Ok(parts)
}

fn decode_body(body: &str, encoding: &str) -> Result<Vec<u8>> {
    match encoding {
        "base64" => {
            let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
            general_purpose::STANDARD
                .decode(compact.as_bytes())
                .map_err(|e| EpnError::Mail(format!("invalid base64 body: {}", e)))
        }
        "quoted-printable" => Ok(decode_quoted(&body.replace("=\n", ""), false)),
        _ => Ok(body.as_bytes().to_vec()),
    }
}

/// `=XX` escapes; `_` is a space only inside encoded words
fn decode_quoted(text: &str, underscore_is_space: bool) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'=' if i + 2 < bytes.len() => {
                match std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'=');
                        i += 1;
                    }
                }
            }
            b'_' if underscore_is_space => {
                out.push(b' ');
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    out
}

/// Decode RFC 2047 encoded words; undecodable words are left as they are
pub fn decode_header_value(value: &str) -> String {
    let joined = ADJACENT_WORDS.replace_all(value, "?==?");
    ENCODED_WORD
        .replace_all(&joined, |caps: &Captures| {
            let payload = &caps[3];
            let decoded = match &caps[2] {
                "b" | "B" => general_purpose::STANDARD.decode(payload.as_bytes()).ok(),
                _ => Some(decode_quoted(payload, true)),
            };
            match decoded {
                Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
