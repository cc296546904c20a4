//! Turning raw message bytes into something a person can read.
//!
//! Only what is needed to show a notification is decoded: the header fields, a `text/plain`
//! body, and the branches of a `multipart/alternative` body. Quoted-printable parts are decoded;
//! any other transfer encoding is passed through untouched.
//!
//! Framing, unfolding and RFC 2047 decoding are done by `mailparse`. Encoded words it cannot
//! decode are left in place, and are reported here as errors.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, FixedOffset};
use lazy_static::lazy_static;
use mailparse::body::Body;
use mailparse::{MailHeaderMap, ParsedMail};
use regex::Regex;

use crate::error::DecodeError;

const TEXT_PLAIN: &str = "text/plain";

lazy_static! {
    static ref ENCODED_WORD: Regex =
        Regex::new(r"=\?([^?\s]+)\?([BbQq])\?([^?\s]*)\?=").unwrap();
}

/// A decoded message.
///
/// Bodies are kept per content type. A `text/plain` message has a single `text/plain` entry; a
/// `multipart/alternative` message has one entry per distinct content type among its parts, and
/// when two parts share a content type the later one wins. Messages of any other type have no
/// bodies at all.
///
/// ```
/// use mailwatch::Message;
///
/// let raw = b"Subject: =?utf-8?q?Caf=C3=A9?=\r\nContent-Type: text/plain\r\n\r\nSee you there.";
/// let message = Message::parse(raw).unwrap();
/// assert_eq!(message.subject().unwrap(), "Café");
/// assert_eq!(message.plain_text().unwrap(), "See you there.");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    headers: Vec<(String, String)>,
    parts: BTreeMap<String, Vec<u8>>,
}

fn malformed(why: impl Into<String>) -> DecodeError {
    DecodeError::MalformedHeader(why.into())
}

/// Every header line is either a continuation or `name: value` with a printable name.
fn check_framing(raw: &[u8]) -> Result<(), DecodeError> {
    for (n, line) in raw.split(|&b| b == b'\n').enumerate() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            return Ok(());
        }
        if line[0] == b' ' || line[0] == b'\t' {
            if n == 0 {
                return Err(malformed("continuation line before the first field"));
            }
            continue;
        }
        match line.iter().position(|&b| b == b':') {
            Some(colon) if colon > 0 && line[..colon].iter().all(u8::is_ascii_graphic) => {}
            _ => {
                return Err(malformed(format!(
                    "not a header field: {:?}",
                    String::from_utf8_lossy(line)
                )))
            }
        }
    }
    Ok(())
}

/// The undecoded bytes of a body, whatever its transfer encoding.
fn raw_bytes<'a>(body: &Body<'a>) -> &'a [u8] {
    match body {
        Body::Base64(encoded) => encoded.get_raw(),
        Body::QuotedPrintable(encoded) => encoded.get_raw(),
        Body::SevenBit(text) => text.get_raw(),
        Body::EightBit(text) => text.get_raw(),
        Body::Binary(binary) => binary.get_raw(),
    }
}

/// The media type of `part` without parameters, lower-cased. Empty if the part has none.
fn part_type(part: &ParsedMail<'_>) -> String {
    part.headers
        .get_first_value("Content-Type")
        .map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
        .unwrap_or_default()
}

/// Fail on an encoded word `mailparse` could not decode.
fn check_decoded(value: &str) -> Result<String, DecodeError> {
    let caps = match ENCODED_WORD.captures(value) {
        Some(caps) => caps,
        None => return Ok(value.to_string()),
    };
    let charset = caps[1].split('*').next().unwrap_or_default();
    let payload_ok = match &caps[2] {
        "B" | "b" => STANDARD.decode(&caps[3]).is_ok(),
        _ => true,
    };
    if payload_ok {
        Err(DecodeError::Charset(charset.to_string()))
    } else {
        Err(DecodeError::EncodedWord(caps[0].to_string()))
    }
}

impl Message {
    /// Decode `raw`, the full message as delivered by the server.
    pub fn parse(raw: &[u8]) -> Result<Message, DecodeError> {
        if raw.is_empty() {
            return Err(malformed("empty message"));
        }
        check_framing(raw)?;
        let mail = mailparse::parse_mail(raw).map_err(|e| malformed(e.to_string()))?;

        let headers: Vec<(String, String)> = mail
            .headers
            .iter()
            .map(|h| (h.get_key(), h.get_value()))
            .collect();
        let content_type = mail
            .headers
            .get_first_value("Content-Type")
            .unwrap_or_default()
            .to_ascii_lowercase();

        let mut parts = BTreeMap::new();
        if content_type.starts_with(TEXT_PLAIN) {
            parts.insert(
                TEXT_PLAIN.to_string(),
                raw_bytes(&mail.get_body_encoded()).to_vec(),
            );
        } else if content_type.starts_with("multipart/alternative") {
            let boundary = mail
                .ctype
                .params
                .get("boundary")
                .filter(|b| !b.is_empty())
                .ok_or(DecodeError::MissingBoundary)?;
            let close = format!("--{}--", boundary);
            let body = raw_bytes(&mail.get_body_encoded());
            if !body.windows(close.len()).any(|w| w == close.as_bytes()) {
                return Err(DecodeError::MalformedMultipart(format!(
                    "no closing {} delimiter",
                    close
                )));
            }

            for part in &mail.subparts {
                let key = part_type(part);
                if key.is_empty() {
                    continue;
                }
                let content = match part.get_body_encoded() {
                    Body::QuotedPrintable(encoded) => encoded
                        .get_decoded()
                        .map_err(|e| DecodeError::MalformedMultipart(e.to_string()))?,
                    other => raw_bytes(&other).to_vec(),
                };
                parts.insert(key, content);
            }
        }

        Ok(Message { headers, parts })
    }

    /// The first header field called `name`, unfolded and with encoded words decoded. Names are
    /// compared without regard to case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All header fields, in the order they appeared.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// The decoded `Subject`, or an empty string if there is none.
    pub fn subject(&self) -> Result<String, DecodeError> {
        check_decoded(self.header("Subject").unwrap_or_default())
    }

    /// The decoded `From`, or an empty string if there is none.
    pub fn from(&self) -> Result<String, DecodeError> {
        check_decoded(self.header("From").unwrap_or_default())
    }

    /// The `Date` the message was written, if present and valid RFC 2822.
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc2822(self.header("Date")?).ok()
    }

    /// The `text/plain` body.
    pub fn plain_text(&self) -> Result<String, DecodeError> {
        self.part(TEXT_PLAIN)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .ok_or_else(|| DecodeError::NotFound(TEXT_PLAIN.to_string()))
    }

    /// The body stored for `content_type`, such as `text/html`.
    pub fn part(&self, content_type: &str) -> Option<&[u8]> {
        self.parts
            .get(&content_type.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    /// Every decoded body with its content type.
    pub fn parts(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.parts.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}
