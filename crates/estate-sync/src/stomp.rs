//! STOMP 1.2 frame codec.
//!
//! ```text
//! COMMAND\n
//! header:value\n
//! \n
//! body\0
//! ```
//!
//! Header values are escaped (`\\`, `\n`, `\r`, `\c`) except in CONNECT and
//! CONNECTED frames. A `content-length` header, when present, bounds the
//! body; otherwise the body runs to the first NUL. Bare EOLs between frames
//! are heart-beats and are skipped.

use std::fmt;
use std::str::FromStr;

use estate_core::{defaults, Error, Result};

const NUL: char = '\0';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Error,
    Receipt,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Error => "ERROR",
            Command::Receipt => "RECEIPT",
        }
    }

    /// CONNECT and CONNECTED headers are sent verbatim.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CONNECT" | "STOMP" => Ok(Command::Connect),
            "CONNECTED" => Ok(Command::Connected),
            "SUBSCRIBE" => Ok(Command::Subscribe),
            "UNSUBSCRIBE" => Ok(Command::Unsubscribe),
            "DISCONNECT" => Ok(Command::Disconnect),
            "MESSAGE" => Ok(Command::Message),
            "ERROR" => Ok(Command::Error),
            "RECEIPT" => Ok(Command::Receipt),
            other => Err(Error::Decode(format!("Unknown STOMP command: {}", other))),
        }
    }
}

/// One STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    /// Headers in wire order. Repeated names are kept; the first one wins on lookup.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn connect(host: &str) -> Self {
        Frame::new(Command::Connect)
            .with_header("accept-version", defaults::STOMP_ACCEPT_VERSION)
            .with_header("host", host)
            .with_header("heart-beat", "0,0")
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).with_header("id", id)
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    /// Serialize to wire text, NUL included.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if name == "content-length" {
                continue;
            }
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push(NUL);
        out
    }
}

/// Decode every frame in `input`, skipping heart-beat EOLs.
///
/// A WebSocket message usually carries one frame but may carry several, or
/// only a heart-beat (in which case the result is empty).
pub fn decode_all(input: &str) -> Result<Vec<Frame>> {
    let mut frames = Vec::new();
    let mut rest = input;
    loop {
        rest = rest.trim_start_matches(['\r', '\n']);
        if rest.is_empty() {
            return Ok(frames);
        }
        let (frame, remaining) = decode_one(rest)?;
        frames.push(frame);
        rest = remaining;
    }
}

/// Decode a single frame from the start of `input`, returning the rest.
fn decode_one(input: &str) -> Result<(Frame, &str)> {
    let mut pos = 0;
    let mut lines = Vec::new();
    loop {
        let nl = input[pos..]
            .find('\n')
            .map(|i| pos + i)
            .ok_or_else(|| Error::Decode("Unterminated STOMP frame header".to_string()))?;
        let line = &input[pos..nl];
        let line = line.strip_suffix('\r').unwrap_or(line);
        pos = nl + 1;
        if line.is_empty() {
            break;
        }
        lines.push(line);
    }

    let (command_line, header_lines) = lines
        .split_first()
        .ok_or_else(|| Error::Decode("Empty STOMP frame".to_string()))?;
    let command: Command = command_line.parse()?;
    let escaped = command.escapes_headers();

    let mut headers = Vec::with_capacity(header_lines.len());
    for line in header_lines {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::Decode(format!("Malformed STOMP header: {}", line)))?;
        if escaped {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| Error::Decode(format!("Invalid content-length: {}", v)))
        })
        .transpose()?;

    let body_end = match content_length {
        Some(len) => {
            let end = pos + len;
            if end > input.len() || !input.is_char_boundary(end) {
                return Err(Error::Decode(
                    "STOMP body shorter than content-length".to_string(),
                ));
            }
            if !input[end..].starts_with(NUL) {
                return Err(Error::Decode(
                    "STOMP body not terminated after content-length".to_string(),
                ));
            }
            end
        }
        None => input[pos..]
            .find(NUL)
            .map(|i| pos + i)
            .ok_or_else(|| Error::Decode("STOMP frame missing NUL terminator".to_string()))?,
    };

    let frame = Frame {
        command,
        headers,
        body: input[pos..body_end].to_string(),
    };
    Ok((frame, &input[body_end + NUL.len_utf8()..]))
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(Error::Decode(format!(
                    "Undefined STOMP header escape: \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_subscribe() {
        let wire = Frame::subscribe("sub-0", "/topic/updates/flat").encode();
        assert_eq!(
            wire,
            "SUBSCRIBE\nid:sub-0\ndestination:/topic/updates/flat\nack:auto\n\n\0"
        );
    }

    #[test]
    fn test_encode_connect_is_not_escaped() {
        let wire = Frame::connect("localhost:8080").encode();
        assert!(wire.starts_with("CONNECT\naccept-version:1.2\nhost:localhost:8080\n"));
        assert!(wire.ends_with("\n\n\0"));
    }

    #[test]
    fn test_encode_adds_content_length() {
        let wire = Frame::new(Command::Message).with_body("42").encode();
        assert_eq!(wire, "MESSAGE\ncontent-length:2\n\n42\0");
    }

    #[test]
    fn test_decode_message_with_body() {
        let wire = "MESSAGE\ndestination:/topic/deletes/house\nsubscription:sub-1\nmessage-id:7\n\n42\0";
        let frames = decode_all(wire).unwrap();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.header("destination"), Some("/topic/deletes/house"));
        assert_eq!(frame.header("subscription"), Some("sub-1"));
        assert_eq!(frame.body, "42");
    }

    #[test]
    fn test_decode_content_length_allows_nul_in_body() {
        let wire = "MESSAGE\ncontent-length:3\n\na\0b\0";
        let frames = decode_all(wire).unwrap();
        assert_eq!(frames[0].body, "a\0b");
    }

    #[test]
    fn test_decode_multibyte_body_by_content_length() {
        let body = "{\"name\":\"Дом\"}";
        let wire = Frame::new(Command::Message)
            .with_header("destination", "/topic/updates/house")
            .with_body(body)
            .encode();
        let frames = decode_all(&wire).unwrap();
        assert_eq!(frames[0].body, body);
    }

    #[test]
    fn test_decode_skips_heartbeats_and_crlf() {
        assert!(decode_all("\n").unwrap().is_empty());
        assert!(decode_all("\r\n\n").unwrap().is_empty());

        let wire = "\nCONNECTED\r\nversion:1.2\r\n\r\n\0\n";
        let frames = decode_all(wire).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, Command::Connected);
        assert_eq!(frames[0].header("version"), Some("1.2"));
    }

    #[test]
    fn test_decode_multiple_frames() {
        let wire = format!(
            "{}{}",
            Frame::new(Command::Receipt).with_header("receipt-id", "1").encode(),
            Frame::new(Command::Message).with_body("x").encode()
        );
        let frames = decode_all(&wire).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].body, "x");
    }

    #[test]
    fn test_header_escaping_roundtrip() {
        let frame = Frame::new(Command::Message).with_header("note", "a:b\\c\nd");
        let wire = frame.encode();
        assert!(wire.contains("note:a\\cb\\\\c\\nd\n"));
        let decoded = decode_all(&wire).unwrap();
        assert_eq!(decoded[0].header("note"), Some("a:b\\c\nd"));
    }

    #[test]
    fn test_repeated_header_first_wins() {
        let wire = "MESSAGE\nfoo:first\nfoo:second\n\n\0";
        let frames = decode_all(wire).unwrap();
        assert_eq!(frames[0].header("foo"), Some("first"));
    }

    #[test]
    fn test_decode_errors() {
        assert!(decode_all("MESSAGE\n\nno terminator").is_err());
        assert!(decode_all("BOGUS\n\n\0").is_err());
        assert!(decode_all("MESSAGE\nbad-header\n\n\0").is_err());
        assert!(decode_all("MESSAGE\nx:\\t\n\n\0").is_err());
        assert!(decode_all("MESSAGE\ncontent-length:10\n\nab\0").is_err());
        assert!(decode_all("MESSAGE\ncontent-length:1\n\nab\0").is_err());
    }
}
