//! Frame parser: turns the inbound byte stream into replies and events.

use crate::{
    buffer::EslBuffer,
    command::EslResponse,
    constants::{
        CONTENT_TYPE_API_RESPONSE, CONTENT_TYPE_AUTH_REQUEST, CONTENT_TYPE_COMMAND_REPLY,
        CONTENT_TYPE_DISCONNECT_NOTICE, CONTENT_TYPE_TEXT_EVENT_JSON,
        CONTENT_TYPE_TEXT_EVENT_PLAIN, HEADER_CONTENT_LENGTH, HEADER_CONTENT_TYPE,
        HEADER_TERMINATOR, MAX_MESSAGE_SIZE,
    },
    error::{EslError, EslResult},
    event::{EslEvent, EslEventType, EventFormat},
};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;

/// Frame kinds, keyed by Content-Type.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageType {
    AuthRequest,
    CommandReply,
    ApiResponse,
    Event,
    Disconnect,
    Unknown(String),
}

impl MessageType {
    pub fn from_content_type(content_type: &str) -> Self {
        match content_type {
            CONTENT_TYPE_AUTH_REQUEST => MessageType::AuthRequest,
            CONTENT_TYPE_COMMAND_REPLY => MessageType::CommandReply,
            CONTENT_TYPE_API_RESPONSE => MessageType::ApiResponse,
            CONTENT_TYPE_TEXT_EVENT_PLAIN | CONTENT_TYPE_TEXT_EVENT_JSON => MessageType::Event,
            CONTENT_TYPE_DISCONNECT_NOTICE => MessageType::Disconnect,
            _ => MessageType::Unknown(content_type.to_string()),
        }
    }
}

/// One complete frame: envelope headers and optional body.
#[derive(Debug, Clone)]
pub struct EslMessage {
    pub message_type: MessageType,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

impl EslMessage {
    pub fn new(
        message_type: MessageType,
        headers: HashMap<String, String>,
        body: Option<String>,
    ) -> Self {
        Self {
            message_type,
            headers,
            body,
        }
    }

    pub fn into_response(self) -> EslResponse {
        EslResponse::new(self.headers, self.body)
    }
}

#[derive(Debug)]
enum ParseState {
    WaitingForHeaders,
    WaitingForBody {
        message_type: MessageType,
        headers: HashMap<String, String>,
        body_length: usize,
    },
}

/// Incremental parser. Feed bytes with [`add_data`](Self::add_data), then
/// call [`parse_message`](Self::parse_message) until it yields `None`.
pub struct EslParser {
    buffer: EslBuffer,
    state: ParseState,
}

impl EslParser {
    pub fn new() -> Self {
        Self {
            buffer: EslBuffer::new(),
            state: ParseState::WaitingForHeaders,
        }
    }

    pub fn add_data(&mut self, data: &[u8]) -> EslResult<()> {
        self.buffer
            .extend_from_slice(data);
        self.buffer
            .check_size_limits()
    }

    /// Next complete frame, or `None` if more bytes are needed.
    pub fn parse_message(&mut self) -> EslResult<Option<EslMessage>> {
        loop {
            match std::mem::replace(&mut self.state, ParseState::WaitingForHeaders) {
                ParseState::WaitingForHeaders => {
                    let Some(raw) = self
                        .buffer
                        .extract_until_pattern(HEADER_TERMINATOR.as_bytes())
                    else {
                        return Ok(None);
                    };
                    self.buffer
                        .compact();

                    let text = String::from_utf8(raw)
                        .map_err(|_| EslError::protocol_error("Invalid UTF-8 in headers"))?;
                    let headers = parse_header_block(&text)?;

                    // A frame without Content-Type means we lost sync with the stream.
                    let message_type = MessageType::from_content_type(
                        headers
                            .get(HEADER_CONTENT_TYPE)
                            .ok_or_else(|| {
                                EslError::protocol_error(
                                    "Missing Content-Type header, stream out of sync",
                                )
                            })?,
                    );

                    let body_length = match headers.get(HEADER_CONTENT_LENGTH) {
                        Some(raw_len) => raw_len
                            .trim()
                            .parse::<usize>()
                            .map_err(|_| EslError::InvalidHeader {
                                header: format!("Content-Length: {}", raw_len),
                            })?,
                        None => 0,
                    };
                    if body_length > MAX_MESSAGE_SIZE {
                        return Err(EslError::protocol_error(format!(
                            "Content-Length {} exceeds limit {}",
                            body_length, MAX_MESSAGE_SIZE
                        )));
                    }
                    if body_length == 0 {
                        return Ok(Some(EslMessage::new(message_type, headers, None)));
                    }
                    self.state = ParseState::WaitingForBody {
                        message_type,
                        headers,
                        body_length,
                    };
                }
                ParseState::WaitingForBody {
                    message_type,
                    headers,
                    body_length,
                } => {
                    let Some(raw) = self
                        .buffer
                        .extract_bytes(body_length)
                    else {
                        self.state = ParseState::WaitingForBody {
                            message_type,
                            headers,
                            body_length,
                        };
                        return Ok(None);
                    };
                    self.buffer
                        .compact();
                    let body = String::from_utf8(raw)
                        .map_err(|_| EslError::protocol_error("Invalid UTF-8 in body"))?;
                    return Ok(Some(EslMessage::new(message_type, headers, Some(body))));
                }
            }
        }
    }

    /// Decode an event frame's body according to `format`.
    pub fn parse_event(&self, message: EslMessage, format: EventFormat) -> EslResult<EslEvent> {
        if message.message_type != MessageType::Event {
            return Err(EslError::protocol_error("Not an event message"));
        }
        let mut event = match format {
            EventFormat::Plain => parse_plain_event(message)?,
            EventFormat::Json => parse_json_event(message)?,
        };
        let event_type = event
            .event_name()
            .and_then(EslEventType::parse_event_type);
        event.set_event_type(event_type);
        Ok(event)
    }
}

impl Default for EslParser {
    fn default() -> Self {
        Self::new()
    }
}

/// `Key: value` lines with percent-decoded values. Undecodable values are kept raw.
fn parse_header_block(block: &str) -> EslResult<HashMap<String, String>> {
    let mut headers = HashMap::new();
    for line in block.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, raw_value) = line
            .split_once(':')
            .ok_or_else(|| EslError::InvalidHeader {
                header: line.to_string(),
            })?;
        headers.insert(
            key.trim()
                .to_string(),
            percent_decode(raw_value.trim()),
        );
    }
    Ok(headers)
}

fn percent_decode(raw: &str) -> String {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Plain events nest a second header block inside the frame body; anything
/// after its blank line is the event's own body (e.g. a job result).
fn parse_plain_event(message: EslMessage) -> EslResult<EslEvent> {
    let body = message
        .body
        .ok_or_else(|| EslError::protocol_error("Plain event missing body"))?;

    let (header_section, inner_body) = match body.split_once(HEADER_TERMINATOR) {
        Some((head, rest)) => (head, Some(rest)),
        None => (body.as_str(), None),
    };

    let mut event = EslEvent::new();
    for line in header_section.lines() {
        if let Some((key, value)) = line
            .trim()
            .split_once(':')
        {
            event.set_header(key.trim(), percent_decode(value.trim()));
        }
    }
    if let Some(ib) = inner_body.filter(|ib| !ib.is_empty()) {
        event.set_body(ib);
    }
    Ok(event)
}

fn parse_json_event(message: EslMessage) -> EslResult<EslEvent> {
    let body = message
        .body
        .ok_or_else(|| EslError::protocol_error("JSON event missing body"))?;
    let value: serde_json::Value = serde_json::from_str(&body)?;

    let mut event = EslEvent::new();
    if let Some(obj) = value.as_object() {
        for (key, value) in obj {
            match (key.as_str(), value) {
                ("_body", serde_json::Value::String(s)) => event.set_body(s.clone()),
                (_, serde_json::Value::String(s)) => event.set_header(key, s.clone()),
                _ => event.set_header(key, value.to_string()),
            }
        }
    }
    Ok(event)
}
