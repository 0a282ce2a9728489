//! Socket-level commands and their replies

use crate::{
    constants::{HEADER_REPLY_TEXT, HEADER_TERMINATOR},
    error::{EslError, EslResult},
    headers::EventHeader,
};
use std::collections::HashMap;
use std::fmt;

fn validate_no_newlines(s: &str, context: &str) -> EslResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(EslError::invalid_argument(format!(
            "{} must not contain newlines",
            context
        )));
    }
    Ok(())
}

/// Reply-Text classification.
///
/// Commands answer `+OK …` on success and `-ERR …` on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReplyStatus {
    /// Reply-Text starts with `+OK` or is absent/empty.
    Ok,
    /// Reply-Text starts with `-ERR`.
    Err,
    /// Reply-Text present but matches neither prefix.
    Other,
}

impl ReplyStatus {
    /// Classify a Reply-Text value or the first line of an api body.
    pub fn classify(text: Option<&str>) -> Self {
        match text {
            None | Some("") => ReplyStatus::Ok,
            Some(t) if t.starts_with("+OK") => ReplyStatus::Ok,
            Some(t) if t.starts_with("-ERR") => ReplyStatus::Err,
            Some(_) => ReplyStatus::Other,
        }
    }
}

/// A `command/reply` or `api/response` frame.
#[derive(Debug, Clone, PartialEq)]
pub struct EslResponse {
    headers: HashMap<String, String>,
    body: Option<String>,
    status: ReplyStatus,
}

impl EslResponse {
    /// `ReplyStatus` is derived from the `Reply-Text` header.
    pub fn new(headers: HashMap<String, String>, body: Option<String>) -> Self {
        let status = ReplyStatus::classify(
            headers
                .get(HEADER_REPLY_TEXT)
                .map(|s| s.as_str()),
        );
        Self {
            headers,
            body,
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    pub fn reply_status(&self) -> ReplyStatus {
        self.status
    }

    /// Payload of an `api/response`.
    pub fn body(&self) -> Option<&str> {
        self.body
            .as_deref()
    }

    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .map(|s| s.as_str())
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Raw `Reply-Text` header value (e.g. `+OK`, `-ERR invalid command`).
    pub fn reply_text(&self) -> Option<&str> {
        self.header(HEADER_REPLY_TEXT)
    }

    /// Job-UUID of a `bgapi` reply.
    ///
    /// Prefers the dedicated header and falls back to the
    /// `+OK Job-UUID: <uuid>` form of Reply-Text.
    pub fn job_uuid(&self) -> Option<&str> {
        self.header(EventHeader::JobUuid)
            .or_else(|| {
                self.reply_text()?
                    .strip_prefix("+OK Job-UUID:")
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
            })
    }

    /// `Ok(self)` on `+OK`, otherwise the matching error.
    pub fn into_result(self) -> EslResult<Self> {
        match self.status {
            ReplyStatus::Ok => Ok(self),
            ReplyStatus::Err => Err(EslError::CommandFailed {
                reply_text: self
                    .reply_text()
                    .unwrap_or("-ERR")
                    .to_string(),
            }),
            ReplyStatus::Other => Err(EslError::UnexpectedReply {
                reply_text: self
                    .reply_text()
                    .unwrap_or("")
                    .to_string(),
            }),
        }
    }
}

/// Commands written directly to the socket.
#[derive(Clone)]
pub enum EslCommand {
    Auth { password: String },
    /// Blocking API call, answered by `api/response`
    Api { command: String },
    /// Background API call, answered by a Job-UUID
    BgApi { command: String },
    Events { format: String, events: String },
    Filter { header: String, value: String },
    NoEvents,
    Exit,
}

impl fmt::Debug for EslCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EslCommand::Auth { .. } => f
                .debug_struct("Auth")
                .field("password", &"[REDACTED]")
                .finish(),
            EslCommand::Api { command } => f
                .debug_struct("Api")
                .field("command", command)
                .finish(),
            EslCommand::BgApi { command } => f
                .debug_struct("BgApi")
                .field("command", command)
                .finish(),
            EslCommand::Events { format, events } => f
                .debug_struct("Events")
                .field("format", format)
                .field("events", events)
                .finish(),
            EslCommand::Filter { header, value } => f
                .debug_struct("Filter")
                .field("header", header)
                .field("value", value)
                .finish(),
            EslCommand::NoEvents => write!(f, "NoEvents"),
            EslCommand::Exit => write!(f, "Exit"),
        }
    }
}

impl EslCommand {
    fn frame(cmd: &str, args: &[&str]) -> String {
        let mut result = String::from(cmd);
        for arg in args {
            result.push(' ');
            result.push_str(arg);
        }
        result.push_str(HEADER_TERMINATOR);
        result
    }

    /// Validate user-supplied fields, then frame for the wire.
    pub fn to_wire_format(&self) -> EslResult<String> {
        match self {
            EslCommand::Auth { password } => {
                validate_no_newlines(password, "password")?;
                Ok(Self::frame("auth", &[password]))
            }
            EslCommand::Api { command } => {
                validate_no_newlines(command, "api command")?;
                Ok(Self::frame("api", &[command]))
            }
            EslCommand::BgApi { command } => {
                validate_no_newlines(command, "bgapi command")?;
                Ok(Self::frame("bgapi", &[command]))
            }
            EslCommand::Events { format, events } => {
                validate_no_newlines(format, "event format")?;
                validate_no_newlines(events, "event list")?;
                Ok(Self::frame("event", &[format, events]))
            }
            EslCommand::Filter { header, value } => {
                validate_no_newlines(header, "filter header")?;
                validate_no_newlines(value, "filter value")?;
                Ok(Self::frame("filter", &[header, value]))
            }
            EslCommand::NoEvents => Ok(Self::frame("noevents", &[])),
            EslCommand::Exit => Ok(Self::frame("exit", &[])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(text: &str) -> EslResponse {
        EslResponse::new([(HEADER_REPLY_TEXT.to_string(), text.to_string())].into(), None)
    }

    #[test]
    fn wire_format() {
        assert_eq!(
            EslCommand::Api {
                command: "uuid_getvar u1 hold_music".into()
            }
            .to_wire_format()
            .unwrap(),
            "api uuid_getvar u1 hold_music\n\n"
        );
        assert_eq!(
            EslCommand::BgApi {
                command: "uuid_answer u1".into()
            }
            .to_wire_format()
            .unwrap(),
            "bgapi uuid_answer u1\n\n"
        );
        assert_eq!(
            EslCommand::Events {
                format: "plain".into(),
                events: "BACKGROUND_JOB CHANNEL_ANSWER".into()
            }
            .to_wire_format()
            .unwrap(),
            "event plain BACKGROUND_JOB CHANNEL_ANSWER\n\n"
        );
        assert_eq!(
            EslCommand::NoEvents
                .to_wire_format()
                .unwrap(),
            "noevents\n\n"
        );
    }

    #[test]
    fn newline_injection_rejected() {
        let err = EslCommand::BgApi {
            command: "uuid_answer u1\n\napi shutdown".into(),
        }
        .to_wire_format()
        .unwrap_err();
        assert!(err.is_encoding_error());

        assert!(EslCommand::Filter {
            header: "Unique-ID\r\n".into(),
            value: "u1".into(),
        }
        .to_wire_format()
        .is_err());
    }

    #[test]
    fn debug_redacts_password() {
        let debug_str = format!(
            "{:?}",
            EslCommand::Auth {
                password: "ClueCon".into()
            }
        );
        assert!(!debug_str.contains("ClueCon"));
        assert!(debug_str.contains("REDACTED"));
    }

    #[test]
    fn reply_classification() {
        assert_eq!(reply("+OK accepted").reply_status(), ReplyStatus::Ok);
        assert_eq!(reply("").reply_status(), ReplyStatus::Ok);
        assert_eq!(
            EslResponse::new(HashMap::new(), None).reply_status(),
            ReplyStatus::Ok
        );
        assert_eq!(reply("-ERR no reply").reply_status(), ReplyStatus::Err);
        assert_eq!(reply("whatever").reply_status(), ReplyStatus::Other);
    }

    #[test]
    fn into_result_maps_errors() {
        let err = reply("-ERR invalid command")
            .into_result()
            .unwrap_err();
        assert!(
            matches!(err, EslError::CommandFailed { ref reply_text } if reply_text == "-ERR invalid command")
        );
        let err = reply("surprise")
            .into_result()
            .unwrap_err();
        assert!(matches!(err, EslError::UnexpectedReply { .. }));
    }

    #[test]
    fn job_uuid_from_header_or_reply_text() {
        let headers: HashMap<String, String> = [
            ("Reply-Text".to_string(), "+OK Job-UUID: aaa".to_string()),
            ("Job-UUID".to_string(), "bbb".to_string()),
        ]
        .into();
        assert_eq!(EslResponse::new(headers, None).job_uuid(), Some("bbb"));
        assert_eq!(reply("+OK Job-UUID: aaa").job_uuid(), Some("aaa"));
        assert_eq!(reply("+OK").job_uuid(), None);
    }
}
