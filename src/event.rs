//! Inbound events: the parsed `text/event-*` payloads handed to dispatch.

use crate::headers::EventHeader;
use percent_encoding::{percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Body encodings an event subscription can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum EventFormat {
    /// `text/event-plain` (default)
    Plain,
    /// `text/event-json`
    Json,
}

impl EventFormat {
    /// Map a frame's Content-Type to the body format.
    pub fn from_content_type(ct: &str) -> Self {
        match ct {
            "text/event-json" => Self::Json,
            _ => Self::Plain,
        }
    }
}

impl fmt::Display for EventFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventFormat::Plain => write!(f, "plain"),
            EventFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for EventFormat {
    type Err = ParseEventFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            _ => Err(ParseEventFormatError(s.to_string())),
        }
    }
}

/// Error returned when parsing an invalid event format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventFormatError(pub String);

impl fmt::Display for ParseEventFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event format: {}", self.0)
    }
}

impl std::error::Error for ParseEventFormatError {}

/// Builds `EslEventType` with `as_str`, `Display`, `FromStr` and `parse_event_type`.
macro_rules! esl_event_types {
    (
        $(
            $(#[$attr:meta])*
            $variant:ident => $wire:literal
        ),+ $(,)?
    ) => {
        /// Event names known to the switch core.
        ///
        /// Dispatch itself is keyed on the raw `Event-Name` string, so events
        /// missing from this list are still routable.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[non_exhaustive]
        #[allow(missing_docs)]
        pub enum EslEventType {
            $(
                $(#[$attr])*
                $variant,
            )+
        }

        impl EslEventType {
            /// Wire name, e.g. `CHANNEL_ANSWER`.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( EslEventType::$variant => $wire, )+
                }
            }

            /// Parse event type from wire name (case-insensitive).
            pub fn parse_event_type(s: &str) -> Option<Self> {
                match s.to_uppercase().as_str() {
                    $( $wire => Some(EslEventType::$variant), )+
                    _ => None,
                }
            }
        }

        impl fmt::Display for EslEventType {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for EslEventType {
            type Err = ParseEventTypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse_event_type(s).ok_or_else(|| ParseEventTypeError(s.to_string()))
            }
        }
    };
}

esl_event_types! {
    Custom => "CUSTOM",
    Clone => "CLONE",
    ChannelCreate => "CHANNEL_CREATE",
    ChannelDestroy => "CHANNEL_DESTROY",
    ChannelState => "CHANNEL_STATE",
    ChannelCallstate => "CHANNEL_CALLSTATE",
    ChannelAnswer => "CHANNEL_ANSWER",
    ChannelHangup => "CHANNEL_HANGUP",
    ChannelHangupComplete => "CHANNEL_HANGUP_COMPLETE",
    ChannelExecute => "CHANNEL_EXECUTE",
    ChannelExecuteComplete => "CHANNEL_EXECUTE_COMPLETE",
    ChannelHold => "CHANNEL_HOLD",
    ChannelUnhold => "CHANNEL_UNHOLD",
    ChannelBridge => "CHANNEL_BRIDGE",
    ChannelUnbridge => "CHANNEL_UNBRIDGE",
    ChannelProgress => "CHANNEL_PROGRESS",
    ChannelProgressMedia => "CHANNEL_PROGRESS_MEDIA",
    ChannelOutgoing => "CHANNEL_OUTGOING",
    ChannelPark => "CHANNEL_PARK",
    ChannelUnpark => "CHANNEL_UNPARK",
    ChannelApplication => "CHANNEL_APPLICATION",
    ChannelOriginate => "CHANNEL_ORIGINATE",
    ChannelUuid => "CHANNEL_UUID",
    Api => "API",
    Log => "LOG",
    Startup => "STARTUP",
    Shutdown => "SHUTDOWN",
    Talk => "TALK",
    Notalk => "NOTALK",
    Dtmf => "DTMF",
    Message => "MESSAGE",
    PresenceIn => "PRESENCE_IN",
    NotifyIn => "NOTIFY_IN",
    Codec => "CODEC",
    BackgroundJob => "BACKGROUND_JOB",
    DetectedSpeech => "DETECTED_SPEECH",
    DetectedTone => "DETECTED_TONE",
    Heartbeat => "HEARTBEAT",
    ReloadXml => "RELOADXML",
    ChannelData => "CHANNEL_DATA",
    SessionHeartbeat => "SESSION_HEARTBEAT",
    CallSecure => "CALL_SECURE",
    RecordStart => "RECORD_START",
    RecordStop => "RECORD_STOP",
    PlaybackStart => "PLAYBACK_START",
    PlaybackStop => "PLAYBACK_STOP",
    CallUpdate => "CALL_UPDATE",
    MediaBugStart => "MEDIA_BUG_START",
    MediaBugStop => "MEDIA_BUG_STOP",
    CallDetail => "CALL_DETAIL",
    DeviceState => "DEVICE_STATE",
    /// Subscribe to all events
    All => "ALL",
}

/// Error returned when parsing an unknown event type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventTypeError(pub String);

impl fmt::Display for ParseEventTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event type: {}", self.0)
    }
}

impl std::error::Error for ParseEventTypeError {}

/// A server notification: headers plus an optional body.
///
/// The transport builds it once per frame; handlers only ever see `&EslEvent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EslEvent {
    event_type: Option<EslEventType>,
    headers: HashMap<String, String>,
    body: Option<String>,
}

impl EslEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Event with `Event-Name` already set from `event_type`.
    pub fn with_type(event_type: EslEventType) -> Self {
        let mut event = Self::new();
        event.set_event_type(Some(event_type));
        event.set_header(EventHeader::EventName, event_type.as_str());
        event
    }

    /// Parsed event type, if the name is one the crate knows.
    pub fn event_type(&self) -> Option<EslEventType> {
        self.event_type
    }

    pub fn set_event_type(&mut self, event_type: Option<EslEventType>) {
        self.event_type = event_type;
    }

    /// Raw `Event-Name` header; the key dispatch routes on.
    pub fn event_name(&self) -> Option<&str> {
        self.header(EventHeader::EventName)
    }

    /// Look up a header by name (case-sensitive).
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .map(|s| s.as_str())
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Set or overwrite a header.
    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(
                name.as_ref()
                    .to_string(),
                value.into(),
            );
    }

    /// Remove a header, returning its value if it existed.
    pub fn del_header(&mut self, name: &str) -> Option<String> {
        self.headers
            .remove(name)
    }

    pub fn body(&self) -> Option<&str> {
        self.body
            .as_deref()
    }

    /// Body split on line breaks; empty when there is no body.
    pub fn body_lines(&self) -> Vec<String> {
        self.body
            .as_deref()
            .map(|b| {
                b.lines()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = Some(body.into());
    }

    /// `Unique-ID` header, falling back to `Caller-Unique-ID`.
    pub fn unique_id(&self) -> Option<&str> {
        self.header(EventHeader::UniqueId)
            .or_else(|| self.header(EventHeader::CallerUniqueId))
    }

    /// `Job-UUID` header carried by `BACKGROUND_JOB` events.
    pub fn job_uuid(&self) -> Option<&str> {
        self.header(EventHeader::JobUuid)
    }

    /// Whether this is the completion of an earlier asynchronous command.
    pub fn is_background_job(&self) -> bool {
        self.event_type == Some(EslEventType::BackgroundJob)
            || self.event_name() == Some(EslEventType::BackgroundJob.as_str())
    }

    /// Look up a channel variable via its `variable_{name}` header.
    pub fn variable(&self, name: impl AsRef<str>) -> Option<&str> {
        self.header(format!("variable_{}", name.as_ref()))
    }

    /// Serialize to the `text/event-plain` body format.
    ///
    /// `Event-Name` comes first, the rest sorted by name; values are
    /// percent-encoded and `Content-Length` is recomputed from the body.
    pub fn to_plain_format(&self) -> String {
        use std::fmt::Write;
        let mut result = String::new();

        if let Some(event_name) = self.event_name() {
            let _ = writeln!(
                result,
                "Event-Name: {}",
                percent_encode(event_name.as_bytes(), NON_ALPHANUMERIC)
            );
        }

        let mut sorted_headers: Vec<_> = self
            .headers
            .iter()
            .filter(|(k, _)| k.as_str() != "Event-Name" && k.as_str() != "Content-Length")
            .collect();
        sorted_headers.sort_by_key(|(k, _)| k.as_str());

        for (key, value) in sorted_headers {
            let _ = writeln!(
                result,
                "{}: {}",
                key,
                percent_encode(value.as_bytes(), NON_ALPHANUMERIC)
            );
        }

        if let Some(body) = &self.body {
            let _ = writeln!(result, "Content-Length: {}", body.len());
            result.push('\n');
            result.push_str(body);
        } else {
            result.push('\n');
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_wire_names() {
        assert_eq!(EslEventType::BackgroundJob.to_string(), "BACKGROUND_JOB");
        assert_eq!(EslEventType::ReloadXml.as_str(), "RELOADXML");
        assert_eq!(
            "channel_answer".parse::<EslEventType>(),
            Ok(EslEventType::ChannelAnswer)
        );
        assert!("NOT_AN_EVENT"
            .parse::<EslEventType>()
            .is_err());
    }

    #[test]
    fn with_type_sets_event_name() {
        let event = EslEvent::with_type(EslEventType::ChannelHangup);
        assert_eq!(event.event_name(), Some("CHANNEL_HANGUP"));
        assert_eq!(event.event_type(), Some(EslEventType::ChannelHangup));
    }

    #[test]
    fn background_job_detection_uses_name_or_type() {
        let mut by_name = EslEvent::new();
        by_name.set_header("Event-Name", "BACKGROUND_JOB");
        by_name.set_header("Job-UUID", "7f4db78a");
        assert!(by_name.is_background_job());
        assert_eq!(by_name.job_uuid(), Some("7f4db78a"));

        assert!(EslEvent::with_type(EslEventType::BackgroundJob).is_background_job());
        assert!(!EslEvent::with_type(EslEventType::ChannelAnswer).is_background_job());
    }

    #[test]
    fn unique_id_falls_back_to_caller_unique_id() {
        let mut event = EslEvent::new();
        event.set_header("Caller-Unique-ID", "leg-b");
        assert_eq!(event.unique_id(), Some("leg-b"));
        event.set_header(EventHeader::UniqueId, "leg-a");
        assert_eq!(event.unique_id(), Some("leg-a"));
    }

    #[test]
    fn body_lines_split() {
        let mut event = EslEvent::with_type(EslEventType::BackgroundJob);
        assert!(event
            .body_lines()
            .is_empty());
        event.set_body("+OK\nsecond line\n");
        assert_eq!(event.body_lines(), vec!["+OK", "second line"]);
    }

    #[test]
    fn del_header_and_variable() {
        let mut event = EslEvent::new();
        event.set_header("variable_hold_music", "local_stream://moh");
        assert_eq!(event.variable("hold_music"), Some("local_stream://moh"));
        assert_eq!(
            event.del_header("variable_hold_music"),
            Some("local_stream://moh".to_string())
        );
        assert_eq!(event.variable("hold_music"), None);
    }

    #[test]
    fn plain_format_encodes_values_and_body() {
        let mut event = EslEvent::with_type(EslEventType::BackgroundJob);
        event.set_header("Job-UUID", "def-456");
        event.set_header("Job-Command", "uuid_answer");
        event.set_body("+OK result\n");

        let plain = event.to_plain_format();
        assert!(plain.starts_with("Event-Name: BACKGROUND%5FJOB\n"));
        assert!(plain.contains("Job-UUID: def%2D456\n"));
        assert!(plain.contains("Content-Length: 11\n"));
        assert!(plain.ends_with("\n\n+OK result\n"));
    }

    #[test]
    fn event_format_parsing() {
        assert_eq!("json".parse::<EventFormat>(), Ok(EventFormat::Json));
        assert!("xml"
            .parse::<EventFormat>()
            .is_err());
        assert_eq!(
            EventFormat::from_content_type("text/event-json"),
            EventFormat::Json
        );
        assert_eq!(
            EventFormat::from_content_type("log/data"),
            EventFormat::Plain
        );
    }
}
