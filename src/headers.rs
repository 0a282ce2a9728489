//! Typed names for the event headers this crate reads.

/// Error returned when parsing an unrecognized event header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventHeaderError(pub String);

impl std::fmt::Display for ParseEventHeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown event header: {}", self.0)
    }
}

impl std::error::Error for ParseEventHeaderError {}

define_wire_enum! {
    error_type: ParseEventHeaderError,
    /// Event payload header names (not framing headers like `Content-Type`).
    ///
    /// `EventName` is the dispatch key; `JobUuid` correlates a
    /// `BACKGROUND_JOB` event with the [`JobId`](crate::JobId) returned by an
    /// asynchronous command.
    pub enum EventHeader {
        EventName => "Event-Name",
        EventSubclass => "Event-Subclass",
        UniqueId => "Unique-ID",
        CallerUniqueId => "Caller-Unique-ID",
        OtherLegUniqueId => "Other-Leg-Unique-ID",
        JobUuid => "Job-UUID",
        JobCommand => "Job-Command",
        JobCommandArg => "Job-Command-Arg",
        ChannelName => "Channel-Name",
        ChannelCallState => "Channel-Call-State",
        AnswerState => "Answer-State",
        HangupCause => "Hangup-Cause",
        CoreUuid => "Core-UUID",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names() {
        assert_eq!(EventHeader::EventName.to_string(), "Event-Name");
        assert_eq!(EventHeader::JobUuid.as_str(), "Job-UUID");
        assert_eq!(EventHeader::JobCommandArg.as_ref(), "Job-Command-Arg");
    }

    #[test]
    fn parse_ignores_case() {
        assert_eq!("job-uuid".parse::<EventHeader>(), Ok(EventHeader::JobUuid));
        assert_eq!(
            "EVENT-NAME".parse::<EventHeader>(),
            Ok(EventHeader::EventName)
        );
    }

    #[test]
    fn parse_unknown_reports_name() {
        let err = "X-Not-Known"
            .parse::<EventHeader>()
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown event header: X-Not-Known");
    }
}
