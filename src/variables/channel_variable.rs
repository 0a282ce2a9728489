//! Well-known channel variable names for `uuid_getvar` / `uuid_setvar`.

/// Error returned when parsing an unrecognized channel variable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseChannelVariableError(pub String);

impl std::fmt::Display for ParseChannelVariableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown channel variable: {}", self.0)
    }
}

impl std::error::Error for ParseChannelVariableError {}

define_wire_enum! {
    error_type: ParseChannelVariableError,
    /// Core channel variables commonly read or written by call-control code.
    ///
    /// Any `AsRef<str>` is accepted by [`CallControl::get_var`](crate::CallControl::get_var)
    /// and friends; this enum only saves typing the common ones.
    pub enum ChannelVariable {
        Uuid => "uuid",
        Direction => "direction",
        CallerIdName => "caller_id_name",
        CallerIdNumber => "caller_id_number",
        EffectiveCallerIdName => "effective_caller_id_name",
        EffectiveCallerIdNumber => "effective_caller_id_number",
        DestinationNumber => "destination_number",
        Context => "context",
        HangupCause => "hangup_cause",
        BridgeUuid => "bridge_uuid",
        SignalBond => "signal_bond",
        HoldMusic => "hold_music",
        TransferHistory => "transfer_history",
        HangupAfterBridge => "hangup_after_bridge",
        ParkAfterBridge => "park_after_bridge",
        RecordingFollowTransfer => "recording_follow_transfer",
        RecordStereo => "RECORD_STEREO",
        PlaybackTerminators => "playback_terminators",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_switch_core() {
        assert_eq!(ChannelVariable::BridgeUuid.to_string(), "bridge_uuid");
        assert_eq!(
            ChannelVariable::EffectiveCallerIdNumber.as_str(),
            "effective_caller_id_number"
        );
        assert_eq!(ChannelVariable::RecordStereo.as_ref(), "RECORD_STEREO");
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(
            "record_stereo".parse::<ChannelVariable>(),
            Ok(ChannelVariable::RecordStereo)
        );
        assert_eq!(
            "Hold_Music".parse::<ChannelVariable>(),
            Ok(ChannelVariable::HoldMusic)
        );
        assert!("sip_from_user"
            .parse::<ChannelVariable>()
            .is_err());
    }
}
