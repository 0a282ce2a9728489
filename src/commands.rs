//! Command-line encoder for `uuid_*` call-control API commands.
//!
//! A [`Command`] is a name plus ordered argument slots, each of which may be
//! absent. Rendering joins the name and every present, non-blank argument
//! with single spaces:
//!
//! ```
//! use freeswitch_esl_control::Command;
//!
//! let line = Command::new("uuid_hold")
//!     .arg("toggle")
//!     .arg("abc-123")
//!     .opt_arg(None::<&str>)
//!     .render()
//!     .unwrap();
//! assert_eq!(line, "uuid_hold toggle abc-123");
//! ```
//!
//! Arguments are not escaped. Only the last argument of a command may carry
//! spaces; anything carrying a line break is rejected before it can reach the
//! socket.

use crate::error::{EslError, EslResult};
use std::fmt;

pub const UUID_ANSWER: &str = "uuid_answer";
pub const UUID_BRIDGE: &str = "uuid_bridge";
pub const UUID_BROADCAST: &str = "uuid_broadcast";
pub const UUID_BREAK: &str = "uuid_break";
pub const UUID_HOLD: &str = "uuid_hold";
pub const UUID_GETVAR: &str = "uuid_getvar";
pub const UUID_SETVAR: &str = "uuid_setvar";
pub const UUID_SETVAR_MULTI: &str = "uuid_setvar_multi";
pub const UUID_RECORD: &str = "uuid_record";
pub const UUID_TRANSFER: &str = "uuid_transfer";
pub const UUID_KILL: &str = "uuid_kill";
pub const UUID_SEND_DTMF: &str = "uuid_send_dtmf";

/// Error returned when parsing an unknown keyword argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseArgumentError(pub String);

impl fmt::Display for ParseArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown command argument: {}", self.0)
    }
}

impl std::error::Error for ParseArgumentError {}

define_wire_enum! {
    error_type: ParseArgumentError,
    /// First argument of `uuid_hold`. Omit it to place the leg on hold.
    pub enum HoldMode {
        Off => "off",
        Toggle => "toggle",
    }
}

define_wire_enum! {
    error_type: ParseArgumentError,
    /// Leg selector for `uuid_broadcast`.
    pub enum MediaLeg {
        Aleg => "aleg",
        Bleg => "bleg",
        Holdb => "holdb",
        Both => "both",
    }
}

define_wire_enum! {
    error_type: ParseArgumentError,
    /// Action argument of `uuid_record`.
    pub enum RecordAction {
        Start => "start",
        Stop => "stop",
        Mask => "mask",
        Unmask => "unmask",
    }
}

define_wire_enum! {
    error_type: ParseArgumentError,
    /// Which leg `uuid_transfer` moves. Omit it to transfer the named leg.
    pub enum TransferLeg {
        Bleg => "-bleg",
        Both => "-both",
    }
}

/// Immutable API command template: a name and ordered, nullable arguments.
///
/// An optional map-valued tail renders as `k=v;k=v`. When that map is empty
/// the command is a no-op ([`is_noop`](Self::is_noop)) and renders to an
/// empty string; callers must not send it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<Option<String>>,
    pairs: Option<Vec<(String, String)>>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            pairs: None,
        }
    }

    /// Append a present argument. Blank values are still dropped at render time.
    pub fn arg(self, value: impl AsRef<str>) -> Self {
        self.opt_arg(Some(value))
    }

    /// Append an argument slot that may be absent.
    pub fn opt_arg<S: AsRef<str>>(mut self, value: Option<S>) -> Self {
        self.args
            .push(value.map(|v| {
                v.as_ref()
                    .to_string()
            }));
        self
    }

    /// Append `token` only when `on` is set.
    pub fn flag(self, on: bool, token: &str) -> Self {
        self.opt_arg(on.then_some(token))
    }

    /// Append a numeric argument, treated as absent below `min`.
    pub fn arg_at_least(self, value: u32, min: u32) -> Self {
        self.opt_arg((value >= min).then(|| value.to_string()))
    }

    /// Set the map-valued final argument.
    pub fn pairs<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.pairs = Some(
            pairs
                .into_iter()
                .map(|(k, v)| {
                    (
                        k.as_ref()
                            .to_string(),
                        v.as_ref()
                            .to_string(),
                    )
                })
                .collect(),
        );
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` when a map argument was supplied and it is empty.
    pub fn is_noop(&self) -> bool {
        self.pairs
            .as_ref()
            .is_some_and(|p| p.is_empty())
    }

    /// Validate every token, then produce the command line.
    pub fn render(&self) -> EslResult<String> {
        validate_token(&self.name, "command name")?;
        for (i, arg) in self
            .args
            .iter()
            .enumerate()
        {
            if let Some(a) = arg {
                validate_token(a, &format!("argument {} of {}", i + 1, self.name))?;
            }
        }
        if let Some(pairs) = &self.pairs {
            for (k, v) in pairs {
                validate_token(k, &format!("variable name in {}", self.name))?;
                validate_token(v, &format!("value of {} in {}", k, self.name))?;
            }
        }
        Ok(self.to_string())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_noop() {
            return Ok(());
        }
        f.write_str(&self.name)?;
        for arg in self
            .args
            .iter()
            .flatten()
        {
            if !arg
                .trim()
                .is_empty()
            {
                write!(f, " {}", arg)?;
            }
        }
        if let Some(pairs) = &self.pairs {
            f.write_str(" ")?;
            for (i, (k, v)) in pairs
                .iter()
                .enumerate()
            {
                if i > 0 {
                    f.write_str(";")?;
                }
                write!(f, "{}={}", k, v)?;
            }
        }
        Ok(())
    }
}

/// Render `name` followed by the present arguments, in order.
///
/// ```
/// use freeswitch_esl_control::commands::render;
///
/// assert_eq!(render("uuid_break", &[Some("abc-123"), None]).unwrap(), "uuid_break abc-123");
/// assert_eq!(render("uuid_break", &[Some("abc-123"), Some("all")]).unwrap(), "uuid_break abc-123 all");
/// ```
pub fn render(name: &str, args: &[Option<&str>]) -> EslResult<String> {
    args.iter()
        .fold(Command::new(name), |cmd, a| cmd.opt_arg(*a))
        .render()
}

/// Command lines are newline-delimited; an embedded line break would let a
/// value inject a second command.
fn validate_token(s: &str, context: &str) -> EslResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(EslError::invalid_argument(format!(
            "{} must not contain newlines",
            context
        )));
    }
    Ok(())
}
