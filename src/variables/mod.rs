//! Typed channel variable names.

mod channel_variable;

pub use channel_variable::{ChannelVariable, ParseChannelVariableError};
