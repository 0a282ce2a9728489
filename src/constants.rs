//! Protocol constants and configuration defaults

/// Default FreeSWITCH ESL port for inbound connections
pub const DEFAULT_ESL_PORT: u16 = 8021;

/// Socket read buffer size (64KB)
pub const SOCKET_BUF_SIZE: usize = 65536;

/// Buffer allocation granularity (64KB), used for the initial allocation and growth
pub const BUF_CHUNK: usize = 64 * 1024;

/// Maximum single message size (8MB), checked against Content-Length
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Hard cap on buffered, unparsed bytes (16MB)
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Ends a header block
pub const HEADER_TERMINATOR: &str = "\n\n";

/// Content-Type header values
pub const CONTENT_TYPE_AUTH_REQUEST: &str = "auth/request";
pub const CONTENT_TYPE_COMMAND_REPLY: &str = "command/reply";
pub const CONTENT_TYPE_API_RESPONSE: &str = "api/response";
pub const CONTENT_TYPE_TEXT_EVENT_PLAIN: &str = "text/event-plain";
pub const CONTENT_TYPE_TEXT_EVENT_JSON: &str = "text/event-json";
pub const CONTENT_TYPE_DISCONNECT_NOTICE: &str = "text/disconnect-notice";

/// Protocol framing header: payload type.
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
/// Protocol framing header: body length.
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";
/// Protocol framing header: command reply status.
pub const HEADER_REPLY_TEXT: &str = "Reply-Text";

/// Reserved registration key that replaces the fallback event handler.
pub const DEFAULT_HANDLER_KEY: &str = "default";

/// TCP connect and auth handshake timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Reply timeout for `api`/`bgapi` and other commands, in milliseconds
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 5000;

/// Maximum number of queued events before dropping
pub const MAX_EVENT_QUEUE_SIZE: usize = 1000;
