//! FreeSWITCH call control and event dispatch over the Event Socket (ESL)
//!
//! This crate drives live calls on one or more FreeSWITCH switches and routes
//! the events they emit to application handlers.
//!
//! # Architecture
//!
//! - [`Command`] renders `uuid_*` API command lines, dropping absent arguments
//! - [`CallControl`] exposes one method per call-control operation and sends
//!   through any [`EslTransport`]
//! - [`EslClient`] (Clone + Send) is the tokio transport for one connection;
//!   [`ConnectionTable`] routes by address across several
//! - [`EventDispatcher`] fans each event out to the handlers registered for
//!   its `Event-Name`, falling back to a default handler
//!
//! # Examples
//!
//! ## Call control
//!
//! ```rust,no_run
//! use freeswitch_esl_control::{CallControl, EslClient, EslError, RecordAction};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EslError> {
//!     let (client, _events) = EslClient::connect("localhost", 8021, "ClueCon").await?;
//!     let calls = CallControl::new(client);
//!
//!     let uuid = "5d3b4a0e-8f2c-4f47-9b52-7e1a0c8e4a11";
//!     calls.answer("localhost:8021", uuid).await?;
//!     let job = calls
//!         .record("localhost:8021", uuid, RecordAction::Start, "/tmp/call.wav", 0)
//!         .await?;
//!     println!("recording started as job {}", job);
//!
//!     let music = calls.get_var("localhost:8021", uuid, "hold_music").await?;
//!     println!("hold_music = {:?}", music);
//!     Ok(())
//! }
//! ```
//!
//! ## Event dispatch
//!
//! ```rust,no_run
//! use freeswitch_esl_control::{
//!     EslClient, EslEvent, EslEventType, EventDispatcher, EventFormat, HandlerResult,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (client, events) = EslClient::connect("localhost", 8021, "ClueCon").await?;
//!     client.subscribe_events(EventFormat::Plain, &[
//!         EslEventType::ChannelAnswer,
//!         EslEventType::BackgroundJob,
//!     ]).await?;
//!
//!     let dispatcher = EventDispatcher::builder()
//!         .register_type(EslEventType::BackgroundJob, |_: &str, event: &EslEvent| -> HandlerResult {
//!             println!("job {} done: {:?}", event.job_uuid().unwrap_or("?"), event.body());
//!             Ok(())
//!         })
//!         .build();
//!
//!     dispatcher.run("localhost:8021", events).await;
//!     Ok(())
//! }
//! ```

#[macro_use]
mod macros;

pub mod commands;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod headers;
pub mod operations;
pub mod transport;
pub mod variables;

pub(crate) mod buffer;
pub(crate) mod command;
pub mod constants;
pub(crate) mod protocol;

pub use command::{EslCommand, EslResponse, ReplyStatus};
pub use commands::{Command, HoldMode, MediaLeg, ParseArgumentError, RecordAction, TransferLeg};
pub use connection::{
    ConnectionStatus, DisconnectReason, EslClient, EslConnectOptions, EslEventStream,
};
pub use constants::{DEFAULT_ESL_PORT, DEFAULT_HANDLER_KEY};
pub use dispatch::{
    DispatchOutcome, EslEventListener, EventDispatcher, EventDispatcherBuilder, EventHandler,
    LoggingHandler, SharedHandler,
};
pub use error::{EslError, EslResult, HandlerError, HandlerResult};
pub use event::{EslEvent, EslEventType, EventFormat};
pub use headers::EventHeader;
pub use operations::CallControl;
pub use transport::{ConnectionTable, EslTransport, JobId, Reply};
pub use variables::ChannelVariable;
