//! Transport seam between call-control operations and live connections.
//!
//! [`EslTransport`] is the only thing [`CallControl`](crate::CallControl)
//! needs: send a rendered command line to a switch, either waiting for its
//! output (`api`) or getting back a [`JobId`] (`bgapi`). [`EslClient`] implements
//! it for a single connection and [`ConnectionTable`] routes by address across
//! several.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    command::{EslResponse, ReplyStatus},
    connection::EslClient,
    error::{EslError, EslResult},
    event::EslEvent,
};

/// Correlation token returned by an asynchronous command.
///
/// The switch later reports the command's outcome in a `BACKGROUND_JOB` event
/// carrying the same value in its `Job-UUID` header.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `event` reports the completion of this job.
    pub fn matches(&self, event: &EslEvent) -> bool {
        event.job_uuid() == Some(self.0.as_str())
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Complete output of a synchronous command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: ReplyStatus,
    pub body: Vec<String>,
}

impl Reply {
    /// Build from an `api/response`, failing on `-ERR`.
    ///
    /// `api` output has no Reply-Text; the status lives on the first body line.
    pub fn from_response(response: EslResponse) -> EslResult<Self> {
        let response = response.into_result()?;
        let body: Vec<String> = response
            .body()
            .map(|b| {
                b.lines()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let status = ReplyStatus::classify(
            body.first()
                .map(|s| s.as_str()),
        );
        if status == ReplyStatus::Err {
            return Err(EslError::CommandFailed {
                reply_text: body
                    .first()
                    .cloned()
                    .unwrap_or_default(),
            });
        }
        Ok(Self { status, body })
    }

    pub fn first_line(&self) -> Option<&str> {
        self.body
            .first()
            .map(|s| s.as_str())
    }
}

/// Sends rendered command lines to the switch at `addr`.
///
/// `arg`, when non-empty, is appended to the command line after a space.
#[async_trait]
pub trait EslTransport: Send + Sync {
    /// Fire-and-correlate: returns once the switch has accepted the job.
    async fn send_async(&self, addr: &str, command: &str, arg: &str) -> EslResult<JobId>;

    /// Waits for the command's full output.
    async fn send_sync(&self, addr: &str, command: &str, arg: &str) -> EslResult<Reply>;
}

fn command_line(command: &str, arg: &str) -> String {
    if arg.is_empty() {
        command.to_string()
    } else {
        format!("{} {}", command, arg)
    }
}

#[async_trait]
impl EslTransport for EslClient {
    async fn send_async(&self, _addr: &str, command: &str, arg: &str) -> EslResult<JobId> {
        let response = self
            .bgapi(&command_line(command, arg))
            .await?
            .into_result()?;
        let job_id = response
            .job_uuid()
            .map(JobId::new)
            .ok_or(EslError::MissingJobUuid)?;
        debug!("[{}] bgapi accepted as job {}", self.addr(), job_id);
        Ok(job_id)
    }

    async fn send_sync(&self, _addr: &str, command: &str, arg: &str) -> EslResult<Reply> {
        let response = self
            .api(&command_line(command, arg))
            .await?;
        Reply::from_response(response)
    }
}

/// Connections keyed by address, e.g. `"10.0.0.5:8021"`.
///
/// Routing only: connections are added and removed by the application, never
/// re-established here.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTable {
    clients: Arc<RwLock<HashMap<String, EslClient>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `client` under `addr`, returning any client it replaced.
    pub async fn insert(&self, addr: impl Into<String>, client: EslClient) -> Option<EslClient> {
        let addr = addr.into();
        info!("Registering ESL connection for {}", addr);
        self.clients
            .write()
            .await
            .insert(addr, client)
    }

    /// Register `client` under the address it was connected to.
    pub async fn add(&self, client: EslClient) -> Option<EslClient> {
        let addr = client
            .addr()
            .to_string();
        self.insert(addr, client)
            .await
    }

    pub async fn remove(&self, addr: &str) -> Option<EslClient> {
        info!("Removing ESL connection for {}", addr);
        self.clients
            .write()
            .await
            .remove(addr)
    }

    pub async fn get(&self, addr: &str) -> EslResult<EslClient> {
        self.clients
            .read()
            .await
            .get(addr)
            .cloned()
            .ok_or_else(|| EslError::UnknownAddress {
                addr: addr.to_string(),
            })
    }

    pub async fn addresses(&self) -> Vec<String> {
        self.clients
            .read()
            .await
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EslTransport for ConnectionTable {
    async fn send_async(&self, addr: &str, command: &str, arg: &str) -> EslResult<JobId> {
        let client = self
            .get(addr)
            .await?;
        client
            .send_async(addr, command, arg)
            .await
    }

    async fn send_sync(&self, addr: &str, command: &str, arg: &str) -> EslResult<Reply> {
        let client = self
            .get(addr)
            .await?;
        client
            .send_sync(addr, command, arg)
            .await
    }
}

#[async_trait]
impl<T: EslTransport + ?Sized> EslTransport for Arc<T> {
    async fn send_async(&self, addr: &str, command: &str, arg: &str) -> EslResult<JobId> {
        (**self)
            .send_async(addr, command, arg)
            .await
    }

    async fn send_sync(&self, addr: &str, command: &str, arg: &str) -> EslResult<Reply> {
        (**self)
            .send_sync(addr, command, arg)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::HEADER_REPLY_TEXT;
    use crate::event::EslEventType;

    fn api_response(body: &str) -> EslResponse {
        EslResponse::new(HashMap::new(), Some(body.to_string()))
    }

    #[test]
    fn reply_splits_body_lines() {
        let reply = Reply::from_response(api_response("local_stream://moh\n")).unwrap();
        assert_eq!(reply.status, ReplyStatus::Other);
        assert_eq!(reply.body, vec!["local_stream://moh"]);
        assert_eq!(reply.first_line(), Some("local_stream://moh"));

        let reply = Reply::from_response(api_response("+OK\nline two")).unwrap();
        assert_eq!(reply.status, ReplyStatus::Ok);
        assert_eq!(reply.body.len(), 2);
    }

    #[test]
    fn reply_empty_body() {
        let reply = Reply::from_response(EslResponse::new(HashMap::new(), None)).unwrap();
        assert!(reply.body.is_empty());
        assert_eq!(reply.status, ReplyStatus::Ok);
    }

    #[test]
    fn reply_err_body_fails() {
        let err = Reply::from_response(api_response("-ERR No such channel!\n")).unwrap_err();
        assert!(
            matches!(err, EslError::CommandFailed { ref reply_text } if reply_text == "-ERR No such channel!")
        );
    }

    #[test]
    fn reply_err_reply_text_fails() {
        let response = EslResponse::new(
            [(HEADER_REPLY_TEXT.to_string(), "-ERR command not found".to_string())].into(),
            None,
        );
        assert!(matches!(
            Reply::from_response(response),
            Err(EslError::CommandFailed { .. })
        ));
    }

    #[test]
    fn command_line_appends_arg() {
        assert_eq!(command_line("uuid_answer u1", ""), "uuid_answer u1");
        assert_eq!(command_line("uuid_answer u1", "x"), "uuid_answer u1 x");
    }

    #[test]
    fn job_id_matches_event() {
        let job = JobId::new("7f4db78a");
        let mut event = EslEvent::with_type(EslEventType::BackgroundJob);
        assert!(!job.matches(&event));
        event.set_header("Job-UUID", "7f4db78a");
        assert!(job.matches(&event));
        assert_eq!(job.to_string(), "7f4db78a");
    }

    #[tokio::test]
    async fn unknown_address_is_rejected() {
        let table = ConnectionTable::new();
        let err = table
            .send_sync("10.0.0.9:8021", "status", "")
            .await
            .unwrap_err();
        assert!(matches!(err, EslError::UnknownAddress { ref addr } if addr == "10.0.0.9:8021"));
        assert!(err.is_transport_error());
        assert!(table
            .addresses()
            .await
            .is_empty());
    }
}
