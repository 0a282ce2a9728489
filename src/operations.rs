//! Call-control operations on live channels.
//!
//! Each method renders one `uuid_*` command and hands it to the transport.
//! Everything except [`get_var`](CallControl::get_var) runs as a background
//! job: the returned [`JobId`] matches the `Job-UUID` of the
//! `BACKGROUND_JOB` event the switch emits when the command completes.
//!
//! ```no_run
//! use freeswitch_esl_control::{CallControl, EslClient, HoldMode};
//!
//! # async fn demo() -> Result<(), freeswitch_esl_control::EslError> {
//! let (client, _events) = EslClient::connect("localhost", 8021, "ClueCon").await?;
//! let calls = CallControl::new(client);
//! let job = calls.hold("localhost:8021", Some(HoldMode::Toggle), "abc-123", false).await?;
//! println!("hold queued as {}", job);
//! # Ok(())
//! # }
//! ```

use tracing::debug;

use crate::{
    commands::{
        Command, HoldMode, MediaLeg, RecordAction, TransferLeg, UUID_ANSWER, UUID_BREAK,
        UUID_BRIDGE, UUID_BROADCAST, UUID_GETVAR, UUID_HOLD, UUID_KILL, UUID_RECORD,
        UUID_SEND_DTMF, UUID_SETVAR, UUID_SETVAR_MULTI, UUID_TRANSFER,
    },
    error::EslResult,
    transport::{EslTransport, JobId},
};

/// Typed front end over an [`EslTransport`].
///
/// Holds no state besides the transport, so it can be cloned or shared freely
/// when `T` allows it.
#[derive(Debug, Clone)]
pub struct CallControl<T> {
    transport: T,
}

impl<T: EslTransport> CallControl<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    async fn submit(&self, addr: &str, command: Command) -> EslResult<JobId> {
        let line = command.render()?;
        debug!("[{}] bgapi {}", addr, line);
        self.transport
            .send_async(addr, &line, "")
            .await
    }

    /// `uuid_answer <uuid>`
    pub async fn answer(&self, addr: &str, uuid: &str) -> EslResult<JobId> {
        self.submit(addr, Command::new(UUID_ANSWER).arg(uuid))
            .await
    }

    /// `uuid_bridge <uuid> <other_uuid>`
    pub async fn bridge(&self, addr: &str, uuid: &str, other_uuid: &str) -> EslResult<JobId> {
        self.submit(
            addr,
            Command::new(UUID_BRIDGE)
                .arg(uuid)
                .arg(other_uuid),
        )
        .await
    }

    /// `uuid_broadcast <uuid> <path> [leg]`
    pub async fn broadcast(
        &self,
        addr: &str,
        uuid: &str,
        path: &str,
        leg: Option<MediaLeg>,
    ) -> EslResult<JobId> {
        self.submit(
            addr,
            Command::new(UUID_BROADCAST)
                .arg(uuid)
                .arg(path)
                .opt_arg(leg),
        )
        .await
    }

    /// `uuid_break <uuid> [all]`: stop playback, or flush the whole queue with `all`.
    pub async fn break_media(&self, addr: &str, uuid: &str, all: bool) -> EslResult<JobId> {
        self.submit(
            addr,
            Command::new(UUID_BREAK)
                .arg(uuid)
                .flag(all, "all"),
        )
        .await
    }

    /// `uuid_hold [off|toggle] <uuid> [all]`
    ///
    /// `mode: None` places the leg on hold. `display` adds the trailing `all`
    /// so the hold is signalled to the far end as well.
    pub async fn hold(
        &self,
        addr: &str,
        mode: Option<HoldMode>,
        uuid: &str,
        display: bool,
    ) -> EslResult<JobId> {
        self.submit(
            addr,
            Command::new(UUID_HOLD)
                .opt_arg(mode)
                .arg(uuid)
                .flag(display, "all"),
        )
        .await
    }

    /// `uuid_getvar <uuid> <var>`, waiting for the value.
    ///
    /// Returns the reply body line by line; a variable that is not set comes
    /// back as `_undef_`.
    pub async fn get_var(
        &self,
        addr: &str,
        uuid: &str,
        var: impl AsRef<str>,
    ) -> EslResult<Vec<String>> {
        let line = Command::new(UUID_GETVAR)
            .arg(uuid)
            .arg(var)
            .render()?;
        debug!("[{}] api {}", addr, line);
        let reply = self
            .transport
            .send_sync(addr, &line, "")
            .await?;
        Ok(reply.body)
    }

    /// `uuid_setvar <uuid> <var> [value]`; no value unsets the variable.
    pub async fn set_var(
        &self,
        addr: &str,
        uuid: &str,
        var: impl AsRef<str>,
        value: Option<&str>,
    ) -> EslResult<JobId> {
        self.submit(
            addr,
            Command::new(UUID_SETVAR)
                .arg(uuid)
                .arg(var)
                .opt_arg(value),
        )
        .await
    }

    /// `uuid_setvar_multi <uuid> k=v;k=v`, in iteration order.
    ///
    /// An empty set of variables sends nothing and returns `Ok(None)`.
    pub async fn multi_set_var<I, K, V>(
        &self,
        addr: &str,
        uuid: &str,
        vars: I,
    ) -> EslResult<Option<JobId>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let command = Command::new(UUID_SETVAR_MULTI)
            .arg(uuid)
            .pairs(vars);
        if command.is_noop() {
            debug!("[{}] uuid_setvar_multi {} with no variables, skipped", addr, uuid);
            return Ok(None);
        }
        self.submit(addr, command)
            .await
            .map(Some)
    }

    /// `uuid_record <uuid> <action> <path> [limit]`; a `limit` of 0 means no limit.
    pub async fn record(
        &self,
        addr: &str,
        uuid: &str,
        action: RecordAction,
        path: &str,
        limit: u32,
    ) -> EslResult<JobId> {
        self.submit(
            addr,
            Command::new(UUID_RECORD)
                .arg(uuid)
                .arg(action)
                .arg(path)
                .arg_at_least(limit, 1),
        )
        .await
    }

    /// `uuid_transfer <uuid> [-bleg|-both] <dest> [dialplan] [context]`
    pub async fn transfer(
        &self,
        addr: &str,
        uuid: &str,
        leg: Option<TransferLeg>,
        dest: &str,
        dialplan: Option<&str>,
        context: Option<&str>,
    ) -> EslResult<JobId> {
        self.submit(
            addr,
            Command::new(UUID_TRANSFER)
                .arg(uuid)
                .opt_arg(leg)
                .arg(dest)
                .opt_arg(dialplan)
                .opt_arg(context),
        )
        .await
    }

    /// `uuid_kill <uuid> [cause]`
    pub async fn kill(&self, addr: &str, uuid: &str, cause: Option<&str>) -> EslResult<JobId> {
        self.submit(
            addr,
            Command::new(UUID_KILL)
                .arg(uuid)
                .opt_arg(cause),
        )
        .await
    }

    /// `uuid_send_dtmf <uuid> <digits>`
    pub async fn send_dtmf(&self, addr: &str, uuid: &str, digits: &str) -> EslResult<JobId> {
        self.submit(
            addr,
            Command::new(UUID_SEND_DTMF)
                .arg(uuid)
                .arg(digits),
        )
        .await
    }
}
