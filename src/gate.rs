//! Wait-for-flags primitive shared by the link, session and publish tasks
//!
//! The link layer owns [`ReadyFlags::LINK_UP`], the session layer owns
//! [`ReadyFlags::SESSION_UP`]. Consumers block in [`ConditionGate::wait_all`]
//! until every flag they need is set at the same time.

use crate::error::GateError;
use std::fmt;
use std::ops::BitOr;
use std::time::Duration;
use tokio::sync::watch;
use tracing::trace;

/// Small bitset of readiness conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadyFlags(u8);

impl ReadyFlags {
    pub const NONE: ReadyFlags = ReadyFlags(0);
    pub const LINK_UP: ReadyFlags = ReadyFlags(0b01);
    pub const SESSION_UP: ReadyFlags = ReadyFlags(0b10);

    /// True when every bit of `other` is set in `self`
    pub fn contains(self, other: ReadyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn with(self, other: ReadyFlags) -> ReadyFlags {
        ReadyFlags(self.0 | other.0)
    }

    fn without(self, other: ReadyFlags) -> ReadyFlags {
        ReadyFlags(self.0 & !other.0)
    }
}

impl BitOr for ReadyFlags {
    type Output = ReadyFlags;

    fn bitor(self, rhs: ReadyFlags) -> ReadyFlags {
        self.with(rhs)
    }
}

impl fmt::Display for ReadyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(ReadyFlags::LINK_UP) {
            names.push("link_up");
        }
        if self.contains(ReadyFlags::SESSION_UP) {
            names.push("session_up");
        }
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// Shared flag set with blocking waits
///
/// Cloning yields another handle to the same flags.
#[derive(Debug, Clone)]
pub struct ConditionGate {
    flags_tx: watch::Sender<ReadyFlags>,
    flags_rx: watch::Receiver<ReadyFlags>,
}

impl Default for ConditionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionGate {
    /// Create a gate with every flag clear
    pub fn new() -> Self {
        let (flags_tx, flags_rx) = watch::channel(ReadyFlags::NONE);
        Self { flags_tx, flags_rx }
    }

    /// Set flags; waiters are only woken if a bit actually changed
    pub fn set(&self, flags: ReadyFlags) {
        self.flags_tx.send_if_modified(|current| {
            let next = current.with(flags);
            let changed = next != *current;
            *current = next;
            changed
        });
    }

    /// Clear flags; no-op if already clear
    pub fn clear(&self, flags: ReadyFlags) {
        self.flags_tx.send_if_modified(|current| {
            let next = current.without(flags);
            let changed = next != *current;
            *current = next;
            changed
        });
    }

    /// Current flag set
    pub fn flags(&self) -> ReadyFlags {
        *self.flags_rx.borrow()
    }

    /// Block until all `required` flags are set simultaneously
    ///
    /// With `timeout == None` the wait never gives up.
    pub async fn wait_all(
        &self,
        required: ReadyFlags,
        timeout: Option<Duration>,
    ) -> Result<(), GateError> {
        let mut rx = self.flags_tx.subscribe();

        let wait = async move {
            loop {
                let current = *rx.borrow_and_update();
                if current.contains(required) {
                    return Ok(());
                }
                trace!(required = %required, current = %current, "waiting on gate");
                rx.changed().await.map_err(|_| GateError::Closed)?;
            }
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| GateError::TimedOut)?,
            None => wait.await,
        }
    }
}
