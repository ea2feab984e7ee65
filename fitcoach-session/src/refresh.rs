//! Background token refresh.
//!
//! While a user is signed in, a task renews the identity-provider tokens
//! every `refresh_interval`. The task is keyed on the user's identity: it is
//! armed once per identity and replaced only when the identity changes.
//!
//! A tick that finds the session can no longer be renewed clears the session
//! and broadcasts [`SessionEvent::Invalidated`]; nobody is awaiting the tick,
//! so there is no error to return. A tick that fails for any other reason is
//! logged and the next tick proceeds as scheduled.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::manager::Inner;
use crate::model::UserId;
use crate::state::SessionEvent;

/// Handle to the running refresh loop.
pub(crate) struct RefreshTask {
    user_id: UserId,
    handle: JoinHandle<()>,
}

impl RefreshTask {
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[derive(Debug, PartialEq, Eq)]
enum TickOutcome {
    Continue,
    Stop,
}

impl Inner {
    /// Arm the refresh loop for `user_id` unless it is already running for
    /// that identity.
    pub(crate) fn arm_refresh(self: &Arc<Self>, user_id: &UserId, generation: u64) {
        let mut slot = self.refresh.lock();

        if let Some(task) = slot.as_ref() {
            if &task.user_id == user_id && !task.is_finished() {
                return;
            }
        }
        if let Some(old) = slot.take() {
            tracing::debug!(user_id = %old.user_id, "replacing refresh task for previous identity");
            old.handle.abort();
        }

        let period = self.refresh_interval;
        let handle = tokio::spawn(run_refresh_loop(
            Arc::downgrade(self),
            user_id.clone(),
            generation,
            period,
        ));

        tracing::debug!(%user_id, period_secs = period.as_secs(), "armed background token refresh");

        *slot = Some(RefreshTask {
            user_id: user_id.clone(),
            handle,
        });
    }

    pub(crate) fn disarm_refresh(&self) {
        if let Some(task) = self.refresh.lock().take() {
            tracing::debug!(user_id = %task.user_id, "stopped background token refresh");
            task.handle.abort();
        }
    }

    /// One refresh attempt. Runs under the operations lock so it never
    /// interleaves with a user action.
    async fn refresh_tick(&self, user_id: &UserId, generation: u64) -> TickOutcome {
        let _op = self.ops.lock().await;

        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(%user_id, "session changed while refresh was queued, skipping");
            return TickOutcome::Stop;
        }

        match self.identity.refresh_tokens().await {
            Ok(Some(identity)) => {
                if &identity.user_id != user_id {
                    tracing::warn!(
                        %user_id,
                        refreshed = %identity.user_id,
                        "refresh returned a different identity"
                    );
                }
                tracing::debug!(%user_id, "background token refresh succeeded");
                TickOutcome::Continue
            }
            Ok(None) => {
                tracing::info!(%user_id, "session could not be renewed, signing out locally");
                self.clear_session();
                self.emit(SessionEvent::Invalidated {
                    user_id: user_id.clone(),
                });
                TickOutcome::Stop
            }
            Err(e) => {
                tracing::warn!(
                    %user_id,
                    kind = ?e.kind,
                    error = %e.message,
                    "background token refresh failed, retrying next interval"
                );
                TickOutcome::Continue
            }
        }
    }
}

async fn run_refresh_loop(inner: Weak<Inner>, user_id: UserId, generation: u64, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(inner) = inner.upgrade() else {
            return;
        };
        if inner.refresh_tick(&user_id, generation).await == TickOutcome::Stop {
            return;
        }
    }
}
