use crate::call::call_state::{CallEvent, CallState, next_state};
use crate::config::CallConfig;
use std::time::Duration;
use talkwire_core::PeerKey;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Delayed callbacks posted back to the call session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// A state timer fired. `epoch` identifies the state it was scheduled
    /// for.
    Call { epoch: u64, event: CallEvent },
    /// A connection created before its roster entry outlived its grace
    /// period.
    OrphanExpired(PeerKey),
}

/// Holds the current [`CallState`] and the timer belonging to it.
///
/// Every state change goes through [`CallStateMachine::set_state`], which
/// ignores a change to the current state and cancels the pending timer
/// before scheduling the next one.
pub struct CallStateMachine {
    state: watch::Sender<CallState>,
    epoch: u64,
    pending: Option<JoinHandle<()>>,
    timers: mpsc::UnboundedSender<TimerEvent>,
    ringing_timeout: Duration,
    publisher_retry_delay: Duration,
}

impl CallStateMachine {
    pub fn new(config: &CallConfig, timers: mpsc::UnboundedSender<TimerEvent>) -> Self {
        let (state, _) = watch::channel(CallState::Connecting);
        Self {
            state,
            epoch: 0,
            pending: None,
            timers,
            ringing_timeout: config.ringing_timeout,
            publisher_retry_delay: config.publisher_retry_delay,
        }
    }

    pub fn state(&self) -> CallState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CallState> {
        self.state.subscribe()
    }

    /// Applies `event` according to the transition table. Returns the new
    /// state if the state changed.
    pub fn apply(&mut self, event: CallEvent) -> Option<CallState> {
        let current = self.state();
        let Some(next) = next_state(current, &event) else {
            debug!("Call event {:?} does not apply in state {}", event, current);
            return None;
        };
        self.set_state(next).then_some(next)
    }

    /// Applies a fired state timer unless it belongs to a state that has
    /// been left since.
    pub fn apply_timer(&mut self, epoch: u64, event: CallEvent) -> Option<CallState> {
        if epoch != self.epoch {
            debug!("Dropping stale timer {:?}", event);
            return None;
        }
        self.pending = None;
        self.apply(event)
    }

    pub fn set_state(&mut self, next: CallState) -> bool {
        let current = self.state();
        if current == next {
            return false;
        }

        self.cancel_pending();
        self.epoch += 1;
        info!("Call state {} -> {}", current, next);
        self.state.send_replace(next);
        self.schedule(next);
        true
    }

    pub fn cancel_pending(&mut self) {
        if let Some(timer) = self.pending.take() {
            timer.abort();
        }
    }

    pub fn has_pending_timer(&self) -> bool {
        self.pending.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn schedule(&mut self, state: CallState) {
        let (delay, event) = match state {
            CallState::Joined => (self.ringing_timeout, CallEvent::RingingTimeout),
            CallState::PublisherFailed => (self.publisher_retry_delay, CallEvent::AutoRetry),
            _ => return,
        };

        let timers = self.timers.clone();
        let epoch = self.epoch;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = timers.send(TimerEvent::Call { epoch, event });
        }));
    }
}

impl Drop for CallStateMachine {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
