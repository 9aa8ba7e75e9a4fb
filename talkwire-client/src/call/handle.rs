use crate::call::call_command::CallCommand;
use crate::call::call_state::CallState;
use crate::call::participants::ParticipantViews;
use crate::error::CallError;
use crate::peer::LocalMedia;
use crate::roster::RosterDelta;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

/// Cloneable control and observation handle of a running call session.
#[derive(Clone)]
pub struct CallHandle {
    commands: mpsc::Sender<CallCommand>,
    state: watch::Receiver<CallState>,
    deltas: broadcast::Sender<Arc<RosterDelta>>,
    participants: watch::Receiver<ParticipantViews>,
}

impl CallHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<CallCommand>,
        state: watch::Receiver<CallState>,
        deltas: broadcast::Sender<Arc<RosterDelta>>,
        participants: watch::Receiver<ParticipantViews>,
    ) -> Self {
        Self {
            commands,
            state,
            deltas,
            participants,
        }
    }

    pub async fn hangup(&self) -> Result<(), CallError> {
        self.send(CallCommand::Hangup).await
    }

    pub async fn retry(&self) -> Result<(), CallError> {
        self.send(CallCommand::Retry).await
    }

    pub async fn set_local_media(&self, audio: bool, video: bool) -> Result<(), CallError> {
        self.send(CallCommand::SetLocalMedia(LocalMedia { audio, video }))
            .await
    }

    pub async fn raise_hand(&self, raised: bool) -> Result<(), CallError> {
        self.send(CallCommand::RaiseHand(raised)).await
    }

    pub fn state(&self) -> CallState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<CallState> {
        self.state.clone()
    }

    /// Waits until the call reaches `target`.
    pub async fn wait_for_state(&self, target: CallState) -> Result<(), CallError> {
        let mut state = self.state.clone();
        let reached = state.wait_for(|s| *s == target).await.is_ok();
        if reached {
            Ok(())
        } else {
            Err(CallError::SessionClosed)
        }
    }

    pub fn roster_deltas(&self) -> broadcast::Receiver<Arc<RosterDelta>> {
        self.deltas.subscribe()
    }

    pub fn participants(&self) -> watch::Receiver<ParticipantViews> {
        self.participants.clone()
    }

    async fn send(&self, command: CallCommand) -> Result<(), CallError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CallError::SessionClosed)
    }
}
