use crate::roster::delta::RosterDelta;
use std::collections::HashSet;
use std::sync::Arc;
use talkwire_core::{RosterEntry, SessionId};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const DELTA_CHANNEL_CAPACITY: usize = 64;

/// Result of applying a roster snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterOutcome {
    Delta(Arc<RosterDelta>),
    /// The local participant is no longer in the call although it believed
    /// it was: the call was ended for it remotely.
    EndedRemotely,
}

/// The current roster of one call attempt.
pub struct CallRoster {
    entries: Vec<RosterEntry>,
    local_was_in_call: bool,
    deltas: broadcast::Sender<Arc<RosterDelta>>,
}

impl Default for CallRoster {
    fn default() -> Self {
        Self::new()
    }
}

impl CallRoster {
    pub fn new() -> Self {
        let (deltas, _) = broadcast::channel(DELTA_CHANNEL_CAPACITY);
        Self {
            entries: Vec::new(),
            local_was_in_call: false,
            deltas,
        }
    }

    /// Replaces the roster with `snapshot`.
    ///
    /// `believes_in_call` is whether the call session currently considers
    /// itself joined. Deltas are published to subscribers unless the outcome
    /// is [`RosterOutcome::EndedRemotely`].
    pub fn apply(
        &mut self,
        snapshot: Vec<RosterEntry>,
        local: &SessionId,
        believes_in_call: bool,
    ) -> RosterOutcome {
        let snapshot = dedupe(snapshot);
        let delta = RosterDelta::compute(&self.entries, &snapshot);
        self.entries = snapshot;

        let local_in_call = self
            .get(local)
            .is_some_and(|entry| entry.in_call.is_in_call());

        if believes_in_call && self.local_was_in_call && !local_in_call {
            info!(
                "Local session {} dropped out of the call roster, call ended remotely",
                local
            );
            self.local_was_in_call = false;
            return RosterOutcome::EndedRemotely;
        }
        self.local_was_in_call = local_in_call;

        let delta = Arc::new(delta);
        if !delta.is_empty() {
            debug!(
                "Roster delta: {} joined, {} updated, {} left",
                delta.joined.len(),
                delta.updated.len(),
                delta.left.len()
            );
            // No receivers is fine.
            let _ = self.deltas.send(delta.clone());
        }
        RosterOutcome::Delta(delta)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RosterDelta>> {
        self.deltas.subscribe()
    }

    pub(crate) fn delta_sender(&self) -> broadcast::Sender<Arc<RosterDelta>> {
        self.deltas.clone()
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn get(&self, session_id: &SessionId) -> Option<&RosterEntry> {
        self.entries.iter().find(|e| e.session_id == *session_id)
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.get(session_id).is_some()
    }

    /// Remote entries currently flagged in call.
    pub fn others_in_call<'a>(
        &'a self,
        local: &'a SessionId,
    ) -> impl Iterator<Item = &'a RosterEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.session_id != *local && e.in_call.is_in_call())
    }

    pub fn has_others_in_call(&self, local: &SessionId) -> bool {
        self.others_in_call(local).next().is_some()
    }

    /// Forgets everything, so the next snapshot is reported as all joined.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.local_was_in_call = false;
    }
}

fn dedupe(snapshot: Vec<RosterEntry>) -> Vec<RosterEntry> {
    let mut seen = HashSet::with_capacity(snapshot.len());
    snapshot
        .into_iter()
        .filter(|entry| {
            let fresh = seen.insert(entry.session_id.clone());
            if !fresh {
                warn!(
                    "Duplicate roster entry for session {}, keeping the first",
                    entry.session_id
                );
            }
            fresh
        })
        .collect()
}
