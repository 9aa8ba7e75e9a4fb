use std::collections::{HashMap, HashSet};
use talkwire_core::{RosterEntry, SessionId};

/// An entry present in both snapshots with at least one field changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedEntry {
    pub previous: RosterEntry,
    pub current: RosterEntry,
}

/// Difference between two consecutive roster snapshots, keyed by session id.
///
/// The four sets are disjoint and together cover every session id of both
/// snapshots. Entries keep the order of the snapshot they were taken from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterDelta {
    pub joined: Vec<RosterEntry>,
    pub updated: Vec<UpdatedEntry>,
    pub left: Vec<RosterEntry>,
    pub unchanged: Vec<RosterEntry>,
}

/// Call-level membership changes derived from a delta, local session excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallTransitions {
    /// Sessions that are now in the call and were not before.
    pub entered: Vec<RosterEntry>,
    /// Sessions that left the roster or dropped out of the call.
    pub exited: Vec<SessionId>,
    /// Sessions already in the call that started publishing audio or video.
    pub started_publishing: Vec<RosterEntry>,
}

impl RosterDelta {
    pub fn compute(old: &[RosterEntry], new: &[RosterEntry]) -> Self {
        let previous: HashMap<&SessionId, &RosterEntry> =
            old.iter().map(|e| (&e.session_id, e)).collect();
        let current: HashSet<&SessionId> = new.iter().map(|e| &e.session_id).collect();

        let mut delta = RosterDelta::default();
        for entry in new {
            match previous.get(&entry.session_id) {
                None => delta.joined.push(entry.clone()),
                Some(prev) if *prev == entry => delta.unchanged.push(entry.clone()),
                Some(prev) => delta.updated.push(UpdatedEntry {
                    previous: (*prev).clone(),
                    current: entry.clone(),
                }),
            }
        }
        delta.left = old
            .iter()
            .filter(|e| !current.contains(&e.session_id))
            .cloned()
            .collect();
        delta
    }

    /// Delta of a snapshot against an empty roster.
    pub fn initial(entries: &[RosterEntry]) -> Self {
        Self::compute(&[], entries)
    }

    /// True when nothing joined, changed or left.
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.updated.is_empty() && self.left.is_empty()
    }

    pub fn len(&self) -> usize {
        self.joined.len() + self.updated.len() + self.left.len() + self.unchanged.len()
    }

    pub fn call_transitions(&self, local: &SessionId) -> CallTransitions {
        let mut transitions = CallTransitions::default();

        for entry in &self.joined {
            if entry.session_id != *local && entry.in_call.is_in_call() {
                transitions.entered.push(entry.clone());
            }
        }

        for UpdatedEntry { previous, current } in &self.updated {
            if current.session_id == *local {
                continue;
            }
            match (previous.in_call.is_in_call(), current.in_call.is_in_call()) {
                (false, true) => transitions.entered.push(current.clone()),
                (true, false) => transitions.exited.push(current.session_id.clone()),
                (true, true)
                    if !previous.in_call.has_audio_or_video()
                        && current.in_call.has_audio_or_video() =>
                {
                    transitions.started_publishing.push(current.clone())
                }
                _ => {}
            }
        }

        for entry in &self.left {
            if entry.session_id != *local {
                transitions.exited.push(entry.session_id.clone());
            }
        }
        transitions
    }
}
