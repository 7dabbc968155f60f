//! Per-user membership state machine and the pending-event side table.
//!
//! Each user moves through {not-a-member, invited, joined, left}; absence
//! from the table reads as not-a-member. Transitions carry a confirmation
//! status, and pending/confirmed bookkeeping is kept distinguishable on
//! purpose: confirmation is a remove-and-apply against the side table keyed
//! by event identity, never a reinterpretation of current membership.
//!
//! # Transitions
//!
//! ```text
//! (none)  -- join --> Joined      (none)  -- invite --> Invited
//! Invited -- join --> Joined      Joined  -- leave  --> Left
//! Left    -- join --> Joined      Invited -- leave  --> Left
//! ```
//!
//! A confirmed transition that no longer matches the user's current state was
//! superseded by a later pending event and is dropped without touching state.

use std::collections::{HashMap, HashSet};

use alloy::primitives::Address;
use log::debug;

use crate::events::{emit, StateSink, StreamStateEvent};
use crate::types::{EventId, MembershipOp};

/// Whether a membership transition comes from a pending or a finalized event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
}

/// Membership state of a single tracked user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipState {
    Invited,
    Joined,
    Left,
}

impl MembershipState {
    fn target_of(op: MembershipOp) -> Self {
        match op {
            MembershipOp::Join => MembershipState::Joined,
            MembershipOp::Invite => MembershipState::Invited,
            MembershipOp::Leave => MembershipState::Left,
        }
    }
}

/// In-flight effect of a membership event, kept between append and
/// confirmation. Confirmation deletes the record and promotes its effect.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMembership {
    pub op: MembershipOp,
    pub user_address: Address,
}

#[derive(Debug, Clone, Copy)]
struct UserMembership {
    state: MembershipState,
    status: ConfirmationStatus,
}

/// Tracks membership status for every user ever observed on the stream.
#[derive(Debug)]
pub struct MembershipTracker {
    stream_id: String,
    users: HashMap<String, UserMembership>,
    pending_events: HashMap<EventId, PendingMembership>,
}

impl MembershipTracker {
    pub fn new(stream_id: String) -> Self {
        MembershipTracker {
            stream_id,
            users: HashMap::new(),
            pending_events: HashMap::new(),
        }
    }

    /// Records the in-flight effect of a pending membership event.
    pub fn record_pending(&mut self, event_id: EventId, pending: PendingMembership) {
        self.pending_events.insert(event_id, pending);
    }

    /// Removes and returns the pending record for `event_id`, if any. `None`
    /// means the event was already confirmed or never seen as pending.
    pub fn take_pending(&mut self, event_id: &EventId) -> Option<PendingMembership> {
        self.pending_events.remove(event_id)
    }

    /// Applies one membership transition for `user_id`.
    ///
    /// Redundant applications (user already in the target state with the same
    /// or stronger status) are silent no-ops and emit nothing. A confirmed
    /// transition against a state that has since moved on is dropped: the
    /// caller resolved the matching pending record, so ordinal bookkeeping
    /// already happened, and membership must not be resurrected.
    pub fn apply_membership_event(
        &mut self,
        user_id: &str,
        op: MembershipOp,
        status: ConfirmationStatus,
        state_sink: Option<&StateSink>,
    ) {
        let target = MembershipState::target_of(op);
        if !self.users.contains_key(user_id) {
            self.users.insert(
                user_id.to_string(),
                UserMembership {
                    state: target,
                    status,
                },
            );
            self.emit_transition(user_id, op, status, state_sink);
            return;
        }

        let mut transitioned = false;
        if let Some(user) = self.users.get_mut(user_id) {
            if user.state == target {
                if status == ConfirmationStatus::Confirmed
                    && user.status == ConfirmationStatus::Pending
                {
                    user.status = ConfirmationStatus::Confirmed;
                    transitioned = true;
                } else {
                    debug!(
                        "[apply_membership_event] redundant {op} for {user_id} in {}",
                        self.stream_id
                    );
                }
            } else {
                match status {
                    ConfirmationStatus::Pending => {
                        // An invite never demotes a user who already joined.
                        if target == MembershipState::Invited
                            && user.state == MembershipState::Joined
                        {
                            debug!(
                                "[apply_membership_event] ignoring invite for joined user {user_id} in {}",
                                self.stream_id
                            );
                        } else {
                            user.state = target;
                            user.status = ConfirmationStatus::Pending;
                            transitioned = true;
                        }
                    }
                    ConfirmationStatus::Confirmed => {
                        // Superseded by a later pending event; state stays as-is.
                        debug!(
                            "[apply_membership_event] superseded {op} confirmation for {user_id} in {}",
                            self.stream_id
                        );
                    }
                }
            }
        }
        if transitioned {
            self.emit_transition(user_id, op, status, state_sink);
        }
    }

    fn emit_transition(
        &self,
        user_id: &str,
        op: MembershipOp,
        status: ConfirmationStatus,
        state_sink: Option<&StateSink>,
    ) {
        match status {
            ConfirmationStatus::Pending => emit(
                state_sink,
                StreamStateEvent::PendingMembershipUpdated {
                    stream_id: self.stream_id.clone(),
                    user_id: user_id.to_string(),
                },
            ),
            ConfirmationStatus::Confirmed => {
                let specific = match op {
                    MembershipOp::Join => StreamStateEvent::NewUserJoined {
                        stream_id: self.stream_id.clone(),
                        user_id: user_id.to_string(),
                    },
                    MembershipOp::Invite => StreamStateEvent::NewUserInvited {
                        stream_id: self.stream_id.clone(),
                        user_id: user_id.to_string(),
                    },
                    MembershipOp::Leave => StreamStateEvent::UserLeft {
                        stream_id: self.stream_id.clone(),
                        user_id: user_id.to_string(),
                    },
                };
                emit(state_sink, specific);
                emit(
                    state_sink,
                    StreamStateEvent::MembershipUpdated {
                        stream_id: self.stream_id.clone(),
                        user_id: user_id.to_string(),
                    },
                );
            }
        }
    }

    /// Whether `user_id` currently sits in the state targeted by `op`.
    /// Unknown users read as not-a-member for every operation.
    pub fn is_member(&self, op: MembershipOp, user_id: &str) -> bool {
        let target = MembershipState::target_of(op);
        self.users
            .get(user_id)
            .map(|user| user.state == target)
            .unwrap_or(false)
    }

    pub fn is_joined(&self, user_id: &str) -> bool {
        self.is_member(MembershipOp::Join, user_id)
    }

    /// Every user that ever participated, regardless of current state.
    pub fn participants(&self) -> HashSet<String> {
        self.users.keys().cloned().collect()
    }

    pub fn joined_participants(&self) -> HashSet<String> {
        self.participants_in(|state| state == MembershipState::Joined)
    }

    pub fn joined_or_invited_participants(&self) -> HashSet<String> {
        self.participants_in(|state| {
            matches!(state, MembershipState::Joined | MembershipState::Invited)
        })
    }

    fn participants_in(&self, filter: impl Fn(MembershipState) -> bool) -> HashSet<String> {
        self.users
            .iter()
            .filter(|(_, user)| filter(user.state))
            .map(|(user_id, _)| user_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<StreamStateEvent>) -> Vec<StreamStateEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn test_unknown_user_is_not_a_member() {
        let tracker = MembershipTracker::new("stream".to_string());
        assert!(!tracker.is_joined("alice"));
        assert!(!tracker.is_member(MembershipOp::Invite, "alice"));
        assert!(!tracker.is_member(MembershipOp::Leave, "alice"));
        assert!(tracker.participants().is_empty());
    }

    #[test]
    fn test_pending_then_confirmed_join() {
        let mut tracker = MembershipTracker::new("stream".to_string());
        let (tx, mut rx) = mpsc::unbounded_channel();

        tracker.apply_membership_event(
            "alice",
            MembershipOp::Join,
            ConfirmationStatus::Pending,
            Some(&tx),
        );
        assert!(tracker.is_joined("alice"));
        assert_eq!(
            drain(&mut rx),
            vec![StreamStateEvent::PendingMembershipUpdated {
                stream_id: "stream".to_string(),
                user_id: "alice".to_string(),
            }]
        );

        tracker.apply_membership_event(
            "alice",
            MembershipOp::Join,
            ConfirmationStatus::Confirmed,
            Some(&tx),
        );
        assert!(tracker.is_joined("alice"));
        assert_eq!(
            drain(&mut rx),
            vec![
                StreamStateEvent::NewUserJoined {
                    stream_id: "stream".to_string(),
                    user_id: "alice".to_string(),
                },
                StreamStateEvent::MembershipUpdated {
                    stream_id: "stream".to_string(),
                    user_id: "alice".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_redundant_confirmation_is_a_silent_noop() {
        let mut tracker = MembershipTracker::new("stream".to_string());
        let (tx, mut rx) = mpsc::unbounded_channel();

        tracker.apply_membership_event(
            "alice",
            MembershipOp::Join,
            ConfirmationStatus::Confirmed,
            Some(&tx),
        );
        assert_eq!(drain(&mut rx).len(), 2);

        // Same confirmation again: state unchanged, nothing emitted.
        tracker.apply_membership_event(
            "alice",
            MembershipOp::Join,
            ConfirmationStatus::Confirmed,
            Some(&tx),
        );
        assert!(tracker.is_joined("alice"));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_superseded_confirmation_does_not_resurrect_membership() {
        let mut tracker = MembershipTracker::new("stream".to_string());
        let (tx, mut rx) = mpsc::unbounded_channel();

        tracker.apply_membership_event(
            "carol",
            MembershipOp::Join,
            ConfirmationStatus::Pending,
            Some(&tx),
        );
        tracker.apply_membership_event(
            "carol",
            MembershipOp::Leave,
            ConfirmationStatus::Pending,
            Some(&tx),
        );
        assert!(!tracker.is_joined("carol"));
        drain(&mut rx);

        // The join confirmation arrives after the pending leave already moved
        // carol out of the joined set.
        tracker.apply_membership_event(
            "carol",
            MembershipOp::Join,
            ConfirmationStatus::Confirmed,
            Some(&tx),
        );
        assert!(!tracker.is_joined("carol"));
        assert!(tracker.is_member(MembershipOp::Leave, "carol"));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_invite_then_join() {
        let mut tracker = MembershipTracker::new("stream".to_string());

        tracker.apply_membership_event(
            "bob",
            MembershipOp::Invite,
            ConfirmationStatus::Confirmed,
            None,
        );
        assert!(tracker.is_member(MembershipOp::Invite, "bob"));
        assert!(!tracker.is_joined("bob"));

        tracker.apply_membership_event(
            "bob",
            MembershipOp::Join,
            ConfirmationStatus::Pending,
            None,
        );
        assert!(tracker.is_joined("bob"));
        assert!(!tracker.is_member(MembershipOp::Invite, "bob"));
    }

    #[test]
    fn test_participant_sets() {
        let mut tracker = MembershipTracker::new("stream".to_string());
        for (user, op) in [
            ("alice", MembershipOp::Join),
            ("bob", MembershipOp::Invite),
            ("carol", MembershipOp::Leave),
        ] {
            tracker.apply_membership_event(user, op, ConfirmationStatus::Confirmed, None);
        }

        assert_eq!(
            tracker.joined_participants(),
            ["alice".to_string()].into_iter().collect()
        );
        assert_eq!(
            tracker.joined_or_invited_participants(),
            ["alice".to_string(), "bob".to_string()]
                .into_iter()
                .collect()
        );
        assert_eq!(tracker.participants().len(), 3);
    }

    #[test]
    fn test_pending_side_table_remove_and_apply() {
        let mut tracker = MembershipTracker::new("stream".to_string());
        let event_id = EventId::repeat_byte(0xab);
        let record = PendingMembership {
            op: MembershipOp::Join,
            user_address: Address::repeat_byte(0x11),
        };

        tracker.record_pending(event_id, record.clone());
        assert_eq!(tracker.take_pending(&event_id), Some(record));
        // Second take is the duplicate-confirmation race: nothing left.
        assert_eq!(tracker.take_pending(&event_id), None);
    }
}
