//! The member view orchestrator: applies snapshots, pending events,
//! confirmations and decryption callbacks, and fans state changes out to the
//! two notification channels.
//!
//! The view owns the member table; the membership tracker, solicitation
//! coordinator, metadata store and pin ledger never hold member copies of
//! their own. Contract violations (duplicate join, member-scoped event for an
//! unknown user, wrong payload kind) abort the offending event with an error;
//! benign races (duplicate confirmation, unpinning nothing) are no-ops.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::error::StreamViewError;
use crate::events::{EncryptionSink, StateSink};
use crate::membership::{ConfirmationStatus, MembershipTracker, PendingMembership};
use crate::pins::{Pin, PinLedger};
use crate::solicitations::SolicitationCoordinator;
use crate::types::{
    user_id_from_address, ConfirmedEvent, DecryptedContent, EventId, MemberPayload, MembersSnapshot,
    MembershipOp, RemoteEvent, StreamMember, StreamPayload, TimelineEvent, WrappedEncryptedData,
};
use crate::user_metadata::UserMetadataStore;

#[derive(Debug)]
pub struct StreamMembersView {
    stream_id: String,
    /// Canonical member table, keyed by user id. Single source of truth for
    /// member attributes.
    members: HashMap<String, StreamMember>,
    membership: MembershipTracker,
    solicitations: SolicitationCoordinator,
    user_metadata: UserMetadataStore,
    pins: PinLedger,
}

impl StreamMembersView {
    pub fn new(stream_id: impl Into<String>) -> Self {
        let stream_id = stream_id.into();
        StreamMembersView {
            members: HashMap::new(),
            membership: MembershipTracker::new(stream_id.clone()),
            solicitations: SolicitationCoordinator::new(stream_id.clone()),
            user_metadata: UserMetadataStore::new(stream_id.clone()),
            pins: PinLedger::new(stream_id.clone()),
            stream_id,
        }
    }

    /// One-time bulk load from a checkpoint. Must run before any pending or
    /// confirmed event is applied; the surrounding sync layer guarantees a
    /// single invocation per view.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &MembersSnapshot,
        cleartexts: Option<&HashMap<EventId, String>>,
        encryption_sink: Option<&EncryptionSink>,
    ) {
        debug_assert!(self.members.is_empty(), "snapshot applied twice");

        for member in &snapshot.joined {
            let user_id = user_id_from_address(&member.user_address);
            self.members.insert(
                user_id.clone(),
                StreamMember {
                    user_id: user_id.clone(),
                    user_address: member.user_address,
                    miniblock_num: Some(member.miniblock_num),
                    event_num: Some(member.event_num),
                    solicitations: member.solicitations.clone(),
                    encrypted_username: member.username.clone(),
                    encrypted_display_name: member.display_name.clone(),
                    ens_address: member.ens_address.clone(),
                    nft: member.nft.clone(),
                },
            );
            self.membership.apply_membership_event(
                &user_id,
                MembershipOp::Join,
                ConfirmationStatus::Confirmed,
                None,
            );
        }

        let usernames = self.collect_wrapped(|m| m.encrypted_username.clone());
        let display_names = self.collect_wrapped(|m| m.encrypted_display_name.clone());
        let ens_addresses = self
            .members
            .values()
            .filter_map(|m| m.ens_address.clone().map(|a| (m.user_id.clone(), a)))
            .collect();
        let nfts = self
            .members
            .values()
            .filter_map(|m| m.nft.clone().map(|n| (m.user_id.clone(), n)))
            .collect();
        self.user_metadata.apply_snapshot(
            usernames,
            display_names,
            ens_addresses,
            nfts,
            cleartexts,
            encryption_sink,
        );

        self.solicitations
            .init_solicitations(self.members.values(), encryption_sink);

        for snapped in &snapshot.pins {
            let event = TimelineEvent::from_pin(&snapped.pin);
            let cleartext = cleartexts
                .and_then(|map| map.get(&event.event_id))
                .map(String::as_str);
            self.pins.add_pin(
                user_id_from_address(&snapped.creator_address),
                event,
                cleartext,
                encryption_sink,
                None,
            );
        }
    }

    /// Provisionally applies one newly observed event.
    ///
    /// The effect lands immediately in the live view; membership effects are
    /// additionally recorded in the pending side table so confirmation can
    /// finalize them later.
    pub fn append_event(
        &mut self,
        event: &RemoteEvent,
        cleartext: Option<&str>,
        encryption_sink: Option<&EncryptionSink>,
        state_sink: Option<&StateSink>,
    ) -> Result<(), StreamViewError> {
        let StreamPayload::Member(payload) = &event.payload else {
            return Err(StreamViewError::UnexpectedPayload("channel message"));
        };
        let creator_user_id = event.creator_user_id();

        match payload {
            MemberPayload::Membership(membership) => {
                self.membership.record_pending(
                    event.event_id,
                    PendingMembership {
                        op: membership.op,
                        user_address: membership.user_address,
                    },
                );
                let user_id = user_id_from_address(&membership.user_address);
                match membership.op {
                    MembershipOp::Join => {
                        if self.members.contains_key(&user_id) {
                            return Err(StreamViewError::UserAlreadyJoined {
                                op: membership.op,
                                user_id,
                            });
                        }
                        self.members.insert(
                            user_id.clone(),
                            StreamMember::new(
                                membership.user_address,
                                event.miniblock_num,
                                event.event_num,
                            ),
                        );
                    }
                    MembershipOp::Leave => {
                        self.members.remove(&user_id);
                    }
                    MembershipOp::Invite => {}
                }
                self.membership.apply_membership_event(
                    &user_id,
                    membership.op,
                    ConfirmationStatus::Pending,
                    state_sink,
                );
            }
            MemberPayload::KeySolicitation(solicitation) => {
                let member = Self::known_member(
                    &mut self.members,
                    &creator_user_id,
                    "key solicitation",
                )?;
                self.solicitations
                    .apply_solicitation(member, solicitation.clone(), encryption_sink);
            }
            MemberPayload::KeyFulfillment(fulfillment) => {
                let user_id = user_id_from_address(&fulfillment.user_address);
                let member =
                    Self::known_member(&mut self.members, &user_id, "key fulfillment")?;
                self.solicitations.apply_fulfillment(member, fulfillment);
            }
            MemberPayload::DisplayName(data) => {
                let member =
                    Self::known_member(&mut self.members, &creator_user_id, "display name")?;
                member.encrypted_display_name = Some(WrappedEncryptedData {
                    data: data.clone(),
                    event_id: event.event_id,
                    event_num: event.event_num.unwrap_or_default(),
                });
                self.user_metadata.append_display_name(
                    event.event_id,
                    data.clone(),
                    &creator_user_id,
                    cleartext,
                    encryption_sink,
                    state_sink,
                );
            }
            MemberPayload::Username(data) => {
                let member = Self::known_member(&mut self.members, &creator_user_id, "username")?;
                member.encrypted_username = Some(WrappedEncryptedData {
                    data: data.clone(),
                    event_id: event.event_id,
                    event_num: event.event_num.unwrap_or_default(),
                });
                self.user_metadata.append_username(
                    event.event_id,
                    data.clone(),
                    &creator_user_id,
                    cleartext,
                    encryption_sink,
                    state_sink,
                );
            }
            MemberPayload::EnsAddress(address) => {
                Self::known_member(&mut self.members, &creator_user_id, "ens address")?;
                self.user_metadata
                    .append_ens_address(&creator_user_id, address.clone(), state_sink);
            }
            MemberPayload::Nft(nft) => {
                Self::known_member(&mut self.members, &creator_user_id, "nft")?;
                self.user_metadata
                    .append_nft(&creator_user_id, nft.clone(), state_sink);
            }
            MemberPayload::Pin(pin) => {
                let pinned = TimelineEvent::from_pin(pin);
                self.pins
                    .add_pin(creator_user_id, pinned, None, encryption_sink, state_sink);
            }
            MemberPayload::Unpin { event_id } => {
                self.pins.remove_pin(event_id, state_sink);
            }
        }
        Ok(())
    }

    /// Promotes a previously pending event into permanent state.
    ///
    /// Membership confirmation is a remove-and-apply on the pending side
    /// table keyed by the exact event identity; an absent record means the
    /// confirmation raced ahead or repeated, both silent no-ops.
    pub fn on_confirmed_event(
        &mut self,
        event: &ConfirmedEvent,
        state_sink: Option<&StateSink>,
    ) -> Result<(), StreamViewError> {
        let StreamPayload::Member(payload) = &event.payload else {
            return Err(StreamViewError::UnexpectedPayload("channel message"));
        };

        match payload {
            MemberPayload::Membership(_) => {
                let Some(pending) = self.membership.take_pending(&event.event_id) else {
                    debug!(
                        "[on_confirmed_event] no pending membership for event {} in {}",
                        event.event_id, self.stream_id
                    );
                    return Ok(());
                };
                let user_id = user_id_from_address(&pending.user_address);
                if let Some(member) = self.members.get_mut(&user_id) {
                    member.miniblock_num = Some(event.miniblock_num);
                    member.event_num = Some(event.event_num);
                }
                self.membership.apply_membership_event(
                    &user_id,
                    pending.op,
                    ConfirmationStatus::Confirmed,
                    state_sink,
                );
            }
            MemberPayload::Username(_)
            | MemberPayload::DisplayName(_)
            | MemberPayload::EnsAddress(_)
            | MemberPayload::Nft(_) => {
                self.user_metadata.on_confirmed_event(event, state_sink);
            }
            // Solicitations, fulfillments and pins take full effect at append
            // time; confirmation adds nothing.
            MemberPayload::KeySolicitation(_)
            | MemberPayload::KeyFulfillment(_)
            | MemberPayload::Pin(_)
            | MemberPayload::Unpin { .. } => {}
        }
        Ok(())
    }

    /// Callback from the decryption pipeline once ciphertext for a previously
    /// seen event resolves. Timing relative to append/confirm of the same
    /// event is unordered by design.
    pub fn on_decrypted_content(
        &mut self,
        event_id: &EventId,
        content: &DecryptedContent,
        state_sink: Option<&StateSink>,
    ) {
        if let DecryptedContent::Text(text) = content {
            self.user_metadata
                .on_decrypted_content(event_id, text, state_sink);
        }
        self.pins.on_decrypted_content(event_id, content, state_sink);
    }

    fn known_member<'a>(
        members: &'a mut HashMap<String, StreamMember>,
        user_id: &str,
        kind: &'static str,
    ) -> Result<&'a mut StreamMember, StreamViewError> {
        members.get_mut(user_id).ok_or_else(|| StreamViewError::NotAMember {
            kind,
            user_id: user_id.to_string(),
        })
    }

    fn collect_wrapped(
        &self,
        select: impl Fn(&StreamMember) -> Option<WrappedEncryptedData>,
    ) -> Vec<(String, WrappedEncryptedData)> {
        self.members
            .values()
            .filter_map(|m| select(m).map(|w| (m.user_id.clone(), w)))
            .collect()
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn is_member_joined(&self, user_id: &str) -> bool {
        self.membership.is_joined(user_id)
    }

    pub fn is_member(&self, op: MembershipOp, user_id: &str) -> bool {
        self.membership.is_member(op, user_id)
    }

    /// Every user that ever participated in the stream.
    pub fn participants(&self) -> HashSet<String> {
        self.membership.participants()
    }

    pub fn joined_participants(&self) -> HashSet<String> {
        self.membership.joined_participants()
    }

    pub fn joined_or_invited_participants(&self) -> HashSet<String> {
        self.membership.joined_or_invited_participants()
    }

    /// Canonical member record, if the user is currently in the live set.
    pub fn member(&self, user_id: &str) -> Option<&StreamMember> {
        self.members.get(user_id)
    }

    /// Pins in creation order.
    pub fn pins(&self) -> &[Pin] {
        self.pins.pins()
    }

    /// Decrypted profile metadata queries.
    pub fn metadata(&self) -> &UserMetadataStore {
        &self.user_metadata
    }
}
