//! Wire-facing data model for the member view: event envelopes, payload kinds,
//! snapshot records and the member table entry.
//!
//! Payload kinds are closed enums so that every dispatch site is checked for
//! exhaustiveness by the compiler. An event carrying a kind this engine does
//! not understand fails loudly at the dispatch site instead of being dropped.

use std::fmt::Display;

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// Hash of an event, used as its identity everywhere in the engine.
pub type EventId = B256;

/// Derives the canonical user id from a raw 20-byte address.
///
/// The derivation is deterministic (EIP-55 checksum rendering), so the same
/// address always maps to the same member table key.
pub fn user_id_from_address(address: &Address) -> String {
    address.to_checksum(None)
}

/// Membership operation carried by a membership event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MembershipOp {
    Join,
    Invite,
    Leave,
}

impl Display for MembershipOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            MembershipOp::Join => "join",
            MembershipOp::Invite => "invite",
            MembershipOp::Leave => "leave",
        };
        write!(f, "{op}")
    }
}

/// Ciphertext envelope produced by the encryption subsystem.
///
/// The engine never looks inside `ciphertext`; it only routes the envelope to
/// subscribers and matches later decryption callbacks by event id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub ciphertext: Vec<u8>,
    pub session_id: String,
    pub algorithm: String,
}

/// [`EncryptedData`] together with the event that introduced it, as carried in
/// snapshots. The event id is the key for out-of-band cleartext lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedEncryptedData {
    pub data: EncryptedData,
    pub event_id: EventId,
    pub event_num: u64,
}

/// A device's request for group-encryption session material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySolicitation {
    pub device_key: String,
    pub fallback_key: String,
    pub is_new_device: bool,
    pub session_ids: Vec<String>,
}

/// The response delivering requested session material to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFulfillment {
    pub user_address: Address,
    pub device_key: String,
    pub session_ids: Vec<String>,
}

/// Reference to an NFT used as a member's avatar.
///
/// A payload with an empty `contract_address` clears the stored reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftPayload {
    pub chain_id: u64,
    pub contract_address: Vec<u8>,
    pub token_id: Vec<u8>,
}

/// Membership change for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipPayload {
    pub op: MembershipOp,
    pub user_address: Address,
}

/// A pin event: a reference to another event in the stream, carried inline so
/// the view can materialize it without a timeline lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinPayload {
    /// Identity of the pinned event.
    pub event_id: EventId,
    /// Author of the pinned event (not of the pin itself).
    pub creator_address: Address,
    /// Payload of the pinned event.
    pub payload: Box<StreamPayload>,
}

/// Member-scoped payload kinds handled by this view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemberPayload {
    Membership(MembershipPayload),
    KeySolicitation(KeySolicitation),
    KeyFulfillment(KeyFulfillment),
    DisplayName(EncryptedData),
    Username(EncryptedData),
    EnsAddress(Vec<u8>),
    Nft(NftPayload),
    Pin(PinPayload),
    Unpin { event_id: EventId },
}

impl MemberPayload {
    /// Short name used in logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            MemberPayload::Membership(_) => "membership",
            MemberPayload::KeySolicitation(_) => "key solicitation",
            MemberPayload::KeyFulfillment(_) => "key fulfillment",
            MemberPayload::DisplayName(_) => "display name",
            MemberPayload::Username(_) => "username",
            MemberPayload::EnsAddress(_) => "ens address",
            MemberPayload::Nft(_) => "nft",
            MemberPayload::Pin(_) => "pin",
            MemberPayload::Unpin { .. } => "unpin",
        }
    }
}

/// Top-level payload of a stream event.
///
/// The member view only mutates state for [`StreamPayload::Member`];
/// channel messages appear here because pinned events own one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamPayload {
    Member(MemberPayload),
    ChannelMessage(EncryptedData),
}

/// Cleartext produced by the encryption subsystem for a previously seen event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecryptedContent {
    /// Decrypted metadata text (username, display name).
    Text(String),
    /// Decrypted channel message body (pinned content).
    ChannelMessage(String),
}

/// A newly observed event, not yet finalized in a block.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEvent {
    pub event_id: EventId,
    pub creator_address: Address,
    pub miniblock_num: Option<u64>,
    pub event_num: Option<u64>,
    pub payload: StreamPayload,
}

impl RemoteEvent {
    pub fn creator_user_id(&self) -> String {
        user_id_from_address(&self.creator_address)
    }
}

/// An event whose containing block has been finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedEvent {
    pub event_id: EventId,
    pub creator_address: Address,
    pub miniblock_num: u64,
    pub event_num: u64,
    pub payload: StreamPayload,
}

/// An event owned by the view itself, e.g. the target of a pin. Carries its
/// decrypted content once the encryption subsystem resolves it.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEvent {
    pub event_id: EventId,
    pub creator_address: Address,
    pub event_num: u64,
    pub payload: StreamPayload,
    pub decrypted_content: Option<DecryptedContent>,
}

impl TimelineEvent {
    /// Materializes the event referenced by a pin payload.
    ///
    /// Pinned events are synthesized with a zero ordinal: their position in
    /// the timeline is irrelevant to the pin ledger, only their identity and
    /// content are.
    pub fn from_pin(pin: &PinPayload) -> Self {
        TimelineEvent {
            event_id: pin.event_id,
            creator_address: pin.creator_address,
            event_num: 0,
            payload: (*pin.payload).clone(),
            decrypted_content: None,
        }
    }
}

/// One joined member as checkpointed in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    pub user_address: Address,
    pub miniblock_num: u64,
    pub event_num: u64,
    pub solicitations: Vec<KeySolicitation>,
    pub username: Option<WrappedEncryptedData>,
    pub display_name: Option<WrappedEncryptedData>,
    pub ens_address: Option<Vec<u8>>,
    pub nft: Option<NftPayload>,
}

/// One pin as checkpointed in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinSnapshot {
    /// Creator of the pin, not of the pinned event.
    pub creator_address: Address,
    pub pin: PinPayload,
}

/// Checkpointed member state used to bootstrap a stream without replaying its
/// full history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MembersSnapshot {
    pub joined: Vec<MemberSnapshot>,
    pub pins: Vec<PinSnapshot>,
}

/// Entry in the member table. The table owned by
/// [`StreamMembersView`](crate::members_view::StreamMembersView) is the single
/// source of truth for these attributes; sub-components reference members by
/// user id only.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMember {
    pub user_id: String,
    pub user_address: Address,
    pub miniblock_num: Option<u64>,
    pub event_num: Option<u64>,
    pub solicitations: Vec<KeySolicitation>,
    pub encrypted_username: Option<WrappedEncryptedData>,
    pub encrypted_display_name: Option<WrappedEncryptedData>,
    pub ens_address: Option<Vec<u8>>,
    pub nft: Option<NftPayload>,
}

impl StreamMember {
    /// Creates a bare member record for a freshly observed join. Ordinals are
    /// whatever the pending event carried; confirmation overwrites them.
    pub fn new(
        user_address: Address,
        miniblock_num: Option<u64>,
        event_num: Option<u64>,
    ) -> Self {
        StreamMember {
            user_id: user_id_from_address(&user_address),
            user_address,
            miniblock_num,
            event_num,
            solicitations: Vec::new(),
            encrypted_username: None,
            encrypted_display_name: None,
            ens_address: None,
            nft: None,
        }
    }
}
