//! Client-side reconciliation engine for the member state of one stream.
//!
//! A stream is an append-only log of signed events, periodically checkpointed
//! into snapshots. This crate rebuilds and maintains the local view of group
//! membership, per-member profile metadata, pinned messages and the group-key
//! solicitation/fulfillment protocol from that log, reconciling three time
//! horizons: the snapshot, unconfirmed pending events, and confirmed events.
//!
//! Entry points live on [`StreamMembersView`]: `apply_snapshot` once at
//! initialization, `append_event` for each newly observed event,
//! `on_confirmed_event` when a block finalizes, and `on_decrypted_content`
//! whenever the encryption subsystem resolves ciphertext. Every mutation fans
//! out typed signals on two independent channels, [`StreamEncryptionEvent`]
//! and [`StreamStateEvent`].
//!
//! The engine is a deterministic fold over the supplied event sequence: no
//! I/O, no retries, no internal locking. The surrounding sync layer
//! serializes calls per stream; `&mut self` makes that assumption explicit.

pub mod error;
pub mod events;
pub mod members_view;
pub mod membership;
pub mod pins;
pub mod solicitations;
pub mod types;
pub mod user_metadata;

pub use error::StreamViewError;
pub use events::{EncryptionSink, StateSink, StreamEncryptionEvent, StreamStateEvent};
pub use members_view::StreamMembersView;
pub use membership::{ConfirmationStatus, MembershipState, MembershipTracker, PendingMembership};
pub use pins::{Pin, PinLedger};
pub use solicitations::SolicitationCoordinator;
pub use types::{
    user_id_from_address, ConfirmedEvent, DecryptedContent, EncryptedData, EventId, KeyFulfillment,
    KeySolicitation, MemberPayload, MemberSnapshot, MembersSnapshot, MembershipOp,
    MembershipPayload, NftPayload, PinPayload, PinSnapshot, RemoteEvent, StreamMember,
    StreamPayload, TimelineEvent, WrappedEncryptedData,
};
pub use user_metadata::UserMetadataStore;
