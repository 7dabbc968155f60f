//! Outbound notification channels.
//!
//! The view fans out to two independent channels: encryption events (anything
//! the key-distribution machinery must react to) and state events (anything a
//! rendering layer must react to). A subscriber may consume either channel
//! alone; ordering is guaranteed within a channel, never across the two.

use alloy::primitives::Address;
use tokio::sync::mpsc::UnboundedSender;

use crate::pins::Pin;
use crate::types::{EncryptedData, EventId, KeySolicitation};

/// Signals consumed by the key-distribution / decryption machinery.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEncryptionEvent {
    /// Ciphertext was observed that the encryption subsystem should resolve.
    NewEncryptedContent {
        stream_id: String,
        event_id: EventId,
        content: EncryptedData,
    },
    /// A device asked for session material it had not asked for before.
    NewKeySolicitation {
        stream_id: String,
        from_user_id: String,
        from_user_address: Address,
        solicitation: KeySolicitation,
    },
    /// A device replaced an outstanding solicitation. Downstream key
    /// distribution treats this differently from a new one to avoid
    /// re-encrypting sessions it already shipped.
    UpdatedKeySolicitation {
        stream_id: String,
        from_user_id: String,
        from_user_address: Address,
        solicitation: KeySolicitation,
    },
}

/// Signals consumed by state subscribers (timelines, member lists, UI).
#[derive(Debug, Clone, PartialEq)]
pub enum StreamStateEvent {
    NewUserJoined { stream_id: String, user_id: String },
    NewUserInvited { stream_id: String, user_id: String },
    UserLeft { stream_id: String, user_id: String },
    /// A confirmed membership transition of any kind.
    MembershipUpdated { stream_id: String, user_id: String },
    /// A provisional membership transition, not yet finalized.
    PendingMembershipUpdated { stream_id: String, user_id: String },
    UsernameUpdated { stream_id: String, user_id: String },
    PendingUsernameUpdated { stream_id: String, user_id: String },
    DisplayNameUpdated { stream_id: String, user_id: String },
    PendingDisplayNameUpdated { stream_id: String, user_id: String },
    EnsAddressUpdated { stream_id: String, user_id: String },
    NftUpdated { stream_id: String, user_id: String },
    PinAdded {
        stream_id: String,
        pin: Pin,
    },
    PinRemoved {
        stream_id: String,
        pin: Pin,
        index: usize,
    },
    PinDecrypted {
        stream_id: String,
        pin: Pin,
        index: usize,
    },
}

/// Sender half of the encryption channel.
pub type EncryptionSink = UnboundedSender<StreamEncryptionEvent>;

/// Sender half of the state channel.
pub type StateSink = UnboundedSender<StreamStateEvent>;

/// Sends on an optional sink. A missing sink or a dropped receiver means
/// nobody is listening, which is not an error for the engine.
pub(crate) fn emit<T>(sink: Option<&UnboundedSender<T>>, event: T) {
    if let Some(tx) = sink {
        let _ = tx.send(event);
    }
}
