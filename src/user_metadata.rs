//! Per-member profile metadata: encrypted username and display name, plain
//! ENS address and NFT avatar reference.
//!
//! Username and display name arrive as ciphertext and resolve asynchronously.
//! The store keeps the latest envelope per user plus a reverse index from the
//! originating event id, so a decryption callback can find its target no
//! matter when it lands. A callback for an envelope that was superseded in
//! the meantime finds no index entry and is dropped.

use std::collections::HashMap;

use log::debug;

use crate::events::{emit, EncryptionSink, StateSink, StreamEncryptionEvent, StreamStateEvent};
use crate::types::{
    ConfirmedEvent, EncryptedData, EventId, MemberPayload, NftPayload, StreamPayload,
    WrappedEncryptedData,
};

// The ciphertext itself stays on the member table entry; the store only
// needs the event identity and confirmation status of the latest envelope.
#[derive(Debug, Clone)]
struct MetadataRecord {
    event_id: EventId,
    pending: bool,
}

/// One encrypted text attribute (username or display name) across all users.
#[derive(Debug, Default)]
struct EncryptedTextField {
    /// Latest envelope per user.
    records: HashMap<String, MetadataRecord>,
    /// Originating event id of each live record.
    event_index: HashMap<EventId, String>,
    /// Decrypted values, once available.
    plaintext: HashMap<String, String>,
}

impl EncryptedTextField {
    /// Stores a new envelope for the user. A previous envelope is superseded:
    /// its index entry is dropped so stale decryption callbacks miss.
    fn store(&mut self, user_id: &str, event_id: EventId, pending: bool) {
        let record = MetadataRecord { event_id, pending };
        if let Some(prev) = self.records.insert(user_id.to_string(), record) {
            self.event_index.remove(&prev.event_id);
        }
        self.event_index.insert(event_id, user_id.to_string());
    }

    /// Attaches decrypted text to the record the event produced. Returns the
    /// affected user, or `None` if the event no longer backs a live record.
    fn resolve(&mut self, event_id: &EventId, text: &str) -> Option<String> {
        let user_id = self.event_index.get(event_id)?.clone();
        self.plaintext.insert(user_id.clone(), text.to_string());
        Some(user_id)
    }

    /// Marks the record the event produced as confirmed. Returns the affected
    /// user and whether a decrypted value exists; `None` for stale event ids
    /// or records that were already confirmed.
    fn confirm(&mut self, event_id: &EventId) -> Option<(String, bool)> {
        let user_id = self.event_index.get(event_id)?.clone();
        let record = self.records.get_mut(&user_id)?;
        if !record.pending {
            return None;
        }
        record.pending = false;
        let decrypted = self.plaintext.contains_key(&user_id);
        Some((user_id, decrypted))
    }

    fn get(&self, user_id: &str) -> Option<&str> {
        self.plaintext.get(user_id).map(String::as_str)
    }
}

/// Holds profile metadata for every member of one stream.
#[derive(Debug)]
pub struct UserMetadataStore {
    stream_id: String,
    usernames: EncryptedTextField,
    display_names: EncryptedTextField,
    ens_addresses: HashMap<String, Vec<u8>>,
    nfts: HashMap<String, NftPayload>,
}

impl UserMetadataStore {
    pub fn new(stream_id: String) -> Self {
        UserMetadataStore {
            stream_id,
            usernames: EncryptedTextField::default(),
            display_names: EncryptedTextField::default(),
            ens_addresses: HashMap::new(),
            nfts: HashMap::new(),
        }
    }

    /// Bulk-loads all four metadata categories from a snapshot. Envelopes
    /// with an out-of-band cleartext decrypt immediately; the rest are handed
    /// to the encryption channel for resolution.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_snapshot(
        &mut self,
        usernames: Vec<(String, WrappedEncryptedData)>,
        display_names: Vec<(String, WrappedEncryptedData)>,
        ens_addresses: Vec<(String, Vec<u8>)>,
        nfts: Vec<(String, NftPayload)>,
        cleartexts: Option<&HashMap<EventId, String>>,
        encryption_sink: Option<&EncryptionSink>,
    ) {
        for (field, entries) in [
            (&mut self.usernames, usernames),
            (&mut self.display_names, display_names),
        ] {
            for (user_id, wrapped) in entries {
                field.store(&user_id, wrapped.event_id, false);
                match cleartexts.and_then(|map| map.get(&wrapped.event_id)) {
                    Some(text) => {
                        field.plaintext.insert(user_id, text.clone());
                    }
                    None => emit(
                        encryption_sink,
                        StreamEncryptionEvent::NewEncryptedContent {
                            stream_id: self.stream_id.clone(),
                            event_id: wrapped.event_id,
                            content: wrapped.data,
                        },
                    ),
                }
            }
        }
        self.ens_addresses.extend(ens_addresses);
        self.nfts.extend(nfts);
    }

    pub fn append_username(
        &mut self,
        event_id: EventId,
        data: EncryptedData,
        user_id: &str,
        cleartext: Option<&str>,
        encryption_sink: Option<&EncryptionSink>,
        state_sink: Option<&StateSink>,
    ) {
        Self::append_text(
            &mut self.usernames,
            &self.stream_id,
            event_id,
            data,
            user_id,
            cleartext,
            encryption_sink,
            state_sink,
            TextKind::Username,
        );
    }

    pub fn append_display_name(
        &mut self,
        event_id: EventId,
        data: EncryptedData,
        user_id: &str,
        cleartext: Option<&str>,
        encryption_sink: Option<&EncryptionSink>,
        state_sink: Option<&StateSink>,
    ) {
        Self::append_text(
            &mut self.display_names,
            &self.stream_id,
            event_id,
            data,
            user_id,
            cleartext,
            encryption_sink,
            state_sink,
            TextKind::DisplayName,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn append_text(
        field: &mut EncryptedTextField,
        stream_id: &str,
        event_id: EventId,
        data: EncryptedData,
        user_id: &str,
        cleartext: Option<&str>,
        encryption_sink: Option<&EncryptionSink>,
        state_sink: Option<&StateSink>,
        kind: TextKind,
    ) {
        field.store(user_id, event_id, true);
        emit(state_sink, kind.pending_updated(stream_id, user_id));
        match cleartext {
            Some(text) => {
                field.plaintext.insert(user_id.to_string(), text.to_string());
                emit(state_sink, kind.updated(stream_id, user_id));
            }
            None => emit(
                encryption_sink,
                StreamEncryptionEvent::NewEncryptedContent {
                    stream_id: stream_id.to_string(),
                    event_id,
                    content: data,
                },
            ),
        }
    }

    /// Stores or clears the member's ENS address. A zero-length payload
    /// clears the stored value.
    pub fn append_ens_address(
        &mut self,
        user_id: &str,
        address: Vec<u8>,
        state_sink: Option<&StateSink>,
    ) {
        if address.is_empty() {
            self.ens_addresses.remove(user_id);
        } else {
            self.ens_addresses.insert(user_id.to_string(), address);
        }
        emit(
            state_sink,
            StreamStateEvent::EnsAddressUpdated {
                stream_id: self.stream_id.clone(),
                user_id: user_id.to_string(),
            },
        );
    }

    /// Stores or clears the member's NFT avatar reference. A payload with an
    /// empty contract address clears the stored value.
    pub fn append_nft(
        &mut self,
        user_id: &str,
        nft: NftPayload,
        state_sink: Option<&StateSink>,
    ) {
        if nft.contract_address.is_empty() {
            self.nfts.remove(user_id);
        } else {
            self.nfts.insert(user_id.to_string(), nft);
        }
        emit(
            state_sink,
            StreamStateEvent::NftUpdated {
                stream_id: self.stream_id.clone(),
                user_id: user_id.to_string(),
            },
        );
    }

    /// Routes a decryption callback to the field the event belongs to. Stale
    /// event ids (superseded envelopes) are dropped.
    pub fn on_decrypted_content(
        &mut self,
        event_id: &EventId,
        text: &str,
        state_sink: Option<&StateSink>,
    ) {
        if let Some(user_id) = self.usernames.resolve(event_id, text) {
            emit(
                state_sink,
                StreamStateEvent::UsernameUpdated {
                    stream_id: self.stream_id.clone(),
                    user_id,
                },
            );
        } else if let Some(user_id) = self.display_names.resolve(event_id, text) {
            emit(
                state_sink,
                StreamStateEvent::DisplayNameUpdated {
                    stream_id: self.stream_id.clone(),
                    user_id,
                },
            );
        } else {
            debug!(
                "[on_decrypted_content] no live metadata record for event {event_id} in {}",
                self.stream_id
            );
        }
    }

    /// Confirmation bookkeeping for metadata events. Once the confirmed value
    /// lands, the stale pending indicator is superseded and the decrypted
    /// value (if present) is re-announced as final.
    pub fn on_confirmed_event(&mut self, event: &ConfirmedEvent, state_sink: Option<&StateSink>) {
        let StreamPayload::Member(payload) = &event.payload else {
            return;
        };
        match payload {
            MemberPayload::Username(_) => {
                if let Some((user_id, decrypted)) = self.usernames.confirm(&event.event_id) {
                    if decrypted {
                        emit(
                            state_sink,
                            StreamStateEvent::UsernameUpdated {
                                stream_id: self.stream_id.clone(),
                                user_id,
                            },
                        );
                    }
                }
            }
            MemberPayload::DisplayName(_) => {
                if let Some((user_id, decrypted)) = self.display_names.confirm(&event.event_id) {
                    if decrypted {
                        emit(
                            state_sink,
                            StreamStateEvent::DisplayNameUpdated {
                                stream_id: self.stream_id.clone(),
                                user_id,
                            },
                        );
                    }
                }
            }
            // ENS and NFT values are stored in the clear; their effect is
            // final at append time.
            MemberPayload::EnsAddress(_) | MemberPayload::Nft(_) => {}
            MemberPayload::Membership(_)
            | MemberPayload::KeySolicitation(_)
            | MemberPayload::KeyFulfillment(_)
            | MemberPayload::Pin(_)
            | MemberPayload::Unpin { .. } => debug!(
                "[on_confirmed_event] non-metadata payload routed to metadata store in {}",
                self.stream_id
            ),
        }
    }

    pub fn username(&self, user_id: &str) -> Option<&str> {
        self.usernames.get(user_id)
    }

    pub fn display_name(&self, user_id: &str) -> Option<&str> {
        self.display_names.get(user_id)
    }

    pub fn ens_address(&self, user_id: &str) -> Option<&[u8]> {
        self.ens_addresses.get(user_id).map(Vec::as_slice)
    }

    pub fn nft(&self, user_id: &str) -> Option<&NftPayload> {
        self.nfts.get(user_id)
    }
}

#[derive(Debug, Clone, Copy)]
enum TextKind {
    Username,
    DisplayName,
}

impl TextKind {
    fn pending_updated(self, stream_id: &str, user_id: &str) -> StreamStateEvent {
        match self {
            TextKind::Username => StreamStateEvent::PendingUsernameUpdated {
                stream_id: stream_id.to_string(),
                user_id: user_id.to_string(),
            },
            TextKind::DisplayName => StreamStateEvent::PendingDisplayNameUpdated {
                stream_id: stream_id.to_string(),
                user_id: user_id.to_string(),
            },
        }
    }

    fn updated(self, stream_id: &str, user_id: &str) -> StreamStateEvent {
        match self {
            TextKind::Username => StreamStateEvent::UsernameUpdated {
                stream_id: stream_id.to_string(),
                user_id: user_id.to_string(),
            },
            TextKind::DisplayName => StreamStateEvent::DisplayNameUpdated {
                stream_id: stream_id.to_string(),
                user_id: user_id.to_string(),
            },
        }
    }
}
