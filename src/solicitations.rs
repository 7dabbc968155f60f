//! Key solicitation and fulfillment bookkeeping.
//!
//! Each member carries the list of outstanding solicitations for their
//! devices, keyed by device key. The coordinator mutates that list in place
//! (the member table stays the single owner) and tells the encryption channel
//! whether a solicitation is new or replaces an outstanding one, so key
//! distribution can skip sessions it already shipped.

use log::debug;

use crate::events::{emit, EncryptionSink, StreamEncryptionEvent};
use crate::types::{KeyFulfillment, KeySolicitation, StreamMember};

#[derive(Debug)]
pub struct SolicitationCoordinator {
    stream_id: String,
}

impl SolicitationCoordinator {
    pub fn new(stream_id: String) -> Self {
        SolicitationCoordinator { stream_id }
    }

    /// Re-announces solicitations restored from a snapshot so the encryption
    /// subsystem can pick up where the previous session left off. Entries
    /// with nothing outstanding are skipped.
    pub fn init_solicitations<'a>(
        &self,
        members: impl IntoIterator<Item = &'a StreamMember>,
        encryption_sink: Option<&EncryptionSink>,
    ) {
        for member in members {
            for solicitation in &member.solicitations {
                if solicitation.session_ids.is_empty() && !solicitation.is_new_device {
                    continue;
                }
                emit(
                    encryption_sink,
                    StreamEncryptionEvent::NewKeySolicitation {
                        stream_id: self.stream_id.clone(),
                        from_user_id: member.user_id.clone(),
                        from_user_address: member.user_address,
                        solicitation: solicitation.clone(),
                    },
                );
            }
        }
    }

    /// Upserts a solicitation for the device it names.
    pub fn apply_solicitation(
        &self,
        member: &mut StreamMember,
        solicitation: KeySolicitation,
        encryption_sink: Option<&EncryptionSink>,
    ) {
        let existing = member
            .solicitations
            .iter_mut()
            .find(|s| s.device_key == solicitation.device_key);

        let event = match existing {
            Some(slot) => {
                *slot = solicitation.clone();
                StreamEncryptionEvent::UpdatedKeySolicitation {
                    stream_id: self.stream_id.clone(),
                    from_user_id: member.user_id.clone(),
                    from_user_address: member.user_address,
                    solicitation,
                }
            }
            None => {
                member.solicitations.push(solicitation.clone());
                StreamEncryptionEvent::NewKeySolicitation {
                    stream_id: self.stream_id.clone(),
                    from_user_id: member.user_id.clone(),
                    from_user_address: member.user_address,
                    solicitation,
                }
            }
        };
        emit(encryption_sink, event);
    }

    /// Subtracts fulfilled session ids from the device's outstanding
    /// solicitation. Partial fulfillment leaves the remainder outstanding; a
    /// fully served solicitation is removed. A fulfillment for a device with
    /// no outstanding solicitation is a legitimate race and a no-op.
    pub fn apply_fulfillment(&self, member: &mut StreamMember, fulfillment: &KeyFulfillment) {
        let Some(index) = member
            .solicitations
            .iter()
            .position(|s| s.device_key == fulfillment.device_key)
        else {
            debug!(
                "[apply_fulfillment] no outstanding solicitation for device {} of {} in {}",
                fulfillment.device_key, member.user_id, self.stream_id
            );
            return;
        };

        let solicitation = &mut member.solicitations[index];
        solicitation
            .session_ids
            .retain(|id| !fulfillment.session_ids.contains(id));
        // Any fulfillment also answers the new-device announcement.
        solicitation.is_new_device = false;
        if solicitation.session_ids.is_empty() {
            member.solicitations.remove(index);
        }
    }
}
