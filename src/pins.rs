//! Ordered ledger of pinned messages.
//!
//! Iteration order matches pin-creation order; removal is by the identity of
//! the referenced event, never by position. Indices carried on notifications
//! are the position the pin held when the notification fired.

use log::debug;

use crate::events::{emit, EncryptionSink, StateSink, StreamEncryptionEvent, StreamStateEvent};
use crate::types::{DecryptedContent, EventId, StreamPayload, TimelineEvent};

/// A pinned message with creator attribution. The ledger owns the referenced
/// event, including its decrypted content once available.
#[derive(Debug, Clone, PartialEq)]
pub struct Pin {
    pub creator_user_id: String,
    pub event: TimelineEvent,
}

#[derive(Debug)]
pub struct PinLedger {
    stream_id: String,
    pins: Vec<Pin>,
}

impl PinLedger {
    pub fn new(stream_id: String) -> Self {
        PinLedger {
            stream_id,
            pins: Vec::new(),
        }
    }

    /// Appends a pin. Decryptable message content is either resolved from the
    /// supplied cleartext or handed to the encryption channel for later
    /// resolution; either way the pin is tracked immediately.
    pub fn add_pin(
        &mut self,
        creator_user_id: String,
        mut event: TimelineEvent,
        cleartext: Option<&str>,
        encryption_sink: Option<&EncryptionSink>,
        state_sink: Option<&StateSink>,
    ) {
        if let StreamPayload::ChannelMessage(content) = &event.payload {
            match cleartext {
                Some(text) => {
                    event.decrypted_content =
                        Some(DecryptedContent::ChannelMessage(text.to_string()));
                }
                None => emit(
                    encryption_sink,
                    StreamEncryptionEvent::NewEncryptedContent {
                        stream_id: self.stream_id.clone(),
                        event_id: event.event_id,
                        content: content.clone(),
                    },
                ),
            }
        }
        let pin = Pin {
            creator_user_id,
            event,
        };
        self.pins.push(pin.clone());
        emit(
            state_sink,
            StreamStateEvent::PinAdded {
                stream_id: self.stream_id.clone(),
                pin,
            },
        );
    }

    /// Removes the pin referencing `event_id`, shifting later pins down.
    /// Unpinning something that is not pinned is a legitimate race, not an
    /// error.
    pub fn remove_pin(&mut self, event_id: &EventId, state_sink: Option<&StateSink>) {
        let Some(index) = self.position(event_id) else {
            debug!(
                "[remove_pin] no pin for event {event_id} in {}",
                self.stream_id
            );
            return;
        };
        let pin = self.pins.remove(index);
        emit(
            state_sink,
            StreamStateEvent::PinRemoved {
                stream_id: self.stream_id.clone(),
                pin,
                index,
            },
        );
    }

    /// Attaches decrypted content to the tracked pin for `event_id`, if any.
    pub fn on_decrypted_content(
        &mut self,
        event_id: &EventId,
        content: &DecryptedContent,
        state_sink: Option<&StateSink>,
    ) {
        let Some(index) = self.position(event_id) else {
            return;
        };
        self.pins[index].event.decrypted_content = Some(content.clone());
        emit(
            state_sink,
            StreamStateEvent::PinDecrypted {
                stream_id: self.stream_id.clone(),
                pin: self.pins[index].clone(),
                index,
            },
        );
    }

    fn position(&self, event_id: &EventId) -> Option<usize> {
        self.pins
            .iter()
            .position(|pin| pin.event.event_id == *event_id)
    }

    /// Pins in creation order.
    pub fn pins(&self) -> &[Pin] {
        &self.pins
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Address;
    use tokio::sync::mpsc;

    use crate::types::EncryptedData;

    use super::*;

    fn message_event(id: u8) -> TimelineEvent {
        TimelineEvent {
            event_id: EventId::repeat_byte(id),
            creator_address: Address::repeat_byte(0x22),
            event_num: 0,
            payload: StreamPayload::ChannelMessage(EncryptedData {
                ciphertext: vec![id],
                session_id: "s1".to_string(),
                algorithm: "grp-v1".to_string(),
            }),
            decrypted_content: None,
        }
    }

    fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn test_pins_iterate_in_creation_order() {
        let mut ledger = PinLedger::new("stream".to_string());
        for id in 1..=4 {
            ledger.add_pin("alice".to_string(), message_event(id), None, None, None);
        }

        let ids: Vec<_> = ledger.pins().iter().map(|p| p.event.event_id).collect();
        assert_eq!(
            ids,
            (1..=4).map(EventId::repeat_byte).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_removal_shifts_later_pins_and_reports_index() {
        let mut ledger = PinLedger::new("stream".to_string());
        for id in 1..=3 {
            ledger.add_pin("alice".to_string(), message_event(id), None, None, None);
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        ledger.remove_pin(&EventId::repeat_byte(2), Some(&tx));

        let events = drain(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [StreamStateEvent::PinRemoved { index: 1, pin, .. }]
                if pin.event.event_id == EventId::repeat_byte(2)
        ));
        let ids: Vec<_> = ledger.pins().iter().map(|p| p.event.event_id).collect();
        assert_eq!(ids, vec![EventId::repeat_byte(1), EventId::repeat_byte(3)]);
    }

    #[test]
    fn test_removing_unknown_pin_is_a_noop() {
        let mut ledger = PinLedger::new("stream".to_string());
        ledger.add_pin("alice".to_string(), message_event(1), None, None, None);

        let (tx, mut rx) = mpsc::unbounded_channel();
        ledger.remove_pin(&EventId::repeat_byte(9), Some(&tx));

        assert_eq!(ledger.len(), 1);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_add_pin_requests_decryption_for_ciphertext() {
        let mut ledger = PinLedger::new("stream".to_string());
        let (enc_tx, mut enc_rx) = mpsc::unbounded_channel();

        ledger.add_pin(
            "alice".to_string(),
            message_event(1),
            None,
            Some(&enc_tx),
            None,
        );

        assert!(matches!(
            drain(&mut enc_rx).as_slice(),
            [StreamEncryptionEvent::NewEncryptedContent { event_id, .. }]
                if *event_id == EventId::repeat_byte(1)
        ));
    }

    #[test]
    fn test_add_pin_with_cleartext_attaches_content() {
        let mut ledger = PinLedger::new("stream".to_string());
        let (enc_tx, mut enc_rx) = mpsc::unbounded_channel();

        ledger.add_pin(
            "alice".to_string(),
            message_event(1),
            Some("hello"),
            Some(&enc_tx),
            None,
        );

        assert!(drain(&mut enc_rx).is_empty());
        assert_eq!(
            ledger.pins()[0].event.decrypted_content,
            Some(DecryptedContent::ChannelMessage("hello".to_string()))
        );
    }

    #[test]
    fn test_decryption_callback_attaches_in_place() {
        let mut ledger = PinLedger::new("stream".to_string());
        for id in 1..=2 {
            ledger.add_pin("alice".to_string(), message_event(id), None, None, None);
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let content = DecryptedContent::ChannelMessage("resolved".to_string());
        ledger.on_decrypted_content(&EventId::repeat_byte(2), &content, Some(&tx));

        assert_eq!(ledger.pins()[1].event.decrypted_content, Some(content));
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [StreamStateEvent::PinDecrypted { index: 1, .. }]
        ));
    }
}
