use crate::{Payload, Transmit};
use std::fmt::{Debug, Formatter};

/// Events sent from an Endpoint to an Association
pub struct AssociationEvent(pub(crate) AssociationEventInner);

pub(crate) enum AssociationEventInner {
    /// A datagram has been received for the Association
    Datagram(Transmit),
}

impl Debug for AssociationEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            AssociationEventInner::Datagram(t) => match &t.message {
                Payload::PartialDecode(p) => f
                    .debug_struct("AssociationEvent::Datagram")
                    .field("first_chunk_type", &p.first_chunk_type)
                    .finish(),
                Payload::RawEncode(_) => f.write_str("AssociationEvent::Datagram(raw)"),
            },
        }
    }
}

/// Events sent from an Association to an Endpoint
#[derive(Debug)]
pub struct EndpointEvent(pub(crate) EndpointEventInner);

impl EndpointEvent {
    /// Construct an event indicating that an `Association` will no longer
    /// emit events.
    pub fn drained() -> Self {
        Self(EndpointEventInner::Drained)
    }

    /// Determine whether this is the last event an `Association` will emit.
    pub fn is_drained(&self) -> bool {
        self.0 == EndpointEventInner::Drained
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum EndpointEventInner {
    /// The association has been drained
    Drained,
}

/// Protocol-level identifier for an Association.
///
/// Mainly useful for identifying this Association's packets on the wire with
/// tools like Wireshark.
pub type AssociationId = u32;
