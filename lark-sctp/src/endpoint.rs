use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use log::{debug, trace, warn};
use slab::Slab;
use thiserror::Error;

use crate::association::Association;
use crate::chunk::chunk_type::CT_INIT;
use crate::config::{ClientConfig, EndpointConfig, ServerConfig};
use crate::packet::PartialDecode;
use crate::shared::{
    AssociationEvent, AssociationEventInner, AssociationId, EndpointEvent, EndpointEventInner,
};
use crate::{Payload, Transmit};
use ::shared::TransportContext;

/// The main entry point to the library
///
/// This object performs no I/O whatsoever. Instead, it demultiplexes incoming
/// datagrams onto [`Association`]s via `handle` and routes association
/// housekeeping events via `handle_event`.
pub struct Endpoint {
    endpoint_config: Arc<EndpointConfig>,
    server_config: Option<Arc<ServerConfig>>,
    /// Identifies associations based on the INIT initiate tag the peer chose
    association_ids_init: HashMap<AssociationId, AssociationHandle>,
    /// Identifies associations based on locally created verification tags
    association_ids: HashMap<AssociationId, AssociationHandle>,
    associations: Slab<AssociationMeta>,
    /// Whether incoming associations should be unconditionally rejected
    reject_new_associations: bool,
}

impl Endpoint {
    pub fn new(
        endpoint_config: Arc<EndpointConfig>,
        server_config: Option<Arc<ServerConfig>>,
    ) -> Self {
        Endpoint {
            endpoint_config,
            server_config,
            association_ids_init: HashMap::default(),
            association_ids: HashMap::default(),
            associations: Slab::new(),
            reject_new_associations: false,
        }
    }

    /// Replaces the server configuration, affecting new incoming associations only.
    pub fn set_server_config(&mut self, server_config: Option<Arc<ServerConfig>>) {
        self.server_config = server_config;
    }

    /// Unconditionally rejects future incoming associations.
    pub fn reject_new_associations(&mut self) {
        self.reject_new_associations = true;
    }

    /// Processes `EndpointEvent`s emitted from related `Association`s.
    pub fn handle_event(&mut self, ch: AssociationHandle, event: EndpointEvent) {
        match event.0 {
            EndpointEventInner::Drained => {
                if self.associations.contains(ch.0) {
                    let meta = self.associations.remove(ch.0);
                    self.association_ids_init.remove(&meta.init_aid);
                    self.association_ids.remove(&meta.local_aid);
                }
            }
        }
    }

    /// Processes an incoming datagram.
    pub fn handle(
        &mut self,
        now: Instant,
        transport: TransportContext,
        data: &Bytes,
    ) -> Option<(AssociationHandle, DatagramEvent)> {
        let partial_decode = match PartialDecode::unmarshal(data) {
            Ok(x) => x,
            Err(err) => {
                trace!("malformed datagram: {}", err);
                return None;
            }
        };

        // route to an existing association when the tag is known
        let dst_tag = partial_decode.common_header.verification_tag;
        let known_ch = if dst_tag > 0 {
            self.association_ids.get(&dst_tag).cloned()
        } else if partial_decode.first_chunk_type == CT_INIT {
            // retransmitted INIT, route by the peer's initiate tag
            partial_decode
                .initiate_tag
                .and_then(|tag| self.association_ids_init.get(&tag).cloned())
        } else {
            None
        };

        if let Some(ch) = known_ch {
            return Some((
                ch,
                DatagramEvent::AssociationEvent(AssociationEvent(
                    AssociationEventInner::Datagram(Transmit {
                        now,
                        transport,
                        message: Payload::PartialDecode(partial_decode),
                    }),
                )),
            ));
        }

        // potentially create a new association
        self.handle_first_packet(now, transport, partial_decode)
            .map(|(ch, a)| (ch, DatagramEvent::NewAssociation(a)))
    }

    /// Initiates an association.
    pub fn connect(
        &mut self,
        config: ClientConfig,
        transport: TransportContext,
        now: Instant,
    ) -> Result<(AssociationHandle, Association), ConnectError> {
        if self.is_full() {
            return Err(ConnectError::TooManyAssociations);
        }

        let local_aid = self.new_aid();
        let association = Association::new(
            None,
            config.transport,
            self.endpoint_config.max_payload_size(),
            local_aid,
            transport,
            now,
        );

        let id = self.associations.insert(AssociationMeta {
            init_aid: 0,
            local_aid,
        });
        let ch = AssociationHandle(id);
        self.association_ids.insert(local_aid, ch);

        Ok((ch, association))
    }

    fn handle_first_packet(
        &mut self,
        now: Instant,
        transport: TransportContext,
        partial_decode: PartialDecode,
    ) -> Option<(AssociationHandle, Association)> {
        if partial_decode.first_chunk_type != CT_INIT || partial_decode.initiate_tag.is_none() {
            debug!("refusing first packet that is not a routable INIT");
            return None;
        }

        let server_config = match self.server_config.as_ref() {
            Some(config) => config.clone(),
            None => {
                warn!("refusing incoming association without server config");
                return None;
            }
        };

        if self.associations.len() >= server_config.concurrent_associations as usize
            || self.reject_new_associations
            || self.is_full()
        {
            debug!("refusing association");
            return None;
        }

        let init_aid = partial_decode.initiate_tag.unwrap();
        let local_aid = self.new_aid();

        let transport_config = server_config.transport.clone();
        let mut association = Association::new(
            Some(server_config),
            transport_config,
            self.endpoint_config.max_payload_size(),
            local_aid,
            transport,
            now,
        );

        let id = self.associations.insert(AssociationMeta {
            init_aid,
            local_aid,
        });
        let ch = AssociationHandle(id);
        self.association_ids.insert(local_aid, ch);
        self.association_ids_init.insert(init_aid, ch);

        association.handle_event(AssociationEvent(AssociationEventInner::Datagram(
            Transmit {
                now,
                transport,
                message: Payload::PartialDecode(partial_decode),
            },
        )));

        Some((ch, association))
    }

    fn new_aid(&mut self) -> AssociationId {
        loop {
            let aid = rand::random::<AssociationId>();
            if aid != 0 && !self.association_ids.contains_key(&aid) {
                break aid;
            }
        }
    }

    /// Whether we've used up 3/4 of the available association-id space.
    fn is_full(&self) -> bool {
        (((u32::MAX >> 1) + (u32::MAX >> 2)) as usize) < self.association_ids.len()
    }
}

#[derive(Debug)]
pub(crate) struct AssociationMeta {
    /// The initiate tag from the peer's INIT, zero for outgoing associations.
    init_aid: AssociationId,
    local_aid: AssociationId,
}

/// Internal identifier for an `Association` currently associated with an endpoint
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct AssociationHandle(pub usize);

impl From<AssociationHandle> for usize {
    fn from(x: AssociationHandle) -> usize {
        x.0
    }
}

/// Event resulting from processing a single datagram
#[allow(clippy::large_enum_variant)]
pub enum DatagramEvent {
    /// The datagram is redirected to its `Association`
    AssociationEvent(AssociationEvent),
    /// The datagram has resulted in starting a new `Association`
    NewAssociation(Association),
}

/// Errors in the parameters being used to create a new association
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The number of active associations on the local endpoint is at the limit
    #[error("too many associations")]
    TooManyAssociations,
}

#[cfg(test)]
mod endpoint_test {
    use super::*;
    use crate::association::Event;
    use crate::Side;

    #[test]
    fn test_connect_then_accept() {
        let now = Instant::now();
        let mut client_endpoint = Endpoint::new(Arc::new(EndpointConfig::default()), None);
        let mut server_endpoint = Endpoint::new(
            Arc::new(EndpointConfig::default()),
            Some(Arc::new(ServerConfig::default())),
        );

        let (_client_ch, mut client) = client_endpoint
            .connect(ClientConfig::default(), TransportContext::default(), now)
            .unwrap();
        assert_eq!(client.side(), Side::Client);

        // the INIT datagram creates the server-side association
        let transmit = client.poll_transmit(now).expect("INIT must be pending");
        let Payload::RawEncode(datagrams) = transmit.message else {
            panic!("unexpected payload");
        };
        let (server_ch, event) = server_endpoint
            .handle(now, TransportContext::default(), &datagrams[0])
            .expect("INIT must be routable");
        let mut server = match event {
            DatagramEvent::NewAssociation(a) => a,
            DatagramEvent::AssociationEvent(_) => panic!("expected new association"),
        };
        assert_eq!(server.side(), Side::Server);

        // finish the handshake by shuttling datagrams through the endpoints
        for _ in 0..8 {
            while let Some(t) = server.poll_transmit(now) {
                if let Payload::RawEncode(ds) = t.message {
                    for d in ds {
                        if let Some((ch, DatagramEvent::AssociationEvent(ev))) =
                            client_endpoint.handle(now, TransportContext::default(), &d)
                        {
                            assert_eq!(ch.0, 0);
                            client.handle_event(ev);
                        }
                    }
                }
            }
            while let Some(t) = client.poll_transmit(now) {
                if let Payload::RawEncode(ds) = t.message {
                    for d in ds {
                        if let Some((ch, DatagramEvent::AssociationEvent(ev))) =
                            server_endpoint.handle(now, TransportContext::default(), &d)
                        {
                            assert_eq!(ch, server_ch);
                            server.handle_event(ev);
                        }
                    }
                }
            }
        }

        assert!(client.is_established());
        assert!(server.is_established());

        let mut connected = false;
        while let Some(e) = client.poll() {
            if e == Event::Connected {
                connected = true;
            }
        }
        assert!(connected);
    }

    #[test]
    fn test_refuses_without_server_config() {
        let now = Instant::now();
        let mut client_endpoint = Endpoint::new(Arc::new(EndpointConfig::default()), None);
        let mut lonely = Endpoint::new(Arc::new(EndpointConfig::default()), None);

        let (_, mut client) = client_endpoint
            .connect(ClientConfig::default(), TransportContext::default(), now)
            .unwrap();
        let transmit = client.poll_transmit(now).unwrap();
        let Payload::RawEncode(datagrams) = transmit.message else {
            panic!("unexpected payload");
        };

        assert!(lonely
            .handle(now, TransportContext::default(), &datagrams[0])
            .is_none());
    }
}
