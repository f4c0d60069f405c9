pub(crate) mod stream;
pub(crate) mod timer;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use log::{debug, trace, warn};

use crate::chunk::chunk_abort::{ChunkAbort, ErrorCause, USER_INITIATED_ABORT};
use crate::chunk::chunk_cookie::{ChunkCookieAck, ChunkCookieEcho};
use crate::chunk::chunk_forward_tsn::{ChunkForwardTsn, ChunkForwardTsnStream};
use crate::chunk::chunk_heartbeat::ChunkHeartbeat;
use crate::chunk::chunk_init::ChunkInit;
use crate::chunk::chunk_payload_data::{ChunkPayloadData, PayloadProtocolIdentifier};
use crate::chunk::chunk_reconfig::ChunkReconfig;
use crate::chunk::chunk_selective_ack::ChunkSelectiveAck;
use crate::chunk::chunk_shutdown::{ChunkShutdown, ChunkShutdownAck, ChunkShutdownComplete};
use crate::chunk::Chunk;
use crate::config::{ServerConfig, TransportConfig};
use crate::packet::{CommonHeader, Packet};
use crate::param::{Param, RECONFIG_RESULT_SUCCESS_PERFORMED};
use crate::queue::payload_queue::PayloadQueue;
use crate::queue::pending_queue::PendingQueue;
use crate::shared::{AssociationEvent, AssociationEventInner, EndpointEvent, EndpointEventInner};
use crate::util::{sna32gt, sna32gte, sna32lt, sna32lte};
use crate::{Payload, Side, Transmit};
use ::shared::error::{Error, Result};
use ::shared::TransportContext;

use stream::{ReliabilityType, Stream, StreamEvent, StreamId, StreamState};
use timer::{RtoManager, Timer, TimerConfig, TimerTable};

/// SCTP port both sides of a WebRTC association use.
const DEFAULT_SCTP_PORT: u16 = 5000;
/// Common header plus DATA chunk header.
const DATA_CHUNK_OVERHEAD: u32 = 12 + 16;
const INITIAL_MTU: u32 = 1200;
const MIN_CWND_MTUS: u32 = 4;

/// The lifecycle of an association, RFC 4960 §4.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum AssociationState {
    #[default]
    Closed,
    CookieWait,
    CookieEchoed,
    Established,
    ShutdownPending,
    ShutdownSent,
    ShutdownReceived,
    ShutdownAckSent,
}

/// Things that happened on an association since the last poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The handshake completed and streams may be used
    Connected,
    /// The association terminated abnormally
    AssociationLost { reason: String },
    /// The association closed gracefully
    Closed,
    /// Something happened on one of the streams
    Stream(StreamEvent),
}

/// An SCTP association. Performs no I/O; drive it with `handle_event`,
/// `handle_timeout` and the `poll_*` methods.
pub struct Association {
    side: Side,
    state: AssociationState,
    transport: TransportContext,
    config: Arc<TransportConfig>,
    max_payload_size: u32,

    source_port: u16,
    destination_port: u16,
    my_verification_tag: u32,
    peer_verification_tag: u32,

    my_next_tsn: u32,
    cumulative_tsn_ack_point: u32,
    advanced_peer_tsn_ack_point: u32,
    peer_last_tsn: u32,

    rwnd: u32,
    cwnd: u32,
    ssthresh: u32,
    partial_bytes_acked: u32,
    in_fast_recovery: bool,
    fast_recover_exit_point: u32,

    streams: HashMap<StreamId, StreamState>,
    pending_queue: PendingQueue,
    inflight_queue: PayloadQueue,
    payload_queue: PayloadQueue,

    timers: TimerTable,
    rto_mgr: RtoManager,

    control_queue: VecDeque<Vec<Chunk>>,
    ack_pending: bool,
    duplicate_tsns: Vec<u32>,

    events: VecDeque<Event>,
    endpoint_events: VecDeque<EndpointEvent>,

    stored_init: Option<ChunkInit>,
    stored_cookie_echo: Option<ChunkCookieEcho>,
    my_cookie: Bytes,

    use_forward_tsn: bool,
    will_send_forward_tsn: bool,

    my_next_rsn: u32,
    reconfig_requests: HashMap<u32, Param>,
}

impl Association {
    pub(crate) fn new(
        server_config: Option<Arc<ServerConfig>>,
        config: Arc<TransportConfig>,
        max_payload_size: u32,
        local_aid: u32,
        transport: TransportContext,
        now: Instant,
    ) -> Self {
        let side = if server_config.is_some() {
            Side::Server
        } else {
            Side::Client
        };
        let initial_tsn = rand::random::<u32>();
        let mtu = std::cmp::min(max_payload_size, INITIAL_MTU);

        let mut this = Association {
            side,
            state: AssociationState::Closed,
            transport,
            config,
            max_payload_size: mtu,
            source_port: DEFAULT_SCTP_PORT,
            destination_port: DEFAULT_SCTP_PORT,
            my_verification_tag: local_aid,
            peer_verification_tag: 0,
            my_next_tsn: initial_tsn,
            cumulative_tsn_ack_point: initial_tsn.wrapping_sub(1),
            advanced_peer_tsn_ack_point: initial_tsn.wrapping_sub(1),
            peer_last_tsn: 0,
            rwnd: 0,
            cwnd: std::cmp::min(4 * mtu, std::cmp::max(2 * mtu, 4380)),
            ssthresh: 0,
            partial_bytes_acked: 0,
            in_fast_recovery: false,
            fast_recover_exit_point: 0,
            streams: HashMap::new(),
            pending_queue: PendingQueue::new(),
            inflight_queue: PayloadQueue::new(),
            payload_queue: PayloadQueue::new(),
            timers: TimerTable::new(TimerConfig::default()),
            rto_mgr: RtoManager::new(),
            control_queue: VecDeque::new(),
            ack_pending: false,
            duplicate_tsns: vec![],
            events: VecDeque::new(),
            endpoint_events: VecDeque::new(),
            stored_init: None,
            stored_cookie_echo: None,
            my_cookie: Bytes::new(),
            use_forward_tsn: false,
            will_send_forward_tsn: false,
            my_next_rsn: initial_tsn,
            reconfig_requests: HashMap::new(),
        };

        if side.is_client() {
            this.start_handshake(now);
        }

        this
    }

    fn start_handshake(&mut self, now: Instant) {
        let init = ChunkInit {
            initiate_tag: self.my_verification_tag,
            advertised_receiver_window_credit: self.config.max_receive_buffer_size(),
            num_outbound_streams: self.config.max_num_outbound_streams(),
            num_inbound_streams: self.config.max_num_inbound_streams(),
            initial_tsn: self.my_next_tsn,
            params: vec![Param::ForwardTsnSupported],
        };
        self.stored_init = Some(init.clone());
        self.control_queue.push_back(vec![Chunk::Init(init)]);
        self.state = AssociationState::CookieWait;
        self.timers.start(Timer::T1Init, now, self.rto_mgr.get_rto());
        debug!("{} sending INIT", self.side);
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn state(&self) -> AssociationState {
        self.state
    }

    pub fn is_established(&self) -> bool {
        self.state == AssociationState::Established
    }

    /// Largest user message `write` accepts.
    pub fn max_message_size(&self) -> u32 {
        self.config.max_message_size()
    }

    /// Returns the next association-level event, if any.
    pub fn poll(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Returns events destined for the owning endpoint.
    pub fn poll_endpoint_event(&mut self) -> Option<EndpointEvent> {
        self.endpoint_events.pop_front()
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        self.timers.next_timeout()
    }

    /// Feeds an event from the endpoint, i.e. an inbound datagram.
    pub fn handle_event(&mut self, event: AssociationEvent) {
        match event.0 {
            AssociationEventInner::Datagram(transmit) => {
                if let Payload::PartialDecode(partial) = transmit.message {
                    let now = transmit.now;
                    match partial.finish() {
                        Ok(packet) => self.handle_packet(now, packet),
                        Err(err) => {
                            warn!("{} discarding undecodable packet: {}", self.side, err);
                        }
                    }
                }
            }
        }
    }

    /// Advances all timers to `now`.
    pub fn handle_timeout(&mut self, now: Instant) {
        for timer in Timer::VALUES {
            let (expired, failure) = self.timers.is_expired(timer, now);
            if !expired {
                continue;
            }

            if failure && timer != Timer::T3RTX {
                self.fail(format!("{timer:?} retransmission limit exceeded"));
                return;
            }

            match timer {
                Timer::T1Init => {
                    if let Some(init) = self.stored_init.clone() {
                        self.control_queue.push_back(vec![Chunk::Init(init)]);
                        self.timers.start(Timer::T1Init, now, self.rto_mgr.get_rto());
                    }
                }
                Timer::T1Cookie => {
                    if let Some(echo) = self.stored_cookie_echo.clone() {
                        self.control_queue.push_back(vec![Chunk::CookieEcho(echo)]);
                        self.timers
                            .start(Timer::T1Cookie, now, self.rto_mgr.get_rto());
                    }
                }
                Timer::T2Shutdown => {
                    self.send_shutdown_for_state(now);
                }
                Timer::T3RTX => {
                    self.on_retransmission_timeout(now, failure);
                }
                Timer::Reconfig => {
                    if !self.reconfig_requests.is_empty() {
                        let params: Vec<Param> =
                            self.reconfig_requests.values().cloned().collect();
                        for param in params {
                            self.control_queue.push_back(vec![Chunk::Reconfig(
                                ChunkReconfig {
                                    param_a: Some(param),
                                    param_b: None,
                                },
                            )]);
                        }
                        self.timers
                            .start(Timer::Reconfig, now, self.rto_mgr.get_rto());
                    }
                }
            }
        }
    }

    /// Returns the next datagram to put on the wire.
    pub fn poll_transmit(&mut self, now: Instant) -> Option<Transmit> {
        let raw = self.gather_datagram(now)?;
        Some(Transmit {
            now,
            transport: self.transport,
            message: Payload::RawEncode(vec![raw]),
        })
    }

    fn gather_datagram(&mut self, now: Instant) -> Option<Bytes> {
        if !self.reconfig_requests.is_empty() && !self.timers.is_running(Timer::Reconfig) {
            self.timers
                .start(Timer::Reconfig, now, self.rto_mgr.get_rto());
        }

        // control chunks first
        if let Some(chunks) = self.control_queue.pop_front() {
            return self.packetize(chunks);
        }

        if self.will_send_forward_tsn {
            self.will_send_forward_tsn = false;
            let fwd = self.create_forward_tsn();
            return self.packetize(vec![Chunk::ForwardTsn(fwd)]);
        }

        if self.ack_pending {
            self.ack_pending = false;
            let sack = self.create_sack();
            return self.packetize(vec![Chunk::Sack(sack)]);
        }

        // then data, retransmissions before fresh chunks
        let chunks = self.gather_data_chunks(now);
        if !chunks.is_empty() {
            return self.packetize(chunks);
        }

        None
    }

    fn packetize(&mut self, chunks: Vec<Chunk>) -> Option<Bytes> {
        let packet = Packet {
            common_header: CommonHeader {
                source_port: self.source_port,
                destination_port: self.destination_port,
                verification_tag: self.peer_verification_tag,
            },
            chunks,
        };
        match packet.marshal() {
            Ok(raw) => Some(raw),
            Err(err) => {
                warn!("{} failed to marshal packet: {}", self.side, err);
                None
            }
        }
    }

    fn gather_data_chunks(&mut self, now: Instant) -> Vec<Chunk> {
        if !matches!(
            self.state,
            AssociationState::Established
                | AssociationState::ShutdownPending
                | AssociationState::ShutdownReceived
        ) {
            return vec![];
        }

        self.abandon_expired(now);

        let mut bundle = vec![];
        let mut space = self.max_payload_size.saturating_sub(12) as usize;

        // retransmissions are not subject to cwnd admission here; they were
        // admitted when first sent
        let retransmit_tsns: Vec<u32> = self
            .inflight_queue
            .sorted_tsns()
            .into_iter()
            .filter(|&tsn| {
                self.inflight_queue
                    .get(tsn)
                    .map(|c| c.retransmit && !c.acked && !c.abandoned)
                    .unwrap_or(false)
            })
            .collect();

        for tsn in retransmit_tsns {
            let Some(chunk) = self.inflight_queue.get_mut(tsn) else {
                continue;
            };
            let chunk_len = chunk.chunk_length() + crate::param::padding_of(chunk.chunk_length());
            if chunk_len > space {
                break;
            }
            chunk.retransmit = false;
            chunk.nsent += 1;
            space -= chunk_len;
            bundle.push(Chunk::PayloadData(chunk.clone()));
        }

        // fresh data while congestion and receiver windows allow
        while let Some(peek) = self.pending_queue.peek() {
            let data_len = peek.user_data.len();
            if self.inflight_queue.n_bytes + data_len > self.cwnd as usize {
                break;
            }
            if (self.rwnd as usize) < data_len && !self.inflight_queue.is_empty() {
                // zero window probe: one chunk may be in flight
                break;
            }
            let chunk_len = peek.chunk_length() + crate::param::padding_of(peek.chunk_length());
            if chunk_len > space {
                break;
            }

            let mut chunk = match self.pending_queue.pop() {
                Some(c) => c,
                None => break,
            };
            chunk.since = Some(chunk.since.unwrap_or(now));
            chunk.nsent = 1;
            self.rwnd = self.rwnd.saturating_sub(data_len as u32);
            space -= chunk_len;
            bundle.push(Chunk::PayloadData(chunk.clone()));
            self.inflight_queue.push(chunk, self.cumulative_tsn_ack_point);
        }

        if !bundle.is_empty() && !self.timers.is_running(Timer::T3RTX) {
            self.timers.start(Timer::T3RTX, now, self.rto_mgr.get_rto());
        }

        bundle
    }

    fn handle_packet(&mut self, now: Instant, packet: Packet) {
        // verification tag check; INIT carries tag zero
        let is_init = packet
            .chunks
            .first()
            .map(|c| matches!(c, Chunk::Init(_)))
            .unwrap_or(false);
        if !is_init && packet.common_header.verification_tag != self.my_verification_tag {
            trace!(
                "{} dropping packet with bad verification tag {:x}",
                self.side,
                packet.common_header.verification_tag
            );
            return;
        }

        let mut saw_data = false;
        for chunk in packet.chunks {
            match chunk {
                Chunk::Init(init) => self.handle_init(now, init),
                Chunk::InitAck(init_ack) => self.handle_init_ack(now, init_ack),
                Chunk::CookieEcho(echo) => self.handle_cookie_echo(echo),
                Chunk::CookieAck(_) => self.handle_cookie_ack(),
                Chunk::PayloadData(data) => {
                    saw_data = true;
                    self.handle_data(data);
                }
                Chunk::Sack(sack) => self.handle_sack(now, sack),
                Chunk::Heartbeat(hb) => {
                    self.control_queue
                        .push_back(vec![Chunk::HeartbeatAck(ChunkHeartbeat {
                            heartbeat_info: hb.heartbeat_info,
                        })]);
                }
                Chunk::HeartbeatAck(_) => {}
                Chunk::Abort(abort) => {
                    self.state = AssociationState::Closed;
                    self.endpoint_events
                        .push_back(EndpointEvent(EndpointEventInner::Drained));
                    self.events.push_back(Event::AssociationLost {
                        reason: format!("abort: {}", abort.display_causes()),
                    });
                }
                Chunk::Shutdown(shutdown) => self.handle_shutdown(now, shutdown),
                Chunk::ShutdownAck(_) => self.handle_shutdown_ack(),
                Chunk::ShutdownComplete(_) => self.handle_shutdown_complete(),
                Chunk::ForwardTsn(fwd) => self.handle_forward_tsn(fwd),
                Chunk::Reconfig(reconfig) => self.handle_reconfig(now, reconfig),
                Chunk::Unknown { typ, .. } => {
                    trace!("{} ignoring unknown chunk type {}", self.side, typ);
                }
            }
        }

        if saw_data {
            self.ack_pending = true;
        }
    }

    fn handle_init(&mut self, _now: Instant, init: ChunkInit) {
        if self.side.is_client() {
            warn!("client received INIT, ignoring");
            return;
        }

        self.peer_verification_tag = init.initiate_tag;
        self.peer_last_tsn = init.initial_tsn.wrapping_sub(1);
        self.rwnd = init.advertised_receiver_window_credit;
        self.ssthresh = self.rwnd;
        self.use_forward_tsn = init.supports_forward_tsn();

        self.my_cookie = Bytes::from(rand::random::<[u8; 32]>().to_vec());

        let init_ack = ChunkInit {
            initiate_tag: self.my_verification_tag,
            advertised_receiver_window_credit: self.config.max_receive_buffer_size(),
            num_outbound_streams: self.config.max_num_outbound_streams(),
            num_inbound_streams: self.config.max_num_inbound_streams(),
            initial_tsn: self.my_next_tsn,
            params: vec![
                Param::ForwardTsnSupported,
                Param::StateCookie(self.my_cookie.clone()),
            ],
        };
        self.control_queue.push_back(vec![Chunk::InitAck(init_ack)]);
        debug!("{} responding with INIT ACK", self.side);
    }

    fn handle_init_ack(&mut self, now: Instant, init_ack: ChunkInit) {
        if self.state != AssociationState::CookieWait {
            return;
        }

        self.peer_verification_tag = init_ack.initiate_tag;
        self.peer_last_tsn = init_ack.initial_tsn.wrapping_sub(1);
        self.rwnd = init_ack.advertised_receiver_window_credit;
        self.ssthresh = self.rwnd;
        self.use_forward_tsn = init_ack.supports_forward_tsn();
        self.timers.stop(Timer::T1Init);
        self.stored_init = None;

        let Some(cookie) = init_ack.state_cookie() else {
            self.fail("no cookie in INIT ACK".to_string());
            return;
        };

        let echo = ChunkCookieEcho { cookie };
        self.stored_cookie_echo = Some(echo.clone());
        self.control_queue.push_back(vec![Chunk::CookieEcho(echo)]);
        self.state = AssociationState::CookieEchoed;
        self.timers
            .start(Timer::T1Cookie, now, self.rto_mgr.get_rto());
        debug!("{} sending COOKIE ECHO", self.side);
    }

    fn handle_cookie_echo(&mut self, echo: ChunkCookieEcho) {
        if !self.side.is_server() {
            return;
        }
        if echo.cookie != self.my_cookie {
            warn!("{} cookie mismatch, dropping COOKIE ECHO", self.side);
            return;
        }

        self.control_queue
            .push_back(vec![Chunk::CookieAck(ChunkCookieAck {})]);
        if self.state != AssociationState::Established {
            self.state = AssociationState::Established;
            self.events.push_back(Event::Connected);
        }
    }

    fn handle_cookie_ack(&mut self) {
        if self.state != AssociationState::CookieEchoed {
            return;
        }
        self.timers.stop(Timer::T1Cookie);
        self.stored_cookie_echo = None;
        self.state = AssociationState::Established;
        self.events.push_back(Event::Connected);
    }

    fn handle_data(&mut self, data: ChunkPayloadData) {
        let tsn = data.tsn;

        if sna32lte(tsn, self.peer_last_tsn) || self.payload_queue.get(tsn).is_some() {
            trace!("{} duplicate TSN {}", self.side, tsn);
            self.duplicate_tsns.push(tsn);
            return;
        }

        let stream_id = data.stream_identifier;
        let is_new_stream = !self.streams.contains_key(&stream_id);
        if is_new_stream {
            self.streams
                .insert(stream_id, StreamState::new(stream_id, data.payload_type));
            self.events
                .push_back(Event::Stream(StreamEvent::Opened { id: stream_id }));
        }

        // track for SACK gap reporting and cumulative advancement
        self.payload_queue.push(
            ChunkPayloadData {
                user_data: Bytes::new(),
                ..data.clone()
            },
            self.peer_last_tsn,
        );
        while self.payload_queue.pop(self.peer_last_tsn.wrapping_add(1)).is_some() {
            self.peer_last_tsn = self.peer_last_tsn.wrapping_add(1);
        }

        // hand to reassembly immediately; it tolerates any arrival order
        let readable = {
            let stream = self
                .streams
                .get_mut(&stream_id)
                .expect("stream inserted above");
            stream.reassembly.push(data);
            stream.reassembly.read_ready()
        };
        if readable {
            self.events
                .push_back(Event::Stream(StreamEvent::Readable { id: stream_id }));
        }
    }

    fn handle_sack(&mut self, now: Instant, sack: ChunkSelectiveAck) {
        if sna32gt(self.cumulative_tsn_ack_point, sack.cumulative_tsn_ack) {
            // stale SACK
            return;
        }

        let mut bytes_acked = 0usize;
        let mut rtt_sample: Option<u64> = None;

        // cumulative acknowledgment
        while sna32lt(self.cumulative_tsn_ack_point, sack.cumulative_tsn_ack) {
            let next = self.cumulative_tsn_ack_point.wrapping_add(1);
            let Some(chunk) = self.inflight_queue.pop(next) else {
                break;
            };
            self.cumulative_tsn_ack_point = next;
            if !chunk.acked {
                bytes_acked += chunk.user_data.len();
                self.on_bytes_acked(chunk.stream_identifier, chunk.user_data.len());
            }
            if chunk.nsent == 1 && !chunk.abandoned {
                if let Some(since) = chunk.since {
                    rtt_sample = Some(now.saturating_duration_since(since).as_millis() as u64);
                }
            }
        }

        // gap ack blocks
        let mut highest_gap_acked = sack.cumulative_tsn_ack;
        for block in &sack.gap_ack_blocks {
            for offset in block.start..=block.end {
                let tsn = sack.cumulative_tsn_ack.wrapping_add(offset as u32);
                let freed = self.inflight_queue.mark_as_acked(tsn);
                if freed > 0 {
                    bytes_acked += freed;
                    let si = self.inflight_queue.get(tsn).map(|c| c.stream_identifier);
                    if let Some(si) = si {
                        self.on_bytes_acked(si, freed);
                    }
                }
                if sna32gt(tsn, highest_gap_acked) {
                    highest_gap_acked = tsn;
                }
            }
        }

        if let Some(rtt) = rtt_sample {
            self.rto_mgr.set_new_rtt(rtt);
        }

        // miss indications for chunks below the highest gap-acked TSN
        if !sack.gap_ack_blocks.is_empty() {
            self.process_miss_indications(highest_gap_acked);
        }

        // congestion control
        if bytes_acked > 0 {
            if self.cwnd <= self.ssthresh {
                // slow start
                self.cwnd += std::cmp::min(bytes_acked as u32, self.max_payload_size);
            } else {
                self.partial_bytes_acked += bytes_acked as u32;
                if self.partial_bytes_acked >= self.cwnd && !self.pending_queue.is_empty() {
                    self.partial_bytes_acked -= self.cwnd;
                    self.cwnd += self.max_payload_size;
                }
            }
        }

        if self.in_fast_recovery
            && sna32gte(self.cumulative_tsn_ack_point, self.fast_recover_exit_point)
        {
            self.in_fast_recovery = false;
        }

        self.rwnd = sack
            .advertised_receiver_window_credit
            .saturating_sub(self.inflight_queue.n_bytes as u32);

        if self.inflight_queue.is_empty() {
            self.timers.stop(Timer::T3RTX);
        } else {
            self.timers.stop(Timer::T3RTX);
            self.timers.start(Timer::T3RTX, now, self.rto_mgr.get_rto());
        }

        self.advance_forward_tsn_point();
        self.maybe_finish_shutdown(now);
    }

    fn process_miss_indications(&mut self, highest_acked: u32) {
        let mut to_fast_retransmit = vec![];
        for tsn in self.inflight_queue.sorted_tsns() {
            if !sna32lt(tsn, highest_acked) {
                break;
            }
            if let Some(chunk) = self.inflight_queue.get_mut(tsn) {
                if chunk.acked || chunk.abandoned {
                    continue;
                }
                chunk.miss_indicator += 1;
                if chunk.miss_indicator == 3 && !chunk.retransmit {
                    chunk.retransmit = true;
                    to_fast_retransmit.push(tsn);
                }
            }
        }

        if !to_fast_retransmit.is_empty() && !self.in_fast_recovery {
            self.in_fast_recovery = true;
            self.fast_recover_exit_point = highest_acked;
            self.ssthresh = std::cmp::max(self.cwnd / 2, MIN_CWND_MTUS * self.max_payload_size);
            self.cwnd = self.ssthresh;
            self.partial_bytes_acked = 0;
            debug!(
                "{} entering fast recovery, {} chunks marked",
                self.side,
                to_fast_retransmit.len()
            );
        }
    }

    fn on_retransmission_timeout(&mut self, now: Instant, budget_exhausted: bool) {
        if self.inflight_queue.is_empty() {
            return;
        }

        if budget_exhausted && !self.use_forward_tsn {
            self.fail("T3-rtx retransmission limit exceeded".to_string());
            return;
        }

        // RFC 4960 §6.3.3 E1
        self.ssthresh = std::cmp::max(self.cwnd / 2, MIN_CWND_MTUS * self.max_payload_size);
        self.cwnd = self.max_payload_size;
        self.partial_bytes_acked = 0;

        self.abandon_expired(now);
        self.inflight_queue.mark_all_to_retransmit();
        self.advance_forward_tsn_point();

        self.timers.start(Timer::T3RTX, now, self.rto_mgr.get_rto());
    }

    /// Abandons partially reliable chunks whose budget ran out.
    fn abandon_expired(&mut self, now: Instant) {
        let mut abandoned: Vec<(u16, usize)> = vec![];
        for tsn in self.inflight_queue.sorted_tsns() {
            let Some(chunk) = self.inflight_queue.get_mut(tsn) else {
                continue;
            };
            if chunk.acked || chunk.abandoned {
                continue;
            }
            let Some(stream) = self.streams.get(&chunk.stream_identifier) else {
                continue;
            };
            let expired = match stream.reliability_type {
                ReliabilityType::Reliable => false,
                ReliabilityType::Rexmit => chunk.nsent > stream.reliability_value,
                ReliabilityType::Timed => chunk
                    .since
                    .map(|s| {
                        now.saturating_duration_since(s).as_millis()
                            > stream.reliability_value as u128
                    })
                    .unwrap_or(false),
            };
            if expired {
                chunk.abandoned = true;
                chunk.retransmit = false;
                abandoned.push((chunk.stream_identifier, chunk.user_data.len()));
            }
        }

        for (si, len) in abandoned {
            self.on_bytes_acked(si, len);
        }
    }

    /// Moves the advanced peer ack point over acked or abandoned chunks and
    /// schedules a FORWARD TSN when it passes the cumulative ack point.
    fn advance_forward_tsn_point(&mut self) {
        if !self.use_forward_tsn {
            return;
        }
        if sna32lt(self.advanced_peer_tsn_ack_point, self.cumulative_tsn_ack_point) {
            self.advanced_peer_tsn_ack_point = self.cumulative_tsn_ack_point;
        }

        loop {
            let next = self.advanced_peer_tsn_ack_point.wrapping_add(1);
            match self.inflight_queue.get(next) {
                Some(chunk) if chunk.abandoned || chunk.acked => {
                    self.advanced_peer_tsn_ack_point = next;
                }
                _ => break,
            }
        }

        if sna32gt(self.advanced_peer_tsn_ack_point, self.cumulative_tsn_ack_point) {
            self.will_send_forward_tsn = true;
        }
    }

    fn create_forward_tsn(&self) -> ChunkForwardTsn {
        let mut stream_map: HashMap<u16, u16> = HashMap::new();
        for tsn in self.inflight_queue.sorted_tsns() {
            if sna32gt(tsn, self.advanced_peer_tsn_ack_point) {
                break;
            }
            if let Some(chunk) = self.inflight_queue.get(tsn) {
                if chunk.abandoned && !chunk.unordered {
                    let entry = stream_map
                        .entry(chunk.stream_identifier)
                        .or_insert(chunk.stream_sequence_number);
                    if crate::util::sna16lt(*entry, chunk.stream_sequence_number) {
                        *entry = chunk.stream_sequence_number;
                    }
                }
            }
        }

        ChunkForwardTsn {
            new_cumulative_tsn: self.advanced_peer_tsn_ack_point,
            streams: stream_map
                .into_iter()
                .map(|(identifier, sequence)| ChunkForwardTsnStream {
                    identifier,
                    sequence,
                })
                .collect(),
        }
    }

    fn handle_forward_tsn(&mut self, fwd: ChunkForwardTsn) {
        if sna32lte(fwd.new_cumulative_tsn, self.peer_last_tsn) {
            return;
        }

        self.peer_last_tsn = fwd.new_cumulative_tsn;
        // drop any tracking entries the peer has abandoned
        while self.payload_queue.pop(self.peer_last_tsn.wrapping_add(1)).is_some() {
            self.peer_last_tsn = self.peer_last_tsn.wrapping_add(1);
        }

        let mut readable = vec![];
        for stream in fwd.streams {
            if let Some(state) = self.streams.get_mut(&stream.identifier) {
                state.reassembly.forward_tsn_for_ordered(stream.sequence);
                if state.reassembly.read_ready() {
                    readable.push(stream.identifier);
                }
            }
        }
        for state in self.streams.values_mut() {
            state
                .reassembly
                .forward_tsn_for_unordered(fwd.new_cumulative_tsn);
        }

        for id in readable {
            self.events
                .push_back(Event::Stream(StreamEvent::Readable { id }));
        }
        self.ack_pending = true;
    }

    fn handle_reconfig(&mut self, now: Instant, reconfig: ChunkReconfig) {
        for param in [reconfig.param_a, reconfig.param_b].into_iter().flatten() {
            match param {
                Param::OutgoingSsnResetRequest {
                    reconfig_request_sequence_number,
                    stream_identifiers,
                    ..
                } => {
                    for id in &stream_identifiers {
                        if let Some(stream) = self.streams.get_mut(id) {
                            stream.reassembly.reset();
                        }
                        self.events
                            .push_back(Event::Stream(StreamEvent::Reset { id: *id }));
                    }
                    self.control_queue
                        .push_back(vec![Chunk::Reconfig(ChunkReconfig {
                            param_a: Some(Param::ReconfigResponse {
                                reconfig_response_sequence_number:
                                    reconfig_request_sequence_number,
                                result: RECONFIG_RESULT_SUCCESS_PERFORMED,
                            }),
                            param_b: None,
                        })]);
                }
                Param::ReconfigResponse {
                    reconfig_response_sequence_number,
                    ..
                } => {
                    self.reconfig_requests
                        .remove(&reconfig_response_sequence_number);
                    if self.reconfig_requests.is_empty() {
                        self.timers.stop(Timer::Reconfig);
                    } else {
                        self.timers
                            .start(Timer::Reconfig, now, self.rto_mgr.get_rto());
                    }
                }
                other => {
                    trace!("{} ignoring reconfig param {:?}", self.side, other);
                }
            }
        }
    }

    fn handle_shutdown(&mut self, now: Instant, _shutdown: ChunkShutdown) {
        if matches!(
            self.state,
            AssociationState::Established | AssociationState::ShutdownPending
        ) {
            self.state = AssociationState::ShutdownReceived;
        }
        self.maybe_finish_shutdown(now);
    }

    fn handle_shutdown_ack(&mut self) {
        if matches!(
            self.state,
            AssociationState::ShutdownSent | AssociationState::ShutdownAckSent
        ) {
            self.timers.stop(Timer::T2Shutdown);
            self.control_queue
                .push_back(vec![Chunk::ShutdownComplete(ChunkShutdownComplete {})]);
            self.close_internal();
        }
    }

    fn handle_shutdown_complete(&mut self) {
        if self.state == AssociationState::ShutdownAckSent
            || self.state == AssociationState::ShutdownSent
        {
            self.timers.stop(Timer::T2Shutdown);
            self.close_internal();
        }
    }

    /// Initiates a graceful shutdown; queued data is flushed first.
    pub fn shutdown(&mut self, now: Instant) -> Result<()> {
        if !matches!(
            self.state,
            AssociationState::Established
                | AssociationState::ShutdownPending
                | AssociationState::ShutdownReceived
        ) {
            return Err(Error::ErrShutdownNonEstablished);
        }
        if self.state == AssociationState::Established {
            self.state = AssociationState::ShutdownPending;
        }
        self.maybe_finish_shutdown(now);
        Ok(())
    }

    /// Aborts immediately with a user-initiated error cause.
    pub fn abort(&mut self, reason: &str) {
        let abort = ChunkAbort {
            error_causes: vec![ErrorCause {
                code: USER_INITIATED_ABORT,
                raw: Bytes::copy_from_slice(reason.as_bytes()),
            }],
        };
        self.control_queue.push_back(vec![Chunk::Abort(abort)]);
        self.close_internal();
    }

    fn maybe_finish_shutdown(&mut self, now: Instant) {
        let drained = self.pending_queue.is_empty() && self.inflight_queue.is_empty();
        if !drained {
            return;
        }

        match self.state {
            AssociationState::ShutdownPending => {
                self.state = AssociationState::ShutdownSent;
                self.send_shutdown_for_state(now);
            }
            AssociationState::ShutdownReceived => {
                self.state = AssociationState::ShutdownAckSent;
                self.send_shutdown_for_state(now);
            }
            _ => {}
        }
    }

    fn send_shutdown_for_state(&mut self, now: Instant) {
        match self.state {
            AssociationState::ShutdownSent => {
                self.control_queue
                    .push_back(vec![Chunk::Shutdown(ChunkShutdown {
                        cumulative_tsn_ack: self.peer_last_tsn,
                    })]);
                self.timers
                    .start(Timer::T2Shutdown, now, self.rto_mgr.get_rto());
            }
            AssociationState::ShutdownAckSent => {
                self.control_queue
                    .push_back(vec![Chunk::ShutdownAck(ChunkShutdownAck {})]);
                self.timers
                    .start(Timer::T2Shutdown, now, self.rto_mgr.get_rto());
            }
            _ => {}
        }
    }

    fn close_internal(&mut self) {
        if self.state != AssociationState::Closed {
            self.state = AssociationState::Closed;
            self.events.push_back(Event::Closed);
            self.endpoint_events
                .push_back(EndpointEvent(EndpointEventInner::Drained));
        }
    }

    fn fail(&mut self, reason: String) {
        warn!("{} association failed: {}", self.side, reason);
        self.state = AssociationState::Closed;
        self.events.push_back(Event::AssociationLost { reason });
        self.endpoint_events
            .push_back(EndpointEvent(EndpointEventInner::Drained));
    }

    fn create_sack(&mut self) -> ChunkSelectiveAck {
        ChunkSelectiveAck {
            cumulative_tsn_ack: self.peer_last_tsn,
            advertised_receiver_window_credit: self.config.max_receive_buffer_size(),
            gap_ack_blocks: self.payload_queue.get_gap_ack_blocks(self.peer_last_tsn),
            duplicate_tsn: std::mem::take(&mut self.duplicate_tsns),
        }
    }

    fn on_bytes_acked(&mut self, stream_id: u16, len: usize) {
        let mut low = false;
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            let before = stream.buffered_amount;
            stream.buffered_amount = stream.buffered_amount.saturating_sub(len);
            if stream.buffered_amount_low > 0
                && before > stream.buffered_amount_low
                && stream.buffered_amount <= stream.buffered_amount_low
            {
                low = true;
            }
        }
        if low {
            self.events
                .push_back(Event::Stream(StreamEvent::BufferedAmountLow {
                    id: stream_id,
                }));
        }
    }

    // Stream-facing plumbing

    /// Opens a local stream. Streams exist implicitly in SCTP, so this only
    /// allocates local state.
    pub fn open_stream(
        &mut self,
        id: StreamId,
        default_payload_type: PayloadProtocolIdentifier,
    ) -> Result<Stream<'_>> {
        if self.streams.contains_key(&id) {
            return Err(Error::ErrStreamAlreadyExist);
        }
        self.streams
            .insert(id, StreamState::new(id, default_payload_type));
        Ok(Stream {
            association: self,
            id,
        })
    }

    /// Returns a handle to an existing stream.
    pub fn stream(&mut self, id: StreamId) -> Result<Stream<'_>> {
        if !self.streams.contains_key(&id) {
            return Err(Error::ErrStreamNotExisted);
        }
        Ok(Stream {
            association: self,
            id,
        })
    }

    pub(crate) fn set_reliability_params(
        &mut self,
        id: StreamId,
        unordered: bool,
        reliability_type: ReliabilityType,
        reliability_value: u32,
    ) -> Result<()> {
        let stream = self
            .streams
            .get_mut(&id)
            .ok_or(Error::ErrStreamNotExisted)?;
        stream.unordered = unordered;
        stream.reliability_type = reliability_type;
        stream.reliability_value = reliability_value;
        Ok(())
    }

    pub(crate) fn default_payload_type(&self, id: StreamId) -> Result<PayloadProtocolIdentifier> {
        self.streams
            .get(&id)
            .map(|s| s.default_payload_type)
            .ok_or(Error::ErrStreamNotExisted)
    }

    pub(crate) fn write_sctp(
        &mut self,
        id: StreamId,
        data: Bytes,
        ppi: PayloadProtocolIdentifier,
    ) -> Result<usize> {
        if data.is_empty() {
            return Err(Error::ErrOutboundPacketTooLarge);
        }
        if data.len() > self.config.max_message_size() as usize {
            return Err(Error::ErrOutboundPacketTooLarge);
        }
        match self.state {
            AssociationState::Closed
            | AssociationState::ShutdownPending
            | AssociationState::ShutdownSent
            | AssociationState::ShutdownReceived
            | AssociationState::ShutdownAckSent => {
                return Err(Error::ErrPayloadDataStateNotExist);
            }
            _ => {}
        }

        let (unordered, ssn) = {
            let stream = self
                .streams
                .get_mut(&id)
                .ok_or(Error::ErrStreamNotExisted)?;
            if stream.write_shutdown {
                return Err(Error::ErrStreamClosed);
            }
            let unordered = stream.unordered;
            let ssn = stream.next_ssn;
            if !unordered {
                stream.next_ssn = stream.next_ssn.wrapping_add(1);
            }
            stream.buffered_amount += data.len();
            (unordered, ssn)
        };

        let max_fragment = self
            .max_payload_size
            .saturating_sub(DATA_CHUNK_OVERHEAD) as usize;
        let mut remaining = data.len();
        let mut offset = 0;
        while remaining > 0 {
            let fragment_len = std::cmp::min(max_fragment, remaining);
            let chunk = ChunkPayloadData {
                unordered,
                beginning_fragment: offset == 0,
                ending_fragment: remaining - fragment_len == 0,
                tsn: self.generate_next_tsn(),
                stream_identifier: id,
                stream_sequence_number: if unordered { 0 } else { ssn },
                payload_type: ppi,
                user_data: data.slice(offset..offset + fragment_len),
                ..Default::default()
            };
            self.pending_queue.push(chunk);
            remaining -= fragment_len;
            offset += fragment_len;
        }

        Ok(data.len())
    }

    pub(crate) fn read_sctp(
        &mut self,
        id: StreamId,
    ) -> Result<Option<(Bytes, PayloadProtocolIdentifier)>> {
        let stream = self
            .streams
            .get_mut(&id)
            .ok_or(Error::ErrStreamNotExisted)?;
        Ok(stream.reassembly.read())
    }

    /// Bytes queued on `id` but not yet acknowledged by the peer.
    pub fn buffered_amount(&self, id: StreamId) -> usize {
        self.streams
            .get(&id)
            .map(|s| s.buffered_amount)
            .unwrap_or(0)
    }

    pub(crate) fn buffered_amount_low_threshold(&self, id: StreamId) -> usize {
        self.streams
            .get(&id)
            .map(|s| s.buffered_amount_low)
            .unwrap_or(0)
    }

    pub(crate) fn set_buffered_amount_low_threshold(&mut self, id: StreamId, threshold: usize) {
        if let Some(stream) = self.streams.get_mut(&id) {
            stream.buffered_amount_low = threshold;
        }
    }

    /// Requests an outgoing SSN reset for `id` (RFC 6525), closing the
    /// outgoing half of the stream.
    pub(crate) fn reset_stream(&mut self, id: StreamId) -> Result<()> {
        if !matches!(self.state, AssociationState::Established) {
            return Err(Error::ErrResetPacketInStateNotExist);
        }
        let stream = self
            .streams
            .get_mut(&id)
            .ok_or(Error::ErrStreamNotExisted)?;
        if stream.write_shutdown {
            return Ok(());
        }
        stream.write_shutdown = true;

        let rsn = self.my_next_rsn;
        self.my_next_rsn = self.my_next_rsn.wrapping_add(1);
        let param = Param::OutgoingSsnResetRequest {
            reconfig_request_sequence_number: rsn,
            reconfig_response_sequence_number: 0,
            sender_last_tsn: self.my_next_tsn.wrapping_sub(1),
            stream_identifiers: vec![id],
        };
        self.reconfig_requests.insert(rsn, param.clone());
        self.control_queue
            .push_back(vec![Chunk::Reconfig(ChunkReconfig {
                param_a: Some(param),
                param_b: None,
            })]);
        Ok(())
    }

    fn generate_next_tsn(&mut self) -> u32 {
        let tsn = self.my_next_tsn;
        self.my_next_tsn = self.my_next_tsn.wrapping_add(1);
        tsn
    }
}

#[cfg(test)]
mod association_test;
