//! Transport-facing plumbing of the connection: SCTP/DCEP bridging, RTP
//! demuxing and timer handling.

use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use log::{debug, trace, warn};

use crate::api::media_engine::SDES_RTP_STREAM_ID_URI;
use crate::data_channel::internal::RTCDataChannelInternal;
use crate::data_channel::state::RTCDataChannelState;
use crate::data_channel::{RTCDataChannelId, RTCDataChannelInit};
use crate::peer_connection::dtls_role::DTLSRole;
use crate::peer_connection::event::{DataChannelMessage as EventMessage, RTCPeerConnectionEvent};
use crate::peer_connection::state::{RTCDtlsTransportState, RTCIceConnectionState};
use crate::peer_connection::RTCPeerConnection;
use crate::rtp_transceiver::rtp_codec::{RTCRtpCodecParameters, RTPCodecType};
use crate::rtp_transceiver::rtp_sender::LocalTrack;
use crate::rtp_transceiver::TransceiverId;
use crate::track::track_local::TrackLocalStaticSample;
use crate::track::track_remote::TrackRemote;
use datachannel::{DataChannel, DataChannelConfig, DataChannelMessage};
use interceptor::{Interceptor, Packet, StreamInfo, TaggedPacket};
use media::Sample;
use rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use sctp::{
    Event as SctpEvent, PayloadProtocolIdentifier, ReliabilityType, StreamEvent,
};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, Unmarshal};
use shared::Protocol;
use shared::TransportContext;

impl<I: Interceptor> RTCPeerConnection<I> {
    // ---- transport state inputs --------------------------------------

    /// Feeds the state of the external ICE transport.
    pub fn handle_ice_connection_state_change(&mut self, state: RTCIceConnectionState) {
        if self.ice_connection_state == state {
            return;
        }
        self.ice_connection_state = state;
        self.events
            .push_back(RTCPeerConnectionEvent::OnIceConnectionStateChange(state));
        self.update_connection_state();
    }

    /// Feeds the state of the external DTLS transport. `Connected` starts
    /// the SCTP association when a data section was negotiated.
    pub fn handle_dtls_state_change(&mut self, now: Instant, state: RTCDtlsTransportState) {
        if self.dtls_state == state {
            return;
        }
        self.dtls_state = state;
        self.update_connection_state();

        if state == RTCDtlsTransportState::Connected {
            self.maybe_start_sctp(now);
        }
    }

    // ---- wire input/output -------------------------------------------

    /// Feeds one decrypted DTLS application datagram (an SCTP packet).
    pub fn handle_dtls_read(&mut self, now: Instant, data: &Bytes) {
        match self
            .sctp_endpoint
            .handle(now, TransportContext::default(), data)
        {
            Some((ch, sctp::DatagramEvent::NewAssociation(association))) => {
                debug!("incoming SCTP association accepted");
                self.sctp_association = Some((ch, association));
            }
            Some((ch, sctp::DatagramEvent::AssociationEvent(event))) => {
                if let Some((handle, association)) = &mut self.sctp_association {
                    if *handle == ch {
                        association.handle_event(event);
                    }
                }
            }
            None => {}
        }
        self.pump_sctp(now);
    }

    /// Returns the next SCTP datagram for the DTLS transport to protect.
    pub fn poll_dtls_transmit(&mut self, now: Instant) -> Option<Bytes> {
        if self.dtls_out.is_empty() {
            self.pump_sctp(now);
        }
        self.dtls_out.pop_front()
    }

    /// Feeds one decrypted SRTP/SRTCP payload. RTP and RTCP are
    /// demultiplexed by payload type (RFC 5761); malformed packets are
    /// dropped and logged, never fatal.
    pub fn handle_srtp_read(&mut self, now: Instant, data: &Bytes) {
        if data.len() < 2 {
            return;
        }

        let tagged = |message| TaggedPacket {
            now,
            transport: TransportContext::default(),
            message,
        };

        let pt = data[1];
        if (192..=223).contains(&pt) {
            let mut buf = data.clone();
            match rtcp::unmarshal(&mut buf) {
                Ok(packets) => {
                    let _ = self.chain.handle_read(tagged(Packet::Rtcp(packets)));
                }
                Err(err) => {
                    trace!("dropping malformed RTCP packet: {err}");
                }
            }
        } else {
            let mut buf = data.clone();
            match rtp::Packet::unmarshal(&mut buf) {
                Ok(packet) => {
                    let _ = self.chain.handle_read(tagged(Packet::Rtp(packet)));
                }
                Err(err) => {
                    trace!("dropping malformed RTP packet: {err}");
                }
            }
        }

        self.drain_chain(now);
    }

    /// Returns the next RTP/RTCP packet for the SRTP transport to protect.
    pub fn poll_srtp_transmit(&mut self) -> Option<Bytes> {
        self.srtp_out.pop_front()
    }

    /// Sends a compound RTCP packet (e.g. an application-level PLI).
    pub fn write_rtcp(&mut self, packets: Vec<Box<dyn rtcp::Packet>>, now: Instant) -> Result<()> {
        self.chain.handle_write(TaggedPacket {
            now,
            transport: TransportContext::default(),
            message: Packet::Rtcp(packets),
        })?;
        self.drain_chain(now);
        Ok(())
    }

    // ---- timers -------------------------------------------------------

    /// The next instant at which [`handle_timeout`](Self::handle_timeout)
    /// must run.
    pub fn poll_timeout(&mut self) -> Option<Instant> {
        let mut deadline: Option<Instant> = None;
        let mut fold = |candidate: Option<Instant>| {
            deadline = match (deadline, candidate) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, None) => a,
                (None, b) => b,
            };
        };

        if let Some((_, association)) = &self.sctp_association {
            fold(association.poll_timeout());
        }
        fold(self.chain.poll_timeout());
        for transceiver in &self.transceivers {
            fold(transceiver.receiver.next_pli);
        }
        deadline
    }

    /// Advances every internal clock to `now`.
    pub fn handle_timeout(&mut self, now: Instant) {
        if let Some((_, association)) = &mut self.sctp_association {
            association.handle_timeout(now);
        }
        self.pump_sctp(now);

        let _ = self.chain.handle_timeout(now);

        // periodic keyframe requests for inbound video
        let pli_interval = self.setting_engine.pli_interval;
        let mut request_ssrcs = vec![];
        for transceiver in &mut self.transceivers {
            let due = transceiver
                .receiver
                .next_pli
                .map(|at| at <= now)
                .unwrap_or(false);
            if due {
                transceiver.receiver.next_pli = Some(now + pli_interval);
                for track_id in &transceiver.receiver.tracks {
                    if let Some(track) = self.remote_tracks.get(*track_id as usize) {
                        if track.kind == RTPCodecType::Video {
                            request_ssrcs.push(track.ssrc);
                        }
                    }
                }
            }
        }
        for media_ssrc in request_ssrcs {
            let pli = PictureLossIndication {
                sender_ssrc: self.rtcp_ssrc,
                media_ssrc,
            };
            let _ = self.chain.handle_write(TaggedPacket {
                now,
                transport: TransportContext::default(),
                message: Packet::Rtcp(vec![Box::new(pli)]),
            });
        }

        self.drain_chain(now);
    }

    // ---- media plumbing ----------------------------------------------

    pub(crate) fn sender_write_sample(
        &mut self,
        transceiver: TransceiverId,
        sample: &Sample,
        now: Instant,
    ) -> Result<usize> {
        if self.is_closed {
            return Err(Error::ErrConnectionClosed);
        }

        let packets = {
            let sender = self
                .transceivers
                .get_mut(transceiver)
                .and_then(|t| t.sender.as_mut())
                .ok_or(Error::ErrSenderNotCreatedByConnection)?;
            if !sender.bound {
                return Err(Error::ErrIncorrectSignalingState);
            }
            match &mut sender.track {
                LocalTrack::Sample(track) => track.packetize(sample)?,
                LocalTrack::Rtp(_) => return Err(Error::ErrTrackNotExisted),
            }
        };

        let n = packets.len();
        for packet in packets {
            let _ = self.chain.handle_write(TaggedPacket {
                now,
                transport: TransportContext::default(),
                message: Packet::Rtp(packet),
            });
        }
        self.drain_chain(now);
        Ok(n)
    }

    pub(crate) fn sender_write_rtp(
        &mut self,
        transceiver: TransceiverId,
        packet: rtp::Packet,
        now: Instant,
    ) -> Result<()> {
        if self.is_closed {
            return Err(Error::ErrConnectionClosed);
        }

        let packet = {
            let sender = self
                .transceivers
                .get_mut(transceiver)
                .and_then(|t| t.sender.as_mut())
                .ok_or(Error::ErrSenderNotCreatedByConnection)?;
            if !sender.bound {
                return Err(Error::ErrIncorrectSignalingState);
            }
            match &sender.track {
                LocalTrack::Rtp(track) => track.prepare(packet)?,
                LocalTrack::Sample(_) => return Err(Error::ErrTrackNotExisted),
            }
        };

        self.chain.handle_write(TaggedPacket {
            now,
            transport: TransportContext::default(),
            message: Packet::Rtp(packet),
        })?;
        self.drain_chain(now);
        Ok(())
    }

    /// Swaps the sending track live. The stream identity (SSRC) is kept so
    /// the peer sees a continuous stream.
    pub(crate) fn sender_replace_track(
        &mut self,
        transceiver: TransceiverId,
        mut track: TrackLocalStaticSample,
    ) -> Result<()> {
        let mtu = self.setting_engine.get_send_mtu();
        let sender = self
            .transceivers
            .get_mut(transceiver)
            .and_then(|t| t.sender.as_mut())
            .ok_or(Error::ErrSenderNotCreatedByConnection)?;

        if track.kind() != track_kind(&sender.track) {
            return Err(Error::ErrCodecNotFound);
        }

        track.ssrc = sender.track.ssrc();
        if sender.bound {
            if let Some(codec) = &sender.negotiated_codec {
                track.bind(codec.payload_type, mtu)?;
            }
        }
        sender.track = LocalTrack::Sample(track);
        Ok(())
    }

    /// Drains the interceptor chain: outbound packets serialize to the
    /// SRTP queue, inbound packets route to their remote track.
    pub(crate) fn drain_chain(&mut self, now: Instant) {
        while let Some(pkt) = self.chain.poll_write() {
            match pkt.message {
                Packet::Rtp(packet) => match packet.marshal() {
                    Ok(raw) => self.srtp_out.push_back(raw.freeze()),
                    Err(err) => warn!("failed to marshal outbound RTP: {err}"),
                },
                Packet::Rtcp(packets) => match rtcp::packet::marshal(&packets) {
                    Ok(raw) => self.srtp_out.push_back(raw),
                    Err(err) => warn!("failed to marshal outbound RTCP: {err}"),
                },
            }
        }

        let mut inbound = vec![];
        while let Some(pkt) = self.chain.poll_read() {
            inbound.push(pkt);
        }
        for pkt in inbound {
            if let Packet::Rtp(packet) = pkt.message {
                self.route_rtp(now, packet);
            }
        }
    }

    /// Demuxes one inbound RTP packet onto its remote track, materializing
    /// the track the first time an unseen SSRC matches a transceiver.
    fn route_rtp(&mut self, now: Instant, packet: rtp::Packet) {
        let ssrc = packet.header.ssrc;
        if let Some(track) = self.remote_tracks.iter_mut().find(|t| t.ssrc == ssrc) {
            track.push(packet);
            return;
        }

        // codec lookup: negotiated payload types first, engine defaults as
        // the fallback
        let payload_type = packet.header.payload_type;
        let codec: Option<RTCRtpCodecParameters> = self
            .negotiated_codecs
            .iter()
            .find(|c| c.payload_type == payload_type)
            .cloned()
            .or_else(|| {
                self.media_engine
                    .find_codec_by_payload_type(payload_type)
                    .cloned()
            });
        let Some(codec) = codec else {
            trace!("dropping RTP for unknown payload type {payload_type}");
            return;
        };
        let kind = codec.capability.kind();

        // simulcast layers are told apart by the RID header extension
        let rid = self
            .media_engine
            .header_extension_id(SDES_RTP_STREAM_ID_URI)
            .and_then(|id| packet.header.get_extension(id as u8))
            .map(|raw| String::from_utf8_lossy(&raw).to_string());

        let pli_interval = self.setting_engine.pli_interval;
        let track_id = self.remote_tracks.len() as u32;

        let mut accepted = None;
        for transceiver in self.transceivers.iter_mut() {
            if transceiver.stopped || transceiver.kind != kind {
                continue;
            }
            if !transceiver.direction.has_recv() {
                continue;
            }
            if let Some(rid) = &rid {
                if !transceiver.receiver.rids.is_empty()
                    && !transceiver.receiver.rids.contains(rid)
                {
                    continue;
                }
                // one receiver fans out into at most three simulcast layers
                if transceiver.receiver.tracks.len() >= 3 {
                    continue;
                }
            } else if !transceiver.receiver.tracks.is_empty() {
                // without RIDs one receiver owns one track
                continue;
            }

            transceiver.receiver.tracks.push(track_id);
            if kind == RTPCodecType::Video && transceiver.receiver.next_pli.is_none() {
                transceiver.receiver.next_pli = Some(now + pli_interval);
            }
            accepted = Some(());
            break;
        }

        if accepted.is_none() {
            trace!("dropping RTP for unmatched ssrc {ssrc:x}");
            return;
        }

        debug!("new remote track {track_id} ssrc={ssrc:x} rid={rid:?}");
        self.chain.bind_remote_stream(&StreamInfo {
            ssrc,
            payload_type,
            mime_type: codec.capability.mime_type.clone(),
            clock_rate: codec.capability.clock_rate,
            channels: codec.capability.channels,
            sdp_fmtp_line: codec.capability.sdp_fmtp_line.clone(),
            rtcp_feedback: codec.capability.rtcp_feedback.clone(),
            rtp_header_extensions: vec![],
        });

        let mut track = TrackRemote::new(track_id, ssrc, rid, kind, codec);
        track.push(packet);
        self.remote_tracks.push(track);
        self.events
            .push_back(RTCPeerConnectionEvent::OnTrack(track_id));
    }

    // ---- SCTP / data channel plumbing --------------------------------

    /// Starts the SCTP association once DTLS is up. The DTLS client is the
    /// SCTP client.
    pub(crate) fn maybe_start_sctp(&mut self, now: Instant) {
        if self.sctp_association.is_some() || self.data_mid.is_none() {
            return;
        }

        if self.dtls_role == DTLSRole::Client {
            let config = sctp::ClientConfig {
                transport: Arc::new(
                    sctp::TransportConfig::default()
                        .with_max_message_size(self.setting_engine.get_sctp_max_message_size()),
                ),
            };
            match self
                .sctp_endpoint
                .connect(config, TransportContext::default(), now)
            {
                Ok((handle, association)) => {
                    debug!("initiating SCTP association");
                    self.sctp_association = Some((handle, association));
                }
                Err(err) => {
                    warn!("failed to start SCTP association: {err}");
                    self.transport_failed = true;
                    self.update_connection_state();
                }
            }
        }
        self.pump_sctp(now);
    }

    /// Drains association events and datagrams until quiet.
    pub(crate) fn pump_sctp(&mut self, now: Instant) {
        loop {
            let mut events = vec![];
            let mut transmits = vec![];
            let mut endpoint_events = vec![];
            {
                let Some((handle, association)) = &mut self.sctp_association else {
                    return;
                };
                while let Some(event) = association.poll() {
                    events.push(event);
                }
                while let Some(transmit) = association.poll_transmit(now) {
                    if let sctp::Payload::RawEncode(datagrams) = transmit.message {
                        transmits.extend(datagrams);
                    }
                }
                while let Some(event) = association.poll_endpoint_event() {
                    endpoint_events.push((*handle, event));
                }
            }

            let progressed = !events.is_empty() || !transmits.is_empty();
            self.dtls_out.extend(transmits);
            for (handle, event) in endpoint_events {
                self.sctp_endpoint.handle_event(handle, event);
            }
            for event in events {
                self.handle_association_event(now, event);
            }
            self.process_pending_closes();

            if !progressed {
                return;
            }
        }
    }

    fn handle_association_event(&mut self, _now: Instant, event: SctpEvent) {
        match event {
            SctpEvent::Connected => {
                debug!("SCTP association established");
                self.sctp_connected = true;
                self.open_pending_channels();
            }
            SctpEvent::Closed => {
                self.sctp_connected = false;
                self.close_all_channels();
            }
            SctpEvent::AssociationLost { reason } => {
                warn!("SCTP association lost: {reason}");
                self.sctp_connected = false;
                self.close_all_channels();
                self.transport_failed = true;
                self.update_connection_state();
            }
            SctpEvent::Stream(StreamEvent::Opened { .. }) => {
                // the channel materializes when DCEP arrives
            }
            SctpEvent::Stream(StreamEvent::Readable { id }) => {
                self.on_stream_readable(id);
            }
            SctpEvent::Stream(StreamEvent::Reset { id }) => {
                self.on_stream_reset(id);
            }
            SctpEvent::Stream(StreamEvent::BufferedAmountLow { id }) => {
                if let Some(channel_id) = self.stream_to_channel.get(&id).cloned() {
                    self.events.push_back(
                        RTCPeerConnectionEvent::OnDataChannelBufferedAmountLow(channel_id),
                    );
                }
            }
        }
    }

    /// Dials every channel still waiting for the association or its stream.
    pub(crate) fn open_pending_channels(&mut self) {
        if !self.sctp_connected || self.next_stream_id.is_none() {
            return;
        }

        let pending: Vec<RTCDataChannelId> = self
            .data_channels
            .iter()
            .filter(|(_, c)| {
                c.ready_state == RTCDataChannelState::Connecting && c.channel.is_none()
            })
            .map(|(id, _)| *id)
            .collect();

        for id in pending {
            if let Err(err) = self.open_channel(id) {
                warn!("failed to open data channel {id}: {err}");
            }
        }
    }

    fn open_channel(&mut self, id: RTCDataChannelId) -> Result<()> {
        let stream_id = match self
            .data_channels
            .get(&id)
            .ok_or(Error::ErrDataChannelNotExisted)?
            .stream_id
        {
            Some(stream_id) => stream_id,
            None => self.alloc_stream_id()?,
        };

        let (config, negotiated, low_threshold) = {
            let channel = self
                .data_channels
                .get_mut(&id)
                .ok_or(Error::ErrDataChannelNotExisted)?;
            channel.stream_id = Some(stream_id);
            let (channel_type, reliability_parameter) =
                DataChannel::channel_type_and_reliability_parameter(
                    channel.ordered,
                    channel.max_retransmits,
                    channel.max_packet_life_time,
                );
            (
                DataChannelConfig {
                    channel_type,
                    negotiated: channel.negotiated.is_some(),
                    priority: 0,
                    reliability_parameter,
                    label: channel.label.clone(),
                    protocol: channel.protocol.clone(),
                },
                channel.negotiated.is_some(),
                channel.buffered_amount_low_threshold,
            )
        };
        self.stream_to_channel.insert(stream_id, id);

        let mut dcep = DataChannel::dial(config.clone(), 0, stream_id)?;

        // bind the SCTP stream with the channel's delivery semantics
        let (unordered, reliability_type) = DataChannel::reliability_params(config.channel_type);
        let mut writes = vec![];
        while let Some(msg) = dcep.poll_write() {
            writes.push(msg);
        }
        if let Some((_, association)) = &mut self.sctp_association {
            if association.stream(stream_id).is_err() {
                association.open_stream(stream_id, PayloadProtocolIdentifier::Binary)?;
            }
            let mut stream = association.stream(stream_id)?;
            stream.set_reliability_params(
                unordered,
                reliability_type,
                config.reliability_parameter,
            )?;
            if low_threshold > 0 {
                stream.set_buffered_amount_low_threshold(low_threshold);
            }
            for msg in writes {
                stream.write_sctp(&msg.payload.freeze(), msg.ppi)?;
            }
        }

        let channel = self
            .data_channels
            .get_mut(&id)
            .ok_or(Error::ErrDataChannelNotExisted)?;
        channel.channel = Some(dcep);
        if negotiated {
            // out-of-band negotiated channels skip the DCEP handshake
            channel.ready_state = RTCDataChannelState::Open;
            channel.announced_open = true;
            self.events
                .push_back(RTCPeerConnectionEvent::OnDataChannelOpen(id));
        }
        Ok(())
    }

    fn alloc_stream_id(&mut self) -> Result<u16> {
        let mut id = self
            .next_stream_id
            .ok_or(Error::ErrDataChannelNotExisted)?;
        while self.stream_to_channel.contains_key(&id) {
            id = id.checked_add(2).ok_or(Error::ErrMaxDataChannelID)?;
        }
        if id > 65534 {
            return Err(Error::ErrMaxDataChannelID);
        }
        self.next_stream_id = Some(id + 2);
        Ok(id)
    }

    fn on_stream_readable(&mut self, stream_id: u16) {
        loop {
            let message = {
                let Some((_, association)) = &mut self.sctp_association else {
                    return;
                };
                match association.stream(stream_id) {
                    Ok(mut stream) => stream.read_sctp().unwrap_or(None),
                    Err(_) => None,
                }
            };
            let Some((data, ppi)) = message else {
                return;
            };
            self.on_stream_message(stream_id, data, ppi);
        }
    }

    fn on_stream_message(
        &mut self,
        stream_id: u16,
        data: Bytes,
        ppi: PayloadProtocolIdentifier,
    ) {
        let Some(&channel_id) = self.stream_to_channel.get(&stream_id) else {
            self.accept_remote_channel(stream_id, data, ppi);
            return;
        };

        let Some(channel) = self.data_channels.get_mut(&channel_id) else {
            return;
        };
        let Some(dcep) = channel.channel.as_mut() else {
            trace!("dropping data for unbound channel {channel_id}");
            return;
        };

        let was_connecting = channel.ready_state == RTCDataChannelState::Connecting;
        if dcep
            .handle_read(DataChannelMessage {
                association_handle: 0,
                stream_id,
                ppi,
                payload: BytesMut::from(&data[..]),
            })
            .is_err()
        {
            warn!("channel {channel_id}: dropping malformed message");
            return;
        }

        let mut replies = vec![];
        while let Some(msg) = dcep.poll_write() {
            replies.push(msg);
        }
        let mut reads = vec![];
        while let Some(msg) = dcep.poll_read() {
            reads.push(msg);
        }
        let now_open = dcep.is_open();
        let detached = channel.detached;

        if was_connecting && now_open {
            channel.ready_state = RTCDataChannelState::Open;
            if !channel.announced_open {
                channel.announced_open = true;
                self.events
                    .push_back(RTCPeerConnectionEvent::OnDataChannelOpen(channel_id));
            }
        }

        for msg in reads {
            let (is_string, data) = match msg.ppi {
                PayloadProtocolIdentifier::String => (true, msg.payload.freeze()),
                PayloadProtocolIdentifier::Binary => (false, msg.payload.freeze()),
                // one zero byte of payload, ignored
                PayloadProtocolIdentifier::StringEmpty => (true, Bytes::new()),
                PayloadProtocolIdentifier::BinaryEmpty => (false, Bytes::new()),
                other => {
                    trace!("channel {channel_id}: ignoring message with PPID {other:?}");
                    continue;
                }
            };
            if detached {
                if let Some(channel) = self.data_channels.get_mut(&channel_id) {
                    channel.detached_reads.push_back(data);
                }
            } else {
                self.events
                    .push_back(RTCPeerConnectionEvent::OnDataChannelMessage(
                        channel_id,
                        EventMessage { is_string, data },
                    ));
            }
        }

        if let Some((_, association)) = &mut self.sctp_association {
            for msg in replies {
                if let Ok(mut stream) = association.stream(stream_id) {
                    let _ = stream.write_sctp(&msg.payload.freeze(), msg.ppi);
                }
            }
        }
    }

    /// Handles a DCEP OPEN on a stream no local channel claimed.
    fn accept_remote_channel(
        &mut self,
        stream_id: u16,
        data: Bytes,
        ppi: PayloadProtocolIdentifier,
    ) {
        if ppi != PayloadProtocolIdentifier::Dcep {
            trace!("dropping non-DCEP data on unclaimed stream {stream_id}");
            return;
        }

        let dcep = match DataChannel::accept(
            DataChannelConfig::default(),
            0,
            stream_id,
            ppi,
            &data,
        ) {
            Ok(dcep) => dcep,
            Err(err) => {
                warn!("rejecting malformed DCEP OPEN on stream {stream_id}: {err}");
                return;
            }
        };

        let config = dcep.config().clone();
        let (unordered, reliability_type) = DataChannel::reliability_params(config.channel_type);
        let mut dcep = dcep;
        let mut replies = vec![];
        while let Some(msg) = dcep.poll_write() {
            replies.push(msg);
        }

        if let Some((_, association)) = &mut self.sctp_association {
            if let Ok(mut stream) = association.stream(stream_id) {
                let _ = stream.set_reliability_params(
                    unordered,
                    reliability_type,
                    config.reliability_parameter,
                );
                for msg in replies {
                    let _ = stream.write_sctp(&msg.payload.freeze(), msg.ppi);
                }
            }
        }

        let id = self.next_data_channel_id;
        self.next_data_channel_id += 1;

        let init = RTCDataChannelInit {
            ordered: !unordered,
            max_retransmits: (reliability_type == ReliabilityType::Rexmit)
                .then_some(config.reliability_parameter as u16),
            max_packet_life_time: (reliability_type == ReliabilityType::Timed)
                .then_some(config.reliability_parameter as u16),
            protocol: config.protocol.clone(),
            negotiated: None,
        };
        let mut channel = RTCDataChannelInternal::new(id, config.label.clone(), &init);
        channel.stream_id = Some(stream_id);
        channel.channel = Some(dcep);
        channel.ready_state = RTCDataChannelState::Open;
        channel.announced_open = true;

        debug!(
            "accepted remote data channel {id} ({}) on stream {stream_id}",
            config.label
        );
        self.data_channels.insert(id, channel);
        self.stream_to_channel.insert(stream_id, id);
        self.events
            .push_back(RTCPeerConnectionEvent::OnDataChannel(id));
        self.events
            .push_back(RTCPeerConnectionEvent::OnDataChannelOpen(id));
    }

    fn on_stream_reset(&mut self, stream_id: u16) {
        let Some(&channel_id) = self.stream_to_channel.get(&stream_id) else {
            return;
        };
        let should_reset_back = {
            let Some(channel) = self.data_channels.get_mut(&channel_id) else {
                return;
            };
            if channel.ready_state == RTCDataChannelState::Closed {
                false
            } else {
                channel.ready_state = RTCDataChannelState::Closed;
                self.events
                    .push_back(RTCPeerConnectionEvent::OnDataChannelClose(channel_id));
                true
            }
        };

        // when the peer resets its outgoing stream, we reset ours too
        // (RFC 8831 §6.7)
        if should_reset_back {
            if let Some((_, association)) = &mut self.sctp_association {
                if let Ok(mut stream) = association.stream(stream_id) {
                    let _ = stream.stop();
                }
            }
        }
    }

    fn close_all_channels(&mut self) {
        let ids: Vec<RTCDataChannelId> = self.data_channels.keys().cloned().collect();
        for id in ids {
            let newly_closed = {
                let channel = self.data_channels.get_mut(&id).expect("known id");
                if channel.ready_state == RTCDataChannelState::Closed {
                    false
                } else {
                    channel.ready_state = RTCDataChannelState::Closed;
                    true
                }
            };
            if newly_closed {
                self.events
                    .push_back(RTCPeerConnectionEvent::OnDataChannelClose(id));
            }
        }
    }

    /// Finishes `closing` channels whose send queue drained.
    fn process_pending_closes(&mut self) {
        let closing: Vec<(RTCDataChannelId, u16)> = self
            .data_channels
            .iter()
            .filter(|(_, c)| c.ready_state == RTCDataChannelState::Closing)
            .filter_map(|(id, c)| c.stream_id.map(|s| (*id, s)))
            .collect();

        for (id, stream_id) in closing {
            let drained = {
                let Some((_, association)) = &mut self.sctp_association else {
                    continue;
                };
                association
                    .stream(stream_id)
                    .map(|s| s.buffered_amount() == 0)
                    .unwrap_or(true)
            };
            if !drained {
                continue;
            }

            if let Some((_, association)) = &mut self.sctp_association {
                if let Ok(mut stream) = association.stream(stream_id) {
                    let _ = stream.stop();
                }
            }
            if let Some(channel) = self.data_channels.get_mut(&id) {
                channel.ready_state = RTCDataChannelState::Closed;
            }
            self.events
                .push_back(RTCPeerConnectionEvent::OnDataChannelClose(id));
        }
    }

    // ---- data channel operations (called by the handles) -------------

    pub(crate) fn data_channel_internal(
        &self,
        id: RTCDataChannelId,
    ) -> Option<&RTCDataChannelInternal> {
        self.data_channels.get(&id)
    }

    pub(crate) fn data_channel_send(
        &mut self,
        id: RTCDataChannelId,
        data: Bytes,
        is_string: bool,
    ) -> Result<usize> {
        if data.len() > self.setting_engine.get_sctp_max_message_size() as usize {
            return Err(Error::ErrOutboundPacketTooLarge);
        }

        let (stream_id, buffered) = {
            let channel = self
                .data_channels
                .get(&id)
                .ok_or(Error::ErrDataChannelNotExisted)?;
            if channel.ready_state != RTCDataChannelState::Open {
                return Err(Error::ErrDataChannelClosed);
            }
            let stream_id = channel.stream_id.ok_or(Error::ErrDataChannelClosed)?;
            (stream_id, self.stream_buffered_amount(stream_id))
        };

        if let Some(limit) = self.setting_engine.buffered_amount_limit {
            if buffered + data.len() > limit {
                return Err(Error::ErrBufferedAmountLimitExceeded);
            }
        }

        let wire = DataChannel::wire_message(is_string, BytesMut::from(&data[..]));

        // run the message through the channel for accounting, then hand the
        // bytes to the stream
        let mut queued = vec![];
        {
            let channel = self
                .data_channels
                .get_mut(&id)
                .ok_or(Error::ErrDataChannelNotExisted)?;
            let dcep = channel
                .channel
                .as_mut()
                .ok_or(Error::ErrDataChannelClosed)?;
            dcep.handle_write(DataChannelMessage {
                stream_id,
                ..wire
            })?;
            while let Some(msg) = dcep.poll_write() {
                queued.push(msg);
            }
        }

        let Some((_, association)) = &mut self.sctp_association else {
            return Err(Error::ErrDataChannelClosed);
        };
        let mut stream = association.stream(stream_id)?;
        for msg in queued {
            stream.write_sctp(&msg.payload.freeze(), msg.ppi)?;
        }

        Ok(data.len())
    }

    pub(crate) fn data_channel_buffered_amount(&self, id: RTCDataChannelId) -> usize {
        self.data_channels
            .get(&id)
            .and_then(|c| c.stream_id)
            .map(|stream_id| self.stream_buffered_amount(stream_id))
            .unwrap_or(0)
    }

    fn stream_buffered_amount(&self, stream_id: u16) -> usize {
        self.sctp_association
            .as_ref()
            .map(|(_, a)| a.buffered_amount(stream_id))
            .unwrap_or(0)
    }

    pub(crate) fn data_channel_set_buffered_amount_low_threshold(
        &mut self,
        id: RTCDataChannelId,
        threshold: usize,
    ) {
        let stream_id = {
            let Some(channel) = self.data_channels.get_mut(&id) else {
                return;
            };
            channel.buffered_amount_low_threshold = threshold;
            channel.stream_id
        };
        if let (Some(stream_id), Some((_, association))) =
            (stream_id, &mut self.sctp_association)
        {
            if let Ok(mut stream) = association.stream(stream_id) {
                stream.set_buffered_amount_low_threshold(threshold);
            }
        }
    }

    pub(crate) fn data_channel_close(&mut self, id: RTCDataChannelId) -> Result<()> {
        let state = self
            .data_channels
            .get(&id)
            .ok_or(Error::ErrDataChannelNotExisted)?
            .ready_state;

        match state {
            RTCDataChannelState::Closed | RTCDataChannelState::Closing => Ok(()),
            RTCDataChannelState::Connecting => {
                if let Some(channel) = self.data_channels.get_mut(&id) {
                    channel.ready_state = RTCDataChannelState::Closed;
                }
                self.events
                    .push_back(RTCPeerConnectionEvent::OnDataChannelClose(id));
                Ok(())
            }
            _ => {
                if let Some(channel) = self.data_channels.get_mut(&id) {
                    channel.ready_state = RTCDataChannelState::Closing;
                }
                // the queue may already be empty, finish immediately then
                self.process_pending_closes();
                Ok(())
            }
        }
    }

    pub(crate) fn data_channel_detach(&mut self, id: RTCDataChannelId) -> Result<()> {
        if !self.setting_engine.detach_data_channels {
            return Err(Error::ErrDetachNotEnabled);
        }
        let channel = self
            .data_channels
            .get_mut(&id)
            .ok_or(Error::ErrDataChannelNotExisted)?;
        if channel.ready_state != RTCDataChannelState::Open {
            return Err(Error::ErrDetachBeforeOpened);
        }
        channel.detached = true;
        Ok(())
    }

    pub(crate) fn data_channel_detached_read(&mut self, id: RTCDataChannelId) -> Option<Bytes> {
        self.data_channels
            .get_mut(&id)
            .and_then(|c| c.detached_reads.pop_front())
    }
}

fn track_kind(track: &LocalTrack) -> RTPCodecType {
    match track {
        LocalTrack::Sample(t) => t.kind(),
        LocalTrack::Rtp(t) => t.kind(),
    }
}
