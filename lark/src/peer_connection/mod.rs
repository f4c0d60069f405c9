pub mod configuration;
pub mod dtls_role;
pub mod event;
pub(crate) mod internal;
pub mod sdp;
pub mod state;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use log::debug;

use crate::api::media_engine::MediaEngine;
use crate::api::setting_engine::SettingEngine;
use crate::api::API;
use crate::data_channel::internal::RTCDataChannelInternal;
use crate::data_channel::state::RTCDataChannelState;
use crate::data_channel::{RTCDataChannel, RTCDataChannelId, RTCDataChannelInit};
use crate::peer_connection::configuration::offer_answer_options::{
    RTCAnswerOptions, RTCOfferOptions,
};
use crate::peer_connection::configuration::RTCConfiguration;
use crate::peer_connection::dtls_role::DTLSRole;
use crate::peer_connection::event::RTCPeerConnectionEvent;
use crate::peer_connection::sdp::sdp_type::RTCSdpType;
use crate::peer_connection::sdp::session_description::RTCSessionDescription;
use crate::peer_connection::sdp::{MediaDescription, SessionSdp, MEDIA_SECTION_APPLICATION};
use crate::peer_connection::state::peer_connection_state::aggregate_connection_state;
use crate::peer_connection::state::signaling_state::{check_next_signaling_state, StateChangeOp};
use crate::peer_connection::state::{
    RTCDtlsTransportState, RTCIceConnectionState, RTCPeerConnectionState, RTCSignalingState,
};
use crate::rtp_transceiver::direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::rtp_codec::{RTCRtpCodecParameters, RTPCodecType};
use crate::rtp_transceiver::rtp_sender::{LocalTrack, RTCRtpSender, RTCRtpSenderInternal};
use crate::rtp_transceiver::{RTCRtpTransceiver, TransceiverId};
use crate::track::track_local::TrackLocalStaticSample;
use crate::track::track_remote::{TrackRemote, TrackRemoteId};
use interceptor::Interceptor;
use shared::error::{Error, Result};

pub(crate) const DEFAULT_SCTP_PORT: u16 = 5000;

const RUNES_ALPHA: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generates a random alphabetic string of the requested length.
pub(crate) fn math_rand_alpha(n: usize) -> String {
    (0..n)
        .map(|_| {
            let idx = rand::random::<u32>() as usize % RUNES_ALPHA.len();
            RUNES_ALPHA[idx] as char
        })
        .collect()
}

fn random_fingerprint() -> String {
    let digest: [u8; 32] = rand::random();
    let hex: Vec<String> = digest.iter().map(|b| format!("{b:02X}")).collect();
    format!("sha-256 {}", hex.join(":"))
}

/// A WebRTC connection between two endpoints: the session-description state
/// machine plus the data-channel and media plumbing hanging off it.
///
/// The connection performs no I/O and never reads the clock. The owner
/// feeds it decrypted packets from the secure transports
/// ([`handle_dtls_read`](RTCPeerConnection::handle_dtls_read),
/// [`handle_srtp_read`](RTCPeerConnection::handle_srtp_read)), transport
/// state changes, and time; it drains outbound packets and a single ordered
/// event stream.
pub struct RTCPeerConnection<I: Interceptor = crate::api::DefaultInterceptorChain> {
    pub(crate) configuration: RTCConfiguration,
    pub(crate) setting_engine: Arc<SettingEngine>,
    pub(crate) media_engine: MediaEngine,

    pub(crate) signaling_state: RTCSignalingState,
    pub(crate) ice_connection_state: RTCIceConnectionState,
    pub(crate) dtls_state: RTCDtlsTransportState,
    pub(crate) peer_connection_state: RTCPeerConnectionState,
    pub(crate) is_closed: bool,
    pub(crate) transport_failed: bool,
    pub(crate) is_negotiation_needed: bool,

    pub(crate) current_local_description: Option<RTCSessionDescription>,
    pub(crate) pending_local_description: Option<RTCSessionDescription>,
    pub(crate) current_remote_description: Option<RTCSessionDescription>,
    pub(crate) pending_remote_description: Option<RTCSessionDescription>,
    pub(crate) last_offer: String,
    pub(crate) last_answer: String,
    /// the last known greater mid value, so reused sections get fresh mids
    pub(crate) greater_mid: isize,

    pub(crate) ice_ufrag: String,
    pub(crate) ice_pwd: String,
    pub(crate) dtls_fingerprint: String,
    pub(crate) dtls_role: DTLSRole,

    pub(crate) transceivers: Vec<RTCRtpTransceiver>,
    pub(crate) remote_tracks: Vec<TrackRemote>,
    /// Codecs the remote announced, for demuxing inbound payload types.
    pub(crate) negotiated_codecs: Vec<RTCRtpCodecParameters>,
    /// SSRC stamped on locally originated feedback packets.
    pub(crate) rtcp_ssrc: u32,

    pub(crate) chain: I,

    pub(crate) sctp_endpoint: sctp::Endpoint,
    pub(crate) sctp_association: Option<(sctp::AssociationHandle, sctp::Association)>,
    pub(crate) sctp_connected: bool,
    pub(crate) has_remote_data_section: bool,
    pub(crate) data_mid: Option<String>,

    pub(crate) data_channels: BTreeMap<RTCDataChannelId, RTCDataChannelInternal>,
    pub(crate) next_data_channel_id: RTCDataChannelId,
    pub(crate) next_stream_id: Option<u16>,
    pub(crate) stream_to_channel: HashMap<u16, RTCDataChannelId>,

    pub(crate) events: VecDeque<RTCPeerConnectionEvent>,
    pub(crate) dtls_out: VecDeque<Bytes>,
    pub(crate) srtp_out: VecDeque<Bytes>,
}

impl<I: Interceptor> RTCPeerConnection<I> {
    /// Creates a connection from an [`API`]; see
    /// [`API::new_peer_connection`].
    pub(crate) fn new(api: &API<I>, configuration: RTCConfiguration) -> Result<Self> {
        let sctp_endpoint = sctp::Endpoint::new(
            Arc::new(
                sctp::EndpointConfig::new()
                    .with_max_payload_size(api.setting_engine.get_send_mtu() as u32),
            ),
            Some(Arc::new(sctp::ServerConfig {
                transport: Arc::new(sctp::TransportConfig::default().with_max_message_size(
                    api.setting_engine.get_sctp_max_message_size(),
                )),
                ..Default::default()
            })),
        );

        Ok(RTCPeerConnection {
            configuration,
            setting_engine: api.setting_engine.clone(),
            media_engine: api.media_engine.clone(),

            signaling_state: RTCSignalingState::Stable,
            ice_connection_state: RTCIceConnectionState::New,
            dtls_state: RTCDtlsTransportState::New,
            peer_connection_state: RTCPeerConnectionState::New,
            is_closed: false,
            transport_failed: false,
            is_negotiation_needed: false,

            current_local_description: None,
            pending_local_description: None,
            current_remote_description: None,
            pending_remote_description: None,
            last_offer: String::new(),
            last_answer: String::new(),
            greater_mid: -1,

            ice_ufrag: math_rand_alpha(16),
            ice_pwd: math_rand_alpha(32),
            dtls_fingerprint: random_fingerprint(),
            dtls_role: DTLSRole::Unspecified,

            transceivers: vec![],
            remote_tracks: vec![],
            negotiated_codecs: vec![],
            rtcp_ssrc: rand::random(),

            chain: (api.interceptor_factory)(),

            sctp_endpoint,
            sctp_association: None,
            sctp_connected: false,
            has_remote_data_section: false,
            data_mid: None,

            data_channels: BTreeMap::new(),
            next_data_channel_id: 0,
            next_stream_id: None,
            stream_to_channel: HashMap::new(),

            events: VecDeque::new(),
            dtls_out: VecDeque::new(),
            srtp_out: VecDeque::new(),
        })
    }

    // ---- observation --------------------------------------------------

    pub fn signaling_state(&self) -> RTCSignalingState {
        self.signaling_state
    }

    pub fn ice_connection_state(&self) -> RTCIceConnectionState {
        self.ice_connection_state
    }

    /// The aggregate state derived from the ICE and DTLS transport states.
    pub fn connection_state(&self) -> RTCPeerConnectionState {
        self.peer_connection_state
    }

    /// The negotiated DTLS role, once known. Data channel stream ids take
    /// even parity for the client role, odd for the server role.
    pub fn dtls_role(&self) -> DTLSRole {
        self.dtls_role
    }

    /// ICE credentials the external agent must use for this session.
    pub fn ice_credentials(&self) -> (&str, &str) {
        (&self.ice_ufrag, &self.ice_pwd)
    }

    pub fn get_configuration(&self) -> &RTCConfiguration {
        &self.configuration
    }

    /// The local description currently in force: the pending one while
    /// negotiation is in flight, else the current one.
    pub fn local_description(&self) -> Option<&RTCSessionDescription> {
        self.pending_local_description
            .as_ref()
            .or(self.current_local_description.as_ref())
    }

    pub fn remote_description(&self) -> Option<&RTCSessionDescription> {
        self.pending_remote_description
            .as_ref()
            .or(self.current_remote_description.as_ref())
    }

    /// Returns the next queued event.
    pub fn poll_event(&mut self) -> Option<RTCPeerConnectionEvent> {
        self.events.pop_front()
    }

    // ---- negotiation --------------------------------------------------

    /// Builds an offer covering every transceiver and the data-channel
    /// section when channels exist. Media sections come first in
    /// transceiver insertion order, the application section last.
    pub fn create_offer(
        &mut self,
        options: Option<RTCOfferOptions>,
    ) -> Result<RTCSessionDescription> {
        if self.is_closed {
            return Err(Error::ErrConnectionClosed);
        }

        if options.map(|o| o.ice_restart).unwrap_or(false) {
            self.ice_ufrag = math_rand_alpha(16);
            self.ice_pwd = math_rand_alpha(32);
        }

        // never-negotiated transceivers get their mid now, deterministically
        // in insertion order
        for transceiver in &mut self.transceivers {
            if transceiver.mid.is_none() {
                self.greater_mid += 1;
                transceiver.mid = Some(self.greater_mid.to_string());
            }
        }
        let needs_data_section =
            !self.data_channels.is_empty() || self.has_remote_data_section;
        if needs_data_section && self.data_mid.is_none() {
            self.greater_mid += 1;
            self.data_mid = Some(self.greater_mid.to_string());
        }

        let session = self.build_session_sdp(DTLSRole::Auto)?;
        let offer = RTCSessionDescription::offer(session.marshal());
        self.last_offer = offer.sdp.clone();
        Ok(offer)
    }

    /// Builds an answer replying to the pending remote offer section by
    /// section: the first mutually supported codec wins and directions are
    /// intersected.
    pub fn create_answer(
        &mut self,
        _options: Option<RTCAnswerOptions>,
    ) -> Result<RTCSessionDescription> {
        if self.is_closed {
            return Err(Error::ErrConnectionClosed);
        }
        let remote = match &self.pending_remote_description {
            Some(desc) if desc.sdp_type == RTCSdpType::Offer => desc.sdp.clone(),
            _ => return Err(Error::ErrNoRemoteDescription),
        };
        let remote_session = SessionSdp::unmarshal(&remote)?;

        // the answerer takes the active role and with it the DTLS client
        // side (RFC 8842); the client also initiates the SCTP association
        let mut media = vec![];
        for remote_media in &remote_session.media {
            if remote_media.kind == MEDIA_SECTION_APPLICATION {
                media.push(MediaDescription {
                    kind: MEDIA_SECTION_APPLICATION.to_string(),
                    mid: remote_media.mid.clone(),
                    sctp_port: Some(DEFAULT_SCTP_PORT),
                    max_message_size: Some(self.setting_engine.get_sctp_max_message_size()),
                    setup: Some(DTLSRole::Client.to_setup_value().to_string()),
                    ice_ufrag: Some(self.ice_ufrag.clone()),
                    ice_pwd: Some(self.ice_pwd.clone()),
                    fingerprint: Some(self.dtls_fingerprint.clone()),
                    ..Default::default()
                });
                continue;
            }

            let kind = RTPCodecType::from(remote_media.kind.as_str());
            let transceiver = self
                .transceivers
                .iter()
                .find(|t| t.mid.as_deref() == Some(remote_media.mid.as_str()));
            let local_direction = transceiver
                .map(|t| t.direction)
                .unwrap_or(RTCRtpTransceiverDirection::Recvonly);

            // first mutually supported codec, echoing the remote payload type
            let mut codecs = vec![];
            for remote_codec in &remote_media.codecs {
                if let Some(local) = self
                    .media_engine
                    .match_remote_codec(&remote_codec.capability, kind)
                {
                    codecs.push(RTCRtpCodecParameters {
                        capability: local.capability.clone(),
                        payload_type: remote_codec.payload_type,
                    });
                    break;
                }
            }
            if codecs.is_empty() {
                // reply with an inactive section rather than dropping it
                media.push(MediaDescription {
                    kind: remote_media.kind.clone(),
                    mid: remote_media.mid.clone(),
                    direction: RTCRtpTransceiverDirection::Inactive,
                    setup: Some(DTLSRole::Client.to_setup_value().to_string()),
                    ice_ufrag: Some(self.ice_ufrag.clone()),
                    ice_pwd: Some(self.ice_pwd.clone()),
                    fingerprint: Some(self.dtls_fingerprint.clone()),
                    ..Default::default()
                });
                continue;
            }

            let direction = local_direction.intersect(remote_media.direction);

            // only extensions both sides know, under the remote's ids
            let extmaps: Vec<(u16, String)> = remote_media
                .extmaps
                .iter()
                .filter(|(_, uri)| self.media_engine.header_extension_id(uri).is_some())
                .cloned()
                .collect();

            let (ssrcs, msid) = self.sender_ssrc_and_msid(remote_media.mid.as_str());

            media.push(MediaDescription {
                kind: remote_media.kind.clone(),
                mid: remote_media.mid.clone(),
                direction,
                codecs,
                extmaps,
                ssrcs,
                msid,
                setup: Some(DTLSRole::Client.to_setup_value().to_string()),
                ice_ufrag: Some(self.ice_ufrag.clone()),
                ice_pwd: Some(self.ice_pwd.clone()),
                fingerprint: Some(self.dtls_fingerprint.clone()),
                ..Default::default()
            });
        }

        let session = SessionSdp {
            session_id: rand::random::<u32>() as u64,
            media,
        };
        let answer = RTCSessionDescription::answer(session.marshal());
        self.last_answer = answer.sdp.clone();
        Ok(answer)
    }

    /// Applies a local description, advancing the signaling state.
    pub fn set_local_description(&mut self, desc: RTCSessionDescription) -> Result<()> {
        if self.is_closed {
            return Err(Error::ErrConnectionClosed);
        }

        let (next, op) = match desc.sdp_type {
            RTCSdpType::Offer => (RTCSignalingState::HaveLocalOffer, StateChangeOp::SetLocal),
            RTCSdpType::Answer => (RTCSignalingState::Stable, StateChangeOp::SetLocal),
            RTCSdpType::Pranswer => (
                RTCSignalingState::HaveLocalPranswer,
                StateChangeOp::SetLocal,
            ),
            RTCSdpType::Rollback => (RTCSignalingState::Stable, StateChangeOp::SetLocal),
            RTCSdpType::Unspecified => {
                return Err(Error::ErrSignalingStateProposedTransitionInvalid(
                    "unspecified sdp type".to_string(),
                ))
            }
        };
        let new_state =
            check_next_signaling_state(self.signaling_state, next, op, desc.sdp_type)?;

        match desc.sdp_type {
            RTCSdpType::Offer => {
                self.pending_local_description = Some(desc);
            }
            RTCSdpType::Pranswer => {
                self.pending_local_description = Some(desc);
            }
            RTCSdpType::Answer => {
                self.current_local_description = Some(desc);
                self.current_remote_description = self.pending_remote_description.take();
                self.pending_local_description = None;
            }
            RTCSdpType::Rollback => {
                self.pending_local_description = None;
            }
            RTCSdpType::Unspecified => unreachable!(),
        }

        self.set_signaling_state(new_state);
        if new_state == RTCSignalingState::Stable {
            self.apply_negotiated()?;
        }
        Ok(())
    }

    /// Applies a remote description, advancing the signaling state.
    pub fn set_remote_description(&mut self, desc: RTCSessionDescription) -> Result<()> {
        if self.is_closed {
            return Err(Error::ErrConnectionClosed);
        }

        let (next, op) = match desc.sdp_type {
            RTCSdpType::Offer => (RTCSignalingState::HaveRemoteOffer, StateChangeOp::SetRemote),
            RTCSdpType::Answer => (RTCSignalingState::Stable, StateChangeOp::SetRemote),
            RTCSdpType::Pranswer => (
                RTCSignalingState::HaveRemotePranswer,
                StateChangeOp::SetRemote,
            ),
            RTCSdpType::Rollback => (RTCSignalingState::Stable, StateChangeOp::SetRemote),
            RTCSdpType::Unspecified => {
                return Err(Error::ErrSignalingStateProposedTransitionInvalid(
                    "unspecified sdp type".to_string(),
                ))
            }
        };
        let new_state =
            check_next_signaling_state(self.signaling_state, next, op, desc.sdp_type)?;

        if desc.sdp_type == RTCSdpType::Offer || desc.sdp_type == RTCSdpType::Answer {
            let session = SessionSdp::unmarshal(&desc.sdp)?;
            self.ingest_remote_session(&session)?;
        }

        match desc.sdp_type {
            RTCSdpType::Offer | RTCSdpType::Pranswer => {
                self.pending_remote_description = Some(desc);
            }
            RTCSdpType::Answer => {
                self.current_remote_description = Some(desc);
                self.current_local_description = self.pending_local_description.take();
                self.pending_remote_description = None;
            }
            RTCSdpType::Rollback => {
                self.pending_remote_description = None;
            }
            RTCSdpType::Unspecified => unreachable!(),
        }

        self.set_signaling_state(new_state);
        if new_state == RTCSignalingState::Stable {
            self.apply_negotiated()?;
        }
        Ok(())
    }

    /// Flags the connection for renegotiation and regenerates ICE
    /// credentials on the next offer. Data channels keep their state across
    /// the restart; traffic buffered meanwhile flushes afterwards.
    pub fn restart_ice(&mut self) -> Result<()> {
        if self.is_closed {
            return Err(Error::ErrConnectionClosed);
        }
        self.ice_ufrag = math_rand_alpha(16);
        self.ice_pwd = math_rand_alpha(32);
        self.trigger_negotiation_needed();
        Ok(())
    }

    // ---- transceivers and tracks -------------------------------------

    /// Adds a transceiver of the given kind. Its mid is assigned at the
    /// next offer.
    pub fn add_transceiver_from_kind(
        &mut self,
        kind: RTPCodecType,
        direction: RTCRtpTransceiverDirection,
    ) -> Result<TransceiverId> {
        if self.is_closed {
            return Err(Error::ErrConnectionClosed);
        }
        self.transceivers
            .push(RTCRtpTransceiver::new(kind, direction));
        self.trigger_negotiation_needed();
        Ok(self.transceivers.len() - 1)
    }

    /// Adds a local track wrapped in a sendrecv transceiver.
    pub fn add_track(&mut self, track: TrackLocalStaticSample) -> Result<TransceiverId> {
        if self.is_closed {
            return Err(Error::ErrConnectionClosed);
        }
        let kind = track.kind();
        if kind == RTPCodecType::Unspecified {
            return Err(Error::ErrCodecNotFound);
        }

        let mut transceiver =
            RTCRtpTransceiver::new(kind, RTCRtpTransceiverDirection::Sendrecv);
        transceiver.sender = Some(RTCRtpSenderInternal::new(LocalTrack::Sample(track)));
        self.transceivers.push(transceiver);
        self.trigger_negotiation_needed();
        Ok(self.transceivers.len() - 1)
    }

    /// Adds a local track fed with pre-packetized RTP, wrapped in a
    /// sendrecv transceiver.
    pub fn add_track_rtp(
        &mut self,
        track: crate::track::track_local::TrackLocalStaticRTP,
    ) -> Result<TransceiverId> {
        if self.is_closed {
            return Err(Error::ErrConnectionClosed);
        }
        let kind = track.kind();
        if kind == RTPCodecType::Unspecified {
            return Err(Error::ErrCodecNotFound);
        }

        let mut transceiver =
            RTCRtpTransceiver::new(kind, RTCRtpTransceiverDirection::Sendrecv);
        transceiver.sender = Some(RTCRtpSenderInternal::new(LocalTrack::Rtp(track)));
        self.transceivers.push(transceiver);
        self.trigger_negotiation_needed();
        Ok(self.transceivers.len() - 1)
    }

    /// Returns a handle to the sending half of a transceiver.
    pub fn sender(&mut self, transceiver: TransceiverId) -> Result<RTCRtpSender<'_, I>> {
        if transceiver >= self.transceivers.len()
            || self.transceivers[transceiver].sender.is_none()
        {
            return Err(Error::ErrSenderNotCreatedByConnection);
        }
        Ok(RTCRtpSender {
            peer_connection: self,
            transceiver,
        })
    }

    pub fn transceivers(&self) -> &[RTCRtpTransceiver] {
        &self.transceivers
    }

    /// Borrows a remote track materialized by the demuxer.
    pub fn remote_track(&mut self, id: TrackRemoteId) -> Option<&mut TrackRemote> {
        self.remote_tracks.get_mut(id as usize)
    }

    // ---- data channels -----------------------------------------------

    /// Creates a data channel. The channel stays `connecting` until the
    /// SCTP association is up and the opening handshake finishes.
    pub fn create_data_channel(
        &mut self,
        label: &str,
        init: Option<RTCDataChannelInit>,
    ) -> Result<RTCDataChannelId> {
        if self.is_closed {
            return Err(Error::ErrConnectionClosed);
        }
        let init = init.unwrap_or_default();

        // https://w3c.github.io/webrtc-pc/#peer-to-peer-data-api
        if label.len() > 65535 {
            return Err(Error::ErrStringSizeLimit);
        }
        if init.protocol.len() > 65535 {
            return Err(Error::ErrProtocolTooLarge);
        }
        if init.max_packet_life_time.is_some() && init.max_retransmits.is_some() {
            return Err(Error::ErrRetransmitsOrPacketLifeTime);
        }

        let id = self.next_data_channel_id;
        self.next_data_channel_id += 1;
        let channel = RTCDataChannelInternal::new(id, label.to_string(), &init);
        if let Some(stream_id) = channel.stream_id {
            self.stream_to_channel.insert(stream_id, id);
        }
        self.data_channels.insert(id, channel);

        if self.sctp_connected {
            self.open_pending_channels();
        } else {
            self.trigger_negotiation_needed();
        }
        debug!("data channel {id} ({label}) created");
        Ok(id)
    }

    /// Returns a handle to a data channel.
    pub fn data_channel(&mut self, id: RTCDataChannelId) -> Result<RTCDataChannel<'_, I>> {
        if !self.data_channels.contains_key(&id) {
            return Err(Error::ErrDataChannelNotExisted);
        }
        Ok(RTCDataChannel {
            peer_connection: self,
            id,
        })
    }

    /// Re-acquires the raw handle of a channel detached earlier.
    pub fn detached_data_channel(
        &mut self,
        id: RTCDataChannelId,
    ) -> Result<crate::data_channel::DetachedDataChannel<'_, I>> {
        let channel = self
            .data_channels
            .get(&id)
            .ok_or(Error::ErrDataChannelNotExisted)?;
        if !channel.detached {
            return Err(Error::ErrDetachNotEnabled);
        }
        Ok(crate::data_channel::DetachedDataChannel {
            peer_connection: self,
            id,
        })
    }

    // ---- lifecycle ----------------------------------------------------

    /// Closes the connection, cascading to every channel and transceiver.
    /// The owner observes a final `closed` connection state exactly once.
    pub fn close(&mut self, now: Instant) -> Result<()> {
        if self.is_closed {
            return Ok(());
        }
        self.is_closed = true;

        let ids: Vec<RTCDataChannelId> = self.data_channels.keys().cloned().collect();
        for id in ids {
            let was_open = {
                let channel = self.data_channels.get_mut(&id).expect("known id");
                let was_open = channel.ready_state != RTCDataChannelState::Closed;
                channel.ready_state = RTCDataChannelState::Closed;
                was_open
            };
            if was_open {
                self.events
                    .push_back(RTCPeerConnectionEvent::OnDataChannelClose(id));
            }
        }

        if let Some((_, association)) = &mut self.sctp_association {
            let _ = association.shutdown(now);
        }
        self.pump_sctp(now);

        for transceiver in &mut self.transceivers {
            transceiver.stopped = true;
            transceiver.direction = RTCRtpTransceiverDirection::Stopped;
        }

        let _ = self.chain.close();

        self.set_signaling_state(RTCSignalingState::Closed);
        self.update_connection_state();
        Ok(())
    }

    // ---- internal: signaling plumbing --------------------------------

    fn set_signaling_state(&mut self, state: RTCSignalingState) {
        if self.signaling_state == state {
            return;
        }
        self.signaling_state = state;
        self.events
            .push_back(RTCPeerConnectionEvent::OnSignalingStateChange(state));

        if state == RTCSignalingState::Stable {
            self.is_negotiation_needed = false;
        }
    }

    pub(crate) fn trigger_negotiation_needed(&mut self) {
        if self.is_closed || self.is_negotiation_needed {
            return;
        }
        self.is_negotiation_needed = true;
        self.events
            .push_back(RTCPeerConnectionEvent::OnNegotiationNeeded);
    }

    pub(crate) fn update_connection_state(&mut self) {
        let ice = if self.transport_failed {
            RTCIceConnectionState::Failed
        } else {
            self.ice_connection_state
        };
        let state = aggregate_connection_state(self.is_closed, ice, self.dtls_state);
        if state != self.peer_connection_state {
            self.peer_connection_state = state;
            self.events
                .push_back(RTCPeerConnectionEvent::OnConnectionStateChange(state));
        }
    }

    /// Builds the local session from the current transceiver and channel
    /// sets: media sections in insertion order, the data section last.
    fn build_session_sdp(&self, setup: DTLSRole) -> Result<SessionSdp> {
        let mut media = vec![];

        for transceiver in &self.transceivers {
            let Some(mid) = transceiver.mid.clone() else {
                continue;
            };
            let codecs = self.media_engine.codecs(transceiver.kind).to_vec();
            let extmaps: Vec<(u16, String)> = self
                .media_engine
                .header_extensions()
                .iter()
                .map(|e| (e.id, e.uri.clone()))
                .collect();

            let (ssrcs, msid) = self.sender_ssrc_and_msid(mid.as_str());

            media.push(MediaDescription {
                kind: transceiver.kind.to_string(),
                mid,
                direction: transceiver.direction,
                codecs,
                extmaps,
                ssrcs,
                msid,
                setup: Some(setup.to_setup_value().to_string()),
                ice_ufrag: Some(self.ice_ufrag.clone()),
                ice_pwd: Some(self.ice_pwd.clone()),
                fingerprint: Some(self.dtls_fingerprint.clone()),
                ..Default::default()
            });
        }

        if let Some(data_mid) = &self.data_mid {
            media.push(MediaDescription {
                kind: MEDIA_SECTION_APPLICATION.to_string(),
                mid: data_mid.clone(),
                sctp_port: Some(DEFAULT_SCTP_PORT),
                max_message_size: Some(self.setting_engine.get_sctp_max_message_size()),
                setup: Some(setup.to_setup_value().to_string()),
                ice_ufrag: Some(self.ice_ufrag.clone()),
                ice_pwd: Some(self.ice_pwd.clone()),
                fingerprint: Some(self.dtls_fingerprint.clone()),
                ..Default::default()
            });
        }

        Ok(SessionSdp {
            session_id: rand::random::<u32>() as u64,
            media,
        })
    }

    fn sender_ssrc_and_msid(&self, mid: &str) -> (Vec<u32>, Option<String>) {
        for transceiver in &self.transceivers {
            if transceiver.mid.as_deref() != Some(mid) {
                continue;
            }
            if let Some(sender) = &transceiver.sender {
                return (
                    vec![sender.track.ssrc()],
                    Some(format!(
                        "{} {}",
                        sender.track.stream_id(),
                        sender.track.track_id()
                    )),
                );
            }
        }
        (vec![], None)
    }

    /// Folds a remote session into local state: unseen mids become
    /// transceivers, the data section is noted, simulcast rids recorded.
    fn ingest_remote_session(&mut self, session: &SessionSdp) -> Result<()> {
        for remote_media in &session.media {
            if remote_media.kind == MEDIA_SECTION_APPLICATION {
                self.has_remote_data_section = true;
                if self.data_mid.is_none() {
                    self.data_mid = Some(remote_media.mid.clone());
                }
                continue;
            }

            let kind = RTPCodecType::from(remote_media.kind.as_str());
            let existing = self
                .transceivers
                .iter()
                .position(|t| t.mid.as_deref() == Some(remote_media.mid.as_str()));

            if let Some(index) = existing {
                self.transceivers[index].receiver.rids = remote_media.rids.clone();
            } else {
                // try to satisfy the section with an unassociated local
                // transceiver of the same kind first
                let slot = self
                    .transceivers
                    .iter()
                    .position(|t| t.mid.is_none() && t.kind == kind && !t.stopped);
                if let Some(index) = slot {
                    self.transceivers[index].mid = Some(remote_media.mid.clone());
                    self.transceivers[index].receiver.rids = remote_media.rids.clone();
                } else {
                    let mut transceiver =
                        RTCRtpTransceiver::new(kind, remote_media.direction.reverse());
                    transceiver.mid = Some(remote_media.mid.clone());
                    transceiver.receiver.rids = remote_media.rids.clone();
                    self.transceivers.push(transceiver);
                }
            }

            if let Ok(mid_num) = remote_media.mid.parse::<isize>() {
                if mid_num > self.greater_mid {
                    self.greater_mid = mid_num;
                }
            }
        }
        Ok(())
    }

    /// Runs once an offer/answer pair is in force: resolves the DTLS role,
    /// fixes codecs and directions, binds local tracks and the interceptor
    /// chain.
    fn apply_negotiated(&mut self) -> Result<()> {
        let (Some(local), Some(remote)) = (
            self.current_local_description.clone(),
            self.current_remote_description.clone(),
        ) else {
            return Ok(());
        };

        let local_session = SessionSdp::unmarshal(&local.sdp)?;
        let remote_session = SessionSdp::unmarshal(&remote.sdp)?;

        // remember every codec the remote announced so the demuxer can
        // resolve inbound payload types
        self.negotiated_codecs.clear();
        for media in &remote_session.media {
            for codec in &media.codecs {
                if codec.capability.clock_rate > 0 {
                    self.negotiated_codecs.push(codec.clone());
                }
            }
        }

        // resolve the DTLS role from the answer's setup attribute
        let answer_session = if local.sdp_type == RTCSdpType::Answer {
            &local_session
        } else {
            &remote_session
        };
        if let Some(setup) = answer_session
            .media
            .first()
            .and_then(|m| m.setup.as_deref())
        {
            let answer_role = DTLSRole::from_setup_value(setup);
            self.dtls_role = if local.sdp_type == RTCSdpType::Answer {
                answer_role
            } else {
                match answer_role {
                    DTLSRole::Client => DTLSRole::Server,
                    DTLSRole::Server => DTLSRole::Client,
                    other => other,
                }
            };
            // RFC 8832: the DTLS client owns even stream ids
            if self.next_stream_id.is_none() {
                self.next_stream_id = Some(match self.dtls_role {
                    DTLSRole::Client => 0,
                    _ => 1,
                });
            }
        }

        // settle per-transceiver directions and sender codecs
        for transceiver in &mut self.transceivers {
            let Some(mid) = transceiver.mid.clone() else {
                continue;
            };
            let (Some(local_media), Some(remote_media)) = (
                local_session.find_by_mid(&mid),
                remote_session.find_by_mid(&mid),
            ) else {
                continue;
            };

            transceiver.current_direction =
                local_media.direction.intersect(remote_media.direction);

            if let Some(sender) = &mut transceiver.sender {
                // the negotiated codec is the first shared one; the answer
                // side's list is already reduced
                let answer_media = if local.sdp_type == RTCSdpType::Answer {
                    local_media
                } else {
                    remote_media
                };
                if let Some(codec) = answer_media.codecs.first() {
                    if !sender.bound {
                        let mtu = self.setting_engine.get_send_mtu();
                        match &mut sender.track {
                            LocalTrack::Sample(track) => {
                                track.bind(codec.payload_type, mtu)?;
                            }
                            LocalTrack::Rtp(track) => track.bind(codec.payload_type),
                        }
                        sender.negotiated_codec = Some(codec.clone());
                        sender.bound = true;

                        self.chain.bind_local_stream(&interceptor::StreamInfo {
                            ssrc: sender.track.ssrc(),
                            payload_type: codec.payload_type,
                            mime_type: codec.capability.mime_type.clone(),
                            clock_rate: codec.capability.clock_rate,
                            channels: codec.capability.channels,
                            sdp_fmtp_line: codec.capability.sdp_fmtp_line.clone(),
                            rtcp_feedback: codec.capability.rtcp_feedback.clone(),
                            rtp_header_extensions: local_media
                                .extmaps
                                .iter()
                                .map(|(id, uri)| interceptor::RTPHeaderExtension {
                                    id: *id,
                                    uri: uri.clone(),
                                })
                                .collect(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}
