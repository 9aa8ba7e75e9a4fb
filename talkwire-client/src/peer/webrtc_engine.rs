use crate::error::EngineError;
use crate::peer::engine_event::{ConnectionRef, EngineEvent};
use crate::peer::media_engine::{
    ConnectionOptions, IceConnectionState, LocalMedia, MediaCapabilities, MediaConnection,
    MediaEngine, SdpKind,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use talkwire_core::{IceCandidate, PeerKey};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8, MediaEngine as CodecRegistry};
use webrtc::api::{API, APIBuilder};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

const DATA_CHANNEL_LABEL: &str = "status";

/// [`MediaEngine`] backed by webrtc-rs.
///
/// Every connection shares the same pair of local sample tracks; whoever
/// captures media writes samples into [`WebRtcEngine::audio_track`] and
/// [`WebRtcEngine::video_track`].
pub struct WebRtcEngine {
    api: API,
    audio: Arc<TrackLocalStaticSample>,
    video: Arc<TrackLocalStaticSample>,
    capabilities: MediaCapabilities,
}

impl WebRtcEngine {
    pub fn new(capabilities: MediaCapabilities) -> Result<Self> {
        let mut codecs = CodecRegistry::default();
        codecs.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut codecs)?;

        let api = APIBuilder::new()
            .with_media_engine(codecs)
            .with_interceptor_registry(registry)
            .build();

        let audio = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            "audio".to_owned(),
            "talkwire".to_owned(),
        ));
        let video = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
            "video".to_owned(),
            "talkwire".to_owned(),
        ));

        Ok(Self {
            api,
            audio,
            video,
            capabilities,
        })
    }

    pub fn audio_track(&self) -> Arc<TrackLocalStaticSample> {
        self.audio.clone()
    }

    pub fn video_track(&self) -> Arc<TrackLocalStaticSample> {
        self.video.clone()
    }
}

#[async_trait]
impl MediaEngine for WebRtcEngine {
    fn capabilities(&self) -> MediaCapabilities {
        self.capabilities
    }

    async fn create_connection(
        &self,
        options: ConnectionOptions,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<Box<dyn MediaConnection>, EngineError> {
        let rtc_config = RTCConfiguration {
            ice_servers: options
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(
            self.api
                .new_peer_connection(rtc_config)
                .await
                .map_err(|e| EngineError::Unavailable(e.to_string()))?,
        );

        let conn = ConnectionRef {
            key: options.key.clone(),
            generation: options.generation,
        };
        let data_channel = Arc::new(Mutex::new(None));
        register_callbacks(&peer_connection, &conn, &events, &data_channel);

        let connection = WebRtcConnection {
            key: options.key,
            peer_connection,
            data_channel,
            audio: self.audio.clone(),
            video: self.video.clone(),
            senders: Mutex::new(Vec::new()),
        };
        connection
            .prepare(options.receive_only, options.create_data_channel, conn, events)
            .await
            .map_err(negotiation_error)?;

        Ok(Box::new(connection))
    }
}

fn register_callbacks(
    peer_connection: &RTCPeerConnection,
    conn: &ConnectionRef,
    events: &mpsc::Sender<EngineEvent>,
    data_channel: &Arc<Mutex<Option<Arc<RTCDataChannel>>>>,
) {
    // Trickle ICE: local candidates go out as they are gathered.
    let ice_tx = events.clone();
    let ice_conn = conn.clone();
    peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
        let tx = ice_tx.clone();
        let conn = ice_conn.clone();

        Box::pin(async move {
            let event = match c {
                None => EngineEvent::CandidatesComplete(conn),
                Some(candidate) => {
                    let Ok(init) = candidate.to_json() else {
                        return;
                    };
                    EngineEvent::LocalCandidate(
                        conn,
                        IceCandidate {
                            sdp_mid: init.sdp_mid,
                            sdp_m_line_index: init.sdp_mline_index,
                            candidate: init.candidate,
                        },
                    )
                }
            };
            let _ = tx.send(event).await;
        })
    }));

    let state_tx = events.clone();
    let state_conn = conn.clone();
    peer_connection.on_ice_connection_state_change(Box::new(move |s: RTCIceConnectionState| {
        let tx = state_tx.clone();
        let conn = state_conn.clone();

        Box::pin(async move {
            info!("ICE connection state of {} changed: {}", conn.key, s);
            let Some(state) = map_ice_state(s) else {
                return;
            };
            let _ = tx.send(EngineEvent::IceStateChanged(conn, state)).await;
        })
    }));

    // The answering side receives the data channel the offerer created.
    let dc_tx = events.clone();
    let dc_conn = conn.clone();
    let dc_slot = data_channel.clone();
    peer_connection.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
        let tx = dc_tx.clone();
        let conn = dc_conn.clone();
        let slot = dc_slot.clone();

        Box::pin(async move {
            debug!(
                "Data channel '{}' opened by remote on {}",
                channel.label(),
                conn.key
            );
            forward_messages(&channel, conn, tx);
            *slot.lock().await = Some(channel);
        })
    }));
}

fn forward_messages(
    channel: &RTCDataChannel,
    conn: ConnectionRef,
    events: mpsc::Sender<EngineEvent>,
) {
    channel.on_message(Box::new(move |msg: DataChannelMessage| {
        let tx = events.clone();
        let conn = conn.clone();
        Box::pin(async move {
            let _ = tx
                .send(EngineEvent::DataChannelMessage(conn, msg.data))
                .await;
        })
    }));
}

fn map_ice_state(state: RTCIceConnectionState) -> Option<IceConnectionState> {
    match state {
        RTCIceConnectionState::New => Some(IceConnectionState::New),
        RTCIceConnectionState::Checking => Some(IceConnectionState::Checking),
        RTCIceConnectionState::Connected => Some(IceConnectionState::Connected),
        RTCIceConnectionState::Completed => Some(IceConnectionState::Completed),
        RTCIceConnectionState::Disconnected => Some(IceConnectionState::Disconnected),
        RTCIceConnectionState::Failed => Some(IceConnectionState::Failed),
        RTCIceConnectionState::Closed => Some(IceConnectionState::Closed),
        _ => None,
    }
}

fn negotiation_error(e: anyhow::Error) -> EngineError {
    EngineError::Negotiation(format!("{:#}", e))
}

/// One webrtc-rs peer connection.
pub struct WebRtcConnection {
    key: PeerKey,
    peer_connection: Arc<RTCPeerConnection>,
    data_channel: Arc<Mutex<Option<Arc<RTCDataChannel>>>>,
    audio: Arc<TrackLocalStaticSample>,
    video: Arc<TrackLocalStaticSample>,
    senders: Mutex<Vec<Arc<RTCRtpSender>>>,
}

impl WebRtcConnection {
    async fn prepare(
        &self,
        receive_only: bool,
        create_data_channel: bool,
        conn: ConnectionRef,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<()> {
        if receive_only {
            for kind in [RTPCodecType::Audio, RTPCodecType::Video] {
                self.peer_connection
                    .add_transceiver_from_kind(
                        kind,
                        Some(RTCRtpTransceiverInit {
                            direction: RTCRtpTransceiverDirection::Recvonly,
                            send_encodings: vec![],
                        }),
                    )
                    .await
                    .context("Failed to add receive-only transceiver")?;
            }
        }

        if create_data_channel {
            let channel = self
                .peer_connection
                .create_data_channel(DATA_CHANNEL_LABEL, None)
                .await
                .context("Failed to create data channel")?;
            forward_messages(&channel, conn, events);
            *self.data_channel.lock().await = Some(channel);
        }
        Ok(())
    }

    async fn offer(&self) -> Result<String> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(offer.sdp)
    }

    async fn answer(&self) -> Result<String> {
        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(answer.sdp)
    }

    async fn remote_description(&self, kind: SdpKind, sdp: String) -> Result<()> {
        let desc = match kind {
            SdpKind::Offer => RTCSessionDescription::offer(sdp)?,
            SdpKind::Answer => RTCSessionDescription::answer(sdp)?,
        };
        self.peer_connection.set_remote_description(desc).await?;
        Ok(())
    }

    async fn candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: None,
        };
        self.peer_connection
            .add_ice_candidate(init)
            .await
            .context("Failed to add ICE candidate")?;
        Ok(())
    }

    async fn attach(&self, media: LocalMedia) -> Result<()> {
        self.detach().await?;

        let mut senders = self.senders.lock().await;
        if media.audio {
            let sender = self
                .peer_connection
                .add_track(self.audio.clone() as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .context("Failed to add audio track")?;
            senders.push(sender);
        }
        if media.video {
            let sender = self
                .peer_connection
                .add_track(self.video.clone() as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .context("Failed to add video track")?;
            senders.push(sender);
        }
        debug!("Attached local media {:?} to {}", media, self.key);
        Ok(())
    }

    async fn detach(&self) -> Result<()> {
        let mut senders = self.senders.lock().await;
        for sender in senders.drain(..) {
            self.peer_connection.remove_track(&sender).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MediaConnection for WebRtcConnection {
    async fn create_offer(&self) -> Result<String, EngineError> {
        self.offer().await.map_err(negotiation_error)
    }

    async fn create_answer(&self) -> Result<String, EngineError> {
        self.answer().await.map_err(negotiation_error)
    }

    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<(), EngineError> {
        self.remote_description(kind, sdp)
            .await
            .map_err(negotiation_error)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        self.candidate(candidate).await.map_err(negotiation_error)
    }

    async fn attach_local_media(&self, media: LocalMedia) -> Result<(), EngineError> {
        self.attach(media).await.map_err(negotiation_error)
    }

    async fn detach_local_media(&self) -> Result<(), EngineError> {
        self.detach().await.map_err(negotiation_error)
    }

    async fn send_data(&self, data: Bytes) -> Result<(), EngineError> {
        let channel = self.data_channel.lock().await.clone();
        let Some(channel) = channel else {
            return Err(EngineError::Negotiation(format!(
                "no data channel on {}",
                self.key
            )));
        };
        channel
            .send(&data)
            .await
            .map(|_| ())
            .map_err(|e| EngineError::Negotiation(e.to_string()))
    }

    async fn close(&self) {
        if let Err(e) = self.peer_connection.close().await {
            debug!("Closing {} failed: {}", self.key, e);
        }
    }
}
