pub mod media_engine;
pub mod setting_engine;

use std::sync::Arc;

use crate::peer_connection::configuration::RTCConfiguration;
use crate::peer_connection::RTCPeerConnection;
use interceptor::nack::{NackGeneratorBuilder, NackResponderBuilder};
use interceptor::report::{ReceiverReportBuilder, SenderReportBuilder};
use interceptor::stats::{StatsBuilder, StatsInterceptor};
use interceptor::twcc::{TwccReceiverBuilder, TwccSenderBuilder};
use interceptor::{
    nack::{NackGeneratorInterceptor, NackResponderInterceptor},
    report::{ReceiverReportInterceptor, SenderReportInterceptor},
    twcc::{TwccReceiverInterceptor, TwccSenderInterceptor},
    Interceptor, NoopInterceptor, Registry,
};
use media_engine::MediaEngine;
use setting_engine::SettingEngine;
use shared::error::Result;

/// The chain the default interceptor registry produces: stats outermost,
/// then NACK generation/response, TWCC, and the RTCP report writers nearest
/// the tracks.
pub type DefaultInterceptorChain = StatsInterceptor<
    NackGeneratorInterceptor<
        NackResponderInterceptor<
            TwccReceiverInterceptor<
                TwccSenderInterceptor<
                    ReceiverReportInterceptor<SenderReportInterceptor<NoopInterceptor>>,
                >,
            >,
        >,
    >,
>;

/// Builds the default interceptor chain for one connection.
pub fn default_interceptor_chain() -> DefaultInterceptorChain {
    Registry::new()
        .with(SenderReportBuilder::new().build())
        .with(ReceiverReportBuilder::new().build())
        .with(TwccSenderBuilder::new().build())
        .with(TwccReceiverBuilder::new().build())
        .with(NackResponderBuilder::new().build())
        .with(NackGeneratorBuilder::new().build())
        .with(StatsBuilder::new().build())
        .build()
}

/// API bundles the engines and the interceptor factory that every
/// [`RTCPeerConnection`] spawned from it shares. There is no global state:
/// two APIs with different engines coexist freely.
pub struct API<I: Interceptor = DefaultInterceptorChain> {
    pub(crate) setting_engine: Arc<SettingEngine>,
    pub(crate) media_engine: MediaEngine,
    pub(crate) interceptor_factory: Box<dyn Fn() -> I>,
}

impl<I: Interceptor> API<I> {
    /// Creates a new PeerConnection with the provided configuration against
    /// the received API object.
    pub fn new_peer_connection(
        &self,
        configuration: RTCConfiguration,
    ) -> Result<RTCPeerConnection<I>> {
        RTCPeerConnection::new(self, configuration)
    }

    /// Returns the internal [`SettingEngine`].
    pub fn setting_engine(&self) -> &SettingEngine {
        &self.setting_engine
    }

    /// Returns the internal [`MediaEngine`].
    pub fn media_engine(&self) -> &MediaEngine {
        &self.media_engine
    }
}

/// Builder for [`API`]. The engines should not be changed after being
/// passed to the builder.
pub struct APIBuilder<I: Interceptor = DefaultInterceptorChain> {
    setting_engine: Option<Arc<SettingEngine>>,
    media_engine: Option<MediaEngine>,
    interceptor_factory: Box<dyn Fn() -> I>,
}

impl Default for APIBuilder {
    fn default() -> Self {
        APIBuilder {
            setting_engine: None,
            media_engine: None,
            interceptor_factory: Box::new(default_interceptor_chain),
        }
    }
}

impl APIBuilder {
    pub fn new() -> Self {
        APIBuilder::default()
    }
}

impl<I: Interceptor> APIBuilder<I> {
    pub fn build(mut self) -> API<I> {
        API {
            setting_engine: self
                .setting_engine
                .take()
                .unwrap_or_else(|| Arc::new(SettingEngine::default())),
            media_engine: self.media_engine.take().unwrap_or_else(|| {
                let mut engine = MediaEngine::default();
                // a media engine that registers nothing cannot negotiate;
                // default to the standard set
                let _ = engine.register_default_codecs();
                let _ = engine.register_default_header_extensions();
                engine
            }),
            interceptor_factory: self.interceptor_factory,
        }
    }

    /// Provides a SettingEngine to the API.
    pub fn with_setting_engine(mut self, setting_engine: Arc<SettingEngine>) -> Self {
        self.setting_engine = Some(setting_engine);
        self
    }

    /// Provides a MediaEngine to the API.
    pub fn with_media_engine(mut self, media_engine: MediaEngine) -> Self {
        self.media_engine = Some(media_engine);
        self
    }

    /// Provides an interceptor chain factory, replacing the default chain.
    /// Every connection created from the API gets its own chain instance.
    pub fn with_interceptor_factory<O: Interceptor>(
        self,
        factory: impl Fn() -> O + 'static,
    ) -> APIBuilder<O> {
        APIBuilder {
            setting_engine: self.setting_engine,
            media_engine: self.media_engine,
            interceptor_factory: Box::new(factory),
        }
    }
}

#[cfg(test)]
mod api_test {
    use super::*;

    #[test]
    fn test_api_builder_defaults() {
        let api = APIBuilder::new().build();
        assert!(!api.media_engine().codecs(crate::rtp_transceiver::rtp_codec::RTPCodecType::Video).is_empty());
        assert!(!api.setting_engine().detach_data_channels);
    }

    #[test]
    fn test_api_custom_chain() {
        let api = APIBuilder::new()
            .with_interceptor_factory(interceptor::NoopInterceptor::new)
            .build();
        // factory produces a fresh chain per call
        let _chain_a = (api.interceptor_factory)();
        let _chain_b = (api.interceptor_factory)();
    }
}
