//! Interceptor Registry - type-safe builder for constructing interceptor chains.

use crate::noop::NoopInterceptor;

/// Registry for constructing interceptor chains.
///
/// `Registry` uses a type-state pattern: each call to `.with()` wraps the
/// current chain in another interceptor and changes the registry's type
/// parameter accordingly, so the finished chain is fully known at compile
/// time. The stage registered last ends up outermost, nearest the transport.
///
/// ```ignore
/// let chain = Registry::new()
///     .with(|p| NackResponderBuilder::default().build()(p))
///     .with(|p| NackGeneratorBuilder::default().build()(p))
///     .build();
/// ```
pub struct Registry<P> {
    inner: P,
}

impl Registry<NoopInterceptor> {
    /// Starts building a new interceptor chain around a `NoopInterceptor`
    /// terminal.
    pub fn new() -> Registry<NoopInterceptor> {
        Registry {
            inner: NoopInterceptor::new(),
        }
    }
}

impl Default for Registry<NoopInterceptor> {
    fn default() -> Self {
        Registry::new()
    }
}

impl<P> Registry<P> {
    /// Starts building from an existing innermost stage.
    pub fn from(inner: P) -> Self {
        Registry { inner }
    }

    /// Wraps the current chain with another interceptor.
    pub fn with<O, F>(self, f: F) -> Registry<O>
    where
        F: FnOnce(P) -> O,
    {
        Registry {
            inner: f(self.inner),
        }
    }

    /// Finishes building and returns the interceptor chain.
    pub fn build(self) -> P {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Interceptor, StreamInfo, TaggedPacket};
    use shared::error::Result;
    use std::time::Instant;

    struct TestInterceptor<P> {
        inner: P,
        name: &'static str,
    }

    impl<P> TestInterceptor<P> {
        fn with_name(name: &'static str) -> impl FnOnce(P) -> Self {
            move |inner| Self { inner, name }
        }
    }

    impl<P: Interceptor> Interceptor for TestInterceptor<P> {
        fn handle_read(&mut self, msg: TaggedPacket) -> Result<()> {
            self.inner.handle_read(msg)
        }

        fn poll_read(&mut self) -> Option<TaggedPacket> {
            self.inner.poll_read()
        }

        fn handle_write(&mut self, msg: TaggedPacket) -> Result<()> {
            self.inner.handle_write(msg)
        }

        fn poll_write(&mut self) -> Option<TaggedPacket> {
            self.inner.poll_write()
        }

        fn handle_timeout(&mut self, now: Instant) -> Result<()> {
            self.inner.handle_timeout(now)
        }

        fn poll_timeout(&mut self) -> Option<Instant> {
            self.inner.poll_timeout()
        }

        fn bind_local_stream(&mut self, info: &StreamInfo) {
            self.inner.bind_local_stream(info)
        }

        fn unbind_local_stream(&mut self, info: &StreamInfo) {
            self.inner.unbind_local_stream(info)
        }

        fn bind_remote_stream(&mut self, info: &StreamInfo) {
            self.inner.bind_remote_stream(info)
        }

        fn unbind_remote_stream(&mut self, info: &StreamInfo) {
            self.inner.unbind_remote_stream(info)
        }

        fn close(&mut self) -> Result<()> {
            self.inner.close()
        }
    }

    #[test]
    fn test_registry_builds_in_wrap_order() {
        let chain = Registry::new()
            .with(TestInterceptor::with_name("inner"))
            .with(TestInterceptor::with_name("outer"))
            .build();

        assert_eq!(chain.name, "outer");
        assert_eq!(chain.inner.name, "inner");
    }

    #[test]
    fn test_registry_passthrough() {
        use crate::Packet;
        use shared::TransportContext;

        let mut chain = Registry::new()
            .with(TestInterceptor::with_name("only"))
            .build();

        let pkt = TaggedPacket {
            now: Instant::now(),
            transport: TransportContext::default(),
            message: Packet::Rtp(rtp::Packet::default()),
        };
        chain.handle_read(pkt.clone()).unwrap();
        assert_eq!(chain.poll_read().map(|p| p.message), Some(pkt.message));
    }
}
