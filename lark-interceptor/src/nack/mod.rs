pub mod generator;
pub mod receive_log;
pub mod responder;
pub mod send_buffer;

pub use generator::{NackGeneratorBuilder, NackGeneratorInterceptor};
pub use responder::{NackResponderBuilder, NackResponderInterceptor};

use crate::stream_info::StreamInfo;

/// Whether plain `nack` feedback was negotiated for the stream.
pub(crate) fn stream_supports_nack(info: &StreamInfo) -> bool {
    info.supports_feedback("nack", "")
}
