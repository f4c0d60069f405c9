#![warn(rust_2018_idioms)]

pub mod error;
pub mod handler;
pub mod marshal;
pub(crate) mod transport;

pub use handler::Protocol;
pub use transport::{
    EcnCodepoint, FourTuple, TaggedBytesMut, TransportContext, TransportMessage, TransportProtocol,
};
