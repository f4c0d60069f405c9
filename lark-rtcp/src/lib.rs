#![warn(rust_2018_idioms)]

pub mod compound_packet;
pub mod goodbye;
pub mod header;
pub mod packet;
pub mod payload_feedbacks;
pub mod raw_packet;
pub mod receiver_report;
pub mod reception_report;
pub mod sender_report;
pub mod source_description;
pub mod transport_feedbacks;

pub use packet::{unmarshal, Packet};
