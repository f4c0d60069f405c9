pub mod track_local;
pub mod track_remote;

pub use track_local::{TrackLocalStaticRTP, TrackLocalStaticSample};
pub use track_remote::{TrackRemote, TrackRemoteId};
