use std::time::Instant;

use crate::track::track_remote::TrackRemoteId;

/// Connection-owned receiving state of one transceiver. A receiver fans out
/// into up to three remote tracks when the remote sends simulcast layers
/// distinguished by RID.
#[derive(Default, Debug)]
pub(crate) struct RTCRtpReceiverInternal {
    /// Remote tracks materialized for this receiver, keyed into the
    /// connection's track table.
    pub(crate) tracks: Vec<TrackRemoteId>,
    /// Simulcast layer ids announced by the remote description.
    pub(crate) rids: Vec<String>,
    /// Deadline of the next periodic keyframe request for video.
    pub(crate) next_pli: Option<Instant>,
}
