//! Still and video capture
//!
//! - `state`: recording state machine and the session tracker
//! - `coordinator`: picture and clip capture against the shared camera

pub mod coordinator;
pub mod state;

pub use coordinator::{CapturedPicture, RecordedVideo, RecordingCoordinator, RecordingTicket};
pub use state::{
    cap_duration, ActiveRecording, RecordingOutcome, RecordingSession, RecordingState,
    RecordingStatus, RecordingTracker, MAX_RECORDING_SECS,
};
