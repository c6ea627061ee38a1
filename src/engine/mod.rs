// Clip encoding engine - independent of the command-line front end

pub mod classify;
pub mod core;
pub mod error;
pub mod probe;
pub mod session;
pub mod validate;

pub use classify::{FailureClassifier, FailureKind, FailureRule};
pub use core::*;
pub use error::EncodeError;
pub use probe::{MediaInfo, MediaProber, StreamInfo, VideoStreamInfo};
pub use session::{
    CancellationToken, EncodeOutcome, EncodeSession, SessionEvent, SessionSettings, SessionState,
};
pub use validate::{ValidationError, validate_job, validate_options, validate_trim};
