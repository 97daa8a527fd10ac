use thiserror::Error;

/// Arguments rejected by the tracker before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("track id must not be empty")]
    EmptyTrackId,

    #[error("duration must not be negative: {0}s")]
    NegativeDuration(i64),
}

pub type TrackerResult<T> = Result<T, TrackerError>;
