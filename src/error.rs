use thiserror::Error;

/// Failure taxonomy for the recording pipeline and the room controller.
///
/// Operations return `anyhow::Result`; the underlying cause is one of these
/// variants so callers can `downcast_ref::<MediaError>()` to tell an expected
/// misuse from a transport fault.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// None of the preferred recording containers is supported
    #[error("no supported recording format among {0:?}")]
    NoSupportedFormat(Vec<String>),

    /// The audio subsystem could not be created or resumed
    #[error("audio subsystem unavailable: {0}")]
    AudioUnavailable(String),

    #[error("audio pipeline is not initialized")]
    NotInitialized,

    #[error("recording is already active")]
    AlreadyRecording,

    #[error("recording is not active")]
    NotRecording,

    /// The stream encoder is not idle
    #[error("encoder is busy (state: {0})")]
    EncoderBusy(String),

    /// Frame payload cannot be decoded
    #[error("malformed audio frame: {0}")]
    MalformedFrame(String),

    /// Room address or access token missing
    #[error("missing room credentials: {0}")]
    MissingCredentials(&'static str),

    #[error("room is not connected")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(String),
}

impl MediaError {
    /// Find a `MediaError` in an `anyhow` error, whether it is the root
    /// cause or was attached as context.
    pub fn find(err: &anyhow::Error) -> Option<&MediaError> {
        err.downcast_ref::<MediaError>()
            .or_else(|| err.chain().find_map(|cause| cause.downcast_ref::<MediaError>()))
    }
}
