//! Realtime room session control
//!
//! The room service is consumed through [`RoomTransport`]; [`SessionController`]
//! owns one connection and turns transport events into session callbacks.

pub mod controller;
pub mod handlers;
pub mod messages;
pub mod replay;
pub mod transport;

pub use controller::{ControllerConfig, RoomCredentials, SessionController, DEFAULT_END_IDENTITY_MARKERS};
pub use handlers::{EventHandlers, InterviewEnd, SpeakerActivity};
pub use messages::ControlMessage;
pub use replay::{load_script, parse_script, ReplayFactory, ReplayTransport, ScriptEntry, ScriptEvent};
pub use transport::{
    CaptureStream, ConnectionState, DisconnectReason, LocalTrack, LocalTrackPublication,
    LoggingSink, ParticipantInfo, RemoteTrack, RoomEvent, RoomTransport, TrackKind, TrackSink,
    TrackSource, TransportFactory,
};
