//! Session layer for NDI Polaris-class optical trackers.
//!
//! This crate drives the stateful part of talking to a Polaris camera:
//! finding and opening the device, loading tool definitions into port
//! handles, polling tracked poses and reading stray marker positions.
//!
//! The serial link itself (command framing, CRCs, binary reply decoding) is
//! supplied by the caller through the [`Transport`] and [`Device`] traits.
//!
//! # Lifecycle
//!
//! 1. [`TrackingSession::connect`] probes up to 20 candidate endpoints, opens
//!    the first device found, then resets and initializes it.
//! 2. [`TrackingSession::register_tool`] loads a 1024-byte tool definition and
//!    returns a [`ToolNum`]: 0 for the first tool, 1 for the second, and so on.
//! 3. [`TrackingSession::capture`] enters tracking mode if needed and polls
//!    transforms and stray markers.
//! 4. [`TrackingSession::tool_transformation`] and
//!    [`TrackingSession::stray_marker_position`] read the last capture.
//!
//! Results of the last capture stay readable after
//! [`TrackingSession::disconnect`].
//!
//! # Features
//!
//! - `serde`: `Serialize`/`Deserialize` for result types and [`SessionConfig`].

pub mod config;
pub mod discovery;
mod error;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod types;
pub mod worker;

// Error types
pub use error::{
    CaptureError, ConnectError, DefinitionError, Error, QueryError, RegisterError,
    RegistrationStage, Result, TransportError,
};

// Session and configuration
pub use config::SessionConfig;
pub use session::TrackingSession;
pub use worker::{CaptureSnapshot, CaptureWorker, WorkerStatus, STATUS_QUEUE_DEPTH};

// Transport contract
pub use discovery::{DeviceScanner, OpenedDevice};
pub use protocol::{
    ErrorCode, HandleCategory, ReplyOptions, ToolDefinition, ToolKind, ToolPriority,
    TOOL_DEFINITION_SIZE,
};
pub use transport::{CommandResult, Device, HandleTransform, PollReply, Transport};

// Types
pub use types::{
    Capture, ConnectionState, PortHandle, Pose, Position3, StrayMarker, ToolHandle, ToolNum,
    ToolPose, TrackingMode, TransformStatus,
};
