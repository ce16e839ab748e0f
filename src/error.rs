//! Error types for the polaris-tracking crate.

use std::io;

use thiserror::Error;

use crate::protocol::ErrorCode;
use crate::types::{PortHandle, ToolNum};

// =============================================================================
// Transport Error
// =============================================================================

/// Failure reported by the transport/codec layer for a single command.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The device answered with an `ERROR` reply.
    #[error("device error {0}: {}", .0.description())]
    Device(ErrorCode),

    /// The serial link is closed or was severed externally.
    #[error("serial link closed")]
    Closed,

    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The reply could not be decoded.
    #[error("malformed reply: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Create a protocol error with a message.
    pub fn protocol(msg: impl Into<String>) -> Self {
        TransportError::Protocol(msg.into())
    }

    /// Returns the device error code, if the device itself rejected the command.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            TransportError::Device(code) => Some(*code),
            _ => None,
        }
    }

    /// Returns true if the link is gone rather than the command being rejected.
    pub fn is_disconnected(&self) -> bool {
        match self {
            TransportError::Closed => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

// =============================================================================
// Session Errors
// =============================================================================

/// Errors from [`TrackingSession::connect`](crate::TrackingSession::connect).
#[derive(Debug, Error)]
pub enum ConnectError {
    /// None of the probed candidate endpoints could be opened.
    #[error("no tracking device found after probing {candidates} candidate endpoints")]
    NoDeviceFound { candidates: usize },

    /// The device rejected or failed the reset command.
    #[error("device reset failed: {0}")]
    ResetFailed(#[source] TransportError),

    /// The device rejected or failed the initialize command.
    #[error("device initialization failed: {0}")]
    InitFailed(#[source] TransportError),
}

/// Handshake stage at which a tool registration failed.
///
/// Stages are listed in the order the handshake runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationStage {
    /// Leaving tracking mode before reprogramming handles.
    StopTracking,
    /// Searching for handles the device flagged as freeable.
    ListStaleHandles,
    /// Freeing one stale handle.
    FreeStaleHandle(PortHandle),
    /// Requesting a new port handle.
    RequestHandle,
    /// Writing one chunk of the tool definition.
    WriteDefinition { handle: PortHandle, offset: u16 },
    /// Searching for allocated but uninitialized handles.
    ListUninitializedHandles,
    /// Initializing one handle.
    InitializeHandle(PortHandle),
    /// Searching for initialized but not yet enabled handles.
    ListUnenabledHandles,
    /// Enabling one handle.
    EnableHandle(PortHandle),
}

impl RegistrationStage {
    /// Position of the stage in the handshake, starting at 1.
    pub fn ordinal(&self) -> u8 {
        match self {
            RegistrationStage::StopTracking => 1,
            RegistrationStage::ListStaleHandles => 2,
            RegistrationStage::FreeStaleHandle(_) => 3,
            RegistrationStage::RequestHandle => 4,
            RegistrationStage::WriteDefinition { .. } => 5,
            RegistrationStage::ListUninitializedHandles => 6,
            RegistrationStage::InitializeHandle(_) => 7,
            RegistrationStage::ListUnenabledHandles => 8,
            RegistrationStage::EnableHandle(_) => 9,
        }
    }
}

impl std::fmt::Display for RegistrationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationStage::StopTracking => write!(f, "stop tracking"),
            RegistrationStage::ListStaleHandles => write!(f, "list stale handles"),
            RegistrationStage::FreeStaleHandle(h) => write!(f, "free stale handle {}", h),
            RegistrationStage::RequestHandle => write!(f, "request port handle"),
            RegistrationStage::WriteDefinition { handle, offset } => {
                write!(f, "write tool definition to {} at offset {}", handle, offset)
            }
            RegistrationStage::ListUninitializedHandles => {
                write!(f, "list uninitialized handles")
            }
            RegistrationStage::InitializeHandle(h) => write!(f, "initialize handle {}", h),
            RegistrationStage::ListUnenabledHandles => write!(f, "list unenabled handles"),
            RegistrationStage::EnableHandle(h) => write!(f, "enable handle {}", h),
        }
    }
}

/// Errors from [`TrackingSession::register_tool`](crate::TrackingSession::register_tool).
#[derive(Debug, Error)]
pub enum RegisterError {
    /// The session is not connected.
    #[error("not connected to a tracking device")]
    NotConnected,

    /// A handshake stage failed; no tool was added.
    #[error("tool registration failed at stage {} ({stage}): {source}", .stage.ordinal())]
    Stage {
        stage: RegistrationStage,
        #[source]
        source: TransportError,
    },
}

impl RegisterError {
    /// Returns the failing handshake stage, if any.
    pub fn stage(&self) -> Option<RegistrationStage> {
        match self {
            RegisterError::Stage { stage, .. } => Some(*stage),
            RegisterError::NotConnected => None,
        }
    }
}

/// Errors from [`TrackingSession::capture`](crate::TrackingSession::capture).
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The session is not connected.
    #[error("not connected to a tracking device")]
    NotConnected,

    /// The device refused to enter tracking mode.
    #[error("failed to start tracking: {0}")]
    StartTrackingFailed(#[source] TransportError),

    /// The poll command failed.
    #[error("capture failed: {0}")]
    CaptureFailed(#[source] TransportError),
}

/// Errors from result queries against the last capture.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The tool number was never handed out by this session.
    #[error("invalid tool number {tool} ({registered} tools registered)")]
    InvalidToolNumber { tool: ToolNum, registered: usize },

    /// The stray marker index is past the end of the last capture.
    #[error("invalid stray marker index {index} ({count} markers in last capture)")]
    InvalidMarkerIndex { index: usize, count: usize },

    /// The tool was registered after the last capture.
    #[error("tool {0} has not been captured yet")]
    NotCaptured(ToolNum),

    /// The device did not report a transform for an enabled tool.
    #[error("tool {0} was disabled in the last capture")]
    ToolDisabled(ToolNum),
}

/// Errors building a [`ToolDefinition`](crate::protocol::ToolDefinition).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// The blob exceeds the device's tool definition size.
    #[error("tool definition is {len} bytes, maximum is {max}")]
    DefinitionTooLarge { len: usize, max: usize },
}

// =============================================================================
// Umbrella Error
// =============================================================================

/// Any error produced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Register(#[from] RegisterError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The capture worker thread is gone.
    #[error("capture worker stopped")]
    WorkerStopped,
}

/// Result type for polaris-tracking operations.
pub type Result<T> = std::result::Result<T, Error>;
