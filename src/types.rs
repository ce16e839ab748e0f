//! Tracking types.
//!
//! Device-independent types for poses, stray markers and tool identity,
//! as well as the session's connection and tracking state.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Identity
// =============================================================================

/// Session-local tool number handed out by tool registration.
///
/// The first registered tool is 0, the second 1, and so on. A tool number is
/// never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ToolNum(pub usize);

impl ToolNum {
    /// Returns the index into the session's tool table.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ToolNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Device-assigned port handle.
///
/// Opaque to the session; only the transport interprets the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PortHandle(pub u16);

impl fmt::Display for PortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.0)
    }
}

/// A registered tool: its device handle and its session tool number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ToolHandle {
    pub handle: PortHandle,
    pub tool: ToolNum,
    /// Set once the device flagged the handle stale and it was freed. The
    /// handle value may since back another tool.
    pub released: bool,
}

impl ToolHandle {
    pub fn new(handle: PortHandle, tool: ToolNum) -> Self {
        Self {
            handle,
            tool,
            released: false,
        }
    }

    /// Returns true while the port handle still belongs to this tool.
    pub fn is_active(&self) -> bool {
        !self.released
    }
}

// =============================================================================
// Geometry
// =============================================================================

/// A position in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Position3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position3 {
    /// Creates a new position.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Returns the coordinates as `[x, y, z]`.
    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f64; 3]> for Position3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

/// Tracked tool pose as reported by the device.
///
/// The rotation is a unit quaternion in scalar-first order (q0, qx, qy, qz).
/// The values are kept exactly as decoded; no renormalization happens.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// Orientation quaternion, scalar first.
    pub rotation: [f64; 4],
    /// Position in millimetres.
    pub position: Position3,
    /// Unitless RMS error estimate.
    pub error: f64,
}

impl Pose {
    /// Creates a pose from the eight values of a transform reply, in the order
    /// q0, qx, qy, qz, x, y, z, error.
    pub fn from_array(values: [f64; 8]) -> Self {
        let [q0, qx, qy, qz, x, y, z, error] = values;
        Self {
            rotation: [q0, qx, qy, qz],
            position: Position3 { x, y, z },
            error,
        }
    }

    /// Returns the pose as q0, qx, qy, qz, x, y, z, error.
    pub fn to_array(&self) -> [f64; 8] {
        let [q0, qx, qy, qz] = self.rotation;
        [
            q0,
            qx,
            qy,
            qz,
            self.position.x,
            self.position.y,
            self.position.z,
            self.error,
        ]
    }
}

/// A detected passive marker not assigned to any tool.
///
/// Only meaningful within the capture that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StrayMarker {
    /// Position in millimetres.
    pub position: Position3,
    /// The marker lies outside the characterized measurement volume.
    pub out_of_volume: bool,
}

impl StrayMarker {
    pub fn new(position: Position3) -> Self {
        Self {
            position,
            out_of_volume: false,
        }
    }
}

// =============================================================================
// Capture Results
// =============================================================================

/// Per-handle transform status decoded from a poll reply.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TransformStatus {
    /// The tool was seen and its pose computed.
    Valid(Pose),
    /// The tool is enabled but not visible to the camera.
    Missing,
    /// The device reported the handle as disabled, or did not report it.
    Disabled,
}

/// Outcome of a tool transformation query.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ToolPose {
    /// The tool was visible in the last capture.
    Visible(Pose),
    /// The tool was not visible in the last capture.
    NotVisible,
}

impl ToolPose {
    /// Returns the pose if the tool was visible.
    pub fn pose(&self) -> Option<&Pose> {
        match self {
            ToolPose::Visible(pose) => Some(pose),
            ToolPose::NotVisible => None,
        }
    }

    pub fn is_visible(&self) -> bool {
        matches!(self, ToolPose::Visible(_))
    }
}

/// Results of one successful capture.
///
/// `tools` is indexed by [`ToolNum`] and covers the tools registered when the
/// capture ran.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Capture {
    pub tools: Vec<TransformStatus>,
    pub strays: Vec<StrayMarker>,
    /// Device frame counter, when the reply carries one.
    pub frame: Option<u32>,
}

impl Capture {
    /// Returns the status of a tool, or `None` if it was not part of this capture.
    pub fn status(&self, tool: ToolNum) -> Option<&TransformStatus> {
        self.tools.get(tool.index())
    }

    /// Number of tools reported visible.
    pub fn visible_count(&self) -> usize {
        self.tools
            .iter()
            .filter(|s| matches!(s, TransformStatus::Valid(_)))
            .count()
    }
}

// =============================================================================
// Session State
// =============================================================================

/// Connection state of a tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConnectionState {
    /// No usable device link. A link may still be open if the reset or
    /// initialize handshake failed.
    #[default]
    Disconnected,
    /// Device opened, reset and initialized.
    Connected,
}

/// Hardware tracking mode as last commanded by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TrackingMode {
    /// Setup mode; handles can be reprogrammed.
    #[default]
    Idle,
    /// Tracking mode; the device accepts poll commands.
    Tracking,
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingMode::Idle => write!(f, "idle"),
            TrackingMode::Tracking => write!(f, "tracking"),
        }
    }
}
