//! Command-set vocabulary shared between the session and the transport.
//!
//! These types name the arguments of the NDI combined API commands the session
//! issues (PHSR, PHRQ, PVWR, PENA, TX). Encoding them onto the wire is the
//! transport's job.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

use bitflags::bitflags;

use crate::error::DefinitionError;

/// Size of a tool definition (`.rom`) image in bytes.
pub const TOOL_DEFINITION_SIZE: usize = 1024;

/// Bytes carried by a single PVWR command.
pub const TOOL_DATA_CHUNK_SIZE: usize = 64;

/// Number of PVWR commands needed for one tool definition.
pub const TOOL_DATA_CHUNKS: usize = TOOL_DEFINITION_SIZE / TOOL_DATA_CHUNK_SIZE;

/// Default number of candidate serial endpoints probed on connect.
pub const DEFAULT_MAX_CANDIDATES: usize = 20;

// =============================================================================
// Port Handle Commands
// =============================================================================

/// Port handle search categories (PHSR reply option).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HandleCategory {
    /// Every allocated handle.
    All,
    /// Handles the device flagged as needing to be freed.
    Stale,
    /// Handles allocated but not yet initialized.
    Uninitialized,
    /// Handles initialized but not yet enabled.
    Unenabled,
    /// Handles enabled for tracking.
    Enabled,
}

impl HandleCategory {
    /// PHSR reply option value.
    pub fn code(self) -> u8 {
        match self {
            HandleCategory::All => 0x00,
            HandleCategory::Stale => 0x01,
            HandleCategory::Uninitialized => 0x02,
            HandleCategory::Unenabled => 0x03,
            HandleCategory::Enabled => 0x04,
        }
    }
}

/// Kind of tool a port handle is requested for (PHRQ).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ToolKind {
    /// Passive wireless tool with retro-reflective markers.
    #[default]
    WirelessPassive,
    /// Let the device choose.
    Any,
}

impl ToolKind {
    /// PHRQ request pattern: hardware device, system type, tool type, port
    /// number and reserved fields, `*` meaning "don't care".
    pub fn request_pattern(self) -> &'static str {
        match self {
            ToolKind::WirelessPassive => "*********1****",
            ToolKind::Any => "**************",
        }
    }
}

/// Tracking priority used when enabling a port handle (PENA).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ToolPriority {
    /// Tool is not expected to move.
    Static,
    /// Tool is expected to move.
    #[default]
    Dynamic,
    /// Tool has buttons or switches only.
    ButtonBox,
}

impl ToolPriority {
    /// PENA priority character.
    pub fn code(self) -> char {
        match self {
            ToolPriority::Static => 'S',
            ToolPriority::Dynamic => 'D',
            ToolPriority::ButtonBox => 'B',
        }
    }
}

// =============================================================================
// Tracking Replies
// =============================================================================

bitflags! {
    /// TX reply options selecting which data the poll reply carries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct ReplyOptions: u16 {
        const XFORMS_AND_STATUS = 0x0001;
        const ADDITIONAL_INFO = 0x0002;
        const SINGLE_STRAY = 0x0004;
        const FRAME_NUMBER = 0x0008;
        const PASSIVE_STRAY = 0x1000;
        const PASSIVE_EXTRA = 0x2000;
        const PASSIVE = 0x8000;
    }
}

impl Default for ReplyOptions {
    fn default() -> Self {
        ReplyOptions::PASSIVE_STRAY | ReplyOptions::XFORMS_AND_STATUS
    }
}

// =============================================================================
// Error Codes
// =============================================================================

/// Error code from an `ERROR` reply, or a host-side failure code.
///
/// Device codes fit in one byte; host-side codes use the high byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    pub const INVALID: ErrorCode = ErrorCode(0x01);
    pub const TOO_LONG: ErrorCode = ErrorCode(0x02);
    pub const TOO_SHORT: ErrorCode = ErrorCode(0x03);
    pub const BAD_COMMAND_CRC: ErrorCode = ErrorCode(0x04);
    pub const INTERN_TIMEOUT: ErrorCode = ErrorCode(0x05);
    pub const COMM_FAIL: ErrorCode = ErrorCode(0x06);
    pub const INCORRECT_PARAMS: ErrorCode = ErrorCode(0x07);
    pub const INVALID_PORT: ErrorCode = ErrorCode(0x08);
    pub const INVALID_MODE: ErrorCode = ErrorCode(0x09);
    pub const INVALID_LED: ErrorCode = ErrorCode(0x0A);
    pub const LED_STATE: ErrorCode = ErrorCode(0x0B);
    pub const BAD_MODE: ErrorCode = ErrorCode(0x0C);
    pub const NO_TOOL: ErrorCode = ErrorCode(0x0D);
    pub const PORT_NOT_INIT: ErrorCode = ErrorCode(0x0E);
    pub const PORT_DISABLED: ErrorCode = ErrorCode(0x0F);
    pub const INITIALIZATION: ErrorCode = ErrorCode(0x10);
    pub const TSTOP_FAIL: ErrorCode = ErrorCode(0x11);
    pub const TSTART_FAIL: ErrorCode = ErrorCode(0x12);
    pub const PINIT_FAIL: ErrorCode = ErrorCode(0x13);

    pub const BAD_CRC: ErrorCode = ErrorCode(0x0100);
    pub const OPEN_ERROR: ErrorCode = ErrorCode(0x0200);
    pub const BAD_COMM: ErrorCode = ErrorCode(0x0300);
    pub const TIMEOUT: ErrorCode = ErrorCode(0x0400);
    pub const WRITE_ERROR: ErrorCode = ErrorCode(0x0500);
    pub const READ_ERROR: ErrorCode = ErrorCode(0x0600);
    pub const PROBE_FAIL: ErrorCode = ErrorCode(0x0700);

    /// Returns true for codes raised by the host side rather than the device.
    pub fn is_host_side(self) -> bool {
        self.0 > 0xFF
    }

    /// Human-readable description of the code.
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::INVALID => "invalid command",
            ErrorCode::TOO_LONG => "command too long",
            ErrorCode::TOO_SHORT => "command too short",
            ErrorCode::BAD_COMMAND_CRC => "bad CRC calculated for command",
            ErrorCode::INTERN_TIMEOUT => "timeout on command execution",
            ErrorCode::COMM_FAIL => "unable to set up new communication parameters",
            ErrorCode::INCORRECT_PARAMS => "incorrect number of command parameters",
            ErrorCode::INVALID_PORT => "invalid port handle selected",
            ErrorCode::INVALID_MODE => "invalid mode selected",
            ErrorCode::INVALID_LED => "invalid LED selected",
            ErrorCode::LED_STATE => "invalid LED state selected",
            ErrorCode::BAD_MODE => "command invalid for current mode",
            ErrorCode::NO_TOOL => "no tool plugged in selected port",
            ErrorCode::PORT_NOT_INIT => "selected port handle not initialized",
            ErrorCode::PORT_DISABLED => "selected port handle not enabled",
            ErrorCode::INITIALIZATION => "system not initialized",
            ErrorCode::TSTOP_FAIL => "failure to stop tracking",
            ErrorCode::TSTART_FAIL => "failure to start tracking",
            ErrorCode::PINIT_FAIL => "failure to initialize tool in port",
            ErrorCode::BAD_CRC => "bad CRC received from device",
            ErrorCode::OPEN_ERROR => "error opening serial device",
            ErrorCode::BAD_COMM => "bad communication parameters for host",
            ErrorCode::TIMEOUT => "no response from device",
            ErrorCode::WRITE_ERROR => "error writing to device",
            ErrorCode::READ_ERROR => "error reading from device",
            ErrorCode::PROBE_FAIL => "device not found on probed port",
            _ => "unrecognized error code",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_host_side() {
            write!(f, "0x{:04X}", self.0)
        } else {
            write!(f, "0x{:02X}", self.0)
        }
    }
}

// =============================================================================
// Tool Definition
// =============================================================================

/// A tool definition image, passed through to the device uninterpreted.
#[derive(Clone, PartialEq, Eq)]
pub struct ToolDefinition {
    data: Box<[u8; TOOL_DEFINITION_SIZE]>,
}

impl ToolDefinition {
    /// Wraps a full-size definition image.
    pub fn new(data: [u8; TOOL_DEFINITION_SIZE]) -> Self {
        Self {
            data: Box::new(data),
        }
    }

    /// Builds a definition from a possibly short image, zero-padding the rest.
    ///
    /// `.rom` files are frequently shorter than the device's definition slot.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DefinitionError> {
        if bytes.len() > TOOL_DEFINITION_SIZE {
            return Err(DefinitionError::DefinitionTooLarge {
                len: bytes.len(),
                max: TOOL_DEFINITION_SIZE,
            });
        }
        let mut data = Box::new([0u8; TOOL_DEFINITION_SIZE]);
        data[..bytes.len()].copy_from_slice(bytes);
        Ok(Self { data })
    }

    /// Returns the full image.
    pub fn as_bytes(&self) -> &[u8; TOOL_DEFINITION_SIZE] {
        &self.data
    }

    /// Iterates over the PVWR chunks as `(offset, bytes)`.
    pub fn chunks(&self) -> impl Iterator<Item = (u16, &[u8])> + '_ {
        self.data
            .chunks_exact(TOOL_DATA_CHUNK_SIZE)
            .enumerate()
            .map(|(i, chunk)| ((i * TOOL_DATA_CHUNK_SIZE) as u16, chunk))
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("len", &TOOL_DEFINITION_SIZE)
            .finish()
    }
}

impl From<[u8; TOOL_DEFINITION_SIZE]> for ToolDefinition {
    fn from(data: [u8; TOOL_DEFINITION_SIZE]) -> Self {
        Self::new(data)
    }
}

impl TryFrom<&[u8]> for ToolDefinition {
    type Error = DefinitionError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}
