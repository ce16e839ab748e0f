//! Transport/codec contract consumed by the tracking session.
//!
//! The session never encodes commands or parses replies itself. A transport
//! implementation owns the serial port, the ASCII command framing, CRCs and
//! the binary TX reply decoding, and exposes them through these two traits:
//!
//! - [`Transport`] enumerates, probes and opens candidate endpoints.
//! - [`Device`] issues commands on an open link.
//!
//! Every command reports its outcome through its `Result`; a device `ERROR`
//! reply surfaces as [`TransportError::Device`] with the reply's error code.

use crate::error::TransportError;
use crate::protocol::{HandleCategory, ReplyOptions, ToolKind, ToolPriority};
use crate::types::{PortHandle, StrayMarker, TransformStatus};

/// Result type for transport commands.
pub type CommandResult<T> = std::result::Result<T, TransportError>;

// =============================================================================
// Poll Reply
// =============================================================================

/// Transform status reported for one port handle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandleTransform {
    pub handle: PortHandle,
    pub status: TransformStatus,
}

/// Decoded reply to a combined tracking poll (TX/BX).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PollReply {
    /// One entry per port handle the device reported on.
    pub transforms: Vec<HandleTransform>,
    /// Passive stray markers, in reply order.
    pub strays: Vec<StrayMarker>,
    /// Frame counter, if the reply carried one.
    pub frame: Option<u32>,
}

impl PollReply {
    /// Returns the status reported for `handle`.
    ///
    /// A handle absent from the reply is reported as [`TransformStatus::Disabled`].
    pub fn status_of(&self, handle: PortHandle) -> TransformStatus {
        self.transforms
            .iter()
            .find(|t| t.handle == handle)
            .map(|t| t.status)
            .unwrap_or(TransformStatus::Disabled)
    }
}

// =============================================================================
// Traits
// =============================================================================

/// Endpoint enumeration and opening (serial port scan).
pub trait Transport {
    /// The open link type.
    type Device: Device;

    /// Returns the name of the candidate endpoint at `index`, or `None` if the
    /// platform has no such endpoint.
    fn endpoint_name(&self, index: usize) -> Option<String>;

    /// Checks whether a tracking device answers on `endpoint`.
    fn probe(&mut self, endpoint: &str) -> CommandResult<()>;

    /// Opens a command link to the device on `endpoint`.
    fn open(&mut self, endpoint: &str) -> CommandResult<Self::Device>;
}

/// Commands on an open device link.
///
/// Implementations block until the device replies or the link times out.
pub trait Device {
    /// Returns false once the link has been closed or severed.
    fn is_open(&self) -> bool;

    /// Closes the link. Must be safe to call on an already closed link.
    fn close(&mut self);

    /// Resets the device (serial break + RESET).
    fn reset(&mut self) -> CommandResult<()>;

    /// Initializes the device (INIT).
    fn initialize(&mut self) -> CommandResult<()>;

    /// Lists port handles in `category` (PHSR).
    fn port_handles(&mut self, category: HandleCategory) -> CommandResult<Vec<PortHandle>>;

    /// Frees a port handle (PHF).
    fn free_port_handle(&mut self, handle: PortHandle) -> CommandResult<()>;

    /// Requests a new port handle (PHRQ).
    fn request_port_handle(&mut self, kind: ToolKind) -> CommandResult<PortHandle>;

    /// Writes one chunk of tool definition data at `offset` (PVWR).
    fn write_tool_data(
        &mut self,
        handle: PortHandle,
        offset: u16,
        chunk: &[u8],
    ) -> CommandResult<()>;

    /// Initializes a port handle (PINIT).
    fn initialize_port_handle(&mut self, handle: PortHandle) -> CommandResult<()>;

    /// Enables a port handle for tracking (PENA).
    fn enable_port_handle(&mut self, handle: PortHandle, priority: ToolPriority)
        -> CommandResult<()>;

    /// Enters tracking mode (TSTART).
    fn start_tracking(&mut self) -> CommandResult<()>;

    /// Leaves tracking mode (TSTOP).
    fn stop_tracking(&mut self) -> CommandResult<()>;

    /// Polls tracking data for all enabled handles (TX).
    fn poll(&mut self, options: ReplyOptions) -> CommandResult<PollReply>;
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn reset(&mut self) -> CommandResult<()> {
        (**self).reset()
    }

    fn initialize(&mut self) -> CommandResult<()> {
        (**self).initialize()
    }

    fn port_handles(&mut self, category: HandleCategory) -> CommandResult<Vec<PortHandle>> {
        (**self).port_handles(category)
    }

    fn free_port_handle(&mut self, handle: PortHandle) -> CommandResult<()> {
        (**self).free_port_handle(handle)
    }

    fn request_port_handle(&mut self, kind: ToolKind) -> CommandResult<PortHandle> {
        (**self).request_port_handle(kind)
    }

    fn write_tool_data(
        &mut self,
        handle: PortHandle,
        offset: u16,
        chunk: &[u8],
    ) -> CommandResult<()> {
        (**self).write_tool_data(handle, offset, chunk)
    }

    fn initialize_port_handle(&mut self, handle: PortHandle) -> CommandResult<()> {
        (**self).initialize_port_handle(handle)
    }

    fn enable_port_handle(
        &mut self,
        handle: PortHandle,
        priority: ToolPriority,
    ) -> CommandResult<()> {
        (**self).enable_port_handle(handle, priority)
    }

    fn start_tracking(&mut self) -> CommandResult<()> {
        (**self).start_tracking()
    }

    fn stop_tracking(&mut self) -> CommandResult<()> {
        (**self).stop_tracking()
    }

    fn poll(&mut self, options: ReplyOptions) -> CommandResult<PollReply> {
        (**self).poll(options)
    }
}
