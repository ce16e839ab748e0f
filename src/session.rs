//! Tracking session: connection lifecycle, tool registration and capture.
//!
//! A [`TrackingSession`] owns the open device link, the table of registered
//! tools and the results of the most recent capture. All device-facing calls
//! block until the transport replies.
//!
//! # Example
//!
//! ```ignore
//! use polaris_tracking::{ToolDefinition, ToolPose, TrackingSession};
//!
//! let mut session = TrackingSession::new(transport);
//! session.connect()?;
//!
//! let probe = session.register_tool(&ToolDefinition::from_bytes(&rom)?)?;
//!
//! loop {
//!     session.capture()?;
//!     match session.tool_transformation(probe)? {
//!         ToolPose::Visible(pose) => println!("{:?}", pose.to_array()),
//!         ToolPose::NotVisible => println!("probe not visible"),
//!     }
//! }
//! ```

use log::{debug, info, warn};

use crate::config::SessionConfig;
use crate::discovery::DeviceScanner;
use crate::error::{
    CaptureError, ConnectError, QueryError, RegisterError, RegistrationStage, TransportError,
};
use crate::protocol::{HandleCategory, ToolDefinition, ToolPriority};
use crate::transport::{Device, Transport};
use crate::types::{
    Capture, ConnectionState, PortHandle, Position3, StrayMarker, ToolHandle, ToolNum, ToolPose,
    TrackingMode, TransformStatus,
};

/// A session with one optical tracking device.
///
/// Not internally synchronized; wrap in a mutex or move it into a
/// [`CaptureWorker`](crate::CaptureWorker) to use it from several threads.
pub struct TrackingSession<T: Transport> {
    transport: T,
    config: SessionConfig,
    device: Option<T::Device>,
    endpoint: Option<String>,
    state: ConnectionState,
    mode: TrackingMode,
    tools: Vec<ToolHandle>,
    last_capture: Capture,
}

impl<T: Transport> TrackingSession<T> {
    /// Creates a disconnected session with the default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    /// Creates a disconnected session.
    pub fn with_config(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            device: None,
            endpoint: None,
            state: ConnectionState::Disconnected,
            mode: TrackingMode::Idle,
            tools: Vec::new(),
            last_capture: Capture::default(),
        }
    }

    // =========================================================================
    // Connection Lifecycle
    // =========================================================================

    /// Finds a device, opens it, resets and initializes it.
    ///
    /// On success the tool table and capture results are cleared. Connecting an
    /// already connected session is a no-op.
    ///
    /// If the reset or initialize handshake fails, the link stays open but the
    /// session remains [`ConnectionState::Disconnected`]; the next `connect`
    /// or `disconnect` closes it.
    pub fn connect(&mut self) -> Result<(), ConnectError> {
        if self.is_connected() {
            debug!("Polaris: connect called while already connected");
            return Ok(());
        }

        self.close_link();

        let opened = DeviceScanner::new(&mut self.transport)
            .max_candidates(self.config.max_candidates)
            .open_first()?;
        let endpoint = opened.endpoint;
        let device = self.device.insert(opened.device);
        self.endpoint = Some(endpoint.clone());

        device.reset().map_err(ConnectError::ResetFailed)?;
        debug!("Polaris: device on {} reset", endpoint);

        device.initialize().map_err(ConnectError::InitFailed)?;
        debug!("Polaris: device on {} initialized", endpoint);

        self.state = ConnectionState::Connected;
        self.mode = TrackingMode::Idle;
        self.tools.clear();
        self.last_capture = Capture::default();

        info!("Polaris: connected on {}", endpoint);
        Ok(())
    }

    /// Closes the device link.
    ///
    /// Registered tools and the last capture are kept and remain queryable.
    pub fn disconnect(&mut self) {
        if self.device.is_some() {
            info!(
                "Polaris: disconnecting from {}",
                self.endpoint.as_deref().unwrap_or("unknown endpoint")
            );
        }
        self.close_link();
    }

    /// Returns true if the session is connected and the link is still open.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
            && self.device.as_ref().map_or(false, |d| d.is_open())
    }

    fn close_link(&mut self) {
        if let Some(mut device) = self.device.take() {
            if device.is_open() {
                device.close();
            }
        }
        self.state = ConnectionState::Disconnected;
        self.mode = TrackingMode::Idle;
    }

    /// Returns the open device if the session is usable.
    fn connected_device(&mut self) -> Option<&mut T::Device> {
        if self.state != ConnectionState::Connected {
            return None;
        }
        let device = self.device.as_mut()?;
        if !device.is_open() {
            warn!("Polaris: serial link closed underneath the session");
            return None;
        }
        Some(device)
    }

    // =========================================================================
    // Tool Registration
    // =========================================================================

    /// Loads a tool definition into the device and enables it for tracking.
    ///
    /// Returns the tool number to query its pose with. Tool numbers are handed
    /// out in call order starting at 0.
    ///
    /// If any handshake stage fails, no tool is added. A port handle already
    /// allocated by then is left on the device; the stale-handle sweep of a
    /// later registration or the reset on the next connect reclaims it.
    ///
    /// A stale handle freed here may still back an earlier tool. That tool
    /// keeps its number but reports [`QueryError::ToolDisabled`] from then on,
    /// even if the device reuses the handle value for the new tool.
    pub fn register_tool(&mut self, definition: &ToolDefinition) -> Result<ToolNum, RegisterError> {
        let tool_kind = self.config.tool_kind;
        let priority = self.config.enable_priority;
        let tracking = self.mode == TrackingMode::Tracking;
        let device = self.connected_device().ok_or(RegisterError::NotConnected)?;

        if tracking {
            device
                .stop_tracking()
                .map_err(stage_error(RegistrationStage::StopTracking))?;
            self.mode = TrackingMode::Idle;
            debug!("Polaris: tracking stopped for tool registration");
        }

        // Re-borrow after the mode update.
        let device = self.connected_device().ok_or(RegisterError::NotConnected)?;

        let stale = device
            .port_handles(HandleCategory::Stale)
            .map_err(stage_error(RegistrationStage::ListStaleHandles))?;
        for (freed, &handle) in stale.iter().enumerate() {
            if let Err(e) = device.free_port_handle(handle) {
                release_handles(&mut self.tools, &stale[..freed]);
                return Err(RegisterError::Stage {
                    stage: RegistrationStage::FreeStaleHandle(handle),
                    source: e,
                });
            }
            debug!("Polaris: freed stale handle {}", handle);
        }
        release_handles(&mut self.tools, &stale);

        let device = self.connected_device().ok_or(RegisterError::NotConnected)?;
        let handle = device
            .request_port_handle(tool_kind)
            .map_err(stage_error(RegistrationStage::RequestHandle))?;
        debug!("Polaris: allocated port handle {}", handle);

        if let Err(e) = load_and_enable(device, handle, definition, priority) {
            warn!(
                "Polaris: port handle {} left allocated after failed registration",
                handle
            );
            return Err(e);
        }

        let tool = ToolNum(self.tools.len());
        self.tools.push(ToolHandle::new(handle, tool));
        info!("Polaris: registered tool {} on port handle {}", tool, handle);
        Ok(tool)
    }

    // =========================================================================
    // Capture
    // =========================================================================

    /// Polls the device for tool transforms and stray markers.
    ///
    /// Enters tracking mode first if needed. On success the previous capture
    /// results are replaced; on failure they are left untouched.
    pub fn capture(&mut self) -> Result<(), CaptureError> {
        let options = self.config.reply_options;
        let tracking = self.mode == TrackingMode::Tracking;
        let device = self.connected_device().ok_or(CaptureError::NotConnected)?;

        if !tracking {
            device
                .start_tracking()
                .map_err(CaptureError::StartTrackingFailed)?;
            self.mode = TrackingMode::Tracking;
            debug!("Polaris: tracking started");
        }

        let device = self.connected_device().ok_or(CaptureError::NotConnected)?;
        let reply = device.poll(options).map_err(CaptureError::CaptureFailed)?;

        let tools = self
            .tools
            .iter()
            .map(|t| {
                if t.is_active() {
                    reply.status_of(t.handle)
                } else {
                    TransformStatus::Disabled
                }
            })
            .collect();
        self.last_capture = Capture {
            tools,
            strays: reply.strays,
            frame: reply.frame,
        };

        debug!(
            "Polaris: captured frame {:?}, {}/{} tools visible, {} stray markers",
            self.last_capture.frame,
            self.last_capture.visible_count(),
            self.tools.len(),
            self.last_capture.strays.len()
        );
        Ok(())
    }

    // =========================================================================
    // Result Queries
    // =========================================================================

    /// Returns the pose of `tool` from the last capture.
    ///
    /// Works while disconnected; the result then reflects the last capture
    /// made before the link was closed.
    pub fn tool_transformation(&self, tool: ToolNum) -> Result<ToolPose, QueryError> {
        if tool.index() >= self.tools.len() {
            return Err(QueryError::InvalidToolNumber {
                tool,
                registered: self.tools.len(),
            });
        }
        match self.last_capture.status(tool) {
            Some(TransformStatus::Valid(pose)) => Ok(ToolPose::Visible(*pose)),
            Some(TransformStatus::Missing) => Ok(ToolPose::NotVisible),
            Some(TransformStatus::Disabled) => Err(QueryError::ToolDisabled(tool)),
            None => Err(QueryError::NotCaptured(tool)),
        }
    }

    /// Number of stray markers in the last capture.
    pub fn stray_marker_count(&self) -> usize {
        self.last_capture.strays.len()
    }

    /// Position of stray marker `index` from the last capture.
    pub fn stray_marker_position(&self, index: usize) -> Result<Position3, QueryError> {
        self.stray_marker(index).map(|m| m.position)
    }

    /// Stray marker `index` from the last capture.
    pub fn stray_marker(&self, index: usize) -> Result<&StrayMarker, QueryError> {
        self.last_capture
            .strays
            .get(index)
            .ok_or(QueryError::InvalidMarkerIndex {
                index,
                count: self.last_capture.strays.len(),
            })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Results of the most recent successful capture.
    pub fn last_capture(&self) -> &Capture {
        &self.last_capture
    }

    /// Registered tools, indexed by tool number.
    pub fn registered_tools(&self) -> &[ToolHandle] {
        &self.tools
    }

    /// Number of registered tools, including ones whose handle was freed.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Port handle backing `tool`, or `None` once the device has freed it.
    pub fn port_handle(&self, tool: ToolNum) -> Option<PortHandle> {
        self.tools
            .get(tool.index())
            .filter(|t| t.is_active())
            .map(|t| t.handle)
    }

    /// Whether the session has a usable, initialized device.
    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    /// Tracking mode last commanded to the device.
    pub fn tracking_mode(&self) -> TrackingMode {
        self.mode
    }

    /// Endpoint of the most recently opened device.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Configuration the session was created with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The transport used to find and open devices.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: Transport> Drop for TrackingSession<T> {
    fn drop(&mut self) {
        self.close_link();
    }
}

/// Steps 4 to 6 of the registration handshake: write the definition, then
/// initialize and enable every handle waiting for it.
fn load_and_enable<D: Device>(
    device: &mut D,
    handle: PortHandle,
    definition: &ToolDefinition,
    priority: ToolPriority,
) -> Result<(), RegisterError> {
    for (offset, chunk) in definition.chunks() {
        device
            .write_tool_data(handle, offset, chunk)
            .map_err(stage_error(RegistrationStage::WriteDefinition { handle, offset }))?;
    }
    debug!("Polaris: tool definition written to {}", handle);

    let uninitialized = device
        .port_handles(HandleCategory::Uninitialized)
        .map_err(stage_error(RegistrationStage::ListUninitializedHandles))?;
    for pending in uninitialized {
        device
            .initialize_port_handle(pending)
            .map_err(stage_error(RegistrationStage::InitializeHandle(pending)))?;
        debug!("Polaris: initialized port handle {}", pending);
    }

    let unenabled = device
        .port_handles(HandleCategory::Unenabled)
        .map_err(stage_error(RegistrationStage::ListUnenabledHandles))?;
    for pending in unenabled {
        device
            .enable_port_handle(pending, priority)
            .map_err(stage_error(RegistrationStage::EnableHandle(pending)))?;
        debug!("Polaris: enabled port handle {} ({:?})", pending, priority);
    }

    Ok(())
}

/// Marks every live tool on a freed handle as released; the device may hand
/// those values out again.
fn release_handles(tools: &mut [ToolHandle], freed: &[PortHandle]) {
    for entry in tools
        .iter_mut()
        .filter(|t| t.is_active() && freed.contains(&t.handle))
    {
        let handle = entry.handle;
        warn!(
            "Polaris: device freed port handle {} of tool {}; tool is now disabled",
            handle, entry.tool
        );
        entry.released = true;
    }
}

fn stage_error(stage: RegistrationStage) -> impl FnOnce(TransportError) -> RegisterError {
    move |source| RegisterError::Stage { stage, source }
}
