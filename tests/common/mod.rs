//! Scripted mock transport for session tests.
//!
//! The mock keeps a small model of the device's port handle table and
//! tracking mode, records every command it receives, and can be told to fail
//! the n-th occurrence of any command. State is shared through
//! [`MockHandle`] so tests can inspect and manipulate the device after the
//! transport has been moved into a session.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use polaris_tracking::{
    CommandResult, Device, ErrorCode, HandleCategory, HandleTransform, PollReply, PortHandle,
    ReplyOptions, StrayMarker, ToolKind, ToolPriority, TransformStatus, Transport,
    TransportError,
};

/// One command as seen by the mock device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Reset,
    Init,
    ListHandles(HandleCategory),
    Free(PortHandle),
    Request(ToolKind),
    Write {
        handle: PortHandle,
        offset: u16,
        data: Vec<u8>,
    },
    InitHandle(PortHandle),
    Enable(PortHandle, ToolPriority),
    StartTracking,
    StopTracking,
    Poll(ReplyOptions),
}

/// Command kinds a failure can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Reset,
    Init,
    ListHandles(HandleCategory),
    Free,
    Request,
    Write,
    InitHandle,
    Enable,
    StartTracking,
    StopTracking,
    Poll,
}

impl Command {
    fn kind(&self) -> Kind {
        match self {
            Command::Reset => Kind::Reset,
            Command::Init => Kind::Init,
            Command::ListHandles(c) => Kind::ListHandles(*c),
            Command::Free(_) => Kind::Free,
            Command::Request(_) => Kind::Request,
            Command::Write { .. } => Kind::Write,
            Command::InitHandle(_) => Kind::InitHandle,
            Command::Enable(..) => Kind::Enable,
            Command::StartTracking => Kind::StartTracking,
            Command::StopTracking => Kind::StopTracking,
            Command::Poll(_) => Kind::Poll,
        }
    }
}

/// How an injected failure manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The device answers `ERROR` with this code.
    Device(ErrorCode),
    /// The link drops while the command is in flight.
    LinkLost,
}

#[derive(Debug, Clone, Copy)]
struct FailRule {
    kind: Kind,
    skip: usize,
    failure: Failure,
}

/// Behaviour of one candidate endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Nothing answers the probe.
    Empty,
    /// A device answers the probe but the port cannot be opened.
    Busy,
    /// A working device.
    Device,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleState {
    Allocated,
    Initialized,
    Enabled,
}

#[derive(Debug)]
pub struct MockState {
    endpoints: Vec<Endpoint>,
    probed: Vec<String>,
    opened: Vec<String>,
    /// Open flag per device handed out, in open order.
    links: Vec<bool>,
    tracking: bool,
    next_handle: u16,
    handles: BTreeMap<PortHandle, HandleState>,
    stale: Vec<PortHandle>,
    poll_replies: VecDeque<PollReply>,
    commands: Vec<Command>,
    fail_rules: Vec<FailRule>,
}

impl MockState {
    fn check(&mut self, link: usize, command: Command) -> CommandResult<()> {
        if !self.links[link] {
            return Err(TransportError::Closed);
        }
        let kind = command.kind();
        self.commands.push(command);

        if let Some(pos) = self.fail_rules.iter().position(|r| r.kind == kind) {
            if self.fail_rules[pos].skip > 0 {
                self.fail_rules[pos].skip -= 1;
            } else {
                let rule = self.fail_rules.remove(pos);
                return match rule.failure {
                    Failure::Device(code) => Err(TransportError::Device(code)),
                    Failure::LinkLost => {
                        self.links[link] = false;
                        Err(TransportError::Closed)
                    }
                };
            }
        }
        Ok(())
    }

    fn require_setup_mode(&self) -> CommandResult<()> {
        if self.tracking {
            Err(TransportError::Device(ErrorCode::BAD_MODE))
        } else {
            Ok(())
        }
    }

    fn handles_in(&self, wanted: HandleState) -> Vec<PortHandle> {
        self.handles
            .iter()
            .filter(|(_, s)| **s == wanted)
            .map(|(h, _)| *h)
            .collect()
    }

    fn default_reply(&self) -> PollReply {
        PollReply {
            transforms: self
                .handles_in(HandleState::Enabled)
                .into_iter()
                .map(|handle| HandleTransform {
                    handle,
                    status: TransformStatus::Missing,
                })
                .collect(),
            strays: Vec::new(),
            frame: None,
        }
    }
}

/// Test-side handle onto the mock's shared state.
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// All commands received so far.
    pub fn commands(&self) -> Vec<Command> {
        self.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }

    /// Number of received commands of `kind`.
    pub fn count(&self, kind: Kind) -> usize {
        self.lock()
            .commands
            .iter()
            .filter(|c| c.kind() == kind)
            .count()
    }

    /// Fail the next command of `kind`.
    pub fn fail_next(&self, kind: Kind, failure: Failure) {
        self.fail_nth(kind, 0, failure);
    }

    /// Let `skip` commands of `kind` succeed, then fail the next one.
    pub fn fail_nth(&self, kind: Kind, skip: usize, failure: Failure) {
        self.lock().fail_rules.push(FailRule {
            kind,
            skip,
            failure,
        });
    }

    /// Queue the reply for an upcoming poll.
    pub fn push_poll_reply(&self, reply: PollReply) {
        self.lock().poll_replies.push_back(reply);
    }

    /// Flag handles the device wants freed.
    pub fn set_stale(&self, handles: Vec<PortHandle>) {
        let mut state = self.lock();
        for h in &handles {
            state.handles.remove(h);
        }
        state.stale = handles;
    }

    /// Make the next allocated port handle `value`.
    pub fn set_next_handle(&self, value: u16) {
        self.lock().next_handle = value;
    }

    /// Drop the most recently opened serial link from the outside.
    pub fn sever_link(&self) {
        if let Some(open) = self.lock().links.last_mut() {
            *open = false;
        }
    }

    /// Whether the most recently opened link is still open.
    pub fn link_open(&self) -> bool {
        self.lock().links.last().copied().unwrap_or(false)
    }

    /// Whether the `index`-th device handed out is still open.
    pub fn device_open(&self, index: usize) -> bool {
        self.lock().links.get(index).copied().unwrap_or(false)
    }

    pub fn is_tracking(&self) -> bool {
        self.lock().tracking
    }

    /// Handles currently allocated on the device.
    pub fn allocated_handles(&self) -> Vec<PortHandle> {
        self.lock().handles.keys().copied().collect()
    }

    pub fn enabled_handles(&self) -> Vec<PortHandle> {
        self.lock().handles_in(HandleState::Enabled)
    }

    pub fn probed(&self) -> Vec<String> {
        self.lock().probed.clone()
    }

    pub fn opened(&self) -> Vec<String> {
        self.lock().opened.clone()
    }
}

/// Builder for [`MockTransport`].
pub struct MockTransportBuilder {
    endpoints: Vec<Endpoint>,
    first_handle: u16,
}

impl MockTransportBuilder {
    /// Endpoint behaviours, indexed like serial port numbers.
    pub fn endpoints(mut self, endpoints: Vec<Endpoint>) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Value of the first port handle the device allocates.
    pub fn first_handle(mut self, value: u16) -> Self {
        self.first_handle = value;
        self
    }

    pub fn build(self) -> (MockTransport, MockHandle) {
        let state = Arc::new(Mutex::new(MockState {
            endpoints: self.endpoints,
            probed: Vec::new(),
            opened: Vec::new(),
            links: Vec::new(),
            tracking: false,
            next_handle: self.first_handle,
            handles: BTreeMap::new(),
            stale: Vec::new(),
            poll_replies: VecDeque::new(),
            commands: Vec::new(),
            fail_rules: Vec::new(),
        }));
        (
            MockTransport {
                state: Arc::clone(&state),
            },
            MockHandle { state },
        )
    }
}

/// Mock serial port scanner.
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder {
            endpoints: vec![Endpoint::Device],
            first_handle: 0x0A,
        }
    }

    /// A single working device on the first endpoint.
    pub fn new() -> (MockTransport, MockHandle) {
        Self::builder().build()
    }
}

pub fn endpoint_name(index: usize) -> String {
    format!("/dev/ttyMOCK{}", index)
}

impl Transport for MockTransport {
    type Device = MockDevice;

    fn endpoint_name(&self, index: usize) -> Option<String> {
        Some(endpoint_name(index))
    }

    fn probe(&mut self, endpoint: &str) -> CommandResult<()> {
        let mut state = self.state.lock().unwrap();
        state.probed.push(endpoint.to_string());
        let index = endpoint
            .trim_start_matches("/dev/ttyMOCK")
            .parse::<usize>()
            .map_err(|_| TransportError::protocol("bad endpoint name"))?;
        match state.endpoints.get(index) {
            Some(Endpoint::Device) | Some(Endpoint::Busy) => Ok(()),
            _ => Err(TransportError::Device(ErrorCode::PROBE_FAIL)),
        }
    }

    fn open(&mut self, endpoint: &str) -> CommandResult<MockDevice> {
        let mut state = self.state.lock().unwrap();
        let index = endpoint
            .trim_start_matches("/dev/ttyMOCK")
            .parse::<usize>()
            .map_err(|_| TransportError::protocol("bad endpoint name"))?;
        match state.endpoints.get(index) {
            Some(Endpoint::Device) => {
                state.opened.push(endpoint.to_string());
                state.links.push(true);
                state.tracking = false;
                Ok(MockDevice {
                    state: Arc::clone(&self.state),
                    link: state.links.len() - 1,
                })
            }
            _ => Err(TransportError::Device(ErrorCode::OPEN_ERROR)),
        }
    }
}

/// Mock open device link.
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
    link: usize,
}

impl MockDevice {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

impl Device for MockDevice {
    fn is_open(&self) -> bool {
        self.lock().links[self.link]
    }

    fn close(&mut self) {
        let link = self.link;
        self.lock().links[link] = false;
    }

    fn reset(&mut self) -> CommandResult<()> {
        let mut state = self.lock();
        state.check(self.link, Command::Reset)?;
        state.tracking = false;
        state.handles.clear();
        state.stale.clear();
        Ok(())
    }

    fn initialize(&mut self) -> CommandResult<()> {
        self.lock().check(self.link, Command::Init)
    }

    fn port_handles(&mut self, category: HandleCategory) -> CommandResult<Vec<PortHandle>> {
        let mut state = self.lock();
        state.check(self.link, Command::ListHandles(category))?;
        state.require_setup_mode()?;
        Ok(match category {
            HandleCategory::All => state.handles.keys().copied().collect(),
            HandleCategory::Stale => state.stale.clone(),
            HandleCategory::Uninitialized => state.handles_in(HandleState::Allocated),
            HandleCategory::Unenabled => state.handles_in(HandleState::Initialized),
            HandleCategory::Enabled => state.handles_in(HandleState::Enabled),
        })
    }

    fn free_port_handle(&mut self, handle: PortHandle) -> CommandResult<()> {
        let mut state = self.lock();
        state.check(self.link, Command::Free(handle))?;
        state.require_setup_mode()?;
        state.stale.retain(|h| *h != handle);
        state.handles.remove(&handle);
        Ok(())
    }

    fn request_port_handle(&mut self, kind: ToolKind) -> CommandResult<PortHandle> {
        let mut state = self.lock();
        state.check(self.link, Command::Request(kind))?;
        state.require_setup_mode()?;
        let handle = PortHandle(state.next_handle);
        state.next_handle += 1;
        state.handles.insert(handle, HandleState::Allocated);
        Ok(handle)
    }

    fn write_tool_data(
        &mut self,
        handle: PortHandle,
        offset: u16,
        chunk: &[u8],
    ) -> CommandResult<()> {
        let mut state = self.lock();
        state.check(self.link, Command::Write {
            handle,
            offset,
            data: chunk.to_vec(),
        })?;
        if !state.handles.contains_key(&handle) {
            return Err(TransportError::Device(ErrorCode::INVALID_PORT));
        }
        Ok(())
    }

    fn initialize_port_handle(&mut self, handle: PortHandle) -> CommandResult<()> {
        let mut state = self.lock();
        state.check(self.link, Command::InitHandle(handle))?;
        state.require_setup_mode()?;
        match state.handles.get_mut(&handle) {
            Some(s) if *s == HandleState::Allocated => {
                *s = HandleState::Initialized;
                Ok(())
            }
            _ => Err(TransportError::Device(ErrorCode::PINIT_FAIL)),
        }
    }

    fn enable_port_handle(
        &mut self,
        handle: PortHandle,
        priority: ToolPriority,
    ) -> CommandResult<()> {
        let mut state = self.lock();
        state.check(self.link, Command::Enable(handle, priority))?;
        state.require_setup_mode()?;
        match state.handles.get_mut(&handle) {
            Some(s) if *s == HandleState::Initialized => {
                *s = HandleState::Enabled;
                Ok(())
            }
            _ => Err(TransportError::Device(ErrorCode::PORT_NOT_INIT)),
        }
    }

    fn start_tracking(&mut self) -> CommandResult<()> {
        let mut state = self.lock();
        state.check(self.link, Command::StartTracking)?;
        state.tracking = true;
        Ok(())
    }

    fn stop_tracking(&mut self) -> CommandResult<()> {
        let mut state = self.lock();
        state.check(self.link, Command::StopTracking)?;
        state.tracking = false;
        Ok(())
    }

    fn poll(&mut self, options: ReplyOptions) -> CommandResult<PollReply> {
        let mut state = self.lock();
        state.check(self.link, Command::Poll(options))?;
        if !state.tracking {
            return Err(TransportError::Device(ErrorCode::BAD_MODE));
        }
        match state.poll_replies.pop_front() {
            Some(reply) => Ok(reply),
            None => Ok(state.default_reply()),
        }
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// A tool definition image whose bytes encode their own offset.
pub fn rom(seed: u8) -> polaris_tracking::ToolDefinition {
    let mut data = [0u8; polaris_tracking::TOOL_DEFINITION_SIZE];
    for (i, b) in data.iter_mut().enumerate() {
        *b = seed.wrapping_add((i / 64) as u8);
    }
    polaris_tracking::ToolDefinition::new(data)
}

/// A stray marker at the given position.
pub fn stray(x: f64, y: f64, z: f64) -> StrayMarker {
    StrayMarker::new(polaris_tracking::Position3::new(x, y, z))
}
