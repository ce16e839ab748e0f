//! Tracking device discovery.
//!
//! Walks the transport's candidate endpoints in order, probing each one, and
//! opens the first device that answers.
//!
//! # Example
//!
//! ```ignore
//! use polaris_tracking::discovery::DeviceScanner;
//!
//! let mut scanner = DeviceScanner::new(&mut transport);
//! for endpoint in scanner.scan() {
//!     println!("Found tracker on {}", endpoint);
//! }
//! ```

use log::{debug, warn};

use crate::error::ConnectError;
use crate::protocol::DEFAULT_MAX_CANDIDATES;
use crate::transport::Transport;

/// A device link opened by discovery, with the endpoint it was found on.
pub struct OpenedDevice<D> {
    pub endpoint: String,
    pub device: D,
}

/// Bounded, ordered scan over a transport's candidate endpoints.
pub struct DeviceScanner<'a, T: Transport> {
    transport: &'a mut T,
    max_candidates: usize,
}

impl<'a, T: Transport> DeviceScanner<'a, T> {
    /// Create a scanner probing up to the default 20 candidates.
    pub fn new(transport: &'a mut T) -> Self {
        Self {
            transport,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }

    /// Limit the number of candidate endpoints probed.
    pub fn max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    /// Returns the names of all candidate endpoints where a device answers a probe.
    ///
    /// Nothing is opened.
    pub fn scan(&mut self) -> Vec<String> {
        let mut found = Vec::new();
        for index in 0..self.max_candidates {
            let Some(endpoint) = self.transport.endpoint_name(index) else {
                continue;
            };
            if self.transport.probe(&endpoint).is_ok() {
                found.push(endpoint);
            }
        }
        found
    }

    /// Opens the first candidate endpoint that answers a probe and opens cleanly.
    ///
    /// A candidate that probes fine but fails to open is skipped, not fatal.
    pub fn open_first(&mut self) -> Result<OpenedDevice<T::Device>, ConnectError> {
        for index in 0..self.max_candidates {
            let Some(endpoint) = self.transport.endpoint_name(index) else {
                continue;
            };

            if let Err(e) = self.transport.probe(&endpoint) {
                debug!("Polaris: no device on {}: {}", endpoint, e);
                continue;
            }

            match self.transport.open(&endpoint) {
                Ok(device) => {
                    debug!("Polaris: opened device on {}", endpoint);
                    return Ok(OpenedDevice { endpoint, device });
                }
                Err(e) => {
                    warn!(
                        "Polaris: device found on {} but could not be opened: {}",
                        endpoint, e
                    );
                    continue;
                }
            }
        }

        Err(ConnectError::NoDeviceFound {
            candidates: self.max_candidates,
        })
    }
}
