//! Session configuration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::protocol::{ReplyOptions, ToolKind, ToolPriority, DEFAULT_MAX_CANDIDATES};

/// Tunables for a [`TrackingSession`](crate::TrackingSession).
///
/// The defaults match a Polaris with passive wireless tools.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    /// Number of candidate endpoints probed on connect.
    pub max_candidates: usize,
    /// Kind of port handle requested for each registered tool.
    pub tool_kind: ToolKind,
    /// Priority each tool is enabled with.
    pub enable_priority: ToolPriority,
    /// Data requested by each capture poll.
    pub reply_options: ReplyOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_candidates: DEFAULT_MAX_CANDIDATES,
            tool_kind: ToolKind::default(),
            enable_priority: ToolPriority::default(),
            reply_options: ReplyOptions::default(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many candidate endpoints connect probes.
    pub fn max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    /// Sets the kind of port handle requested for tools.
    pub fn tool_kind(mut self, kind: ToolKind) -> Self {
        self.tool_kind = kind;
        self
    }

    /// Sets the tracking priority tools are enabled with.
    pub fn enable_priority(mut self, priority: ToolPriority) -> Self {
        self.enable_priority = priority;
        self
    }

    /// Sets the poll reply options.
    ///
    /// Transforms are always requested; without them a capture carries no poses.
    pub fn reply_options(mut self, options: ReplyOptions) -> Self {
        self.reply_options = options | ReplyOptions::XFORMS_AND_STATUS;
        self
    }
}
