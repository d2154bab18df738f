// SPDX-License-Identifier: MIT OR Apache-2.0
//! Process and restart-policy specification for a bridged MCP server.

use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration for spawning and supervising an MCP server subprocess.
#[derive(Debug, Clone)]
pub struct McpServerSpec {
    /// Executable command to run.
    pub command: String,
    /// Arguments passed to the command.
    pub args: Vec<String>,
    /// Additional environment variables for the process.
    pub env: BTreeMap<String, String>,
    /// Optional working directory override.
    pub cwd: Option<String>,
    /// Consecutive crash count after which the bridge gives up restarting.
    pub max_consecutive_failures: u32,
    /// Delay before the first restart attempt after a crash.
    pub restart_initial_backoff: Duration,
    /// Upper bound the exponential restart backoff is capped at.
    pub restart_max_backoff: Duration,
}

impl McpServerSpec {
    /// Create a spec with the given command and the supervisor's default
    /// restart policy.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            max_consecutive_failures: 5,
            restart_initial_backoff: Duration::from_millis(250),
            restart_max_backoff: Duration::from_secs(30),
        }
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}
