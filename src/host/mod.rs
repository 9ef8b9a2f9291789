//! Narrow interfaces to the host operating system.
//!
//! Probes and correctors never talk to the registry, service control manager,
//! or disk directly. They go through these traits, so every check is testable
//! against the in-memory fakes in [`memory`] and the engine stays free of
//! OS-specific plumbing.

pub mod memory;
pub mod system;

use std::fmt;
use std::time::{Duration, Instant};

/// A host-level read or mutation failed.
///
/// This is deliberately stringly-typed: the engine never branches on the
/// failure kind, it only records it and lets the probe's failure policy or
/// the step's retry budget decide what happens next.
#[derive(Debug, Clone)]
pub struct HostError(pub String);

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for HostError {}

impl HostError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<std::io::Error> for HostError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}

/// A typed registry value. Only the two kinds the check packs actually
/// read or write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegValue {
    Dword(u32),
    Sz(String),
}

impl fmt::Display for RegValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegValue::Dword(v) => write!(f, "0x{:x}", v),
            RegValue::Sz(s) => write!(f, "{}", s),
        }
    }
}

/// Read/write access to registry values under fully-qualified key paths
/// (e.g. `HKLM\SOFTWARE\Policies\Microsoft\Windows\WindowsUpdate`).
pub trait Registry {
    /// Read a single value. `Ok(None)` means the key or value does not exist;
    /// that is an answer, not an error.
    fn read_value(&self, path: &str, name: &str) -> Result<Option<RegValue>, HostError>;

    /// Create or overwrite a value, creating the key path if needed.
    fn write_value(&self, path: &str, name: &str, value: RegValue) -> Result<(), HostError>;

    /// Delete a value. Returns `Ok(false)` if it was already absent.
    fn delete_value(&self, path: &str, name: &str) -> Result<bool, HostError>;
}

/// Observed state of a Windows service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Running,
    Stopped,
    /// Start/stop pending or any other transitional state.
    Pending,
}

/// Start/stop/query access to the service control manager.
pub trait ServiceManager {
    fn status(&self, service: &str) -> Result<ServiceState, HostError>;

    /// Request a stop. Returns as soon as the request is accepted; callers
    /// that need the service actually down use [`wait_for`] on `status`.
    fn stop(&self, service: &str) -> Result<(), HostError>;

    fn start(&self, service: &str) -> Result<(), HostError>;
}

/// Captured result of one external utility invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external OS utilities (`cleanmgr`, `netsh`, `regsvr32`, PowerShell
/// one-liners) as opaque subprocess calls with captured exit status.
pub trait ProcessRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, HostError>;
}

/// Total and free bytes for the volume containing `root`.
pub trait DiskUsage {
    fn query(&self, root: &str) -> Result<(u64, u64), HostError>;
}

/// Result of a bounded blocking wait. Timing out is a signal for the caller
/// to proceed best-effort, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Reached,
    TimedOut,
}

/// Poll `predicate` every `poll` until it returns true or `timeout` elapses.
/// The engine is synchronous by design, so this is the only form of waiting
/// anywhere in the crate.
pub fn wait_for(timeout: Duration, poll: Duration, mut predicate: impl FnMut() -> bool) -> WaitOutcome {
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return WaitOutcome::Reached;
        }
        if Instant::now() >= deadline {
            return WaitOutcome::TimedOut;
        }
        std::thread::sleep(poll);
    }
}
