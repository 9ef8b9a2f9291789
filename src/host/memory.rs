//! In-memory host fakes.
//!
//! These back the test suite and `--dry-run`: the check packs are generic
//! over the host traits, so pointing them at these instead of the live
//! implementations exercises the exact same probe/corrector code paths.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{
    CommandOutput, DiskUsage, HostError, ProcessRunner, RegValue, Registry, ServiceManager,
    ServiceState,
};

/// Registry backed by a `HashMap` keyed on `(key path, value name)`.
#[derive(Default)]
pub struct MemoryRegistry {
    values: Mutex<HashMap<(String, String), RegValue>>,
    /// When set, every operation fails with this message.
    fail_with: Mutex<Option<String>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, path: &str, name: &str, value: RegValue) {
        self.values
            .lock()
            .unwrap()
            .insert((path.to_string(), name.to_string()), value);
    }

    /// Make every subsequent registry call fail. Used to test failure policies.
    pub fn fail_all(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }

    fn check_failure(&self) -> Result<(), HostError> {
        match &*self.fail_with.lock().unwrap() {
            Some(msg) => Err(HostError::new(msg.clone())),
            None => Ok(()),
        }
    }
}

impl Registry for MemoryRegistry {
    fn read_value(&self, path: &str, name: &str) -> Result<Option<RegValue>, HostError> {
        self.check_failure()?;
        Ok(self
            .values
            .lock()
            .unwrap()
            .get(&(path.to_string(), name.to_string()))
            .cloned())
    }

    fn write_value(&self, path: &str, name: &str, value: RegValue) -> Result<(), HostError> {
        self.check_failure()?;
        self.set(path, name, value);
        Ok(())
    }

    fn delete_value(&self, path: &str, name: &str) -> Result<bool, HostError> {
        self.check_failure()?;
        Ok(self
            .values
            .lock()
            .unwrap()
            .remove(&(path.to_string(), name.to_string()))
            .is_some())
    }
}

/// Service manager holding per-service states; `stop`/`start` flip them
/// immediately, so bounded waits resolve on the first poll.
#[derive(Default)]
pub struct MemoryServices {
    states: Mutex<HashMap<String, ServiceState>>,
}

impl MemoryServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_running(services: &[&str]) -> Self {
        let mgr = Self::new();
        for s in services {
            mgr.states
                .lock()
                .unwrap()
                .insert(s.to_string(), ServiceState::Running);
        }
        mgr
    }
}

impl ServiceManager for MemoryServices {
    fn status(&self, service: &str) -> Result<ServiceState, HostError> {
        self.states
            .lock()
            .unwrap()
            .get(service)
            .copied()
            .ok_or_else(|| HostError::new(format!("no such service: {}", service)))
    }

    fn stop(&self, service: &str) -> Result<(), HostError> {
        self.states
            .lock()
            .unwrap()
            .insert(service.to_string(), ServiceState::Stopped);
        Ok(())
    }

    fn start(&self, service: &str) -> Result<(), HostError> {
        self.states
            .lock()
            .unwrap()
            .insert(service.to_string(), ServiceState::Running);
        Ok(())
    }
}

/// Runner that replays scripted outputs keyed on the program name and
/// records every invocation.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<HashMap<String, CommandOutput>>,
    invocations: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, program: &str, exit_code: i32, stdout: &str) {
        self.responses.lock().unwrap().insert(
            program.to_string(),
            CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        );
    }

    /// Script a failure with empty stdout and the given stderr, the shape
    /// reg.exe and friends produce on error.
    pub fn respond_failure(&self, program: &str, exit_code: i32, stderr: &str) {
        self.responses.lock().unwrap().insert(
            program.to_string(),
            CommandOutput {
                exit_code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        );
    }

    /// Full command lines seen so far, e.g. `"netsh winsock reset"`.
    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, HostError> {
        let mut line = program.to_string();
        for a in args {
            line.push(' ');
            line.push_str(a);
        }
        self.invocations.lock().unwrap().push(line);

        match self.responses.lock().unwrap().get(program) {
            Some(out) => Ok(out.clone()),
            None => Ok(CommandOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            }),
        }
    }
}

/// Fixed total/free answer, or a forced read failure.
pub struct FixedDiskUsage {
    result: Result<(u64, u64), String>,
}

impl FixedDiskUsage {
    pub fn new(total: u64, free: u64) -> Self {
        Self {
            result: Ok((total, free)),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
        }
    }
}

impl DiskUsage for FixedDiskUsage {
    fn query(&self, _root: &str) -> Result<(u64, u64), HostError> {
        self.result.clone().map_err(HostError)
    }
}
