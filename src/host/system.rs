//! Live host implementations.
//!
//! Everything here shells out to stock Windows utilities (`reg.exe`,
//! `sc.exe`, PowerShell) through [`SystemRunner`], so the whole surface
//! stays a set of opaque subprocess calls with captured exit status.

use std::process::Command;
use std::sync::Arc;

use super::{
    CommandOutput, DiskUsage, HostError, ProcessRunner, RegValue, Registry, ServiceManager,
    ServiceState,
};

/// [`ProcessRunner`] backed by `std::process::Command`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, HostError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| HostError::new(format!("failed to spawn {}: {}", program, e)))?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// [`Registry`] implemented over `reg.exe`.
pub struct RegTool {
    runner: Arc<dyn ProcessRunner>,
}

impl RegTool {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

impl Registry for RegTool {
    fn read_value(&self, path: &str, name: &str) -> Result<Option<RegValue>, HostError> {
        let out = self.runner.run("reg", &["query", path, "/v", name])?;
        if !out.success() {
            // reg.exe exits 1 both for "key not found" and "value not found",
            // naming the condition on stderr. Only that marker means absent;
            // anything else (access denied, hive unavailable) is a read
            // failure the probe's policy must resolve.
            if out.stderr.contains("unable to find") || out.stdout.contains("unable to find") {
                return Ok(None);
            }
            return Err(HostError::new(format!(
                "reg query {} /v {} failed: {}",
                path,
                name,
                out.stderr.trim()
            )));
        }
        Ok(parse_reg_query(&out.stdout, name))
    }

    fn write_value(&self, path: &str, name: &str, value: RegValue) -> Result<(), HostError> {
        let (kind, data) = match &value {
            RegValue::Dword(v) => ("REG_DWORD", v.to_string()),
            RegValue::Sz(s) => ("REG_SZ", s.clone()),
        };
        let out = self.runner.run(
            "reg",
            &["add", path, "/v", name, "/t", kind, "/d", &data, "/f"],
        )?;
        if !out.success() {
            return Err(HostError::new(format!(
                "reg add {} /v {} failed: {}",
                path,
                name,
                out.stderr.trim()
            )));
        }
        Ok(())
    }

    fn delete_value(&self, path: &str, name: &str) -> Result<bool, HostError> {
        let out = self.runner.run("reg", &["delete", path, "/v", name, "/f"])?;
        if !out.success() {
            if out.stderr.contains("unable to find") {
                return Ok(false);
            }
            return Err(HostError::new(format!(
                "reg delete {} /v {} failed: {}",
                path,
                name,
                out.stderr.trim()
            )));
        }
        Ok(true)
    }
}

/// Parse one value out of `reg query` output. Lines look like:
/// `    StateFlags0112    REG_DWORD    0x2`
fn parse_reg_query(stdout: &str, name: &str) -> Option<RegValue> {
    for line in stdout.lines() {
        let mut parts = line.split_whitespace();
        if parts.next() != Some(name) {
            continue;
        }
        let kind = parts.next()?;
        let data = parts.collect::<Vec<_>>().join(" ");
        return match kind {
            "REG_DWORD" => {
                let raw = data.trim_start_matches("0x");
                u32::from_str_radix(raw, 16).ok().map(RegValue::Dword)
            }
            _ => Some(RegValue::Sz(data)),
        };
    }
    None
}

/// [`ServiceManager`] implemented over `sc.exe`.
pub struct ScTool {
    runner: Arc<dyn ProcessRunner>,
}

impl ScTool {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

impl ServiceManager for ScTool {
    fn status(&self, service: &str) -> Result<ServiceState, HostError> {
        let out = self.runner.run("sc", &["query", service])?;
        if !out.success() {
            return Err(HostError::new(format!(
                "sc query {} failed: {}",
                service,
                out.stderr.trim()
            )));
        }
        // STATE line looks like: `        STATE              : 4  RUNNING`
        for line in out.stdout.lines() {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix("STATE") {
                if rest.contains("RUNNING") {
                    return Ok(ServiceState::Running);
                }
                if rest.contains("STOPPED") {
                    return Ok(ServiceState::Stopped);
                }
                return Ok(ServiceState::Pending);
            }
        }
        Err(HostError::new(format!(
            "sc query {}: no STATE line in output",
            service
        )))
    }

    fn stop(&self, service: &str) -> Result<(), HostError> {
        let out = self.runner.run("sc", &["stop", service])?;
        // 1062 = service not started; stopping an already-stopped service is fine
        if !out.success() && !out.stdout.contains("1062") {
            return Err(HostError::new(format!(
                "sc stop {} failed: {}",
                service,
                out.stderr.trim()
            )));
        }
        Ok(())
    }

    fn start(&self, service: &str) -> Result<(), HostError> {
        let out = self.runner.run("sc", &["start", service])?;
        // 1056 = already running
        if !out.success() && !out.stdout.contains("1056") {
            return Err(HostError::new(format!(
                "sc start {} failed: {}",
                service,
                out.stderr.trim()
            )));
        }
        Ok(())
    }
}

/// [`DiskUsage`] via a PowerShell CIM one-liner. Prints `<free> <size>` in bytes.
pub struct PsDiskUsage {
    runner: Arc<dyn ProcessRunner>,
}

impl PsDiskUsage {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

impl DiskUsage for PsDiskUsage {
    fn query(&self, root: &str) -> Result<(u64, u64), HostError> {
        let drive = root.trim_end_matches('\\');
        let script = format!(
            "$d = Get-CimInstance Win32_LogicalDisk -Filter \"DeviceID='{}'\"; Write-Output \"$($d.FreeSpace) $($d.Size)\"",
            drive
        );
        let out = self
            .runner
            .run("powershell", &["-NoProfile", "-Command", &script])?;
        if !out.success() {
            return Err(HostError::new(format!(
                "disk usage query for {} failed: {}",
                drive,
                out.stderr.trim()
            )));
        }
        let mut parts = out.stdout.split_whitespace();
        let free = parts
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| HostError::new(format!("unparseable disk usage output: {:?}", out.stdout)))?;
        let total = parts
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| HostError::new(format!("unparseable disk usage output: {:?}", out.stdout)))?;
        Ok((total, free))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dword_from_reg_query() {
        let stdout = "\r\nHKEY_LOCAL_MACHINE\\...\\VolumeCaches\\Temporary Files\r\n    StateFlags0112    REG_DWORD    0x2\r\n";
        assert_eq!(
            parse_reg_query(stdout, "StateFlags0112"),
            Some(RegValue::Dword(2))
        );
    }

    #[test]
    fn parses_sz_with_spaces() {
        let stdout = "    WUServer    REG_SZ    http://wsus.corp.local:8530\n";
        assert_eq!(
            parse_reg_query(stdout, "WUServer"),
            Some(RegValue::Sz("http://wsus.corp.local:8530".into()))
        );
    }

    #[test]
    fn missing_value_is_none() {
        assert_eq!(parse_reg_query("    Other    REG_DWORD    0x1\n", "WUServer"), None);
    }

    #[test]
    fn not_found_marker_reads_as_absent() {
        let runner = Arc::new(crate::host::memory::ScriptedRunner::new());
        runner.respond_failure(
            "reg",
            1,
            "ERROR: The system was unable to find the specified registry key or value.\r\n",
        );
        let reg = RegTool::new(runner);
        let value = reg
            .read_value(r"HKLM\SOFTWARE\Policies\Microsoft\Windows\WindowsUpdate", "WUServer")
            .unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn access_denied_read_is_an_error_not_absent() {
        let runner = Arc::new(crate::host::memory::ScriptedRunner::new());
        runner.respond_failure("reg", 1, "ERROR: Access is denied.\r\n");
        let reg = RegTool::new(runner);
        let err = reg
            .read_value(r"HKLM\SOFTWARE\Policies\Microsoft\Windows\WindowsUpdate", "WUServer")
            .unwrap_err();
        assert!(err.to_string().contains("Access is denied"));
    }
}
