// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Runs a local script and hands back what it printed.
pub trait CommandRunner: Send + Sync {
    /// Combined stdout and stderr. A non-zero exit is an error.
    fn run(&self, script: &str) -> Result<String>;
}

/// Runs scripts through `powershell.exe -File`.
pub struct PowershellRunner {
    powershell: PathBuf,
}

impl Default for PowershellRunner {
    fn default() -> Self {
        Self::new("powershell.exe")
    }
}

impl PowershellRunner {
    pub fn new(powershell: impl Into<PathBuf>) -> Self {
        Self { powershell: powershell.into() }
    }
}

impl CommandRunner for PowershellRunner {
    fn run(&self, script: &str) -> Result<String> {
        debug!(script, "running pre-script");
        let output = Command::new(&self.powershell)
            .args(["-NonInteractive", "-NoProfile", "-ExecutionPolicy", "Bypass", "-File", script])
            .output()
            .with_context(|| format!("failed to launch {}", self.powershell.display()))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if !output.status.success() {
            bail!("{} exited with {}: {}", script, output.status, combined.trim());
        }
        Ok(combined)
    }
}
