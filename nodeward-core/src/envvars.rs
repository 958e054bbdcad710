// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::process::Command;
use tracing::info;

/// The machine-wide environment block.
pub trait EnvStore: Send + Sync {
    fn get(&self, name: &str) -> Result<Option<String>>;
    fn set(&self, name: &str, value: &str) -> Result<()>;
    fn delete(&self, name: &str) -> Result<()>;
}

const ENVIRONMENT_KEY: &str = r"HKLM\SYSTEM\CurrentControlSet\Control\Session Manager\Environment";

/// Environment store backed by `reg.exe` on the system environment key.
pub struct RegistryEnvStore {
    reg_path: PathBuf,
}

impl Default for RegistryEnvStore {
    fn default() -> Self {
        Self { reg_path: PathBuf::from("reg.exe") }
    }
}

impl RegistryEnvStore {
    pub fn new(reg_path: impl Into<PathBuf>) -> Self {
        Self { reg_path: reg_path.into() }
    }

    fn reg(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new(&self.reg_path)
            .args(args)
            .output()
            .with_context(|| format!("failed to run {}", self.reg_path.display()))
    }
}

/// Value column of a `reg query /v` line: `    NAME    REG_SZ    value`.
fn parse_query(output: &str, name: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut cols = line.trim_start().splitn(3, "    ");
        let key = cols.next()?;
        let kind = cols.next()?;
        if !key.eq_ignore_ascii_case(name) || !kind.starts_with("REG_") {
            return None;
        }
        Some(cols.next().unwrap_or_default().trim_end().to_string())
    })
}

impl EnvStore for RegistryEnvStore {
    fn get(&self, name: &str) -> Result<Option<String>> {
        let out = self.reg(&["query", ENVIRONMENT_KEY, "/v", name])?;
        // reg.exe exits 1 when the value does not exist.
        if !out.status.success() {
            return Ok(None);
        }
        Ok(parse_query(&String::from_utf8_lossy(&out.stdout), name))
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        let out = self.reg(&["add", ENVIRONMENT_KEY, "/v", name, "/t", "REG_SZ", "/d", value, "/f"])?;
        if !out.status.success() {
            bail!("reg add {} failed: {}", name, String::from_utf8_lossy(&out.stderr).trim());
        }
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        if self.get(name)?.is_none() {
            return Ok(());
        }
        let out = self.reg(&["delete", ENVIRONMENT_KEY, "/v", name, "/f"])?;
        if !out.status.success() {
            bail!("reg delete {} failed: {}", name, String::from_utf8_lossy(&out.stderr).trim());
        }
        Ok(())
    }
}

/// Brings every owned variable (watched names plus desired names) to its
/// desired value, deleting owned variables with no desired value. Returns
/// true when anything changed; running processes only see the change after
/// a reboot.
pub fn reconcile_env(
    store: &dyn EnvStore,
    desired: &BTreeMap<String, String>,
    watched: &[String],
) -> Result<bool> {
    let owned: BTreeSet<&str> = watched
        .iter()
        .map(String::as_str)
        .chain(desired.keys().map(String::as_str))
        .collect();

    let mut changed = false;
    for name in owned {
        let current = store.get(name).with_context(|| format!("reading {}", name))?;
        match (desired.get(name), current) {
            (Some(want), have) if have.as_deref() != Some(want.as_str()) => {
                info!(variable = name, "setting environment variable");
                store.set(name, want)?;
                changed = true;
            }
            (None, Some(_)) => {
                info!(variable = name, "removing environment variable");
                store.delete(name)?;
                changed = true;
            }
            _ => {}
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reg_query_output() {
        let out = "\r\nHKEY_LOCAL_MACHINE\\SYSTEM\\CurrentControlSet\\Control\\Session Manager\\Environment\r\n    HTTP_PROXY    REG_SZ    http://proxy.local:3128\r\n\r\n";
        assert_eq!(parse_query(out, "HTTP_PROXY").as_deref(), Some("http://proxy.local:3128"));
        assert_eq!(parse_query(out, "http_proxy").as_deref(), Some("http://proxy.local:3128"));
        assert_eq!(parse_query(out, "NO_PROXY"), None);
    }

    #[test]
    fn parses_values_with_spaces() {
        let out = "    GREETING    REG_EXPAND_SZ    hello   wide  world\r\n";
        assert_eq!(parse_query(out, "GREETING").as_deref(), Some("hello   wide  world"));
    }
}
