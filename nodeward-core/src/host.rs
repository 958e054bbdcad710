// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use anyhow::Result;
use std::net::{IpAddr, Ipv4Addr};
use sysinfo::System;
use tracing::{debug, info};

/// Process name of the container shim that can outlive its services.
pub const DEFAULT_SHIM_PROCESS: &str = "containerd-shim-runhcs-v1.exe";

/// IPv4 addresses of every non-loopback interface.
pub fn local_ipv4_addrs() -> Vec<Ipv4Addr> {
    let mut addrs = Vec::new();
    if let Ok(interfaces) = if_addrs::get_if_addrs() {
        for iface in interfaces {
            if iface.is_loopback() {
                continue;
            }
            match iface.addr.ip() {
                IpAddr::V4(v4) => addrs.push(v4),
                IpAddr::V6(_) => continue,
            }
        }
    }
    debug!(?addrs, "local interface addresses");
    addrs
}

/// Terminates leftover processes.
pub trait ProcessReaper: Send + Sync {
    /// Kills every process named exactly `name`, returning how many were signalled.
    fn kill_by_name(&self, name: &str) -> Result<usize>;
}

#[derive(Default)]
pub struct SysinfoReaper;

impl ProcessReaper for SysinfoReaper {
    fn kill_by_name(&self, name: &str) -> Result<usize> {
        let mut sys = System::new();
        sys.refresh_processes();
        let mut killed = 0;
        for process in sys.processes_by_exact_name(name) {
            if process.kill() {
                info!(pid = %process.pid(), name, "killed process");
                killed += 1;
            }
        }
        Ok(killed)
    }
}
