// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use anyhow::{bail, Result};
use nodeward_model::FileInfo;
use std::fs;
use tracing::warn;

pub fn file_checksum(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Checks every tracked file against its expected digest. A missing or
/// modified file means the node carries stale binaries and services must
/// not be reconfigured on top of them.
pub fn verify_files(files: &[FileInfo]) -> Result<()> {
    let mut stale = Vec::new();
    for file in files {
        match fs::read(&file.path) {
            Ok(bytes) if file_checksum(&bytes).eq_ignore_ascii_case(&file.checksum) => {}
            Ok(_) => {
                warn!(path = %file.path, "tracked file checksum mismatch");
                stale.push(file.path.as_str());
            }
            Err(e) => {
                warn!(path = %file.path, error = %e, "tracked file unreadable");
                stale.push(file.path.as_str());
            }
        }
    }
    if !stale.is_empty() {
        bail!("tracked files out of date: {}", stale.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_stale_and_missing_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let good = dir.path().join("kubelet.exe");
        let bad = dir.path().join("kube-proxy.exe");
        fs::write(&good, b"kubelet-v1")?;
        fs::write(&bad, b"kube-proxy-v2")?;

        let entry = |path: &std::path::Path, content: &[u8]| FileInfo {
            path: path.to_string_lossy().to_string(),
            checksum: file_checksum(content),
        };

        verify_files(&[entry(&good, b"kubelet-v1")])?;

        let err = verify_files(&[
            entry(&good, b"kubelet-v1"),
            entry(&bad, b"kube-proxy-v1"),
            entry(&dir.path().join("missing.exe"), b""),
        ])
        .unwrap_err()
        .to_string();
        assert!(err.contains("kube-proxy.exe"));
        assert!(err.contains("missing.exe"));
        assert!(!err.contains("kubelet.exe"));
        Ok(())
    }
}
