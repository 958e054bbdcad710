// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

pub mod config;
pub mod logging;

pub use config::DaemonConfig;
pub use logging::init_logging;
