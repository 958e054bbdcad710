// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

pub mod control;
pub mod error;
pub mod manager;
pub mod memory;
pub mod sc;
pub mod wait;

pub use control::{PollConfig, ServiceController, ServiceHandle};
pub use error::ScmError;
pub use manager::{ServiceConfig, ServiceManager, ServiceStatus};
pub use memory::{Call, MemoryManager};
pub use sc::ScManager;
pub use tokio_util::sync::CancellationToken;
