// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

pub mod document;
pub mod error;
pub mod service;
pub mod version;

pub use document::*;
pub use error::ValidationError;
pub use service::*;
pub use version::compare_versions;

/// Prefix shared by every managed service description. Also used to recognise
/// services this daemon owns on the host.
pub const MANAGED_TAG: &str = "nodeward managed";

/// Annotation the cluster sets to request a document version on a node.
pub const DESIRED_VERSION_ANNOTATION: &str = "nodeward.io/desired-version";

/// Annotation recording the document version currently applied to a node.
pub const VERSION_ANNOTATION: &str = "nodeward.io/version";

/// Annotation asking the external controller to reboot the instance.
pub const REBOOT_ANNOTATION: &str = "nodeward.io/reboot-required";

pub use serde_json;
