// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use crate::error::ValidationError;
use crate::service::{sort_by_priority, validate_services, ServiceDefinition};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every document name is this prefix followed by the version.
pub const DOCUMENT_PREFIX: &str = "services-";

pub const SERVICES_KEY: &str = "services";
pub const FILES_KEY: &str = "files";
pub const ENV_VARS_KEY: &str = "environmentVars";
pub const WATCHED_ENV_VARS_KEY: &str = "watchedEnvironmentVars";

/// A file the node is expected to carry, with the blake3 hex digest of its contents.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileInfo {
    pub path: String,
    pub checksum: String,
}

/// Parsed, validated form of a versioned desired-state document.
/// Services are held in ascending priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationDocument {
    pub version: String,
    pub services: Vec<ServiceDefinition>,
    pub files: Vec<FileInfo>,
    /// Desired values for environment variables the daemon owns.
    pub environment_vars: BTreeMap<String, String>,
    /// Names of every environment variable the daemon owns.
    pub watched_environment_vars: Vec<String>,
}

pub fn document_name(version: &str) -> String {
    format!("{}{}", DOCUMENT_PREFIX, version)
}

pub fn version_from_document_name(name: &str) -> Option<&str> {
    name.strip_prefix(DOCUMENT_PREFIX).filter(|v| !v.is_empty())
}

impl ConfigurationDocument {
    pub fn new(version: impl Into<String>, mut services: Vec<ServiceDefinition>) -> Result<Self, ValidationError> {
        sort_by_priority(&mut services);
        validate_services(&services)?;
        Ok(Self {
            version: version.into(),
            services,
            files: Vec::new(),
            environment_vars: BTreeMap::new(),
            watched_environment_vars: Vec::new(),
        })
    }

    /// Parses the key/value form of a document. Fails closed on missing
    /// required keys and on keys it does not recognise.
    pub fn from_data(version: &str, data: &BTreeMap<String, String>) -> Result<Self, ValidationError> {
        if let Some(key) = data.keys().find(|k| {
            ![SERVICES_KEY, FILES_KEY, ENV_VARS_KEY, WATCHED_ENV_VARS_KEY].contains(&k.as_str())
        }) {
            return Err(ValidationError::UnknownKey(key.clone()));
        }

        let services: Vec<ServiceDefinition> = required(data, SERVICES_KEY)?;
        let files: Vec<FileInfo> = required(data, FILES_KEY)?;
        let environment_vars: BTreeMap<String, String> = optional(data, ENV_VARS_KEY)?;
        let watched_environment_vars: Vec<String> = optional(data, WATCHED_ENV_VARS_KEY)?;

        let mut doc = Self::new(version, services)?;
        doc.files = files;
        doc.environment_vars = environment_vars;
        doc.watched_environment_vars = watched_environment_vars;
        Ok(doc)
    }

    /// Inverse of [`from_data`](Self::from_data).
    pub fn to_data(&self) -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();
        data.insert(SERVICES_KEY.to_string(), to_json(&self.services));
        data.insert(FILES_KEY.to_string(), to_json(&self.files));
        if !self.environment_vars.is_empty() {
            data.insert(ENV_VARS_KEY.to_string(), to_json(&self.environment_vars));
        }
        if !self.watched_environment_vars.is_empty() {
            data.insert(WATCHED_ENV_VARS_KEY.to_string(), to_json(&self.watched_environment_vars));
        }
        data
    }

    pub fn name(&self) -> String {
        document_name(&self.version)
    }

    /// Services flagged for node bootstrap, in document order.
    pub fn bootstrap_services(&self) -> Vec<ServiceDefinition> {
        self.services.iter().filter(|s| s.bootstrap).cloned().collect()
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|s| s.name == name)
    }
}

fn required<T: DeserializeOwned>(
    data: &BTreeMap<String, String>,
    key: &'static str,
) -> Result<T, ValidationError> {
    let raw = data.get(key).ok_or(ValidationError::MissingKey(key))?;
    serde_json::from_str(raw).map_err(|source| ValidationError::Malformed { key, source })
}

fn optional<T: DeserializeOwned + Default>(
    data: &BTreeMap<String, String>,
    key: &'static str,
) -> Result<T, ValidationError> {
    match data.get(key) {
        Some(raw) => serde_json::from_str(raw).map_err(|source| ValidationError::Malformed { key, source }),
        None => Ok(T::default()),
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    // Plain data types with string keys always serialize.
    serde_json::to_string(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn parses_and_sorts_services() {
        let d = data(&[
            (
                "services",
                r#"[
                    {"name":"kube-proxy","command":"kube-proxy.exe --hostname-override=NODE_NAME",
                     "nodeVariables":[{"name":"NODE_NAME","nodeObjectJsonPath":"{.metadata.name}"}],
                     "dependencies":["kubelet"],"priority":2},
                    {"name":"containerd","command":"containerd.exe","bootstrap":true,"priority":0},
                    {"name":"kubelet","command":"kubelet.exe","bootstrap":true,"priority":1,
                     "preScriptVariables":[{"variableName":"HOSTNAME","path":"C:\\k\\hostname.ps1"}]}
                ]"#,
            ),
            ("files", r#"[{"path":"C:\\k\\kubelet.exe","checksum":"ab12"}]"#),
            ("environmentVars", r#"{"HTTP_PROXY":"http://proxy:3128"}"#),
            ("watchedEnvironmentVars", r#"["HTTP_PROXY","NO_PROXY"]"#),
        ]);

        let doc = ConfigurationDocument::from_data("1.2.0", &d).unwrap();
        let names: Vec<_> = doc.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["containerd", "kubelet", "kube-proxy"]);
        assert_eq!(doc.files.len(), 1);
        assert_eq!(doc.environment_vars["HTTP_PROXY"], "http://proxy:3128");
        assert_eq!(doc.watched_environment_vars, vec!["HTTP_PROXY", "NO_PROXY"]);
        assert_eq!(doc.bootstrap_services().len(), 2);
        assert_eq!(doc.name(), "services-1.2.0");

        let again = ConfigurationDocument::from_data("1.2.0", &doc.to_data()).unwrap();
        assert_eq!(again, doc);
    }

    #[test]
    fn fails_closed_on_shape_errors() {
        let missing = data(&[("services", "[]")]);
        assert!(matches!(
            ConfigurationDocument::from_data("1", &missing),
            Err(ValidationError::MissingKey("files"))
        ));

        let unknown = data(&[("services", "[]"), ("files", "[]"), ("extra", "{}")]);
        assert!(matches!(
            ConfigurationDocument::from_data("1", &unknown),
            Err(ValidationError::UnknownKey(k)) if k == "extra"
        ));

        let bad_field = data(&[
            ("services", r#"[{"name":"a","command":"a","priority":0,"restart":true}]"#),
            ("files", "[]"),
        ]);
        assert!(matches!(
            ConfigurationDocument::from_data("1", &bad_field),
            Err(ValidationError::Malformed { key: "services", .. })
        ));
    }

    #[test]
    fn malformed_key_reports_parser_error_once() {
        use std::error::Error;

        let d = data(&[("services", r#"[{"name":"a","priority":0}]"#), ("files", "[]")]);
        let err = ConfigurationDocument::from_data("1", &d).unwrap_err();
        let cause = err.source().map(ToString::to_string).unwrap_or_default();
        assert!(cause.contains("missing field `command`"), "{cause}");

        let mut chain = err.to_string();
        let mut next = err.source();
        while let Some(e) = next {
            chain.push_str(": ");
            chain.push_str(&e.to_string());
            next = e.source();
        }
        assert_eq!(chain.matches("missing field `command`").count(), 1, "{chain}");
        assert_eq!(err.to_string(), "document key \"services\" is malformed");
    }

    #[test]
    fn document_names_round_trip() {
        assert_eq!(version_from_document_name("services-10.0.1"), Some("10.0.1"));
        assert_eq!(version_from_document_name("services-"), None);
        assert_eq!(version_from_document_name("kube-root-ca"), None);
    }
}
