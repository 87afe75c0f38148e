//! Configuration for a forwarding node.
//!
//! Values come from an optional file plus `ICN_*` environment variables,
//! layered with the `config` crate. Anything not given falls back to
//! [`ForwarderConfig::default`].

use anyhow::{Context, Result};
use rust_icn_common::{types::FaceId, Error};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Prefix of the environment variables read by [`ForwarderConfig::load`].
pub const ENV_PREFIX: &str = "ICN";

/// A route installed at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Name prefix in URI form
    pub prefix: String,

    /// Outgoing faces, in preference order
    pub faces: Vec<i32>,

    /// Static routes survive `clear()`
    #[serde(default)]
    pub static_route: bool,
}

impl RouteConfig {
    pub fn face_ids(&self) -> Vec<FaceId> {
        self.faces.iter().copied().map(FaceId).collect()
    }
}

/// A content object pinned in the Content Store at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticContentConfig {
    pub name: String,
    pub payload: String,
}

/// Forwarder configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Period of the ageing sweep (in milliseconds)
    pub ageing_interval_ms: u64,

    /// Idle time after which a non-static CS entry is evicted (in milliseconds)
    pub cs_timeout_ms: u64,

    /// Age after which a PIT entry may be dropped (in milliseconds)
    pub pit_timeout_ms: u64,

    /// Retransmissions allowed before a timed out PIT entry is dropped
    pub pit_retransmits: u32,

    /// Hand unmatched Interests to the local application instead of the network
    pub interest_to_app: bool,

    pub routes: Vec<RouteConfig>,

    pub static_content: Vec<StaticContentConfig>,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            ageing_interval_ms: 3000,
            cs_timeout_ms: 10000,
            pit_timeout_ms: 10000,
            pit_retransmits: 3,
            interest_to_app: false,
            routes: Vec::new(),
            static_content: Vec::new(),
        }
    }
}

impl ForwarderConfig {
    /// Load the configuration from `path` (if any) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read forwarder configuration")?;

        let config: Self = settings
            .try_deserialize()
            .context("Failed to parse forwarder configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the forwarder cannot run with.
    pub fn validate(&self) -> rust_icn_common::Result<()> {
        if self.ageing_interval_ms == 0 {
            return Err(Error::Config("ageing_interval_ms must be positive".into()));
        }

        for route in &self.routes {
            if route.faces.is_empty() {
                return Err(Error::Config(format!(
                    "route {} has no faces",
                    route.prefix
                )));
            }
        }

        Ok(())
    }

    pub fn ageing_interval(&self) -> Duration {
        Duration::from_millis(self.ageing_interval_ms)
    }

    pub fn cs_timeout(&self) -> Duration {
        Duration::from_millis(self.cs_timeout_ms)
    }

    pub fn pit_timeout(&self) -> Duration {
        Duration::from_millis(self.pit_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = ForwarderConfig::default();
        assert_eq!(config.pit_timeout(), Duration::from_secs(10));
        assert_eq!(config.pit_retransmits, 3);
        assert!(!config.interest_to_app);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_from_file_keeps_defaults_for_missing_keys() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .unwrap();
        write!(
            file,
            r#"{{
                "pit_retransmits": 5,
                "routes": [{{ "prefix": "/a/b", "faces": [1, 2] }}],
                "static_content": [{{ "name": "/x/y", "payload": "hello" }}]
            }}"#
        )
        .unwrap();

        let config = ForwarderConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.pit_retransmits, 5);
        assert_eq!(config.ageing_interval_ms, 3000);
        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.routes[0].face_ids(), vec![FaceId(1), FaceId(2)]);
        assert!(!config.routes[0].static_route);
        assert_eq!(config.static_content[0].payload, "hello");
    }

    #[test]
    fn rejects_zero_ageing_interval() {
        let config = ForwarderConfig {
            ageing_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_route_without_faces() {
        let config = ForwarderConfig {
            routes: vec![RouteConfig {
                prefix: "/a".into(),
                faces: vec![],
                static_route: false,
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
