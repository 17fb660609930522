use ringkv_core::{DEFAULT_PARTITIONS, FanoutMode, NodeOptions, PeerConfig, Result, RingError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A node's own descriptor, `<config_dir>/<name>.json`.
///
/// Peers read the same files for `host` and `port`. At startup every
/// member's file is also checked to describe the same ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Listen address when it differs from the advertised `host:port`.
    #[serde(default)]
    pub bind_addr: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default = "default_partitions")]
    pub partitions: u32,
    /// HTTP address of the leader hosting the membership table.
    #[serde(default)]
    pub coordinator: Option<String>,
    #[serde(default)]
    pub fanout: FanoutMode,
    /// Unset means a replica call waits as long as the peer keeps the
    /// connection open.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
    /// How long in-flight requests may run after a shutdown signal before
    /// they are abandoned.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_partitions() -> u32 {
    DEFAULT_PARTITIONS
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

impl Settings {
    pub fn descriptor_path(config_dir: &Path, name: &str) -> PathBuf {
        config_dir.join(format!("{}.json", name))
    }

    pub fn load(config_dir: &Path, name: &str) -> Result<Self> {
        let path = Self::descriptor_path(config_dir, name);
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Json)
                    .required(true),
            )
            .add_source(
                ::config::Environment::with_prefix("RINGKV")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("members"),
            )
            .build()
            .map_err(|e| RingError::Config(format!("{}: {}", path.display(), e)))?;

        let settings: Settings = settings
            .try_deserialize()
            .map_err(|e| RingError::Config(format!("{}: {}", path.display(), e)))?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(RingError::Config("port cannot be 0".to_string()));
        }
        if self.partitions == 0 {
            return Err(RingError::Config(
                "partitions must be at least 1".to_string(),
            ));
        }
        if let Some(coordinator) = &self.coordinator {
            if coordinator.trim().is_empty() {
                return Err(RingError::Config(
                    "coordinator address cannot be blank".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        self.bind_addr
            .clone()
            .filter(|addr| !addr.trim().is_empty())
            .unwrap_or_else(|| format!("{}:{}", self.host, self.port))
    }

    /// Names this node's ring is built from: the configured members plus
    /// the node itself.
    pub fn ring_members(&self, name: &str) -> BTreeSet<String> {
        self.members
            .iter()
            .map(|member| member.trim())
            .chain(std::iter::once(name.trim()))
            .filter(|member| !member.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Fails unless `peer` would build the same ring as this node.
    pub fn check_same_ring(&self, name: &str, peer_name: &str, peer: &Settings) -> Result<()> {
        if self.partitions != peer.partitions {
            return Err(RingError::Config(format!(
                "{} uses {} partitions but {} uses {}",
                name, self.partitions, peer_name, peer.partitions
            )));
        }

        let own = self.ring_members(name);
        let theirs = peer.ring_members(peer_name);
        if own != theirs {
            return Err(RingError::Config(format!(
                "{} has members {:?} but {} has {:?}",
                name, own, peer_name, theirs
            )));
        }
        Ok(())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn peer_config(&self) -> PeerConfig {
        PeerConfig {
            host: self.host.clone(),
            port: self.port,
        }
    }

    pub fn node_options(&self) -> NodeOptions {
        NodeOptions {
            partitions: self.partitions,
            fanout_mode: self.fanout,
            call_timeout: self.call_timeout_ms.map(Duration::from_millis),
        }
    }
}
