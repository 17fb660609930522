use crate::error::{Result, RingError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

/// Network endpoint of a node, as found in its `<name>.json` descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl PeerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Lazily populated cache of peer descriptors.
///
/// A descriptor is read from disk the first time its node is resolved and
/// kept for the life of the process unless `reset` is called.
#[derive(Debug)]
pub struct PeerDirectory {
    config_dir: PathBuf,
    cache: RwLock<HashMap<String, PeerConfig>>,
}

impl PeerDirectory {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn descriptor_path(&self, node: &str) -> PathBuf {
        self.config_dir.join(format!("{}.json", node))
    }

    pub fn peer(&self, node: &str) -> Result<PeerConfig> {
        if let Some(peer) = self.read_cache()?.get(node) {
            return Ok(peer.clone());
        }

        let peer = self.load(node)?;
        self.write_cache()?
            .entry(node.to_string())
            .or_insert_with(|| peer.clone());
        Ok(peer)
    }

    pub fn address_of(&self, node: &str) -> Result<String> {
        Ok(self.peer(node)?.address())
    }

    /// Seeds the cache without touching disk.
    pub fn insert(&self, node: impl Into<String>, peer: PeerConfig) -> Result<()> {
        self.write_cache()?.insert(node.into(), peer);
        Ok(())
    }

    /// Forgets every cached descriptor; the next lookup rereads disk.
    pub fn reset(&self) -> Result<()> {
        self.write_cache()?.clear();
        Ok(())
    }

    fn load(&self, node: &str) -> Result<PeerConfig> {
        let path = self.descriptor_path(node);
        let raw = std::fs::read_to_string(&path).map_err(|error| {
            RingError::UnknownNodeConfiguration(format!(
                "{} (cannot read {}: {})",
                node,
                path.display(),
                error
            ))
        })?;

        serde_json::from_str(&raw).map_err(|error| {
            RingError::UnknownNodeConfiguration(format!(
                "{} (invalid descriptor {}: {})",
                node,
                path.display(),
                error
            ))
        })
    }

    fn read_cache(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, PeerConfig>>> {
        self.cache
            .read()
            .map_err(|_| RingError::Internal("peer cache lock poisoned".to_string()))
    }

    fn write_cache(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, PeerConfig>>> {
        self.cache
            .write()
            .map_err(|_| RingError::Internal("peer cache lock poisoned".to_string()))
    }
}
