use crate::error::{Result, RingError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Membership service consulted when a node starts and stops.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Every node name known to the cluster, sorted.
    async fn current_members(&self) -> Result<Vec<String>>;

    async fn announce_up(&self, node: &str) -> Result<()>;

    async fn announce_down(&self, node: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberState {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberStatus {
    pub name: String,
    pub state: MemberState,
    pub since: DateTime<Utc>,
}

/// Fixed member list taken from configuration.
#[derive(Debug, Clone)]
pub struct StaticCoordinator {
    members: Vec<String>,
}

impl StaticCoordinator {
    pub fn new(members: Vec<String>) -> Self {
        let mut members = members;
        members.sort();
        members.dedup();
        Self { members }
    }
}

#[async_trait]
impl Coordinator for StaticCoordinator {
    async fn current_members(&self) -> Result<Vec<String>> {
        Ok(self.members.clone())
    }

    async fn announce_up(&self, node: &str) -> Result<()> {
        tracing::info!("{} is up (static membership)", node);
        Ok(())
    }

    async fn announce_down(&self, node: &str) -> Result<()> {
        tracing::info!("{} is down (static membership)", node);
        Ok(())
    }
}

/// Membership table hosted by the leader node.
///
/// Configured members start out `Down` until they announce themselves.
#[derive(Debug, Default)]
pub struct MembershipTable {
    members: RwLock<BTreeMap<String, MemberStatus>>,
}

impl MembershipTable {
    pub fn new(seed: impl IntoIterator<Item = String>) -> Self {
        let now = Utc::now();
        let members = seed
            .into_iter()
            .map(|name| {
                let status = MemberStatus {
                    name: name.clone(),
                    state: MemberState::Down,
                    since: now,
                };
                (name, status)
            })
            .collect();

        Self {
            members: RwLock::new(members),
        }
    }

    pub async fn statuses(&self) -> Vec<MemberStatus> {
        self.members.read().await.values().cloned().collect()
    }

    pub async fn live_members(&self) -> Vec<String> {
        self.members
            .read()
            .await
            .values()
            .filter(|status| status.state == MemberState::Up)
            .map(|status| status.name.clone())
            .collect()
    }

    async fn set_state(&self, node: &str, state: MemberState) -> Result<()> {
        let node = node.trim();
        if node.is_empty() {
            return Err(RingError::InvalidRequest(
                "member name cannot be empty".to_string(),
            ));
        }

        let mut members = self.members.write().await;
        let status = members
            .entry(node.to_string())
            .or_insert_with(|| MemberStatus {
                name: node.to_string(),
                state,
                since: Utc::now(),
            });

        if status.state != state {
            status.state = state;
            status.since = Utc::now();
        }

        tracing::info!("member {} is now {:?}", node, state);
        Ok(())
    }
}

#[async_trait]
impl Coordinator for MembershipTable {
    async fn current_members(&self) -> Result<Vec<String>> {
        Ok(self.members.read().await.keys().cloned().collect())
    }

    async fn announce_up(&self, node: &str) -> Result<()> {
        self.set_state(node, MemberState::Up).await
    }

    async fn announce_down(&self, node: &str) -> Result<()> {
        self.set_state(node, MemberState::Down).await
    }
}

/// Client for a membership table served by the leader over HTTP.
#[derive(Clone)]
pub struct RemoteCoordinator {
    http: reqwest::Client,
    base_url: String,
}

impl RemoteCoordinator {
    pub fn new(leader_address: &str) -> Self {
        let address = leader_address.trim().trim_end_matches('/');
        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };

        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn statuses(&self) -> Result<Vec<MemberStatus>> {
        let url = format!("{}/coordinator/members", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|error| self.unavailable(error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.remote_error(status.as_u16(), body));
        }

        response
            .json::<Vec<MemberStatus>>()
            .await
            .map_err(|error| self.unavailable(error))
    }

    async fn announce(&self, action: &str, node: &str) -> Result<()> {
        let url = format!("{}/coordinator/{}/{}", self.base_url, action, node);
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|error| self.unavailable(error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.remote_error(status.as_u16(), body));
        }

        Ok(())
    }

    fn unavailable(&self, error: reqwest::Error) -> RingError {
        RingError::ReplicaUnavailable {
            node: self.base_url.clone(),
            reason: format!("coordinator: {}", error),
        }
    }

    fn remote_error(&self, status: u16, body: String) -> RingError {
        RingError::Remote {
            node: self.base_url.clone(),
            status,
            body,
        }
    }
}

#[async_trait]
impl Coordinator for RemoteCoordinator {
    async fn current_members(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .statuses()
            .await?
            .into_iter()
            .map(|status| status.name)
            .collect();
        names.sort();
        Ok(names)
    }

    async fn announce_up(&self, node: &str) -> Result<()> {
        self.announce("up", node).await
    }

    async fn announce_down(&self, node: &str) -> Result<()> {
        self.announce("down", node).await
    }
}
