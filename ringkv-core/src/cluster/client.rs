use super::peers::PeerDirectory;
use super::transport::Transport;
use crate::error::{Result, RingError};
use crate::rpc::RpcReply;
use async_trait::async_trait;
use std::sync::Arc;

pub const INTERNAL_RPC_PATH: &str = "/internal/rpc";

/// Replicas that did not answer, comma separated.
pub const UNREACHABLE_HEADER: &str = "x-ringkv-unreachable";

/// HTTP transport between ring nodes.
///
/// Each message is posted as a plain-text body to the peer's internal RPC
/// endpoint; the reply body is returned unchanged and the
/// `x-ringkv-unreachable` header becomes the reply's unreachable list.
#[derive(Clone)]
pub struct ClusterClient {
    http: reqwest::Client,
    peers: Arc<PeerDirectory>,
}

impl ClusterClient {
    pub fn new(peers: Arc<PeerDirectory>) -> Self {
        Self {
            http: reqwest::Client::new(),
            peers,
        }
    }

    fn rpc_url(&self, node: &str) -> Result<String> {
        let address = self.peers.address_of(node)?;
        Ok(format!("http://{}{}", address, INTERNAL_RPC_PATH))
    }
}

#[async_trait]
impl Transport for ClusterClient {
    async fn call(&self, node: &str, message: &str) -> Result<RpcReply> {
        let url = self.rpc_url(node)?;
        tracing::debug!("{} <= {}", node, message);

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(message.to_string())
            .send()
            .await
            .map_err(|error| RingError::ReplicaUnavailable {
                node: node.to_string(),
                reason: error.to_string(),
            })?;

        let status = response.status();
        let unreachable = parse_unreachable(response.headers());
        let body = response
            .text()
            .await
            .map_err(|error| RingError::ReplicaUnavailable {
                node: node.to_string(),
                reason: format!("failed reading reply: {}", error),
            })?;

        if !status.is_success() {
            return Err(RingError::Remote {
                node: node.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(RpcReply { body, unreachable })
    }
}

fn parse_unreachable(headers: &reqwest::header::HeaderMap) -> Vec<String> {
    headers
        .get(UNREACHABLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|node| !node.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
