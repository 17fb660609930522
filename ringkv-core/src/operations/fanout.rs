use crate::cluster::Transport;
use crate::error::{Result, RingError};
use crate::rpc::RpcReply;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanoutMode {
    /// One call completes before the next begins.
    #[default]
    Sequential,
    /// All calls are in flight at once.
    Parallel,
}

#[derive(Debug)]
pub struct PeerReply {
    pub node: String,
    pub outcome: Result<String>,
}

/// Sends one message to a set of peers and collects their replies in
/// call order, whichever mode is used.
#[derive(Clone)]
pub struct Fanout {
    transport: Arc<dyn Transport>,
    mode: FanoutMode,
    call_timeout: Option<Duration>,
}

impl Fanout {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            mode: FanoutMode::default(),
            call_timeout: None,
        }
    }

    pub fn with_mode(mut self, mode: FanoutMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Option<Duration>) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub async fn call_all(&self, peers: &[String], message: &str) -> Vec<PeerReply> {
        match self.mode {
            FanoutMode::Sequential => {
                let mut replies = Vec::with_capacity(peers.len());
                for peer in peers {
                    replies.push(PeerReply {
                        node: peer.clone(),
                        outcome: self.call_one(peer, message).await.map(|reply| reply.body),
                    });
                }
                replies
            }
            FanoutMode::Parallel => {
                let calls = peers.iter().map(|peer| async move {
                    PeerReply {
                        node: peer.clone(),
                        outcome: self.call_one(peer, message).await.map(|reply| reply.body),
                    }
                });
                join_all(calls).await
            }
        }
    }

    /// A single call, bounded by the configured timeout if any.
    pub async fn call_one(&self, peer: &str, message: &str) -> Result<RpcReply> {
        let call = self.transport.call(peer, message);
        match self.call_timeout {
            None => call.await,
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| RingError::ReplicaUnavailable {
                    node: peer.to_string(),
                    reason: format!("no reply within {:?}", limit),
                })?,
        }
    }
}
