use super::fanout::Fanout;
use crate::object::{SiblingSet, VersionedValue, decode_reply};
use crate::ring::HashRing;
use crate::rpc::{RpcCommand, RpcRequest, validate_key};
use crate::storage::{SiblingStore, SlotKey};
use crate::vclock::VectorClock;
use crate::{Result, RingError};
use std::sync::Arc;

#[derive(Clone)]
pub struct PutValueOperation {
    node_name: String,
    ring: Arc<HashRing>,
    store: Arc<SiblingStore>,
    fanout: Arc<Fanout>,
}

#[derive(Debug, Clone)]
pub struct PutValueOperationRequest {
    pub key: String,
    pub vclock: VectorClock,
    pub value: String,
    /// Number of replicas; 0 applies locally without consulting the ring.
    pub n: usize,
    /// Received from another ring member; served here even when this
    /// node's ring would route it elsewhere.
    pub forwarded: bool,
}

#[derive(Debug, Clone)]
pub struct PutValueOperationResult {
    /// Sibling set stored on the node that applied the write.
    pub siblings: SiblingSet,
    /// Replicas that did not acknowledge the write, as reported by the node
    /// that coordinated it.
    pub unreachable: Vec<String>,
    pub forwarded_to: Option<String>,
}

impl PutValueOperationResult {
    pub fn is_degraded(&self) -> bool {
        !self.unreachable.is_empty()
    }
}

impl PutValueOperation {
    pub fn new(
        node_name: String,
        ring: Arc<HashRing>,
        store: Arc<SiblingStore>,
        fanout: Arc<Fanout>,
    ) -> Self {
        Self {
            node_name,
            ring,
            store,
            fanout,
        }
    }

    pub async fn run(&self, request: PutValueOperationRequest) -> Result<PutValueOperationResult> {
        let PutValueOperationRequest {
            key,
            vclock,
            value,
            n,
            forwarded,
        } = request;

        validate_key(&key)?;

        let preference_list = if n == 0 {
            Vec::new()
        } else {
            let list = self.ring.preference_list(&key, n);
            if !list.contains(&self.node_name) {
                if !forwarded {
                    return self.forward(key, vclock, value, n).await;
                }
                tracing::warn!(
                    "serving forwarded put for {} outside own preference list {:?}",
                    key,
                    list
                );
            }
            list
        };

        let slot_key = SlotKey::new(self.ring.partition_for(&key), key.clone());
        let siblings = self
            .store
            .update(&slot_key, |current| {
                Ok(merge_write(&self.node_name, current, &vclock, &value))
            })
            .await?;

        let stamped = siblings
            .last()
            .map(|latest| latest.vclock.clone())
            .ok_or_else(|| RingError::Internal("write produced an empty slot".to_string()))?;

        tracing::debug!(
            "put {} {} {} {} (siblings={})",
            n,
            key,
            stamped,
            value,
            siblings.len()
        );

        let mut unreachable = Vec::new();
        if n != 0 {
            let peers: Vec<String> = preference_list
                .into_iter()
                .filter(|member| member != &self.node_name)
                .collect();
            unreachable = self.replicate(&peers, key, stamped, value).await;
        }

        Ok(PutValueOperationResult {
            siblings,
            unreachable,
            forwarded_to: None,
        })
    }

    /// Pushes the stamped write to the other replicas as local-only puts.
    async fn replicate(
        &self,
        peers: &[String],
        key: String,
        vclock: VectorClock,
        value: String,
    ) -> Vec<String> {
        if peers.is_empty() {
            return Vec::new();
        }

        let message = RpcCommand::Put {
            n: 0,
            key,
            vclock,
            value,
        }
        .encode();

        let mut unreachable = Vec::new();
        for reply in self.fanout.call_all(peers, &message).await {
            if let Err(error) = reply.outcome {
                tracing::warn!("replication to {} failed: {}", reply.node, error);
                unreachable.push(reply.node);
            }
        }
        unreachable
    }

    async fn forward(
        &self,
        key: String,
        vclock: VectorClock,
        value: String,
        n: usize,
    ) -> Result<PutValueOperationResult> {
        let owner = self.ring.owner(&key).to_string();
        let message = RpcRequest::forwarded(RpcCommand::Put {
            n,
            key,
            vclock,
            value,
        })
        .encode();

        tracing::info!("forwarding to {}: {}", owner, message);
        let reply = self.fanout.call_one(&owner, &message).await?;
        let values = decode_reply(&reply.body)?.ok_or_else(|| {
            RingError::Internal(format!("owner {} returned no data for a put", owner))
        })?;

        Ok(PutValueOperationResult {
            siblings: SiblingSet::from(values),
            unreachable: reply.unreachable,
            forwarded_to: Some(owner),
        })
    }
}

/// Builds the sibling set that results from writing `value` under
/// `supplied` on top of `current`, stamped by `node`.
pub(crate) fn merge_write(
    node: &str,
    current: &SiblingSet,
    supplied: &VectorClock,
    value: &str,
) -> SiblingSet {
    let (base, mut siblings) = if supplied.is_empty() && current.len() == 1 {
        // unversioned write over a single version continues from it
        (current.values()[0].vclock.clone(), SiblingSet::new())
    } else if !supplied.is_empty()
        && !current
            .values()
            .iter()
            .any(|sibling| supplied.descends_from(&sibling.vclock))
    {
        (supplied.clone(), current.clone())
    } else {
        (supplied.clone(), SiblingSet::new())
    };

    let stamped = base.increment(node);
    siblings.prune_dominated_by(&stamped);
    siblings.push(VersionedValue::new(value, stamped));
    siblings
}
