use super::fanout::Fanout;
use super::reconcile::reconcile;
use crate::object::{SiblingSet, VersionedValue, decode_reply};
use crate::ring::HashRing;
use crate::rpc::{RpcCommand, RpcRequest, validate_key};
use crate::storage::{SiblingStore, SlotKey};
use crate::Result;
use std::sync::Arc;

#[derive(Clone)]
pub struct GetValueOperation {
    node_name: String,
    ring: Arc<HashRing>,
    store: Arc<SiblingStore>,
    fanout: Arc<Fanout>,
}

#[derive(Debug, Clone)]
pub struct GetValueOperationRequest {
    pub key: String,
    /// Number of replicas to consult; 0 reads the local slot only.
    pub n: usize,
    /// Received from another ring member; answered here without a further hop.
    pub forwarded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetValueOperationOutcome {
    /// The unmerged local slot, answered for local-only reads.
    Local(SiblingSet),
    Resolved(VersionedValue),
    Conflict(Vec<VersionedValue>),
    Empty,
}

#[derive(Debug, Clone)]
pub struct GetValueOperationResult {
    pub outcome: GetValueOperationOutcome,
    /// Replicas whose view could not be merged.
    pub unreachable: Vec<String>,
    pub forwarded_to: Option<String>,
}

impl GetValueOperationResult {
    pub fn is_degraded(&self) -> bool {
        !self.unreachable.is_empty()
    }
}

impl GetValueOperation {
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

    pub async fn run(&self, request: GetValueOperationRequest) -> Result<GetValueOperationResult> {
        let GetValueOperationRequest { key, n, forwarded } = request;
        validate_key(&key)?;

        if n == 0 {
            tracing::debug!("get 0 {}", key);
            let outcome = match self.read_local(&key).await {
                Some(siblings) => GetValueOperationOutcome::Local(siblings),
                None => GetValueOperationOutcome::Empty,
            };
            return Ok(GetValueOperationResult {
                outcome,
                unreachable: Vec::new(),
                forwarded_to: None,
            });
        }

        let preference_list = self.ring.preference_list(&key, n);
        if !preference_list.contains(&self.node_name) {
            if !forwarded {
                return self.forward(key, n).await;
            }
            tracing::warn!(
                "serving forwarded get for {} outside own preference list {:?}",
                key,
                preference_list
            );
        }

        tracing::debug!("get {} {}", n, key);
        let peers: Vec<String> = preference_list
            .into_iter()
            .filter(|member| member != &self.node_name)
            .collect();

        let message = RpcCommand::Get {
            n: 0,
            key: key.clone(),
        }
        .encode();

        let mut candidates = Vec::new();
        let mut unreachable = Vec::new();
        for reply in self.fanout.call_all(&peers, &message).await {
            let decoded = reply.outcome.and_then(|body| decode_reply(&body));
            match decoded {
                Ok(Some(values)) => candidates.extend(values),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!("read from {} failed: {}", reply.node, error);
                    unreachable.push(reply.node);
                }
            }
        }

        if let Some(local) = self.read_local(&key).await {
            candidates.extend(local);
        }

        let outcome = reconcile(candidates);
        if let GetValueOperationOutcome::Conflict(values) = &outcome {
            tracing::warn!("conflict on {}: {} siblings", key, values.len());
        }

        Ok(GetValueOperationResult {
            outcome,
            unreachable,
            forwarded_to: None,
        })
    }

    async fn read_local(&self, key: &str) -> Option<SiblingSet> {
        let slot_key = SlotKey::new(self.ring.partition_for(key), key);
        self.store
            .get(&slot_key)
            .await
            .filter(|siblings| !siblings.is_empty())
    }

    async fn forward(&self, key: String, n: usize) -> Result<GetValueOperationResult> {
        let owner = self.ring.owner(&key).to_string();
        let message = RpcRequest::forwarded(RpcCommand::Get { n, key }).encode();

        tracing::info!("forwarding to {}: {}", owner, message);
        let reply = self.fanout.call_one(&owner, &message).await?;

        Ok(GetValueOperationResult {
            outcome: outcome_from_reply(&reply.body)?,
            unreachable: reply.unreachable,
            forwarded_to: Some(owner),
        })
    }
}

/// Reads back an outcome encoded by a node that served the read itself.
pub(crate) fn outcome_from_reply(reply: &str) -> Result<GetValueOperationOutcome> {
    let outcome = match decode_reply(reply)? {
        None => GetValueOperationOutcome::Empty,
        Some(mut values) => match values.len() {
            0 => GetValueOperationOutcome::Empty,
            1 => GetValueOperationOutcome::Resolved(values.remove(0)),
            _ => GetValueOperationOutcome::Conflict(values),
        },
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vclock::VectorClock;

    #[test]
    fn test_outcome_from_reply() {
        assert_eq!(
            outcome_from_reply("null").unwrap(),
            GetValueOperationOutcome::Empty
        );

        let single = VersionedValue::new("v1", VectorClock::new().increment("A"));
        assert_eq!(
            outcome_from_reply(&single.to_json().unwrap()).unwrap(),
            GetValueOperationOutcome::Resolved(single.clone())
        );

        let other = VersionedValue::new("v2", VectorClock::new().increment("B"));
        let conflict = SiblingSet::from(vec![single.clone(), other.clone()]);
        assert_eq!(
            outcome_from_reply(&conflict.to_json().unwrap()).unwrap(),
            GetValueOperationOutcome::Conflict(vec![single, other])
        );
    }
}
