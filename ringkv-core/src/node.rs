use crate::cluster::Transport;
use crate::error::Result;
use crate::operations::{
    Fanout, FanoutMode, GetValueOperation, GetValueOperationRequest, GetValueOperationResult,
    PutValueOperation, PutValueOperationRequest, PutValueOperationResult,
};
use crate::ring::{DEFAULT_PARTITIONS, HashRing};
use crate::storage::SiblingStore;
use crate::vclock::VectorClock;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NodeOptions {
    pub partitions: u32,
    pub fanout_mode: FanoutMode,
    pub call_timeout: Option<Duration>,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            partitions: DEFAULT_PARTITIONS,
            fanout_mode: FanoutMode::Sequential,
            call_timeout: None,
        }
    }
}

/// One ring member: its ring view, its local store and the two operations
/// that run against them.
pub struct Node {
    name: String,
    ring: Arc<HashRing>,
    store: Arc<SiblingStore>,
    put_operation: PutValueOperation,
    get_operation: GetValueOperation,
}

impl Node {
    /// The ring is built from `members` plus the node itself and stays fixed.
    pub fn new(
        name: impl Into<String>,
        members: Vec<String>,
        options: NodeOptions,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let name = name.into();

        let mut members = members;
        members.push(name.clone());
        let ring = Arc::new(HashRing::new(members, options.partitions)?);

        let store = Arc::new(SiblingStore::new());
        let fanout = Arc::new(
            Fanout::new(transport)
                .with_mode(options.fanout_mode)
                .with_call_timeout(options.call_timeout),
        );

        tracing::info!(
            "node {} joined ring of {} members over {} partitions",
            name,
            ring.members().len(),
            ring.partition_count()
        );

        Ok(Self {
            put_operation: PutValueOperation::new(
                name.clone(),
                ring.clone(),
                store.clone(),
                fanout.clone(),
            ),
            get_operation: GetValueOperation::new(name.clone(), ring.clone(), store.clone(), fanout),
            name,
            ring,
            store,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ring(&self) -> &HashRing {
        &self.ring
    }

    pub fn store(&self) -> &SiblingStore {
        &self.store
    }

    /// Client-facing write; forwarded to the owner when this node is not a
    /// replica for `key`.
    pub async fn put(
        &self,
        key: &str,
        vclock: VectorClock,
        value: &str,
        n: usize,
    ) -> Result<PutValueOperationResult> {
        self.run_put(PutValueOperationRequest {
            key: key.to_string(),
            vclock,
            value: value.to_string(),
            n,
            forwarded: false,
        })
        .await
    }

    pub async fn get(&self, key: &str, n: usize) -> Result<GetValueOperationResult> {
        self.run_get(GetValueOperationRequest {
            key: key.to_string(),
            n,
            forwarded: false,
        })
        .await
    }

    pub async fn run_put(
        &self,
        request: PutValueOperationRequest,
    ) -> Result<PutValueOperationResult> {
        self.put_operation.run(request).await
    }

    pub async fn run_get(
        &self,
        request: GetValueOperationRequest,
    ) -> Result<GetValueOperationResult> {
        self.get_operation.run(request).await
    }
}
