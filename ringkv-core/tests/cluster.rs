//! Multi-node behaviour over an in-process transport.

use async_trait::async_trait;
use ringkv_core::ring::partition_for_key;
use ringkv_core::{
    GetValueOperationOutcome, Node, NodeOptions, PartitionId, Result, RingError, RpcReply,
    SiblingSet, SlotKey, Transport, VectorClock, VersionedValue, dispatch,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Loopback {
    nodes: Mutex<HashMap<String, Arc<Node>>>,
    down: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl Loopback {
    fn take_down(&self, node: &str) {
        self.down.lock().unwrap().insert(node.to_string());
    }

    fn calls_to(&self, node: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(target, _)| target == node)
            .map(|(_, message)| message.clone())
            .collect()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn all_calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for Loopback {
    async fn call(&self, node: &str, message: &str) -> Result<RpcReply> {
        self.calls
            .lock()
            .unwrap()
            .push((node.to_string(), message.to_string()));

        if self.down.lock().unwrap().contains(node) {
            return Err(RingError::ReplicaUnavailable {
                node: node.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let target = self
            .nodes
            .lock()
            .unwrap()
            .get(node)
            .cloned()
            .ok_or_else(|| RingError::UnknownNodeConfiguration(node.to_string()))?;

        dispatch(&target, message).await
    }
}

struct Cluster {
    transport: Arc<Loopback>,
    nodes: HashMap<String, Arc<Node>>,
}

impl Cluster {
    fn new(names: &[&str], partitions: u32) -> Self {
        let rings: Vec<(&str, &[&str])> = names.iter().map(|name| (*name, names)).collect();
        Self::with_rings(&rings, partitions)
    }

    /// Each node gets its own view of the membership.
    fn with_rings(rings: &[(&str, &[&str])], partitions: u32) -> Self {
        let transport = Arc::new(Loopback::default());

        let mut nodes = HashMap::new();
        for (name, members) in rings {
            let members: Vec<String> = members.iter().map(|member| member.to_string()).collect();
            let node = Arc::new(
                Node::new(
                    *name,
                    members,
                    NodeOptions {
                        partitions,
                        ..NodeOptions::default()
                    },
                    transport.clone(),
                )
                .unwrap(),
            );
            nodes.insert(name.to_string(), node);
        }
        *transport.nodes.lock().unwrap() = nodes.clone();

        Self { transport, nodes }
    }

    fn node(&self, name: &str) -> &Arc<Node> {
        &self.nodes[name]
    }

    fn owner_of(&self, key: &str) -> &Arc<Node> {
        let any = self.nodes.values().next().unwrap();
        self.node(any.ring().owner(key))
    }

    /// Some node outside the key's preference list of length `n`.
    fn outsider(&self, key: &str, n: usize) -> &Arc<Node> {
        let any = self.nodes.values().next().unwrap();
        let list = any.ring().preference_list(key, n);
        self.nodes
            .values()
            .find(|node| !list.contains(&node.name().to_string()))
            .unwrap()
    }

    /// First generated key whose owner is `node`.
    fn key_owned_by(&self, node: &str) -> String {
        (0..)
            .map(|i| format!("key-{}", i))
            .find(|key| self.owner_of(key).name() == node)
            .unwrap()
    }

    async fn seed(&self, node: &str, key: &str, values: Vec<VersionedValue>) {
        let node = self.node(node);
        let slot_key = SlotKey::new(node.ring().partition_for(key), key);
        node.store().replace(&slot_key, SiblingSet::from(values)).await;
    }

    async fn local(&self, node: &str, key: &str) -> Option<SiblingSet> {
        let node = self.node(node);
        let slot_key = SlotKey::new(node.ring().partition_for(key), key);
        node.store().get(&slot_key).await
    }
}

fn vc(entries: &[(&str, u64)]) -> VectorClock {
    VectorClock::from_entries(entries.iter().map(|(k, v)| (*k, *v)))
}

#[tokio::test]
async fn test_simple_quorum_write_then_read() {
    let cluster = Cluster::new(&["A", "B", "C"], 4);
    let owner = cluster.owner_of("k1").clone();

    let written = owner.put("k1", VectorClock::new(), "v1", 1).await.unwrap();
    assert_eq!(
        written.siblings,
        SiblingSet::single(VersionedValue::new("v1", vc(&[(owner.name(), 1)])))
    );
    assert!(!written.is_degraded());

    let read = owner.get("k1", 1).await.unwrap();
    assert_eq!(
        read.outcome,
        GetValueOperationOutcome::Resolved(VersionedValue::new("v1", vc(&[(owner.name(), 1)])))
    );
}

#[tokio::test]
async fn test_unversioned_overwrite_adopts_clock() {
    let cluster = Cluster::new(&["A", "B", "C"], 4);
    let owner = cluster.owner_of("k1").clone();

    owner.put("k1", VectorClock::new(), "v1", 1).await.unwrap();
    let written = owner.put("k1", VectorClock::new(), "v2", 1).await.unwrap();

    assert_eq!(written.siblings.len(), 1);
    assert_eq!(
        written.siblings.values()[0],
        VersionedValue::new("v2", vc(&[(owner.name(), 2)]))
    );
}

#[tokio::test]
async fn test_concurrent_write_keeps_both_siblings() {
    let cluster = Cluster::new(&["A", "B", "C"], 4);
    let key = cluster.key_owned_by("C");
    cluster
        .seed("C", &key, vec![VersionedValue::new("v1", vc(&[("A", 1)]))])
        .await;

    let node = cluster.node("C");
    let written = node.put(&key, vc(&[("B", 1)]), "v2", 0).await.unwrap();
    assert_eq!(written.siblings.len(), 2);
    assert_eq!(
        written.siblings.values()[1],
        VersionedValue::new("v2", vc(&[("B", 1), ("C", 1)]))
    );

    for n in [1, 3] {
        match node.get(&key, n).await.unwrap().outcome {
            GetValueOperationOutcome::Conflict(values) => {
                let payloads: HashSet<&str> = values.iter().map(|v| v.value.as_str()).collect();
                assert_eq!(payloads, HashSet::from(["v1", "v2"]));
            }
            other => panic!("expected conflict for n={}, got {:?}", n, other),
        }
    }
}

#[tokio::test]
async fn test_descendant_across_replicas_resolves() {
    let cluster = Cluster::new(&["A", "B", "C"], 4);
    let owner = cluster.owner_of("k2").clone();
    let list = owner.ring().preference_list("k2", 2);
    let peer = list[1].clone();

    cluster
        .seed(owner.name(), "k2", vec![VersionedValue::new("old", vc(&[("A", 1)]))])
        .await;
    cluster
        .seed(
            &peer,
            "k2",
            vec![VersionedValue::new("new", vc(&[("A", 1), ("B", 1)]))],
        )
        .await;

    let read = owner.get("k2", 2).await.unwrap();
    assert_eq!(
        read.outcome,
        GetValueOperationOutcome::Resolved(VersionedValue::new("new", vc(&[("A", 1), ("B", 1)])))
    );
    assert_eq!(cluster.transport.calls_to(&peer), vec!["GET 0 k2"]);
}

#[tokio::test]
async fn test_equal_payloads_collapse_before_ordering() {
    let cluster = Cluster::new(&["A", "B", "C"], 4);
    let owner = cluster.owner_of("k3").clone();
    let peer = owner.ring().preference_list("k3", 2)[1].clone();

    cluster
        .seed(owner.name(), "k3", vec![VersionedValue::new("same", vc(&[("A", 1), ("B", 1)]))])
        .await;
    cluster
        .seed(&peer, "k3", vec![VersionedValue::new("same", vc(&[("A", 1), ("C", 1)]))])
        .await;

    match owner.get("k3", 2).await.unwrap().outcome {
        GetValueOperationOutcome::Resolved(value) => {
            assert_eq!(value.value, "same");
            // the peer answers first, so its copy is the one kept
            assert_eq!(value.vclock, vc(&[("A", 1), ("C", 1)]));
        }
        other => panic!("expected a single value, got {:?}", other),
    }
}

#[tokio::test]
async fn test_non_owner_forwards_once() {
    let cluster = Cluster::new(&["A", "B", "C"], 4);
    let owner = cluster.owner_of("k4").clone();
    let outsider = cluster.outsider("k4", 1).clone();

    let written = outsider.put("k4", VectorClock::new(), "v1", 1).await.unwrap();
    assert_eq!(written.forwarded_to.as_deref(), Some(owner.name()));
    assert_eq!(written.siblings.values()[0].vclock, vc(&[(owner.name(), 1)]));
    assert!(cluster.local(outsider.name(), "k4").await.is_none());
    assert!(cluster.local(owner.name(), "k4").await.is_some());
    assert_eq!(cluster.transport.call_count(), 1);
    assert_eq!(
        cluster.transport.calls_to(owner.name()),
        vec!["FORWARDED PUT 1 k4 {} v1"]
    );

    let via_outsider = dispatch(&outsider, "GET 1 k4").await.unwrap();
    let direct = dispatch(&owner, "GET 1 k4").await.unwrap();
    assert_eq!(via_outsider.body, direct.body);
    assert_eq!(cluster.transport.calls_to(owner.name()).len(), 2);
}

#[tokio::test]
async fn test_write_replicates_to_preference_list() {
    let cluster = Cluster::new(&["A", "B", "C"], 8);
    let owner = cluster.owner_of("k5").clone();

    owner.put("k5", VectorClock::new(), "v1", 3).await.unwrap();

    for name in ["A", "B", "C"] {
        let stored = cluster.local(name, "k5").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored.values()[0].value, "v1");
        assert_eq!(stored.values()[0].vclock.get(owner.name()), 1);
        if name != owner.name() {
            // replicas stamp their own counter on top
            assert_eq!(stored.values()[0].vclock.get(name), 1);
        }
    }

    match owner.get("k5", 3).await.unwrap().outcome {
        GetValueOperationOutcome::Resolved(value) => assert_eq!(value.value, "v1"),
        other => panic!("expected a single value, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_replica_degrades_but_succeeds() {
    let cluster = Cluster::new(&["A", "B", "C"], 8);
    let owner = cluster.owner_of("k6").clone();
    let list = owner.ring().preference_list("k6", 3);
    let lost = list[2].clone();
    cluster.transport.take_down(&lost);

    let written = owner.put("k6", VectorClock::new(), "v1", 3).await.unwrap();
    assert_eq!(written.unreachable, vec![lost.clone()]);
    assert_eq!(written.siblings.len(), 1);
    assert!(cluster.local(&list[1], "k6").await.is_some());

    let read = owner.get("k6", 3).await.unwrap();
    assert!(read.is_degraded());
    assert_eq!(read.unreachable, vec![lost]);
    assert!(matches!(read.outcome, GetValueOperationOutcome::Resolved(_)));
}

#[tokio::test]
async fn test_missing_key_reads_empty() {
    let cluster = Cluster::new(&["A", "B", "C"], 4);
    let owner = cluster.owner_of("absent").clone();

    let read = owner.get("absent", 3).await.unwrap();
    assert_eq!(read.outcome, GetValueOperationOutcome::Empty);

    let reply = dispatch(&owner, "GET 0 absent").await.unwrap();
    assert_eq!(reply.body, "null");
}

#[tokio::test]
async fn test_malformed_clock_changes_nothing() {
    let cluster = Cluster::new(&["A", "B", "C"], 4);
    let owner = cluster.owner_of("k7").clone();
    owner.put("k7", VectorClock::new(), "v1", 1).await.unwrap();

    let line = format!("PUT 1 k7 {{\"{}\":oops}} v2", owner.name());
    let error = dispatch(&owner, &line).await.unwrap_err();
    assert!(matches!(error, RingError::MalformedClockToken(_)));

    let stored = cluster.local(owner.name(), "k7").await.unwrap();
    assert_eq!(stored.values()[0].value, "v1");
}

#[tokio::test]
async fn test_dispatch_put_then_conflicting_get() {
    let cluster = Cluster::new(&["A", "B", "C"], 4);
    let key = cluster.key_owned_by("B");
    let node = cluster.node("B");

    let first = dispatch(node, &format!("PUT 0 {} {{\"C\":1}} one", key))
        .await
        .unwrap();
    assert_eq!(first.body, r#"[{"value":"one","vclock":{"B":1,"C":1}}]"#);

    dispatch(node, &format!("PUT 0 {} {{\"A\":5}} two", key))
        .await
        .unwrap();

    let reply = dispatch(node, &format!("GET 1 {}", key)).await.unwrap();
    assert_eq!(
        reply.body,
        r#"[{"value":"one","vclock":{"B":1,"C":1}},{"value":"two","vclock":{"A":5,"B":1}}]"#
    );
}

#[tokio::test]
async fn test_forwarded_request_is_never_forwarded_again() {
    // A places partition 3 on B, while B's larger ring places it on A
    let cluster = Cluster::with_rings(
        &[("A", &["A", "B"][..]), ("B", &["A", "B", "C"][..])],
        4,
    );
    let key = (0..)
        .map(|i| format!("k{}", i))
        .find(|key| partition_for_key(key, 4) == PartitionId(3))
        .unwrap();
    let node_a = cluster.node("A");

    let read = node_a.get(&key, 1).await.unwrap();
    assert_eq!(read.forwarded_to.as_deref(), Some("B"));
    assert_eq!(read.outcome, GetValueOperationOutcome::Empty);
    assert_eq!(
        cluster.transport.all_calls(),
        vec![
            ("B".to_string(), format!("FORWARDED GET 1 {}", key)),
            ("A".to_string(), format!("GET 0 {}", key)),
        ]
    );

    let written = node_a.put(&key, VectorClock::new(), "v1", 1).await.unwrap();
    assert_eq!(written.forwarded_to.as_deref(), Some("B"));
    assert_eq!(written.siblings.values()[0].vclock, vc(&[("B", 1)]));
    assert_eq!(cluster.transport.call_count(), 4);
    assert!(cluster.local("B", &key).await.is_some());
}

#[tokio::test]
async fn test_forward_reports_owner_unreachable_replicas() {
    let cluster = Cluster::new(&["A", "B", "C", "D"], 4);
    let owner = cluster.owner_of("k8").clone();
    let lost = owner.ring().preference_list("k8", 2)[1].clone();
    let outsider = cluster.outsider("k8", 2).clone();
    cluster.transport.take_down(&lost);

    let written = outsider.put("k8", VectorClock::new(), "v1", 2).await.unwrap();
    assert_eq!(written.forwarded_to.as_deref(), Some(owner.name()));
    assert!(written.is_degraded());
    assert_eq!(written.unreachable, vec![lost.clone()]);

    let read = outsider.get("k8", 2).await.unwrap();
    assert_eq!(read.forwarded_to.as_deref(), Some(owner.name()));
    assert_eq!(read.unreachable, vec![lost]);
    assert!(matches!(read.outcome, GetValueOperationOutcome::Resolved(_)));
}
