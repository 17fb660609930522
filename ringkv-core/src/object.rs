use crate::error::{Result, RingError};
use crate::vclock::VectorClock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A value payload together with the clock it was written under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedValue {
    pub value: String,
    pub vclock: VectorClock,
}

impl VersionedValue {
    pub fn new(value: impl Into<String>, vclock: VectorClock) -> Self {
        Self {
            value: value.into(),
            vclock,
        }
    }

    /// Orders by clock only; concurrent versions have no order.
    pub fn causal_cmp(&self, other: &Self) -> Result<Ordering> {
        self.vclock.try_cmp(&other.vclock)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Contents of one storage slot: mutually concurrent versions of a key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiblingSet {
    values: Vec<VersionedValue>,
}

impl SiblingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(value: VersionedValue) -> Self {
        Self {
            values: vec![value],
        }
    }

    pub fn values(&self) -> &[VersionedValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<VersionedValue> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, value: VersionedValue) {
        self.values.push(value);
    }

    pub fn last(&self) -> Option<&VersionedValue> {
        self.values.last()
    }

    /// Drops every sibling whose clock the given clock strictly dominates.
    pub fn prune_dominated_by(&mut self, clock: &VectorClock) {
        self.values.retain(|sibling| !clock.dominates(&sibling.vclock));
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<Vec<VersionedValue>> for SiblingSet {
    fn from(values: Vec<VersionedValue>) -> Self {
        Self { values }
    }
}

impl IntoIterator for SiblingSet {
    type Item = VersionedValue;
    type IntoIter = std::vec::IntoIter<VersionedValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireShape {
    Many(Vec<VersionedValue>),
    One(VersionedValue),
}

/// Decodes a peer reply: `null`, one object, or an array of objects.
pub fn decode_reply(text: &str) -> Result<Option<Vec<VersionedValue>>> {
    let parsed: Option<WireShape> = serde_json::from_str(text.trim()).map_err(|error| {
        RingError::InvalidRequest(format!("undecodable reply '{}': {}", text, error))
    })?;

    Ok(parsed.map(|shape| match shape {
        WireShape::Many(values) => values,
        WireShape::One(value) => vec![value],
    }))
}
