use crate::error::{Result, RingError};
use sha2::{Digest, Sha256};
use std::fmt;

pub const DEFAULT_PARTITIONS: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionId(pub u32);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed ring of partitions, each owned by exactly one member.
///
/// Members are sorted at construction and partitions are dealt out
/// round-robin, so every node building a ring from the same member set
/// computes the same ownership.
#[derive(Debug, Clone)]
pub struct HashRing {
    members: Vec<String>,
    owners: Vec<usize>,
}

impl HashRing {
    pub fn new<I, S>(members: I, partitions: u32) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if partitions == 0 {
            return Err(RingError::Config(
                "ring must have at least one partition".to_string(),
            ));
        }

        let mut members: Vec<String> = members
            .into_iter()
            .map(Into::into)
            .map(|member| member.trim().to_string())
            .filter(|member| !member.is_empty())
            .collect();
        members.sort();
        members.dedup();

        if members.is_empty() {
            return Err(RingError::Config(
                "ring must have at least one member".to_string(),
            ));
        }

        let owners = (0..partitions as usize)
            .map(|partition| partition % members.len())
            .collect();

        Ok(Self { members, owners })
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn partition_count(&self) -> u32 {
        self.owners.len() as u32
    }

    pub fn partition_for(&self, key: &str) -> PartitionId {
        partition_for_key(key, self.partition_count())
    }

    pub fn partition_owner(&self, partition: PartitionId) -> &str {
        &self.members[self.owners[partition.0 as usize]]
    }

    pub fn owner(&self, key: &str) -> &str {
        self.partition_owner(self.partition_for(key))
    }

    /// Owner of the key's partition followed by the owners of the following
    /// partitions, wrapping around, without repeats.
    pub fn preference_list(&self, key: &str, n: usize) -> Vec<String> {
        let wanted = n.min(self.members.len());
        let start = self.partition_for(key).0 as usize;
        let mut list: Vec<String> = Vec::with_capacity(wanted);

        for step in 0..self.owners.len() {
            if list.len() >= wanted {
                break;
            }
            let owner = &self.members[self.owners[(start + step) % self.owners.len()]];
            if !list.iter().any(|member| member == owner) {
                list.push(owner.clone());
            }
        }

        // fewer partitions than members leaves some members without a slice
        for member in &self.members {
            if list.len() >= wanted {
                break;
            }
            if !list.contains(member) {
                list.push(member.clone());
            }
        }

        list
    }
}

/// Maps a key onto one of `partitions` equal slices of the 64-bit hash space.
pub fn partition_for_key(key: &str, partitions: u32) -> PartitionId {
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let point = u64::from_be_bytes(prefix) as u128;
    PartitionId(((point * partitions as u128) >> 64) as u32)
}
