use crate::error::{Result, RingError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Causal relationship between two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrdering {
    Equal,
    Dominates,
    DominatedBy,
    Concurrent,
}

/// Per-node counters tracking the causal history of a stored value.
///
/// Missing entries count as zero. The map is ordered so the serialized form
/// is stable across nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    counters: BTreeMap<String, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<String>,
    {
        Self {
            counters: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn get(&self, node: &str) -> u64 {
        self.counters.get(node).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Returns a new clock with `node`'s counter raised by one.
    pub fn increment(&self, node: &str) -> Self {
        let mut next = self.clone();
        *next.counters.entry(node.to_string()).or_insert(0) += 1;
        next
    }

    pub fn compare(&self, other: &Self) -> ClockOrdering {
        let mut self_ge = true;
        let mut other_ge = true;

        for node in self.counters.keys().chain(other.counters.keys()) {
            let mine = self.get(node);
            let theirs = other.get(node);
            if mine < theirs {
                self_ge = false;
            }
            if theirs < mine {
                other_ge = false;
            }
        }

        match (self_ge, other_ge) {
            (true, true) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Dominates,
            (false, true) => ClockOrdering::DominatedBy,
            (false, false) => ClockOrdering::Concurrent,
        }
    }

    /// True when this clock has seen everything `other` has seen.
    pub fn descends_from(&self, other: &Self) -> bool {
        matches!(
            self.compare(other),
            ClockOrdering::Equal | ClockOrdering::Dominates
        )
    }

    /// Strictly newer than `other`.
    pub fn dominates(&self, other: &Self) -> bool {
        self.compare(other) == ClockOrdering::Dominates
    }

    pub fn is_concurrent(&self, other: &Self) -> bool {
        self.compare(other) == ClockOrdering::Concurrent
    }

    /// Total comparison; concurrent clocks are reported as an error value.
    pub fn try_cmp(&self, other: &Self) -> Result<Ordering> {
        self.partial_cmp(other)
            .ok_or_else(|| RingError::IncomparableClocks {
                left: self.to_token(),
                right: other.to_token(),
            })
    }

    /// Parses the clock token carried on a `PUT` line.
    ///
    /// An empty token is the empty clock.
    pub fn parse_token(token: &str) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(Self::new());
        }

        serde_json::from_str::<BTreeMap<String, u64>>(token)
            .map(|counters| Self { counters })
            .map_err(|error| RingError::MalformedClockToken(format!("{} ({})", token, error)))
    }

    /// Compact JSON form, never containing whitespace.
    pub fn to_token(&self) -> String {
        serde_json::to_string(&self.counters).unwrap_or_else(|_| "{}".to_string())
    }
}

impl PartialOrd for VectorClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.compare(other) {
            ClockOrdering::Equal => Some(Ordering::Equal),
            ClockOrdering::Dominates => Some(Ordering::Greater),
            ClockOrdering::DominatedBy => Some(Ordering::Less),
            ClockOrdering::Concurrent => None,
        }
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_token())
    }
}
