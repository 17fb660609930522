use super::get_value::GetValueOperationOutcome;
use crate::object::VersionedValue;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Collapses replica answers into one outcome.
///
/// Candidates are deduplicated by value payload (first occurrence wins, the
/// clock plays no part). If every remaining pair is causally ordered the most
/// advanced value wins; otherwise all of them come back as a conflict.
pub fn reconcile(candidates: Vec<VersionedValue>) -> GetValueOperationOutcome {
    let mut seen = HashSet::new();
    let values: Vec<VersionedValue> = candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.value.clone()))
        .collect();

    if values.is_empty() {
        return GetValueOperationOutcome::Empty;
    }

    if !pairwise_comparable(&values) {
        return GetValueOperationOutcome::Conflict(values);
    }

    match most_advanced(&values) {
        Some(winner) => GetValueOperationOutcome::Resolved(winner.clone()),
        None => GetValueOperationOutcome::Conflict(values),
    }
}

fn pairwise_comparable(values: &[VersionedValue]) -> bool {
    values.iter().enumerate().all(|(i, left)| {
        values[i + 1..]
            .iter()
            .all(|right| !left.vclock.is_concurrent(&right.vclock))
    })
}

fn most_advanced(values: &[VersionedValue]) -> Option<&VersionedValue> {
    let (first, rest) = values.split_first()?;
    rest.iter().try_fold(first, |best, candidate| {
        match candidate.causal_cmp(best) {
            Ok(Ordering::Greater) => Some(candidate),
            Ok(_) => Some(best),
            Err(error) => {
                tracing::warn!("ordering failed after comparability check: {}", error);
                None
            }
        }
    })
}
