//! Deterministic pod assignment.
//!
//! Every epoch the registered cohort is shuffled by its epoch hash and cut
//! into pods of `minimum_pod_size` darknodes. Given the same epoch hash and
//! cohort, every observer computes the same pods.
//!
//! ## Algorithm
//!
//! 1. Key each darknode by `SHA-256(epochhash || address)`.
//! 2. Sort ascending by key (address breaks ties).
//! 3. Chunk into groups of `minimum_pod_size`.
//! 4. A trailing group smaller than the pod size joins the previous pod.

use sha2::{Digest, Sha256};

use darkpool_types::Address;

fn shuffle_key(epochhash: &[u8; 32], node: &Address) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(epochhash);
    hasher.update(node.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(&hasher.finalize());
    key
}

/// Partition `cohort` into pods for the epoch with hash `epochhash`.
///
/// Returns no pods when the cohort is smaller than `minimum_pod_size` or
/// the pod size is zero.
#[must_use]
pub fn assign_pods(
    epochhash: &[u8; 32],
    cohort: &[Address],
    minimum_pod_size: usize,
) -> Vec<Vec<Address>> {
    if minimum_pod_size == 0 || cohort.len() < minimum_pod_size {
        return Vec::new();
    }

    let mut keyed: Vec<([u8; 32], Address)> = cohort
        .iter()
        .map(|node| (shuffle_key(epochhash, node), *node))
        .collect();
    keyed.sort_unstable();

    let mut pods: Vec<Vec<Address>> = keyed
        .chunks(minimum_pod_size)
        .map(|chunk| chunk.iter().map(|(_, node)| *node).collect())
        .collect();

    if pods.len() > 1 && pods.last().is_some_and(|p| p.len() < minimum_pod_size) {
        if let Some(remainder) = pods.pop() {
            if let Some(last) = pods.last_mut() {
                last.extend(remainder);
            }
        }
    }

    tracing::debug!(
        cohort = cohort.len(),
        pod_size = minimum_pod_size,
        pods = pods.len(),
        "Pods assigned"
    );
    pods
}
