//! Merkle tree over transparency-log entries.
//!
//! Domain-separated SHA-256: leaves are `H(0x00 || entry_hash)`, interior
//! nodes `H(0x01 || left || right)`. An odd node at the end of a level is
//! promoted unchanged.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type Hash = [u8; 32];

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

pub fn entry_hash(bytes: &[u8]) -> Hash {
    Sha256::digest(bytes).into()
}

fn leaf(entry: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(entry);
    hasher.finalize().into()
}

fn node(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

fn next_level(level: &[Hash]) -> Vec<Hash> {
    let mut next = Vec::with_capacity(level.len().div_ceil(2));
    for pair in level.chunks(2) {
        match pair {
            [left, right] => next.push(node(left, right)),
            // Odd node promoted
            _ => next.push(pair[0]),
        }
    }
    next
}

/// Root over the given entry hashes. The empty tree's root is `H("")`.
pub fn root(entries: &[Hash]) -> Hash {
    if entries.is_empty() {
        return entry_hash(b"");
    }

    let mut level: Vec<Hash> = entries.iter().map(leaf).collect();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

/// Which side the sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofStep {
    pub sibling: Hash,
    pub side: Side,
}

/// Audit path from one leaf to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionProof {
    pub index: usize,
    pub tree_size: usize,
    pub path: Vec<ProofStep>,
}

/// Builds the audit path for `entries[index]`.
pub fn inclusion_proof(entries: &[Hash], index: usize) -> Option<InclusionProof> {
    if index >= entries.len() {
        return None;
    }

    let mut level: Vec<Hash> = entries.iter().map(leaf).collect();
    let mut position = index;
    let mut path = Vec::new();

    while level.len() > 1 {
        if position % 2 == 0 {
            if let Some(sibling) = level.get(position + 1) {
                path.push(ProofStep {
                    sibling: *sibling,
                    side: Side::Right,
                });
            }
        } else {
            path.push(ProofStep {
                sibling: level[position - 1],
                side: Side::Left,
            });
        }
        level = next_level(&level);
        position /= 2;
    }

    Some(InclusionProof {
        index,
        tree_size: entries.len(),
        path,
    })
}

/// Checks that `entry` sits in the tree with root `expected_root`.
pub fn verify_inclusion(entry: &Hash, proof: &InclusionProof, expected_root: &Hash) -> bool {
    let computed = proof.path.iter().fold(leaf(entry), |current, step| match step.side {
        Side::Left => node(&step.sibling, &current),
        Side::Right => node(&current, &step.sibling),
    });
    computed == *expected_root
}
