//! Block assignment
//!
//! Partitions the blocks reported by a round's survey so that every block is
//! fetched from exactly one source. A block held by a single source goes to
//! that source; a block held by several goes to one of them chosen uniformly
//! at random, independently per block.

use std::collections::BTreeMap;

use rand::Rng;

use crate::protocol::{BlockIndex, Source};

/// Blocks each surveyed source reported holding
pub type BlockInventory = BTreeMap<Source, Vec<BlockIndex>>;

/// Blocks each source is to be asked for. Every block appears under at most
/// one source.
pub type BlockAssignment = BTreeMap<Source, Vec<BlockIndex>>;

/// Assign blocks using the thread-local random generator
pub fn assign_blocks(inventory: &BlockInventory) -> BlockAssignment {
    assign_blocks_with(inventory, &mut rand::rng())
}

/// Assign blocks drawing tie-breaks from `rng`.
///
/// A single reporting source gets its inventory back unchanged and no value
/// is drawn from `rng`. Every reporting source appears in the output, with
/// an empty list if it won no block.
pub fn assign_blocks_with<R: Rng + ?Sized>(inventory: &BlockInventory, rng: &mut R) -> BlockAssignment {
    if inventory.len() <= 1 {
        return inventory.clone();
    }

    let mut holders: BTreeMap<BlockIndex, Vec<Source>> = BTreeMap::new();
    for (source, blocks) in inventory {
        for &index in blocks {
            let entry = holders.entry(index).or_default();
            if entry.last() != Some(source) {
                entry.push(*source);
            }
        }
    }

    let mut assignment: BlockAssignment = inventory
        .keys()
        .map(|source| (*source, Vec::new()))
        .collect();

    for (index, candidates) in holders {
        let chosen = match candidates.as_slice() {
            [only] => *only,
            _ => candidates[rng.random_range(0..candidates.len())],
        };
        if let Some(blocks) = assignment.get_mut(&chosen) {
            blocks.push(index);
        }
    }

    assignment
}
