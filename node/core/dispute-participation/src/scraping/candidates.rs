// Copyright 2022 Parity Technologies (UK) Ltd.
// This file is part of Polkadot.

// Polkadot is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Polkadot is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Polkadot.  If not, see <http://www.gnu.org/licenses/>.

use std::collections::{BTreeMap, HashMap, HashSet};

use polkadot_node_primitives::{BlockNumber, CandidateHash, Hash};

/// Keeps `CandidateHash` in reference counted way.
/// Each `insert` saves a value with `reference count == 1` or increases the reference
/// count if the value already exists.
/// Each `remove` decreases the reference count for the corresponding `CandidateHash`.
/// If the reference count reaches 0 - the value is removed.
struct RefCountedCandidates {
	candidates: HashMap<CandidateHash, usize>,
}

impl RefCountedCandidates {
	pub fn new() -> Self {
		Self { candidates: HashMap::new() }
	}
	// If `CandidateHash` doesn't exist in the `HashMap` it is created and its reference
	// count is set to 1.
	// If `CandidateHash` already exists in the `HashMap` its reference count is increased.
	pub fn insert(&mut self, candidate: CandidateHash) {
		*self.candidates.entry(candidate).or_default() += 1;
	}

	// Decreases the reference count, dropping the candidate once it reaches zero.
	// Returns `true` if the candidate got dropped.
	pub fn remove(&mut self, candidate: &CandidateHash) -> bool {
		match self.candidates.get_mut(candidate) {
			Some(v) if *v > 1 => {
				*v -= 1;
				false
			},
			Some(_) => {
				self.candidates.remove(candidate);
				true
			},
			None => false,
		}
	}

	pub fn contains(&self, candidate: &CandidateHash) -> bool {
		self.candidates.contains_key(candidate)
	}

	pub fn len(&self) -> usize {
		self.candidates.len()
	}
}


/// Candidates seen on chain, indexed by the height they were seen at.
///
/// A candidate seen at several heights stays known until all of them got pruned. Seeing it
/// twice at the same height counts once.
pub struct ScrapedCandidates {
	/// Main data structure which keeps the candidates we know about. `contains` does
	/// lookups only here.
	candidates: RefCountedCandidates,
	/// Keeps track at which block number a candidate was seen. Used in `remove_up_to_height`.
	candidates_by_block_number: BTreeMap<BlockNumber, HashSet<CandidateHash>>,
}

impl ScrapedCandidates {
	pub fn new() -> Self {
		Self { candidates: RefCountedCandidates::new(), candidates_by_block_number: BTreeMap::new() }
	}

	pub fn contains(&self, candidate_hash: &CandidateHash) -> bool {
		self.candidates.contains(candidate_hash)
	}

	pub fn insert(&mut self, block_number: BlockNumber, candidate_hash: CandidateHash) {
		if self
			.candidates_by_block_number
			.entry(block_number)
			.or_default()
			.insert(candidate_hash)
		{
			self.candidates.insert(candidate_hash);
		}
	}

	/// Removes all candidates seen at `height` or below.
	///
	/// Returns every candidate that was seen at one of the pruned heights. Such a candidate may
	/// still be known if it was also seen above `height`.
	pub fn remove_up_to_height(&mut self, height: &BlockNumber) -> HashSet<CandidateHash> {
		let mut stale = std::mem::take(&mut self.candidates_by_block_number);
		self.candidates_by_block_number = match height.checked_add(1) {
			Some(first_kept) => stale.split_off(&first_kept),
			None => BTreeMap::new(),
		};

		let mut modified = HashSet::new();
		for candidates in stale.values() {
			for c in candidates {
				self.candidates.remove(c);
				modified.insert(*c);
			}
		}
		modified
	}

	/// Number of distinct candidates known.
	pub fn len(&self) -> usize {
		self.candidates.len()
	}

	// Used only for tests to verify the pruning doesn't leak data.
	#[cfg(test)]
	pub fn candidates_by_block_number_is_empty(&self) -> bool {
		self.candidates_by_block_number.is_empty()
	}

	#[cfg(test)]
	pub fn candidates_by_block_number_has_key(&self, key: &BlockNumber) -> bool {
		self.candidates_by_block_number.contains_key(key)
	}
}

#[cfg(test)]
mod scraped_candidates_tests {
	use super::*;

	#[test]
	fn stale_candidates_are_removed() {
		let mut candidates = ScrapedCandidates::new();
		let target = CandidateHash(Hash::repeat_byte(3));
		candidates.insert(1, target);

		assert!(candidates.contains(&target));

		let modified = candidates.remove_up_to_height(&2);
		assert!(!candidates.contains(&target));
		assert!(modified.contains(&target));
		assert!(candidates.candidates_by_block_number_is_empty());
	}

	#[test]
	fn pruning_includes_the_given_height() {
		let mut candidates = ScrapedCandidates::new();
		let target = CandidateHash(Hash::repeat_byte(3));
		candidates.insert(2, target);
		candidates.insert(3, target);

		// seen at a pruned height, but still known from height 3
		assert_eq!(candidates.remove_up_to_height(&2), HashSet::from([target]));
		assert!(candidates.contains(&target));
		assert!(!candidates.candidates_by_block_number_has_key(&2));
		assert!(candidates.candidates_by_block_number_has_key(&3));

		assert_eq!(candidates.remove_up_to_height(&3), HashSet::from([target]));
		assert!(!candidates.contains(&target));
		assert!(candidates.remove_up_to_height(&3).is_empty());
	}

	#[test]
	fn same_height_counts_once() {
		let mut candidates = ScrapedCandidates::new();
		let target = CandidateHash(Hash::repeat_byte(3));
		candidates.insert(7, target);
		candidates.insert(7, target);
		assert_eq!(candidates.len(), 1);

		assert_eq!(candidates.remove_up_to_height(&7), HashSet::from([target]));
		assert_eq!(candidates.len(), 0);
	}

	#[test]
	fn pruning_at_max_height_removes_everything() {
		let mut candidates = ScrapedCandidates::new();
		let target = CandidateHash(Hash::repeat_byte(3));
		candidates.insert(BlockNumber::MAX, target);

		assert_eq!(candidates.remove_up_to_height(&BlockNumber::MAX), HashSet::from([target]));
		assert!(candidates.candidates_by_block_number_is_empty());
	}
}

/// Blocks each candidate was seen included in.
pub struct Inclusions {
	inclusions_inner: HashMap<CandidateHash, BTreeMap<BlockNumber, Vec<Hash>>>,
}

impl Inclusions {
	pub fn new() -> Self {
		Self { inclusions_inner: HashMap::new() }
	}

	/// Record that the candidate got included in the given block.
	pub fn insert(
		&mut self,
		candidate_hash: CandidateHash,
		block_hash: Hash,
		block_number: BlockNumber,
	) {
		let blocks = self
			.inclusions_inner
			.entry(candidate_hash)
			.or_default()
			.entry(block_number)
			.or_default();
		if !blocks.contains(&block_hash) {
			blocks.push(block_hash);
		}
	}

	/// Drop inclusions at `height` or below for the given candidates.
	///
	/// A candidate without any inclusions left is removed entirely.
	pub fn remove_up_to_height(
		&mut self,
		height: &BlockNumber,
		candidates_modified: &HashSet<CandidateHash>,
	) {
		for candidate in candidates_modified {
			if let Some(blocks) = self.inclusions_inner.get_mut(candidate) {
				*blocks = match height.checked_add(1) {
					Some(first_kept) => blocks.split_off(&first_kept),
					None => BTreeMap::new(),
				};
				if blocks.is_empty() {
					self.inclusions_inner.remove(candidate);
				}
			}
		}
	}

	/// All blocks the candidate was seen included in, ascending by block number.
	pub fn get(&self, candidate_hash: &CandidateHash) -> Vec<(BlockNumber, Hash)> {
		self.inclusions_inner
			.get(candidate_hash)
			.map(|blocks| {
				blocks
					.iter()
					.flat_map(|(number, hashes)| hashes.iter().map(move |hash| (*number, *hash)))
					.collect()
			})
			.unwrap_or_default()
	}

	#[cfg(test)]
	pub fn is_empty(&self) -> bool {
		self.inclusions_inner.is_empty()
	}
}
