// Copyright 2021 Parity Technologies (UK) Ltd.
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

//! Dummy values for primitives, for use in tests.

use std::sync::Arc;

use polkadot_node_primitives::{
	AvailableData, BlockData, CandidateDescriptor, CandidateReceipt, Hash, HeadData,
	PersistedValidationData, PoV, ValidationCode,
};

/// Creates a `Hash` filled with `0`.
pub fn dummy_hash() -> Hash {
	Hash::zero()
}

/// Create a candidate descriptor with the given relay parent, all else zeroed.
pub fn dummy_candidate_descriptor(relay_parent: Hash) -> CandidateDescriptor {
	CandidateDescriptor { relay_parent, ..Default::default() }
}

/// Create a candidate receipt with the given relay parent.
pub fn dummy_candidate_receipt(relay_parent: Hash) -> CandidateReceipt {
	CandidateReceipt {
		descriptor: dummy_candidate_descriptor(relay_parent),
		commitments_hash: dummy_hash(),
	}
}

/// Create a candidate receipt that differs from others by `index` only.
///
/// Handy to get many distinct candidate hashes sharing a relay parent.
pub fn dummy_candidate_receipt_with_index(relay_parent: Hash, index: u64) -> CandidateReceipt {
	let mut receipt = dummy_candidate_receipt(relay_parent);
	receipt.commitments_hash = Hash::from_low_u64_be(index);
	receipt
}

/// Some non empty validation code.
pub fn dummy_validation_code() -> ValidationCode {
	ValidationCode(vec![1, 2, 3])
}

/// Available data matching the candidates built above.
pub fn dummy_available_data() -> AvailableData {
	AvailableData {
		pov: Arc::new(PoV { block_data: BlockData(Vec::new()) }),
		validation_data: PersistedValidationData {
			parent_head: HeadData(Vec::new()),
			..Default::default()
		},
	}
}
