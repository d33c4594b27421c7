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

//! Primitive types used on the node-side by dispute participation.
//!
//! Candidate receipts, candidate events and on-chain votes mirror what the runtime exposes; the
//! remaining types (available data, validation results, dispute vote state) only ever live on
//! the node side.

#![warn(missing_docs)]

use std::sync::Arc;

use parity_scale_codec::{Decode, Encode};

pub use sp_core::H256;

pub mod disputes;

pub use disputes::{
	CandidateVoteState, ParticipationOutcome, ParticipationPriority, ParticipationStatement,
	VoteStateError,
};

/// The block number type of the relay chain.
pub type BlockNumber = u32;

/// The hash type of the relay chain.
pub type Hash = H256;

/// The index of a session.
pub type SessionIndex = u32;

/// How many blocks after finalization an information about backed/included candidate should be
/// pre-loaded (when scraping onchain votes) and kept locally (when pruning).
///
/// We don't want to remove scraped candidates on finalization because we want to
/// be sure that disputes will conclude on abandoned forks.
/// Removing the candidate on finalization creates a possibility for an attacker to
/// avoid slashing. If a bad fork is abandoned no one will raise a dispute for it.
pub const DISPUTE_CANDIDATE_LIFETIME_AFTER_FINALIZATION: BlockNumber = 10;

/// Maximum number of blocks the relay chain is allowed to lag behind finality.
///
/// Bounds how far back the chain scraper walks ancestry of a new leaf.
pub const MAX_FINALITY_LAG: u32 = 500;

/// Unique identifier of a candidate: the blake2-256 hash of its encoded receipt.
#[derive(Clone, Copy, Default, Encode, Decode, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct CandidateHash(pub Hash);

impl std::fmt::Display for CandidateHash {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		std::fmt::Display::fmt(&self.0, f)
	}
}

impl std::fmt::Debug for CandidateHash {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:?}", self.0)
	}
}

/// Identifier of a parachain.
#[derive(Clone, Copy, Default, Debug, Encode, Decode, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ParaId(pub u32);

impl From<u32> for ParaId {
	fn from(id: u32) -> Self {
		Self(id)
	}
}

/// Index of a validator within a session.
#[derive(Clone, Copy, Default, Debug, Encode, Decode, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ValidatorIndex(pub u32);

/// Index of an availability core.
#[derive(Clone, Copy, Default, Debug, Encode, Decode, PartialEq, Eq)]
pub struct CoreIndex(pub u32);

impl From<u32> for CoreIndex {
	fn from(i: u32) -> Self {
		Self(i)
	}
}

/// Index of a backing group.
#[derive(Clone, Copy, Default, Debug, Encode, Decode, PartialEq, Eq)]
pub struct GroupIndex(pub u32);

impl From<u32> for GroupIndex {
	fn from(i: u32) -> Self {
		Self(i)
	}
}

/// Parachain head data.
#[derive(Clone, Default, Debug, Encode, Decode, PartialEq, Eq)]
pub struct HeadData(pub Vec<u8>);

/// Hash of some `ValidationCode`.
#[derive(Clone, Copy, Default, Debug, Encode, Decode, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ValidationCodeHash(pub Hash);

impl From<Hash> for ValidationCodeHash {
	fn from(hash: Hash) -> Self {
		Self(hash)
	}
}

/// Parachain validation code.
#[derive(Clone, Default, Debug, Encode, Decode, PartialEq, Eq)]
pub struct ValidationCode(pub Vec<u8>);

impl ValidationCode {
	/// Whether there is any code at all.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// A unique descriptor of the candidate receipt.
#[derive(Clone, Default, Debug, Encode, Decode, PartialEq, Eq)]
pub struct CandidateDescriptor {
	/// The ID of the para this is a candidate for.
	pub para_id: ParaId,
	/// The hash of the relay-chain block this is executed in the context of.
	pub relay_parent: Hash,
	/// The blake2-256 hash of the persisted validation data.
	pub persisted_validation_data_hash: Hash,
	/// The blake2-256 hash of the PoV.
	pub pov_hash: Hash,
	/// The root of a block's erasure encoding Merkle tree.
	pub erasure_root: Hash,
	/// Hash of the para header that is being generated by this candidate.
	pub para_head: Hash,
	/// The blake2-256 hash of the validation code bytes.
	pub validation_code_hash: ValidationCodeHash,
}

/// A candidate-receipt.
#[derive(Clone, Default, Debug, Encode, Decode, PartialEq, Eq)]
pub struct CandidateReceipt {
	/// The descriptor of the candidate.
	pub descriptor: CandidateDescriptor,
	/// The hash of the encoded commitments made as a result of candidate execution.
	pub commitments_hash: Hash,
}

impl CandidateReceipt {
	/// Get a reference to the candidate descriptor.
	pub fn descriptor(&self) -> &CandidateDescriptor {
		&self.descriptor
	}

	/// Computes the blake2-256 hash of the receipt.
	pub fn hash(&self) -> CandidateHash {
		CandidateHash(H256(sp_crypto_hashing::blake2_256(&self.encode())))
	}
}

/// Events emitted by the runtime's inclusion module for a block.
#[derive(Clone, Debug, Encode, Decode, PartialEq, Eq)]
pub enum CandidateEvent {
	/// This candidate receipt was backed in the most recent block.
	#[codec(index = 0)]
	CandidateBacked(CandidateReceipt, HeadData, CoreIndex, GroupIndex),
	/// This candidate receipt was included and became a parablock at the most recent block.
	#[codec(index = 1)]
	CandidateIncluded(CandidateReceipt, HeadData, CoreIndex, GroupIndex),
	/// This candidate receipt was not made available in time and timed out.
	#[codec(index = 2)]
	CandidateTimedOut(CandidateReceipt, HeadData, CoreIndex),
}

/// Backing votes and disputes put on chain in a block.
#[derive(Clone, Default, Debug, Encode, Decode, PartialEq, Eq)]
pub struct ScrapedOnChainVotes {
	/// The session in which the block was included.
	pub session: SessionIndex,
	/// Backed candidates together with the validators that backed them.
	pub backing_validators_per_candidate: Vec<(CandidateReceipt, Vec<ValidatorIndex>)>,
	/// Hashes of candidates a dispute statement set was imported for.
	pub disputes: Vec<CandidateHash>,
}

/// Result of scraping a new leaf and its unseen ancestry.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct ScrapedUpdates {
	/// On-chain votes, one entry per block that carried any.
	pub on_chain_votes: Vec<ScrapedOnChainVotes>,
	/// Receipts of all candidates seen included.
	pub included_receipts: Vec<CandidateReceipt>,
}

impl ScrapedUpdates {
	/// Whether nothing at all was scraped.
	pub fn is_empty(&self) -> bool {
		self.on_chain_votes.is_empty() && self.included_receipts.is_empty()
	}
}

/// Parachain block data.
#[derive(Clone, Default, Debug, Encode, Decode, PartialEq, Eq)]
pub struct BlockData(pub Vec<u8>);

/// A Proof-of-Validity
#[derive(Clone, Default, Debug, Encode, Decode, PartialEq, Eq)]
pub struct PoV {
	/// The block witness data.
	pub block_data: BlockData,
}

/// The validation data that is persisted alongside a candidate.
#[derive(Clone, Default, Debug, Encode, Decode, PartialEq, Eq)]
pub struct PersistedValidationData {
	/// The parent head-data.
	pub parent_head: HeadData,
	/// The relay-chain block number this is in the context of.
	pub relay_parent_number: BlockNumber,
	/// The relay-chain block storage root this is in the context of.
	pub relay_parent_storage_root: Hash,
	/// The maximum legal size of a PoV block, in bytes.
	pub max_pov_size: u32,
}

/// This is the data we keep available for each candidate included in the relay chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AvailableData {
	/// The Proof-of-Validation of the candidate.
	pub pov: Arc<PoV>,
	/// The persisted validation data needed for secondary checks.
	pub validation_data: PersistedValidationData,
}

/// Type of PVF execution timeout to apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PvfExecTimeoutKind {
	/// Lenient timeout used for approval checking and dispute participation.
	Approval,
}

/// Candidate invalidity details
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvalidCandidate {
	/// Failed to execute `validate_block`. This includes function panicking.
	ExecutionError(String),
	/// Validation outputs check doesn't pass.
	InvalidOutputs,
	/// Execution timeout.
	Timeout,
	/// Validation input is over the limit.
	ParamsTooLarge(u64),
	/// Code size is over the limit.
	CodeTooLarge(u64),
	/// PoV hash does not match.
	PoVHashMismatch,
	/// Commitments hash does not match.
	CommitmentsHashMismatch,
	/// The validation code hash does not match.
	CodeHashMismatch,
}

/// Result of the validation of the candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationResult {
	/// Candidate is valid. The validation data is the one the candidate was checked against.
	Valid(PersistedValidationData),
	/// Candidate is invalid.
	Invalid(InvalidCandidate),
}

/// Threshold of dispute votes above which a dispute counts as confirmed: at least one honest
/// validator is among the voters.
pub const fn byzantine_threshold(n: usize) -> usize {
	n.saturating_sub(1) / 3
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn receipt_hash_changes_with_commitments() {
		let mut receipt = CandidateReceipt::default();
		let before = receipt.hash();
		receipt.commitments_hash = Hash::repeat_byte(1);
		assert_ne!(before, receipt.hash());
		assert_eq!(receipt.hash(), receipt.clone().hash());
	}

	#[test]
	fn thresholds() {
		assert_eq!(byzantine_threshold(0), 0);
		assert_eq!(byzantine_threshold(1), 0);
		assert_eq!(byzantine_threshold(4), 1);
		assert_eq!(byzantine_threshold(10), 3);
	}
}
