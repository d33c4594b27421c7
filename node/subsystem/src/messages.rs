// Copyright 2017-2020 Parity Technologies (UK) Ltd.
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

//! Message types for the subsystems dispute participation talks to.
//!
//! Subsystems' APIs are defined separately from their implementation, leading to easier mocking.

use std::sync::Arc;

use futures::channel::oneshot;

use polkadot_node_primitives::{
	AvailableData, BlockNumber, CandidateEvent, CandidateHash, CandidateReceipt, GroupIndex, Hash,
	ParticipationPriority, ParticipationStatement, PoV, PvfExecTimeoutKind, ScrapedOnChainVotes,
	ScrapedUpdates, SessionIndex, ValidationCode, ValidationCodeHash, ValidationResult,
};

use crate::errors::{ChainApiError, RecoveryError, RuntimeApiError, ValidationFailed};

/// Messages received by the Candidate Validation subsystem.
#[derive(Debug)]
pub enum CandidateValidationMessage {
	/// Validate a candidate with provided parameters using relay-chain state.
	///
	/// This will implicitly attempt to gather the `PersistedValidationData` and `ValidationCode`
	/// from the runtime API of the chain, based on the `relay_parent`
	/// of the `CandidateDescriptor`.
	///
	/// This will also perform checking of validation outputs against the acceptance criteria.
	ValidateFromChainState {
		/// The candidate to validate.
		candidate_receipt: CandidateReceipt,
		/// The recovered proof of validity.
		pov: Arc<PoV>,
		/// Which execution timeout to apply.
		exec_timeout_kind: PvfExecTimeoutKind,
		/// Where to send the result.
		response_sender: oneshot::Sender<Result<ValidationResult, ValidationFailed>>,
	},
}

/// Availability Recovery Message.
#[derive(Debug)]
pub enum AvailabilityRecoveryMessage {
	/// Recover available data from validators on the network.
	RecoverAvailableData(
		CandidateReceipt,
		SessionIndex,
		Option<GroupIndex>, // Optional backing group to request from first.
		oneshot::Sender<Result<AvailableData, RecoveryError>>,
	),
}

/// A response channel for the result of a chain API request.
pub type ChainApiResponseChannel<T> = oneshot::Sender<Result<T, ChainApiError>>;

/// Chain API request subsystem message.
#[derive(Debug)]
pub enum ChainApiMessage {
	/// Request the block number by hash.
	/// Returns `None` if a block with the given hash is not present in the db.
	BlockNumber(Hash, ChainApiResponseChannel<Option<BlockNumber>>),
	/// Request the last finalized block number.
	/// This request always succeeds.
	FinalizedBlockNumber(ChainApiResponseChannel<BlockNumber>),
	/// Request the `k` ancestor block hashes of a block with the given hash.
	/// The response channel may return a `Vec` of size up to `k`
	/// filled with ancestors hashes with the following order:
	/// `parent`, `grandparent`, ... up to the hash of genesis block
	/// with number 0, including it.
	Ancestors {
		/// The hash of the block in question.
		hash: Hash,
		/// The number of ancestors to request.
		k: usize,
		/// The response channel.
		response_channel: ChainApiResponseChannel<Vec<Hash>>,
	},
}

/// A sender for the result of a runtime API request.
pub type RuntimeApiSender<T> = oneshot::Sender<Result<T, RuntimeApiError>>;

/// A request to the Runtime API subsystem.
#[derive(Debug)]
pub enum RuntimeApiRequest {
	/// Get all events concerning candidates (backing, inclusion, time-out) in the parent of
	/// the block in whose state this request is executed.
	CandidateEvents(RuntimeApiSender<Vec<CandidateEvent>>),
	/// Scrape dispute relevant from on-chain, backing votes and resolved disputes.
	FetchOnChainVotes(RuntimeApiSender<Option<ScrapedOnChainVotes>>),
	/// Get the validation code (used by parachain validators to execute the parachain
	/// validation function) by its hash.
	ValidationCodeByHash(ValidationCodeHash, RuntimeApiSender<Option<ValidationCode>>),
}

/// A message to the Runtime API subsystem.
#[derive(Debug)]
pub enum RuntimeApiMessage {
	/// Make a request of the runtime API against the post-state of the given relay-parent.
	Request(Hash, RuntimeApiRequest),
}

impl RuntimeApiMessage {
	/// If the current variant contains the relay parent hash, return it.
	pub fn relay_parent(&self) -> Option<Hash> {
		match self {
			Self::Request(hash, _) => Some(*hash),
		}
	}
}

/// Messages sent to the dispute coordinator, the owner of all dispute votes.
#[derive(Debug)]
pub enum DisputeCoordinatorMessage {
	/// Result of a local participation, to be turned into a signed statement and imported.
	ParticipationOutcome(ParticipationStatement),
	/// Candidates and votes found on chain while scraping a new leaf and its ancestry.
	ScrapedUpdates(ScrapedUpdates),
}

/// What the chain scraper knows about a candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateInclusionState {
	/// Seen included in any not yet pruned block.
	pub included: bool,
	/// Seen backed in any not yet pruned block.
	pub backed: bool,
	/// All blocks the candidate was seen included in.
	pub including_blocks: Vec<(BlockNumber, Hash)>,
}

/// Messages received by the dispute participation subsystem.
#[derive(Debug)]
pub enum DisputeParticipationMessage {
	/// Validate a candidate for the purposes of participating in a dispute.
	Participate {
		/// The receipt of the candidate.
		candidate_receipt: CandidateReceipt,
		/// The session the candidate appears in.
		session: SessionIndex,
		/// Which queue to put the request on, if it cannot be served right away.
		priority: ParticipationPriority,
	},
	/// Corroborating evidence was found for these candidates, move any queued best-effort
	/// participation for them to the priority queue.
	BumpPriority(Vec<CandidateReceipt>),
	/// Query what the chain scraper knows about the given candidate.
	QueryCandidateInclusion {
		/// The candidate in question.
		candidate_hash: CandidateHash,
		/// Where to send the answer.
		response_sender: oneshot::Sender<CandidateInclusionState>,
	},
}

/// A message type tying together all message types that are used across subsystems.
#[derive(Debug)]
pub enum AllMessages {
	/// Message for the validation subsystem.
	CandidateValidation(CandidateValidationMessage),
	/// Message for the Chain API subsystem.
	ChainApi(ChainApiMessage),
	/// Message for the Runtime API subsystem.
	RuntimeApi(RuntimeApiMessage),
	/// Message for the availability recovery subsystem.
	AvailabilityRecovery(AvailabilityRecoveryMessage),
	/// Message for the dispute coordinator subsystem.
	DisputeCoordinator(DisputeCoordinatorMessage),
	/// Message for the dispute participation subsystem.
	DisputeParticipation(DisputeParticipationMessage),
}

macro_rules! impl_into_all_messages {
	($($message:ty => $variant:ident),* $(,)?) => {
		$(
			impl From<$message> for AllMessages {
				fn from(msg: $message) -> Self {
					AllMessages::$variant(msg)
				}
			}
		)*
	};
}

impl_into_all_messages!(
	CandidateValidationMessage => CandidateValidation,
	ChainApiMessage => ChainApi,
	RuntimeApiMessage => RuntimeApi,
	AvailabilityRecoveryMessage => AvailabilityRecovery,
	DisputeCoordinatorMessage => DisputeCoordinator,
	DisputeParticipationMessage => DisputeParticipation,
);
