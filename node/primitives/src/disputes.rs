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

//! Dispute related node-side types.

use std::collections::BTreeSet;

use crate::{
	byzantine_threshold, CandidateHash, CandidateReceipt, SessionIndex,
	ValidatorIndex,
};

/// Whether a participation request should be put on best-effort or the priority queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipationPriority {
	/// Speculative participation, dropped first under load.
	BestEffort,
	/// Participation in a dispute we have good reason to believe matters.
	Priority,
}

impl ParticipationPriority {
	/// Whether or not this is a priority entry.
	///
	/// If false, it is best effort.
	pub fn is_priority(&self) -> bool {
		match self {
			Self::Priority => true,
			Self::BestEffort => false,
		}
	}
}

/// Outcome of the validation process.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParticipationOutcome {
	/// Candidate was found to be valid.
	Valid,
	/// Candidate was found to be invalid.
	Invalid,
	/// Candidate was found to be unavailable.
	Unavailable,
	/// Something went wrong (bug), details can be found in the logs.
	Error,
}

impl ParticipationOutcome {
	/// Label used for metrics.
	pub fn as_label(&self) -> &'static str {
		match self {
			Self::Valid => "valid",
			Self::Invalid => "invalid",
			Self::Unavailable => "unavailable",
			Self::Error => "error",
		}
	}
}

/// Statement as result of the validation process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipationStatement {
	/// Relevant session.
	pub session: SessionIndex,
	/// The candidate the worker has been spawned for.
	pub candidate_hash: CandidateHash,
	/// Used receipt.
	pub candidate_receipt: CandidateReceipt,
	/// Actual result.
	pub outcome: ParticipationOutcome,
}

/// Errors when evaluating a `CandidateVoteState`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoteStateError {
	/// Thresholds cannot be computed without knowing the size of the validator set.
	#[error("Number of validators of session {0} is unknown")]
	UnknownValidatorCount(SessionIndex),
}

/// Votes cast on a candidate so far, plus the size of the validator set they were cast in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateVoteState {
	session: SessionIndex,
	n_validators: usize,
	valid: BTreeSet<ValidatorIndex>,
	invalid: BTreeSet<ValidatorIndex>,
}

impl CandidateVoteState {
	/// Create a state without any votes.
	pub fn new(session: SessionIndex, n_validators: usize) -> Self {
		Self { session, n_validators, valid: BTreeSet::new(), invalid: BTreeSet::new() }
	}

	/// Record a vote in favour of the candidate.
	pub fn note_valid(&mut self, validator: ValidatorIndex) {
		self.valid.insert(validator);
	}

	/// Record a vote against the candidate.
	pub fn note_invalid(&mut self, validator: ValidatorIndex) {
		self.invalid.insert(validator);
	}

	/// We have a dispute, if we have votes on both sides.
	pub fn is_disputed(&self) -> bool {
		!self.valid.is_empty() && !self.invalid.is_empty()
	}

	/// Whether enough distinct validators voted for at least one of them to be honest.
	pub fn is_confirmed(&self) -> Result<bool, VoteStateError> {
		if self.n_validators == 0 {
			return Err(VoteStateError::UnknownValidatorCount(self.session))
		}
		let voters = self.valid.union(&self.invalid).count();
		Ok(voters > byzantine_threshold(self.n_validators))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_matches::assert_matches;

	#[test]
	fn dispute_needs_votes_on_both_sides() {
		let mut state = CandidateVoteState::new(1, 10);
		state.note_valid(ValidatorIndex(0));
		state.note_valid(ValidatorIndex(1));
		assert!(!state.is_disputed());

		state.note_invalid(ValidatorIndex(2));
		assert!(state.is_disputed());
	}

	#[test]
	fn confirmation_needs_more_than_byzantine_threshold() {
		let mut state = CandidateVoteState::new(1, 10);
		state.note_valid(ValidatorIndex(0));
		state.note_invalid(ValidatorIndex(1));
		// A validator voting on both sides only counts once.
		state.note_invalid(ValidatorIndex(0));
		state.note_invalid(ValidatorIndex(2));
		assert_eq!(state.is_confirmed(), Ok(false));

		state.note_valid(ValidatorIndex(3));
		assert_eq!(state.is_confirmed(), Ok(true));
	}

	#[test]
	fn unknown_validator_count_fails_confirmation() {
		let state = CandidateVoteState::new(7, 0);
		assert_matches!(state.is_confirmed(), Err(VoteStateError::UnknownValidatorCount(7)));
	}
}
