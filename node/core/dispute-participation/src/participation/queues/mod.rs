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

use std::{
	cmp::Ordering,
	collections::{BTreeMap, HashMap},
};

use futures::channel::oneshot;

use polkadot_node_primitives::{
	BlockNumber, CandidateHash, CandidateReceipt, Hash, ParticipationPriority, SessionIndex,
};
use polkadot_node_subsystem::{messages::ChainApiMessage, SubsystemSender};

use crate::{
	error::{FatalError, JfyiError, Result},
	metrics::Metrics,
	LOG_TARGET,
};


/// How many potential garbage disputes we want to queue, before starting to drop requests.
pub const BEST_EFFORT_QUEUE_SIZE: usize = 100;

/// How many priority disputes can be queued.
///
/// Once the queue exceeds that size, we will start to drop the newest participation requests in
/// the queue. This limit just serves as a safe guard, it is not expected to ever really be
/// reached.
///
/// For 100 parachains, this would allow for every single candidate in 100 blocks on
/// two forks to get disputed, which should be plenty to deal with any realistic attack.
pub const PRIORITY_QUEUE_SIZE: usize = 20_000;

/// Queues for dispute participation.
///
/// A candidate is on at most one of the two queues, at most once.
pub struct Queues {
	/// Set of best effort participation requests.
	best_effort: BTreeMap<CandidateComparator, ParticipationRequest>,

	/// Priority queue.
	///
	/// In the priority queue, we have a strict ordering of candidates and participation will
	/// happen in that order. Entries here are always dequeued before any best effort entry.
	priority: BTreeMap<CandidateComparator, ParticipationRequest>,

	/// Where each queued candidate lives.
	queued: HashMap<CandidateHash, (CandidateComparator, ParticipationPriority)>,

	best_effort_size: usize,
	priority_size: usize,

	metrics: Metrics,
}

/// A dispute participation request that can be queued.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ParticipationRequest {
	candidate_hash: CandidateHash,
	candidate_receipt: CandidateReceipt,
	session: SessionIndex,
}

/// What can go wrong when queuing a request.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
	#[error("Request could not be queued, because best effort queue was already full.")]
	BestEffortFull,
	#[error("Request could not be queued, because priority queue was already full.")]
	PriorityFull,
}

impl ParticipationRequest {
	/// Create a new `ParticipationRequest` to be queued.
	pub fn new(candidate_receipt: CandidateReceipt, session: SessionIndex) -> Self {
		Self { candidate_hash: candidate_receipt.hash(), candidate_receipt, session }
	}

	pub fn candidate_receipt(&'_ self) -> &'_ CandidateReceipt {
		&self.candidate_receipt
	}
	pub fn candidate_hash(&'_ self) -> &'_ CandidateHash {
		&self.candidate_hash
	}
	pub fn session(&self) -> SessionIndex {
		self.session
	}
}

impl Queues {
	/// Create new `Queues`.
	pub fn new(best_effort_size: usize, priority_size: usize, metrics: Metrics) -> Self {
		Self {
			best_effort: BTreeMap::new(),
			priority: BTreeMap::new(),
			queued: HashMap::new(),
			best_effort_size,
			priority_size,
			metrics,
		}
	}

	/// Will put message in queue, either priority or best effort depending on priority.
	///
	/// The relay parent's block number is looked up via the chain API in order to order the
	/// request with regards to other requests.
	pub async fn queue(
		&mut self,
		sender: &mut impl SubsystemSender,
		priority: ParticipationPriority,
		req: ParticipationRequest,
	) -> Result<()> {
		let comparator = CandidateComparator::new(sender, &req.candidate_receipt).await?;
		self.queue_with_comparator(comparator, priority, req)?;
		Ok(())
	}

	/// Put a request on a queue, ordered by the given comparator.
	///
	/// Queueing a candidate that is already queued is a no-op, unless it was queued best effort
	/// and is now queued with priority, in which case it gets moved to the priority queue.
	///
	/// Returns error in case the target queue was found full already.
	pub fn queue_with_comparator(
		&mut self,
		comparator: CandidateComparator,
		priority: ParticipationPriority,
		req: ParticipationRequest,
	) -> std::result::Result<(), QueueError> {
		if let Some((queued_comparator, queued_priority)) = self.queued.get(&req.candidate_hash) {
			if priority.is_priority() && !queued_priority.is_priority() {
				let queued_comparator = *queued_comparator;
				return self.prioritize_if_present(&queued_comparator)
			}
			tracing::trace!(
				target: LOG_TARGET,
				candidate_hash = ?req.candidate_hash,
				"Participation request already queued",
			);
			return Ok(())
		}

		let result = if priority.is_priority() {
			Self::insert_bounded(&mut self.priority, self.priority_size, comparator, req)
				.map_err(|_| QueueError::PriorityFull)
		} else {
			Self::insert_bounded(&mut self.best_effort, self.best_effort_size, comparator, req)
				.map_err(|_| QueueError::BestEffortFull)
		};

		match result {
			Ok(()) => {
				self.queued.insert(comparator.candidate_hash, (comparator, priority));
				self.metrics.on_queued(priority);
				Ok(())
			},
			Err(err) => {
				self.metrics.on_queue_full();
				Err(err)
			},
		}
	}

	/// Move a best effort entry over to the priority queue, keeping its comparator.
	///
	/// No-op if the candidate is not queued best effort under this comparator.
	pub fn prioritize_if_present(
		&mut self,
		comparator: &CandidateComparator,
	) -> std::result::Result<(), QueueError> {
		if !self.best_effort.contains_key(comparator) {
			return Ok(())
		}
		if self.priority.len() >= self.priority_size {
			self.metrics.on_queue_full();
			return Err(QueueError::PriorityFull)
		}
		if let Some(req) = self.best_effort.remove(comparator) {
			self.priority.insert(*comparator, req);
			self.queued
				.insert(comparator.candidate_hash, (*comparator, ParticipationPriority::Priority));
			self.metrics.on_queued(ParticipationPriority::Priority);
		}
		Ok(())
	}

	/// Get the next best request for dispute participation if any.
	///
	/// Priority queue is always considered first, then the best effort queue.
	pub fn dequeue(&mut self) -> Option<ParticipationRequest> {
		self.pop_entry().map(|(_, _, req)| req)
	}

	/// Like `dequeue`, but also returns where the request was queued, so it can be put back.
	pub(crate) fn pop_entry(
		&mut self,
	) -> Option<(CandidateComparator, ParticipationPriority, ParticipationRequest)> {
		let (comparator, req, priority) = if let Some((comparator, req)) = self.priority.pop_first()
		{
			(comparator, req, ParticipationPriority::Priority)
		} else {
			let (comparator, req) = self.best_effort.pop_first()?;
			(comparator, req, ParticipationPriority::BestEffort)
		};
		self.queued.remove(&comparator.candidate_hash);
		Some((comparator, priority, req))
	}

	/// Whether the candidate is on any of the queues.
	pub fn contains(&self, candidate_hash: &CandidateHash) -> bool {
		self.queued.contains_key(candidate_hash)
	}

	/// Total number of queued requests.
	pub fn len(&self) -> usize {
		self.queued.len()
	}

	/// Nothing queued at all.
	pub fn is_empty(&self) -> bool {
		self.queued.is_empty()
	}

	fn insert_bounded(
		queue: &mut BTreeMap<CandidateComparator, ParticipationRequest>,
		limit: usize,
		comparator: CandidateComparator,
		req: ParticipationRequest,
	) -> std::result::Result<(), ()> {
		if queue.len() >= limit {
			return Err(())
		}
		queue.insert(comparator, req);
		Ok(())
	}
}

/// `Comparator` for ordering of disputes for candidates.
///
/// This `comparator` makes it possible to order disputes based on age and to ensure some fairness
/// between chains in case of equally old disputes.
///
/// Objective ordering between nodes is important in case of lots disputes, so nodes will pull in
/// the same direction and work on resolving the same disputes first. This ensures that we will
/// conclude some disputes, even if there are lots of them. While any objective ordering would
/// suffice for this goal, ordering by age ensures we are not only resolving disputes, but also
/// resolve the oldest one first, which are also the most urgent and important ones to resolve.
///
/// Candidates whose relay parent could not be looked up sort after all others.
#[derive(Copy, Clone, Debug)]
pub struct CandidateComparator {
	/// Block number of the relay parent. If `None`, the candidate's relay parent is unknown to
	/// us.
	///
	/// Important, so we will be participating in oldest disputes first.
	relay_parent_block_number: Option<BlockNumber>,
	/// By adding the `CandidateHash`, we can guarantee a unique ordering across candidates.
	candidate_hash: CandidateHash,
}

impl CandidateComparator {
	/// Create a candidate comparator based on given (fake) values.
	///
	/// Useful for testing.
	#[cfg(test)]
	pub fn new_dummy(block_number: Option<BlockNumber>, candidate_hash: CandidateHash) -> Self {
		Self { relay_parent_block_number: block_number, candidate_hash }
	}

	/// Create a candidate comparator for a given candidate.
	///
	/// Returns a comparator without block number in case the relay parent is unknown to the
	/// chain API, an error in case the lookup fails.
	pub async fn new(
		sender: &mut impl SubsystemSender,
		candidate: &CandidateReceipt,
	) -> Result<Self> {
		let candidate_hash = candidate.hash();
		let n = get_block_number(sender, candidate.descriptor().relay_parent).await?;

		if n.is_none() {
			tracing::warn!(
				target: LOG_TARGET,
				?candidate_hash,
				"Candidate's relay_parent could not be found via chain API - `CandidateComparator` \
				with an empty relay parent block number will be provided!"
			);
		}

		Ok(CandidateComparator { relay_parent_block_number: n, candidate_hash })
	}

	/// The candidate this comparator belongs to.
	pub fn candidate_hash(&self) -> &CandidateHash {
		&self.candidate_hash
	}

	/// Block number of the candidate's relay parent, if known.
	pub fn relay_parent_block_number(&self) -> Option<BlockNumber> {
		self.relay_parent_block_number
	}
}

impl PartialEq for CandidateComparator {
	fn eq(&self, other: &CandidateComparator) -> bool {
		Ordering::Equal == self.cmp(other)
	}
}

impl Eq for CandidateComparator {}

impl PartialOrd for CandidateComparator {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for CandidateComparator {
	fn cmp(&self, other: &Self) -> Ordering {
		match (self.relay_parent_block_number, other.relay_parent_block_number) {
			(None, None) => {
				// No relay parents for both -> compare hashes
				self.candidate_hash.cmp(&other.candidate_hash)
			},
			(Some(self_relay_parent_block_num), Some(other_relay_parent_block_num)) => {
				match self_relay_parent_block_num.cmp(&other_relay_parent_block_num) {
					// if the relay parent is the same for both -> compare hashes
					Ordering::Equal => self.candidate_hash.cmp(&other.candidate_hash),
					// if not - return the result from comparing the relay parent block numbers
					o => o,
				}
			},
			(Some(_), None) => {
				// Candidates with known relay parents are always with priority
				Ordering::Less
			},
			(None, Some(_)) => {
				// Ditto
				Ordering::Greater
			},
		}
	}
}

async fn get_block_number(
	sender: &mut impl SubsystemSender,
	relay_parent: Hash,
) -> Result<Option<BlockNumber>> {
	let (tx, rx) = oneshot::channel();
	sender.send_message(ChainApiMessage::BlockNumber(relay_parent, tx)).await;
	let number = rx
		.await
		.map_err(|_| FatalError::ChainApiSenderDropped)?
		.map_err(JfyiError::BlockNumberLookupFailed)?;
	Ok(number)
}
