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
	collections::HashSet,
	sync::atomic::{AtomicUsize, Ordering},
};

use fatality::Split;
use futures::{
	channel::{mpsc, oneshot},
	FutureExt, SinkExt,
};
use parking_lot::Mutex;

use polkadot_node_metrics::metrics::prometheus::prometheus::HistogramTimer;
use polkadot_node_primitives::{
	BlockNumber, CandidateHash, CandidateReceipt, Hash, InvalidCandidate, ParticipationOutcome,
	ParticipationPriority, ParticipationStatement, PvfExecTimeoutKind, ValidationResult,
};
use polkadot_node_subsystem::{
	errors::{RecoveryError, ValidationFailed},
	messages::{AvailabilityRecoveryMessage, CandidateValidationMessage},
	ActiveLeavesUpdate, SubsystemContext, SubsystemSender,
};
use polkadot_node_subsystem_util::runtime::{self, get_validation_code_by_hash};

use crate::{
	error::{FatalError, FatalResult, Result},
	metrics::Metrics,
	Config, LOG_TARGET,
};

mod queues;
pub use queues::{
	CandidateComparator, ParticipationRequest, QueueError, Queues, BEST_EFFORT_QUEUE_SIZE,
	PRIORITY_QUEUE_SIZE,
};

#[cfg(test)]
mod tests;
#[cfg(test)]
pub use tests::{participation_full_happy_path, participation_missing_availability};

/// How many participation processes do we want to run in parallel the most.
///
/// This should be a relatively low value, while we might have a speedup once we fetched the data,
/// due to multi-core architectures, but the fetching itself can not be improved by parallel
/// requests. This means that higher numbers make it harder for a single dispute to resolve fast.
pub const MAX_PARALLEL_PARTICIPATIONS: usize = 3;

/// Keep track of disputes we need to participate in.
///
/// - Prioritize and queue participations
/// - Dequeue participation requests in order and launch participation worker.
pub struct Participation {
	/// Participations currently being processed.
	running_participations: RunningParticipations,
	/// Priority and best effort queues.
	queue: Queues,
	/// Sender to be passed to worker tasks.
	worker_sender: WorkerMessageSender,
	/// Some recent block for retrieving validation code from chain.
	recent_block: Option<(BlockNumber, Hash)>,
	metrics: Metrics,
}

/// Message from worker tasks.
#[derive(Debug)]
pub struct WorkerMessage(ParticipationStatement);

/// Sender use by worker tasks.
pub type WorkerMessageSender = mpsc::Sender<WorkerMessage>;

/// Receiver to receive messages from worker tasks.
pub type WorkerMessageReceiver = mpsc::Receiver<WorkerMessage>;

impl WorkerMessage {
	fn from_request(req: ParticipationRequest, outcome: ParticipationOutcome) -> Self {
		let session = req.session();
		let candidate_hash = *req.candidate_hash();
		let candidate_receipt = req.candidate_receipt().clone();
		WorkerMessage(ParticipationStatement { session, candidate_hash, candidate_receipt, outcome })
	}
}

/// Result of trying to claim a slot in the running set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryInsert {
	/// Candidate is now running.
	Inserted,
	/// A worker for the candidate is alive already.
	AlreadyRunning,
	/// All worker slots are taken.
	AtCapacity,
}

/// Candidates currently being validated.
///
/// The count mirrors the size of the set and is only ever written while holding the lock, so
/// readers of `len` never observe a count that disagrees with a completed insert or remove.
#[derive(Default)]
pub struct RunningParticipations {
	candidates: Mutex<HashSet<CandidateHash>>,
	count: AtomicUsize,
}

impl RunningParticipations {
	/// Create an empty running set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of running participations.
	pub fn len(&self) -> usize {
		self.count.load(Ordering::Acquire)
	}

	/// Nothing running at all.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Whether a worker for the given candidate is alive.
	pub fn contains(&self, candidate_hash: &CandidateHash) -> bool {
		self.candidates.lock().contains(candidate_hash)
	}

	/// Insert the candidate, unless it is running already or `max` candidates are running.
	pub fn try_insert(&self, candidate_hash: CandidateHash, max: usize) -> TryInsert {
		let mut candidates = self.candidates.lock();
		if candidates.contains(&candidate_hash) {
			return TryInsert::AlreadyRunning
		}
		if candidates.len() >= max {
			return TryInsert::AtCapacity
		}
		candidates.insert(candidate_hash);
		self.count.store(candidates.len(), Ordering::Release);
		TryInsert::Inserted
	}

	/// Remove a candidate, returns whether it was running.
	pub fn remove(&self, candidate_hash: &CandidateHash) -> bool {
		let mut candidates = self.candidates.lock();
		let removed = candidates.remove(candidate_hash);
		self.count.store(candidates.len(), Ordering::Release);
		removed
	}
}

impl Participation {
	/// Get ready for managing dispute participation requests.
	///
	/// The passed in sender will be used by background workers to communicate back their results.
	/// The calling context should make sure to call `Participation::on_worker_message()` for the
	/// received messages.
	pub fn new(sender: WorkerMessageSender, config: &Config, metrics: Metrics) -> Self {
		Self {
			running_participations: RunningParticipations::new(),
			queue: Queues::new(
				config.best_effort_queue_size,
				config.priority_queue_size,
				metrics.clone(),
			),
			worker_sender: sender,
			recent_block: None,
			metrics,
		}
	}

	/// Queue a dispute for the node to participate in.
	///
	/// If capacity is available right now and we already got some relay chain head via
	/// `on_active_leaves_update`, the participation will be launched right away.
	///
	/// Returns: false, if queues are already full.
	pub async fn queue_participation<Context>(
		&mut self,
		ctx: &mut Context,
		priority: ParticipationPriority,
		req: ParticipationRequest,
	) -> Result<()>
	where
		Context: SubsystemContext,
	{
		// Participation already running - we can ignore that request:
		if self.running_participations.contains(req.candidate_hash()) {
			return Ok(())
		}
		// Available capacity - participate right away (if we already have a recent block):
		if let Some((_, h)) = self.recent_block {
			if self.running_participations.len() < MAX_PARALLEL_PARTICIPATIONS {
				match self.fork_participation(ctx, req, h)? {
					None => return Ok(()),
					// Slots got taken in the meantime, fall back to queueing.
					Some(req) => return self.queue.queue(ctx.sender(), priority, req).await,
				}
			}
		}
		// Out of capacity/no recent block yet - queue:
		self.queue.queue(ctx.sender(), priority, req).await
	}

	/// Message from a worker task was received - get the outcome.
	///
	/// Call this function to keep participations going and to receive `ParticipationStatement`s.
	///
	/// This message has to be called for each received worker message, in order to make sure
	/// enough participation processes are running at any given time.
	///
	/// Returns: The received `ParticipationStatement` or a fatal error, in case
	/// something went wrong when dequeuing more requests (tasks could not be spawned).
	pub async fn get_participation_result<Context>(
		&mut self,
		ctx: &mut Context,
		msg: WorkerMessage,
	) -> FatalResult<ParticipationStatement>
	where
		Context: SubsystemContext,
	{
		let WorkerMessage(statement) = msg;
		self.running_participations.remove(&statement.candidate_hash);
		self.metrics.on_running_changed(self.running_participations.len());
		self.metrics.on_participation_outcome(statement.outcome);
		let recent_block = self.recent_block.expect(
			"We never ever reset recent_block to `None` and we already received a result, so it \
			must have been set before. qed.",
		);
		self.dequeue_until_capacity(ctx, recent_block.1).await?;
		Ok(statement)
	}

	/// Process active leaves update.
	///
	/// Make sure we to dequeue participations if that became possible and update most recent
	/// block. Lower or equal leaves than the most recent one are ignored.
	pub async fn process_active_leaves_update<Context>(
		&mut self,
		ctx: &mut Context,
		update: &ActiveLeavesUpdate,
	) -> FatalResult<()>
	where
		Context: SubsystemContext,
	{
		if let Some(activated) = &update.activated {
			match self.recent_block {
				None => {
					self.recent_block = Some((activated.number, activated.hash));
					// Work got potentially unblocked:
					self.dequeue_until_capacity(ctx, activated.hash).await?;
				},
				Some((number, _)) if activated.number > number => {
					self.recent_block = Some((activated.number, activated.hash));
					self.dequeue_until_capacity(ctx, activated.hash).await?;
				},
				Some(_) => {
					tracing::trace!(
						target: LOG_TARGET,
						block_number = activated.number,
						"Ignoring leaf not above the most recent block",
					);
				},
			}
		}
		Ok(())
	}

	/// Moving any request concerning the given candidates from best-effort to
	/// priority, ignoring any candidates that don't have any queued participation requests.
	///
	/// Failures for single candidates are logged and skipped.
	pub async fn bump_to_priority_for_candidates<Context>(
		&mut self,
		ctx: &mut Context,
		included_receipts: &[CandidateReceipt],
	) -> FatalResult<()>
	where
		Context: SubsystemContext,
	{
		for receipt in included_receipts {
			let comparator = match CandidateComparator::new(ctx.sender(), receipt).await {
				Ok(comparator) => comparator,
				Err(err) => {
					let jfyi = err.split()?;
					tracing::debug!(
						target: LOG_TARGET,
						candidate_hash = ?receipt.hash(),
						error = ?jfyi,
						"Could not order candidate for prioritization",
					);
					continue
				},
			};
			if let Err(err) = self.queue.prioritize_if_present(&comparator) {
				tracing::debug!(
					target: LOG_TARGET,
					candidate_hash = ?comparator.candidate_hash(),
					error = ?err,
					"Failed to prioritize participation",
				);
			}
		}
		Ok(())
	}

	/// The most recent block seen, if any.
	pub fn recent_block(&self) -> Option<(BlockNumber, Hash)> {
		self.recent_block
	}

	/// Number of running participations.
	pub fn running(&self) -> usize {
		self.running_participations.len()
	}

	/// Number of queued participation requests.
	pub fn queued(&self) -> usize {
		self.queue.len()
	}

	/// Dequeue until `MAX_PARALLEL_PARTICIPATIONS` is reached.
	async fn dequeue_until_capacity<Context>(
		&mut self,
		ctx: &mut Context,
		recent_head: Hash,
	) -> FatalResult<()>
	where
		Context: SubsystemContext,
	{
		while self.running_participations.len() < MAX_PARALLEL_PARTICIPATIONS {
			let (comparator, priority, req) = match self.queue.pop_entry() {
				Some(entry) => entry,
				None => break,
			};
			if let Some(req) = self.fork_participation(ctx, req, recent_head)? {
				// Capacity got exhausted after all, keep the request for later.
				if let Err(err) = self.queue.queue_with_comparator(comparator, priority, req) {
					tracing::warn!(
						target: LOG_TARGET,
						error = ?err,
						"Dropping participation request that could not be put back",
					);
				}
				break
			}
		}
		Ok(())
	}

	/// Fork a participation task in the background.
	///
	/// Hands back the request if no worker slot was available.
	fn fork_participation<Context>(
		&mut self,
		ctx: &mut Context,
		req: ParticipationRequest,
		recent_head: Hash,
	) -> FatalResult<Option<ParticipationRequest>>
	where
		Context: SubsystemContext,
	{
		let candidate_hash = *req.candidate_hash();
		match self.running_participations.try_insert(candidate_hash, MAX_PARALLEL_PARTICIPATIONS) {
			TryInsert::Inserted => {},
			TryInsert::AlreadyRunning => return Ok(None),
			TryInsert::AtCapacity => return Ok(Some(req)),
		}
		self.metrics.on_running_changed(self.running_participations.len());

		let request_timer = self.metrics.time_participation_pipeline();
		let sender = ctx.sender().clone();
		let spawned = ctx.spawn(
			"participation-worker",
			participate(self.worker_sender.clone(), sender, recent_head, req, request_timer).boxed(),
		);
		if let Err(err) = spawned {
			self.running_participations.remove(&candidate_hash);
			self.metrics.on_running_changed(self.running_participations.len());
			return Err(FatalError::SpawnFailed(err))
		}
		Ok(None)
	}
}

/// Why a participation did not end with a verdict of `Valid`.
///
/// Each reason maps to exactly one reported outcome.
#[derive(Debug, thiserror::Error)]
pub enum ParticipationError {
	#[error("Available data of candidate is invalid")]
	RecoveryInvalid,

	#[error("Candidate is unavailable")]
	RecoveryUnavailable,

	#[error("Availability recovery failed: {0}")]
	RecoveryFailed(#[source] RecoveryError),

	#[error("Availability recovery dropped the response channel")]
	RecoveryCanceled(#[source] oneshot::Canceled),

	#[error("Fetching validation code failed: {0}")]
	FetchValidationCode(#[source] runtime::Error),

	#[error("Validation code is not available")]
	MissingValidationCode,

	#[error("Validation code is empty")]
	EmptyValidationCode,

	#[error("Candidate validation failed: {0}")]
	ValidationFailed(#[source] ValidationFailed),

	#[error("Candidate validation dropped the response channel")]
	ValidationCanceled(#[source] oneshot::Canceled),

	#[error("Candidate is invalid: {0:?}")]
	CandidateInvalid(InvalidCandidate),
}

impl ParticipationError {
	/// The outcome to report for this failure.
	pub fn outcome(&self) -> ParticipationOutcome {
		match self {
			Self::RecoveryInvalid | Self::CandidateInvalid(_) => ParticipationOutcome::Invalid,
			Self::RecoveryUnavailable => ParticipationOutcome::Unavailable,
			Self::RecoveryFailed(_) |
			Self::RecoveryCanceled(_) |
			Self::FetchValidationCode(_) |
			Self::MissingValidationCode |
			Self::EmptyValidationCode |
			Self::ValidationFailed(_) |
			Self::ValidationCanceled(_) => ParticipationOutcome::Error,
		}
	}
}

async fn participate(
	mut result_sender: WorkerMessageSender,
	mut sender: impl SubsystemSender,
	block_hash: Hash,
	req: ParticipationRequest,
	request_timer: Option<HistogramTimer>,
) {
	let outcome = match validate_candidate(&mut sender, block_hash, &req).await {
		Ok(()) => ParticipationOutcome::Valid,
		Err(err) => {
			tracing::debug!(
				target: LOG_TARGET,
				candidate_hash = ?req.candidate_hash(),
				session = req.session(),
				error = ?err,
				"Participation did not find the candidate valid",
			);
			err.outcome()
		},
	};
	drop(request_timer);

	let candidate_hash = *req.candidate_hash();
	if result_sender.send(WorkerMessage::from_request(req, outcome)).await.is_err() {
		tracing::debug!(
			target: LOG_TARGET,
			?candidate_hash,
			"Participation result could not be sent, subsystem is shutting down",
		);
	}
}

/// Recover the available data, fetch the validation code and validate.
async fn validate_candidate(
	sender: &mut impl SubsystemSender,
	block_hash: Hash,
	req: &ParticipationRequest,
) -> std::result::Result<(), ParticipationError> {
	let (recover_available_data_tx, recover_available_data_rx) = oneshot::channel();
	sender
		.send_message(AvailabilityRecoveryMessage::RecoverAvailableData(
			req.candidate_receipt().clone(),
			req.session(),
			None,
			recover_available_data_tx,
		))
		.await;

	let available_data = match recover_available_data_rx
		.await
		.map_err(ParticipationError::RecoveryCanceled)?
	{
		Ok(data) => data,
		Err(RecoveryError::Invalid) => return Err(ParticipationError::RecoveryInvalid),
		Err(RecoveryError::Unavailable) => return Err(ParticipationError::RecoveryUnavailable),
		Err(err) => return Err(ParticipationError::RecoveryFailed(err)),
	};

	let validation_code = get_validation_code_by_hash(
		sender,
		block_hash,
		req.candidate_receipt().descriptor.validation_code_hash,
	)
	.await
	.map_err(ParticipationError::FetchValidationCode)?
	.ok_or(ParticipationError::MissingValidationCode)?;

	if validation_code.is_empty() {
		return Err(ParticipationError::EmptyValidationCode)
	}

	// Issue a request to validate the candidate with the provided exhaustive
	// parameters
	//
	// We use the approval execution timeout because this is intended to
	// be run outside of backing and therefore should be subject to the
	// same level of leeway.
	let (validation_tx, validation_rx) = oneshot::channel();
	sender
		.send_message(CandidateValidationMessage::ValidateFromChainState {
			candidate_receipt: req.candidate_receipt().clone(),
			pov: available_data.pov,
			exec_timeout_kind: PvfExecTimeoutKind::Approval,
			response_sender: validation_tx,
		})
		.await;

	match validation_rx.await.map_err(ParticipationError::ValidationCanceled)? {
		Ok(ValidationResult::Valid(_)) => Ok(()),
		Ok(ValidationResult::Invalid(invalid)) => Err(ParticipationError::CandidateInvalid(invalid)),
		Err(err) => Err(ParticipationError::ValidationFailed(err)),
	}
}
