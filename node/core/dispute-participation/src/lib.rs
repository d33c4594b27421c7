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

//! Implements the dispute participation subsystem.
//!
//! This subsystem decides which disputed candidates the node re-validates, in which order and
//! how many at a time. Requests are put on a priority or a best-effort queue, ordered by the
//! block number of their relay parent, and handed to a bounded number of background workers.
//! Each worker recovers the available data, fetches the validation code and validates the
//! candidate. The outcome is forwarded to the dispute coordinator.
//!
//! Alongside, the chain scraper follows new leaves and their not yet seen ancestry, keeping track
//! of candidates that got backed or included on chain. Those facts decide whether a dispute
//! deserves priority and whether it looks like spam.

use futures::{channel::mpsc, pin_mut, select, FutureExt, StreamExt};

use polkadot_node_subsystem::{
	messages::{
		CandidateInclusionState, DisputeCoordinatorMessage, DisputeParticipationMessage,
	},
	ActiveLeavesUpdate, FromOrchestra, OverseerSignal, SpawnedSubsystem, Subsystem,
	SubsystemContext, SubsystemError, SubsystemSender,
};

/// Common error types for this subsystem.
mod error;
pub use error::{log_error, Error, FatalError, FatalResult, JfyiError, JfyiResult, Result};

mod metrics;
pub use metrics::Metrics;

/// Handling of participation requests via `Participation`.
///
/// `Participation` provides an API (`Participation::queue_participation`) for queuing of dispute
/// participations and will process those participation requests, such that most important/urgent
/// disputes will be resolved and processed first and more importantly it will order requests in a
/// way so disputes will get resolved, even if there are lots of them.
pub mod participation;
use participation::{
	Participation, ParticipationRequest, WorkerMessage, WorkerMessageReceiver,
	BEST_EFFORT_QUEUE_SIZE, PRIORITY_QUEUE_SIZE,
};

/// Scraping of the chain for included and backed candidates, see `ChainScraper`.
pub mod scraping;
use scraping::ChainScraper;


pub(crate) const LOG_TARGET: &str = "parachain::dispute-participation";

/// Capacity of the channel workers report their outcome on.
///
/// At most `MAX_PARALLEL_PARTICIPATIONS` workers are alive at any time, each sends once.
const WORKER_CHANNEL_SIZE: usize = 1;

/// Configuration for the dispute participation subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
	/// Maximum number of requests on the best-effort queue.
	pub best_effort_queue_size: usize,
	/// Maximum number of requests on the priority queue.
	pub priority_queue_size: usize,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			best_effort_queue_size: BEST_EFFORT_QUEUE_SIZE,
			priority_queue_size: PRIORITY_QUEUE_SIZE,
		}
	}
}

/// The dispute participation subsystem.
pub struct DisputeParticipationSubsystem {
	config: Config,
	metrics: Metrics,
}

impl<Context> Subsystem<Context> for DisputeParticipationSubsystem
where
	Context: SubsystemContext<Message = DisputeParticipationMessage>,
{
	fn start(self, ctx: Context) -> SpawnedSubsystem {
		let future = async move {
			self.run(ctx)
				.await
				.map_err(|e| SubsystemError::with_origin("dispute-participation", e))
		}
		.boxed();

		SpawnedSubsystem { name: "dispute-participation-subsystem", future }
	}
}

impl DisputeParticipationSubsystem {
	/// Create a new instance of the subsystem.
	pub fn new(config: Config, metrics: Metrics) -> Self {
		Self { config, metrics }
	}

	async fn run<Context>(self, mut ctx: Context) -> FatalResult<()>
	where
		Context: SubsystemContext<Message = DisputeParticipationMessage>,
	{
		let (worker_sender, worker_receiver) = mpsc::channel(WORKER_CHANNEL_SIZE);
		let mut state = State {
			participation: Participation::new(worker_sender, &self.config, self.metrics),
			participation_receiver: worker_receiver,
			scraper: ChainScraper::new(),
		};

		loop {
			let res = state.run_until_error(&mut ctx).await;
			if let Ok(()) = res {
				tracing::info!(target: LOG_TARGET, "received `Conclude` signal, exiting");
				return Ok(())
			}
			log_error(res)?;
		}
	}
}

/// Everything the subsystem keeps between messages.
struct State {
	participation: Participation,
	participation_receiver: WorkerMessageReceiver,
	scraper: ChainScraper,
}

impl State {
	/// Process messages until `Conclude` or the first error.
	///
	/// All state lives in `self`, so the caller can just call this again after logging a non
	/// fatal error.
	async fn run_until_error<Context>(&mut self, ctx: &mut Context) -> Result<()>
	where
		Context: SubsystemContext<Message = DisputeParticipationMessage>,
	{
		loop {
			match MuxedMessage::receive(ctx, &mut self.participation_receiver).await? {
				MuxedMessage::Participation(msg) => {
					let statement = self.participation.get_participation_result(ctx, msg).await?;
					tracing::debug!(
						target: LOG_TARGET,
						candidate_hash = ?statement.candidate_hash,
						session = statement.session,
						outcome = ?statement.outcome,
						"Participation finished",
					);
					ctx.sender()
						.send_message(DisputeCoordinatorMessage::ParticipationOutcome(statement))
						.await;
				},
				MuxedMessage::Subsystem(msg) => match msg {
					FromOrchestra::Signal(OverseerSignal::Conclude) => return Ok(()),
					FromOrchestra::Signal(OverseerSignal::ActiveLeaves(update)) => {
						self.process_active_leaves_update(ctx, &update).await?;
					},
					FromOrchestra::Signal(OverseerSignal::BlockFinalized(_, n)) => {
						self.scraper.process_finalized_block(&n);
					},
					FromOrchestra::Communication { msg } =>
						self.handle_incoming(ctx, msg).await?,
				},
			}
		}
	}

	/// Scrape the new leaf, forward what was found and let participation know about the leaf.
	///
	/// Participation learns about the leaf even if scraping failed for a non fatal reason.
	async fn process_active_leaves_update<Context>(
		&mut self,
		ctx: &mut Context,
		update: &ActiveLeavesUpdate,
	) -> Result<()>
	where
		Context: SubsystemContext<Message = DisputeParticipationMessage>,
	{
		let scraped_updates =
			match self.scraper.process_active_leaves_update(ctx.sender(), update).await {
				Ok(scraped_updates) => Some(scraped_updates),
				Err(err) => {
					log_error(Err(err))?;
					None
				},
			};

		if let Some(scraped_updates) = scraped_updates.filter(|u| !u.is_empty()) {
			let included_receipts = scraped_updates.included_receipts.clone();
			ctx.sender()
				.send_message(DisputeCoordinatorMessage::ScrapedUpdates(scraped_updates))
				.await;
			self.participation.bump_to_priority_for_candidates(ctx, &included_receipts).await?;
		}

		self.participation.process_active_leaves_update(ctx, update).await?;
		Ok(())
	}

	async fn handle_incoming<Context>(
		&mut self,
		ctx: &mut Context,
		msg: DisputeParticipationMessage,
	) -> Result<()>
	where
		Context: SubsystemContext<Message = DisputeParticipationMessage>,
	{
		match msg {
			DisputeParticipationMessage::Participate { candidate_receipt, session, priority } => {
				let req = ParticipationRequest::new(candidate_receipt, session);
				tracing::trace!(
					target: LOG_TARGET,
					candidate_hash = ?req.candidate_hash(),
					session,
					?priority,
					"Received participation request",
				);
				self.participation.queue_participation(ctx, priority, req).await?;
			},
			DisputeParticipationMessage::BumpPriority(receipts) => {
				self.participation.bump_to_priority_for_candidates(ctx, &receipts).await?;
			},
			DisputeParticipationMessage::QueryCandidateInclusion {
				candidate_hash,
				response_sender,
			} => {
				let state = CandidateInclusionState {
					included: self.scraper.is_candidate_included(&candidate_hash),
					backed: self.scraper.is_candidate_backed(&candidate_hash),
					including_blocks: self.scraper.get_blocks_including_candidate(&candidate_hash),
				};
				response_sender.send(state).map_err(|_| JfyiError::QueryResponseSendFailed)?;
			},
		}
		Ok(())
	}
}

/// Messages to be handled in this subsystem.
enum MuxedMessage<M> {
	/// Messages from other subsystems.
	Subsystem(FromOrchestra<M>),
	/// Messages from participation workers.
	Participation(WorkerMessage),
}

impl<M> MuxedMessage<M> {
	async fn receive<Context>(
		ctx: &mut Context,
		from_sender: &mut WorkerMessageReceiver,
	) -> FatalResult<Self>
	where
		Context: SubsystemContext<Message = M>,
	{
		// We are only fusing here to make `select` happy, in reality we will quit if one of those
		// streams end:
		let from_overseer = ctx.recv().fuse();
		let from_sender = from_sender.next();
		pin_mut!(from_overseer, from_sender);
		select! {
			msg = from_overseer => Ok(Self::Subsystem(msg.map_err(FatalError::SubsystemReceive)?)),
			msg = from_sender => Ok(Self::Participation(msg.ok_or(FatalError::ParticipationWorkerReceiverExhausted)?)),
		}
	}
}
