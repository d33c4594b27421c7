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

//! Subsystem accumulation.
//!
//! Node-side signals, the message bus abstraction subsystems are written against and the
//! messages they exchange. The overseer driving all of this lives elsewhere; subsystems only
//! ever see a [`SubsystemContext`].

#![warn(missing_docs)]

use futures::future::BoxFuture;

use polkadot_node_primitives::{BlockNumber, Hash};

pub mod errors;
pub mod messages;

pub use messages::AllMessages;

/// Activated leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivatedLeaf {
	/// The block hash.
	pub hash: Hash,
	/// The block number.
	pub number: BlockNumber,
}

/// Changes in the set of active leaves: the parachain heads which we care to work on.
///
/// Note that the activated and deactivated fields indicate deltas, not complete sets.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct ActiveLeavesUpdate {
	/// New relay chain block of interest.
	pub activated: Option<ActivatedLeaf>,
	/// Relay chain block hashes no longer of interest.
	pub deactivated: Vec<Hash>,
}

impl ActiveLeavesUpdate {
	/// Create a `ActiveLeavesUpdate` with a single activated hash
	pub fn start_work(activated: ActivatedLeaf) -> Self {
		Self { activated: Some(activated), ..Default::default() }
	}

	/// Create a `ActiveLeavesUpdate` with a single deactivated hash
	pub fn stop_work(hash: Hash) -> Self {
		Self { deactivated: vec![hash], ..Default::default() }
	}

	/// Is this update empty and doesn't contain any information?
	pub fn is_empty(&self) -> bool {
		self.activated.is_none() && self.deactivated.is_empty()
	}
}

/// Signals sent by an overseer to a subsystem.
#[derive(PartialEq, Clone, Debug)]
pub enum OverseerSignal {
	/// Subsystems should adjust their jobs to start and stop work on appropriate block hashes.
	ActiveLeaves(ActiveLeavesUpdate),
	/// `Subsystem` is informed of a finalized block by its block hash and number.
	BlockFinalized(Hash, BlockNumber),
	/// Conclude the work of the `Overseer` and all `Subsystem`s.
	Conclude,
}

/// A message type that a subsystem receives from the overseer.
/// It wraps signals from the overseer and messages that are circulating
/// between subsystems.
#[derive(Debug)]
pub enum FromOrchestra<M> {
	/// Signal from the `Overseer`.
	Signal(OverseerSignal),

	/// Some other `Subsystem`'s message.
	Communication {
		/// Contained message
		msg: M,
	},
}

/// An error type that describes faults that may happen
///
/// These are:
///   * Channels being closed
///   * Subsystems dying when they are not expected to
///   * Subsystems not dying when they are told to die
///   * Actual errors from subsystems
#[derive(thiserror::Error, Debug)]
#[allow(missing_docs)]
pub enum SubsystemError {
	#[error(transparent)]
	QueueError(#[from] futures::channel::mpsc::SendError),

	#[error("Failed to spawn a task: {0}")]
	TaskSpawn(&'static str),

	#[error("Error in subsystem context: {0}")]
	Context(String),

	#[error("Subsystem {origin} failed: {source}")]
	FromOrigin {
		origin: &'static str,
		source: Box<dyn std::error::Error + Send + Sync>,
	},
}

impl SubsystemError {
	/// Adds a `str` as `origin` to the given error `err`.
	pub fn with_origin<E: 'static + Send + Sync + std::error::Error>(
		origin: &'static str,
		err: E,
	) -> Self {
		Self::FromOrigin { origin, source: Box::new(err) }
	}
}

/// Result type of subsystem operations.
pub type SubsystemResult<T> = Result<T, SubsystemError>;

/// A sender used by subsystems to communicate with other subsystems.
///
/// Each clone is its own handle, messages sent from one clone are delivered in order.
#[async_trait::async_trait]
pub trait SubsystemSender: Clone + Send + Sync + 'static {
	/// Send a direct message to some other `Subsystem`, routed based on message type.
	async fn send_message<M>(&mut self, msg: M)
	where
		M: Into<AllMessages> + Send + 'static;

	/// Send a message onto the unbounded queue of some other `Subsystem`, routed based on
	/// message type.
	///
	/// This function should be used only when there is some other bounding factor on the
	/// messages sent with it. Otherwise, it risks a memory leak.
	fn send_unbounded_message<M>(&mut self, msg: M)
	where
		M: Into<AllMessages> + Send + 'static;
}

/// A context type that is given to the [`Subsystem`] upon spawning.
/// It can be used by [`Subsystem`] to communicate with other [`Subsystem`]s
/// or spawn jobs.
#[async_trait::async_trait]
pub trait SubsystemContext: Send + 'static {
	/// The message type of this context. Subsystems launched with this context will expect
	/// to receive messages of this type.
	type Message: Send + 'static;
	/// The sender type as provided by `sender()`.
	type Sender: SubsystemSender;

	/// Receive a message.
	async fn recv(&mut self) -> SubsystemResult<FromOrchestra<Self::Message>>;

	/// Obtain the sender.
	fn sender(&mut self) -> &mut Self::Sender;

	/// Spawn a child task on the executor.
	fn spawn(&mut self, name: &'static str, s: BoxFuture<'static, ()>) -> SubsystemResult<()>;
}

/// A running instance of some [`Subsystem`].
pub struct SpawnedSubsystem {
	/// Name of the subsystem being spawned.
	pub name: &'static str,
	/// The task of the subsystem being spawned.
	pub future: BoxFuture<'static, SubsystemResult<()>>,
}

/// A trait that describes the [`Subsystem`]s that can run on the overseer.
pub trait Subsystem<Ctx: SubsystemContext> {
	/// Start this `Subsystem` and return `SpawnedSubsystem`.
	fn start(self, ctx: Ctx) -> SpawnedSubsystem;
}
