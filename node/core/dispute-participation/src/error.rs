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

//! Error handling related code and Error/Result definitions.

use fatality::Nested;

use polkadot_node_subsystem::{errors::ChainApiError, SubsystemError};
use polkadot_node_subsystem_util::runtime;

use crate::{participation::QueueError, LOG_TARGET};

/// General `Result` type.
pub type Result<T> = std::result::Result<T, Error>;
/// Result for non-fatal only failures.
pub type JfyiResult<T> = std::result::Result<T, JfyiError>;
/// Result for fatal only failures.
pub type FatalResult<T> = std::result::Result<T, FatalError>;

#[allow(missing_docs)]
#[fatality::fatality(splitable)]
pub enum Error {
	/// Receiving subsystem message from overseer failed.
	#[fatal]
	#[error("Receiving message from overseer failed: {0}")]
	SubsystemReceive(#[source] SubsystemError),

	/// `ctx.spawn` failed with an error.
	#[fatal]
	#[error("Spawning a task failed: {0}")]
	SpawnFailed(#[source] SubsystemError),

	#[fatal]
	#[error("Participation worker receiver exhausted.")]
	ParticipationWorkerReceiverExhausted,

	/// The chain API went away, we are shutting down.
	#[fatal]
	#[error("Chain API dropped response channel sender")]
	ChainApiSenderDropped,

	/// We need ancestry and finality information to scrape the chain.
	#[fatal]
	#[error("Chain API request for finality or ancestry failed with error: {0}")]
	ChainApi(#[source] ChainApiError),

	#[fatal(forward)]
	#[error("Error while accessing runtime information {0}")]
	Runtime(#[from] runtime::Error),

	/// Single request could not be ordered, it gets dropped.
	#[error("Retrieving block number of relay parent from chain API failed with error: {0}")]
	BlockNumberLookupFailed(#[source] ChainApiError),

	#[error(transparent)]
	QueueError(#[from] QueueError),

	/// Whoever asked went away before we could answer.
	#[error("Response to candidate inclusion query could not be sent")]
	QueryResponseSendFailed,
}

/// Utility for eating top level errors and log them.
///
/// We basically always want to try and continue on error. This utility function is meant to
/// consume top-level errors by simply logging them
pub fn log_error(result: Result<()>) -> std::result::Result<(), FatalError> {
	match result.into_nested()? {
		Ok(()) => Ok(()),
		Err(jfyi) => {
			jfyi.log();
			Ok(())
		},
	}
}

impl JfyiError {
	/// Log a `JfyiError`.
	pub fn log(self) {
		match self {
			// don't spam the log with spurious errors
			Self::Runtime(_) | Self::QueryResponseSendFailed =>
				tracing::debug!(target: LOG_TARGET, error = ?self),
			// it's worth reporting otherwise
			_ => tracing::warn!(target: LOG_TARGET, error = ?self),
		}
	}
}
