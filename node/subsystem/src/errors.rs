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

//! Error types for the subsystem requests.

/// A description of an error causing the runtime API request to be unservable.
#[derive(thiserror::Error, Debug, Clone)]
#[error("Runtime API request failed: {0}")]
pub struct RuntimeApiError(String);

impl From<String> for RuntimeApiError {
	fn from(s: String) -> Self {
		RuntimeApiError(s)
	}
}

impl From<&str> for RuntimeApiError {
	fn from(s: &str) -> Self {
		s.to_owned().into()
	}
}

/// A description of an error causing the chain API request to be unservable.
#[derive(thiserror::Error, Debug, Clone)]
#[error("Chain API request failed: {msg}")]
pub struct ChainApiError {
	msg: String,
}

impl From<&str> for ChainApiError {
	fn from(s: &str) -> Self {
		s.to_owned().into()
	}
}

impl From<String> for ChainApiError {
	fn from(msg: String) -> Self {
		Self { msg }
	}
}

/// Error during recovery of available data.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryError {
	/// A chunk is recovered but is invalid.
	#[error("Recovered data is invalid")]
	Invalid,

	/// A requested chunk is unavailable.
	#[error("Data is unavailable")]
	Unavailable,

	/// Recovery was not completed because the recovery subsystem went away.
	#[error("Recovery channel closed")]
	ChannelClosed,
}

/// Candidate validation could not be performed at all, e.g. because the relay parent state is
/// gone or the validation host failed.
#[derive(thiserror::Error, Debug, Clone)]
#[error("Validation failed with {0}")]
pub struct ValidationFailed(pub String);
