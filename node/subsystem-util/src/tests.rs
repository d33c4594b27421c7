// Copyright (C) Parity Technologies (UK) Ltd.
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

#![cfg(test)]

use super::*;
use assert_matches::assert_matches;
use executor::block_on;
use futures::{channel::mpsc, executor, future, StreamExt};
use polkadot_node_subsystem::AllMessages;

#[derive(Clone)]
struct ChannelSender(mpsc::UnboundedSender<AllMessages>);

#[async_trait::async_trait]
impl SubsystemSender for ChannelSender {
	async fn send_message<M>(&mut self, msg: M)
	where
		M: Into<AllMessages> + Send + 'static,
	{
		self.0.unbounded_send(msg.into()).expect("test receiver is alive");
	}

	fn send_unbounded_message<M>(&mut self, msg: M)
	where
		M: Into<AllMessages> + Send + 'static,
	{
		self.0.unbounded_send(msg.into()).expect("test receiver is alive");
	}
}

#[test]
fn timeout_fires_on_pending_future() {
	let res = block_on(future::pending::<()>().timeout(Duration::from_millis(20)));
	assert_eq!(res, None);
}

#[test]
fn timeout_passes_ready_output() {
	let res = block_on(future::ready(7_u32).timeout(Duration::from_secs(10)));
	assert_eq!(res, Some(7));
}

#[test]
fn runtime_request_is_routed_and_answered() {
	let (tx, mut rx) = mpsc::unbounded();
	let mut sender = ChannelSender(tx);
	let relay_parent = Hash::repeat_byte(3);

	block_on(async move {
		let request = runtime::get_candidate_events(&mut sender, relay_parent);
		let answer = async {
			assert_matches!(
				rx.next().await,
				Some(AllMessages::RuntimeApi(RuntimeApiMessage::Request(
					hash,
					RuntimeApiRequest::CandidateEvents(tx),
				))) => {
					assert_eq!(hash, relay_parent);
					tx.send(Ok(Vec::new())).unwrap();
				}
			);
		};
		let (events, ()) = future::join(request, answer).await;
		assert_matches!(events, Ok(events) if events.is_empty());
	});
}

#[test]
fn canceled_runtime_request_is_fatal() {
	let (tx, mut rx) = mpsc::unbounded();
	let mut sender = ChannelSender(tx);

	block_on(async move {
		let request = runtime::get_on_chain_votes(&mut sender, Hash::zero());
		let answer = async {
			// Dropping the response sender cancels the request.
			let _ = rx.next().await;
		};
		let (res, ()) = future::join(request, answer).await;
		assert_matches!(res, Err(runtime::Error::RuntimeRequestCanceled(_)));
	});
}

#[test]
fn failed_runtime_request_is_not_fatal() {
	let (tx, mut rx) = mpsc::unbounded();
	let mut sender = ChannelSender(tx);

	block_on(async move {
		let request = runtime::get_validation_code_by_hash(
			&mut sender,
			Hash::zero(),
			ValidationCodeHash::default(),
		);
		let answer = async {
			assert_matches!(
				rx.next().await,
				Some(AllMessages::RuntimeApi(RuntimeApiMessage::Request(
					_,
					RuntimeApiRequest::ValidationCodeByHash(_, tx),
				))) => {
					tx.send(Err(RuntimeApiError::from("pruned"))).unwrap();
				}
			);
		};
		let (res, ()) = future::join(request, answer).await;
		assert_matches!(res, Err(runtime::Error::RuntimeRequest(_)));
	});
}
