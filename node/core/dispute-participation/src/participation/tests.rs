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

use assert_matches::assert_matches;
use futures::StreamExt;
use parity_scale_codec::Encode;
use polkadot_node_subsystem_util::TimeoutExt;
use std::{sync::Arc, time::Duration};

use sp_core::testing::TaskExecutor;

use super::*;
use polkadot_node_primitives::{PersistedValidationData, ValidationCode};
use polkadot_node_subsystem::{
	errors::ChainApiError,
	messages::{
		AllMessages, ChainApiMessage, DisputeParticipationMessage, RuntimeApiMessage,
		RuntimeApiRequest,
	},
	ActivatedLeaf, ActiveLeavesUpdate,
};
use polkadot_node_subsystem_test_helpers::{
	make_subsystem_context,
	mock::{
		dummy_available_data, dummy_candidate_receipt, dummy_candidate_receipt_with_index,
		dummy_hash, dummy_validation_code,
	},
	TestSubsystemContext, TestSubsystemContextHandle,
};

type VirtualOverseer = TestSubsystemContextHandle<DisputeParticipationMessage>;

pub fn make_our_subsystem_context<S>(
	spawner: S,
) -> (
	TestSubsystemContext<DisputeParticipationMessage, S>,
	TestSubsystemContextHandle<DisputeParticipationMessage>,
) {
	make_subsystem_context(spawner)
}

fn make_participation(sender: WorkerMessageSender) -> Participation {
	Participation::new(sender, &Config::default(), Metrics::default())
}

fn block_hash(block_number: BlockNumber) -> Hash {
	Hash::from(sp_crypto_hashing::blake2_256(&block_number.encode()))
}

async fn participate<Context: SubsystemContext>(
	ctx: &mut Context,
	participation: &mut Participation,
) -> Result<()> {
	participate_with_commitments_hash(ctx, participation, dummy_hash()).await
}

async fn participate_with_commitments_hash<Context: SubsystemContext>(
	ctx: &mut Context,
	participation: &mut Participation,
	commitments_hash: Hash,
) -> Result<()> {
	let candidate_receipt = {
		let mut receipt = dummy_candidate_receipt(dummy_hash());
		receipt.commitments_hash = commitments_hash;
		receipt
	};
	let session = 1;

	let req = ParticipationRequest::new(candidate_receipt, session);

	participation
		.queue_participation(ctx, ParticipationPriority::BestEffort, req)
		.await
}

async fn activate_leaf<Context: SubsystemContext>(
	ctx: &mut Context,
	participation: &mut Participation,
	block_number: BlockNumber,
) -> FatalResult<()> {
	participation
		.process_active_leaves_update(
			ctx,
			&ActiveLeavesUpdate::start_work(ActivatedLeaf {
				hash: block_hash(block_number),
				number: block_number,
			}),
		)
		.await
}

/// Full participation happy path as seen via the overseer.
pub async fn participation_full_happy_path(
	ctx_handle: &mut VirtualOverseer,
	expected_commitments_hash: Hash,
) {
	recover_available_data(ctx_handle).await;
	fetch_validation_code(ctx_handle).await;

	assert_matches!(
		ctx_handle.recv().await,
		AllMessages::CandidateValidation(
			CandidateValidationMessage::ValidateFromChainState {
				candidate_receipt,
				exec_timeout_kind: PvfExecTimeoutKind::Approval,
				response_sender,
				..
			}
		) => {
			if expected_commitments_hash != candidate_receipt.commitments_hash {
				response_sender.send(Ok(ValidationResult::Invalid(InvalidCandidate::CommitmentsHashMismatch))).unwrap();
			} else {
				response_sender.send(Ok(ValidationResult::Valid(PersistedValidationData::default()))).unwrap();
			}
		},
		"overseer did not receive candidate validation message",
	);
}

/// Full participation with failing availability recovery.
pub async fn participation_missing_availability(ctx_handle: &mut VirtualOverseer) {
	assert_matches!(
		ctx_handle.recv().await,
		AllMessages::AvailabilityRecovery(
			AvailabilityRecoveryMessage::RecoverAvailableData(_, _, _, tx)
		) => {
			tx.send(Err(RecoveryError::Unavailable)).unwrap();
		},
		"overseer did not receive recover available data message",
	);
}

async fn recover_available_data(virtual_overseer: &mut VirtualOverseer) {
	assert_matches!(
		virtual_overseer.recv().await,
		AllMessages::AvailabilityRecovery(
			AvailabilityRecoveryMessage::RecoverAvailableData(_, _, _, tx)
		) => {
			tx.send(Ok(dummy_available_data())).unwrap();
		},
		"overseer did not receive recover available data message",
	);
}

/// Handles validation code fetch, returns the received relay parent hash.
async fn fetch_validation_code(virtual_overseer: &mut VirtualOverseer) -> Hash {
	answer_validation_code(virtual_overseer, Some(dummy_validation_code())).await
}

async fn answer_validation_code(
	virtual_overseer: &mut VirtualOverseer,
	validation_code: Option<ValidationCode>,
) -> Hash {
	assert_matches!(
		virtual_overseer.recv().await,
		AllMessages::RuntimeApi(RuntimeApiMessage::Request(
			hash,
			RuntimeApiRequest::ValidationCodeByHash(
				_,
				tx,
			)
		)) => {
			tx.send(Ok(validation_code)).unwrap();
			hash
		},
		"overseer did not receive runtime API request for validation code",
	)
}

async fn answer_validation(
	virtual_overseer: &mut VirtualOverseer,
	result: std::result::Result<ValidationResult, ValidationFailed>,
) {
	assert_matches!(
		virtual_overseer.recv().await,
		AllMessages::CandidateValidation(
			CandidateValidationMessage::ValidateFromChainState {
				exec_timeout_kind: PvfExecTimeoutKind::Approval,
				response_sender,
				..
			}
		) => {
			response_sender.send(result).unwrap();
		},
		"overseer did not receive candidate validation message",
	);
}

#[test]
fn same_req_wont_get_queued_if_participation_is_already_running() {
	futures::executor::block_on(async {
		let (mut ctx, mut ctx_handle) = make_our_subsystem_context(TaskExecutor::new());

		let (sender, mut worker_receiver) = mpsc::channel(1);
		let mut participation = make_participation(sender);
		activate_leaf(&mut ctx, &mut participation, 10).await.unwrap();
		participate(&mut ctx, &mut participation).await.unwrap();
		for _ in 0..MAX_PARALLEL_PARTICIPATIONS {
			participate(&mut ctx, &mut participation).await.unwrap();
		}
		assert_eq!(participation.running(), 1);
		assert_eq!(participation.queued(), 0);

		participation_missing_availability(&mut ctx_handle).await;

		let result = participation
			.get_participation_result(&mut ctx, worker_receiver.next().await.unwrap())
			.await
			.unwrap();

		assert_matches!(
			result.outcome,
			ParticipationOutcome::Unavailable => {}
		);

		// we should not have any further results nor recovery requests:
		assert_matches!(ctx_handle.recv().timeout(Duration::from_millis(10)).await, None);
		assert_matches!(worker_receiver.next().timeout(Duration::from_millis(10)).await, None);
	})
}

#[test]
fn same_req_is_only_queued_once() {
	let (mut ctx, mut ctx_handle) = make_our_subsystem_context(TaskExecutor::new());

	let test = async {
		let (sender, _worker_receiver) = mpsc::channel(1);
		let mut participation = make_participation(sender);
		participate(&mut ctx, &mut participation).await.unwrap();
		participate(&mut ctx, &mut participation).await.unwrap();
		assert_eq!(participation.queued(), 1);
		assert_eq!(participation.running(), 0);
	};

	let request_handler = async {
		for _ in 0..2 {
			assert_matches!(
				ctx_handle.recv().await,
				AllMessages::ChainApi(ChainApiMessage::BlockNumber(_, tx)) => {
					tx.send(Ok(Some(1))).unwrap();
				},
				"overseer did not receive `ChainApiMessage::BlockNumber` message",
			);
		}
	};

	futures::executor::block_on(async {
		futures::join!(test, request_handler);
	});
}

#[test]
fn reqs_get_queued_when_out_of_capacity() {
	let (mut ctx, mut ctx_handle) = make_our_subsystem_context(TaskExecutor::new());

	let test = async {
		let (sender, mut worker_receiver) = mpsc::channel(1);
		let mut participation = make_participation(sender);
		activate_leaf(&mut ctx, &mut participation, 10).await.unwrap();
		participate(&mut ctx, &mut participation).await.unwrap();
		for i in 0..MAX_PARALLEL_PARTICIPATIONS {
			participate_with_commitments_hash(
				&mut ctx,
				&mut participation,
				Hash::repeat_byte(i as u8 + 1),
			)
			.await
			.unwrap();
		}

		for _ in 0..MAX_PARALLEL_PARTICIPATIONS + 1 {
			let result = participation
				.get_participation_result(&mut ctx, worker_receiver.next().await.unwrap())
				.await
				.unwrap();
			assert_matches!(
				result.outcome,
				ParticipationOutcome::Unavailable => {}
			);
		}
		// we should not have any further recovery requests:
		assert_matches!(worker_receiver.next().timeout(Duration::from_millis(10)).await, None);
	};

	let request_handler = async {
		let mut recover_available_data_msg_count = 0;
		let mut block_number_msg_count = 0;

		while recover_available_data_msg_count < MAX_PARALLEL_PARTICIPATIONS + 1 ||
			block_number_msg_count < 1
		{
			match ctx_handle.recv().await {
				AllMessages::AvailabilityRecovery(
					AvailabilityRecoveryMessage::RecoverAvailableData(_, _, _, tx),
				) => {
					tx.send(Err(RecoveryError::Unavailable)).unwrap();
					recover_available_data_msg_count += 1;
				},
				AllMessages::ChainApi(ChainApiMessage::BlockNumber(_, tx)) => {
					tx.send(Ok(None)).unwrap();
					block_number_msg_count += 1;
				},
				msg => panic!("Received unexpected message: {:?}", msg),
			}
		}

		// we should not have any further results
		assert_matches!(ctx_handle.recv().timeout(Duration::from_millis(10)).await, None);
	};

	futures::executor::block_on(async {
		futures::join!(test, request_handler);
	});
}

#[test]
fn reqs_get_queued_on_no_recent_block() {
	let (mut ctx, mut ctx_handle) = make_our_subsystem_context(TaskExecutor::new());
	let (mut unblock_test, mut wait_for_verification) = mpsc::channel(0);
	let test = async {
		let (sender, _worker_receiver) = mpsc::channel(1);
		let mut participation = make_participation(sender);
		participate(&mut ctx, &mut participation).await.unwrap();

		// We have initiated participation but we'll block `active_leaf` so that we can check that
		// the participation is queued in race-free way
		let _ = wait_for_verification.next().await.unwrap();

		activate_leaf(&mut ctx, &mut participation, 10).await.unwrap();
	};

	// Responds to messages from the test and verifies its behaviour
	let request_handler = async {
		// If we receive `BlockNumber` request this implicitly proves that the participation is queued
		assert_matches!(
			ctx_handle.recv().await,
			AllMessages::ChainApi(ChainApiMessage::BlockNumber(_, tx)) => {
				tx.send(Ok(None)).unwrap();
			},
			"overseer did not receive `ChainApiMessage::BlockNumber` message",
		);

		assert!(ctx_handle.recv().timeout(Duration::from_millis(10)).await.is_none());

		// No activity so the participation is queued => unblock the test
		unblock_test.send(()).await.unwrap();

		// after activating at least one leaf the recent block
		// state should be available which should lead to trying
		// to participate by first trying to recover the available
		// data
		assert_matches!(
			ctx_handle.recv().await,
			AllMessages::AvailabilityRecovery(AvailabilityRecoveryMessage::RecoverAvailableData(
				..
			)),
			"overseer did not receive recover available data message",
		);
	};

	futures::executor::block_on(async {
		futures::join!(test, request_handler);
	});
}

#[test]
fn first_leaf_starts_queued_reqs_up_to_capacity() {
	let (mut ctx, mut ctx_handle) = make_our_subsystem_context(TaskExecutor::new());
	const REQUESTS: usize = 5;

	let test = async {
		let (sender, mut worker_receiver) = mpsc::channel(1);
		let mut participation = make_participation(sender);
		for i in 0..REQUESTS {
			let receipt = dummy_candidate_receipt_with_index(dummy_hash(), i as u64);
			participation
				.queue_participation(
					&mut ctx,
					ParticipationPriority::BestEffort,
					ParticipationRequest::new(receipt, 1),
				)
				.await
				.unwrap();
		}
		assert_eq!(participation.queued(), REQUESTS);
		assert_eq!(participation.running(), 0);

		activate_leaf(&mut ctx, &mut participation, 100).await.unwrap();
		assert_eq!(participation.recent_block(), Some((100, block_hash(100))));
		assert_eq!(participation.running(), MAX_PARALLEL_PARTICIPATIONS);
		assert_eq!(participation.queued(), REQUESTS - MAX_PARALLEL_PARTICIPATIONS);

		for _ in 0..REQUESTS {
			participation
				.get_participation_result(&mut ctx, worker_receiver.next().await.unwrap())
				.await
				.unwrap();
			assert!(participation.running() <= MAX_PARALLEL_PARTICIPATIONS);
		}
		assert_eq!(participation.running(), 0);
		assert_eq!(participation.queued(), 0);
	};

	let request_handler = async {
		// relay parents at ascending heights 10..15
		for i in 0..REQUESTS {
			assert_matches!(
				ctx_handle.recv().await,
				AllMessages::ChainApi(ChainApiMessage::BlockNumber(_, tx)) => {
					tx.send(Ok(Some(10 + i as BlockNumber))).unwrap();
				},
				"overseer did not receive `ChainApiMessage::BlockNumber` message",
			);
		}

		// hold back answers until all initially launched workers asked for their data
		let mut pending = Vec::new();
		for _ in 0..MAX_PARALLEL_PARTICIPATIONS {
			assert_matches!(
				ctx_handle.recv().await,
				AllMessages::AvailabilityRecovery(
					AvailabilityRecoveryMessage::RecoverAvailableData(receipt, _, _, tx),
				) => {
					pending.push((receipt.commitments_hash, tx));
				}
			);
		}
		let mut launched: Vec<_> = pending.iter().map(|(hash, _)| *hash).collect();
		launched.sort();
		assert_eq!(
			launched,
			(0..MAX_PARALLEL_PARTICIPATIONS as u64).map(Hash::from_low_u64_be).collect::<Vec<_>>(),
		);
		for (_, tx) in pending {
			tx.send(Err(RecoveryError::Unavailable)).unwrap();
		}

		let mut launched_later = Vec::new();
		for _ in MAX_PARALLEL_PARTICIPATIONS..REQUESTS {
			assert_matches!(
				ctx_handle.recv().await,
				AllMessages::AvailabilityRecovery(
					AvailabilityRecoveryMessage::RecoverAvailableData(receipt, _, _, tx),
				) => {
					launched_later.push(receipt.commitments_hash);
					tx.send(Err(RecoveryError::Unavailable)).unwrap();
				}
			);
		}
		launched_later.sort();
		assert_eq!(
			launched_later,
			(MAX_PARALLEL_PARTICIPATIONS as u64..REQUESTS as u64)
				.map(Hash::from_low_u64_be)
				.collect::<Vec<_>>(),
		);
	};

	futures::executor::block_on(async {
		futures::join!(test, request_handler);
	});
}

#[test]
fn lower_leaves_do_not_replace_recent_block() {
	futures::executor::block_on(async {
		let (mut ctx, mut ctx_handle) = make_our_subsystem_context(TaskExecutor::new());

		let (sender, _worker_receiver) = mpsc::channel(1);
		let mut participation = make_participation(sender);
		activate_leaf(&mut ctx, &mut participation, 10).await.unwrap();
		assert_eq!(participation.recent_block(), Some((10, block_hash(10))));

		activate_leaf(&mut ctx, &mut participation, 5).await.unwrap();
		activate_leaf(&mut ctx, &mut participation, 10).await.unwrap();
		assert_eq!(participation.recent_block(), Some((10, block_hash(10))));

		activate_leaf(&mut ctx, &mut participation, 11).await.unwrap();
		assert_eq!(participation.recent_block(), Some((11, block_hash(11))));

		// Deactivations alone are ignored.
		participation
			.process_active_leaves_update(&mut ctx, &ActiveLeavesUpdate::stop_work(block_hash(11)))
			.await
			.unwrap();
		assert_eq!(participation.recent_block(), Some((11, block_hash(11))));

		assert_matches!(ctx_handle.recv().timeout(Duration::from_millis(10)).await, None);
	})
}

#[test]
fn bump_priority_moves_queued_best_effort_reqs() {
	let (mut ctx, mut ctx_handle) = make_our_subsystem_context(TaskExecutor::new());

	let queued = dummy_candidate_receipt_with_index(dummy_hash(), 1);
	let unknown = dummy_candidate_receipt_with_index(dummy_hash(), 2);
	let queued_hash = queued.hash();

	let test = async {
		let (sender, _worker_receiver) = mpsc::channel(1);
		let mut participation = make_participation(sender);
		participation
			.queue_participation(
				&mut ctx,
				ParticipationPriority::BestEffort,
				ParticipationRequest::new(queued.clone(), 1),
			)
			.await
			.unwrap();

		participation
			.bump_to_priority_for_candidates(&mut ctx, &[queued.clone(), unknown.clone()])
			.await
			.unwrap();

		assert_eq!(participation.queued(), 1);
		let (_, priority, req) = participation.queue.pop_entry().unwrap();
		assert_eq!(priority, ParticipationPriority::Priority);
		assert_eq!(req.candidate_hash(), &queued_hash);
	};

	let request_handler = async {
		// queueing, then bumping the queued candidate
		for _ in 0..2 {
			assert_matches!(
				ctx_handle.recv().await,
				AllMessages::ChainApi(ChainApiMessage::BlockNumber(_, tx)) => {
					tx.send(Ok(Some(1))).unwrap();
				}
			);
		}
		// a failing lookup for a single candidate is skipped
		assert_matches!(
			ctx_handle.recv().await,
			AllMessages::ChainApi(ChainApiMessage::BlockNumber(_, tx)) => {
				tx.send(Err(ChainApiError::from("unknown block"))).unwrap();
			}
		);
	};

	futures::executor::block_on(async {
		futures::join!(test, request_handler);
	});
}

#[test]
fn bump_priority_fails_when_chain_api_is_gone() {
	let (mut ctx, mut ctx_handle) = make_our_subsystem_context(TaskExecutor::new());

	let test = async {
		let (sender, _worker_receiver) = mpsc::channel(1);
		let mut participation = make_participation(sender);
		let receipt = dummy_candidate_receipt(dummy_hash());
		assert_matches!(
			participation.bump_to_priority_for_candidates(&mut ctx, &[receipt]).await,
			Err(FatalError::ChainApiSenderDropped)
		);
	};

	let request_handler = async {
		assert_matches!(
			ctx_handle.recv().await,
			AllMessages::ChainApi(ChainApiMessage::BlockNumber(_, tx)) => {
				drop(tx);
			}
		);
	};

	futures::executor::block_on(async {
		futures::join!(test, request_handler);
	});
}

#[test]
fn cannot_participate_if_cannot_recover_available_data() {
	futures::executor::block_on(async {
		let (mut ctx, mut ctx_handle) = make_our_subsystem_context(TaskExecutor::new());

		let (sender, mut worker_receiver) = mpsc::channel(1);
		let mut participation = make_participation(sender);
		activate_leaf(&mut ctx, &mut participation, 10).await.unwrap();
		participate(&mut ctx, &mut participation).await.unwrap();

		participation_missing_availability(&mut ctx_handle).await;

		let result = participation
			.get_participation_result(&mut ctx, worker_receiver.next().await.unwrap())
			.await
			.unwrap();
		assert_matches!(
			result.outcome,
			ParticipationOutcome::Unavailable => {}
		);
	})
}

#[test]
fn recovery_failing_otherwise_reports_error() {
	futures::executor::block_on(async {
		let (mut ctx, mut ctx_handle) = make_our_subsystem_context(TaskExecutor::new());

		let (sender, mut worker_receiver) = mpsc::channel(1);
		let mut participation = make_participation(sender);
		activate_leaf(&mut ctx, &mut participation, 10).await.unwrap();
		participate(&mut ctx, &mut participation).await.unwrap();

		assert_matches!(
			ctx_handle.recv().await,
			AllMessages::AvailabilityRecovery(
				AvailabilityRecoveryMessage::RecoverAvailableData(_, _, _, tx)
			) => {
				tx.send(Err(RecoveryError::ChannelClosed)).unwrap();
			},
			"overseer did not receive recover available data message",
		);

		let result = participation
			.get_participation_result(&mut ctx, worker_receiver.next().await.unwrap())
			.await
			.unwrap();
		assert_matches!(
			result.outcome,
			ParticipationOutcome::Error => {}
		);
		assert_eq!(participation.running(), 0);
	})
}

#[test]
fn cannot_participate_if_cannot_recover_validation_code() {
	futures::executor::block_on(async {
		let (mut ctx, mut ctx_handle) = make_our_subsystem_context(TaskExecutor::new());

		let (sender, mut worker_receiver) = mpsc::channel(1);
		let mut participation = make_participation(sender);
		activate_leaf(&mut ctx, &mut participation, 10).await.unwrap();
		participate(&mut ctx, &mut participation).await.unwrap();

		recover_available_data(&mut ctx_handle).await;
		answer_validation_code(&mut ctx_handle, None).await;

		let result = participation
			.get_participation_result(&mut ctx, worker_receiver.next().await.unwrap())
			.await
			.unwrap();
		assert_matches!(
			result.outcome,
			ParticipationOutcome::Error => {}
		);
	})
}

#[test]
fn empty_validation_code_reports_error() {
	futures::executor::block_on(async {
		let (mut ctx, mut ctx_handle) = make_our_subsystem_context(TaskExecutor::new());

		let (sender, mut worker_receiver) = mpsc::channel(1);
		let mut participation = make_participation(sender);
		activate_leaf(&mut ctx, &mut participation, 10).await.unwrap();
		participate(&mut ctx, &mut participation).await.unwrap();

		recover_available_data(&mut ctx_handle).await;
		answer_validation_code(&mut ctx_handle, Some(ValidationCode(Vec::new()))).await;

		let result = participation
			.get_participation_result(&mut ctx, worker_receiver.next().await.unwrap())
			.await
			.unwrap();
		assert_matches!(
			result.outcome,
			ParticipationOutcome::Error => {}
		);
		// no validation was attempted
		assert_matches!(ctx_handle.recv().timeout(Duration::from_millis(10)).await, None);
	})
}

#[test]
fn cast_invalid_vote_if_available_data_is_invalid() {
	futures::executor::block_on(async {
		let (mut ctx, mut ctx_handle) = make_our_subsystem_context(TaskExecutor::new());

		let (sender, mut worker_receiver) = mpsc::channel(1);
		let mut participation = make_participation(sender);
		activate_leaf(&mut ctx, &mut participation, 10).await.unwrap();
		participate(&mut ctx, &mut participation).await.unwrap();

		assert_matches!(
			ctx_handle.recv().await,
			AllMessages::AvailabilityRecovery(
				AvailabilityRecoveryMessage::RecoverAvailableData(_, _, _, tx)
			) => {
				tx.send(Err(RecoveryError::Invalid)).unwrap();
			},
			"overseer did not receive recover available data message",
		);

		let result = participation
			.get_participation_result(&mut ctx, worker_receiver.next().await.unwrap())
			.await
			.unwrap();
		assert_matches!(
			result.outcome,
			ParticipationOutcome::Invalid => {}
		);
	})
}

#[test]
fn cast_invalid_vote_if_validation_fails_or_is_invalid() {
	futures::executor::block_on(async {
		let (mut ctx, mut ctx_handle) = make_our_subsystem_context(TaskExecutor::new());

		let (sender, mut worker_receiver) = mpsc::channel(1);
		let mut participation = make_participation(sender);
		activate_leaf(&mut ctx, &mut participation, 10).await.unwrap();
		participate(&mut ctx, &mut participation).await.unwrap();

		recover_available_data(&mut ctx_handle).await;
		assert_eq!(
			fetch_validation_code(&mut ctx_handle).await,
			participation.recent_block().unwrap().1
		);

		answer_validation(&mut ctx_handle, Ok(ValidationResult::Invalid(InvalidCandidate::Timeout)))
			.await;

		let result = participation
			.get_participation_result(&mut ctx, worker_receiver.next().await.unwrap())
			.await
			.unwrap();
		assert_matches!(
			result.outcome,
			ParticipationOutcome::Invalid => {}
		);
	})
}

#[test]
fn validation_host_failure_reports_error() {
	futures::executor::block_on(async {
		let (mut ctx, mut ctx_handle) = make_our_subsystem_context(TaskExecutor::new());

		let (sender, mut worker_receiver) = mpsc::channel(1);
		let mut participation = make_participation(sender);
		activate_leaf(&mut ctx, &mut participation, 10).await.unwrap();
		participate(&mut ctx, &mut participation).await.unwrap();

		recover_available_data(&mut ctx_handle).await;
		fetch_validation_code(&mut ctx_handle).await;
		answer_validation(&mut ctx_handle, Err(ValidationFailed("pvf host died".into()))).await;

		let result = participation
			.get_participation_result(&mut ctx, worker_receiver.next().await.unwrap())
			.await
			.unwrap();
		assert_matches!(
			result.outcome,
			ParticipationOutcome::Error => {}
		);
	})
}

#[test]
fn cast_valid_vote_if_validation_passes() {
	futures::executor::block_on(async {
		let (mut ctx, mut ctx_handle) = make_our_subsystem_context(TaskExecutor::new());

		let (sender, mut worker_receiver) = mpsc::channel(1);
		let mut participation = make_participation(sender);
		activate_leaf(&mut ctx, &mut participation, 10).await.unwrap();
		participate(&mut ctx, &mut participation).await.unwrap();

		participation_full_happy_path(&mut ctx_handle, dummy_hash()).await;

		let result = participation
			.get_participation_result(&mut ctx, worker_receiver.next().await.unwrap())
			.await
			.unwrap();
		assert_matches!(
			result,
			ParticipationStatement { outcome: ParticipationOutcome::Valid, session: 1, .. } => {}
		);
		assert_eq!(result.candidate_hash, result.candidate_receipt.hash());
	})
}

#[test]
fn running_participations_reject_duplicates_and_respect_limit() {
	let running = RunningParticipations::new();
	let candidate = |i: u64| CandidateHash(Hash::from_low_u64_be(i));

	assert_eq!(running.try_insert(candidate(1), 2), TryInsert::Inserted);
	assert_eq!(running.try_insert(candidate(1), 2), TryInsert::AlreadyRunning);
	assert_eq!(running.try_insert(candidate(2), 2), TryInsert::Inserted);
	assert_eq!(running.try_insert(candidate(3), 2), TryInsert::AtCapacity);
	assert_eq!(running.len(), 2);

	assert!(running.remove(&candidate(1)));
	assert!(!running.remove(&candidate(1)));
	assert_eq!(running.try_insert(candidate(3), 2), TryInsert::Inserted);
	assert!(running.contains(&candidate(3)));
	assert!(!running.contains(&candidate(1)));
}

#[test]
fn running_participations_never_exceed_limit_under_contention() {
	let running = Arc::new(RunningParticipations::new());

	let threads: Vec<_> = (0..8u64)
		.map(|t| {
			let running = running.clone();
			std::thread::spawn(move || {
				for i in 0..1_000u64 {
					let candidate = CandidateHash(Hash::from_low_u64_be(t * 10_000 + i % 7));
					if running.try_insert(candidate, MAX_PARALLEL_PARTICIPATIONS) ==
						TryInsert::Inserted
					{
						assert!(running.len() <= MAX_PARALLEL_PARTICIPATIONS);
						assert!(running.remove(&candidate));
					}
					assert!(running.len() <= MAX_PARALLEL_PARTICIPATIONS);
				}
			})
		})
		.collect();

	for thread in threads {
		thread.join().unwrap();
	}
	assert!(running.is_empty());
}
