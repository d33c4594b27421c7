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

use polkadot_node_metrics::metrics::{self, prometheus};
use polkadot_node_primitives::{ParticipationOutcome, ParticipationPriority};

#[derive(Clone)]
struct MetricsInner {
	/// Number of participations that reported an outcome, by outcome.
	participations: prometheus::CounterVec<prometheus::U64>,
	/// Number of requests put on a queue, by priority.
	queued: prometheus::CounterVec<prometheus::U64>,
	/// Number of requests dropped because their queue was full.
	queue_full: prometheus::Counter<prometheus::U64>,
	/// Time from launching a worker until its outcome got reported.
	participation_durations: prometheus::Histogram,
	/// Number of currently running participations.
	running: prometheus::Gauge<prometheus::U64>,
}

/// Dispute participation metrics.
#[derive(Default, Clone)]
pub struct Metrics(Option<MetricsInner>);

impl Metrics {
	pub(crate) fn on_participation_outcome(&self, outcome: ParticipationOutcome) {
		if let Some(metrics) = &self.0 {
			metrics.participations.with_label_values(&[outcome.as_label()]).inc();
		}
	}

	pub(crate) fn on_queued(&self, priority: ParticipationPriority) {
		if let Some(metrics) = &self.0 {
			let label = if priority.is_priority() { "priority" } else { "best-effort" };
			metrics.queued.with_label_values(&[label]).inc();
		}
	}

	pub(crate) fn on_queue_full(&self) {
		if let Some(metrics) = &self.0 {
			metrics.queue_full.inc();
		}
	}

	pub(crate) fn on_running_changed(&self, running: usize) {
		if let Some(metrics) = &self.0 {
			metrics.running.set(running as u64);
		}
	}

	/// Provide a timer for the participation pipeline.
	///
	/// Observes on drop.
	pub(crate) fn time_participation_pipeline(
		&self,
	) -> Option<prometheus::prometheus::HistogramTimer> {
		self.0.as_ref().map(|metrics| metrics.participation_durations.start_timer())
	}
}

impl metrics::Metrics for Metrics {
	fn try_register(registry: &prometheus::Registry) -> Result<Self, prometheus::PrometheusError> {
		let metrics = MetricsInner {
			participations: prometheus::register(
				prometheus::CounterVec::new(
					prometheus::Opts::new(
						"polkadot_parachain_dispute_participations",
						"Total number of reported dispute participation outcomes.",
					),
					&["outcome"],
				)?,
				registry,
			)?,
			queued: prometheus::register(
				prometheus::CounterVec::new(
					prometheus::Opts::new(
						"polkadot_parachain_dispute_participation_queued",
						"Total number of participation requests put on a queue.",
					),
					&["priority"],
				)?,
				registry,
			)?,
			queue_full: prometheus::register(
				prometheus::Counter::new(
					"polkadot_parachain_dispute_participation_queue_full",
					"Number of participation requests dropped because the queue was full.",
				)?,
				registry,
			)?,
			participation_durations: prometheus::register(
				prometheus::Histogram::with_opts(
					prometheus::HistogramOpts::new(
						"polkadot_parachain_dispute_participation_durations",
						"Time spent recovering and validating a disputed candidate.",
					)
					.buckets(vec![0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0]),
				)?,
				registry,
			)?,
			running: prometheus::register(
				prometheus::Gauge::new(
					"polkadot_parachain_dispute_participation_running",
					"Number of currently running dispute participations.",
				)?,
				registry,
			)?,
		};
		Ok(Metrics(Some(metrics)))
	}
}
