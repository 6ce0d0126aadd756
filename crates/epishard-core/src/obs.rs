//! Structured lifecycle events for strategy runs.
//!
//! Every strategy call gets a span named `epishard.run` tagged with its
//! `run_id` and strategy, plus `strategy.started` / `strategy.finished`
//! events. Unit failures are logged at `warn!`.

use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::report::StrategyKind;

/// RAII guard that enters the run span for synchronous code paths.
///
/// Async strategies attach [`StrategySpan::span`] with
/// `tracing::Instrument` instead, since an entered span cannot be held
/// across an `.await`.
pub struct StrategySpan {
    _span: tracing::span::EnteredSpan,
}

impl StrategySpan {
    pub fn enter(run_id: Uuid, strategy: StrategyKind) -> Self {
        Self {
            _span: Self::span(run_id, strategy).entered(),
        }
    }

    pub fn span(run_id: Uuid, strategy: StrategyKind) -> tracing::Span {
        tracing::info_span!("epishard.run", run_id = %run_id, strategy = %strategy)
    }
}

pub fn emit_strategy_started(run_id: Uuid, strategy: StrategyKind, model: &str, workers: usize) {
    info!(
        event = "strategy.started",
        run_id = %run_id,
        strategy = %strategy,
        model = %model,
        workers = workers,
    );
}

pub fn emit_strategy_finished(
    run_id: Uuid,
    strategy: StrategyKind,
    elapsed: Duration,
    success: bool,
) {
    info!(
        event = "strategy.finished",
        run_id = %run_id,
        strategy = %strategy,
        elapsed_ms = elapsed.as_secs_f64() * 1_000.0,
        success = success,
    );
}

/// A single unit (shard, step component, scenario or host) failed.
pub fn emit_unit_failed(run_id: &str, unit: &str, error: &dyn std::fmt::Display) {
    warn!(event = "unit.failed", run_id = %run_id, unit = %unit, error = %error);
}

/// A host task was handed its scenario range.
pub fn emit_host_dispatched(run_id: Uuid, endpoint: &str, first: usize, count: usize) {
    info!(
        event = "host.dispatched",
        run_id = %run_id,
        endpoint = %endpoint,
        first_scenario = first,
        scenarios = count,
    );
}
