//! Fail-fast, cancellation and deadline behaviour shared by all strategies.

use std::time::Duration;

use epishard_core::{
    CancelToken, DerivativeModel, EnsembleShardIntegrator, EpiError, ModelKind, ModelParameters,
    PopulationShardIntegrator, RhsShardIntegrator, RunControl, State, Sweep, WorkerPool,
};

/// SIR that panics whenever β exceeds `limit`.
#[derive(Clone)]
struct BrittleSir {
    limit: f64,
}

impl DerivativeModel for BrittleSir {
    fn name(&self) -> &'static str {
        "brittle_sir"
    }

    fn compartments(&self) -> usize {
        3
    }

    fn tracks_recovered(&self) -> bool {
        true
    }

    fn derive_component(&self, index: usize, state: &[f64], params: &ModelParameters) -> f64 {
        if params.transmission_rate > self.limit {
            panic!("transmission rate {} out of range", params.transmission_rate);
        }
        ModelKind::Sir.derive_component(index, state, params)
    }

    fn initial_state(&self, params: &ModelParameters) -> State {
        ModelKind::Sir.initial_state(params)
    }
}

fn params() -> ModelParameters {
    ModelParameters::new(10_000.0, 0.3, 0.1, 10.0, 0.0, 200.0, 4_001)
}

#[tokio::test]
async fn test_one_failing_scenario_fails_the_ensemble() {
    let pool = WorkerPool::new(2).unwrap();
    let control = RunControl::new();
    let model = BrittleSir { limit: 0.45 };

    let err = EnsembleShardIntegrator::integrate(
        &pool,
        &model,
        &params(),
        &Sweep::reference(),
        9,
        &control,
    )
    .await
    .unwrap_err();

    match err {
        EpiError::WorkerFailed { unit, detail } => {
            assert!(unit.starts_with("scenario-"));
            assert!(detail.contains("out of range"));
        }
        other => panic!("expected WorkerFailed, got {other}"),
    }
    assert!(!control.cancel.is_cancelled());
}

#[tokio::test]
async fn test_failing_shard_fails_population_run() {
    let pool = WorkerPool::new(2).unwrap();
    let model = BrittleSir { limit: 0.1 };

    let err =
        PopulationShardIntegrator::integrate(&pool, &model, &params(), 4, &RunControl::new())
            .await
            .unwrap_err();
    assert!(matches!(err, EpiError::WorkerFailed { .. }));
}

#[tokio::test]
async fn test_failing_component_fails_rhs_run() {
    let pool = WorkerPool::new(3).unwrap();
    let model = BrittleSir { limit: 0.1 };

    let err = RhsShardIntegrator::integrate(&pool, &model, &params(), 3, &RunControl::new())
        .await
        .unwrap_err();
    match err {
        EpiError::WorkerFailed { unit, .. } => assert!(unit.starts_with("step-0/")),
        other => panic!("expected WorkerFailed, got {other}"),
    }
}

#[tokio::test]
async fn test_pre_cancelled_token_short_circuits() {
    let pool = WorkerPool::new(2).unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();
    let control = RunControl::new().with_cancel(cancel);

    let err = EnsembleShardIntegrator::integrate(
        &pool,
        &ModelKind::Sir,
        &params(),
        &Sweep::reference(),
        4,
        &control,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EpiError::Cancelled));

    let err = PopulationShardIntegrator::integrate(&pool, &ModelKind::Sis, &params(), 2, &control)
        .await
        .unwrap_err();
    assert!(matches!(err, EpiError::Cancelled));
}

#[tokio::test]
async fn test_cancel_mid_run_stops_the_ensemble() {
    let pool = WorkerPool::new(1).unwrap();
    let control = RunControl::new();
    let heavy = ModelParameters::reference().with_step_count(400_000);

    let trigger = control.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = EnsembleShardIntegrator::integrate(
        &pool,
        &ModelKind::Sir,
        &heavy,
        &Sweep::reference(),
        32,
        &control,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EpiError::Cancelled));
}

#[tokio::test]
async fn test_tiny_deadline_is_reported() {
    let pool = WorkerPool::new(1).unwrap();
    let control = RunControl::new().with_deadline(Duration::from_millis(1));
    let heavy = ModelParameters::reference().with_step_count(400_000);

    let err = EnsembleShardIntegrator::integrate(
        &pool,
        &ModelKind::Sir,
        &heavy,
        &Sweep::reference(),
        16,
        &control,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EpiError::DeadlineExceeded { limit_ms: 1 }));
    assert!(!control.cancel.is_cancelled());
}

#[tokio::test]
async fn test_control_is_reusable_after_deadline_and_worker_failure() {
    let pool = WorkerPool::new(1).unwrap();
    let control = RunControl::new().with_deadline(Duration::from_millis(1));
    let heavy = ModelParameters::reference().with_step_count(400_000);
    let small = ModelParameters::new(1_000.0, 0.3, 0.1, 4.0, 0.0, 10.0, 11);

    let err = EnsembleShardIntegrator::integrate(
        &pool,
        &ModelKind::Sir,
        &heavy,
        &Sweep::reference(),
        16,
        &control,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EpiError::DeadlineExceeded { .. }));

    let relaxed = control.clone().with_deadline(Duration::from_secs(60));
    let err = PopulationShardIntegrator::integrate(
        &pool,
        &BrittleSir { limit: 0.1 },
        &small,
        2,
        &relaxed,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EpiError::WorkerFailed { .. }));

    // Same token after both failures.
    let report =
        PopulationShardIntegrator::integrate(&pool, &ModelKind::Sir, &small, 2, &relaxed)
            .await
            .unwrap();
    assert_eq!(report.value.len(), 11);
    assert!(!relaxed.cancel.is_cancelled());
}

#[tokio::test]
async fn test_config_errors_are_distinct_from_parameter_errors() {
    let pool = WorkerPool::new(1).unwrap();
    let control = RunControl::new();

    assert!(matches!(
        PopulationShardIntegrator::integrate(&pool, &ModelKind::Sir, &params(), 0, &control).await,
        Err(EpiError::InvalidConfig(_))
    ));
    assert!(matches!(
        EnsembleShardIntegrator::integrate(
            &pool,
            &ModelKind::Sir,
            &params(),
            &Sweep::transmission(0.6, 0.2),
            4,
            &control
        )
        .await,
        Err(EpiError::InvalidConfig(_))
    ));
}
