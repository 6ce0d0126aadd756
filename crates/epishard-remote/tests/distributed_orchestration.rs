//! End-to-end distributed runs against in-process servers on loopback.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing_test::traced_test;
use epishard_core::{
    EnsembleShardIntegrator, EpiError, ModelKind, ModelParameters, Rk4Solver, RunControl,
    StrategyKind, Sweep, Trajectory, WorkerPool,
};
use epishard_remote::{
    endpoint_name, BoundServer, DistributedOrchestrator, EndpointConnector, EndpointRegistry,
    IntegrationEndpoint, IntegrationServer, RemoteClient, RemoteConfig, RemoteError,
    ServiceReply, TcpConnector, DEFAULT_ENDPOINT_PREFIX,
};

fn params() -> ModelParameters {
    ModelParameters::new(10_000.0, 0.3, 0.1, 10.0, 0.0, 100.0, 1_001)
}

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

/// Start `hosts` servers and register them under the default names.
async fn start_hosts(
    hosts: usize,
    model: ModelKind,
) -> (EndpointRegistry, Vec<String>, Vec<BoundServer>) {
    let registry = EndpointRegistry::new();
    let mut names = Vec::new();
    let mut servers = Vec::new();
    for index in 0..hosts {
        let server = IntegrationServer::new(model, &RemoteConfig::default())
            .bind(loopback())
            .await
            .unwrap();
        let name = endpoint_name(DEFAULT_ENDPOINT_PREFIX, index);
        registry.bind(name.clone(), server.local_addr());
        names.push(name);
        servers.push(server);
    }
    (registry, names, servers)
}

#[tokio::test]
async fn test_distributed_summary_equals_local_ensemble() {
    let (registry, names, _servers) = start_hosts(3, ModelKind::Sir).await;
    let connector = Arc::new(TcpConnector::new(registry, RemoteConfig::default()));
    let orchestrator = DistributedOrchestrator::new(connector, names, ModelKind::Sir);

    let sweep = Sweep::reference();
    let remote = orchestrator
        .run(&params(), &sweep, 10, &RunControl::new())
        .await
        .unwrap();

    let pool = WorkerPool::new(2).unwrap();
    let local = EnsembleShardIntegrator::integrate(
        &pool,
        &ModelKind::Sir,
        &params(),
        &sweep,
        10,
        &RunControl::new(),
    )
    .await
    .unwrap();

    assert_eq!(remote.strategy, StrategyKind::Distributed);
    assert_eq!(remote.workers, 3);
    assert_eq!(remote.value.peaks, local.value.peaks);
    assert_eq!(remote.value.total.to_bits(), local.value.total.to_bits());
}

#[tokio::test]
async fn test_more_hosts_than_scenarios_skips_idle_hosts() {
    let (registry, mut names, _servers) = start_hosts(2, ModelKind::Sis).await;
    // Never registered: would fail if contacted.
    names.push("idle_host".to_string());
    names.push("other_idle_host".to_string());
    let connector = Arc::new(TcpConnector::new(registry, RemoteConfig::default()));
    let orchestrator = DistributedOrchestrator::new(connector, names, ModelKind::Sis);

    let report = orchestrator
        .run(&params(), &Sweep::transmission(0.2, 0.4), 2, &RunControl::new())
        .await
        .unwrap();
    assert_eq!(report.value.scenario_count(), 2);
}

#[tokio::test]
async fn test_missing_endpoint_is_reported_by_name() {
    let (registry, mut names, _servers) = start_hosts(1, ModelKind::Sir).await;
    names.push("ghost".to_string());
    let connector = Arc::new(TcpConnector::new(registry, RemoteConfig::default()));
    let orchestrator = DistributedOrchestrator::new(connector, names, ModelKind::Sir);

    let control = RunControl::new();
    let err = orchestrator
        .run(&params(), &Sweep::reference(), 4, &control)
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::EndpointNotFound(ref name) if name == "ghost"));
    assert!(!control.cancel.is_cancelled());

    // The same control still drives a healthy run.
    let (registry, names, _servers) = start_hosts(2, ModelKind::Sir).await;
    let healthy = DistributedOrchestrator::new(
        Arc::new(TcpConnector::new(registry, RemoteConfig::default())),
        names,
        ModelKind::Sir,
    );
    let report = healthy
        .run(&params(), &Sweep::reference(), 4, &control)
        .await
        .unwrap();
    assert_eq!(report.value.scenario_count(), 4);
}

#[tokio::test]
async fn test_dead_endpoint_is_unreachable() {
    let listener = tokio::net::TcpListener::bind(loopback()).await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let registry = EndpointRegistry::new();
    registry.bind("dead", dead);
    let connector = Arc::new(TcpConnector::new(registry, RemoteConfig::default()));
    let orchestrator =
        DistributedOrchestrator::new(connector, vec!["dead".to_string()], ModelKind::Sir);

    let err = orchestrator
        .run(&params(), &Sweep::reference(), 2, &RunControl::new())
        .await
        .unwrap_err();
    match err {
        RemoteError::Unreachable { endpoint, addr, .. } => {
            assert_eq!(endpoint, "dead");
            assert_eq!(addr, dead);
        }
        other => panic!("expected Unreachable, got {other}"),
    }
}

#[tokio::test]
async fn test_remote_trajectory_equals_local_trajectory() {
    let (registry, names, _servers) = start_hosts(1, ModelKind::Sir).await;
    let addr = registry.lookup(&names[0]).unwrap();
    let mut client = RemoteClient::connect(&names[0], addr, &RemoteConfig::default())
        .await
        .unwrap();

    let remote = client.integrate(&params()).await.unwrap();
    let local = Rk4Solver::solve(&ModelKind::Sir, &params()).unwrap();
    assert_eq!(remote.value, local);
    assert!(remote.server_elapsed_ms >= 0.0);

    // Same connection serves further calls.
    let peak = client.peak_infected(&params()).await.unwrap();
    assert_eq!(peak.value, local.peak(1));
}

#[tokio::test]
async fn test_invalid_parameters_never_leave_the_orchestrator() {
    let orchestrator = DistributedOrchestrator::new(
        Arc::new(TcpConnector::new(EndpointRegistry::new(), RemoteConfig::default())),
        vec!["nowhere".to_string()],
        ModelKind::Sir,
    );
    let err = orchestrator
        .run(
            &params().with_step_count(1),
            &Sweep::reference(),
            3,
            &RunControl::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RemoteError::Domain(EpiError::InvalidParameters(_))
    ));

    let no_hosts = DistributedOrchestrator::new(
        Arc::new(TcpConnector::new(EndpointRegistry::new(), RemoteConfig::default())),
        Vec::new(),
        ModelKind::Sir,
    );
    assert!(matches!(
        no_hosts
            .run(&params(), &Sweep::reference(), 3, &RunControl::new())
            .await,
        Err(RemoteError::Domain(EpiError::InvalidConfig(_)))
    ));
}

#[tokio::test]
async fn test_service_errors_come_back_as_service_kind() {
    let (registry, names, _servers) = start_hosts(1, ModelKind::Sir).await;
    let addr = registry.lookup(&names[0]).unwrap();
    let mut client = RemoteClient::connect(&names[0], addr, &RemoteConfig::default())
        .await
        .unwrap();

    let err = client
        .integrate(&params().with_horizon(-1.0))
        .await
        .unwrap_err();
    match err {
        RemoteError::Service(message) => assert!(message.contains("horizon")),
        other => panic!("expected Service error, got {other}"),
    }
}

#[tokio::test]
async fn test_oversized_response_frame_is_rejected() {
    let (registry, names, _servers) = start_hosts(1, ModelKind::Sir).await;
    let addr = registry.lookup(&names[0]).unwrap();
    let tight = RemoteConfig {
        max_frame_bytes: 1024,
        ..RemoteConfig::default()
    };
    let mut client = RemoteClient::connect(&names[0], addr, &tight).await.unwrap();

    let err = client.integrate(&params()).await.unwrap_err();
    assert!(matches!(err, RemoteError::Protocol(_)));
}

/// Connector whose endpoints answer every call with an error after a delay.
struct FlakyConnector;

struct FlakyEndpoint;

#[async_trait]
impl IntegrationEndpoint for FlakyEndpoint {
    async fn integrate(
        &mut self,
        _params: &ModelParameters,
    ) -> epishard_remote::Result<ServiceReply<Trajectory>> {
        Err(RemoteError::Service("not supported".to_string()))
    }

    async fn peak_infected(
        &mut self,
        _params: &ModelParameters,
    ) -> epishard_remote::Result<ServiceReply<f64>> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Err(RemoteError::Service("solver crashed".to_string()))
    }
}

#[async_trait]
impl EndpointConnector for FlakyConnector {
    async fn connect(
        &self,
        _endpoint: &str,
    ) -> epishard_remote::Result<Box<dyn IntegrationEndpoint>> {
        Ok(Box::new(FlakyEndpoint))
    }
}

#[tokio::test]
async fn test_server_reports_responses_over_its_frame_limit() {
    let tight = RemoteConfig {
        max_frame_bytes: 4096,
        ..RemoteConfig::default()
    };
    let server = IntegrationServer::new(ModelKind::Sir, &tight)
        .bind(loopback())
        .await
        .unwrap();
    let mut client = RemoteClient::connect("tight", server.local_addr(), &RemoteConfig::default())
        .await
        .unwrap();

    // Refused up front: cannot fit whatever the values are.
    let err = client
        .integrate(&params().with_step_count(2_001))
        .await
        .unwrap_err();
    match err {
        RemoteError::Service(message) => assert!(message.contains("frame limit")),
        other => panic!("expected Service error, got {other}"),
    }

    // Passes the estimate but the encoded trajectory is still too large.
    let err = client
        .integrate(&params().with_step_count(200))
        .await
        .unwrap_err();
    match err {
        RemoteError::Service(message) => assert!(message.contains("exceeds limit of 4096")),
        other => panic!("expected Service error, got {other}"),
    }

    // Connection is still usable.
    let peak = client.peak_infected(&params()).await.unwrap();
    assert!(peak.value > 10.0);
}

#[tokio::test]
async fn test_non_finite_results_come_back_as_service_errors() {
    let (registry, names, _servers) = start_hosts(1, ModelKind::Sir).await;
    let addr = registry.lookup(&names[0]).unwrap();
    let mut client = RemoteClient::connect(&names[0], addr, &RemoteConfig::default())
        .await
        .unwrap();

    let overflowing = ModelParameters::new(f64::MAX, 0.0, 1.0, f64::MAX * 0.9, 0.0, 1.0, 2);
    let err = client.integrate(&overflowing).await.unwrap_err();
    assert!(matches!(err, RemoteError::Service(ref m) if m.contains("non-finite")));
}

#[tokio::test]
async fn test_host_failure_aborts_the_batch() {
    let orchestrator = DistributedOrchestrator::new(
        Arc::new(FlakyConnector),
        (0..4).map(|i| format!("flaky{i}")).collect(),
        ModelKind::Sir,
    );
    let err = orchestrator
        .run(&params(), &Sweep::reference(), 8, &RunControl::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Service(ref m) if m == "solver crashed"));
}

#[tokio::test]
#[traced_test]
async fn test_distributed_run_logs_dispatch_and_failure() {
    let orchestrator = DistributedOrchestrator::new(
        Arc::new(FlakyConnector),
        vec!["flaky0".to_string(), "flaky1".to_string()],
        ModelKind::Sir,
    );
    let result = orchestrator
        .run(&params(), &Sweep::reference(), 4, &RunControl::new())
        .await;
    assert!(result.is_err());

    assert!(logs_contain("host.dispatched"));
    assert!(logs_contain("flaky1"));
    assert!(logs_contain("unit.failed"));
    assert!(logs_contain("solver crashed"));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_applies_to_distributed_runs() {
    struct SlowConnector;
    struct SlowEndpoint;

    #[async_trait]
    impl IntegrationEndpoint for SlowEndpoint {
        async fn integrate(
            &mut self,
            _params: &ModelParameters,
        ) -> epishard_remote::Result<ServiceReply<Trajectory>> {
            std::future::pending().await
        }

        async fn peak_infected(
            &mut self,
            _params: &ModelParameters,
        ) -> epishard_remote::Result<ServiceReply<f64>> {
            std::future::pending().await
        }
    }

    #[async_trait]
    impl EndpointConnector for SlowConnector {
        async fn connect(
            &self,
            _endpoint: &str,
        ) -> epishard_remote::Result<Box<dyn IntegrationEndpoint>> {
            Ok(Box::new(SlowEndpoint))
        }
    }

    let orchestrator = DistributedOrchestrator::new(
        Arc::new(SlowConnector),
        vec!["slow".to_string()],
        ModelKind::Sir,
    );
    let control = RunControl::new().with_deadline(Duration::from_millis(20));
    let err = orchestrator
        .run(&params(), &Sweep::reference(), 2, &control)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RemoteError::Domain(EpiError::DeadlineExceeded { limit_ms: 20 })
    ));
}
