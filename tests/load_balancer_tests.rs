// tests/load_balancer_tests.rs
use async_trait::async_trait;
use dashmap::DashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tcp_load_balancer::config::{Config, StrategyKind};
use tcp_load_balancer::health::HealthProbe;
use tcp_load_balancer::proxy::{BackendAddress, RelayOutcome};
use tcp_load_balancer::server::{ConnectionHandler, LoadBalancer, LoadBalancerBuilder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Reachability answers come from a set the test controls.
#[derive(Default)]
struct ScriptedProbe {
    reachable: DashSet<BackendAddress>,
    calls: AtomicUsize,
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, addr: &BackendAddress, _timeout: Duration) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reachable.contains(addr)
    }
}

/// Records where each connection was routed instead of relaying it.
#[derive(Default)]
struct RecordingHandler {
    routed: Mutex<Vec<BackendAddress>>,
    failing: DashSet<BackendAddress>,
}

impl RecordingHandler {
    fn routed(&self) -> Vec<BackendAddress> {
        self.routed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionHandler for RecordingHandler {
    async fn handle(
        &self,
        client: TcpStream,
        target: BackendAddress,
        _buffer_size: usize,
    ) -> RelayOutcome {
        self.routed.lock().unwrap().push(target.clone());
        drop(client);
        if self.failing.contains(&target) {
            RelayOutcome::Aborted("backend hung up".to_string())
        } else {
            RelayOutcome::Closed
        }
    }
}

fn backend(port: u16) -> BackendAddress {
    BackendAddress::new("127.0.0.1", port)
}

fn config(backends: Vec<BackendAddress>) -> Config {
    let mut config = Config::new(0, backends);
    config.strategy = StrategyKind::RoundRobin;
    // Keep the periodic monitor out of the way of the assertions.
    config.health_check.interval_ms = 60_000;
    config.health_check.timeout_ms = 50;
    config
}

struct Harness {
    lb: Arc<LoadBalancer>,
    addr: SocketAddr,
    task: JoinHandle<Result<(), tcp_load_balancer::LoadBalancerError>>,
}

impl Harness {
    async fn start(
        config: Config,
        handler: Arc<dyn ConnectionHandler>,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        let lb = Arc::new(
            LoadBalancerBuilder::new(config)
                .with_handler(handler)
                .with_probe(probe)
                .build()
                .unwrap(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = lb.clone();
        let task = tokio::spawn(async move { server.serve(listener).await });
        Self { lb, addr, task }
    }

    async fn connect(&self) -> TcpStream {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        stream.write_all(b"PING\n").await.ok();
        stream
    }

    async fn stop(self) {
        self.lb.shutdown();
        tokio::time::timeout(Duration::from_secs(2), self.task)
            .await
            .expect("load balancer did not stop")
            .unwrap()
            .unwrap();
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn round_robin_alternates_between_backends() {
    let (a, b) = (backend(8050), backend(8051));
    let probe = Arc::new(ScriptedProbe::default());
    probe.reachable.insert(a.clone());
    probe.reachable.insert(b.clone());
    let handler = Arc::new(RecordingHandler::default());

    let harness = Harness::start(config(vec![a.clone(), b.clone()]), handler.clone(), probe).await;

    for expected in 1..=3 {
        let _client = harness.connect().await;
        assert!(eventually(|| handler.routed().len() == expected).await);
    }

    assert_eq!(handler.routed(), vec![a.clone(), b, a]);
    harness.stop().await;
}

#[tokio::test]
async fn backend_failing_startup_probe_is_skipped() {
    let (a, b) = (backend(8050), backend(8051));
    let probe = Arc::new(ScriptedProbe::default());
    probe.reachable.insert(a.clone());
    let handler = Arc::new(RecordingHandler::default());

    let harness = Harness::start(config(vec![a.clone(), b.clone()]), handler.clone(), probe).await;

    for expected in 1..=2 {
        let _client = harness.connect().await;
        assert!(eventually(|| handler.routed().len() == expected).await);
    }

    assert_eq!(handler.routed(), vec![a.clone(), a]);
    assert!(!harness.lb.health_state().is_healthy(&b));
    harness.stop().await;
}

#[tokio::test]
async fn aborted_relay_takes_backend_out_of_rotation() {
    let (a, b) = (backend(8050), backend(8051));
    let probe = Arc::new(ScriptedProbe::default());
    probe.reachable.insert(a.clone());
    probe.reachable.insert(b.clone());
    let handler = Arc::new(RecordingHandler::default());
    handler.failing.insert(a.clone());

    let harness = Harness::start(config(vec![a.clone(), b.clone()]), handler.clone(), probe).await;
    let state = harness.lb.health_state();

    let _first = harness.connect().await;
    assert!(eventually(|| !state.is_healthy(&a)).await);

    for expected in 2..=4 {
        let _client = harness.connect().await;
        assert!(eventually(|| handler.routed().len() == expected).await);
    }

    assert_eq!(handler.routed(), vec![a.clone(), b.clone(), b.clone(), b]);
    assert!(!state.is_healthy(&a));
    harness.stop().await;
}

#[tokio::test]
async fn all_backends_down_rejects_and_reprobes() {
    let (a, b) = (backend(8050), backend(8051));
    let probe = Arc::new(ScriptedProbe::default());
    let handler = Arc::new(RecordingHandler::default());

    let harness =
        Harness::start(config(vec![a.clone(), b.clone()]), handler.clone(), probe.clone()).await;
    let state = harness.lb.health_state();
    assert!(eventually(|| state.unhealthy_count() == 2).await);

    let mut client = TcpStream::connect(harness.addr).await.unwrap();
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
        .await
        .expect("rejected connection was not closed");
    assert!(matches!(read, Ok(0) | Err(_)));

    // Startup sweep, the sweep before the rejected accept, and at least one
    // more once the loop comes back around.
    assert!(eventually(|| probe.calls.load(Ordering::SeqCst) >= 6).await);
    assert!(handler.routed().is_empty());
    harness.stop().await;
}

#[tokio::test]
async fn recovery_sweep_restores_service() {
    let a = backend(8050);
    let probe = Arc::new(ScriptedProbe::default());
    let handler = Arc::new(RecordingHandler::default());

    let harness = Harness::start(config(vec![a.clone()]), handler.clone(), probe.clone()).await;
    let state = harness.lb.health_state();
    // Startup sweep plus the first all-down sweep.
    assert!(eventually(|| probe.calls.load(Ordering::SeqCst) >= 2).await);
    assert!(!state.is_healthy(&a));

    probe.reachable.insert(a.clone());
    let mut buf = [0u8; 1];

    // Already waiting in accept from the earlier sweep: refused.
    let mut first = TcpStream::connect(harness.addr).await.unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(2), first.read(&mut buf)).await;
    assert!(eventually(|| state.is_healthy(&a)).await);

    // The sweep that brought the backend back is still followed by a refusal.
    let mut second = TcpStream::connect(harness.addr).await.unwrap();
    let read = tokio::time::timeout(Duration::from_secs(2), second.read(&mut buf))
        .await
        .expect("client after the recovery sweep was not closed");
    assert!(matches!(read, Ok(0) | Err(_)));
    assert!(handler.routed().is_empty());

    let _client = harness.connect().await;
    assert!(eventually(|| handler.routed() == vec![a.clone()]).await);
    harness.stop().await;
}

#[tokio::test]
async fn shutdown_stops_accept_loop() {
    let a = backend(8050);
    let probe = Arc::new(ScriptedProbe::default());
    probe.reachable.insert(a.clone());

    let harness = Harness::start(
        config(vec![a]),
        Arc::new(RecordingHandler::default()),
        probe,
    )
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.stop().await;
}

/// Echo backend that keeps echoing until the peer shuts down.
async fn spawn_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

#[tokio::test]
async fn end_to_end_echo_through_real_relay() {
    let echo = spawn_echo_backend().await;
    let target = BackendAddress::new(echo.ip().to_string(), echo.port());

    let mut config = config(vec![target.clone()]);
    config.buffer_size_bytes = 512;
    let lb = Arc::new(LoadBalancerBuilder::new(config).build().unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = lb.clone();
    let task = tokio::spawn(async move { server.serve(listener).await });

    let mut client = TcpStream::connect(addr).await.unwrap();
    for round in 0..5 {
        let msg = format!("message number {}", round);
        client.write_all(msg.as_bytes()).await.unwrap();
        let mut buf = vec![0u8; msg.len()];
        tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(buf, msg.as_bytes());
    }

    client.shutdown().await.unwrap();
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), client.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert!(rest.is_empty());

    // A clean close is not a health signal.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(lb.health_state().is_healthy(&target));

    lb.shutdown();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
