// tests/client/lifecycle_test.rs
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quantbridge::engine::testing::{CallJournal, RecordingLoader, ScriptedEngine};
use quantbridge::protocol::{Control, WorkerOutbound};
use quantbridge::transport::{
    channel_link, ChannelEndpoint, ThreadSpawner, TransportResult, WorkerEndpoint, WorkerLink,
    WorkerSpawner,
};
use quantbridge::worker::Dispatcher;
use quantbridge::{ClientConfig, ClientError, QuantizeClient, QuantizeOptions};
use serde_json::json;

fn slow_client(delay: Duration) -> QuantizeClient {
    let engine = ScriptedEngine::new(CallJournal::default()).with_delay(delay);
    let loader = RecordingLoader::new(engine);
    let spawner = Arc::new(ThreadSpawner::new(Arc::new(loader)));
    QuantizeClient::with_spawner(ClientConfig::default(), spawner)
}

async fn wait_for_pending(client: &QuantizeClient, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while client.pending_operations() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("calls never became pending");
}

/// Worker whose channel never carries a message.
struct SilentSpawner;

#[async_trait]
impl WorkerSpawner for SilentSpawner {
    async fn spawn(&self) -> TransportResult<WorkerLink> {
        let (link, endpoint) = channel_link();
        tokio::spawn(async move {
            let _endpoint = endpoint;
            std::future::pending::<()>().await;
        });
        Ok(link)
    }
}

/// Worker that announces readiness twice before serving normally.
struct ChattySpawner;

#[async_trait]
impl WorkerSpawner for ChattySpawner {
    async fn spawn(&self) -> TransportResult<WorkerLink> {
        let (link, mut endpoint) = channel_link();
        let loader = RecordingLoader::new(ScriptedEngine::default());
        tokio::spawn(async move {
            endpoint
                .post(WorkerOutbound::Control(Control::Ready))
                .await?;
            Dispatcher::with_loader(Arc::new(loader))
                .run(&mut endpoint)
                .await
        });
        Ok(link)
    }
}

/// Worker that dies on its first request.
struct CrashingSpawner;

#[async_trait]
impl WorkerSpawner for CrashingSpawner {
    async fn spawn(&self) -> TransportResult<WorkerLink> {
        let (link, mut endpoint) = channel_link();
        tokio::spawn(async move {
            endpoint
                .post(WorkerOutbound::Control(Control::Ready))
                .await?;
            let _ = endpoint.recv().await;
            endpoint.fail("worker crashed");
            TransportResult::Ok(())
        });
        Ok(link)
    }
}

/// Worker that says Ready and hands its endpoint back to the test.
#[derive(Default)]
struct CapturingSpawner {
    endpoint: Arc<Mutex<Option<ChannelEndpoint>>>,
}

#[async_trait]
impl WorkerSpawner for CapturingSpawner {
    async fn spawn(&self) -> TransportResult<WorkerLink> {
        let (link, mut endpoint) = channel_link();
        endpoint
            .post(WorkerOutbound::Control(Control::Ready))
            .await?;
        *self.endpoint.lock().unwrap() = Some(endpoint);
        Ok(link)
    }
}

#[tokio::test]
async fn test_dispose_rejects_pending_calls() {
    let client = slow_client(Duration::from_millis(300));

    let (outcome, ()) = tokio::join!(
        client.quantize_raw(vec![1, 2, 3, 255], 1, 1, QuantizeOptions::default()),
        async {
            wait_for_pending(&client, 1).await;
            client.dispose();
        }
    );

    assert!(matches!(outcome, Err(ClientError::Disposed)), "got {:?}", outcome);
    assert_eq!(client.pending_operations(), 0);
}

#[tokio::test]
async fn test_dispose_terminates_worker_context() {
    let spawner = Arc::new(CapturingSpawner::default());
    let slot = spawner.endpoint.clone();
    let client = QuantizeClient::with_spawner(ClientConfig::default(), spawner);
    client.ready().await.unwrap();

    let mut endpoint = slot.lock().unwrap().take().expect("worker was spawned");
    assert!(!endpoint.is_terminated());

    client.dispose();

    assert!(endpoint.is_terminated());
    assert_eq!(endpoint.recv().await, None);
}

#[tokio::test]
async fn test_calls_after_dispose_fail_fast() {
    let client = slow_client(Duration::ZERO);
    client.ready().await.unwrap();
    client.dispose();

    let err = client
        .quantize_raw(vec![1, 2, 3, 255], 1, 1, QuantizeOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Disposed));
    assert!(!client.is_ready());
}

#[tokio::test]
async fn test_unreachable_worker_fails_initialization() {
    let config = ClientConfig::default().with_worker_url("/nonexistent/quantbridge-worker");
    let client = QuantizeClient::new(config);

    let err = client.call("quantize_raw", json!({})).await.unwrap_err();
    assert!(err.is_initialization(), "got {:?}", err);

    // Initialization failure is permanent for this client.
    let err = client.call("quantize_raw", json!({})).await.unwrap_err();
    assert!(err.is_initialization());
}

#[tokio::test]
async fn test_silent_worker_times_out_initialization() {
    let config = ClientConfig::default().with_init_timeout(Duration::from_millis(30));
    let client = QuantizeClient::with_spawner(config, Arc::new(SilentSpawner));

    let err = client.call("quantize_raw", json!({})).await.unwrap_err();
    match err {
        ClientError::Initialization(reason) => assert!(reason.contains("30 ms"), "{}", reason),
        other => panic!("expected initialization error, got {:?}", other),
    }
    assert_eq!(client.pending_operations(), 0);
}

#[tokio::test]
async fn test_duplicate_ready_is_ignored() {
    let client = QuantizeClient::with_spawner(ClientConfig::default(), Arc::new(ChattySpawner));

    let result = client
        .quantize_raw(vec![9, 9, 9, 255], 1, 1, QuantizeOptions::default())
        .await
        .unwrap();
    assert_eq!(result.palette_size, 1);
    assert!(client.is_ready());
}

#[tokio::test]
async fn test_worker_exit_rejects_pending_and_later_calls() {
    let client = QuantizeClient::with_spawner(ClientConfig::default(), Arc::new(CrashingSpawner));

    let err = client.call("quantize_raw", json!({})).await.unwrap_err();
    match &err {
        ClientError::WorkerExited(reason) => assert_eq!(reason, "worker crashed"),
        other => panic!("expected worker exit, got {:?}", other),
    }
    assert_eq!(client.pending_operations(), 0);

    let err = client.call("quantize_raw", json!({})).await.unwrap_err();
    assert!(err.is_worker_exited());
}

#[tokio::test]
async fn test_process_worker_end_to_end() {
    let config = ClientConfig::default().with_worker_url(env!("CARGO_BIN_EXE_quantbridge-worker"));
    let client = QuantizeClient::new(config);

    let pixels: Vec<u8> = [40u8, 80, 120, 255].repeat(16);
    let result = client
        .quantize_raw(pixels, 4, 4, QuantizeOptions::default().with_max_colors(2))
        .await
        .unwrap();

    assert_eq!(result.palette_size, 1);
    assert_eq!(result.width, 4);
    assert_eq!(result.pixels.as_ref().map(Vec::len), Some(64));
    assert!(client.is_ready());

    client.dispose();
    let err = client.call("quantize_raw", json!({})).await.unwrap_err();
    assert!(matches!(err, ClientError::Disposed));
}
