// tests/client/correlation_test.rs
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use quantbridge::engine::testing::{CallJournal, RecordingLoader, ScriptedEngine};
use quantbridge::protocol::{Control, WorkerInbound, WorkerOutbound};
use quantbridge::transport::{
    channel_link, ThreadSpawner, TransportResult, WorkerEndpoint, WorkerLink, WorkerSpawner,
};
use quantbridge::worker::Dispatcher;
use quantbridge::{ClientConfig, ClientError, QuantizeClient, QuantizeOptions};
use serde_json::json;

fn scripted_loader() -> RecordingLoader {
    RecordingLoader::new(ScriptedEngine::new(CallJournal::default()))
}

fn client_over(loader: &RecordingLoader, config: ClientConfig) -> QuantizeClient {
    let spawner = Arc::new(ThreadSpawner::new(Arc::new(loader.clone())));
    QuantizeClient::with_spawner(config, spawner)
}

/// Single-pixel RGBA payload unique to `i`.
fn pixel(i: u8) -> Vec<u8> {
    vec![i, 255 - i, i / 2, 255]
}

/// Worker that buffers two requests and answers them in reverse order.
struct ReversingSpawner {
    loader: RecordingLoader,
}

#[async_trait]
impl WorkerSpawner for ReversingSpawner {
    async fn spawn(&self) -> TransportResult<WorkerLink> {
        let (link, mut endpoint) = channel_link();
        let dispatcher = Dispatcher::with_loader(Arc::new(self.loader.clone()));

        tokio::spawn(async move {
            endpoint
                .post(WorkerOutbound::Control(Control::Ready))
                .await?;

            let mut batch = Vec::new();
            while let Some(message) = endpoint.recv().await {
                if let WorkerInbound::Request(request) = message {
                    batch.push(request);
                }
                if batch.len() == 2 {
                    for request in batch.drain(..).rev() {
                        let response = dispatcher.handle_request(request).await;
                        endpoint.post(WorkerOutbound::Response(response)).await?;
                    }
                }
            }
            TransportResult::Ok(())
        });

        Ok(link)
    }
}

#[tokio::test]
async fn test_concurrent_calls_resolve_to_their_own_results() {
    let loader = scripted_loader();
    let client = client_over(&loader, ClientConfig::default());

    let calls = (0..16u8).map(|i| {
        let client = &client;
        async move {
            let result = client
                .quantize_raw(pixel(i), 1, 1, QuantizeOptions::default())
                .await
                .unwrap();
            (i, result)
        }
    });

    for (i, result) in join_all(calls).await {
        assert_eq!(result.pixels, Some(pixel(i)), "call {} got another's result", i);
        assert_eq!(result.palette_size, 1);
    }
    assert_eq!(client.pending_operations(), 0);
    // One engine load shared by every call.
    assert_eq!(loader.loads().len(), 1);
}

#[tokio::test]
async fn test_out_of_order_responses_are_matched_by_id() {
    let loader = scripted_loader();
    let spawner = Arc::new(ReversingSpawner {
        loader: loader.clone(),
    });
    let client = QuantizeClient::with_spawner(ClientConfig::default(), spawner);

    let (first, second) = tokio::join!(
        client.quantize_raw(pixel(1), 1, 1, QuantizeOptions::default()),
        client.quantize_raw(pixel(2), 1, 1, QuantizeOptions::default()),
    );

    assert_eq!(first.unwrap().pixels, Some(pixel(1)));
    assert_eq!(second.unwrap().pixels, Some(pixel(2)));
    assert_eq!(client.pending_operations(), 0);
}

#[tokio::test]
async fn test_engine_url_override_reaches_loader() {
    let loader = scripted_loader();
    let config = ClientConfig::default().with_engine_url("file:///opt/engines/");
    let client = client_over(&loader, config);

    client
        .quantize_raw(pixel(7), 1, 1, QuantizeOptions::default())
        .await
        .unwrap();

    assert_eq!(loader.loads(), vec!["file:///opt/engines/imagequant"]);
}

#[tokio::test]
async fn test_default_engine_url_without_override() {
    let loader = scripted_loader();
    let client = client_over(&loader, ClientConfig::default());

    client
        .quantize_raw(pixel(7), 1, 1, QuantizeOptions::default())
        .await
        .unwrap();

    assert_eq!(loader.loads(), vec!["builtin:imagequant"]);
}

#[tokio::test]
async fn test_unknown_action_rejects_only_that_call() {
    let loader = scripted_loader();
    let client = client_over(&loader, ClientConfig::default());

    let (bad, good) = tokio::join!(
        client.call("sharpen", json!({})),
        client.quantize_raw(pixel(3), 1, 1, QuantizeOptions::default()),
    );

    match bad {
        Err(ClientError::Operation(message)) => assert_eq!(message, "unknown action: sharpen"),
        other => panic!("expected operation error, got {:?}", other),
    }
    assert_eq!(good.unwrap().pixels, Some(pixel(3)));
}

#[tokio::test]
async fn test_invalid_options_reported_by_worker() {
    let journal = CallJournal::default();
    let loader = RecordingLoader::new(ScriptedEngine::new(journal.clone()));
    let client = client_over(&loader, ClientConfig::default());

    let err = client
        .quantize_raw(pixel(1), 1, 1, QuantizeOptions::default().with_max_colors(1))
        .await
        .unwrap_err();

    let message = err.operation_message().unwrap();
    assert!(message.contains("maxColors"), "unexpected message: {}", message);
    assert!(!journal.entries().iter().any(|e| e.starts_with("set_")));
}

#[tokio::test]
async fn test_engine_load_failure_is_retried_per_request() {
    let loader = scripted_loader().failing("module missing");
    let client = client_over(&loader, ClientConfig::default());

    for _ in 0..2 {
        let err = client
            .quantize_raw(pixel(1), 1, 1, QuantizeOptions::default())
            .await
            .unwrap_err();
        assert!(err.operation_message().unwrap().contains("module missing"));
    }
    assert_eq!(loader.loads().len(), 2);
}
