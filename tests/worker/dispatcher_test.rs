// tests/worker/dispatcher_test.rs
use std::sync::Arc;

use quantbridge::engine::testing::{CallJournal, RecordingLoader, ScriptedEngine};
use quantbridge::protocol::{
    encode_line, Action, Control, RawImageParams, RequestEnvelope, ResponseEnvelope,
    WorkerInbound, WorkerOutbound,
};
use quantbridge::transport::StdioEndpoint;
use quantbridge::worker::Dispatcher;
use quantbridge::{QuantizeOptions, QuantizeResult};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

fn raw_request(id: u64, pixels: Vec<u8>, options: QuantizeOptions) -> WorkerInbound {
    let params = RawImageParams {
        pixels,
        width: 1,
        height: 1,
        options,
    };
    WorkerInbound::Request(RequestEnvelope {
        id,
        action: Action::QuantizeRaw.to_string(),
        data: serde_json::to_value(params).unwrap(),
    })
}

/// Drive a dispatcher over an in-memory NDJSON pipe, returning every line it
/// wrote once the input is exhausted.
async fn serve(loader: RecordingLoader, input: &[WorkerInbound]) -> Vec<WorkerOutbound> {
    let (client, worker) = tokio::io::duplex(64 * 1024);
    let (worker_read, worker_write) = tokio::io::split(worker);
    let (client_read, mut client_write) = tokio::io::split(client);

    let server = tokio::spawn(async move {
        let mut endpoint = StdioEndpoint::new(worker_read, worker_write);
        Dispatcher::with_loader(Arc::new(loader))
            .run(&mut endpoint)
            .await
    });

    for message in input {
        client_write
            .write_all(encode_line(message).unwrap().as_bytes())
            .await
            .unwrap();
    }
    client_write.shutdown().await.unwrap();
    drop(client_write);

    server.await.unwrap().unwrap();

    let mut lines = BufReader::new(client_read).lines();
    let mut out = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap() {
        out.push(serde_json::from_str(&line).unwrap());
    }
    out
}

fn response(message: &WorkerOutbound) -> &ResponseEnvelope {
    match message {
        WorkerOutbound::Response(response) => response,
        other => panic!("expected response, got {:?}", other),
    }
}

#[tokio::test]
async fn test_ready_is_first_line() {
    let loader = RecordingLoader::new(ScriptedEngine::default());
    let out = serve(loader.clone(), &[]).await;

    assert_eq!(out, vec![WorkerOutbound::Control(Control::Ready)]);
    assert!(loader.loads().is_empty());
}

#[tokio::test]
async fn test_requests_answered_in_order_with_their_ids() {
    let loader = RecordingLoader::new(ScriptedEngine::default());
    let input = [
        raw_request(10, vec![1, 1, 1, 255], QuantizeOptions::default()),
        raw_request(11, vec![2, 2, 2, 255], QuantizeOptions::default()),
    ];

    let out = serve(loader, &input).await;
    assert_eq!(out.len(), 3);

    for (message, (id, value)) in out[1..].iter().zip([(10, 1u8), (11, 2u8)]) {
        let response = response(message);
        assert_eq!(response.id, id);
        assert!(response.success);
        assert!(response.error.is_none());

        let result: QuantizeResult =
            serde_json::from_value(response.result.clone().unwrap()).unwrap();
        assert_eq!(result.pixels, Some(vec![value, value, value, 255]));
    }
}

#[tokio::test]
async fn test_configure_applies_before_first_request() {
    let loader = RecordingLoader::new(ScriptedEngine::default());
    let input = [
        WorkerInbound::Control(Control::Configure {
            wasm_url: "file:///srv/modules/".to_string(),
        }),
        raw_request(1, vec![1, 2, 3, 255], QuantizeOptions::default()),
        WorkerInbound::Control(Control::Configure {
            wasm_url: "file:///elsewhere/".to_string(),
        }),
        raw_request(2, vec![1, 2, 3, 255], QuantizeOptions::default()),
    ];

    let out = serve(loader.clone(), &input).await;

    // Configure produces no response.
    assert_eq!(out.len(), 3);
    assert_eq!(loader.loads(), vec!["file:///srv/modules/imagequant"]);
}

#[tokio::test]
async fn test_failures_become_responses() {
    let journal = CallJournal::default();
    let loader = RecordingLoader::new(ScriptedEngine::new(journal.clone()));
    let input = [
        WorkerInbound::Request(RequestEnvelope {
            id: 1,
            action: "sharpen".to_string(),
            data: json!({}),
        }),
        WorkerInbound::Request(RequestEnvelope {
            id: 2,
            action: Action::QuantizeRaw.to_string(),
            data: json!({"pixels": 42}),
        }),
        raw_request(3, vec![0, 0, 0, 255], QuantizeOptions::default().with_speed(11)),
        raw_request(4, vec![0, 0, 0, 255], QuantizeOptions::default()),
    ];

    let out = serve(loader, &input).await;
    let responses: Vec<_> = out[1..].iter().map(response).collect();

    assert_eq!(responses[0].error.as_deref(), Some("unknown action: sharpen"));
    assert!(responses[1]
        .error
        .as_deref()
        .unwrap()
        .starts_with("invalid request data for quantize_raw"));
    assert!(responses[2].error.as_deref().unwrap().contains("speed"));
    assert!(responses[..3].iter().all(|r| !r.success && r.result.is_none()));

    // The worker keeps serving after failures.
    assert!(responses[3].success);
    assert!(!journal.entries().contains(&"set_speed(11)".to_string()));
}

#[tokio::test]
async fn test_malformed_lines_are_skipped() {
    let (client, worker) = tokio::io::duplex(4096);
    let (worker_read, worker_write) = tokio::io::split(worker);
    let (client_read, mut client_write) = tokio::io::split(client);
    let loader = RecordingLoader::new(ScriptedEngine::default());

    let server = tokio::spawn(async move {
        let mut endpoint = StdioEndpoint::new(worker_read, worker_write);
        Dispatcher::with_loader(Arc::new(loader))
            .run(&mut endpoint)
            .await
    });

    client_write.write_all(b"garbage\n\n").await.unwrap();
    let request = raw_request(5, vec![4, 4, 4, 255], QuantizeOptions::default());
    client_write
        .write_all(encode_line(&request).unwrap().as_bytes())
        .await
        .unwrap();
    client_write.shutdown().await.unwrap();
    drop(client_write);
    server.await.unwrap().unwrap();

    let mut lines = BufReader::new(client_read).lines();
    let mut ids = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap() {
        if let WorkerOutbound::Response(r) = serde_json::from_str(&line).unwrap() {
            ids.push(r.id);
        }
    }
    assert_eq!(ids, vec![5]);
}
