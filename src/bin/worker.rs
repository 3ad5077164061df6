//! Quantbridge worker - serves quantization requests over stdin/stdout
//!
//! Spawned by `QuantizeClient` when a worker path is configured. Speaks
//! newline-delimited JSON; logs go to stderr.

use quantbridge::config::Settings;
use quantbridge::engine::NativeEngineLoader;
use quantbridge::telemetry::init_tracing;
use quantbridge::transport::StdioEndpoint;
use quantbridge::worker::Dispatcher;
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let filter = match Settings::load() {
        Ok(settings) => settings.logging.filter,
        Err(e) => {
            eprintln!("Error loading config, using defaults: {}", e);
            "info".to_string()
        }
    };
    init_tracing(&filter);

    let dispatcher = Dispatcher::with_loader(Arc::new(NativeEngineLoader));
    let mut endpoint = StdioEndpoint::stdio();

    match dispatcher.run(&mut endpoint).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "worker loop failed");
            ExitCode::FAILURE
        }
    }
}
