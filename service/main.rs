/// medimg inference service
///
/// A synchronous tiny_http server, one thread per request, sharing a single
/// loaded model.
///
/// Environment:
///   MEDIMG_CONFIG      JSON experiment config (classes, preprocessing, paths)
///   MEDIMG_CHECKPOINT  checkpoint to serve (default: best checkpoint of the config)
///   MEDIMG_ADDR        listen address (default 127.0.0.1:8000)
///   RUST_LOG           log filter (default info)
///
/// Endpoints:
///   GET  /health   liveness and whether a model is loaded
///   GET  /status   current training status file
///   POST /analyze  multipart image upload → per-class probabilities
///   POST /compare  multipart `reference` + `target` → similarity metrics

mod handlers;
mod routes;
mod state;
mod util;

use std::sync::Arc;

use anyhow::anyhow;
use tiny_http::Server;
use tracing::info;

use state::ServiceState;

fn main() -> anyhow::Result<()> {
    medimg::init_tracing();

    let addr = ServiceState::addr();
    let state = Arc::new(ServiceState::from_env());
    let server = Server::http(&addr).map_err(|e| anyhow!("cannot bind {}: {}", addr, e))?;
    info!("Listening on http://{}", addr);

    for request in server.incoming_requests() {
        let state = Arc::clone(&state);
        std::thread::spawn(move || {
            routes::dispatch(request, state);
        });
    }
    Ok(())
}
