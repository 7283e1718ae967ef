//! `leancanvas-server`: the chat backend over HTTP.
//!
//! Configuration comes from the environment; see [`leancanvas::LeanCanvasConfig`].

use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    leancanvas::init_logger();

    let runtime = leancanvas::runtime::get().await;
    let config = runtime.config.clone();
    if config.api_key.is_none() {
        log::warn!("no API key configured; chat requests will fail upstream");
    }

    leancanvas::server::serve(runtime, &config).await
}
