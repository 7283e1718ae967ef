//! Process-wide runtime: configuration, the agent network and the stores.
//!
//! [`get`] builds the runtime from the environment on first use and hands out the same
//! instance afterwards. There is no teardown; the runtime lives as long as the process.

use crate::leancanvas::agent::LoggedAgent;
use crate::leancanvas::canvas_store::{CanvasStore, DebouncedSaver};
use crate::leancanvas::client_wrapper::ClientWrapper;
use crate::leancanvas::clients::openai::OpenAIClient;
use crate::leancanvas::config::LeanCanvasConfig;
use crate::leancanvas::event::LoggingEventHandler;
use crate::leancanvas::memory::ThreadStore;
use crate::leancanvas::network::AgentNetwork;
use std::sync::Arc;
use tokio::sync::OnceCell;

static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::const_new();

pub struct Runtime {
    pub config: LeanCanvasConfig,
    pub network: LoggedAgent<AgentNetwork>,
    pub threads: Arc<ThreadStore>,
    pub canvases: Arc<CanvasStore>,
    pub saver: DebouncedSaver,
}

impl Runtime {
    /// Build a runtime that talks to the configured OpenAI-compatible endpoint.
    pub async fn from_config(config: LeanCanvasConfig) -> Self {
        let api_key = config.api_key.clone().unwrap_or_else(|| {
            log::warn!("runtime: neither AI_API_KEY nor OPENAI_API_KEY is set");
            String::new()
        });
        let client: Arc<dyn ClientWrapper> = match &config.base_url {
            Some(base_url) => Arc::new(OpenAIClient::new_with_base_url(
                &api_key,
                &config.model,
                base_url,
            )),
            None => Arc::new(OpenAIClient::new_with_model_string(&api_key, &config.model)),
        };
        Self::with_client(config, client).await
    }

    /// Build a runtime around an explicit model client.
    pub async fn with_client(config: LeanCanvasConfig, client: Arc<dyn ClientWrapper>) -> Self {
        log::info!(
            "runtime: model {} (data in {})",
            client.model_name(),
            config.data_dir.display()
        );
        let threads = Arc::new(ThreadStore::with_dir(config.threads_dir()));
        let canvases = Arc::new(CanvasStore::open(config.canvas_blob_path()).await);
        let saver = DebouncedSaver::new(canvases.clone(), config.save_delay);
        let network = AgentNetwork::lean_canvas(client, threads.clone())
            .with_max_steps(config.max_steps)
            .with_event_handler(Arc::new(LoggingEventHandler));

        Self {
            config,
            network: LoggedAgent::new(network),
            threads,
            canvases,
            saver,
        }
    }
}

/// The shared runtime, created from [`LeanCanvasConfig::from_env`] on first call.
pub async fn get() -> Arc<Runtime> {
    RUNTIME
        .get_or_init(|| async { Arc::new(Runtime::from_config(LeanCanvasConfig::from_env()).await) })
        .await
        .clone()
}
