//! Test server wrapper that starts the gateway on a random port

use std::net::SocketAddr;

use crossbar_config::Config;
use crossbar_llm::LlmState;
use crossbar_server::Server;
use tokio_util::sync::CancellationToken;

/// A running gateway instance for tests
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
    llm: LlmState,
}

impl TestServer {
    /// Build the gateway, run one model refresh so routing is populated,
    /// and serve on an ephemeral port
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let server = Server::new(config)?;
        let llm = server.llm().clone();
        llm.index().refresh().await;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, server.into_router())
                .with_graceful_shutdown(async move {
                    server_shutdown.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            shutdown,
            client: reqwest::Client::new(),
            llm,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Routing state, for tests that poke the index or reconciler directly
    #[allow(dead_code)]
    pub fn llm(&self) -> &LlmState {
        &self.llm
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
