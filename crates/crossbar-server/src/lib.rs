//! Server assembly: routes, middleware, background tasks, shutdown.

mod auth;
mod conversations;
mod fallback;
mod health;
mod responses;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crossbar_config::Config;
use crossbar_llm::LlmState;
use crossbar_mcp::McpServer;
use crossbar_store::Store;

/// Deadline for the startup model refresh
const STARTUP_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default listen address when none is configured
fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 12345))
}

/// Assembled gateway with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
    llm: LlmState,
    refresh_interval: Option<Duration>,
}

impl Server {
    /// Build the server from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if provider clients or the object store fail to
    /// initialize.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let listen_address = config.server.listen_address.unwrap_or_else(default_listen_address);

        let llm = LlmState::from_config(&config.providers, &config.models)?;
        let mcp = McpServer::new(&config.tools, llm.clone());

        let mut app = Router::new()
            .route("/", axum::routing::get(service_banner))
            .route("/health", axum::routing::get(health::health_handler).with_state(llm.clone()));

        app = app.merge(crossbar_llm::llm_router(llm.clone()));
        app = app.merge(crossbar_mcp::mcp_router(mcp.clone()));

        if let Some(ref path) = config.store.path {
            let store = Arc::new(Store::open(path, config.store.ttl_days)?);
            app = app.merge(responses::responses_router(responses::ResponsesState {
                store: Arc::clone(&store),
                llm: llm.clone(),
                mcp,
            }));
            app = app.merge(conversations::conversations_router(store));
        }

        app = app.fallback(fallback::not_found_handler);

        // Bearer auth wraps everything except /health
        if let Some(ref token) = config.server.token {
            let token = token.expose_secret().to_owned();
            app = app.layer(axum::middleware::from_fn(move |request, next| {
                let token = token.clone();
                async move { auth::bearer_auth_middleware(token, request, next).await }
            }));
        }

        app = app.layer(TraceLayer::new_for_http());

        let refresh_interval = (config.models.refresh_interval_secs > 0)
            .then(|| Duration::from_secs(config.models.refresh_interval_secs));

        Ok(Self {
            router: app,
            listen_address,
            llm,
            refresh_interval,
        })
    }

    pub fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router; used by tests that
    /// manage their own listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Access the routing state, e.g. for startup refreshes
    pub fn llm(&self) -> &LlmState {
        &self.llm
    }

    /// Spawn the background tasks tied to the server's lifetime: the
    /// startup refresh, the health reconciler, and the optional periodic
    /// index refresh
    pub fn spawn_background_tasks(&self, shutdown: &CancellationToken) {
        let index = Arc::clone(self.llm.index());

        // Initial catalog fetch; the server accepts traffic immediately
        let startup_index = Arc::clone(&index);
        tokio::spawn(async move {
            if tokio::time::timeout(STARTUP_REFRESH_TIMEOUT, startup_index.refresh())
                .await
                .is_err()
            {
                tracing::warn!("startup model refresh timed out");
            }
        });

        let _reconciler = crossbar_llm::health::spawn_reconciler(Arc::clone(&index), shutdown.clone());

        if let Some(interval) = self.refresh_interval {
            let periodic_index = index;
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        () = shutdown.cancelled() => return,
                        _ = ticker.tick() => periodic_index.refresh().await,
                    }
                }
            });
        }
    }

    /// Serve until the cancellation token fires.
    ///
    /// # Errors
    ///
    /// Returns an error if binding or serving fails.
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        self.spawn_background_tasks(&shutdown);

        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}

/// `GET /` service banner
async fn service_banner() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "service": "crossbar",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
