mod args;
mod client;

use args::{Args, Command};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use crossbar_config::{Config, LogFormat};
use crossbar_server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Server { config, listen } => {
            let mut config = Config::load(&config)?;
            if let Some(listen) = listen {
                config.server.listen_address = Some(listen);
            }

            init_tracing(&config.logging.level, config.logging.format);
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting crossbar");

            let server = Server::new(config)?;

            let shutdown = CancellationToken::new();
            let signal_shutdown = shutdown.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                signal_shutdown.cancel();
            });

            server.serve(shutdown).await?;
            tracing::info!("crossbar stopped");
            Ok(())
        }

        Command::Script {
            file,
            args: script_args,
            server,
            token,
        } => {
            let mut source = std::fs::read_to_string(&file)
                .map_err(|e| anyhow::anyhow!("failed to read script file {}: {e}", file.display()))?;

            // Expose invocation arguments as a top-level `argv` array
            if !script_args.is_empty() {
                let mut argv = vec![file.display().to_string()];
                argv.extend(script_args);
                let literal = serde_json::to_string(&argv)?;
                source = format!("let argv = {literal};\n{source}");
            }

            let request = client::tool_call_request(
                "execute_code",
                Some(serde_json::json!({"code": source})),
            );
            client::execute_mcp_request(&server, token.as_deref(), request).await
        }

        Command::Tool {
            name,
            arguments,
            server,
            token,
        } => {
            let arguments = arguments
                .map(|raw| {
                    serde_json::from_str(&raw).map_err(|e| {
                        anyhow::anyhow!("error parsing arguments: {e}\nHint: quote your JSON properly")
                    })
                })
                .transpose()?;

            let request = client::tool_call_request(&name, arguments);
            client::execute_mcp_request(&server, token.as_deref(), request).await
        }
    }
}

/// Initialize the tracing subscriber from logging configuration
fn init_tracing(level: &str, format: LogFormat) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Console => builder.init(),
    }
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
