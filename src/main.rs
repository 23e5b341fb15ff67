use icinga2_node::{NodeConfig, Runtime};
use tracing::info;

#[tokio::main]
async fn main() {
    icinga2_node::logsetup::init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "/etc/icinga2/icinga2-node.toml".to_owned());
    let config = NodeConfig::load(&config_path).unwrap_or_else(|e| {
        eprintln!("failed to load {config_path}: {e}");
        std::process::exit(1);
    });

    info!(node = %config.node_name, bind = %config.listen_bind, "starting node");
    let runtime = Runtime::build(&config).await.unwrap_or_else(|e| {
        eprintln!("failed to initialize runtime: {e}");
        std::process::exit(1);
    });

    tokio::select! {
        result = runtime.run(&config) => {
            if let Err(e) = result {
                eprintln!("runtime exited with error: {e}");
                std::process::exit(1);
            }
        }
        () = shutdown_signal() => {
            info!("shutting down");
        }
    }
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received Ctrl+C"); },
        () = terminate => { info!("received SIGTERM"); },
    }
}
