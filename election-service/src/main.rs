use std::net::SocketAddr;
use std::sync::Arc;

use election_service::{
    api,
    config::{Config, LedgerMode},
    database::Database,
    ledger::{evm::EvmLedger, memory::InMemoryLedger, LedgerGateway},
    reconciler::AutoCloseReconciler,
    signing::VoteSigner,
    state::AppState,
};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(
        "Starting Election Service {} ({})",
        env!("CARGO_PKG_VERSION"),
        option_env!("ELECTION_BUILD_GIT_HASH").unwrap_or("unknown")
    );

    let config = Config::from_env()?;

    // Initialize database (create tables, run migrations)
    let db = Database::new(&config.db_path).await?;

    let ledger: Arc<dyn LedgerGateway> = match config.ledger_mode {
        LedgerMode::Evm => {
            let rpc_url = config.rpc_url.as_deref().unwrap_or_default();
            Arc::new(EvmLedger::connect(
                rpc_url,
                config.contract_address,
                config.signer.clone(),
                config.ledger_timeout,
            )?)
        }
        LedgerMode::Memory => {
            warn!("LEDGER_MODE=memory: ledger state is lost on restart");
            Arc::new(InMemoryLedger::new(
                config.contract_address,
                config.signer.as_ref().map(|s| s.address()),
            ))
        }
    };

    let signer = match &config.signer {
        Some(key) => {
            let signer = VoteSigner::new(
                key.clone(),
                config.contract_address,
                config.authorization_ttl_secs,
            );
            info!("Vote authorizations signed by {}", signer.address());
            Some(Arc::new(signer))
        }
        None => {
            warn!("SIGNER_PRIVATE_KEY not set: signed relay and ledger writes are disabled");
            None
        }
    };
    if config.admin_token.is_none() {
        warn!("ADMIN_API_TOKEN not set: admin routes will reject every request");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler_task = if config.auto_close_active() {
        let reconciler = Arc::new(AutoCloseReconciler::new(ledger.clone()));
        Some(tokio::spawn(
            reconciler.run(config.auto_close_interval, shutdown_rx),
        ))
    } else if config.auto_close_enabled {
        warn!("Auto-close reconciler not started: no signer to send closeElection");
        None
    } else {
        info!("Auto-close reconciler disabled");
        None
    };

    let state = AppState::new(
        ledger,
        db,
        signer,
        config.admin_token.clone(),
        &config.db_path,
    );
    let app = api::router(state);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(task) = reconciler_task {
        if let Err(e) = task.await {
            warn!("Auto-close reconciler ended abnormally: {}", e);
        }
    }

    Ok(())
}
