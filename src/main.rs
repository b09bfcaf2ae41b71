use gworkspace_nexus::config::Config;
use gworkspace_nexus::db::{self, TokenStorage, WorkspaceStorage};
use gworkspace_nexus::google_oauth::{GoogleAuthManager, build_http_client};
use gworkspace_nexus::router::{NexusState, nexus_router};
use gworkspace_nexus::service::{maintenance, workspace_loader};
use mimalloc::MiMalloc;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Arc::new(Config::load()?);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        listen_addr = %cfg.basic.listen_addr,
        database_url = %cfg.basic.database_url,
        proxy = %cfg.basic.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        loglevel = %cfg.basic.loglevel,
        maintenance = cfg.maintenance.enabled,
    );
    if cfg.basic.crm_key.trim().is_empty() {
        warn!("basic.crm_key is empty; every API call will be rejected");
    }

    let pool = db::connect(&cfg.basic.database_url).await?;
    let tokens = TokenStorage::new(pool.clone());
    let workspaces = WorkspaceStorage::new(pool);

    if let Some(dir) = cfg.basic.workspace_dir.as_ref() {
        match workspace_loader::load_from_dir(dir) {
            Ok(seeds) if !seeds.is_empty() => {
                let stored = workspace_loader::apply(&workspaces, &seeds).await;
                info!(
                    path = %dir.display(),
                    found = seeds.len(),
                    stored,
                    "Workspace configs loaded from filesystem"
                );
            }
            Ok(_) => info!(path = %dir.display(), "no workspace config files discovered"),
            Err(e) => warn!(
                path = %dir.display(),
                error = %e,
                "failed to load workspace configs from directory"
            ),
        }
    }

    let http = build_http_client(&cfg.basic, &cfg.google)?;
    let manager = GoogleAuthManager::new(tokens, workspaces, cfg.google.clone(), http);
    let maintenance = maintenance::spawn(manager.clone(), cfg.maintenance.clone()).await?;

    let state = NexusState::new(cfg.clone(), manager, maintenance);
    let app = nexus_router(state);

    let listener = TcpListener::bind(&cfg.basic.listen_addr).await?;
    info!("HTTP server listening on {}", cfg.basic.listen_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
