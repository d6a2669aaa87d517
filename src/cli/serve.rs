//! `serve` command: HTTP API plus the internal tick loop

use std::sync::Arc;

use crate::api::{self, AppState};
use crate::client::{NetworkApi, VatsimClient};
use crate::config::Config;
use crate::error::Result;
use crate::store::{ContentStore, GithubContentStore};
use crate::tick::tick_loop;

pub async fn run() -> Result<()> {
    let config = Config::from_env()?;
    let listen_addr = config.listen_addr.clone();

    let transport: Arc<dyn ContentStore> = Arc::new(GithubContentStore::new(&config)?);
    let network: Arc<dyn NetworkApi> = Arc::new(VatsimClient::new(&config)?);

    let state = Arc::new(AppState {
        config,
        transport: transport.clone(),
        network: network.clone(),
    });
    let app = api::router(state);

    tokio::spawn(tick_loop(transport, network));

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    log::info!("atcwatch listening on {}", listen_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
