//! `tick` command: one scheduled invocation, for cron deployments

use std::sync::Arc;

use chrono::Utc;

use crate::client::VatsimClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::{ContentStore, GithubContentStore};
use crate::tick::run_scheduled_tick;

pub async fn run() -> Result<()> {
    let config = Config::from_env()?;
    let transport: Arc<dyn ContentStore> = Arc::new(GithubContentStore::new(&config)?);
    let network = VatsimClient::new(&config)?;

    let report = run_scheduled_tick(transport, &network, Utc::now()).await;
    if report.aborted {
        return Err(Error::Other("tick aborted: store load failed".to_string()));
    }

    if let Some(engine) = &report.engine {
        log::info!(
            "tick complete: processed {} controllers in {} slice(s), cursor {}/{}, stop {:?}",
            engine.processed,
            engine.slices,
            engine.cursor,
            engine.total,
            engine.stop
        );
    }
    if report.flushes_failed > 0 {
        log::warn!(
            "{} flush(es) failed; that work will be recomputed next tick",
            report.flushes_failed
        );
    }
    Ok(())
}
