//! CLI command implementations

pub mod backup;
pub mod config;
pub mod deploy;
pub mod reset;
pub mod restore;
pub mod schema;
pub mod sync;

use crate::output;
use anyhow::Result;
use imesync_core::Configuration;
use imesync_deploy::Orchestrator;

/// Deploy `config` with a spinner that follows the deploy state
pub(crate) async fn deploy_with_progress(
    orchestrator: &Orchestrator,
    config: Configuration,
) -> Result<Configuration> {
    let spinner = output::spinner("Deploying...");
    let mut states = orchestrator.subscribe();
    let follow = {
        let spinner = spinner.clone();
        tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let state = states.borrow_and_update().to_string();
                spinner.set_message(state);
            }
        })
    };

    let result = orchestrator.deploy(config).await;
    follow.abort();
    spinner.finish_and_clear();
    Ok(result?)
}
