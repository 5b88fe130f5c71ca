//! Deploy command

use anyhow::Result;

use crate::cli::DeployArgs;
use crate::commands::deploy_with_progress;
use crate::context::AppContext;
use crate::output;

pub async fn run(args: DeployArgs, ctx: &AppContext) -> Result<()> {
    let orchestrator = ctx.orchestrator();
    let config = orchestrator.current_configuration()?;

    if args.silent {
        orchestrator.deploy_silent(config).await?;
        return Ok(());
    }

    output::header("Deploy");
    output::kv("Sandbox", ctx.registry.roots().sandbox.as_str());
    output::kv("Shared", ctx.registry.roots().shared.as_str());
    println!();

    let deployed = deploy_with_progress(&orchestrator, config).await?;

    output::success("Deployment complete");
    let schemas = deployed.rime().selected_schemas();
    if !schemas.is_empty() {
        output::kv("Schemas", &schemas.join(", "));
    }
    Ok(())
}
