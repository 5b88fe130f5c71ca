//! Config command

use anyhow::Result;

use crate::cli::{ConfigCommands, ConfigRestoreDefaultArgs, ConfigShowArgs};
use crate::commands::deploy_with_progress;
use crate::context::AppContext;
use crate::output;

pub async fn run(cmd: ConfigCommands, ctx: &AppContext) -> Result<()> {
    match cmd {
        ConfigCommands::Show(args) => show(args, ctx),
        ConfigCommands::RestoreDefault(args) => restore_default(args, ctx).await,
    }
}

fn show(args: ConfigShowArgs, ctx: &AppContext) -> Result<()> {
    let mut config = ctx.orchestrator().current_configuration()?;
    if args.resolved {
        config = config.resolved();
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", serde_yaml_ng::to_string(&config)?);
    }
    Ok(())
}

async fn restore_default(args: ConfigRestoreDefaultArgs, ctx: &AppContext) -> Result<()> {
    let orchestrator = ctx.orchestrator();
    let mut config = orchestrator.current_configuration()?;
    let default = ctx.default_configuration()?;
    config.restore_field(&default, &args.field)?;

    deploy_with_progress(&orchestrator, config).await?;
    output::success(&format!("Restored {} to its default", args.field));
    Ok(())
}
