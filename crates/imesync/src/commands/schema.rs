//! Schema command

use anyhow::{anyhow, Result};
use console::style;
use imesync_core::{DirectoryRole, SchemaCatalog, SchemaSelection, StorageDomain};

use crate::cli::{SchemaCommands, SchemaIdArgs};
use crate::commands::deploy_with_progress;
use crate::context::AppContext;
use crate::output;

pub async fn run(cmd: SchemaCommands, ctx: &AppContext) -> Result<()> {
    match cmd {
        SchemaCommands::List => list(ctx),
        SchemaCommands::Select(args) => select(args, ctx).await,
        SchemaCommands::Deselect(args) => deselect(args, ctx).await,
    }
}

/// Schemas installed in the sandbox
fn catalog(ctx: &AppContext) -> Result<SchemaCatalog> {
    let shared_support = ctx
        .registry
        .path_of(StorageDomain::Sandbox, DirectoryRole::SharedSupport)?;
    let user_data = ctx
        .registry
        .path_of(StorageDomain::Sandbox, DirectoryRole::UserData)?;
    Ok(SchemaCatalog::scan(&[
        shared_support.as_path(),
        user_data.as_path(),
    ])?)
}

fn list(ctx: &AppContext) -> Result<()> {
    let catalog = catalog(ctx)?;
    if catalog.is_empty() {
        output::info("No input schemas installed");
        return Ok(());
    }
    let config = ctx.orchestrator().current_configuration()?;
    let selection = SchemaSelection::from_configuration(&config, &catalog)?;

    output::header("Input Schemas");
    for schema in catalog.schemas() {
        let marker = if selection.contains(&schema.id) {
            style("●").green()
        } else {
            style("○").dim()
        };
        println!("  {} {} {}", marker, schema.id, style(&schema.name).dim());
    }
    Ok(())
}

async fn select(args: SchemaIdArgs, ctx: &AppContext) -> Result<()> {
    let catalog = catalog(ctx)?;
    let schema = catalog
        .get(&args.id)
        .cloned()
        .ok_or_else(|| anyhow!("Unknown input schema: {}", args.id))?;

    let orchestrator = ctx.orchestrator();
    let config = orchestrator.current_configuration()?;
    let mut selection = SchemaSelection::from_configuration(&config, &catalog)?;
    if selection.contains(&schema.id) {
        output::info(&format!("{} is already selected", schema.id));
        return Ok(());
    }
    let patch = selection.select(schema);

    deploy_with_progress(&orchestrator, config.apply(&patch)).await?;
    output::success(&format!("Selected {}", args.id));
    Ok(())
}

async fn deselect(args: SchemaIdArgs, ctx: &AppContext) -> Result<()> {
    let catalog = catalog(ctx)?;
    let orchestrator = ctx.orchestrator();
    let config = orchestrator.current_configuration()?;
    let mut selection = SchemaSelection::from_configuration(&config, &catalog)?;
    if !selection.contains(&args.id) {
        output::info(&format!("{} is not selected", args.id));
        return Ok(());
    }
    let patch = selection.deselect(&args.id)?;

    deploy_with_progress(&orchestrator, config.apply(&patch)).await?;
    output::success(&format!("Deselected {}", args.id));
    Ok(())
}
