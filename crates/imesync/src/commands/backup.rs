//! Backup command

use anyhow::Result;
use console::style;

use crate::cli::BackupArgs;
use crate::context::AppContext;
use crate::output;

pub async fn run(args: BackupArgs, ctx: &AppContext) -> Result<()> {
    if args.list {
        return list(ctx);
    }
    if let Some(file) = args.delete {
        let manager = ctx.backup_manager();
        ctx.blocking("backup", move || manager.delete_backup(&file))
            .await?;
        output::success("Backup deleted");
        return Ok(());
    }

    output::header("Backup");
    let config = ctx.orchestrator().current_configuration()?;

    let spinner = output::spinner("Creating backup...");
    let manager = ctx.backup_manager();
    let result = ctx
        .blocking("backup", move || manager.backup(&config))
        .await;
    spinner.finish_and_clear();
    let result = result?;

    output::success(&format!("Backup created: {}", result.archive_path));
    output::kv("Files", &result.manifest.file_count.to_string());
    output::kv("Size", &output::format_bytes(result.size_bytes));
    for pruned in &result.pruned {
        output::info(&format!("Removed old backup {}", pruned));
    }
    Ok(())
}

fn list(ctx: &AppContext) -> Result<()> {
    let backups = ctx.backup_manager().list_backups()?;
    if backups.is_empty() {
        output::info("No backups found");
        return Ok(());
    }

    output::header("Backups");
    for entry in backups {
        println!(
            "  {}  {}  {}",
            style(entry.file_name()).cyan(),
            entry.created.format("%Y-%m-%d %H:%M:%S"),
            style(output::format_bytes(entry.size_bytes)).dim()
        );
    }
    Ok(())
}
