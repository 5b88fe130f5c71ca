//! Restore command

use anyhow::Result;
use dialoguer::Confirm;

use crate::cli::RestoreArgs;
use crate::context::AppContext;
use crate::output;

pub async fn run(args: RestoreArgs, ctx: &AppContext) -> Result<()> {
    output::header("Restore");
    output::kv("Archive", args.archive.as_str());
    output::warning("SharedSupport, UserData and the configuration will be replaced");
    println!();

    if !args.yes
        && !Confirm::new()
            .with_prompt("Proceed with restore?")
            .default(false)
            .interact()?
    {
        output::info("Restore cancelled");
        return Ok(());
    }

    let spinner = output::spinner("Verifying and restoring...");
    let manager = ctx.backup_manager();
    let archive = args.archive.clone();
    let result = ctx
        .blocking("restore", move || manager.restore(&archive))
        .await;
    spinner.finish_and_clear();
    result?;

    output::success("Restore complete");
    output::info("Run `imesync deploy` to apply the restored files to the keyboard");
    Ok(())
}
