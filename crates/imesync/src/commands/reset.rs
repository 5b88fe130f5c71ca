//! Reset command

use anyhow::Result;
use dialoguer::Confirm;

use crate::cli::ResetArgs;
use crate::context::AppContext;
use crate::output;

pub async fn run(args: ResetArgs, ctx: &AppContext) -> Result<()> {
    output::header("Reset to Defaults");
    output::kv("Bundle", ctx.registry.bundle_dir().as_str());
    output::warning("Schemas, dictionaries and settings in the sandbox will be replaced");
    println!();

    if !args.yes
        && !Confirm::new()
            .with_prompt("Reset everything to the bundled defaults?")
            .default(false)
            .interact()?
    {
        output::info("Reset cancelled");
        return Ok(());
    }

    let spinner = output::spinner("Resetting...");
    let result = ctx.orchestrator().reset().await;
    spinner.finish_and_clear();
    result?;

    output::success("Reset complete, cloud sync is off");
    Ok(())
}
