//! Sync command

use anyhow::Result;

use crate::context::AppContext;
use crate::output;

pub async fn run(ctx: &AppContext) -> Result<()> {
    output::header("Sync");

    let spinner = output::spinner("Synchronizing...");
    let result = ctx.orchestrator().sync().await;
    spinner.finish_and_clear();
    let summary = result?;

    output::success("Sync complete");
    output::kv("Sync directory", summary.sync_dir.as_str());
    let propagation = &summary.propagation;
    output::kv(
        "Propagated",
        &format!(
            "{} SharedSupport files, {} UserData files",
            propagation.shared_support.copied, propagation.user_data.copied
        ),
    );
    if let Some(dictionaries) = &propagation.dictionaries {
        output::kv(
            "Dictionaries",
            &format!("{} pulled from the keyboard", dictionaries.copied),
        );
    }
    if !summary.cloud.is_empty() {
        let copied: usize = summary.cloud.iter().map(|r| r.copied).sum();
        output::kv("Cloud", &format!("{} files exchanged", copied));
    }
    Ok(())
}
