//! Apply command - Provision a template and print its outputs.

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use infratest_iac::LifecycleDriver;

use super::{output, AppContext, TemplateArgs};
use crate::ExitCodes;

#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub template: TemplateArgs,

    /// Log the engine commands instead of running them
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn execute(args: ApplyArgs, ctx: AppContext) -> Result<u8> {
    let ctx = if args.dry_run { ctx.dry_run() } else { ctx };
    let handle = args.template.handle();
    if !args.dry_run {
        ctx.ensure_engine().await?;
    }

    info!("Applying template {:?}", handle.root());
    let driver = ctx.terraform()?;
    let applied = driver
        .apply(&handle)
        .await
        .with_context(|| format!("terraform apply failed for {}", handle.root().display()))?;

    println!("✅ Applied {}", handle.root().display());
    output::print_outputs(&applied.outputs);
    println!();
    println!(
        "⚠️  Resources are left running. Tear them down with: infratest destroy --dir {}",
        handle.root().display()
    );
    Ok(ExitCodes::SUCCESS)
}
