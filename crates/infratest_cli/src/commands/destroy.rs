//! Destroy command - Tear down a template.

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use infratest_iac::LifecycleDriver;

use super::{AppContext, TemplateArgs};
use crate::ExitCodes;

#[derive(Args, Debug)]
pub struct DestroyArgs {
    #[command(flatten)]
    pub template: TemplateArgs,

    /// Log the engine commands instead of running them
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn execute(args: DestroyArgs, ctx: AppContext) -> Result<u8> {
    let ctx = if args.dry_run { ctx.dry_run() } else { ctx };
    let handle = args.template.handle();
    if !args.dry_run {
        ctx.ensure_engine().await?;
    }

    info!("Destroying template {:?}", handle.root());
    ctx.terraform()?
        .destroy(&handle)
        .await
        .with_context(|| format!("terraform destroy failed for {}", handle.root().display()))?;

    println!("✅ Destroyed {}", handle.root().display());
    Ok(ExitCodes::SUCCESS)
}
