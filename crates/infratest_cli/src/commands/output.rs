//! Output command - Print the outputs of an applied template.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use infratest_iac::{LifecycleDriver, OutputValue, Outputs, TemplateHandle};

use super::AppContext;
use crate::ExitCodes;

#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Template directory
    #[arg(short, long, value_name = "DIR")]
    pub dir: PathBuf,

    /// Print only this output
    #[arg(short, long)]
    pub name: Option<String>,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: OutputArgs, ctx: AppContext) -> Result<u8> {
    ctx.ensure_engine().await?;
    let handle = TemplateHandle::new(&args.dir);
    let outputs = ctx
        .terraform()?
        .outputs(&handle)
        .await
        .with_context(|| format!("Failed to read outputs of {}", args.dir.display()))?;

    match (&args.name, args.json) {
        (Some(name), true) => {
            println!("{}", serde_json::to_string_pretty(outputs.get(name)?)?);
        }
        (Some(name), false) => {
            println!("{}", outputs.get_string(name)?);
        }
        (None, true) => {
            println!("{}", serde_json::to_string_pretty(&redacted_values(&outputs))?);
        }
        (None, false) => print_outputs(&outputs),
    }
    Ok(ExitCodes::SUCCESS)
}

/// All outputs as plain values, sensitive ones replaced.
fn redacted_values(outputs: &Outputs) -> serde_json::Map<String, serde_json::Value> {
    outputs
        .iter()
        .map(|(name, entry)| {
            let value = if entry.sensitive {
                serde_json::Value::String("<sensitive>".to_string())
            } else {
                serde_json::to_value(&entry.value).unwrap_or(serde_json::Value::Null)
            };
            (name.clone(), value)
        })
        .collect()
}

pub fn print_outputs(outputs: &Outputs) {
    if outputs.is_empty() {
        println!("   (no outputs)");
        return;
    }
    println!("Outputs:");
    for (name, entry) in outputs.iter() {
        let kind = match entry.value {
            OutputValue::String(_) => "string",
            OutputValue::List(_) => "list",
            OutputValue::Map(_) => "map",
        };
        println!("   {} ({}) = {}", name, kind, outputs.redacted(name));
    }
}
