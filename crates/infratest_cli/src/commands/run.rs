//! Run command - Execute a suite of test cases.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use infratest_core::{Scheduler, Suite, SuiteReport};

use super::AppContext;
use crate::ExitCodes;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Suite file (YAML)
    #[arg(short, long, value_name = "FILE")]
    pub suite: PathBuf,

    /// Only run the named case, repeatable
    #[arg(long = "case", value_name = "NAME")]
    pub cases: Vec<String>,

    /// Maximum number of cases provisioning at once
    #[arg(long, value_name = "N", value_parser = parse_parallelism)]
    pub max_parallel: Option<usize>,

    /// Run in the template directories instead of private copies
    #[arg(long)]
    pub no_isolate: bool,

    /// Print the planned engine commands without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Write a JSON report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

fn parse_parallelism(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(format!("expected a positive integer, got '{}'", s)),
    }
}

pub async fn execute(args: RunArgs, mut ctx: AppContext) -> Result<u8> {
    if let Some(max_parallel) = args.max_parallel {
        ctx.config.max_parallel = max_parallel;
    }
    if args.no_isolate {
        ctx.config.isolate_workspaces = false;
    }

    let suite = Suite::load(&args.suite)
        .with_context(|| format!("Failed to load suite {}", args.suite.display()))?;
    let cases = suite.test_cases(&args.cases)?;

    if args.dry_run {
        return plan(&suite, &args.cases, &ctx);
    }

    ctx.ensure_engine().await?;
    info!("Running {} case(s) from {:?}", cases.len(), args.suite);

    let config = Arc::new(ctx.config.clone());
    let mut scheduler = Scheduler::new(ctx.driver()?, config);
    scheduler.extend(cases);

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("Cannot listen for Ctrl-C, shutdown on signal disabled");
            std::future::pending::<()>().await;
        }
    };
    let report = scheduler.run_until(shutdown).await?;

    print_summary(&report);

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("📄 Report written to {}", path.display());
    }

    Ok(exit_code(&report))
}

/// Show what each selected case would run.
fn plan(suite: &Suite, names: &[String], ctx: &AppContext) -> Result<u8> {
    let terraform = ctx.terraform()?;
    let binary = &terraform.config().binary;

    let selected = suite.select(names)?;
    println!("🧪 Dry run: {} case(s)\n", selected.len());
    for case in selected {
        let handle = suite.handle(case);
        println!("{} ({})", case.name, handle.root().display());
        println!("   {} {}", binary, terraform.init_args(&handle).join(" "));
        println!("   {} {}", binary, terraform.apply_args(&handle).join(" "));
        println!("   {} {}", binary, terraform.output_args().join(" "));
        for expectation in &case.expect {
            for assertion in expectation.assertions() {
                println!("   check {:?}", assertion);
            }
        }
        println!("   {} {}", binary, terraform.destroy_args(&handle).join(" "));
        println!();
    }
    Ok(ExitCodes::SUCCESS)
}

fn print_summary(report: &SuiteReport) {
    println!();
    for case in &report.cases {
        let mark = if case.passed { "✅" } else { "❌" };
        println!("{} {} ({} ms)", mark, case.name, case.duration_ms);
        for failure in &case.failures {
            println!("   - [{}] {}", failure.kind, failure.message);
        }
    }
    println!();
    if report.cancelled {
        println!("⚠️  Run was interrupted before all cases finished");
    }
    println!(
        "Results: {} passed, {} failed",
        report.passed_count(),
        report.failed_count()
    );
}

fn exit_code(report: &SuiteReport) -> u8 {
    if report.passed() {
        return ExitCodes::SUCCESS;
    }
    report
        .worst_kind()
        .map(ExitCodes::for_kind)
        .unwrap_or(ExitCodes::GENERAL_ERROR)
}
