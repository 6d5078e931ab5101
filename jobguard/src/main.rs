// SPDX-License-Identifier: MIT
// jobguard: run jobs with a concurrency guard
//
// - Runs a single command, or a JSON batch of commands, through the job executor.
// - Jobs that disallow concurrent execution are rejected while a run is in flight.
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use clap::Parser;
use log::{error, info};

use jobguard::job_engine::hooks::{IdentityHooks, JobHooks};
use jobguard::jobs::batch::run_batch;
use jobguard::jobs::command_job::CommandJob;
use jobguard::jobs::job_spec::Batch;
use jobguard::{log_context, ExclusivityKey, ExecutorConfig, JobExecutor, LogContextStore};

mod global_config;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Name of the job, used in logs and for the concurrency guard
    #[arg(long)]
    name: Option<String>,

    /// Allow several runs of the job at the same time
    #[arg(long)]
    allow_concurrent: bool,

    /// Acting user, put into the log context while a job runs
    #[arg(long = "run-as", value_name = "USER")]
    run_as: Option<String>,

    /// What makes two runs "the same job". Overrides "exclusivity" of a JSON batch [default: instance]
    #[arg(long, value_enum)]
    exclusivity: Option<ExclusivityKey>,

    /// Jobs to run (JSON encoded). Note that this excludes --name and a command.
    #[arg(long, value_name = "JSON")]
    jobs: Option<String>,

    /// Jobs to run (base64-encoded JSON). Note that this excludes --name and a command.
    #[arg(long = "jobs-base64", value_name = "BASE64")]
    jobs_base64: Option<String>,

    /// Program and arguments of a single job
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

fn validate_args(args: &Args) -> Result<(), String> {
    let jobs: &Option<String> = match (&args.jobs, &args.jobs_base64) {
        (None, None) => &None,
        (None, Some(_)) => &args.jobs_base64,
        (Some(_), None) => &args.jobs,
        (Some(_), Some(_)) => {
            return Err("--jobs and --jobs-base64 may not be used together".into());
        }
    };

    match (&args.name, args.command.is_empty(), jobs) {
        (None, true, Some(_)) => {}
        (Some(_), false, None) => {}
        (_, _, Some(_)) => {
            return Err("--jobs or --jobs-base64 must not be used together with --name or a command".into());
        }
        (None, _, None) => {
            return Err("either --name with a command, --jobs or --jobs-base64 is required".into());
        }
        (Some(_), true, None) => {
            return Err("--name requires a command after --".into());
        }
    }

    if args.allow_concurrent && jobs.is_some() {
        return Err("--allow-concurrent applies to single jobs only, use allow_concurrent in the JSON".into());
    }

    Ok(())
}

fn decode_jobs(args: &Args) -> anyhow::Result<Option<String>> {
    match (&args.jobs, &args.jobs_base64) {
        (Some(json), None) => Ok(Some(json.clone())),
        (None, Some(b64)) => {
            let decoded = BASE64_STANDARD
                .decode(b64)
                .context("--jobs-base64 is not valid base64")?;
            let decoded = String::from_utf8(decoded).context("--jobs-base64 is not UTF-8")?;
            Ok(Some(decoded))
        }
        (None, None) => Ok(None),
        _ => unreachable!("validate_args enforces mutual exclusion"),
    }
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:<5} {}{}] {}",
                buf.timestamp(),
                record.level(),
                record.target(),
                log_context::render(),
                record.args()
            )
        })
        .init();
}

/// Returns whether every job succeeded.
fn run<H: JobHooks, L: LogContextStore>(
    executor: &JobExecutor<H, L>,
    args: &Args,
    batch: Option<Batch>,
) -> anyhow::Result<bool> {
    if let Some(batch) = batch {
        let outcomes = run_batch(executor, &batch.jobs)?;
        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        info!("{} of {} runs failed", failed, outcomes.len());
        return Ok(failed == 0);
    }

    let name = args.name.clone().context("--name is required")?;
    let job = Arc::new(
        CommandJob::from_command_line(name, &args.command)?.allow_concurrent(args.allow_concurrent),
    );
    match executor.execute(&job) {
        Ok(()) => Ok(true),
        Err(e) => {
            error!("{}", e);
            Ok(false)
        }
    }
}

fn main() {
    init_logging();

    let args = Args::parse();
    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {e}");
        std::process::exit(2);
    }

    let batch = match decode_jobs(&args).and_then(|jobs| jobs.as_deref().map(Batch::parse).transpose()) {
        Ok(batch) => batch,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(2);
        }
    };

    let config = match &batch {
        Some(batch) => batch.executor_config(args.exclusivity),
        None => ExecutorConfig {
            exclusivity: args.exclusivity.unwrap_or_default(),
        },
    };
    global_config::initialize_global_config(&config.exclusivity, &args.run_as);

    let builder = JobExecutor::builder().config(ExecutorConfig {
        exclusivity: global_config::get_exclusivity(),
    });
    let result = match global_config::get_run_as() {
        Some(user) => run(&builder.hooks(IdentityHooks::new(user)).build(), &args, batch),
        None => run(&builder.build(), &args, batch),
    };

    match result {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
