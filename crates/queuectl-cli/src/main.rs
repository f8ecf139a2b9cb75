//! queuectl — CLI for the background job queue.
//!
//! # Usage
//!
//! ```text
//! queuectl run [--workers N] [--base-backoff SECS] [--poll-interval SECS] [FILE]
//! ```
//!
//! Reads one JSON job spec per line from FILE (or stdin), e.g.
//! `{"id":"job1","command":"echo hi","max_retries":2}`, enqueues them,
//! starts N workers, and waits until every job reaches a terminal state.
//! Exits non-zero if any job was dead-lettered.
//!
//! `--base-backoff` falls back to the `QUEUECTL_BACKOFF_BASE` env var
//! (seconds).

use std::io::{BufRead, BufReader, Read};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use queuectl_core::{
    InMemoryStore, JobQueue, JobSpec, JobState, RetryPolicy, ShellRunner, WorkerConfig,
};

struct RunOpts {
    workers: usize,
    base_backoff: Option<Duration>,
    poll_interval: Option<Duration>,
    file: Option<String>,
}

const USAGE: &str = "usage: queuectl run [--workers N] [--base-backoff SECS] [--poll-interval SECS] [FILE]
       queuectl help

Reads one JSON job spec per line from FILE or stdin:
  {\"id\":\"job1\",\"command\":\"echo hi\",\"max_retries\":2}";

fn parse_run_opts(args: &[String]) -> Result<RunOpts, String> {
    let mut opts = RunOpts {
        workers: 1,
        base_backoff: None,
        poll_interval: None,
        file: None,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--workers" => {
                let value = iter.next().ok_or("--workers requires a value")?;
                opts.workers = value
                    .parse()
                    .map_err(|_| format!("invalid worker count: {value}"))?;
                if opts.workers == 0 {
                    return Err("worker count must be at least 1".into());
                }
            }
            "--base-backoff" => {
                let value = iter.next().ok_or("--base-backoff requires a value")?;
                opts.base_backoff = Some(parse_secs(value)?);
            }
            "--poll-interval" => {
                let value = iter.next().ok_or("--poll-interval requires a value")?;
                opts.poll_interval = Some(parse_secs(value)?);
            }
            other if other.starts_with("--") => {
                return Err(format!("unknown option: {other}"));
            }
            other => {
                if opts.file.is_some() {
                    return Err(format!("unexpected argument: {other}"));
                }
                opts.file = Some(other.to_string());
            }
        }
    }
    Ok(opts)
}

fn parse_secs(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("invalid duration (seconds): {value}"))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("duration must be a positive number of seconds: {value}"));
    }
    Ok(Duration::from_secs_f64(secs))
}

fn read_specs(file: Option<&str>) -> Result<Vec<(usize, Result<JobSpec, String>)>, String> {
    let reader: Box<dyn Read> = match file {
        Some(path) => Box::new(
            std::fs::File::open(path).map_err(|e| format!("cannot open {path}: {e}"))?,
        ),
        None => Box::new(std::io::stdin()),
    };

    let mut specs = Vec::new();
    for (lineno, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.map_err(|e| format!("read error: {e}"))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let parsed = serde_json::from_str::<JobSpec>(trimmed)
            .map_err(|e| format!("invalid JSON: {e}"));
        specs.push((lineno + 1, parsed));
    }
    Ok(specs)
}

fn print_jobs(jobs: &[queuectl_core::Job]) {
    println!(
        "{:<20} {:<12} {:>8} {:>12}  {}",
        "ID", "STATE", "ATTEMPTS", "MAX_RETRIES", "COMMAND"
    );
    for job in jobs {
        println!(
            "{:<20} {:<12} {:>8} {:>12}  {}",
            job.id,
            job.state.to_string(),
            job.attempts,
            job.max_retries,
            job.command
        );
    }
}

async fn run(opts: RunOpts) -> Result<ExitCode, String> {
    let base_backoff = match opts.base_backoff {
        Some(d) => Some(d),
        None => match std::env::var("QUEUECTL_BACKOFF_BASE") {
            Ok(value) => Some(parse_secs(&value).map_err(|e| format!("QUEUECTL_BACKOFF_BASE: {e}"))?),
            Err(_) => None,
        },
    };

    let mut config = WorkerConfig::default();
    if let Some(base) = base_backoff {
        config.retry = RetryPolicy::with_base(base);
    }
    if let Some(poll) = opts.poll_interval {
        config.poll_interval = poll;
    }

    let queue = JobQueue::new(Arc::new(InMemoryStore::new()));

    let mut enqueued = 0usize;
    let mut rejected = 0usize;
    for (lineno, spec) in read_specs(opts.file.as_deref())? {
        let spec = match spec {
            Ok(spec) => spec,
            Err(err) => {
                eprintln!("line {lineno}: {err}");
                rejected += 1;
                continue;
            }
        };
        match queue.enqueue(spec).await {
            Ok(job) => {
                tracing::info!(job_id = %job.id, "enqueued job");
                enqueued += 1;
            }
            Err(err) => {
                eprintln!("line {lineno}: {err}");
                rejected += 1;
            }
        }
    }

    if enqueued == 0 {
        eprintln!("no jobs to run");
        return Ok(if rejected > 0 {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        });
    }

    tracing::info!(workers = opts.workers, "starting workers");
    let pool = queue.start_workers(opts.workers, Arc::new(ShellRunner), config);

    // Drive to completion: every job either completed or dead.
    let jobs = loop {
        let jobs = queue.list(None).await.map_err(|e| e.to_string())?;
        if jobs.iter().all(|j| j.state.is_terminal()) {
            break jobs;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };
    pool.shutdown_and_join().await;

    print_jobs(&jobs);

    let dead = jobs.iter().filter(|j| j.state == JobState::Dead).count();
    if dead > 0 || rejected > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("run") => match parse_run_opts(&args[1..]) {
            Ok(opts) => match run(opts).await {
                Ok(code) => code,
                Err(err) => {
                    eprintln!("queuectl: {err}");
                    ExitCode::FAILURE
                }
            },
            Err(err) => {
                eprintln!("queuectl: {err}\n{USAGE}");
                ExitCode::from(2)
            }
        },
        Some("help") | Some("--help") | Some("-h") | None => {
            println!("{USAGE}");
            ExitCode::SUCCESS
        }
        Some(other) => {
            eprintln!("queuectl: unknown command: {other}\n{USAGE}");
            ExitCode::from(2)
        }
    }
}
