mod cli;
mod config;
mod console;
mod report;

use std::process::ExitCode;
use std::sync::{mpsc, Arc};
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use rater_core::{encode_requests, ScoringRequest};
use rater_engine::{
    read_artifact, BatchPipeline, ChannelProgressSink, ClientSettings, OpenAiBatchClient,
    RunReport, StopReason, TokioSleeper,
};
use rater_logging::{rater_error, rater_info, rater_warn};
use tokio_util::sync::CancellationToken;

use crate::cli::{read_targets, Args};
use crate::config::AppConfig;

/// Exit status when the job is still running remotely.
const EXIT_UNFINISHED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    rater_logging::initialize(args.log_destination(), args.log_level());

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            rater_error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let run_config = args.run_config();

    let settings = if args.build_only {
        ClientSettings::default()
    } else {
        AppConfig::from_env()?.client_settings()
    };
    let client = OpenAiBatchClient::new(settings).context("cannot set up batch client")?;
    let pipeline = BatchPipeline::new(Arc::new(client), Arc::new(TokioSleeper), run_config)?;

    let (tx, rx) = mpsc::channel();
    let printer = thread::spawn(move || console::print_events(rx));
    let sink = ChannelProgressSink::new(tx);

    if args.build_only {
        let urls = args.urls.as_deref().context("--urls is required")?;
        let prepared = pipeline.prepare(&read_targets(urls)?, &sink)?;
        drop(sink);
        let _ = printer.join();
        println!(
            "wrote {} requests to {}",
            prepared.requests.len(),
            prepared.artifact_path.display()
        );
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancellationToken::new();
    watch_for_interrupt(cancel.clone());

    let outcome = match &args.resume {
        Some(job_id) => {
            let requests = resume_requests(&args, &pipeline)?;
            pipeline.resume(job_id, requests, &sink, &cancel).await
        }
        None => {
            let urls = args.urls.as_deref().context("--urls is required")?;
            let targets = read_targets(urls)?;
            pipeline.run(&targets, &sink, &cancel).await
        }
    };
    drop(sink);
    let _ = printer.join();

    let report = outcome?;
    print!("{}", report::render(&report));
    Ok(exit_code(&report))
}

/// Requests of the job being resumed: re-encoded from `--urls`, else read back from the artifact.
fn resume_requests(args: &Args, pipeline: &BatchPipeline) -> Result<Vec<ScoringRequest>> {
    let config = pipeline.config();
    if let Some(urls) = args.urls.as_deref() {
        let targets = read_targets(urls)?;
        return Ok(encode_requests(&targets, &config.rubric, config.encode)?);
    }
    read_artifact(&config.artifact_path).with_context(|| {
        format!(
            "cannot load submitted requests from {}",
            config.artifact_path.display()
        )
    })
}

fn watch_for_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            rater_warn!("interrupted; stopping without cancelling the remote job");
            cancel.cancel();
        }
    });
}

fn exit_code(report: &RunReport) -> ExitCode {
    match report.stop {
        StopReason::Terminal => {
            rater_info!("batch {} finished as {}", report.job.id, report.job.status);
            ExitCode::SUCCESS
        }
        StopReason::Cancelled | StopReason::DeadlineExceeded => ExitCode::from(EXIT_UNFINISHED),
    }
}
