//! verdict - command line front end for the verdict client

use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use verdict_client::config::{Args, Command};
use verdict_client::{RequestOptions, Result, VerdictReport, VerdictResolver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Logs go to stderr; stdout carries one line per verdict
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("verdict_client={},verdict={},warn", args.log_level, args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(2);
    }

    let config = args.client_config();
    info!("Verdict service: {} ({:?})", config.url, config.transport);
    debug!(
        "Timeouts: verdict {:?}, upload {:?}",
        config.verdict_timeout, config.upload_timeout
    );

    let resolver = VerdictResolver::new(config, args.authenticator()?)?;
    let options = RequestOptions::default();

    let (inputs, results): (Vec<String>, Vec<Result<VerdictReport>>) = match &args.command {
        Command::Sha256 { hashes } => (hashes.clone(), resolver.for_sha256_list(hashes.as_slice(), &options).await),
        Command::File { paths } => (
            paths.iter().map(|p| p.display().to_string()).collect(),
            resolver.for_file_list(paths.as_slice(), &options).await,
        ),
        Command::Url { urls } => (urls.clone(), resolver.for_url_list(urls.as_slice(), &options).await),
    };

    let mut failures = 0;
    for (input, result) in inputs.iter().zip(results) {
        match result {
            Ok(report) => match report.detection {
                Some(ref detection) => println!("{}: {} {}", input, report.verdict, detection),
                None => println!("{}: {}", input, report.verdict),
            },
            Err(e) => {
                failures += 1;
                println!("{}: error: {}", input, e);
            }
        }
    }

    if let Err(e) = resolver.close().await {
        debug!("Close failed: {}", e);
    }

    if failures > 0 {
        error!("{} of {} lookups failed", failures, inputs.len());
        std::process::exit(1);
    }
    Ok(())
}
