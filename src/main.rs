use clap::Parser;
use log::{info, warn};

use ballot_tally::MemoryBallotStore;

mod args;
mod ingest;
mod reference;
mod reports;

use crate::args::Args;
use crate::ingest::fetch::HttpArtifactFetcher;
use crate::ingest::IngestResult;

fn main() {
    let args = Args::parse();
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
            .init();
    } else {
        env_logger::init();
    }

    if let Err(e) = run(&args) {
        eprintln!("An error occured: {}", e);
        if e.is_retryable() {
            eprintln!("The artifact fetch may be retried.");
        }
        std::process::exit(1);
    }
}

fn run(args: &Args) -> IngestResult<()> {
    let reference = reference::load_reference_store(&args.reference)?;
    let mut ballots = MemoryBallotStore::new();
    let fetcher = HttpArtifactFetcher::default();

    for uri in &args.ingest {
        // Ingestion errors surface verbatim, with every validation message.
        let ballot = ingest::ingest_from_uri(uri, &fetcher, &mut ballots, &reference)?;
        info!(
            "Registered ballot {} for table {} ({} total votes)",
            ballot.id, ballot.table_code, ballot.votes.total_votes
        );
    }

    if let Some(report_name) = &args.report {
        let report = reports::run_report(report_name, &ballots, &reference, args)?;
        let pretty = match serde_json::to_string_pretty(&report) {
            Ok(s) => s,
            Err(e) => snafu::whatever!("Error rendering report: {}", e),
        };
        match args.out.as_deref() {
            None | Some("stdout") => println!("{}", pretty),
            Some(path) => {
                if let Err(e) = std::fs::write(path, &pretty) {
                    snafu::whatever!("Error writing report to {}: {}", path, e);
                }
                info!("Report written to {}", path);
            }
        }
        if let Some(check_path) = &args.check {
            reports::check_against_reference(&report, check_path)?;
            info!("Report matches the reference document");
        }
    } else if args.ingest.is_empty() {
        warn!("Nothing to do: no artifacts to ingest and no report requested");
    }

    Ok(())
}
