use std::{fs::File, io::BufReader, path::PathBuf, process::ExitCode};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::{
    bsky::{dry_run::DryRun, BskyClient, Destination},
    config::Config,
    media::{HttpFetcher, MediaResolver},
    publish::Publisher,
    sources::{mastodon::MastodonClient, read_batch, SourceItem},
};

mod bsky;
mod chunk;
mod config;
mod dedup;
mod limits;
mod media;
mod publish;
mod sources;
#[cfg(test)]
mod testing;
mod thread;

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to configuration file.
    #[arg(long, default_value = ".skyrelay.yml")]
    config: PathBuf,

    /// Read the batch from a file instead of the origin account.
    /// `.json` holds structured items, anything else legacy framing.
    #[arg(long)]
    batch: Option<PathBuf>,

    /// Resolve media and log posts, but write nothing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("skyrelay=info")),
        )
        .init();

    let Args {
        config,
        batch,
        dry_run,
    } = Args::parse();

    let cfg: Config = {
        let file = match File::open(&config) {
            Ok(f) => BufReader::new(f),
            Err(e) => {
                error!(path = %config.display(), "failed to open config: {e}");
                return ExitCode::FAILURE;
            }
        };

        match serde_yaml::from_reader(file) {
            Ok(v) => v,
            Err(e) => {
                error!(path = %config.display(), "failed to parse config: {e}");
                return ExitCode::FAILURE;
            }
        }
    };
    let dry_run = dry_run || cfg.dry_run;

    let items: Vec<SourceItem> = match batch {
        Some(path) => match read_batch(&path) {
            Ok(items) => items,
            Err(e) => {
                error!(path = %path.display(), "failed to read batch: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => {
            let origin = MastodonClient::new(&cfg.origin.api_url, cfg.origin.access_token.clone());
            match origin
                .statuses(&cfg.origin.account_id, cfg.origin.limit, &cfg.normalize)
                .await
            {
                Ok(items) => items,
                Err(e) => {
                    error!("failed to fetch origin posts: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
    };
    info!(items = items.len(), dry_run, "batch loaded");

    let client = match BskyClient::login(
        &cfg.destination.service,
        &cfg.destination.video_service,
        &cfg.destination.identifier,
        &cfg.destination.password,
    )
    .await
    {
        Ok(c) => c,
        Err(e) => {
            error!(service = %cfg.destination.service, "failed to log in: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(handle = %client.session().handle, "logged in");

    let dest: Box<dyn Destination> = if dry_run {
        Box::new(DryRun::new(client))
    } else {
        Box::new(client)
    };
    let media = MediaResolver::new(HttpFetcher::new(), cfg.fallback_card_image);
    let publisher = Publisher::new(&*dest, media, cfg.langs);

    match publisher.run(&items).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("run aborted: {e}");
            ExitCode::FAILURE
        }
    }
}
