use std::sync::Arc;

use clap::Parser;
use reelsmith_db::StatusStore;
use reelsmith_pipeline::{ArtifactStore, BaseOutcome, DiskArtifactStore};
use reelsmith_worker::clean::{clean_base, CleanOutcome};
use reelsmith_worker::cli::{Cli, Command};
use reelsmith_worker::config::WorkerConfig;
use reelsmith_worker::run::run_command;
use reelsmith_worker::status::render_status;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reelsmith_worker=info,reelsmith_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = WorkerConfig::from_env()?;
    if let Some(manifest) = cli.manifest {
        config.manifest = manifest;
    }

    match cli.command {
        Command::Run(args) => {
            let summary = run_command(&config, args).await?;
            if summary.is_empty() {
                println!("Nothing to do.");
                return Ok(());
            }
            for (base, outcome) in &summary.outcomes {
                match outcome {
                    BaseOutcome::Done { total } => println!("{base}: done ({total} scenes)"),
                    BaseOutcome::Partial {
                        missing,
                        high_water,
                    } => println!("{base}: {missing} scenes missing (up to {high_water:03})"),
                    BaseOutcome::Failed(reason) => println!("{base}: error: {reason}"),
                }
            }
            for (base, error) in &summary.failed {
                println!("{base}: aborted: {error}");
            }
            println!("All selected bases processed.\x07");
        }
        Command::Status => {
            let store = StatusStore::new(&config.manifest);
            for line in render_status(&store.load().await?) {
                println!("{line}");
            }
        }
        Command::Clean(args) => {
            let store = StatusStore::new(&config.manifest);
            let artifacts: Arc<dyn ArtifactStore> = Arc::new(DiskArtifactStore::new(
                &config.images_root,
                &config.artifact_extension,
                reelsmith_core::naming::MAX_VARIANTS,
            ));
            let outcome = clean_base(
                &store,
                artifacts.as_ref(),
                &config.suggestions_root,
                &args.base,
                args.force,
            )
            .await?;
            match outcome {
                CleanOutcome::Removed => println!("{}: removed", args.base),
                CleanOutcome::Refused { video } => {
                    anyhow::bail!("{}: video is {video}; use --force to remove anyway", args.base)
                }
                CleanOutcome::UnknownBase => anyhow::bail!("{}: no such base", args.base),
            }
        }
    }
    Ok(())
}
