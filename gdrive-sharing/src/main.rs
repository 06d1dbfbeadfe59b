use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use gdrive_sharing::config::EnvConfig;
use gdrive_sharing::desired::DesiredState;
use gdrive_sharing::orchestrator::Orchestrator;
use gdrive_sharing::{auth, logging};
use tracing::error;

/// Share every file and folder below a Drive folder with exactly the given
/// collaborators.
#[derive(Debug, Parser)]
#[command(name = "gdrive-sharing", version)]
struct Cli {
    /// Name of the root folder [default: GDRIVE_DEFAULT_FOLDER or "WE Bots"]
    folder: Option<String>,

    /// Email addresses that should have access; anyone else loses it
    #[arg(short = 'c', long = "collaborators", num_args = 1.., value_name = "EMAIL")]
    collaborators: Vec<String>,

    /// Replace objects owned by others with copies owned by you
    #[arg(short = 't', long)]
    take_ownership: bool,

    /// Remove "anyone with the link" access
    #[arg(short = 'l', long)]
    disable_links: bool,

    /// Report what would change without changing anything
    #[arg(long = "what-if", visible_alias = "dry-run")]
    what_if: bool,

    /// Remove saved credentials and exit
    #[arg(long, exclusive = true)]
    logout: bool,
}

impl Cli {
    fn desired_state(&self) -> DesiredState {
        DesiredState::new(&self.collaborators)
            .take_ownership(self.take_ownership)
            .disable_links(self.disable_links)
            .dry_run(self.what_if)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    if let Err(err) = logging::init() {
        eprintln!("failed to initialize logging: {err}");
    }
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.logout {
        return auth::logout();
    }
    let config = EnvConfig::from_env();
    let folder = cli
        .folder
        .clone()
        .unwrap_or_else(|| config.default_folder.clone());
    let desired = cli.desired_state();

    let client = auth::connect(&config.auth).await?;
    let orchestrator = Orchestrator::bootstrap(&client, &folder, desired, config.engine).await?;
    orchestrator
        .run()
        .await
        .context("failed to list objects in scope")?;
    Ok(())
}
