mod cmd;
mod kubeconfig;
mod output;

use clap::Parser;
use colored::Colorize;
use kpb_core::PlaybookError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "kpb",
    about = "Roll out kustomize components in order, gated by cluster conditions",
    version
)]
struct Cli {
    /// Directory containing kustomizationplaybook.yaml
    directory: PathBuf,

    /// Path to the kubeconfig file (default: ~/.kube/config)
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use instead of the current one
    #[arg(long)]
    context: Option<String>,

    /// dotenv file with variables for components with `envsubst: true`
    #[arg(long)]
    envfile: Option<PathBuf>,

    /// Name of a node that must exist in the target cluster
    #[arg(long = "known-node", alias = "knownNode")]
    known_node: Option<String>,

    /// Load, validate and substitute, then print the kustomizations without
    /// touching the cluster
    #[arg(long)]
    dry_run: bool,

    /// Output as JSON lines
    #[arg(long, short = 'j')]
    json: bool,

    /// Debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let options = cmd::run::Options {
        directory: cli.directory,
        kubeconfig: cli.kubeconfig,
        context: cli.context,
        envfile: cli.envfile,
        known_node: cli.known_node,
        dry_run: cli.dry_run,
        format: if cli.json {
            output::Format::Json
        } else {
            output::Format::Text
        },
    };

    if let Err(e) = cmd::run::run(options) {
        std::process::exit(report(&e));
    }
}

/// Print `err` and return the exit code: 1 for known errors, 2 otherwise.
fn report(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<PlaybookError>() {
        Some(PlaybookError::Validation(errors)) => {
            for e in errors {
                eprintln!("{}", e.to_string().red());
            }
            1
        }
        Some(known) if known.is_known() => {
            eprintln!("{}", known.to_string().red());
            1
        }
        _ => {
            // Full chain via anyhow's alternate Display
            eprintln!("error: {err:#}");
            2
        }
    }
}
