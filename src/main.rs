//! Droidcase command line entry point
//!
//! Parses the CLI, initializes logging, and dispatches to the
//! subcommand implementations in [`droidcase::commands`].

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use droidcase::commands::{BuildCommand, DevicesCommand, PackageCommand, RunCommand};
use droidcase::project::Project;

#[derive(Parser)]
#[command(name = "droidcase")]
#[command(about = "Package, run and stream Android apps from the command line")]
#[command(version)]
struct Cli {
    /// Project directory (defaults to the working directory)
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Increase output verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the debug APK
    Build,

    /// Run the app on a device or emulator
    Run(RunArgs),

    /// Build a distributable artefact
    Package {
        /// Packaging format: aab, apk or debug-apk
        #[arg(long, default_value = "aab")]
        packaging_format: String,
    },

    /// List devices visible to ADB
    Devices,
}

#[derive(Args)]
struct RunArgs {
    /// The device to target; either a device ID for a physical device,
    /// or an AVD name ('@emulatorName')
    #[arg(short, long)]
    device: Option<String>,

    /// Additional arguments to use when starting the emulator
    #[arg(long = "Xemulator", value_name = "ARG", allow_hyphen_values = true)]
    extra_emulator_args: Vec<String>,

    /// Shutdown the emulator on exit
    #[arg(long)]
    shutdown_on_exit: bool,

    /// Forward the specified port from host to device
    #[arg(long = "forward-port", value_name = "PORT")]
    forward_ports: Vec<u16>,

    /// Reverse the specified port from device to host
    #[arg(long = "reverse-port", value_name = "PORT")]
    reverse_ports: Vec<u16>,

    /// Arguments passed through to the running app
    #[arg(last = true)]
    passthrough: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Build => {
            let project = Project::locate(cli.project.as_deref()).await?;
            BuildCommand.execute(&project).await?;
        }
        Commands::Run(args) => {
            let project = Project::locate(cli.project.as_deref()).await?;
            RunCommand {
                device: args.device,
                extra_emulator_args: args.extra_emulator_args,
                shutdown_on_exit: args.shutdown_on_exit,
                forward_ports: args.forward_ports,
                reverse_ports: args.reverse_ports,
                passthrough: args.passthrough,
            }
            .execute(&project, cancel)
            .await?;
        }
        Commands::Package { packaging_format } => {
            let project = Project::locate(cli.project.as_deref()).await?;
            PackageCommand { packaging_format }.execute(&project).await?;
        }
        Commands::Devices => {
            // Usable outside a project; the manifest only supplies an
            // optional SDK root override.
            let sdk_root = Project::locate(cli.project.as_deref())
                .await
                .ok()
                .and_then(|project| project.config.android.sdk_root.clone());
            DevicesCommand { sdk_root }.execute().await?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
