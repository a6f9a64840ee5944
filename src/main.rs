//! Mirror Deck - multi-device screen mirroring session manager
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use mdeck_app::config::{load_default_settings, load_settings};
use mdeck_core::DeviceId;
use mirror_deck::WatchOptions;

/// Mirror Deck - mirror Android devices and track installs/pushes
#[derive(Parser, Debug)]
#[command(name = "mdeck")]
#[command(about = "Multi-device screen mirroring session manager", long_about = None)]
struct Args {
    /// Path to config.toml (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List connected devices
    Devices,

    /// Watch for devices and report events as NDJSON until Ctrl-C
    Watch {
        /// Show desktop notifications for completed installs and pushes
        #[arg(long)]
        notify: bool,
    },

    /// Mirror the given devices as soon as they are connected
    Mirror {
        /// Device serials (as listed by `mdeck devices`)
        #[arg(required = true, value_name = "SERIAL")]
        serials: Vec<String>,

        /// Show desktop notifications for completed installs and pushes
        #[arg(long)]
        notify: bool,

        /// Extra arguments passed to scrcpy
        #[arg(last = true, value_name = "SCRCPY_ARGS")]
        scrcpy_args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    mdeck_core::logging::init()?;

    let args = Args::parse();
    let settings = match &args.config {
        Some(path) => load_settings(path),
        None => load_default_settings(),
    };

    match args.command {
        Command::Devices => mirror_deck::run_devices(&settings).await?,
        Command::Watch { notify } => {
            let options = WatchOptions {
                notify,
                ..WatchOptions::default()
            };
            mirror_deck::run_headless(settings, options).await?
        }
        Command::Mirror {
            serials,
            notify,
            scrcpy_args,
        } => {
            let options = WatchOptions {
                notify,
                mirror: serials.into_iter().map(DeviceId::from).collect(),
                mirror_args: scrcpy_args,
            };
            mirror_deck::run_headless(settings, options).await?
        }
    }

    Ok(())
}
