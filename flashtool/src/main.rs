// Licensed under the Apache-2.0 license

//! Host front end for the droidboot flashing engine.
//!
//! ```bash
//! flashtool --config board.toml show
//! flashtool versions ifwi.bin
//! flashtool write --entry boot boot.img
//! flashtool ifwi --loader dnx.bin --reset ifwi.bin
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use droidboot::platform::{IpcChannel, Platform};
use droidboot::slot::SlotSelector;
use droidboot::storage::FileStorage;
use droidboot::version::SysfsFirmwareInfo;
use droidboot::{Droidboot, DroidbootConfig, ErrorKind, FlashError, Request};
use fw_version::FirmwareVersions;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const KERNEL_VERSION: &str = "/proc/version";

#[derive(Parser, Debug)]
#[command(version, about = "OSIP image flashing and IFWI update tool", long_about = None)]
struct Cli {
    /// TOML file overriding the default device paths
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Dump the OSIP, the running firmware versions and the kernel version
    Show,
    /// Dump the firmware versions embedded in an IFWI image
    Versions { file: PathBuf },
    /// Copy the contents of an OSIP slot to a file
    Read {
        #[arg(long)]
        entry: String,
        file: PathBuf,
    },
    /// Write a file into an OSIP slot
    Write {
        #[arg(long)]
        entry: String,
        file: PathBuf,
    },
    /// Stage a DnX loader and update the IFWI
    Ifwi {
        #[arg(long)]
        loader: PathBuf,
        /// Reset the platform once the update is accepted
        #[arg(long, default_value_t = false)]
        reset: bool,
        file: PathBuf,
    },
}

/// Process exit code for a failed operation.
fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::IoFailure => 2,
        ErrorKind::CorruptIndex => 3,
        ErrorKind::NotFound => 4,
        ErrorKind::OversizeImage => 5,
        ErrorKind::ParseError => 6,
        ErrorKind::PrerequisiteMissing => 7,
        ErrorKind::IncompatibleVersion => 8,
        ErrorKind::DuplicateCommand | ErrorKind::UnknownCommand => 9,
        ErrorKind::InvalidArgument => 10,
    }
}

fn load_config(path: Option<&Path>) -> Result<DroidbootConfig> {
    match path {
        Some(path) => DroidbootConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(DroidbootConfig::default()),
    }
}

fn open(config: DroidbootConfig) -> Result<Droidboot> {
    let storage = FileStorage::open(&config.osip_device)
        .with_context(|| format!("cannot open {}", config.osip_device.display()))?;
    let platform = Platform::new(
        Box::new(storage),
        Box::new(SysfsFirmwareInfo::new(config.fw_info.clone())),
        Box::new(IpcChannel::new(config.ipc_device.clone())),
    );
    Ok(Droidboot::new(config, platform)?)
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("cannot read {}", path.display()))
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command.unwrap_or(Commands::Show) {
        Commands::Show => {
            let mut droidboot = open(config)?;
            print!("{}", droidboot.startup_report());
            match fs::read_to_string(KERNEL_VERSION) {
                Ok(version) => println!("Kernel: {}", version.trim_end()),
                Err(e) => error!("Can't read kernel version: {e}"),
            }
        }
        Commands::Versions { file } => {
            let image = read_input(&file)?;
            let versions = FirmwareVersions::from_image(&image).map_err(FlashError::from)?;
            print!("{versions}");
        }
        Commands::Read { entry, file } => {
            let mut droidboot = open(config)?;
            let mut writer = droidboot.device().image_writer();
            let index = SlotSelector::Name(&entry).resolve(&writer.read_index()?)?;
            let data = writer.read(index)?;
            fs::write(&file, &data)
                .with_context(|| format!("cannot write {}", file.display()))?;
            info!("Read {} bytes from slot {index} '{entry}'", data.len());
        }
        Commands::Write { entry, file } => {
            let image = read_input(&file)?;
            let mut droidboot = open(config)?;
            let index = droidboot
                .device()
                .image_writer()
                .write_selected(SlotSelector::Name(&entry), &image)?;
            info!("Wrote {} bytes to slot {index} '{entry}'", image.len());
        }
        Commands::Ifwi {
            loader,
            reset,
            file,
        } => {
            let loader = read_input(&loader)?;
            let image = read_input(&file)?;
            if image.is_empty() {
                bail!("{} is empty", file.display());
            }
            let mut droidboot = open(config)?;
            droidboot.dispatch("flash dnx", &Request::payload(&loader))?;
            droidboot.device().update_ifwi(&image, reset)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("logger setup failed: {e}");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            let code = e
                .downcast_ref::<FlashError>()
                .map(|f| exit_code(f.kind()))
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}
