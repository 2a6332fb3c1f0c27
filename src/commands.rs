use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use crate::{
    config::AppConfig,
    context::Context,
    copy::Robocopy,
    dism::{read_images, Dism},
    download::HttpDownloader,
    error::Result,
    iso::PowerShellDiskImage,
    logging::init_tracing,
    models::Channel,
    payload::{acquire_and_extract, DriverPayload, ExtractedPayload, VirtioWinPayload},
    pipeline::add_virtio_drivers,
    repack::{repack_iso, Oscdimg, RepackRequest, RepackTools},
    temp::WorkDir,
};

#[derive(Debug, Parser)]
#[command(name = "winiso-virtio", version, about = "Repackage Windows setup ISOs with VirtIO drivers")]
pub struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the images inside a WIM file.
    ListImages { wim: PathBuf },
    /// Inject VirtIO drivers into boot.wim and install.wim of an extracted ISO tree.
    AddDrivers {
        root: PathBuf,
        #[arg(long, value_enum)]
        channel: Option<Channel>,
        /// Use an already extracted virtio-win tree instead of downloading.
        #[arg(long)]
        payload: Option<PathBuf>,
        #[arg(long)]
        keep_work_dir: bool,
    },
    /// Download and extract the virtio-win driver tree.
    FetchDrivers {
        #[arg(long, value_enum)]
        channel: Option<Channel>,
        /// Directory to extract into; defaults to the work directory.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Rebuild a setup ISO with an answer file, OEM payload and drivers.
    Repack {
        #[arg(long)]
        source: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        answer_file: Option<PathBuf>,
        #[arg(long)]
        oem_dir: Option<PathBuf>,
        /// Driver channel to inject; omit to skip driver injection.
        #[arg(long, value_enum)]
        virtio: Option<Channel>,
        #[arg(long)]
        keep_work_dir: bool,
    },
    /// Report whether the process runs elevated.
    CheckAdmin,
}

pub fn check_admin() -> bool {
    #[cfg(windows)]
    {
        is_elevated::is_elevated()
    }
    #[cfg(not(windows))]
    {
        true
    }
}

pub fn execute(cli: Cli) -> Result<()> {
    let config = AppConfig::load_or_default(cli.config.as_deref())?;
    let paths = config.paths();
    paths.ensure_layout()?;
    let _guard = init_tracing(paths.log_dir(), cli.verbose)?;

    let ctx = Context::from_config(&config, paths, check_admin()).with_ops_log()?;
    info!(
        "run {} (elevated: {}, data: {})",
        ctx.run_token,
        ctx.elevated,
        ctx.paths.root().display()
    );

    let result = dispatch(&ctx, &config, cli.command);
    if let Err(err) = &result {
        error!("{err}");
    }
    result
}

fn dispatch(ctx: &Context, config: &AppConfig, command: Command) -> Result<()> {
    let dism = Dism::new(&ctx.dism);
    let robocopy = Robocopy::new(&ctx.robocopy, ctx.copy_retries);
    let mounter = PowerShellDiskImage::new(&ctx.powershell);
    let downloader = HttpDownloader::default();

    match command {
        Command::ListImages { wim } => {
            for image in read_images(&dism, &wim)? {
                println!("{}\t{}\t{}", image.index, image.architecture, image.name);
            }
        }
        Command::AddDrivers {
            root,
            channel,
            payload,
            keep_work_dir,
        } => {
            let work = WorkDir::create(
                ctx.work_dir(),
                &format!("run-{}", ctx.run_token),
                keep_work_dir || ctx.keep_work_dir,
            )?;
            let extracted;
            let virtio;
            let source: &dyn DriverPayload = match payload {
                Some(dir) => {
                    extracted = ExtractedPayload::new(dir);
                    &extracted
                }
                None => {
                    virtio = VirtioWinPayload {
                        ctx,
                        downloader: &downloader,
                        mounter: &mounter,
                        copier: &robocopy,
                        work_dir: work.path().to_path_buf(),
                    };
                    &virtio
                }
            };
            let report = add_virtio_drivers(
                ctx,
                &dism,
                source,
                &root,
                channel.unwrap_or(config.channel),
            )?;
            for outcome in &report.images {
                println!(
                    "{}\t{}\tWindows {}\t{} driver(s)",
                    outcome.plan.record.kind,
                    outcome.plan.record.index(),
                    outcome.plan.version,
                    outcome.summary.drivers_added.len()
                );
            }
            for skipped in &report.skipped {
                println!("skipped\t{}\t{:?}", skipped.path.display(), skipped.reason);
            }
        }
        Command::FetchDrivers { channel, output } => {
            let target = output.unwrap_or_else(|| ctx.work_dir().to_path_buf());
            let mut progress = crate::download::log_progress();
            let root = acquire_and_extract(
                ctx,
                &downloader,
                &mounter,
                &robocopy,
                channel.unwrap_or(config.channel),
                &target,
                &mut progress,
            )?;
            println!("{}", root.display());
        }
        Command::Repack {
            source,
            output,
            answer_file,
            oem_dir,
            virtio,
            keep_work_dir,
        } => {
            let work = WorkDir::create(
                ctx.work_dir(),
                &format!("run-{}", ctx.run_token),
                keep_work_dir || ctx.keep_work_dir,
            )?;
            let author = Oscdimg::new(&ctx.oscdimg);
            let payload = VirtioWinPayload {
                ctx,
                downloader: &downloader,
                mounter: &mounter,
                copier: &robocopy,
                work_dir: work.path().to_path_buf(),
            };
            let tools = RepackTools {
                imaging: &dism,
                mounter: &mounter,
                copier: &robocopy,
                author: &author,
                payload: &payload,
            };
            let request = RepackRequest {
                source_iso: source,
                output_iso: output,
                answer_file,
                oem_dir,
                virtio,
            };
            let written = repack_iso(ctx, &tools, &request, work.path())?;
            println!("{}", written.display());
        }
        Command::CheckAdmin => {
            println!("{}", ctx.elevated);
        }
    }
    Ok(())
}
