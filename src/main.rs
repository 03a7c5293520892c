use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;

use wa_datefix::chat_index::ChatIndex;
use wa_datefix::config::{Settings, DEFAULT_EXPORT_DIR, DEFAULT_MEDIA_ROOT, DEFAULT_SCRATCH_DIR};
use wa_datefix::export::{find_database, ChatExporter};
use wa_datefix::file_ops::ScratchDir;
use wa_datefix::remediate::{FileOutcome, RunReport};
use wa_datefix::{Adb, CancelToken, DeviceBridge, Error, MediaKind, MediaPatcher, Remediator};

#[derive(Parser)]
#[command(name = "wa-datefix")]
#[command(version)]
#[command(about = "Restore the dates of WhatsApp media on an Android device")]
#[command(long_about = "Restores the file dates and EXIF/container dates of WhatsApp images and videos on a connected Android device.

With a KEY the WhatsApp database is pulled, decrypted and exported, and every
file gets the timestamp of the message it was sent with. Files without a chat
record (and every file when no KEY is given) are dated from their name
(IMG-YYYYMMDD-WA<n>.jpg, VID-YYYYMMDD-WA<n>.mp4) at 12:00 local time.")]
struct Cli {
    /// 64-digit hex key of the encrypted WhatsApp backup
    key: Option<String>,

    /// Media kinds to process (image, video); repeatable
    #[arg(long = "kind", value_name = "KIND")]
    kinds: Vec<MediaKind>,

    /// WhatsApp folder on the device
    #[arg(long, default_value = DEFAULT_MEDIA_ROOT)]
    media_root: String,

    /// Directory the backup is pulled to and the exporter runs in
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,

    /// Directory holding the exported chat JSON documents (default: <work-dir>/result)
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Local directory for working copies
    #[arg(long, default_value = DEFAULT_SCRATCH_DIR)]
    scratch_dir: PathBuf,

    /// Reuse the backup already present in the work directory
    #[arg(long)]
    skip_pull: bool,

    #[arg(long, default_value = "adb")]
    adb: PathBuf,

    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    #[arg(long, default_value = "ffprobe")]
    ffprobe: PathBuf,

    #[arg(long, default_value = "wtsexporter")]
    exporter: PathBuf,

    /// Hide progress bars
    #[arg(long)]
    no_progress: bool,

    /// Increase verbosity (-v=INFO, -vv=DEBUG, -vvv=TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            media_root: self.media_root.clone(),
            work_dir: self.work_dir.clone(),
            export_dir: self
                .export_dir
                .clone()
                .unwrap_or_else(|| self.work_dir.join(DEFAULT_EXPORT_DIR)),
            scratch_dir: self.scratch_dir.clone(),
            adb: self.adb.clone(),
            ffmpeg: self.ffmpeg.clone(),
            ffprobe: self.ffprobe.clone(),
            exporter: self.exporter.clone(),
            show_progress: !self.no_progress,
        }
    }

    fn kinds(&self) -> Vec<MediaKind> {
        if self.kinds.is_empty() {
            MediaKind::ALL.to_vec()
        } else {
            MediaKind::ALL
                .into_iter()
                .filter(|kind| self.kinds.contains(kind))
                .collect()
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose)?;

    let settings = cli.settings();
    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone())?;

    let adb = Adb::new(&settings.adb);
    println!("Connect your device...");
    adb.wait_for_device().context("Device did not become available")?;

    if let Some(key) = &cli.key {
        export_chats(&adb, &settings, key, cli.skip_pull)?;
    }

    println!("\n\nStarting...");
    let mut report = RunReport::default();
    let mut interrupted = false;

    for kind in cli.kinds() {
        let index = load_index(&settings, kind, cli.key.is_some())?;
        let patcher = MediaPatcher::from_settings(kind, &settings);
        let remediator = Remediator::new(&adb, patcher, kind, &settings).with_cancel(cancel.clone());

        let results = if cli.key.is_some() {
            remediator.run_all(&index).map(|r| r.results)
        } else {
            remediator.run_from_filename(&index)
        };

        match results {
            Ok(results) => report.extend(results),
            Err(Error::Cancelled) => {
                interrupted = true;
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    ScratchDir::new(&settings.scratch_dir).clear();
    print_summary(&report);

    if interrupted {
        anyhow::bail!("Interrupted by user");
    }
    println!("The ADB process has finished. You may disconnect your device now");
    Ok(())
}

fn setup_logging(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    Ok(())
}

/// First Ctrl-C requests a cooperative stop, a second one exits immediately
fn install_interrupt_handler(cancel: CancelToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;

    std::thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    if cancel.is_cancelled() {
                        eprintln!("\nInterrupted twice, exiting");
                        std::process::exit(130);
                    }
                    warn!("Interrupt received, stopping after the current file");
                    cancel.cancel();
                }
            })
        })
        .context("Failed to spawn interrupt listener")?;

    Ok(())
}

fn export_chats(adb: &Adb, settings: &Settings, key: &str, skip_pull: bool) -> Result<()> {
    if !skip_pull {
        info!("Pulling {} into {}", settings.media_root, settings.work_dir.display());
        adb.pull(&settings.media_root, &settings.work_dir)
            .context("Failed to pull the WhatsApp folder")?;
    }

    let backup_dir = settings.backup_dir();
    let database = find_database(&backup_dir).with_context(|| {
        format!("No WhatsApp database found under {}", backup_dir.display())
    })?;

    let exporter = ChatExporter::new(&settings.exporter, &settings.work_dir);
    let documents = exporter.export(key, &database, &settings.export_dir)?;
    info!("Exported {} chats", documents);
    Ok(())
}

fn load_index(settings: &Settings, kind: MediaKind, required: bool) -> Result<ChatIndex> {
    if required || settings.export_dir.is_dir() {
        ChatIndex::load(&settings.export_dir, kind).with_context(|| {
            format!("Failed to load chat export from {}", settings.export_dir.display())
        })
    } else {
        Ok(ChatIndex::empty(kind))
    }
}

fn print_summary(report: &RunReport) {
    let applied = report.count(|o| *o == FileOutcome::Applied);
    let not_found = report.count(|o| *o == FileOutcome::NotFound);
    let already_correct = report.count(|o| *o == FileOutcome::AlreadyCorrect);
    let skipped = report.count(|o| matches!(o, FileOutcome::Skipped(_)));
    let failures: Vec<_> = report.failures().collect();

    println!("\nProcessing complete!");
    println!("Files updated: {}", applied);
    println!("Files already correct: {}", already_correct);
    println!("Files not found on device: {}", not_found);
    println!("Files skipped: {}", skipped);
    println!("Errors: {}", failures.len());

    if !failures.is_empty() {
        println!("\nErrors:");
        for result in failures {
            let error = match &result.outcome {
                FileOutcome::PatchFailed { error } => format!("metadata not changed: {}", error),
                FileOutcome::Failed { error } => error.clone(),
                _ => "Unknown error".to_string(),
            };
            println!("  {}: {}", result.file_name, error);
        }
    }
}
