use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use interview_media::audio::{AudioFile, AudioHardware, SoftwareAudioHardware};
use interview_media::recording::AudioRecordingService;
use interview_media::room::{
    load_script, EventHandlers, LoggingSink, ReplayFactory, RoomCredentials, SessionController,
};
use interview_media::{Config, InterviewSession};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const DEFAULT_CONFIG: &str = "config/interview-media";

#[derive(Parser)]
#[command(name = "interview-media")]
#[command(about = "Interview session audio: playback, recording and room control")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scripted room session through the software audio graph
    Replay {
        /// JSON-lines event script
        #[arg(short, long)]
        script: PathBuf,

        /// WAV file mixed in as the local microphone
        #[arg(short, long)]
        mic: Option<PathBuf>,

        /// Config file (without extension is fine)
        #[arg(short, long)]
        config: Option<String>,

        /// Output directory for the recording
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Local participant identity
        #[arg(long, default_value = "candidate")]
        identity: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            script,
            mic,
            config,
            output_dir,
            identity,
        } => replay(&script, mic.as_deref(), config.as_deref(), output_dir, identity).await,
    }
}

fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path).with_context(|| format!("Failed to load config {}", path)),
        None if Path::new(&format!("{}.toml", DEFAULT_CONFIG)).exists() => Config::load(DEFAULT_CONFIG),
        None => Ok(Config::default()),
    }
}

async fn replay(
    script: &Path,
    mic: Option<&Path>,
    config: Option<&str>,
    output_dir: Option<PathBuf>,
    identity: String,
) -> Result<()> {
    let cfg = load_config(config)?;
    info!("Loaded config: {}", cfg.service.name);

    let entries = load_script(script).await?;
    info!("Loaded {} scripted events from {}", entries.len(), script.display());

    let hardware = Arc::new(SoftwareAudioHardware::new(cfg.software_config()));
    let factory = ReplayFactory::new(entries, identity).with_hardware(Arc::clone(&hardware));

    let controller = SessionController::new(
        cfg.controller_config(),
        Arc::new(factory),
        Arc::new(LoggingSink),
    );
    let audio = AudioRecordingService::new(
        Arc::clone(&hardware) as Arc<dyn AudioHardware>,
        cfg.scheduler_config(),
        cfg.recorder_config(),
    );

    let mut session_config = cfg.session_config();
    if let Some(dir) = output_dir {
        session_config.output_dir = dir;
    }

    let mut session = InterviewSession::new(session_config, controller, audio);
    if let Some(path) = mic {
        let file = AudioFile::open(path)?;
        info!(
            "Microphone file: {:.1}s at {} Hz, {} channel(s)",
            file.duration_seconds, file.sample_rate, file.channels
        );
        session = session.with_microphone(Box::new(file.into_input()));
    }

    let handlers = EventHandlers::new()
        .on_connected(|| info!("Joined replay room"))
        .on_interview_ended(|end| info!("Interview ended: {:?}", end))
        .on_error(|e| tracing::error!("Room error: {:#}", e));

    session
        .start(&RoomCredentials::new("replay://local", "replay"), handlers)
        .await?;

    let dispatched = session.run().await;
    info!("Dispatched {} room events", dispatched);

    let stats = session.stats();
    info!("Session stats: {}", serde_json::to_string_pretty(&stats)?);

    match session.finish_and_save().await? {
        Some(path) => info!("Recording saved to {}", path.display()),
        None => info!("Nothing was recorded"),
    }

    Ok(())
}
