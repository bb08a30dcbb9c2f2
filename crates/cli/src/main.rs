use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use moodwatch_core::capture::domain::capture_device::CaptureDevice;
use moodwatch_core::capture::infrastructure::image_sequence_device::ImageSequenceDevice;
#[cfg(feature = "webcam")]
use moodwatch_core::capture::infrastructure::nokhwa_camera::NokhwaCamera;
use moodwatch_core::detection::infrastructure::onnx_yolo_detector::{
    OnnxYoloDetector, DEFAULT_CONFIDENCE,
};
use moodwatch_core::emotion::infrastructure::onnx_emotion_classifier::OnnxEmotionClassifier;
use moodwatch_core::persistence::domain::session_store::SessionStore;
use moodwatch_core::persistence::infrastructure::in_memory_store::InMemorySessionStore;
use moodwatch_core::persistence::infrastructure::json_file_store::JsonFileSessionStore;
use moodwatch_core::pipeline::pipeline_logger::LogPipelineLogger;
use moodwatch_core::pipeline::session_controller::{PipelineComponents, SessionController};
use moodwatch_core::rendering::infrastructure::label_annotator::LabelAnnotator;
use moodwatch_core::shared::config::PipelineConfig;
use moodwatch_core::shared::model_resolver::{
    self, ModelSpec, EMOTION_CLASSIFIER_MODEL, FACE_DETECTOR_MODEL,
};
use moodwatch_core::streaming::frame_stream::FrameStream;

/// Live face emotion capture sessions.
#[derive(Parser)]
#[command(name = "moodwatch")]
struct Cli {
    /// Replay images from this directory as the camera feed.
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Capture from the webcam with this index.
    #[cfg(feature = "webcam")]
    #[arg(long)]
    webcam: Option<u32>,

    /// Face detection model (downloaded when omitted).
    #[arg(long)]
    detector_model: Option<PathBuf>,

    /// Emotion classification model (downloaded when omitted).
    #[arg(long)]
    emotion_model: Option<PathBuf>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
    confidence: f64,

    /// Session store file (defaults to the platform data directory).
    #[arg(long)]
    store: Option<PathBuf>,

    /// Keep sessions in memory only.
    #[arg(long, conflicts_with = "store")]
    in_memory: bool,

    /// Session length in seconds.
    #[arg(long, default_value = "10")]
    duration: u64,

    /// Write the multipart MJPEG stream to this file.
    #[arg(long)]
    stream_out: Option<PathBuf>,

    /// TrueType font for labels (a system font is tried when omitted).
    #[arg(long)]
    font: Option<PathBuf>,

    /// User the session is recorded for.
    #[arg(long)]
    user_id: Option<u32>,

    /// Pipeline config JSON.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let store = open_store(&cli)?;
    let components = PipelineComponents {
        device: open_device(&cli)?,
        detector: Box::new(OnnxYoloDetector::new(
            &resolve_model(FACE_DETECTOR_MODEL, cli.detector_model.as_deref())?,
            cli.confidence,
        )?),
        classifier: Box::new(OnnxEmotionClassifier::new(&resolve_model(
            EMOTION_CLASSIFIER_MODEL,
            cli.emotion_model.as_deref(),
        )?)?),
        annotator: Box::new(build_annotator(cli.font.as_deref())?),
        logger: Box::new(LogPipelineLogger::default()),
    };
    let controller = SessionController::new(components, store.clone(), config);

    let session_id = controller.start(cli.user_id)?;
    log::info!("Session {session_id} started for {}s", cli.duration);

    let writer = match &cli.stream_out {
        Some(path) => Some(spawn_stream_writer(controller.stream_frames()?, path)?),
        None => None,
    };

    let deadline = Instant::now() + Duration::from_secs(cli.duration);
    while Instant::now() < deadline {
        thread::sleep(Duration::from_secs(1));
        let summary = controller.summary()?;
        let status = controller.status();
        log::info!(
            "Summary {} (cycle {}, {} frames dropped)",
            serde_json::to_string(&summary)?,
            status.cycles,
            status.frames_dropped
        );
    }

    let report = controller.stop();
    if let Some(writer) = writer {
        match writer.join() {
            Ok(Ok(chunks)) => log::info!("Wrote {chunks} stream chunks"),
            Ok(Err(e)) => log::warn!("Stream writer failed: {e}"),
            Err(_) => log::warn!("Stream writer panicked"),
        }
    }

    if let Some(report) = report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    let stats = store.dashboard_stats()?;
    println!(
        "Dashboard: {} sessions, {} faces, most common emotion {}",
        stats.total_sessions,
        stats.total_faces_detected,
        stats.most_common_label()
    );
    Ok(())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.confidence
        )
        .into());
    }
    if cli.duration == 0 {
        return Err("Duration must be at least one second".into());
    }
    if let Some(dir) = &cli.frames_dir {
        if !dir.is_dir() {
            return Err(format!("Frames directory not found: {}", dir.display()).into());
        }
    }
    Ok(())
}

#[cfg(feature = "webcam")]
fn open_device(cli: &Cli) -> Result<Box<dyn CaptureDevice>, Box<dyn std::error::Error>> {
    match (&cli.frames_dir, cli.webcam) {
        (Some(_), Some(_)) => Err("--frames-dir and --webcam are mutually exclusive".into()),
        (Some(dir), None) => Ok(Box::new(ImageSequenceDevice::new(dir))),
        (None, Some(index)) => Ok(Box::new(NokhwaCamera::new(index))),
        (None, None) => Err("One of --frames-dir or --webcam is required".into()),
    }
}

#[cfg(not(feature = "webcam"))]
fn open_device(cli: &Cli) -> Result<Box<dyn CaptureDevice>, Box<dyn std::error::Error>> {
    match &cli.frames_dir {
        Some(dir) => Ok(Box::new(ImageSequenceDevice::new(dir))),
        None => Err("--frames-dir is required (build with the `webcam` feature for cameras)".into()),
    }
}

fn open_store(cli: &Cli) -> Result<Arc<dyn SessionStore>, Box<dyn std::error::Error>> {
    if cli.in_memory {
        return Ok(Arc::new(InMemorySessionStore::new()));
    }
    let path = match &cli.store {
        Some(path) => path.clone(),
        None => JsonFileSessionStore::default_path().ok_or("Could not determine data directory")?,
    };
    Ok(Arc::new(JsonFileSessionStore::open(path)?))
}

fn resolve_model(
    spec: ModelSpec,
    explicit: Option<&Path>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {}", spec.name);
    let name = spec.name;
    let path = model_resolver::resolve(
        spec,
        explicit,
        None,
        Some(Box::new(move |downloaded, total| {
            download_progress(name, downloaded, total)
        })),
    )?;
    Ok(path)
}

fn build_annotator(font: Option<&Path>) -> Result<LabelAnnotator, Box<dyn std::error::Error>> {
    match font {
        Some(path) => LabelAnnotator::with_font(path),
        None => Ok(LabelAnnotator::with_system_font()),
    }
}

fn spawn_stream_writer(
    stream: FrameStream,
    path: &Path,
) -> Result<thread::JoinHandle<std::io::Result<usize>>, Box<dyn std::error::Error>> {
    let mut out = BufWriter::new(File::create(path)?);
    Ok(thread::spawn(move || -> std::io::Result<usize> {
        let mut chunks = 0;
        for chunk in stream {
            out.write_all(&chunk)?;
            chunks += 1;
        }
        out.flush()?;
        Ok(chunks)
    }))
}

fn download_progress(name: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {name}... {pct}%");
    } else {
        eprint!("\rDownloading {name}... {downloaded} bytes");
    }
    if total > 0 && downloaded >= total {
        eprintln!();
    }
}
