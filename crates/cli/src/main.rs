use std::io::BufRead;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use crossbeam_channel::Sender;

use facewatch_core::alerting::alert_dispatcher::AlertDispatcher;
use facewatch_core::alerting::domain::alert_sink::AlertSink;
use facewatch_core::alerting::infrastructure::fanout_alert_sink::FanoutAlertSink;
use facewatch_core::alerting::infrastructure::http_alert_sink::HttpAlertSink;
use facewatch_core::alerting::infrastructure::log_alert_sink::LogAlertSink;
use facewatch_core::detection::domain::detection_candidate::CropPolicy;
use facewatch_core::detection::domain::face_locator::FaceLocator;
use facewatch_core::detection::infrastructure::onnx_face_locator::{
    OnnxFaceLocator, DEFAULT_FACE_CONFIDENCE,
};
use facewatch_core::detection::infrastructure::onnx_person_detector::OnnxPersonDetector;
use facewatch_core::fleet::camera_stream_worker::WorkerSettings;
use facewatch_core::fleet::fleet_manager::FleetManager;
use facewatch_core::fleet::infrastructure::http_fleet_source::HttpFleetSource;
use facewatch_core::pipeline::frame_pipeline::FramePipeline;
use facewatch_core::recognition::domain::face_embedder::FaceEmbedder;
use facewatch_core::recognition::face_registry::{FaceRegistry, LoadOutcome};
use facewatch_core::recognition::identity_matcher::IdentityMatcher;
use facewatch_core::recognition::infrastructure::http_identity_source::HttpIdentitySource;
use facewatch_core::recognition::infrastructure::local_directory_source::LocalDirectoryIdentitySource;
use facewatch_core::recognition::infrastructure::onnx_face_embedder::OnnxFaceEmbedder;
use facewatch_core::shared::backend_client::BackendClient;
use facewatch_core::shared::config::SurveillanceConfig;
use facewatch_core::shared::constants::{
    BACKEND_ENCODING_DIMENSION, EMBEDDING_MODEL, FACE_MODEL, PERSON_MODEL,
};
use facewatch_core::shared::model_resolver::ModelResolver;
use facewatch_core::supervisor::{Supervisor, SupervisorCommand};
use facewatch_core::video::infrastructure::ffmpeg_stream_source::FfmpegSourceFactory;

/// Watches every active camera for sought persons and raises alerts.
#[derive(Parser)]
#[command(name = "facewatch")]
struct Cli {
    /// JSON configuration file; missing fields use defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Backend base URL (cameras, persons, recognition endpoints).
    #[arg(long)]
    backend_url: Option<String>,

    /// Person detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Maximum embedding distance accepted as a match.
    #[arg(long)]
    match_threshold: Option<f64>,

    /// Run detection every Nth frame.
    #[arg(long)]
    stride: Option<u64>,

    /// Seconds between alerts for the same person on the same camera.
    #[arg(long)]
    cooldown: Option<u64>,

    /// Directory of reference photos used when the backend registry is down.
    #[arg(long)]
    local_registry: Option<PathBuf>,

    /// Directory holding the ONNX models (checked before the cache).
    #[arg(long)]
    models_dir: Option<PathBuf>,
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
    let config = load_config(&cli)?;
    for warning in config.warnings() {
        log::warn!("Config: {warning}");
    }
    let models = ModelResolver::new(cli.models_dir.clone())?;
    let person_model = models.resolve(PERSON_MODEL)?;
    let face_model = models.resolve(FACE_MODEL)?;
    let embedding_model = models.resolve(EMBEDDING_MODEL)?;

    let detector = Arc::new(OnnxPersonDetector::new(
        &person_model,
        config.detection_confidence,
        CropPolicy::new(config.min_crop_width, config.min_crop_height),
    )?);
    let locator: Arc<dyn FaceLocator> =
        Arc::new(OnnxFaceLocator::new(&face_model, DEFAULT_FACE_CONFIDENCE)?);
    let embedder: Arc<dyn FaceEmbedder> = Arc::new(OnnxFaceEmbedder::new(
        &embedding_model,
        config.embedding_dimension,
    )?);

    let client = BackendClient::new(&config.backend_url, config.http_timeout())?;
    log::info!("Backend: {}", client.base_url());

    let mut registry = FaceRegistry::new(
        Arc::new(HttpIdentitySource::new(
            client.clone(),
            config.identity_status.clone(),
            config.identity_limit,
        )),
        config.embedding_dimension,
        config.registry_refresh_interval(),
    );
    if let Some(dir) = &config.local_registry_dir {
        registry = registry.with_fallback(Arc::new(LocalDirectoryIdentitySource::new(
            dir.clone(),
            Arc::clone(&locator),
            Arc::clone(&embedder),
        )));
    }
    let registry = Arc::new(registry);
    if let LoadOutcome::Rejected(mismatch) = registry.load() {
        return Err(format!(
            "identity registry does not fit the {}-d embedder: {mismatch}",
            config.embedding_dimension
        )
        .into());
    }

    let matcher = IdentityMatcher::new(
        locator,
        embedder,
        Arc::clone(&registry),
        config.match_threshold,
        config.distance_metric,
    )?;

    let mut sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(LogAlertSink::new())];
    let http_sink = HttpAlertSink::new(client.clone(), BACKEND_ENCODING_DIMENSION);
    if http_sink.accepts(config.embedding_dimension) {
        sinks.push(Arc::new(http_sink));
    } else {
        log::warn!(
            "Backend takes {BACKEND_ENCODING_DIMENSION}-d encodings but the embedder produces {}-d; alerts are logged only",
            config.embedding_dimension
        );
    }
    let dispatcher = AlertDispatcher::new(
        Arc::new(FanoutAlertSink::new(sinks)),
        config.alert_cooldown(),
    );
    let pipeline = FramePipeline::new(detector, Arc::new(matcher), Arc::new(dispatcher));

    let fleet_source = Arc::new(HttpFleetSource::new(client, config.skip_local_devices));
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let fleet = FleetManager::new(
        fleet_source.clone(),
        Arc::new(FfmpegSourceFactory::new(config.frame_timeout())),
        pipeline,
        WorkerSettings::from(&config),
        config.stop_timeout(),
        event_tx,
    );

    let (command_tx, command_rx) = crossbeam_channel::unbounded();
    spawn_stdin_commands(command_tx);

    log::info!(
        "Watching fleet (stride {}, threshold {}, cooldown {}s). Commands: refresh, reconcile, quit",
        config.sampling_stride,
        config.match_threshold,
        config.alert_cooldown_secs
    );
    Supervisor::new(
        registry,
        fleet,
        fleet_source,
        event_rx,
        command_rx,
        config.fleet_refresh_interval(),
    )
    .run();
    Ok(())
}

fn load_config(cli: &Cli) -> Result<SurveillanceConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => SurveillanceConfig::load(path)?,
        None => SurveillanceConfig::default(),
    };
    if let Some(url) = &cli.backend_url {
        config.backend_url = url.clone();
    }
    if let Some(confidence) = cli.confidence {
        config.detection_confidence = confidence;
    }
    if let Some(threshold) = cli.match_threshold {
        config.match_threshold = threshold;
    }
    if let Some(stride) = cli.stride {
        config.sampling_stride = stride;
    }
    if let Some(cooldown) = cli.cooldown {
        config.alert_cooldown_secs = cooldown;
    }
    if let Some(dir) = &cli.local_registry {
        config.local_registry_dir = Some(dir.clone());
    }
    config.validate()?;
    Ok(config)
}

/// Forwards `refresh` / `reconcile` / `quit` lines from stdin.
fn spawn_stdin_commands(commands: Sender<SupervisorCommand>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let command = match line.trim() {
                "refresh" | "r" => SupervisorCommand::RefreshRegistry,
                "reconcile" | "c" => SupervisorCommand::Reconcile,
                "quit" | "q" | "exit" => SupervisorCommand::Shutdown,
                "" => continue,
                other => {
                    eprintln!("Unknown command '{other}' (refresh, reconcile, quit)");
                    continue;
                }
            };
            let quit = command == SupervisorCommand::Shutdown;
            if commands.send(command).is_err() || quit {
                break;
            }
        }
    });
}
