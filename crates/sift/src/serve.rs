//! Serve - build the engine from config and run it
//!
//! Construction order mirrors teardown: config and license first, then
//! assets and registry, then schema resolution, then the runtime. Shutdown
//! walks back out through the cancellation token.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use sift_assets::{AssetManager, AssetManagerConfig, InFlightTracker, PauseGate};
use sift_config::{
    license_accepted, Config, InputConfig, RegistryConfig, SinkConfig as SinkDriver,
};
use sift_enrich::{builtin_factories, EnrichmentConf, EnrichmentOrder, Registry, RegistryCell};
use sift_pipeline::{
    CommitSequencer, EnrichmentPipeline, MetricsReporter, PipelineConfig, Runtime, RuntimeConfig,
    RuntimeError, RuntimeMetrics, SinkSet,
};
use sift_protocol::{BadRowBuilder, Decoder, DecoderConfig};
use sift_schema::{
    DirRegistry, HttpRegistry, ResolverChain, SchemaResolver, SchemaValidator, ValidatorConfig,
};
use sift_sinks::{AttributedSink, FileSink, NullSink, RetryPolicy, RetryingSink, StdoutSink};
use sift_sources::{
    ByteRecordSource, Checkpointer, FileCheckpointer, FileSource, NoopCheckpointer,
};

/// Grace period between the first shutdown signal and a forced exit
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Outer HTTP timeout for asset downloads and schema fetches
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Why the serve loop did not end cleanly
pub enum ServeError {
    /// Configuration or construction failure; exit 1
    Startup(anyhow::Error),

    /// The runtime died; exit 2
    Runtime(RuntimeError),
}

/// Schema-resolver config file accepted via `--iglu`
#[derive(Debug, serde::Deserialize)]
struct IgluFile {
    registries: Vec<RegistryConfig>,
}

/// Load config, build everything, run to completion
pub async fn run(config_path: PathBuf, iglu_path: Option<PathBuf>) -> Result<(), ServeError> {
    let outcome = build_and_run(&config_path, iglu_path.as_deref()).await;
    match outcome {
        Ok(Ok(())) => {
            info!("Enrich stopped");
            Ok(())
        }
        Ok(Err(runtime_error)) => Err(ServeError::Runtime(runtime_error)),
        Err(startup_error) => Err(ServeError::Startup(startup_error)),
    }
}

/// Outer Result: startup failures; inner Result: runtime failures
async fn build_and_run(
    config_path: &Path,
    iglu_path: Option<&Path>,
) -> Result<Result<(), RuntimeError>> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Sift starting"
    );

    let config = Config::from_file(config_path).context("failed to load configuration")?;
    license_accepted(&config.license).context("license check failed")?;

    let http = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    // Schema resolution: config registries first, --iglu file appended.
    let validator = build_validator(&config, iglu_path, http.clone())?;

    // Registry starts empty; the asset bootstrap builds the real one and
    // opens the gate.
    let cell = Arc::new(RegistryCell::new(Arc::new(Registry::empty())));
    let gate = Arc::new(PauseGate::new());
    let in_flight = Arc::new(InFlightTracker::new());
    let factories = Arc::new(builtin_factories());

    let confs: Vec<EnrichmentConf> = config
        .enrichments
        .iter()
        .map(|entry| EnrichmentConf {
            name: entry.name.clone(),
            enabled: entry.enabled,
            parameters: entry.parameters_json(),
        })
        .collect();

    let order = if config.feature_flags.legacy_enrichment_order {
        EnrichmentOrder::Legacy
    } else {
        EnrichmentOrder::Declared
    };

    let mut manager = AssetManager::new(
        AssetManagerConfig {
            cache_dir: config.assets.cache_dir.clone(),
            update_period: config.assets.update_period_secs.map(Duration::from_secs),
            order,
        },
        confs,
        factories,
        Arc::clone(&cell),
        Arc::clone(&gate),
        Arc::clone(&in_flight),
        http.clone(),
    );
    manager
        .bootstrap()
        .await
        .context("initial asset download failed")?;

    let metrics = RuntimeMetrics::new();
    let badrow = BadRowBuilder::default();

    let pipeline = EnrichmentPipeline::new(
        Arc::clone(&cell),
        Arc::clone(&gate),
        Arc::clone(&in_flight),
        validator,
        badrow.clone(),
        Arc::clone(&metrics),
        PipelineConfig {
            accept_invalid: config.feature_flags.accept_invalid,
            enrichment_timeout: Duration::from_secs(10),
            attributes: config.attributes.clone(),
        },
    );

    let decoder = Decoder::new(DecoderConfig {
        max_record_size: config
            .max_record_size
            .unwrap_or(sift_protocol::DEFAULT_MAX_RECORD_SIZE),
        try_base64_decoding: config.feature_flags.try_base64_decoding,
    });

    let sinks = SinkSet {
        good: build_sink(&config.output.good).await?,
        pii: match &config.output.pii {
            Some(driver) => Some(build_sink(driver).await?),
            None => None,
        },
        bad: build_sink(&config.output.bad).await?,
    };

    let (source, checkpointer) = build_source(config.require_input()?).await?;
    let sequencer = CommitSequencer::new(checkpointer, Arc::clone(&metrics));

    let runtime = Runtime::new(
        RuntimeConfig {
            enrich_concurrency: config.concurrency.enrich,
            sink_concurrency: config.concurrency.sink,
        },
        decoder,
        pipeline,
        badrow,
        sinks,
        sequencer,
        Arc::clone(&metrics),
    );

    let cancel = CancellationToken::new();

    // Background workers: asset refresh loop and metrics reporter.
    let refresh_task = tokio::spawn(manager.run(cancel.clone()));
    let reporter_task = config.monitoring.metrics_interval_secs.map(|secs| {
        let reporter = MetricsReporter::new(Arc::clone(&metrics), Duration::from_secs(secs));
        tokio::spawn(reporter.run(cancel.clone()))
    });

    spawn_signal_watcher(cancel.clone());

    let result = runtime.run(source, cancel.clone()).await;

    // Stop background workers and let them wind down.
    cancel.cancel();
    let _ = refresh_task.await;
    if let Some(task) = reporter_task {
        let _ = task.await;
    }

    let snapshot = metrics.snapshot();
    info!(
        records = snapshot.records_received,
        good = snapshot.good,
        pii = snapshot.pii,
        bad = snapshot.bad,
        checkpoints = snapshot.checkpoints,
        "final pipeline totals"
    );

    Ok(result)
}

fn build_validator(
    config: &Config,
    iglu_path: Option<&Path>,
    http: reqwest::Client,
) -> Result<SchemaValidator> {
    let mut registry_configs = config.iglu.registries.clone();

    if let Some(path) = iglu_path {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read resolver config {}", path.display()))?;
        let file: IgluFile =
            serde_json::from_str(&contents).context("invalid resolver config")?;
        registry_configs.extend(file.registries);
    }

    let registries: Vec<Box<dyn SchemaResolver>> = registry_configs
        .into_iter()
        .map(|rc| match rc {
            RegistryConfig::Dir { path } => {
                Box::new(DirRegistry::new(path)) as Box<dyn SchemaResolver>
            }
            RegistryConfig::Http { uri } => {
                Box::new(HttpRegistry::new(uri, http.clone())) as Box<dyn SchemaResolver>
            }
        })
        .collect();

    info!(registries = registries.len(), "schema resolver configured");

    Ok(SchemaValidator::new(
        Arc::new(ResolverChain::new(registries)),
        ValidatorConfig::default(),
    ))
}

async fn build_sink(driver: &SinkDriver) -> Result<Box<dyn AttributedSink>> {
    let policy = RetryPolicy::default();
    Ok(match driver {
        SinkDriver::Stdout => Box::new(RetryingSink::new(StdoutSink::new(), policy)),
        SinkDriver::File { path } => {
            let sink = FileSink::open(path)
                .await
                .with_context(|| format!("failed to open sink file {}", path.display()))?;
            Box::new(RetryingSink::new(sink, policy))
        }
        SinkDriver::Null => Box::new(NullSink::new()),
    })
}

async fn build_source(
    input: &InputConfig,
) -> Result<(Box<dyn ByteRecordSource>, Arc<dyn Checkpointer>)> {
    match input {
        InputConfig::File {
            path,
            checkpoint_path,
        } => {
            let source = FileSource::open(path)
                .await
                .with_context(|| format!("failed to open input file {}", path.display()))?;
            let checkpointer: Arc<dyn Checkpointer> = match checkpoint_path {
                Some(cp) => Arc::new(FileCheckpointer::new(cp)),
                None => Arc::new(NoopCheckpointer),
            };
            info!(path = %path.display(), "file source opened");
            Ok((Box::new(source), checkpointer))
        }
    }
}

/// First signal drains, second signal (or grace expiry) forces
fn spawn_signal_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, draining");
        cancel.cancel();

        tokio::select! {
            _ = shutdown_signal() => {
                error!("Enrich shutdown forced");
                std::process::exit(2);
            }
            _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
                error!("Enrich shutdown forced");
                std::process::exit(2);
            }
        }
    });
}

/// Wait for SIGTERM or ctrl-c
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = term.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
