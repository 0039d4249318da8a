use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use screen_translate_core::clock::SystemClock;
use screen_translate_core::config::{self, AppConfig};
use screen_translate_core::dictionary::SmartDictionary;
use screen_translate_core::model::RegionId;
use screen_translate_core::pipeline::Pipeline;
use screen_translate_core::plugin::{PluginDescriptor, PluginInstance, PluginKind};
use screen_translate_core::router::TranslationRouter;
use screen_translate_core::scheduler::SchedulerMode;
use screen_translate_core::testsupport::{StubCapture, StubOcr, StubOverlay, StubTranslation};

/// Real Capture/OCR/Translation backends are external collaborators (out
/// of scope for this crate); this binary wires the stub plugins from
/// `testsupport` so `--config`/`--mode`/`--region` can be exercised
/// end-to-end against a config file without a live screen or network.
#[derive(Parser, Debug)]
#[command(name = "screen-translate")]
#[command(about = "Screen-translation pipeline runtime (demo harness)", long_about = None)]
struct Args {
    /// Pipeline config TOML (default: ./pipeline.toml)
    #[arg(long, value_name = "TOML")]
    config: Option<PathBuf>,

    /// Write a default config to --config (or ./pipeline.toml) and exit
    #[arg(long)]
    init_config: bool,

    /// Overwrite an existing config file when used with --init-config
    #[arg(long)]
    force: bool,

    /// Run only this region id, disabling all others
    #[arg(long, value_name = "ID")]
    region: Option<u32>,

    /// Override pipeline.mode ("sequential" or "async")
    #[arg(long)]
    mode: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = args.config.clone().unwrap_or_else(|| PathBuf::from("pipeline.toml"));

    if args.init_config {
        write_default_config(&config_path, args.force)?;
        eprintln!("wrote default config: {}", config_path.display());
        return Ok(());
    }

    let mut cfg = config::load_config(&config_path)
        .with_context(|| format!("load config: {}", config_path.display()))?;

    if let Some(mode) = &args.mode {
        cfg.pipeline.mode = mode.clone();
    }
    if let Some(region) = args.region {
        for r in &mut cfg.regions {
            r.enabled = r.id == RegionId(region);
        }
    }

    let runtime = config::resolve(&cfg).context("resolve config")?;
    let pipeline = build_pipeline(&runtime)?;

    pipeline.start().context("start pipeline")?;
    tracing::info!("pipeline running, press enter to stop");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line).ok();

    if runtime.dictionary_auto_learn {
        match pipeline.extract_words_on_stop() {
            Ok(report) => tracing::info!(attempted = report.attempted, learned = report.learned, "word extraction on stop"),
            Err(err) => tracing::warn!(%err, "word extraction on stop failed"),
        }
    }
    pipeline.stop().context("stop pipeline")?;

    let health = pipeline.health();
    for (stage, snapshot) in &health.stages {
        tracing::info!(
            %stage,
            input = snapshot.input_count,
            output = snapshot.output_count,
            drops = snapshot.drop_count,
            skips = snapshot.skip_count,
            "stage health"
        );
    }
    if !health.faulted_stages.is_empty() {
        tracing::warn!(?health.faulted_stages, "stages did not stop within deadline");
    }
    Ok(())
}

fn build_pipeline(runtime: &config::RuntimeConfig) -> anyhow::Result<Arc<Pipeline>> {
    let clock = Arc::new(SystemClock::new());

    let capture = running(
        descriptor("stub_capture", PluginKind::Capture),
        Box::new(StubCapture::new(64, 64)) as Box<dyn screen_translate_core::plugin::CapturePlugin>,
    );
    let ocr = running(
        descriptor("stub_ocr", PluginKind::Ocr),
        Box::new(StubOcr::single("stub_ocr", "sample text", 0.9)) as Box<dyn screen_translate_core::plugin::OcrPlugin>,
    );
    let overlay = running(
        descriptor("stub_overlay", PluginKind::TextProcessor),
        Box::new(StubOverlay::new()) as Box<dyn screen_translate_core::plugin::OverlayRenderer>,
    );
    let translation = running(
        descriptor("stub_translation", PluginKind::Translation),
        Box::new(StubTranslation::new("stub_translation")) as Box<dyn screen_translate_core::plugin::TranslationPlugin>,
    );

    let router = Arc::new(TranslationRouter::new(clock.clone()));
    router.register("stub_translation", translation);
    router.set_default("stub_translation");
    if let Some(name) = &runtime.translation_default {
        router.set_default(name.clone());
    }
    for (pair, plugin) in &runtime.translation_mapping {
        router.map_pair(pair, plugin.clone());
    }

    let dictionary = Arc::new(
        SmartDictionary::new(None, clock.clone())
            .with_learn_threshold(runtime.dictionary_min_confidence)
            .with_autosave_every(runtime.dictionary_autosave_every_n_learns),
    );

    let mut builder = Pipeline::builder(runtime.mode)
        .with_clock(clock)
        .with_queue_size(runtime.queue_size)
        .with_regions(runtime.regions.clone(), runtime.region_language_pairs.clone())
        .with_capture(capture)
        .with_ocr_engine("stub_ocr", ocr)
        .with_overlay(overlay)
        .with_router(router);
    if runtime.dictionary_auto_learn {
        builder = builder.with_dictionary(dictionary);
    }
    builder.build().map_err(anyhow::Error::from)
}

fn descriptor(name: &str, kind: PluginKind) -> PluginDescriptor {
    PluginDescriptor {
        name: name.to_string(),
        display_name: name.to_string(),
        version: "0.1.0".to_string(),
        kind,
        target_stage: None,
        hook: None,
        dependencies: Vec::new(),
        runtime_requirements: Default::default(),
        settings: Default::default(),
        enabled: true,
    }
}

fn running<P: ?Sized>(descriptor: PluginDescriptor, handle: Box<P>) -> Arc<PluginInstance<P>> {
    let instance = PluginInstance::new(descriptor, Default::default(), handle);
    instance
        .transition(screen_translate_core::plugin::LifecycleState::Running)
        .expect("initialized -> running is always legal");
    Arc::new(instance)
}

fn write_default_config(path: &std::path::Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        return Err(anyhow::anyhow!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create config dir: {}", parent.display()))?;
        }
    }
    std::fs::write(path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", path.display()))?;
    // Touch the struct so a malformed template fails fast during development
    // rather than silently shipping a config nothing can parse.
    let _: AppConfig = toml::from_str(DEFAULT_CONFIG_TOML).expect("default config template is valid");
    Ok(())
}

const DEFAULT_CONFIG_TOML: &str = r#"[pipeline]
mode = "sequential"
queue_size = 16
stop_deadline_ms = 5000

[[regions]]
id = 1
monitor = 0
display_name = "primary"
enabled = true
fps = 10

[regions.rect]
x = 0
y = 0
w = 1920
h = 200

[translation]
language_pair = "en->de"
default = "stub_translation"

[dictionary]
auto_learn = true
min_confidence = 0.85
autosave_every_n_learns = 100
max_entries = "unlimited"
"#;
