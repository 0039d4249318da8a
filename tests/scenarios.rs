//! End-to-end scenario tests driving `Pipeline` through its public API
//! only (`start`/`stop`/`health`), the way an external integration
//! consumer of this crate would. Each scenario builds its own stub
//! plugins and optimizer wiring rather than relying on any shared
//! fixture, since the cache/chain optimizers are not auto-wired by
//! `PipelineBuilder`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use screen_translate_core::clock::{SystemClock, TestClock};
use screen_translate_core::dictionary::SmartDictionary;
use screen_translate_core::error::{CoreError, CoreResult};
use screen_translate_core::model::{Frame, LanguagePair, Rect, Region, RegionId, TextBlock, TranslatedBlock};
use screen_translate_core::optimizers::{FrameSkip, SimilarityMode, TranslationCache, TranslationChain};
use screen_translate_core::pipeline::Pipeline;
use screen_translate_core::plugin::{
    CapturePlugin, LifecycleState, OcrPlugin, OverlayRenderer, PluginDescriptor, PluginInstance,
    PluginKind, Settings, TranslationPlugin,
};
use screen_translate_core::router::TranslationRouter;
use screen_translate_core::scheduler::SchedulerMode;
use screen_translate_core::testsupport::{StubCapture, StubOcr, StubTranslation};

fn descriptor(name: &str, kind: PluginKind) -> PluginDescriptor {
    PluginDescriptor {
        name: name.to_string(),
        display_name: name.to_string(),
        version: "1.0.0".to_string(),
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
        .transition(LifecycleState::Running)
        .expect("initialized -> running is always legal");
    Arc::new(instance)
}

fn region(id: u32, fps: u32, lang_pair: &str) -> Region {
    Region {
        id: RegionId(id),
        monitor: 0,
        rect: Rect { x: 0, y: 0, w: 100, h: 100 },
        display_name: format!("region-{id}"),
        enabled: true,
        ocr_engine_override: None,
        translation_engine_override: None,
        language_pair_override: Some(lang_pair.to_string()),
        fps,
    }
}

/// Polls `cond` until it's true or `timeout` elapses, then returns its
/// final value. Avoids flaky fixed sleeps in scenarios where exact
/// counts only stabilize once enough frames have run.
fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let start = Instant::now();
    loop {
        if cond() {
            return true;
        }
        if start.elapsed() >= timeout {
            return cond();
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Overlay that records every render call against an externally held
/// `Arc`, so a test can inspect rendered output after a
/// `PluginInstance` has taken ownership of the boxed trait object.
struct RecordingOverlay {
    rendered: Arc<Mutex<Vec<(u64, Vec<TranslatedBlock>)>>>,
}

impl OverlayRenderer for RecordingOverlay {
    fn render(&mut self, frame_id: u64, blocks: &[TranslatedBlock]) -> bool {
        self.rendered.lock().expect("overlay lock poisoned").push((frame_id, blocks.to_vec()));
        true
    }
}

/// Translation engine whose invocation count is visible through a
/// shared counter, for scenarios that must prove a circuit breaker
/// really did (or didn't) reach the underlying plugin.
struct CountingTranslation {
    name: String,
    invocations: Arc<AtomicU64>,
    fail_next: Arc<AtomicU64>,
    table: HashMap<(String, String, String), (String, f32)>,
}

impl TranslationPlugin for CountingTranslation {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, _settings: &Settings) -> CoreResult<()> {
        Ok(())
    }

    fn translate(&mut self, text: &str, source: &str, target: &str) -> CoreResult<(String, f32)> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let remaining = self.fail_next.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_next.fetch_sub(1, Ordering::Relaxed);
            return Err(CoreError::TransientEngine {
                engine: self.name.clone(),
                reason: "induced failure".to_string(),
            });
        }
        self.table
            .get(&(text.to_string(), source.to_string(), target.to_string()))
            .cloned()
            .ok_or_else(|| CoreError::TransientEngine {
                engine: self.name.clone(),
                reason: "no mapping for input".to_string(),
            })
    }

    fn cleanup(&mut self) -> CoreResult<()> {
        Ok(())
    }
}

/// OCR engine with an artificial per-call delay, standing in for a slow
/// real backend so the Capture -> OCR queue can be driven into
/// backpressure within a short wall-clock test.
struct SlowOcr {
    name: String,
    delay: Duration,
    invocations: Arc<AtomicU64>,
}

impl OcrPlugin for SlowOcr {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, _settings: &Settings) -> CoreResult<()> {
        Ok(())
    }

    fn extract(&mut self, frame: &Frame) -> CoreResult<Vec<TextBlock>> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        std::thread::sleep(self.delay);
        Ok(vec![TextBlock {
            frame_id: frame.frame_id,
            bounds: Rect { x: 0, y: 0, w: 10, h: 10 },
            text: "Hello".to_string(),
            confidence: 0.95,
            ocr_engine: self.name.clone(),
        }])
    }

    fn supported_languages(&self) -> Vec<String> {
        vec!["en".to_string()]
    }

    fn cleanup(&mut self) -> CoreResult<()> {
        Ok(())
    }
}

/// S1: repeated identical text is served from the translation cache
/// after the first lookup, and the dictionary learns it exactly once.
#[test]
fn s1_cache_path_serves_repeat_text_without_reinvoking_translation() {
    let clock: Arc<SystemClock> = Arc::new(SystemClock::new());

    let capture = running(
        descriptor("stub_capture", PluginKind::Capture),
        Box::new(StubCapture::new(8, 8)) as Box<dyn CapturePlugin>,
    );
    let ocr = running(
        descriptor("stub_ocr", PluginKind::Ocr),
        Box::new(StubOcr::single("stub_ocr", "Hello", 0.95)) as Box<dyn OcrPlugin>,
    );
    let translation = running(
        descriptor("stub_translation", PluginKind::Translation),
        Box::new(StubTranslation::new("stub_translation").with_entry("Hello", "en", "de", "Hallo", 0.95))
            as Box<dyn TranslationPlugin>,
    );

    let router = Arc::new(TranslationRouter::new(clock.clone()));
    router.register("stub_translation", translation);
    router.set_default("stub_translation");

    let rendered: Arc<Mutex<Vec<(u64, Vec<TranslatedBlock>)>>> = Arc::new(Mutex::new(Vec::new()));
    let overlay = running(
        descriptor("recording_overlay", PluginKind::TextProcessor),
        Box::new(RecordingOverlay { rendered: rendered.clone() }) as Box<dyn OverlayRenderer>,
    );

    let dictionary = Arc::new(SmartDictionary::new(None, clock.clone()));
    let cache = Arc::new(TranslationCache::new(16, Some(dictionary.clone())));

    let mut region_pairs = HashMap::new();
    region_pairs.insert(RegionId(1), LanguagePair::new("en", "de"));

    let pipeline = Pipeline::builder(SchedulerMode::Sequential)
        .with_clock(clock)
        .with_regions(vec![region(1, 500, "en->de")], region_pairs)
        .with_capture(capture)
        .with_ocr_engine("stub_ocr", ocr)
        .with_overlay(overlay)
        .with_router(router)
        .with_dictionary(dictionary.clone())
        .with_translate_pre_hook(cache.clone())
        .with_translate_post_hook(cache.clone())
        .build()
        .expect("pipeline builds");

    pipeline.start().expect("pipeline starts");
    assert!(wait_until(|| rendered.lock().unwrap().len() >= 100, Duration::from_secs(5)));
    pipeline.stop().expect("pipeline stops");

    let (hits, misses) = cache.stats();
    assert_eq!(misses, 1, "only the very first lookup of \"Hello\" should miss the cache");
    assert!(hits >= 99, "every repeat frame should be served from cache, got {hits} hits");

    let pair = LanguagePair::new("en", "de");
    assert_eq!(dictionary.len(&pair), 1, "exactly one distinct text was ever learned");
    let entry = dictionary.lookup(&pair, "Hello").unwrap().expect("learned entry present");
    assert_eq!(entry.translation, "Hallo");
    assert!(entry.confidence >= 0.95);

    let health = pipeline.health();
    let translate_health = &health.stages["translate"];
    assert_eq!(
        translate_health.output_count,
        translate_health.skip_count + 1,
        "every output is either a cache skip-hit or the one genuine miss"
    );
}

/// S2: identical frames are skipped by Frame Skip after the first, so
/// OCR and Translate are invoked exactly once for the whole run while
/// the overlay keeps rendering the reused output every tick.
#[test]
fn s2_frame_skip_invokes_ocr_and_translate_only_once_for_identical_frames() {
    let clock: Arc<SystemClock> = Arc::new(SystemClock::new());

    let capture = running(
        descriptor("stub_capture", PluginKind::Capture),
        Box::new(StubCapture::new(8, 8)) as Box<dyn CapturePlugin>,
    );
    let ocr = running(
        descriptor("stub_ocr", PluginKind::Ocr),
        Box::new(StubOcr::single("stub_ocr", "Hello", 0.95)) as Box<dyn OcrPlugin>,
    );
    let translation = running(
        descriptor("stub_translation", PluginKind::Translation),
        Box::new(StubTranslation::new("stub_translation").with_entry("Hello", "en", "de", "Hallo", 0.95))
            as Box<dyn TranslationPlugin>,
    );

    let router = Arc::new(TranslationRouter::new(clock.clone()));
    router.register("stub_translation", translation);
    router.set_default("stub_translation");

    let rendered: Arc<Mutex<Vec<(u64, Vec<TranslatedBlock>)>>> = Arc::new(Mutex::new(Vec::new()));
    let overlay = running(
        descriptor("recording_overlay", PluginKind::TextProcessor),
        Box::new(RecordingOverlay { rendered: rendered.clone() }) as Box<dyn OverlayRenderer>,
    );

    let mut region_pairs = HashMap::new();
    region_pairs.insert(RegionId(1), LanguagePair::new("en", "de"));

    // max_consecutive_skips is set far above the frame count this test
    // drives, so the force-admit-every-Nth-skip path never triggers.
    let frame_skip = Arc::new(FrameSkip::new(SimilarityMode::FastHash, 1, 10_000));

    let pipeline = Pipeline::builder(SchedulerMode::Sequential)
        .with_clock(clock)
        .with_regions(vec![region(1, 500, "en->de")], region_pairs)
        .with_capture(capture)
        .with_ocr_engine("stub_ocr", ocr)
        .with_overlay(overlay)
        .with_router(router)
        .with_frame_skip(frame_skip)
        .build()
        .expect("pipeline builds");

    pipeline.start().expect("pipeline starts");
    assert!(wait_until(
        || pipeline.health().stages["capture"].input_count >= 100,
        Duration::from_secs(5)
    ));
    pipeline.stop().expect("pipeline stops");

    let health = pipeline.health();
    assert_eq!(
        health.stages["capture"].output_count, 1,
        "only the first frame should ever be admitted past frame skip"
    );
    assert_eq!(health.stages["ocr"].input_count, 1);
    assert_eq!(health.stages["translate"].input_count, 1);
    assert!(
        rendered.lock().unwrap().len() >= 100,
        "overlay should keep rendering the reused output on every tick"
    );
}

/// S3: a configured translation chain routes ja->de through an en
/// intermediate hop, learning every leg and the shortcut final
/// mapping into the dictionary.
#[test]
fn s3_translation_chain_routes_through_intermediate_hop_and_learns_each_leg() {
    let clock: Arc<SystemClock> = Arc::new(SystemClock::new());

    let capture = running(
        descriptor("stub_capture", PluginKind::Capture),
        Box::new(StubCapture::new(8, 8)) as Box<dyn CapturePlugin>,
    );
    let ocr = running(
        descriptor("stub_ocr", PluginKind::Ocr),
        Box::new(StubOcr::single("stub_ocr", "こんにちは", 0.95)) as Box<dyn OcrPlugin>,
    );

    let ja_en = running(
        descriptor("ja_en", PluginKind::Translation),
        Box::new(StubTranslation::new("ja_en").with_entry("こんにちは", "ja", "en", "Hello", 0.95))
            as Box<dyn TranslationPlugin>,
    );
    let en_de = running(
        descriptor("en_de", PluginKind::Translation),
        Box::new(StubTranslation::new("en_de").with_entry("Hello", "en", "de", "Hallo", 0.95))
            as Box<dyn TranslationPlugin>,
    );

    let router = Arc::new(TranslationRouter::new(clock.clone()));
    router.register("ja_en", ja_en);
    router.register("en_de", en_de);
    router.map_pair(&LanguagePair::new("ja", "en"), "ja_en");
    router.map_pair(&LanguagePair::new("en", "de"), "en_de");
    router.set_default("ja_en");

    let rendered: Arc<Mutex<Vec<(u64, Vec<TranslatedBlock>)>>> = Arc::new(Mutex::new(Vec::new()));
    let overlay = running(
        descriptor("recording_overlay", PluginKind::TextProcessor),
        Box::new(RecordingOverlay { rendered: rendered.clone() }) as Box<dyn OverlayRenderer>,
    );

    let dictionary = Arc::new(SmartDictionary::new(None, clock.clone()));
    let mut chains = HashMap::new();
    chains.insert("ja->de".to_string(), vec!["ja".to_string(), "en".to_string(), "de".to_string()]);
    let chain = Arc::new(TranslationChain::new(chains, router.clone(), Some(dictionary.clone())));

    let mut region_pairs = HashMap::new();
    region_pairs.insert(RegionId(1), LanguagePair::new("ja", "de"));

    let pipeline = Pipeline::builder(SchedulerMode::Sequential)
        .with_clock(clock)
        .with_regions(vec![region(1, 500, "ja->de")], region_pairs)
        .with_capture(capture)
        .with_ocr_engine("stub_ocr", ocr)
        .with_overlay(overlay)
        .with_router(router)
        .with_dictionary(dictionary.clone())
        .with_translate_pre_hook(chain)
        .build()
        .expect("pipeline builds");

    pipeline.start().expect("pipeline starts");
    assert!(wait_until(|| !rendered.lock().unwrap().is_empty(), Duration::from_secs(5)));
    pipeline.stop().expect("pipeline stops");

    let ja_en_pair = LanguagePair::new("ja", "en");
    let en_de_pair = LanguagePair::new("en", "de");
    let ja_de_pair = LanguagePair::new("ja", "de");
    assert_eq!(
        dictionary.lookup(&ja_en_pair, "こんにちは").unwrap().unwrap().translation,
        "Hello"
    );
    assert_eq!(dictionary.lookup(&en_de_pair, "Hello").unwrap().unwrap().translation, "Hallo");
    assert_eq!(
        dictionary.lookup(&ja_de_pair, "こんにちは").unwrap().unwrap().translation,
        "Hallo"
    );

    let frames = rendered.lock().unwrap();
    let (_, blocks) = frames.last().expect("at least one frame rendered");
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].translated_text, "Hallo");
    assert_eq!(
        blocks[0].source_of_translation,
        screen_translate_core::model::SourceOfTranslation::ChainFinal
    );
    assert_eq!(blocks[0].translation_engine, "chain");
}

/// S4: a translation engine that fails `failure_threshold` times in a
/// row trips the circuit breaker; calls made during the cooldown are
/// rejected without ever reaching the plugin, and the first call after
/// cooldown is admitted as the sole half-open probe and closes it.
#[test]
fn s4_circuit_breaker_opens_then_recovers_after_cooldown() {
    let clock = TestClock::new();

    let invocations = Arc::new(AtomicU64::new(0));
    let fail_next = Arc::new(AtomicU64::new(5));
    let mut table = HashMap::new();
    table.insert(("Hello".to_string(), "en".to_string(), "de".to_string()), ("Hallo".to_string(), 0.95));
    let engine = CountingTranslation {
        name: "flaky".to_string(),
        invocations: invocations.clone(),
        fail_next,
        table,
    };
    let plugin = running(
        descriptor("flaky", PluginKind::Translation),
        Box::new(engine) as Box<dyn TranslationPlugin>,
    );

    let router = TranslationRouter::with_breaker_config(clock.clone(), 5, Duration::from_secs(10));
    router.register("flaky", plugin);
    router.set_default("flaky");
    let pair = LanguagePair::new("en", "de");

    for _ in 0..5 {
        assert!(router.translate("Hello", &pair).is_err(), "engine is primed to fail its first 5 calls");
    }
    assert_eq!(invocations.load(Ordering::Relaxed), 5);

    // Breaker just opened on the 5th failure; this call must be
    // rejected by the breaker itself, never reaching the plugin.
    assert!(router.translate("Hello", &pair).is_err());
    assert_eq!(
        invocations.load(Ordering::Relaxed),
        5,
        "a rejected call during the open cooldown must not invoke the plugin"
    );

    clock.advance(Duration::from_secs(11).as_nanos() as u64);

    let (text, confidence) = router
        .translate("Hello", &pair)
        .expect("the sole half-open probe after cooldown should succeed");
    assert_eq!(text, "Hallo");
    assert!(confidence >= 0.95);
    assert_eq!(invocations.load(Ordering::Relaxed), 6, "exactly one probe call reached the plugin");
    assert_eq!(router.breaker_states()["flaky"], "closed");
}

/// S5: an OCR stage far slower than the configured capture rate causes
/// the bounded Capture->OCR queue to drop the majority of frames
/// rather than unboundedly backing up. Uses real wall-clock timing, so
/// assertions use tolerance bands rather than exact counts.
#[test]
fn s5_backpressure_drops_frames_under_a_slow_ocr_stage() {
    let clock: Arc<SystemClock> = Arc::new(SystemClock::new());

    let capture = running(
        descriptor("stub_capture", PluginKind::Capture),
        Box::new(StubCapture::new(8, 8)) as Box<dyn CapturePlugin>,
    );
    let ocr_invocations = Arc::new(AtomicU64::new(0));
    let ocr = running(
        descriptor("slow_ocr", PluginKind::Ocr),
        Box::new(SlowOcr {
            name: "slow_ocr".to_string(),
            delay: Duration::from_millis(100),
            invocations: ocr_invocations.clone(),
        }) as Box<dyn OcrPlugin>,
    );
    let translation = running(
        descriptor("stub_translation", PluginKind::Translation),
        Box::new(StubTranslation::new("stub_translation").with_entry("Hello", "en", "de", "Hallo", 0.95))
            as Box<dyn TranslationPlugin>,
    );

    let router = Arc::new(TranslationRouter::new(clock.clone()));
    router.register("stub_translation", translation);
    router.set_default("stub_translation");

    let rendered: Arc<Mutex<Vec<(u64, Vec<TranslatedBlock>)>>> = Arc::new(Mutex::new(Vec::new()));
    let overlay = running(
        descriptor("recording_overlay", PluginKind::TextProcessor),
        Box::new(RecordingOverlay { rendered: rendered.clone() }) as Box<dyn OverlayRenderer>,
    );

    let mut region_pairs = HashMap::new();
    region_pairs.insert(RegionId(1), LanguagePair::new("en", "de"));

    let pipeline = Pipeline::builder(SchedulerMode::Async)
        .with_clock(clock)
        .with_queue_size(10)
        .with_regions(vec![region(1, 60, "en->de")], region_pairs)
        .with_capture(capture)
        .with_ocr_engine("slow_ocr", ocr)
        .with_overlay(overlay)
        .with_router(router)
        .build()
        .expect("pipeline builds");

    pipeline.start().expect("pipeline starts");
    std::thread::sleep(Duration::from_secs(3));
    pipeline.stop().expect("pipeline stops");

    let health = pipeline.health();
    let captured_total = health.stages["capture"].output_count;
    assert!(
        captured_total >= 120,
        "60fps over ~3s should capture roughly 180 frames, got {captured_total}"
    );

    let ocr_processed = ocr_invocations.load(Ordering::Relaxed);
    assert!(
        (15..=40).contains(&ocr_processed),
        "a 100ms/frame OCR stage over ~3s should process roughly 30 frames, got {ocr_processed}"
    );

    let dropped = captured_total.saturating_sub(ocr_processed);
    assert!(
        dropped >= 100,
        "queue_size=10 behind a ~10x slower OCR stage should drop most captured frames, only {dropped} dropped"
    );
}

/// S6: a per-region OCR engine override dispatches to the right engine
/// with no cross-contamination between regions sharing a pipeline.
#[test]
fn s6_region_ocr_engine_override_dispatches_to_the_right_engine() {
    let clock: Arc<SystemClock> = Arc::new(SystemClock::new());

    let capture = running(
        descriptor("stub_capture", PluginKind::Capture),
        Box::new(StubCapture::new(8, 8)) as Box<dyn CapturePlugin>,
    );
    let easy_ocr = running(
        descriptor("easy_ocr", PluginKind::Ocr),
        Box::new(StubOcr::single("easy_ocr", "Hello", 0.95)) as Box<dyn OcrPlugin>,
    );
    let paddle_ocr = running(
        descriptor("paddle_ocr", PluginKind::Ocr),
        Box::new(StubOcr::single("paddle_ocr", "Bonjour", 0.95)) as Box<dyn OcrPlugin>,
    );
    let translation = running(
        descriptor("stub_translation", PluginKind::Translation),
        Box::new(
            StubTranslation::new("stub_translation")
                .with_entry("Hello", "en", "de", "Hallo", 0.95)
                .with_entry("Bonjour", "fr", "de", "Hallo-fr", 0.95),
        ) as Box<dyn TranslationPlugin>,
    );

    let router = Arc::new(TranslationRouter::new(clock.clone()));
    router.register("stub_translation", translation);
    router.set_default("stub_translation");

    let rendered: Arc<Mutex<Vec<(u64, Vec<TranslatedBlock>)>>> = Arc::new(Mutex::new(Vec::new()));
    let overlay = running(
        descriptor("recording_overlay", PluginKind::TextProcessor),
        Box::new(RecordingOverlay { rendered: rendered.clone() }) as Box<dyn OverlayRenderer>,
    );

    let region_a = region(1, 500, "en->de");
    let mut region_b = region(2, 500, "fr->de");
    region_b.ocr_engine_override = Some("paddle_ocr".to_string());

    let mut region_pairs = HashMap::new();
    region_pairs.insert(RegionId(1), LanguagePair::new("en", "de"));
    region_pairs.insert(RegionId(2), LanguagePair::new("fr", "de"));

    let pipeline = Pipeline::builder(SchedulerMode::Sequential)
        .with_clock(clock)
        .with_regions(vec![region_a, region_b], region_pairs)
        .with_capture(capture)
        .with_ocr_engine("easy_ocr", easy_ocr)
        .with_ocr_engine("paddle_ocr", paddle_ocr)
        .with_overlay(overlay)
        .with_router(router)
        .build()
        .expect("pipeline builds");

    pipeline.start().expect("pipeline starts");
    assert!(wait_until(
        || {
            let r = rendered.lock().unwrap();
            r.iter().any(|(_, blocks)| blocks.first().map(|b| b.translated_text == "Hallo").unwrap_or(false))
                && r.iter()
                    .any(|(_, blocks)| blocks.first().map(|b| b.translated_text == "Hallo-fr").unwrap_or(false))
        },
        Duration::from_secs(5)
    ));
    pipeline.stop().expect("pipeline stops");

    let frames = rendered.lock().unwrap();
    for (_, blocks) in frames.iter() {
        let Some(block) = blocks.first() else { continue };
        match block.translated_text.as_str() {
            "Hallo" => assert_eq!(block.source.ocr_engine, "easy_ocr"),
            "Hallo-fr" => assert_eq!(block.source.ocr_engine, "paddle_ocr"),
            other => panic!("unexpected translation {other}"),
        }
    }
}
