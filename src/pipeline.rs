//! Top-level `Pipeline`: wires the Capture -> Preprocess(opt) -> OCR ->
//! Validate(opt) -> Translate -> Overlay chain (§4.2-§4.3) over the plugin
//! instances and optimizer hooks a caller assembles with `PipelineBuilder`.
//!
//! Two scheduling modes share the same `StageEngine`s (§4.3): Sequential
//! drives one frame end-to-end per region, round-robin, on a single
//! background thread; Async runs one worker thread per stage connected by
//! `BoundedQueue`s, with a per-region Capture driver thread standing in
//! for the generic `spawn_stage_worker` because it alone needs to inspect
//! a skipped frame to implement `FrameSkipOnSkip::ReusePrevious`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::clock::SharedClock;
use crate::dictionary::SmartDictionary;
use crate::error::{CoreError, CoreResult};
use crate::model::{
    Frame, FrameIdAllocator, LanguagePair, Region, RegionId, TextBlock, TranslatedBlock,
};
use crate::optimizers::{CaptureInput, FrameSkip, FrameSkipOnSkip, TranslateInput};
use crate::plugin::{CapturePlugin, HotSwap, OcrPlugin, OverlayRenderer, PluginInstance};
use crate::router::TranslationRouter;
use crate::scheduler::{join_with_deadline, BoundedQueue, SchedulerMode, SequentialScheduler};
use crate::stage::{Primary, StageEngine};

/// `Pipeline`'s own lifecycle, distinct from a `PluginInstance`'s (§4.3):
/// mode switches are only legal in `Created` or `Stopped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Starting,
    Running,
    Paused,
    Stopping,
    Stopped,
}

/// A snapshot of one stage's observables (§4.2), read from its
/// `StageMetrics` atomics without locking.
#[derive(Clone, Debug)]
pub struct StageHealth {
    pub input_count: u64,
    pub output_count: u64,
    pub drop_count: u64,
    pub skip_count: u64,
    pub hook_failure_count: u64,
    pub primary_failure_count: u64,
    pub last_error: Option<String>,
    pub throughput_per_sec: f64,
}

/// The aggregate health view returned by `Pipeline::health()` (§4.7).
#[derive(Clone, Debug, Default)]
pub struct PipelineHealth {
    pub stages: HashMap<String, StageHealth>,
    pub breaker_states: HashMap<String, &'static str>,
    pub faulted_stages: Vec<String>,
}

/// Result of `Pipeline::extract_words_on_stop` (§9 open question 2).
#[derive(Clone, Copy, Debug, Default)]
pub struct WordExtractionReport {
    pub attempted: usize,
    pub learned: usize,
}

/// Bridges the Capture plugin into `Primary<CaptureInput, Frame>`. Holds
/// the instance behind a `HotSwap` so `Pipeline::reload_capture` can
/// replace it atomically between frames (§4.1 hot-reload contract).
struct CapturePrimary {
    plugin: Arc<HotSwap<dyn CapturePlugin>>,
}

impl Primary<CaptureInput, Frame> for CapturePrimary {
    fn invoke(&self, input: &CaptureInput) -> Result<Frame, String> {
        let plugin = self.plugin.snapshot();
        if !plugin.state().can_receive_work() {
            return Err(format!("capture plugin not running ({:?})", plugin.state()));
        }
        let mut handle = plugin.handle.lock().expect("capture plugin handle lock poisoned");
        handle
            .capture(&input.region, input.frame_id)
            .map_err(|e| e.to_string())
    }
}

/// Bridges one or more OCR plugins into `Primary<Frame, Vec<TextBlock>>`,
/// resolving which engine serves a frame via the region's
/// `ocr_engine_override` (§4.8), falling back to `default_engine`. Each
/// named engine sits behind a `HotSwap` so `Pipeline::reload_ocr` can
/// replace it atomically between frames.
struct OcrPrimary {
    engines: HashMap<String, Arc<HotSwap<dyn OcrPlugin>>>,
    default_engine: String,
    region_overrides: HashMap<RegionId, String>,
}

impl Primary<Frame, Vec<TextBlock>> for OcrPrimary {
    fn invoke(&self, input: &Frame) -> Result<Vec<TextBlock>, String> {
        let name = self
            .region_overrides
            .get(&input.region_id)
            .unwrap_or(&self.default_engine);
        let hotswap = self
            .engines
            .get(name)
            .ok_or_else(|| format!("no ocr plugin registered for '{name}'"))?;
        let plugin = hotswap.snapshot();
        if !plugin.state().can_receive_work() {
            return Err(format!("ocr plugin '{name}' not running ({:?})", plugin.state()));
        }
        let mut handle = plugin.handle.lock().expect("ocr plugin handle lock poisoned");
        handle.extract(input).map_err(|e| e.to_string())
    }
}

/// Bridges the Multi-Engine Translation Router into
/// `Primary<TranslateInput, TranslatedBlock>`, stamping the real serving
/// engine name (not the language pair) into `translation_engine`.
struct TranslatePrimary {
    router: Arc<TranslationRouter>,
}

impl Primary<TranslateInput, TranslatedBlock> for TranslatePrimary {
    fn invoke(&self, input: &TranslateInput) -> Result<TranslatedBlock, String> {
        let (text, confidence, engine) = self
            .router
            .translate_with_engine(&input.block.text, &input.pair)
            .map_err(|e| e.to_string())?;
        Ok(TranslatedBlock {
            source: input.block.clone(),
            translated_text: text,
            translation_confidence: confidence,
            translation_engine: engine,
            source_of_translation: crate::model::SourceOfTranslation::Engine,
        })
    }
}

/// Tracks, per in-flight frame_id, how many `TranslatedBlock`s are still
/// expected before the frame can be handed to Overlay (Async mode only —
/// Sequential mode collects synchronously and never needs this). A
/// dropped translate item (stage-item error) still counts toward
/// completion rather than stalling the frame forever.
struct FrameAggregator {
    pending: Mutex<HashMap<u64, PendingFrame>>,
}

struct PendingFrame {
    expected: usize,
    collected: Vec<TranslatedBlock>,
}

impl FrameAggregator {
    fn new() -> Self {
        Self { pending: Mutex::new(HashMap::new()) }
    }

    /// Registers a frame's expected block count. `expected == 0` completes
    /// immediately (a frame with no surviving OCR blocks).
    fn register(&self, frame_id: u64, expected: usize) -> Option<Vec<TranslatedBlock>> {
        if expected == 0 {
            return Some(Vec::new());
        }
        self.pending
            .lock()
            .expect("frame aggregator lock poisoned")
            .insert(frame_id, PendingFrame { expected, collected: Vec::new() });
        None
    }

    fn add(&self, frame_id: u64, block: TranslatedBlock) -> Option<Vec<TranslatedBlock>> {
        let mut pending = self.pending.lock().expect("frame aggregator lock poisoned");
        let Some(entry) = pending.get_mut(&frame_id) else {
            return None;
        };
        entry.collected.push(block);
        if entry.collected.len() >= entry.expected {
            return pending.remove(&frame_id).map(|p| p.collected);
        }
        None
    }

    fn drop_one(&self, frame_id: u64) -> Option<Vec<TranslatedBlock>> {
        let mut pending = self.pending.lock().expect("frame aggregator lock poisoned");
        let Some(entry) = pending.get_mut(&frame_id) else {
            return None;
        };
        entry.expected = entry.expected.saturating_sub(1);
        if entry.collected.len() >= entry.expected {
            return pending.remove(&frame_id).map(|p| p.collected);
        }
        None
    }
}

struct OverlayJob {
    region_id: RegionId,
    frame_id: u64,
    blocks: Vec<TranslatedBlock>,
}

/// The full runtime pipeline. Constructed via `PipelineBuilder::build`.
pub struct Pipeline {
    mode: SchedulerMode,
    queue_size: usize,
    stop_deadline: Duration,
    regions: Vec<Region>,
    region_pairs: HashMap<RegionId, LanguagePair>,

    capture_engine: Arc<StageEngine<CaptureInput, Frame>>,
    ocr_engine: Arc<StageEngine<Frame, Vec<TextBlock>>>,
    translate_engine: Arc<StageEngine<TranslateInput, TranslatedBlock>>,
    overlay: Arc<PluginInstance<dyn OverlayRenderer>>,
    router: Arc<TranslationRouter>,
    capture_hotswap: Arc<HotSwap<dyn CapturePlugin>>,
    ocr_hotswaps: HashMap<String, Arc<HotSwap<dyn OcrPlugin>>>,
    dictionary: Option<Arc<SmartDictionary>>,
    frame_skip: Option<Arc<FrameSkip>>,

    frame_allocator: Mutex<FrameIdAllocator>,
    frame_origin: Mutex<HashMap<u64, RegionId>>,
    last_emitted: Mutex<HashMap<RegionId, Vec<TranslatedBlock>>>,

    state: Mutex<PipelineState>,
    shutdown: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    faulted_stages: Mutex<Vec<String>>,
}

impl Pipeline {
    #[must_use]
    pub fn builder(mode: SchedulerMode) -> PipelineBuilder {
        PipelineBuilder::new(mode)
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        *self.state.lock().expect("pipeline state lock poisoned")
    }

    /// Starts the pipeline: spawns the Sequential round-robin driver or
    /// the Async per-stage worker threads, per `self.mode`.
    pub fn start(&self) -> CoreResult<()> {
        {
            let mut state = self.state.lock().expect("pipeline state lock poisoned");
            if !matches!(*state, PipelineState::Created | PipelineState::Stopped) {
                return Err(CoreError::configuration(format!(
                    "cannot start pipeline from state {:?}",
                    *state
                )));
            }
            *state = PipelineState::Starting;
        }
        self.shutdown.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.faulted_stages.lock().expect("faulted stages lock poisoned").clear();

        let handles = match self.mode {
            SchedulerMode::Sequential => self.spawn_sequential(),
            SchedulerMode::Async => self.spawn_async(),
        };
        *self.worker_handles.lock().expect("worker handles lock poisoned") = handles;
        *self.state.lock().expect("pipeline state lock poisoned") = PipelineState::Running;
        tracing::info!(mode = ?self.mode, "pipeline started");
        Ok(())
    }

    pub fn pause(&self) -> CoreResult<()> {
        let mut state = self.state.lock().expect("pipeline state lock poisoned");
        if *state != PipelineState::Running {
            return Err(CoreError::configuration("cannot pause a pipeline that is not running"));
        }
        self.paused.store(true, Ordering::SeqCst);
        *state = PipelineState::Paused;
        Ok(())
    }

    pub fn resume(&self) -> CoreResult<()> {
        let mut state = self.state.lock().expect("pipeline state lock poisoned");
        if *state != PipelineState::Paused {
            return Err(CoreError::configuration("cannot resume a pipeline that is not paused"));
        }
        self.paused.store(false, Ordering::SeqCst);
        *state = PipelineState::Running;
        Ok(())
    }

    /// Atomically replaces the running Capture plugin instance (§4.1
    /// hot-reload contract, invariant 10 of §8). Takes effect for the next
    /// frame; a capture already in flight keeps running against the old
    /// instance.
    pub fn reload_capture(&self, instance: Arc<PluginInstance<dyn CapturePlugin>>) {
        self.capture_hotswap.swap(instance);
    }

    /// Atomically replaces the running OCR plugin instance registered
    /// under `name`. Errors if `name` was never registered with the
    /// pipeline at build time — reload can't add a new engine, only
    /// replace an existing one.
    pub fn reload_ocr(&self, name: &str, instance: Arc<PluginInstance<dyn OcrPlugin>>) -> CoreResult<()> {
        let hotswap = self
            .ocr_hotswaps
            .get(name)
            .ok_or_else(|| CoreError::plugin_load(name, "not loaded"))?;
        hotswap.swap(instance);
        Ok(())
    }

    /// Atomically replaces the translation engine registered under `name`
    /// in the pipeline's router.
    pub fn reload_translation(&self, name: impl Into<String>, instance: Arc<PluginInstance<dyn crate::plugin::TranslationPlugin>>) {
        self.router.reload(name, instance);
    }

    /// Stops the pipeline, waiting up to `stop_deadline_ms` for worker
    /// threads to drain; threads still alive past the deadline are
    /// reported via `faulted_stages` in the next `health()` call instead
    /// of being forcibly killed (§4.3).
    pub fn stop(&self) -> CoreResult<()> {
        {
            let mut state = self.state.lock().expect("pipeline state lock poisoned");
            if matches!(*state, PipelineState::Created | PipelineState::Stopped) {
                return Ok(());
            }
            *state = PipelineState::Stopping;
        }
        self.shutdown.store(true, Ordering::SeqCst);
        let handles = std::mem::take(&mut *self.worker_handles.lock().expect("worker handles lock poisoned"));
        let faulted = join_with_deadline(handles, self.stop_deadline);
        if !faulted.is_empty() {
            tracing::warn!(?faulted, "stages did not stop within deadline");
        }
        *self.faulted_stages.lock().expect("faulted stages lock poisoned") = faulted;
        if let Some(dictionary) = &self.dictionary {
            for pair in self.region_pairs.values() {
                if let Err(err) = dictionary.save(pair) {
                    tracing::warn!(%err, %pair, "failed to save dictionary on stop");
                }
            }
        }
        *self.state.lock().expect("pipeline state lock poisoned") = PipelineState::Stopped;
        tracing::info!("pipeline stopped");
        Ok(())
    }

    /// Aggregate health snapshot (§4.7): per-stage counters, per-engine
    /// circuit breaker labels, and any stage thread that outlived the
    /// stop deadline.
    #[must_use]
    pub fn health(&self) -> PipelineHealth {
        let mut stages = HashMap::new();
        stages.insert(self.capture_engine.name.clone(), snapshot(&self.capture_engine.metrics));
        stages.insert(self.ocr_engine.name.clone(), snapshot(&self.ocr_engine.metrics));
        stages.insert(self.translate_engine.name.clone(), snapshot(&self.translate_engine.metrics));
        PipelineHealth {
            stages,
            breaker_states: self.router.breaker_states(),
            faulted_stages: self.faulted_stages.lock().expect("faulted stages lock poisoned").clone(),
        }
    }

    /// Breaks every currently-rendered block's source text back into
    /// words and re-translates each individually, learning the results
    /// into the dictionary. All-or-nothing (§9 open question 2): if any
    /// word fails to translate, nothing from this call is learned.
    pub fn extract_words_on_stop(&self) -> CoreResult<WordExtractionReport> {
        let Some(dictionary) = &self.dictionary else {
            return Ok(WordExtractionReport::default());
        };

        let snapshot: Vec<(RegionId, TranslatedBlock)> = {
            let cache = self.last_emitted.lock().expect("last emitted lock poisoned");
            cache
                .iter()
                .flat_map(|(region, blocks)| blocks.iter().cloned().map(move |b| (*region, b)))
                .collect()
        };

        let mut staged = Vec::new();
        for (region_id, block) in &snapshot {
            let pair = self.region_pairs.get(region_id).cloned().ok_or_else(|| {
                CoreError::configuration(format!("region {region_id} has no resolved language pair"))
            })?;
            for word in block.source.text.split_whitespace() {
                let (translated, confidence, engine) = self.router.translate_with_engine(word, &pair)?;
                staged.push((pair.clone(), word.to_string(), translated, confidence, engine));
            }
        }

        let attempted = staged.len();
        let mut learned = 0;
        for (pair, word, translated, confidence, engine) in staged {
            dictionary.learn(&pair, &word, &translated, confidence, &engine)?;
            learned += 1;
        }
        Ok(WordExtractionReport { attempted, learned })
    }

    fn enabled_region_ids(&self) -> Vec<RegionId> {
        self.regions.iter().filter(|r| r.enabled).map(|r| r.id).collect()
    }

    fn next_frame_id(&self, region_id: RegionId) -> u64 {
        let id = self.frame_allocator.lock().expect("frame allocator lock poisoned").next_id();
        self.frame_origin.lock().expect("frame origin lock poisoned").insert(id, region_id);
        id
    }

    fn on_skip_policy(&self) -> FrameSkipOnSkip {
        self.frame_skip.as_ref().map(|fs| fs.on_skip()).unwrap_or(FrameSkipOnSkip::DrawNothing)
    }

    fn render(&self, region_id: RegionId, frame_id: u64, blocks: Vec<TranslatedBlock>) {
        {
            let mut overlay = self.overlay.handle.lock().expect("overlay plugin handle lock poisoned");
            overlay.render(frame_id, &blocks);
        }
        self.last_emitted.lock().expect("last emitted lock poisoned").insert(region_id, blocks);
        self.frame_origin.lock().expect("frame origin lock poisoned").remove(&frame_id);
    }

    // ---- Sequential mode --------------------------------------------

    fn spawn_sequential(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let pipeline = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("sequential-scheduler".to_string())
            .spawn(move || pipeline.run_sequential())
            .expect("failed to spawn sequential scheduler thread");
        vec![handle]
    }

    fn run_sequential(&self) {
        let scheduler = SequentialScheduler::new(self.enabled_region_ids());
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }
            let kept_going = scheduler.run_round(|region_id| {
                if self.shutdown.load(Ordering::SeqCst) {
                    return false;
                }
                if !self.paused.load(Ordering::SeqCst) {
                    self.drive_one_frame_sequential(region_id);
                }
                true
            });
            if !kept_going {
                return;
            }
            std::thread::sleep(Duration::from_millis(self.frame_period_ms()));
        }
    }

    fn frame_period_ms(&self) -> u64 {
        let fastest_fps = self.regions.iter().filter(|r| r.enabled).map(|r| r.fps).max().unwrap_or(10);
        (1000 / fastest_fps.max(1)) as u64
    }

    fn drive_one_frame_sequential(&self, region_id: RegionId) {
        let Some(region) = self.regions.iter().find(|r| r.id == region_id) else {
            return;
        };
        let frame_id = self.next_frame_id(region_id);
        let cap_input = CaptureInput { region: region.clone(), frame_id };

        let Some(frame) = self.capture_engine.process(cap_input) else {
            self.frame_origin.lock().expect("frame origin lock poisoned").remove(&frame_id);
            if self.on_skip_policy() == FrameSkipOnSkip::ReusePrevious {
                if let Some(prev) = self.last_emitted.lock().expect("last emitted lock poisoned").get(&region_id).cloned() {
                    self.render(region_id, frame_id, prev);
                }
            }
            return;
        };

        let blocks = self.ocr_engine.process(frame).unwrap_or_default();
        if blocks.is_empty() {
            self.render(region_id, frame_id, Vec::new());
            return;
        }

        let Some(pair) = self.region_pairs.get(&region_id).cloned() else {
            self.render(region_id, frame_id, Vec::new());
            return;
        };
        let mut translated = Vec::with_capacity(blocks.len());
        for block in blocks {
            if let Some(tb) = self.translate_engine.process(TranslateInput { block, pair: pair.clone() }) {
                translated.push(tb);
            }
        }
        self.render(region_id, frame_id, translated);
    }

    // ---- Async mode ---------------------------------------------------

    fn spawn_async(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let frame_queue: Arc<BoundedQueue<Frame>> = Arc::new(BoundedQueue::new(self.queue_size));
        let translate_input_queue: Arc<BoundedQueue<TranslateInput>> = Arc::new(BoundedQueue::new(self.queue_size));
        let overlay_queue: Arc<BoundedQueue<OverlayJob>> = Arc::new(BoundedQueue::new(self.queue_size));
        let aggregator = Arc::new(FrameAggregator::new());

        let mut handles = Vec::new();

        let regions = self.enabled_region_ids();
        let remaining_drivers = Arc::new(AtomicUsize::new(regions.len().max(1)));
        for region_id in regions {
            let pipeline = Arc::clone(self);
            let frame_queue = Arc::clone(&frame_queue);
            let overlay_queue = Arc::clone(&overlay_queue);
            let remaining = Arc::clone(&remaining_drivers);
            let handle = std::thread::Builder::new()
                .name(format!("capture-driver-{region_id}"))
                .spawn(move || pipeline.run_capture_driver(region_id, &frame_queue, &overlay_queue, &remaining))
                .expect("failed to spawn capture driver thread");
            handles.push(handle);
        }

        {
            let pipeline = Arc::clone(self);
            let frame_queue = Arc::clone(&frame_queue);
            let translate_input_queue = Arc::clone(&translate_input_queue);
            let overlay_queue = Arc::clone(&overlay_queue);
            let aggregator = Arc::clone(&aggregator);
            let handle = std::thread::Builder::new()
                .name("ocr-worker".to_string())
                .spawn(move || pipeline.run_ocr_worker(&frame_queue, &translate_input_queue, &overlay_queue, &aggregator))
                .expect("failed to spawn ocr worker thread");
            handles.push(handle);
        }

        {
            let pipeline = Arc::clone(self);
            let translate_input_queue = Arc::clone(&translate_input_queue);
            let overlay_queue = Arc::clone(&overlay_queue);
            let aggregator = Arc::clone(&aggregator);
            let handle = std::thread::Builder::new()
                .name("translate-worker".to_string())
                .spawn(move || pipeline.run_translate_worker(&translate_input_queue, &overlay_queue, &aggregator))
                .expect("failed to spawn translate worker thread");
            handles.push(handle);
        }

        {
            let pipeline = Arc::clone(self);
            let overlay_queue = Arc::clone(&overlay_queue);
            let handle = std::thread::Builder::new()
                .name("overlay-worker".to_string())
                .spawn(move || pipeline.run_overlay_worker(&overlay_queue))
                .expect("failed to spawn overlay worker thread");
            handles.push(handle);
        }

        handles
    }

    fn run_capture_driver(
        &self,
        region_id: RegionId,
        frame_queue: &BoundedQueue<Frame>,
        overlay_queue: &BoundedQueue<OverlayJob>,
        remaining: &AtomicUsize,
    ) {
        let Some(region) = self.regions.iter().find(|r| r.id == region_id).cloned() else {
            return;
        };
        let period = Duration::from_millis(1000 / region.fps.max(1) as u64);

        while !self.shutdown.load(Ordering::SeqCst) {
            if self.paused.load(Ordering::SeqCst) {
                std::thread::sleep(period);
                continue;
            }
            let frame_id = self.next_frame_id(region_id);
            let cap_input = CaptureInput { region: region.clone(), frame_id };

            match self.capture_engine.process(cap_input) {
                Some(frame) => {
                    if !frame_queue.try_send(frame) {
                        self.frame_origin.lock().expect("frame origin lock poisoned").remove(&frame_id);
                    }
                }
                None => {
                    self.frame_origin.lock().expect("frame origin lock poisoned").remove(&frame_id);
                    if self.on_skip_policy() == FrameSkipOnSkip::ReusePrevious {
                        if let Some(prev) = self.last_emitted.lock().expect("last emitted lock poisoned").get(&region_id).cloned() {
                            let _ = overlay_queue.try_send(OverlayJob { region_id, frame_id, blocks: prev });
                        }
                    }
                }
            }
            std::thread::sleep(period);
        }

        if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            frame_queue.close();
        }
    }

    fn run_ocr_worker(
        &self,
        frame_queue: &BoundedQueue<Frame>,
        translate_input_queue: &BoundedQueue<TranslateInput>,
        overlay_queue: &BoundedQueue<OverlayJob>,
        aggregator: &FrameAggregator,
    ) {
        while let Some(frame) = frame_queue.recv_blocking() {
            let region_id = frame.region_id;
            let frame_id = frame.frame_id;

            match self.ocr_engine.process(frame) {
                Some(blocks) if blocks.is_empty() => {
                    let _ = overlay_queue.send_blocking(OverlayJob { region_id, frame_id, blocks: Vec::new() });
                }
                Some(blocks) => {
                    let Some(pair) = self.region_pairs.get(&region_id).cloned() else {
                        let _ = overlay_queue.send_blocking(OverlayJob { region_id, frame_id, blocks: Vec::new() });
                        continue;
                    };
                    if let Some(complete) = aggregator.register(frame_id, blocks.len()) {
                        let _ = overlay_queue.send_blocking(OverlayJob { region_id, frame_id, blocks: complete });
                        continue;
                    }
                    for block in blocks {
                        let input = TranslateInput { block, pair: pair.clone() };
                        if translate_input_queue.send_blocking(input).is_err() {
                            break;
                        }
                    }
                }
                None => {
                    self.frame_origin.lock().expect("frame origin lock poisoned").remove(&frame_id);
                }
            }
        }
        translate_input_queue.close();
    }

    fn run_translate_worker(
        &self,
        translate_input_queue: &BoundedQueue<TranslateInput>,
        overlay_queue: &BoundedQueue<OverlayJob>,
        aggregator: &FrameAggregator,
    ) {
        while let Some(item) = translate_input_queue.recv_blocking() {
            let frame_id = item.block.frame_id;
            let region_id = self.frame_origin.lock().expect("frame origin lock poisoned").get(&frame_id).copied();

            let completed = match self.translate_engine.process(item) {
                Some(translated) => aggregator.add(frame_id, translated),
                None => aggregator.drop_one(frame_id),
            };

            if let Some(blocks) = completed {
                if let Some(region_id) = region_id {
                    let _ = overlay_queue.send_blocking(OverlayJob { region_id, frame_id, blocks });
                }
            }
        }
        overlay_queue.close();
    }

    fn run_overlay_worker(&self, overlay_queue: &BoundedQueue<OverlayJob>) {
        while let Some(job) = overlay_queue.recv_blocking() {
            self.render(job.region_id, job.frame_id, job.blocks);
        }
    }
}

fn snapshot(metrics: &crate::stage::metrics::StageMetrics) -> StageHealth {
    use std::sync::atomic::Ordering as O;
    StageHealth {
        input_count: metrics.input_count.load(O::Relaxed),
        output_count: metrics.output_count.load(O::Relaxed),
        drop_count: metrics.drop_count.load(O::Relaxed),
        skip_count: metrics.skip_count.load(O::Relaxed),
        hook_failure_count: metrics.hook_failure_count.load(O::Relaxed),
        primary_failure_count: metrics.primary_failure_count.load(O::Relaxed),
        last_error: metrics.last_error(),
        throughput_per_sec: metrics.throughput_ema_per_sec(),
    }
}

/// Assembles a `Pipeline` from its plugin instances, optimizer hooks, and
/// resolved region configuration.
pub struct PipelineBuilder {
    mode: SchedulerMode,
    queue_size: usize,
    stop_deadline: Duration,
    clock: Option<SharedClock>,
    regions: Vec<Region>,
    region_pairs: HashMap<RegionId, LanguagePair>,

    capture: Option<Arc<PluginInstance<dyn CapturePlugin>>>,
    ocr_engines: HashMap<String, Arc<PluginInstance<dyn OcrPlugin>>>,
    default_ocr_engine: Option<String>,
    overlay: Option<Arc<PluginInstance<dyn OverlayRenderer>>>,
    router: Option<Arc<TranslationRouter>>,
    dictionary: Option<Arc<SmartDictionary>>,

    capture_pre_hooks: Vec<Arc<dyn crate::stage::PreHook<CaptureInput, Frame>>>,
    capture_post_hooks: Vec<Arc<dyn crate::stage::PostHook<CaptureInput, Frame>>>,
    ocr_pre_hooks: Vec<Arc<dyn crate::stage::PreHook<Frame, Vec<TextBlock>>>>,
    ocr_post_hooks: Vec<Arc<dyn crate::stage::PostHook<Frame, Vec<TextBlock>>>>,
    translate_pre_hooks: Vec<Arc<dyn crate::stage::PreHook<TranslateInput, TranslatedBlock>>>,
    translate_post_hooks: Vec<Arc<dyn crate::stage::PostHook<TranslateInput, TranslatedBlock>>>,

    frame_skip: Option<Arc<FrameSkip>>,
}

impl PipelineBuilder {
    fn new(mode: SchedulerMode) -> Self {
        Self {
            mode,
            queue_size: 16,
            stop_deadline: Duration::from_secs(5),
            clock: None,
            regions: Vec::new(),
            region_pairs: HashMap::new(),
            capture: None,
            ocr_engines: HashMap::new(),
            default_ocr_engine: None,
            overlay: None,
            router: None,
            dictionary: None,
            capture_pre_hooks: Vec::new(),
            capture_post_hooks: Vec::new(),
            ocr_pre_hooks: Vec::new(),
            ocr_post_hooks: Vec::new(),
            translate_pre_hooks: Vec::new(),
            translate_post_hooks: Vec::new(),
            frame_skip: None,
        }
    }

    #[must_use]
    pub fn with_queue_size(mut self, size: usize) -> Self {
        self.queue_size = size.max(1);
        self
    }

    #[must_use]
    pub fn with_stop_deadline(mut self, deadline: Duration) -> Self {
        self.stop_deadline = deadline;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn with_regions(mut self, regions: Vec<Region>, region_pairs: HashMap<RegionId, LanguagePair>) -> Self {
        self.regions = regions;
        self.region_pairs = region_pairs;
        self
    }

    #[must_use]
    pub fn with_capture(mut self, plugin: Arc<PluginInstance<dyn CapturePlugin>>) -> Self {
        self.capture = Some(plugin);
        self
    }

    #[must_use]
    pub fn with_ocr_engine(mut self, name: impl Into<String>, plugin: Arc<PluginInstance<dyn OcrPlugin>>) -> Self {
        let name = name.into();
        if self.default_ocr_engine.is_none() {
            self.default_ocr_engine = Some(name.clone());
        }
        self.ocr_engines.insert(name, plugin);
        self
    }

    #[must_use]
    pub fn with_default_ocr_engine(mut self, name: impl Into<String>) -> Self {
        self.default_ocr_engine = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_overlay(mut self, plugin: Arc<PluginInstance<dyn OverlayRenderer>>) -> Self {
        self.overlay = Some(plugin);
        self
    }

    #[must_use]
    pub fn with_router(mut self, router: Arc<TranslationRouter>) -> Self {
        self.router = Some(router);
        self
    }

    #[must_use]
    pub fn with_dictionary(mut self, dictionary: Arc<SmartDictionary>) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    #[must_use]
    pub fn with_frame_skip(mut self, frame_skip: Arc<FrameSkip>) -> Self {
        self.capture_post_hooks.push(frame_skip.clone());
        self.frame_skip = Some(frame_skip);
        self
    }

    #[must_use]
    pub fn with_capture_pre_hook(mut self, hook: Arc<dyn crate::stage::PreHook<CaptureInput, Frame>>) -> Self {
        self.capture_pre_hooks.push(hook);
        self
    }

    #[must_use]
    pub fn with_ocr_post_hook(mut self, hook: Arc<dyn crate::stage::PostHook<Frame, Vec<TextBlock>>>) -> Self {
        self.ocr_post_hooks.push(hook);
        self
    }

    #[must_use]
    pub fn with_translate_pre_hook(
        mut self,
        hook: Arc<dyn crate::stage::PreHook<TranslateInput, TranslatedBlock>>,
    ) -> Self {
        self.translate_pre_hooks.push(hook);
        self
    }

    #[must_use]
    pub fn with_translate_post_hook(
        mut self,
        hook: Arc<dyn crate::stage::PostHook<TranslateInput, TranslatedBlock>>,
    ) -> Self {
        self.translate_post_hooks.push(hook);
        self
    }

    pub fn build(self) -> CoreResult<Arc<Pipeline>> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(crate::clock::SystemClock::new()));
        let capture = self
            .capture
            .ok_or_else(|| CoreError::configuration("pipeline requires a capture plugin"))?;
        let overlay = self
            .overlay
            .ok_or_else(|| CoreError::configuration("pipeline requires an overlay plugin"))?;
        let router = self
            .router
            .ok_or_else(|| CoreError::configuration("pipeline requires a translation router"))?;
        if self.ocr_engines.is_empty() {
            return Err(CoreError::configuration("pipeline requires at least one ocr engine"));
        }
        let default_ocr_engine = self
            .default_ocr_engine
            .ok_or_else(|| CoreError::configuration("pipeline requires a default ocr engine"))?;

        let mut ocr_region_overrides = HashMap::new();
        for region in &self.regions {
            if let Some(name) = &region.ocr_engine_override {
                ocr_region_overrides.insert(region.id, name.clone());
            }
        }

        let capture_hotswap = Arc::new(HotSwap::new(capture));
        let ocr_hotswaps: HashMap<String, Arc<HotSwap<dyn OcrPlugin>>> = self
            .ocr_engines
            .into_iter()
            .map(|(name, instance)| (name, Arc::new(HotSwap::new(instance))))
            .collect();

        let capture_engine = Arc::new(StageEngine::new(
            "capture",
            Arc::new(CapturePrimary { plugin: capture_hotswap.clone() }) as Arc<dyn Primary<CaptureInput, Frame>>,
            self.capture_pre_hooks,
            self.capture_post_hooks,
            clock.clone(),
        ));
        let ocr_engine = Arc::new(StageEngine::new(
            "ocr",
            Arc::new(OcrPrimary {
                engines: ocr_hotswaps.clone(),
                default_engine: default_ocr_engine,
                region_overrides: ocr_region_overrides,
            }) as Arc<dyn Primary<Frame, Vec<TextBlock>>>,
            self.ocr_pre_hooks,
            self.ocr_post_hooks,
            clock.clone(),
        ));
        let translate_engine = Arc::new(StageEngine::new(
            "translate",
            Arc::new(TranslatePrimary { router: router.clone() }) as Arc<dyn Primary<TranslateInput, TranslatedBlock>>,
            self.translate_pre_hooks,
            self.translate_post_hooks,
            clock.clone(),
        ));

        Ok(Arc::new(Pipeline {
            mode: self.mode,
            queue_size: self.queue_size,
            stop_deadline: self.stop_deadline,
            regions: self.regions,
            region_pairs: self.region_pairs,
            capture_engine,
            ocr_engine,
            translate_engine,
            overlay,
            router,
            capture_hotswap,
            ocr_hotswaps,
            dictionary: self.dictionary,
            frame_skip: self.frame_skip,
            frame_allocator: Mutex::new(FrameIdAllocator::new()),
            frame_origin: Mutex::new(HashMap::new()),
            last_emitted: Mutex::new(HashMap::new()),
            state: Mutex::new(PipelineState::Created),
            shutdown: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            worker_handles: Mutex::new(Vec::new()),
            faulted_stages: Mutex::new(Vec::new()),
        }))
    }
}
