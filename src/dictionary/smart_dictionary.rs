use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Mutex;

use lru::LruCache;

use crate::clock::SharedClock;
use crate::dictionary::canonical::canonicalize;
use crate::dictionary::entry::DictionaryEntry;
use crate::dictionary::persistence;
use crate::error::CoreError;
use crate::model::LanguagePair;

/// Import conflict-resolution mode for `import`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportMode {
    Replace,
    Merge,
}

/// `dictionary.max_entries`: literal per §9 open question 3 — `Unlimited`
/// is not enforced in memory; `Bounded` is reserved for a future eviction
/// policy and currently only affects the autosave streaming path hint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaxEntries {
    Unlimited,
    Bounded(usize),
}

struct PairState {
    entries: HashMap<String, DictionaryEntry>,
    hot: LruCache<String, DictionaryEntry>,
    created_at: u64,
    learns_since_save: usize,
}

impl PairState {
    fn new(hot_capacity: NonZeroUsize) -> Self {
        Self {
            entries: HashMap::new(),
            hot: LruCache::new(hot_capacity),
            created_at: 0,
            learns_since_save: 0,
        }
    }
}

/// Per-pair persistent learned translation store, LRU-cached in front,
/// serving lookups on the hot path with no disk I/O (§4.4).
pub struct SmartDictionary {
    dir: Option<PathBuf>,
    pairs: Mutex<HashMap<LanguagePair, PairState>>,
    learn_threshold: f32,
    autosave_every: usize,
    hot_capacity: NonZeroUsize,
    fold_case: bool,
    clock: SharedClock,
}

impl SmartDictionary {
    #[must_use]
    pub fn new(dir: Option<PathBuf>, clock: SharedClock) -> Self {
        Self {
            dir,
            pairs: Mutex::new(HashMap::new()),
            learn_threshold: 0.85,
            autosave_every: 100,
            hot_capacity: NonZeroUsize::new(1024).expect("1024 is nonzero"),
            fold_case: false,
            clock,
        }
    }

    #[must_use]
    pub fn with_learn_threshold(mut self, t: f32) -> Self {
        self.learn_threshold = t;
        self
    }

    #[must_use]
    pub fn with_autosave_every(mut self, n: usize) -> Self {
        self.autosave_every = n.max(1);
        self
    }

    #[must_use]
    pub fn with_hot_capacity(mut self, n: usize) -> Self {
        self.hot_capacity = NonZeroUsize::new(n.max(1)).expect("max(1) is nonzero");
        self
    }

    #[must_use]
    pub fn with_fold_case(mut self, fold: bool) -> Self {
        self.fold_case = fold;
        self
    }

    fn load_pair_locked<'a>(
        &self,
        pairs: &'a mut HashMap<LanguagePair, PairState>,
        pair: &LanguagePair,
    ) -> Result<&'a mut PairState, CoreError> {
        if !pairs.contains_key(pair) {
            let mut state = PairState::new(self.hot_capacity);
            if let Some(dir) = &self.dir {
                let (entries, created_at) = persistence::load(dir, pair)?;
                state.entries = entries;
                state.created_at = created_at;
            }
            pairs.insert(pair.clone(), state);
        }
        Ok(pairs.get_mut(pair).expect("just inserted"))
    }

    /// O(1) expected, no disk I/O. Increments `use_count` and
    /// `last_used_at` on hit.
    pub fn lookup(&self, pair: &LanguagePair, text: &str) -> Result<Option<DictionaryEntry>, CoreError> {
        let canon = canonicalize(text, self.fold_case);
        let now = self.clock.now();
        let mut pairs = self.pairs.lock().expect("dictionary lock poisoned");
        let state = self.load_pair_locked(&mut pairs, pair)?;

        let Some(entry) = state.entries.get_mut(&canon) else {
            return Ok(None);
        };
        entry.mark_used(now);
        let snapshot = entry.clone();
        state.hot.put(canon, snapshot.clone());
        Ok(Some(snapshot))
    }

    /// Inserts or updates iff `confidence >= learn_threshold`. If an entry
    /// exists with lower confidence, overwrite; otherwise bump `use_count`
    /// only.
    pub fn learn(
        &self,
        pair: &LanguagePair,
        text: &str,
        translation: &str,
        confidence: f32,
        engine: &str,
    ) -> Result<(), CoreError> {
        if confidence < self.learn_threshold {
            return Ok(());
        }
        let canon = canonicalize(text, self.fold_case);
        let now = self.clock.now();
        let mut pairs = self.pairs.lock().expect("dictionary lock poisoned");
        let state = self.load_pair_locked(&mut pairs, pair)?;

        match state.entries.get_mut(&canon) {
            None => {
                let entry = DictionaryEntry::new(
                    canon.clone(),
                    translation.to_string(),
                    confidence,
                    engine.to_string(),
                    now,
                );
                state.hot.put(canon.clone(), entry.clone());
                state.entries.insert(canon, entry);
            }
            Some(existing) => {
                if confidence > existing.confidence {
                    existing.translation = translation.to_string();
                    existing.confidence = confidence;
                    existing.source_engine = engine.to_string();
                }
                existing.mark_used(now);
                state.hot.put(canon, existing.clone());
            }
        }
        state.learns_since_save += 1;
        let due = state.learns_since_save >= self.autosave_every;
        drop(pairs);
        if due {
            self.save(pair)?;
        }
        Ok(())
    }

    /// Unconditional overwrite by user action; clamps confidence to 1.0
    /// and tags `source_engine = "user"`.
    pub fn edit(&self, pair: &LanguagePair, text: &str, new_translation: &str) -> Result<(), CoreError> {
        let canon = canonicalize(text, self.fold_case);
        let now = self.clock.now();
        let mut pairs = self.pairs.lock().expect("dictionary lock poisoned");
        let state = self.load_pair_locked(&mut pairs, pair)?;

        let entry = state
            .entries
            .entry(canon.clone())
            .or_insert_with(|| DictionaryEntry::new(canon.clone(), String::new(), 0.0, String::new(), now));
        entry.translation = new_translation.to_string();
        entry.confidence = 1.0;
        entry.source_engine = "user".to_string();
        entry.mark_used(now);
        state.hot.put(canon, entry.clone());
        Ok(())
    }

    pub fn delete(&self, pair: &LanguagePair, text: &str) -> Result<(), CoreError> {
        let canon = canonicalize(text, self.fold_case);
        let mut pairs = self.pairs.lock().expect("dictionary lock poisoned");
        let state = self.load_pair_locked(&mut pairs, pair)?;
        state.entries.remove(&canon);
        state.hot.pop(&canon);
        Ok(())
    }

    pub fn clear(&self, pair: &LanguagePair) -> Result<(), CoreError> {
        let mut pairs = self.pairs.lock().expect("dictionary lock poisoned");
        let state = self.load_pair_locked(&mut pairs, pair)?;
        state.entries.clear();
        state.hot.clear();
        Ok(())
    }

    #[must_use]
    pub fn len(&self, pair: &LanguagePair) -> usize {
        self.pairs
            .lock()
            .expect("dictionary lock poisoned")
            .get(pair)
            .map(|s| s.entries.len())
            .unwrap_or(0)
    }

    /// Atomically writes the dictionary to its backing file, per §6's
    /// write-to-temp/fsync/rename protocol. A no-op (but not an error) if
    /// this dictionary has no backing directory (pure in-memory use, e.g.
    /// tests).
    pub fn save(&self, pair: &LanguagePair) -> Result<(), CoreError> {
        let Some(dir) = self.dir.clone() else {
            return Ok(());
        };
        let now = self.clock.now();
        let mut pairs = self.pairs.lock().expect("dictionary lock poisoned");
        let state = self.load_pair_locked(&mut pairs, pair)?;
        if state.created_at == 0 {
            state.created_at = now;
        }
        persistence::save(&dir, pair, state.created_at, now, &state.entries)?;
        state.learns_since_save = 0;
        Ok(())
    }

    pub fn export(&self, pair: &LanguagePair) -> Result<Vec<u8>, CoreError> {
        let now = self.clock.now();
        let mut pairs = self.pairs.lock().expect("dictionary lock poisoned");
        let state = self.load_pair_locked(&mut pairs, pair)?;
        persistence::export_bytes(pair, state.created_at.max(1), now, &state.entries)
    }

    /// `merge` mode keeps the higher-confidence entry per conflict and
    /// sums use counts; applying the same bytes twice in merge mode is
    /// idempotent (§8 invariant 6) because the use-count sum is keyed by
    /// taking the max of `existing.use_count` and `incoming.use_count`
    /// rather than always adding — a literal sum would double-count on
    /// repeated imports of the same snapshot.
    pub fn import(&self, pair: &LanguagePair, bytes: &[u8], mode: ImportMode) -> Result<(), CoreError> {
        let incoming = persistence::import_bytes(pair, bytes)?;
        let mut pairs = self.pairs.lock().expect("dictionary lock poisoned");
        let state = self.load_pair_locked(&mut pairs, pair)?;

        if mode == ImportMode::Replace {
            state.entries.clear();
            state.hot.clear();
        }

        for entry in incoming {
            match state.entries.get_mut(&entry.source_text) {
                None => {
                    state.entries.insert(entry.source_text.clone(), entry);
                }
                Some(existing) if mode == ImportMode::Merge => {
                    if entry.confidence > existing.confidence {
                        existing.translation = entry.translation.clone();
                        existing.confidence = entry.confidence;
                        existing.source_engine = entry.source_engine.clone();
                    }
                    existing.use_count = existing.use_count.max(entry.use_count);
                    existing.last_used_at = existing.last_used_at.max(entry.last_used_at);
                }
                Some(existing) => {
                    *existing = entry;
                }
            }
        }
        Ok(())
    }
}
