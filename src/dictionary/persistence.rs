use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::dictionary::entry::DictionaryEntry;
use crate::error::CoreError;
use crate::model::LanguagePair;

const SCHEMA_VERSION: &str = "smart-dictionary.v1";

#[derive(Serialize, Deserialize)]
struct FileHeader {
    schema_version: String,
    source_lang: String,
    target_lang: String,
    created_at: u64,
    modified_at: u64,
    entry_count: usize,
}

#[derive(Serialize, Deserialize)]
struct FileBody {
    header: FileHeader,
    entries: Vec<DictionaryEntry>,
}

#[must_use]
pub fn file_path_for(dir: &Path, pair: &LanguagePair) -> PathBuf {
    dir.join(format!("{}_{}.dict.gz", pair.source(), pair.target()))
}

/// Writes `entries` for `pair` to its backing file using the write-to-temp,
/// fsync, rename protocol required by §6: the file either contains the
/// exact new state, or (on an interrupted rename) the previous committed
/// state — never a torn write.
pub fn save(
    dir: &Path,
    pair: &LanguagePair,
    created_at: u64,
    modified_at: u64,
    entries: &HashMap<String, DictionaryEntry>,
) -> Result<(), CoreError> {
    std::fs::create_dir_all(dir).map_err(|e| persistence_error(pair, e))?;
    let path = file_path_for(dir, pair);
    let tmp_path = path.with_extension("dict.gz.tmp");

    let mut values: Vec<DictionaryEntry> = entries.values().cloned().collect();
    values.sort_by(|a, b| a.source_text.cmp(&b.source_text));
    let body = FileBody {
        header: FileHeader {
            schema_version: SCHEMA_VERSION.to_string(),
            source_lang: pair.source().to_string(),
            target_lang: pair.target().to_string(),
            created_at,
            modified_at,
            entry_count: values.len(),
        },
        entries: values,
    };

    let json = serde_json::to_vec(&body).map_err(|e| persistence_error(pair, e))?;
    {
        let file = std::fs::File::create(&tmp_path).map_err(|e| persistence_error(pair, e))?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(&json).map_err(|e| persistence_error(pair, e))?;
        let file = encoder.finish().map_err(|e| persistence_error(pair, e))?;
        file.sync_all().map_err(|e| persistence_error(pair, e))?;
    }
    std::fs::rename(&tmp_path, &path).map_err(|e| persistence_error(pair, e))?;
    Ok(())
}

/// Loads a pair's dictionary file, if present. Returns an empty map (and no
/// header) when the file does not exist yet — a fresh pair with no prior
/// learning.
pub fn load(
    dir: &Path,
    pair: &LanguagePair,
) -> Result<(HashMap<String, DictionaryEntry>, u64), CoreError> {
    let path = file_path_for(dir, pair);
    if !path.exists() {
        return Ok((HashMap::new(), 0));
    }
    let file = std::fs::File::open(&path).map_err(|e| persistence_error(pair, e))?;
    let mut decoder = GzDecoder::new(file);
    let mut bytes = Vec::new();
    decoder
        .read_to_end(&mut bytes)
        .map_err(|e| persistence_error(pair, e))?;
    let body: FileBody = serde_json::from_slice(&bytes).map_err(|e| persistence_error(pair, e))?;
    let map = body
        .entries
        .into_iter()
        .map(|e| (e.source_text.clone(), e))
        .collect();
    Ok((map, body.header.created_at))
}

/// Serializes just the entries (no file header semantics beyond the
/// schema used by `save`/`load`) for the `export`/`import` API of §4.4.
pub fn export_bytes(
    pair: &LanguagePair,
    created_at: u64,
    modified_at: u64,
    entries: &HashMap<String, DictionaryEntry>,
) -> Result<Vec<u8>, CoreError> {
    let mut values: Vec<DictionaryEntry> = entries.values().cloned().collect();
    values.sort_by(|a, b| a.source_text.cmp(&b.source_text));
    let body = FileBody {
        header: FileHeader {
            schema_version: SCHEMA_VERSION.to_string(),
            source_lang: pair.source().to_string(),
            target_lang: pair.target().to_string(),
            created_at,
            modified_at,
            entry_count: values.len(),
        },
        entries: values,
    };
    serde_json::to_vec(&body).map_err(|e| persistence_error(pair, e))
}

pub fn import_bytes(
    pair: &LanguagePair,
    bytes: &[u8],
) -> Result<Vec<DictionaryEntry>, CoreError> {
    let body: FileBody = serde_json::from_slice(bytes).map_err(|e| persistence_error(pair, e))?;
    Ok(body.entries)
}

fn persistence_error(pair: &LanguagePair, err: impl std::fmt::Display) -> CoreError {
    CoreError::Persistence {
        pair: pair.as_key(),
        reason: err.to_string(),
    }
}
