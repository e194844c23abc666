use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use super::{parse_record, serialize_record, Record, RecordError, RecordPatch};

/// Reads and writes `<dir>/<context>-inventory.yaml`
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record file for a cluster context
    pub fn path_for(&self, context: &str) -> PathBuf {
        self.dir
            .join(format!("{}-inventory.yaml", file_stem(context)))
    }

    /// Load the record for `context`; a missing file is an empty record
    pub fn load(&self, context: &str) -> Result<Record, RecordError> {
        let path = self.path_for(context);
        if !path.exists() {
            debug!("No record at {}, starting empty", path.display());
            return Ok(Record::default());
        }
        let content = fs::read_to_string(&path).map_err(|source| RecordError::Read {
            path: path.clone(),
            source,
        })?;
        parse_record(&content)
    }

    /// Merge `patch` into the stored record and write it atomically
    pub fn save(&self, context: &str, patch: &RecordPatch) -> Result<Record, RecordError> {
        let mut record = self.load(context)?;
        record.apply(patch);

        let path = self.path_for(context);
        let write_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| RecordError::Write { path, source }
        };

        fs::create_dir_all(&self.dir).map_err(write_err(&self.dir))?;

        let content = serialize_record(&record)?;
        let tmp_path = path.with_extension("yaml.tmp");
        fs::write(&tmp_path, content).map_err(write_err(&tmp_path))?;
        fs::rename(&tmp_path, &path).map_err(write_err(&path))?;

        debug!("Saved record for {} to {}", context, path.display());
        Ok(record)
    }
}

/// Make a context name safe to use as a file name
pub fn sanitize_context(context: &str) -> String {
    let cleaned: String = context
        .trim()
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "default".to_string()
    } else {
        cleaned
    }
}

/// File name stem for `context`
///
/// Names that had to be sanitized get a short hash of the raw context, so
/// `a/b` and `a_b` never share a record.
pub fn file_stem(context: &str) -> String {
    let sanitized = sanitize_context(context);
    if sanitized == context {
        return sanitized;
    }
    let mut hasher = Sha256::new();
    hasher.update(context.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    format!("{}-{}", sanitized, &hash[..8])
}
