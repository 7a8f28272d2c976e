//! `PatternStore` — the authoritative, hot-reloadable set of [`Pattern`]s
//! (spec §3, §5, §9 "hot-reload atomicity").
//!
//! Built-in patterns are immutable. Dynamic patterns are appended only by
//! the evolver (C12) and persisted to `dynamic_patterns.json` (spec §6).
//! Readers take an `Arc` snapshot at the start of each request; writers
//! publish a brand-new snapshot under a short-lived write lock rather than
//! mutating the compiled set in place, so a reader never observes a
//! partially-updated pattern list.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use regex::RegexBuilder;

use crate::error::{Error, Result};
use crate::model::Pattern;

/// A single compiled pattern: the declared [`Pattern`] plus its compiled
/// regex set.
pub struct CompiledPattern {
    /// The source pattern.
    pub pattern: Pattern,
    /// Compiled regex bodies, in the same order as `pattern.regexes`.
    pub regexes: Vec<regex::Regex>,
}

impl CompiledPattern {
    fn compile(pattern: Pattern) -> Result<Self> {
        pattern.validate()?;
        let regexes = pattern
            .regexes
            .iter()
            .map(|body| {
                RegexBuilder::new(body)
                    .case_insensitive(pattern.case_insensitive)
                    .build()
                    .map_err(|e| {
                        Error::Validation(format!(
                            "pattern {} regex {body:?} failed to compile: {e}",
                            pattern.id
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CompiledPattern { pattern, regexes })
    }
}

/// An immutable, atomically-published snapshot of the full pattern set.
#[derive(Default)]
pub struct Snapshot {
    /// Compiled built-in and dynamic patterns, concatenated.
    patterns: Vec<Arc<CompiledPattern>>,
}

impl Snapshot {
    /// All compiled patterns in this snapshot.
    #[must_use]
    pub fn patterns(&self) -> &[Arc<CompiledPattern>] {
        &self.patterns
    }
}

/// The hot-reloadable pattern store.
pub struct PatternStore {
    built_in: Vec<Pattern>,
    dynamic: RwLock<Vec<Pattern>>,
    snapshot: RwLock<Arc<Snapshot>>,
    version: AtomicU64,
    dynamic_patterns_path: Option<PathBuf>,
}

impl PatternStore {
    /// Build a store from a fixed built-in pattern set, with no dynamic
    /// patterns and no persistence path.
    #[must_use]
    pub fn new(built_in: Vec<Pattern>) -> Self {
        let store = PatternStore {
            built_in,
            dynamic: RwLock::new(Vec::new()),
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            version: AtomicU64::new(0),
            dynamic_patterns_path: None,
        };
        store.republish();
        store
    }

    /// Build a store that persists its dynamic generation to
    /// `dynamic_patterns_path`, loading any existing contents first (spec
    /// §6: "on startup the store loads it").
    pub fn with_persistence(built_in: Vec<Pattern>, dynamic_patterns_path: PathBuf) -> Result<Self> {
        let loaded = if dynamic_patterns_path.exists() {
            let contents = fs::read_to_string(&dynamic_patterns_path).map_err(|e| {
                Error::Config(format!(
                    "failed to read {}: {e}",
                    dynamic_patterns_path.display()
                ))
            })?;
            serde_json::from_str::<Vec<Pattern>>(&contents).map_err(|e| {
                Error::Config(format!(
                    "dynamic patterns file {} is malformed: {e}",
                    dynamic_patterns_path.display()
                ))
            })?
        } else {
            Vec::new()
        };
        let store = PatternStore {
            built_in,
            dynamic: RwLock::new(loaded),
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            version: AtomicU64::new(0),
            dynamic_patterns_path: Some(dynamic_patterns_path),
        };
        store.republish();
        Ok(store)
    }

    /// The current version counter. Readers observing version `v` see a
    /// superset of any snapshot observed at a version `< v` restricted to
    /// dynamic additions (spec §5 ordering guarantees).
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Take a local handle on the current snapshot. Call once per request;
    /// do not hold across requests.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Number of patterns currently installed (built-in + dynamic).
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().patterns.len()
    }

    /// Whether the store has no patterns at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn republish(&self) {
        let dynamic = self.dynamic.read().clone();
        let mut compiled = Vec::with_capacity(self.built_in.len() + dynamic.len());
        for pattern in self.built_in.iter().cloned().chain(dynamic) {
            match CompiledPattern::compile(pattern) {
                Ok(cp) => compiled.push(Arc::new(cp)),
                Err(e) => {
                    tracing::warn!(error = %e, "dropping pattern that failed to compile during republish");
                }
            }
        }
        let new_snapshot = Arc::new(Snapshot { patterns: compiled });
        *self.snapshot.write() = new_snapshot;
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Atomically append a batch of already-validated dynamic patterns and
    /// republish. Either the whole batch installs or — on a persistence
    /// failure — none of it does, leaving the on-disk file byte-identical
    /// to before (spec §4.12 step 5, §8 "dynamic pattern deploy is
    /// atomic").
    pub fn deploy_batch(&self, patterns: Vec<Pattern>) -> Result<()> {
        if patterns.is_empty() {
            return Ok(());
        }
        let mut guard = self.dynamic.write();
        let mut candidate = guard.clone();
        candidate.extend(patterns);

        if let Some(path) = &self.dynamic_patterns_path {
            write_atomically(path, &candidate)?;
        }

        *guard = candidate;
        drop(guard);
        self.republish();
        Ok(())
    }

    /// The next `DYN-{n}` id to assign, starting at 1000 (spec §4.12 step 4).
    #[must_use]
    pub fn next_dynamic_id(&self) -> String {
        let max_existing = self
            .dynamic
            .read()
            .iter()
            .filter_map(|p| p.id.strip_prefix("DYN-"))
            .filter_map(|n| n.parse::<u64>().ok())
            .max();
        let next = max_existing.map_or(1000, |n| n + 1);
        format!("DYN-{next}")
    }

    /// Whether `id` is already present among built-in or dynamic patterns.
    #[must_use]
    pub fn contains_id(&self, id: &str) -> bool {
        self.built_in.iter().any(|p| p.id == id) || self.dynamic.read().iter().any(|p| p.id == id)
    }
}

/// Write `patterns` to `path` atomically: write-to-temp, fsync, rename
/// (spec §6).
fn write_atomically(path: &Path, patterns: &[Pattern]) -> Result<()> {
    let json = serde_json::to_vec_pretty(patterns)
        .map_err(|e| Error::Config(format!("failed to serialize dynamic patterns: {e}")))?;
    let tmp_path = path.with_extension("json.tmp");
    {
        use std::io::Write;
        let mut file = fs::File::create(&tmp_path)
            .map_err(|e| Error::Config(format!("failed to create {}: {e}", tmp_path.display())))?;
        file.write_all(&json)
            .map_err(|e| Error::Config(format!("failed to write {}: {e}", tmp_path.display())))?;
        file.sync_all()
            .map_err(|e| Error::Config(format!("failed to fsync {}: {e}", tmp_path.display())))?;
    }
    fs::rename(&tmp_path, path)
        .map_err(|e| Error::Config(format!("failed to rename into {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Severity};

    fn sample_pattern(id: &str) -> Pattern {
        Pattern {
            id: id.to_string(),
            category: Category::Jailbreak,
            regexes: vec!["ignore all".to_string()],
            severity: Severity::High,
            base_confidence: 0.8,
            description: "test pattern".to_string(),
            case_insensitive: true,
        }
    }

    #[test]
    fn version_starts_nonzero_after_construction() {
        let store = PatternStore::new(vec![sample_pattern("BUILTIN-1")]);
        assert!(store.version() >= 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn deploy_batch_bumps_version_and_extends_snapshot() {
        let store = PatternStore::new(vec![sample_pattern("BUILTIN-1")]);
        let v0 = store.version();
        store
            .deploy_batch(vec![sample_pattern("DYN-1000")])
            .unwrap();
        assert_eq!(store.version(), v0 + 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn built_in_patterns_are_a_subset_after_dynamic_growth() {
        let store = PatternStore::new(vec![sample_pattern("BUILTIN-1")]);
        let before: Vec<String> = store
            .snapshot()
            .patterns()
            .iter()
            .map(|p| p.pattern.id.clone())
            .collect();
        store
            .deploy_batch(vec![sample_pattern("DYN-1000")])
            .unwrap();
        let after: Vec<String> = store
            .snapshot()
            .patterns()
            .iter()
            .map(|p| p.pattern.id.clone())
            .collect();
        assert!(before.iter().all(|id| after.contains(id)));
    }

    #[test]
    fn next_dynamic_id_starts_at_1000_and_increments() {
        let store = PatternStore::new(vec![]);
        assert_eq!(store.next_dynamic_id(), "DYN-1000");
        store
            .deploy_batch(vec![sample_pattern("DYN-1000")])
            .unwrap();
        assert_eq!(store.next_dynamic_id(), "DYN-1001");
    }

    #[test]
    fn deploy_is_atomic_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dynamic_patterns.json");
        let store = PatternStore::with_persistence(vec![], path.clone()).unwrap();
        store
            .deploy_batch(vec![sample_pattern("DYN-1000")])
            .unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        let patterns: Vec<Pattern> = serde_json::from_str(&contents).unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].id, "DYN-1000");
    }

    #[test]
    fn contains_id_checks_both_generations() {
        let store = PatternStore::new(vec![sample_pattern("BUILTIN-1")]);
        assert!(store.contains_id("BUILTIN-1"));
        assert!(!store.contains_id("DYN-9999"));
        store
            .deploy_batch(vec![sample_pattern("DYN-1000")])
            .unwrap();
        assert!(store.contains_id("DYN-1000"));
    }
}
