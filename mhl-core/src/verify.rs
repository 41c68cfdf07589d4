use crate::digest::{DigestEngine, HashType};
use crate::error::{ErrorKind, MhlError};
use crate::fs::{self, EntryKind, FileStat};
use crate::manifest::{Manifest, ManifestRecord};
use crate::path::PathComponents;
use crate::progress::Progress;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Check presence and size only; no digests are computed.
    pub existence_only: bool,
    /// Keep going after a failing record instead of stopping the run.
    pub continue_on_error: bool,
    /// File arguments containing `#` are sequence patterns.
    pub sequences: bool,
    /// Check records on the rayon pool. Reported order is unchanged.
    pub parallel: bool,
}

/// Result of checking one record (or one requested path).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    pub path: String,
    pub manifest: Option<String>,
    pub declared_size: Option<u64>,
    pub observed_size: Option<u64>,
    pub hash_type: Option<HashType>,
    pub declared_hash: Option<String>,
    pub observed_hash: Option<String>,
    pub error: Option<ErrorKind>,
    pub message: Option<String>,
}

impl RecordOutcome {
    fn for_record(record: &ManifestRecord) -> Self {
        Self {
            path: record.absolute_path.to_string(),
            manifest: record.source_manifest.as_ref().map(ToString::to_string),
            declared_size: Some(record.size),
            observed_size: None,
            hash_type: Some(record.hash_type),
            declared_hash: record.hash_hex.clone(),
            observed_hash: None,
            error: None,
            message: None,
        }
    }

    fn unlisted(path: &PathComponents) -> Self {
        Self {
            path: path.to_string(),
            manifest: None,
            declared_size: None,
            observed_size: None,
            hash_type: None,
            declared_hash: None,
            observed_hash: None,
            error: None,
            message: None,
        }
    }

    fn fail(mut self, err: MhlError) -> Self {
        self.error = Some(err.kind());
        self.message = Some(err.message().to_string());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub files_processed: usize,
    pub files_ok: usize,
    pub files_failed: usize,
    /// Set when a failure stopped the run before every record was checked.
    pub aborted: bool,
    /// Kind of the most recent failure; decides the run's exit code.
    pub last_error: Option<ErrorKind>,
    pub outcomes: Vec<RecordOutcome>,
}

impl VerifyReport {
    pub fn is_success(&self) -> bool {
        self.last_error.is_none()
    }

    pub fn exit_code(&self) -> u8 {
        self.last_error.map_or(0, ErrorKind::exit_code)
    }

    fn record(&mut self, outcome: RecordOutcome) {
        self.files_processed += 1;
        match outcome.error {
            Some(kind) => {
                self.files_failed += 1;
                self.last_error = Some(kind);
                error!(
                    path = %outcome.path,
                    manifest = outcome.manifest.as_deref().unwrap_or("-"),
                    kind = ?kind,
                    "{}",
                    outcome.message.as_deref().unwrap_or(kind.description())
                );
            }
            None => {
                self.files_ok += 1;
                debug!(path = %outcome.path, "ok");
            }
        }
        self.outcomes.push(outcome);
    }
}

/// Which records a run checks.
#[derive(Clone, Copy, Debug)]
pub enum Discovery<'a> {
    /// Every record of the manifest, nested ones included.
    WholeManifest,
    /// Only these absolute paths; each must be listed in the manifest.
    Explicit(&'a [PathComponents]),
}

pub struct Verifier<'a> {
    manifest: &'a Manifest,
    engine: &'a dyn DigestEngine,
    options: VerifyOptions,
    progress: Progress,
}

impl<'a> Verifier<'a> {
    pub fn new(manifest: &'a Manifest, engine: &'a dyn DigestEngine, options: VerifyOptions) -> Self {
        Self { manifest, engine, options, progress: Progress::disabled() }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Stat every selected record, then check the survivors oldest first.
    pub fn run(&self, discovery: Discovery<'_>) -> VerifyReport {
        let mut report = VerifyReport::default();
        let candidates: Vec<Result<ManifestRecord, &PathComponents>> = match discovery {
            Discovery::WholeManifest => self.manifest.iter().cloned().map(Ok).collect(),
            Discovery::Explicit(paths) => paths
                .iter()
                .map(|p| self.manifest.find(p).cloned().ok_or(p))
                .collect(),
        };
        info!(
            records = candidates.len(),
            existence_only = self.options.existence_only,
            "verification started"
        );

        self.progress.set_stage("stat");
        let mut survivors: Vec<(ManifestRecord, FileStat)> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let result = match candidate {
                Ok(record) => self.stat_record(record),
                Err(path) => Err(RecordOutcome::unlisted(path).fail(MhlError::new(
                    ErrorKind::NoMhlEntry,
                    format!("{path} is not listed in the MHL file"),
                ))),
            };
            match result {
                Ok(entry) => survivors.push(entry),
                Err(outcome) => {
                    report.record(outcome);
                    if !self.options.continue_on_error {
                        report.aborted = true;
                        info!("verification aborted");
                        return report;
                    }
                }
            }
        }

        // Stable: equal timestamps keep manifest order.
        survivors.sort_by_key(|(r, _)| r.last_modified);

        self.progress.set_stage("check");
        self.progress.set_files_total(survivors.len());
        for (_, st) in &survivors {
            self.progress.add_bytes_total(st.size);
        }

        if self.options.parallel {
            // Lowest failing index seen so far; later records are skipped unless continuing.
            let first_failure = AtomicUsize::new(usize::MAX);
            let outcomes: Vec<Option<RecordOutcome>> = survivors
                .par_iter()
                .enumerate()
                .map(|(i, (r, st))| {
                    if !self.options.continue_on_error && i > first_failure.load(Ordering::Relaxed) {
                        return None;
                    }
                    let outcome = self.check_record(r, st);
                    if !outcome.is_ok() {
                        first_failure.fetch_min(i, Ordering::Relaxed);
                    }
                    Some(outcome)
                })
                .collect();
            for outcome in outcomes.into_iter().flatten() {
                let failed = !outcome.is_ok();
                report.record(outcome);
                if failed && !self.options.continue_on_error {
                    report.aborted = true;
                    break;
                }
            }
        } else {
            for (r, st) in &survivors {
                let outcome = self.check_record(r, st);
                let failed = !outcome.is_ok();
                report.record(outcome);
                if failed && !self.options.continue_on_error {
                    report.aborted = true;
                    break;
                }
            }
        }

        info!(
            processed = report.files_processed,
            ok = report.files_ok,
            failed = report.files_failed,
            "verification finished"
        );
        report
    }

    fn stat_record(&self, mut record: ManifestRecord) -> Result<(ManifestRecord, FileStat), RecordOutcome> {
        let native = record.absolute_path.to_path_buf();
        match fs::stat(&native) {
            Ok(st) if st.kind == EntryKind::File => {
                record.last_modified = Some(st.mtime);
                Ok((record, st))
            }
            Ok(_) => {
                let path = record.absolute_path.to_string();
                Err(RecordOutcome::for_record(&record)
                    .fail(MhlError::new(ErrorKind::NotFile, format!("{path} is not a regular file"))))
            }
            Err(e) => Err(RecordOutcome::for_record(&record).fail(e)),
        }
    }

    fn check_record(&self, record: &ManifestRecord, st: &FileStat) -> RecordOutcome {
        let mut outcome = RecordOutcome::for_record(record);
        outcome.observed_size = Some(st.size);
        let result = self.check(record, st, &mut outcome);
        self.progress.inc_file();
        match result {
            Ok(()) => outcome,
            Err(e) => outcome.fail(e),
        }
    }

    fn check(&self, record: &ManifestRecord, st: &FileStat, outcome: &mut RecordOutcome) -> Result<(), MhlError> {
        if st.size != record.size {
            return Err(MhlError::new(
                ErrorKind::FileSizeCheckFailed,
                format!(
                    "size mismatch for {}: declared {}, observed {}",
                    record.absolute_path, record.size, st.size
                ),
            ));
        }
        if self.options.existence_only || record.hash_type == HashType::Null {
            return Ok(());
        }
        let declared = record.hash_hex.as_deref().unwrap_or_default();
        let digest = self.engine.compute(&record.absolute_path.to_path_buf(), record.hash_type)?;
        outcome.observed_hash = Some(digest.to_hex());
        if !digest.matches(declared) {
            return Err(MhlError::new(
                ErrorKind::HashCheckFailed,
                format!(
                    "{} mismatch for {}: declared {declared}, observed {digest}",
                    record.hash_type, record.absolute_path
                ),
            ));
        }
        Ok(())
    }
}
