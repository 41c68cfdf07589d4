use crate::digest::{DigestEngine, HashType};
use crate::error::{ErrorKind, MhlError, Result};
use crate::fs::{self, EntryKind, FileStat};
use crate::hashlist::DigestLine;
use crate::manifest::{Manifest, ManifestRecord};
use crate::path::{PathComponents, Separator};
use crate::progress::Progress;
use crate::writer::{CreatorInfo, OutputManifestSet};
use chrono::Utc;
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Clone, Debug, Default)]
pub struct SealOptions {
    pub hash_types: Vec<HashType>,
    /// Absolute folders that receive a manifest. Empty means the working
    /// directory.
    pub output_dirs: Vec<PathComponents>,
    /// File arguments containing `#` are sequence patterns.
    pub sequences: bool,
    /// Hash files on the rayon pool; manifests still list them in input order.
    pub parallel: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SealReport {
    pub files_sealed: usize,
    pub manifests: Vec<PathBuf>,
}

/// Requested digest types, deduplicated in canonical order. `null` cannot be
/// sealed.
pub fn validate_hash_types(types: &[HashType]) -> Result<Vec<HashType>> {
    if types.is_empty() {
        return Err(MhlError::new(ErrorKind::WrongArguments, "at least one hash type is required"));
    }
    if types.contains(&HashType::Null) {
        return Err(MhlError::new(ErrorKind::WrongArguments, "hash type 'null' cannot be used for sealing"));
    }
    let mut out = types.to_vec();
    out.sort();
    out.dedup();
    Ok(out)
}

fn output_set(output_dirs: &[PathComponents]) -> Result<OutputManifestSet> {
    if output_dirs.is_empty() {
        OutputManifestSet::new([PathComponents::current_dir()?])
    } else {
        OutputManifestSet::new(output_dirs.iter().cloned())
    }
}

/// `path` must be an existing regular file.
fn stat_regular(path: &PathComponents) -> Result<FileStat> {
    let st = fs::stat(&path.to_path_buf())?;
    if st.kind != EntryKind::File {
        return Err(MhlError::new(ErrorKind::NotFile, format!("{path} is not a regular file")));
    }
    Ok(st)
}

fn check_locations(outputs: &OutputManifestSet, files: &[PathComponents]) -> Result<()> {
    for file in files {
        if !outputs.locations().iter().any(|l| l.dir.is_nested(file)) {
            return Err(MhlError::new(
                ErrorKind::WrongFileLocation,
                format!("{file} is not located under any output folder"),
            ));
        }
    }
    Ok(())
}

pub struct Sealer<'a> {
    engine: &'a dyn DigestEngine,
    options: SealOptions,
    progress: Progress,
}

impl<'a> Sealer<'a> {
    pub fn new(engine: &'a dyn DigestEngine, options: SealOptions) -> Self {
        Self { engine, options, progress: Progress::disabled() }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Hash `files` (absolute, normalized) and write one manifest per output
    /// folder. Stops at the first failing file; nothing is written then.
    pub fn seal(&self, files: &[PathComponents], tool: &str) -> Result<SealReport> {
        let hash_types = validate_hash_types(&self.options.hash_types)?;
        let mut outputs = output_set(&self.options.output_dirs)?;
        check_locations(&outputs, files)?;
        let mut creator = CreatorInfo::current(tool);
        info!(files = files.len(), types = ?hash_types, "sealing started");

        self.progress.set_stage("stat");
        let stats: Vec<FileStat> = files.iter().map(stat_regular).collect::<Result<_>>()?;
        self.progress.set_files_total(files.len());
        for st in &stats {
            self.progress.add_bytes_total(st.size);
        }

        self.progress.set_stage("hash");
        let hash_one = |(path, st): (&PathComponents, &FileStat)| -> Result<ManifestRecord> {
            let digests = self.engine.compute_many(&path.to_path_buf(), &hash_types)?;
            self.progress.inc_file();
            debug!(path = %path, "hashed");
            ManifestRecord::from_digests(path.clone(), path.render(Separator::Uniform), st.size, st.mtime, &digests)
        };
        let records: Vec<ManifestRecord> = if self.options.parallel {
            files.par_iter().zip(stats.par_iter()).map(hash_one).collect::<Result<_>>()?
        } else {
            files.iter().zip(stats.iter()).map(hash_one).collect::<Result<_>>()?
        };

        let files_sealed = assign_unique(&mut outputs, records)?;
        creator.finish = Utc::now();
        let manifests = outputs.write_all(&creator)?;
        info!(files = files_sealed, manifests = manifests.len(), "sealing finished");
        Ok(SealReport { files_sealed, manifests })
    }

    /// Write manifests from precomputed digest lines. Paths are resolved
    /// against `cwd`; each listed file is stat-ed for size and modification
    /// time. Several lines for one file merge into one record.
    pub fn seal_listed(&self, lines: &[DigestLine], cwd: &PathComponents, tool: &str) -> Result<SealReport> {
        let mut outputs = output_set(&self.options.output_dirs)?;
        let mut creator = CreatorInfo::current(tool);

        let mut order: Vec<PathComponents> = Vec::new();
        let mut grouped: std::collections::HashMap<String, Vec<(HashType, String)>> =
            std::collections::HashMap::new();
        for line in lines {
            let path = PathComponents::resolve(&line.path, cwd)?;
            let entry = grouped.entry(path.key()).or_insert_with(|| {
                order.push(path.clone());
                Vec::new()
            });
            if let Some(hash) = &line.hash {
                entry.push((line.hash_type, hash.clone()));
            }
        }
        check_locations(&outputs, &order)?;

        let mut records = Vec::with_capacity(order.len());
        for path in order {
            let st = stat_regular(&path)?;
            let hashes = grouped.remove(&path.key()).unwrap_or_default();
            let rel = path.render(Separator::Uniform);
            records.push(ManifestRecord::from_hashes(path, rel, st.size, st.mtime, hashes));
        }

        let files_sealed = assign_unique(&mut outputs, records)?;
        creator.finish = Utc::now();
        let manifests = outputs.write_all(&creator)?;
        Ok(SealReport { files_sealed, manifests })
    }
}

/// Assign each record once; repeated paths keep their first occurrence.
fn assign_unique(outputs: &mut OutputManifestSet, records: Vec<ManifestRecord>) -> Result<usize> {
    let mut seen = Manifest::new();
    let mut count = 0;
    for record in records {
        if seen.insert(record.clone()).is_some() {
            debug!(path = %record.absolute_path, "listed twice, sealed once");
            continue;
        }
        outputs.assign(record)?;
        count += 1;
    }
    Ok(count)
}
