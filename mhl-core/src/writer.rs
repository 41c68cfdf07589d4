//! Output side of sealing: grouping records under output folders and
//! serializing each group as an MHL document.

use crate::digest::HashType;
use crate::error::{ErrorKind, MhlError, Result};
use crate::manifest::{self, ManifestRecord, MHL_EXTENSION};
use crate::path::PathComponents;
use crate::xml::XmlWriter;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::{info, warn};

const MHL_VERSION: &str = "1.1";
const FILE_NAME_TIME_FORMAT: &str = "%Y-%m-%d_%H%M%S";

/// Who produced a manifest and when.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatorInfo {
    pub name: String,
    pub username: String,
    pub hostname: String,
    pub tool: String,
    pub start: DateTime<Utc>,
    pub finish: DateTime<Utc>,
}

impl CreatorInfo {
    /// Details of the current user and host, starting now.
    pub fn current(tool: impl Into<String>) -> Self {
        let username = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        let now = Utc::now();
        Self {
            name: username.clone(),
            username,
            hostname: hostname(),
            tool: tool.into(),
            start: now,
            finish: now,
        }
    }
}

fn hostname() -> String {
    if let Ok(h) = std::env::var("HOSTNAME").or_else(|_| std::env::var("COMPUTERNAME")) {
        if !h.trim().is_empty() {
            return h.trim().to_string();
        }
    }
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// One target folder and the arena indices of the records it will list.
#[derive(Clone, Debug)]
pub struct OutputLocation {
    pub dir: PathComponents,
    members: Vec<usize>,
}

impl OutputLocation {
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

#[derive(Clone, Debug, Default)]
pub struct OutputManifestSet {
    locations: Vec<OutputLocation>,
    records: Vec<ManifestRecord>,
}

impl OutputManifestSet {
    /// Output folders must be absolute; they are normalized here and
    /// duplicates collapse into one location.
    pub fn new(dirs: impl IntoIterator<Item = PathComponents>) -> Result<Self> {
        let mut locations: Vec<OutputLocation> = Vec::new();
        for mut dir in dirs {
            if !dir.is_absolute() {
                return Err(MhlError::new(
                    ErrorKind::InternalError,
                    format!("output folder is not absolute: {dir}"),
                ));
            }
            dir.normalize()?;
            if locations.iter().any(|l| l.dir == dir) {
                continue;
            }
            locations.push(OutputLocation { dir, members: Vec::new() });
        }
        if locations.is_empty() {
            return Err(MhlError::new(ErrorKind::WrongArguments, "no output folder given"));
        }
        Ok(Self { locations, records: Vec::new() })
    }

    /// Add `record` to every location whose folder contains it. Returns how
    /// many locations took it; none at all is a `WrongFileLocation` error.
    pub fn assign(&mut self, record: ManifestRecord) -> Result<usize> {
        let targets: Vec<usize> = self
            .locations
            .iter()
            .enumerate()
            .filter(|(_, l)| l.dir.is_nested(&record.absolute_path))
            .map(|(i, _)| i)
            .collect();
        if targets.is_empty() {
            return Err(MhlError::new(
                ErrorKind::WrongFileLocation,
                format!("{} is not located under any output folder", record.absolute_path),
            ));
        }
        let slot = self.records.len();
        self.records.push(record);
        for &t in &targets {
            self.locations[t].members.push(slot);
        }
        Ok(targets.len())
    }

    pub fn locations(&self) -> &[OutputLocation] {
        &self.locations
    }

    pub fn records(&self) -> &[ManifestRecord] {
        &self.records
    }

    /// Records listed by `location`, in the order they were assigned.
    pub fn members<'a>(&'a self, location: &'a OutputLocation) -> impl Iterator<Item = &'a ManifestRecord> + 'a {
        location.members.iter().map(move |&i| &self.records[i])
    }

    /// Write one manifest per non-empty location. Returns the written paths.
    pub fn write_all(&self, creator: &CreatorInfo) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for location in &self.locations {
            if location.members.is_empty() {
                warn!(dir = %location.dir, "no files under output folder, manifest not written");
                continue;
            }
            let bytes = render_manifest(&location.dir, self.members(location), creator)?;
            let mut target = location.dir.clone();
            target.push(&manifest_file_name(&location.dir, &creator.start));
            let native = target.to_path_buf();
            std::fs::write(&native, bytes).map_err(|e| MhlError::io(&native, e))?;
            info!(manifest = %native.display(), files = location.members.len(), "manifest written");
            written.push(native);
        }
        Ok(written)
    }
}

/// `<folder>_<YYYY-MM-DD_HHMMSS>.mhl`, or just the timestamp at a root.
pub fn manifest_file_name(dir: &PathComponents, start: &DateTime<Utc>) -> String {
    let stamp = start.format(FILE_NAME_TIME_FORMAT);
    match dir.file_name() {
        Some(name) => format!("{name}_{stamp}.{MHL_EXTENSION}"),
        None => format!("{stamp}.{MHL_EXTENSION}"),
    }
}

/// Serialize `records` as a manifest living in `dir`; file names are written
/// relative to `dir` with forward slashes.
pub fn render_manifest<'a>(
    dir: &PathComponents,
    records: impl IntoIterator<Item = &'a ManifestRecord>,
    creator: &CreatorInfo,
) -> Result<Vec<u8>> {
    let mut w = XmlWriter::new();
    w.declaration()?;
    w.start("hashlist", &[("version", MHL_VERSION)])?;

    w.start("creatorinfo", &[])?;
    w.text_element("name", &creator.name)?;
    w.text_element("username", &creator.username)?;
    w.text_element("hostname", &creator.hostname)?;
    w.text_element("tool", &creator.tool)?;
    w.text_element("startdate", &manifest::format_date(&creator.start))?;
    w.text_element("finishdate", &manifest::format_date(&creator.finish))?;
    w.end("creatorinfo")?;

    for record in records {
        let file = manifest::relative_file_text(dir, &record.absolute_path)?;
        if record.is_nested_reference {
            w.start("hash", &[("referencehashlist", "yes")])?;
        } else {
            w.start("hash", &[])?;
        }
        w.text_element("file", &file)?;
        w.text_element("size", &record.size.to_string())?;
        if let Some(t) = &record.dates.creation {
            w.text_element("creationdate", &manifest::format_date(t))?;
        }
        if let Some(t) = &record.dates.last_modification {
            w.text_element("lastmodificationdate", &manifest::format_date(t))?;
        }
        if record.hashes.is_empty() && record.hash_type == HashType::Null {
            w.text_element(HashType::Null.tag(), "")?;
        }
        for (t, value) in &record.hashes {
            w.text_element(t.tag(), value)?;
        }
        if let Some(t) = &record.dates.hashed {
            w.text_element("hashdate", &manifest::format_date(t))?;
        }
        w.end("hash")?;
    }

    w.end("hashlist")?;
    Ok(w.finish())
}
