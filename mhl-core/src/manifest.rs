//! In-memory manifest: records keyed by absolute normalized path.
//!
//! A manifest is built either by parsing an MHL document (following nested
//! `referencehashlist` entries into the manifests they point at) or by the
//! seal workflow from freshly computed digests. Records live in an arena in
//! insertion order; a side index maps lookup keys to arena slots.

use crate::digest::{Digest, HashType};
use crate::error::{ErrorKind, MhlError, Result};
use crate::fs;
use crate::path::{PathComponents, Separator};
use crate::xml::{self, XmlElement};
use chrono::{DateTime, NaiveDateTime, Utc};
use globset::GlobBuilder;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Timestamp layout used in manifest date elements.
pub const MHL_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
pub const MHL_EXTENSION: &str = "mhl";
const SUPPORTED_VERSION: f64 = 1.1;
const NESTED_ATTR: &str = "referencehashlist";

pub fn format_date(t: &DateTime<Utc>) -> String {
    t.format(MHL_DATE_FORMAT).to_string()
}

/// Parse a manifest timestamp; `None` when it is not in a recognized form.
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, MHL_DATE_FORMAT) {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordDates {
    pub last_modification: Option<DateTime<Utc>>,
    pub creation: Option<DateTime<Utc>>,
    pub hashed: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestRecord {
    /// Lookup key; always absolute and normalized.
    pub absolute_path: PathComponents,
    /// The `file` text as written in the manifest.
    pub declared_relative_path: String,
    pub size: u64,
    pub hash_type: HashType,
    /// Absent only for `Null`.
    pub hash_hex: Option<String>,
    /// Filled in from the real file during verification.
    pub last_modified: Option<i64>,
    pub is_nested_reference: bool,
    /// Every hash value present for the file, including the selected one.
    pub hashes: Vec<(HashType, String)>,
    pub dates: RecordDates,
    /// Manifest the record was read from.
    pub source_manifest: Option<PathComponents>,
}

/// Picks the record's primary hash: once SHA-1 has been seen it sticks,
/// otherwise the latest offer replaces the previous one.
#[derive(Default)]
struct HashSelector {
    current: Option<(HashType, Option<String>)>,
}

impl HashSelector {
    fn offer(&mut self, hash_type: HashType, value: Option<String>) {
        if let Some((HashType::Sha1, _)) = self.current {
            return;
        }
        self.current = Some((hash_type, value));
    }

    fn holds_sha1(&self) -> bool {
        matches!(self.current, Some((HashType::Sha1, _)))
    }

    fn finish(self) -> Option<(HashType, Option<String>)> {
        self.current
    }
}

impl ManifestRecord {
    /// A record for a freshly hashed file. Digests are stored in canonical
    /// order and the primary hash is chosen the same way parsing would choose
    /// it from the written document.
    pub fn from_digests(
        absolute_path: PathComponents,
        declared_relative_path: String,
        size: u64,
        mtime: i64,
        digests: &[Digest],
    ) -> Result<Self> {
        if digests.is_empty() {
            return Err(MhlError::new(
                ErrorKind::InternalError,
                format!("no digest computed for {absolute_path}"),
            ));
        }
        let hashes = digests.iter().map(|d| (d.hash_type(), d.to_hex())).collect();
        Ok(Self::from_hashes(absolute_path, declared_relative_path, size, mtime, hashes))
    }

    /// Like [`ManifestRecord::from_digests`] with already rendered values.
    /// An empty list gives a `Null` record.
    pub fn from_hashes(
        absolute_path: PathComponents,
        declared_relative_path: String,
        size: u64,
        mtime: i64,
        mut hashes: Vec<(HashType, String)>,
    ) -> Self {
        hashes.retain(|(t, _)| *t != HashType::Null);
        hashes.sort_by_key(|(t, _)| *t);
        hashes.dedup_by_key(|(t, _)| *t);

        let mut selector = HashSelector::default();
        for (t, v) in &hashes {
            selector.offer(*t, Some(v.clone()));
        }
        let (hash_type, hash_hex) = selector.finish().unwrap_or((HashType::Null, None));
        let dates = RecordDates {
            last_modification: DateTime::from_timestamp(mtime, 0),
            creation: None,
            hashed: Some(Utc::now()),
        };
        Self {
            absolute_path,
            declared_relative_path,
            size,
            hash_type,
            hash_hex,
            last_modified: Some(mtime),
            is_nested_reference: false,
            hashes,
            dates,
            source_manifest: None,
        }
    }

    pub fn hash_for(&self, hash_type: HashType) -> Option<&str> {
        self.hashes.iter().find(|(t, _)| *t == hash_type).map(|(_, v)| v.as_str())
    }

    pub fn key(&self) -> String {
        self.absolute_path.key()
    }

    fn from_node(node: &XmlElement, base_dir: &PathComponents, manifest: &PathComponents) -> Result<Self> {
        let bad = |detail: String| MhlError::wrong_mhl_format(manifest, detail);

        let file = node.child("file").map(XmlElement::text).unwrap_or_default();
        if file.is_empty() {
            return Err(bad("hash entry without a file name".into()));
        }
        let rel = PathComponents::parse_with(file, base_dir.style());
        let absolute_path = base_dir
            .join_absolute(&rel)
            .map_err(|e| bad(format!("cannot resolve '{file}': {}", e.message())))?;

        let size_text = node.child("size").map(XmlElement::text);
        let size = match size_text {
            Some(s) => s.parse::<u64>().map_err(|_| bad(format!("invalid size '{s}' for '{file}'")))?,
            None => return Err(bad(format!("missing size for '{file}'"))),
        };

        let mut selector = HashSelector::default();
        let mut hashes = Vec::new();
        let mut dates = RecordDates::default();
        for child in &node.children {
            if let Some(t) = HashType::from_tag(&child.name) {
                if t == HashType::Null {
                    selector.offer(t, None);
                    continue;
                }
                let value = child.text();
                if selector.holds_sha1() {
                    // Not a candidate any more; kept only when well formed.
                    if value.len() == t.expected_len() {
                        hashes.push((t, value.to_owned()));
                    }
                    continue;
                }
                if value.is_empty() {
                    return Err(bad(format!("empty {t} value for '{file}'")));
                }
                if value.len() != t.expected_len() {
                    return Err(bad(format!(
                        "{t} value for '{file}' has length {}, expected {}",
                        value.len(),
                        t.expected_len()
                    )));
                }
                selector.offer(t, Some(value.to_owned()));
                hashes.push((t, value.to_owned()));
                continue;
            }
            match child.name.as_str() {
                "lastmodificationdate" => dates.last_modification = parse_date(child.text()),
                "creationdate" => dates.creation = parse_date(child.text()),
                "hashdate" => dates.hashed = parse_date(child.text()),
                _ => {}
            }
        }
        let (hash_type, hash_hex) = selector
            .finish()
            .ok_or_else(|| bad(format!("no recognized hash for '{file}'")))?;
        if hash_type != HashType::Null && hash_hex.is_none() {
            return Err(bad(format!("missing {hash_type} value for '{file}'")));
        }

        let is_nested_reference =
            node.attr(NESTED_ATTR).is_some_and(|v| v.trim().eq_ignore_ascii_case("yes"));

        Ok(Self {
            absolute_path,
            declared_relative_path: file.to_owned(),
            size,
            hash_type,
            hash_hex,
            last_modified: None,
            is_nested_reference,
            hashes,
            dates,
            source_manifest: Some(manifest.clone()),
        })
    }
}

/// Records of one manifest and every manifest it references.
#[derive(Clone, Debug, Default)]
pub struct Manifest {
    source: Option<PathComponents>,
    records: Vec<ManifestRecord>,
    index: HashMap<String, usize>,
}

/// Loads the document of a referenced manifest.
pub type Loader<'a> = dyn FnMut(&PathComponents) -> Result<XmlElement> + 'a;

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and parse the manifest at `path`, following nested references
    /// on disk.
    pub fn load(path: &Path) -> Result<Self> {
        let root = absolute(path)?;
        let tree = read_tree(&root)?;
        Self::parse(&root, &tree)
    }

    /// Build from an already parsed document. Nested manifests are read
    /// from disk.
    pub fn parse(root_manifest_path: &PathComponents, tree: &XmlElement) -> Result<Self> {
        Self::parse_with(root_manifest_path, tree, &mut read_tree)
    }

    /// Like [`Manifest::parse`], with nested documents supplied by `loader`.
    pub fn parse_with(
        root_manifest_path: &PathComponents,
        tree: &XmlElement,
        loader: &mut Loader<'_>,
    ) -> Result<Self> {
        if !root_manifest_path.is_absolute() || !root_manifest_path.is_normalized() {
            return Err(MhlError::new(
                ErrorKind::InternalError,
                format!("manifest path must be absolute and normalized: {root_manifest_path}"),
            ));
        }
        let mut manifest = Self { source: Some(root_manifest_path.clone()), ..Self::default() };
        let mut open = HashSet::new();
        manifest.merge_tree(root_manifest_path, tree, loader, &mut open)?;
        debug!(manifest = %root_manifest_path, records = manifest.len(), "manifest parsed");
        Ok(manifest)
    }

    fn merge_tree(
        &mut self,
        manifest_path: &PathComponents,
        tree: &XmlElement,
        loader: &mut Loader<'_>,
        open: &mut HashSet<String>,
    ) -> Result<()> {
        check_root(manifest_path, tree)?;
        let base_dir = manifest_path.parent().ok_or_else(|| {
            MhlError::wrong_mhl_format(manifest_path, "manifest has no containing directory")
        })?;
        open.insert(manifest_path.key());

        for node in tree.children_named("hash") {
            let record = ManifestRecord::from_node(node, &base_dir, manifest_path)?;
            let key = record.key();
            if self.index.contains_key(&key) {
                if record.is_nested_reference {
                    return Err(MhlError::wrong_mhl_format(
                        manifest_path,
                        format!("cyclic manifest reference to {}", record.absolute_path),
                    ));
                }
                debug!(path = %record.absolute_path, "duplicate record ignored");
                continue;
            }
            let nested = record.is_nested_reference.then(|| record.absolute_path.clone());
            self.push(record);

            if let Some(target) = nested {
                if open.contains(&target.key()) {
                    return Err(MhlError::wrong_mhl_format(
                        manifest_path,
                        format!("manifest {target} references itself"),
                    ));
                }
                let nested_tree = loader(&target)?;
                self.merge_tree(&target, &nested_tree, loader, open)?;
            }
        }
        open.remove(&manifest_path.key());
        Ok(())
    }

    fn push(&mut self, record: ManifestRecord) {
        self.index.insert(record.key(), self.records.len());
        self.records.push(record);
    }

    /// Insert unless the path is already present; the existing record is
    /// returned untouched in that case.
    pub fn insert(&mut self, record: ManifestRecord) -> Option<&ManifestRecord> {
        match self.index.get(&record.key()) {
            Some(&i) => Some(&self.records[i]),
            None => {
                self.push(record);
                None
            }
        }
    }

    pub fn find(&self, path: &PathComponents) -> Option<&ManifestRecord> {
        self.index.get(&path.key()).map(|&i| &self.records[i])
    }

    /// Top-level manifest this one was parsed from, if any.
    pub fn source(&self) -> Option<&PathComponents> {
        self.source.as_ref()
    }

    pub fn records(&self) -> &[ManifestRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManifestRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn check_root(manifest_path: &PathComponents, tree: &XmlElement) -> Result<()> {
    if tree.name != "hashlist" {
        return Err(MhlError::wrong_mhl_format(
            manifest_path,
            format!("root element is '{}', expected 'hashlist'", tree.name),
        ));
    }
    let version = tree.attr("version").and_then(|v| v.trim().parse::<f64>().ok()).unwrap_or(0.0);
    if version > SUPPORTED_VERSION {
        return Err(MhlError::wrong_mhl_format(
            manifest_path,
            format!("unsupported version {version}, at most {SUPPORTED_VERSION} is supported"),
        ));
    }
    Ok(())
}

fn absolute(path: &Path) -> Result<PathComponents> {
    let cwd = PathComponents::current_dir()?;
    let raw = path.to_str().ok_or_else(|| {
        MhlError::new(ErrorKind::CharConversionError, format!("path is not valid Unicode: {}", path.display()))
    })?;
    PathComponents::resolve(raw, &cwd)
}

/// Read and parse the manifest document at `path`.
pub fn read_tree(path: &PathComponents) -> Result<XmlElement> {
    let native = path.to_path_buf();
    if !fs::exists(&native) {
        return Err(MhlError::new(ErrorKind::MhlNotFound, format!("MHL file not found: {path}")));
    }
    if fs::stat(&native)?.kind != fs::EntryKind::File {
        return Err(MhlError::new(ErrorKind::MhlNotFound, format!("MHL path is not a file: {path}")));
    }
    let bytes = std::fs::read(&native).map_err(|e| MhlError::io(&native, e))?;
    xml::parse_document(&bytes).map_err(|e| MhlError::wrong_mhl_format(path, e))
}

/// Nearest `*.mhl` file at or above `start`. When several manifests share a
/// directory the first by name wins.
pub fn find_manifest_for(start: &Path) -> Result<PathBuf> {
    let glob = GlobBuilder::new(&format!("*.{MHL_EXTENSION}"))
        .case_insensitive(cfg!(windows))
        .literal_separator(true)
        .build()
        .map_err(|e| MhlError::new(ErrorKind::InternalError, e.to_string()))?
        .compile_matcher();

    let mut dir = absolute(start)?;
    if !dir.to_path_buf().is_dir() {
        dir = dir.parent().ok_or_else(|| {
            MhlError::new(ErrorKind::MhlNotFound, format!("no MHL file found for {}", start.display()))
        })?;
    }
    loop {
        let native = dir.to_path_buf();
        if native.is_dir() {
            if let Some(found) = fs::list_dir_matching(&native, &glob)?.into_iter().next() {
                debug!(manifest = %found.display(), "manifest discovered");
                return Ok(found);
            }
        }
        match dir.parent() {
            Some(up) => dir = up,
            None => break,
        }
    }
    Err(MhlError::new(
        ErrorKind::MhlNotFound,
        format!("no MHL file found in {} or any parent directory", start.display()),
    ))
}

/// Uniform-separator relative rendering used for `file` elements.
pub fn relative_file_text(base_dir: &PathComponents, file: &PathComponents) -> Result<String> {
    Ok(base_dir.extract_relative(file)?.render(Separator::Uniform))
}
