//! Platform-aware path model used for manifest keys, nesting checks and
//! relative-path extraction.
//!
//! Paths are held as an ordered list of non-empty segments plus an optional
//! root prefix (drive or UNC share on Windows). Two separator styles are
//! supported when rendering: the native one for filesystem calls and the
//! uniform forward slash written into manifest files.

use crate::error::{ErrorKind, MhlError, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// Separator and comparison conventions of a platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathStyle {
    /// `/` separator, case-sensitive segment comparison.
    Posix,
    /// `\` (or `/`) separator, drive and UNC roots, case-insensitive comparison.
    Windows,
}

impl PathStyle {
    pub fn native() -> Self {
        if cfg!(windows) {
            PathStyle::Windows
        } else {
            PathStyle::Posix
        }
    }

    pub fn separator(self) -> char {
        match self {
            PathStyle::Posix => '/',
            PathStyle::Windows => '\\',
        }
    }

    pub fn is_separator(self, c: char) -> bool {
        match self {
            PathStyle::Posix => c == '/',
            PathStyle::Windows => c == '\\' || c == '/',
        }
    }

    pub fn segments_equal(self, a: &str, b: &str) -> bool {
        match self {
            PathStyle::Posix => a == b,
            PathStyle::Windows => a == b || a.to_lowercase() == b.to_lowercase(),
        }
    }
}

/// Which separator `render` puts between segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Separator {
    /// The separator of the path's own style.
    Native,
    /// Always `/`, as used inside manifest files.
    Uniform,
}

#[derive(Clone, Debug)]
pub struct PathComponents {
    style: PathStyle,
    root: Option<String>,
    segments: Vec<String>,
    is_absolute: bool,
    is_normalized: bool,
}

impl PathComponents {
    /// Parse `raw` using the host platform's conventions.
    pub fn parse(raw: &str) -> Self {
        Self::parse_with(raw, PathStyle::native())
    }

    pub fn parse_with(raw: &str, style: PathStyle) -> Self {
        let (root, is_absolute, rest) = split_root(raw, style);
        let segments = rest
            .split(|c| style.is_separator(c))
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        Self { style, root, segments, is_absolute, is_normalized: false }
    }

    /// An empty relative path.
    pub fn empty(style: PathStyle) -> Self {
        Self { style, root: None, segments: Vec::new(), is_absolute: false, is_normalized: true }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = path.to_str().ok_or_else(|| {
            MhlError::new(
                ErrorKind::CharConversionError,
                format!("path is not valid Unicode: {}", path.display()),
            )
        })?;
        Ok(Self::parse(raw))
    }

    /// The process working directory, absolute and normalized.
    pub fn current_dir() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let mut p = Self::from_path(&cwd)?;
        p.normalize()?;
        Ok(p)
    }

    /// Parse `raw` and make it absolute against `base`, normalized.
    pub fn resolve(raw: &str, base: &PathComponents) -> Result<Self> {
        let rel = Self::parse_with(raw, base.style);
        let mut joined = base.join_absolute(&rel)?;
        joined.normalize()?;
        Ok(joined)
    }

    pub fn style(&self) -> PathStyle {
        self.style
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_absolute(&self) -> bool {
        self.is_absolute
    }

    pub fn is_normalized(&self) -> bool {
        self.is_normalized
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The containing directory, or `None` when there are no segments left.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        let mut p = self.clone();
        p.segments.pop();
        Some(p)
    }

    pub fn push(&mut self, segment: &str) {
        for s in segment.split(|c| self.style.is_separator(c)).filter(|s| !s.is_empty()) {
            if s == "." || s == ".." {
                self.is_normalized = false;
            }
            self.segments.push(s.to_owned());
        }
    }

    /// Drop `.` segments and resolve `..` against the preceding segment.
    ///
    /// A `..` with nothing left to pop is a `WrongFileLocation` error.
    pub fn normalize(&mut self) -> Result<()> {
        if self.is_normalized {
            return Ok(());
        }
        let mut out: Vec<String> = Vec::with_capacity(self.segments.len());
        for seg in &self.segments {
            match seg.as_str() {
                "." => {}
                ".." => {
                    if out.pop().is_none() {
                        return Err(MhlError::new(
                            ErrorKind::WrongFileLocation,
                            format!("path escapes its root: {}", self.render(Separator::Native)),
                        ));
                    }
                }
                _ => out.push(seg.clone()),
            }
        }
        self.segments = out;
        self.is_normalized = true;
        Ok(())
    }

    /// Append `rel` to this absolute base. An absolute `rel` is returned as is.
    pub fn join_absolute(&self, rel: &PathComponents) -> Result<Self> {
        if rel.is_absolute {
            return Ok(rel.clone());
        }
        if !self.is_absolute {
            return Err(MhlError::new(
                ErrorKind::InternalError,
                format!("base path is not absolute: {}", self.render(Separator::Native)),
            ));
        }
        let mut segments = self.segments.clone();
        segments.extend(rel.segments.iter().cloned());
        let mut joined = Self {
            style: self.style,
            root: self.root.clone(),
            segments,
            is_absolute: true,
            is_normalized: false,
        };
        joined.normalize()?;
        Ok(joined)
    }

    /// True when `candidate` lies at or below this directory.
    pub fn is_nested(&self, candidate: &PathComponents) -> bool {
        if !self.is_absolute || !self.is_normalized {
            return false;
        }
        if !candidate.is_absolute || !candidate.is_normalized {
            return false;
        }
        if !self.roots_equal(candidate) || candidate.segments.len() < self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(&candidate.segments)
            .all(|(a, b)| self.style.segments_equal(a, b))
    }

    /// The part of `candidate` below this directory, as a relative path.
    pub fn extract_relative(&self, candidate: &PathComponents) -> Result<Self> {
        if !self.is_nested(candidate) {
            return Err(MhlError::new(
                ErrorKind::WrongFileLocation,
                format!(
                    "{} is not located under {}",
                    candidate.render(Separator::Native),
                    self.render(Separator::Native)
                ),
            ));
        }
        Ok(Self {
            style: self.style,
            root: None,
            segments: candidate.segments[self.segments.len()..].to_vec(),
            is_absolute: false,
            is_normalized: true,
        })
    }

    pub fn render(&self, separator: Separator) -> String {
        let sep = match separator {
            Separator::Native => self.style.separator(),
            Separator::Uniform => '/',
        };
        let mut out = String::new();
        if self.is_absolute {
            match (&self.root, self.style) {
                (Some(root), PathStyle::Windows) => {
                    if separator == Separator::Uniform {
                        out.push_str(&root.replace('\\', "/"));
                    } else {
                        out.push_str(root);
                    }
                    out.push(sep);
                }
                _ => out.push(sep),
            }
        }
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                out.push(sep);
            }
            out.push_str(seg);
        }
        out
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(self.render(Separator::Native))
    }

    /// Lookup key: uniform rendering, case-folded where the platform compares
    /// case-insensitively.
    pub fn key(&self) -> String {
        let s = self.render(Separator::Uniform);
        match self.style {
            PathStyle::Posix => s,
            PathStyle::Windows => s.to_lowercase(),
        }
    }

    fn roots_equal(&self, other: &PathComponents) -> bool {
        match (&self.root, &other.root) {
            (None, None) => true,
            (Some(a), Some(b)) => self.style.segments_equal(a, b),
            _ => false,
        }
    }
}

impl PartialEq for PathComponents {
    fn eq(&self, other: &Self) -> bool {
        self.is_absolute == other.is_absolute
            && self.roots_equal(other)
            && self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| self.style.segments_equal(a, b))
    }
}

impl Eq for PathComponents {}

impl fmt::Display for PathComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(Separator::Native))
    }
}

fn has_drive(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 2 && b[0].is_ascii_alphabetic() && b[1] == b':'
}

/// Split a detected root prefix off `raw`: `(root, is_absolute, remainder)`.
fn split_root(raw: &str, style: PathStyle) -> (Option<String>, bool, &str) {
    match style {
        PathStyle::Posix => match raw.strip_prefix('/') {
            Some(rest) => (None, true, rest),
            None => (None, false, raw),
        },
        PathStyle::Windows => {
            let is_sep = |c: char| style.is_separator(c);
            let mut chars = raw.chars();
            let first_two_seps =
                matches!((chars.next(), chars.next()), (Some(a), Some(b)) if is_sep(a) && is_sep(b));

            if first_two_seps {
                let rest = &raw[2..];
                // Long-path prefix: \\?\C:\...
                if let Some(long) = rest.strip_prefix('?') {
                    let long = long.trim_start_matches(is_sep);
                    if has_drive(long) {
                        return (Some(format!(r"\\?\{}", &long[..2])), true, &long[2..]);
                    }
                    return (Some(r"\\?".to_owned()), true, long);
                }
                // UNC share: \\server\share\...
                let mut parts = rest.splitn(3, is_sep);
                let server = parts.next().unwrap_or_default();
                let share = parts.next().unwrap_or_default();
                let tail = parts.next().unwrap_or_default();
                let root = if share.is_empty() {
                    format!(r"\\{server}")
                } else {
                    format!(r"\\{server}\{share}")
                };
                return (Some(root), true, tail);
            }
            if has_drive(raw) {
                return (Some(raw[..2].to_owned()), true, &raw[2..]);
            }
            match raw.chars().next() {
                Some(c) if is_sep(c) => (None, true, &raw[c.len_utf8()..]),
                _ => (None, false, raw),
            }
        }
    }
}
