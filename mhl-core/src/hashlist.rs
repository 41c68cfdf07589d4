//! Digest lines in the BSD style: `MD5(path)= 900150983cd24fb0d6963f7d28e17f72`.
//!
//! `NULL(path)` lists a file without any digest.

use crate::digest::HashType;
use crate::error::{ErrorKind, MhlError, Result};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigestLine {
    pub hash_type: HashType,
    pub path: String,
    /// `None` only for `NULL` lines.
    pub hash: Option<String>,
}

fn malformed(line: &str, detail: &str) -> MhlError {
    MhlError::new(ErrorKind::WrongInputFormat, format!("malformed digest line '{line}': {detail}"))
}

impl DigestLine {
    pub fn new(hash_type: HashType, path: impl Into<String>, hash: Option<String>) -> Self {
        Self { hash_type, path: path.into(), hash }
    }

    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let open = line.find('(').ok_or_else(|| malformed(line, "missing '('"))?;
        let label = line[..open].trim();
        let hash_type = HashType::from_label(label)
            .or_else(|| HashType::from_tag(&label.to_ascii_lowercase()))
            .ok_or_else(|| malformed(line, "unknown hash type"))?;
        let rest = &line[open + 1..];

        if hash_type == HashType::Null {
            let path = rest.trim_end().strip_suffix(')').ok_or_else(|| malformed(line, "missing ')'"))?;
            if path.is_empty() {
                return Err(malformed(line, "empty path"));
            }
            return Ok(Self::new(hash_type, path, None));
        }

        let close = rest.rfind(")=").ok_or_else(|| malformed(line, "missing ')='"))?;
        let path = &rest[..close];
        let hash = rest[close + 2..].trim();
        if path.is_empty() {
            return Err(malformed(line, "empty path"));
        }
        if hash.len() != hash_type.expected_len() {
            return Err(malformed(
                line,
                &format!("{hash_type} value has length {}, expected {}", hash.len(), hash_type.expected_len()),
            ));
        }
        Ok(Self::new(hash_type, path, Some(hash.to_owned())))
    }

    /// Every non-blank line of `text`, in order.
    pub fn parse_lines(text: &str) -> Result<Vec<Self>> {
        text.lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(i, l)| {
                Self::parse(l).map_err(|e| MhlError::new(e.kind(), format!("line {}: {}", i + 1, e.message())))
            })
            .collect()
    }
}

impl fmt::Display for DigestLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hash {
            Some(h) => write!(f, "{}({})= {}", self.hash_type.label(), self.path, h),
            None => write!(f, "{}({})", self.hash_type.label(), self.path),
        }
    }
}
