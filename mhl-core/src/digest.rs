use crate::error::{ErrorKind, MhlError, Result};
use crate::progress::Progress;
use md5::Md5;
use serde::Serialize;
use sha1::{Digest as _, Sha1};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;
use xxhash_rust::xxh32::Xxh32;
use xxhash_rust::xxh64::Xxh64;

const XXHASH_SEED: u64 = 0;
const READ_BUF: usize = 1 << 20;

/// Digest algorithms a manifest record can declare.
///
/// Variant order is the canonical order hash elements are written in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum HashType {
    #[serde(rename = "sha1")]
    Sha1,
    #[serde(rename = "md5")]
    Md5,
    #[serde(rename = "xxhash")]
    XxHash32,
    #[serde(rename = "xxhash64")]
    XxHash64,
    #[serde(rename = "xxhash64be")]
    XxHash64BE,
    #[serde(rename = "null")]
    Null,
}

impl HashType {
    pub const ALL: [HashType; 6] = [
        HashType::Sha1,
        HashType::Md5,
        HashType::XxHash32,
        HashType::XxHash64,
        HashType::XxHash64BE,
        HashType::Null,
    ];

    /// Element name inside a `<hash>` node.
    pub fn tag(self) -> &'static str {
        match self {
            HashType::Sha1 => "sha1",
            HashType::Md5 => "md5",
            HashType::XxHash32 => "xxhash",
            HashType::XxHash64 => "xxhash64",
            HashType::XxHash64BE => "xxhash64be",
            HashType::Null => "null",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    /// Prefix used in digest lines, e.g. `MD5(path)= ...`.
    pub fn label(self) -> &'static str {
        match self {
            HashType::Sha1 => "SHA1",
            HashType::Md5 => "MD5",
            HashType::XxHash32 => "XXHash",
            HashType::XxHash64 => "XXHash64",
            HashType::XxHash64BE => "XXHash64BE",
            HashType::Null => "NULL",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label().eq_ignore_ascii_case(label))
    }

    /// Length of the textual digest; 0 for `Null`.
    pub fn expected_len(self) -> usize {
        match self {
            HashType::Md5 => 32,
            HashType::Sha1 => 40,
            HashType::XxHash32 => 10,
            HashType::XxHash64 | HashType::XxHash64BE => 16,
            HashType::Null => 0,
        }
    }
}

impl fmt::Display for HashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for HashType {
    type Err = MhlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_tag(&s.to_ascii_lowercase()).ok_or_else(|| {
            MhlError::new(ErrorKind::UnsupportedHashEncoding, format!("unknown hash type: {s}"))
        })
    }
}

/// A computed digest value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Digest {
    Md5([u8; 16]),
    Sha1([u8; 20]),
    XxHash32(u32),
    XxHash64(u64),
    XxHash64BE(u64),
}

impl Digest {
    pub fn hash_type(&self) -> HashType {
        match self {
            Digest::Md5(_) => HashType::Md5,
            Digest::Sha1(_) => HashType::Sha1,
            Digest::XxHash32(_) => HashType::XxHash32,
            Digest::XxHash64(_) => HashType::XxHash64,
            Digest::XxHash64BE(_) => HashType::XxHash64BE,
        }
    }

    /// Text written to manifests. xxHash32 is a zero-padded decimal, the
    /// 64-bit variants differ only in byte order.
    pub fn to_hex(&self) -> String {
        match self {
            Digest::Md5(b) => hex::encode(b),
            Digest::Sha1(b) => hex::encode(b),
            Digest::XxHash32(v) => format!("{v:010}"),
            Digest::XxHash64(v) => hex::encode(v.to_le_bytes()),
            Digest::XxHash64BE(v) => hex::encode(v.to_be_bytes()),
        }
    }

    /// Length-exact, case-insensitive comparison with a declared value.
    pub fn matches(&self, declared: &str) -> bool {
        let observed = self.to_hex();
        observed.len() == declared.len() && observed.eq_ignore_ascii_case(declared)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Source of file digests. Implementations must be shareable across the
/// parallel check pass.
pub trait DigestEngine: Sync {
    /// Digests of `path` for each non-`Null` type in `types`, in the same order.
    fn compute_many(&self, path: &Path, types: &[HashType]) -> Result<Vec<Digest>>;

    fn compute(&self, path: &Path, hash_type: HashType) -> Result<Digest> {
        if hash_type == HashType::Null {
            return Err(MhlError::new(
                ErrorKind::InternalError,
                format!("no digest exists for hash type null ({})", path.display()),
            ));
        }
        self.compute_many(path, &[hash_type])?.into_iter().next().ok_or_else(|| {
            MhlError::new(ErrorKind::InternalError, format!("digest engine returned nothing for {}", path.display()))
        })
    }
}

enum Hasher {
    Md5(Md5),
    Sha1(Sha1),
    XxHash32(Xxh32),
    XxHash64(Xxh64),
    XxHash64BE(Xxh64),
}

impl Hasher {
    fn new(hash_type: HashType) -> Option<Self> {
        Some(match hash_type {
            HashType::Md5 => Hasher::Md5(Md5::new()),
            HashType::Sha1 => Hasher::Sha1(Sha1::new()),
            HashType::XxHash32 => Hasher::XxHash32(Xxh32::new(XXHASH_SEED as u32)),
            HashType::XxHash64 => Hasher::XxHash64(Xxh64::new(XXHASH_SEED)),
            HashType::XxHash64BE => Hasher::XxHash64BE(Xxh64::new(XXHASH_SEED)),
            HashType::Null => return None,
        })
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(h) => h.update(data),
            Hasher::Sha1(h) => h.update(data),
            Hasher::XxHash32(h) => h.update(data),
            Hasher::XxHash64(h) | Hasher::XxHash64BE(h) => h.update(data),
        }
    }

    fn finish(self) -> Digest {
        match self {
            Hasher::Md5(h) => {
                let mut out = [0u8; 16];
                out.copy_from_slice(&h.finalize());
                Digest::Md5(out)
            }
            Hasher::Sha1(h) => {
                let mut out = [0u8; 20];
                out.copy_from_slice(&h.finalize());
                Digest::Sha1(out)
            }
            Hasher::XxHash32(h) => Digest::XxHash32(h.digest()),
            Hasher::XxHash64(h) => Digest::XxHash64(h.digest()),
            Hasher::XxHash64BE(h) => Digest::XxHash64BE(h.digest()),
        }
    }
}

/// Reads each file once and feeds every requested hasher from the same buffer.
#[derive(Clone)]
pub struct StreamDigester {
    buf_size: usize,
    progress: Option<Progress>,
}

impl Default for StreamDigester {
    fn default() -> Self {
        Self { buf_size: READ_BUF, progress: None }
    }
}

impl StreamDigester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        if progress.is_enabled() {
            self.progress = Some(progress);
        }
        self
    }

    pub fn with_buffer_size(mut self, buf_size: usize) -> Self {
        self.buf_size = buf_size.max(1);
        self
    }

    /// Digest an in-memory buffer; same rendering as for files.
    pub fn digest_bytes(data: &[u8], types: &[HashType]) -> Vec<Digest> {
        let mut hashers: Vec<Hasher> = types.iter().copied().filter_map(Hasher::new).collect();
        for h in &mut hashers {
            h.update(data);
        }
        hashers.into_iter().map(Hasher::finish).collect()
    }
}

impl DigestEngine for StreamDigester {
    fn compute_many(&self, path: &Path, types: &[HashType]) -> Result<Vec<Digest>> {
        let mut hashers: Vec<Hasher> = types.iter().copied().filter_map(Hasher::new).collect();
        if hashers.is_empty() {
            return Ok(Vec::new());
        }
        let mut file = File::open(path).map_err(|e| MhlError::io(path, e))?;
        let mut buf = vec![0u8; self.buf_size];
        loop {
            let n = match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(MhlError::io(path, e)),
            };
            for h in &mut hashers {
                h.update(&buf[..n]);
            }
            if let Some(p) = &self.progress {
                p.add_bytes(n as u64);
            }
        }
        tracing::trace!(path = %path.display(), types = hashers.len(), "digest computed");
        Ok(hashers.into_iter().map(Hasher::finish).collect())
    }
}
