//! Numbered file sequences: `prefix###first-lastsuffix`.
//!
//! A pattern addresses every file from `first` to `last` inclusive. The run
//! of `#` gives the digit width used when the numbers are zero padded.

use crate::error::{ErrorKind, MhlError, Result};
use std::fmt;
use thiserror::Error;

pub fn is_sequence(s: &str) -> bool {
    s.contains('#')
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceSpec {
    pub prefix: String,
    pub suffix: String,
    pub digit_width: u32,
    pub padded: bool,
    pub first: u64,
    pub last: u64,
}

fn invalid(pattern: &str, detail: &str) -> MhlError {
    MhlError::new(ErrorKind::InvalidSequence, format!("invalid sequence '{pattern}': {detail}"))
}

impl SequenceSpec {
    pub fn parse(pattern: &str) -> Result<Self> {
        let start = pattern.find('#').ok_or_else(|| invalid(pattern, "no '#' marker"))?;
        let prefix = &pattern[..start];
        let after_marks = pattern[start..].trim_start_matches('#');
        let digit_width = (pattern.len() - start - after_marks.len()) as u32;

        let dash = after_marks
            .find('-')
            .ok_or_else(|| invalid(pattern, "missing '-' between first and last number"))?;
        let first_str = &after_marks[..dash];
        if first_str.is_empty() || !first_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid(pattern, "first number is not a decimal number"));
        }

        let rest = &after_marks[dash + 1..];
        let last_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        if last_len == 0 {
            return Err(invalid(pattern, "last number is missing"));
        }
        let (last_str, suffix) = rest.split_at(last_len);

        let first: u64 = first_str.parse().map_err(|_| invalid(pattern, "first number out of range"))?;
        let last: u64 = last_str.parse().map_err(|_| invalid(pattern, "last number out of range"))?;
        if first >= last {
            return Err(invalid(pattern, "first number must be less than last number"));
        }

        let padded = first_str.starts_with('0') || (last_len as u32) < digit_width;
        Ok(Self {
            prefix: prefix.to_owned(),
            suffix: suffix.to_owned(),
            digit_width,
            padded,
            first,
            last,
        })
    }

    /// File name for sequence number `i`.
    pub fn format(&self, i: u64) -> String {
        if self.padded {
            let width = self.digit_width as usize;
            format!("{}{:0width$}{}", self.prefix, i, self.suffix)
        } else {
            format!("{}{}{}", self.prefix, i, self.suffix)
        }
    }

    /// Number of members, `first` and `last` included.
    pub fn count(&self) -> u64 {
        self.last - self.first + 1
    }

    /// Every member name in ascending order. Restartable: each call starts over.
    pub fn iter(&self) -> impl Iterator<Item = String> + '_ {
        (self.first..=self.last).map(move |i| self.format(i))
    }

    /// Probe every member first; only when none is missing, emit them in order.
    ///
    /// `emit` is never called if any probe fails. The first error returned by
    /// `emit` stops the second pass.
    pub fn expand_checked<P, F, E>(&self, probe: P, mut emit: F) -> Result<(), SequenceError<E>>
    where
        P: Fn(&str) -> bool,
        F: FnMut(&str) -> Result<(), E>,
    {
        let missing: Vec<String> = self.iter().filter(|name| !probe(name)).collect();
        if !missing.is_empty() {
            return Err(SequenceError::Gap { pattern: self.to_string(), missing });
        }
        for name in self.iter() {
            emit(&name).map_err(SequenceError::Emit)?;
        }
        Ok(())
    }
}

impl fmt::Display for SequenceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marks = "#".repeat(self.digit_width as usize);
        if self.padded {
            let width = self.digit_width as usize;
            write!(f, "{}{marks}{:0width$}-{}{}", self.prefix, self.first, self.last, self.suffix)
        } else {
            write!(f, "{}{marks}{}-{}{}", self.prefix, self.first, self.last, self.suffix)
        }
    }
}

#[derive(Debug, Error)]
pub enum SequenceError<E> {
    /// At least one member could not be opened.
    #[error("gap in sequence {pattern}: {} file(s) missing{}", .missing.len(), first_missing(.missing))]
    Gap { pattern: String, missing: Vec<String> },
    /// The emit callback failed.
    #[error(transparent)]
    Emit(E),
}

fn first_missing(missing: &[String]) -> String {
    missing.first().map(|m| format!(", first is {m}")).unwrap_or_default()
}

impl From<SequenceError<MhlError>> for MhlError {
    fn from(err: SequenceError<MhlError>) -> Self {
        match err {
            SequenceError::Emit(e) => e,
            gap @ SequenceError::Gap { .. } => MhlError::new(ErrorKind::GapInSequence, gap.to_string()),
        }
    }
}
