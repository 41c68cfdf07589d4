//! Turns raw command-line file arguments into absolute, normalized paths.

use crate::error::{ErrorKind, MhlError, Result};
use crate::fs::{self, EntryKind};
use crate::path::{PathComponents, Separator};
use crate::sequence::{self, SequenceSpec};
use std::path::Path;
use tracing::{debug, warn};

/// Expand `args` relative to `cwd`.
///
/// With `sequences` set, arguments containing `#` are sequence patterns and
/// every member must exist before any is returned. Directories expand to the
/// regular files below them in name order. Paths that do not exist are passed
/// through so the caller reports them per file.
pub fn expand(args: &[String], cwd: &PathComponents, sequences: bool) -> Result<Vec<PathComponents>> {
    let mut out = Vec::new();
    for arg in args {
        if sequences && sequence::is_sequence(arg) {
            expand_sequence(arg, cwd, &mut out)?;
            continue;
        }
        let path = PathComponents::resolve(arg, cwd)?;
        let native = path.to_path_buf();
        match fs::stat(&native) {
            Ok(st) if st.kind == EntryKind::File => out.push(path),
            Ok(st) if st.kind == EntryKind::Dir => {
                let before = out.len();
                for file in fs::walk_files(&native) {
                    let mut p = PathComponents::from_path(&file?)?;
                    p.normalize()?;
                    out.push(p);
                }
                debug!(dir = %path, files = out.len() - before, "directory expanded");
            }
            Ok(_) => warn!(path = %path, "not a regular file or directory, skipped"),
            Err(e) if e.kind() == ErrorKind::NoSuchFile => out.push(path),
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

fn expand_sequence(arg: &str, cwd: &PathComponents, out: &mut Vec<PathComponents>) -> Result<()> {
    let pattern = PathComponents::resolve(arg, cwd)?.render(Separator::Native);
    let spec = SequenceSpec::parse(&pattern)?;
    let before = out.len();
    spec.expand_checked(
        |name| fs::can_open(Path::new(name)),
        |name| {
            let mut p = PathComponents::parse(name);
            p.normalize()?;
            out.push(p);
            Ok::<(), MhlError>(())
        },
    )?;
    debug!(pattern = %spec, files = out.len() - before, "sequence expanded");
    Ok(())
}
