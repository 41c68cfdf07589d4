use anyhow::{Context, Result};
use clap::{ArgAction, ArgGroup, Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, info};

use mhl_core::digest::{DigestEngine, HashType, StreamDigester};
use mhl_core::hashlist::DigestLine;
use mhl_core::manifest::{self, Manifest};
use mhl_core::path::{PathComponents, Separator};
use mhl_core::progress::Progress;
use mhl_core::seal::{self, SealOptions, Sealer};
use mhl_core::verify::{Discovery, Verifier, VerifyOptions, VerifyReport};
use mhl_core::{fs as mfs, inputs, ErrorKind, MhlError};

const TOOL: &str = concat!("mhl ver. ", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Copy, Debug, ValueEnum)]
enum HashArg {
    Md5,
    Sha1,
    Xxhash,
    Xxhash64,
    Xxhash64be,
}

impl From<HashArg> for HashType {
    fn from(h: HashArg) -> Self {
        match h {
            HashArg::Md5 => HashType::Md5,
            HashArg::Sha1 => HashType::Sha1,
            HashArg::Xxhash => HashType::XxHash32,
            HashArg::Xxhash64 => HashType::XxHash64,
            HashArg::Xxhash64be => HashType::XxHash64BE,
        }
    }
}

#[derive(Parser)]
#[command(name = "mhl", version, about = "Seal and verify media files with MHL manifests")]
struct Cli {
    /// More log output on stderr (-v, -vv, -vvv); MHL_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Hash files and write an MHL manifest into each output folder
    Seal {
        #[arg(short = 't', long = "hash", value_enum, value_delimiter = ',', required = true)]
        hash_types: Vec<HashArg>,
        /// Folder receiving a manifest; repeatable, defaults to the working directory
        #[arg(short = 'o', long = "output-folder")]
        output: Vec<String>,
        /// Treat arguments containing '#' as file sequences
        #[arg(short = '#', long = "sequence")]
        sequence: bool,
        #[arg(long, default_value_t = false)]
        parallel: bool,
        #[arg(long, default_value_t = false)]
        progress: bool,
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Check files against an MHL manifest
    Verify {
        /// Manifest to check against; searched upwards from the first file if omitted
        #[arg(short = 'f', long = "file")]
        manifest: Option<String>,
        /// Only check that files exist with the declared size
        #[arg(short = 'e', long = "existence-only")]
        existence_only: bool,
        /// Keep checking after a failure
        #[arg(short = 'c', long = "continue-on-error")]
        continue_on_error: bool,
        #[arg(short = '#', long = "sequence")]
        sequence: bool,
        #[arg(long, default_value_t = false)]
        parallel: bool,
        /// Print the full report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
        #[arg(long, default_value_t = false)]
        progress: bool,
        files: Vec<String>,
    },
    /// Print digests of files
    Hash {
        #[arg(short = 't', long = "hash", value_enum, value_delimiter = ',', required = true)]
        hash_types: Vec<HashArg>,
        #[arg(short = '#', long = "sequence")]
        sequence: bool,
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Print the records of a manifest, or build one from digest lines
    #[command(group(ArgGroup::new("mode").required(true).args(["parse", "input"])))]
    File {
        /// Manifest to print as digest lines
        #[arg(short = 'p', long = "parse")]
        parse: Option<String>,
        /// Digest lines to turn into a manifest ('-' reads stdin)
        #[arg(short = 'i', long = "input")]
        input: Option<String>,
        #[arg(short = 'o', long = "output-folder")]
        output: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli.cmd) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code_of(&err))
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("MHL_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn exit_code_of(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|e| e.downcast_ref::<MhlError>())
        .map_or(ErrorKind::UnknownError.exit_code(), MhlError::exit_code)
}

fn run(cmd: Cmd) -> Result<u8> {
    match cmd {
        Cmd::Seal { hash_types, output, sequence, parallel, progress, files } => {
            seal_files(hash_types, &output, sequence, parallel, progress, &files)
        }
        Cmd::Verify { manifest, existence_only, continue_on_error, sequence, parallel, json, progress, files } => {
            let opts = VerifyOptions { existence_only, continue_on_error, sequences: sequence, parallel };
            verify(manifest.as_deref(), opts, json, progress, &files)
        }
        Cmd::Hash { hash_types, sequence, files } => hash(hash_types, sequence, &files),
        Cmd::File { parse, input, output } => match (parse, input) {
            (Some(m), _) => parse_manifest(&m),
            (None, Some(i)) => seal_from_lines(&i, &output),
            (None, None) => {
                Err(MhlError::new(ErrorKind::WrongArguments, "either --parse or --input is required").into())
            }
        },
    }
}

fn resolve_dirs(dirs: &[String], cwd: &PathComponents) -> Result<Vec<PathComponents>> {
    dirs.iter()
        .map(|d| PathComponents::resolve(d, cwd).with_context(|| format!("output folder {d}")))
        .collect()
}

fn seal_files(
    hash_types: Vec<HashArg>,
    output: &[String],
    sequence: bool,
    parallel: bool,
    progress: bool,
    files: &[String],
) -> Result<u8> {
    let cwd = PathComponents::current_dir()?;
    let opts = SealOptions {
        hash_types: hash_types.into_iter().map(HashType::from).collect(),
        output_dirs: resolve_dirs(output, &cwd)?,
        sequences: sequence,
        parallel,
    };
    let files = inputs::expand(files, &cwd, opts.sequences)?;

    let progress = Progress::new(progress);
    let engine = StreamDigester::new().with_progress(progress.clone());
    progress.start();
    let report = Sealer::new(&engine, opts).with_progress(progress.clone()).seal(&files, TOOL);
    progress.stop();
    let report = report?;

    for m in &report.manifests {
        println!("{}", m.display());
    }
    eprintln!("{} file(s) sealed into {} manifest(s)", report.files_sealed, report.manifests.len());
    Ok(0)
}

fn verify(manifest: Option<&str>, opts: VerifyOptions, json: bool, progress: bool, files: &[String]) -> Result<u8> {
    let cwd = PathComponents::current_dir()?;
    let files = inputs::expand(files, &cwd, opts.sequences)?;
    let manifest_path = match manifest {
        Some(m) => Path::new(m).to_path_buf(),
        None => {
            let start = files.first().map(PathComponents::to_path_buf).unwrap_or_else(|| cwd.to_path_buf());
            manifest::find_manifest_for(&start)?
        }
    };
    let manifest =
        Manifest::load(&manifest_path).with_context(|| format!("load {}", manifest_path.display()))?;
    info!(manifest = %manifest_path.display(), records = manifest.len(), "manifest loaded");

    let progress = Progress::new(progress);
    let engine = StreamDigester::new().with_progress(progress.clone());
    let discovery = if files.is_empty() { Discovery::WholeManifest } else { Discovery::Explicit(&files) };
    progress.start();
    let report = Verifier::new(&manifest, &engine, opts).with_progress(progress.clone()).run(discovery);
    progress.stop();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report.exit_code())
}

fn print_report(report: &VerifyReport) {
    for o in report.outcomes.iter().filter(|o| !o.is_ok()) {
        println!("FAILED {}: {}", o.path, o.message.as_deref().unwrap_or_default());
    }
    println!(
        "{} file(s) processed, {} OK, {} failed{}",
        report.files_processed,
        report.files_ok,
        report.files_failed,
        if report.aborted { " (stopped at first failure)" } else { "" }
    );
    println!("{}", if report.is_success() { "OK" } else { "FAILED" });
}

/// Relative to the working directory when below it, absolute otherwise.
fn display_path(path: &PathComponents, cwd: &PathComponents) -> String {
    cwd.extract_relative(path)
        .map(|rel| rel.render(Separator::Native))
        .unwrap_or_else(|_| path.render(Separator::Native))
}

fn hash(hash_types: Vec<HashArg>, sequence: bool, files: &[String]) -> Result<u8> {
    let requested: Vec<HashType> = hash_types.into_iter().map(HashType::from).collect();
    let types = seal::validate_hash_types(&requested)?;
    let cwd = PathComponents::current_dir()?;
    let files = inputs::expand(files, &cwd, sequence)?;
    let engine = StreamDigester::new();
    for file in &files {
        let native = file.to_path_buf();
        let st = mfs::stat(&native)?;
        if st.kind != mfs::EntryKind::File {
            return Err(MhlError::new(ErrorKind::NotFile, format!("{file} is not a regular file")).into());
        }
        let shown = display_path(file, &cwd);
        for digest in engine.compute_many(&native, &types)? {
            println!("{}", DigestLine::new(digest.hash_type(), shown.clone(), Some(digest.to_hex())));
        }
    }
    Ok(0)
}

fn parse_manifest(path: &str) -> Result<u8> {
    let manifest = Manifest::load(Path::new(path)).with_context(|| format!("load {path}"))?;
    for r in manifest.iter() {
        println!("{}", DigestLine::new(r.hash_type, r.absolute_path.to_string(), r.hash_hex.clone()));
    }
    Ok(0)
}

fn seal_from_lines(input: &str, output: &[String]) -> Result<u8> {
    let text = if input == "-" {
        let mut s = String::new();
        std::io::stdin().read_to_string(&mut s).context("read digest lines from stdin")?;
        s
    } else {
        std::fs::read_to_string(input).map_err(|e| MhlError::io(input, e))?
    };
    let lines = DigestLine::parse_lines(&text)?;
    debug!(lines = lines.len(), "digest lines read");
    let cwd = PathComponents::current_dir()?;
    let opts = SealOptions { output_dirs: resolve_dirs(output, &cwd)?, ..SealOptions::default() };
    let engine = StreamDigester::new();
    let report = Sealer::new(&engine, opts).seal_listed(&lines, &cwd, TOOL)?;
    for m in &report.manifests {
        println!("{}", m.display());
    }
    Ok(0)
}
