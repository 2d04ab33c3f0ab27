use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use tilepack_core::{locate_entry, Library, Package, ResolverConfig, VirtualFileSet};

#[derive(Parser)]
#[command(
    name = "tilepack",
    version,
    about = "Resolve 3D Tiles folders into self-contained packages"
)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Resolver config (JSON); missing fields keep their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Resolve each folder as one package of a single upload batch
    Resolve {
        #[arg(long)]
        include: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
        /// Print a JSON summary instead of text
        #[arg(long, default_value_t = false)]
        json: bool,
        #[arg(required = true)]
        folders: Vec<PathBuf>,
    },
    /// Print the entry manifest path of a folder
    Locate { folder: PathBuf },
    /// Print the rewritten entry manifest of a folder
    Show { folder: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = match &cli.config {
        Some(p) => ResolverConfig::load(p)?,
        None => ResolverConfig::default(),
    };
    match cli.cmd {
        Cmd::Resolve { include, exclude, json, folders } => {
            resolve(&config, &include, &exclude, json, &folders)?
        }
        Cmd::Locate { folder } => locate(&config, &folder)?,
        Cmd::Show { folder } => show(&config, &folder)?,
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::builder().with_default_directive(level.into()).from_env_lossy())
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn build_globset(includes: &[String], excludes: &[String]) -> Result<(GlobSet, GlobSet)> {
    let mut incb = GlobSetBuilder::new();
    let mut excb = GlobSetBuilder::new();
    if includes.is_empty() {
        incb.add(Glob::new("**/*")?);
    }
    for g in includes {
        incb.add(Glob::new(g).with_context(|| format!("bad include glob {g:?}"))?);
    }
    for g in excludes {
        excb.add(Glob::new(g).with_context(|| format!("bad exclude glob {g:?}"))?);
    }
    Ok((incb.build()?, excb.build()?))
}

/// Read every regular file under `folder` as `<folder name>/<relative path>`,
/// the shape a browser folder upload delivers.
fn ingest_folder(folder: &Path, inc: &GlobSet, exc: &GlobSet) -> Result<Vec<(String, Vec<u8>)>> {
    let name = folder_name(folder)?;

    let mut out = vec![];
    for e in WalkDir::new(folder).sort_by_file_name() {
        let e = e?;
        if !e.file_type().is_file() {
            continue;
        }
        let rel = pathdiff::diff_paths(e.path(), folder).unwrap_or_else(|| e.path().to_path_buf());
        let rel = rel.to_string_lossy().replace('\\', "/");
        if !inc.is_match(&rel) || exc.is_match(&rel) {
            continue;
        }
        let bytes = fs::read(e.path()).with_context(|| format!("read {}", e.path().display()))?;
        out.push((format!("{name}/{rel}"), bytes));
    }
    Ok(out)
}

fn folder_name(folder: &Path) -> Result<String> {
    let md = fs::metadata(folder).with_context(|| format!("stat {}", folder.display()))?;
    if !md.is_dir() {
        bail!("{} is not a folder", folder.display());
    }
    fs::canonicalize(folder)?
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .with_context(|| format!("{} has no folder name", folder.display()))
}

fn resolve(
    config: &ResolverConfig,
    includes: &[String],
    excludes: &[String],
    json: bool,
    folders: &[PathBuf],
) -> Result<()> {
    let mut seen: BTreeMap<String, &Path> = BTreeMap::new();
    for f in folders {
        let name = folder_name(f)?;
        if let Some(first) = seen.insert(name.clone(), f) {
            bail!(
                "{} and {} share the folder name {name:?}; each package needs a distinct name",
                first.display(),
                f.display()
            );
        }
    }

    let (inc, exc) = build_globset(includes, excludes)?;
    let mut batch = vec![];
    for f in folders {
        batch.extend(ingest_folder(f, &inc, &exc)?);
    }

    let mut lib = Library::new(config.clone());
    let outcomes = lib.load_batch(batch)?;
    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();

    if json {
        let summary: Vec<serde_json::Value> = outcomes
            .iter()
            .map(|o| match &o.result {
                Ok(id) => lib.get(*id).map(package_json).unwrap_or(serde_json::Value::Null),
                Err(e) => serde_json::json!({ "name": o.folder, "error": e.to_string() }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for o in &outcomes {
            match &o.result {
                Ok(id) => {
                    let Some(p) = lib.get(*id) else { continue };
                    println!(
                        "{}: OK entry={} files={} handles={} warnings={}",
                        p.name(),
                        p.entry_address(),
                        p.file_count(),
                        p.handles().len(),
                        p.warnings().len()
                    );
                    for w in p.warnings() {
                        println!("  warning: {}", w);
                    }
                }
                Err(e) => println!("{}: FAILED ({})", o.folder, e),
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} package(s) failed", failed, outcomes.len());
    }
    Ok(())
}

fn package_json(p: &Package) -> serde_json::Value {
    serde_json::json!({
        "name": p.name(),
        "entry": p.entry_address(),
        "entry_source": p.entry().source(),
        "files": p.file_count(),
        "bytes": p.total_bytes(),
        "handles": p.handles().len(),
        "warnings": p.warnings().iter().map(|w| w.to_string()).collect::<Vec<_>>(),
        "resolved_utc": p.resolved_utc(),
    })
}

fn single_folder(folder: &Path) -> Result<VirtualFileSet> {
    let (inc, exc) = build_globset(&[], &[])?;
    Ok(VirtualFileSet::new(ingest_folder(folder, &inc, &exc)?)?)
}

fn locate(config: &ResolverConfig, folder: &Path) -> Result<()> {
    let set = single_folder(folder)?;
    match locate_entry(&set, config) {
        Some(f) => println!("{}", f.rel_path),
        None => bail!("no {} found under {}", config.entry_suffix, folder.display()),
    }
    Ok(())
}

fn show(config: &ResolverConfig, folder: &Path) -> Result<()> {
    let set = single_folder(folder)?;
    let mut lib = Library::new(config.clone());
    let outcome = lib.load_file_set(&set).into_iter().next().context("empty folder")?;
    let id = outcome.result.with_context(|| format!("resolve {}", outcome.folder))?;
    let p = lib.get(id).context("package vanished")?;
    let doc = p.entry_document().context("entry handle revoked")?;
    let v: serde_json::Value = serde_json::from_slice(&doc)?;
    println!("{}", serde_json::to_string_pretty(&v)?);
    Ok(())
}
