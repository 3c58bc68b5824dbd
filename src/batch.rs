//! The batch: walk a tree of observing runs, build a record for every run,
//! identify its target, and write the searchable run database.
//!
//! The tree looks like
//!
//! ```text
//! root/
//!   2010-05/             one directory per observing run, plus `Others`
//!     telescope          optional; names the telescope for the whole run
//!     2010-05-12/        one directory per night
//!       2010-05-12.dat   night log (optional)
//!       2010-05-12.times timing data (optional)
//!       data/run001.xml  exposure headers
//! ```
//!
//! Problems with individual runs, nights, or side files are logged and
//! skipped. Problems with the shared catalogue and name lists stop the batch
//! before any run is read.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs::{self, File},
    io::{BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
};
use tracing::{error, info, warn};

use crate::{
    catalogue::TargetCatalogue,
    formats::run_files,
    lists::{FailedTargets, NameMapping, SkipList},
    resolver::{Discovery, ResolverSession},
    run::{RunContext, RunRecord},
    sidefiles::{NightLog, NightLogFormat, Timing},
    simbad::NameLookup,
};

static RUN_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}$").expect("valid run directory regex"));

static NIGHT_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid night directory regex"));

/// Name of the catch-all run directory.
pub const OTHERS_DIR: &str = "Others";

/// Everything a batch needs to know.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Directory holding the run directories.
    pub root: PathBuf,

    pub targets: PathBuf,
    pub auto_targets: PathBuf,
    pub skip_targets: PathBuf,
    pub failed_targets: PathBuf,
    pub mapping: PathBuf,

    /// Where to write the run database.
    pub output: PathBuf,

    /// Only process these run directories; empty means all of them.
    pub run_dirs: Vec<String>,

    pub log_format: NightLogFormat,
}

impl BatchConfig {
    /// The conventional layout: all the shared files live in `root`.
    pub fn in_dir<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();

        BatchConfig {
            root: root.to_owned(),
            targets: root.join("TARGETS"),
            auto_targets: root.join("AUTO_TARGETS"),
            skip_targets: root.join("SKIP_TARGETS"),
            failed_targets: root.join("FAILED_TARGETS"),
            mapping: root.join("MAPPING"),
            output: root.join("ultra.json"),
            run_dirs: Vec::new(),
            log_format: NightLogFormat::default(),
        }
    }
}

/// The shared inputs of a batch, all loaded before any run is read.
#[derive(Debug)]
pub struct BatchSetup {
    pub catalogue: TargetCatalogue,
    pub skip: SkipList,
    pub mapping: NameMapping,

    /// Failures recorded by earlier batches.
    pub prior_failures: FailedTargets,
}

impl BatchSetup {
    pub fn load(cfg: &BatchConfig) -> Result<Self> {
        let mut catalogue = TargetCatalogue::new();
        catalogue.read_file(&cfg.targets)?;
        let nmain = catalogue.len();

        if cfg.auto_targets.exists() {
            catalogue.read_file(&cfg.auto_targets)?;
        } else {
            info!("no auto-discovered targets at {}", cfg.auto_targets.display());
        }

        info!(
            "loaded {} targets ({} from {})",
            catalogue.len(),
            nmain,
            cfg.targets.display()
        );

        let mut skip = SkipList::load(&cfg.skip_targets)?;
        let prior_failures = FailedTargets::load_optional(&cfg.failed_targets)?;

        for name in prior_failures.names() {
            skip.insert(name);
        }

        let mapping = NameMapping::load_optional(&cfg.mapping)?;

        Ok(BatchSetup {
            catalogue,
            skip,
            mapping,
            prior_failures,
        })
    }
}

/// One row of the run database. Only runs with an identified target get one.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DbEntry {
    /// Right ascension, hours
    pub ra: f64,

    /// Declination, degrees
    pub dec: f64,

    /// Run directory
    pub run: String,

    pub night: String,
    pub num: u32,
    pub target: String,
    pub id: String,

    /// Total exposure, minutes
    pub expose: f64,

    pub pi: Option<String>,
    pub comment: String,
}

impl DbEntry {
    pub fn from_record(r: &RunRecord) -> Option<Self> {
        let ident = r.identity.as_ref()?;

        Some(DbEntry {
            ra: ident.ra,
            dec: ident.dec,
            run: r.run_dir.clone().unwrap_or_default(),
            night: r.night.clone().unwrap_or_default(),
            num: r.number,
            target: r.target.as_deref().unwrap_or("").trim().to_owned(),
            id: ident.id.trim().to_owned(),
            expose: r.timing.expose.unwrap_or(0.) / 60.,
            pi: r.pi.clone(),
            comment: r.comment.as_deref().unwrap_or("").trim().to_owned(),
        })
    }
}

/// What a batch did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchSummary {
    pub runs: usize,
    pub bad_runs: usize,
    pub entries: usize,
    pub lookups: usize,
    pub discovered: usize,
    pub failed: usize,
}

fn matching_subdirs(dir: &Path, re: &Regex) -> Result<Vec<String>> {
    let mut names = Vec::new();

    for entry in fs::read_dir(dir).with_context(|| format!("cannot list {}", dir.display()))? {
        let entry = entry?;

        if !entry.file_type()?.is_dir() {
            continue;
        }

        if let Some(name) = entry.file_name().to_str() {
            if re.is_match(name) {
                names.push(name.to_owned());
            }
        }
    }

    names.sort();
    Ok(names)
}

/// The run directories under `root`, sorted, with `Others` last.
pub fn run_directories(root: &Path) -> Result<Vec<String>> {
    let mut dirs = matching_subdirs(root, &RUN_DIR_RE)?;

    if root.join(OTHERS_DIR).is_dir() {
        dirs.push(OTHERS_DIR.to_owned());
    }

    Ok(dirs)
}

/// The telescope named by a run directory's `telescope` file, if any.
pub fn read_telescope(run_dir: &Path) -> Option<String> {
    let path = run_dir.join("telescope");

    match fs::read_to_string(&path) {
        Ok(text) => text
            .lines()
            .next()
            .map(|l| l.trim().to_owned())
            .filter(|l| !l.is_empty()),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), "cannot read telescope: {e}");
            None
        }
    }
}

/// Append a suffix such as `.old` to a file name.
fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Merge this session's discoveries into the auto-discovered catalogue,
/// keeping the previous version as `*.old`. Nothing on disk changes unless
/// the merge succeeds.
pub fn persist_discoveries(path: &Path, discoveries: &BTreeMap<String, Discovery>) -> Result<()> {
    let mut auto = TargetCatalogue::new();
    let existed = path.exists();

    if existed {
        auto.read_file(path)?;
    }

    for (id, d) in discoveries {
        auto.add_entry(id, d.ra, d.dec)?;

        for alias in &d.aliases {
            auto.add_alias(id, alias)?;
        }
    }

    let fresh = suffixed(path, ".new");
    auto.save(&fresh)?;

    if existed {
        let old = suffixed(path, ".old");
        fs::rename(path, &old)
            .with_context(|| format!("cannot rename {} to {}", path.display(), old.display()))?;
    }

    fs::rename(&fresh, path)
        .with_context(|| format!("cannot rename {} to {}", fresh.display(), path.display()))?;

    info!(
        "wrote {} auto-discovered targets to {}",
        auto.len(),
        path.display()
    );
    Ok(())
}

fn write_database(path: &Path, entries: &[DbEntry]) -> Result<()> {
    let f = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer(&mut w, entries)?;
    w.flush()?;
    Ok(())
}

/// Run a whole batch. With no `lookup`, targets missing from the catalogue
/// stay unidentified.
pub fn run_batch<L: NameLookup>(cfg: &BatchConfig, lookup: Option<L>) -> Result<BatchSummary> {
    let setup = BatchSetup::load(cfg)?;
    let prior_failures = setup.prior_failures;
    let mut session = ResolverSession::new(setup.catalogue, setup.skip, setup.mapping, lookup);

    let mut summary = BatchSummary::default();
    let mut entries = Vec::new();

    let mut rdirs = run_directories(&cfg.root)?;

    if !cfg.run_dirs.is_empty() {
        rdirs.retain(|d| cfg.run_dirs.contains(d));
    }

    for rdir in &rdirs {
        let rpath = cfg.root.join(rdir);
        let telescope = read_telescope(&rpath);
        info!(
            "run directory {rdir}, telescope {}",
            telescope.as_deref().unwrap_or("unknown")
        );

        let nights = match matching_subdirs(&rpath, &NIGHT_DIR_RE) {
            Ok(n) => n,
            Err(e) => {
                error!(path = %rpath.display(), "skipping run directory: {e:#}");
                continue;
            }
        };

        for night in &nights {
            let npath = rpath.join(night);
            let log = NightLog::load_optional(npath.join(format!("{night}.dat")), cfg.log_format);
            let timing = Timing::load_optional(npath.join(format!("{night}.times")));

            let dpath = npath.join("data");
            let files = match run_files(&dpath) {
                Ok(f) => f,
                Err(e) => {
                    warn!(path = %dpath.display(), "no readable data directory: {e}");
                    continue;
                }
            };

            let ctx = RunContext {
                log: log.as_ref(),
                timing: timing.as_ref(),
                telescope: telescope.as_deref(),
                run_dir: Some(rdir.as_str()),
                night: Some(night.as_str()),
            };

            let mut expose = 0.;

            for path in &files {
                let mut record = match RunRecord::read(path, &ctx) {
                    Ok(r) => r,
                    Err(e) => {
                        error!(path = %path.display(), "skipping run: {e}");
                        summary.bad_runs += 1;
                        continue;
                    }
                };

                summary.runs += 1;
                session.identify(&mut record);
                expose += record.timing.expose.unwrap_or(0.);

                if let Some(entry) = DbEntry::from_record(&record) {
                    entries.push(entry);
                }
            }

            info!(
                "night {night}: {} runs, {:.1} minutes of exposure",
                files.len(),
                expose / 60.
            );
        }
    }

    write_database(&cfg.output, &entries)?;
    info!("wrote {} runs to {}", entries.len(), cfg.output.display());

    if !session.discoveries().is_empty() {
        persist_discoveries(&cfg.auto_targets, session.discoveries())?;
    }

    if !session.failures().is_empty() {
        let mut all = prior_failures;

        for (name, origin) in session.failures().iter() {
            all.insert(name, origin.clone());
        }

        all.save(&cfg.failed_targets)?;
        info!(
            "{} new failed lookups; {} listed in {}",
            session.failures().len(),
            all.len(),
            cfg.failed_targets.display()
        );
    }

    summary.entries = entries.len();
    summary.lookups = session.lookups();
    summary.discovered = session.discoveries().len();
    summary.failed = session.failures().len();
    Ok(summary)
}
