//! Observing-night format tools: which formats were used, which runs share a
//! format, which formats still need biases, and which runs can calibrate a
//! given run.
//!
//! These work over directories of `runNNN.xml` files, without side files.

use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::warn;

use crate::run::{ReadSpeed, RunContext, RunRecord};

static RUN_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^run[0-9]{3}\.xml$").expect("valid run file regex"));

/// List the run headers in one directory, sorted.
pub fn run_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();

        if name.to_str().is_some_and(|n| RUN_FILE_RE.is_match(n)) {
            files.push(entry.path());
        }
    }

    files.sort();
    Ok(files)
}

/// Read every run in the given directories and in any `data` subdirectory
/// of them. Unreadable runs are logged and skipped.
pub fn collect_runs<P: AsRef<Path>>(dirs: &[P]) -> Vec<RunRecord> {
    let mut runs = Vec::new();
    let ctx = RunContext::default();

    for dir in dirs {
        let dir = dir.as_ref();
        let mut search = vec![dir.to_owned()];
        let data = dir.join("data");

        if data.is_dir() {
            search.push(data);
        }

        for d in search {
            let files = match run_files(&d) {
                Ok(f) => f,
                Err(e) => {
                    warn!(path = %d.display(), "cannot list directory: {e}");
                    continue;
                }
            };

            for path in files {
                match RunRecord::read(&path, &ctx) {
                    Ok(r) => runs.push(r),
                    Err(e) => warn!(path = %path.display(), "skipping run: {e}"),
                }
            }
        }
    }

    runs
}

fn unique_of<'a>(runs: impl IntoIterator<Item = &'a RunRecord>, fussy: bool) -> Vec<&'a RunRecord> {
    let mut uniq: Vec<&RunRecord> = Vec::new();

    for run in runs.into_iter().filter(|r| r.format.is_some()) {
        match uniq.iter().position(|u| u.same_format(run, fussy)) {
            Some(i) => {
                if uniq[i].is_bias() && !run.is_bias() {
                    uniq[i] = run;
                }
            }
            None => uniq.push(run),
        }
    }

    uniq
}

/// One representative run of each distinct format. A bias is displaced by a
/// later non-bias run of the same format, since the latter says more about
/// what the format was for. Runs with no recognised format are left out.
pub fn unique_formats(runs: &[RunRecord], fussy: bool) -> Vec<&RunRecord> {
    unique_of(runs, fussy)
}

/// Runs with the same format as `template`, other than the template itself.
pub fn matching_formats<'a>(
    template: &RunRecord,
    runs: &'a [RunRecord],
    fussy: bool,
) -> Vec<&'a RunRecord> {
    runs.iter()
        .filter(|r| r.path != template.path && template.same_format(r, fussy))
        .collect()
}

/// Distinct non-bias formats with no bias of the same format.
pub fn missing_biases(runs: &[RunRecord]) -> Vec<&RunRecord> {
    let biases: Vec<&RunRecord> = runs.iter().filter(|r| r.is_bias()).collect();

    unique_of(runs.iter().filter(|r| !r.is_bias()), false)
        .into_iter()
        .filter(|d| !biases.iter().any(|b| b.same_format(d, false)))
        .collect()
}

fn speed_of(r: &RunRecord) -> Option<ReadSpeed> {
    r.format.as_ref().and_then(|f| f.speed)
}

/// Runs that could be cropped and binned into a calibration for `data`.
/// Biases, and anything not obviously a calibration frame, must also match
/// the readout speed; flats and darks need not.
pub fn calibration_candidates<'a>(data: &RunRecord, runs: &'a [RunRecord]) -> Vec<&'a RunRecord> {
    runs.iter()
        .filter(|r| r.path != data.path && r.contains(data))
        .filter(|r| {
            let any_speed = !r.is_bias() && (r.is_flat() || r.is_dark() || r.is_calib());
            any_speed || speed_of(r) == speed_of(data)
        })
        .collect()
}
