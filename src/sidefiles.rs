//! Per-night side files: the observer's night log and the timing summary.
//!
//! Both are keyed on the run number, written as a fixed-width three-digit field
//! immediately after a leading `run` on each line. Everything else in either
//! file is ignored. Both are optional: a night without them still yields run
//! records, just with fewer fields filled in.

use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};
use tracing::warn;

/// Literal used in timing files for a value that could not be determined.
pub const UNDEF: &str = "UNDEF";

/// Pull the run number out of a `runNNN...` line. Returns `None` for lines
/// that are not run lines at all or whose number field is garbled.
fn run_number(line: &str) -> Option<u32> {
    if !line.starts_with("run") {
        return None;
    }

    line.get(3..6)?.trim().parse().ok()
}

/// Split off the next whitespace-delimited token, advancing `text` past it.
fn next_token<'a>(text: &mut &'a str) -> Option<&'a str> {
    let t = text.trim_start();

    if t.is_empty() {
        *text = t;
        return None;
    }

    let end = t.find(char::is_whitespace).unwrap_or(t.len());
    let (token, rest) = t.split_at(end);
    *text = rest;
    Some(token)
}

/// Lines of a hand-typed file. Bytes that are not UTF-8 become U+FFFD so
/// that one stray character costs at most one line.
fn lossy_lines<R: BufRead>(src: R) -> impl Iterator<Item = std::io::Result<String>> {
    src.split(b'\n').map(|bytes| {
        bytes.map(|b| {
            let mut line = String::from_utf8_lossy(&b).into_owned();

            if line.ends_with('\r') {
                line.pop();
            }

            line
        })
    })
}

/// The two historical layouts of night-log lines.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum NightLogFormat {
    /// `runNNN comment...`; target names live in the XML headers.
    #[default]
    CommentOnly,

    /// `runNNN target filters comment...`, from before the headers carried
    /// target names.
    NameFilterComment,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogEntry {
    pub target: Option<String>,
    pub filters: Option<String>,
    pub comment: String,
}

/// An observer's night log.
#[derive(Debug, Default)]
pub struct NightLog {
    format: NightLogFormat,
    entries: HashMap<u32, LogEntry>,
}

impl NightLog {
    pub fn load<P: AsRef<Path>>(path: P, format: NightLogFormat) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("cannot open night log {}", path.display()))?;
        Self::parse(BufReader::new(f), format)
            .with_context(|| format!("cannot read night log {}", path.display()))
    }

    /// Load a night log if it is there, logging (once) and returning `None`
    /// if it is not.
    pub fn load_optional<P: AsRef<Path>>(path: P, format: NightLogFormat) -> Option<Self> {
        match Self::load(path.as_ref(), format) {
            Ok(log) => Some(log),
            Err(e) => {
                warn!(path = %path.as_ref().display(), "night log unavailable: {e:#}");
                None
            }
        }
    }

    pub fn parse<R: BufRead>(src: R, format: NightLogFormat) -> Result<Self> {
        let mut entries = HashMap::new();

        for line in lossy_lines(src) {
            let line = line?;

            let Some(num) = run_number(&line) else {
                continue;
            };

            // `run_number` succeeded, so byte 6 is a char boundary.
            let rest = line[6..].trim();

            let entry = match format {
                NightLogFormat::CommentOnly => LogEntry {
                    comment: rest.to_owned(),
                    ..Default::default()
                },

                NightLogFormat::NameFilterComment => {
                    let mut rest = rest;
                    let target = next_token(&mut rest);
                    let filters = next_token(&mut rest);
                    let comment = rest.trim();

                    LogEntry {
                        target: target.map(|s| s.replace('~', " ")),
                        filters: filters.map(str::to_owned),
                        comment: comment.to_owned(),
                    }
                }
            };

            entries.insert(num, entry);
        }

        Ok(NightLog { format, entries })
    }

    pub fn format(&self) -> NightLogFormat {
        self.format
    }

    pub fn entry(&self, run: u32) -> Option<&LogEntry> {
        self.entries.get(&run)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Timing summary of one run. Every field is optional because the timing
/// script writes `UNDEF` for anything it could not work out.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TimingEntry {
    pub date: Option<String>,
    pub utstart: Option<String>,
    pub utend: Option<String>,
    pub nframe: Option<u32>,

    /// Total exposure, seconds
    pub expose: Option<f64>,

    /// Sampling time, seconds
    pub sample: Option<f64>,
}

fn defined(field: &str) -> Option<&str> {
    if field == UNDEF {
        None
    } else {
        Some(field)
    }
}

fn numeric<T: std::str::FromStr>(field: &str, what: &str, run: u32) -> Option<T> {
    let field = defined(field)?;

    match field.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("timing data for run {run}: unparseable {what} {field:?}; treating as undefined");
            None
        }
    }
}

/// A night's timing file.
#[derive(Debug, Default)]
pub struct Timing {
    entries: HashMap<u32, TimingEntry>,
}

impl Timing {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let f =
            File::open(path).with_context(|| format!("cannot open timing file {}", path.display()))?;
        Self::parse(BufReader::new(f))
            .with_context(|| format!("cannot read timing file {}", path.display()))
    }

    pub fn load_optional<P: AsRef<Path>>(path: P) -> Option<Self> {
        match Self::load(path.as_ref()) {
            Ok(t) => Some(t),
            Err(e) => {
                warn!(path = %path.as_ref().display(), "timing data unavailable: {e:#}");
                None
            }
        }
    }

    pub fn parse<R: BufRead>(src: R) -> Result<Self> {
        let mut entries = HashMap::new();

        for line in lossy_lines(src) {
            let line = line?;

            let Some(num) = run_number(&line) else {
                continue;
            };

            let fields: Vec<&str> = line[6..].split_whitespace().collect();

            if fields.len() != 6 {
                warn!(
                    "timing data for run {num}: expected 6 fields, found {}; line skipped",
                    fields.len()
                );
                continue;
            }

            entries.insert(
                num,
                TimingEntry {
                    date: defined(fields[0]).map(str::to_owned),
                    utstart: defined(fields[1]).map(str::to_owned),
                    utend: defined(fields[2]).map(str::to_owned),
                    nframe: numeric(fields[3], "frame count", num),
                    expose: numeric(fields[4], "exposure", num),
                    sample: numeric(fields[5], "sample time", num),
                },
            );
        }

        Ok(Timing { entries })
    }

    pub fn entry(&self, run: u32) -> Option<&TimingEntry> {
        self.entries.get(&run)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
