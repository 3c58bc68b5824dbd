//! Small hand-maintained name lists that steer target resolution.
//!
//! * `SKIP_TARGETS`: names never to look up, one per line.
//! * `FAILED_TARGETS`: names whose lookup has failed before, with the run
//!   that first produced each. Rewritten at the end of every batch.
//! * `MAPPING`: nonstandard names and the standard names to use instead.
//!
//! In all three `#` starts a comment line; in the last two `~` stands for a
//! space within a name. Any malformed line is fatal, since these files are
//! shared and a half-read list would silently change what gets looked up.

use anyhow::{bail, Context, Result};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter, ErrorKind, Write},
    path::Path,
};
use tracing::info;

fn is_comment_or_blank(line: &str) -> bool {
    line.starts_with('#') || line.trim().is_empty()
}

/// Names for which no external lookup should be tried.
#[derive(Clone, Debug, Default)]
pub struct SkipList {
    names: HashSet<String>,
}

impl SkipList {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("cannot open skip list {}", path.display()))?;
        let list = Self::parse(BufReader::new(f))
            .with_context(|| format!("cannot read skip list {}", path.display()))?;
        info!("loaded {} names to skip from {}", list.len(), path.display());
        Ok(list)
    }

    pub fn parse<R: BufRead>(src: R) -> Result<Self> {
        let mut names = HashSet::new();

        for line in src.lines() {
            let line = line?;

            if is_comment_or_blank(&line) {
                continue;
            }

            names.insert(line.trim().to_owned());
        }

        Ok(SkipList { names })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Returns true if the name was not already present.
    pub fn insert(&mut self, name: &str) -> bool {
        self.names.insert(name.to_owned())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Where a failed name was first seen.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FailureOrigin {
    pub run_dir: String,
    pub night: String,
    pub run: u32,
}

/// The report of names that could not be resolved.
#[derive(Clone, Debug, Default)]
pub struct FailedTargets {
    entries: BTreeMap<String, FailureOrigin>,
}

impl FailedTargets {
    /// Load the report if there is one. A missing file is an empty report.
    pub fn load_optional<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let f = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("no failed-targets list at {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("cannot open {}", path.display()));
            }
        };

        let report = Self::parse(BufReader::new(f))
            .with_context(|| format!("cannot read failed-targets list {}", path.display()))?;
        info!(
            "loaded {} names to skip from {}",
            report.len(),
            path.display()
        );
        Ok(report)
    }

    pub fn parse<R: BufRead>(src: R) -> Result<Self> {
        let mut entries = BTreeMap::new();

        for (i, line) in src.lines().enumerate() {
            let line = line?;

            if is_comment_or_blank(&line) {
                continue;
            }

            let pieces: Vec<&str> = line.split_whitespace().collect();

            let [name, run_dir, night, srun] = pieces[..] else {
                bail!("line {}: expected 4 fields, found {}", i + 1, pieces.len());
            };

            let Some(run) = srun.strip_prefix("run").and_then(|s| s.parse().ok()) else {
                bail!("line {}: cannot interpret {srun:?} as a run", i + 1);
            };

            entries
                .entry(name.replace('~', " "))
                .or_insert(FailureOrigin {
                    run_dir: run_dir.to_owned(),
                    night: night.to_owned(),
                    run,
                });
        }

        Ok(FailedTargets { entries })
    }

    /// Record a failure. The first origin recorded for a name is kept.
    pub fn insert(&mut self, name: &str, origin: FailureOrigin) {
        self.entries.entry(name.to_owned()).or_insert(origin);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FailureOrigin)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn write<W: Write>(&self, mut dest: W) -> std::io::Result<()> {
        writeln!(dest, "# Target names that failed lookup: name, run directory, night, run")?;

        for (name, o) in &self.entries {
            writeln!(
                dest,
                "{:<32} {} {} run{:03}",
                name.replace(' ', "~"),
                o.run_dir,
                o.night,
                o.run
            )?;
        }

        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let f = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
        let mut w = BufWriter::new(f);
        self.write(&mut w)?;
        w.flush()?;
        Ok(())
    }
}

/// Translations from nonstandard to standard target names, applied before
/// any lookup.
#[derive(Clone, Debug, Default)]
pub struct NameMapping {
    map: HashMap<String, String>,
}

impl NameMapping {
    pub fn load_optional<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("no name mapping file at {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("cannot read {}", path.display()));
            }
        };

        let mapping = Self::parse(&text)
            .with_context(|| format!("cannot read name mapping {}", path.display()))?;
        info!(
            "loaded {} names from {}, to be translated before lookup",
            mapping.len(),
            path.display()
        );
        Ok(mapping)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut map = HashMap::new();

        for (i, line) in text.lines().enumerate() {
            if is_comment_or_blank(line) {
                continue;
            }

            let pieces: Vec<&str> = line.split_whitespace().collect();

            let [nonstandard, standard] = pieces[..] else {
                bail!("line {}: expected 2 fields, found {}: {line:?}", i + 1, pieces.len());
            };

            map.insert(nonstandard.replace('~', " "), standard.replace('~', " "));
        }

        Ok(NameMapping { map })
    }

    /// The standard form of `name`.
    pub fn apply<'a>(&'a self, name: &'a str) -> &'a str {
        self.map.get(name).map(|s| s.as_str()).unwrap_or(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_list_comments() {
        let s = SkipList::parse("# standard\nPluto\n  GRB or 32K  \n\n#Test\n".as_bytes()).unwrap();
        assert_eq!(s.len(), 2);
        assert!(s.contains("GRB or 32K"));
        assert!(!s.contains("#Test"));
    }

    #[test]
    fn failed_targets_round_trip() {
        let text = "# header\nMy~Star  2010-05 2010-05-12 run007\nOther 2011-01 2011-01-03 run101\n";
        let mut f = FailedTargets::parse(text.as_bytes()).unwrap();
        assert!(f.contains("My Star"));

        f.insert(
            "New one",
            FailureOrigin {
                run_dir: "2012-02".to_owned(),
                night: "2012-02-02".to_owned(),
                run: 3,
            },
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("FAILED_TARGETS");
        f.save(&path).unwrap();

        let back = FailedTargets::load_optional(&path).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back.iter().find(|(n, _)| *n == "New one").unwrap().1.run, 3);
        assert_eq!(back.names().collect::<Vec<_>>(), vec!["My Star", "New one", "Other"]);
    }

    #[test]
    fn failed_targets_malformed() {
        assert!(FailedTargets::parse("Star 2010-05 2010-05-12\n".as_bytes()).is_err());
        assert!(FailedTargets::parse("Star 2010-05 2010-05-12 007\n".as_bytes()).is_err());

        let dir = tempfile::tempdir().unwrap();
        assert!(FailedTargets::load_optional(dir.path().join("absent"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn mapping() {
        let m = NameMapping::parse("# comment\nHU~Aquarii HU~Aqr\n\n").unwrap();
        assert_eq!(m.apply("HU Aquarii"), "HU Aqr");
        assert_eq!(m.apply("AM CVn"), "AM CVn");
        assert!(NameMapping::parse("one two three\n").is_err());
    }
}
