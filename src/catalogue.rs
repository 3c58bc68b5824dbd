//! The target catalogue: named sky positions plus the free-text names that
//! observers have used for them.
//!
//! Catalogue files have one target per line:
//!
//! ```text
//! AM~CVn        12 34 54.59 +37 37 44.1  AM~Canum~Venaticorum  /AM~?CVn.*/
//! ```
//!
//! The canonical name comes first, then RA and Dec, then any number of
//! aliases. `~` stands for a space in any token. An alias written between
//! slashes is a regular expression, matched at the start of the name; any
//! other alias must match exactly. Blank lines and lines starting with `#`
//! are ignored.
//!
//! Aliases must be unique across everything loaded, and no alias may be
//! another target's canonical name, since otherwise the catalogue could not
//! say which target a name means. A canonical name that
//! appears more than once (typically once in the main file and again in the
//! auto-discovered file) just accumulates aliases.

use regex::Regex;
use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::warn;

use crate::coords::{dms_to_degrees, format_dec, format_ra, hms_to_hours};

/// Errors in a shared catalogue. All are fatal: carrying on could write a
/// corrupted catalogue back to disk at the end of the batch.
#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("cannot access target catalogue {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{origin}, line {line}: {reason}")]
    Malformed {
        origin: String,
        line: usize,
        reason: String,
    },

    #[error("alias {alias:?} of {name:?} is already used by {owner:?}")]
    DuplicateAlias {
        alias: String,
        name: String,
        owner: String,
    },

    #[error("{origin}, line {line}: bad regular expression {pattern:?}")]
    BadRegex {
        origin: String,
        line: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// One way of recognising a target name.
#[derive(Clone, Debug)]
pub enum Alias {
    Exact(String),
    Pattern { source: String, re: Regex },
}

impl Alias {
    /// Interpret a catalogue token, `~` already replaced by spaces.
    pub fn from_token(token: &str) -> Result<Self, regex::Error> {
        match token
            .strip_prefix('/')
            .and_then(|t| t.strip_suffix('/'))
            .filter(|t| !t.is_empty())
        {
            Some(source) => Ok(Alias::Pattern {
                source: source.to_owned(),
                re: Regex::new(&format!("^(?:{source})"))?,
            }),
            None => Ok(Alias::Exact(token.to_owned())),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Alias::Exact(s) => s == name,
            Alias::Pattern { re, .. } => re.is_match(name),
        }
    }

    /// The alias as written in a catalogue file, spaces included.
    pub fn text(&self) -> String {
        match self {
            Alias::Exact(s) => s.clone(),
            Alias::Pattern { source, .. } => format!("/{source}/"),
        }
    }
}

impl PartialEq for Alias {
    fn eq(&self, other: &Self) -> bool {
        self.text() == other.text()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatalogueEntry {
    pub name: String,

    /// Right ascension, hours
    pub ra: f64,

    /// Declination, degrees
    pub dec: f64,

    pub aliases: Vec<Alias>,
}

impl CatalogueEntry {
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a.matches(name))
    }
}

#[derive(Clone, Debug, Default)]
pub struct TargetCatalogue {
    entries: Vec<CatalogueEntry>,
    by_name: HashMap<String, usize>,

    /// Alias text and canonical names to owning entry.
    owners: HashMap<String, usize>,
}

impl TargetCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and merge a catalogue file.
    pub fn read_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CatalogueError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| CatalogueError::Io {
            path: path.to_owned(),
            source,
        })?;
        self.parse_str(&text, &path.display().to_string())
    }

    /// Parse and merge catalogue text; `origin` labels errors.
    pub fn parse_str(&mut self, text: &str, origin: &str) -> Result<(), CatalogueError> {
        for (i, line) in text.lines().enumerate() {
            let lineno = i + 1;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let malformed = |reason: String| CatalogueError::Malformed {
                origin: origin.to_owned(),
                line: lineno,
                reason,
            };

            let tokens: Vec<String> = line.split_whitespace().map(|t| t.replace('~', " ")).collect();

            if tokens.len() < 7 {
                return Err(malformed(format!(
                    "expected a name and six position fields, found {} tokens",
                    tokens.len()
                )));
            }

            let ra = hms_to_hours(&tokens[1], &tokens[2], &tokens[3])
                .map_err(|e| malformed(e.to_string()))?;
            let dec = dms_to_degrees(&tokens[4], &tokens[5], &tokens[6])
                .map_err(|e| malformed(e.to_string()))?;

            let idx = self.add_entry(&tokens[0], ra, dec)?;

            for token in &tokens[7..] {
                let alias = Alias::from_token(token).map_err(|source| CatalogueError::BadRegex {
                    origin: origin.to_owned(),
                    line: lineno,
                    pattern: token.clone(),
                    source,
                })?;
                self.push_alias(idx, alias)?;
            }
        }

        Ok(())
    }

    /// Add a target, returning its index. If the name is already known the
    /// existing entry is kept, position and all. A name already used as
    /// another target's alias is an error.
    pub fn add_entry(&mut self, name: &str, ra: f64, dec: f64) -> Result<usize, CatalogueError> {
        if let Some(&idx) = self.by_name.get(name) {
            let e = &self.entries[idx];

            if (e.ra - ra).abs() > 1e-4 || (e.dec - dec).abs() > 1e-3 {
                warn!("target {name:?} listed twice with different positions; keeping the first");
            }

            return Ok(idx);
        }

        if let Some(&owner) = self.owners.get(name) {
            return Err(CatalogueError::DuplicateAlias {
                alias: name.to_owned(),
                name: name.to_owned(),
                owner: self.entries[owner].name.clone(),
            });
        }

        let idx = self.entries.len();
        self.entries.push(CatalogueEntry {
            name: name.to_owned(),
            ra,
            dec,
            aliases: Vec::new(),
        });
        self.by_name.insert(name.to_owned(), idx);
        self.owners.insert(name.to_owned(), idx);
        Ok(idx)
    }

    fn push_alias(&mut self, idx: usize, alias: Alias) -> Result<(), CatalogueError> {
        let key = alias.text();

        match self.owners.get(&key) {
            Some(&owner) if owner == idx => return Ok(()),
            Some(&owner) => {
                return Err(CatalogueError::DuplicateAlias {
                    alias: key,
                    name: self.entries[idx].name.clone(),
                    owner: self.entries[owner].name.clone(),
                })
            }
            None => {}
        }

        self.owners.insert(key, idx);
        self.entries[idx].aliases.push(alias);
        Ok(())
    }

    /// Record another exact name for a known target.
    pub fn add_alias(&mut self, name: &str, alias: &str) -> Result<(), CatalogueError> {
        let Some(&idx) = self.by_name.get(name) else {
            return Err(CatalogueError::Malformed {
                origin: "catalogue update".to_owned(),
                line: 0,
                reason: format!("no target called {name:?}"),
            });
        };

        if self.entries[idx].name == alias {
            return Ok(());
        }

        self.push_alias(idx, Alias::Exact(alias.to_owned()))
    }

    /// Find the target that a free-text name refers to. If several match,
    /// the catalogue is ambiguous; we complain and take the first.
    pub fn find(&self, name: &str) -> Option<&CatalogueEntry> {
        let mut hits = self.entries.iter().filter(|e| e.matches(name));
        let first = hits.next()?;

        let others: Vec<&str> = hits.map(|e| e.name.as_str()).collect();

        if !others.is_empty() {
            warn!(
                "target name {name:?} matches {:?} and also {others:?}; using the first",
                first.name
            );
        }

        Some(first)
    }

    pub fn get(&self, name: &str) -> Option<&CatalogueEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogueEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn write<W: Write>(&self, mut dest: W) -> std::io::Result<()> {
        for e in &self.entries {
            write!(
                dest,
                "{:<24} {} {}",
                e.name.replace(' ', "~"),
                format_ra(e.ra, ' '),
                format_dec(e.dec, ' ')
            )?;

            for a in &e.aliases {
                write!(dest, " {}", a.text().replace(' ', "~"))?;
            }

            writeln!(dest)?;
        }

        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CatalogueError> {
        let path = path.as_ref();
        let io_err = |source| CatalogueError::Io {
            path: path.to_owned(),
            source,
        };

        let f = File::create(path).map_err(io_err)?;
        let mut w = BufWriter::new(f);
        self.write(&mut w).map_err(io_err)?;
        w.flush().map_err(io_err)
    }
}
