//! Exposure headers.
//!
//! Each run leaves behind an XML file, `runNNN.xml`, recording the state of
//! the observatory and instrument when the run started. We only need a small
//! part of it:
//!
//! ```xml
//! <observatory_status>
//!   <name>La Silla</name>
//!   <telescope>New Technology Telescope</telescope>
//! </observatory_status>
//! <instrument_status>
//!   <name>Ultracam</name>
//!   <application_status id="SDSU Exec" name="ap5_250_window1pair" />
//!   <parameter_status name="X_BIN_FAC" value="2" />
//!   ...
//! </instrument_status>
//! <user>
//!   <target>AM CVn</target>
//!   <PI>Marsh</PI>
//!   ...
//! </user>
//! ```
//!
//! The blocks are nested at different depths in different eras of the data
//! acquisition software, so we search for them among all descendants rather
//! than following a fixed path.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// The `id` of the application block naming the readout application.
const EXEC_APPLICATION_ID: &str = "SDSU Exec";

/// Things that can go wrong turning one header into a run record. None of
/// these is fatal to a batch: the run is logged and skipped.
#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("cannot read header {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed XML")]
    Xml(#[from] roxmltree::Error),

    #[error("no instrument_status block")]
    NoInstrumentStatus,

    #[error("instrument_status has no instrument name")]
    NoInstrument,

    #[error("no application_status with id \"SDSU Exec\"")]
    NoApplication,

    #[error("unrecognised instrument {0:?}")]
    UnknownInstrument(String),

    #[error("file name {0:?} is not of the form runNNN.xml")]
    BadFileName(PathBuf),

    #[error("required parameter {0} is absent")]
    MissingParameter(String),

    #[error("parameter {name} has unusable value {value:?}")]
    BadParameter { name: String, value: String },
}

/// The flat `name = value` table of `parameter_status` entries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamTable(BTreeMap<String, String>);

impl ParamTable {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Get an integer parameter, if present.
    pub fn int(&self, name: &str) -> Result<Option<i32>, HeaderError> {
        let Some(text) = self.get(name) else {
            return Ok(None);
        };

        text.trim()
            .parse()
            .map(Some)
            .map_err(|_| HeaderError::BadParameter {
                name: name.to_owned(),
                value: text.to_owned(),
            })
    }

    pub fn require_int(&self, name: &str) -> Result<i32, HeaderError> {
        self.int(name)?
            .ok_or_else(|| HeaderError::MissingParameter(name.to_owned()))
    }

    /// Get the first of several alternative spellings of an integer
    /// parameter that is present.
    pub fn first_int(&self, names: &[&str]) -> Result<i32, HeaderError> {
        for name in names {
            if let Some(v) = self.int(name)? {
                return Ok(v);
            }
        }

        Err(HeaderError::MissingParameter(names.join("/")))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParamTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ParamTable(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// The raw content of one exposure header, before any interpretation.
#[derive(Clone, Debug, Default)]
pub struct ExposureHeader {
    pub observatory: Option<String>,
    pub telescope: Option<String>,
    pub instrument: String,
    pub application: String,
    pub params: ParamTable,

    /// Contents of the optional `user` block, keyed by element name.
    pub user: Option<BTreeMap<String, String>>,
}

fn child_text(node: roxmltree::Node, tag: &str) -> Option<String> {
    node.descendants()
        .find(|n| n.has_tag_name(tag))
        .and_then(|n| n.text())
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
}

impl ExposureHeader {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, HeaderError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| HeaderError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, HeaderError> {
        let opts = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..Default::default()
        };
        let doc = roxmltree::Document::parse_with_options(text, opts)?;

        // A missing observatory block is survivable: the telescope can come
        // from the run directory instead.
        let (observatory, telescope) = match doc
            .descendants()
            .find(|n| n.has_tag_name("observatory_status"))
        {
            Some(node) => (child_text(node, "name"), child_text(node, "telescope")),
            None => (None, None),
        };

        let inst = doc
            .descendants()
            .find(|n| n.has_tag_name("instrument_status"))
            .ok_or(HeaderError::NoInstrumentStatus)?;

        // Only the instrument's own `name`, not those of nested status blocks.
        let instrument = inst
            .children()
            .find(|n| n.has_tag_name("name"))
            .and_then(|n| n.text())
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .ok_or(HeaderError::NoInstrument)?;

        let application = inst
            .descendants()
            .filter(|n| n.has_tag_name("application_status"))
            .find(|n| n.attribute("id") == Some(EXEC_APPLICATION_ID))
            .and_then(|n| n.attribute("name"))
            .map(str::to_owned)
            .ok_or(HeaderError::NoApplication)?;

        let params = inst
            .descendants()
            .filter(|n| n.has_tag_name("parameter_status"))
            .filter_map(|n| Some((n.attribute("name")?, n.attribute("value")?)))
            .collect();

        let user = doc.descendants().find(|n| n.has_tag_name("user")).map(|node| {
            node.children()
                .filter(|n| n.is_element())
                .filter_map(|n| {
                    let text = n.text()?.trim();
                    Some((n.tag_name().name().to_owned(), text.to_owned()))
                })
                .collect()
        });

        Ok(ExposureHeader {
            observatory,
            telescope,
            instrument,
            application,
            params,
            user,
        })
    }

    /// Look up a field of the `user` block, treating empty values as absent.
    pub fn user_field(&self, key: &str) -> Option<&str> {
        self.user
            .as_ref()?
            .get(key)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// Extract the run number from a `runNNN.xml` file name.
pub fn run_number_from_path(path: &Path) -> Result<u32, HeaderError> {
    let bad = || HeaderError::BadFileName(path.to_owned());

    let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(bad)?;
    let digits = name
        .strip_prefix("run")
        .and_then(|s| s.strip_suffix(".xml"))
        .ok_or_else(bad)?;

    if digits.len() != 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }

    digits.parse().map_err(|_| bad())
}
