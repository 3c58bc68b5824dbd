//! Name resolution through SIMBAD.
//!
//! We use SIMBAD's script interface, which takes a small query script and
//! returns plain text. The reply is divided into sections introduced by
//! lines like `::data::::::...` and `::error::::::...`; with console and
//! script echo turned off the data section holds exactly one line per object
//! in the format we ask for.

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use crate::coords::parse_position;

/// The public script endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://simbad.cds.unistra.fr/simbad/sim-script";

/// One object returned by a lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct LookupHit {
    /// SIMBAD's main identifier
    pub name: String,

    /// Right ascension, hours
    pub ra: f64,

    /// Declination, degrees
    pub dec: f64,
}

/// Something that can turn a free-text name into candidate objects.
pub trait NameLookup {
    fn lookup(&mut self, name: &str) -> Result<Vec<LookupHit>>;
}

impl<T: NameLookup + ?Sized> NameLookup for &mut T {
    fn lookup(&mut self, name: &str) -> Result<Vec<LookupHit>> {
        (**self).lookup(name)
    }
}

/// Blocking client for the SIMBAD script interface.
pub struct Simbad {
    agent: ureq::Agent,
    endpoint: String,
}

impl Simbad {
    pub fn new(endpoint: &str) -> Self {
        Simbad {
            agent: ureq::Agent::new_with_defaults(),
            endpoint: endpoint.to_owned(),
        }
    }
}

impl Default for Simbad {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

/// The query script for one identifier.
pub fn query_script(name: &str) -> String {
    format!(
        "output console=off script=off\n\
         format object \"%IDLIST(1) | %COO(A D)\"\n\
         query id {name}\n"
    )
}

/// Extract the objects from a script reply. An error section means SIMBAD
/// did not recognise the name, which is zero hits rather than a failure.
pub fn parse_script_output(text: &str) -> Vec<LookupHit> {
    let mut hits = Vec::new();
    let mut in_data = false;

    for line in text.lines() {
        if line.starts_with("::error::") {
            return Vec::new();
        }

        if line.starts_with("::") {
            in_data = line.starts_with("::data::");
            continue;
        }

        let line = line.trim();

        if !in_data || line.is_empty() {
            continue;
        }

        let Some((name, coords)) = line.split_once('|') else {
            warn!("unexpected line in SIMBAD reply: {line:?}");
            continue;
        };

        match parse_position(coords) {
            Ok((ra, dec)) => hits.push(LookupHit {
                name: name.trim().to_owned(),
                ra,
                dec,
            }),

            // Objects without coordinates are of no use to us.
            Err(e) => warn!("SIMBAD object {:?} has unusable position: {e}", name.trim()),
        }
    }

    hits
}

impl NameLookup for Simbad {
    fn lookup(&mut self, name: &str) -> Result<Vec<LookupHit>> {
        debug!("SIMBAD lookup of {name:?}");

        let script = query_script(name);
        let response = self
            .agent
            .get(&self.endpoint)
            .query("script", &script)
            .call()
            .with_context(|| format!("SIMBAD request for {name:?} failed"))?;

        if response.status() != 200 {
            bail!("SIMBAD request for {name:?}: HTTP status {}", response.status());
        }

        let body = response
            .into_body()
            .read_to_string()
            .with_context(|| format!("cannot read SIMBAD reply for {name:?}"))?;

        Ok(parse_script_output(&body))
    }
}
