//! Target resolution across a batch.
//!
//! A [`ResolverSession`] owns everything that resolution reads and updates:
//! the catalogue, the skip list, the name mapping, and the record of what was
//! discovered and what failed. The batch creates one, threads it through
//! every run, and at the end takes the discoveries and failures back out to
//! persist them.
//!
//! Each distinct name is sent to the external lookup at most once per
//! session. A success adds the name to the in-memory catalogue so that the
//! next run with that name is resolved locally; a failure adds it to the
//! skip list.

use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::{
    catalogue::TargetCatalogue,
    lists::{FailedTargets, FailureOrigin, NameMapping, SkipList},
    run::{Identification, RunRecord},
    simbad::NameLookup,
};

/// A target identified by lookup during this session.
#[derive(Clone, Debug, PartialEq)]
pub struct Discovery {
    /// Right ascension, hours
    pub ra: f64,

    /// Declination, degrees
    pub dec: f64,

    /// The free-text names that led to it.
    pub aliases: Vec<String>,
}

pub struct ResolverSession<L> {
    catalogue: TargetCatalogue,
    skip: SkipList,
    mapping: NameMapping,
    lookup: Option<L>,
    discovered: BTreeMap<String, Discovery>,
    failures: FailedTargets,
    lookups: usize,
}

impl<L: NameLookup> ResolverSession<L> {
    /// Start a session. With no `lookup`, only the catalogue is consulted.
    pub fn new(
        catalogue: TargetCatalogue,
        skip: SkipList,
        mapping: NameMapping,
        lookup: Option<L>,
    ) -> Self {
        ResolverSession {
            catalogue,
            skip,
            mapping,
            lookup,
            discovered: BTreeMap::new(),
            failures: FailedTargets::default(),
            lookups: 0,
        }
    }

    /// Resolve a free-text target name. Only `science` targets are worth an
    /// external lookup; `origin` says where a failure should be reported
    /// against.
    pub fn resolve(
        &mut self,
        name: &str,
        science: bool,
        origin: Option<FailureOrigin>,
    ) -> Option<Identification> {
        let name = self.mapping.apply(name.trim()).to_owned();

        if name.is_empty() {
            return None;
        }

        if let Some(entry) = self.catalogue.find(&name) {
            return Some(Identification {
                id: entry.name.clone(),
                ra: entry.ra,
                dec: entry.dec,
                from_simbad: self.discovered.contains_key(&entry.name),
            });
        }

        if !science || self.skip.contains(&name) {
            return None;
        }

        let lookup = self.lookup.as_mut()?;
        self.lookups += 1;

        let reason = match lookup.lookup(&name) {
            Ok(mut hits) if hits.len() == 1 => {
                let hit = hits.remove(0);
                info!("{name:?} identified as {:?} by lookup", hit.name);
                return Some(self.record_discovery(&name, hit.name, hit.ra, hit.dec));
            }

            Ok(hits) if hits.is_empty() => "no match".to_owned(),
            Ok(hits) => format!("{} matches", hits.len()),
            Err(e) => format!("{e:#}"),
        };

        warn!("lookup of {name:?} failed: {reason}");
        self.skip.insert(&name);

        if let Some(o) = origin {
            self.failures.insert(&name, o);
        }

        None
    }

    fn record_discovery(&mut self, name: &str, id: String, ra: f64, dec: f64) -> Identification {
        // An identifier the catalogue already knows, as a name or an alias,
        // means that target; its catalogued position is kept.
        let id = match self.catalogue.find(&id) {
            Some(entry) => entry.name.clone(),
            None => id,
        };

        if let Err(e) = self.catalogue.add_entry(&id, ra, dec) {
            warn!("cannot add {id:?} to the catalogue: {e}");
        }

        if let Err(e) = self.catalogue.add_alias(&id, name) {
            warn!("cannot add {name:?} to the catalogue: {e}");
        }

        let (ra, dec) = self
            .catalogue
            .get(&id)
            .map(|e| (e.ra, e.dec))
            .unwrap_or((ra, dec));

        let d = self.discovered.entry(id.clone()).or_insert(Discovery {
            ra,
            dec,
            aliases: Vec::new(),
        });

        if name != id && !d.aliases.iter().any(|a| a == name) {
            d.aliases.push(name.to_owned());
        }

        Identification {
            id,
            ra,
            dec,
            from_simbad: true,
        }
    }

    /// Fill in the identity of a run from its target name.
    pub fn identify(&mut self, record: &mut RunRecord) {
        if record.is_power_onoff() {
            return;
        }

        let Some(target) = record.target.clone() else {
            return;
        };

        let origin = FailureOrigin {
            run_dir: record.run_dir.clone().unwrap_or_else(|| "-".to_owned()),
            night: record.night.clone().unwrap_or_else(|| "-".to_owned()),
            run: record.number,
        };

        record.identity = self.resolve(&target, record.is_science(), Some(origin));
    }

    pub fn catalogue(&self) -> &TargetCatalogue {
        &self.catalogue
    }

    pub fn skip_list(&self) -> &SkipList {
        &self.skip
    }

    /// Targets identified by lookup this session, by identifier.
    pub fn discoveries(&self) -> &BTreeMap<String, Discovery> {
        &self.discovered
    }

    /// Names whose lookup failed this session.
    pub fn failures(&self) -> &FailedTargets {
        &self.failures
    }

    /// Number of external lookups made.
    pub fn lookups(&self) -> usize {
        self.lookups
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::simbad::LookupHit;
    use anyhow::{bail, Result};

    /// A lookup that knows a fixed set of names and counts its calls.
    #[derive(Default)]
    pub(crate) struct FakeLookup {
        pub known: Vec<(String, LookupHit)>,
        pub calls: Vec<String>,
    }

    impl FakeLookup {
        pub(crate) fn knowing(name: &str, id: &str, ra: f64, dec: f64) -> Self {
            FakeLookup {
                known: vec![(
                    name.to_owned(),
                    LookupHit {
                        name: id.to_owned(),
                        ra,
                        dec,
                    },
                )],
                calls: Vec::new(),
            }
        }
    }

    impl NameLookup for FakeLookup {
        fn lookup(&mut self, name: &str) -> Result<Vec<LookupHit>> {
            self.calls.push(name.to_owned());

            if name == "Broken" {
                bail!("service unavailable");
            }

            if name == "Ambiguous" {
                let h = LookupHit {
                    name: "X".to_owned(),
                    ra: 1.,
                    dec: 1.,
                };
                return Ok(vec![h.clone(), h]);
            }

            Ok(self
                .known
                .iter()
                .filter(|(n, _)| n == name)
                .map(|(_, h)| h.clone())
                .collect())
        }
    }

    fn session(lookup: &mut FakeLookup) -> ResolverSession<&mut FakeLookup> {
        let mut cat = TargetCatalogue::new();
        cat.parse_str("AM~CVn 12 34 54.59 +37 37 44.1 AM~Canum~Venaticorum\n", "T")
            .unwrap();
        let skip = SkipList::parse("Pre-seeded\n".as_bytes()).unwrap();
        let mapping = NameMapping::parse("amcvn AM~CVn\n").unwrap();
        ResolverSession::new(cat, skip, mapping, Some(lookup))
    }

    fn origin(run: u32) -> Option<FailureOrigin> {
        Some(FailureOrigin {
            run_dir: "2010-05".to_owned(),
            night: "2010-05-12".to_owned(),
            run,
        })
    }

    #[test]
    fn catalogue_hits_need_no_lookup() {
        let mut fake = FakeLookup::default();
        let mut s = session(&mut fake);

        let id = s.resolve("AM Canum Venaticorum", true, origin(1)).unwrap();
        assert_eq!(id.id, "AM CVn");
        assert!(!id.from_simbad);

        // via the mapping
        assert_eq!(s.resolve(" amcvn ", true, origin(2)).unwrap().id, "AM CVn");
        assert_eq!(s.lookups(), 0);
        drop(s);
        assert!(fake.calls.is_empty());
    }

    #[test]
    fn one_lookup_per_name() {
        let mut fake = FakeLookup::knowing("Mystery star", "V* MY Sta", 3.5, -20.25);
        let mut s = session(&mut fake);

        let a = s.resolve("Mystery star", true, origin(1)).unwrap();
        let b = s.resolve("Mystery star", true, origin(2)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.id, "V* MY Sta");
        assert!(a.from_simbad);
        assert_eq!(s.lookups(), 1);
        assert_eq!(
            s.discoveries()["V* MY Sta"].aliases,
            vec!["Mystery star".to_owned()]
        );

        assert!(s.resolve("Nothing here", true, origin(3)).is_none());
        assert!(s.resolve("Nothing here", true, origin(4)).is_none());
        assert!(s.resolve("Broken", true, origin(5)).is_none());
        assert!(s.resolve("Ambiguous", true, origin(6)).is_none());
        assert_eq!(s.lookups(), 4);
        assert!(s.skip_list().contains("Nothing here"));
        assert_eq!(s.failures().len(), 3);
        assert_eq!(s.failures().iter().find(|(n, _)| *n == "Nothing here").unwrap().1.run, 3);

        drop(s);
        assert_eq!(
            fake.calls,
            vec!["Mystery star", "Nothing here", "Broken", "Ambiguous"]
        );
    }

    #[test]
    fn lookup_of_known_identifier_joins_that_target() {
        let mut fake = FakeLookup::knowing("AM-CVn", "AM Canum Venaticorum", 0., 0.);
        let mut s = session(&mut fake);

        let id = s.resolve("AM-CVn", true, origin(1)).unwrap();
        assert_eq!(id.id, "AM CVn");
        assert!((id.dec - 37.6289).abs() < 1e-3);
        assert_eq!(s.catalogue().len(), 1);
        assert_eq!(s.catalogue().find("AM-CVn").unwrap().name, "AM CVn");
    }

    #[test]
    fn skipped_and_non_science_names_are_not_looked_up() {
        let mut fake = FakeLookup::default();
        let mut s = session(&mut fake);

        assert!(s.resolve("Pre-seeded", true, origin(1)).is_none());
        assert!(s.resolve("Some flat", false, origin(2)).is_none());
        assert_eq!(s.lookups(), 0);
        assert!(s.failures().is_empty());
    }

    #[test]
    fn no_lookup_configured() {
        let mut s: ResolverSession<FakeLookup> = ResolverSession::new(
            TargetCatalogue::new(),
            SkipList::default(),
            NameMapping::default(),
            None,
        );
        assert!(s.resolve("Anything", true, origin(1)).is_none());
        assert_eq!(s.lookups(), 0);
        assert!(!s.skip_list().contains("Anything"));
    }
}
