//! What sort of frames a run contains, judged from its target name.
//!
//! Bias and dark frames are recognised by the word anywhere in the name, and
//! calibration programmes by "calib" in the programme ID or PI. Flats and
//! placeholder names are matched exactly and case-sensitively against the
//! lists below: changing an entry changes which runs count as science and
//! which names get looked up.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::run::RunRecord;

static BIAS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(^|\W)bias(\W|$)").expect("valid bias regex"));

static DARK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(^|\W)dark(\W|$)").expect("valid dark regex"));

static CALIB_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)calib").expect("valid calib regex"));

/// Target names that mean a flat field.
///
/// No historical list of flat spellings survives; these are provisional,
/// the common forms only. Sites with their own conventions should extend the
/// list rather than rely on it being complete.
pub const FLAT_NAMES: &[&str] = &[
    "Flat",
    "Flats",
    "flat",
    "flats",
    "Sky flat",
    "Sky flats",
    "Twilight flat",
    "Twilight flats",
    "Dome flat",
    "Dome flats",
];

/// Placeholder names that are never science targets and must never be
/// looked up: the names that were always skipped by the database builds.
pub const IGNORE_NAMES: &[&str] = &["Pluto", "GRB", "32K", "Test data", "GPS LED", "GRB or 32K"];

pub fn is_bias_name(target: &str) -> bool {
    BIAS_RE.is_match(target)
}

pub fn is_dark_name(target: &str) -> bool {
    DARK_RE.is_match(target)
}

pub fn is_flat_name(target: &str) -> bool {
    FLAT_NAMES.contains(&target)
}

pub fn is_ignored_name(target: &str) -> bool {
    IGNORE_NAMES.contains(&target)
}

/// The overall classification of a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum FrameKind {
    PowerOnOff,
    Bias,
    Flat,
    Dark,

    /// Taken under a calibration programme.
    Calibration,

    /// A placeholder or test name, or no name at all.
    Junk,

    Science,
}

impl RunRecord {
    fn target_str(&self) -> &str {
        self.target.as_deref().unwrap_or("")
    }

    pub fn is_bias(&self) -> bool {
        is_bias_name(self.target_str())
    }

    pub fn is_dark(&self) -> bool {
        is_dark_name(self.target_str())
    }

    pub fn is_flat(&self) -> bool {
        is_flat_name(self.target_str())
    }

    /// Runs taken under a calibration programme, according to the
    /// programme ID or PI.
    pub fn is_calib(&self) -> bool {
        [&self.program_id, &self.pi]
            .into_iter()
            .flatten()
            .any(|s| CALIB_RE.is_match(s))
    }

    pub fn frame_kind(&self) -> FrameKind {
        let target = self.target_str().trim();

        if self.is_power_onoff() {
            FrameKind::PowerOnOff
        } else if is_bias_name(target) {
            FrameKind::Bias
        } else if is_flat_name(target) {
            FrameKind::Flat
        } else if is_dark_name(target) {
            FrameKind::Dark
        } else if target.is_empty() || is_ignored_name(target) {
            FrameKind::Junk
        } else if self.is_calib() {
            FrameKind::Calibration
        } else {
            FrameKind::Science
        }
    }

    /// Whether the run is worth identifying: a named target that is not a
    /// calibration or placeholder.
    pub fn is_science(&self) -> bool {
        self.frame_kind() == FrameKind::Science
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::tests::record;

    #[test]
    fn bias_and_dark_are_word_matches() {
        assert!(is_bias_name("Bias"));
        assert!(is_bias_name("bias frames"));
        assert!(is_bias_name("Bias, 3x3 slow"));
        assert!(is_bias_name("pre-BIAS"));
        assert!(!is_bias_name("biased"));
        assert!(!is_bias_name("Abias"));

        assert!(is_dark_name("Dark"));
        assert!(is_dark_name("60s dark"));
        assert!(!is_dark_name("Darkstar"));
    }

    #[test]
    fn lists_are_case_sensitive() {
        assert!(is_flat_name("Sky flats"));
        assert!(!is_flat_name("sKy FlAtS"));
        assert!(is_ignored_name("Test data"));
        assert!(!is_ignored_name("TEST DATA"));
    }

    fn kind(target: &str, extra: &[(&str, &str)]) -> FrameKind {
        let ff = [("X_BIN_FAC", "1"), ("Y_BIN_FAC", "1")];
        let mut user = vec![("target", target)];
        user.extend_from_slice(extra);
        record("run001.xml", "Ultracam", "ap3_fullframe", &ff, &user).frame_kind()
    }

    #[test]
    fn frame_kinds() {
        assert_eq!(kind("Bias", &[]), FrameKind::Bias);
        assert_eq!(kind("Twilight flats", &[]), FrameKind::Flat);
        assert_eq!(kind("Dark 10s", &[]), FrameKind::Dark);
        assert_eq!(kind("GRB or 32K", &[]), FrameKind::Junk);
        assert_eq!(kind("", &[]), FrameKind::Junk);
        assert_eq!(kind("GD 71", &[("ID", "Calibration")]), FrameKind::Calibration);
        assert_eq!(kind("GD 71", &[("PI", "UCAM calib")]), FrameKind::Calibration);
        assert_eq!(kind("GD 71", &[("PI", "Dhillon")]), FrameKind::Science);

        let p = record("run002.xml", "Ultracam", "ap1_poweron", &[], &[]);
        assert_eq!(p.frame_kind(), FrameKind::PowerOnOff);
        assert!(!p.is_science());
    }
}
