//! Comparing the formats of runs.
//!
//! Two relations matter. Equivalence says two runs were taken with the same
//! instrument setup, which is what makes a bias or dark an exact match for a
//! data run. Containment says one run's windows cover another's, so that the
//! first can be cropped and binned into a calibration for the second.

use crate::run::{Format, RunRecord};

impl Format {
    /// Setup equivalence. `fussy` also demands the same avalanche gain,
    /// which only ULTRASPEC records; the output amplifier and clearing must
    /// always agree.
    pub fn matches(&self, other: &Format, fussy: bool) -> bool {
        if !self.mode.compatible_with(&other.mode)
            || self.xbin != other.xbin
            || self.ybin != other.ybin
            || self.windows.count() != other.windows.count()
            || self.speed != other.speed
            || self.clear != other.clear
            || self.output != other.output
        {
            return false;
        }

        if fussy && self.hv_gain != other.hv_gain {
            return false;
        }

        self.windows.iter().eq(other.windows.iter())
    }

    /// Whether data in this format can be binned and cropped down to
    /// `other`. Each of `other`'s windows must sit inside one of ours; a
    /// window straddling two of ours counts as not contained, even if
    /// together they would cover it.
    pub fn contains(&self, other: &Format) -> bool {
        if other.xbin % self.xbin != 0 || other.ybin % self.ybin != 0 {
            return false;
        }

        other.windows.iter().all(|inner| {
            self.windows
                .iter()
                .any(|outer| outer.contains(&inner, other.xbin, other.ybin))
        })
    }
}

impl RunRecord {
    /// Whether two runs share an instrument setup. Runs without a
    /// recognised readout mode, power on/offs included, match nothing.
    pub fn same_format(&self, other: &RunRecord, fussy: bool) -> bool {
        if self.instrument != other.instrument {
            return false;
        }

        match (&self.format, &other.format) {
            (Some(a), Some(b)) => a.matches(b, fussy),
            _ => false,
        }
    }

    /// Whether this run could stand in as a calibration for `other`.
    pub fn contains(&self, other: &RunRecord) -> bool {
        if self.instrument != other.instrument {
            return false;
        }

        match (&self.format, &other.format) {
            (Some(a), Some(b)) => a.contains(b),
            _ => false,
        }
    }
}
