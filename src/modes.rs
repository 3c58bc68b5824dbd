//! Readout modes and the applications that implement them.
//!
//! The header names the data-acquisition "application" that ran, not the
//! readout mode. Over the years the applications were renamed several times
//! as firmware and configuration schemes changed, so many spellings map to one
//! logical mode. Headers from every era are still in the archive, so none of
//! the old spellings can be dropped.

use once_cell::sync::Lazy;
use serde::{Serialize, Serializer};
use std::{collections::HashMap, fmt};

use crate::{header::ParamTable, run::Instrument};

/// The closed set of readout modes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ReadoutMode {
    FullFrameClear,
    FullFrameNoClear,
    FullFrameOverscan,
    FullFrameOverscanNoClear,
    OnePair,
    OnePairClear,
    TwoPair,
    ThreePair,
    Drift,

    /// ULTRASPEC drift mode: one or two windows.
    UspecDrift { nwindow: u8 },

    /// ULTRASPEC windowed mode: one to four windows.
    UspecWindows { nwindow: u8 },
}

impl ReadoutMode {
    /// The short label used in logs and run listings.
    pub fn label(&self) -> &'static str {
        match self {
            ReadoutMode::FullFrameClear => "FFCLR",
            ReadoutMode::FullFrameNoClear => "FFNCLR",
            ReadoutMode::FullFrameOverscan => "FFOVER",
            ReadoutMode::FullFrameOverscanNoClear => "FFOVNC",
            ReadoutMode::OnePair => "1-PAIR",
            ReadoutMode::OnePairClear => "1-PCLR",
            ReadoutMode::TwoPair => "2-PAIR",
            ReadoutMode::ThreePair => "3-PAIR",
            ReadoutMode::Drift => "DRIFT",
            ReadoutMode::UspecDrift { .. } => "UDRIFT",
            ReadoutMode::UspecWindows { nwindow: 1 } => "1-USPEC",
            ReadoutMode::UspecWindows { nwindow: 2 } => "2-USPEC",
            ReadoutMode::UspecWindows { nwindow: 3 } => "3-USPEC",
            ReadoutMode::UspecWindows { .. } => "4-USPEC",
        }
    }

    /// The number of individual windows the mode reads out. For ULTRACAM
    /// each window pair counts as two.
    pub fn nwindow(&self) -> usize {
        match self {
            ReadoutMode::FullFrameClear
            | ReadoutMode::FullFrameNoClear
            | ReadoutMode::FullFrameOverscan
            | ReadoutMode::FullFrameOverscanNoClear
            | ReadoutMode::OnePair
            | ReadoutMode::OnePairClear
            | ReadoutMode::Drift => 2,
            ReadoutMode::TwoPair => 4,
            ReadoutMode::ThreePair => 6,
            ReadoutMode::UspecDrift { nwindow } | ReadoutMode::UspecWindows { nwindow } => {
                *nwindow as usize
            }
        }
    }

    pub fn instrument(&self) -> Instrument {
        match self {
            ReadoutMode::UspecDrift { .. } | ReadoutMode::UspecWindows { .. } => Instrument::Usp,
            _ => Instrument::Ucm,
        }
    }

    /// Whether data taken in the two modes can share a format. Clearing
    /// between frames changes the noise but not the geometry.
    pub fn compatible_with(&self, other: &ReadoutMode) -> bool {
        use ReadoutMode::*;

        matches!(
            (self, other),
            (FullFrameClear | FullFrameNoClear, FullFrameClear | FullFrameNoClear)
                | (OnePair | OnePairClear, OnePair | OnePairClear)
        ) || self == other
    }
}

impl fmt::Display for ReadoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for ReadoutMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// How an application name determines the mode.
#[derive(Clone, Copy, Debug)]
enum AppClass {
    Fixed(ReadoutMode),

    /// ULTRASPEC windowed; the window count comes from the parameters.
    UspecWindows,

    /// ULTRASPEC drift; as above but at most two windows.
    UspecDrift,
}

static APPLICATIONS: Lazy<HashMap<&'static str, AppClass>> = Lazy::new(|| {
    use AppClass::*;
    use ReadoutMode::*;

    [
        // ULTRACAM, 2002 onwards
        ("ap3_250_fullframe", Fixed(FullFrameClear)),
        ("ap3_fullframe", Fixed(FullFrameClear)),
        ("ap9_250_fullframe_mindead", Fixed(FullFrameNoClear)),
        ("ap9_fullframe_mindead", Fixed(FullFrameNoClear)),
        ("ap4_frameover", Fixed(FullFrameOverscan)),
        ("ap4_250_frameover", Fixed(FullFrameOverscan)),
        ("ap5_250_window1pair", Fixed(OnePair)),
        ("ap5_window1pair", Fixed(OnePair)),
        ("ap_win2_bin8", Fixed(OnePair)),
        ("ap_win2_bin2", Fixed(OnePair)),
        ("ap5b_250_window1pair", Fixed(OnePairClear)),
        ("ap6_250_window2pair", Fixed(TwoPair)),
        ("ap6_window2pair", Fixed(TwoPair)),
        ("ap_win4_bin1", Fixed(TwoPair)),
        ("ap_win4_bin8", Fixed(TwoPair)),
        ("ap7_250_window3pair", Fixed(ThreePair)),
        ("ap7_window3pair", Fixed(ThreePair)),
        ("ap8_250_driftscan", Fixed(Drift)),
        ("ap8_driftscan", Fixed(Drift)),
        ("ap_drift_bin2", Fixed(Drift)),
        // ULTRACAM, configuration-file era
        ("appl3_fullframe_cfg", Fixed(FullFrameClear)),
        ("appl9_fullframe_mindead_cfg", Fixed(FullFrameNoClear)),
        ("appl4_frameover_cfg", Fixed(FullFrameOverscan)),
        ("appl10_frameover_mindead_cfg", Fixed(FullFrameOverscanNoClear)),
        ("appl5_window1pair_cfg", Fixed(OnePair)),
        ("appl5b_window1pair_cfg", Fixed(OnePairClear)),
        ("appl6_window2pair_cfg", Fixed(TwoPair)),
        ("appl7_window3pair_cfg", Fixed(ThreePair)),
        ("appl8_driftscan_cfg", Fixed(Drift)),
        // ULTRASPEC
        ("ccd201_winbin_con", UspecWindows),
        ("ccd201_winbin_cfg", UspecWindows),
        ("ccd201_driftscan_cfg", UspecDrift),
    ]
    .into_iter()
    .collect()
});

const POWER_ON_MARKERS: &[&str] = &["poweron", "pon_app", "pon_cfg"];
const POWER_OFF_MARKERS: &[&str] = &["poweroff", "pof_cfg"];

/// The result of classifying an application.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Classification {
    PowerOn,
    PowerOff,
    Mode(ReadoutMode),
    Unrecognised,
}

/// Count the consecutive ULTRASPEC windows, starting from the first, that
/// have a positive X size. At least one window is always read out.
fn uspec_window_count(params: &ParamTable, max: u8) -> u8 {
    let mut n = 0;

    for i in 1..=max {
        match params.int(&format!("X{i}_SIZE")) {
            Ok(Some(size)) if size > 0 => n = i,
            _ => break,
        }
    }

    n.max(1)
}

/// Classify an application name. Only the ULTRASPEC applications consult the
/// parameters, to count their windows.
pub fn classify(application: &str, params: &ParamTable) -> Classification {
    if POWER_ON_MARKERS.iter().any(|m| application.contains(m)) {
        return Classification::PowerOn;
    }

    if POWER_OFF_MARKERS.iter().any(|m| application.contains(m)) {
        return Classification::PowerOff;
    }

    match APPLICATIONS.get(application) {
        Some(AppClass::Fixed(mode)) => Classification::Mode(*mode),

        Some(AppClass::UspecWindows) => Classification::Mode(ReadoutMode::UspecWindows {
            nwindow: uspec_window_count(params, 4),
        }),

        Some(AppClass::UspecDrift) => Classification::Mode(ReadoutMode::UspecDrift {
            nwindow: uspec_window_count(params, 2),
        }),

        None => Classification::Unrecognised,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_params() -> ParamTable {
        ParamTable::default()
    }

    #[test]
    fn every_ultracam_spelling() {
        let expected = [
            ("ap3_250_fullframe", "FFCLR", 2),
            ("ap3_fullframe", "FFCLR", 2),
            ("appl3_fullframe_cfg", "FFCLR", 2),
            ("ap9_250_fullframe_mindead", "FFNCLR", 2),
            ("ap9_fullframe_mindead", "FFNCLR", 2),
            ("appl9_fullframe_mindead_cfg", "FFNCLR", 2),
            ("ap4_frameover", "FFOVER", 2),
            ("ap4_250_frameover", "FFOVER", 2),
            ("appl4_frameover_cfg", "FFOVER", 2),
            ("appl10_frameover_mindead_cfg", "FFOVNC", 2),
            ("ap5_250_window1pair", "1-PAIR", 2),
            ("ap5_window1pair", "1-PAIR", 2),
            ("ap_win2_bin8", "1-PAIR", 2),
            ("ap_win2_bin2", "1-PAIR", 2),
            ("appl5_window1pair_cfg", "1-PAIR", 2),
            ("ap5b_250_window1pair", "1-PCLR", 2),
            ("appl5b_window1pair_cfg", "1-PCLR", 2),
            ("ap6_250_window2pair", "2-PAIR", 4),
            ("ap6_window2pair", "2-PAIR", 4),
            ("ap_win4_bin1", "2-PAIR", 4),
            ("ap_win4_bin8", "2-PAIR", 4),
            ("appl6_window2pair_cfg", "2-PAIR", 4),
            ("ap7_250_window3pair", "3-PAIR", 6),
            ("ap7_window3pair", "3-PAIR", 6),
            ("appl7_window3pair_cfg", "3-PAIR", 6),
            ("ap8_250_driftscan", "DRIFT", 2),
            ("ap8_driftscan", "DRIFT", 2),
            ("ap_drift_bin2", "DRIFT", 2),
            ("appl8_driftscan_cfg", "DRIFT", 2),
        ];

        for (app, label, n) in expected {
            let Classification::Mode(mode) = classify(app, &no_params()) else {
                panic!("{app} not classified");
            };
            assert_eq!(mode.label(), label, "{app}");
            assert_eq!(mode.nwindow(), n, "{app}");
            assert_eq!(mode.instrument(), Instrument::Ucm);
        }
    }

    #[test]
    fn ultraspec_window_counts() {
        let params: ParamTable = [("X1_SIZE", "100"), ("X2_SIZE", "0"), ("X3_SIZE", "50")]
            .into_iter()
            .collect();
        assert_eq!(
            classify("ccd201_winbin_con", &params),
            Classification::Mode(ReadoutMode::UspecWindows { nwindow: 1 })
        );

        let params: ParamTable = [
            ("X1_SIZE", "100"),
            ("X2_SIZE", "100"),
            ("X3_SIZE", "100"),
            ("X4_SIZE", "100"),
        ]
        .into_iter()
        .collect();
        let Classification::Mode(mode) = classify("ccd201_winbin_cfg", &params) else {
            panic!("not classified");
        };
        assert_eq!(mode.label(), "4-USPEC");
        assert_eq!(mode.nwindow(), 4);

        let Classification::Mode(mode) = classify("ccd201_driftscan_cfg", &params) else {
            panic!("not classified");
        };
        assert_eq!(mode.label(), "UDRIFT");
        assert_eq!(mode.nwindow(), 2);
        assert_eq!(mode.instrument(), Instrument::Usp);

        // No sizes at all still reads one window.
        assert_eq!(
            classify("ccd201_winbin_con", &no_params()),
            Classification::Mode(ReadoutMode::UspecWindows { nwindow: 1 })
        );
    }

    #[test]
    fn power_and_unknown() {
        assert_eq!(classify("ap1_poweron", &no_params()), Classification::PowerOn);
        assert_eq!(classify("ap1_250_pon_app", &no_params()), Classification::PowerOn);
        assert_eq!(classify("ccd201_pon_cfg", &no_params()), Classification::PowerOn);
        assert_eq!(classify("ap2_poweroff", &no_params()), Classification::PowerOff);
        assert_eq!(classify("ccd201_pof_cfg", &no_params()), Classification::PowerOff);
        assert_eq!(classify("ap99_mystery", &no_params()), Classification::Unrecognised);
        assert_eq!(classify("AP3_FULLFRAME", &no_params()), Classification::Unrecognised);
    }

    #[test]
    fn compatible_pairs() {
        use ReadoutMode::*;
        assert!(FullFrameClear.compatible_with(&FullFrameNoClear));
        assert!(OnePairClear.compatible_with(&OnePair));
        assert!(TwoPair.compatible_with(&TwoPair));
        assert!(!FullFrameClear.compatible_with(&FullFrameOverscan));
        assert!(!OnePair.compatible_with(&TwoPair));
        assert!(!UspecWindows { nwindow: 1 }.compatible_with(&UspecWindows { nwindow: 2 }));
    }
}
