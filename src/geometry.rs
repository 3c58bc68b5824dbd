//! Readout window geometry.
//!
//! ULTRACAM reads through two amplifiers, so its windows come in pairs that
//! share a Y range and a size but have separate left and right X starts.
//! ULTRASPEC windows are independent. All coordinates are unbinned pixels,
//! starting from 1.

use serde::Serialize;

use crate::{
    header::{HeaderError, ParamTable},
    modes::ReadoutMode,
};

/// A single rectangular window.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Window {
    pub xs: i32,
    pub ys: i32,
    pub nx: i32,
    pub ny: i32,
}

impl Window {
    /// Whether `inner`, binned by (`xbin`, `ybin`), lies wholly inside this
    /// window with its pixel boundaries landing on this window's binned grid.
    pub fn contains(&self, inner: &Window, xbin: i32, ybin: i32) -> bool {
        inner.xs >= self.xs
            && inner.ys >= self.ys
            && inner.xs + inner.nx <= self.xs + self.nx
            && inner.ys + inner.ny <= self.ys + self.ny
            && (inner.xs - self.xs).rem_euclid(xbin) == 0
            && (inner.ys - self.ys).rem_euclid(ybin) == 0
    }
}

/// One ULTRACAM window pair.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct WindowPair {
    pub xl: i32,
    pub xr: i32,
    pub ys: i32,
    pub nx: i32,
    pub ny: i32,
}

impl WindowPair {
    pub fn left(&self) -> Window {
        Window {
            xs: self.xl,
            ys: self.ys,
            nx: self.nx,
            ny: self.ny,
        }
    }

    pub fn right(&self) -> Window {
        Window {
            xs: self.xr,
            ys: self.ys,
            nx: self.nx,
            ny: self.ny,
        }
    }
}

/// Full frame, both halves of the chip.
pub const FULL_FRAME: WindowPair = WindowPair {
    xl: 1,
    xr: 513,
    ys: 1,
    nx: 512,
    ny: 1024,
};

/// Full frame plus the overscan columns and rows.
pub const FULL_FRAME_OVERSCAN: WindowPair = WindowPair {
    xl: -27,
    xr: 513,
    ys: 1,
    nx: 540,
    ny: 1032,
};

/// The windows of one run, shaped by its instrument.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Windows {
    Pairs(Vec<WindowPair>),
    Single(Vec<Window>),
}

impl Windows {
    /// The number of individual windows; a pair counts as two.
    pub fn count(&self) -> usize {
        match self {
            Windows::Pairs(p) => 2 * p.len(),
            Windows::Single(w) => w.len(),
        }
    }

    /// All individual windows, pairs split left then right.
    pub fn iter(&self) -> Box<dyn Iterator<Item = Window> + '_> {
        match self {
            Windows::Pairs(p) => Box::new(p.iter().flat_map(|wp| [wp.left(), wp.right()])),
            Windows::Single(w) => Box::new(w.iter().copied()),
        }
    }

    /// Extract the windows of a run in `mode` from its header parameters.
    /// Full-frame modes ignore the parameters entirely.
    pub fn for_mode(mode: ReadoutMode, params: &ParamTable) -> Result<Self, HeaderError> {
        match mode {
            ReadoutMode::FullFrameClear | ReadoutMode::FullFrameNoClear => {
                Ok(Windows::Pairs(vec![FULL_FRAME]))
            }

            ReadoutMode::FullFrameOverscan | ReadoutMode::FullFrameOverscanNoClear => {
                Ok(Windows::Pairs(vec![FULL_FRAME_OVERSCAN]))
            }

            ReadoutMode::OnePair
            | ReadoutMode::OnePairClear
            | ReadoutMode::TwoPair
            | ReadoutMode::ThreePair
            | ReadoutMode::Drift => {
                let npair = mode.nwindow() / 2;
                let mut pairs = Vec::with_capacity(npair);

                for n in 1..=npair {
                    pairs.push(WindowPair {
                        xl: params.require_int(&format!("X{n}L_START"))?,
                        xr: params.require_int(&format!("X{n}R_START"))?,
                        ys: params.require_int(&format!("Y{n}_START"))?,
                        nx: params.require_int(&format!("X{n}_SIZE"))?,
                        ny: params.require_int(&format!("Y{n}_SIZE"))?,
                    });
                }

                Ok(Windows::Pairs(pairs))
            }

            ReadoutMode::UspecDrift { .. } | ReadoutMode::UspecWindows { .. } => {
                let mut wins = Vec::with_capacity(mode.nwindow());

                for n in 1..=mode.nwindow() {
                    wins.push(Window {
                        xs: params.require_int(&format!("X{n}_START"))?,
                        ys: params.require_int(&format!("Y{n}_START"))?,
                        nx: params.require_int(&format!("X{n}_SIZE"))?,
                        ny: params.require_int(&format!("Y{n}_SIZE"))?,
                    });
                }

                Ok(Windows::Single(wins))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_frame_ignores_parameters() {
        let params: ParamTable = [
            ("X1L_START", "100"),
            ("X1R_START", "600"),
            ("Y1_START", "1"),
            ("X1_SIZE", "50"),
            ("Y1_SIZE", "50"),
        ]
        .into_iter()
        .collect();

        let w = Windows::for_mode(ReadoutMode::FullFrameClear, &params).unwrap();
        assert_eq!(w, Windows::Pairs(vec![FULL_FRAME]));
        assert_eq!(w.count(), 2);

        let w = Windows::for_mode(ReadoutMode::FullFrameOverscan, &ParamTable::default()).unwrap();
        assert_eq!(w, Windows::Pairs(vec![FULL_FRAME_OVERSCAN]));
    }

    #[test]
    fn two_pair_extraction() {
        let params: ParamTable = [
            ("X1L_START", "1"),
            ("X1R_START", "601"),
            ("Y1_START", "1"),
            ("X1_SIZE", "100"),
            ("Y1_SIZE", "200"),
            ("X2L_START", "201"),
            ("X2R_START", "801"),
            ("Y2_START", "401"),
            ("X2_SIZE", "50"),
            ("Y2_SIZE", "60"),
        ]
        .into_iter()
        .collect();

        let w = Windows::for_mode(ReadoutMode::TwoPair, &params).unwrap();
        assert_eq!(w.count(), 4);

        let all: Vec<Window> = w.iter().collect();
        assert_eq!(all[1], Window { xs: 601, ys: 1, nx: 100, ny: 200 });
        assert_eq!(all[2], Window { xs: 201, ys: 401, nx: 50, ny: 60 });

        assert!(matches!(
            Windows::for_mode(ReadoutMode::ThreePair, &params),
            Err(HeaderError::MissingParameter(_))
        ));
    }

    #[test]
    fn containment_respects_binning_grid() {
        let outer = Window { xs: 1, ys: 1, nx: 512, ny: 1024 };
        let inner = Window { xs: 101, ys: 201, nx: 100, ny: 100 };
        assert!(outer.contains(&inner, 2, 2));

        let shifted = Window { xs: 102, ..inner };
        assert!(!outer.contains(&shifted, 2, 2));
        assert!(outer.contains(&shifted, 1, 2));

        let spill = Window { xs: 500, ..inner };
        assert!(!outer.contains(&spill, 1, 1));
    }
}
