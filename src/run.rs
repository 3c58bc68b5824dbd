//! Run records: everything we know about one run, gathered from its header
//! and the night's side files.

use serde::{Serialize, Serializer};
use std::{
    fmt,
    path::{Path, PathBuf},
};
use tracing::warn;

use crate::{
    geometry::Windows,
    header::{run_number_from_path, ExposureHeader, HeaderError, ParamTable},
    modes::{classify, Classification, ReadoutMode},
    sidefiles::{NightLog, NightLogFormat, Timing, TimingEntry},
};

/// The two instruments.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum Instrument {
    #[serde(rename = "ULTRACAM")]
    Ucm,
    #[serde(rename = "ULTRASPEC")]
    Usp,
}

impl Instrument {
    /// Identify the instrument from the header's free-form name.
    pub fn identify(name: &str) -> Option<Self> {
        let upper = name.to_uppercase();

        if upper.contains("ULTRACAM") {
            Some(Instrument::Ucm)
        } else if upper.contains("ULTRASPEC") || upper.contains("CCD201") {
            Some(Instrument::Usp)
        } else {
            None
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Instrument::Ucm => "ULTRACAM",
            Instrument::Usp => "ULTRASPEC",
        })
    }
}

/// Full telescope names as they appear in headers, and our abbreviations.
const TELESCOPES: &[(&str, &str)] = &[
    ("Very Large Telescope", "VLT"),
    ("William Herschel Telescope", "WHT"),
    ("New Technology Telescope", "NTT"),
    ("Thai National Telescope", "TNT"),
];

/// Normalise a telescope name from a header.
pub fn normalise_telescope(name: &str) -> Option<&'static str> {
    TELESCOPES
        .iter()
        .find(|(full, _)| name.contains(full))
        .map(|(_, short)| *short)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UspecSpeed {
    Fast,
    Medium,
    Slow,
}

/// Readout speed. ULTRACAM records a gain/speed register value, which is
/// conventionally quoted in hex; ULTRASPEC has three named speeds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadSpeed {
    Ultracam(u32),
    Ultraspec(UspecSpeed),
}

impl fmt::Display for ReadSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadSpeed::Ultracam(v) => write!(f, "{v:x}"),
            ReadSpeed::Ultraspec(UspecSpeed::Fast) => f.write_str("F"),
            ReadSpeed::Ultraspec(UspecSpeed::Medium) => f.write_str("M"),
            ReadSpeed::Ultraspec(UspecSpeed::Slow) => f.write_str("S"),
        }
    }
}

impl Serialize for ReadSpeed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// ULTRASPEC output amplifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Output {
    Normal,
    Avalanche,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Power {
    On,
    Off,
}

/// The instrument format of a run: everything that decides whether a
/// calibration frame is usable for it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Format {
    pub mode: ReadoutMode,
    pub xbin: i32,
    pub ybin: i32,
    pub speed: Option<ReadSpeed>,
    pub windows: Windows,

    // ULTRASPEC only
    pub clear: Option<bool>,
    pub hv_gain: Option<i32>,
    pub output: Option<Output>,
}

impl Format {
    pub fn from_params(
        mode: ReadoutMode,
        instrument: Instrument,
        params: &ParamTable,
    ) -> Result<Self, HeaderError> {
        let xbin = params.first_int(&["X_BIN_FAC", "X_BIN"])?;
        let ybin = params.first_int(&["Y_BIN_FAC", "Y_BIN"])?;

        if xbin < 1 || ybin < 1 {
            return Err(HeaderError::BadParameter {
                name: "binning".to_owned(),
                value: format!("{xbin}x{ybin}"),
            });
        }

        let windows = Windows::for_mode(mode, params)?;

        let mut out = Format {
            mode,
            xbin,
            ybin,
            speed: None,
            windows,
            clear: None,
            hv_gain: None,
            output: None,
        };

        match instrument {
            Instrument::Ucm => {
                if let Some(gs) = params.get("GAIN_SPEED") {
                    let v = gs.trim().parse().map_err(|_| HeaderError::BadParameter {
                        name: "GAIN_SPEED".to_owned(),
                        value: gs.to_owned(),
                    })?;
                    out.speed = Some(ReadSpeed::Ultracam(v));
                }
            }

            Instrument::Usp => {
                out.speed = params.get("SPEED").map(|s| {
                    ReadSpeed::Ultraspec(match s.trim() {
                        "0" => UspecSpeed::Fast,
                        "1" => UspecSpeed::Medium,
                        _ => UspecSpeed::Slow,
                    })
                });
                out.clear = params.get("EN_CLR").map(|s| s.trim() == "1");
                out.hv_gain = params.int("HV_GAIN")?;
                out.output = params.get("OUTPUT").map(|s| {
                    if s.trim() == "0" {
                        Output::Normal
                    } else {
                        Output::Avalanche
                    }
                });
            }
        }

        Ok(out)
    }

    /// Binning as conventionally written, e.g. `2x2`.
    pub fn binning(&self) -> String {
        format!("{}x{}", self.xbin, self.ybin)
    }
}

/// A resolved target identity. Name and position are only ever set together.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Identification {
    pub id: String,

    /// Right ascension, hours
    pub ra: f64,

    /// Declination, degrees
    pub dec: f64,

    /// Whether the identification came from a network lookup this session.
    pub from_simbad: bool,
}

/// Per-night context shared by all runs of a night.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunContext<'a> {
    pub log: Option<&'a NightLog>,
    pub timing: Option<&'a Timing>,

    /// Telescope override for the whole run directory.
    pub telescope: Option<&'a str>,

    /// Run directory (`YYYY-MM`) and night (`YYYY-MM-DD`) names.
    pub run_dir: Option<&'a str>,
    pub night: Option<&'a str>,
}

/// Everything we know about one run.
#[derive(Clone, Debug, Serialize)]
pub struct RunRecord {
    pub path: PathBuf,
    pub run_dir: Option<String>,
    pub night: Option<String>,
    pub number: u32,
    pub observatory: Option<String>,
    pub telescope: Option<String>,
    pub instrument: Instrument,
    pub application: String,
    pub power: Option<Power>,

    /// Unset for power on/off runs and unrecognised applications.
    pub format: Option<Format>,

    pub target: Option<String>,
    pub filters: Option<String>,
    pub pi: Option<String>,
    pub observers: Option<String>,
    pub program_id: Option<String>,
    pub flags: Option<String>,

    /// Night-log comment: absent with no log, empty if the log skips the run.
    pub comment: Option<String>,

    pub timing: TimingEntry,
    pub identity: Option<Identification>,
}

impl RunRecord {
    pub fn read<P: AsRef<Path>>(path: P, ctx: &RunContext) -> Result<Self, HeaderError> {
        let path = path.as_ref();
        let header = ExposureHeader::read(path)?;
        Self::from_header(path, &header, ctx)
    }

    pub fn from_header(
        path: &Path,
        header: &ExposureHeader,
        ctx: &RunContext,
    ) -> Result<Self, HeaderError> {
        let number = run_number_from_path(path)?;

        let instrument = Instrument::identify(&header.instrument)
            .ok_or_else(|| HeaderError::UnknownInstrument(header.instrument.clone()))?;

        let telescope = match (ctx.telescope, header.telescope.as_deref()) {
            (Some(t), _) => Some(t.to_owned()),
            (None, Some(full)) => match normalise_telescope(full) {
                Some(short) => Some(short.to_owned()),
                None => {
                    warn!(path = %path.display(), "unrecognised telescope {full:?}");
                    Some(full.to_owned())
                }
            },
            (None, None) => None,
        };

        let log_entry = ctx.log.and_then(|l| l.entry(number));
        let comment = ctx
            .log
            .map(|_| log_entry.map(|e| e.comment.clone()).unwrap_or_default());

        let old_log = ctx.log.map(|l| l.format()) == Some(NightLogFormat::NameFilterComment);

        let mut record = RunRecord {
            path: path.to_owned(),
            run_dir: ctx.run_dir.map(str::to_owned),
            night: ctx.night.map(str::to_owned),
            number,
            observatory: header.observatory.clone(),
            telescope,
            instrument,
            application: header.application.clone(),
            power: None,
            format: None,
            target: None,
            filters: None,
            pi: header.user_field("PI").map(str::to_owned),
            observers: header.user_field("Observers").map(str::to_owned),
            program_id: header.user_field("ID").map(str::to_owned),
            flags: header.user_field("flags").map(str::to_owned),
            comment,
            timing: ctx
                .timing
                .and_then(|t| t.entry(number))
                .cloned()
                .unwrap_or_default(),
            identity: None,
        };

        match classify(&header.application, &header.params) {
            Classification::PowerOn => {
                record.power = Some(Power::On);
                record.target = Some("Power on".to_owned());
                return Ok(record);
            }

            Classification::PowerOff => {
                record.power = Some(Power::Off);
                record.target = Some("Power off".to_owned());
                return Ok(record);
            }

            Classification::Mode(mode) if mode.instrument() == instrument => {
                record.format = Some(Format::from_params(mode, instrument, &header.params)?);
            }

            Classification::Mode(mode) => {
                warn!(
                    path = %path.display(),
                    "application {} gives {mode} mode, which is not a {instrument} mode",
                    header.application
                );
            }

            Classification::Unrecognised => {
                warn!(
                    path = %path.display(),
                    "failed to identify application {}", header.application
                );
            }
        }

        // Old-style logs name the target themselves; otherwise we rely on
        // the header.
        let log_target = if old_log {
            log_entry.and_then(|e| e.target.clone())
        } else {
            None
        };

        record.target = log_target.or_else(|| header.user_field("target").map(str::to_owned));
        record.filters = log_entry
            .and_then(|e| e.filters.clone())
            .or_else(|| header.user_field("filters").map(str::to_owned));

        Ok(record)
    }

    pub fn mode(&self) -> Option<ReadoutMode> {
        self.format.as_ref().map(|f| f.mode)
    }

    pub fn is_power_onoff(&self) -> bool {
        self.power.is_some()
    }

    /// The run's identifier, `runNNN`.
    pub fn name(&self) -> String {
        format!("run{:03}", self.number)
    }
}

impl fmt::Display for RunRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.path.display(), self.instrument)?;

        match &self.format {
            Some(format) => {
                write!(f, " {} {}", format.mode, format.binning())?;

                if let Some(speed) = format.speed {
                    write!(f, " {speed}")?;
                }
            }
            None => f.write_str(" -")?,
        }

        if let Some(t) = &self.target {
            write!(f, " {t}")?;
        }

        Ok(())
    }
}
