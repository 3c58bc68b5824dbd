//! Run metadata for the ULTRACAM and ULTRASPEC high-speed cameras
//!
//! Every exposure sequence ("run") the cameras take comes with an XML header
//! describing how the detector was read out, and usually with a hand-written
//! night log and a timing file alongside. This crate turns those into a
//! [`run::RunRecord`]: instrument, readout mode, binning, windows, speed,
//! target and PI, plus the sky position of the target once it has been
//! identified against a catalogue (or SIMBAD).
//!
//! On top of that sit two families of tools:
//!
//! - the [`batch`], which walks a tree of observing runs and writes the
//!   searchable run database, learning new target identifications as it goes;
//! - the [`formats`] tools, which compare runs of one night to find shared
//!   formats, missing biases and usable calibration frames.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

pub mod batch;
pub mod catalogue;
pub mod compare;
pub mod coords;
pub mod formats;
pub mod frames;
pub mod geometry;
pub mod header;
pub mod lists;
pub mod modes;
pub mod resolver;
pub mod run;
pub mod sidefiles;
pub mod simbad;

pub use header::{ExposureHeader, HeaderError, ParamTable};
pub use modes::{Classification, ReadoutMode};
pub use run::{Format, Instrument, RunContext, RunRecord};

/// Set up logging to stderr. `RUST_LOG` overrides the default level of
/// `info`. Messages sent through the `log` crate are forwarded too.
pub fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false) // don't print the module name
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}
