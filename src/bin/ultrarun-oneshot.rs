//! "Oneshot" run inspection.
//!
//! This executable reads one run header, plus optionally the night log and
//! timing file that go with it, and prints the resulting record as JSON.

use anyhow::{anyhow, Result};
use std::env;

use ultrarun::{
    init_logging,
    sidefiles::{NightLog, NightLogFormat, Timing},
    RunContext, RunRecord,
};

fn main() -> Result<()> {
    let mut args = env::args();
    args.next(); // skip argv[0]

    let xml = args
        .next()
        .ok_or_else(|| anyhow!("first argument should be the run header (runNNN.xml)"))?;

    let log = args
        .next()
        .map(|p| NightLog::load(p, NightLogFormat::CommentOnly))
        .transpose()?;

    let timing = args.next().map(Timing::load).transpose()?;

    init_logging()?;

    let ctx = RunContext {
        log: log.as_ref(),
        timing: timing.as_ref(),
        ..Default::default()
    };

    let record = RunRecord::read(&xml, &ctx)?;
    serde_json::to_writer(std::io::stdout().lock(), &record)?;
    println!();
    Ok(())
}
