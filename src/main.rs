//! Command-line front end: build the run database, or inspect the formats
//! used on a night.

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use ultrarun::{
    batch::{run_batch, BatchConfig},
    formats::{calibration_candidates, collect_runs, matching_formats, missing_biases, unique_formats},
    init_logging,
    sidefiles::NightLogFormat,
    simbad::{Simbad, DEFAULT_ENDPOINT},
    RunContext, RunRecord,
};

#[derive(Parser, Debug)]
#[command(name = "ultrarun", about = "ULTRACAM/ULTRASPEC run metadata tools", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the run database from a tree of observing runs
    Logs(LogsArgs),

    /// List one run of each distinct format
    Unique {
        /// Also distinguish ULTRASPEC avalanche gain
        #[arg(long)]
        fussy: bool,

        /// Night directories to search
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },

    /// List runs with the same format as a given run
    Fmatch {
        /// Also distinguish ULTRASPEC avalanche gain
        #[arg(long)]
        fussy: bool,

        /// Header of the run to match
        run: PathBuf,

        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },

    /// List formats that have no matching bias
    Missbias {
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },

    /// List runs that could calibrate a given run
    Calib {
        run: PathBuf,

        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct LogsArgs {
    /// Directory holding the run directories and the shared name lists
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Only process these run directories (YYYY-MM or Others)
    #[arg(short = 'r', long = "run-dir")]
    run_dirs: Vec<String>,

    /// Main target catalogue [default: ROOT/TARGETS]
    #[arg(long)]
    targets: Option<PathBuf>,

    /// Catalogue of targets identified by lookup [default: ROOT/AUTO_TARGETS]
    #[arg(long)]
    auto_targets: Option<PathBuf>,

    /// Names never to look up [default: ROOT/SKIP_TARGETS]
    #[arg(long)]
    skip_targets: Option<PathBuf>,

    /// Report of failed lookups [default: ROOT/FAILED_TARGETS]
    #[arg(long)]
    failed_targets: Option<PathBuf>,

    /// Name translations [default: ROOT/MAPPING]
    #[arg(long)]
    mapping: Option<PathBuf>,

    /// Run database to write [default: ROOT/ultra.json]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Night logs list target and filters before the comment
    #[arg(long)]
    old_log_format: bool,

    /// SIMBAD script endpoint
    #[arg(long, env = "ULTRARUN_SIMBAD_URL", default_value = DEFAULT_ENDPOINT)]
    simbad_url: String,

    /// Use the catalogues only; make no network lookups
    #[arg(long)]
    no_lookup: bool,
}

impl LogsArgs {
    fn config(&self) -> BatchConfig {
        let mut cfg = BatchConfig::in_dir(&self.root);

        let overrides = [
            (&self.targets, &mut cfg.targets),
            (&self.auto_targets, &mut cfg.auto_targets),
            (&self.skip_targets, &mut cfg.skip_targets),
            (&self.failed_targets, &mut cfg.failed_targets),
            (&self.mapping, &mut cfg.mapping),
            (&self.output, &mut cfg.output),
        ];

        for (given, slot) in overrides {
            if let Some(p) = given {
                *slot = p.clone();
            }
        }

        cfg.run_dirs = self.run_dirs.clone();

        if self.old_log_format {
            cfg.log_format = NightLogFormat::NameFilterComment;
        }

        cfg
    }
}

fn read_template(path: &Path) -> Result<RunRecord> {
    let run = RunRecord::read(path, &RunContext::default())?;

    if run.format.is_none() {
        bail!("{} has no recognised readout format", path.display());
    }

    Ok(run)
}

fn print_runs(runs: &[&RunRecord]) {
    for r in runs {
        println!("{r}");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    match cli.command {
        Command::Logs(args) => {
            let cfg = args.config();

            let summary = if args.no_lookup {
                run_batch::<Simbad>(&cfg, None)?
            } else {
                run_batch(&cfg, Some(Simbad::new(&args.simbad_url)))?
            };

            info!(
                "{} runs read ({} unreadable), {} in the database; {} lookups, {} new targets, {} failures",
                summary.runs,
                summary.bad_runs,
                summary.entries,
                summary.lookups,
                summary.discovered,
                summary.failed
            );
        }

        Command::Unique { fussy, dirs } => {
            let runs = collect_runs(&dirs);
            print_runs(&unique_formats(&runs, fussy));
        }

        Command::Fmatch { fussy, run, dirs } => {
            let template = read_template(&run)?;
            let runs = collect_runs(&dirs);
            print_runs(&matching_formats(&template, &runs, fussy));
        }

        Command::Missbias { dirs } => {
            let runs = collect_runs(&dirs);
            print_runs(&missing_biases(&runs));
        }

        Command::Calib { run, dirs } => {
            let data = read_template(&run)?;
            let runs = collect_runs(&dirs);
            print_runs(&calibration_candidates(&data, &runs));
        }
    }

    Ok(())
}
