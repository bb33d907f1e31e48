//! `place-likers`: interact with the users who liked posts from configured places.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};

use place_likers::core::session::SessionState;
use place_likers::core::types::Mode;
use place_likers::core::value_range::ValueRange;
use place_likers::exit_codes;
use place_likers::io::config::{DEFAULT_CONFIG_PATH, LikersConfig, load_config, write_config};
use place_likers::io::driver::DriverWorkUnit;
use place_likers::io::recovery::CrashRecovery;
use place_likers::io::storage::Storage;
use place_likers::job::{JobEnd, UnrecoverableError};
use place_likers::logging;
use place_likers::looping::{
    PreparedSource, RunPlan, RunStop, plan_sources, prepare_source, run_sources,
};

#[derive(Parser, Debug)]
#[command(
    name = "place-likers",
    version,
    about = "Interact with the users who liked posts from places"
)]
struct Cli {
    /// Config file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default config file.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Print the places a session would handle, in order.
    Plan(PlanArgs),
    /// Run a session against the device driver.
    Run(SourceArgs),
}

#[derive(Args, Debug, Default)]
struct SourceArgs {
    /// Interact with likers of top posts from these places.
    #[arg(
        long,
        num_args = 1..,
        value_name = "PLACE",
        conflicts_with_all = ["place_likers_recent", "mode"]
    )]
    place_likers_top: Option<Vec<String>>,

    /// Interact with likers of recent posts from these places.
    #[arg(long, num_args = 1.., value_name = "PLACE", conflicts_with = "mode")]
    place_likers_recent: Option<Vec<String>>,

    /// Use the place list configured for this mode.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Handle at most this many places, chosen at random (`N` or `N-M`).
    #[arg(long, value_name = "N[-M]")]
    truncate_sources: Option<ValueRange>,

    /// Seed for every random choice of the session.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct PlanArgs {
    #[command(flatten)]
    sources: SourceArgs,

    /// Print every place with its resolved interaction policy as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    PlaceLikersTop,
    PlaceLikersRecent,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::PlaceLikersTop => Mode::PlaceLikersTop,
            ModeArg::PlaceLikersRecent => Mode::PlaceLikersRecent,
        }
    }
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            if err.downcast_ref::<UnrecoverableError>().is_some() {
                exit_codes::UNRECOVERABLE
            } else {
                exit_codes::INVALID
            }
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Plan(args) => cmd_plan(&cli.config, args),
        Command::Run(args) => cmd_run(&cli.config, args),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &LikersConfig::default())?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_plan(path: &Path, args: PlanArgs) -> Result<i32> {
    let (mode, config) = load_with_args(path, &args.sources)?;
    let mut rng = rng_for(args.sources.seed);
    let sources = plan_sources(mode, &config, &mut rng)?;
    if !args.json {
        for source in &sources {
            println!("{source}");
        }
        return Ok(exit_codes::OK);
    }

    let username = config.username.trim();
    let prepared: Vec<PreparedSource> = sources
        .iter()
        .map(|source| prepare_source(mode, source, username, &config, &mut rng))
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&prepared).context("serialize plan")?
    );
    Ok(exit_codes::OK)
}

fn cmd_run(path: &Path, args: SourceArgs) -> Result<i32> {
    let (mode, config) = load_with_args(path, &args)?;
    let username = config.require_username()?.to_string();
    let mut rng = rng_for(args.seed);
    let sources = plan_sources(mode, &config, &mut rng)?;

    let session_id = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let limits = config.limits.resolve(&mut rng);
    info!(session = %session_id, account = %username, %mode, ?limits, "session started");

    let storage = Storage::open(&config.storage_dir, &username).context("open account storage")?;
    let mut work_unit = DriverWorkUnit::new(config.driver.clone(), storage);
    let mut recovery =
        CrashRecovery::new(config.crash_dir.clone(), config.driver.reset_command.clone());
    let mut session = SessionState::new(session_id, username);

    let plan = RunPlan {
        mode,
        sources: &sources,
        config: &config,
        limits: &limits,
    };
    let outcome = run_sources(
        &plan,
        &mut session,
        &mut work_unit,
        &mut recovery,
        &mut rng,
        |job| match job.end {
            JobEnd::Completed => info!(
                source = %job.source,
                attempts = job.attempts,
                failures = job.failures,
                "source done"
            ),
            JobEnd::AttemptsExhausted => warn!(
                source = %job.source,
                attempts = job.attempts,
                "source abandoned"
            ),
            JobEnd::LimitReached => {}
        },
    )?;

    match &outcome.stop {
        RunStop::Completed => info!(
            sources = outcome.jobs.len(),
            attempts = outcome.total_attempts(),
            "all sources handled"
        ),
        RunStop::LimitReached { source, limits } => {
            let names: Vec<&str> = limits.iter().map(|kind| kind.label()).collect();
            info!(
                source = %source,
                limits = %names.join(", "),
                attempts = outcome.total_attempts(),
                "session ended on limits"
            );
        }
    }
    Ok(exit_codes::OK)
}

/// Load config and apply CLI overrides. Returns the mode to run.
fn load_with_args(path: &Path, args: &SourceArgs) -> Result<(Mode, LikersConfig)> {
    let mut config = load_config(path)?;
    if let Some(truncate) = args.truncate_sources {
        config.truncate_sources = Some(truncate);
    }
    let mode = if let Some(places) = &args.place_likers_top {
        config.place_likers_top = places.clone();
        Mode::PlaceLikersTop
    } else if let Some(places) = &args.place_likers_recent {
        config.place_likers_recent = places.clone();
        Mode::PlaceLikersRecent
    } else if let Some(mode) = args.mode {
        mode.into()
    } else {
        infer_mode(&config)?
    };
    Ok((mode, config))
}

/// Without flags, a config that lists places for exactly one mode picks it.
fn infer_mode(config: &LikersConfig) -> Result<Mode> {
    match (
        config.place_likers_top.is_empty(),
        config.place_likers_recent.is_empty(),
    ) {
        (false, true) => Ok(Mode::PlaceLikersTop),
        (true, false) => Ok(Mode::PlaceLikersRecent),
        (true, true) => bail!(
            "no places configured (pass --place-likers-top or --place-likers-recent)"
        ),
        (false, false) => bail!("both place lists are configured; choose one with --mode"),
    }
}

fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
