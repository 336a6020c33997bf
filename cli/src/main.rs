//! Command line frontend for the forever-jukebox analysis-to-graph core.
//! There are no handler modules here; each subcommand is small enough to
//! live directly in this file and call straight into `forever-jukebox-core`.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use forever_jukebox_core::canonizer::build_canon_table;
use forever_jukebox_core::config::Settings;
use forever_jukebox_core::driver::PlaybackDriver;
use forever_jukebox_core::graph::JumpGraph;
use forever_jukebox_core::normalizer::normalize;
use forever_jukebox_core::player::{MockPlayer, PlayerContract};
use forever_jukebox_core::rng::{RandomMode, SelectorRng};

/// Options configurable via the CLI.
#[derive(Debug, Parser)]
#[command(name = "forever-jukebox", version = env!("CARGO_PKG_VERSION"), about)]
struct Flags {
    /// config file path
    #[clap(
        long,
        short,
        help = "Use this config file instead of the one in the default location",
        value_hint = clap::ValueHint::FilePath,
    )]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Normalize an analysis payload and print a summary of the built graph.
    Load {
        /// Path to an analysis JSON file.
        analysis: PathBuf,
    },
    /// Drive a mock player against the jump graph for a number of ticks,
    /// printing one state payload per line as JSON.
    Play {
        /// Path to an analysis JSON file.
        analysis: PathBuf,
        /// Seed for the branch selector's RNG.
        #[clap(long, default_value_t = 0)]
        seed: u64,
        /// Number of ticks to simulate.
        #[clap(long, default_value_t = 200)]
        ticks: u32,
    },
    /// Build and print the canon pairing table for an analysis payload.
    Canon {
        /// Path to an analysis JSON file.
        analysis: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    clap_complete::CompleteEnv::with_factory(Flags::command).complete();

    let flags = Flags::try_parse()?;

    let config_file: PathBuf = match &flags.config {
        Some(config_file) if config_file.exists() => config_file.clone(),
        Some(_) => anyhow::bail!("Config file does not exist at user specified path"),
        None => Settings::get_config_path()?,
    };
    let settings = Settings::init(config_file)?;

    match flags.command {
        Command::Load { analysis } => load(&analysis, &settings),
        Command::Play {
            analysis,
            seed,
            ticks,
        } => play(&analysis, &settings, seed, ticks),
        Command::Canon { analysis } => canon(&analysis, &settings),
    }
}

fn read_analysis(path: &PathBuf) -> anyhow::Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("could not read analysis file {}: {e}", path.display()))
}

fn load(path: &PathBuf, settings: &Settings) -> anyhow::Result<()> {
    let payload = read_analysis(path)?;
    let track = normalize(&payload)?;
    let graph = JumpGraph::build(track, settings.graph.clone());

    println!("beats:               {}", graph.state.total_beats);
    println!("computed threshold:  {:.3}", graph.state.computed_threshold);
    println!("current threshold:   {:.3}", graph.state.current_threshold);
    println!("last branch point:   {}", graph.state.last_branch_point);
    println!("      enforced:      {}", graph.state.last_branch_point_enforced);
    println!("longest reach:       {}", graph.state.longest_reach);
    println!("total retained edges:{}", graph.state.all_edges.len());
    Ok(())
}

fn play(path: &PathBuf, settings: &Settings, seed: u64, ticks: u32) -> anyhow::Result<()> {
    let payload = read_analysis(path)?;
    let track = normalize(&payload)?;
    let graph = JumpGraph::build(track, settings.graph.clone());

    let rng = Box::new(SelectorRng::new(&RandomMode::Seeded(seed)));
    let mut driver = PlaybackDriver::new(settings.selector, settings.driver, rng);
    driver.load_analysis(graph);
    let mut player = MockPlayer::new();
    player.play();

    let dt = settings.driver.tick_interval_ms / 1000.0;
    let mut now_ms = 0.0;
    for _ in 0..ticks {
        let state = driver.tick(&mut player, now_ms)?;
        println!("{}", serde_json::to_string(&state)?);
        player.tick(dt);
        now_ms += settings.driver.tick_interval_ms;
    }
    Ok(())
}

fn canon(path: &PathBuf, settings: &Settings) -> anyhow::Result<()> {
    let payload = read_analysis(path)?;
    let track = normalize(&payload)?;
    let table = build_canon_table(&track, &settings.canonizer);
    println!("{}", serde_json::to_string_pretty(&table)?);
    Ok(())
}
