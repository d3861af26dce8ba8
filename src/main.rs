//! dialogue-sim CLI: user simulation for task-oriented dialogue agents.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use dialogue_sim::action::SlotMap;
use dialogue_sim::config::SimConfig;
use dialogue_sim::data;
use dialogue_sim::db::ConstraintStore;
use dialogue_sim::domain::Domain;
use dialogue_sim::policy::ActionSpace;
use dialogue_sim::session::Simulation;

#[derive(Parser)]
#[command(name = "dialogue-sim", version, about = "Task-oriented dialogue user simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default simulator config.
    InitConfig {
        /// Destination TOML file.
        path: PathBuf,
    },

    /// Run episodes of the rule policy against the simulated user.
    Simulate {
        /// Simulator config (TOML).
        #[arg(long)]
        config: PathBuf,

        /// Episodes to run (defaults to `[run] episodes`).
        #[arg(long)]
        episodes: Option<usize>,

        /// Parallel workers, each with its own session.
        #[arg(long, default_value = "1")]
        workers: usize,

        /// Tracker tag, overriding `[run] tracker`.
        #[arg(long)]
        tracker: Option<String>,

        /// RNG seed, overriding `[run] seed`.
        #[arg(long)]
        seed: Option<u64>,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Match constraints against the entity table.
    Query {
        /// Simulator config (TOML).
        #[arg(long)]
        config: PathBuf,

        /// Constraints as `slot=value`.
        constraints: Vec<String>,
    },

    /// List the agent action vocabulary.
    Actions {
        /// Simulator config (TOML).
        #[arg(long)]
        config: PathBuf,
    },
}

/// Directory that relative data paths in `config` are resolved against.
fn base_dir(config: &Path) -> &Path {
    config.parent().unwrap_or_else(|| Path::new("."))
}

fn parse_constraints(raw: &[String]) -> Result<SlotMap> {
    let mut constraints = SlotMap::new();
    for item in raw {
        let Some((slot, value)) = item.split_once('=') else {
            miette::bail!("constraint \"{item}\" is not of the form slot=value");
        };
        constraints.insert(slot.trim().to_string(), value.trim().to_string());
    }
    Ok(constraints)
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitConfig { path } => {
            SimConfig::default().save(&path)?;
            println!("Wrote default config to {}", path.display());
        }

        Commands::Simulate {
            config,
            episodes,
            workers,
            tracker,
            seed,
            json,
        } => {
            let mut sim_config = SimConfig::load(&config)?;
            if let Some(tracker) = tracker {
                sim_config.run.tracker = tracker;
            }
            if seed.is_some() {
                sim_config.run.seed = seed;
            }
            let episodes = episodes.unwrap_or(sim_config.run.episodes);

            let sim = Simulation::load(sim_config, base_dir(&config))?;
            let summary = if workers > 1 {
                sim.run_parallel(episodes, workers, || sim.rule_policy())?
            } else {
                let mut policy = sim.rule_policy()?;
                sim.run(episodes, &mut policy)?
            };

            if json {
                let out = serde_json::to_string_pretty(&summary).into_diagnostic()?;
                println!("{out}");
            } else {
                println!("Simulation ({} tracker):", sim.config().run.tracker);
                println!("  episodes:     {}", summary.episodes);
                println!("  success rate: {:.3}", summary.success_rate());
                println!("  avg reward:   {:.2}", summary.average_reward());
                println!("  avg rounds:   {:.2}", summary.average_rounds());
            }
        }

        Commands::Query {
            config,
            constraints,
        } => {
            let sim_config = SimConfig::load(&config)?;
            let domain = Domain::new(sim_config.domain.clone())?;
            let entities = data::load_entities(&base_dir(&config).join(&sim_config.data.entities))?;
            let store = ConstraintStore::new(entities, &domain);
            let constraints = parse_constraints(&constraints)?;

            let matches = store.match_constraints(&constraints);
            println!("{} of {} entities match:", matches.len(), store.len());
            for (id, record) in matches.iter() {
                let fields: Vec<String> = record.iter().map(|(k, v)| format!("{k}={v}")).collect();
                println!("  {id}: {}", fields.join(", "));
            }

            let counts = store.count_matches_per_slot(&constraints);
            println!("\nPer-slot counts:");
            for (slot, count) in counts.to_map() {
                println!("  {slot}: {count}");
            }
        }

        Commands::Actions { config } => {
            let sim_config = SimConfig::load(&config)?;
            let domain = Domain::new(sim_config.domain)?;
            let space = ActionSpace::new(&domain);
            println!("{} agent actions:", space.len());
            for (index, action) in space.iter() {
                println!("  {index:>3}  {action}");
            }
        }
    }

    Ok(())
}
