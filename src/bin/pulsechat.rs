//! PulseChat CLI binary.
//!
//! # Commands
//!
//! - `run` - Drive the engine from stdin (`source: text` per line)
//! - `init-config` - Write the default configuration file
//! - `status` - Print learning counters for a data directory

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pulsechat::{
    Agent, ChannelSink, Config, Engine, Language, StaticAudience, StaticDirectory, VERSION,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "pulsechat")]
#[command(version = VERSION)]
#[command(about = "PulseChat - simulated chat participants", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/pulsechat/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the learned phrase files
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run against stdin; each line is `source: text`
    Run {
        /// Agents as `name:lang` (lang is en or zh)
        #[arg(short, long, value_delimiter = ',', default_value = "Steve:en,Alex:en,Xiaoming:zh")]
        agents: Vec<String>,

        /// Present observers
        #[arg(short, long, value_delimiter = ',', default_value = "console")]
        observers: Vec<String>,

        /// Fixed RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,

        /// Log as JSON lines
        #[arg(long)]
        json_logs: bool,
    },

    /// Write the default configuration
    InitConfig {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print learning counters as JSON
    Status,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            agents,
            observers,
            seed,
            verbose,
            json_logs,
        } => {
            init_logging(verbose, json_logs);
            cmd_run(cli.config, cli.data_dir, &agents, observers, seed)
        },
        Commands::InitConfig { force } => cmd_init_config(cli.config, force),
        Commands::Status => cmd_status(cli.config, cli.data_dir),
    }
}

fn config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(Config::default_path)
}

fn load_config(explicit: Option<PathBuf>) -> anyhow::Result<Config> {
    let config = match config_path(explicit) {
        Some(path) if path.exists() => Config::from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        _ => Config::default(),
    };
    Ok(config.with_env())
}

fn data_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| dirs::data_dir().map(|dir| dir.join("pulsechat")))
        .unwrap_or_else(|| PathBuf::from("pulsechat-data"))
}

fn parse_agents(specs: &[String]) -> anyhow::Result<Vec<Agent>> {
    specs
        .iter()
        .enumerate()
        .map(|(index, spec)| {
            let (name, lang) = spec.split_once(':').unwrap_or((spec.as_str(), "en"));
            let language: Language = lang
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid agent language in {spec:?}. Use: en, zh"))?;
            Ok(Agent::new(format!("agent-{}", index + 1), name.trim(), language))
        })
        .collect()
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn cmd_run(
    config: Option<PathBuf>,
    dir: Option<PathBuf>,
    agents: &[String],
    observers: Vec<String>,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let directory = Arc::new(StaticDirectory::new(parse_agents(agents)?));
    let audience = Arc::new(StaticAudience::new(observers));
    let (sink, mut deliveries) = ChannelSink::new();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let mut builder = Engine::builder()
            .config(config)
            .data_dir(data_dir(dir))
            .agents(directory)
            .audience(audience)
            .sink(Arc::new(sink));
        if let Some(seed) = seed {
            builder = builder.seed(seed);
        }
        let engine = builder.build()?;
        let tasks = engine.spawn_periodic();
        tracing::info!("Reading `source: text` lines from stdin");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    handle_input(&engine, &line);
                }
                Some(delivery) = deliveries.recv() => {
                    println!("{}", delivery.line);
                }
            }
        }

        tracing::info!("Input closed, shutting down");
        tasks.shutdown();
        engine.learning().store(pulsechat::Bucket::Qa).persist_now()?;
        engine.learning().store(pulsechat::Bucket::General).persist_now()?;
        Ok::<_, anyhow::Error>(())
    })
}

fn handle_input(engine: &Engine, line: &str) {
    let line = line.trim();
    match line {
        "" => {},
        "/flush" => {
            let started = engine.flush_learning_now();
            tracing::info!(started, "Learning flush requested");
        },
        "/status" => match serde_json::to_string(&engine.learning_status()) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::warn!("Status unavailable: {}", e),
        },
        _ => {
            let (source, text) = line.split_once(':').unwrap_or(("console", line));
            engine.handle_user_message(source.trim(), text.trim());
        },
    }
}

fn cmd_init_config(config: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = config_path(config).context("No config directory on this platform; pass --config")?;
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = Config::default().to_toml()?;
    std::fs::File::create(&path)?.write_all(body.as_bytes())?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn cmd_status(config: Option<PathBuf>, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let engine = Engine::builder()
        .config(config)
        .data_dir(data_dir(dir))
        .build()?;
    println!("{}", serde_json::to_string_pretty(&engine.learning_status())?);
    Ok(())
}
