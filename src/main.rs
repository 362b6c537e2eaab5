mod cli;

use cowatch::{config, simulate, source::SourceLoader};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "cowatch=debug,cowatch_core=debug".to_string()
        } else {
            "cowatch=info,cowatch_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Simulate { script, json } => {
            simulate_script(&script, cli.config.as_deref(), json)
        }
        Commands::Resolve {
            url,
            proxy,
            subtitles,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(resolve_source(&url, cli.config.as_deref(), proxy, subtitles))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::InitConfig { path, force } => init_config(&path, force),
        Commands::Version => {
            println!("cowatch {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn simulate_script(path: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    if !path.exists() {
        anyhow::bail!("Script file does not exist: {:?}", path);
    }

    let script = simulate::Script::from_file(path)?;
    tracing::info!("Simulating {} steps from {:?}", script.steps.len(), path);
    let report = simulate::run(&script, &config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for step in &report.steps {
        let action = serde_json::to_value(&step.action)?;
        let name = action["action"].as_str().unwrap_or("?");
        print!("[{:>6} ms] {:<14} phase={}", step.at_ms, name, step.phase);
        if let Some(ref outcome) = step.outcome {
            print!(" outcome={}", outcome);
        }
        println!();
        for command in &step.commands {
            println!("    engine <- {}", serde_json::to_string(command)?);
        }
        for message in &step.outgoing {
            println!("    server <- {}", message.to_json()?);
        }
    }

    println!();
    println!("Final phase: {}", report.final_phase);
    if !report.is_synced() {
        println!("Warning: run ended before playback was in sync");
    }
    println!(
        "Final state: t={:.3}s paused={} rate={}",
        report.final_state.current_time,
        report.final_state.paused,
        report.final_state.playback_rate
    );

    Ok(())
}

async fn resolve_source(
    url: &str,
    config_path: Option<&Path>,
    proxy: bool,
    subtitles: bool,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    if proxy {
        config.source.proxy_enabled = true;
    }

    let loader = SourceLoader::new(config.source)?;
    let resolved = loader.resolve(url)?;

    println!("Requested: {}", resolved.requested);
    println!("Kind: {}", resolved.kind);
    println!("URL: {}", resolved.url);
    if let Some(ref mime) = resolved.mime_hint {
        println!("MIME: {}", mime);
    }
    if let Some(ref manifest) = resolved.subtitle_manifest {
        println!("Subtitle manifest: {}", manifest);
    }

    if subtitles {
        let tracks = loader.discover_subtitles(&resolved).await;
        println!("\nSubtitle Tracks: {}", tracks.len());
        for (i, track) in tracks.iter().enumerate() {
            print!("  [{}] {}", i, track.label);
            if let Some(ref lang) = track.language {
                print!(" ({})", lang);
            }
            println!(" - {}", track.src);
        }
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            let warnings = config.validate();
            println!("✓ Configuration is valid");
            println!(
                "  Thresholds: soft {}s, hard {}s, paused {}s",
                config.sync.soft_threshold_secs,
                config.sync.hard_threshold_secs,
                config.sync.pause_threshold_secs
            );
            println!(
                "  Guards: remote {}ms, source switch {}ms, cooldown {}ms",
                config.sync.remote_guard_ms,
                config.sync.source_switch_guard_ms,
                config.sync.local_cooldown_ms
            );
            println!("  Base URL: {}", config.source.base_url);
            println!("  Proxy enabled: {}", config.source.proxy_enabled);
            if !warnings.is_empty() {
                println!("  Warnings: {}", warnings.len());
                for warning in &warnings {
                    println!("    - {}", warning);
                }
            }
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Base URL: {}", config.source.base_url);
        }
    }

    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("Config file already exists: {:?} (use --force to overwrite)", path);
    }
    config::save_config(path, &config::Config::default())?;
    println!("Wrote default config to {:?}", path);
    Ok(())
}
