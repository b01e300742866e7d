mod config;
mod focus;
mod layout;
mod logging;
mod pane;
mod resize;
mod shortcuts;
mod split_view;
mod terminal;

use clap::Parser;
use std::path::PathBuf;

use config::SplitViewConfig;
use split_view::SplitViewManager;
use terminal::TerminalController;

#[derive(Parser)]
#[command(
    name = "splitview",
    about = "Run an AI assistant and the dashboard side by side in one terminal"
)]
struct Cli {
    /// Run the dashboard alone, without splitting the terminal
    #[arg(long)]
    no_split: bool,
    /// Run your shell in the left pane instead of the assistant
    #[arg(long)]
    shell: bool,
    /// Fraction of the width given to the left pane (0.1 - 0.9)
    #[arg(long)]
    ratio: Option<f64>,
    /// Pane focused on launch: claude, tui or shell
    #[arg(long)]
    active_pane: Option<String>,
    /// Config file (default: $XDG_CONFIG_HOME/splitview/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Log file (default: $XDG_STATE_HOME/splitview/splitview.log)
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    write_config: bool,
}

fn main() {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(SplitViewConfig::default_path);
    let config = match load_config(&cli, config_path.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    if cli.write_config {
        cmd_write_config(&config, config_path);
        return;
    }

    let log_path = logging::init(cli.log_file.clone());
    tracing::info!(log = ?log_path, ratio = config.ratio, shell = config.use_shell, "splitview starting");

    std::panic::set_hook(Box::new(|panic| {
        terminal::restore_stdout();
        eprintln!("Panic: {panic}");
    }));

    let outcome = if cli.no_split || !config.enabled {
        split_view::run_dashboard_only(&config)
    } else {
        // Dropped before exiting so the terminal is always restored.
        let mut manager = SplitViewManager::new(config, TerminalController::stdout());
        manager.run()
    };

    match outcome {
        Ok(code) => {
            tracing::info!(code, "splitview exiting");
            std::process::exit(code);
        }
        Err(e) => {
            tracing::error!("session failed: {e}");
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

/// File values first, then command-line overrides.
fn load_config(
    cli: &Cli,
    path: Option<&PathBuf>,
) -> Result<SplitViewConfig, config::ConfigError> {
    let mut config = match path {
        Some(path) => SplitViewConfig::load_or_default(path)?,
        None => SplitViewConfig::default(),
    };
    if cli.shell {
        config.use_shell = true;
    }
    if let Some(ratio) = cli.ratio {
        config.ratio = ratio;
    }
    if let Some(active) = &cli.active_pane {
        config.active_pane = active.clone();
    }
    config.validate()?;
    Ok(config)
}

fn cmd_write_config(config: &SplitViewConfig, path: Option<PathBuf>) {
    let Some(path) = path else {
        eprintln!("error: no config path; pass --config");
        std::process::exit(1);
    };
    match config.save(&path) {
        Ok(()) => println!("Wrote {}", path.display()),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
