mod commands;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use nocturne_connectors::{EnvSecretStore, LayeredSecretStore, MapSecretStore};
use nocturne_core::{
    AuthConfig, CONFIG_FILE_NAME, default_config_dir, load_config_from_dir,
    write_default_config_file,
};
use tracing_subscriber::EnvFilter;

use crate::commands::config::{self, ConfigCommands};
use crate::commands::resolve::{self, ResolveArgs};
use crate::commands::token::{self, TokenCommands};

#[derive(Debug, Parser)]
#[command(name = "nocturne-auth", about = "Inspect and exercise Nocturne request authentication")]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Secret override, NAME=VALUE; consulted before the environment
    #[arg(long = "secret", global = true, value_parser = parse_key_val)]
    secrets: Vec<(String, String)>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write the default auth.toml
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Configuration checks
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Mint and inspect tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
    /// Run the handler chain and lockdown gate against a synthetic request
    Resolve(ResolveArgs),
}

/// Loaded configuration and where it came from.
pub struct Loaded {
    pub config: AuthConfig,
    pub source: Option<PathBuf>,
}

fn load(cfg_dir: &Path) -> anyhow::Result<Loaded> {
    let path = cfg_dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Loaded {
            config: AuthConfig::default(),
            source: None,
        });
    }
    let config = load_config_from_dir(cfg_dir)?;
    Ok(Loaded {
        config,
        source: Some(path),
    })
}

fn secret_store(overrides: &[(String, String)]) -> LayeredSecretStore {
    let map = overrides
        .iter()
        .fold(MapSecretStore::new(), |store, (k, v)| store.with(k.clone(), v.clone()));
    LayeredSecretStore::new(vec![Box::new(map), Box::new(EnvSecretStore)])
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let cfg_dir = cli.config_dir.clone().unwrap_or_else(default_config_dir);
    let secrets = secret_store(&cli.secrets);

    match cli.command {
        Commands::Init { force } => {
            let path = cfg_dir.join(CONFIG_FILE_NAME);
            if force && path.exists() {
                fs::remove_file(&path)?;
            }
            let existed = path.exists();
            let path = write_default_config_file(&cfg_dir)?;
            let text = if existed {
                format!("{} already exists (use --force to overwrite)", path.display())
            } else {
                format!("Wrote {}", path.display())
            };
            pout(
                cli.json,
                serde_json::json!({"config_file": path, "written": !existed}),
                &text,
            )?;
        }
        Commands::Config { command } => {
            config::run(command, &load(&cfg_dir)?, &secrets, cli.json)?;
        }
        Commands::Token { command } => {
            token::run(command, &load(&cfg_dir)?.config, &secrets, cli.json)?;
        }
        Commands::Resolve(args) => {
            resolve::run(args, &load(&cfg_dir)?.config, &secrets, cli.json).await?;
        }
    }

    Ok(())
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=').ok_or_else(|| "must be KEY=VALUE".to_string())?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

pub fn pout(json_mode: bool, value: serde_json::Value, text: &str) -> anyhow::Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{text}");
    }
    Ok(())
}
