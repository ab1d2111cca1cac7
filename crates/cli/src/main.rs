use std::{
    path::{Path, PathBuf},
    process,
};

use clap::{Parser, Subcommand};

mod init;
mod producer;
mod run;
mod settings;

use settings::{LoadSettingsError, Settings};

#[derive(Clone, Debug)]
pub struct Context {
    pub config_path: PathBuf,
    pub settings: Settings,
}

impl Context {
    pub fn new(config_path: PathBuf, settings: Settings) -> Self {
        Context {
            config_path,
            settings,
        }
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about = "groupstream - durable stream transport with consumer groups", long_about = None)]
struct Opts {
    /// Path to the configuration file (default: ./groupstream.yaml)
    #[arg(
        long = "config",
        short = 'c',
        global = true,
        env = "GROUPSTREAM_CONFIG",
        default_value = "./groupstream.yaml"
    )]
    config_path: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Write a configuration file with defaults
    Init(init::InitCommand),
    /// Run the store, admin server, producer and consumers until Ctrl+C
    Run(run::RunCommand),
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    let opts: Opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(e) => {
            let _ = e.print();
            process::exit(e.exit_code());
        }
    };

    let config_dir = opts
        .config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let is_init_command = matches!(opts.command, Command::Init(_));

    if !is_init_command {
        load_env_file(&config_dir);
    }

    let settings = if is_init_command {
        Settings::default()
    } else {
        match Settings::load(&opts.config_path) {
            Ok(settings) => {
                eprintln!("✓ Loaded configuration from {}", opts.config_path.display());
                settings
            }
            Err(LoadSettingsError::FileNotFound(_)) => Settings::default(),
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }
    };

    let ctx = Context::new(opts.config_path.clone(), settings);

    if let Err(e) = handle_command(opts, &ctx).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Load environment variables from a .env file next to the configuration file
fn load_env_file(config_dir: &Path) {
    let env_file_path = config_dir.join(".env");

    match dotenvy::from_path(&env_file_path) {
        Ok(_) => {
            eprintln!("✓ Loaded environment from {}", env_file_path.display());
        }
        Err(e) if e.not_found() => {}
        Err(e) => {
            eprintln!(
                "Warning: Failed to load .env file at {}: {}",
                env_file_path.display(),
                e
            );
        }
    }
}

async fn handle_command(opts: Opts, ctx: &Context) -> Result<(), String> {
    match opts.command {
        Command::Init(cmd) => cmd.execute(ctx).await,
        Command::Run(cmd) => cmd.execute(ctx).await,
        Command::Config => {
            print!("{}", ctx.settings.to_yaml()?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let opts = Opts::try_parse_from([
            "groupstream",
            "run",
            "--log-key",
            "orders",
            "--consumers",
            "2",
            "--no-admin",
        ])
        .unwrap();

        match opts.command {
            Command::Run(cmd) => {
                assert_eq!(cmd.log_key.as_deref(), Some("orders"));
                assert_eq!(cmd.consumers, Some(2));
                assert!(cmd.no_admin);
                assert!(!cmd.auto_ack);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_config_path() {
        let opts =
            Opts::try_parse_from(["groupstream", "config", "-c", "/tmp/custom.yaml"]).unwrap();
        assert_eq!(opts.config_path, PathBuf::from("/tmp/custom.yaml"));
        assert_eq!(opts.command, Command::Config);
    }
}
