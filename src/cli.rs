use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;

use crate::core::{Engine, EnvironmentUpdate, NewEnvironment};

#[derive(Parser)]
#[command(name = "env-sync")]
#[command(about = "Keeps database ports and SynData tokens in sync across local projects")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Home directory to scan and keep data in
    #[arg(long, env = "ENV_SYNC_HOME", global = true)]
    pub home: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive menu (default)
    Start,

    /// List configured environments
    #[command(visible_alias = "ls")]
    List,

    /// Add an environment; missing values are asked for
    Add {
        name: Option<String>,

        /// Database host
        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        port: Option<String>,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        password: Option<String>,
    },

    /// Change fields of an environment; with no flags, asks for each
    Edit {
        name: String,

        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        port: Option<String>,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        password: Option<String>,
    },

    /// Remove an environment
    #[command(visible_alias = "rm")]
    Remove { name: String },

    /// Rewrite database ports in every databasesettings.json
    Ports {
        /// Environment whose port is applied
        #[arg(conflicts_with = "port")]
        environment: Option<String>,

        /// Apply this port directly
        #[arg(long)]
        port: Option<String>,

        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Encode or decode SynData tokens
    Syndata {
        #[command(subcommand)]
        action: SyndataCommand,
    },

    /// Show the files env-sync would touch
    Scan,
}

#[derive(Subcommand)]
pub enum SyndataCommand {
    /// Print the token for a host and database
    Encode {
        #[arg(long)]
        host: String,

        #[arg(long)]
        db: String,
    },

    /// Print the host and database inside a token
    Decode { token: String },
}

impl Cli {
    pub async fn execute(self, engine: Engine) -> Result<()> {
        match self.command.unwrap_or(Commands::Start) {
            Commands::Start => engine.start().await,
            Commands::List => engine.list_environments(),
            Commands::Add { name, url, port, username, password } => {
                engine.add_environment(NewEnvironment { name, url, port, username, password })
            }
            Commands::Edit { name, url, port, username, password } => {
                engine.edit_environment(&name, EnvironmentUpdate { url, port, username, password })
            }
            Commands::Remove { name } => engine.remove_environment(&name),
            Commands::Ports { environment, port, dry_run, yes } => {
                engine.ports(environment, port, dry_run, yes).await
            }
            Commands::Syndata { action } => match action {
                SyndataCommand::Encode { host, db } => engine.syndata_encode(&host, &db),
                SyndataCommand::Decode { token } => engine.syndata_decode(&token),
            },
            Commands::Scan => engine.scan(),
        }
    }
}
