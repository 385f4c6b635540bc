//! Command line interface.
//!
//! Flags override the matching environment settings in [`Config`].

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "vivaio", author, version, about = "Vivaio content server", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub overrides: ConfigOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load extensions and serve the content API (default)
    Serve,

    /// Build and attach extensions, print the load report, and exit
    Build,
}

/// Settings that may be given on the command line.
#[derive(Debug, Default, Args)]
pub struct ConfigOverrides {
    /// Address to bind the HTTP listener
    #[arg(long, global = true)]
    pub bind: Option<String>,

    /// Port for the HTTP listener
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// HTTPS port recorded for extensions
    #[arg(long, global = true)]
    pub https_port: Option<u16>,

    /// Directory holding extension sources
    #[arg(long, global = true)]
    pub plugins_dir: Option<PathBuf>,

    /// Rebuild extensions even when a compiled unit exists
    #[arg(long, global = true)]
    pub force_rebuild: bool,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(bind) = &self.bind {
            config.bind_addr = bind.clone();
        }
        if let Some(port) = self.port {
            config.http_port = port;
        }
        if let Some(port) = self.https_port {
            config.https_port = port;
        }
        if let Some(dir) = &self.plugins_dir {
            config.plugins_dir = dir.clone();
        }
        if self.force_rebuild {
            config.plugin_force_rebuild = true;
        }
    }
}

impl Cli {
    pub fn command(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Serve)
    }
}
