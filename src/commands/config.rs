//! Config command implementation for the ICN CLI

use anyhow::{Context, Result};
use log::info;
use rust_icn_forwarder::ForwarderConfig;

use crate::ConfigCommands;

/// Handle config-related commands
pub fn handle_command(cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Show { file } => {
            info!("Loading configuration from {:?}", file);
            let config = ForwarderConfig::load(file.as_deref())?;
            let json = serde_json::to_string_pretty(&config)
                .context("Failed to serialize configuration")?;
            println!("{}", json);
            Ok(())
        }
    }
}
