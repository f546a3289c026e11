use crate::api;
use crate::cli::actions::Action;
use crate::config::SecurityConfig;
use anyhow::{Context, Result};

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server { port, settings } => {
            let config =
                SecurityConfig::new(settings).context("Invalid security configuration")?;

            api::new(port, config).await?;
        }
    }

    Ok(())
}
