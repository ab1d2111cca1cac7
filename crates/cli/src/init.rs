use console::style;
use dialoguer::{Confirm, Input, theme::ColorfulTheme};

use crate::{Context, settings::Settings};

#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct InitCommand {
    /// Accept every default without prompting
    #[arg(long, short = 'y')]
    pub yes: bool,
}

impl InitCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<(), String> {
        println!(
            "{} {}\n",
            style("groupstream").green(),
            style("durable streams with consumer groups.").dim()
        );

        let path = &ctx.config_path;

        if path.exists() && !self.yes {
            let overwrite = Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(format!("{} already exists. Overwrite it?", path.display()))
                .default(false)
                .interact()
                .map_err(|e| format!("Failed to read confirmation: {}", e))?;

            if !overwrite {
                println!("{}", style("Nothing written").dim());
                return Ok(());
            }
        }

        let mut settings = Settings::default();

        if !self.yes {
            let log_key: String = Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Log key")
                .default(settings.producer.log_key.clone())
                .interact_text()
                .map_err(|e| format!("Failed to read log key: {}", e))?;

            let group: String = Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Consumer group")
                .default(settings.transport.default_group.clone())
                .interact_text()
                .map_err(|e| format!("Failed to read consumer group: {}", e))?;

            settings = with_log_key_and_group(settings, &log_key, &group);
        }

        settings.save(path)?;

        println!(
            "{} {}",
            style("✓ Wrote").green(),
            style(path.display()).bold()
        );
        println!("{}", style("Start it with 'groupstream run'").dim());

        Ok(())
    }
}

fn with_log_key_and_group(mut settings: Settings, log_key: &str, group: &str) -> Settings {
    settings.producer.log_key = log_key.to_string();
    settings.transport.default_group = group.to_string();
    for consumer in &mut settings.consumers {
        consumer.log_key = log_key.to_string();
        consumer.group = group.to_string();
    }
    settings
}
