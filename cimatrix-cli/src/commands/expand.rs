use crate::commands;

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use color_eyre::Result;

use matrix_service::{ConfigParser, MatrixInstance};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpandFormat {
    /// One line per job
    Text,
    /// The job list as JSON
    Json,
    /// The matrix collapsed back to a configuration
    Yaml,
}

/// Print the expanded job list
#[derive(Args, Debug)]
pub struct ExpandArgs {
    /// Path to the configuration (default: .travis.yml at the repository root)
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', value_enum, default_value_t = ExpandFormat::Text)]
    pub format: ExpandFormat,
}

pub fn execute(args: ExpandArgs) -> Result<()> {
    let config_path = commands::config_path(args.config)?;
    let service = commands::load(&config_path)?;

    match args.format {
        ExpandFormat::Text => {
            for instance in service.instances() {
                println!("{}", text_line(&instance));
            }
        }
        ExpandFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&service.instances())?);
        }
        ExpandFormat::Yaml => {
            let declaration = service.collapse()?;
            print!("{}", ConfigParser::to_yaml(&declaration.to_config())?);
        }
    }

    Ok(())
}

fn text_line(instance: &MatrixInstance) -> String {
    let mut line = format!("#{:<3} {}", instance.number, instance.job.label());
    if instance.allow_failure {
        line.push_str("  (allowed to fail)");
    }
    line
}
