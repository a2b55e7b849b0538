use crate::commands;
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use matrix_service::parser::{CommandKind, PhasePlan};

/// Validate a configuration and summarize its matrix
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the configuration (default: .travis.yml at the repository root)
    pub config: Option<PathBuf>,

    /// Treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    let config_path = commands::config_path(args.config)?;
    output::status("Validating", &config_path.display().to_string());

    let service = commands::load(&config_path)?;
    output::check("Configuration valid");

    let matrix = service.matrix();
    output::check(&format!(
        "Matrix: {} python version(s) x {} environment set(s) = {} base job(s)",
        matrix.interpreter_versions.len(),
        matrix.base_environment_sets.len(),
        matrix.base_len()
    ));
    if !matrix.excludes.is_empty() || !matrix.includes.is_empty() {
        output::check(&format!(
            "{} exclude rule(s), {} included job(s)",
            matrix.excludes.len(),
            matrix.includes.len()
        ));
    }

    let instances = service.instances();
    let allowed = instances.iter().filter(|i| i.allow_failure).count();
    output::check(&format!(
        "{} job(s) after expansion, {} allowed to fail",
        instances.len(),
        allowed
    ));

    let plan = PhasePlan::from_config(service.config());
    let conditional = plan.iter().filter(|(_, _, c)| c.is_conditional()).count();
    output::check(&format!(
        "{} command(s), {} conditional",
        plan.total(),
        conditional
    ));
    for (phase, index, command) in plan.iter() {
        if let CommandKind::Opaque { reason } = &command.kind {
            output::dim(&format!("    {}[{}]: {}", phase, index, reason));
        }
    }

    let warnings = service.warnings().len();
    if warnings > 0 && args.strict {
        output::failure(&format!("{} warning(s) with --strict", warnings));
        std::process::exit(1);
    }

    if warnings == 0 {
        output::success("Configuration is valid");
    } else {
        output::success(&format!("Configuration is valid ({} warning(s))", warnings));
    }
    Ok(())
}
