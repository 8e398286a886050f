use anyhow::{Context, Result};
use bundle_pipeline::cli::commands::{BuildCommand, OverrideArgs, PlanCommand, ValidateCommand};
use bundle_pipeline::cli::output::*;
use bundle_pipeline::cli::{Cli, Command};
use bundle_pipeline::core::{BuildConfig, PipelineDescriptor};
use bundle_pipeline::execution::{BuildEngine, BuildEvent, DiskSource};
use std::path::Path;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Plan(cmd) => show_plan(&cli.config, cmd)?,
        Command::Build(cmd) => run_build(&cli.config, cmd).await?,
        Command::Validate(cmd) => validate_config(&cli.config, cmd)?,
    }

    Ok(())
}

fn load_config(path: &Path, overrides: &OverrideArgs) -> Result<BuildConfig> {
    let mut config = BuildConfig::from_file(path).context("Failed to load build config")?;
    if !overrides.is_empty() {
        overrides.apply(&mut config);
        config.validate().context("Invalid command-line overrides")?;
    }
    Ok(config)
}

fn assemble_descriptor(config: &BuildConfig) -> Result<PipelineDescriptor> {
    let tsconfig = config.load_tsconfig().context("Failed to load compiler config")?;
    if let Some(tsconfig) = &tsconfig {
        info!("Using compiler config {}", tsconfig.path.display());
    }
    config.descriptor(tsconfig.as_ref())
}

fn show_plan(path: &Path, cmd: &PlanCommand) -> Result<()> {
    let config = load_config(path, &cmd.overrides)?;
    let descriptor = assemble_descriptor(&config)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&descriptor)?);
        return Ok(());
    }

    println!("{}Pipeline ({} stages):", PACKAGE, style(descriptor.stages.len()).cyan());
    println!("{}", format_stage_list(&descriptor));
    Ok(())
}

async fn run_build(path: &Path, cmd: &BuildCommand) -> Result<()> {
    let config = load_config(path, &cmd.overrides)?;
    config.validate_inputs()?;
    let descriptor = assemble_descriptor(&config)?;
    let root = descriptor.output.root.clone();

    let mut engine = BuildEngine::new(descriptor, DiskSource);
    let spinner = create_spinner("transformed");
    let progress = spinner.clone();
    let quiet = cmd.json;
    engine.add_event_handler(move |event| {
        if let BuildEvent::ModuleTransformed { .. } = &event {
            progress.inc(1);
        }
        if let Some(line) = format_build_event(&event).filter(|_| !quiet) {
            progress.println(line);
        }
    });

    let result = engine.build().await;
    spinner.finish_and_clear();

    match result {
        Ok(report) => {
            if cmd.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\n{}", format_report(&report, root.as_deref()));
            }
            Ok(())
        }
        Err(e) => {
            println!("\n{}{}", CROSS, style("Build failed").red());
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn validate_config(path: &Path, cmd: &ValidateCommand) -> Result<()> {
    println!("{}Validating {}...", INFO, path.display());

    let result = BuildConfig::from_file(path).and_then(|config| {
        config.validate_inputs()?;
        Ok(config)
    });

    match result {
        Ok(config) => {
            println!("{}Build configuration is valid!", CHECK);
            let targets = config.target.to_vec();
            println!(
                "  Targets: {}",
                style(targets.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")).bold()
            );
            println!("  Inputs: {}", style(config.input.len()).cyan());
            println!("  Environment values: {}", style(config.env.len()).cyan());
            println!("  Executables: {}", style(config.executables.len()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{}Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}
