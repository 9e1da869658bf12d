use anyhow::{Context, Result};
use renderer::gpu::GpuOptions;
use renderer::{ParameterReloader, PipelineOptions, PreviewConfig};
use tracing_subscriber::EnvFilter;
use tuning::ParameterSet;

use crate::bootstrap::{load_parameters, parse_surface_size, resolve_parameter_source};
use crate::cli::{Cli, Command, HeadlessArgs, ParamArgs, ParamsArgs, PreviewArgs};
use crate::headless::{self, HeadlessRun};
use crate::paths::AppPaths;

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    let paths = AppPaths::discover()?;
    tracing::debug!(config = %paths.config_dir().display(), "resolved singularity paths");

    let Cli {
        params,
        preview,
        command,
    } = cli;
    match command {
        None => run_preview(&params, &paths, preview),
        Some(Command::Preview(args)) => run_preview(&params, &paths, args),
        Some(Command::Headless(args)) => run_headless(&params, &paths, args),
        Some(Command::Params(args)) => print_parameters(&params, &paths, args),
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn pipeline_options(params: &ParamArgs) -> PipelineOptions {
    PipelineOptions { seed: params.seed }
}

fn initial_parameters(params: &ParamArgs, paths: &AppPaths) -> Result<ParameterSet> {
    let source = resolve_parameter_source(params.params.as_deref(), paths);
    tracing::info!(source = %source.describe(), "loading parameters");
    load_parameters(&source, &params.overrides, params.render_scale)
}

fn run_preview(params: &ParamArgs, paths: &AppPaths, args: PreviewArgs) -> Result<()> {
    let size = parse_surface_size(&args.size)?;
    let parameters = initial_parameters(params, paths)?;

    // Reloads re-resolve the source so a params.toml created after launch is picked up.
    let explicit = params.params.clone();
    let overrides = params.overrides.clone();
    let render_scale = params.render_scale;
    let reload_paths = paths.clone();
    let reload: ParameterReloader = Box::new(move || {
        let source = resolve_parameter_source(explicit.as_deref(), &reload_paths);
        load_parameters(&source, &overrides, render_scale)
    });

    renderer::run_preview(PreviewConfig {
        size,
        parameters,
        options: pipeline_options(params),
        gpu: GpuOptions {
            vsync: !args.no_vsync,
            ..GpuOptions::default()
        },
        reload: Some(reload),
    })
}

fn run_headless(params: &ParamArgs, paths: &AppPaths, args: HeadlessArgs) -> Result<()> {
    let size = parse_surface_size(&args.size)?;
    let parameters = initial_parameters(params, paths)?;
    let stats = headless::run(HeadlessRun {
        size,
        frames: args.frames,
        step: args.duration,
        parameters,
        options: pipeline_options(params),
    })?;
    if let Some(last) = stats.last() {
        tracing::info!(
            frames = stats.len(),
            luminance = last.mean_luminance,
            coverage = last.coverage,
            "headless run complete"
        );
    }
    Ok(())
}

fn print_parameters(params: &ParamArgs, paths: &AppPaths, args: ParamsArgs) -> Result<()> {
    let parameters = initial_parameters(params, paths)?;
    let rendered = if args.json {
        serde_json::to_string_pretty(&parameters).context("failed to encode parameters as JSON")?
    } else {
        parameters
            .to_toml_string()
            .context("failed to encode parameters as TOML")?
    };
    println!("{rendered}");
    Ok(())
}
