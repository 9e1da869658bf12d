use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "singularity",
    author,
    version,
    about = "Multi-pass black hole compositor"
)]
pub struct Cli {
    #[command(flatten)]
    pub params: ParamArgs,
    #[command(flatten)]
    pub preview: PreviewArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Where parameters come from; accepted by every subcommand.
#[derive(Args, Debug, Default, Clone)]
pub struct ParamArgs {
    /// Parameter file (TOML). Defaults to `params.toml` in the config directory.
    #[arg(long, value_name = "PATH", global = true)]
    pub params: Option<PathBuf>,

    /// Override one parameter, e.g. `--set temporal.blend=0.9`. Repeatable.
    #[arg(long = "set", value_name = "NAME=VALUE", global = true)]
    pub overrides: Vec<String>,

    /// Shortcut for `--set render_scale=S`.
    #[arg(long, value_name = "S", global = true)]
    pub render_scale: Option<f32>,

    /// Seed for noise textures and jitter; random when omitted.
    #[arg(long, value_name = "N", global = true)]
    pub seed: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open the preview window (the default).
    Preview(PreviewArgs),
    /// Render frames with the software device and log statistics.
    Headless(HeadlessArgs),
    /// Print the effective parameter set.
    Params(ParamsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PreviewArgs {
    /// Initial window size.
    #[arg(long, value_name = "WIDTHxHEIGHT", default_value = "1280x720")]
    pub size: String,

    /// Present without waiting for vertical sync.
    #[arg(long)]
    pub no_vsync: bool,
}

#[derive(Args, Debug, Clone)]
pub struct HeadlessArgs {
    /// Number of frames to render.
    #[arg(long, value_name = "N", default_value_t = 60)]
    pub frames: u32,

    /// Render size.
    #[arg(long, value_name = "WIDTHxHEIGHT", default_value = "320x180")]
    pub size: String,

    /// Simulated time between frames, e.g. `16ms`; `0s` freezes time.
    #[arg(
        long,
        value_name = "DURATION",
        value_parser = parse_frame_duration,
        default_value = "16ms"
    )]
    pub duration: Duration,
}

#[derive(Args, Debug, Clone)]
pub struct ParamsArgs {
    /// Print JSON instead of TOML.
    #[arg(long)]
    pub json: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_frame_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("frame duration must not be empty".to_string());
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid duration '{trimmed}': {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_preview() {
        let cli = Cli::try_parse_from(["singularity", "--size", "640x360", "--seed", "4"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.preview.size, "640x360");
        assert_eq!(cli.params.seed, Some(4));
    }

    #[test]
    fn headless_accepts_global_parameter_flags() {
        let cli = Cli::try_parse_from([
            "singularity",
            "headless",
            "--frames",
            "3",
            "--duration",
            "0s",
            "--set",
            "temporal.blend=0.5",
            "--set",
            "bloom_strength=0.1",
        ])
        .unwrap();
        let Some(Command::Headless(args)) = cli.command else {
            panic!("expected headless");
        };
        assert_eq!(args.frames, 3);
        assert_eq!(args.duration, Duration::ZERO);
        assert_eq!(cli.params.overrides.len(), 2);
    }

    #[test]
    fn frame_duration_rejects_garbage() {
        assert_eq!(parse_frame_duration("20ms"), Ok(Duration::from_millis(20)));
        assert!(parse_frame_duration("").is_err());
        assert!(parse_frame_duration("soon").is_err());
    }
}
