use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tuning::ParameterSet;

use crate::paths::AppPaths;

pub fn parse_surface_size(spec: &str) -> Result<(u32, u32)> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X'])
        .with_context(|| format!("size '{trimmed}' must look like WIDTHxHEIGHT"))?;
    let width: u32 = width
        .trim()
        .parse()
        .with_context(|| format!("invalid width in size '{trimmed}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .with_context(|| format!("invalid height in size '{trimmed}'"))?;
    if width == 0 || height == 0 {
        bail!("size '{trimmed}' must be non-zero");
    }
    Ok((width, height))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterSource {
    File(PathBuf),
    Defaults,
}

impl ParameterSource {
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Defaults => "built-in defaults".to_string(),
        }
    }
}

/// An explicit `--params` must exist; the config-dir file is optional.
pub fn resolve_parameter_source(explicit: Option<&Path>, paths: &AppPaths) -> ParameterSource {
    if let Some(path) = explicit {
        return ParameterSource::File(path.to_path_buf());
    }
    let candidate = paths.params_file();
    if candidate.is_file() {
        ParameterSource::File(candidate)
    } else {
        ParameterSource::Defaults
    }
}

/// Loads, overrides and clamps. Out-of-range values are pulled back into
/// bounds with a warning rather than rejected.
pub fn load_parameters(
    source: &ParameterSource,
    overrides: &[String],
    render_scale: Option<f32>,
) -> Result<ParameterSet> {
    let mut parameters = match source {
        ParameterSource::File(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read parameters from {}", path.display()))?;
            ParameterSet::from_toml_str(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        ParameterSource::Defaults => ParameterSet::default(),
    };

    for assignment in overrides {
        parameters
            .apply_assignment(assignment)
            .with_context(|| format!("invalid override '{assignment}'"))?;
    }
    if let Some(scale) = render_scale {
        parameters.render_scale = scale;
    }

    let (clamped, adjustments) = parameters.clamped();
    for adjustment in adjustments {
        tracing::warn!(
            parameter = adjustment.name,
            from = adjustment.from,
            to = adjustment.to,
            "parameter out of range; clamped"
        );
    }
    Ok(clamped)
}
