//! Tunable parameters for the singularity compositor.
//!
//! This crate is the host-side "parameter surface": it owns the bounds of
//! every knob, loads and validates parameter files, and clamps untrusted
//! values before they reach the renderer. The renderer itself consumes a
//! [`ParameterSet`] as-is and never re-validates.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse parameters: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise parameters: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid parameters: {0}")]
    Invalid(String),
    #[error("parameter '{name}' = {value} is outside [{min}, {max}]")]
    OutOfBounds {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
}

/// Camera placement and framing.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewParams {
    pub far: f32,
    pub eye_depth: f32,
    pub offset: [f32; 2],
}

impl Default for ViewParams {
    fn default() -> Self {
        Self {
            far: 15.0,
            eye_depth: 4.5,
            offset: [0.3, -0.3],
        }
    }
}

/// Accretion disc geometry.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscParams {
    pub warp_amount: f32,
    pub radius: f32,
    pub width: f32,
}

impl Default for DiscParams {
    fn default() -> Self {
        Self {
            warp_amount: 5.0,
            radius: 3.2,
            width: 5.3,
        }
    }
}

/// Animation speed and temporal accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemporalParams {
    pub time_scale: f32,
    pub star_time_scale: f32,
    /// Weight of the previous frame in the history blend.
    pub blend: f32,
    /// Sub-pixel ray origin jitter amplitude, in pixels.
    pub jitter: f32,
}

impl Default for TemporalParams {
    fn default() -> Self {
        Self {
            time_scale: 2.1,
            star_time_scale: 1.0,
            blend: 0.85,
            jitter: 1.0,
        }
    }
}

/// Colour grading applied by the final composite.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColorParams {
    pub exposure: f32,
    pub highlight_clamp: f32,
    pub tone_map_power: [f32; 3],
    pub final_gamma: f32,
    pub saturation: f32,
    pub gain: [f32; 3],
}

impl Default for ColorParams {
    fn default() -> Self {
        Self {
            exposure: 100.0,
            highlight_clamp: 1.0,
            tone_map_power: [1.3, 1.2, 1.0],
            final_gamma: 0.7 / 2.2,
            saturation: 1.0,
            gain: [1.0, 1.0, 1.0],
        }
    }
}

/// Alpha matte derived from the graded image.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatteParams {
    pub alpha_threshold: f32,
    pub alpha_softness: f32,
}

impl Default for MatteParams {
    fn default() -> Self {
        Self {
            alpha_threshold: 0.02,
            alpha_softness: 0.15,
        }
    }
}

/// Procedural starfield behind the black hole.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StarParams {
    pub zoom: f32,
    pub speed: f32,
    pub brightness: f32,
    pub darkmatter: f32,
    pub distfading: f32,
    pub saturation: f32,
    pub formuparam: f32,
    pub tile: f32,
    pub step_size: f32,
    pub center: [f32; 2],
    pub hole_radius: f32,
    pub hole_softness: f32,
}

impl Default for StarParams {
    fn default() -> Self {
        Self {
            zoom: 1.2,
            speed: 0.002,
            brightness: 0.0015,
            darkmatter: 1.0,
            distfading: 0.73,
            saturation: 1.0,
            formuparam: 0.57,
            tile: 1.0,
            step_size: 0.2,
            center: [0.35, 0.6],
            hole_radius: 0.25,
            hole_softness: 0.08,
        }
    }
}

/// Every tunable value of the compositor, grouped the way the control panel
/// presents them.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParameterSet {
    pub bloom_strength: f32,
    /// Fraction of the device resolution used for offscreen targets.
    pub render_scale: f32,
    pub view: ViewParams,
    pub disc: DiscParams,
    pub temporal: TemporalParams,
    pub color: ColorParams,
    pub matte: MatteParams,
    pub stars: StarParams,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            bloom_strength: 0.03,
            render_scale: 1.0,
            view: ViewParams::default(),
            disc: DiscParams::default(),
            temporal: TemporalParams::default(),
            color: ColorParams::default(),
            matte: MatteParams::default(),
            stars: StarParams::default(),
        }
    }
}

/// Bounds and accessors for one scalar parameter.
#[derive(Clone, Copy)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub step: f32,
    get: fn(&ParameterSet) -> f32,
    set: fn(&mut ParameterSet, f32),
}

impl ParameterSpec {
    pub fn get(&self, params: &ParameterSet) -> f32 {
        (self.get)(params)
    }

    pub fn set(&self, params: &mut ParameterSet, value: f32) {
        (self.set)(params, value)
    }

    pub fn default_value(&self) -> f32 {
        self.get(&ParameterSet::default())
    }

    /// NaN is never in bounds.
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

impl fmt::Debug for ParameterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterSpec")
            .field("name", &self.name)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("step", &self.step)
            .finish()
    }
}

macro_rules! spec {
    ($name:literal, ($($access:tt)+), $min:expr, $max:expr, $step:expr) => {
        ParameterSpec {
            name: $name,
            min: $min,
            max: $max,
            step: $step,
            get: |params| params.$($access)+,
            set: |params, value| params.$($access)+ = value,
        }
    };
}

/// Bounds table for every scalar in [`ParameterSet`], in control-panel order.
pub static PARAMETERS: &[ParameterSpec] = &[
    spec!("view.far", (view.far), 6.0, 30.0, 0.5),
    spec!("view.eye_depth", (view.eye_depth), 2.0, 9.0, 0.25),
    spec!("view.offset.x", (view.offset[0]), -0.8, 0.8, 0.01),
    spec!("view.offset.y", (view.offset[1]), -0.8, 0.8, 0.01),
    spec!("disc.warp_amount", (disc.warp_amount), 0.5, 10.0, 0.1),
    spec!("disc.radius", (disc.radius), 1.0, 6.0, 0.1),
    spec!("disc.width", (disc.width), 1.0, 8.0, 0.1),
    spec!("temporal.time_scale", (temporal.time_scale), 0.0, 4.0, 0.05),
    spec!("temporal.star_time_scale", (temporal.star_time_scale), 0.0, 4.0, 0.05),
    spec!("temporal.blend", (temporal.blend), 0.0, 0.98, 0.01),
    spec!("temporal.jitter", (temporal.jitter), 0.0, 1.5, 0.05),
    spec!("color.exposure", (color.exposure), 20.0, 200.0, 5.0),
    spec!("color.highlight_clamp", (color.highlight_clamp), 0.5, 2.0, 0.05),
    spec!("color.tone_map_power.r", (color.tone_map_power[0]), 0.8, 2.0, 0.05),
    spec!("color.tone_map_power.g", (color.tone_map_power[1]), 0.8, 2.0, 0.05),
    spec!("color.tone_map_power.b", (color.tone_map_power[2]), 0.8, 2.0, 0.05),
    spec!("color.final_gamma", (color.final_gamma), 0.2, 0.8, 0.01),
    spec!("color.saturation", (color.saturation), 0.0, 2.0, 0.05),
    spec!("color.gain.r", (color.gain[0]), 0.5, 2.0, 0.05),
    spec!("color.gain.g", (color.gain[1]), 0.5, 2.0, 0.05),
    spec!("color.gain.b", (color.gain[2]), 0.5, 2.0, 0.05),
    spec!("matte.alpha_threshold", (matte.alpha_threshold), 0.0, 0.2, 0.01),
    spec!("matte.alpha_softness", (matte.alpha_softness), 0.01, 0.5, 0.01),
    spec!("bloom_strength", (bloom_strength), 0.0, 0.3, 0.01),
    spec!("render_scale", (render_scale), 0.5, 1.0, 0.05),
    spec!("stars.zoom", (stars.zoom), 0.6, 2.0, 0.05),
    spec!("stars.speed", (stars.speed), 0.0, 0.005, 0.0005),
    spec!("stars.brightness", (stars.brightness), 0.0002, 0.005, 0.0001),
    spec!("stars.darkmatter", (stars.darkmatter), 0.2, 2.0, 0.05),
    spec!("stars.distfading", (stars.distfading), 0.5, 0.9, 0.01),
    spec!("stars.saturation", (stars.saturation), 0.0, 2.0, 0.05),
    spec!("stars.formuparam", (stars.formuparam), 0.2, 1.0, 0.01),
    spec!("stars.tile", (stars.tile), 0.5, 2.0, 0.05),
    spec!("stars.step_size", (stars.step_size), 0.05, 0.5, 0.01),
    spec!("stars.center.x", (stars.center[0]), 0.0, 1.0, 0.01),
    spec!("stars.center.y", (stars.center[1]), 0.0, 1.0, 0.01),
    spec!("stars.hole_radius", (stars.hole_radius), 0.05, 0.6, 0.01),
    spec!("stars.hole_softness", (stars.hole_softness), 0.01, 0.3, 0.01),
];

/// Looks up the bounds entry for a dotted parameter name.
pub fn spec(name: &str) -> Option<&'static ParameterSpec> {
    PARAMETERS.iter().find(|spec| spec.name == name)
}

/// A value rewritten by [`ParameterSet::clamped`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    pub name: &'static str,
    pub from: f32,
    pub to: f32,
}

impl ParameterSet {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        spec(name).map(|spec| spec.get(self))
    }

    /// Writes a single value by dotted name without bounds checking.
    pub fn set(&mut self, name: &str, value: f32) -> Result<(), ConfigError> {
        let spec =
            spec(name).ok_or_else(|| ConfigError::Invalid(format!("unknown parameter '{name}'")))?;
        spec.set(self, value);
        Ok(())
    }

    /// Parses and applies a `name=value` assignment.
    pub fn apply_assignment(&mut self, assignment: &str) -> Result<(), ConfigError> {
        let (name, raw) = assignment.split_once('=').ok_or_else(|| {
            ConfigError::Invalid(format!("expected NAME=VALUE, got '{assignment}'"))
        })?;
        let value: f32 = raw.trim().parse().map_err(|_| {
            ConfigError::Invalid(format!("value '{}' for '{}' is not a number", raw.trim(), name))
        })?;
        self.set(name.trim(), value)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for spec in PARAMETERS {
            let value = spec.get(self);
            if !spec.contains(value) {
                return Err(ConfigError::OutOfBounds {
                    name: spec.name,
                    value,
                    min: spec.min,
                    max: spec.max,
                });
            }
        }
        Ok(())
    }

    /// Returns a copy with every value inside its bounds. NaN falls back to
    /// the default rather than to a bound.
    pub fn clamped(&self) -> (ParameterSet, Vec<Adjustment>) {
        let mut result = *self;
        let mut adjustments = Vec::new();
        for spec in PARAMETERS {
            let value = spec.get(self);
            if spec.contains(value) {
                continue;
            }
            let fixed = if value.is_nan() {
                spec.default_value()
            } else {
                value.clamp(spec.min, spec.max)
            };
            spec.set(&mut result, fixed);
            adjustments.push(Adjustment {
                name: spec.name,
                from: value,
                to: fixed,
            });
        }
        (result, adjustments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
bloom_strength = 0.1
render_scale = 0.75

[view]
far = 20.0
offset = [0.0, 0.1]

[temporal]
blend = 0.9

[color]
tone_map_power = [1.0, 1.0, 1.0]

[stars]
hole_radius = 0.3
"#;

    #[test]
    fn defaults_are_within_bounds() {
        ParameterSet::default()
            .validate()
            .expect("defaults must validate");
    }

    #[test]
    fn parses_partial_file_and_keeps_defaults() {
        let params = ParameterSet::from_toml_str(SAMPLE).expect("parse parameters");
        assert_eq!(params.view.far, 20.0);
        assert_eq!(params.view.offset, [0.0, 0.1]);
        assert_eq!(params.view.eye_depth, 4.5);
        assert_eq!(params.temporal.blend, 0.9);
        assert_eq!(params.temporal.time_scale, 2.1);
        assert_eq!(params.render_scale, 0.75);
        assert_eq!(params.stars.hole_radius, 0.3);
        assert_eq!(params.stars.center, [0.35, 0.6]);
        params.validate().expect("sample validates");
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = ParameterSet::from_toml_str("[disc]\nthickness = 2.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validate_reports_first_offending_parameter() {
        let mut params = ParameterSet::default();
        params.temporal.blend = 0.99;
        let err = params.validate().unwrap_err();
        match err {
            ConfigError::OutOfBounds { name, value, .. } => {
                assert_eq!(name, "temporal.blend");
                assert!((value - 0.99).abs() < 1e-6);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn clamped_fixes_range_and_nan() {
        let mut params = ParameterSet::default();
        params.temporal.jitter = 4.0;
        params.color.gain[1] = f32::NAN;
        params.view.offset[0] = -2.0;

        let (fixed, adjustments) = params.clamped();
        assert_eq!(fixed.temporal.jitter, 1.5);
        assert_eq!(fixed.color.gain[1], 1.0);
        assert_eq!(fixed.view.offset[0], -0.8);
        assert_eq!(adjustments.len(), 3);
        assert!(adjustments.iter().any(|adj| adj.name == "color.gain.g"));
        fixed.validate().expect("clamped set validates");
    }

    #[test]
    fn assignments_address_nested_components() {
        let mut params = ParameterSet::default();
        params
            .apply_assignment("color.tone_map_power.b = 1.5")
            .expect("assignment");
        params.apply_assignment("stars.center.y=0.2").expect("assignment");
        assert_eq!(params.color.tone_map_power, [1.3, 1.2, 1.5]);
        assert_eq!(params.get("stars.center.y"), Some(0.2));

        assert!(matches!(
            params.apply_assignment("disc.depth=1"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            params.apply_assignment("disc.radius=wide"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn table_names_are_unique() {
        for (index, spec) in PARAMETERS.iter().enumerate() {
            assert!(spec.min <= spec.max, "{} has inverted bounds", spec.name);
            assert!(spec.step > 0.0, "{} has no step", spec.name);
            assert!(
                PARAMETERS[index + 1..].iter().all(|other| other.name != spec.name),
                "{} listed twice",
                spec.name
            );
        }
    }

    #[test]
    fn toml_output_parses_back() {
        let mut params = ParameterSet::default();
        params.disc.radius = 2.5;
        let text = params.to_toml_string().expect("serialise");
        let parsed = ParameterSet::from_toml_str(&text).expect("parse");
        assert_eq!(parsed, params);
    }
}
