//! Single owner of every uniform value the passes read.
//!
//! Cells are addressed by [`CellId`] handles handed out at declaration time.
//! Shared cells (`iResolution`, `iTime`, `iStarTime`) exist once and are bound
//! by every pass that declares them; private cells belong to one pass.

use std::collections::HashMap;

use tuning::ParameterSet;

use crate::types::{PassKind, UniformValue, ValueKind};

#[derive(Debug, thiserror::Error)]
pub enum UniformError {
    #[error("uniform '{name}' holds {expected:?} values, got {found:?}")]
    KindMismatch {
        name: &'static str,
        expected: ValueKind,
        found: ValueKind,
    },
    #[error("no uniform named '{name}' in scope {scope:?}")]
    Unknown { name: String, scope: Scope },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Shared,
    Pass(PassKind),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellId(u32);

#[derive(Clone, Debug)]
struct Cell {
    name: &'static str,
    value: UniformValue,
}

#[derive(Debug, Default)]
pub struct UniformStore {
    cells: Vec<Cell>,
    index: HashMap<Scope, HashMap<&'static str, CellId>>,
}

impl UniformStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing cell when `(scope, name)` is already declared.
    pub fn declare(
        &mut self,
        scope: Scope,
        name: &'static str,
        initial: UniformValue,
    ) -> Result<CellId, UniformError> {
        if let Some(id) = self.lookup(scope, name) {
            let expected = self.cells[id.0 as usize].value.kind();
            if expected != initial.kind() {
                return Err(UniformError::KindMismatch {
                    name,
                    expected,
                    found: initial.kind(),
                });
            }
            return Ok(id);
        }
        let id = CellId(self.cells.len() as u32);
        self.cells.push(Cell {
            name,
            value: initial,
        });
        self.index.entry(scope).or_default().insert(name, id);
        Ok(id)
    }

    pub fn lookup(&self, scope: Scope, name: &str) -> Option<CellId> {
        self.index.get(&scope)?.get(name).copied()
    }

    pub fn get(&self, id: CellId) -> Option<UniformValue> {
        self.cells.get(id.0 as usize).map(|cell| cell.value)
    }

    pub fn value(&self, scope: Scope, name: &str) -> Option<UniformValue> {
        self.lookup(scope, name).and_then(|id| self.get(id))
    }

    /// Overwrites a cell; the value must keep the cell's kind.
    pub fn set(&mut self, id: CellId, value: UniformValue) -> Result<(), UniformError> {
        let cell = self
            .cells
            .get_mut(id.0 as usize)
            .ok_or_else(|| UniformError::Unknown {
                name: format!("#{}", id.0),
                scope: Scope::Shared,
            })?;
        if cell.value.kind() != value.kind() {
            return Err(UniformError::KindMismatch {
                name: cell.name,
                expected: cell.value.kind(),
                found: value.kind(),
            });
        }
        cell.value = value;
        Ok(())
    }

    pub fn set_named(
        &mut self,
        scope: Scope,
        name: &str,
        value: UniformValue,
    ) -> Result<(), UniformError> {
        let id = self.lookup(scope, name).ok_or_else(|| UniformError::Unknown {
            name: name.to_string(),
            scope,
        })?;
        self.set(id, value)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Writes the per-frame shared values.
    pub fn write_shared(
        &mut self,
        resolution: [f32; 3],
        time: f32,
        star_time: f32,
    ) -> Result<(), UniformError> {
        self.set_named(Scope::Shared, SHARED_RESOLUTION, UniformValue::Vec3(resolution))?;
        self.set_named(Scope::Shared, SHARED_TIME, UniformValue::Float(time))?;
        self.set_named(Scope::Shared, SHARED_STAR_TIME, UniformValue::Float(star_time))
    }

    /// Copies parameter values into the private cells that consume them.
    /// Cells not declared by any pass are skipped.
    pub fn apply_parameters(&mut self, params: &ParameterSet) -> Result<(), UniformError> {
        for (pass, name, value) in parameter_values(params) {
            let scope = Scope::Pass(pass);
            if self.lookup(scope, name).is_some() {
                self.set_named(scope, name, value)?;
            }
        }
        Ok(())
    }
}

pub const SHARED_RESOLUTION: &str = "iResolution";
pub const SHARED_TIME: &str = "iTime";
pub const SHARED_STAR_TIME: &str = "iStarTime";

/// Parameter-driven uniforms per pass, as `(pass, uniform, value)`.
pub fn parameter_values(params: &ParameterSet) -> Vec<(PassKind, &'static str, UniformValue)> {
    use PassKind::{Composite, Main};
    use UniformValue::{Float, Vec2, Vec3};

    let stars = &params.stars;
    let color = &params.color;
    vec![
        (Main, "uWarpAmount", Float(params.disc.warp_amount)),
        (Main, "uDiscRadius", Float(params.disc.radius)),
        (Main, "uDiscWidth", Float(params.disc.width)),
        (Main, "uFar", Float(params.view.far)),
        (Main, "uEyeDepth", Float(params.view.eye_depth)),
        (Main, "uViewOffset", Vec2(params.view.offset)),
        (Main, "uTemporalBlend", Float(params.temporal.blend)),
        (Main, "uTemporalJitter", Float(params.temporal.jitter)),
        (Composite, "uBloomStrength", Float(params.bloom_strength)),
        (Composite, "uExposure", Float(color.exposure)),
        (Composite, "uHighlightClamp", Float(color.highlight_clamp)),
        (Composite, "uToneMapPower", Vec3(color.tone_map_power)),
        (Composite, "uFinalGamma", Float(color.final_gamma)),
        (Composite, "uSaturation", Float(color.saturation)),
        (Composite, "uColorGain", Vec3(color.gain)),
        (Composite, "uAlphaThreshold", Float(params.matte.alpha_threshold)),
        (Composite, "uAlphaSoftness", Float(params.matte.alpha_softness)),
        (Composite, "uStarZoom", Float(stars.zoom)),
        (Composite, "uStarSpeed", Float(stars.speed)),
        (Composite, "uStarBrightness", Float(stars.brightness)),
        (Composite, "uStarDarkmatter", Float(stars.darkmatter)),
        (Composite, "uStarDistfading", Float(stars.distfading)),
        (Composite, "uStarSaturation", Float(stars.saturation)),
        (Composite, "uStarFormuparam", Float(stars.formuparam)),
        (Composite, "uStarTile", Float(stars.tile)),
        (Composite, "uStarStepsize", Float(stars.step_size)),
        (Composite, "uStarCenter", Vec2(stars.center)),
        (Composite, "uViewOffset", Vec2(params.view.offset)),
        (Composite, "uStarHoleRadius", Float(stars.hole_radius)),
        (Composite, "uStarHoleSoftness", Float(stars.hole_softness)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TextureId, TextureRef};

    fn store_with_shared() -> UniformStore {
        let mut store = UniformStore::new();
        store
            .declare(Scope::Shared, SHARED_RESOLUTION, UniformValue::Vec3([0.0; 3]))
            .unwrap();
        store
            .declare(Scope::Shared, SHARED_TIME, UniformValue::Float(0.0))
            .unwrap();
        store
            .declare(Scope::Shared, SHARED_STAR_TIME, UniformValue::Float(0.0))
            .unwrap();
        store
    }

    #[test]
    fn shared_cells_are_declared_once() {
        let mut store = store_with_shared();
        let first = store
            .declare(Scope::Shared, SHARED_TIME, UniformValue::Float(1.0))
            .unwrap();
        let second = store
            .declare(Scope::Shared, SHARED_TIME, UniformValue::Float(2.0))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 3);
        assert_eq!(store.get(first), Some(UniformValue::Float(0.0)));
    }

    #[test]
    fn private_cells_with_same_name_are_distinct() {
        let mut store = UniformStore::new();
        let main = store
            .declare(Scope::Pass(PassKind::Main), "uViewOffset", UniformValue::Vec2([0.0; 2]))
            .unwrap();
        let composite = store
            .declare(
                Scope::Pass(PassKind::Composite),
                "uViewOffset",
                UniformValue::Vec2([0.0; 2]),
            )
            .unwrap();
        assert_ne!(main, composite);
        store.set(main, UniformValue::Vec2([0.5, 0.5])).unwrap();
        assert_eq!(store.get(composite), Some(UniformValue::Vec2([0.0, 0.0])));
    }

    #[test]
    fn kind_changes_are_rejected() {
        let mut store = store_with_shared();
        let err = store
            .set_named(
                Scope::Shared,
                SHARED_TIME,
                UniformValue::Texture(TextureRef::Static(TextureId::new(0))),
            )
            .unwrap_err();
        assert!(matches!(err, UniformError::KindMismatch { name: "iTime", .. }));
    }

    #[test]
    fn shared_write_updates_all_three() {
        let mut store = store_with_shared();
        store.write_shared([64.0, 32.0, 1.0], 2.5, 0.5).unwrap();
        assert_eq!(
            store.value(Scope::Shared, SHARED_RESOLUTION),
            Some(UniformValue::Vec3([64.0, 32.0, 1.0]))
        );
        assert_eq!(store.value(Scope::Shared, SHARED_TIME), Some(UniformValue::Float(2.5)));
        assert_eq!(
            store.value(Scope::Shared, SHARED_STAR_TIME),
            Some(UniformValue::Float(0.5))
        );
    }

    #[test]
    fn parameters_land_in_declared_cells_only() {
        let mut store = UniformStore::new();
        let blend = store
            .declare(Scope::Pass(PassKind::Main), "uTemporalBlend", UniformValue::Float(0.0))
            .unwrap();
        let mut params = ParameterSet::default();
        params.temporal.blend = 0.5;
        store.apply_parameters(&params).unwrap();
        assert_eq!(store.get(blend), Some(UniformValue::Float(0.5)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn every_parameter_scalar_reaches_a_uniform() {
        let values = parameter_values(&ParameterSet::default());
        let scalars: usize = values
            .iter()
            .map(|(_, _, value)| match value {
                UniformValue::Float(_) => 1,
                UniformValue::Vec2(_) => 2,
                UniformValue::Vec3(_) => 3,
                UniformValue::Texture(_) => 0,
            })
            .sum();
        // view.offset feeds both passes; render_scale and the two time scales
        // are consumed by the orchestrator instead.
        assert_eq!(scalars - 2, tuning::PARAMETERS.len() - 3);
    }
}
