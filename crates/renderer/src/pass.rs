//! Fullscreen passes: one program, named inputs, one output.

use crate::device::{BoundInput, OutputKind, ProgramDescriptor, RenderDevice};
use crate::types::{Destination, PassKind, ProgramId, TextureRef, UniformValue, ValueKind};
use crate::uniforms::{CellId, Scope, UniformStore};
use crate::PipelineError;

/// Whether an input reads a shared cell or one private to the pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputScope {
    Shared,
    Private,
}

/// One named input a pass program reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputDecl {
    pub name: &'static str,
    pub scope: InputScope,
    pub kind: ValueKind,
}

const fn shared(name: &'static str, kind: ValueKind) -> InputDecl {
    InputDecl {
        name,
        scope: InputScope::Shared,
        kind,
    }
}

const fn private(name: &'static str, kind: ValueKind) -> InputDecl {
    InputDecl {
        name,
        scope: InputScope::Private,
        kind,
    }
}

/// Pooled target a pass writes into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetRole {
    HistoryWrite,
    Bloom,
    BlurHorizontal,
    BlurVertical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Output {
    Target(TargetRole),
    Screen,
}

impl Output {
    pub fn kind(self) -> OutputKind {
        match self {
            Output::Target(_) => OutputKind::Offscreen,
            Output::Screen => OutputKind::Screen,
        }
    }
}

/// Static shape of a pass.
#[derive(Debug)]
pub struct PassLayout {
    pub kind: PassKind,
    pub inputs: &'static [InputDecl],
    pub output: Output,
}

use ValueKind::{Float, Texture, Vec2, Vec3};

static MAIN_INPUTS: &[InputDecl] = &[
    shared("iResolution", Vec3),
    shared("iTime", Float),
    private("uWarpAmount", Float),
    private("uDiscRadius", Float),
    private("uDiscWidth", Float),
    private("uFar", Float),
    private("uEyeDepth", Float),
    private("uViewOffset", Vec2),
    private("uTemporalBlend", Float),
    private("uTemporalJitter", Float),
    private("uJitterOffset", Vec2),
    private("iChannel0", Texture),
    private("iChannel1", Texture),
    private("iChannel2", Texture),
];

static FILTER_INPUTS: &[InputDecl] = &[shared("iResolution", Vec3), private("iChannel0", Texture)];

static COMPOSITE_INPUTS: &[InputDecl] = &[
    shared("iResolution", Vec3),
    shared("iTime", Float),
    shared("iStarTime", Float),
    private("iChannel0", Texture),
    private("iChannel3", Texture),
    private("uBloomStrength", Float),
    private("uExposure", Float),
    private("uHighlightClamp", Float),
    private("uToneMapPower", Vec3),
    private("uFinalGamma", Float),
    private("uSaturation", Float),
    private("uColorGain", Vec3),
    private("uAlphaThreshold", Float),
    private("uAlphaSoftness", Float),
    private("uStarZoom", Float),
    private("uStarSpeed", Float),
    private("uStarBrightness", Float),
    private("uStarDarkmatter", Float),
    private("uStarDistfading", Float),
    private("uStarSaturation", Float),
    private("uStarFormuparam", Float),
    private("uStarTile", Float),
    private("uStarStepsize", Float),
    private("uStarCenter", Vec2),
    private("uViewOffset", Vec2),
    private("uStarHoleRadius", Float),
    private("uStarHoleSoftness", Float),
];

/// The five passes in execution order.
pub static LAYOUTS: [PassLayout; 5] = [
    PassLayout {
        kind: PassKind::Main,
        inputs: MAIN_INPUTS,
        output: Output::Target(TargetRole::HistoryWrite),
    },
    PassLayout {
        kind: PassKind::BloomExtract,
        inputs: FILTER_INPUTS,
        output: Output::Target(TargetRole::Bloom),
    },
    PassLayout {
        kind: PassKind::BlurHorizontal,
        inputs: FILTER_INPUTS,
        output: Output::Target(TargetRole::BlurHorizontal),
    },
    PassLayout {
        kind: PassKind::BlurVertical,
        inputs: FILTER_INPUTS,
        output: Output::Target(TargetRole::BlurVertical),
    },
    PassLayout {
        kind: PassKind::Composite,
        inputs: COMPOSITE_INPUTS,
        output: Output::Screen,
    },
];

pub(crate) fn layout(kind: PassKind) -> &'static PassLayout {
    match kind {
        PassKind::Main => &LAYOUTS[0],
        PassKind::BloomExtract => &LAYOUTS[1],
        PassKind::BlurHorizontal => &LAYOUTS[2],
        PassKind::BlurVertical => &LAYOUTS[3],
        PassKind::Composite => &LAYOUTS[4],
    }
}

/// What one executed pass read and where it wrote.
#[derive(Clone, Debug, PartialEq)]
pub struct PassRecord {
    pub kind: PassKind,
    pub inputs: Vec<BoundInput>,
    pub destination: Destination,
}

impl PassRecord {
    pub fn input(&self, name: &str) -> Option<UniformValue> {
        self.inputs
            .iter()
            .find(|input| input.name == name)
            .map(|input| input.value)
    }

    pub fn texture(&self, name: &str) -> Option<TextureRef> {
        self.input(name).and_then(|value| value.as_texture())
    }
}

/// A compiled pass. Holds handles only; values live in the [`UniformStore`].
#[derive(Debug)]
pub struct Pass {
    kind: PassKind,
    program: ProgramId,
    bindings: Vec<(&'static str, CellId)>,
    output: Output,
}

impl Pass {
    /// Declares the pass's cells and compiles its program. Texture cells start
    /// out pointing at `placeholder` until the orchestrator rebinds them.
    pub fn new<D: RenderDevice>(
        device: &mut D,
        layout: &PassLayout,
        store: &mut UniformStore,
        placeholder: TextureRef,
    ) -> Result<Self, PipelineError> {
        let mut bindings = Vec::with_capacity(layout.inputs.len());
        for input in layout.inputs {
            let scope = match input.scope {
                InputScope::Shared => Scope::Shared,
                InputScope::Private => Scope::Pass(layout.kind),
            };
            let cell = store.declare(scope, input.name, initial_value(input.kind, placeholder))?;
            bindings.push((input.name, cell));
        }

        let program = device
            .compile_program(&ProgramDescriptor {
                pass: layout.kind,
                inputs: layout.inputs,
                output: layout.output.kind(),
            })
            .map_err(|source| PipelineError::Compile {
                pass: layout.kind,
                source,
            })?;
        tracing::debug!(pass = %layout.kind, program = program.raw(), "compiled pass program");

        Ok(Self {
            kind: layout.kind,
            program,
            bindings,
            output: layout.output,
        })
    }

    pub fn kind(&self) -> PassKind {
        self.kind
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn output(&self) -> Output {
        self.output
    }

    pub fn cell(&self, name: &str) -> Option<CellId> {
        self.bindings
            .iter()
            .find(|(binding, _)| *binding == name)
            .map(|(_, cell)| *cell)
    }

    /// Snapshot of every input's current value, in declaration order.
    pub fn resolve(&self, store: &UniformStore) -> Result<Vec<BoundInput>, PipelineError> {
        self.bindings
            .iter()
            .map(|(name, cell)| {
                store
                    .get(*cell)
                    .map(|value| BoundInput { name: *name, value })
                    .ok_or(PipelineError::MissingInput {
                        pass: self.kind,
                        name: *name,
                    })
            })
            .collect()
    }

    /// Issues exactly one draw into `destination`.
    pub fn execute<D: RenderDevice>(
        &self,
        device: &mut D,
        store: &UniformStore,
        destination: Destination,
    ) -> Result<PassRecord, PipelineError> {
        let inputs = self.resolve(store)?;
        tracing::trace!(pass = %self.kind, ?destination, "executing pass");
        device
            .draw(self.program, &inputs, destination)
            .map_err(|source| PipelineError::Draw {
                pass: self.kind,
                source,
            })?;
        Ok(PassRecord {
            kind: self.kind,
            inputs,
            destination,
        })
    }
}

fn initial_value(kind: ValueKind, placeholder: TextureRef) -> UniformValue {
    match kind {
        ValueKind::Float => UniformValue::Float(0.0),
        ValueKind::Vec2 => UniformValue::Vec2([0.0; 2]),
        ValueKind::Vec3 => UniformValue::Vec3([0.0; 3]),
        ValueKind::Texture => UniformValue::Texture(placeholder),
    }
}
