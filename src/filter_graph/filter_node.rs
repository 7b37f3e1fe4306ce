//! The filter node capability and the single GPU pass every node is built from.

use std::sync::Arc;

use glam::Vec2;
use tracing::debug;

use crate::backend::RenderBackend;
use crate::error::{ConstructionError, Error, Result};
use crate::filter_graph::{FullScreenQuad, RenderTarget, RenderTargetDesc, TextureId};
use crate::shader::{FilterKind, ParameterSet, ParameterValue, ShaderProgram};

/// Parameters a node binds itself; callers cannot override them.
const MANAGED_PARAMETERS: [&str; 3] = ["image", "resolution", "first_pass"];

pub(crate) mod sealed {
    pub trait Sealed {}
}

/// Common interface of every filter in the catalog.
///
/// Only the catalog types implement this trait, so every node in a
/// [`FilterGraph`](crate::FilterGraph) is a concrete, fully configured filter.
///
/// # Execution Flow
///
/// 1. A node is constructed against a backend: its program is fetched and
///    checked, parameters are validated and its render target is allocated
/// 2. `render_pass()` is called once per frame (or more); each call
///    overwrites the node's target
/// 3. `output_texture()` is read by downstream nodes and the display layer
pub trait FilterNode: sealed::Sealed {
    /// The catalog entry this node implements.
    fn kind(&self) -> FilterKind;

    /// Issues this node's GPU passes into its render target.
    ///
    /// Calling it again with unchanged inputs produces the same pixels: the
    /// target is overwritten, never accumulated into.
    fn render_pass(&mut self, backend: &mut dyn RenderBackend) -> Result<()>;

    /// The texture this node renders into.
    ///
    /// The handle is stable for the node's lifetime and can be bound as an
    /// input of later nodes right away; its contents are undefined until the
    /// first `render_pass`.
    fn output_texture(&self) -> TextureId {
        self.render_target().texture()
    }

    /// The texture the node's first pass samples as `image`.
    fn input_texture(&self) -> Option<TextureId> {
        self.parameters().texture("image")
    }

    /// The node's final render target.
    fn render_target(&self) -> &RenderTarget;

    /// The program bound by the final pass.
    fn program(&self) -> &Arc<ShaderProgram>;

    /// Effective parameters of the final pass: schema defaults, then the
    /// node's own bindings, then caller overrides.
    fn parameters(&self) -> &ParameterSet;

    /// Changes one parameter after construction.
    ///
    /// Validated exactly like a construction override; takes effect at the
    /// next `render_pass`.
    fn set_parameter(&mut self, name: &str, value: ParameterValue) -> Result<()>;

    /// Number of GPU passes one `render_pass` call issues.
    fn passes(&self) -> usize {
        1
    }

    /// How many times `render_pass` has completed.
    fn render_count(&self) -> u64;

    /// The node's output as a display material.
    fn material(&self) -> OutputMaterial<'_> {
        OutputMaterial {
            program: self.program(),
            parameters: self.parameters(),
            texture: self.output_texture(),
        }
    }
}

/// What the display layer needs to show a node's result: the program and
/// uniforms of its last pass, and the texture it wrote.
#[derive(Clone, Copy, Debug)]
pub struct OutputMaterial<'a> {
    pub program: &'a Arc<ShaderProgram>,
    pub parameters: &'a ParameterSet,
    pub texture: TextureId,
}

/// One full-screen draw of one program into one owned render target.
#[derive(Debug)]
pub(crate) struct FilterPass {
    program: Arc<ShaderProgram>,
    parameters: ParameterSet,
    target: RenderTarget,
    quad: FullScreenQuad,
    renders: u64,
}

impl FilterPass {
    /// Builds a pass for `kind`.
    ///
    /// # Arguments
    ///
    /// * `bound` - Values the node manages itself (inputs, pass selection)
    /// * `overrides` - Caller values, validated against the program schema
    pub(crate) fn new(
        backend: &mut dyn RenderBackend,
        kind: FilterKind,
        width: u32,
        height: u32,
        bound: ParameterSet,
        overrides: &ParameterSet,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ConstructionError::ZeroSized { width, height }.into());
        }

        let program = backend.program(kind)?;
        check_program(kind, &program)?;

        for (name, value) in overrides.iter() {
            if MANAGED_PARAMETERS.contains(&name) {
                return Err(ConstructionError::ReservedParameter(name.to_string()).into());
            }
            program.schema().validate(name, value)?;
        }

        let mut parameters = program.schema().defaults().merged(overrides).merged(&bound);
        parameters.insert("resolution", Vec2::new(width as f32, height as f32));

        for &input in kind.inputs() {
            if parameters.texture(input).is_none() {
                return Err(ConstructionError::MissingInput { kind, input }.into());
            }
        }

        let target = backend.allocate_render_target(RenderTargetDesc::new(width, height))?;
        debug!(%kind, texture = ?target.texture(), width, height, "created filter pass");

        Ok(Self {
            program,
            parameters,
            target,
            quad: FullScreenQuad::new(),
            renders: 0,
        })
    }

    /// Draws once into the target. The target is unbound again even when
    /// the draw fails.
    pub(crate) fn render(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        backend.set_active_render_target(Some(&self.target))?;
        let drawn = backend
            .bind_program(&self.program, &self.parameters)
            .and_then(|()| backend.draw_full_screen_quad(&self.quad));
        let unbound = backend.set_active_render_target(None);
        drawn?;
        unbound?;

        self.renders += 1;
        debug!(
            kind = %self.program.kind(),
            target = ?self.target.texture(),
            backend = backend.name(),
            "rendered filter pass"
        );
        Ok(())
    }

    pub(crate) fn set_parameter(&mut self, name: &str, value: ParameterValue) -> Result<()> {
        if MANAGED_PARAMETERS.contains(&name) {
            return Err(ConstructionError::ReservedParameter(name.to_string()).into());
        }
        self.program.schema().validate(name, &value)?;
        self.parameters.insert(name, value);
        Ok(())
    }

    pub(crate) fn output_texture(&self) -> TextureId {
        self.target.texture()
    }

    pub(crate) fn target(&self) -> &RenderTarget {
        &self.target
    }

    pub(crate) fn program(&self) -> &Arc<ShaderProgram> {
        &self.program
    }

    pub(crate) fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub(crate) fn renders(&self) -> u64 {
        self.renders
    }
}

/// A supplied program must implement `kind` and declare every documented
/// parameter with the documented kind.
fn check_program(kind: FilterKind, program: &ShaderProgram) -> Result<()> {
    let mismatch = |reason: String| -> Error {
        ConstructionError::ProgramMismatch {
            expected: kind,
            found: program.kind(),
            reason,
        }
        .into()
    };

    if program.kind() != kind {
        return Err(mismatch("program implements a different kernel".to_string()));
    }
    for decl in kind.schema().iter() {
        match program.schema().get(decl.name) {
            None => return Err(mismatch(format!("schema lacks `{}`", decl.name))),
            Some(found) if found.kind != decl.kind => {
                return Err(mismatch(format!(
                    "`{}` is {:?}, expected {:?}",
                    decl.name, found.kind, decl.kind
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}
