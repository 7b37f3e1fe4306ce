//! Shader programs and their named-parameter ("uniform") schemas.
//!
//! A [`ShaderProgram`] is an opaque compiled kernel supplied by a rendering
//! backend. The engine never compiles one itself: it only reads the program's
//! [`ParameterSchema`] to validate the [`ParameterSet`] a node binds with it.
//!
//! # Parameter names
//!
//! Names carry the same meaning across every kernel, which is what lets value
//! rules (odd `kernel_size`, positive `sigma`, ...) live in one place:
//!
//! | Name | Kind | Meaning |
//! |------|------|---------|
//! | `image`, `image2` | texture | primary and secondary inputs |
//! | `resolution` | vec2 | render target size in pixels, bound by the node |
//! | `sigma` | float | gaussian standard deviation, > 0 with `2 * sigma²` a normal `f32` |
//! | `kernel_size` | int | window size, odd, in `1..=`[`MAX_KERNEL_SIZE`] |
//! | `interpolation` | int | see [`Interpolation`] |
//! | `operation` | int | see [`ArithmeticOp`] |

use std::collections::BTreeMap;
use std::fmt;

use glam::Vec2;

use crate::error::{Error, Result};
use crate::filter_graph::TextureId;

/// One entry of the filter catalog.
///
/// Each kind names both a node variant and the kernel its program implements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterKind {
    Scaling,
    ImageArithmetic,
    GaussianBlur,
    SeparableGaussianBlur,
    Laplacian,
    LaplacianOfGaussian,
    Median,
    HueShift,
}

impl FilterKind {
    /// Every catalog entry, in declaration order.
    pub const ALL: [FilterKind; 8] = [
        FilterKind::Scaling,
        FilterKind::ImageArithmetic,
        FilterKind::GaussianBlur,
        FilterKind::SeparableGaussianBlur,
        FilterKind::Laplacian,
        FilterKind::LaplacianOfGaussian,
        FilterKind::Median,
        FilterKind::HueShift,
    ];

    /// Short label used for GPU debug labels and logs.
    pub fn label(self) -> &'static str {
        match self {
            FilterKind::Scaling => "scaling",
            FilterKind::ImageArithmetic => "image_arithmetic",
            FilterKind::GaussianBlur => "gaussian_blur",
            FilterKind::SeparableGaussianBlur => "separable_gaussian_blur",
            FilterKind::Laplacian => "laplacian",
            FilterKind::LaplacianOfGaussian => "laplacian_of_gaussian",
            FilterKind::Median => "median",
            FilterKind::HueShift => "hue_shift",
        }
    }

    /// Texture inputs the kernel samples, primary first.
    pub fn inputs(self) -> &'static [&'static str] {
        match self {
            FilterKind::ImageArithmetic => &["image", "image2"],
            _ => &["image"],
        }
    }

    /// The documented parameter schema, with catalog defaults.
    ///
    /// Scalar parameters are listed in the order kernels lay them out in
    /// their uniform block; texture parameters carry no default.
    pub fn schema(self) -> ParameterSchema {
        use ParameterKind as K;
        use ParameterValue as V;

        let mut schema = ParameterSchema::new()
            .texture("image")
            .param("resolution", K::Vec2, V::Vec2(Vec2::ONE));

        schema = match self {
            FilterKind::Scaling => schema
                .param("scale_x", K::Float, V::Float(1.0))
                .param("scale_y", K::Float, V::Float(1.0))
                .param("interpolation", K::Int, V::Int(Interpolation::Bilinear as i32)),
            FilterKind::ImageArithmetic => schema
                .texture("image2")
                .param("scale", K::Float, V::Float(1.0))
                .param("center_x", K::Float, V::Float(0.0))
                .param("center_y", K::Float, V::Float(0.0))
                .param("operation", K::Int, V::Int(ArithmeticOp::Add as i32))
                .param("scale_factor", K::Float, V::Float(1.0))
                .param("offset", K::Float, V::Float(0.0)),
            FilterKind::GaussianBlur => schema
                .param("sigma", K::Float, V::Float(1.0))
                .param("kernel_size", K::Int, V::Int(1)),
            FilterKind::SeparableGaussianBlur => schema
                .param("sigma", K::Float, V::Float(1.0))
                .param("kernel_size", K::Int, V::Int(1))
                .param("first_pass", K::Bool, V::Bool(false)),
            FilterKind::Laplacian => schema.param("norm", K::Bool, V::Bool(false)),
            FilterKind::LaplacianOfGaussian => schema
                .param("sigma", K::Float, V::Float(1.0))
                .param("kernel_size", K::Int, V::Int(1))
                .param("norm", K::Bool, V::Bool(false)),
            FilterKind::Median => schema.param("kernel_size", K::Int, V::Int(1)),
            FilterKind::HueShift => schema.param("hue_shift", K::Float, V::Float(0.0)),
        };
        schema
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sampling policy for [`FilterKind::Scaling`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum Interpolation {
    /// Linear filtering between the four nearest texels.
    Bilinear = 0,
    /// Nearest texel, clamped to the edge.
    Nearest = 1,
    /// Nearest texel without edge extension: samples outside the image are
    /// transparent black.
    None = 2,
}

impl Interpolation {
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(Interpolation::Bilinear),
            1 => Some(Interpolation::Nearest),
            2 => Some(Interpolation::None),
            _ => None,
        }
    }
}

impl From<Interpolation> for ParameterValue {
    fn from(value: Interpolation) -> Self {
        ParameterValue::Int(value as i32)
    }
}

/// Elementwise operation for [`FilterKind::ImageArithmetic`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ArithmeticOp {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
}

impl ArithmeticOp {
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(ArithmeticOp::Add),
            1 => Some(ArithmeticOp::Sub),
            2 => Some(ArithmeticOp::Mul),
            3 => Some(ArithmeticOp::Div),
            _ => None,
        }
    }

    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            ArithmeticOp::Add => a + b,
            ArithmeticOp::Sub => a - b,
            ArithmeticOp::Mul => a * b,
            ArithmeticOp::Div => a / b,
        }
    }
}

impl From<ArithmeticOp> for ParameterValue {
    fn from(value: ArithmeticOp) -> Self {
        ParameterValue::Int(value as i32)
    }
}

/// The type of a schema entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterKind {
    Float,
    Int,
    Bool,
    Vec2,
    Texture,
}

/// A typed parameter value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParameterValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2(Vec2),
    Texture(TextureId),
}

impl ParameterValue {
    pub fn kind(&self) -> ParameterKind {
        match self {
            ParameterValue::Float(_) => ParameterKind::Float,
            ParameterValue::Int(_) => ParameterKind::Int,
            ParameterValue::Bool(_) => ParameterKind::Bool,
            ParameterValue::Vec2(_) => ParameterKind::Vec2,
            ParameterValue::Texture(_) => ParameterKind::Texture,
        }
    }
}

impl From<f32> for ParameterValue {
    fn from(value: f32) -> Self {
        ParameterValue::Float(value)
    }
}

/// Narrows to `f32`, so unsuffixed float literals can be passed directly.
impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Float(value as f32)
    }
}

impl From<i32> for ParameterValue {
    fn from(value: i32) -> Self {
        ParameterValue::Int(value)
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        ParameterValue::Bool(value)
    }
}

impl From<Vec2> for ParameterValue {
    fn from(value: Vec2) -> Self {
        ParameterValue::Vec2(value)
    }
}

impl From<TextureId> for ParameterValue {
    fn from(value: TextureId) -> Self {
        ParameterValue::Texture(value)
    }
}

/// One declared parameter of a program.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterDecl {
    pub name: &'static str,
    pub kind: ParameterKind,
    /// `None` for parameters that must be supplied (textures).
    pub default: Option<ParameterValue>,
}

/// Ordered mapping of parameter name to kind and default.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterSchema {
    decls: Vec<ParameterDecl>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self { decls: Vec::new() }
    }

    /// Declares a parameter with a default value.
    pub fn param(mut self, name: &'static str, kind: ParameterKind, default: ParameterValue) -> Self {
        self.decls.push(ParameterDecl {
            name,
            kind,
            default: Some(default),
        });
        self
    }

    /// Declares a texture input.
    pub fn texture(mut self, name: &'static str) -> Self {
        self.decls.push(ParameterDecl {
            name,
            kind: ParameterKind::Texture,
            default: None,
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDecl> {
        self.decls.iter().find(|d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Declarations in layout order.
    pub fn iter(&self) -> impl Iterator<Item = &ParameterDecl> {
        self.decls.iter()
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// A parameter set holding every declared default.
    pub fn defaults(&self) -> ParameterSet {
        let mut set = ParameterSet::new();
        for decl in &self.decls {
            if let Some(value) = decl.default {
                set.insert(decl.name, value);
            }
        }
        set
    }

    /// Checks that `name` is declared with the kind of `value` and that the
    /// value is in range for that name.
    pub fn validate(&self, name: &str, value: &ParameterValue) -> Result<()> {
        let decl = self
            .get(name)
            .ok_or_else(|| Error::invalid_parameter(name, "not declared by the program schema"))?;
        if decl.kind != value.kind() {
            return Err(Error::invalid_parameter(
                name,
                format!("expected {:?}, got {:?}", decl.kind, value.kind()),
            ));
        }
        validate_range(name, value)
    }
}

/// Largest accepted `kernel_size`. Window cost is quadratic in it.
pub const MAX_KERNEL_SIZE: i32 = 63;

fn validate_range(name: &str, value: &ParameterValue) -> Result<()> {
    match (name, value) {
        ("kernel_size", ParameterValue::Int(size)) => {
            if *size <= 0 {
                return Err(Error::invalid_parameter(name, format!("{size} is not positive")));
            }
            if size % 2 == 0 {
                return Err(Error::invalid_parameter(name, format!("{size} is not odd")));
            }
            if *size > MAX_KERNEL_SIZE {
                return Err(Error::invalid_parameter(
                    name,
                    format!("{size} exceeds the maximum of {MAX_KERNEL_SIZE}"),
                ));
            }
        }
        ("sigma", ParameterValue::Float(sigma)) => {
            if !sigma.is_finite() || *sigma <= 0.0 {
                return Err(Error::invalid_parameter(name, format!("{sigma} is not positive")));
            }
            // Kernels divide by 2 * sigma^2.
            if !(2.0 * sigma * sigma).is_normal() {
                return Err(Error::invalid_parameter(
                    name,
                    format!("{sigma} squared is out of f32 range"),
                ));
            }
        }
        ("operation", ParameterValue::Int(op)) => {
            if ArithmeticOp::from_index(*op).is_none() {
                return Err(Error::invalid_parameter(name, format!("unknown operation {op}")));
            }
        }
        ("interpolation", ParameterValue::Int(mode)) => {
            if Interpolation::from_index(*mode).is_none() {
                return Err(Error::invalid_parameter(name, format!("unknown mode {mode}")));
            }
        }
        _ => {}
    }
    Ok(())
}

/// Mapping from parameter name to value.
///
/// Used both for caller overrides and for a node's effective parameters.
/// Inserting an existing name replaces the whole value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterSet {
    values: BTreeMap<String, ParameterValue>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl Into<ParameterValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<ParameterValue>) -> Option<ParameterValue> {
        self.values.insert(name.to_string(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Overlays `other` on top of `self`; values in `other` win.
    pub fn merged(&self, other: &ParameterSet) -> ParameterSet {
        let mut out = self.clone();
        for (name, value) in other.iter() {
            out.insert(name, *value);
        }
        out
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        match self.get(name)? {
            ParameterValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i32> {
        match self.get(name)? {
            ParameterValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            ParameterValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn vec2(&self, name: &str) -> Option<Vec2> {
        match self.get(name)? {
            ParameterValue::Vec2(v) => Some(*v),
            _ => None,
        }
    }

    pub fn texture(&self, name: &str) -> Option<TextureId> {
        match self.get(name)? {
            ParameterValue::Texture(v) => Some(*v),
            _ => None,
        }
    }

    /// Every texture this set references, in name order.
    pub fn textures(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.values.values().filter_map(|v| match v {
            ParameterValue::Texture(id) => Some(*id),
            _ => None,
        })
    }
}

/// A programmable stage of a compiled program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderStage {
    pub entry_point: String,
}

impl ShaderStage {
    pub fn new(entry_point: impl Into<String>) -> Self {
        Self {
            entry_point: entry_point.into(),
        }
    }
}

/// An opaque compiled GPU kernel plus its parameter schema.
///
/// Programs are immutable once supplied and are shared read-only between all
/// nodes using the same kernel (backends hand them out as `Arc`s).
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderProgram {
    kind: FilterKind,
    label: String,
    vertex: ShaderStage,
    fragment: ShaderStage,
    schema: ParameterSchema,
}

impl ShaderProgram {
    pub fn new(
        kind: FilterKind,
        label: impl Into<String>,
        vertex: ShaderStage,
        fragment: ShaderStage,
        schema: ParameterSchema,
    ) -> Self {
        Self {
            kind,
            label: label.into(),
            vertex,
            fragment,
            schema,
        }
    }

    /// A program for `kind` with the documented schema and `vs`/`fs` entry
    /// points.
    pub fn for_kind(kind: FilterKind) -> Self {
        Self::new(
            kind,
            kind.label(),
            ShaderStage::new("vs"),
            ShaderStage::new("fs"),
            kind.schema(),
        )
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn vertex_stage(&self) -> &ShaderStage {
        &self.vertex
    }

    pub fn fragment_stage(&self) -> &ShaderStage {
        &self.fragment
    }

    pub fn schema(&self) -> &ParameterSchema {
        &self.schema
    }
}
