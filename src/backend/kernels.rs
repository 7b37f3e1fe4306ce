//! CPU evaluation of the catalog kernels.
//!
//! Each kernel is resolved once per draw from the bound [`ParameterSet`] and
//! then evaluated per output pixel at its texel-center coordinate. Sampling
//! follows the WGSL kernels: convolution windows step by one output texel
//! (`1 / resolution`) and read the nearest input texel, clamped to the edge.

use glam::{IVec2, Mat2, Vec2, Vec3, Vec4, Vec4Swizzles};
use image::RgbaImage;

use super::color;
use crate::shader::{ArithmeticOp, FilterKind, Interpolation, MAX_KERNEL_SIZE, ParameterSet};

/// Read-only view of a texture with GPU-style addressing.
#[derive(Clone, Copy)]
pub(crate) struct Sampler<'a> {
    image: &'a RgbaImage,
}

impl<'a> Sampler<'a> {
    pub(crate) fn new(image: &'a RgbaImage) -> Self {
        Self { image }
    }

    fn texel(&self, x: i64, y: i64) -> Vec4 {
        let (w, h) = self.image.dimensions();
        let x = x.clamp(0, w as i64 - 1) as u32;
        let y = y.clamp(0, h as i64 - 1) as u32;
        let p = self.image.get_pixel(x, y).0;
        Vec4::new(p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32) / 255.0
    }

    fn texel_coord(&self, uv: Vec2) -> (i64, i64) {
        let (w, h) = self.image.dimensions();
        (
            (uv.x * w as f32).floor() as i64,
            (uv.y * h as f32).floor() as i64,
        )
    }

    pub(crate) fn nearest(&self, uv: Vec2) -> Vec4 {
        let (x, y) = self.texel_coord(uv);
        self.texel(x, y)
    }

    /// Nearest texel, transparent black outside `[0, 1)`.
    pub(crate) fn nearest_or_border(&self, uv: Vec2) -> Vec4 {
        if uv.x < 0.0 || uv.y < 0.0 || uv.x >= 1.0 || uv.y >= 1.0 {
            return Vec4::ZERO;
        }
        self.nearest(uv)
    }

    pub(crate) fn bilinear(&self, uv: Vec2) -> Vec4 {
        let (w, h) = self.image.dimensions();
        let x = uv.x * w as f32 - 0.5;
        let y = uv.y * h as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);
        let top = self.texel(x0, y0).lerp(self.texel(x0 + 1, y0), fx);
        let bottom = self.texel(x0, y0 + 1).lerp(self.texel(x0 + 1, y0 + 1), fx);
        top.lerp(bottom, fy)
    }
}

/// 3x3 Laplacian, indexed `[i + 1][j + 1]`.
const LAPLACIAN: [[f32; 3]; 3] = [[-1.0, -1.0, -1.0], [-1.0, 8.0, -1.0], [-1.0, -1.0, -1.0]];

/// Weight sums closer to zero than this are not divided by.
const MIN_WEIGHT_SUM: f32 = 1e-6;

/// A kernel with its parameters resolved for one draw.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Kernel {
    Scaling {
        scale: Mat2,
        interpolation: Interpolation,
    },
    Arithmetic {
        scale: Mat2,
        center: Vec2,
        op: ArithmeticOp,
        scale_factor: f32,
        offset: f32,
    },
    /// Direct 2-D convolution with pre-normalized weights.
    Convolution {
        taps: Vec<(IVec2, f32)>,
        norm: bool,
    },
    Laplacian {
        norm: bool,
    },
    Median {
        radius: i32,
    },
    HueShift {
        degrees: f32,
    },
}

impl Kernel {
    pub(crate) fn resolve(kind: FilterKind, params: &ParameterSet) -> Self {
        let sigma = params.float("sigma").unwrap_or(1.0);
        let radius = params.int("kernel_size").unwrap_or(1).clamp(1, MAX_KERNEL_SIZE) / 2;
        let norm = params.bool("norm").unwrap_or(false);

        match kind {
            FilterKind::Scaling => Kernel::Scaling {
                scale: Mat2::from_diagonal(Vec2::new(
                    params.float("scale_x").unwrap_or(1.0),
                    params.float("scale_y").unwrap_or(1.0),
                )),
                interpolation: params
                    .int("interpolation")
                    .and_then(Interpolation::from_index)
                    .unwrap_or(Interpolation::Bilinear),
            },
            FilterKind::ImageArithmetic => Kernel::Arithmetic {
                scale: Mat2::from_diagonal(Vec2::splat(params.float("scale").unwrap_or(1.0))),
                center: Vec2::new(
                    params.float("center_x").unwrap_or(0.0),
                    params.float("center_y").unwrap_or(0.0),
                ),
                op: params
                    .int("operation")
                    .and_then(ArithmeticOp::from_index)
                    .unwrap_or(ArithmeticOp::Add),
                scale_factor: params.float("scale_factor").unwrap_or(1.0),
                offset: params.float("offset").unwrap_or(0.0),
            },
            FilterKind::GaussianBlur => Kernel::Convolution {
                taps: gaussian_taps(radius, sigma),
                norm: false,
            },
            FilterKind::SeparableGaussianBlur => {
                let horizontal = params.bool("first_pass").unwrap_or(false);
                let taps = gaussian_weights(radius, sigma)
                    .into_iter()
                    .zip(-radius..=radius)
                    .map(|(w, t)| {
                        let offset = if horizontal { IVec2::new(t, 0) } else { IVec2::new(0, t) };
                        (offset, w)
                    })
                    .collect();
                Kernel::Convolution { taps, norm: false }
            }
            FilterKind::Laplacian => Kernel::Laplacian { norm },
            FilterKind::LaplacianOfGaussian => Kernel::Convolution {
                taps: log_taps(radius, sigma),
                norm,
            },
            FilterKind::Median => Kernel::Median { radius },
            FilterKind::HueShift => Kernel::HueShift {
                degrees: params.float("hue_shift").unwrap_or(0.0),
            },
        }
    }

    /// Evaluates the kernel at texture coordinate `uv`; `cell` is the size of
    /// one output texel in texture space.
    pub(crate) fn shade(&self, image: Sampler, image2: Option<Sampler>, cell: Vec2, uv: Vec2) -> Vec4 {
        match self {
            Kernel::Scaling { scale, interpolation } => {
                let uv = *scale * uv;
                match interpolation {
                    Interpolation::Bilinear => image.bilinear(uv),
                    Interpolation::Nearest => image.nearest(uv),
                    Interpolation::None => image.nearest_or_border(uv),
                }
            }
            Kernel::Arithmetic {
                scale,
                center,
                op,
                scale_factor,
                offset,
            } => {
                let a = image.nearest(uv);
                let b = image2.unwrap_or(image).nearest(*scale * (uv + *center));
                let rgb = Vec3::new(
                    op.apply(a.x, b.x),
                    op.apply(a.y, b.y),
                    op.apply(a.z, b.z),
                ) * *scale_factor
                    + Vec3::splat(*offset);
                rgb.extend(a.w)
            }
            Kernel::Convolution { taps, norm } => {
                let mut acc = Vec4::ZERO;
                for (offset, weight) in taps {
                    acc += *weight * image.nearest(uv + offset.as_vec2() * cell);
                }
                if *norm {
                    acc = normalize_rgb(acc.xyz()).extend(acc.w);
                }
                acc
            }
            Kernel::Laplacian { norm } => {
                let mut rgb = Vec3::ZERO;
                for (i, row) in LAPLACIAN.iter().enumerate() {
                    for (j, weight) in row.iter().enumerate() {
                        let offset = Vec2::new(i as f32 - 1.0, j as f32 - 1.0);
                        rgb += *weight * image.nearest(uv + offset * cell).xyz();
                    }
                }
                if *norm {
                    rgb = normalize_rgb(rgb);
                }
                rgb.extend(1.0)
            }
            Kernel::Median { radius } => {
                let side = (2 * (*radius).max(0) + 1) as usize;
                let window = side.checked_mul(side).unwrap_or(0);
                let mut channels: [Vec<f32>; 3] = std::array::from_fn(|_| Vec::with_capacity(window));
                for j in -radius..=*radius {
                    for i in -radius..=*radius {
                        let sample = image.nearest(uv + Vec2::new(i as f32, j as f32) * cell);
                        channels[0].push(sample.x);
                        channels[1].push(sample.y);
                        channels[2].push(sample.z);
                    }
                }
                let center = image.nearest(uv);
                Vec4::new(
                    median(&mut channels[0]),
                    median(&mut channels[1]),
                    median(&mut channels[2]),
                    center.w,
                )
            }
            Kernel::HueShift { degrees } => {
                let rgb = image.nearest(uv).xyz();
                color::shift_hue(rgb, *degrees).extend(1.0)
            }
        }
    }
}

/// Normalized 1-D gaussian weights for offsets `-radius..=radius`.
pub(crate) fn gaussian_weights(radius: i32, sigma: f32) -> Vec<f32> {
    let two_sigma2 = 2.0 * sigma * sigma;
    let weights: Vec<f32> = (-radius..=radius)
        .map(|t| (-((t * t) as f32) / two_sigma2).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

fn gaussian_taps(radius: i32, sigma: f32) -> Vec<(IVec2, f32)> {
    let two_sigma2 = 2.0 * sigma * sigma;
    normalized_taps(radius, |d2| (-d2 / two_sigma2).exp())
}

fn log_taps(radius: i32, sigma: f32) -> Vec<(IVec2, f32)> {
    let two_sigma2 = 2.0 * sigma * sigma;
    normalized_taps(radius, |d2| (1.0 - d2 / two_sigma2) * (-d2 / two_sigma2).exp())
}

fn normalized_taps(radius: i32, weight: impl Fn(f32) -> f32) -> Vec<(IVec2, f32)> {
    let side = (2 * radius.max(0) + 1) as usize;
    let mut taps = Vec::with_capacity(side.checked_mul(side).unwrap_or(0));
    for i in -radius..=radius {
        for j in -radius..=radius {
            taps.push((IVec2::new(i, j), weight((i * i + j * j) as f32)));
        }
    }
    let sum: f32 = taps.iter().map(|(_, w)| w).sum();
    if sum.abs() > MIN_WEIGHT_SUM {
        for (_, w) in &mut taps {
            *w /= sum;
        }
    }
    taps
}

fn normalize_rgb(rgb: Vec3) -> Vec3 {
    rgb.try_normalize().unwrap_or(Vec3::ZERO)
}

/// Element at index `len / 2` of the sorted window.
fn median(values: &mut [f32]) -> f32 {
    values.sort_by(f32::total_cmp);
    values[values.len() / 2]
}

/// Converts a shaded value to 8-bit storage.
pub(crate) fn quantize(value: Vec4) -> [u8; 4] {
    let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
    [q(value.x), q(value.y), q(value.z), q(value.w)]
}
