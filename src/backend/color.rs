//! sRGB <-> CIELAB conversion used by the hue-shift kernel.
//!
//! Mirrors `shaders/hue_shift.wgsl` so both backends agree.

use glam::{Mat3, Vec3};

/// D65 reference white, XYZ scaled to Y = 100.
const WHITE: Vec3 = Vec3::new(95.047, 100.0, 108.883);

const LAB_EPSILON: f32 = 0.008856;
const LAB_KAPPA: f32 = 7.787;
const LAB_OFFSET: f32 = 16.0 / 116.0;
/// Cube root of `LAB_EPSILON`, the inverse breakpoint.
const LAB_INV_EPSILON: f32 = 0.206897;

// glam matrices are column-major: each Vec3 below is a column.
const RGB_TO_XYZ: Mat3 = Mat3::from_cols(
    Vec3::new(0.4124, 0.2126, 0.0193),
    Vec3::new(0.3576, 0.7152, 0.1192),
    Vec3::new(0.1805, 0.0722, 0.9505),
);

const XYZ_TO_RGB: Mat3 = Mat3::from_cols(
    Vec3::new(3.2406, -0.9689, 0.0557),
    Vec3::new(-1.5372, 1.8758, -0.2040),
    Vec3::new(-0.4986, 0.0415, 1.0570),
);

pub(crate) fn srgb_to_linear(c: f32) -> f32 {
    if c > 0.04045 {
        ((c + 0.055) / 1.055).powf(2.4)
    } else {
        c / 12.92
    }
}

pub(crate) fn linear_to_srgb(c: f32) -> f32 {
    if c > 0.0031308 {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    } else {
        12.92 * c
    }
}

fn lab_f(t: f32) -> f32 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        LAB_KAPPA * t + LAB_OFFSET
    }
}

fn lab_f_inv(t: f32) -> f32 {
    if t > LAB_INV_EPSILON {
        t * t * t
    } else {
        (t - LAB_OFFSET) / LAB_KAPPA
    }
}

/// Display RGB in `[0, 1]` to CIELAB (L in `[0, 100]`).
pub(crate) fn rgb_to_lab(rgb: Vec3) -> Vec3 {
    let linear = Vec3::new(
        srgb_to_linear(rgb.x),
        srgb_to_linear(rgb.y),
        srgb_to_linear(rgb.z),
    );
    let xyz = RGB_TO_XYZ * linear * 100.0;
    let n = xyz / WHITE;
    let f = Vec3::new(lab_f(n.x), lab_f(n.y), lab_f(n.z));
    Vec3::new(116.0 * f.y - 16.0, 500.0 * (f.x - f.y), 200.0 * (f.y - f.z))
}

/// CIELAB back to display RGB. Out-of-gamut results are not clamped.
pub(crate) fn lab_to_rgb(lab: Vec3) -> Vec3 {
    let fy = (lab.x + 16.0) / 116.0;
    let fx = lab.y / 500.0 + fy;
    let fz = fy - lab.z / 200.0;
    let xyz = WHITE * Vec3::new(lab_f_inv(fx), lab_f_inv(fy), lab_f_inv(fz));
    let linear = XYZ_TO_RGB * (xyz / 100.0);
    Vec3::new(
        linear_to_srgb(linear.x),
        linear_to_srgb(linear.y),
        linear_to_srgb(linear.z),
    )
}

/// Rotates the chroma angle of `rgb` by `degrees` around the neutral axis.
pub(crate) fn shift_hue(rgb: Vec3, degrees: f32) -> Vec3 {
    let lab = rgb_to_lab(rgb);
    let chroma = lab.y.hypot(lab.z);
    let hue = lab.z.atan2(lab.y) + degrees.to_radians();
    lab_to_rgb(Vec3::new(lab.x, hue.cos() * chroma, hue.sin() * chroma))
}
