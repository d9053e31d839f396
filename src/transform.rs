//! 3MF 3x4 affine transform math
//!
//! 3MF stores affine transforms as 12 whitespace-separated values in
//! row-major order: `[m00 m01 m02 m10 m11 m12 m20 m21 m22 tx ty tz]`.
//! The first 9 values form the 3x3 linear (rotation/scale) part, the last 3
//! are translation. A point transforms as `p' = L * p + t`.
//!
//! Parsing is deliberately lenient (the slicer ecosystem emits both 12- and
//! 16-value strings), formatting is strict: six decimals, trailing zeros
//! trimmed, and a decimal point always present so downstream tools that
//! distinguish "2" from "2.0" see a float.

use crate::aabb::Aabb;
use nalgebra::{Matrix3, Vector3};

/// Size of a 3MF transform matrix (3x4 affine, row-major)
pub const TRANSFORM_MATRIX_SIZE: usize = 12;

/// Identity 3x4 transform values
pub const IDENTITY_3X4: [f64; 12] = [
    1.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, //
    0.0, 0.0, 1.0, //
    0.0, 0.0, 0.0,
];

/// A 3MF 3x4 affine transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3x4(pub [f64; 12]);

impl Default for Transform3x4 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform3x4 {
    /// The identity transform
    pub fn identity() -> Self {
        Self(IDENTITY_3X4)
    }

    /// A pure translation transform
    pub fn translation_xyz(tx: f64, ty: f64, tz: f64) -> Self {
        let mut values = IDENTITY_3X4;
        values[9] = tx;
        values[10] = ty;
        values[11] = tz;
        Self(values)
    }

    /// Parse a 3MF transform attribute string
    ///
    /// Accepts 12 values (3MF core) or 16 values (4x4 row-major, as emitted by
    /// some internal tool paths); anything else returns `None`. Callers that
    /// want the 3MF default behavior use [`Transform3x4::parse_or_identity`].
    pub fn parse(transform_str: &str) -> Option<Self> {
        let values: Vec<f64> = transform_str
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<std::result::Result<_, _>>()
            .ok()?;

        match values.len() {
            12 => {
                let mut out = [0.0; 12];
                out.copy_from_slice(&values);
                Some(Self(out))
            }
            // 4x4 with the translation row last, the same layout
            // [`Transform3x4::to_4x4`] emits
            16 => Some(Self([
                values[0], values[1], values[2], //
                values[4], values[5], values[6], //
                values[8], values[9], values[10], //
                values[12], values[13], values[14],
            ])),
            _ => None,
        }
    }

    /// Parse a transform attribute, defaulting to identity when absent or malformed
    ///
    /// 3MF semantics: a missing `transform` attribute means identity. Malformed
    /// strings also fold to identity here; strict validation happens at parse
    /// time in [`crate::parser`], this lenient form backs layout/preview paths.
    pub fn parse_or_identity(transform_str: Option<&str>) -> Self {
        transform_str
            .and_then(Self::parse)
            .unwrap_or_else(Self::identity)
    }

    /// Format as a 3MF transform attribute value
    pub fn format(&self) -> String {
        let parts: Vec<String> = self.0.iter().map(|&v| format_component(v)).collect();
        parts.join(" ")
    }

    /// The 3x3 linear (rotation/scale) part
    pub fn linear(&self) -> Matrix3<f64> {
        let m = &self.0;
        Matrix3::new(
            m[0], m[1], m[2], //
            m[3], m[4], m[5], //
            m[6], m[7], m[8],
        )
    }

    /// The translation part
    pub fn translation(&self) -> Vector3<f64> {
        Vector3::new(self.0[9], self.0[10], self.0[11])
    }

    /// Translation as a plain array (layout/JSON convenience)
    pub fn translation_array(&self) -> [f64; 3] {
        [self.0[9], self.0[10], self.0[11]]
    }

    /// Rebuild from linear and translation parts
    pub fn from_parts(linear: &Matrix3<f64>, translation: &Vector3<f64>) -> Self {
        Self([
            linear[(0, 0)],
            linear[(0, 1)],
            linear[(0, 2)],
            linear[(1, 0)],
            linear[(1, 1)],
            linear[(1, 2)],
            linear[(2, 0)],
            linear[(2, 1)],
            linear[(2, 2)],
            translation.x,
            translation.y,
            translation.z,
        ])
    }

    /// Replace the translation part
    pub fn with_translation(&self, tx: f64, ty: f64, tz: f64) -> Self {
        let mut values = self.0;
        values[9] = tx;
        values[10] = ty;
        values[11] = tz;
        Self(values)
    }

    /// Compose `self ∘ other`: apply `other` first, then `self`
    pub fn compose(&self, other: &Self) -> Self {
        let la = self.linear();
        let lb = other.linear();
        let ta = self.translation();
        let tb = other.translation();
        Self::from_parts(&(la * lb), &(la * tb + ta))
    }

    /// Rotation about the Z axis by `degrees`
    pub fn rotation_z(degrees: f64) -> Self {
        let rad = degrees.to_radians();
        let (s, c) = rad.sin_cos();
        Self([
            c, -s, 0.0, //
            s, c, 0.0, //
            0.0, 0.0, 1.0, //
            0.0, 0.0, 0.0,
        ])
    }

    /// Transform a point
    pub fn apply_point(&self, p: [f64; 3]) -> [f64; 3] {
        let out = self.linear() * Vector3::new(p[0], p[1], p[2]) + self.translation();
        [out.x, out.y, out.z]
    }

    /// Transform an AABB and return the enclosing AABB of its 8 corners
    ///
    /// Uses all 8 corners through the full affine, not the translation-only
    /// shortcut: with rotation or scale present, the footprint grows beyond
    /// what shifting min/max would report.
    pub fn apply_aabb(&self, aabb: &Aabb) -> Aabb {
        let mut out = Aabb::empty();
        for &x in &[aabb.min[0], aabb.max[0]] {
            for &y in &[aabb.min[1], aabb.max[1]] {
                for &z in &[aabb.min[2], aabb.max[2]] {
                    out.expand_point(self.apply_point([x, y, z]));
                }
            }
        }
        out
    }

    /// Scale the linear part uniformly, leaving translation in place
    pub fn scale_linear(&self, factor: f64) -> Self {
        let mut values = self.0;
        for v in values.iter_mut().take(9) {
            *v *= factor;
        }
        Self(values)
    }

    /// Scale the translation part uniformly, leaving the linear part in place
    ///
    /// This is what grows assembly-internal offsets proportionally when a
    /// model is scaled: component geometry scales through the parent's linear
    /// part, but component placement offsets live in translation columns.
    pub fn scale_translation(&self, factor: f64) -> Self {
        let mut values = self.0;
        for v in values.iter_mut().skip(9) {
            *v *= factor;
        }
        Self(values)
    }

    /// Best-effort planar Z rotation estimate in degrees
    pub fn rotation_z_estimate_deg(&self) -> f64 {
        let angle = self.0[3].atan2(self.0[0]).to_degrees();
        if angle.abs() < 1e-9 { 0.0 } else { angle }
    }

    /// Whether all 12 values are finite
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// Expand to 16 values with the translation row last
    ///
    /// This is the 3MF 4x3 layout padded with a `0 0 0 1` column, which is
    /// also the column-major serialization viewer matrix types load
    /// directly (translation at indices 12..15).
    pub fn to_4x4(&self) -> [f64; 16] {
        let m = &self.0;
        [
            m[0], m[1], m[2], 0.0, //
            m[3], m[4], m[5], 0.0, //
            m[6], m[7], m[8], 0.0, //
            m[9], m[10], m[11], 1.0,
        ]
    }
}

/// Format one matrix component the way slicer tooling expects
fn format_component(v: f64) -> String {
    let v = if v.abs() < 1e-10 { 0.0 } else { v };
    let mut s = format!("{:.6}", v);
    if s.contains('.') {
        s = s.trim_end_matches('0').trim_end_matches('.').to_string();
    }
    if s.is_empty() || s == "-" {
        s = "0".to_string();
    }
    if !s.contains('.') && !s.to_ascii_lowercase().contains('e') {
        s.push_str(".0");
    }
    s
}
