use serde::{Deserialize, Serialize};

use crate::error::TextLayerError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix(pub [f32; 6]);

impl Matrix {
    pub const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    pub fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self([a, b, c, d, e, f])
    }

    pub fn translation(tx: f32, ty: f32) -> Self {
        Self([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// Composes `self ∘ other`: `other` is applied first, then `self`.
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a1 * a2 + c1 * b2,
            b1 * a2 + d1 * b2,
            a1 * c2 + c1 * d2,
            b1 * c2 + d1 * d2,
            a1 * e2 + c1 * f2 + e1,
            b1 * e2 + d1 * f2 + f1,
        ])
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    pub fn inverse(&self) -> Option<Matrix> {
        let [a, b, c, d, e, f] = self.0;
        let det = a * d - b * c;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        Some(Matrix([
            d / det,
            -b / det,
            -c / det,
            a / det,
            (c * f - d * e) / det,
            (b * e - a * f) / det,
        ]))
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|value| value.is_finite())
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GlyphPlacement {
    pub x: f32,
    /// Top edge of the run's box (baseline moved up by `font_size`).
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    /// Radians, measured in screen space.
    pub angle: f32,
    pub font_size: f32,
}

pub fn project(run: &Matrix, viewport: &Matrix) -> GlyphPlacement {
    let [m0, m1, m2, m3, m4, m5] = viewport.multiply(run).0;
    let font_size = m2.hypot(m3);
    GlyphPlacement {
        x: m4,
        y: m5 - font_size,
        scale_x: m0.hypot(m1),
        scale_y: font_size,
        angle: m1.atan2(m0),
        font_size,
    }
}

pub fn normalize_rotation(rotation: i32) -> Result<u16, TextLayerError> {
    if rotation % 90 != 0 {
        return Err(TextLayerError::InvalidRotation(rotation));
    }
    Ok(rotation.rem_euclid(360) as u16)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub view_box: [f32; 4],
    pub scale: f32,
    pub rotation: u16,
    /// Screen width in pixels; swapped with the height for 90/270.
    pub width: f32,
    pub height: f32,
    pub transform: Matrix,
}

impl Viewport {
    pub fn new(view_box: [f32; 4], scale: f32, rotation: i32) -> Result<Self, TextLayerError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(TextLayerError::InvalidScale(scale));
        }
        let rotation = normalize_rotation(rotation)?;

        // Unit rotation with the y flip folded in.
        let (ra, rb, rc, rd) = match rotation {
            90 => (0.0, 1.0, 1.0, 0.0),
            180 => (-1.0, 0.0, 0.0, 1.0),
            270 => (0.0, -1.0, -1.0, 0.0),
            _ => (1.0, 0.0, 0.0, -1.0),
        };

        let [x0, y0, x1, y1] = view_box;
        let center_x = (x0 + x1) / 2.0;
        let center_y = (y0 + y1) / 2.0;

        let (offset_x, offset_y, width, height) = if ra == 0.0 {
            (
                (center_y - y0).abs() * scale,
                (center_x - x0).abs() * scale,
                (y1 - y0).abs() * scale,
                (x1 - x0).abs() * scale,
            )
        } else {
            (
                (center_x - x0).abs() * scale,
                (center_y - y0).abs() * scale,
                (x1 - x0).abs() * scale,
                (y1 - y0).abs() * scale,
            )
        };

        let transform = Matrix([
            ra * scale,
            rb * scale,
            rc * scale,
            rd * scale,
            offset_x - ra * scale * center_x - rc * scale * center_y,
            offset_y - rb * scale * center_x - rd * scale * center_y,
        ]);

        Ok(Self {
            view_box,
            scale,
            rotation,
            width,
            height,
            transform,
        })
    }

    pub fn to_screen(&self, x: f32, y: f32) -> (f32, f32) {
        self.transform.apply(x, y)
    }

    pub fn to_page(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        self.transform.inverse().map(|inverse| inverse.apply(x, y))
    }

    pub fn project(&self, run: &Matrix) -> GlyphPlacement {
        project(run, &self.transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < EPS
    }

    #[test]
    fn multiply_applies_right_operand_first() {
        let scale = Matrix::new(2.0, 0.0, 0.0, 2.0, 0.0, 0.0);
        let shift = Matrix::translation(10.0, 5.0);
        let (x, y) = scale.multiply(&shift).apply(1.0, 1.0);
        assert!(close(x, 22.0));
        assert!(close(y, 12.0));
    }

    #[test]
    fn inverse_round_trips_points() {
        let matrix = Matrix::new(0.0, 1.5, 1.5, 0.0, 20.0, -4.0);
        let inverse = matrix.inverse().unwrap();
        let (x, y) = matrix.apply(3.0, 7.0);
        let (bx, by) = inverse.apply(x, y);
        assert!(close(bx, 3.0));
        assert!(close(by, 7.0));
        assert!(Matrix::new(1.0, 2.0, 2.0, 4.0, 0.0, 0.0).inverse().is_none());
    }

    #[test]
    fn project_uses_translation_of_composed_matrix() {
        let viewport = Viewport::new([0.0, 0.0, 612.0, 792.0], 1.5, 0).unwrap();
        let run = Matrix::new(12.0, 0.0, 0.0, 12.0, 72.0, 700.0);
        let composed = viewport.transform.multiply(&run);
        let placement = viewport.project(&run);

        assert!(close(placement.x, composed.0[4]));
        assert!(close(placement.y, composed.0[5] - placement.font_size));
        assert!(close(placement.font_size, 18.0));
        assert!(close(placement.scale_x, 18.0));
        assert!(close(placement.angle, 0.0));
        assert!(close(placement.x, 108.0));
        assert!(close(placement.y, (792.0 - 700.0) * 1.5 - 18.0));
    }

    #[test]
    fn project_is_deterministic() {
        let viewport = Viewport::new([0.0, 0.0, 595.0, 842.0], 1.25, 90).unwrap();
        let run = Matrix::new(9.5, 0.3, -0.3, 9.5, 33.3, 512.7);
        let first = viewport.project(&run);
        let second = viewport.project(&run);
        assert_eq!(first.x.to_bits(), second.x.to_bits());
        assert_eq!(first.y.to_bits(), second.y.to_bits());
        assert_eq!(first.angle.to_bits(), second.angle.to_bits());
        assert_eq!(first.font_size.to_bits(), second.font_size.to_bits());
    }

    #[test]
    fn rotated_viewport_swaps_dimensions() {
        let viewport = Viewport::new([0.0, 0.0, 600.0, 800.0], 1.0, 90).unwrap();
        assert!(close(viewport.width, 800.0));
        assert!(close(viewport.height, 600.0));

        let (x, y) = viewport.to_screen(0.0, 0.0);
        assert!(close(x, 0.0));
        assert!(close(y, 0.0));

        let (x, y) = viewport.to_screen(600.0, 800.0);
        assert!(close(x, 800.0));
        assert!(close(y, 600.0));
    }

    #[test]
    fn upright_viewport_flips_y_axis() {
        let viewport = Viewport::new([0.0, 0.0, 600.0, 800.0], 2.0, 0).unwrap();
        let (x, y) = viewport.to_screen(100.0, 800.0);
        assert!(close(x, 200.0));
        assert!(close(y, 0.0));

        let (px, py) = viewport.to_page(200.0, 1600.0).unwrap();
        assert!(close(px, 100.0));
        assert!(close(py, 0.0));
    }

    #[test]
    fn half_turn_keeps_page_inside_screen() {
        let viewport = Viewport::new([0.0, 0.0, 600.0, 800.0], 1.0, 180).unwrap();
        let (x, y) = viewport.to_screen(0.0, 0.0);
        assert!(close(x, 600.0));
        assert!(close(y, 0.0));
    }

    #[test]
    fn rotation_is_normalized_and_validated() {
        assert_eq!(normalize_rotation(-90).unwrap(), 270);
        assert_eq!(normalize_rotation(450).unwrap(), 90);
        assert!(matches!(
            normalize_rotation(45),
            Err(TextLayerError::InvalidRotation(45))
        ));
        assert!(matches!(
            Viewport::new([0.0, 0.0, 1.0, 1.0], 0.0, 0),
            Err(TextLayerError::InvalidScale(_))
        ));
    }
}
