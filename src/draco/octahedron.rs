use super::{DracoError, DracoResult};

/// Quantized octahedral normal space: two integers in `[0, max_quantized]`
/// that unfold onto the unit sphere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Octahedron {
    max_quantized: i32,
    center: i32,
    dequantization_scale: f32,
}

impl Octahedron {
    pub fn from_bits(bits: u8) -> DracoResult<Self> {
        if !(2..=30).contains(&bits) {
            return Err(DracoError::Malformed("octahedral quantization bits out of range"));
        }
        let max_quantized = (1i32 << bits) - 1;
        let max_value = max_quantized - 1;
        Ok(Self {
            max_quantized,
            center: max_value / 2,
            dequantization_scale: 2.0 / max_value as f32,
        })
    }

    /// Accepts the odd `2^bits - 1` bound stored with normal predictions.
    pub fn from_max_quantized(max_quantized: i32) -> DracoResult<Self> {
        if max_quantized <= 0 || max_quantized % 2 == 0 {
            return Err(DracoError::Malformed("octahedral bound must be odd"));
        }
        let bits = 32 - max_quantized.leading_zeros();
        Self::from_bits(bits as u8)
    }

    pub fn to_unit_vector(&self, s: i32, t: i32) -> [f32; 3] {
        let mut y = s as f32 * self.dequantization_scale - 1.0;
        let mut z = t as f32 * self.dequantization_scale - 1.0;
        let x = 1.0 - y.abs() - z.abs();
        let offset = (-x).max(0.0);
        y += if y < 0.0 { offset } else { -offset };
        z += if z < 0.0 { offset } else { -offset };

        let norm_squared = x * x + y * y + z * z;
        if norm_squared < 1e-6 {
            return [0.0; 3];
        }
        let d = norm_squared.sqrt().recip();
        [x * d, y * d, z * d]
    }

    fn is_in_diamond(&self, s: i32, t: i32) -> bool {
        s.abs() + t.abs() <= self.center
    }

    fn invert_diamond(&self, s: &mut i32, t: &mut i32) {
        let (sign_s, sign_t) = if *s >= 0 && *t >= 0 {
            (1, 1)
        } else if *s <= 0 && *t <= 0 {
            (-1, -1)
        } else {
            (if *s > 0 { 1 } else { -1 }, if *t > 0 { 1 } else { -1 })
        };
        let corner_s = sign_s * self.center;
        let corner_t = sign_t * self.center;
        let mut us = 2 * *s - corner_s;
        let mut ut = 2 * *t - corner_t;
        if sign_s * sign_t >= 0 {
            let tmp = us;
            us = -ut;
            ut = -tmp;
        } else {
            std::mem::swap(&mut us, &mut ut);
        }
        *s = (us + corner_s) / 2;
        *t = (ut + corner_t) / 2;
    }

    fn mod_max(&self, x: i32) -> i32 {
        if x > self.center {
            x - self.max_quantized
        } else if x < -self.center {
            x + self.max_quantized
        } else {
            x
        }
    }

    /// Reverses a prediction correction in diamond-folded space.
    pub fn apply_correction(&self, predicted: [i32; 2], correction: [i32; 2], canonicalized: bool) -> [i32; 2] {
        let [mut ps, mut pt] = [predicted[0] - self.center, predicted[1] - self.center];
        let in_diamond = self.is_in_diamond(ps, pt);
        if !in_diamond {
            self.invert_diamond(&mut ps, &mut pt);
        }

        let rotation = if canonicalized && !is_in_bottom_left(ps, pt) {
            let count = rotation_count(ps, pt);
            [ps, pt] = rotate(ps, pt, count);
            Some(count)
        } else {
            None
        };

        let mut s = self.mod_max(ps.wrapping_add(correction[0]));
        let mut t = self.mod_max(pt.wrapping_add(correction[1]));

        if let Some(count) = rotation {
            [s, t] = rotate(s, t, (4 - count) % 4);
        }
        if !in_diamond {
            self.invert_diamond(&mut s, &mut t);
        }
        [s + self.center, t + self.center]
    }
}

fn is_in_bottom_left(s: i32, t: i32) -> bool {
    (s == 0 && t == 0) || (s < 0 && t <= 0)
}

fn rotation_count(s: i32, t: i32) -> u32 {
    match (s.signum(), t.signum()) {
        (0, 0) => 0,
        (0, 1) => 3,
        (0, _) => 1,
        (1, 0 | 1) => 2,
        (1, _) => 1,
        (_, 1) => 3,
        _ => 0,
    }
}

fn rotate(s: i32, t: i32, count: u32) -> [i32; 2] {
    match count {
        1 => [t, -s],
        2 => [-s, -t],
        3 => [-t, s],
        _ => [s, t],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: [f32; 3], b: [f32; 3]) {
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-5, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn center_maps_to_positive_x() {
        let oct = Octahedron::from_bits(8).unwrap();
        // 8 bits: max 255, value range 0..=254, center 127.
        assert_close(oct.to_unit_vector(127, 127), [1.0, 0.0, 0.0]);
        assert_close(oct.to_unit_vector(254, 127), [0.0, 1.0, 0.0]);
        assert_close(oct.to_unit_vector(127, 0), [0.0, 0.0, -1.0]);
        // Corners fold onto the far hemisphere.
        assert_close(oct.to_unit_vector(0, 0), [-1.0, 0.0, 0.0]);
    }

    #[test]
    fn bound_must_be_odd() {
        assert_eq!(Octahedron::from_max_quantized(255).unwrap(), Octahedron::from_bits(8).unwrap());
        assert!(Octahedron::from_max_quantized(256).is_err());
    }

    #[test]
    fn zero_correction_inside_diamond_keeps_prediction() {
        let oct = Octahedron::from_bits(8).unwrap();
        for canonicalized in [false, true] {
            assert_eq!(oct.apply_correction([127, 127], [0, 0], canonicalized), [127, 127]);
            assert_eq!(oct.apply_correction([100, 120], [0, 0], canonicalized), [100, 120]);
        }
        assert_eq!(oct.apply_correction([127, 127], [5, -3], false), [132, 124]);
    }

    #[test]
    fn rotations_cycle() {
        assert_eq!(rotate(1, 2, 1), [2, -1]);
        for count in 0..4 {
            let [s, t] = rotate(3, -7, count);
            assert_eq!(rotate(s, t, (4 - count) % 4), [3, -7]);
        }
        assert_eq!(rotation_count(5, 5), 2);
        assert_eq!(rotation_count(-5, -5), 0);
        assert_eq!(rotation_count(-5, 5), 3);
        assert_eq!(rotation_count(5, -5), 1);
    }
}
