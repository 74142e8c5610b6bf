/// Size of the drawing area in CSS (logical) pixels plus the device pixel ratio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub pixel_ratio: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32, pixel_ratio: f32) -> Self {
        Self {
            width: width.max(1.0),
            height: height.max(1.0),
            pixel_ratio: if pixel_ratio > 0.0 { pixel_ratio } else { 1.0 },
        }
    }

    pub fn from_physical(size: winit::dpi::PhysicalSize<u32>, scale_factor: f64) -> Self {
        let logical = size.to_logical::<f32>(scale_factor);
        Self::new(logical.width, logical.height, scale_factor as f32)
    }

    pub fn aspect(&self) -> f32 {
        self.width / self.height
    }

    /// Surface size in device pixels.
    pub fn physical_size(&self) -> (u32, u32) {
        (
            ((self.width * self.pixel_ratio).round() as u32).max(1),
            ((self.height * self.pixel_ratio).round() as u32).max(1),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_size_applies_pixel_ratio() {
        let viewport = Viewport::new(800.0, 600.0, 2.0);
        assert_eq!(viewport.physical_size(), (1600, 1200));
        assert!((viewport.aspect() - 4.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_sizes_are_clamped() {
        let viewport = Viewport::new(0.0, 0.0, 0.0);
        assert_eq!(viewport.physical_size(), (1, 1));
        assert_eq!(viewport.pixel_ratio, 1.0);
    }

    #[test]
    fn from_physical_divides_scale_factor() {
        let viewport = Viewport::from_physical(winit::dpi::PhysicalSize::new(2160, 1440), 2.0);
        assert_eq!(viewport.width, 1080.0);
        assert_eq!(viewport.height, 720.0);
        assert_eq!(viewport.physical_size(), (2160, 1440));
    }
}
