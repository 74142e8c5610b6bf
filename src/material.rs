use glam::Vec3;

use crate::config::{MAX_TRANSMISSION_SAMPLES, TRANSMISSION_SAMPLES};

#[derive(Clone, Debug, PartialEq)]
pub enum Material {
    Standard(StandardMaterial),
    Transmission(TransmissionMaterial),
}

impl Material {
    pub fn is_transmissive(&self) -> bool {
        matches!(self, Material::Transmission(_))
    }

    /// Texture key sampled as colour map, if any.
    pub fn map(&self) -> Option<&str> {
        match self {
            Material::Standard(m) => m.map.as_deref(),
            Material::Transmission(_) => None,
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Material::Standard(StandardMaterial::default())
    }
}

/// Metal/rough PBR surface. Texture maps are referenced by asset key and
/// resolved by the renderer once loaded.
#[derive(Clone, Debug, PartialEq)]
pub struct StandardMaterial {
    pub color: Vec3,
    pub opacity: f32,
    pub roughness: f32,
    pub metalness: f32,
    pub emissive: Vec3,
    pub emissive_intensity: f32,
    pub map: Option<String>,
    pub emissive_map: Option<String>,
    pub double_sided: bool,
}

impl Default for StandardMaterial {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            opacity: 1.0,
            roughness: 1.0,
            metalness: 0.0,
            emissive: Vec3::ZERO,
            emissive_intensity: 1.0,
            map: None,
            emissive_map: None,
            double_sided: false,
        }
    }
}

impl StandardMaterial {
    /// Double-sided glowing material, `texture` used as colour and emissive map.
    pub fn glowing(texture: &str, emissive_intensity: f32) -> Self {
        Self {
            map: Some(texture.to_string()),
            emissive_map: Some(texture.to_string()),
            emissive: Vec3::ONE,
            emissive_intensity,
            double_sided: true,
            ..Default::default()
        }
    }
}

/// Refractive glass with chromatic aberration and animated distortion.
/// `time` is the distortion phase in seconds.
#[derive(Clone, Debug, PartialEq)]
pub struct TransmissionMaterial {
    pub samples: u32,
    pub color: Vec3,
    pub clearcoat: f32,
    pub clearcoat_roughness: f32,
    pub transmission: f32,
    pub chromatic_aberration: f32,
    pub anisotropy: f32,
    pub roughness: f32,
    pub thickness: f32,
    pub ior: f32,
    pub distortion: f32,
    pub distortion_scale: f32,
    pub temporal_distortion: f32,
    pub time: f32,
}

impl Default for TransmissionMaterial {
    fn default() -> Self {
        Self::new(6)
    }
}

impl TransmissionMaterial {
    pub fn new(samples: u32) -> Self {
        Self {
            samples: samples.clamp(1, MAX_TRANSMISSION_SAMPLES),
            color: Vec3::ONE,
            clearcoat: 0.0,
            clearcoat_roughness: 0.0,
            transmission: 1.0,
            chromatic_aberration: 0.05,
            anisotropy: 0.1,
            roughness: 0.0,
            thickness: 0.0,
            ior: 1.5,
            distortion: 0.0,
            distortion_scale: 0.5,
            temporal_distortion: 0.0,
            time: 0.0,
        }
    }

    /// The blob's glass: thin, near-smooth, lightly distorted.
    pub fn blob() -> Self {
        Self {
            clearcoat: 1.0,
            clearcoat_roughness: 0.0,
            transmission: 1.0,
            chromatic_aberration: 0.02,
            anisotropy: 0.1,
            roughness: 0.01,
            thickness: 1.0,
            ior: 1.1,
            distortion: 0.5,
            distortion_scale: 0.1,
            temporal_distortion: 0.2,
            ..Self::new(TRANSMISSION_SAMPLES)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_parameters() {
        let glass = TransmissionMaterial::blob();
        assert_eq!(glass.samples, 10);
        assert_eq!(glass.clearcoat, 1.0);
        assert_eq!(glass.ior, 1.1);
        assert_eq!(glass.chromatic_aberration, 0.02);
        assert_eq!(glass.distortion, 0.5);
        assert_eq!(glass.distortion_scale, 0.1);
        assert_eq!(glass.temporal_distortion, 0.2);
        assert_eq!(glass.time, 0.0);
    }

    #[test]
    fn sample_count_is_bounded() {
        assert_eq!(TransmissionMaterial::new(0).samples, 1);
        assert_eq!(TransmissionMaterial::new(1000).samples, MAX_TRANSMISSION_SAMPLES);
    }

    #[test]
    fn glowing_material_uses_texture_twice() {
        let material = Material::Standard(StandardMaterial::glowing("assets/text.jpg", 10.0));
        assert_eq!(material.map(), Some("assets/text.jpg"));
        assert!(!material.is_transmissive());
        let Material::Standard(standard) = material else {
            unreachable!()
        };
        assert_eq!(standard.emissive_map.as_deref(), Some("assets/text.jpg"));
        assert!(standard.double_sided);
        assert_eq!(standard.emissive_intensity, 10.0);
    }
}
