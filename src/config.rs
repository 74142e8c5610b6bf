use glam::Vec3;

// === CONSTANTS ===
pub const DIMX: u32 = 1280; // Initial native window size, logical pixels.
pub const DIMY: u32 = 720;
pub const FRUSTUM_SCALE: f32 = 4.4;
pub const CAMERA_DISTANCE: f32 = 10.0;
pub const CAMERA_NEAR: f32 = 1.0;
pub const CAMERA_FAR: f32 = 1000.0;
pub const TONE_MAPPING_EXPOSURE: f32 = 1.0;
pub const AMBIENT_INTENSITY: f32 = 1.0;
pub const BACKGROUND_BLURRINESS: f32 = 3.0;
pub const BACKGROUND_INTENSITY: f32 = 3.0;
pub const PLANE_PIXEL_SCALE: f32 = 0.01; // World units per CSS pixel.
pub const PLANE_EMISSIVE_INTENSITY: f32 = 10.0;
pub const POINTER_TARGET_SCALE: f32 = 50.0;
pub const TWEEN_DURATION_SECS: f32 = 1.0;
pub const SPIN_AXIS: Vec3 = Vec3::new(1.0, 0.0, 1.0);
pub const SPIN_STEP: f32 = std::f32::consts::PI / 300.0; // Per frame, not delta scaled.
pub const TRANSMISSION_SAMPLES: u32 = 10;
pub const MAX_TRANSMISSION_SAMPLES: u32 = 32;
// FPS reporting through `log`. Flip off to silence the stats line.
pub const MINIMAL_LOGGING: bool = true;
pub const STATS_UPDATE_INTERVAL: f32 = 0.75;
pub const STATS_WINDOW: usize = 60;

pub const ENVIRONMENT_MAP: &str = "49TH_STREET.jpg";
pub const PLANE_TEXTURE: &str = "text.jpg";
pub const MODEL_FILE: &str = "blob.glb";
pub const DECODER_PATH: &str = "draco/";
pub const BLOB_NODE_NAME: &str = "Sphere";

#[cfg(not(target_arch = "wasm32"))]
pub const ASSET_ROOT: &str = "assets";
#[cfg(target_arch = "wasm32")]
pub const ASSET_ROOT: &str = "";

/// Tone mapping operators understood by the shaders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToneMapping {
    None = 0,
    AcesFilmic = 1,
}

/// Everything the scene needs that is fixed at startup.
///
/// `Default` reproduces the shipped scene; tests and embedders override
/// single fields with struct update syntax.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneConfig {
    pub asset_root: String,
    pub environment_map: String,
    pub plane_texture: String,
    pub model: String,
    pub decoder_path: String,
    pub blob_node: String,
    pub frustum_scale: f32,
    pub auto_clear: bool,
    pub tone_mapping: ToneMapping,
    pub exposure: f32,
    pub ambient_intensity: f32,
    pub background_blurriness: f32,
    pub background_intensity: f32,
    pub plane_emissive_intensity: f32,
    pub pointer_target_scale: f32,
    pub tween_duration: f32,
    pub title: String,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            asset_root: ASSET_ROOT.to_string(),
            environment_map: ENVIRONMENT_MAP.to_string(),
            plane_texture: PLANE_TEXTURE.to_string(),
            model: MODEL_FILE.to_string(),
            decoder_path: DECODER_PATH.to_string(),
            blob_node: BLOB_NODE_NAME.to_string(),
            frustum_scale: FRUSTUM_SCALE,
            auto_clear: false,
            tone_mapping: ToneMapping::AcesFilmic,
            exposure: TONE_MAPPING_EXPOSURE,
            ambient_intensity: AMBIENT_INTENSITY,
            background_blurriness: BACKGROUND_BLURRINESS,
            background_intensity: BACKGROUND_INTENSITY,
            plane_emissive_intensity: PLANE_EMISSIVE_INTENSITY,
            pointer_target_scale: POINTER_TARGET_SCALE,
            tween_duration: TWEEN_DURATION_SECS,
            title: "glassblob".to_string(),
        }
    }
}

impl SceneConfig {
    /// Resolves an asset file name against the asset root.
    /// An empty root means "site root" on the web.
    pub fn asset_path(&self, file: &str) -> String {
        let file = file.trim_start_matches('/');
        if self.asset_root.is_empty() {
            format!("/{file}")
        } else {
            format!("{}/{file}", self.asset_root.trim_end_matches('/'))
        }
    }

    pub fn decoder_dir(&self) -> String {
        self.asset_path(&self.decoder_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_paths_join_root() {
        let config = SceneConfig {
            asset_root: "assets/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.asset_path("blob.glb"), "assets/blob.glb");
        assert_eq!(config.decoder_dir(), "assets/draco/");
    }

    #[test]
    fn empty_root_is_site_relative() {
        let config = SceneConfig {
            asset_root: String::new(),
            ..Default::default()
        };
        assert_eq!(config.asset_path("/text.jpg"), "/text.jpg");
        assert_eq!(config.asset_path(ENVIRONMENT_MAP), "/49TH_STREET.jpg");
    }

    #[test]
    fn defaults_match_scene_constants() {
        let config = SceneConfig::default();
        assert_eq!(config.frustum_scale, 4.4);
        assert!(!config.auto_clear);
        assert_eq!(config.tone_mapping, ToneMapping::AcesFilmic);
        assert_eq!(config.blob_node, "Sphere");
        assert_eq!(config.tween_duration, 1.0);
    }
}
