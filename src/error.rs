use thiserror::Error;

/// Failures while reading or decoding one of the static assets.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch {path}: {reason}")]
    Fetch { path: String, reason: String },

    #[error("failed to decode image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to decode glTF {path}: {source}")]
    Gltf {
        path: String,
        #[source]
        source: gltf::Error,
    },

    #[error("failed to read glTF extensions in {path}: {source}")]
    Extensions {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode Draco primitive in {path}: {source}")]
    Draco {
        path: String,
        #[source]
        source: crate::draco::DracoError,
    },

    #[error("failed to load Draco decoder from {decoder_path}: {source}")]
    DracoDecoder {
        decoder_path: String,
        #[source]
        source: crate::draco::DracoError,
    },

    #[error("{path} contains no scene")]
    EmptyScene { path: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("stale node id {0}")]
    InvalidNode(usize),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    #[error("no suitable adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
}

pub type AssetResult<T> = Result<T, AssetError>;
pub type SceneResult<T> = Result<T, SceneError>;
pub type RenderResult<T> = Result<T, RenderError>;
