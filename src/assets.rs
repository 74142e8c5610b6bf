use std::sync::mpsc::{self, Receiver, Sender};

use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::error::{AssetError, AssetResult};
use crate::model::{self, ModelAsset};

/// One mip level of an RGBA8 texture.
#[derive(Clone, Debug, PartialEq)]
pub struct MipLevel {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Decoded sRGB texture, level 0 first.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub levels: Vec<MipLevel>,
}

impl TextureData {
    pub fn from_image(image: RgbaImage, with_mips: bool) -> Self {
        let mut levels = vec![MipLevel {
            width: image.width(),
            height: image.height(),
            pixels: image.as_raw().clone(),
        }];

        if with_mips {
            let mut current = image;
            while current.width() > 1 || current.height() > 1 {
                let width = (current.width() / 2).max(1);
                let height = (current.height() / 2).max(1);
                current = imageops::resize(&current, width, height, FilterType::Triangle);
                levels.push(MipLevel {
                    width,
                    height,
                    pixels: current.as_raw().clone(),
                });
            }
        }
        Self { levels }
    }

    /// 1×1 texture of a single colour.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            levels: vec![MipLevel {
                width: 1,
                height: 1,
                pixels: rgba.to_vec(),
            }],
        }
    }

    pub fn width(&self) -> u32 {
        self.levels.first().map_or(0, |l| l.width)
    }

    pub fn height(&self) -> u32 {
        self.levels.first().map_or(0, |l| l.height)
    }

    pub fn mip_level_count(&self) -> u32 {
        self.levels.len() as u32
    }
}

pub fn decode_texture(path: &str, bytes: &[u8], with_mips: bool) -> AssetResult<TextureData> {
    let image = image::load_from_memory(bytes)
        .map_err(|source| AssetError::Image {
            path: path.to_string(),
            source,
        })?
        .to_rgba8();
    Ok(TextureData::from_image(image, with_mips))
}

/// Completed load, delivered to the frame loop.
#[derive(Debug)]
pub enum AssetEvent {
    Environment {
        path: String,
        result: AssetResult<TextureData>,
    },
    Texture {
        path: String,
        result: AssetResult<TextureData>,
    },
    Model {
        path: String,
        result: AssetResult<ModelAsset>,
    },
}

impl AssetEvent {
    pub fn path(&self) -> &str {
        match self {
            AssetEvent::Environment { path, .. } | AssetEvent::Texture { path, .. } | AssetEvent::Model { path, .. } => path,
        }
    }
}

/// Fire-and-forget asset loads. Each request reads/fetches the bytes off the
/// render loop and posts one [`AssetEvent`] back through a channel that
/// [`AssetLoader::drain`] empties.
pub struct AssetLoader {
    sender: Sender<AssetEvent>,
    receiver: Receiver<AssetEvent>,
}

impl Default for AssetLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetLoader {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }

    /// Handle for posting events from elsewhere (tests, embedders).
    pub fn sender(&self) -> Sender<AssetEvent> {
        self.sender.clone()
    }

    pub fn load_environment(&self, path: String) {
        spawn_load(path, self.sender.clone(), |path, bytes| AssetEvent::Environment {
            result: bytes.and_then(|b| decode_texture(&path, &b, true)),
            path,
        });
    }

    pub fn load_texture(&self, path: String) {
        spawn_load(path, self.sender.clone(), |path, bytes| AssetEvent::Texture {
            result: bytes.and_then(|b| decode_texture(&path, &b, false)),
            path,
        });
    }

    /// Loads a glTF model. Natively Draco primitives go through the built-in
    /// decoder; the web build loads the decoder module under `decoder_path`
    /// when the file uses the extension.
    pub fn load_model(&self, path: String, decoder_path: String) {
        let sender = self.sender.clone();

        cfg_if::cfg_if! {
            if #[cfg(target_arch = "wasm32")] {
                log::debug!("Loading {}", path);
                wasm_bindgen_futures::spawn_local(async move {
                    let result = fetch_model(&path, &decoder_path).await;
                    let _ = sender.send(AssetEvent::Model { path, result });
                });
            } else {
                log::trace!("Native build decodes Draco in-process, ignoring {}", decoder_path);
                spawn_load(path, sender, |path, bytes| AssetEvent::Model {
                    result: bytes.and_then(|b| model::import_glb(&path, &b)),
                    path,
                });
            }
        }
    }

    /// Every event that has arrived since the last call.
    pub fn drain(&self) -> Vec<AssetEvent> {
        self.receiver.try_iter().collect()
    }
}

fn spawn_load<F>(path: String, sender: Sender<AssetEvent>, decode: F)
where
    F: FnOnce(String, AssetResult<Vec<u8>>) -> AssetEvent + Send + 'static,
{
    log::debug!("Loading {}", path);

    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            wasm_bindgen_futures::spawn_local(async move {
                let bytes = fetch_bytes(&path).await;
                let _ = sender.send(decode(path, bytes));
            });
        } else {
            std::thread::spawn(move || {
                let bytes = std::fs::read(&path).map_err(|source| AssetError::Io {
                    path: path.clone(),
                    source,
                });
                // Receiver gone means the app shut down; nothing to report to.
                let _ = sender.send(decode(path, bytes));
            });
        }
    }
}

#[cfg(target_arch = "wasm32")]
async fn fetch_model(path: &str, decoder_path: &str) -> AssetResult<ModelAsset> {
    use crate::draco::web::WebDracoDecoder;

    let bytes = fetch_bytes(path).await?;
    if !model::requires_draco(&bytes) {
        return model::import_glb(path, &bytes);
    }
    let decoder = WebDracoDecoder::load(decoder_path)
        .await
        .map_err(|source| AssetError::DracoDecoder {
            decoder_path: decoder_path.to_string(),
            source,
        })?;
    model::import_with(path, &bytes, |data, ids| decoder.decode(data, ids))
}

#[cfg(target_arch = "wasm32")]
pub(crate) async fn fetch_bytes(path: &str) -> AssetResult<Vec<u8>> {
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;

    let fetch_error = |reason: String| AssetError::Fetch {
        path: path.to_string(),
        reason,
    };

    let window = web_sys::window().ok_or_else(|| fetch_error("no window".to_string()))?;
    let response = JsFuture::from(window.fetch_with_str(path))
        .await
        .map_err(|e| fetch_error(format!("{e:?}")))?;
    let response: web_sys::Response = response
        .dyn_into()
        .map_err(|e| fetch_error(format!("{e:?}")))?;
    if !response.ok() {
        return Err(fetch_error(format!("HTTP {}", response.status())));
    }

    let buffer = response.array_buffer().map_err(|e| fetch_error(format!("{e:?}")))?;
    let buffer = JsFuture::from(buffer)
        .await
        .map_err(|e| fetch_error(format!("{e:?}")))?;
    Ok(js_sys::Uint8Array::new(&buffer).to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, image::Rgba([200, 100, 50, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("png encodes");
        bytes
    }

    #[test]
    fn mip_chain_halves_to_one_pixel() {
        let texture = decode_texture("env.png", &png_bytes(8, 4), true).expect("decodes");
        let sizes: Vec<_> = texture.levels.iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(sizes, vec![(8, 4), (4, 2), (2, 1), (1, 1)]);
        for level in &texture.levels {
            assert_eq!(level.pixels.len() as u32, level.width * level.height * 4);
        }
        assert_eq!(texture.levels[3].pixels, vec![200, 100, 50, 255]);
    }

    #[test]
    fn plain_texture_has_single_level() {
        let texture = decode_texture("text.png", &png_bytes(3, 5), false).expect("decodes");
        assert_eq!(texture.mip_level_count(), 1);
        assert_eq!((texture.width(), texture.height()), (3, 5));
    }

    #[test]
    fn garbage_is_an_image_error() {
        let err = decode_texture("broken.jpg", b"not an image", false).unwrap_err();
        assert!(matches!(err, AssetError::Image { ref path, .. } if path == "broken.jpg"));
    }

    #[test]
    fn missing_file_reports_io_error() {
        let loader = AssetLoader::new();
        loader.load_texture("definitely/not/here.jpg".to_string());
        let event = loader
            .receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("loader reports back");
        assert_eq!(event.path(), "definitely/not/here.jpg");
        assert!(matches!(event, AssetEvent::Texture { result: Err(AssetError::Io { .. }), .. }));
    }

    #[test]
    fn texture_file_round_trips_through_loader() {
        let path = std::env::temp_dir().join(format!("glassblob-loader-{}.png", std::process::id()));
        std::fs::write(&path, png_bytes(2, 2)).expect("temp file writable");

        let loader = AssetLoader::new();
        loader.load_environment(path.to_string_lossy().into_owned());
        let event = loader
            .receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("loader reports back");
        let _ = std::fs::remove_file(&path);

        match event {
            AssetEvent::Environment { result: Ok(texture), .. } => assert_eq!(texture.mip_level_count(), 2),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
