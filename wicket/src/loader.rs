//! Concurrent resource loading
//!
//! Fetch and decode run on a tokio runtime; completions cross back to the
//! single-threaded bridge through an unbounded channel, so bridge state
//! never needs a lock. Sources are `http(s)://` URLs (reqwest) or plain
//! filesystem paths (tokio::fs). There is no timeout and no cancellation;
//! a failed target sends its error and the lifecycle controller latches
//! Broken.

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::debug;

use crate::error::BridgeError;

/// A decoded RGBA8 texture image, uploaded to the GPU at instantiation.
#[derive(Debug, Clone, Default)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// One resource the bridge needs before (stage 1) or after (stage 2)
/// module instantiation.
///
/// The atlas targets are opaque layout blobs the module reads back through
/// `fill_*_atlas`; the texture targets are the PNG images those layouts
/// index into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTarget {
    Module,
    SpriteAtlas,
    TiledAtlas,
    SpriteTexture,
    TiledTexture,
    Music(u32),
    Sound(u32),
}

impl LoadTarget {
    /// File name of this target under the resource base.
    pub fn file_name(&self) -> String {
        match self {
            LoadTarget::Module => "module.wasm".to_string(),
            LoadTarget::SpriteAtlas => "sprites.atlas".to_string(),
            LoadTarget::TiledAtlas => "tiles.atlas".to_string(),
            LoadTarget::SpriteTexture => "sprites.png".to_string(),
            LoadTarget::TiledTexture => "tiles.png".to_string(),
            LoadTarget::Music(id) => format!("music{id}.ogg"),
            LoadTarget::Sound(id) => format!("sound{id}.ogg"),
        }
    }

    /// Stage-1 targets gate instantiation; audio targets gate start.
    pub fn is_core(&self) -> bool {
        !matches!(self, LoadTarget::Music(_) | LoadTarget::Sound(_))
    }
}

/// Every stage-1 target, in spawn order.
pub const CORE_TARGETS: [LoadTarget; 5] = [
    LoadTarget::Module,
    LoadTarget::SpriteAtlas,
    LoadTarget::TiledAtlas,
    LoadTarget::SpriteTexture,
    LoadTarget::TiledTexture,
];

/// Decoded resource content.
#[derive(Debug, Clone)]
pub enum LoadPayload {
    Module(Vec<u8>),
    /// An atlas layout blob, kept opaque for the module to parse.
    Blob(Vec<u8>),
    Texture(TextureImage),
    /// Encoded audio bytes, decoded later by the audio subsystem.
    Clip(Vec<u8>),
}

/// A completion delivered to the bridge thread.
#[derive(Debug)]
pub struct LoadEvent {
    pub target: LoadTarget,
    pub result: Result<LoadPayload, BridgeError>,
}

/// Join a resource base with a target file name.
pub fn resolve_source(base: &str, target: LoadTarget) -> String {
    let name = target.file_name();
    if base.is_empty() {
        name
    } else {
        format!("{}/{}", base.trim_end_matches('/'), name)
    }
}

pub struct Loader {
    runtime: tokio::runtime::Runtime,
    tx: UnboundedSender<LoadEvent>,
}

impl Loader {
    /// Create a loader and the receiving end the bridge drains.
    pub fn new() -> anyhow::Result<(Self, UnboundedReceiver<LoadEvent>)> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        let (tx, rx) = unbounded_channel();
        Ok((Self { runtime, tx }, rx))
    }

    /// Start fetching one target. Completion (or failure) arrives on the
    /// channel; the send only fails if the bridge is already gone.
    pub fn spawn(&self, base: &str, target: LoadTarget) {
        let source = resolve_source(base, target);
        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            debug!(?target, source, "fetching");
            let result = fetch_and_decode(&source, target).await;
            let _ = tx.send(LoadEvent { target, result });
        });
    }
}

async fn fetch_and_decode(
    source: &str,
    target: LoadTarget,
) -> Result<LoadPayload, BridgeError> {
    let bytes = fetch_bytes(source).await.map_err(|e| BridgeError::ResourceLoad {
        target: source.to_string(),
        reason: format!("{e:#}"),
    })?;
    decode(bytes, target).map_err(|e| BridgeError::ResourceLoad {
        target: source.to_string(),
        reason: format!("{e:#}"),
    })
}

async fn fetch_bytes(source: &str) -> anyhow::Result<Vec<u8>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let response = reqwest::get(source).await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    } else {
        Ok(tokio::fs::read(source).await?)
    }
}

fn decode(bytes: Vec<u8>, target: LoadTarget) -> anyhow::Result<LoadPayload> {
    match target {
        LoadTarget::Module => Ok(LoadPayload::Module(bytes)),
        LoadTarget::SpriteAtlas | LoadTarget::TiledAtlas => Ok(LoadPayload::Blob(bytes)),
        LoadTarget::SpriteTexture | LoadTarget::TiledTexture => {
            let image =
                image::load_from_memory_with_format(&bytes, image::ImageFormat::Png)?.to_rgba8();
            let (width, height) = image.dimensions();
            Ok(LoadPayload::Texture(TextureImage {
                width,
                height,
                pixels: image.into_raw(),
            }))
        }
        LoadTarget::Music(_) | LoadTarget::Sound(_) => Ok(LoadPayload::Clip(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([9, 8, 7, 255]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn source_resolution() {
        assert_eq!(
            resolve_source("https://host/app", LoadTarget::Module),
            "https://host/app/module.wasm"
        );
        assert_eq!(
            resolve_source("https://host/app", LoadTarget::SpriteAtlas),
            "https://host/app/sprites.atlas"
        );
        assert_eq!(
            resolve_source("/data/app/", LoadTarget::Music(3)),
            "/data/app/music3.ogg"
        );
        assert_eq!(resolve_source("", LoadTarget::SpriteTexture), "sprites.png");
    }

    #[test]
    fn core_vs_audio_targets() {
        for target in CORE_TARGETS {
            assert!(target.is_core());
        }
        assert_eq!(CORE_TARGETS.len(), 5);
        assert!(!LoadTarget::Music(0).is_core());
        assert!(!LoadTarget::Sound(0).is_core());
    }

    #[test]
    fn texture_decodes_to_rgba() {
        let payload = decode(png_bytes(3, 2), LoadTarget::SpriteTexture).unwrap();
        match payload {
            LoadPayload::Texture(texture) => {
                assert_eq!((texture.width, texture.height), (3, 2));
                assert_eq!(texture.pixels.len(), 3 * 2 * 4);
                assert_eq!(&texture.pixels[..4], &[9, 8, 7, 255]);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn atlas_blob_passes_through_undecoded() {
        // Layout blobs are module-defined binary; the bridge must not
        // interpret them.
        let blob = vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01];
        assert!(matches!(
            decode(blob.clone(), LoadTarget::SpriteAtlas).unwrap(),
            LoadPayload::Blob(b) if b == blob
        ));
        assert!(matches!(
            decode(blob.clone(), LoadTarget::TiledAtlas).unwrap(),
            LoadPayload::Blob(b) if b == blob
        ));
    }

    #[test]
    fn bad_png_fails_decode() {
        assert!(decode(b"not a png".to_vec(), LoadTarget::TiledTexture).is_err());
    }

    #[test]
    fn module_and_clip_pass_through() {
        assert!(matches!(
            decode(vec![0, 1, 2], LoadTarget::Module).unwrap(),
            LoadPayload::Module(v) if v == vec![0, 1, 2]
        ));
        assert!(matches!(
            decode(vec![3], LoadTarget::Sound(0)).unwrap(),
            LoadPayload::Clip(v) if v == vec![3]
        ));
    }

    #[test]
    fn filesystem_load_delivers_event() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("sprites.png"), png_bytes(2, 2)).unwrap();

        let (loader, mut rx) = Loader::new().unwrap();
        loader.spawn(dir.path().to_str().unwrap(), LoadTarget::SpriteTexture);

        let event = rx.blocking_recv().unwrap();
        assert_eq!(event.target, LoadTarget::SpriteTexture);
        assert!(event.result.is_ok());
    }

    #[test]
    fn missing_file_reports_resource_load_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let (loader, mut rx) = Loader::new().unwrap();
        loader.spawn(dir.path().to_str().unwrap(), LoadTarget::Module);

        let event = rx.blocking_recv().unwrap();
        match event.result {
            Err(BridgeError::ResourceLoad { target, .. }) => {
                assert!(target.ends_with("module.wasm"));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
