//! Offline renderer producing a solid-colour PNG per scene

use super::{RenderRequest, RenderResult, SceneRenderer};
use crate::graph::RenderArtifact;
use async_trait::async_trait;
use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub struct PlaceholderRenderer {
    size: u32,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl Default for PlaceholderRenderer {
    fn default() -> Self {
        Self::new(32)
    }
}

impl PlaceholderRenderer {
    pub fn new(size: u32) -> Self {
        PlaceholderRenderer {
            size: size.max(1),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Colour derived from the scene name, stable across runs
    fn colour(name: &str) -> [u8; 3] {
        let mut crc = Crc::new();
        crc.update(name.as_bytes());
        let [r, g, b, _] = crc.sum().to_be_bytes();
        [r / 2 + 32, g / 2 + 64, b / 2 + 16]
    }

    fn encode_png(&self, rgb: [u8; 3]) -> std::io::Result<Vec<u8>> {
        let side = self.size as usize;
        let mut raw = Vec::with_capacity(side * (side * 3 + 1));
        for _ in 0..side {
            raw.push(0);
            for _ in 0..side {
                raw.extend_from_slice(&rgb);
            }
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw)?;
        let idat = encoder.finish()?;

        let mut ihdr = Vec::with_capacity(13);
        ihdr.extend_from_slice(&self.size.to_be_bytes());
        ihdr.extend_from_slice(&self.size.to_be_bytes());
        // 8-bit truecolour, default compression/filter, no interlace
        ihdr.extend_from_slice(&[8, 2, 0, 0, 0]);

        let mut png = PNG_SIGNATURE.to_vec();
        write_chunk(&mut png, b"IHDR", &ihdr);
        write_chunk(&mut png, b"IDAT", &idat);
        write_chunk(&mut png, b"IEND", &[]);
        Ok(png)
    }
}

fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);

    let mut crc = Crc::new();
    crc.update(kind);
    crc.update(data);
    out.extend_from_slice(&crc.sum().to_be_bytes());
}

#[async_trait]
impl SceneRenderer for PlaceholderRenderer {
    async fn render_scene(&self, request: &RenderRequest) -> RenderResult<RenderArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let png = self
            .encode_png(Self::colour(&request.scene_name))
            .map_err(|e| super::RenderError::Api(e.to_string()))?;
        Ok(RenderArtifact::png(png).with_style(request.style.phrase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderStyle;

    fn request(name: &str) -> RenderRequest {
        RenderRequest {
            scene_name: name.to_string(),
            graph_json: "{}".to_string(),
            canvas_snapshot: None,
            style: RenderStyle::Watercolor,
        }
    }

    #[tokio::test]
    async fn test_placeholder_is_png() {
        let renderer = PlaceholderRenderer::new(8);
        let artifact = renderer.render_scene(&request("Harbor")).await.unwrap();
        let bytes = artifact.bytes().unwrap();

        assert_eq!(&bytes[..8], &PNG_SIGNATURE);
        assert_eq!(&bytes[12..16], b"IHDR");
        assert_eq!(artifact.media_type, "image/png");
        assert_eq!(renderer.calls(), 1);
    }

    #[tokio::test]
    async fn test_placeholder_is_deterministic() {
        let renderer = PlaceholderRenderer::default();
        let a = renderer.render_scene(&request("Harbor")).await.unwrap();
        let b = renderer.render_scene(&request("Harbor")).await.unwrap();
        let c = renderer.render_scene(&request("Forest")).await.unwrap();
        assert_eq!(a.bytes().unwrap(), b.bytes().unwrap());
        assert_ne!(a.bytes().unwrap(), c.bytes().unwrap());
    }
}
