//! Building probed backgrounds and foregrounds from paths and URLs.

use vbr_common::error::{VbrError, VbrResult};
use vbr_media_model::{
    Background, Canvas, Composition, Foreground, ForegroundFormat, MediaInfo, SourceKind,
};

use crate::context::MediaContext;

/// Frame rate given to still-image backgrounds when the caller has no preference.
pub const DEFAULT_IMAGE_FPS: f64 = 30.0;

fn canvas(width: u32, height: u32, fps: f64) -> VbrResult<Canvas> {
    Canvas::new(width, height, fps).map_err(|e| VbrError::config(e.to_string()))
}

impl MediaContext {
    /// Probe a path or URL, falling back to extension-based metadata.
    pub fn probe(&self, source: &str) -> MediaInfo {
        self.prober().probe(source)
    }

    /// Still image looped under the layers. Remote images are downloaded first.
    pub fn image_background(&self, source: &str, fps: f64) -> VbrResult<Background> {
        let local = match SourceKind::detect(source) {
            SourceKind::Url => self.download_image(source)?.display().to_string(),
            SourceKind::File | SourceKind::Stream => source.to_string(),
        };
        let (width, height) = self.prober().image_dimensions(&local)?;
        tracing::debug!(source, width, height, "Image background probed");
        Ok(Background::image(local, canvas(width, height, fps)?))
    }

    /// Video background. Canvas follows the display geometry of the clip.
    pub fn video_background(&self, source: &str) -> VbrResult<Background> {
        let prober = self.prober();
        let geometry = prober.video_geometry(source)?;
        let info = prober.probe(source);
        tracing::debug!(
            source,
            width = geometry.width,
            height = geometry.height,
            fps = geometry.fps,
            rotation = geometry.rotation,
            "Video background probed"
        );
        Ok(Background::video(
            source,
            canvas(geometry.width, geometry.height, geometry.fps)?,
            info,
        ))
    }

    pub fn webm_foreground(&self, path: &str) -> Foreground {
        Foreground::webm_vp9(path, self.probe(path))
    }

    pub fn mov_foreground(&self, path: &str) -> Foreground {
        Foreground::mov_prores(path, self.probe(path))
    }

    /// Color over mask in one frame (top half color, bottom half mask).
    pub fn stacked_foreground(&self, path: &str) -> Foreground {
        Foreground::stacked(path, self.probe(path))
    }

    /// Separate color and mask clips; the color clip is probed.
    pub fn mask_foreground(&self, color: &str, mask: &str, audio: Option<&str>) -> Foreground {
        Foreground::video_and_mask(color, mask, audio.map(str::to_string), self.probe(color))
    }

    /// Foreground with the format picked from the extension.
    ///
    /// Archives are unpacked right away.
    pub fn foreground_from_file(&self, path: &str) -> VbrResult<Foreground> {
        let format =
            Foreground::format_for_path(path).map_err(|e| VbrError::config(e.to_string()))?;
        match format {
            ForegroundFormat::WebmVp9 => Ok(self.webm_foreground(path)),
            ForegroundFormat::MovProres => Ok(self.mov_foreground(path)),
            ForegroundFormat::Stacked => Ok(self.stacked_foreground(path)),
            ForegroundFormat::Archive => self.unpack_archive(&Foreground::archive(path)),
            ForegroundFormat::MaskBundle => Err(VbrError::config(format!(
                "{path}: mask bundles need separate color and mask paths"
            ))),
        }
    }

    /// Copy of `comp` with every archive layer unpacked, ready to compile.
    pub fn prepare(&self, comp: &Composition) -> VbrResult<Composition> {
        let mut prepared = comp.clone();
        for (index, layer) in comp.layers().iter().enumerate() {
            if !layer.foreground.is_archive() {
                continue;
            }
            let unpacked = self.unpack_archive(&layer.foreground)?;
            if let Some(handle) = prepared.layer_mut(index) {
                handle.foreground(unpacked);
            }
        }
        Ok(prepared)
    }
}
