//! The composition aggregate and its layer builder.

use std::sync::Arc;

use crate::background::Background;
use crate::error::ModelError;
use crate::foreground::Foreground;
use crate::layer::{Anchor, Crop, Layer, Position, Size};
use crate::media::{AudioSettings, Canvas, SourceTrim};

/// A background plus an ordered list of layers, ready to compile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composition {
    background: Option<Background>,
    layers: Vec<Layer>,
    canvas_hint: Option<Canvas>,
    duration: Option<f64>,
}

impl Composition {
    pub fn new(background: Background) -> Self {
        Self {
            background: Some(background),
            ..Self::default()
        }
    }

    /// Composition over a transparent canvas of the given size.
    pub fn canvas(width: u32, height: u32, fps: f64) -> Result<Self, ModelError> {
        Ok(Self::new(Background::empty(Canvas::new(width, height, fps)?)))
    }

    pub fn background(&self) -> Option<&Background> {
        self.background.as_ref()
    }

    pub fn set_background(&mut self, background: Background) -> &mut Self {
        self.background = Some(background);
        self
    }

    /// Canvas used when the background cannot supply one.
    pub fn set_canvas(&mut self, width: u32, height: u32, fps: f64) -> Result<&mut Self, ModelError> {
        self.canvas_hint = Some(Canvas::new(width, height, fps)?);
        Ok(self)
    }

    pub fn canvas_hint(&self) -> Option<Canvas> {
        self.canvas_hint
    }

    /// Force the output duration, overriding background and layers.
    pub fn set_duration(&mut self, seconds: f64) -> &mut Self {
        self.duration = Some(seconds);
        self
    }

    pub fn duration_override(&self) -> Option<f64> {
        self.duration
    }

    /// Add a layer named `layer{n}`, where `n` is the number of layers before it.
    pub fn add(&mut self, foreground: impl Into<Arc<Foreground>>) -> LayerHandle<'_> {
        let name = format!("layer{}", self.layers.len());
        self.add_named(foreground, name)
    }

    pub fn add_named(
        &mut self,
        foreground: impl Into<Arc<Foreground>>,
        name: impl Into<String>,
    ) -> LayerHandle<'_> {
        let z = i32::try_from(self.layers.len()).unwrap_or(i32::MAX);
        self.layers.push(Layer::new(name, foreground.into(), z));
        let index = self.layers.len() - 1;
        LayerHandle {
            layer: &mut self.layers[index],
        }
    }

    /// Re-open a layer for editing by insertion index.
    pub fn layer_mut(&mut self, index: usize) -> Option<LayerHandle<'_>> {
        self.layers.get_mut(index).map(|layer| LayerHandle { layer })
    }

    /// Layers in insertion order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// `(insertion index, layer)` bottom-to-top. Ties keep insertion order.
    pub fn layers_by_z(&self) -> Vec<(usize, &Layer)> {
        let mut ordered: Vec<(usize, &Layer)> = self.layers.iter().enumerate().collect();
        ordered.sort_by_key(|(_, layer)| layer.z);
        ordered
    }
}

/// Builder-style handle onto one layer of a composition.
///
/// ```ignore
/// comp.add(fg).at(Anchor::BottomRight, -20, -20).size(Size::percent(30.0)).opacity(0.9);
/// ```
#[derive(Debug)]
pub struct LayerHandle<'a> {
    layer: &'a mut Layer,
}

impl<'a> LayerHandle<'a> {
    /// Anchor plus pixel offset. Clears any custom expressions.
    pub fn at(self, anchor: Anchor, dx: i32, dy: i32) -> Self {
        self.layer.position = Position::Anchored { anchor, dx, dy };
        self
    }

    /// Custom overlay position expressions. Replaces the anchor.
    pub fn xy(self, x: impl Into<String>, y: impl Into<String>) -> Self {
        self.layer.position = Position::Expr {
            x: x.into(),
            y: y.into(),
        };
        self
    }

    pub fn size(self, size: Size) -> Self {
        self.layer.size = size;
        self
    }

    /// Clamped into `[0.0, 1.0]`.
    pub fn opacity(self, opacity: f64) -> Self {
        self.layer.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn rotate(self, degrees: f64) -> Self {
        self.layer.rotation = degrees;
        self
    }

    pub fn crop(self, x: u32, y: u32, width: u32, height: u32) -> Self {
        self.layer.crop = Some(Crop {
            x,
            y,
            width,
            height,
        });
        self
    }

    /// Output time the layer appears. Negative values clamp to zero.
    pub fn start(self, seconds: f64) -> Self {
        self.layer.timing.start = seconds.max(0.0);
        self
    }

    pub fn end(self, seconds: f64) -> Self {
        self.layer.timing.end = Some(seconds);
        self
    }

    pub fn duration(self, seconds: f64) -> Self {
        self.layer.timing.duration = Some(seconds);
        self
    }

    /// Read only `[start, end)` of this layer's source.
    pub fn subclip(self, start: f64, end: Option<f64>) -> Result<Self, ModelError> {
        self.layer.source_trim = Some(SourceTrim::new(start, end)?);
        Ok(self)
    }

    /// Volume is clamped into `[0.0, 1.0]`.
    pub fn audio(self, enabled: bool, volume: f64) -> Self {
        self.layer.audio = AudioSettings::new(enabled, volume);
        self
    }

    pub fn z(self, z: i32) -> Self {
        self.layer.z = z;
        self
    }

    /// Disable to composite the clip as plain RGB.
    pub fn alpha(self, enabled: bool) -> Self {
        self.layer.alpha = enabled;
        self
    }

    /// Swap the clip, keeping placement and timing.
    pub fn foreground(self, foreground: impl Into<Arc<Foreground>>) -> Self {
        self.layer.foreground = foreground.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.layer.name
    }

    /// The layer as configured so far.
    pub fn layer(&self) -> &Layer {
        self.layer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaInfo;

    fn fg(path: &str) -> Foreground {
        Foreground::webm_vp9(path, MediaInfo::fallback(path))
    }

    #[test]
    fn test_add_defaults() {
        let mut comp = Composition::canvas(1280, 720, 25.0).unwrap();
        let handle = comp.add(fg("a.webm"));
        assert_eq!(handle.name(), "layer0");
        let layer = handle.layer().clone();

        assert_eq!(layer.position, Position::default());
        assert_eq!(layer.size, Size::Contain);
        assert_eq!(layer.opacity, 1.0);
        assert!(layer.alpha);
        assert!(layer.audio.enabled);
        assert_eq!(layer.audio.volume, 1.0);
        assert_eq!(layer.z, 0);

        assert_eq!(comp.add(fg("b.webm")).name(), "layer1");
        assert_eq!(comp.layers()[1].z, 1);
    }

    #[test]
    fn test_builder_chain() {
        let mut comp = Composition::canvas(1280, 720, 25.0).unwrap();
        comp.add_named(fg("a.webm"), "presenter")
            .at(Anchor::BottomRight, -20, -10)
            .size(Size::percent(40.0))
            .opacity(1.7)
            .rotate(15.0)
            .crop(0, 0, 640, 360)
            .start(2.0)
            .duration(3.0)
            .audio(true, -0.5)
            .alpha(false)
            .z(9);

        let layer = &comp.layers()[0];
        assert_eq!(layer.name, "presenter");
        assert_eq!(
            layer.position,
            Position::Anchored {
                anchor: Anchor::BottomRight,
                dx: -20,
                dy: -10
            }
        );
        assert_eq!(layer.opacity, 1.0);
        assert_eq!(layer.audio.volume, 0.0);
        assert_eq!(layer.timing.resolved_end("presenter").unwrap(), Some(5.0));
        assert!(!layer.alpha);
        assert_eq!(layer.z, 9);
    }

    #[test]
    fn test_xy_replaces_anchor() {
        let mut comp = Composition::canvas(1280, 720, 25.0).unwrap();
        comp.add(fg("a.webm")).at(Anchor::TopLeft, 5, 5).xy("W-w-10", "10");
        assert_eq!(
            comp.layers()[0].position,
            Position::Expr {
                x: "W-w-10".into(),
                y: "10".into()
            }
        );
    }

    #[test]
    fn test_layers_by_z_is_stable() {
        let mut comp = Composition::canvas(1280, 720, 25.0).unwrap();
        comp.add(fg("a.webm")).z(1);
        comp.add(fg("b.webm")).z(0);
        comp.add(fg("c.webm")).z(1);

        let order: Vec<usize> = comp.layers_by_z().into_iter().map(|(i, _)| i).collect();
        assert_eq!(order, vec![1, 0, 2]);
    }

    #[test]
    fn test_layer_mut_reopens() {
        let mut comp = Composition::canvas(1280, 720, 25.0).unwrap();
        comp.add(fg("a.webm"));
        comp.layer_mut(0).unwrap().opacity(0.25);
        assert_eq!(comp.layers()[0].opacity, 0.25);
        assert!(comp.layer_mut(3).is_none());
    }

    #[test]
    fn test_shared_foreground() {
        let shared = Arc::new(fg("a.webm"));
        let mut comp = Composition::canvas(1280, 720, 25.0).unwrap();
        comp.add(Arc::clone(&shared));
        comp.add(Arc::clone(&shared)).start(4.0);
        assert!(Arc::ptr_eq(
            &comp.layers()[0].foreground,
            &comp.layers()[1].foreground
        ));
    }

    #[test]
    fn test_subclip_validates() {
        let mut comp = Composition::canvas(1280, 720, 25.0).unwrap();
        assert!(comp.add(fg("a.webm")).subclip(3.0, Some(1.0)).is_err());
        assert!(comp.layers()[0].source_trim.is_none());
    }
}
