//! Bubble-and-text compositing over a raster image.
//!
//! For every region with non-empty text:
//!
//! 1. an opaque rounded rectangle ("bubble") is painted over the box,
//! 2. the translated text is fitted into the box with [`TextLayoutEngine`]
//!    and drawn line by line.
//!
//! All bubbles are painted before any text, so a later bubble never covers
//! earlier text. Region boxes come from the translation service and are
//! clipped to the image first; regions entirely off the image are skipped.

use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use anyhow::Context;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::{debug, warn};

use crate::collab::TranslationRegion;
use crate::config::RenderConfig;
use crate::layout::{LayoutParams, TextBox, TextLayoutEngine, TextMeasurer};

/// Axis-aligned rectangle in image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BubbleRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl From<&TranslationRegion> for BubbleRect {
    fn from(region: &TranslationRegion) -> Self {
        Self {
            x: region.min_x,
            y: region.min_y,
            width: region.width(),
            height: region.height(),
        }
    }
}

impl BubbleRect {
    /// Intersection with a `width` x `height` image, or `None` if nothing of
    /// the rectangle lies on it.
    #[must_use]
    pub fn clip_to(self, width: u32, height: u32) -> Option<Self> {
        if ![self.x, self.y, self.width, self.height].iter().all(|v| v.is_finite()) {
            return None;
        }
        let left = self.x.max(0.0);
        let top = self.y.max(0.0);
        let right = (self.x + self.width).min(width as f32);
        let bottom = (self.y + self.height).min(height as f32);
        (right > left && bottom > top).then(|| Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        })
    }
}

/// Corner radius limited to half the shorter side.
#[must_use]
pub fn clamp_radius(radius: f32, width: f32, height: f32) -> f32 {
    radius.min(width / 2.0).min(height / 2.0).max(0.0)
}

/// Drawing target for the compositor.
pub trait Surface {
    /// Width and height in pixels.
    fn dimensions(&self) -> (u32, u32);

    fn fill_rounded_rect(&mut self, rect: BubbleRect, radius: f32, color: Rgba<u8>);

    /// Draw `text` with its baseline at `baseline_y`.
    fn draw_text(&mut self, x: f32, baseline_y: f32, font_px: f32, text: &str, color: Rgba<u8>);
}

/// A font that can both measure and rasterize text.
pub trait Typeface: TextMeasurer + Send + Sync {
    fn draw(
        &self,
        image: &mut RgbaImage,
        x: f32,
        baseline_y: f32,
        font_px: f32,
        text: &str,
        color: Rgba<u8>,
    );
}

impl Typeface for FontArc {
    fn draw(
        &self,
        image: &mut RgbaImage,
        x: f32,
        baseline_y: f32,
        font_px: f32,
        text: &str,
        color: Rgba<u8>,
    ) {
        let scale = PxScale::from(font_px);
        // imageproc positions text by its top edge.
        let top = baseline_y - self.as_scaled(scale).ascent();
        draw_text_mut(
            image,
            color,
            x.round() as i32,
            top.round() as i32,
            scale,
            self,
            text,
        );
    }
}

/// Load a TTF/OTF font for rendering.
pub fn load_font(path: &Path) -> anyhow::Result<FontArc> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?;
    FontArc::try_from_vec(bytes).with_context(|| format!("invalid font file {}", path.display()))
}

/// [`Surface`] over an owned RGBA image.
pub struct RasterCanvas<'f, T: Typeface + ?Sized> {
    image: RgbaImage,
    face: &'f T,
}

impl<'f, T: Typeface + ?Sized> RasterCanvas<'f, T> {
    pub fn new(image: RgbaImage, face: &'f T) -> Self {
        Self { image, face }
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

impl<T: Typeface + ?Sized> Surface for RasterCanvas<'_, T> {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn fill_rounded_rect(&mut self, rect: BubbleRect, radius: f32, color: Rgba<u8>) {
        // Keeps every corner computation below inside i32.
        let (width, height) = self.image.dimensions();
        let Some(rect) = rect.clip_to(width, height) else {
            return;
        };

        let x = rect.x.round() as i32;
        let y = rect.y.round() as i32;
        let w = rect.width.round() as i32;
        let h = rect.height.round() as i32;
        if w <= 0 || h <= 0 {
            return;
        }

        let r = clamp_radius(radius, w as f32, h as f32).floor() as i32;
        let image = &mut self.image;

        // Cross of two rectangles plus a disc in each corner.
        if w > 2 * r {
            draw_filled_rect_mut(image, Rect::at(x + r, y).of_size((w - 2 * r) as u32, h as u32), color);
        }
        if h > 2 * r {
            draw_filled_rect_mut(image, Rect::at(x, y + r).of_size(w as u32, (h - 2 * r) as u32), color);
        }
        if r > 0 {
            for (cx, cy) in [
                (x + r, y + r),
                (x + w - 1 - r, y + r),
                (x + r, y + h - 1 - r),
                (x + w - 1 - r, y + h - 1 - r),
            ] {
                draw_filled_circle_mut(image, (cx, cy), r, color);
            }
        }
    }

    fn draw_text(&mut self, x: f32, baseline_y: f32, font_px: f32, text: &str, color: Rgba<u8>) {
        self.face.draw(&mut self.image, x, baseline_y, font_px, text, color);
    }
}

/// Colors and sizes used when compositing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositorStyle {
    pub corner_radius: f32,
    pub bubble_color: Rgba<u8>,
    pub text_color: Rgba<u8>,
    /// Upper bound the layout starts shrinking from
    pub start_font_px: f32,
    pub layout: LayoutParams,
}

impl Default for CompositorStyle {
    fn default() -> Self {
        Self::from(&RenderConfig::default())
    }
}

impl From<&RenderConfig> for CompositorStyle {
    fn from(config: &RenderConfig) -> Self {
        Self {
            corner_radius: config.corner_radius,
            bubble_color: Rgba(config.bubble_color),
            text_color: Rgba(config.text_color),
            start_font_px: config.start_font_px,
            layout: LayoutParams::from(config),
        }
    }
}

/// What a compositing pass drew.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositeReport {
    pub bubbles: usize,
    pub text_blocks: usize,
    /// Regions whose text could not be fitted (bubble only)
    pub unfitted: usize,
    /// Regions with text whose box lies entirely off the image
    pub offscreen: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Compositor {
    style: CompositorStyle,
}

impl Compositor {
    #[must_use]
    pub fn new(style: CompositorStyle) -> Self {
        Self { style }
    }

    #[must_use]
    pub fn style(&self) -> &CompositorStyle {
        &self.style
    }

    /// Paint bubbles and translated text for `regions` onto `surface`.
    pub fn composite<S, M>(
        &self,
        surface: &mut S,
        measurer: &M,
        regions: &[TranslationRegion],
    ) -> CompositeReport
    where
        S: Surface + ?Sized,
        M: TextMeasurer + ?Sized,
    {
        let (image_width, image_height) = surface.dimensions();
        let mut report = CompositeReport::default();

        let mut visible: Vec<(&TranslationRegion, BubbleRect)> = Vec::new();
        for region in regions.iter().filter(|r| r.has_text()) {
            match BubbleRect::from(region).clip_to(image_width, image_height) {
                Some(rect) => visible.push((region, rect)),
                None => {
                    debug!(
                        min_x = region.min_x,
                        min_y = region.min_y,
                        max_x = region.max_x,
                        max_y = region.max_y,
                        "Region off the image, skipped"
                    );
                    report.offscreen += 1;
                }
            }
        }

        for &(_, rect) in &visible {
            let radius = clamp_radius(self.style.corner_radius, rect.width, rect.height);
            surface.fill_rounded_rect(rect, radius, self.style.bubble_color);
            report.bubbles += 1;
        }

        let engine = TextLayoutEngine::new(measurer, self.style.layout);
        for &(region, rect) in &visible {
            let bounds = TextBox {
                offset_x: rect.x,
                start_y: rect.y,
                max_width: rect.width,
                max_height: rect.height,
            };

            match engine.fit(region.translated_text.trim(), bounds, self.style.start_font_px) {
                Ok(block) => {
                    for line in &block.lines {
                        surface.draw_text(
                            bounds.offset_x,
                            line.offset_y,
                            line.font_px,
                            &line.text,
                            self.style.text_color,
                        );
                    }
                    report.text_blocks += 1;
                }
                Err(e) => {
                    warn!(text = %region.translated_text, "Leaving bubble empty: {e}");
                    report.unfitted += 1;
                }
            }
        }

        debug!(
            bubbles = report.bubbles,
            text_blocks = report.text_blocks,
            unfitted = report.unfitted,
            offscreen = report.offscreen,
            "Composited regions"
        );
        report
    }

    /// Composite onto an owned image and return it.
    pub fn render<T: Typeface + ?Sized>(
        &self,
        image: RgbaImage,
        face: &T,
        regions: &[TranslationRegion],
    ) -> (RgbaImage, CompositeReport) {
        let mut canvas = RasterCanvas::new(image, face);
        let report = self.composite(&mut canvas, face, regions);
        (canvas.into_image(), report)
    }
}
