//! Shrink-to-fit text layout.
//!
//! Lays out a string inside a fixed box by greedy word wrapping. When a word
//! is wider than the box, or the wrapped lines run past the bottom, the whole
//! layout is discarded and restarted at a smaller font size. Line breaks are
//! not carried over between attempts.
//!
//! Sizes shrink geometrically (`shrink_factor`, 0.75 by default) and the loop
//! stops at `min_font_px`, returning [`LayoutError::DoesNotFit`].
//!
//! Y offsets are text baselines: the first line sits at
//! `start_y + line_height`, each further line one `line_height` lower.

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use thiserror::Error;
use tracing::trace;

use crate::config::RenderConfig;

/// Width measurement for a single run of text.
pub trait TextMeasurer {
    /// Advance width of `text` in pixels at `font_px`.
    fn measure(&self, text: &str, font_px: f32) -> f32;
}

impl TextMeasurer for FontArc {
    fn measure(&self, text: &str, font_px: f32) -> f32 {
        let scaled = self.as_scaled(PxScale::from(font_px));
        let mut width = 0.0;
        let mut previous = None;
        for c in text.chars() {
            let glyph = scaled.glyph_id(c);
            if let Some(prev) = previous {
                width += scaled.kern(prev, glyph);
            }
            width += scaled.h_advance(glyph);
            previous = Some(glyph);
        }
        width
    }
}

/// Target rectangle, in image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBox {
    pub offset_x: f32,
    pub start_y: f32,
    pub max_width: f32,
    pub max_height: f32,
}

/// One finished line.
#[derive(Debug, Clone, PartialEq)]
pub struct LaidOutLine {
    pub text: String,
    /// Baseline y in image pixels
    pub offset_y: f32,
    pub font_px: f32,
}

/// Result of a successful fit.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub font_px: f32,
    pub line_height: f32,
    pub lines: Vec<LaidOutLine>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("text does not fit a {width}x{height} box at or above {min_font_px}px")]
    DoesNotFit {
        width: f32,
        height: f32,
        min_font_px: f32,
    },
}

/// Upper bound on shrink steps per [`TextLayoutEngine::fit`] call. Covers
/// 300px down to 8px at a shrink factor of 0.99.
pub const MAX_SHRINK_STEPS: usize = 1024;

/// Layout constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutParams {
    /// Line height as a multiple of the font size
    pub line_height: f32,
    pub shrink_factor: f32,
    pub min_font_px: f32,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            line_height: 1.375,
            shrink_factor: 0.75,
            min_font_px: 8.0,
        }
    }
}

impl From<&RenderConfig> for LayoutParams {
    fn from(config: &RenderConfig) -> Self {
        Self {
            line_height: config.line_height,
            shrink_factor: config.shrink_factor,
            min_font_px: config.min_font_px,
        }
    }
}

pub struct TextLayoutEngine<'a, M: TextMeasurer + ?Sized> {
    measurer: &'a M,
    params: LayoutParams,
}

impl<'a, M: TextMeasurer + ?Sized> TextLayoutEngine<'a, M> {
    pub fn new(measurer: &'a M, params: LayoutParams) -> Self {
        Self { measurer, params }
    }

    /// Fit `text` into `bounds`, starting at `start_font_px` and shrinking
    /// until it fits.
    ///
    /// Empty or whitespace-only text yields a block with no lines.
    ///
    /// Gives up with [`LayoutError::DoesNotFit`] below `min_font_px`, on a
    /// non-finite size, or after [`MAX_SHRINK_STEPS`] steps, whichever
    /// comes first.
    pub fn fit(&self, text: &str, bounds: TextBox, start_font_px: f32) -> Result<TextBlock, LayoutError> {
        let does_not_fit = || LayoutError::DoesNotFit {
            width: bounds.max_width,
            height: bounds.max_height,
            min_font_px: self.params.min_font_px,
        };

        if !start_font_px.is_finite() {
            return Err(does_not_fit());
        }

        let words: Vec<&str> = text.split_whitespace().collect();
        let mut size = start_font_px;
        let mut last_attempt = f32::INFINITY;

        for _ in 0..MAX_SHRINK_STEPS {
            let font_px = size.floor();
            if font_px.is_nan() || font_px < self.params.min_font_px || font_px < 1.0 {
                return Err(does_not_fit());
            }

            // Below ~4px a shrink step can floor to the same size; skip repeats.
            if font_px < last_attempt {
                last_attempt = font_px;
                if let Some(lines) = self.attempt(&words, bounds, font_px) {
                    return Ok(TextBlock {
                        font_px,
                        line_height: self.line_height(font_px),
                        lines,
                    });
                }
                trace!(font_px, "Text overflows, shrinking");
            }

            size *= self.params.shrink_factor;
        }

        Err(does_not_fit())
    }

    fn line_height(&self, font_px: f32) -> f32 {
        font_px * self.params.line_height
    }

    /// One layout pass at a fixed size; `None` means "shrink and restart".
    fn attempt(&self, words: &[&str], bounds: TextBox, font_px: f32) -> Option<Vec<LaidOutLine>> {
        let Some((first, rest)) = words.split_first() else {
            return Some(Vec::new());
        };

        let line_height = self.line_height(font_px);
        let bottom = bounds.start_y + bounds.max_height;
        let fits_width = |s: &str| self.measurer.measure(s, font_px) <= bounds.max_width;

        if !fits_width(first) {
            return None;
        }

        let mut lines = Vec::new();
        let mut current = (*first).to_string();
        let mut offset_y = bounds.start_y + line_height;
        if offset_y > bottom {
            return None;
        }

        for word in rest {
            if !fits_width(word) {
                return None;
            }

            let candidate = format!("{current} {word}");
            if self.measurer.measure(&candidate, font_px) < bounds.max_width {
                current = candidate;
            } else {
                lines.push(LaidOutLine {
                    text: std::mem::replace(&mut current, (*word).to_string()),
                    offset_y,
                    font_px,
                });
                offset_y += line_height;
            }

            if offset_y > bottom {
                return None;
            }
        }

        lines.push(LaidOutLine {
            text: current,
            offset_y,
            font_px,
        });
        Some(lines)
    }
}
