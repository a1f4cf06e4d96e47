//! Heatmap rendering
//!
//! Paints a merged probability field as a jet-colored PNG with a colorbar, the
//! cohort caption and, for rectangular containers, a dashed center line.

use crate::config::MergeConfig;
use crate::error::HeatmapError;
use crate::types::{ContainerShape, MergedField};
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const MARGIN: u32 = 20;
const TOP_BAND: u32 = 36;
const BAR_GAP: u32 = 20;
const BAR_WIDTH: u32 = 20;
const LABEL_WIDTH: u32 = 90;
const TICK_COUNT: u32 = 5;
const DASH_ON: u32 = 8;
const DASH_OFF: u32 = 6;
const CAPTION_PADDING: u32 = 4;

const COLORBAR_TITLE: &str = "Stay Probability (per second)";
const CENTER_LINE_LABEL: &str = "Center Line";

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);

/// Locations tried when no font is configured
const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Helvetica.ttc",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Rendering settings
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// Heatmap opacity over white
    pub alpha: f64,
    /// Approximate width of the heatmap area
    pub heatmap_width_px: u32,
    /// Font used for all text
    pub font_path: Option<PathBuf>,
}

impl From<&MergeConfig> for RenderOptions {
    fn from(config: &MergeConfig) -> Self {
        Self {
            alpha: config.heatmap_alpha,
            heatmap_width_px: config.heatmap_width_px,
            font_path: config.font_path.clone(),
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from(&MergeConfig::default())
    }
}

/// File name for a cohort image, `<label> (n=<N>).png`
pub fn output_file_name(label: &str, sample_size: usize) -> String {
    format!("{} (n={}).png", label, sample_size)
}

/// Jet colormap for `t` in `0..=1`
pub fn jet(t: f64) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let channel = |center: f64| {
        let v = (1.5 - (4.0 * t - center).abs()).clamp(0.0, 1.0);
        (v * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// Blend `color` over white with opacity `alpha`
pub fn blend_over_white(color: Rgb<u8>, alpha: f64) -> Rgb<u8> {
    let alpha = alpha.clamp(0.0, 1.0);
    let mix = |c: u8| (alpha * c as f64 + (1.0 - alpha) * 255.0).round() as u8;
    Rgb([mix(color[0]), mix(color[1]), mix(color[2])])
}

/// Renderer holding the options and the loaded font, if any
pub struct HeatmapRenderer {
    options: RenderOptions,
    font: Option<FontVec>,
}

impl HeatmapRenderer {
    /// Create a renderer, loading the configured font or the first system font found
    pub fn new(options: RenderOptions) -> Self {
        let font = load_font(options.font_path.as_deref());
        if font.is_none() {
            warn!("no usable font found; heatmap text will be omitted");
        }
        Self { options, font }
    }

    /// Create a renderer with an explicit font (or none)
    pub fn with_font(options: RenderOptions, font: Option<FontVec>) -> Self {
        Self { options, font }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Render `field` and write it as `<output_dir>/<label> (n=<N>).png`
    pub fn render_to_file(
        &self,
        field: &MergedField,
        label: &str,
        output_dir: &Path,
    ) -> Result<PathBuf, HeatmapError> {
        let image = self.render(field, label)?;
        let path = output_dir.join(output_file_name(label, field.sample_size));
        image.save(&path)?;
        debug!(path = %path.display(), "wrote heatmap");
        Ok(path)
    }

    /// Render `field` to an in-memory image
    pub fn render(&self, field: &MergedField, label: &str) -> Result<RgbImage, HeatmapError> {
        let (rows, cols) = field.probability_field.dim();
        if rows == 0 || cols == 0 {
            return Err(HeatmapError::InvalidArtifact(format!(
                "cannot render an empty {}x{} field for {}",
                rows, cols, label
            )));
        }

        let layout = Layout::new(rows, cols, self.options.heatmap_width_px);
        let mut image = RgbImage::from_pixel(layout.width, layout.height, WHITE);

        let (min, max) = field
            .probability_field
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;

        for ((y, x), &value) in field.probability_field.indexed_iter() {
            let t = if range > 0.0 { (value - min) / range } else { 0.0 };
            let color = blend_over_white(jet(t), self.options.alpha);
            let rect = Rect::at(
                (layout.heat_x + x as u32 * layout.cell) as i32,
                (layout.heat_y + y as u32 * layout.cell) as i32,
            )
            .of_size(layout.cell, layout.cell);
            draw_filled_rect_mut(&mut image, rect, color);
        }

        self.draw_colorbar(&mut image, &layout, min, max);

        if field.shape == ContainerShape::Rectangle {
            self.draw_center_line(&mut image, &layout, rows);
        }

        self.draw_caption(
            &mut image,
            &layout,
            &format!("{} (n={})", label, field.sample_size),
        );

        Ok(image)
    }

    fn draw_colorbar(&self, image: &mut RgbImage, layout: &Layout, min: f64, max: f64) {
        let bar_height = layout.heat_h;
        for py in 0..bar_height {
            let t = if bar_height > 1 {
                1.0 - py as f64 / (bar_height - 1) as f64
            } else {
                1.0
            };
            let color = blend_over_white(jet(t), self.options.alpha);
            for px in 0..BAR_WIDTH {
                image.put_pixel(layout.bar_x + px, layout.heat_y + py, color);
            }
        }

        let bar_right = (layout.bar_x + BAR_WIDTH) as f32;
        let bottom = (layout.heat_y + bar_height.saturating_sub(1)) as f32;
        let step = bar_height.saturating_sub(1) as f32 / (TICK_COUNT - 1) as f32;
        for i in 0..TICK_COUNT {
            let y = bottom - i as f32 * step;
            draw_line_segment_mut(image, (bar_right, y), (bar_right + 4.0, y), BLACK);

            let value = min + (max - min) * i as f64 / (TICK_COUNT - 1) as f64;
            self.draw_text(
                image,
                (layout.bar_x + BAR_WIDTH + 7) as i32,
                y as i32 - 6,
                12.0,
                BLACK,
                &format_tick(value),
            );
        }

        if let Some(font) = &self.font {
            let scale = PxScale::from(14.0);
            let (title_w, _) = text_size(scale, font, COLORBAR_TITLE);
            let x = layout.width.saturating_sub(MARGIN + title_w).min(layout.bar_x);
            draw_text_mut(image, BLACK, x as i32, 10, scale, font, COLORBAR_TITLE);
        }
    }

    fn draw_center_line(&self, image: &mut RgbImage, layout: &Layout, rows: usize) {
        // Through the middle of row `rows / 2`
        let y = (layout.heat_y + (rows as u32 / 2) * layout.cell + layout.cell / 2) as f32;
        let end = layout.heat_x + layout.heat_w;

        let mut x = layout.heat_x;
        while x < end {
            let dash_end = (x + DASH_ON).min(end) - 1;
            draw_line_segment_mut(image, (x as f32, y), (dash_end as f32, y), RED);
            draw_line_segment_mut(image, (x as f32, y + 1.0), (dash_end as f32, y + 1.0), RED);
            x += DASH_ON + DASH_OFF;
        }

        // Legend in the top band
        let legend_y = (TOP_BAND / 2) as f32;
        let legend_x = layout.heat_x as f32;
        draw_line_segment_mut(image, (legend_x, legend_y), (legend_x + 10.0, legend_y), RED);
        draw_line_segment_mut(
            image,
            (legend_x + 16.0, legend_y),
            (legend_x + 26.0, legend_y),
            RED,
        );
        self.draw_text(
            image,
            layout.heat_x as i32 + 32,
            legend_y as i32 - 7,
            13.0,
            BLACK,
            CENTER_LINE_LABEL,
        );
    }

    fn draw_caption(&self, image: &mut RgbImage, layout: &Layout, caption: &str) {
        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from(14.0);
        let (text_w, text_h) = text_size(scale, font, caption);
        let box_w = text_w + 2 * CAPTION_PADDING;
        let box_h = text_h + 2 * CAPTION_PADDING;

        let right = layout.heat_x + layout.heat_w;
        let bottom = layout.heat_y + layout.heat_h;
        let box_x = right.saturating_sub(box_w + CAPTION_PADDING).max(layout.heat_x);
        let box_y = bottom.saturating_sub(box_h + CAPTION_PADDING).max(layout.heat_y);

        shade_rect(image, box_x, box_y, box_w, box_h, 0.5);
        draw_text_mut(
            image,
            WHITE,
            (box_x + CAPTION_PADDING) as i32,
            (box_y + CAPTION_PADDING) as i32,
            scale,
            font,
            caption,
        );
    }

    fn draw_text(
        &self,
        image: &mut RgbImage,
        x: i32,
        y: i32,
        size: f32,
        color: Rgb<u8>,
        text: &str,
    ) {
        if let Some(font) = &self.font {
            draw_text_mut(image, color, x, y, PxScale::from(size), font, text);
        }
    }
}

/// Pixel geometry of one rendered image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    cell: u32,
    heat_x: u32,
    heat_y: u32,
    heat_w: u32,
    heat_h: u32,
    bar_x: u32,
    width: u32,
    height: u32,
}

impl Layout {
    fn new(rows: usize, cols: usize, heatmap_width_px: u32) -> Self {
        let cell = (heatmap_width_px / cols as u32).max(1);
        let heat_w = cols as u32 * cell;
        let heat_h = rows as u32 * cell;
        let bar_x = MARGIN + heat_w + BAR_GAP;
        Self {
            cell,
            heat_x: MARGIN,
            heat_y: TOP_BAND,
            heat_w,
            heat_h,
            bar_x,
            width: bar_x + BAR_WIDTH + LABEL_WIDTH + MARGIN,
            height: TOP_BAND + heat_h + MARGIN,
        }
    }
}

fn format_tick(value: f64) -> String {
    if value == 0.0 || value.abs() >= 0.01 {
        format!("{:.3}", value)
    } else {
        format!("{:.2e}", value)
    }
}

/// Darken a rectangle toward black by `opacity`
fn shade_rect(image: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, opacity: f64) {
    let x_end = (x + w).min(image.width());
    let y_end = (y + h).min(image.height());
    for py in y..y_end {
        for px in x..x_end {
            let pixel = image.get_pixel_mut(px, py);
            for channel in pixel.0.iter_mut() {
                *channel = (*channel as f64 * (1.0 - opacity)).round() as u8;
            }
        }
    }
}

fn load_font(configured: Option<&Path>) -> Option<FontVec> {
    if let Some(path) = configured {
        match read_font(path) {
            Some(font) => return Some(font),
            None => warn!(path = %path.display(), "configured font could not be loaded"),
        }
    }
    SYSTEM_FONT_PATHS
        .iter()
        .find_map(|candidate| read_font(Path::new(candidate)))
}

fn read_font(path: &Path) -> Option<FontVec> {
    let data = fs::read(path).ok()?;
    match FontVec::try_from_vec_and_index(data, 0) {
        Ok(font) => {
            debug!(path = %path.display(), "loaded font");
            Some(font)
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "not a usable font");
            None
        }
    }
}
