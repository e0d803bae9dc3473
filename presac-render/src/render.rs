use crate::text::render_text_pixmap;
use ab_glyph::FontVec;
use anyhow::{Context, Result, anyhow, bail};
use bytemuck::{cast_slice, cast_slice_mut};
use presac_cache::Atom;
use presac_core::{Point, Screen, StimulusId};
use presac_timing::{CalibrationStats, HighPrecisionTimer, Timer};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tiny_skia::{Color, ColorU8, FillRule, Paint, PathBuilder, Pixmap, Rect, Transform};
use tracing::debug;

/// Mid grey, the presentation background
const BACKGROUND: [u8; 4] = [128, 128, 128, 255];

struct TextCache {
    font: FontVec,
    size_px: f32,
    max_width: f32,
    map: HashMap<Atom, Arc<Pixmap>>,
}

impl TextCache {
    fn get_or_render(&mut self, text: &str) -> Option<Arc<Pixmap>> {
        let atom = Atom::from(text);
        if let Some(p) = self.map.get(&atom) {
            return Some(Arc::clone(p));
        }
        let pm = Arc::new(render_text_pixmap(
            text,
            self.size_px,
            self.max_width,
            &self.font,
            Color::WHITE,
        )?);
        self.map.insert(atom, Arc::clone(&pm));
        Some(pm)
    }
}

/// Converts straight-alpha RGBA bytes into a premultiplied pixmap.
pub fn pixmap_from_rgba(width: u32, height: u32, rgba: &[u8]) -> Option<Pixmap> {
    let mut pm = Pixmap::new(width, height)?;
    let src: &[[u8; 4]] = bytemuck::try_cast_slice(rgba).ok()?;
    if src.len() != pm.pixels().len() {
        return None;
    }
    for (dst, s) in pm.pixels_mut().iter_mut().zip(src) {
        *dst = ColorU8::from_rgba(s[0], s[1], s[2], s[3]).premultiply();
    }
    Some(pm)
}

fn dot_pixmap(radius: f32) -> Option<Pixmap> {
    let size = (radius * 2.0).ceil() as u32;
    let mut pm = Pixmap::new(size, size)?;
    let mut paint = Paint::default();
    paint.set_color(Color::WHITE);
    let path = PathBuilder::from_circle(radius, radius, radius)?;
    pm.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    Some(pm)
}

/// Draws `src` centered on `pos` (canvas pixels), source-over in
/// premultiplied space. Returns the touched region.
fn blit_centered(canvas: &mut Pixmap, src: &Pixmap, pos: (f32, f32)) -> Option<Rect> {
    let (w, h) = (src.width() as i32, src.height() as i32);
    let (cw, ch) = (canvas.width() as i32, canvas.height() as i32);

    let x0 = (pos.0 - w as f32 * 0.5).floor() as i32;
    let y0 = (pos.1 - h as f32 * 0.5).floor() as i32;
    let dst_x = x0.max(0);
    let dst_y = y0.max(0);
    let dst_x_end = (x0 + w).min(cw);
    let dst_y_end = (y0 + h).min(ch);
    if dst_x_end <= dst_x || dst_y_end <= dst_y {
        return None;
    }

    let copy_w = (dst_x_end - dst_x) as usize;
    let copy_h = (dst_y_end - dst_y) as usize;
    let src_x = (dst_x - x0) as usize;
    let src_y = (dst_y - y0) as usize;
    let src_stride = w as usize;
    let dst_stride = cw as usize;

    let src_px: &[[u8; 4]] = cast_slice(src.data());
    let dst_px: &mut [[u8; 4]] = cast_slice_mut(canvas.data_mut());

    for row in 0..copy_h {
        let s0 = (src_y + row) * src_stride + src_x;
        let d0 = (dst_y as usize + row) * dst_stride + dst_x as usize;
        let s_row = &src_px[s0..s0 + copy_w];
        let d_row = &mut dst_px[d0..d0 + copy_w];

        // Opaque rows (image stimuli) are a plain copy
        if s_row.iter().all(|p| p[3] == 255) {
            d_row.copy_from_slice(s_row);
            continue;
        }
        for (d, s) in d_row.iter_mut().zip(s_row) {
            let inv = 255 - s[3] as u32;
            for c in 0..4 {
                d[c] = (s[c] as u32 + (d[c] as u32 * inv + 127) / 255) as u8;
            }
        }
    }

    Rect::from_xywh(dst_x as f32, dst_y as f32, copy_w as f32, copy_h as f32)
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameStats {
    pub clear: Duration,
    pub draw: Duration,
    pub copy: Duration,
    pub total: Duration,
    pub dirty_count: usize,
}

pub trait Renderer {
    fn clear_dirty(&mut self, dirty: &[Rect]);
    /// Returns false when no image is loaded for `id`.
    fn blit_stimulus(&mut self, id: &StimulusId, pos: (f32, f32)) -> bool;
    fn blit_text(&mut self, text: &str, pos: (f32, f32));
}

pub trait ScreenRenderer: Renderer {
    fn render_screen(&mut self, screen: &Screen) -> Result<()>;
}

pub struct SkiaRenderer {
    width: u32,
    height: u32,
    center: (f32, f32),

    fixation: Pixmap,
    drift_fixation: Pixmap,
    stimuli: HashMap<usize, Pixmap>,
    text_cache: Option<TextCache>,

    canvas: Pixmap,
    dirty_regions: Vec<Rect>,
    first_frame: bool,
    clear_buffer: Vec<u8>,

    component_timers: HashMap<&'static str, HighPrecisionTimer>,
}

fn background_buffer(width: u32, height: u32) -> Vec<u8> {
    BACKGROUND
        .into_iter()
        .cycle()
        .take((width * height * 4) as usize)
        .collect()
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let canvas = Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("invalid canvas size {width}x{height}"))?;
        let mut renderer = SkiaRenderer {
            width,
            height,
            center: (width as f32 / 2.0, height as f32 / 2.0),
            fixation: Pixmap::new(1, 1).context("pixmap")?,
            drift_fixation: Pixmap::new(1, 1).context("pixmap")?,
            stimuli: HashMap::new(),
            text_cache: None,
            canvas,
            dirty_regions: Vec::with_capacity(16),
            first_frame: true,
            clear_buffer: background_buffer(width, height),
            component_timers: ["draw", "clear", "copy", "total"]
                .iter()
                .map(|&k| (k, HighPrecisionTimer::new()))
                .collect(),
        };
        renderer.canvas.data_mut().copy_from_slice(&renderer.clear_buffer);
        renderer.set_dot_radii(10.0, 5.0)?;
        Ok(renderer)
    }

    pub fn set_dot_radii(&mut self, fixation: f32, drift: f32) -> Result<()> {
        self.fixation = dot_pixmap(fixation).context("invalid fixation radius")?;
        self.drift_fixation = dot_pixmap(drift).context("invalid drift fixation radius")?;
        Ok(())
    }

    /// Enables text screens. Lines wrap at 80% of the screen width.
    pub fn set_font(&mut self, font: FontVec, size_px: f32) {
        self.text_cache = Some(TextCache {
            font,
            size_px,
            max_width: self.width as f32 * 0.8,
            map: HashMap::new(),
        });
    }

    /// Loads and scales a stimulus image to `size_px` square.
    pub fn load_stimulus(&mut self, id: &StimulusId, path: &Path, size_px: u32) -> Result<()> {
        let img = image::open(path)
            .with_context(|| format!("failed to load stimulus {}", path.display()))?
            .resize_exact(size_px, size_px, image::imageops::FilterType::Triangle)
            .to_rgba8();
        let pm = pixmap_from_rgba(img.width(), img.height(), img.as_raw())
            .with_context(|| format!("invalid stimulus image {}", path.display()))?;
        self.insert_stimulus_pixmap(id, pm);
        Ok(())
    }

    pub fn insert_stimulus_pixmap(&mut self, id: &StimulusId, pixmap: Pixmap) {
        debug!(stimulus = %id, "cached stimulus");
        self.stimuli.insert(id.cache_id(), pixmap);
    }

    pub fn has_stimulus(&self, id: &StimulusId) -> bool {
        self.stimuli.contains_key(&id.cache_id())
    }

    pub fn stimulus_count(&self) -> usize {
        self.stimuli.len()
    }

    /// Screen-centered coordinates (y up) to canvas pixels.
    pub fn to_canvas(&self, pos: Point) -> (f32, f32) {
        (self.center.0 + pos.0 as f32, self.center.1 - pos.1 as f32)
    }

    pub fn component_stats(&self, name: &str) -> Option<CalibrationStats> {
        self.component_timers.get(name).map(Timer::calibration_stats)
    }

    fn clear_dirty(&mut self, dirty: &[Rect]) {
        let stride = self.width as usize * 4;
        let canvas_data = self.canvas.data_mut();

        for rect in dirty {
            let x0 = rect.x().floor().max(0.0).min(self.width as f32) as usize;
            let y0 = rect.y().floor().max(0.0).min(self.height as f32) as usize;
            let x1 = (rect.x() + rect.width()).ceil().min(self.width as f32) as usize;
            let y1 = (rect.y() + rect.height()).ceil().min(self.height as f32) as usize;
            if x1 <= x0 || y1 <= y0 {
                continue;
            }
            let row_len = (x1 - x0) * 4;
            for y in y0..y1 {
                let off = y * stride + x0 * 4;
                canvas_data[off..off + row_len]
                    .copy_from_slice(&self.clear_buffer[off..off + row_len]);
            }
        }
    }

    fn copy_dirty_region(&self, dirty: Rect, frame_buffer: &mut [u8]) {
        let (x0, y0, x1, y1) = (
            dirty.x().floor().max(0.0).min(self.width as f32) as usize,
            dirty.y().floor().max(0.0).min(self.height as f32) as usize,
            (dirty.x() + dirty.width()).ceil().min(self.width as f32) as usize,
            (dirty.y() + dirty.height()).ceil().min(self.height as f32) as usize,
        );
        if x1 <= x0 || y1 <= y0 {
            return;
        }
        let bytes = (x1 - x0) * 4;
        let row_bytes = self.width as usize * 4;
        let canvas_data = self.canvas.data();
        for row in y0..y1 {
            let off = row * row_bytes + x0 * 4;
            frame_buffer[off..off + bytes].copy_from_slice(&canvas_data[off..off + bytes]);
        }
    }

    fn coalesce_dirty(rects: &mut Vec<Rect>) {
        rects.sort_by(|a, b| a.y().total_cmp(&b.y()).then(a.x().total_cmp(&b.x())));
        let mut out: Vec<Rect> = Vec::with_capacity(rects.len());
        for r in rects.drain(..) {
            if let Some(last) = out.last_mut() {
                let same_row =
                    (r.y() - last.y()).abs() < 1.0 && (r.height() - last.height()).abs() < 1.0;
                let touching = r.x() <= last.x() + last.width() + 1.0;
                if same_row && touching {
                    let nx = last.x().min(r.x());
                    let nx2 = (last.x() + last.width()).max(r.x() + r.width());
                    if let Some(merged) = Rect::from_xywh(nx, last.y(), nx2 - nx, last.height()) {
                        *last = merged;
                        continue;
                    }
                }
            }
            out.push(r);
        }
        *rects = out;
    }

    /// Draws `screen` and copies every changed region into `frame_buffer`
    /// (RGBA, same size as the renderer).
    pub fn render_frame(&mut self, screen: &Screen, frame_buffer: &mut [u8]) -> Result<FrameStats> {
        if frame_buffer.len() != self.clear_buffer.len() {
            bail!(
                "frame buffer holds {} bytes, renderer needs {}",
                frame_buffer.len(),
                self.clear_buffer.len()
            );
        }
        let clock = HighPrecisionTimer::new();
        if self.first_frame {
            self.first_frame = false;
            self.canvas.data_mut().copy_from_slice(&self.clear_buffer);
            frame_buffer.copy_from_slice(&self.clear_buffer);
            self.dirty_regions.clear();
        }

        // 1) Clear what the previous frame drew
        let old_dirty = std::mem::take(&mut self.dirty_regions);
        let t = clock.now();
        SkiaRenderer::clear_dirty(self, &old_dirty);
        let t_clear = clock.elapsed(t);

        // 2) Draw new content
        let t = clock.now();
        self.render_screen(screen)?;
        let t_draw = clock.elapsed(t);

        // 3) Copy old and new regions to the visible buffer
        let mut present_rects = old_dirty;
        present_rects.extend_from_slice(&self.dirty_regions);
        SkiaRenderer::coalesce_dirty(&mut present_rects);
        let t = clock.now();
        for rect in &present_rects {
            self.copy_dirty_region(*rect, frame_buffer);
        }
        let t_copy = clock.elapsed(t);

        let total = t_clear + t_draw + t_copy;
        for (name, d) in [("draw", t_draw), ("clear", t_clear), ("copy", t_copy), ("total", total)] {
            if let Some(timer) = self.component_timers.get_mut(name) {
                timer.record_frame(d);
            }
        }

        Ok(FrameStats {
            clear: t_clear,
            draw: t_draw,
            copy: t_copy,
            total,
            dirty_count: self.dirty_regions.len(),
        })
    }

    fn push_dirty(&mut self, rect: Option<Rect>) {
        if let Some(r) = rect {
            self.dirty_regions.push(r);
        }
    }
}

impl Renderer for SkiaRenderer {
    fn clear_dirty(&mut self, dirty: &[Rect]) {
        SkiaRenderer::clear_dirty(self, dirty);
    }

    fn blit_stimulus(&mut self, id: &StimulusId, pos: (f32, f32)) -> bool {
        let Some(pm) = self.stimuli.get(&id.cache_id()) else {
            return false;
        };
        let rect = blit_centered(&mut self.canvas, pm, pos);
        self.push_dirty(rect);
        true
    }

    fn blit_text(&mut self, text: &str, pos: (f32, f32)) {
        let Some(pm) = self.text_cache.as_mut().and_then(|c| c.get_or_render(text)) else {
            return;
        };
        let rect = blit_centered(&mut self.canvas, &pm, pos);
        self.push_dirty(rect);
    }
}

impl ScreenRenderer for SkiaRenderer {
    fn render_screen(&mut self, screen: &Screen) -> Result<()> {
        match screen {
            Screen::Blank => {}
            Screen::Text(text) => {
                if self.text_cache.is_none() {
                    bail!("no font loaded to show {text:?}");
                }
                self.blit_text(text, self.center);
            }
            Screen::Fixation => {
                let rect = blit_centered(&mut self.canvas, &self.fixation, self.center);
                self.push_dirty(rect);
            }
            Screen::DriftFixation => {
                let rect = blit_centered(&mut self.canvas, &self.drift_fixation, self.center);
                self.push_dirty(rect);
            }
            Screen::Stimuli { stimuli, positions } => {
                for (id, pos) in stimuli.iter().zip(positions) {
                    let at = self.to_canvas(*pos);
                    if !self.blit_stimulus(id, at) {
                        bail!("stimulus {id} has no loaded image");
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u32 = 400;
    const H: u32 = 200;

    fn pixel(fb: &[u8], x: u32, y: u32) -> [u8; 4] {
        let i = ((y * W + x) * 4) as usize;
        [fb[i], fb[i + 1], fb[i + 2], fb[i + 3]]
    }

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> Pixmap {
        let bytes: Vec<u8> = rgba.into_iter().cycle().take((w * h * 4) as usize).collect();
        pixmap_from_rgba(w, h, &bytes).unwrap()
    }

    #[test]
    fn fixation_dot_is_drawn_at_the_center() {
        let mut r = SkiaRenderer::new(W, H).unwrap();
        let mut fb = vec![0u8; (W * H * 4) as usize];
        r.render_frame(&Screen::Fixation, &mut fb).unwrap();
        assert_eq!(pixel(&fb, W / 2, H / 2), [255, 255, 255, 255]);
        assert_eq!(pixel(&fb, 0, 0), BACKGROUND);
    }

    #[test]
    fn stimuli_land_at_their_slots_and_are_cleared_afterwards() {
        let mut r = SkiaRenderer::new(W, H).unwrap();
        let ids = [
            StimulusId::new("render-left"),
            StimulusId::new("render-center"),
            StimulusId::new("render-right"),
        ];
        r.insert_stimulus_pixmap(&ids[0], solid(20, 20, [255, 0, 0, 255]));
        r.insert_stimulus_pixmap(&ids[1], solid(20, 20, [0, 255, 0, 255]));
        r.insert_stimulus_pixmap(&ids[2], solid(20, 20, [0, 0, 255, 255]));
        let screen = Screen::Stimuli {
            stimuli: ids.clone(),
            positions: [(-100.0, 0.0), (0.0, 0.0), (100.0, 50.0)],
        };
        let mut fb = vec![0u8; (W * H * 4) as usize];
        let stats = r.render_frame(&screen, &mut fb).unwrap();
        assert_eq!(stats.dirty_count, 3);
        assert_eq!(pixel(&fb, 100, 100), [255, 0, 0, 255]);
        assert_eq!(pixel(&fb, 200, 100), [0, 255, 0, 255]);
        // y grows upwards in screen-centered coordinates
        assert_eq!(pixel(&fb, 300, 50), [0, 0, 255, 255]);

        r.render_frame(&Screen::Blank, &mut fb).unwrap();
        assert_eq!(pixel(&fb, 100, 100), BACKGROUND);
        assert_eq!(pixel(&fb, 300, 50), BACKGROUND);
    }

    #[test]
    fn missing_stimulus_image_is_an_error() {
        let mut r = SkiaRenderer::new(W, H).unwrap();
        let screen = Screen::Stimuli {
            stimuli: [
                StimulusId::new("nope-a"),
                StimulusId::new("nope-b"),
                StimulusId::new("nope-c"),
            ],
            positions: [(-100.0, 0.0), (0.0, 0.0), (100.0, 0.0)],
        };
        let mut fb = vec![0u8; (W * H * 4) as usize];
        assert!(r.render_frame(&screen, &mut fb).is_err());
    }

    #[test]
    fn text_without_font_is_an_error() {
        let mut r = SkiaRenderer::new(W, H).unwrap();
        let mut fb = vec![0u8; (W * H * 4) as usize];
        assert!(r.render_frame(&Screen::Text("Ready?".into()), &mut fb).is_err());
    }

    #[test]
    fn frame_buffer_size_is_checked() {
        let mut r = SkiaRenderer::new(W, H).unwrap();
        let mut fb = vec![0u8; 16];
        assert!(r.render_frame(&Screen::Blank, &mut fb).is_err());
    }

    #[test]
    fn half_transparent_pixels_blend_over_the_background() {
        let mut r = SkiaRenderer::new(W, H).unwrap();
        let id = StimulusId::new("render-ghost");
        r.insert_stimulus_pixmap(&id, solid(4, 4, [255, 255, 255, 128]));
        let mut fb = vec![0u8; (W * H * 4) as usize];
        r.render_frame(&Screen::Blank, &mut fb).unwrap();
        assert!(r.blit_stimulus(&id, (10.0, 10.0)));
        let px = &r.canvas.data()[((10 * W + 10) * 4) as usize..][..4];
        assert!(px[0] > 180 && px[0] < 200, "{px:?}");
        assert_eq!(px[3], 255);
    }
}
