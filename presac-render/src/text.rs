use ab_glyph::{Font, FontVec, Glyph, GlyphId, PxScale, ScaleFont, point};
use anyhow::{Context, Result};
use std::path::Path;
use tiny_skia::{Color, Pixmap, PremultipliedColorU8};

pub fn load_font(path: &Path) -> Result<FontVec> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?;
    FontVec::try_from_vec(bytes).with_context(|| format!("invalid font {}", path.display()))
}

fn line_advance<F: Font>(font: &F, scale: PxScale, line: &str) -> f32 {
    let sf = font.as_scaled(scale);
    let mut width = 0.0;
    let mut prev: Option<GlyphId> = None;
    for ch in line.chars() {
        let id = font.glyph_id(ch);
        if let Some(p) = prev {
            width += sf.kern(p, id);
        }
        width += sf.h_advance(id);
        prev = Some(id);
    }
    width
}

/// Greedy word wrap to lines no wider than `max_width` (a single long word
/// still gets its own line).
fn wrap<F: Font>(font: &F, scale: PxScale, text: &str, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{current} {word}");
        if line_advance(font, scale, &candidate) > max_width {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Rasterizes `text` into a transparent premultiplied pixmap, wrapped to
/// `max_width` with every line centered.
pub fn render_text_pixmap<F: Font>(
    text: &str,
    font_size: f32,
    max_width: f32,
    font: &F,
    color: Color,
) -> Option<Pixmap> {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);
    let lines = wrap(font, scale, text, max_width);
    let widest = lines
        .iter()
        .map(|l| line_advance(font, scale, l))
        .fold(0.0f32, f32::max);

    // 1) Layout, baseline of the first line at ascent
    let mut glyphs = Vec::<Glyph>::new();
    for (row, line) in lines.iter().enumerate() {
        let mut pen_x = (widest - line_advance(font, scale, line)) * 0.5;
        let baseline = sf.ascent() + row as f32 * (sf.height() + sf.line_gap());
        let mut prev: Option<GlyphId> = None;
        for ch in line.chars() {
            let id = font.glyph_id(ch);
            if let Some(p) = prev {
                pen_x += sf.kern(p, id);
            }
            glyphs.push(Glyph {
                id,
                scale,
                position: point(pen_x, baseline),
            });
            pen_x += sf.h_advance(id);
            prev = Some(id);
        }
    }

    // 2) Union pixel bounds from outlined glyphs
    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    let outlines: Vec<_> = glyphs
        .iter()
        .filter_map(|g| font.outline_glyph(g.clone()))
        .collect();
    for out in &outlines {
        let b = out.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }

    if outlines.is_empty() {
        return Pixmap::new(1, 1);
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;

    // 3) Transparent premultiplied pixmap
    let mut pm = Pixmap::new(w, h)?;
    let stride = w as usize;
    let dst = pm.pixels_mut();

    let cu = [
        (color.red() * 255.0) as u8,
        (color.green() * 255.0) as u8,
        (color.blue() * 255.0) as u8,
        (color.alpha() * 255.0) as u8,
    ];

    // 4) Rasterize, source-over in premultiplied space
    for out in &outlines {
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x - min_x).floor() as i32;
            let iy = (y as f32 + b.min.y - min_y).floor() as i32;
            if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                return;
            }
            let i = iy as usize * stride + ix as usize;

            let a = (cov * cu[3] as f32 / 255.0).clamp(0.0, 1.0);
            let sa = (a * 255.0) as u8;
            let src = [
                (cu[0] as f32 * a) as u8,
                (cu[1] as f32 * a) as u8,
                (cu[2] as f32 * a) as u8,
            ];
            let bg = dst[i];
            let inv = 1.0 - sa as f32 / 255.0;
            let r = src[0].saturating_add((bg.red() as f32 * inv) as u8);
            let g = src[1].saturating_add((bg.green() as f32 * inv) as u8);
            let bl = src[2].saturating_add((bg.blue() as f32 * inv) as u8);
            let al = sa.saturating_add((bg.alpha() as f32 * inv) as u8);
            if let Some(px) = PremultipliedColorU8::from_rgba(r.min(al), g.min(al), bl.min(al), al) {
                dst[i] = px;
            }
        });
    }

    Some(pm)
}
