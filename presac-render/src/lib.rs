mod render;
mod text;

pub use render::{FrameStats, Renderer, ScreenRenderer, SkiaRenderer, pixmap_from_rgba};
pub use text::{load_font, render_text_pixmap};
