pub mod canvas;
pub mod palette;
pub mod text;

pub use canvas::Canvas;
pub use palette::{Palette, PaletteKind};
pub use text::{Align, TextRenderer};
