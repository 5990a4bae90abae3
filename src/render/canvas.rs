use anyhow::{anyhow, Result};
use tiny_skia::{
    Color, FillRule, FilterQuality, IntRect, Mask, Paint, Path, PathBuilder, Pixmap, PixmapPaint,
    Rect, Shader, Stroke, Transform,
};

#[derive(Clone, Copy, Debug)]
struct DrawState {
    transform: Transform,
    alpha: f32,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            transform: Transform::identity(),
            alpha: 1.0,
        }
    }
}

/// Software render target with a save/restore stack of transform and
/// global alpha, so layers can be drawn independently of each other.
pub struct Canvas {
    pixmap: Pixmap,
    state: DrawState,
    stack: Vec<DrawState>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let pixmap = Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("failed to allocate {}x{} canvas", width, height))?;
        Ok(Self::from_pixmap(pixmap))
    }

    pub fn from_pixmap(pixmap: Pixmap) -> Self {
        Self {
            pixmap,
            state: DrawState::default(),
            stack: Vec::new(),
        }
    }

    pub fn width(&self) -> f32 {
        self.pixmap.width() as f32
    }

    pub fn height(&self) -> f32 {
        self.pixmap.height() as f32
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn save(&mut self) {
        self.stack.push(self.state);
    }

    /// Unbalanced restores fall back to the identity state.
    pub fn restore(&mut self) {
        self.state = self.stack.pop().unwrap_or_default();
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn transform(&self) -> Transform {
        self.state.transform
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.state.transform = self.state.transform.pre_translate(dx, dy);
    }

    pub fn scale(&mut self, sx: f32, sy: f32) {
        self.state.transform = self.state.transform.pre_scale(sx, sy);
    }

    pub fn rotate(&mut self, degrees: f32) {
        self.state.transform = self.state.transform.pre_concat(Transform::from_rotate(degrees));
    }

    pub fn alpha(&self) -> f32 {
        self.state.alpha
    }

    /// Multiplies into the current global alpha.
    pub fn set_alpha(&mut self, alpha: f32) {
        self.state.alpha = (self.state.alpha * alpha).clamp(0.0, 1.0);
    }

    pub fn clear(&mut self, color: Color) {
        self.pixmap.fill(color);
    }

    fn paint(&self, mut color: Color) -> Paint<'static> {
        color.apply_opacity(self.state.alpha);
        let mut paint = Paint::default();
        paint.set_color(color);
        paint.anti_alias = true;
        paint
    }

    /// Scale a color by the current global alpha, for building gradient stops.
    pub fn tint(&self, mut color: Color) -> Color {
        color.apply_opacity(self.state.alpha);
        color
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color) {
        let Some(rect) = Rect::from_xywh(x, y, w, h) else {
            return;
        };
        let paint = self.paint(color);
        self.pixmap.fill_rect(rect, &paint, self.state.transform, None);
    }

    pub fn fill_circle(&mut self, cx: f32, cy: f32, r: f32, color: Color) {
        if let Some(path) = PathBuilder::from_circle(cx, cy, r.max(0.01)) {
            self.fill_path(&path, color);
        }
    }

    pub fn stroke_circle(&mut self, cx: f32, cy: f32, r: f32, width: f32, color: Color) {
        if let Some(path) = PathBuilder::from_circle(cx, cy, r.max(0.01)) {
            self.stroke_path(&path, width, color);
        }
    }

    pub fn fill_path(&mut self, path: &Path, color: Color) {
        let paint = self.paint(color);
        self.pixmap
            .fill_path(path, &paint, FillRule::Winding, self.state.transform, None);
    }

    pub fn fill_path_with(&mut self, path: &Path, shader: Shader<'_>) {
        let mut paint = Paint::default();
        paint.shader = shader;
        paint.anti_alias = true;
        self.pixmap
            .fill_path(path, &paint, FillRule::Winding, self.state.transform, None);
    }

    pub fn stroke_path_with(&mut self, path: &Path, width: f32, shader: Shader<'_>) {
        let mut paint = Paint::default();
        paint.shader = shader;
        paint.anti_alias = true;
        let stroke = Stroke {
            width: width.max(0.1),
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(path, &paint, &stroke, self.state.transform, None);
    }

    pub fn stroke_path(&mut self, path: &Path, width: f32, color: Color) {
        let paint = self.paint(color);
        let stroke = Stroke {
            width: width.max(0.1),
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(path, &paint, &stroke, self.state.transform, None);
    }

    pub fn line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, width: f32, color: Color) {
        let mut pb = PathBuilder::new();
        pb.move_to(x0, y0);
        pb.line_to(x1, y1);
        if let Some(path) = pb.finish() {
            self.stroke_path(&path, width, color);
        }
    }

    /// Draw `image` stretched into the destination rectangle.
    pub fn draw_image(&mut self, image: &Pixmap, x: f32, y: f32, w: f32, h: f32) {
        self.draw_image_masked(image, x, y, w, h, None);
    }

    pub fn draw_image_masked(
        &mut self,
        image: &Pixmap,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        mask: Option<&Mask>,
    ) {
        if image.width() == 0 || image.height() == 0 || w <= 0.0 || h <= 0.0 {
            return;
        }
        let transform = self
            .state
            .transform
            .pre_translate(x, y)
            .pre_scale(w / image.width() as f32, h / image.height() as f32);
        let paint = PixmapPaint {
            opacity: self.state.alpha,
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        self.pixmap
            .draw_pixmap(0, 0, image.as_ref(), &paint, transform, mask);
    }

    /// Draw `image` into the rectangle, visible only inside `clip`.
    pub fn draw_image_clipped(&mut self, image: &Pixmap, x: f32, y: f32, w: f32, h: f32, clip: &Path) {
        let Some(mut mask) = Mask::new(self.pixmap.width(), self.pixmap.height()) else {
            return;
        };
        mask.fill_path(clip, FillRule::Winding, true, self.state.transform);
        self.draw_image_masked(image, x, y, w, h, Some(&mask));
    }

    /// Copy a horizontal band of the current pixels and paste it shifted by `dx`.
    /// Works in device space, ignoring the transform stack.
    pub fn shift_band(&mut self, y: f32, h: f32, dx: f32) {
        let Some(rect) = IntRect::from_xywh(0, y as i32, self.pixmap.width(), h.max(1.0) as u32) else {
            return;
        };
        let Some(band) = self.pixmap.clone_rect(rect) else {
            return;
        };
        self.pixmap.draw_pixmap(
            dx as i32,
            y as i32,
            band.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    /// Straight (non-premultiplied) RGBA bytes, the layout the encoder expects.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut bytes = self.pixmap.data().to_vec();
        unpremultiply_rgba_in_place(&mut bytes);
        bytes
    }
}

pub fn rounded_rect_path(x: f32, y: f32, w: f32, h: f32, radius: f32) -> Option<Path> {
    let r = radius.min(w / 2.0).min(h / 2.0).max(0.0);
    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(x + w - r, y);
    pb.quad_to(x + w, y, x + w, y + r);
    pb.line_to(x + w, y + h - r);
    pb.quad_to(x + w, y + h, x + w - r, y + h);
    pb.line_to(x + r, y + h);
    pb.quad_to(x, y + h, x, y + h - r);
    pb.line_to(x, y + r);
    pb.quad_to(x, y, x + r, y);
    pb.close();
    pb.finish()
}

/// Cover-fit rectangle for an image of `iw`x`ih` inside `w`x`h`.
pub fn cover_rect(iw: f32, ih: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    if iw <= 0.0 || ih <= 0.0 {
        return (0.0, 0.0, w, h);
    }
    let scale = (w / iw).max(h / ih);
    let (dw, dh) = (iw * scale, ih * scale);
    ((w - dw) / 2.0, (h - dh) / 2.0, dw, dh)
}

/// Build a pixmap from straight RGBA bytes.
pub fn pixmap_from_rgba(width: u32, height: u32, mut rgba: Vec<u8>) -> Result<Pixmap> {
    if rgba.len() != (width as usize) * (height as usize) * 4 {
        return Err(anyhow!(
            "rgba buffer of {} bytes does not match {}x{}",
            rgba.len(),
            width,
            height
        ));
    }
    premultiply_rgba_in_place(&mut rgba);
    let mut pixmap =
        Pixmap::new(width, height).ok_or_else(|| anyhow!("failed to allocate {}x{} pixmap", width, height))?;
    pixmap.data_mut().copy_from_slice(&rgba);
    Ok(pixmap)
}

fn premultiply_rgba_in_place(bytes: &mut [u8]) {
    for pixel in bytes.chunks_exact_mut(4) {
        let alpha = pixel[3] as u16;
        pixel[0] = ((pixel[0] as u16 * alpha + 127) / 255) as u8;
        pixel[1] = ((pixel[1] as u16 * alpha + 127) / 255) as u8;
        pixel[2] = ((pixel[2] as u16 * alpha + 127) / 255) as u8;
    }
}

fn unpremultiply_rgba_in_place(bytes: &mut [u8]) {
    for pixel in bytes.chunks_exact_mut(4) {
        let alpha = pixel[3];
        if alpha == 0 {
            pixel[0] = 0;
            pixel[1] = 0;
            pixel[2] = 0;
            continue;
        }
        let a = alpha as u16;
        pixel[0] = ((pixel[0] as u16 * 255 + a / 2) / a).min(255) as u8;
        pixel[1] = ((pixel[1] as u16 * 255 + a / 2) / a).min(255) as u8;
        pixel[2] = ((pixel[2] as u16 * 255 + a / 2) / a).min(255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(canvas: &Canvas, x: u32, y: u32) -> [u8; 4] {
        let rgba = canvas.to_rgba();
        let i = ((y * canvas.pixmap().width() + x) * 4) as usize;
        [rgba[i], rgba[i + 1], rgba[i + 2], rgba[i + 3]]
    }

    #[test]
    fn restore_undoes_transform_and_alpha() {
        let mut canvas = Canvas::new(10, 10).unwrap();
        canvas.save();
        canvas.translate(5.0, 5.0);
        canvas.set_alpha(0.5);
        canvas.restore();
        assert_eq!(canvas.transform(), Transform::identity());
        assert_eq!(canvas.alpha(), 1.0);
        assert_eq!(canvas.depth(), 0);
        canvas.restore();
        assert_eq!(canvas.depth(), 0);
    }

    #[test]
    fn translated_fill_lands_offset() {
        let mut canvas = Canvas::new(10, 10).unwrap();
        canvas.translate(5.0, 0.0);
        canvas.fill_rect(0.0, 0.0, 2.0, 2.0, Color::from_rgba8(255, 0, 0, 255));
        assert_eq!(pixel(&canvas, 0, 0)[3], 0);
        assert_eq!(pixel(&canvas, 5, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn rgba_round_trip_through_pixmap() {
        let data = vec![200, 100, 50, 128, 0, 0, 0, 0];
        let pixmap = pixmap_from_rgba(2, 1, data).unwrap();
        let canvas = Canvas::from_pixmap(pixmap);
        let out = canvas.to_rgba();
        assert!((out[0] as i32 - 200).abs() <= 2);
        assert_eq!(out[3], 128);
        assert_eq!(&out[4..], &[0, 0, 0, 0]);
        assert!(pixmap_from_rgba(2, 2, vec![0; 4]).is_err());
    }

    #[test]
    fn cover_fit_fills_and_centers() {
        let (x, y, w, h) = cover_rect(100.0, 100.0, 200.0, 100.0);
        assert_eq!((w, h), (200.0, 200.0));
        assert_eq!((x, y), (0.0, -50.0));
    }
}
