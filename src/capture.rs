//! =============================================================================
//! CAPTURE.RS - Bitmap capturé et extraction du pixel central
//! CAPTURE.RS - Captured bitmap and center-pixel extraction
//! =============================================================================

use crate::common::{Color, ColorSpace};
use crate::error::PickerError;

/// Ordre des octets d'un pixel / Byte order of a pixel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// Blue, Green, Red, Alpha: Core Graphics and GDI screen captures
    Bgra8,
    Rgba8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        4
    }
}

/// Bitmap capturé sous la loupe, lignes de haut en bas
/// Bitmap captured under the loupe, rows top-down
#[derive(Clone, Debug, PartialEq)]
pub struct PixelBuffer {
    width: usize,
    height: usize,
    bytes_per_row: usize,
    format: PixelFormat,
    color_space: ColorSpace,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wraps raw pixel rows. `bytes_per_row` may include row padding.
    pub fn new(
        width: usize,
        height: usize,
        bytes_per_row: usize,
        format: PixelFormat,
        color_space: ColorSpace,
        data: Vec<u8>,
    ) -> Result<Self, PickerError> {
        let min_row = width
            .checked_mul(format.bytes_per_pixel())
            .ok_or_else(|| PickerError::InvalidBuffer("width overflows".to_string()))?;
        if bytes_per_row < min_row {
            return Err(PickerError::InvalidBuffer(format!(
                "{} bytes per row is too small for {} pixels",
                bytes_per_row, width
            )));
        }
        let needed = bytes_per_row
            .checked_mul(height)
            .ok_or_else(|| PickerError::InvalidBuffer("height overflows".to_string()))?;
        if data.len() < needed {
            return Err(PickerError::InvalidBuffer(format!(
                "{} bytes of pixel data, {} needed",
                data.len(),
                needed
            )));
        }
        Ok(Self {
            width,
            height,
            bytes_per_row,
            format,
            color_space,
            data,
        })
    }

    /// Tightly packed buffer
    pub fn packed(
        width: usize,
        height: usize,
        format: PixelFormat,
        color_space: ColorSpace,
        data: Vec<u8>,
    ) -> Result<Self, PickerError> {
        Self::new(
            width,
            height,
            width * format.bytes_per_pixel(),
            format,
            color_space,
            data,
        )
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn color_space(&self) -> &ColorSpace {
        &self.color_space
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Couleur du pixel (x, y), y compté depuis le haut
    /// Color of pixel (x, y), y counted from the top
    pub fn pixel(&self, x: usize, y: usize) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y * self.bytes_per_row + x * self.format.bytes_per_pixel();
        let px = self.data.get(offset..offset + 4)?;
        let (r, g, b, a) = match self.format {
            PixelFormat::Bgra8 => (px[2], px[1], px[0], px[3]),
            PixelFormat::Rgba8 => (px[0], px[1], px[2], px[3]),
        };
        Some(Color {
            red: r,
            green: g,
            blue: b,
            alpha: a,
            color_space: self.color_space.clone(),
        })
    }

    /// Index of the center pixel: `(floor(width / 2), floor(height / 2))`
    pub fn center(&self) -> (usize, usize) {
        (self.width / 2, self.height / 2)
    }

    /// Couleur du pixel central, dans l'espace du bitmap
    /// Color of the center pixel, in the bitmap's color space
    pub fn center_color(&self) -> Option<Color> {
        if self.is_empty() {
            return None;
        }
        let (x, y) = self.center();
        self.pixel(x, y)
    }
}

/// Center color of the last captured frame, if any
pub fn color_at_center(frame: Option<&PixelBuffer>) -> Option<Color> {
    frame.and_then(PixelBuffer::center_color)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Synthetic BGRA bitmap where each pixel encodes its own coordinates
    fn coordinate_bitmap(width: usize, height: usize, padding: usize) -> PixelBuffer {
        let row = width * 4 + padding;
        let mut data = vec![0xEE; row * height];
        for y in 0..height {
            for x in 0..width {
                let offset = y * row + x * 4;
                data[offset] = 7; // B
                data[offset + 1] = y as u8; // G
                data[offset + 2] = x as u8; // R
                data[offset + 3] = 255;
            }
        }
        PixelBuffer::new(width, height, row, PixelFormat::Bgra8, ColorSpace::Srgb, data).unwrap()
    }

    #[test]
    fn test_center_pixel_exact() {
        for &(w, h) in &[(1, 1), (2, 2), (3, 5), (17, 17), (18, 17), (65, 65), (128, 3)] {
            let bitmap = coordinate_bitmap(w, h, 0);
            let color = bitmap.center_color().unwrap();
            assert_eq!(
                (color.red as usize, color.green as usize),
                (w / 2, h / 2),
                "bitmap {}x{}",
                w,
                h
            );
            assert_eq!(color.blue, 7);
        }
    }

    #[test]
    fn test_center_pixel_with_row_padding() {
        let bitmap = coordinate_bitmap(9, 4, 12);
        let color = bitmap.center_color().unwrap();
        assert_eq!((color.red, color.green), (4, 2));
    }

    #[test]
    fn test_rgba_order_and_color_space() {
        let data = vec![10, 20, 30, 40];
        let bitmap =
            PixelBuffer::packed(1, 1, PixelFormat::Rgba8, ColorSpace::DisplayP3, data).unwrap();
        let color = bitmap.center_color().unwrap();
        assert_eq!((color.red, color.green, color.blue, color.alpha), (10, 20, 30, 40));
        assert_eq!(color.color_space, ColorSpace::DisplayP3);
    }

    #[test]
    fn test_empty_and_missing_frames() {
        let empty = PixelBuffer::packed(0, 0, PixelFormat::Bgra8, ColorSpace::Srgb, Vec::new())
            .unwrap();
        assert!(empty.center_color().is_none());
        assert!(color_at_center(None).is_none());
        assert!(color_at_center(Some(&coordinate_bitmap(3, 3, 0))).is_some());
    }

    #[test]
    fn test_rejects_short_buffers() {
        let err = PixelBuffer::packed(4, 4, PixelFormat::Bgra8, ColorSpace::Srgb, vec![0; 10])
            .unwrap_err();
        assert!(matches!(err, PickerError::InvalidBuffer(_)));
        let err = PixelBuffer::new(4, 1, 8, PixelFormat::Bgra8, ColorSpace::Srgb, vec![0; 16])
            .unwrap_err();
        assert!(matches!(err, PickerError::InvalidBuffer(_)));
    }

    #[test]
    fn test_pixel_out_of_bounds() {
        let bitmap = coordinate_bitmap(3, 3, 0);
        assert!(bitmap.pixel(3, 0).is_none());
        assert!(bitmap.pixel(0, 3).is_none());
    }
}
