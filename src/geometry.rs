//! Capture-rectangle, overlay-origin and aperture arithmetic.
//!
//! Screen coordinates follow the Cocoa convention: origin at the bottom-left
//! of the display whose frame starts at (0, 0), y growing upwards. Capture
//! calls want top-left-origin rectangles, see [`capture_rect`].

use crate::config::{LoupeConfig, LoupeStyle};

/// Point en coordonnées écran (points) / Point in screen coordinates (points)
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub const fn square(side: f64) -> Self {
        Self::new(side, side)
    }
}

/// Rectangle (origin + size)
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    pub fn from_origin_size(origin: Point, size: Size) -> Self {
        Self { origin, size }
    }

    pub fn min_x(&self) -> f64 {
        self.origin.x
    }

    pub fn min_y(&self) -> f64 {
        self.origin.y
    }

    pub fn max_x(&self) -> f64 {
        self.origin.x + self.size.width
    }

    pub fn max_y(&self) -> f64 {
        self.origin.y + self.size.height
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.origin.x + self.size.width / 2.0,
            self.origin.y + self.size.height / 2.0,
        )
    }

    /// Containment like `NSMouseInRect` on an unflipped view: `[min_x, max_x)`
    /// horizontally, `(min_y, max_y]` vertically.
    ///
    /// With y growing upwards the top pixel row of a display reports
    /// `y == max_y` and the bottom row `0 < y <= 1`.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x() && p.x < self.max_x() && p.y > self.min_y() && p.y <= self.max_y()
    }
}

// =============================================================================
// CAPTURE
// =============================================================================

/// Side of the square screen region sampled at `zoom`
///
/// * `Loupe`: `frame / zoom`
/// * `Sampler`: `frame / 2^(zoom - 1) + 1`
pub fn capture_side(config: &LoupeConfig, zoom: i32) -> f64 {
    match config.style {
        LoupeStyle::Loupe => config.frame_size / zoom as f64,
        LoupeStyle::Sampler => config.frame_size / 2f64.powi(zoom - 1) + 1.0,
    }
}

/// Display whose frame origin is (0, 0): the one carrying the menu bar.
/// Falls back to the first display whose frame starts at x == 0.
pub fn origin_display(displays: &[Rect]) -> Option<Rect> {
    displays
        .iter()
        .find(|d| d.origin.x == 0.0 && d.origin.y == 0.0)
        .or_else(|| displays.iter().find(|d| d.origin.x == 0.0))
        .copied()
}

/// Converts a y coordinate between bottom-left and top-left conventions
#[inline]
pub fn flip_y(y: f64, reference_height: f64) -> f64 {
    reference_height - y
}

/// Capture rectangle centered on `pointer`, in top-left-origin coordinates.
///
/// Returns `None` when the pointer is on no display or when no display
/// starts at the coordinate origin; the caller skips the frame.
pub fn capture_rect(
    pointer: Point,
    zoom: i32,
    config: &LoupeConfig,
    displays: &[Rect],
) -> Option<Rect> {
    displays.iter().find(|d| d.contains(pointer))?;
    let reference = origin_display(displays)?;

    let side = capture_side(config, zoom);
    let half = (side / 2.0).floor();
    let x = pointer.x.floor() - half;
    let y = flip_y(pointer.y.floor(), reference.size.height) - half;
    Some(Rect::new(x, y, side, side))
}

/// Origin (bottom-left) that keeps an overlay of `size` centered on `pointer`
pub fn overlay_origin(pointer: Point, size: Size) -> Point {
    Point::new(
        pointer.x.floor() - (size.width / 2.0).floor(),
        pointer.y.floor() - (size.height / 2.0).floor(),
    )
}

/// Side of the reticle square drawn over the sampled pixel, in view points
pub fn aperture_size(config: &LoupeConfig, zoom: i32, view_width: f64) -> f64 {
    match config.style {
        LoupeStyle::Loupe => zoom as f64,
        LoupeStyle::Sampler => view_width / (2f64.powi(config.zoom_max - zoom + 1) + 1.0),
    }
}

/// Reticle rectangle centered in a view of `bounds`
pub fn aperture_rect(bounds: Rect, aperture: f64) -> Rect {
    Rect::new(
        bounds.origin.x + bounds.size.width / 2.0 - aperture / 2.0,
        bounds.origin.y + bounds.size.height / 2.0 - aperture / 2.0,
        aperture,
        aperture,
    )
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn single_display() -> Vec<Rect> {
        vec![Rect::new(0.0, 0.0, 1000.0, 800.0)]
    }

    #[test]
    fn test_capture_side_styles() {
        let loupe = LoupeConfig::loupe();
        assert!((capture_side(&loupe, 7) - 17.857).abs() < 0.001);
        assert!((capture_side(&loupe, 2) - 62.5).abs() < 1e-9);

        let sampler = LoupeConfig::sampler();
        assert_eq!(capture_side(&sampler, 1), 129.0);
        assert_eq!(capture_side(&sampler, 2), 65.0);
        assert_eq!(capture_side(&sampler, 7), 3.0);
    }

    #[test]
    fn test_capture_rect_example() {
        let rect = capture_rect(
            Point::new(500.0, 300.0),
            7,
            &LoupeConfig::loupe(),
            &single_display(),
        )
        .expect("pointer is on screen");
        // ≈ (491, 491) avec demi-côté exact, (492, 492) en arithmétique entière
        // ≈ (491, 491) with exact half side, (492, 492) with floor arithmetic
        assert!((rect.origin.x - 491.07).abs() <= 1.0);
        assert!((rect.origin.y - 491.07).abs() <= 1.0);
        assert_eq!(rect.origin, Point::new(492.0, 492.0));
        assert!((rect.size.width - 17.857).abs() < 0.001);
    }

    #[test]
    fn test_capture_rect_centered_for_all_zooms() {
        let displays = single_display();
        for config in [LoupeConfig::loupe(), LoupeConfig::sampler()] {
            for zoom in config.zoom_min..=config.zoom_max {
                for &(px, py) in &[
                    (0.0, 800.0),
                    (0.0, 1.0),
                    (10.5, 799.9),
                    (500.0, 300.0),
                    (999.2, 400.7),
                ] {
                    let pointer = Point::new(px, py);
                    let rect = capture_rect(pointer, zoom, &config, &displays).unwrap();
                    let center = rect.center();
                    // Pixel sous le pointeur, en coordonnées haut-gauche
                    // Pixel under the pointer, in top-left coordinates
                    let expected_x = f64::floor(px);
                    let expected_y = 800.0 - f64::floor(py);
                    assert!(
                        (center.x - expected_x).abs() <= 1.0,
                        "x off-center: zoom {} pointer {:?} rect {:?}",
                        zoom,
                        pointer,
                        rect
                    );
                    assert!(
                        (center.y - expected_y).abs() <= 1.0,
                        "y off-center: zoom {} pointer {:?} rect {:?}",
                        zoom,
                        pointer,
                        rect
                    );
                }
            }
        }
    }

    #[test]
    fn test_capture_rect_off_screen() {
        let rect = capture_rect(
            Point::new(1500.0, 300.0),
            7,
            &LoupeConfig::loupe(),
            &single_display(),
        );
        assert!(rect.is_none());
        assert!(capture_rect(Point::new(1.0, 1.0), 7, &LoupeConfig::loupe(), &[]).is_none());
    }

    #[test]
    fn test_capture_rect_secondary_display_uses_origin_height() {
        // Écran secondaire au-dessus à droite / Secondary display above right
        let displays = vec![
            Rect::new(0.0, 0.0, 1000.0, 800.0),
            Rect::new(1000.0, 200.0, 1920.0, 1080.0),
        ];
        let rect = capture_rect(
            Point::new(1500.0, 1000.0),
            2,
            &LoupeConfig::loupe(),
            &displays,
        )
        .unwrap();
        // y = 800 - 1000 - floor(62.5 / 2) = -231
        assert_eq!(rect.origin, Point::new(1469.0, -231.0));
    }

    #[test]
    fn test_origin_display_fallback() {
        let displays = vec![
            Rect::new(-1280.0, 0.0, 1280.0, 1024.0),
            Rect::new(0.0, -300.0, 1440.0, 900.0),
        ];
        assert_eq!(origin_display(&displays), Some(displays[1]));
    }

    #[test]
    fn test_overlay_origin_centers_window() {
        let origin = overlay_origin(Point::new(500.7, 300.2), Size::square(125.0));
        assert_eq!(origin, Point::new(438.0, 238.0));
    }

    #[test]
    fn test_aperture_sizes() {
        let loupe = LoupeConfig::loupe();
        assert_eq!(aperture_size(&loupe, 7, 125.0), 7.0);

        let sampler = LoupeConfig::sampler();
        // 128 / (2^(7 - 7 + 1) + 1) = 128 / 3
        assert!((aperture_size(&sampler, 7, 128.0) - 42.666).abs() < 0.001);
        // 128 / (2^7 + 1) = 128 / 129
        assert!((aperture_size(&sampler, 1, 128.0) - 0.992).abs() < 0.001);

        let rect = aperture_rect(Rect::new(0.0, 0.0, 125.0, 125.0), 7.0);
        assert_eq!(rect, Rect::new(59.0, 59.0, 7.0, 7.0));
    }

    #[test]
    fn test_rect_contains_unflipped() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(rect.contains(Point::new(0.0, 10.0)));
        assert!(rect.contains(Point::new(9.99, 0.01)));
        assert!(!rect.contains(Point::new(10.0, 5.0)));
        assert!(!rect.contains(Point::new(5.0, 0.0)));
        assert!(!rect.contains(Point::new(5.0, 10.01)));
    }

    #[test]
    fn test_capture_rect_top_row() {
        // Rangée du haut: y == hauteur de l'écran
        // Top pixel row: y == display height
        let pointer = Point::new(500.0, flip_y(0.0, 800.0));
        let rect = capture_rect(pointer, 7, &LoupeConfig::loupe(), &single_display())
            .expect("top row is on screen");
        // 800 - 800 - floor(17.857 / 2)
        assert_eq!(rect.origin, Point::new(492.0, -8.0));

        // Écran au-dessus: la rangée appartient à l'écran du bas
        // Display above: the row belongs to the lower display
        let stacked = vec![
            Rect::new(0.0, 0.0, 1000.0, 800.0),
            Rect::new(0.0, 800.0, 1000.0, 800.0),
        ];
        assert!(capture_rect(pointer, 7, &LoupeConfig::loupe(), &stacked).is_some());
        assert!(capture_rect(Point::new(500.0, 1600.0), 7, &LoupeConfig::loupe(), &stacked).is_some());
    }
}
