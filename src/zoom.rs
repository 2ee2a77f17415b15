//! Zoom level driven by scroll-wheel ticks.

use crate::config::LoupeConfig;

/// Niveau de zoom entier borné
/// Bounded integer zoom level
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoomLevel {
    value: i32,
    min: i32,
    max: i32,
}

impl ZoomLevel {
    /// `value` is clamped into `min..=max`
    pub fn new(value: i32, min: i32, max: i32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            value: value.clamp(min, max),
            min,
            max,
        }
    }

    pub fn from_config(config: &LoupeConfig) -> Self {
        Self::new(config.initial_zoom, config.zoom_min, config.zoom_max)
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    /// Applies one scroll event. Deltas within `±deadband` are ignored,
    /// otherwise the zoom moves by one step in the delta's direction.
    ///
    /// Returns true if the zoom changed.
    pub fn apply_scroll(&mut self, delta_y: f64, deadband: f64) -> bool {
        let step = if delta_y > deadband {
            1
        } else if delta_y < -deadband {
            -1
        } else {
            0
        };
        self.step_by(step)
    }

    /// Moves by `ticks` steps, clamped
    pub fn step_by(&mut self, ticks: i32) -> bool {
        let previous = self.value;
        self.value = self.value.saturating_add(ticks).clamp(self.min, self.max);
        self.value != previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SCROLL_DEADBAND;

    #[test]
    fn test_new_clamps() {
        assert_eq!(ZoomLevel::new(30, 2, 24).value(), 24);
        assert_eq!(ZoomLevel::new(0, 2, 24).value(), 2);
        // Bornes inversées / Swapped bounds
        let zoom = ZoomLevel::new(5, 24, 2);
        assert_eq!((zoom.min(), zoom.max(), zoom.value()), (2, 24, 5));
    }

    #[test]
    fn test_deadband() {
        let mut zoom = ZoomLevel::new(7, 2, 24);
        assert!(!zoom.apply_scroll(0.005, SCROLL_DEADBAND));
        assert!(!zoom.apply_scroll(-0.01, SCROLL_DEADBAND));
        assert_eq!(zoom.value(), 7);
        assert!(zoom.apply_scroll(0.02, SCROLL_DEADBAND));
        assert_eq!(zoom.value(), 8);
        // Un grand delta reste un seul pas / A large delta is still one step
        assert!(zoom.apply_scroll(-40.0, SCROLL_DEADBAND));
        assert_eq!(zoom.value(), 7);
    }

    #[test]
    fn test_ticks_equal_clamped_sum() {
        // Suites de ticks pseudo-aléatoires / Pseudo-random tick sequences
        let mut seed: u32 = 0x2545_f491;
        for config in [LoupeConfig::loupe(), LoupeConfig::sampler()] {
            for _ in 0..50 {
                let mut zoom = ZoomLevel::from_config(&config);
                let mut expected = config.initial_zoom;
                for _ in 0..40 {
                    seed ^= seed << 13;
                    seed ^= seed >> 17;
                    seed ^= seed << 5;
                    let up = seed % 2 == 0;
                    zoom.apply_scroll(if up { 1.5 } else { -0.7 }, SCROLL_DEADBAND);
                    expected = (expected + if up { 1 } else { -1 })
                        .clamp(config.zoom_min, config.zoom_max);
                    assert_eq!(zoom.value(), expected);
                }
            }
        }
    }

    #[test]
    fn test_net_ticks_without_hitting_bounds() {
        let config = LoupeConfig::loupe();
        let mut zoom = ZoomLevel::from_config(&config);
        for _ in 0..5 {
            zoom.apply_scroll(1.0, SCROLL_DEADBAND);
        }
        for _ in 0..2 {
            zoom.apply_scroll(-1.0, SCROLL_DEADBAND);
        }
        assert_eq!(zoom.value(), (7 + 5 - 2).clamp(2, 24));

        let mut zoom = ZoomLevel::from_config(&config);
        assert!(!zoom.step_by(0));
        zoom.step_by(i32::MAX);
        assert_eq!(zoom.value(), 24);
        zoom.step_by(i32::MIN);
        assert_eq!(zoom.value(), 2);
    }
}
