//! =============================================================================
//! COMMON.RS - Code partagé entre les plateformes
//! COMMON.RS - Shared code between platforms
//! =============================================================================
//!
//! Ce module contient le type de couleur renvoyé par la loupe et les fonctions
//! de formatage utilisées par macOS, Windows et le binaire.
//! This module contains the color type returned by the loupe and the
//! formatting helpers used by macOS, Windows and the binary.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// ESPACE COLORIMÉTRIQUE
// COLOR SPACE
// =============================================================================

/// Espace colorimétrique du bitmap source
/// Color space of the source bitmap
///
/// Une couleur extraite garde l'espace du bitmap capturé, elle n'est jamais
/// réinterprétée dans l'espace de l'appareil.
/// An extracted color keeps the space of the captured bitmap, it is never
/// reinterpreted in the device space.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColorSpace {
    #[default]
    Srgb,
    DisplayP3,
    GenericRgb,
    /// Uncalibrated device RGB
    Device,
    /// Any other named profile reported by the platform
    Named(String),
}

impl ColorSpace {
    /// Maps a platform color-space name (e.g. an ICC profile description)
    /// onto a known space when possible
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.contains("srgb") {
            ColorSpace::Srgb
        } else if lower.contains("p3") {
            ColorSpace::DisplayP3
        } else if lower.contains("generic rgb") {
            ColorSpace::GenericRgb
        } else if lower.contains("device rgb") {
            ColorSpace::Device
        } else {
            ColorSpace::Named(name.to_string())
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorSpace::Srgb => write!(f, "sRGB"),
            ColorSpace::DisplayP3 => write!(f, "Display P3"),
            ColorSpace::GenericRgb => write!(f, "Generic RGB"),
            ColorSpace::Device => write!(f, "Device RGB"),
            ColorSpace::Named(name) => write!(f, "{}", name),
        }
    }
}

// =============================================================================
// COULEUR
// COLOR
// =============================================================================

/// Couleur lue au centre de la loupe
/// Color read at the center of the loupe
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
    /// Espace du bitmap d'origine / Space of the originating bitmap
    pub color_space: ColorSpace,
}

impl Color {
    /// Opaque color in the given space
    pub fn new(red: u8, green: u8, blue: u8, color_space: ColorSpace) -> Self {
        Self {
            red,
            green,
            blue,
            alpha: u8::MAX,
            color_space,
        }
    }

    /// Composantes (r, g, b) / (r, g, b) components
    pub fn rgb(&self) -> (u8, u8, u8) {
        (self.red, self.green, self.blue)
    }

    /// "#RRGGBB"
    pub fn to_hex(&self) -> String {
        format_hex_color(self.red, self.green, self.blue)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RGB({}, {}, {}) | HEX: {}",
            self.red,
            self.green,
            self.blue,
            self.to_hex()
        )
    }
}

// =============================================================================
// FONCTIONS DE FORMATAGE
// FORMATTING FUNCTIONS
// =============================================================================

/// Formate une couleur RGB en chaîne hexadécimale
/// Formats an RGB color as a hex string
#[inline]
pub fn format_hex_color(r: u8, g: u8, b: u8) -> String {
    format!("#{:02X}{:02X}{:02X}", r, g, b)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_is_uppercase_and_padded() {
        assert_eq!(format_hex_color(255, 0, 128), "#FF0080");
        assert_eq!(format_hex_color(0, 0, 0), "#000000");
        assert_eq!(Color::new(1, 2, 3, ColorSpace::Device).to_hex(), "#010203");
    }

    #[test]
    fn test_display() {
        let color = Color::new(18, 52, 86, ColorSpace::Srgb);
        assert_eq!(color.to_string(), "RGB(18, 52, 86) | HEX: #123456");
    }

    #[test]
    fn test_color_space_from_name() {
        assert_eq!(ColorSpace::from_name("sRGB IEC61966-2.1"), ColorSpace::Srgb);
        assert_eq!(ColorSpace::from_name("Display P3"), ColorSpace::DisplayP3);
        assert_eq!(ColorSpace::from_name("Generic RGB Profile"), ColorSpace::GenericRgb);
        assert_eq!(
            ColorSpace::from_name("DELL U2720Q"),
            ColorSpace::Named("DELL U2720Q".to_string())
        );
    }

    #[test]
    fn test_color_serializes_with_space() {
        let color = Color::new(0, 128, 255, ColorSpace::DisplayP3);
        let json = serde_json::to_value(&color).unwrap();
        assert_eq!(json["green"], 128);
        assert_eq!(json["color_space"], "display_p3");
    }
}
