//! =============================================================================
//! CONFIG.RS - Configuration de la loupe
//! CONFIG.RS - Loupe configuration
//! =============================================================================
//!
//! Constantes partagées par toutes les plateformes et `LoupeConfig`, chargeable
//! depuis un fichier JSON.
//! Constants shared across all platforms and `LoupeConfig`, loadable from a
//! JSON file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PickerError;

// =============================================================================
// CONSTANTES
// CONSTANTS
// =============================================================================

/// Side of the loupe overlay in the linear-zoom style (in points)
/// Côté de la loupe en style zoom linéaire (en points)
pub const LOUPE_FRAME_SIZE: f64 = 125.0;

/// Largest overlay side accepted from a configuration file (points)
/// Plus grand côté de loupe accepté depuis un fichier de configuration
pub const MAX_FRAME_SIZE: f64 = 4096.0;

/// Minimum zoom factor of the linear-zoom style
pub const LOUPE_ZOOM_MIN: i32 = 2;

/// Maximum zoom factor of the linear-zoom style
pub const LOUPE_ZOOM_MAX: i32 = 24;

/// Zoom used when a linear-zoom session starts
/// Zoom utilisé au démarrage d'une session en zoom linéaire
pub const LOUPE_INITIAL_ZOOM: i32 = 7;

/// Minimum zoom exponent of the power-of-two style
pub const SAMPLER_ZOOM_MIN: i32 = 1;

/// Maximum zoom exponent of the power-of-two style.
/// The overlay side is `2^SAMPLER_ZOOM_MAX` points.
pub const SAMPLER_ZOOM_MAX: i32 = 7;

/// Zoom exponent used when a power-of-two session starts
pub const SAMPLER_INITIAL_ZOOM: i32 = 2;

/// Highest zoom exponent accepted for the power-of-two style
/// (2^16 points is already far larger than any display)
pub const SAMPLER_ZOOM_LIMIT: i32 = 16;

/// Scroll deltas within ±this value are ignored
/// Les deltas de molette dans ±cette valeur sont ignorés
pub const SCROLL_DEADBAND: f64 = 0.01;

/// Number of pixels to move when pressing Shift + Arrow key
/// Regular arrow key moves 1 pixel, Shift+arrow moves this many
pub const SHIFT_MOVE_PIXELS: f64 = 50.0;

// =============================================================================
// STYLE
// =============================================================================

/// Comment la taille de la zone capturée dépend du zoom
/// How the captured area size depends on the zoom
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoupeStyle {
    /// `side = frame / zoom`
    #[default]
    Loupe,
    /// `side = frame / 2^(zoom - 1) + 1`
    Sampler,
}

impl std::str::FromStr for LoupeStyle {
    type Err = PickerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "loupe" => Ok(LoupeStyle::Loupe),
            "sampler" => Ok(LoupeStyle::Sampler),
            other => Err(PickerError::InvalidConfig(format!(
                "unknown style '{}' (expected 'loupe' or 'sampler')",
                other
            ))),
        }
    }
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Paramètres d'une session de sélection
/// Parameters of a picking session
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LoupeConfig {
    /// Capture-size formula / Formule de taille de capture
    pub style: LoupeStyle,

    /// Side of the square overlay window (points)
    /// Côté de la fenêtre overlay carrée (points)
    pub frame_size: f64,

    pub zoom_min: i32,
    pub zoom_max: i32,
    pub initial_zoom: i32,

    /// Scroll deadband, see [`SCROLL_DEADBAND`]
    pub scroll_deadband: f64,

    /// Arrow-key step with Shift held (pixels)
    pub shift_move_pixels: f64,
}

impl Default for LoupeConfig {
    fn default() -> Self {
        Self::loupe()
    }
}

impl LoupeConfig {
    /// Linear zoom: 125pt overlay, zoom 2..=24, starts at 7
    pub fn loupe() -> Self {
        Self {
            style: LoupeStyle::Loupe,
            frame_size: LOUPE_FRAME_SIZE,
            zoom_min: LOUPE_ZOOM_MIN,
            zoom_max: LOUPE_ZOOM_MAX,
            initial_zoom: LOUPE_INITIAL_ZOOM,
            scroll_deadband: SCROLL_DEADBAND,
            shift_move_pixels: SHIFT_MOVE_PIXELS,
        }
    }

    /// Power-of-two zoom: 128pt overlay, zoom 1..=7, starts at 2
    pub fn sampler() -> Self {
        Self {
            style: LoupeStyle::Sampler,
            frame_size: 2f64.powi(SAMPLER_ZOOM_MAX),
            zoom_min: SAMPLER_ZOOM_MIN,
            zoom_max: SAMPLER_ZOOM_MAX,
            initial_zoom: SAMPLER_INITIAL_ZOOM,
            scroll_deadband: SCROLL_DEADBAND,
            shift_move_pixels: SHIFT_MOVE_PIXELS,
        }
    }

    /// Preset for a style
    pub fn for_style(style: LoupeStyle) -> Self {
        match style {
            LoupeStyle::Loupe => Self::loupe(),
            LoupeStyle::Sampler => Self::sampler(),
        }
    }

    /// Parse et valide une configuration JSON.
    /// Missing fields fall back to the preset of the given `style` (or the
    /// linear-zoom preset when `style` is absent).
    pub fn from_json_str(json: &str) -> Result<Self, PickerError> {
        let value: serde_json::Value = serde_json::from_str(json)?;

        // Les champs absents prennent la valeur du preset du style choisi
        // Absent fields take the value of the chosen style's preset
        let style = match value.get("style") {
            Some(style) => serde_json::from_value::<LoupeStyle>(style.clone())?,
            None => LoupeStyle::default(),
        };
        let mut merged = serde_json::to_value(Self::for_style(style))?;
        if let (Some(base), Some(overrides)) = (merged.as_object_mut(), value.as_object()) {
            for (key, v) in overrides {
                base.insert(key.clone(), v.clone());
            }
        } else {
            return Err(PickerError::InvalidConfig(
                "configuration must be a JSON object".to_string(),
            ));
        }

        let config: Self = serde_json::from_value(merged)?;
        config.validate()?;
        Ok(config)
    }

    /// Charge la configuration depuis un fichier
    /// Loads the configuration from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PickerError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::debug!("loaded loupe configuration from {}", path.as_ref().display());
        Self::from_json_str(&text)
    }

    /// Vérifie la cohérence des paramètres
    /// Checks the parameters are consistent
    pub fn validate(&self) -> Result<(), PickerError> {
        if !(self.frame_size.is_finite() && self.frame_size > 0.0) {
            return Err(PickerError::InvalidConfig(format!(
                "frame_size must be positive, got {}",
                self.frame_size
            )));
        }
        if self.frame_size > MAX_FRAME_SIZE {
            return Err(PickerError::InvalidConfig(format!(
                "frame_size must not exceed {}, got {}",
                MAX_FRAME_SIZE, self.frame_size
            )));
        }
        if self.zoom_min < 1 {
            return Err(PickerError::InvalidConfig(format!(
                "zoom_min must be at least 1, got {}",
                self.zoom_min
            )));
        }
        if !(self.zoom_min <= self.initial_zoom && self.initial_zoom <= self.zoom_max) {
            return Err(PickerError::InvalidConfig(format!(
                "expected zoom_min <= initial_zoom <= zoom_max, got {} <= {} <= {}",
                self.zoom_min, self.initial_zoom, self.zoom_max
            )));
        }
        if self.style == LoupeStyle::Sampler && self.zoom_max > SAMPLER_ZOOM_LIMIT {
            return Err(PickerError::InvalidConfig(format!(
                "sampler zoom_max must not exceed {}, got {}",
                SAMPLER_ZOOM_LIMIT, self.zoom_max
            )));
        }
        if !(self.scroll_deadband.is_finite() && self.scroll_deadband >= 0.0) {
            return Err(PickerError::InvalidConfig(format!(
                "scroll_deadband must be non-negative, got {}",
                self.scroll_deadband
            )));
        }
        if !(self.shift_move_pixels.is_finite() && self.shift_move_pixels > 0.0) {
            return Err(PickerError::InvalidConfig(format!(
                "shift_move_pixels must be positive, got {}",
                self.shift_move_pixels
            )));
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
