// =============================================================================
// lib.rs - Loupe de sélection de couleur
// lib.rs - Color-sampling loupe
// =============================================================================

/// Constantes et configuration
/// Constants and configuration
pub mod config;

pub mod error;

/// Code commun entre plateformes (couleur, formatage)
/// Common code between platforms (color, formatting)
pub mod common;

pub mod geometry;
pub mod zoom;
pub mod capture;

/// Machine à états d'une session et trait `Backend`
/// Session state machine and `Backend` trait
pub mod session;

pub mod picker;

/// Implémentation macOS
/// macOS implementation
#[cfg(target_os = "macos")]
pub mod macos;

/// Implémentation Windows
/// Windows implementation
#[cfg(target_os = "windows")]
pub mod windows;

/// Implémentation Linux (non implémentée)
/// Linux implementation (not implemented)
#[cfg(target_os = "linux")]
pub mod linux;

pub use capture::{PixelBuffer, PixelFormat};
pub use common::{Color, ColorSpace};
pub use config::{LoupeConfig, LoupeStyle};
pub use error::PickerError;
pub use geometry::{Point, Rect, Size};
pub use picker::{ColorPicker, Sample, SharedPicker};
pub use session::{Backend, CommitCallback, Key, LoupeEvent, MoveCallback, SessionState};

// =============================================================================
// FONCTION PUBLIQUE
// PUBLIC FUNCTION
// =============================================================================

/// Lance une session de sélection native et bloque jusqu'à sa fin
/// Runs a native picking session and blocks until it ends
///
/// # Returns
/// * `Ok(Some(color))` - couleur choisie / picked color
/// * `Ok(None)` - session annulée / session cancelled
pub fn run(config: LoupeConfig) -> Result<Option<Color>, PickerError> {
    #[cfg(target_os = "macos")]
    {
        macos::run(config)
    }

    #[cfg(target_os = "windows")]
    {
        windows::run(config)
    }

    #[cfg(target_os = "linux")]
    {
        linux::run(config)
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        let _ = config;
        Err(PickerError::UnsupportedPlatform(std::env::consts::OS))
    }
}
