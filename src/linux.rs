//! Linux implementation of the loupe
//!
//! Not implemented: there is no backend for X11 or Wayland yet.

use crate::common::Color;
use crate::config::LoupeConfig;
use crate::error::PickerError;

/// Runs a picking session on Linux
pub fn run(config: LoupeConfig) -> Result<Option<Color>, PickerError> {
    log::warn!(
        "no loupe backend for Linux, {:?} session not started",
        config.style
    );
    Err(PickerError::UnsupportedPlatform("linux"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_is_unsupported() {
        let err = run(LoupeConfig::loupe()).unwrap_err();
        assert!(matches!(err, PickerError::UnsupportedPlatform("linux")));
    }
}
