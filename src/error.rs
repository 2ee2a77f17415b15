//! Error type shared by the portable core and the platform backends.

/// Erreurs du color picker
/// Color picker errors
#[derive(thiserror::Error, Debug)]
pub enum PickerError {
    /// The pointer is not over any attached display
    #[error("no display under the pointer")]
    NoDisplayUnderPoint,
    /// The window server refused or failed the capture
    #[error("screen capture failed: {0}")]
    CaptureFailed(String),
    #[error("could not create the loupe overlay: {0}")]
    OverlayCreation(String),
    /// The platform gave the overlay view no graphics context to draw into.
    /// Not recoverable.
    #[error("no drawing context available for the loupe overlay")]
    DrawingContextUnavailable,
    #[error("invalid pixel buffer: {0}")]
    InvalidBuffer(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("color picking is not supported on {0}")]
    UnsupportedPlatform(&'static str),
    #[error("the loupe must be driven from the main thread")]
    NotMainThread,
    /// The picker is handling an event and cannot be borrowed
    #[error("the picker is busy handling an event")]
    Busy,
    /// The native event loop stopped before the session ended
    #[error("event loop ended: {0}")]
    EventLoop(String),
}

impl PickerError {
    /// Capture failures skip the frame; everything else is reported
    pub fn is_capture_failure(&self) -> bool {
        matches!(
            self,
            PickerError::NoDisplayUnderPoint | PickerError::CaptureFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_capture_errors_skip_the_frame() {
        assert!(PickerError::NoDisplayUnderPoint.is_capture_failure());
        assert!(PickerError::CaptureFailed("timeout".to_string()).is_capture_failure());
        assert!(!PickerError::Busy.is_capture_failure());
        assert!(!PickerError::EventLoop("WM_QUIT".to_string()).is_capture_failure());
    }

    #[test]
    fn test_event_loop_and_busy_messages() {
        assert_eq!(
            PickerError::EventLoop("WM_QUIT received".to_string()).to_string(),
            "event loop ended: WM_QUIT received"
        );
        assert_eq!(
            PickerError::Busy.to_string(),
            "the picker is busy handling an event"
        );
    }
}
