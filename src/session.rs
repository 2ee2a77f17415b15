//! =============================================================================
//! SESSION.RS - Machine à états d'une session de sélection
//! SESSION.RS - Picking-session state machine
//! =============================================================================
//!
//! Une session ouvre la loupe, suit le pointeur, capture l'écran sous la loupe
//! et se termine par un clic (couleur choisie) ou une annulation.
//! A session opens the loupe, follows the pointer, captures the screen under
//! the loupe and ends with a click (picked color) or a cancellation.
//!
//! Everything that touches the windowing system goes through [`Backend`], so
//! the same session drives AppKit, Win32 and the in-memory test backend.

use crate::capture::{self, PixelBuffer};
use crate::common::Color;
use crate::config::LoupeConfig;
use crate::error::PickerError;
use crate::geometry::{self, Point, Rect, Size};
use crate::zoom::ZoomLevel;

// =============================================================================
// ÉVÉNEMENTS
// EVENTS
// =============================================================================

/// Touches reconnues par la loupe / Keys the loupe reacts to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Escape,
    Return,
    Left,
    Right,
    Up,
    Down,
    /// Any other key, by platform key code
    Other(u16),
}

/// Événement natif traduit pour la session
/// Native event translated for the session
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoupeEvent {
    /// Pointer location in screen coordinates (bottom-left origin)
    PointerMoved(Point),
    Scrolled { delta_y: f64 },
    /// Primary button pressed at a screen location
    MouseDown(Point),
    KeyDown { key: Key, shift: bool },
    FocusGained,
    FocusLost,
}

// =============================================================================
// ÉTAT
// STATE
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Committed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Committed | SessionState::Cancelled)
    }
}

/// Raison d'une annulation / Why a session was cancelled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    Escape,
    FocusLost,
    /// A new pick request replaced this session
    Superseded,
    /// Clicked before any frame was captured
    NoFrame,
    /// `ColorPicker::cancel`
    Requested,
    /// The picker was dropped mid-session
    Dropped,
}

/// Résultat d'une session terminée / Result of a finished session
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Committed(Color),
    Cancelled(CancelReason),
}

impl Outcome {
    pub fn color(&self) -> Option<&Color> {
        match self {
            Outcome::Committed(color) => Some(color),
            Outcome::Cancelled(_) => None,
        }
    }
}

/// Called after each captured frame with the frame and its center color
pub type MoveCallback = Box<dyn FnMut(&PixelBuffer, &Color)>;

/// Called exactly once per session: `Some` on commit, `None` on cancellation
pub type CommitCallback = Box<dyn FnOnce(Option<Color>)>;

// =============================================================================
// BACKEND
// =============================================================================

/// Opérations fournies par le système de fenêtrage
/// Operations provided by the windowing system
///
/// Screen coordinates are in points with a bottom-left origin, except for
/// [`Backend::capture`] which takes a top-left-origin rectangle.
pub trait Backend {
    /// Frames of the attached displays
    fn displays(&self) -> Vec<Rect>;

    fn pointer_location(&self) -> Point;

    /// Creates and shows the overlay. No session starts if this fails.
    fn open_overlay(&mut self, size: Size) -> Result<(), PickerError>;

    fn close_overlay(&mut self);

    /// Current overlay frame, `None` while closed
    fn overlay_frame(&self) -> Option<Rect>;

    /// Moves the overlay's bottom-left corner
    fn move_overlay(&mut self, origin: Point);

    /// Captures the on-screen content below the overlay
    fn capture(&mut self, rect: Rect) -> Result<PixelBuffer, PickerError>;

    /// Redraws the overlay with a new frame and reticle size
    fn present(&mut self, frame: &PixelBuffer, aperture: f64);

    fn set_cursor_visible(&mut self, visible: bool);

    fn set_accepts_pointer_moves(&mut self, accepts: bool);

    /// Moves the system pointer (keyboard nudges)
    fn warp_pointer(&mut self, location: Point);
}

// =============================================================================
// SESSION
// =============================================================================

/// Session de sélection active
/// Active picking session
pub struct Session {
    config: LoupeConfig,
    zoom: ZoomLevel,
    /// Last captured frame, replaced on every move
    frame: Option<PixelBuffer>,
    pointer: Point,
    cursor_hidden: bool,
    state: SessionState,
    outcome: Option<Outcome>,
    on_move: Option<MoveCallback>,
    on_commit: Option<CommitCallback>,
}

impl Session {
    /// Ouvre la loupe et capture la première image
    /// Opens the loupe and captures the first frame
    pub fn start<B: Backend>(
        config: LoupeConfig,
        on_move: Option<MoveCallback>,
        on_commit: CommitCallback,
        backend: &mut B,
    ) -> Result<Self, PickerError> {
        config.validate()?;
        backend.open_overlay(Size::square(config.frame_size))?;

        let pointer = backend.pointer_location();
        let mut session = Self {
            zoom: ZoomLevel::from_config(&config),
            config,
            frame: None,
            pointer,
            cursor_hidden: false,
            state: SessionState::Active,
            outcome: None,
            on_move,
            on_commit: Some(on_commit),
        };

        backend.set_cursor_visible(false);
        session.cursor_hidden = true;
        log::debug!(
            "loupe session started ({:?}, zoom {})",
            session.config.style,
            session.zoom.value()
        );

        session.pointer_moved(backend, pointer);
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn zoom(&self) -> ZoomLevel {
        self.zoom
    }

    pub fn pointer(&self) -> Point {
        self.pointer
    }

    pub fn frame(&self) -> Option<&PixelBuffer> {
        self.frame.as_ref()
    }

    /// Set once the session reaches a terminal state
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Traite un événement et renvoie le nouvel état
    /// Handles one event and returns the new state
    pub fn handle<B: Backend>(&mut self, backend: &mut B, event: LoupeEvent) -> SessionState {
        if !self.is_active() {
            log::trace!("event {:?} after the session ended, ignored", event);
            return self.state;
        }

        match event {
            LoupeEvent::PointerMoved(location) => self.pointer_moved(backend, location),
            LoupeEvent::Scrolled { delta_y } => {
                if self.zoom.apply_scroll(delta_y, self.config.scroll_deadband) {
                    log::debug!("loupe zoom {}", self.zoom.value());
                }
                let location = backend.pointer_location();
                self.pointer_moved(backend, location);
            }
            LoupeEvent::MouseDown(location) => {
                let inside = backend
                    .overlay_frame()
                    .map(|frame| frame.contains(location))
                    .unwrap_or(false);
                if inside {
                    self.commit(backend);
                } else {
                    log::trace!("click at {:?} outside the loupe, ignored", location);
                }
            }
            LoupeEvent::KeyDown { key, shift } => self.key_down(backend, key, shift),
            LoupeEvent::FocusGained => backend.set_accepts_pointer_moves(true),
            LoupeEvent::FocusLost => self.cancel(backend, CancelReason::FocusLost),
        }
        self.state
    }

    /// Annule la session (rappel de validation avec `None`)
    /// Cancels the session (commit callback with `None`)
    pub fn cancel<B: Backend>(&mut self, backend: &mut B, reason: CancelReason) {
        if !self.is_active() {
            return;
        }
        log::debug!("loupe session cancelled ({:?})", reason);
        self.finish(backend, SessionState::Cancelled, Outcome::Cancelled(reason));
    }

    // =========================================================================
    // ÉTAPES INTERNES
    // INTERNAL STEPS
    // =========================================================================

    /// Capture, callback, repositionnement et redessin
    /// Capture, callback, reposition and redraw
    fn pointer_moved<B: Backend>(&mut self, backend: &mut B, location: Point) {
        self.pointer = location;
        let zoom = self.zoom.value();

        let Some(rect) = geometry::capture_rect(location, zoom, &self.config, &backend.displays())
        else {
            log::debug!("no display under {:?}, frame skipped", location);
            return;
        };

        let frame = match backend.capture(rect) {
            Ok(frame) => frame,
            Err(err) if err.is_capture_failure() => {
                log::debug!("capture of {:?} skipped: {}", rect, err);
                return;
            }
            Err(err) => {
                log::warn!("capture of {:?} failed: {}", rect, err);
                return;
            }
        };
        log::trace!(
            "captured {}x{} at {:?} (zoom {})",
            frame.width(),
            frame.height(),
            rect.origin,
            zoom
        );

        if let (Some(on_move), Some(color)) = (self.on_move.as_mut(), frame.center_color()) {
            on_move(&frame, &color);
        }

        let size = Size::square(self.config.frame_size);
        backend.move_overlay(geometry::overlay_origin(location, size));
        backend.present(
            &frame,
            geometry::aperture_size(&self.config, zoom, self.config.frame_size),
        );
        self.frame = Some(frame);
    }

    fn key_down<B: Backend>(&mut self, backend: &mut B, key: Key, shift: bool) {
        let step = if shift {
            self.config.shift_move_pixels
        } else {
            1.0
        };
        // y vers le haut / y grows upwards
        let (dx, dy) = match key {
            Key::Escape => return self.cancel(backend, CancelReason::Escape),
            Key::Return => return self.commit(backend),
            Key::Left => (-step, 0.0),
            Key::Right => (step, 0.0),
            Key::Up => (0.0, step),
            Key::Down => (0.0, -step),
            Key::Other(code) => {
                log::trace!("key {} ignored", code);
                return;
            }
        };
        let target = self.pointer.offset(dx, dy);
        backend.warp_pointer(target);
        self.pointer_moved(backend, target);
    }

    fn commit<B: Backend>(&mut self, backend: &mut B) {
        match capture::color_at_center(self.frame.as_ref()) {
            Some(color) => {
                log::debug!("loupe session committed {}", color);
                self.finish(backend, SessionState::Committed, Outcome::Committed(color));
            }
            None => self.cancel(backend, CancelReason::NoFrame),
        }
    }

    /// Libère les ressources puis appelle le rappel de validation une fois
    /// Releases resources then invokes the commit callback once
    fn finish<B: Backend>(&mut self, backend: &mut B, state: SessionState, outcome: Outcome) {
        self.state = state;
        self.frame = None;
        self.on_move = None;
        backend.close_overlay();
        if self.cursor_hidden {
            backend.set_cursor_visible(true);
            self.cursor_hidden = false;
        }

        let color = outcome.color().cloned();
        self.outcome = Some(outcome);
        if let Some(on_commit) = self.on_commit.take() {
            on_commit(color);
        }
    }
}

// =============================================================================
// BACKEND DE TEST
// TEST BACKEND
// =============================================================================


// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::testing::{FakeBackend, SYNTHETIC_BLUE};
    use super::*;
    use crate::common::ColorSpace;

    type Commits = Rc<RefCell<Vec<Option<Color>>>>;

    fn recording_commit() -> (Commits, CommitCallback) {
        let commits: Commits = Rc::new(RefCell::new(Vec::new()));
        let sink = commits.clone();
        (commits, Box::new(move |color| sink.borrow_mut().push(color)))
    }

    fn start(backend: &mut FakeBackend) -> (Session, Commits) {
        let (commits, on_commit) = recording_commit();
        let session = Session::start(LoupeConfig::loupe(), None, on_commit, backend).unwrap();
        (session, commits)
    }

    /// Color the synthetic screen shows under a bottom-left pointer location
    fn expected_color(pointer: Point, screen_height: f64) -> (u8, u8, u8) {
        let x = pointer.x.floor() as i64;
        let y = (screen_height - pointer.y.floor()) as i64;
        (x.rem_euclid(256) as u8, y.rem_euclid(256) as u8, SYNTHETIC_BLUE)
    }

    #[test]
    fn test_start_opens_overlay_and_captures_first_frame() {
        let mut backend = FakeBackend::new();
        let (session, commits) = start(&mut backend);

        assert!(session.is_active());
        assert_eq!(backend.opened, 1);
        assert!(!backend.cursor_visible);
        assert_eq!(backend.captures.len(), 1);
        assert_eq!(backend.presented, vec![7.0]);
        assert!(session.frame().is_some());
        // Loupe centrée sur le pointeur / Overlay centered on the pointer
        assert_eq!(
            backend.overlay.unwrap(),
            Rect::new(438.0, 238.0, 125.0, 125.0)
        );
        assert!(commits.borrow().is_empty());
    }

    #[test]
    fn test_open_failure_starts_nothing() {
        let mut backend = FakeBackend::new();
        backend.fail_open = true;
        let (commits, on_commit) = recording_commit();
        let err = Session::start(LoupeConfig::loupe(), None, on_commit, &mut backend)
            .err()
            .unwrap();
        assert!(matches!(err, PickerError::OverlayCreation(_)));
        assert!(backend.cursor_visible);
        assert!(commits.borrow().is_empty());
    }

    #[test]
    fn test_move_reports_center_color() {
        let mut backend = FakeBackend::new();
        let seen: Rc<RefCell<Vec<(usize, Color)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let on_move: MoveCallback =
            Box::new(move |frame, color| sink.borrow_mut().push((frame.width(), color.clone())));
        let (_, on_commit) = recording_commit();
        let mut session =
            Session::start(LoupeConfig::loupe(), Some(on_move), on_commit, &mut backend).unwrap();

        let target = Point::new(123.4, 456.7);
        backend.pointer = target;
        session.handle(&mut backend, LoupeEvent::PointerMoved(target));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        let (width, color) = &seen[1];
        assert_eq!(*width, 17);
        assert_eq!(color.rgb(), expected_color(target, 800.0));
        assert_eq!(color.color_space, ColorSpace::DisplayP3);
    }

    #[test]
    fn test_click_inside_commits_center_color() {
        let mut backend = FakeBackend::new();
        let (mut session, commits) = start(&mut backend);

        let click = backend.overlay_center();
        let state = session.handle(&mut backend, LoupeEvent::MouseDown(click));

        assert_eq!(state, SessionState::Committed);
        let commits = commits.borrow();
        assert_eq!(commits.len(), 1);
        let color = commits[0].clone().unwrap();
        assert_eq!(color.rgb(), expected_color(Point::new(500.0, 300.0), 800.0));
        // Ressources libérées / Resources released
        assert!(backend.overlay.is_none());
        assert!(backend.cursor_visible);
        assert!(session.frame().is_none());
        assert_eq!(session.outcome().and_then(Outcome::color), Some(&color));
    }

    #[test]
    fn test_click_outside_is_ignored() {
        let mut backend = FakeBackend::new();
        let (mut session, commits) = start(&mut backend);

        let state = session.handle(&mut backend, LoupeEvent::MouseDown(Point::new(5.0, 5.0)));
        assert_eq!(state, SessionState::Active);
        assert!(commits.borrow().is_empty());
        assert!(backend.overlay.is_some());
    }

    #[test]
    fn test_click_without_frame_cancels() {
        let mut backend = FakeBackend::new();
        backend.fail_capture = true;
        let (mut session, commits) = start(&mut backend);
        assert!(session.frame().is_none());

        let click = backend.overlay_center();
        let state = session.handle(&mut backend, LoupeEvent::MouseDown(click));
        assert_eq!(state, SessionState::Cancelled);
        assert_eq!(*commits.borrow(), vec![None]);
        assert_eq!(
            session.outcome(),
            Some(&Outcome::Cancelled(CancelReason::NoFrame))
        );
    }

    #[test]
    fn test_capture_failure_keeps_previous_frame() {
        let mut backend = FakeBackend::new();
        let (mut session, _) = start(&mut backend);
        let first = session.frame().cloned();

        backend.fail_capture = true;
        session.handle(&mut backend, LoupeEvent::PointerMoved(Point::new(10.0, 10.0)));
        assert_eq!(session.frame().cloned(), first);
        assert!(session.is_active());
    }

    #[test]
    fn test_pointer_off_screen_skips_frame() {
        let mut backend = FakeBackend::new();
        let (mut session, _) = start(&mut backend);
        session.handle(&mut backend, LoupeEvent::PointerMoved(Point::new(5000.0, 10.0)));
        assert_eq!(backend.captures.len(), 1);
        assert!(session.frame().is_some());
    }

    #[test]
    fn test_top_row_is_sampled() {
        let mut backend = FakeBackend::new();
        let (mut session, _) = start(&mut backend);

        let top = Point::new(300.0, 800.0);
        session.handle(&mut backend, LoupeEvent::PointerMoved(top));
        assert_eq!(backend.captures.len(), 2);
        let color = session.frame().and_then(|frame| frame.center_color()).unwrap();
        // Rangée 0 en coordonnées haut-gauche / Row 0 in top-left coordinates
        assert_eq!(color.rgb(), (44, 0, SYNTHETIC_BLUE));
        assert_eq!(color.rgb(), expected_color(top, 800.0));
    }

    #[test]
    fn test_scroll_changes_zoom_and_recaptures() {
        let mut backend = FakeBackend::new();
        let (mut session, _) = start(&mut backend);

        session.handle(&mut backend, LoupeEvent::Scrolled { delta_y: 1.0 });
        assert_eq!(session.zoom().value(), 8);
        assert_eq!(backend.captures.len(), 2);
        assert!((backend.captures[1].size.width - 125.0 / 8.0).abs() < 1e-9);
        assert_eq!(backend.presented.last(), Some(&8.0));

        // Zone morte / Deadband
        session.handle(&mut backend, LoupeEvent::Scrolled { delta_y: 0.005 });
        assert_eq!(session.zoom().value(), 8);
    }

    #[test]
    fn test_escape_and_focus_loss_cancel_once() {
        for event in [
            LoupeEvent::KeyDown {
                key: Key::Escape,
                shift: false,
            },
            LoupeEvent::FocusLost,
        ] {
            let mut backend = FakeBackend::new();
            let (mut session, commits) = start(&mut backend);
            assert_eq!(session.handle(&mut backend, event), SessionState::Cancelled);
            // Les événements suivants sont ignorés / Later events are ignored
            session.handle(&mut backend, LoupeEvent::MouseDown(Point::new(500.0, 300.0)));
            session.cancel(&mut backend, CancelReason::Requested);
            assert_eq!(*commits.borrow(), vec![None]);
            assert_eq!(backend.closed, 1);
            assert!(backend.cursor_visible);
        }
    }

    #[test]
    fn test_return_commits() {
        let mut backend = FakeBackend::new();
        let (mut session, commits) = start(&mut backend);
        let state = session.handle(
            &mut backend,
            LoupeEvent::KeyDown {
                key: Key::Return,
                shift: false,
            },
        );
        assert_eq!(state, SessionState::Committed);
        assert!(commits.borrow()[0].is_some());
    }

    #[test]
    fn test_arrow_keys_nudge_pointer() {
        let mut backend = FakeBackend::new();
        let (mut session, _) = start(&mut backend);

        session.handle(
            &mut backend,
            LoupeEvent::KeyDown {
                key: Key::Right,
                shift: false,
            },
        );
        assert_eq!(session.pointer(), Point::new(501.0, 300.0));
        session.handle(
            &mut backend,
            LoupeEvent::KeyDown {
                key: Key::Down,
                shift: true,
            },
        );
        assert_eq!(session.pointer(), Point::new(501.0, 250.0));
        assert_eq!(backend.warps.len(), 2);
        assert_eq!(backend.captures.len(), 3);

        session.handle(
            &mut backend,
            LoupeEvent::KeyDown {
                key: Key::Other(12),
                shift: false,
            },
        );
        assert_eq!(backend.captures.len(), 3);
    }

    #[test]
    fn test_focus_gained_accepts_moves() {
        let mut backend = FakeBackend::new();
        let (mut session, _) = start(&mut backend);
        session.handle(&mut backend, LoupeEvent::FocusGained);
        assert!(backend.accepts_pointer_moves);
        assert!(session.is_active());
    }

    #[test]
    fn test_sampler_style_aperture() {
        let mut backend = FakeBackend::new();
        let (_, on_commit) = recording_commit();
        let _session =
            Session::start(LoupeConfig::sampler(), None, on_commit, &mut backend).unwrap();
        // zoom 2: 128 / (2^6 + 1)
        assert!((backend.presented[0] - 128.0 / 65.0).abs() < 1e-9);
        assert_eq!(backend.captures[0].size.width, 65.0);
    }
}
