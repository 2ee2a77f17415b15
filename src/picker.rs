//! =============================================================================
//! PICKER.RS - Gestionnaire de sessions
//! PICKER.RS - Session manager
//! =============================================================================
//!
//! `ColorPicker` possède le backend et au plus une session active.
//! `ColorPicker` owns the backend and at most one active session.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::channel::oneshot;

use crate::common::Color;
use crate::config::LoupeConfig;
use crate::error::PickerError;
use crate::session::{
    Backend, CancelReason, CommitCallback, LoupeEvent, MoveCallback, Session, SessionState,
};

/// Sélecteur de couleur à la loupe
/// Loupe color picker
pub struct ColorPicker<B: Backend> {
    backend: B,
    config: LoupeConfig,
    session: Option<Session>,
}

impl<B: Backend> ColorPicker<B> {
    pub fn new(backend: B, config: LoupeConfig) -> Result<Self, PickerError> {
        config.validate()?;
        Ok(Self {
            backend,
            config,
            session: None,
        })
    }

    /// Démarre une session, en annulant celle en cours
    /// Starts a session, cancelling the current one
    ///
    /// `on_commit` runs exactly once: with the picked color, or with `None`
    /// when the session is cancelled. It is dropped without being called only
    /// when this returns an error.
    pub fn pick(
        &mut self,
        on_move: Option<MoveCallback>,
        on_commit: CommitCallback,
    ) -> Result<(), PickerError> {
        self.cancel_with(CancelReason::Superseded);
        let session = Session::start(self.config.clone(), on_move, on_commit, &mut self.backend)?;
        self.session = Some(session);
        Ok(())
    }

    /// Variante asynchrone de [`ColorPicker::pick`]
    /// Async variant of [`ColorPicker::pick`]
    ///
    /// The future resolves once the session ends; events still have to be
    /// fed through [`ColorPicker::handle_event`].
    pub fn sample(&mut self) -> Result<Sample, PickerError> {
        let (on_commit, sample) = Sample::channel();
        self.pick(None, on_commit)?;
        Ok(sample)
    }

    /// Transmet un événement natif à la session active
    /// Routes a native event to the active session
    pub fn handle_event(&mut self, event: LoupeEvent) -> SessionState {
        let Some(session) = self.session.as_mut() else {
            log::trace!("no active session, {:?} ignored", event);
            return SessionState::Idle;
        };
        let state = session.handle(&mut self.backend, event);
        if state.is_terminal() {
            self.session = None;
        }
        state
    }

    /// Annule la session active, s'il y en a une
    /// Cancels the active session, if any
    pub fn cancel(&mut self) {
        self.cancel_with(CancelReason::Requested);
    }

    fn cancel_with(&mut self, reason: CancelReason) {
        if let Some(mut session) = self.session.take() {
            session.cancel(&mut self.backend, reason);
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Zoom of the active session
    pub fn zoom(&self) -> Option<i32> {
        self.session.as_ref().map(|session| session.zoom().value())
    }

    pub fn config(&self) -> &LoupeConfig {
        &self.config
    }

    /// Replaces the configuration used by the next session
    pub fn set_config(&mut self, config: LoupeConfig) -> Result<(), PickerError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: Backend> Drop for ColorPicker<B> {
    fn drop(&mut self) {
        self.cancel_with(CancelReason::Dropped);
    }
}

/// Couleur attendue d'une session démarrée par [`ColorPicker::sample`]
/// Color awaited from a session started by [`ColorPicker::sample`]
///
/// Resolves to `None` when the session is cancelled.
#[must_use = "the picked color is only delivered through the future"]
pub struct Sample {
    rx: oneshot::Receiver<Option<Color>>,
}

impl Sample {
    /// Commit callback feeding a new `Sample`
    fn channel() -> (CommitCallback, Sample) {
        let (tx, rx) = oneshot::channel();
        let on_commit: CommitCallback = Box::new(move |color| {
            // Le récepteur peut avoir été abandonné / The receiver may be gone
            let _ = tx.send(color);
        });
        (on_commit, Sample { rx })
    }
}

impl Future for Sample {
    type Output = Option<Color>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.ok().flatten())
    }
}

// =============================================================================
// PICKER PARTAGÉ
// SHARED PICKER
// =============================================================================

struct PendingPick {
    on_move: Option<MoveCallback>,
    on_commit: CommitCallback,
}

struct SharedState<B: Backend> {
    picker: RefCell<ColorPicker<B>>,
    /// Pick requested while an event was being handled
    pending: RefCell<Option<PendingPick>>,
    /// Cancel requested while an event was being handled
    cancel_requested: Cell<bool>,
    /// Une session est en cours / A session is running
    live: Rc<Cell<bool>>,
}

/// Picker partagé entre la boucle d'événements native et les callbacks
/// Picker shared between the native event loop and the callbacks
///
/// Native windows call back into the picker while it is already handling an
/// event: closing the overlay resigns focus, callbacks start or cancel
/// picks. Events arriving during a dispatch are dropped; `pick` and `cancel`
/// requested during a dispatch are applied, in order, once it returns.
pub struct SharedPicker<B: Backend> {
    state: Rc<SharedState<B>>,
}

impl<B: Backend> Clone for SharedPicker<B> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<B: Backend> SharedPicker<B> {
    pub fn new(backend: B, config: LoupeConfig) -> Result<Self, PickerError> {
        let picker = ColorPicker::new(backend, config)?;
        Ok(Self {
            state: Rc::new(SharedState {
                picker: RefCell::new(picker),
                pending: RefCell::new(None),
                cancel_requested: Cell::new(false),
                live: Rc::new(Cell::new(false)),
            }),
        })
    }

    /// Transmet un événement natif; `None` s'il arrive pendant un autre
    /// Routes a native event; `None` when it arrives during another one
    pub fn dispatch(&self, event: LoupeEvent) -> Option<SessionState> {
        let Ok(mut picker) = self.state.picker.try_borrow_mut() else {
            log::trace!("{:?} arrived during dispatch, dropped", event);
            return None;
        };
        let state = picker.handle_event(event);
        self.apply_deferred(&mut picker);
        Some(state)
    }

    /// See [`ColorPicker::pick`]. Called from inside a callback, the pick
    /// starts once the current event has been handled, and an earlier pick
    /// still waiting is cancelled.
    pub fn pick(
        &self,
        on_move: Option<MoveCallback>,
        on_commit: CommitCallback,
    ) -> Result<(), PickerError> {
        let request = PendingPick { on_move, on_commit };
        match self.state.picker.try_borrow_mut() {
            Ok(mut picker) => {
                let result = self.start(&mut picker, request, false);
                self.apply_deferred(&mut picker);
                result
            }
            Err(_) => {
                log::debug!("pick requested during dispatch, deferred");
                let replaced = self.state.pending.borrow_mut().replace(request);
                // Une demande remplacée est annulée / A replaced request is cancelled
                if let Some(replaced) = replaced {
                    (replaced.on_commit)(None);
                }
                Ok(())
            }
        }
    }

    /// See [`ColorPicker::sample`]
    pub fn sample(&self) -> Result<Sample, PickerError> {
        let (on_commit, sample) = Sample::channel();
        self.pick(None, on_commit)?;
        Ok(sample)
    }

    /// Annule la session active, et une demande en attente
    /// Cancels the active session, and any waiting request
    pub fn cancel(&self) {
        match self.state.picker.try_borrow_mut() {
            Ok(mut picker) => {
                picker.cancel();
                self.apply_deferred(&mut picker);
            }
            Err(_) => {
                log::debug!("cancel requested during dispatch, deferred");
                self.state.cancel_requested.set(true);
                let dropped = self.state.pending.borrow_mut().take();
                if let Some(dropped) = dropped {
                    (dropped.on_commit)(None);
                }
            }
        }
    }

    /// True if a session is running, or will be once the current event has
    /// been handled
    pub fn is_active(&self) -> bool {
        self.state.pending.borrow().is_some()
            || (self.state.live.get() && !self.state.cancel_requested.get())
    }

    /// Runs `f` on the backend, unless an event is being handled
    pub fn with_backend<R>(&self, f: impl FnOnce(&B) -> R) -> Result<R, PickerError> {
        let picker = self
            .state
            .picker
            .try_borrow()
            .map_err(|_| PickerError::Busy)?;
        Ok(f(picker.backend()))
    }

    pub fn with_backend_mut<R>(&self, f: impl FnOnce(&mut B) -> R) -> Result<R, PickerError> {
        let mut picker = self
            .state
            .picker
            .try_borrow_mut()
            .map_err(|_| PickerError::Busy)?;
        Ok(f(picker.backend_mut()))
    }

    /// Callback routing native events here without keeping the picker alive
    pub fn event_sink(&self) -> impl Fn(LoupeEvent) + 'static
    where
        B: 'static,
    {
        let state = Rc::downgrade(&self.state);
        move |event| {
            if let Some(state) = state.upgrade() {
                SharedPicker { state }.dispatch(event);
            }
        }
    }

    /// Starts a session, keeping `live` in sync with its commit callback.
    /// A deferred request that fails still gets its `None`.
    fn start(
        &self,
        picker: &mut ColorPicker<B>,
        request: PendingPick,
        deferred: bool,
    ) -> Result<(), PickerError> {
        let slot = Rc::new(RefCell::new(Some(request.on_commit)));
        let live = Rc::clone(&self.state.live);
        let commit_slot = Rc::clone(&slot);
        let on_commit: CommitCallback = Box::new(move |color| {
            live.set(false);
            let callback = commit_slot.borrow_mut().take();
            if let Some(callback) = callback {
                callback(color);
            }
        });

        match picker.pick(request.on_move, on_commit) {
            Ok(()) => {
                self.state.live.set(true);
                Ok(())
            }
            Err(err) => {
                if deferred {
                    log::warn!("deferred pick failed: {}", err);
                    let callback = slot.borrow_mut().take();
                    if let Some(callback) = callback {
                        callback(None);
                    }
                }
                Err(err)
            }
        }
    }

    /// Applique les demandes faites pendant l'appel, jusqu'à épuisement
    /// Applies the requests made during the call, until none is left
    fn apply_deferred(&self, picker: &mut ColorPicker<B>) {
        loop {
            if self.state.cancel_requested.replace(false) {
                picker.cancel();
                continue;
            }
            let next = self.state.pending.borrow_mut().take();
            let Some(request) = next else {
                break;
            };
            let _ = self.start(picker, request, true);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
