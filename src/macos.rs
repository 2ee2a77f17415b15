//! =============================================================================
//! MACOS.RS - Implémentation macOS de la loupe
//! MACOS.RS - macOS implementation of the loupe
//! =============================================================================
//!
//! Une petite fenêtre ronde sans bordure suit le curseur. Chaque mouvement
//! capture l'écran sous la fenêtre avec Core Graphics et redessine la vue.
//!
//! A small round borderless window follows the cursor. Every move captures
//! the screen below the window with Core Graphics and redraws the view.
//!
//! # Architecture
//! - `LoupeWindow`: NSWindow that can become key and forwards its events
//! - `LoupeView`: NSView drawing the magnified capture and the reticle
//! - `MacBackend`: implements [`Backend`] on top of both
//! - [`loupe`]: a `SharedPicker<MacBackend>` receiving the window's events

// =============================================================================
// IMPORTS
// =============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::FutureExt;

use objc2::rc::Retained;
use objc2::runtime::Bool;
use objc2::{define_class, msg_send, AllocAnyThread, DefinedClass, MainThreadOnly};

use objc2_foundation::{
    MainThreadMarker, NSDate, NSDefaultRunLoopMode, NSPoint, NSRect, NSSize, NSString,
};

use objc2_app_kit::{
    NSApplication, NSApplicationActivationOptions, NSApplicationActivationPolicy,
    NSBackingStoreType, NSBezierPath, NSColor, NSCompositingOperation, NSCursor, NSEvent,
    NSEventMask, NSEventModifierFlags, NSGraphicsContext, NSImage, NSImageInterpolation,
    NSRunningApplication, NSScreen, NSView, NSWindow, NSWindowSharingType, NSWindowStyleMask,
};

use core_graphics::display::CGDisplay;
use core_graphics::geometry::{CGPoint, CGRect, CGSize};
use core_graphics::image::CGImage;

use crate::capture::{PixelBuffer, PixelFormat};
use crate::common::{Color, ColorSpace};
use crate::config::LoupeConfig;
use crate::error::PickerError;
use crate::geometry::{self, Point, Rect, Size};
use crate::picker::SharedPicker;
use crate::session::{Backend, Key, LoupeEvent};

// =============================================================================
// CONSTANTES
// CONSTANTS
// =============================================================================

/// kCGPopUpMenuWindowLevel
const POP_UP_MENU_WINDOW_LEVEL: isize = 101;

/// kCGWindowListOptionOnScreenOnly
const WINDOW_LIST_ON_SCREEN_ONLY: u32 = 1 << 0;

/// kCGWindowListOptionOnScreenBelowWindow
const WINDOW_LIST_ON_SCREEN_BELOW_WINDOW: u32 = 1 << 2;

/// kCGWindowImageNominalResolution
const WINDOW_IMAGE_NOMINAL_RESOLUTION: u32 = 1 << 4;

// Key codes: ESC = 53, Return = 36, Enter (keypad) = 76, arrows = 123..=126
const KEY_ESCAPE: u16 = 53;
const KEY_RETURN: u16 = 36;
const KEY_ENTER: u16 = 76;
const KEY_LEFT: u16 = 123;
const KEY_RIGHT: u16 = 124;
const KEY_DOWN: u16 = 125;
const KEY_UP: u16 = 126;

/// Timeout of one event-loop iteration (~60fps)
const EVENT_POLL_INTERVAL: f64 = 0.016;

/// Reçoit les événements traduits de la fenêtre
/// Receives the translated window events
type EventSink = Rc<dyn Fn(LoupeEvent)>;

// =============================================================================
// CLASSES PERSONNALISÉES OBJECTIVE-C
// CUSTOM OBJECTIVE-C CLASSES
// =============================================================================

struct LoupeWindowIvars {
    sink: EventSink,
}

define_class!(
    // SAFETY:
    // - The superclass NSWindow does not have any subclassing requirements that we violate.
    // - LoupeWindow does not implement Drop.
    #[unsafe(super = NSWindow)]
    #[thread_kind = MainThreadOnly]
    #[name = "ColorLoupeWindow"]
    #[ivars = LoupeWindowIvars]

    /// Fenêtre de la loupe, peut devenir la fenêtre clé
    /// Loupe window, can become the key window
    struct LoupeWindow;

    impl LoupeWindow {
        /// Les fenêtres sans bordure ne deviennent pas key par défaut
        /// Borderless windows cannot become key by default
        #[unsafe(method(canBecomeKeyWindow))]
        fn can_become_key_window(&self) -> bool {
            true
        }

        #[unsafe(method(becomeKeyWindow))]
        fn become_key_window(&self) {
            let _: () = unsafe { msg_send![super(self), becomeKeyWindow] };
            // Le picker peut être occupé (ouverture en cours)
            // The picker may be busy (still opening the window)
            self.setAcceptsMouseMovedEvents(true);
            self.send(LoupeEvent::FocusGained);
        }

        #[unsafe(method(resignKeyWindow))]
        fn resign_key_window(&self) {
            let _: () = unsafe { msg_send![super(self), resignKeyWindow] };
            self.send(LoupeEvent::FocusLost);
        }

        #[unsafe(method(mouseMoved:))]
        fn mouse_moved(&self, _event: &NSEvent) {
            self.send(LoupeEvent::PointerMoved(mouse_location()));
        }

        #[unsafe(method(mouseDown:))]
        fn mouse_down(&self, event: &NSEvent) {
            let location = self.convertPointToScreen(event.locationInWindow());
            self.send(LoupeEvent::MouseDown(Point::new(location.x, location.y)));
        }

        #[unsafe(method(scrollWheel:))]
        fn scroll_wheel(&self, event: &NSEvent) {
            self.send(LoupeEvent::Scrolled {
                delta_y: event.deltaY(),
            });
        }

        #[unsafe(method(keyDown:))]
        fn key_down(&self, event: &NSEvent) {
            let shift = event.modifierFlags().contains(NSEventModifierFlags::Shift);
            self.send(LoupeEvent::KeyDown {
                key: key_from_code(event.keyCode()),
                shift,
            });
        }
    }
);

impl LoupeWindow {
    fn new(mtm: MainThreadMarker, frame: NSRect, sink: EventSink) -> Retained<Self> {
        let this = mtm.alloc::<Self>().set_ivars(LoupeWindowIvars { sink });
        unsafe {
            msg_send![
                super(this),
                initWithContentRect: frame,
                styleMask: NSWindowStyleMask::Borderless,
                backing: NSBackingStoreType::Buffered,
                defer: Bool::NO
            ]
        }
    }

    fn send(&self, event: LoupeEvent) {
        // La fenêtre peut être fermée pendant l'appel
        // The window may be closed during the call
        let sink = Rc::clone(&self.ivars().sink);
        sink(event);
    }
}

struct LoupeViewIvars {
    /// Last capture, drawn magnified
    image: RefCell<Option<CGImage>>,
    /// Side of the reticle, in view points
    aperture: Cell<f64>,
}

define_class!(
    // SAFETY:
    // - The superclass NSView does not have any subclassing requirements that we violate.
    // - LoupeView does not implement Drop.
    #[unsafe(super = NSView)]
    #[thread_kind = MainThreadOnly]
    #[name = "ColorLoupeView"]
    #[ivars = LoupeViewIvars]

    /// Vue qui dessine la capture agrandie et le réticule
    /// View drawing the magnified capture and the reticle
    struct LoupeView;

    impl LoupeView {
        #[unsafe(method(isOpaque))]
        fn is_opaque(&self) -> bool {
            false
        }

        #[unsafe(method(drawRect:))]
        fn draw_rect(&self, _rect: NSRect) {
            self.draw();
        }
    }
);

impl LoupeView {
    fn new(mtm: MainThreadMarker, frame: NSRect) -> Retained<Self> {
        let this = mtm.alloc::<Self>().set_ivars(LoupeViewIvars {
            image: RefCell::new(None),
            aperture: Cell::new(0.0),
        });
        unsafe { msg_send![super(this), initWithFrame: frame] }
    }

    fn show(&self, image: CGImage, aperture: f64) {
        self.ivars().image.replace(Some(image));
        self.ivars().aperture.set(aperture);
        self.setNeedsDisplay(true);
    }

    // =========================================================================
    // DESSIN
    // DRAWING
    // =========================================================================

    /// 1. Image capturée dans un clip circulaire, sans interpolation
    /// 2. Réticule carré au centre
    /// 3. Double bordure circulaire
    ///
    /// 1. Captured image inside a circular clip, no interpolation
    /// 2. Square reticle at the center
    /// 3. Double circular border
    fn draw(&self) {
        let Some(context) = NSGraphicsContext::currentContext() else {
            let err = PickerError::DrawingContextUnavailable;
            log::error!("{}", err);
            panic!("{}", err);
        };
        let bounds = self.bounds();

        if let Some(image) = self.ivars().image.borrow().as_ref() {
            NSGraphicsContext::saveGraphicsState_class();
            context.setImageInterpolation(NSImageInterpolation::None);
            NSBezierPath::bezierPathWithOvalInRect(bounds).addClip();
            draw_cg_image(image, bounds);
            NSGraphicsContext::restoreGraphicsState_class();
        }

        // Réticule: couleur du texte puis fond du texte
        // Reticle: text color then text background color
        let aperture = to_ns_rect(geometry::aperture_rect(
            from_ns_rect(bounds),
            self.ivars().aperture.get(),
        ));
        NSColor::textColor().setStroke();
        let outer = NSBezierPath::bezierPathWithRect(aperture);
        outer.setLineWidth(1.0);
        outer.stroke();

        NSColor::textBackgroundColor().setStroke();
        let inner = NSBezierPath::bezierPathWithRect(inset(aperture, 1.0));
        inner.setLineWidth(1.0);
        inner.stroke();

        // Bordure / Border
        NSColor::textColor().setStroke();
        let ring = NSBezierPath::bezierPathWithOvalInRect(inset(bounds, 1.0));
        ring.setLineWidth(2.0);
        ring.stroke();

        NSColor::textBackgroundColor().setStroke();
        let inner_ring = NSBezierPath::bezierPathWithOvalInRect(inset(bounds, 2.5));
        inner_ring.setLineWidth(1.0);
        inner_ring.stroke();
    }
}

/// Dessine une CGImage via NSImage
/// Draws a CGImage through NSImage
fn draw_cg_image(image: &CGImage, destination: NSRect) {
    use objc2::encode::{Encoding, RefEncode};

    // Type opaque encodé "^{CGImage=}" pour initWithCGImage:size:
    // Opaque type encoded as "^{CGImage=}" for initWithCGImage:size:
    #[repr(C)]
    struct OpaqueImage {
        _private: [u8; 0],
    }

    unsafe impl RefEncode for OpaqueImage {
        const ENCODING_REF: Encoding = Encoding::Pointer(&Encoding::Struct("CGImage", &[]));
    }

    // core-graphics' CGImage wraps the raw CGImageRef
    let image_ref: *const OpaqueImage =
        unsafe { *(image as *const CGImage as *const *const OpaqueImage) };

    // NSSize zéro: taille en pixels de l'image / Zero size: image pixel size
    let ns_image: Option<Retained<NSImage>> = unsafe {
        msg_send![
            NSImage::alloc(),
            initWithCGImage: image_ref,
            size: NSSize::new(0.0, 0.0)
        ]
    };
    let Some(ns_image) = ns_image else {
        log::warn!("NSImage initWithCGImage:size: returned nil, frame not drawn");
        return;
    };

    // fromRect zéro: image entière / Zero fromRect: whole image
    let whole = NSRect::new(NSPoint::new(0.0, 0.0), NSSize::new(0.0, 0.0));
    ns_image.drawInRect_fromRect_operation_fraction(
        destination,
        whole,
        NSCompositingOperation::Copy,
        1.0,
    );
}

// =============================================================================
// FONCTIONS UTILITAIRES
// UTILITY FUNCTIONS
// =============================================================================

fn to_ns_rect(rect: Rect) -> NSRect {
    NSRect::new(
        NSPoint::new(rect.origin.x, rect.origin.y),
        NSSize::new(rect.size.width, rect.size.height),
    )
}

fn from_ns_rect(rect: NSRect) -> Rect {
    Rect::new(rect.origin.x, rect.origin.y, rect.size.width, rect.size.height)
}

fn inset(rect: NSRect, by: f64) -> NSRect {
    NSRect::new(
        NSPoint::new(rect.origin.x + by, rect.origin.y + by),
        NSSize::new(
            (rect.size.width - 2.0 * by).max(0.0),
            (rect.size.height - 2.0 * by).max(0.0),
        ),
    )
}

/// Position du pointeur (coordonnées Cocoa, origine en bas à gauche)
/// Pointer location (Cocoa coordinates, bottom-left origin)
fn mouse_location() -> Point {
    let location = NSEvent::mouseLocation();
    Point::new(location.x, location.y)
}

fn key_from_code(code: u16) -> Key {
    match code {
        KEY_ESCAPE => Key::Escape,
        KEY_RETURN | KEY_ENTER => Key::Return,
        KEY_LEFT => Key::Left,
        KEY_RIGHT => Key::Right,
        KEY_UP => Key::Up,
        KEY_DOWN => Key::Down,
        other => Key::Other(other),
    }
}

// =============================================================================
// BACKEND
// =============================================================================

/// Backend AppKit + Core Graphics
/// AppKit + Core Graphics backend
pub struct MacBackend {
    mtm: MainThreadMarker,
    sink: Option<EventSink>,
    window: Option<Retained<LoupeWindow>>,
    view: Option<Retained<LoupeView>>,
    /// Capture waiting to be presented
    last_image: Option<CGImage>,
}

impl MacBackend {
    pub fn new(mtm: MainThreadMarker) -> Self {
        Self {
            mtm,
            sink: None,
            window: None,
            view: None,
            last_image: None,
        }
    }

    fn set_event_sink(&mut self, sink: EventSink) {
        self.sink = Some(sink);
    }

    /// Espace colorimétrique de l'écran de la loupe
    /// Color space of the loupe's screen
    fn screen_color_space(&self) -> ColorSpace {
        let screen = self
            .window
            .as_ref()
            .and_then(|window| window.screen())
            .or_else(|| NSScreen::mainScreen(self.mtm));
        let name: Option<Retained<NSString>> = screen
            .and_then(|screen| screen.colorSpace())
            .and_then(|space| unsafe { space.localizedName() });
        match name {
            Some(name) => ColorSpace::from_name(&name.to_string()),
            None => ColorSpace::Device,
        }
    }

    /// Hauteur de l'écran d'origine, pour passer en coordonnées haut-gauche
    /// Height of the origin display, to switch to top-left coordinates
    fn origin_display_height(&self) -> Option<f64> {
        geometry::origin_display(&self.displays()).map(|display| display.size.height)
    }
}

impl Backend for MacBackend {
    fn displays(&self) -> Vec<Rect> {
        NSScreen::screens(self.mtm)
            .iter()
            .map(|screen| from_ns_rect(screen.frame()))
            .collect()
    }

    fn pointer_location(&self) -> Point {
        mouse_location()
    }

    fn open_overlay(&mut self, size: Size) -> Result<(), PickerError> {
        let sink = self
            .sink
            .clone()
            .ok_or_else(|| PickerError::OverlayCreation("no event sink attached".to_string()))?;
        self.close_overlay();

        let origin = geometry::overlay_origin(mouse_location(), size);
        let frame = to_ns_rect(Rect::from_origin_size(origin, size));
        let window = LoupeWindow::new(self.mtm, frame, sink);
        let view = LoupeView::new(
            self.mtm,
            NSRect::new(NSPoint::new(0.0, 0.0), NSSize::new(size.width, size.height)),
        );

        window.setLevel(POP_UP_MENU_WINDOW_LEVEL);
        window.setBackgroundColor(Some(&NSColor::clearColor()));
        window.setOpaque(false);
        window.setHasShadow(false);
        window.setIgnoresMouseEvents(false);
        // La loupe n'apparaît pas dans ses propres captures
        // The loupe does not show up in its own captures
        window.setSharingType(NSWindowSharingType(0));
        unsafe { window.setReleasedWhenClosed(false) };
        let content: &NSView = &view;
        window.setContentView(Some(content));

        // Gardées avant makeKey: becomeKeyWindow peut rappeler le backend
        // Stored before makeKey: becomeKeyWindow may call back into the backend
        self.window = Some(window.clone());
        self.view = Some(view);
        window.makeKeyAndOrderFront(None);
        log::debug!("loupe window opened at {:?}", origin);
        Ok(())
    }

    fn close_overlay(&mut self) {
        self.view = None;
        self.last_image = None;
        if let Some(window) = self.window.take() {
            window.orderOut(None);
            window.close();
            log::debug!("loupe window closed");
        }
    }

    fn overlay_frame(&self) -> Option<Rect> {
        self.window.as_ref().map(|window| from_ns_rect(window.frame()))
    }

    fn move_overlay(&mut self, origin: Point) {
        if let Some(window) = self.window.as_ref() {
            window.setFrameOrigin(NSPoint::new(origin.x, origin.y));
        }
    }

    fn capture(&mut self, rect: Rect) -> Result<PixelBuffer, PickerError> {
        // Capture tout ce qui est sous la fenêtre de la loupe
        // Capture everything below the loupe window
        let (list_option, window_id) = match self.window.as_ref() {
            Some(window) => (WINDOW_LIST_ON_SCREEN_BELOW_WINDOW, window.windowNumber() as u32),
            None => (WINDOW_LIST_ON_SCREEN_ONLY, 0),
        };
        let bounds = CGRect::new(
            &CGPoint::new(rect.origin.x, rect.origin.y),
            &CGSize::new(rect.size.width, rect.size.height),
        );
        let image = CGDisplay::screenshot(
            bounds,
            list_option,
            window_id,
            WINDOW_IMAGE_NOMINAL_RESOLUTION,
        )
        .ok_or_else(|| PickerError::CaptureFailed(format!("no image for {:?}", rect)))?;

        // Les données CGImage sont en BGRA / CGImage data is BGRA
        if image.bits_per_pixel() != 32 {
            return Err(PickerError::CaptureFailed(format!(
                "unsupported {} bits per pixel",
                image.bits_per_pixel()
            )));
        }
        let buffer = PixelBuffer::new(
            image.width(),
            image.height(),
            image.bytes_per_row(),
            PixelFormat::Bgra8,
            self.screen_color_space(),
            image.data().bytes().to_vec(),
        )?;
        self.last_image = Some(image);
        Ok(buffer)
    }

    fn present(&mut self, _frame: &PixelBuffer, aperture: f64) {
        if let (Some(view), Some(image)) = (self.view.as_ref(), self.last_image.take()) {
            view.show(image, aperture);
        }
    }

    fn set_cursor_visible(&mut self, visible: bool) {
        if visible {
            NSCursor::unhide();
        } else {
            NSCursor::hide();
        }
    }

    fn set_accepts_pointer_moves(&mut self, accepts: bool) {
        if let Some(window) = self.window.as_ref() {
            window.setAcceptsMouseMovedEvents(accepts);
        }
    }

    fn warp_pointer(&mut self, location: Point) {
        let Some(height) = self.origin_display_height() else {
            return;
        };
        // Core Graphics: origine en haut à gauche / top-left origin
        let target = CGPoint::new(location.x, geometry::flip_y(location.y, height));
        if let Err(err) = CGDisplay::warp_mouse_cursor_position(target) {
            log::warn!("could not move the pointer: error {}", err);
        }
    }
}

impl Drop for MacBackend {
    fn drop(&mut self) {
        self.close_overlay();
    }
}

// =============================================================================
// DISTRIBUTION DES ÉVÉNEMENTS
// EVENT DISPATCH
// =============================================================================

/// Crée une loupe pilotée par la boucle d'événements de l'application
/// Creates a loupe driven by the application's event loop
///
/// Must be called on the main thread. The window's events reach the
/// returned picker as long as it is alive.
pub fn loupe(config: LoupeConfig) -> Result<SharedPicker<MacBackend>, PickerError> {
    let mtm = MainThreadMarker::new().ok_or(PickerError::NotMainThread)?;
    let shared = SharedPicker::new(MacBackend::new(mtm), config)?;
    let sink: EventSink = Rc::new(shared.event_sink());
    shared.with_backend_mut(|backend| backend.set_event_sink(sink))?;
    Ok(shared)
}

// =============================================================================
// API PUBLIQUE
// PUBLIC API
// =============================================================================

/// Exécute une session de sélection sur macOS
/// Runs a picking session on macOS
///
/// Must be called from the main thread. Returns `Ok(None)` when the user
/// cancels (ESC or focus loss).
pub fn run(config: LoupeConfig) -> Result<Option<Color>, PickerError> {
    let mtm = MainThreadMarker::new().ok_or(PickerError::NotMainThread)?;
    let app = NSApplication::sharedApplication(mtm);
    app.setActivationPolicy(NSApplicationActivationPolicy::Accessory);
    NSRunningApplication::currentApplication()
        .activateWithOptions(NSApplicationActivationOptions::empty());

    let picker = loupe(config)?;
    let mut sample = picker.sample()?;

    // Boucle d'événements personnalisée jusqu'à la fin de la session
    // Custom event loop until the session ends
    loop {
        if let Some(color) = (&mut sample).now_or_never() {
            return Ok(color);
        }

        let timeout = NSDate::dateWithTimeIntervalSinceNow(EVENT_POLL_INTERVAL);
        let event = unsafe {
            app.nextEventMatchingMask_untilDate_inMode_dequeue(
                NSEventMask::Any,
                Some(&timeout),
                NSDefaultRunLoopMode,
                true,
            )
        };
        if let Some(event) = event {
            app.sendEvent(&event);
        }
        app.updateWindows();
    }
}

// =============================================================================
// TESTS
// =============================================================================
