// =============================================================================
// COLOR LOUPE - VERSION WINDOWS
// =============================================================================
// Petite fenêtre ronde toujours au-dessus qui suit le curseur
// Small round always-on-top window following the cursor
// =============================================================================
//
// Les coordonnées Win32 ont l'origine en haut à gauche de l'écran principal.
// La session travaille en coordonnées bas-gauche: les conversions se font ici
// avec la hauteur de l'écran principal.
// Win32 coordinates have their origin at the top-left of the primary screen.
// The session works in bottom-left coordinates: conversions happen here
// using the primary screen height.

use std::cell::{Cell, RefCell};

use futures::FutureExt;

use windows::{
    core::{w, PCWSTR},
    Win32::{
        Foundation::*,
        Graphics::Gdi::*,
        System::LibraryLoader::GetModuleHandleW,
        UI::{
            Input::KeyboardAndMouse::*,
            WindowsAndMessaging::*,
        },
    },
};

use crate::capture::{PixelBuffer, PixelFormat};
use crate::common::{Color, ColorSpace};
use crate::config::LoupeConfig;
use crate::error::PickerError;
use crate::geometry::{self, Point, Rect, Size};
use crate::picker::{Sample, SharedPicker};
use crate::session::{Backend, Key, LoupeEvent};

// =============================================================================
// CONSTANTES
// CONSTANTS
// =============================================================================

/// Nom de la classe de fenêtre Windows
/// Windows window class name
const WINDOW_CLASS: &str = "ColorLoupeOverlay";

/// Identifiant du timer de suivi du curseur
/// Cursor polling timer ID
const TIMER_ID: usize = 1;

/// Période du timer (ms) / Timer period (ms)
const TIMER_PERIOD_MS: u32 = 16;

/// One notch of the mouse wheel
const WHEEL_NOTCH: f64 = 120.0;

// =============================================================================
// ÉTAT DU THREAD UI
// UI THREAD STATE
// =============================================================================

thread_local! {
    /// Picker qui reçoit les messages de la fenêtre
    /// Picker receiving the window messages
    static LOUPE: RefCell<Option<SharedPicker<WinBackend>>> = const { RefCell::new(None) };

    /// Dernière position vue par le timer / Last position seen by the timer
    static LAST_POLL: Cell<Option<(i32, i32)>> = const { Cell::new(None) };
}

fn current_loupe() -> Option<SharedPicker<WinBackend>> {
    LOUPE.with(|cell| cell.borrow().clone())
}

/// Transmet un événement au picker; pendant un autre événement il est ignoré
/// (ex: WM_KILLFOCUS pendant DestroyWindow)
/// Forwards an event to the picker; during another event it is dropped
/// (e.g. WM_KILLFOCUS during DestroyWindow)
fn dispatch(event: LoupeEvent) {
    if let Some(loupe) = current_loupe() {
        loupe.dispatch(event);
    }
}

// =============================================================================
// COORDONNÉES
// COORDINATES
// =============================================================================

fn primary_height() -> f64 {
    unsafe { GetSystemMetrics(SM_CYSCREEN) as f64 }
}

fn cursor_position() -> Option<POINT> {
    let mut pt = POINT::default();
    unsafe { GetCursorPos(&mut pt) }.ok()?;
    Some(pt)
}

/// Rectangle Win32 (haut-gauche) vers Rect bas-gauche
/// Win32 (top-left) rectangle to bottom-left Rect
fn rect_from_win32(rect: &RECT, reference_height: f64) -> Rect {
    let height = (rect.bottom - rect.top) as f64;
    Rect::new(
        rect.left as f64,
        reference_height - rect.top as f64 - height,
        (rect.right - rect.left) as f64,
        height,
    )
}

unsafe extern "system" fn collect_monitor(
    _monitor: HMONITOR,
    _hdc: HDC,
    rect: *mut RECT,
    data: LPARAM,
) -> BOOL {
    let monitors = &mut *(data.0 as *mut Vec<RECT>);
    monitors.push(*rect);
    TRUE
}

// =============================================================================
// BACKEND
// =============================================================================

/// Backend Win32 GDI
/// Win32 GDI backend
pub struct WinBackend {
    instance: HINSTANCE,
    class_name: Vec<u16>,
    hwnd: Option<HWND>,
    /// Dernière capture, peinte dans WM_PAINT / Last capture, painted in WM_PAINT
    frame: Option<PixelBuffer>,
    aperture: f64,
}

impl WinBackend {
    /// Enregistre la classe de fenêtre
    /// Registers the window class
    pub fn new() -> Result<Self, PickerError> {
        let module = unsafe { GetModuleHandleW(None) }
            .map_err(|err| PickerError::OverlayCreation(err.to_string()))?;
        let instance: HINSTANCE = module.into();
        let class_name: Vec<u16> = WINDOW_CLASS
            .encode_utf16()
            .chain(std::iter::once(0))
            .collect();

        let wc = WNDCLASSEXW {
            cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
            style: CS_HREDRAW | CS_VREDRAW,
            lpfnWndProc: Some(wnd_proc),
            hInstance: instance,
            hCursor: HCURSOR::default(),
            lpszClassName: PCWSTR(class_name.as_ptr()),
            ..Default::default()
        };
        if unsafe { RegisterClassExW(&wc) } == 0 {
            return Err(PickerError::OverlayCreation(
                "RegisterClassExW failed".to_string(),
            ));
        }

        Ok(Self {
            instance,
            class_name,
            hwnd: None,
            frame: None,
            aperture: 0.0,
        })
    }

    fn start_polling(&self, hwnd: HWND) {
        LAST_POLL.with(|last| last.set(None));
        unsafe {
            SetTimer(hwnd, TIMER_ID, TIMER_PERIOD_MS, None);
        }
    }

    // =========================================================================
    // DESSIN
    // PAINTING
    // =========================================================================

    /// Peint la capture agrandie, le réticule et la bordure
    /// Paints the magnified capture, the reticle and the border
    fn paint(&self, hwnd: HWND, hdc: HDC) {
        let mut client = RECT::default();
        if unsafe { GetClientRect(hwnd, &mut client) }.is_err() {
            return;
        }
        let width = client.right - client.left;
        let height = client.bottom - client.top;

        if let Some(frame) = self.frame.as_ref() {
            let bmi = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: (frame.bytes_per_row() / 4) as i32,
                    biHeight: -(frame.height() as i32), // Négatif = top-down / Negative = top-down
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };
            unsafe {
                // Pixels nets, sans lissage / Sharp pixels, no smoothing
                SetStretchBltMode(hdc, COLORONCOLOR);
                StretchDIBits(
                    hdc,
                    0,
                    0,
                    width,
                    height,
                    0,
                    0,
                    frame.width() as i32,
                    frame.height() as i32,
                    Some(frame.data().as_ptr() as *const _),
                    &bmi,
                    DIB_RGB_COLORS,
                    SRCCOPY,
                );
            }
        }

        let bounds = Rect::new(0.0, 0.0, width as f64, height as f64);
        let aperture = geometry::aperture_rect(bounds, self.aperture);
        let left = aperture.min_x().round() as i32;
        let top = aperture.min_y().round() as i32;
        let right = aperture.max_x().round() as i32;
        let bottom = aperture.max_y().round() as i32;

        unsafe {
            let text = COLORREF(GetSysColor(COLOR_WINDOWTEXT));
            let background = COLORREF(GetSysColor(COLOR_WINDOW));
            let text_pen = CreatePen(PS_SOLID, 1, text);
            let background_pen = CreatePen(PS_SOLID, 1, background);
            let ring_pen = CreatePen(PS_SOLID, 2, text);

            let old_brush = SelectObject(hdc, GetStockObject(NULL_BRUSH));
            let old_pen = SelectObject(hdc, text_pen);
            let _ = Rectangle(hdc, left, top, right, bottom);
            SelectObject(hdc, background_pen);
            let _ = Rectangle(hdc, left + 1, top + 1, right - 1, bottom - 1);

            // Bordure circulaire / Circular border
            SelectObject(hdc, ring_pen);
            let _ = Ellipse(hdc, 1, 1, width - 1, height - 1);
            SelectObject(hdc, background_pen);
            let _ = Ellipse(hdc, 3, 3, width - 3, height - 3);

            SelectObject(hdc, old_pen);
            SelectObject(hdc, old_brush);
            let _ = DeleteObject(text_pen);
            let _ = DeleteObject(background_pen);
            let _ = DeleteObject(ring_pen);
        }
    }
}

impl Backend for WinBackend {
    fn displays(&self) -> Vec<Rect> {
        let mut monitors: Vec<RECT> = Vec::new();
        unsafe {
            let _ = EnumDisplayMonitors(
                HDC::default(),
                None,
                Some(collect_monitor),
                LPARAM(&mut monitors as *mut Vec<RECT> as isize),
            );
        }
        let reference = primary_height();
        monitors
            .iter()
            .map(|rect| rect_from_win32(rect, reference))
            .collect()
    }

    fn pointer_location(&self) -> Point {
        match cursor_position() {
            Some(pt) => Point::new(pt.x as f64, geometry::flip_y(pt.y as f64, primary_height())),
            None => Point::default(),
        }
    }

    fn open_overlay(&mut self, size: Size) -> Result<(), PickerError> {
        self.close_overlay();

        let origin = geometry::overlay_origin(self.pointer_location(), size);
        let width = size.width.round() as i32;
        let height = size.height.round() as i32;
        let top = (primary_height() - origin.y - size.height).round() as i32;

        let hwnd = unsafe {
            CreateWindowExW(
                WS_EX_TOPMOST | WS_EX_TOOLWINDOW,
                PCWSTR(self.class_name.as_ptr()),
                w!(""),
                WS_POPUP,
                origin.x as i32,
                top,
                width,
                height,
                None,
                None,
                self.instance,
                None,
            )
        }
        .map_err(|err| PickerError::OverlayCreation(err.to_string()))?;

        unsafe {
            // Fenêtre ronde / Round window
            let region = CreateEllipticRgn(0, 0, width + 1, height + 1);
            SetWindowRgn(hwnd, region, TRUE);

            // Exclue de ses propres captures / Excluded from its own captures
            if let Err(err) = SetWindowDisplayAffinity(hwnd, WDA_EXCLUDEFROMCAPTURE) {
                log::warn!("loupe window may appear in its captures: {}", err);
            }
        }

        // Gardée avant ShowWindow, qui envoie déjà des messages
        // Stored before ShowWindow, which already sends messages
        self.hwnd = Some(hwnd);
        unsafe {
            let _ = ShowWindow(hwnd, SW_SHOW);
            let _ = SetForegroundWindow(hwnd);
            let _ = SetFocus(hwnd);
            SetCapture(hwnd);
        }
        self.start_polling(hwnd);
        log::debug!("loupe window opened at {:?}", origin);
        Ok(())
    }

    fn close_overlay(&mut self) {
        self.frame = None;
        if let Some(hwnd) = self.hwnd.take() {
            unsafe {
                let _ = KillTimer(hwnd, TIMER_ID);
                let _ = ReleaseCapture();
                let _ = DestroyWindow(hwnd);
            }
            log::debug!("loupe window closed");
        }
    }

    fn overlay_frame(&self) -> Option<Rect> {
        let hwnd = self.hwnd?;
        let mut rect = RECT::default();
        unsafe { GetWindowRect(hwnd, &mut rect) }.ok()?;
        Some(rect_from_win32(&rect, primary_height()))
    }

    fn move_overlay(&mut self, origin: Point) {
        let Some(frame) = self.overlay_frame() else {
            return;
        };
        let Some(hwnd) = self.hwnd else {
            return;
        };
        let top = (primary_height() - origin.y - frame.size.height).round() as i32;
        unsafe {
            let _ = SetWindowPos(
                hwnd,
                HWND_TOPMOST,
                origin.x as i32,
                top,
                0,
                0,
                SWP_NOSIZE | SWP_NOACTIVATE,
            );
        }
    }

    fn capture(&mut self, rect: Rect) -> Result<PixelBuffer, PickerError> {
        let width = rect.size.width.floor().max(1.0) as i32;
        let height = rect.size.height.floor().max(1.0) as i32;
        let mut data: Vec<u8> = vec![0; (width * height * 4) as usize];

        unsafe {
            let hdc_screen = GetDC(HWND::default());
            let hdc_mem = CreateCompatibleDC(hdc_screen);
            let hbitmap = CreateCompatibleBitmap(hdc_screen, width, height);

            let result = if hbitmap.is_invalid() {
                Err(PickerError::CaptureFailed(
                    "CreateCompatibleBitmap failed".to_string(),
                ))
            } else {
                let previous = SelectObject(hdc_mem, hbitmap);
                let copied = BitBlt(
                    hdc_mem,
                    0,
                    0,
                    width,
                    height,
                    hdc_screen,
                    rect.origin.x as i32,
                    rect.origin.y as i32,
                    SRCCOPY,
                );
                SelectObject(hdc_mem, previous);

                let mut bmi = BITMAPINFO {
                    bmiHeader: BITMAPINFOHEADER {
                        biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                        biWidth: width,
                        biHeight: -height, // Négatif = top-down / Negative = top-down
                        biPlanes: 1,
                        biBitCount: 32, // BGRA
                        biCompression: BI_RGB.0,
                        ..Default::default()
                    },
                    ..Default::default()
                };
                let lines = GetDIBits(
                    hdc_mem,
                    hbitmap,
                    0,
                    height as u32,
                    Some(data.as_mut_ptr() as *mut _),
                    &mut bmi,
                    DIB_RGB_COLORS,
                );
                let _ = DeleteObject(hbitmap);

                match copied {
                    Err(err) => Err(PickerError::CaptureFailed(err.to_string())),
                    Ok(()) if lines != height => Err(PickerError::CaptureFailed(format!(
                        "GetDIBits copied {} of {} lines",
                        lines, height
                    ))),
                    Ok(()) => Ok(()),
                }
            };

            let _ = DeleteDC(hdc_mem);
            ReleaseDC(HWND::default(), hdc_screen);
            result?;
        }

        // GDI laisse l'alpha à zéro / GDI leaves alpha at zero
        for alpha in data.iter_mut().skip(3).step_by(4) {
            *alpha = u8::MAX;
        }
        PixelBuffer::packed(
            width as usize,
            height as usize,
            PixelFormat::Bgra8,
            ColorSpace::Srgb,
            data,
        )
    }

    fn present(&mut self, frame: &PixelBuffer, aperture: f64) {
        self.frame = Some(frame.clone());
        self.aperture = aperture;
        if let Some(hwnd) = self.hwnd {
            unsafe {
                let _ = InvalidateRect(hwnd, None, FALSE);
            }
        }
    }

    fn set_cursor_visible(&mut self, visible: bool) {
        unsafe {
            ShowCursor(visible);
        }
    }

    fn set_accepts_pointer_moves(&mut self, accepts: bool) {
        let Some(hwnd) = self.hwnd else {
            return;
        };
        if accepts {
            self.start_polling(hwnd);
        } else {
            unsafe {
                let _ = KillTimer(hwnd, TIMER_ID);
            }
        }
    }

    fn warp_pointer(&mut self, location: Point) {
        let y = geometry::flip_y(location.y, primary_height());
        unsafe {
            let _ = SetCursorPos(location.x as i32, y as i32);
        }
        // Le timer ne doit pas rejouer ce déplacement
        // The timer must not replay this move
        if let Some(pt) = cursor_position() {
            LAST_POLL.with(|last| last.set(Some((pt.x, pt.y))));
        }
    }
}

impl Drop for WinBackend {
    fn drop(&mut self) {
        self.close_overlay();
        unsafe {
            let _ = UnregisterClassW(PCWSTR(self.class_name.as_ptr()), self.instance);
        }
    }
}

// =============================================================================
// ÉVÉNEMENTS
// EVENTS
// =============================================================================

fn key_from_vk(vk: VIRTUAL_KEY) -> Key {
    match vk {
        VK_ESCAPE => Key::Escape,
        VK_RETURN => Key::Return,
        VK_LEFT => Key::Left,
        VK_RIGHT => Key::Right,
        VK_UP => Key::Up,
        VK_DOWN => Key::Down,
        other => Key::Other(other.0),
    }
}

fn current_pointer() -> Option<Point> {
    let pt = cursor_position()?;
    Some(Point::new(
        pt.x as f64,
        geometry::flip_y(pt.y as f64, primary_height()),
    ))
}

/// Timer: ne transmet que les positions qui ont changé
/// Timer: only forwards positions that changed
fn poll_cursor() {
    let Some(pt) = cursor_position() else {
        return;
    };
    let changed = LAST_POLL.with(|last| last.replace(Some((pt.x, pt.y))) != Some((pt.x, pt.y)));
    if changed {
        if let Some(location) = current_pointer() {
            dispatch(LoupeEvent::PointerMoved(location));
        }
    }
}

// =============================================================================
// WINDOW PROCEDURE
// =============================================================================

extern "system" fn wnd_proc(hwnd: HWND, msg: u32, wp: WPARAM, lp: LPARAM) -> LRESULT {
    unsafe {
        match msg {
            WM_PAINT => {
                let mut ps = PAINTSTRUCT::default();
                let hdc = BeginPaint(hwnd, &mut ps);
                if let Some(loupe) = current_loupe() {
                    let _ = loupe.with_backend(|backend| backend.paint(hwnd, hdc));
                }
                let _ = EndPaint(hwnd, &ps);
                LRESULT(0)
            }
            WM_TIMER => {
                poll_cursor();
                LRESULT(0)
            }
            WM_MOUSEMOVE => {
                poll_cursor();
                LRESULT(0)
            }
            WM_LBUTTONDOWN => {
                if let Some(location) = current_pointer() {
                    dispatch(LoupeEvent::MouseDown(location));
                }
                LRESULT(0)
            }
            WM_KEYDOWN => {
                let shift = GetKeyState(VK_SHIFT.0 as i32) < 0;
                dispatch(LoupeEvent::KeyDown {
                    key: key_from_vk(VIRTUAL_KEY(wp.0 as u16)),
                    shift,
                });
                LRESULT(0)
            }
            WM_MOUSEWHEEL => {
                let delta = ((wp.0 >> 16) & 0xFFFF) as i16;
                dispatch(LoupeEvent::Scrolled {
                    delta_y: delta as f64 / WHEEL_NOTCH,
                });
                LRESULT(0)
            }
            WM_SETFOCUS => {
                dispatch(LoupeEvent::FocusGained);
                LRESULT(0)
            }
            WM_KILLFOCUS => {
                dispatch(LoupeEvent::FocusLost);
                LRESULT(0)
            }
            WM_ERASEBKGND => {
                // Ne pas effacer le fond (évite le scintillement)
                LRESULT(1)
            }
            _ => DefWindowProcW(hwnd, msg, wp, lp),
        }
    }
}

// =============================================================================
// API PUBLIQUE
// PUBLIC API
// =============================================================================

/// Exécute une session de sélection sur Windows
/// Runs a picking session on Windows
///
/// Returns `Ok(None)` when the user cancels (ESC or focus loss).
pub fn run(config: LoupeConfig) -> Result<Option<Color>, PickerError> {
    let loupe = SharedPicker::new(WinBackend::new()?, config)?;
    LOUPE.with(|cell| *cell.borrow_mut() = Some(loupe.clone()));

    let result = loupe.sample().and_then(|mut sample| pump_messages(&mut sample));

    // Libéré hors emprunt: DestroyWindow renvoie des messages
    // Dropped outside the borrow: DestroyWindow sends messages back
    let registered = LOUPE.with(|cell| cell.borrow_mut().take());
    drop(registered);
    drop(loupe);
    result
}

/// Boucle de messages jusqu'à la fin de la session
/// Message loop until the session ends
fn pump_messages(sample: &mut Sample) -> Result<Option<Color>, PickerError> {
    let mut msg = MSG::default();
    loop {
        if let Some(color) = (&mut *sample).now_or_never() {
            return Ok(color);
        }
        let status = unsafe { GetMessageW(&mut msg, HWND::default(), 0, 0) };
        match status.0 {
            0 => {
                return Err(PickerError::EventLoop(
                    "WM_QUIT received before the session ended".to_string(),
                ))
            }
            -1 => {
                return Err(PickerError::EventLoop(
                    windows::core::Error::from_win32().to_string(),
                ))
            }
            _ => {}
        }
        unsafe {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
