use crate::config::ConfigStore;
use crate::MainWindow;
use app_settings::{AppSettings, OutputKind};
use core_types::{Bitmap, DeviceCapabilities, Point};
use engine::{ImageEngine, OutputFormat, SUPPORTED_EXTENSIONS};
use rfd::FileDialog;
use session::{
    select_delivery, DeliveryStrategy, DownloadDelivery, ImageSession, LoadOutcome,
    SessionConfig, SessionError, SessionStatus, SourceFile,
};
use slint::{ComponentHandle, ModelRc, Rgba8Pixel, SharedPixelBuffer, SharedString, VecModel};
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info, warn};
use viewer::transform::FIT_FRACTION;
use viewer::{InputEvent, Rect, ScrollLock, Size, Viewer, ZoomPolicy};

const IDLE_STATUS: &str = "Choose a JPG, PNG or GIF image (max 5MB)";
/// Press and release further apart than this are a drag, not a click.
const CLICK_SLOP: f32 = 4.0;

fn preview_to_pixel_buffer(bitmap: &Bitmap) -> SharedPixelBuffer<Rgba8Pixel> {
    let mut buf = SharedPixelBuffer::<Rgba8Pixel>::new(bitmap.width(), bitmap.height());
    let dest = buf.make_mut_bytes();
    dest.copy_from_slice(bitmap.as_bytes());
    buf
}

pub fn output_format(settings: &AppSettings) -> OutputFormat {
    match settings.output.format {
        OutputKind::Png => OutputFormat::Png,
        OutputKind::Jpeg => OutputFormat::Jpeg {
            quality: settings.output.quality,
        },
    }
}

pub fn zoom_policy(settings: &AppSettings) -> ZoomPolicy {
    let viewer = &settings.viewer;
    ZoomPolicy::new(
        viewer.zoom_step,
        viewer.min_zoom,
        viewer.max_zoom,
        viewer.transition_ms,
    )
}

pub fn detect_capabilities() -> DeviceCapabilities {
    if cfg!(any(target_os = "android", target_os = "ios")) {
        DeviceCapabilities::MOBILE | DeviceCapabilities::TOUCH
    } else {
        DeviceCapabilities::empty()
    }
}

/// A click on the dimmed area around the image, as opposed to the end of a
/// drag or a click on the image itself.
pub fn is_backdrop_click(press: Point, release: Point, frame: Rect) -> bool {
    if press.distance_to(release) > CLICK_SLOP {
        return false;
    }
    let inside = release.x >= frame.x
        && release.x <= frame.x + frame.width
        && release.y >= frame.y
        && release.y <= frame.y + frame.height;
    !inside
}

/// What the error line's "Try again" button repeats.
#[derive(Debug, Clone, PartialEq)]
pub enum Retry {
    Load(PathBuf),
    Save,
}

impl Retry {
    /// Retry action for a failed save.
    pub fn after_save_error(err: &SessionError, last_pick: Option<&Path>) -> Option<Self> {
        match err {
            SessionError::Delivery(_) => Some(Self::Save),
            SessionError::Engine(_) | SessionError::NotReady => {
                last_pick.map(|path| Self::Load(path.to_path_buf()))
            }
        }
    }
}

/// On-screen rect of the open image inside a `container` of that size.
pub fn viewer_frame(viewer: &Viewer<ViewerImage>, container: Size) -> Rect {
    match viewer.image() {
        Some(image) => viewer.transform().frame(container, image.size),
        None => Rect::default(),
    }
}

#[derive(Clone)]
pub struct ViewerImage {
    image: slint::Image,
    size: Size,
}

impl ViewerImage {
    fn from_bitmap(bitmap: &Bitmap) -> Self {
        Self {
            image: slint::Image::from_rgba8(preview_to_pixel_buffer(bitmap)),
            size: Size::new(bitmap.width() as f32, bitmap.height() as f32),
        }
    }
}

struct Previews {
    original: ViewerImage,
    inverted: ViewerImage,
}

/// Disables the main window controls while the viewer is up.
struct BackgroundLock {
    ui: slint::Weak<MainWindow>,
}

impl ScrollLock for BackgroundLock {
    fn lock(&self) {
        if let Some(ui) = self.ui.upgrade() {
            ui.set_background_locked(true);
        }
    }

    fn unlock(&self) {
        if let Some(ui) = self.ui.upgrade() {
            ui.set_background_locked(false);
        }
    }
}

pub struct Controller {
    ui: slint::Weak<MainWindow>,
    engine: ImageEngine,
    session: RefCell<ImageSession>,
    viewer: RefCell<Viewer<ViewerImage>>,
    delivery: RefCell<Box<dyn DeliveryStrategy>>,
    settings: RefCell<AppSettings>,
    config: ConfigStore,
    previews: RefCell<Option<Previews>>,
    last_pick: RefCell<Option<PathBuf>>,
    retry: RefCell<Option<Retry>>,
    press: Cell<Option<Point>>,
}

impl Controller {
    pub fn new(ui: &MainWindow, settings: AppSettings, config: ConfigStore) -> Rc<Self> {
        let format = output_format(&settings);
        let session = ImageSession::new(SessionConfig {
            max_upload_bytes: settings.output.max_upload_bytes,
            output_format: format,
        });
        let lock = Rc::new(BackgroundLock { ui: ui.as_weak() });
        let viewer = Viewer::with_scroll_lock(zoom_policy(&settings), lock);
        let delivery = build_delivery(&settings);

        Rc::new(Self {
            ui: ui.as_weak(),
            engine: ImageEngine::with_format(format),
            session: RefCell::new(session),
            viewer: RefCell::new(viewer),
            delivery: RefCell::new(delivery),
            settings: RefCell::new(settings),
            config,
            previews: RefCell::new(None),
            last_pick: RefCell::new(None),
            retry: RefCell::new(None),
            press: Cell::new(None),
        })
    }

    pub fn install(self: &Rc<Self>, ui: &MainWindow) {
        let this = self.clone();
        ui.on_open_image_request(move || this.open_image());
        let this = self.clone();
        ui.on_retry_request(move || this.retry());
        let this = self.clone();
        ui.on_save_request(move || this.save());
        let this = self.clone();
        ui.on_choose_folder_request(move || this.choose_folder());
        let this = self.clone();
        ui.on_reset_request(move || this.reset());
        let this = self.clone();
        ui.on_open_recent(move |index| this.open_recent(index));

        let this = self.clone();
        ui.on_open_viewer(move |which| this.open_viewer(which));
        let this = self.clone();
        ui.on_close_viewer(move || this.close_viewer());
        let this = self.clone();
        ui.on_zoom_in(move || this.with_viewer(Viewer::zoom_in));
        let this = self.clone();
        ui.on_zoom_out(move || this.with_viewer(Viewer::zoom_out));
        let this = self.clone();
        ui.on_reset_view(move || this.with_viewer(Viewer::reset_view));

        let this = self.clone();
        ui.on_viewer_pointer_down(move |x, y| {
            let point = Point::new(x, y);
            this.press.set(Some(point));
            this.with_viewer(|viewer| {
                viewer.handle_input(InputEvent::PointerDown(point));
            });
        });
        let this = self.clone();
        ui.on_viewer_pointer_move(move |x, y| {
            if !this.viewer.borrow().is_dragging() {
                return;
            }
            this.with_viewer(|viewer| {
                viewer.handle_input(InputEvent::PointerMove(Point::new(x, y)));
            });
        });
        let this = self.clone();
        ui.on_viewer_pointer_up(move || {
            this.with_viewer(|viewer| {
                viewer.handle_input(InputEvent::PointerUp);
            });
        });
        let this = self.clone();
        ui.on_viewer_clicked(move |x, y| this.viewer_clicked(Point::new(x, y)));
        let this = self.clone();
        ui.on_viewer_wheel(move |delta_y| {
            this.with_viewer(|viewer| {
                viewer.handle_input(InputEvent::Wheel { delta_y });
            });
        });

        let folder = self.delivery_folder();
        ui.set_save_folder(folder.into());
        ui.set_fit_fraction(FIT_FRACTION);
        self.sync_recent();
    }

    fn open_image(self: &Rc<Self>) {
        let mut dialog = FileDialog::new().add_filter("Images", SUPPORTED_EXTENSIONS);
        if let Some(dir) = self.config.last_open_dir() {
            dialog = dialog.set_directory(dir);
        }
        if let Some(path) = dialog.pick_file() {
            self.load_path(path);
        }
    }

    fn open_recent(self: &Rc<Self>, index: i32) {
        let snapshot = self.config.snapshot();
        let picked = usize::try_from(index)
            .ok()
            .and_then(|index| snapshot.recent_image(index));
        if let Some(path) = picked {
            self.load_path(path.to_path_buf());
        }
    }

    fn retry(self: &Rc<Self>) {
        let pending = self.retry.borrow_mut().take();
        match pending {
            Some(Retry::Load(path)) => self.load_path(path),
            Some(Retry::Save) => self.save(),
            None => self.open_image(),
        }
    }

    fn load_path(self: &Rc<Self>, path: PathBuf) {
        *self.last_pick.borrow_mut() = Some(path.clone());
        let file = match SourceFile::read(&path) {
            Ok(file) => file,
            Err(err) => {
                warn!(path = %path.display(), "failed to read image: {err}");
                self.show_error(
                    &format!("Unable to read {}: {err}", path.display()),
                    Some(Retry::Load(path)),
                );
                return;
            }
        };
        if let Err(err) = self.config.record_image(&path) {
            warn!("failed to record recent image: {err}");
        }
        self.sync_recent();

        let ticket = match self.session.borrow_mut().begin_load(file) {
            Ok(ticket) => ticket,
            Err(err) => {
                self.show_error(&err.user_message(), Some(Retry::Load(path)));
                return;
            }
        };
        self.viewer.borrow_mut().close();
        *self.previews.borrow_mut() = None;
        self.refresh();

        let token = ticket.token;
        match self.engine.invert_in_background(ticket.bytes) {
            Ok(pending) => {
                let this = self.clone();
                let spawned = slint::spawn_local(async move {
                    let result = pending.await;
                    let outcome = this.session.borrow_mut().finish_load(token, result);
                    this.apply_outcome(outcome);
                });
                if let Err(err) = spawned {
                    warn!("unable to schedule inversion: {err}");
                }
            }
            Err(err) => {
                let outcome = self.session.borrow_mut().finish_load(token, Err(err));
                self.apply_outcome(outcome);
            }
        }
    }

    fn apply_outcome(&self, outcome: LoadOutcome) {
        match outcome {
            LoadOutcome::Ready => {
                let previews = self.session.borrow().ready().and_then(|ready| {
                    let inverted = ready.inverted_bitmap()?;
                    Some(Previews {
                        original: ViewerImage::from_bitmap(&ready.original_bitmap),
                        inverted: ViewerImage::from_bitmap(inverted),
                    })
                });
                *self.previews.borrow_mut() = previews;
                self.refresh();
            }
            LoadOutcome::Failed(_) => {
                *self.retry.borrow_mut() = self.last_pick.borrow().clone().map(Retry::Load);
                self.refresh();
            }
            LoadOutcome::Stale => debug!("ignoring superseded result"),
        }
    }

    fn save(&self) {
        let result = {
            let delivery = self.delivery.borrow();
            self.session.borrow().deliver(delivery.as_ref())
        };
        match result {
            Ok(receipt) => {
                *self.retry.borrow_mut() = None;
                if let Some(ui) = self.ui.upgrade() {
                    ui.set_error_text("".into());
                    ui.set_status_text(receipt.message().into());
                }
            }
            Err(err) => {
                warn!("delivery failed: {err}");
                let retry = Retry::after_save_error(&err, self.last_pick.borrow().as_deref());
                self.show_error(&err.user_message(), retry);
            }
        }
    }

    fn choose_folder(&self) {
        let mut dialog = FileDialog::new();
        if let Some(dir) = self.settings.borrow().get_last_save_dir() {
            dialog = dialog.set_directory(dir);
        }
        let Some(dir) = dialog.pick_folder() else {
            return;
        };

        info!(dir = %dir.display(), "save folder changed");
        {
            let mut settings = self.settings.borrow_mut();
            settings.set_last_save_dir(dir);
            if let Err(err) = settings.save() {
                warn!("failed to save settings: {err}");
            }
            *self.delivery.borrow_mut() = build_delivery(&settings);
        }
        if let Some(ui) = self.ui.upgrade() {
            ui.set_save_folder(self.delivery_folder().into());
        }
    }

    fn reset(&self) {
        self.viewer.borrow_mut().close();
        self.session.borrow_mut().reset();
        *self.previews.borrow_mut() = None;
        *self.last_pick.borrow_mut() = None;
        *self.retry.borrow_mut() = None;
        self.refresh();
    }

    fn open_viewer(&self, which: i32) {
        let picked = self.previews.borrow().as_ref().map(|previews| {
            if which == 0 {
                (previews.original.clone(), "Original Image")
            } else {
                (previews.inverted.clone(), "Inverted Image")
            }
        });
        let Some((image, title)) = picked else {
            return;
        };
        self.with_viewer(|viewer| {
            viewer.open(image, title);
        });
    }

    fn close_viewer(&self) {
        self.press.set(None);
        self.with_viewer(|viewer| {
            viewer.close();
        });
    }

    fn viewer_clicked(&self, release: Point) {
        let Some(press) = self.press.take() else {
            return;
        };
        if is_backdrop_click(press, release, self.current_frame()) {
            self.close_viewer();
        }
    }

    fn with_viewer(&self, f: impl FnOnce(&mut Viewer<ViewerImage>)) {
        f(&mut self.viewer.borrow_mut());
        self.sync_viewer();
    }

    fn current_frame(&self) -> Rect {
        let Some(ui) = self.ui.upgrade() else {
            return Rect::default();
        };
        let window = ui.window();
        let logical = window.size().to_logical(window.scale_factor());
        viewer_frame(&self.viewer.borrow(), Size::new(logical.width, logical.height))
    }

    /// Push view state to the overlay. The overlay derives the frame from
    /// these and its own size, the same way [`viewer_frame`] does.
    fn sync_viewer(&self) {
        let Some(ui) = self.ui.upgrade() else {
            return;
        };
        let viewer = self.viewer.borrow();
        ui.set_viewer_open(viewer.is_open());
        if let Some(image) = viewer.image() {
            ui.set_viewer_image(image.image.clone());
            ui.set_image_width(image.size.width);
            ui.set_image_height(image.size.height);
        }
        ui.set_viewer_title(viewer.title().unwrap_or_default().into());
        ui.set_zoom_label(format!("{}%", viewer.zoom_percent()).into());
        ui.set_can_zoom_in(viewer.can_zoom_in());
        ui.set_can_zoom_out(viewer.can_zoom_out());

        let view = viewer.view();
        ui.set_frame_animation(i64::from(viewer.transform().duration_ms()));
        ui.set_view_zoom(view.zoom_level);
        ui.set_pan_x(view.pan_offset.x);
        ui.set_pan_y(view.pan_offset.y);
    }

    fn sync_recent(&self) {
        let Some(ui) = self.ui.upgrade() else {
            return;
        };
        let labels: Vec<SharedString> = self
            .config
            .snapshot()
            .recent_labels()
            .into_iter()
            .map(SharedString::from)
            .collect();
        ui.set_recent_files(ModelRc::new(VecModel::from(labels)));
    }

    fn refresh(&self) {
        let Some(ui) = self.ui.upgrade() else {
            return;
        };
        let session = self.session.borrow();
        let previews = self.previews.borrow();

        ui.set_processing(session.is_processing());
        ui.set_has_original(session.original().is_some());
        ui.set_has_result(previews.is_some());
        match previews.as_ref() {
            Some(previews) => {
                ui.set_original_image(previews.original.image.clone());
                ui.set_inverted_image(previews.inverted.image.clone());
            }
            None => {
                ui.set_original_image(slint::Image::default());
                ui.set_inverted_image(slint::Image::default());
            }
        }

        let name = session.source_name().unwrap_or_default();
        let (status, error) = match session.status() {
            SessionStatus::Empty => (IDLE_STATUS.to_string(), String::new()),
            SessionStatus::Processing => (format!("Inverting {name}…"), String::new()),
            SessionStatus::Ready => {
                let output = session.output_file_name().unwrap_or_default();
                (format!("{name} inverted, ready to save as {output}"), String::new())
            }
            SessionStatus::Failed(message) => (IDLE_STATUS.to_string(), message.to_string()),
        };
        ui.set_status_text(status.into());
        ui.set_error_text(error.into());
    }

    fn show_error(&self, message: &str, retry: Option<Retry>) {
        *self.retry.borrow_mut() = retry;
        if let Some(ui) = self.ui.upgrade() {
            ui.set_error_text(message.into());
        }
    }

    fn delivery_folder(&self) -> String {
        let settings = self.settings.borrow();
        download_for(&settings).dir().display().to_string()
    }
}

fn download_for(settings: &AppSettings) -> DownloadDelivery {
    match settings.get_last_save_dir() {
        Some(dir) => DownloadDelivery::new(dir),
        None => DownloadDelivery::to_default_folder(),
    }
}

fn build_delivery(settings: &AppSettings) -> Box<dyn DeliveryStrategy> {
    let strategy = select_delivery(detect_capabilities(), download_for(settings), None);
    debug!(kind = ?strategy.kind(), "delivery strategy selected");
    strategy
}

#[cfg(test)]
mod tests {
    use super::*;
    use session::{DeliveryError, DeliveryKind};

    fn frame() -> Rect {
        Rect {
            x: 100.0,
            y: 50.0,
            width: 200.0,
            height: 100.0,
        }
    }

    #[test]
    fn click_outside_frame_closes() {
        let p = Point::new(20.0, 20.0);
        assert!(is_backdrop_click(p, p, frame()));
    }

    #[test]
    fn click_on_image_does_not_close() {
        let p = Point::new(150.0, 100.0);
        assert!(!is_backdrop_click(p, p, frame()));
    }

    #[test]
    fn drag_ending_on_backdrop_does_not_close() {
        let press = Point::new(150.0, 100.0);
        let release = Point::new(20.0, 20.0);
        assert!(!is_backdrop_click(press, release, frame()));
    }

    fn open_viewer(width: f32, height: f32) -> Viewer<ViewerImage> {
        let mut viewer = Viewer::new(ZoomPolicy::default());
        let image = ViewerImage {
            image: slint::Image::default(),
            size: Size::new(width, height),
        };
        viewer.open(image, "Original Image");
        viewer
    }

    #[test]
    fn frame_follows_container_size() {
        let viewer = open_viewer(800.0, 400.0);

        let small = viewer_frame(&viewer, Size::new(1000.0, 700.0));
        assert_eq!((small.x, small.y), (100.0, 150.0));
        assert_eq!((small.width, small.height), (800.0, 400.0));

        let large = viewer_frame(&viewer, Size::new(1600.0, 900.0));
        assert_eq!((large.x, large.y), (400.0, 250.0));
        assert_eq!((large.width, large.height), (800.0, 400.0));

        // inside the image before the resize, backdrop after it
        let p = Point::new(150.0, 200.0);
        assert!(!is_backdrop_click(p, p, small));
        assert!(is_backdrop_click(p, p, large));
    }

    #[test]
    fn frame_shrinks_to_fit_small_windows() {
        let viewer = open_viewer(800.0, 400.0);
        let frame = viewer_frame(&viewer, Size::new(500.0, 400.0));
        assert!((frame.width - 450.0).abs() < 1e-3);
        assert!((frame.height - 225.0).abs() < 1e-3);
        assert!((frame.x - 25.0).abs() < 1e-3);
        assert!((frame.y - 87.5).abs() < 1e-3);
    }

    #[test]
    fn closed_viewer_has_empty_frame() {
        let viewer: Viewer<ViewerImage> = Viewer::new(ZoomPolicy::default());
        assert_eq!(viewer_frame(&viewer, Size::new(1000.0, 700.0)), Rect::default());
    }

    #[test]
    fn failed_save_retries_the_save() {
        let err = SessionError::Delivery(DeliveryError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only folder",
        )));
        let retry = Retry::after_save_error(&err, Some(Path::new("/pics/cat.png")));
        assert_eq!(retry, Some(Retry::Save));
    }

    #[test]
    fn save_without_result_retries_the_load() {
        let retry = Retry::after_save_error(&SessionError::NotReady, Some(Path::new("/pics/cat.png")));
        assert_eq!(retry, Some(Retry::Load(PathBuf::from("/pics/cat.png"))));
        assert_eq!(Retry::after_save_error(&SessionError::NotReady, None), None);
    }

    #[test]
    fn output_format_follows_settings() {
        let mut settings = AppSettings::default();
        assert_eq!(output_format(&settings), OutputFormat::Png);

        settings.output.format = OutputKind::Jpeg;
        settings.output.quality = 0.75;
        assert_eq!(output_format(&settings), OutputFormat::Jpeg { quality: 0.75 });
    }

    #[test]
    fn zoom_policy_uses_viewer_settings() {
        let mut settings = AppSettings::default();
        settings.viewer.max_zoom = 8.0;
        let policy = zoom_policy(&settings);
        assert_eq!(policy.max(), 8.0);
        assert_eq!(policy.step(), 1.5);
    }

    #[test]
    fn desktop_saves_to_chosen_folder() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = AppSettings::default();
        settings.set_last_save_dir(dir.path().to_path_buf());

        let strategy = build_delivery(&settings);
        if !cfg!(any(target_os = "android", target_os = "ios")) {
            assert_eq!(strategy.kind(), DeliveryKind::Download);
        }
        assert_eq!(download_for(&settings).dir(), dir.path());
    }
}
