//! Zoom and pan state for the modal image viewer.

pub mod input;
pub mod policy;
pub mod scroll_lock;
pub mod transform;

use core_types::Point;
use std::rc::Rc;
use tracing::debug;

pub use input::{EventDisposition, InputEvent};
pub use policy::ZoomPolicy;
pub use scroll_lock::{NoScrollLock, ScrollLock, ScrollLockGuard};
pub use transform::{Rect, Size, ViewTransform};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub zoom_level: f32,
    pub pan_offset: Point,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            zoom_level: 1.0,
            pan_offset: Point::ORIGIN,
        }
    }
}

impl ViewState {
    /// Clamp and apply a zoom level, dropping the pan once the image fits.
    fn set_zoom(&mut self, zoom: f32, policy: &ZoomPolicy) {
        if !zoom.is_finite() {
            return;
        }
        self.zoom_level = policy.clamp(zoom);
        if self.zoom_level <= 1.0 {
            self.pan_offset = Point::ORIGIN;
        }
    }

    fn can_pan(&self) -> bool {
        self.zoom_level > 1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureState {
    pub is_dragging: bool,
    /// Pointer position minus pan offset at drag start.
    pub drag_anchor: Point,
    pub initial_pinch_distance: f32,
    pub initial_zoom_level: f32,
}

impl Default for GestureState {
    fn default() -> Self {
        Self {
            is_dragging: false,
            drag_anchor: Point::ORIGIN,
            initial_pinch_distance: 0.0,
            initial_zoom_level: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerSession<I> {
    pub image: I,
    pub title: String,
}

#[derive(Debug)]
struct OpenViewer<I> {
    session: ViewerSession<I>,
    view: ViewState,
    gesture: GestureState,
    _scroll_lock: ScrollLockGuard,
}

#[derive(Debug)]
enum ViewerState<I> {
    Closed,
    Open(OpenViewer<I>),
}

/// Modal viewer: `Closed` until [`Viewer::open`], then tracks zoom, pan and
/// gestures until [`Viewer::close`].
///
/// Every operation is total. Calls that make no sense in the current state
/// are ignored.
pub struct Viewer<I> {
    state: ViewerState<I>,
    policy: ZoomPolicy,
    scroll_lock: Rc<dyn ScrollLock>,
}

impl<I> Viewer<I> {
    pub fn new(policy: ZoomPolicy) -> Self {
        Self::with_scroll_lock(policy, Rc::new(NoScrollLock))
    }

    pub fn with_scroll_lock(policy: ZoomPolicy, scroll_lock: Rc<dyn ScrollLock>) -> Self {
        Self {
            state: ViewerState::Closed,
            policy,
            scroll_lock,
        }
    }

    pub fn policy(&self) -> &ZoomPolicy {
        &self.policy
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ViewerState::Open(_))
    }

    /// Show `image`. Returns `false` and changes nothing if already open.
    pub fn open(&mut self, image: I, title: impl Into<String>) -> bool {
        if self.is_open() {
            debug!("viewer already open, ignoring open request");
            return false;
        }
        let title = title.into();
        debug!(%title, "opening viewer");
        self.state = ViewerState::Open(OpenViewer {
            session: ViewerSession { image, title },
            view: ViewState::default(),
            gesture: GestureState::default(),
            _scroll_lock: ScrollLockGuard::acquire(self.scroll_lock.clone()),
        });
        true
    }

    /// Dismiss the viewer, dropping all view state and the scroll lock.
    pub fn close(&mut self) -> Option<ViewerSession<I>> {
        match std::mem::replace(&mut self.state, ViewerState::Closed) {
            ViewerState::Open(open) => {
                debug!(title = %open.session.title, "closing viewer");
                Some(open.session)
            }
            ViewerState::Closed => None,
        }
    }

    pub fn session(&self) -> Option<&ViewerSession<I>> {
        self.open_ref().map(|open| &open.session)
    }

    pub fn title(&self) -> Option<&str> {
        self.session().map(|s| s.title.as_str())
    }

    pub fn image(&self) -> Option<&I> {
        self.session().map(|s| &s.image)
    }

    /// Current view, or the initial view while closed.
    pub fn view(&self) -> ViewState {
        self.open_ref().map(|open| open.view).unwrap_or_default()
    }

    pub fn gesture(&self) -> GestureState {
        self.open_ref().map(|open| open.gesture).unwrap_or_default()
    }

    pub fn zoom_level(&self) -> f32 {
        self.view().zoom_level
    }

    pub fn pan_offset(&self) -> Point {
        self.view().pan_offset
    }

    pub fn is_dragging(&self) -> bool {
        self.gesture().is_dragging
    }

    pub fn zoom_percent(&self) -> u32 {
        (self.zoom_level() * 100.0).round() as u32
    }

    pub fn can_zoom_in(&self) -> bool {
        self.zoom_level() < self.policy.max()
    }

    pub fn can_zoom_out(&self) -> bool {
        self.zoom_level() > self.policy.min()
    }

    pub fn transform(&self) -> ViewTransform {
        let view = self.view();
        ViewTransform::new(
            view.zoom_level,
            view.pan_offset,
            self.is_dragging(),
            self.policy.transition_ms(),
        )
    }

    pub fn zoom_in(&mut self) {
        let policy = self.policy;
        if let Some(open) = self.open_mut() {
            let target = open.view.zoom_level * policy.step();
            open.view.set_zoom(target, &policy);
        }
    }

    /// Zoom out one step. The pan reset looks at the zoom level after the step.
    pub fn zoom_out(&mut self) {
        let policy = self.policy;
        if let Some(open) = self.open_mut() {
            let target = open.view.zoom_level / policy.step();
            open.view.set_zoom(target, &policy);
        }
    }

    pub fn reset_view(&mut self) {
        if let Some(open) = self.open_mut() {
            open.view = ViewState::default();
        }
    }

    pub fn begin_drag(&mut self, pointer: Point) {
        if let Some(open) = self.open_mut() {
            if !open.view.can_pan() || !is_finite(pointer) {
                return;
            }
            open.gesture.is_dragging = true;
            open.gesture.drag_anchor = pointer - open.view.pan_offset;
        }
    }

    pub fn update_drag(&mut self, pointer: Point) {
        if let Some(open) = self.open_mut() {
            if !open.gesture.is_dragging || !open.view.can_pan() || !is_finite(pointer) {
                return;
            }
            open.view.pan_offset = pointer - open.gesture.drag_anchor;
        }
    }

    pub fn end_drag(&mut self) {
        if let Some(open) = self.open_mut() {
            open.gesture.is_dragging = false;
        }
    }

    pub fn begin_pinch(&mut self, a: Point, b: Point) {
        if let Some(open) = self.open_mut() {
            let distance = a.distance_to(b);
            open.gesture.is_dragging = false;
            open.gesture.initial_pinch_distance = if distance.is_finite() { distance } else { 0.0 };
            open.gesture.initial_zoom_level = open.view.zoom_level;
        }
    }

    pub fn update_pinch(&mut self, a: Point, b: Point) {
        let policy = self.policy;
        if let Some(open) = self.open_mut() {
            let initial = open.gesture.initial_pinch_distance;
            if initial <= 0.0 {
                return;
            }
            let scale = a.distance_to(b) / initial;
            open.view.set_zoom(open.gesture.initial_zoom_level * scale, &policy);
        }
    }

    pub fn end_gesture(&mut self) {
        if let Some(open) = self.open_mut() {
            open.gesture = GestureState::default();
        }
    }

    /// Route a raw host event to the matching transition.
    pub fn handle_input(&mut self, event: InputEvent<'_>) -> EventDisposition {
        if !self.is_open() {
            return EventDisposition::Propagate;
        }
        match event {
            InputEvent::PointerDown(p) => {
                self.begin_drag(p);
                EventDisposition::Propagate
            }
            InputEvent::PointerMove(p) => {
                self.update_drag(p);
                EventDisposition::Propagate
            }
            InputEvent::PointerUp => {
                self.end_drag();
                EventDisposition::Propagate
            }
            InputEvent::TouchStart(touches) => match touches {
                [single] => {
                    self.begin_drag(*single);
                    EventDisposition::Propagate
                }
                [a, b] => {
                    self.begin_pinch(*a, *b);
                    EventDisposition::Consume
                }
                _ => EventDisposition::Propagate,
            },
            InputEvent::TouchMove(touches) => match touches {
                [single] if self.is_dragging() && self.view().can_pan() => {
                    self.update_drag(*single);
                    EventDisposition::Consume
                }
                [a, b] => {
                    self.update_pinch(*a, *b);
                    EventDisposition::Consume
                }
                _ => EventDisposition::Propagate,
            },
            InputEvent::TouchEnd => {
                self.end_gesture();
                EventDisposition::Propagate
            }
            InputEvent::Wheel { delta_y } => {
                if delta_y < 0.0 {
                    self.zoom_in();
                } else if delta_y > 0.0 {
                    self.zoom_out();
                }
                EventDisposition::Consume
            }
        }
    }

    fn open_ref(&self) -> Option<&OpenViewer<I>> {
        match &self.state {
            ViewerState::Open(open) => Some(open),
            ViewerState::Closed => None,
        }
    }

    fn open_mut(&mut self) -> Option<&mut OpenViewer<I>> {
        match &mut self.state {
            ViewerState::Open(open) => Some(open),
            ViewerState::Closed => None,
        }
    }
}

impl<I> Default for Viewer<I> {
    fn default() -> Self {
        Self::new(ZoomPolicy::default())
    }
}

fn is_finite(p: Point) -> bool {
    p.x.is_finite() && p.y.is_finite()
}

#[cfg(test)]
mod tests {
    use super::scroll_lock::testing::RecordingLock;
    use super::*;

    fn open_viewer() -> Viewer<&'static str> {
        let mut viewer = Viewer::default();
        assert!(viewer.open("inverted", "Inverted"));
        viewer
    }

    fn assert_pan_invariant(viewer: &Viewer<&'static str>) {
        let view = viewer.view();
        assert!(view.zoom_level >= 0.5 && view.zoom_level <= 5.0, "zoom {}", view.zoom_level);
        if view.zoom_level <= 1.0 {
            assert_eq!(view.pan_offset, Point::ORIGIN);
        }
    }

    #[test]
    fn open_starts_at_identity() {
        let viewer = open_viewer();
        assert!(viewer.is_open());
        assert_eq!(viewer.title(), Some("Inverted"));
        assert_eq!(viewer.image(), Some(&"inverted"));
        assert_eq!(viewer.view(), ViewState::default());
        assert_eq!(viewer.gesture(), GestureState::default());
    }

    #[test]
    fn open_is_ignored_while_open() {
        let mut viewer = open_viewer();
        viewer.zoom_in();
        assert!(!viewer.open("original", "Original"));
        assert_eq!(viewer.title(), Some("Inverted"));
        assert_eq!(viewer.zoom_level(), 1.5);
    }

    #[test]
    fn close_discards_state_and_reopen_resets() {
        let mut viewer = open_viewer();
        viewer.zoom_in();
        viewer.zoom_in();
        viewer.begin_drag(Point::new(10.0, 10.0));
        viewer.update_drag(Point::new(50.0, 30.0));

        let session = viewer.close().unwrap();
        assert_eq!(session.title, "Inverted");
        assert!(!viewer.is_open());
        assert_eq!(viewer.view(), ViewState::default());
        assert!(viewer.close().is_none());

        assert!(viewer.open("original", "Original"));
        assert_eq!(viewer.zoom_level(), 1.0);
        assert_eq!(viewer.pan_offset(), Point::ORIGIN);
        assert!(!viewer.is_dragging());
    }

    #[test]
    fn three_zoom_ins_from_one() {
        let mut viewer = open_viewer();
        for _ in 0..3 {
            viewer.zoom_in();
        }
        assert_eq!(viewer.zoom_level(), 3.375);
        assert_eq!(viewer.zoom_percent(), 338);
    }

    #[test]
    fn zoom_in_clamps_at_max() {
        let mut viewer = open_viewer();
        for _ in 0..10 {
            viewer.zoom_in();
        }
        assert_eq!(viewer.zoom_level(), 5.0);
        assert!(!viewer.can_zoom_in());
        assert!(viewer.can_zoom_out());
    }

    #[test]
    fn zoom_out_bottoms_out_at_min() {
        let mut viewer = open_viewer();
        viewer.zoom_in();
        viewer.zoom_in();
        viewer.begin_drag(Point::new(0.0, 0.0));
        viewer.update_drag(Point::new(25.0, 25.0));
        viewer.end_drag();

        viewer.zoom_in();
        viewer.zoom_out();
        viewer.zoom_out();
        viewer.zoom_out();
        assert_pan_invariant(&viewer);

        for _ in 0..10 {
            viewer.zoom_out();
            assert!(viewer.zoom_level() >= 0.5);
        }
        assert_eq!(viewer.zoom_level(), 0.5);
        assert!(!viewer.can_zoom_out());
    }

    #[test]
    fn zoom_out_from_three_stops_at_half() {
        let mut viewer = open_viewer();
        viewer.begin_pinch(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        viewer.update_pinch(Point::new(0.0, 0.0), Point::new(300.0, 0.0));
        viewer.end_gesture();
        assert_eq!(viewer.zoom_level(), 3.0);

        while viewer.zoom_level() > 0.5 {
            viewer.zoom_out();
        }
        viewer.zoom_out();
        assert_eq!(viewer.zoom_level(), 0.5);
    }

    #[test]
    fn zoom_out_resets_pan_once_result_fits() {
        let mut viewer = open_viewer();
        viewer.zoom_in();
        viewer.begin_drag(Point::new(100.0, 100.0));
        viewer.update_drag(Point::new(120.0, 90.0));
        viewer.end_drag();
        assert_eq!(viewer.pan_offset(), Point::new(20.0, -10.0));

        // 1.5 -> 1.0: the step that reaches 1.0 already clears the pan
        viewer.zoom_out();
        assert_eq!(viewer.zoom_level(), 1.0);
        assert_eq!(viewer.pan_offset(), Point::ORIGIN);
    }

    #[test]
    fn reset_view_restores_identity() {
        let mut viewer = open_viewer();
        viewer.zoom_in();
        viewer.zoom_in();
        viewer.begin_drag(Point::new(5.0, 5.0));
        viewer.update_drag(Point::new(55.0, 5.0));
        viewer.reset_view();
        assert_eq!(viewer.view(), ViewState::default());
    }

    #[test]
    fn drag_requires_zoom_above_one() {
        let mut viewer = open_viewer();
        viewer.begin_drag(Point::new(10.0, 10.0));
        assert!(!viewer.is_dragging());
        viewer.update_drag(Point::new(90.0, 90.0));
        assert_eq!(viewer.pan_offset(), Point::ORIGIN);
    }

    #[test]
    fn drag_keeps_anchor_under_pointer() {
        let mut viewer = open_viewer();
        viewer.zoom_in();
        viewer.begin_drag(Point::new(10.0, 10.0));
        viewer.update_drag(Point::new(40.0, 20.0));
        viewer.end_drag();
        assert_eq!(viewer.pan_offset(), Point::new(30.0, 10.0));

        // second drag continues from the existing offset
        viewer.begin_drag(Point::new(200.0, 200.0));
        assert_eq!(viewer.gesture().drag_anchor, Point::new(170.0, 190.0));
        viewer.update_drag(Point::new(210.0, 190.0));
        assert_eq!(viewer.pan_offset(), Point::new(40.0, 0.0));
        assert!(!viewer.transform().animated);

        viewer.end_drag();
        viewer.end_drag();
        assert!(!viewer.is_dragging());
        assert!(viewer.transform().animated);

        viewer.update_drag(Point::new(0.0, 0.0));
        assert_eq!(viewer.pan_offset(), Point::new(40.0, 0.0));
    }

    #[test]
    fn pinch_to_half_distance_resets_pan() {
        let mut viewer = open_viewer();
        viewer.begin_pinch(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        viewer.update_pinch(Point::new(0.0, 0.0), Point::new(200.0, 0.0));
        viewer.end_gesture();
        assert_eq!(viewer.zoom_level(), 2.0);

        viewer.begin_drag(Point::new(0.0, 0.0));
        viewer.update_drag(Point::new(15.0, 15.0));
        viewer.end_drag();
        assert_eq!(viewer.pan_offset(), Point::new(15.0, 15.0));

        viewer.begin_pinch(Point::new(0.0, 0.0), Point::new(0.0, 100.0));
        assert_eq!(viewer.gesture().initial_zoom_level, 2.0);
        assert_eq!(viewer.gesture().initial_pinch_distance, 100.0);
        viewer.update_pinch(Point::new(0.0, 0.0), Point::new(0.0, 50.0));
        assert_eq!(viewer.zoom_level(), 1.0);
        assert_eq!(viewer.pan_offset(), Point::ORIGIN);

        viewer.end_gesture();
        assert_eq!(viewer.gesture(), GestureState::default());
    }

    #[test]
    fn pinch_clamps_and_cancels_drag() {
        let mut viewer = open_viewer();
        viewer.zoom_in();
        viewer.begin_drag(Point::new(1.0, 1.0));
        assert!(viewer.is_dragging());

        viewer.begin_pinch(Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        assert!(!viewer.is_dragging());
        viewer.update_pinch(Point::new(0.0, 0.0), Point::new(1000.0, 0.0));
        assert_eq!(viewer.zoom_level(), 5.0);
        viewer.update_pinch(Point::new(0.0, 0.0), Point::new(0.1, 0.0));
        assert_eq!(viewer.zoom_level(), 0.5);
    }

    #[test]
    fn pinch_without_start_distance_is_ignored() {
        let mut viewer = open_viewer();
        viewer.begin_pinch(Point::new(5.0, 5.0), Point::new(5.0, 5.0));
        viewer.update_pinch(Point::new(0.0, 0.0), Point::new(300.0, 0.0));
        assert_eq!(viewer.zoom_level(), 1.0);
    }

    #[test]
    fn closed_viewer_ignores_everything() {
        let mut viewer: Viewer<&str> = Viewer::default();
        viewer.zoom_in();
        viewer.begin_pinch(Point::ORIGIN, Point::new(1.0, 0.0));
        viewer.update_pinch(Point::ORIGIN, Point::new(4.0, 0.0));
        assert_eq!(viewer.zoom_level(), 1.0);
        assert_eq!(
            viewer.handle_input(InputEvent::Wheel { delta_y: -1.0 }),
            EventDisposition::Propagate
        );
    }

    #[test]
    fn input_routing_matches_gestures() {
        let mut viewer = open_viewer();

        assert!(viewer.handle_input(InputEvent::Wheel { delta_y: -120.0 }).is_consumed());
        assert_eq!(viewer.zoom_level(), 1.5);
        viewer.handle_input(InputEvent::Wheel { delta_y: 0.0 });
        assert_eq!(viewer.zoom_level(), 1.5);

        let one = [Point::new(10.0, 10.0)];
        assert_eq!(viewer.handle_input(InputEvent::TouchStart(&one)), EventDisposition::Propagate);
        assert!(viewer.is_dragging());

        let moved = [Point::new(30.0, 40.0)];
        assert!(viewer.handle_input(InputEvent::TouchMove(&moved)).is_consumed());
        assert_eq!(viewer.pan_offset(), Point::new(20.0, 30.0));

        let two = [Point::new(0.0, 0.0), Point::new(0.0, 100.0)];
        assert!(viewer.handle_input(InputEvent::TouchStart(&two)).is_consumed());
        assert!(!viewer.is_dragging());

        // single-finger motion does not pan during a pinch
        assert_eq!(viewer.handle_input(InputEvent::TouchMove(&moved)), EventDisposition::Propagate);
        assert_eq!(viewer.pan_offset(), Point::new(20.0, 30.0));

        let spread = [Point::new(0.0, 0.0), Point::new(0.0, 200.0)];
        viewer.handle_input(InputEvent::TouchMove(&spread));
        assert_eq!(viewer.zoom_level(), 3.0);

        viewer.handle_input(InputEvent::TouchEnd);
        assert_eq!(viewer.gesture(), GestureState::default());

        viewer.handle_input(InputEvent::PointerDown(Point::new(0.0, 0.0)));
        viewer.handle_input(InputEvent::PointerMove(Point::new(-5.0, 5.0)));
        viewer.handle_input(InputEvent::PointerUp);
        assert_eq!(viewer.pan_offset(), Point::new(15.0, 35.0));
        assert!(!viewer.is_dragging());

        assert!(viewer.handle_input(InputEvent::Wheel { delta_y: 3.0 }).is_consumed());
        assert_eq!(viewer.zoom_level(), 2.0);
    }

    #[test]
    fn scroll_lock_follows_open_state() {
        let lock = Rc::new(RecordingLock::default());
        let mut viewer: Viewer<u8> = Viewer::with_scroll_lock(ZoomPolicy::default(), lock.clone());
        assert!(!lock.is_locked());

        viewer.open(1, "one");
        assert!(lock.is_locked());
        viewer.open(2, "two");
        assert_eq!(lock.locks.get(), 1);

        viewer.close();
        assert!(!lock.is_locked());

        viewer.open(3, "three");
        drop(viewer);
        assert!(!lock.is_locked());
        assert_eq!(lock.locks.get(), 2);
        assert_eq!(lock.unlocks.get(), 2);
    }

    #[test]
    fn random_sequences_keep_invariants() {
        let mut viewer = open_viewer();
        let mut seed: u32 = 0x1234_5678;
        let mut next = || {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            seed >> 8
        };

        for _ in 0..2000 {
            let a = Point::new((next() % 400) as f32, (next() % 400) as f32);
            let b = Point::new((next() % 400) as f32, (next() % 400) as f32);
            match next() % 10 {
                0 => viewer.zoom_in(),
                1 => viewer.zoom_out(),
                2 => viewer.begin_drag(a),
                3 => viewer.update_drag(a),
                4 => viewer.end_drag(),
                5 => viewer.begin_pinch(a, b),
                6 => viewer.update_pinch(a, b),
                7 => viewer.end_gesture(),
                8 => {
                    viewer.handle_input(InputEvent::TouchMove(&[a, b]));
                }
                _ => {
                    viewer.handle_input(InputEvent::Wheel {
                        delta_y: (next() % 3) as f32 - 1.0,
                    });
                }
            }
            assert_pan_invariant(&viewer);
        }

        viewer.reset_view();
        assert_eq!(viewer.view(), ViewState::default());
    }
}
