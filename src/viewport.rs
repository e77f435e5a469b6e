//! Screen/world coordinate transform.
//!
//! `world = (screen - offset) / zoom_factor`, with `zoom_factor = zoom / 100`.
//! The zoom level is clamped into the configured bounds by every operation
//! that sets it; no operation rejects an out-of-range level.

use log::trace;

use crate::config::ViewportConfig;
use crate::geometry::{Point, Rect, Size};

#[derive(Debug, Clone, PartialEq)]
pub struct ViewportController {
    zoom: f32,
    offset: Point,
    config: ViewportConfig,
}

impl ViewportController {
    pub fn new(config: ViewportConfig) -> Self {
        let mut viewport = Self {
            zoom: 100.0,
            offset: Point::ORIGIN,
            config,
        };
        viewport.zoom_to(viewport.config.default_zoom);
        viewport
    }

    /// Zoom level in percent.
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn zoom_factor(&self) -> f32 {
        self.zoom / 100.0
    }

    pub fn offset(&self) -> Point {
        self.offset
    }

    pub fn presets(&self) -> &[f32] {
        &self.config.presets
    }

    fn clamp_zoom(&self, level: f32) -> f32 {
        if level.is_nan() {
            return self.config.default_zoom.clamp(self.config.min_zoom, self.config.max_zoom);
        }
        level.clamp(self.config.min_zoom, self.config.max_zoom)
    }

    pub fn zoom_to(&mut self, level: f32) {
        self.zoom = self.clamp_zoom(level);
        trace!(zoom = self.zoom; "Zoom set");
    }

    /// Steps to the next preset above the current level.
    pub fn zoom_in(&mut self) {
        let next = self
            .config
            .presets
            .iter()
            .copied()
            .find(|preset| *preset > self.zoom + f32::EPSILON)
            .unwrap_or(self.config.max_zoom);
        self.zoom_to(next);
    }

    /// Steps to the next preset below the current level.
    pub fn zoom_out(&mut self) {
        let next = self
            .config
            .presets
            .iter()
            .rev()
            .copied()
            .find(|preset| *preset < self.zoom - f32::EPSILON)
            .unwrap_or(self.config.min_zoom);
        self.zoom_to(next);
    }

    /// Zooms while keeping the world point under `anchor` (screen space) fixed.
    pub fn zoom_at(&mut self, level: f32, anchor: Point) {
        let world = self.screen_to_world(anchor);
        self.zoom_to(level);
        self.offset = anchor - world * self.zoom_factor();
    }

    pub fn pan(&mut self, delta: Point) {
        self.offset = self.offset + delta;
    }

    pub fn set_offset(&mut self, offset: Point) {
        self.offset = offset;
    }

    pub fn reset(&mut self) {
        self.offset = Point::ORIGIN;
        self.zoom_to(self.config.default_zoom);
    }

    pub fn screen_to_world(&self, screen: Point) -> Point {
        (screen - self.offset) / self.zoom_factor()
    }

    pub fn world_to_screen(&self, world: Point) -> Point {
        world * self.zoom_factor() + self.offset
    }

    /// Scales and centres `content` (world space) inside a canvas of
    /// `canvas` pixels, never zooming past 100% before padding.
    pub fn fit_to_content(&mut self, content: Rect, canvas: Size) {
        let ratio = |available: f32, used: f32| {
            if used > f32::EPSILON {
                available / used
            } else {
                f32::INFINITY
            }
        };
        let scale = ratio(canvas.width, content.size.width)
            .min(ratio(canvas.height, content.size.height))
            .min(1.0)
            * self.config.fit_padding;
        self.zoom_to(scale * 100.0);

        let canvas_center = Point::new(canvas.width / 2.0, canvas.height / 2.0);
        self.offset = canvas_center - content.center() * self.zoom_factor();
    }
}

impl Default for ViewportController {
    fn default() -> Self {
        Self::new(ViewportConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3
    }

    #[test]
    fn zoom_to_clamps_instead_of_rejecting() {
        let mut viewport = ViewportController::default();
        viewport.zoom_to(1000.0);
        assert_eq!(viewport.zoom(), 400.0);
        viewport.zoom_to(-3.0);
        assert_eq!(viewport.zoom(), 25.0);
        viewport.zoom_to(137.0);
        assert_eq!(viewport.zoom(), 137.0);
    }

    #[test]
    fn zoom_in_and_out_walk_presets() {
        let mut viewport = ViewportController::default();
        viewport.zoom_in();
        assert_eq!(viewport.zoom(), 125.0);
        viewport.zoom_to(130.0);
        viewport.zoom_out();
        assert_eq!(viewport.zoom(), 125.0);
        viewport.zoom_to(400.0);
        viewport.zoom_in();
        assert_eq!(viewport.zoom(), 400.0);
        viewport.zoom_to(25.0);
        viewport.zoom_out();
        assert_eq!(viewport.zoom(), 25.0);
    }

    #[test]
    fn transforms_are_inverse() {
        let mut viewport = ViewportController::default();
        viewport.zoom_to(200.0);
        viewport.pan(Point::new(30.0, -10.0));
        let world = viewport.screen_to_world(Point::new(130.0, 90.0));
        assert_eq!(world, Point::new(50.0, 50.0));
        assert_eq!(viewport.world_to_screen(world), Point::new(130.0, 90.0));
    }

    #[test]
    fn zoom_at_keeps_anchor_fixed() {
        let mut viewport = ViewportController::default();
        viewport.pan(Point::new(40.0, 25.0));
        let anchor = Point::new(300.0, 200.0);
        let before = viewport.screen_to_world(anchor);
        viewport.zoom_at(250.0, anchor);
        assert!(approx(viewport.screen_to_world(anchor), before));
    }

    #[test]
    fn fit_to_content_scales_and_centers() {
        let mut viewport = ViewportController::default();
        let content = Rect::new(Point::new(100.0, 100.0), Size::new(2000.0, 1000.0));
        viewport.fit_to_content(content, Size::new(1000.0, 800.0));
        // min(1000/2000, 800/1000, 1) * 0.9 = 0.45
        assert!((viewport.zoom() - 45.0).abs() < 1e-3);
        let center = viewport.world_to_screen(content.center());
        assert!(approx(center, Point::new(500.0, 400.0)));
    }

    #[test]
    fn fit_small_content_never_exceeds_padding_scale() {
        let mut viewport = ViewportController::default();
        let content = Rect::new(Point::ORIGIN, Size::new(10.0, 10.0));
        viewport.fit_to_content(content, Size::new(1000.0, 800.0));
        assert!((viewport.zoom() - 90.0).abs() < 1e-3);
    }

    #[test]
    fn fit_tiny_scale_is_clamped_to_minimum() {
        let mut viewport = ViewportController::default();
        let content = Rect::new(Point::ORIGIN, Size::new(100_000.0, 10.0));
        viewport.fit_to_content(content, Size::new(1000.0, 800.0));
        assert_eq!(viewport.zoom(), 25.0);
    }

    #[derive(Debug, Clone)]
    enum ZoomOp {
        In,
        Out,
        To(f32),
        At(f32),
    }

    fn zoom_op() -> impl Strategy<Value = ZoomOp> {
        prop_oneof![
            Just(ZoomOp::In),
            Just(ZoomOp::Out),
            (-1000.0f32..5000.0).prop_map(ZoomOp::To),
            (-1000.0f32..5000.0).prop_map(ZoomOp::At),
        ]
    }

    proptest! {
        #[test]
        fn zoom_always_within_bounds(ops in prop::collection::vec(zoom_op(), 0..40)) {
            let mut viewport = ViewportController::default();
            for op in ops {
                match op {
                    ZoomOp::In => viewport.zoom_in(),
                    ZoomOp::Out => viewport.zoom_out(),
                    ZoomOp::To(level) => viewport.zoom_to(level),
                    ZoomOp::At(level) => viewport.zoom_at(level, Point::new(10.0, 10.0)),
                }
                prop_assert!(viewport.zoom() >= 25.0 && viewport.zoom() <= 400.0);
            }
        }

        #[test]
        fn screen_world_roundtrip(
            zoom in 25.0f32..400.0,
            ox in -500.0f32..500.0,
            oy in -500.0f32..500.0,
            x in -1000.0f32..1000.0,
            y in -1000.0f32..1000.0,
        ) {
            let mut viewport = ViewportController::default();
            viewport.zoom_to(zoom);
            viewport.pan(Point::new(ox, oy));
            let p = Point::new(x, y);
            let back = viewport.world_to_screen(viewport.screen_to_world(p));
            prop_assert!((back.x - p.x).abs() < 1e-2 && (back.y - p.y).abs() < 1e-2);
        }
    }
}
