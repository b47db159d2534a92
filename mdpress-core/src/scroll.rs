//! Synchronized scrolling between the editor and preview panes
//!
//! Positions are mirrored as a fraction of each pane's scrollable range, so
//! alignment is approximate when the panes have very different density.
//! Moving the target pane programmatically fires a scroll event of its own;
//! the guard window swallows it instead of syncing back onto the source.

use std::time::{Duration, Instant};

use log::debug;

/// Default length of the reentrancy guard
pub const DEFAULT_GUARD_WINDOW: Duration = Duration::from_millis(50);

/// A scrollable pane
pub trait ScrollPane {
    /// Current offset from the top
    fn scroll_position(&self) -> f64;
    /// Maximum offset (content height minus viewport height)
    fn scrollable_range(&self) -> f64;
    fn set_scroll_position(&mut self, position: f64);
}

/// Scroll synchronizer for one pair of panes
#[derive(Debug, Clone)]
pub struct ScrollSync {
    window: Duration,
    guard_until: Option<Instant>,
}

impl Default for ScrollSync {
    fn default() -> Self {
        Self::new(DEFAULT_GUARD_WINDOW)
    }
}

impl ScrollSync {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            guard_until: None,
        }
    }

    /// Whether scroll events are currently being ignored
    pub fn is_guarded(&self, now: Instant) -> bool {
        self.guard_until.is_some_and(|until| now < until)
    }

    /// Handle a scroll event on `source`. Returns true if `target` was moved.
    pub fn on_scroll(&mut self, source: &dyn ScrollPane, target: &mut dyn ScrollPane) -> bool {
        self.on_scroll_at(Instant::now(), source, target)
    }

    /// [`on_scroll`](Self::on_scroll) with an explicit clock
    pub fn on_scroll_at(
        &mut self,
        now: Instant,
        source: &dyn ScrollPane,
        target: &mut dyn ScrollPane,
    ) -> bool {
        if self.is_guarded(now) {
            return false;
        }
        self.guard_until = Some(now + self.window);

        let fraction = scroll_fraction(source.scroll_position(), source.scrollable_range());
        let position = fraction * target.scrollable_range().max(0.0);
        debug!("scroll: syncing at {:.3} -> {position:.1}", fraction);
        target.set_scroll_position(position);
        true
    }
}

/// `position / range` clamped to `[0, 1]`; 0 for an empty range or any
/// non-finite result.
pub fn scroll_fraction(position: f64, range: f64) -> f64 {
    if range <= 0.0 {
        return 0.0;
    }
    let fraction = position / range;
    if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// A pane described by plain numbers
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PaneMetrics {
    pub position: f64,
    pub range: f64,
}

impl PaneMetrics {
    pub fn new(position: f64, range: f64) -> Self {
        Self { position, range }
    }
}

impl ScrollPane for PaneMetrics {
    fn scroll_position(&self) -> f64 {
        self.position
    }

    fn scrollable_range(&self) -> f64 {
        self.range
    }

    fn set_scroll_position(&mut self, position: f64) {
        self.position = position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_maps_to_half() {
        let mut sync = ScrollSync::default();
        let source = PaneMetrics::new(200.0, 400.0);
        let mut target = PaneMetrics::new(0.0, 1000.0);

        assert!(sync.on_scroll_at(Instant::now(), &source, &mut target));
        assert_eq!(target.position, 500.0);
    }

    #[test]
    fn test_second_event_inside_window_is_ignored() {
        let mut sync = ScrollSync::new(Duration::from_millis(50));
        let t0 = Instant::now();
        let mut editor = PaneMetrics::new(100.0, 400.0);
        let mut preview = PaneMetrics::new(0.0, 800.0);

        assert!(sync.on_scroll_at(t0, &editor, &mut preview));
        assert_eq!(preview.position, 200.0);

        // The programmatic move of the preview echoes back as a scroll event
        preview.position = 600.0;
        let echo = t0 + Duration::from_millis(10);
        assert!(!sync.on_scroll_at(echo, &preview, &mut editor));
        assert_eq!(editor.position, 100.0);
    }

    #[test]
    fn test_guard_expires() {
        let mut sync = ScrollSync::new(Duration::from_millis(50));
        let t0 = Instant::now();
        let source = PaneMetrics::new(300.0, 300.0);
        let mut target = PaneMetrics::new(0.0, 90.0);

        assert!(sync.on_scroll_at(t0, &source, &mut target));
        assert!(sync.is_guarded(t0 + Duration::from_millis(49)));
        assert!(!sync.is_guarded(t0 + Duration::from_millis(50)));

        target.position = 0.0;
        assert!(sync.on_scroll_at(t0 + Duration::from_millis(60), &source, &mut target));
        assert_eq!(target.position, 90.0);
    }

    #[test]
    fn test_zero_range_source_scrolls_target_to_top() {
        let mut sync = ScrollSync::default();
        let source = PaneMetrics::new(0.0, 0.0);
        let mut target = PaneMetrics::new(250.0, 500.0);

        assert!(sync.on_scroll_at(Instant::now(), &source, &mut target));
        assert_eq!(target.position, 0.0);
    }

    #[test]
    fn test_scroll_fraction_guards() {
        assert_eq!(scroll_fraction(10.0, 0.0), 0.0);
        assert_eq!(scroll_fraction(f64::NAN, 100.0), 0.0);
        assert_eq!(scroll_fraction(10.0, f64::INFINITY), 0.0);
        assert_eq!(scroll_fraction(150.0, 100.0), 1.0);
        assert_eq!(scroll_fraction(-5.0, 100.0), 0.0);
        assert_eq!(scroll_fraction(25.0, 100.0), 0.25);
    }

    #[test]
    fn test_independent_instances() {
        let t0 = Instant::now();
        let mut first = ScrollSync::default();
        let mut second = ScrollSync::default();
        let source = PaneMetrics::new(50.0, 100.0);
        let mut a = PaneMetrics::new(0.0, 10.0);
        let mut b = PaneMetrics::new(0.0, 10.0);

        assert!(first.on_scroll_at(t0, &source, &mut a));
        assert!(second.on_scroll_at(t0, &source, &mut b));
        assert_eq!(a.position, 5.0);
        assert_eq!(b.position, 5.0);
    }
}
