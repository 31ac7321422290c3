//! Surface geometry tracking
//!
//! The window reports logical pixels; the swapchain, the module's draw
//! coordinates, and the `on_resize` dimensions are all in the physical
//! backing-store space derived from them. The backing dimension for a
//! logical extent uses the same rounding on every platform so a module
//! sees identical geometry for identical window metrics:
//!
//! ```text
//! backing = floor((logical - 1) * ratio) + 1
//! ```
//!
//! which is exact for integer ratios and never rounds a nonzero extent to
//! zero. [`SurfaceTracker`] only reports a new backing size when either the
//! logical size or the scale ratio actually changed, so the module's
//! `on_resize` fires once per change rather than once per event.

/// Compute the physical backing extent for one logical axis.
pub fn backing_extent(logical: f64, ratio: f64) -> u32 {
    if logical <= 0.0 {
        return 1;
    }
    ((logical - 1.0) * ratio).floor() as u32 + 1
}

/// Tracks the last-applied surface geometry and detects real changes.
#[derive(Debug, Default)]
pub struct SurfaceTracker {
    logical: Option<(f64, f64)>,
    ratio: f64,
}

impl SurfaceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current logical size and scale ratio.
    ///
    /// Returns the new physical backing size if it differs from the last
    /// applied geometry, `None` when nothing changed.
    pub fn update(&mut self, width: f64, height: f64, ratio: f64) -> Option<(u32, u32)> {
        if self.logical == Some((width, height)) && self.ratio == ratio {
            return None;
        }
        self.logical = Some((width, height));
        self.ratio = ratio;
        Some((backing_extent(width, ratio), backing_extent(height, ratio)))
    }

    /// Scale ratio of the last applied geometry.
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Last applied logical size, if any geometry has been applied yet.
    pub fn logical(&self) -> Option<(f64, f64)> {
        self.logical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backing_formula_integer_ratio() {
        assert_eq!(backing_extent(640.0, 1.0), 640);
        assert_eq!(backing_extent(640.0, 2.0), 1279);
        assert_eq!(backing_extent(1.0, 2.0), 1);
    }

    #[test]
    fn backing_formula_fractional_ratio() {
        // floor((800 - 1) * 1.5) + 1 = floor(1198.5) + 1
        assert_eq!(backing_extent(800.0, 1.5), 1199);
        // floor((3 - 1) * 1.25) + 1 = 2 + 1
        assert_eq!(backing_extent(3.0, 1.25), 3);
    }

    #[test]
    fn backing_never_zero() {
        assert_eq!(backing_extent(0.0, 2.0), 1);
        assert_eq!(backing_extent(1.0, 0.5), 1);
    }

    #[test]
    fn update_reports_only_real_changes() {
        let mut tracker = SurfaceTracker::new();
        assert_eq!(tracker.update(640.0, 480.0, 1.0), Some((640, 480)));
        // Same metrics again: no resize.
        assert_eq!(tracker.update(640.0, 480.0, 1.0), None);
        // Ratio change alone is a resize.
        assert_eq!(tracker.update(640.0, 480.0, 2.0), Some((1279, 959)));
        assert_eq!(tracker.update(640.0, 480.0, 2.0), None);
        // Size change alone is a resize.
        assert!(tracker.update(800.0, 480.0, 2.0).is_some());
    }
}
