//! Pointer geometry: mapping local pointer positions onto the remote screen.
//!
//! # Absolute mode (for beginners)
//!
//! The remote screen is shown inside a local viewport (a window area).  When
//! the aspect ratio is preserved, the picture does not fill the viewport: bars
//! appear above/below it (letterbox) or left/right of it (pillarbox).
//!
//! ```text
//!  viewport 1000 x 1000, remote 1920 x 1080
//!  +--------------------+
//!  |      (bar)         |   y_diff = 1000 - 1000 * 1080/1920 = 437.5
//!  |====================|
//!  |   remote picture   |
//!  |====================|
//!  |      (bar)         |
//!  +--------------------+
//! ```
//!
//! A pointer at `(px, py)` maps to
//! `x = (px - x_diff/2 - vx) / (vw - x_diff)`, clamped to `[0, 1]`, and the
//! same for `y`.
//!
//! # Relative mode
//!
//! The local pointer is captured: each motion sample contributes the scaled
//! distance moved since the previous sample, and once the pointer strays too
//! far from a reference centre it is warped back there so it never reaches a
//! screen edge.

use serde::{Deserialize, Serialize};

/// Distance from the capture centre, in pixels on either axis, beyond which
/// the local pointer is warped back.
pub const RECENTER_THRESHOLD: f64 = 25.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Local area showing the remote screen, in local pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Centre of the viewport, used as the capture centre in relative mode.
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Pixel size of the remote screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Total width and height of the bars around the picture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Letterbox {
    pub x_diff: f64,
    pub y_diff: f64,
}

/// Computes the bars that appear when `target` is fitted into `viewport`
/// with its aspect ratio kept.
///
/// Returns no bars when either size is degenerate.
pub fn letterbox(viewport: &Viewport, target: Resolution) -> Letterbox {
    if target.is_degenerate() || viewport.width <= 0.0 || viewport.height <= 0.0 {
        return Letterbox::default();
    }
    let target_scale = f64::from(target.height) / f64::from(target.width);
    let viewport_scale = viewport.height / viewport.width;

    if viewport_scale > target_scale {
        Letterbox {
            x_diff: 0.0,
            y_diff: viewport.height - viewport.width * target_scale,
        }
    } else if viewport_scale < target_scale {
        Letterbox {
            x_diff: viewport.width - viewport.height / target_scale,
            y_diff: 0.0,
        }
    } else {
        Letterbox::default()
    }
}

/// Maps local pointer positions to normalized remote coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbsoluteMapper {
    pub target: Resolution,
    pub keep_aspect_ratio: bool,
    /// Pixel correction added to the viewport origin, if enabled.
    pub cursor_offset: Option<Point>,
}

impl AbsoluteMapper {
    pub fn new(target: Resolution, keep_aspect_ratio: bool) -> Self {
        Self {
            target,
            keep_aspect_ratio,
            cursor_offset: None,
        }
    }

    pub fn with_cursor_offset(mut self, offset: Point) -> Self {
        self.cursor_offset = Some(offset);
        self
    }

    /// Returns `(x, y)` in `[0, 1]` for a pointer at `pointer` inside
    /// `viewport`.  An axis whose content extent is zero or negative maps
    /// to `0`.
    pub fn normalize(&self, viewport: &Viewport, pointer: Point) -> (f64, f64) {
        let bars = if self.keep_aspect_ratio {
            letterbox(viewport, self.target)
        } else {
            Letterbox::default()
        };
        let (mut origin_x, mut origin_y) = (viewport.x, viewport.y);
        if let Some(offset) = self.cursor_offset {
            origin_x += offset.x;
            origin_y += offset.y;
        }
        let x = normalize_axis(pointer.x, origin_x, viewport.width, bars.x_diff);
        let y = normalize_axis(pointer.y, origin_y, viewport.height, bars.y_diff);
        (x, y)
    }
}

fn normalize_axis(p: f64, origin: f64, extent: f64, diff: f64) -> f64 {
    let content = extent - diff;
    if content <= 0.0 || !content.is_finite() {
        return 0.0;
    }
    let v = (p - diff / 2.0 - origin) / content;
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Result of one relative-mode motion sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelativeSample {
    /// Scaled motion to add to the pending delta.
    pub delta: (i32, i32),
    /// The local pointer should be warped to the capture centre.
    pub recenter: bool,
    /// This was the first sample after capture started; any stale delta
    /// should be discarded.
    pub seeded: bool,
}

/// Turns successive absolute pointer samples into relative motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeTracker {
    speed: f64,
    last: Option<Point>,
}

impl RelativeTracker {
    pub fn new(speed: f64) -> Self {
        Self { speed, last: None }
    }

    /// Forgets the previous sample so the next one seeds again.
    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn sample(&mut self, pointer: Point, center: Point) -> RelativeSample {
        let Some(last) = self.last else {
            self.last = Some(center);
            return RelativeSample {
                delta: (0, 0),
                recenter: true,
                seeded: true,
            };
        };

        let dx = ((pointer.x - last.x) * self.speed).round() as i32;
        let dy = ((pointer.y - last.y) * self.speed).round() as i32;

        let strayed = (pointer.x - center.x).abs() > RECENTER_THRESHOLD
            || (pointer.y - center.y).abs() > RECENTER_THRESHOLD;
        self.last = Some(if strayed { center } else { pointer });

        RelativeSample {
            delta: (dx, dy),
            recenter: strayed,
            seeded: false,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
