use crate::foundation::error::{StrataError, StrataResult};
use serde::{Deserialize, Serialize};

/// Tunables for a [`crate::Drawing`].
///
/// Every field has a default; JSON documents may set any subset.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DrawingOpts {
    /// Bytes of cached pixel data the whole tree may retain.
    pub cache_budget_bytes: usize,
    /// Minimum cache score (roughly: pixels saved per repaint) for an item to be cached
    /// automatically.
    pub cache_score_threshold: f64,
    /// Item opacity at or above `1 - item_opacity_epsilon` renders without an intermediate surface.
    pub item_opacity_epsilon: f32,
    /// Smallest pick tolerance granted to stroked shapes, in device pixels.
    pub pick_min_stroke_width: f64,
    /// Pattern tile rendering policy.
    pub pattern: PatternOpts,
    /// Intermediate surface reuse limits.
    pub pool: PoolOpts,
}

/// Pattern oversampling and opacity thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatternOpts {
    /// Fixed oversampling factor applied on top of the ambient expansion.
    pub oversampling: f64,
    /// Ceiling for the combined tile scale factor.
    pub max_scale: f64,
    /// Opacity below this renders nothing.
    pub invisible_epsilon: f32,
    /// Opacity closer than this to 1.0 skips the transparency group.
    pub opaque_epsilon: f32,
}

/// Limits for the offscreen surface pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolOpts {
    /// Maximum bytes retained across all buckets.
    pub max_pool_bytes: usize,
    /// Maximum number of retained pixmaps per (width, height) bucket.
    pub max_surfaces_per_bucket: usize,
}

impl Default for DrawingOpts {
    fn default() -> Self {
        Self {
            cache_budget_bytes: 64 * 1024 * 1024,
            cache_score_threshold: 50_000.0,
            item_opacity_epsilon: 0.005,
            pick_min_stroke_width: 0.125,
            pattern: PatternOpts::default(),
            pool: PoolOpts::default(),
        }
    }
}

impl Default for PatternOpts {
    fn default() -> Self {
        Self {
            oversampling: 2.0,
            max_scale: 25.0,
            invisible_epsilon: 1e-3,
            opaque_epsilon: 1e-3,
        }
    }
}

impl Default for PoolOpts {
    fn default() -> Self {
        Self {
            max_pool_bytes: 32 * 1024 * 1024,
            max_surfaces_per_bucket: 4,
        }
    }
}

impl DrawingOpts {
    pub fn from_json_str(s: &str) -> StrataResult<Self> {
        let opts: Self = serde_json::from_str(s)
            .map_err(|e| StrataError::config(format!("invalid drawing options: {e}")))?;
        opts.validate()?;
        Ok(opts)
    }

    pub fn validate(&self) -> StrataResult<()> {
        if !self.cache_score_threshold.is_finite() || self.cache_score_threshold <= 0.0 {
            return Err(StrataError::config(
                "cache_score_threshold must be finite and > 0",
            ));
        }
        if !(0.0..1.0).contains(&self.item_opacity_epsilon) {
            return Err(StrataError::config("item_opacity_epsilon must be in [0, 1)"));
        }
        if !self.pick_min_stroke_width.is_finite() || self.pick_min_stroke_width < 0.0 {
            return Err(StrataError::config(
                "pick_min_stroke_width must be finite and >= 0",
            ));
        }
        let p = &self.pattern;
        if !p.oversampling.is_finite() || p.oversampling <= 0.0 {
            return Err(StrataError::config(
                "pattern.oversampling must be finite and > 0",
            ));
        }
        if !p.max_scale.is_finite() || p.max_scale <= 0.0 {
            return Err(StrataError::config(
                "pattern.max_scale must be finite and > 0",
            ));
        }
        if !(0.0..1.0).contains(&p.invisible_epsilon) || !(0.0..1.0).contains(&p.opaque_epsilon) {
            return Err(StrataError::config(
                "pattern opacity epsilons must be in [0, 1)",
            ));
        }
        Ok(())
    }
}
