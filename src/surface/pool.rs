use crate::foundation::core::IntRect;
use crate::foundation::error::StrataResult;
use crate::foundation::opts::PoolOpts;
use crate::raster::{clear_pixmap_to_transparent, pixmap_dims};
use crate::surface::Surface;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BucketKey {
    w: u16,
    h: u16,
}

impl BucketKey {
    fn byte_len(self) -> usize {
        usize::from(self.w)
            .saturating_mul(usize::from(self.h))
            .saturating_mul(4)
    }
}

/// Counters describing pool behavior since creation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub retained_surfaces: usize,
    pub retained_bytes: usize,
    pub alloc_surfaces: u64,
    pub alloc_bytes: u64,
    pub reused_surfaces: u64,
    pub dropped_on_release: u64,
}

/// Bounded recycler for the offscreen pixmaps used by intermediate renders.
///
/// Keyed by pixel size. Borrow/release happen once per rendered item, never per pixel.
#[derive(Debug)]
pub(crate) struct SurfacePool {
    opts: PoolOpts,
    stats: PoolStats,
    buckets: HashMap<BucketKey, Vec<vello_cpu::Pixmap>>,
}

impl SurfacePool {
    pub(crate) fn new(opts: PoolOpts) -> Self {
        Self {
            opts,
            stats: PoolStats::default(),
            buckets: HashMap::new(),
        }
    }

    pub(crate) fn stats(&self) -> PoolStats {
        self.stats.clone()
    }

    /// A transparent surface covering `area` with `device_scale` pixels per unit.
    pub(crate) fn borrow(&mut self, area: IntRect, device_scale: u32) -> StrataResult<Surface> {
        let ds = device_scale.max(1);
        let (w, h) = pixmap_dims(
            area.width().saturating_mul(ds),
            area.height().saturating_mul(ds),
        )?;
        let key = BucketKey { w, h };
        if let Some(mut p) = self.buckets.get_mut(&key).and_then(Vec::pop) {
            self.stats.retained_surfaces = self.stats.retained_surfaces.saturating_sub(1);
            self.stats.retained_bytes = self.stats.retained_bytes.saturating_sub(key.byte_len());
            self.stats.reused_surfaces = self.stats.reused_surfaces.saturating_add(1);
            clear_pixmap_to_transparent(&mut p);
            return Ok(Surface::from_pooled(area, ds, p));
        }
        self.stats.alloc_surfaces = self.stats.alloc_surfaces.saturating_add(1);
        self.stats.alloc_bytes = self.stats.alloc_bytes.saturating_add(key.byte_len() as u64);
        Surface::with_device_scale(area, ds)
    }

    pub(crate) fn release(&mut self, surface: Surface) {
        let Some(pixmap) = surface.into_pixmap() else {
            return;
        };
        if self.opts.max_pool_bytes == 0 || self.opts.max_surfaces_per_bucket == 0 {
            self.stats.dropped_on_release = self.stats.dropped_on_release.saturating_add(1);
            return;
        }
        let key = BucketKey {
            w: pixmap.width(),
            h: pixmap.height(),
        };
        let bytes = key.byte_len();
        if self.stats.retained_bytes.saturating_add(bytes) > self.opts.max_pool_bytes {
            self.stats.dropped_on_release = self.stats.dropped_on_release.saturating_add(1);
            return;
        }
        let bucket = self.buckets.entry(key).or_default();
        if bucket.len() >= self.opts.max_surfaces_per_bucket {
            self.stats.dropped_on_release = self.stats.dropped_on_release.saturating_add(1);
            return;
        }
        bucket.push(pixmap);
        self.stats.retained_surfaces = self.stats.retained_surfaces.saturating_add(1);
        self.stats.retained_bytes = self.stats.retained_bytes.saturating_add(bytes);
    }
}
