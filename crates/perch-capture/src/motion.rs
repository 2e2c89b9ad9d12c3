//! Motion detection
//!
//! Scores each frame against a rolling grayscale reference held at a
//! downsampled detection resolution. The score is the changed fraction of
//! the detection grid; the largest connected changed region is reported for
//! downstream annotation, after an aspect-ratio gate that discards
//! implausibly thin or wide regions (shadows, drifting clouds).

use tracing::{debug, trace};

use perch_core::{BoundingBox, DetectorConfig, Frame, MotionEvent, ReferenceStrategy};

pub struct MotionDetector {
    config: DetectorConfig,
    /// Rolling reference luma, one value per detection-grid cell.
    reference: Option<Vec<f32>>,
    grid_w: u32,
    grid_h: u32,
}

impl MotionDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            reference: None,
            grid_w: 0,
            grid_h: 0,
        }
    }

    /// Score `frame` against the rolling reference.
    ///
    /// The first frame only seeds the reference and never emits. The
    /// reference is updated on every call — fired or not — so the detector
    /// tracks slow lighting changes, while a sudden scene change still
    /// registers as motion.
    pub fn observe(&mut self, frame: &Frame) -> Option<MotionEvent> {
        let ds = self.config.downsample.max(1);
        let grid_w = (frame.resolution.width / ds).max(1);
        let grid_h = (frame.resolution.height / ds).max(1);
        let luma = downsample_luma(frame, ds, grid_w, grid_h);

        let needs_seed = match self.reference {
            None => true,
            // Resolution changed under us (camera reopened): start over.
            Some(_) => grid_w != self.grid_w || grid_h != self.grid_h,
        };
        if needs_seed {
            self.grid_w = grid_w;
            self.grid_h = grid_h;
            self.reference = Some(luma.iter().map(|&v| v as f32).collect());
            return None;
        }
        let reference = self.reference.as_mut().expect("seeded above");

        let threshold = self.config.delta_threshold as f32;
        let mut mask = vec![false; luma.len()];
        let mut changed = 0usize;
        for (i, &v) in luma.iter().enumerate() {
            if (v as f32 - reference[i]).abs() > threshold {
                mask[i] = true;
                changed += 1;
            }
        }

        match self.config.strategy {
            ReferenceStrategy::FrameDiff => {
                for (r, &v) in reference.iter_mut().zip(luma.iter()) {
                    *r = v as f32;
                }
            }
            ReferenceStrategy::Background { alpha } => {
                for (r, &v) in reference.iter_mut().zip(luma.iter()) {
                    *r += alpha * (v as f32 - *r);
                }
            }
        }

        let score = changed as f32 / luma.len() as f32;
        trace!(score, changed, "motion score");
        if score < self.config.sensitivity {
            return None;
        }

        let region = largest_region(&mask, grid_w, grid_h).map(|r| scale_region(r, ds));
        if let Some(region) = &region {
            let aspect = region.aspect_ratio();
            if aspect < self.config.min_aspect || aspect > self.config.max_aspect {
                debug!(score, aspect, "motion discarded by shape gate");
                return None;
            }
        }

        debug!(score, ?region, "motion detected");
        Some(MotionEvent {
            at: frame.captured_at,
            score,
            region,
        })
    }
}

/// Sample the frame's luma onto the detection grid (nearest pixel).
fn downsample_luma(frame: &Frame, ds: u32, grid_w: u32, grid_h: u32) -> Vec<u8> {
    let mut luma = Vec::with_capacity((grid_w * grid_h) as usize);
    for gy in 0..grid_h {
        for gx in 0..grid_w {
            luma.push(frame.luma(gx * ds, gy * ds));
        }
    }
    luma
}

/// Bounding box of the largest 4-connected changed component, in grid
/// coordinates. Largest by cell count, not box area.
fn largest_region(mask: &[bool], width: u32, height: u32) -> Option<BoundingBox> {
    let w = width as usize;
    let h = height as usize;
    let mut visited = vec![false; mask.len()];
    let mut best: Option<(usize, BoundingBox)> = None;
    let mut stack = Vec::new();

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }
        let mut cells = 0usize;
        let (mut min_x, mut min_y) = (w, h);
        let (mut max_x, mut max_y) = (0usize, 0usize);
        visited[start] = true;
        stack.push(start);
        while let Some(idx) = stack.pop() {
            cells += 1;
            let (x, y) = (idx % w, idx / w);
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
            let mut push = |nidx: usize| {
                if mask[nidx] && !visited[nidx] {
                    visited[nidx] = true;
                    stack.push(nidx);
                }
            };
            if x > 0 {
                push(idx - 1);
            }
            if x + 1 < w {
                push(idx + 1);
            }
            if y > 0 {
                push(idx - w);
            }
            if y + 1 < h {
                push(idx + w);
            }
        }
        let bbox = BoundingBox {
            x: min_x as u32,
            y: min_y as u32,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
        };
        if best.as_ref().map_or(true, |(n, _)| cells > *n) {
            best = Some((cells, bbox));
        }
    }
    best.map(|(_, bbox)| bbox)
}

/// Map a grid-coordinate region back to full-resolution coordinates.
fn scale_region(region: BoundingBox, ds: u32) -> BoundingBox {
    BoundingBox {
        x: region.x * ds,
        y: region.y * ds,
        width: region.width * ds,
        height: region.height * ds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use perch_core::{PixelFormat, Resolution};

    const W: u32 = 100;
    const H: u32 = 100;

    /// 100x100 RGB frame: flat gray with an optional bright rectangle.
    fn frame(block: Option<(u32, u32, u32, u32)>) -> Frame {
        let res = Resolution::new(W, H);
        let mut data = vec![0x40u8; PixelFormat::Rgb24.frame_size(res)];
        if let Some((bx, by, bw, bh)) = block {
            for y in by..by + bh {
                for x in bx..bx + bw {
                    let p = ((y * W + x) * 3) as usize;
                    data[p] = 0xc0;
                    data[p + 1] = 0xc0;
                    data[p + 2] = 0xc0;
                }
            }
        }
        Frame::new(0, Utc::now(), res, PixelFormat::Rgb24, Bytes::from(data))
    }

    fn config() -> DetectorConfig {
        DetectorConfig {
            sensitivity: 0.02,
            delta_threshold: 25,
            downsample: 1,
            strategy: ReferenceStrategy::FrameDiff,
            min_aspect: 0.4,
            max_aspect: 2.5,
            cadence: 1,
        }
    }

    #[test]
    fn first_frame_only_seeds() {
        let mut detector = MotionDetector::new(config());
        assert!(detector.observe(&frame(Some((0, 0, 50, 50)))).is_none());
    }

    #[test]
    fn static_scene_never_fires_after_seeding() {
        let mut detector = MotionDetector::new(config());
        detector.observe(&frame(None));
        for _ in 0..50 {
            assert!(detector.observe(&frame(None)).is_none());
        }
    }

    #[test]
    fn appearing_block_scores_its_area_fraction() {
        let mut detector = MotionDetector::new(config());
        detector.observe(&frame(None));
        // 20x20 block = 4% of the grid.
        let event = detector.observe(&frame(Some((10, 10, 20, 20)))).unwrap();
        assert!((event.score - 0.04).abs() < 1e-6);
        let region = event.region.unwrap();
        assert_eq!((region.x, region.y), (10, 10));
        assert_eq!((region.width, region.height), (20, 20));
    }

    #[test]
    fn below_sensitivity_is_silent() {
        let mut detector = MotionDetector::new(DetectorConfig {
            sensitivity: 0.05,
            ..config()
        });
        detector.observe(&frame(None));
        // 4% changed < 5% sensitivity.
        assert!(detector.observe(&frame(Some((10, 10, 20, 20)))).is_none());
    }

    #[test]
    fn frame_diff_reference_follows_the_scene() {
        let mut detector = MotionDetector::new(config());
        detector.observe(&frame(None));
        assert!(detector.observe(&frame(Some((0, 0, 30, 30)))).is_some());
        // Same scene again: the reference already includes the block.
        assert!(detector.observe(&frame(Some((0, 0, 30, 30)))).is_none());
    }

    #[test]
    fn background_reference_adapts_gradually() {
        let mut detector = MotionDetector::new(DetectorConfig {
            strategy: ReferenceStrategy::Background { alpha: 0.5 },
            ..config()
        });
        detector.observe(&frame(None));
        let changed = frame(Some((0, 0, 30, 30)));
        // Fires on the change, then stops once the EMA converges on the new
        // scene (delta halves each frame: 128, 64, 32, 16 < threshold 25).
        assert!(detector.observe(&changed).is_some());
        let mut fired = 0;
        for _ in 0..6 {
            if detector.observe(&changed).is_some() {
                fired += 1;
            }
        }
        assert!(fired <= 3, "EMA failed to absorb the scene change");
        assert!(detector.observe(&changed).is_none());
    }

    #[test]
    fn shape_gate_discards_thin_regions() {
        let mut detector = MotionDetector::new(DetectorConfig {
            sensitivity: 0.01,
            ..config()
        });
        detector.observe(&frame(None));
        // 100x3 strip: aspect 33, way past max_aspect.
        assert!(detector.observe(&frame(Some((0, 40, 100, 3)))).is_none());
        // The gate applies per-event; a square region still fires later.
        assert!(detector.observe(&frame(Some((20, 20, 30, 30)))).is_some());
    }

    #[test]
    fn largest_of_two_regions_is_reported() {
        let mut detector = MotionDetector::new(config());
        detector.observe(&frame(None));
        let res = Resolution::new(W, H);
        let mut data = vec![0x40u8; PixelFormat::Rgb24.frame_size(res)];
        for (bx, by, bw, bh) in [(5u32, 5u32, 10u32, 10u32), (60, 60, 25, 25)] {
            for y in by..by + bh {
                for x in bx..bx + bw {
                    let p = ((y * W + x) * 3) as usize;
                    data[p] = 0xc0;
                    data[p + 1] = 0xc0;
                    data[p + 2] = 0xc0;
                }
            }
        }
        let two = Frame::new(0, Utc::now(), res, PixelFormat::Rgb24, Bytes::from(data));
        let event = detector.observe(&two).unwrap();
        let region = event.region.unwrap();
        assert_eq!((region.x, region.y), (60, 60));
        assert_eq!((region.width, region.height), (25, 25));
    }

    #[test]
    fn downsampled_region_maps_back_to_frame_coordinates() {
        let mut detector = MotionDetector::new(DetectorConfig {
            downsample: 4,
            ..config()
        });
        detector.observe(&frame(None));
        let event = detector.observe(&frame(Some((20, 20, 40, 40)))).unwrap();
        let region = event.region.unwrap();
        // Grid-aligned block: exact mapping back to full resolution.
        assert_eq!((region.x, region.y), (20, 20));
        assert_eq!((region.width, region.height), (40, 40));
    }

    #[test]
    fn largest_region_handles_empty_mask() {
        assert!(largest_region(&[false; 16], 4, 4).is_none());
    }
}
