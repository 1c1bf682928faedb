//! Identity tracking across frames.
//!
//! Per-frame detection is noisy: boxes jitter, scores flap, objects blink in
//! and out. The tracker turns that into temporally stable identities by
//! associating each frame's detections with existing tracks, coasting
//! through short gaps, and pruning tracks that stay unmatched. Everything
//! downstream (zones, debouncing, speech) keys off the stable track id.
//!
//! Association is greedy best-overlap with a nearest-center fallback for
//! recently missed tracks. All orderings are total: ties break by higher
//! detection confidence, then lower track id, then detection order, so two
//! runs over identical detector output assign identical identities.

use std::collections::VecDeque;
use std::time::Instant;

use crate::detect::Detection;
use crate::zone::{classify, Zone};

pub type TrackId = u64;

/// Axis-aligned box in pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn center_x(&self) -> f32 {
        self.x + self.w / 2.0
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.h / 2.0
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.w).min(other.x + other.w);
        let y2 = (self.y + self.h).min(other.y + other.h);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if inter <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }

    fn center_distance_sq(&self, other: &BoundingBox) -> f32 {
        let dx = self.center_x() - other.center_x();
        let dy = self.center_y() - other.center_y();
        dx * dx + dy * dy
    }
}

impl From<&Detection> for BoundingBox {
    fn from(det: &Detection) -> Self {
        Self {
            x: det.x,
            y: det.y,
            w: det.w,
            h: det.h,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Detections below this score are dropped before association.
    pub confidence_threshold: f32,
    /// Minimum IoU for the primary match phase.
    pub min_iou: f32,
    /// Consecutive missed frames after which a track is pruned.
    pub max_missed_frames: u32,
    /// Center-distance gate for the fallback phase, as a fraction of frame
    /// width.
    pub center_gate_ratio: f32,
    /// Fallback only rescues tracks missed at most this many frames.
    pub center_fallback_max_missed: u32,
    /// EMA factor for confidence smoothing (weight of the new sample).
    pub smoothing_alpha: f32,
    /// Zone history ring capacity per track.
    pub zone_history_len: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            min_iou: 0.05,
            max_missed_frames: 5,
            center_gate_ratio: 0.20,
            center_fallback_max_missed: 2,
            smoothing_alpha: 0.3,
            zone_history_len: 16,
        }
    }
}

struct Track {
    id: TrackId,
    bbox: BoundingBox,
    label: String,
    /// EMA-smoothed confidence.
    confidence: f32,
    last_seen_seq: u64,
    missed: u32,
    zone: Zone,
    zone_history: VecDeque<Zone>,
}

impl Track {
    fn new(id: TrackId, det: &Detection, frame_seq: u64, frame_width: u32, cfg: &TrackerConfig) -> Self {
        let bbox = BoundingBox::from(det);
        let zone = classify(bbox.center_x(), frame_width);
        let mut zone_history = VecDeque::with_capacity(cfg.zone_history_len);
        zone_history.push_back(zone);
        Self {
            id,
            bbox,
            label: det.label.clone(),
            confidence: det.score,
            last_seen_seq: frame_seq,
            missed: 0,
            zone,
            zone_history,
        }
    }

    fn update(&mut self, det: &Detection, frame_seq: u64, frame_width: u32, cfg: &TrackerConfig) {
        self.bbox = BoundingBox::from(det);
        self.confidence =
            cfg.smoothing_alpha * det.score + (1.0 - cfg.smoothing_alpha) * self.confidence;
        self.last_seen_seq = frame_seq;
        self.missed = 0;
        self.zone = classify(self.bbox.center_x(), frame_width);
        if self.zone_history.len() == cfg.zone_history_len {
            self.zone_history.pop_front();
        }
        self.zone_history.push_back(self.zone);
    }

    fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            id: self.id,
            label: self.label.clone(),
            bbox: self.bbox,
            confidence: self.confidence,
            zone: self.zone,
            last_seen_seq: self.last_seen_seq,
        }
    }
}

/// Read-only view of a track, passed downstream by value.
#[derive(Clone, Debug)]
pub struct TrackSnapshot {
    pub id: TrackId,
    pub label: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub zone: Zone,
    pub last_seen_seq: u64,
}

/// A track the tracker just pruned; downstream emits its `Left` event.
#[derive(Clone, Debug)]
pub struct LostTrack {
    pub id: TrackId,
    pub label: String,
    pub last_zone: Zone,
}

/// Everything the tracker stage observed on one frame, sent downstream as
/// an immutable message.
#[derive(Debug)]
pub struct FrameObservation {
    pub frame_seq: u64,
    pub frame_width: u32,
    pub observed_at: Instant,
    /// Live tracks, ascending id.
    pub snapshots: Vec<TrackSnapshot>,
    /// Tracks pruned on this frame, ascending id.
    pub lost: Vec<LostTrack>,
}

/// Multi-object tracker. Owns all `Track` state; everything else sees
/// snapshots.
pub struct Tracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: TrackId,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    /// Associate one frame's detections, returning live snapshots and the
    /// tracks pruned this frame.
    pub fn update(
        &mut self,
        frame_seq: u64,
        frame_width: u32,
        detections: &[Detection],
    ) -> (Vec<TrackSnapshot>, Vec<LostTrack>) {
        let valid: Vec<&Detection> = detections
            .iter()
            .filter(|d| d.score >= self.config.confidence_threshold)
            .collect();

        let mut track_matched = vec![false; self.tracks.len()];
        let mut det_matched = vec![false; valid.len()];

        // Phase 1: best-overlap greedy matching.
        let mut iou_pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, det) in valid.iter().enumerate() {
                let score = track.bbox.iou(&BoundingBox::from(*det));
                if score >= self.config.min_iou {
                    iou_pairs.push((ti, di, score));
                }
            }
        }
        iou_pairs.sort_by(|a, b| {
            b.2.total_cmp(&a.2)
                .then_with(|| valid[b.1].score.total_cmp(&valid[a.1].score))
                .then_with(|| self.tracks[a.0].id.cmp(&self.tracks[b.0].id))
                .then_with(|| a.1.cmp(&b.1))
        });
        for (ti, di, _) in &iou_pairs {
            if track_matched[*ti] || det_matched[*di] {
                continue;
            }
            track_matched[*ti] = true;
            det_matched[*di] = true;
            self.tracks[*ti].update(valid[*di], frame_seq, frame_width, &self.config);
        }

        // Phase 2: nearest-center fallback for recently missed tracks. A
        // fast-moving object can drop IoU to zero between frames while its
        // center barely moves relative to the gate.
        let gate = frame_width as f32 * self.config.center_gate_ratio;
        let gate_sq = gate * gate;
        let mut center_pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            if track_matched[ti] || track.missed > self.config.center_fallback_max_missed {
                continue;
            }
            for (di, det) in valid.iter().enumerate() {
                if det_matched[di] || track.label != det.label {
                    continue;
                }
                let dist_sq = track.bbox.center_distance_sq(&BoundingBox::from(*det));
                if dist_sq <= gate_sq {
                    center_pairs.push((ti, di, dist_sq));
                }
            }
        }
        center_pairs.sort_by(|a, b| {
            a.2.total_cmp(&b.2)
                .then_with(|| valid[b.1].score.total_cmp(&valid[a.1].score))
                .then_with(|| self.tracks[a.0].id.cmp(&self.tracks[b.0].id))
                .then_with(|| a.1.cmp(&b.1))
        });
        for (ti, di, _) in &center_pairs {
            if track_matched[*ti] || det_matched[*di] {
                continue;
            }
            track_matched[*ti] = true;
            det_matched[*di] = true;
            self.tracks[*ti].update(valid[*di], frame_seq, frame_width, &self.config);
        }

        // Unmatched tracks coast.
        for (ti, matched) in track_matched.iter().enumerate() {
            if !matched {
                self.tracks[ti].missed += 1;
            }
        }

        // Unmatched detections spawn tracks in detection order, so new ids
        // ascend deterministically.
        for (di, matched) in det_matched.iter().enumerate() {
            if !matched {
                let track = Track::new(self.next_id, valid[di], frame_seq, frame_width, &self.config);
                log::debug!(
                    "track {} spawned: {} at {:.0},{:.0} zone={}",
                    track.id,
                    track.label,
                    track.bbox.x,
                    track.bbox.y,
                    track.zone
                );
                self.next_id += 1;
                self.tracks.push(track);
            }
        }

        // Prune tracks that coasted past the threshold; each reports lost
        // exactly once because pruning removes it.
        let mut lost = Vec::new();
        let max_missed = self.config.max_missed_frames;
        self.tracks.retain(|t| {
            if t.missed > max_missed {
                log::debug!("track {} pruned after {} missed frames", t.id, t.missed);
                lost.push(LostTrack {
                    id: t.id,
                    label: t.label.clone(),
                    last_zone: t.zone,
                });
                false
            } else {
                true
            }
        });
        lost.sort_by_key(|l| l.id);

        let mut snapshots: Vec<TrackSnapshot> = self.tracks.iter().map(Track::snapshot).collect();
        snapshots.sort_by_key(|s| s.id);
        (snapshots, lost)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Recent zone history of a track, oldest first.
    pub fn zone_history(&self, id: TrackId) -> Option<Vec<Zone>> {
        self.tracks
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.zone_history.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, w: f32, h: f32, score: f32) -> Detection {
        Detection {
            x,
            y,
            w,
            h,
            label: "person".to_string(),
            score,
        }
    }

    #[test]
    fn identity_is_stable_across_frames() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let (snaps, _) = tracker.update(1, 640, &[det(100.0, 100.0, 50.0, 80.0, 0.9)]);
        let id = snaps[0].id;

        // Box drifts a little each frame; identity must hold.
        for (seq, dx) in (2..10).zip((0..).step_by(5)) {
            let (snaps, lost) =
                tracker.update(seq, 640, &[det(100.0 + dx as f32, 100.0, 50.0, 80.0, 0.9)]);
            assert_eq!(snaps.len(), 1);
            assert_eq!(snaps[0].id, id);
            assert!(lost.is_empty());
        }
    }

    #[test]
    fn low_confidence_detections_are_dropped() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let (snaps, _) = tracker.update(1, 640, &[det(100.0, 100.0, 50.0, 80.0, 0.1)]);
        assert!(snaps.is_empty());
        assert_eq!(tracker.track_count(), 0);
    }

    #[test]
    fn prune_reports_lost_exactly_once() {
        let mut tracker = Tracker::new(TrackerConfig {
            max_missed_frames: 3,
            ..TrackerConfig::default()
        });
        let (snaps, _) = tracker.update(1, 640, &[det(100.0, 100.0, 50.0, 80.0, 0.9)]);
        let id = snaps[0].id;

        let mut lost_events = 0;
        for seq in 2..60 {
            let (_, lost) = tracker.update(seq, 640, &[]);
            lost_events += lost.len();
            if !lost.is_empty() {
                assert_eq!(lost[0].id, id);
            }
        }
        assert_eq!(lost_events, 1);
        assert_eq!(tracker.track_count(), 0);
    }

    #[test]
    fn coasting_track_stays_in_snapshots_until_pruned() {
        let mut tracker = Tracker::new(TrackerConfig {
            max_missed_frames: 3,
            ..TrackerConfig::default()
        });
        tracker.update(1, 640, &[det(100.0, 100.0, 50.0, 80.0, 0.9)]);

        // Missed frames 2..=4 coast; frame 5 exceeds the threshold.
        for seq in 2..=4 {
            let (snaps, lost) = tracker.update(seq, 640, &[]);
            assert_eq!(snaps.len(), 1, "seq={seq}");
            assert!(lost.is_empty(), "seq={seq}");
        }
        let (snaps, lost) = tracker.update(5, 640, &[]);
        assert!(snaps.is_empty());
        assert_eq!(lost.len(), 1);
    }

    #[test]
    fn ties_break_toward_the_lower_track_id() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        // Two coincident detections spawn two tracks with identical boxes.
        let (snaps, _) = tracker.update(
            1,
            640,
            &[
                det(100.0, 100.0, 50.0, 80.0, 0.9),
                det(100.0, 100.0, 50.0, 80.0, 0.9),
            ],
        );
        assert_eq!(snaps.len(), 2);
        let first_id = snaps[0].id;
        assert!(snaps[0].id < snaps[1].id);

        // One detection overlapping both equally: the lower track id wins it.
        let (snaps, _) = tracker.update(2, 640, &[det(100.0, 100.0, 50.0, 80.0, 0.9)]);
        let matched = snaps.iter().find(|s| s.last_seen_seq == 2).unwrap();
        assert_eq!(matched.id, first_id);
    }

    #[test]
    fn center_fallback_rescues_fast_mover() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let (snaps, _) = tracker.update(1, 640, &[det(100.0, 100.0, 40.0, 40.0, 0.9)]);
        let id = snaps[0].id;

        // Jump farther than the box size (IoU 0) but inside the center gate
        // (20% of 640 = 128px).
        let (snaps, _) = tracker.update(2, 640, &[det(180.0, 100.0, 40.0, 40.0, 0.9)]);
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].id, id);
    }

    #[test]
    fn zone_history_is_bounded() {
        let mut tracker = Tracker::new(TrackerConfig {
            zone_history_len: 4,
            ..TrackerConfig::default()
        });
        let (snaps, _) = tracker.update(1, 300, &[det(10.0, 10.0, 20.0, 20.0, 0.9)]);
        let id = snaps[0].id;
        for seq in 2..20 {
            tracker.update(seq, 300, &[det(10.0, 10.0, 20.0, 20.0, 0.9)]);
        }
        assert_eq!(tracker.zone_history(id).unwrap().len(), 4);
    }

    #[test]
    fn confidence_is_smoothed_not_replaced() {
        let mut tracker = Tracker::new(TrackerConfig {
            smoothing_alpha: 0.5,
            ..TrackerConfig::default()
        });
        tracker.update(1, 640, &[det(100.0, 100.0, 50.0, 80.0, 0.8)]);
        let (snaps, _) = tracker.update(2, 640, &[det(100.0, 100.0, 50.0, 80.0, 0.4)]);
        let conf = snaps[0].confidence;
        assert!((conf - 0.6).abs() < 1e-6, "conf={conf}");
    }
}
