//! Notification debouncing.
//!
//! Turns the dense per-frame stream of track observations into the sparse
//! stream of events worth speaking aloud. A box jittering across a zone
//! boundary must not produce a word per frame; an object genuinely moving
//! should be announced promptly; a vanished object is announced gone exactly
//! once.
//!
//! All `AnnouncementState` lives here and is mutated only here — the
//! debouncer is the single writer, so no locking is needed anywhere in the
//! notification path.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::track::{FrameObservation, TrackId};
use crate::zone::Zone;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Track first seen, or settled in a (possibly re-entered) zone after a
    /// suppressed change.
    Entered,
    /// Track still around after the repeat interval.
    StillPresent,
    /// Track pruned by the tracker.
    Left,
    /// The scene emptied (optional, off by default).
    AllClear,
}

/// One announcement-worthy event. Consumed exactly once by the announcer.
#[derive(Clone, Debug)]
pub struct NotificationEvent {
    /// 0 for `AllClear`, which is not tied to a track.
    pub track_id: TrackId,
    pub label: String,
    pub zone: Zone,
    pub kind: EventKind,
    pub at: Instant,
}

#[derive(Clone, Debug)]
pub struct DebouncerConfig {
    /// Minimum gap between two announcements for the same track.
    pub cooldown: Duration,
    /// Re-announce a still-present track after this long; `None` disables
    /// `StillPresent` events.
    pub repeat_interval: Option<Duration>,
    /// Announce once when the scene empties.
    pub announce_all_clear: bool,
}

impl Default for DebouncerConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(3),
            repeat_interval: None,
            announce_all_clear: false,
        }
    }
}

/// Per-track announcement bookkeeping. Single-writer: only
/// `NotificationDebouncer::observe` touches this.
struct AnnouncementState {
    /// Zone of the last spoken announcement.
    last_zone: Zone,
    last_announced_at: Instant,
    /// A zone change was observed but suppressed by the cooldown; the
    /// track's current zone must be re-announced once the cooldown elapses.
    pending_change: bool,
}

pub struct NotificationDebouncer {
    config: DebouncerConfig,
    states: HashMap<TrackId, AnnouncementState>,
    last_all_clear_at: Option<Instant>,
    scene_had_tracks: bool,
}

impl NotificationDebouncer {
    pub fn new(config: DebouncerConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
            last_all_clear_at: None,
            scene_had_tracks: false,
        }
    }

    /// Process one frame's observation. Events come out ordered: live tracks
    /// by ascending id, then lost tracks by ascending id, then all-clear.
    pub fn observe(&mut self, observation: &FrameObservation) -> Vec<NotificationEvent> {
        let now = observation.observed_at;
        let mut events = Vec::new();

        for snap in &observation.snapshots {
            match self.states.get_mut(&snap.id) {
                None => {
                    // First sighting announces immediately.
                    self.states.insert(
                        snap.id,
                        AnnouncementState {
                            last_zone: snap.zone,
                            last_announced_at: now,
                            pending_change: false,
                        },
                    );
                    events.push(NotificationEvent {
                        track_id: snap.id,
                        label: snap.label.clone(),
                        zone: snap.zone,
                        kind: EventKind::Entered,
                        at: now,
                    });
                }
                Some(state) => {
                    let elapsed = now.duration_since(state.last_announced_at);
                    if snap.zone != state.last_zone {
                        if elapsed >= self.config.cooldown {
                            state.last_zone = snap.zone;
                            state.last_announced_at = now;
                            state.pending_change = false;
                            events.push(NotificationEvent {
                                track_id: snap.id,
                                label: snap.label.clone(),
                                zone: snap.zone,
                                kind: EventKind::Entered,
                                at: now,
                            });
                        } else {
                            // Change noted but held back; re-announced once
                            // the cooldown elapses, wherever the track is by
                            // then.
                            state.pending_change = true;
                        }
                    } else if state.pending_change && elapsed >= self.config.cooldown {
                        state.last_zone = snap.zone;
                        state.last_announced_at = now;
                        state.pending_change = false;
                        events.push(NotificationEvent {
                            track_id: snap.id,
                            label: snap.label.clone(),
                            zone: snap.zone,
                            kind: EventKind::Entered,
                            at: now,
                        });
                    } else if let Some(repeat) = self.config.repeat_interval {
                        if elapsed >= repeat {
                            state.last_announced_at = now;
                            state.pending_change = false;
                            events.push(NotificationEvent {
                                track_id: snap.id,
                                label: snap.label.clone(),
                                zone: snap.zone,
                                kind: EventKind::StillPresent,
                                at: now,
                            });
                        }
                    }
                }
            }
        }

        for lost in &observation.lost {
            // Only tracks we actually announced get a departure; state
            // removal makes the Left event unrepeatable.
            if self.states.remove(&lost.id).is_some() {
                events.push(NotificationEvent {
                    track_id: lost.id,
                    label: lost.label.clone(),
                    zone: lost.last_zone,
                    kind: EventKind::Left,
                    at: now,
                });
            }
        }

        if !observation.snapshots.is_empty() {
            self.scene_had_tracks = true;
        } else if self.config.announce_all_clear
            && self.scene_had_tracks
            && self.states.is_empty()
            // Departure frames keep their Left announcement alone; the
            // all-clear waits for the next quiet frame.
            && observation.lost.is_empty()
        {
            let due = match self.last_all_clear_at {
                Some(at) => now.duration_since(at) >= self.config.cooldown,
                None => true,
            };
            if due {
                self.scene_had_tracks = false;
                self.last_all_clear_at = Some(now);
                events.push(NotificationEvent {
                    track_id: 0,
                    label: String::new(),
                    zone: Zone::Center,
                    kind: EventKind::AllClear,
                    at: now,
                });
            }
        }

        events
    }

    /// Number of tracks currently holding announcement state.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{BoundingBox, FrameObservation, LostTrack, TrackSnapshot};

    fn snap(id: TrackId, center_x: f32, frame_width: u32) -> TrackSnapshot {
        TrackSnapshot {
            id,
            label: "person".to_string(),
            bbox: BoundingBox {
                x: center_x - 10.0,
                y: 50.0,
                w: 20.0,
                h: 40.0,
            },
            confidence: 0.9,
            zone: crate::zone::classify(center_x, frame_width),
            last_seen_seq: 0,
        }
    }

    fn obs(
        seq: u64,
        width: u32,
        at: Instant,
        snapshots: Vec<TrackSnapshot>,
        lost: Vec<LostTrack>,
    ) -> FrameObservation {
        FrameObservation {
            frame_seq: seq,
            frame_width: width,
            observed_at: at,
            snapshots,
            lost,
        }
    }

    #[test]
    fn steady_presence_announces_once() {
        let mut debouncer = NotificationDebouncer::new(DebouncerConfig::default());
        let base = Instant::now();

        let events = debouncer.observe(&obs(1, 900, base, vec![snap(1, 50.0, 900)], vec![]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Entered);
        assert_eq!(events[0].zone, Zone::Left);

        // Same zone for many frames: silence.
        for i in 2..50u64 {
            let at = base + Duration::from_millis(i * 33);
            let events = debouncer.observe(&obs(i, 900, at, vec![snap(1, 50.0, 900)], vec![]));
            assert!(events.is_empty(), "frame {i} produced {events:?}");
        }
    }

    #[test]
    fn zone_bounce_within_cooldown_reannounces_after_cooldown() {
        // Object at 900px width: x=290 (left), x=310 (center), x=50 (left).
        let mut debouncer = NotificationDebouncer::new(DebouncerConfig {
            cooldown: Duration::from_secs(2),
            ..DebouncerConfig::default()
        });
        let base = Instant::now();

        let e1 = debouncer.observe(&obs(1, 900, base, vec![snap(1, 290.0, 900)], vec![]));
        assert_eq!(e1.len(), 1);
        assert_eq!(e1[0].zone, Zone::Left);

        // Drift into center one second later: inside cooldown, suppressed.
        let e2 = debouncer.observe(&obs(
            2,
            900,
            base + Duration::from_secs(1),
            vec![snap(1, 310.0, 900)],
            vec![],
        ));
        assert!(e2.is_empty());

        // Back to left after the cooldown has elapsed: the pending change is
        // resolved with a fresh announcement of the current zone.
        let e3 = debouncer.observe(&obs(
            3,
            900,
            base + Duration::from_millis(2500),
            vec![snap(1, 50.0, 900)],
            vec![],
        ));
        assert_eq!(e3.len(), 1);
        assert_eq!(e3[0].kind, EventKind::Entered);
        assert_eq!(e3[0].zone, Zone::Left);
    }

    #[test]
    fn zone_change_after_cooldown_announces_immediately() {
        let mut debouncer = NotificationDebouncer::new(DebouncerConfig {
            cooldown: Duration::from_secs(1),
            ..DebouncerConfig::default()
        });
        let base = Instant::now();

        debouncer.observe(&obs(1, 900, base, vec![snap(1, 100.0, 900)], vec![]));
        let events = debouncer.observe(&obs(
            2,
            900,
            base + Duration::from_secs(2),
            vec![snap(1, 450.0, 900)],
            vec![],
        ));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Entered);
        assert_eq!(events[0].zone, Zone::Center);
    }

    #[test]
    fn lost_track_emits_left_once() {
        let mut debouncer = NotificationDebouncer::new(DebouncerConfig::default());
        let base = Instant::now();

        debouncer.observe(&obs(1, 900, base, vec![snap(7, 100.0, 900)], vec![]));

        let lost = LostTrack {
            id: 7,
            label: "person".to_string(),
            last_zone: Zone::Left,
        };
        let events = debouncer.observe(&obs(
            2,
            900,
            base + Duration::from_millis(100),
            vec![],
            vec![lost.clone()],
        ));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Left);

        // A duplicate prune report must not re-announce.
        let events = debouncer.observe(&obs(
            3,
            900,
            base + Duration::from_millis(200),
            vec![],
            vec![lost],
        ));
        assert!(events.is_empty());
    }

    #[test]
    fn unannounced_track_leaves_silently() {
        let mut debouncer = NotificationDebouncer::new(DebouncerConfig::default());
        let base = Instant::now();
        let events = debouncer.observe(&obs(
            1,
            900,
            base,
            vec![],
            vec![LostTrack {
                id: 9,
                label: "person".to_string(),
                last_zone: Zone::Right,
            }],
        ));
        assert!(events.is_empty());
    }

    #[test]
    fn simultaneous_entries_order_by_track_id() {
        let mut debouncer = NotificationDebouncer::new(DebouncerConfig::default());
        let base = Instant::now();
        let events = debouncer.observe(&obs(
            1,
            900,
            base,
            vec![snap(2, 100.0, 900), snap(5, 450.0, 900), snap(9, 800.0, 900)],
            vec![],
        ));
        let ids: Vec<_> = events.iter().map(|e| e.track_id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn still_present_fires_on_interval_when_enabled() {
        let mut debouncer = NotificationDebouncer::new(DebouncerConfig {
            cooldown: Duration::from_secs(1),
            repeat_interval: Some(Duration::from_secs(5)),
            announce_all_clear: false,
        });
        let base = Instant::now();

        debouncer.observe(&obs(1, 900, base, vec![snap(1, 100.0, 900)], vec![]));

        // Before the repeat interval: quiet.
        let events = debouncer.observe(&obs(
            2,
            900,
            base + Duration::from_secs(4),
            vec![snap(1, 100.0, 900)],
            vec![],
        ));
        assert!(events.is_empty());

        let events = debouncer.observe(&obs(
            3,
            900,
            base + Duration::from_secs(6),
            vec![snap(1, 100.0, 900)],
            vec![],
        ));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::StillPresent);
    }

    #[test]
    fn all_clear_fires_once_after_scene_empties() {
        let mut debouncer = NotificationDebouncer::new(DebouncerConfig {
            cooldown: Duration::from_secs(1),
            repeat_interval: None,
            announce_all_clear: true,
        });
        let base = Instant::now();

        debouncer.observe(&obs(1, 900, base, vec![snap(1, 100.0, 900)], vec![]));
        let events = debouncer.observe(&obs(
            2,
            900,
            base + Duration::from_secs(2),
            vec![],
            vec![LostTrack {
                id: 1,
                label: "person".to_string(),
                last_zone: Zone::Left,
            }],
        ));
        // Departure first, then the empty-scene notice on the next frame.
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Left);

        let events = debouncer.observe(&obs(3, 900, base + Duration::from_secs(3), vec![], vec![]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::AllClear);

        let events = debouncer.observe(&obs(4, 900, base + Duration::from_secs(9), vec![], vec![]));
        assert!(events.is_empty());
    }
}
