//! Frame annotation for the recording path.
//!
//! Draws the zone separators and one box per live track, colored by the
//! track's zone, straight into the RGB buffer. Text labels are a UI concern
//! and are not rendered here.

use crate::frame::Frame;
use crate::track::TrackSnapshot;

const SEPARATOR_COLOR: [u8; 3] = [255, 255, 255];
const BOX_THICKNESS: u32 = 2;

/// Consume a frame and return its annotated copy for the recorder.
pub fn annotate(mut frame: Frame, snapshots: &[TrackSnapshot]) -> Frame {
    let width = frame.width;
    let height = frame.height;

    let first = width / 3;
    let second = 2 * width / 3;
    draw_vline(&mut frame, first, 0, height, SEPARATOR_COLOR);
    draw_vline(&mut frame, second, 0, height, SEPARATOR_COLOR);

    for snap in snapshots {
        let color = snap.zone.color();
        let x0 = snap.bbox.x.max(0.0) as u32;
        let y0 = snap.bbox.y.max(0.0) as u32;
        let x1 = ((snap.bbox.x + snap.bbox.w).max(0.0) as u32).min(width.saturating_sub(1));
        let y1 = ((snap.bbox.y + snap.bbox.h).max(0.0) as u32).min(height.saturating_sub(1));
        if x0 >= width || y0 >= height || x1 <= x0 || y1 <= y0 {
            continue;
        }
        for t in 0..BOX_THICKNESS {
            draw_hline(&mut frame, y0.saturating_add(t).min(y1), x0, x1, color);
            draw_hline(&mut frame, y1.saturating_sub(t).max(y0), x0, x1, color);
            draw_vline_span(&mut frame, x0.saturating_add(t).min(x1), y0, y1, color);
            draw_vline_span(&mut frame, x1.saturating_sub(t).max(x0), y0, y1, color);
        }
    }

    frame
}

fn put_pixel(frame: &mut Frame, x: u32, y: u32, color: [u8; 3]) {
    if x >= frame.width || y >= frame.height {
        return;
    }
    let idx = ((y * frame.width + x) * 3) as usize;
    frame.data_mut()[idx..idx + 3].copy_from_slice(&color);
}

fn draw_vline(frame: &mut Frame, x: u32, y0: u32, y1: u32, color: [u8; 3]) {
    for y in y0..y1.min(frame.height) {
        put_pixel(frame, x, y, color);
    }
}

fn draw_vline_span(frame: &mut Frame, x: u32, y0: u32, y1: u32, color: [u8; 3]) {
    for y in y0..=y1.min(frame.height.saturating_sub(1)) {
        put_pixel(frame, x, y, color);
    }
}

fn draw_hline(frame: &mut Frame, y: u32, x0: u32, x1: u32, color: [u8; 3]) {
    for x in x0..=x1.min(frame.width.saturating_sub(1)) {
        put_pixel(frame, x, y, color);
    }
}
