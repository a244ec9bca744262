//! LED frames pushed to the tracker.

use shared::domain::{LaneVector, LANE_COUNT};

pub const LED_SEGMENTS: usize = 31;
/// One RGB triple per segment.
pub const LED_FRAME_LEN: usize = LED_SEGMENTS * 3;

pub const LIT: [u8; 3] = [0xff, 0x3f, 0xc8];
pub const UNLIT: [u8; 3] = [0x08, 0x08, 0x10];

/// Spreads the air lanes across the segment strip, lane 0 at segment 0.
pub fn render_led_frame(air: LaneVector) -> Vec<u8> {
    let mut frame = Vec::with_capacity(LED_FRAME_LEN);
    for segment in 0..LED_SEGMENTS {
        let lane = segment * LANE_COUNT / LED_SEGMENTS;
        let rgb = if air.is_set(lane) { LIT } else { UNLIT };
        frame.extend_from_slice(&rgb);
    }
    frame
}
