use super::*;
use crate::detector::HandSample;
use shared::error::ProtocolError;

fn cycle(heights: &[Option<f64>]) -> DetectionCycle {
    DetectionCycle::pixels(
        heights
            .iter()
            .map(|height| match height {
                Some(y) => HandSample::new(0.0, *y),
                None => HandSample::malformed(),
            })
            .collect(),
    )
}

#[test]
fn emits_change_only_when_a_lane_differs() {
    let mut composer = StateComposer::new();

    let first = composer.compose(&[Some(5), Some(1)]).expect("compose");
    assert_eq!(first.map(|lanes| lanes.to_string()).as_deref(), Some("010001"));

    let repeat = composer.compose(&[Some(1), Some(5)]).expect("compose");
    assert_eq!(repeat, None);

    let moved = composer.compose(&[Some(4), Some(1)]).expect("compose");
    assert_eq!(moved.map(|lanes| lanes.to_string()).as_deref(), Some("010010"));
}

#[test]
fn two_hands_in_one_lane_set_a_single_bit() {
    let mut composer = StateComposer::new();
    let lanes = composer
        .compose(&[Some(3), Some(3)])
        .expect("compose")
        .expect("changed");
    assert_eq!(lanes, LaneVector::from_active([3]).expect("lanes"));
}

#[test]
fn outside_hands_leave_no_bits() {
    let mut composer = StateComposer::new();
    assert_eq!(composer.compose(&[None, None]).expect("compose"), None);
    assert_eq!(composer.current(), LaneVector::EMPTY);
}

#[test]
fn release_after_press_is_a_change() {
    let mut composer = StateComposer::new();
    composer.compose(&[Some(2)]).expect("compose");
    let released = composer.compose(&[]).expect("compose");
    assert_eq!(released, Some(LaneVector::EMPTY));
}

#[test]
fn compares_against_most_recent_vector() {
    let mut composer = StateComposer::new();
    composer.compose(&[Some(0)]).expect("compose");
    composer.compose(&[Some(1)]).expect("compose");
    let back = composer.compose(&[Some(0)]).expect("compose");
    assert!(back.is_some());
    assert!(composer.current().is_set(0));
}

#[test]
fn out_of_range_zone_is_a_fault() {
    let mut composer = StateComposer::new();
    let err = composer.compose(&[Some(9)]).expect_err("lane 9");
    assert!(matches!(
        err,
        CoreError::Protocol(ProtocolError::LaneOutOfRange { lane: 9, .. })
    ));
}

#[test]
fn slots_follow_sample_order() {
    let mut slots = HandSlots::new(3);
    let heights = slots.observe(&cycle(&[Some(10.0), Some(150.0), Some(30.0)]));
    assert_eq!(heights, [Some(10.0), Some(150.0)]);
}

#[test]
fn malformed_sample_keeps_previous_height() {
    let mut slots = HandSlots::new(3);
    slots.observe(&cycle(&[Some(10.0), Some(150.0)]));
    let heights = slots.observe(&cycle(&[None, Some(120.0)]));
    assert_eq!(heights, [Some(10.0), Some(120.0)]);
}

#[test]
fn missing_hand_expires_after_configured_cycles() {
    let mut slots = HandSlots::new(2);
    slots.observe(&cycle(&[Some(10.0), Some(150.0)]));

    assert_eq!(slots.observe(&cycle(&[Some(11.0)])), [Some(11.0), Some(150.0)]);
    assert_eq!(slots.observe(&cycle(&[Some(12.0)])), [Some(12.0), Some(150.0)]);
    assert_eq!(slots.observe(&cycle(&[Some(13.0)])), [Some(13.0), None]);
}

#[test]
fn valid_sample_resets_expiry() {
    let mut slots = HandSlots::new(1);
    slots.observe(&cycle(&[Some(10.0)]));
    slots.observe(&cycle(&[]));
    slots.observe(&cycle(&[Some(20.0)]));
    assert_eq!(slots.observe(&cycle(&[])), [Some(20.0), None]);
    assert_eq!(slots.observe(&cycle(&[])), [None, None]);
}

#[test]
fn zero_expiry_retains_indefinitely() {
    let mut slots = HandSlots::new(0);
    slots.observe(&cycle(&[Some(42.0)]));
    for _ in 0..500 {
        slots.observe(&cycle(&[]));
    }
    assert_eq!(slots.heights(), [Some(42.0), None]);
}
