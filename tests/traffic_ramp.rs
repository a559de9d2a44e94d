// ABOUTME: Property tests for traffic splits and ramp policy.
// ABOUTME: Splits always sum to 100; ramp lookups stay ordered and end at full traffic.

use proptest::prelude::*;
use std::time::Duration;
use switchyard::deploy::{RampError, RampStep, TrafficRamp};
use switchyard::types::{Color, TrafficSplit};

fn arb_color() -> impl Strategy<Value = Color> {
    prop_oneof![Just(Color::Blue), Just(Color::Green)]
}

/// Strictly increasing percentages ending at 100.
fn arb_percentages() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::btree_set(1u8..100, 0..8).prop_map(|set| {
        let mut steps: Vec<u8> = set.into_iter().collect();
        steps.push(100);
        steps
    })
}

fn ramp_of(percentages: &[u8]) -> TrafficRamp {
    let steps = percentages
        .iter()
        .map(|&p| RampStep::new(p, Duration::from_secs(60), Duration::from_secs(30)))
        .collect();
    TrafficRamp::new(steps).unwrap()
}

proptest! {
    #[test]
    fn toward_always_sums_to_100(color in arb_color(), percent in any::<u8>()) {
        let split = TrafficSplit::toward(color, percent);
        prop_assert_eq!(u16::from(split.blue()) + u16::from(split.green()), 100);
        prop_assert_eq!(split.percent_for(color), percent.min(100));
    }

    #[test]
    fn new_accepts_only_pairs_summing_to_100(blue in any::<u8>(), green in any::<u8>()) {
        let result = TrafficSplit::new(blue, green);
        prop_assert_eq!(result.is_ok(), u16::from(blue) + u16::from(green) == 100);
    }

    #[test]
    fn shifted_is_symmetric(a in 0u8..=100, b in 0u8..=100) {
        let x = TrafficSplit::toward(Color::Green, a);
        let y = TrafficSplit::toward(Color::Green, b);
        prop_assert_eq!(x.shifted_from(&y), y.shifted_from(&x));
        prop_assert_eq!(x.shifted_from(&y), a.abs_diff(b));
    }

    #[test]
    fn walking_from_start_index_is_increasing_and_ends_full(
        percentages in arb_percentages(),
        initial in 0u8..=100,
    ) {
        let ramp = ramp_of(&percentages);
        let mut index = ramp.start_index(initial);
        let (first, mut is_last) = ramp.step(index).unwrap();
        prop_assert!(first.percent >= initial || index == 0);

        let mut previous = first.percent;
        while !is_last {
            let (next, step, last) = ramp.next_step(index).unwrap();
            prop_assert!(step.percent > previous);
            previous = step.percent;
            index = next;
            is_last = last;
        }
        prop_assert_eq!(previous, 100);
        prop_assert!(ramp.next_step(index).is_none());
    }

    #[test]
    fn serde_round_trip_preserves_steps(percentages in arb_percentages()) {
        let ramp = ramp_of(&percentages);
        let yaml = serde_yaml::to_string(&ramp).unwrap();
        let parsed: TrafficRamp = serde_yaml::from_str(&yaml).unwrap();
        prop_assert_eq!(parsed, ramp);
    }
}

#[test]
fn ramp_must_reach_full_traffic() {
    let steps = vec![RampStep::new(50, Duration::from_secs(10), Duration::from_secs(5))];
    assert_eq!(
        TrafficRamp::new(steps).unwrap_err(),
        RampError::DoesNotReachFull { last: 50 }
    );
}

#[test]
fn ramp_rejects_decreasing_steps() {
    let step = |p| RampStep::new(p, Duration::from_secs(10), Duration::from_secs(5));
    assert!(matches!(
        TrafficRamp::new(vec![step(50), step(25), step(100)]),
        Err(RampError::NotIncreasing { index: 1 })
    ));
}

#[test]
fn ramp_from_yaml_uses_humantime() {
    let yaml = r#"
- { percent: 20, step_duration: 2m, validation_duration: 30s }
- { percent: 100, step_duration: 5m, validation_duration: 1m }
"#;
    let ramp: TrafficRamp = serde_yaml::from_str(yaml).unwrap();
    let first = ramp.steps().first();
    assert_eq!(first.step_duration, Duration::from_secs(120));
    assert_eq!(first.settle_duration(), Duration::from_secs(90));
}

#[test]
fn ramp_yaml_rejects_validation_longer_than_step() {
    let yaml = "- { percent: 100, step_duration: 1m, validation_duration: 2m }\n";
    assert!(serde_yaml::from_str::<TrafficRamp>(yaml).is_err());
}

#[test]
fn split_serializes_as_weight_object() {
    let split = TrafficSplit::new(25, 75).unwrap();
    assert_eq!(
        serde_json::to_value(split).unwrap(),
        serde_json::json!({"blue": 25, "green": 75})
    );
    assert!(serde_json::from_value::<TrafficSplit>(serde_json::json!({"blue": 30, "green": 30})).is_err());
}
