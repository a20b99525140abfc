//! Aggregation of synthetic series end to end.

use std::collections::BTreeMap;

use aggregation::{scan_step_info, AggregationParams, Aggregator, WindowSource};
use grid_common::{StepRange, StepType};
use test_utils::{
    assert_approx_eq, assert_slice_approx_eq, create_grid_with_missing, create_precipitation_grid,
    cumulative_series, instant_series, MISSING,
};

fn to_map(series: Vec<(StepRange, Vec<f32>)>) -> BTreeMap<StepRange, Vec<f32>> {
    series.into_iter().collect()
}

#[test]
fn test_cumulative_round_trip_to_daily() {
    let raw = to_map(cumulative_series(6, &[10.0, 25.0, 40.0, 60.0], 4));
    let aggregator = Aggregator::new(AggregationParams::new(
        24,
        StepType::Cumulative,
        6,
        StepType::Cumulative,
        0,
        24,
        MISSING,
    ))
    .unwrap();

    let out = aggregator.aggregate(raw).unwrap();
    let daily = &out[&StepRange::new(0, 24)];
    assert_eq!(daily.len(), 4);
    for &v in daily {
        assert_approx_eq!(v, 60.0, 1e-6);
    }
}

#[test]
fn test_missing_cells_with_and_without_force_zero() {
    let mut raw = to_map(cumulative_series(6, &[10.0, 25.0, 40.0, 60.0], 3));
    for values in raw.values_mut() {
        values[1] = MISSING;
    }

    let params = AggregationParams::new(
        24,
        StepType::Cumulative,
        6,
        StepType::Cumulative,
        0,
        24,
        MISSING,
    );

    let out = Aggregator::new(params.clone())
        .unwrap()
        .aggregate(raw.clone())
        .unwrap();
    assert_eq!(out[&StepRange::new(0, 24)], vec![60.0, MISSING, 60.0]);

    let out = Aggregator::new(params.with_force_zero_array(true))
        .unwrap()
        .aggregate(raw)
        .unwrap();
    assert_eq!(out[&StepRange::new(0, 24)], vec![60.0, 0.0, 60.0]);
}

#[test]
fn test_resolution_boundary_split() {
    // 6-hourly up to hour 48, then 3-hourly up to hour 96
    let mut steps: Vec<u32> = (0..=48).step_by(6).collect();
    steps.extend((51..=96).step_by(3));
    let values: Vec<f32> = steps.iter().map(|&s| s as f32).collect();

    let mut raw = BTreeMap::new();
    for (&s, &v) in steps.iter().zip(&values) {
        raw.insert(StepRange::instant(s), vec![v; 2]);
    }

    let keys: Vec<StepRange> = raw.keys().copied().collect();
    let info = scan_step_info(&keys).unwrap();
    assert_eq!(info.input_step, 6);
    let change = info.change.unwrap();
    assert_eq!(change.input_step, 3);
    assert_eq!(change.boundary(), 48);

    let aggregator = Aggregator::new(
        AggregationParams::new(24, StepType::Average, 6, StepType::Instant, 0, 96, MISSING)
            .with_time_change(info.change),
    )
    .unwrap();

    let windows = aggregator.windows(raw.keys()).unwrap();
    let outputs: Vec<StepRange> = windows.iter().map(|w| w.output).collect();
    assert_eq!(
        outputs,
        vec![
            StepRange::new(0, 24),
            StepRange::new(24, 48),
            StepRange::new(48, 72),
            StepRange::new(72, 96),
        ]
    );
    let input_steps: Vec<u32> = windows.iter().map(|w| w.input_step).collect();
    assert_eq!(input_steps, vec![6, 6, 3, 3]);

    // Every covered hour of [0, 96) is counted exactly once
    let covered: f64 = windows
        .iter()
        .map(|w| match &w.source {
            WindowSource::Weighted(inputs) => inputs.iter().map(|(_, h)| h).sum::<f64>(),
            other => panic!("unexpected window source {:?}", other),
        })
        .sum();
    assert_approx_eq!(covered, 96.0, 1e-9);

    let out = aggregator.aggregate(raw).unwrap();
    assert_eq!(out.len(), 4);
    // Values equal their hour, so each window mean is its midpoint minus half an input step
    assert_approx_eq!(out[&StepRange::new(0, 24)][0], 9.0, 1e-5);
    assert_approx_eq!(out[&StepRange::new(48, 72)][0], 58.5, 1e-5);
}

#[test]
fn test_cumulative_resolution_boundary_split() {
    // Running totals (0,6)..(0,48), then 3-hourly ranges (48,51)..(93,96)
    let mut keys: Vec<StepRange> = (6..=48).step_by(6).map(|e| StepRange::new(0, e)).collect();
    keys.extend((51..=96).step_by(3).map(|e| StepRange::new(e - 3, e)));
    let raw: BTreeMap<StepRange, Vec<f32>> =
        keys.iter().map(|&k| (k, vec![k.end as f32; 2])).collect();

    let info = scan_step_info(&keys).unwrap();
    let change = info.change.unwrap();
    assert_eq!(info.input_step, 6);
    assert_eq!(change.at, StepRange::new(48, 51));
    assert_eq!(change.boundary(), 48);

    let aggregator = Aggregator::new(
        AggregationParams::new(
            24,
            StepType::Cumulative,
            info.input_step,
            StepType::Cumulative,
            0,
            96,
            MISSING,
        )
        .with_time_change(info.change),
    )
    .unwrap();

    let windows = aggregator.windows(raw.keys()).unwrap();
    let input_steps: Vec<u32> = windows.iter().map(|w| w.input_step).collect();
    assert_eq!(input_steps, vec![6, 6, 3, 3]);
    assert_eq!(
        windows[2].source,
        WindowSource::Difference {
            end: StepRange::new(69, 72),
            baseline: Some(StepRange::new(0, 48)),
        }
    );

    let out = aggregator.aggregate(raw).unwrap();
    let outputs: Vec<StepRange> = out.keys().copied().collect();
    assert_eq!(
        outputs,
        vec![
            StepRange::new(0, 24),
            StepRange::new(24, 48),
            StepRange::new(48, 72),
            StepRange::new(72, 96),
        ]
    );
    for values in out.values() {
        assert_slice_approx_eq!(values, &[24.0, 24.0], 1e-5);
    }
}

#[test]
fn test_instant_series_pass_through() {
    let raw = to_map(instant_series(0, 6, &[1.0, 2.0, 3.0, 4.0, 5.0], 2));
    let aggregator = Aggregator::new(AggregationParams::new(
        12,
        StepType::Instant,
        6,
        StepType::Instant,
        0,
        24,
        MISSING,
    ))
    .unwrap();
    let out = aggregator.aggregate(raw).unwrap();
    assert_eq!(out[&StepRange::new(0, 12)], vec![3.0, 3.0]);
    assert_eq!(out[&StepRange::new(12, 24)], vec![5.0, 5.0]);
}

#[test]
fn test_average_masks_cells_missing_in_any_input() {
    let fields = [
        create_precipitation_grid(4, 3, 1),
        create_precipitation_grid(4, 3, 2),
        create_grid_with_missing(4, 3, &[(1, 1)], MISSING),
        create_precipitation_grid(4, 3, 3),
        create_precipitation_grid(4, 3, 4),
    ];
    let raw: BTreeMap<StepRange, Vec<f32>> = fields
        .iter()
        .enumerate()
        .map(|(i, f)| (StepRange::instant(i as u32 * 6), f.clone()))
        .collect();

    let aggregator = Aggregator::new(AggregationParams::new(
        24,
        StepType::Average,
        6,
        StepType::Instant,
        0,
        24,
        MISSING,
    ))
    .unwrap();
    let out = aggregator.aggregate(raw).unwrap();

    // Hour 24 holds [24, 30) and falls outside the window
    let mut expected: Vec<f32> = (0..12)
        .map(|i| (fields[0][i] + fields[1][i] + fields[2][i] + fields[3][i]) / 4.0)
        .collect();
    expected[5] = MISSING;
    assert_slice_approx_eq!(&out[&StepRange::new(0, 24)], &expected, 1e-5);
}
