#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn samples_to_seconds(samples: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }

    samples as f64 / f64::from(sample_rate)
}

#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn seconds_to_sample_floor(seconds: f64, sample_rate: u32) -> usize {
    if !seconds.is_finite() || seconds <= 0.0 || sample_rate == 0 {
        return 0;
    }

    (seconds * f64::from(sample_rate)).floor() as usize
}

#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn seconds_to_sample_ceil(seconds: f64, sample_rate: u32) -> usize {
    if !seconds.is_finite() || seconds <= 0.0 || sample_rate == 0 {
        return 0;
    }

    (seconds * f64::from(sample_rate)).ceil() as usize
}

#[must_use]
pub fn drifted(actual: f64, expected: f64, tolerance: f64) -> bool {
    (actual - expected).abs() > tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_positions_round_in_expected_directions() {
        assert_eq!(seconds_to_sample_floor(1.25, 4), 5);
        assert_eq!(seconds_to_sample_floor(1.3, 4), 5);
        assert_eq!(seconds_to_sample_ceil(1.3, 4), 6);
        assert_eq!(seconds_to_sample_ceil(1.25, 4), 5);
    }

    #[test]
    fn degenerate_inputs_map_to_zero() {
        assert_eq!(seconds_to_sample_floor(-2.0, 48_000), 0);
        assert_eq!(seconds_to_sample_ceil(f64::NAN, 48_000), 0);
        assert_eq!(seconds_to_sample_floor(1.0, 0), 0);
        assert!(samples_to_seconds(10, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn sample_second_round_trip_is_stable() {
        let sample_rate = 44_100;
        let samples = 132_300;
        let seconds = samples_to_seconds(samples, sample_rate);
        assert_eq!(seconds_to_sample_floor(seconds, sample_rate), samples);
    }

    #[test]
    fn drift_is_strictly_greater_than_tolerance() {
        assert!(!drifted(10.05, 10.0, 0.1));
        assert!(drifted(10.2, 10.0, 0.1));
        assert!(drifted(9.8, 10.0, 0.1));
    }
}
