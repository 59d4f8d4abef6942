use clipclash_core::{AudioData, SourceWindow, waveform::derive_peaks};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn full_window_peaks_reach_unit_magnitude(
        samples in prop::collection::vec(-1.0f32..1.0, 1..2_000),
        sample_count in 1usize..512,
    ) {
        prop_assume!(samples.iter().any(|sample| sample.abs() > 1e-3));
        let audio = AudioData::from_samples(samples.clone(), 8_000);

        let peaks = derive_peaks(&audio, sample_count, SourceWindow::default());
        prop_assert_eq!(peaks.len(), sample_count);

        let loudest = peaks
            .iter()
            .map(|peak| peak.max.abs().max(peak.min.abs()))
            .fold(0.0_f32, f32::max);
        prop_assert!((loudest - 1.0).abs() < 1e-5, "loudest peak {}", loudest);

        for (index, peak) in peaks.iter().enumerate() {
            let from = index * samples.len() / sample_count;
            let to = (index + 1) * samples.len() / sample_count;
            let block = &samples[from..to];

            prop_assert!(peak.min <= 0.0 && peak.max >= 0.0);
            if block.iter().any(|sample| *sample > 0.0) {
                prop_assert!(peak.max > 0.0, "block {} lost its positive peak", index);
            }
            if block.iter().any(|sample| *sample < 0.0) {
                prop_assert!(peak.min < 0.0, "block {} lost its negative peak", index);
            }
        }
    }
}
