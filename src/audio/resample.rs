//! Linear-interpolation sample rate conversion.

/// Rates the pipeline converts between.
///
/// Any pair in this set round-trips within one sample of the original
/// length. Pairs further apart than 3:1 (such as 8 kHz with 48 kHz) do not.
pub const SUPPORTED_SAMPLE_RATES: &[u32] = &[16000, 22050, 24000, 32000, 44100, 48000];

/// Whether `rate` is in [`SUPPORTED_SAMPLE_RATES`].
pub fn is_supported_rate(rate: u32) -> bool {
    SUPPORTED_SAMPLE_RATES.contains(&rate)
}

/// Number of samples `len` input samples become when converted.
///
/// Rounded to the nearest sample so that the duration scales by the rate
/// ratio within half a sample.
pub fn output_len(len: usize, from_rate: u32, to_rate: u32) -> usize {
    if from_rate == to_rate || from_rate == 0 {
        return len;
    }
    let from = u64::from(from_rate);
    let scaled = len as u64 * u64::from(to_rate) + from / 2;
    (scaled / from) as usize
}

/// Convert mono PCM from `from_rate` to `to_rate`.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let last = samples.len() - 1;

    (0..output_len(samples.len(), from_rate, to_rate))
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(last);
            let fraction = source_pos - source_idx as f64;

            if source_idx >= last {
                samples[last]
            } else {
                let left = f64::from(samples[source_idx]);
                let right = f64::from(samples[source_idx + 1]);
                (left + (right - left) * fraction).round() as i16
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_same_rate() {
        let samples = vec![100i16, 200, 300, 400, 500];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn test_empty_input() {
        assert!(resample(&[], 48000, 16000).is_empty());
    }

    #[test]
    fn test_downsample_by_three_picks_every_third() {
        let samples: Vec<i16> = (0..9).map(|i| i * 100).collect();
        assert_eq!(resample(&samples, 48000, 16000), vec![0, 300, 600]);
    }

    #[test]
    fn test_upsample_interpolates() {
        let samples = vec![0i16, 1000, 2000];
        let resampled = resample(&samples, 16000, 32000);
        assert_eq!(resampled.len(), 6);
        assert_eq!(&resampled[..5], &[0, 500, 1000, 1500, 2000]);
        // Past the last input sample the value is held
        assert_eq!(resampled[5], 2000);
    }

    #[test]
    fn test_duration_scales_by_ratio() {
        // One second at 44.1 kHz
        assert_eq!(output_len(44100, 44100, 16000), 16000);
        assert_eq!(output_len(1000, 48000, 16000), 333);
        assert_eq!(output_len(1001, 48000, 16000), 334);
    }

    #[test]
    fn test_round_trip_length_within_one_sample() {
        for &a in SUPPORTED_SAMPLE_RATES {
            for &b in SUPPORTED_SAMPLE_RATES {
                for len in [0usize, 1, 2, 7, 100, 333, 1000, 1024, 4097, 16000] {
                    let input = vec![0i16; len];
                    let there = resample(&input, a, b);
                    let back = resample(&there, b, a);
                    let diff = (back.len() as i64 - len as i64).abs();
                    assert!(diff <= 1, "{a} -> {b} -> {a} with {len} samples gave {}", back.len());
                }
            }
        }
    }

    #[test]
    fn test_constant_signal_preserved() {
        let samples = vec![1000i16; 4410];
        let resampled = resample(&samples, 44100, 16000);
        assert!(resampled.iter().all(|&s| s == 1000));
    }

    #[test]
    fn test_supported_rates() {
        assert!(is_supported_rate(48000));
        assert!(is_supported_rate(16000));
        assert!(!is_supported_rate(8000));
    }

    #[test]
    fn test_every_probed_rate_is_supported() {
        for &rate in crate::defaults::PROBE_SAMPLE_RATES {
            assert!(is_supported_rate(rate), "{rate} Hz is probed but cannot be resampled");
        }
    }
}
