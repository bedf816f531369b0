//! Small DSP helpers shared by the analyzers.
//!
//! All functions are pure and allocation-free except where noted.

/// Energy floor used when converting silence to decibels.
pub const MIN_ENERGY_DB: f32 = -100.0;

/// Lags whose correlation is within this fraction of the strongest peak are
/// preferred when shorter, which suppresses octave-down errors.
const OCTAVE_PREFERENCE: f32 = 0.9;

/// Compute the root-mean-square of a sample slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// RMS level in dBFS, floored at [`MIN_ENERGY_DB`].
pub fn energy_db(rms: f32) -> f32 {
    if rms <= 0.0 {
        return MIN_ENERGY_DB;
    }
    (20.0 * rms.log10()).max(MIN_ENERGY_DB)
}

/// Sign changes per sample, in [0, 1].
pub fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / samples.len() as f32
}

/// Estimate F0 with an overlap-normalised autocorrelation.
///
/// Returns `None` when the window is too short for the requested pitch range
/// or when the best peak is weaker than `voicing_threshold × r(0)`.
pub fn estimate_pitch(
    samples: &[f32],
    sample_rate: u32,
    min_pitch_hz: f32,
    max_pitch_hz: f32,
    voicing_threshold: f32,
) -> Option<f32> {
    let n = samples.len();
    if n < 64 || min_pitch_hz <= 0.0 || max_pitch_hz <= min_pitch_hz {
        return None;
    }
    let sr = sample_rate as f32;
    let min_lag = ((sr / max_pitch_hz).floor() as usize).max(2);
    // Keep at least half the window overlapping so long lags stay comparable.
    let max_lag = ((sr / min_pitch_hz).ceil() as usize).min(n / 2);
    if min_lag + 2 >= max_lag {
        return None;
    }

    let mean = samples.iter().sum::<f32>() / n as f32;
    let centered: Vec<f32> = samples.iter().map(|s| s - mean).collect();

    let r0 = centered.iter().map(|s| s * s).sum::<f32>() / n as f32;
    if r0 <= f32::EPSILON {
        return None;
    }

    // r[k] for k in (min_lag - 1)..=(max_lag + 1) so every candidate has neighbours.
    let lo = min_lag - 1;
    let hi = (max_lag + 1).min(n - 1);
    let corr: Vec<f32> = (lo..=hi)
        .map(|lag| {
            let overlap = n - lag;
            let sum: f32 = centered[..overlap]
                .iter()
                .zip(&centered[lag..])
                .map(|(a, b)| a * b)
                .sum();
            sum / overlap as f32
        })
        .collect();

    let best = corr[1..corr.len() - 1]
        .iter()
        .copied()
        .fold(f32::MIN, f32::max);
    if best / r0 < voicing_threshold {
        return None;
    }

    let peak = (1..corr.len() - 1).find(|&i| {
        corr[i] >= corr[i - 1] && corr[i] >= corr[i + 1] && corr[i] >= OCTAVE_PREFERENCE * best
    })?;

    // Parabolic interpolation around the chosen lag.
    let (a, b, c) = (corr[peak - 1], corr[peak], corr[peak + 1]);
    let denom = a - 2.0 * b + c;
    let offset = if denom.abs() > f32::EPSILON {
        (0.5 * (a - c) / denom).clamp(-0.5, 0.5)
    } else {
        0.0
    };
    let lag = (lo + peak) as f32 + offset;
    Some(sr / lag)
}

/// Least-squares slope of `y` over `x`. Zero for fewer than two points.
pub fn linear_slope(points: &[(f32, f32)]) -> f32 {
    if points.len() < 2 {
        return 0.0;
    }
    let n = points.len() as f32;
    let mean_x = points.iter().map(|p| p.0).sum::<f32>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f32>() / n;
    let (num, den) = points.iter().fold((0.0f32, 0.0f32), |(num, den), (x, y)| {
        let dx = x - mean_x;
        (num + dx * (y - mean_y), den + dx * dx)
    });
    if den <= f32::EPSILON {
        0.0
    } else {
        num / den
    }
}

/// Population variance.
pub fn variance(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::TAU;

    fn sine(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (TAU * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn rms_of_square_wave() {
        let samples: Vec<f32> = (0..256)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        assert_relative_eq!(rms(&samples), 0.5, epsilon = 1e-5);
    }

    #[test]
    fn energy_db_floors_silence() {
        assert_eq!(energy_db(0.0), MIN_ENERGY_DB);
        assert_relative_eq!(energy_db(1.0), 0.0, epsilon = 1e-5);
        assert_relative_eq!(energy_db(0.1), -20.0, epsilon = 1e-4);
    }

    #[test]
    fn zcr_of_alternating_signal_is_high() {
        let samples: Vec<f32> = (0..100).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!(zero_crossing_rate(&samples) > 0.95);
        assert_eq!(zero_crossing_rate(&[0.3; 100]), 0.0);
    }

    #[test]
    fn pitch_of_pure_tones() {
        for freq in [110.0f32, 150.0, 220.0, 300.0] {
            let samples = sine(freq, 16_000, 640, 0.5);
            let est = estimate_pitch(&samples, 16_000, 50.0, 500.0, 0.3).expect("voiced");
            assert!((est - freq).abs() < freq * 0.03, "freq={freq} est={est}");
        }
    }

    #[test]
    fn pitch_of_silence_is_none() {
        assert!(estimate_pitch(&[0.0; 640], 16_000, 50.0, 500.0, 0.3).is_none());
    }

    #[test]
    fn slope_of_line() {
        let pts: Vec<(f32, f32)> = (0..10).map(|i| (i as f32, 3.0 * i as f32 + 1.0)).collect();
        assert_relative_eq!(linear_slope(&pts), 3.0, epsilon = 1e-4);
        assert_eq!(linear_slope(&pts[..1]), 0.0);
    }

    #[test]
    fn variance_of_constant_is_zero() {
        assert_eq!(variance(&[2.0; 8]), 0.0);
        assert_relative_eq!(variance(&[1.0, 3.0]), 1.0, epsilon = 1e-6);
    }
}
