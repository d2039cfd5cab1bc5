//! Amplitude and frequency measurements
//!
//! Computes peak-to-peak and RMS voltage directly from the samples, and the
//! dominant frequency from a Hann-windowed magnitude spectrum:
//!
//! ```text
//! x[n]  = samples[n] - mean(samples)           (remove DC)
//! w[n]  = 0.5 - 0.5 cos(2πn / (N - 1))         (Hann window)
//! X[k]  = |FFT(x · w)|,  k = 0..=N/2
//! f     = argmax_{k ≥ 1} X[k] · sample_rate / N
//! ```
//!
//! Frequency is returned in Hz; unit selection for display belongs to the caller.

use crate::acquisition::config::Decimation;
use crate::acquisition::rates::sample_rate_hz;
use crate::acquisition::reader::ChannelBuffer;
use rustfft::{num_complex::Complex, FftPlanner};

/// Measurements derived from one channel buffer
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeasurementResult {
    /// Peak-to-peak voltage
    pub vpp: f64,
    /// RMS voltage (including any DC component)
    pub vrms: f64,
    /// Dominant frequency in Hz, `None` when the spectrum has no usable peak
    pub frequency_hz: Option<f64>,
}

/// Measure a channel buffer captured at `decimation`
pub fn measure(buffer: &ChannelBuffer, decimation: Decimation) -> MeasurementResult {
    measure_samples(&buffer.samples, sample_rate_hz(decimation))
}

/// Measure raw samples at an explicit sample rate
pub fn measure_samples(samples: &[f64], sample_rate: f64) -> MeasurementResult {
    MeasurementResult {
        vpp: peak_to_peak(samples),
        vrms: rms(samples),
        frequency_hz: dominant_frequency(samples, sample_rate),
    }
}

/// `max - min`, 0 for an empty slice
pub fn peak_to_peak(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let (min, max) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    max - min
}

/// `sqrt(mean(x²))`, 0 for an empty slice
pub fn rms(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_square = samples.iter().map(|v| v * v).sum::<f64>() / samples.len() as f64;
    mean_square.sqrt()
}

/// Symmetric Hann window of length `len`
pub fn hann_window(len: usize) -> Vec<f64> {
    match len {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let denom = (len - 1) as f64;
            (0..len)
                .map(|n| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * n as f64 / denom).cos())
                .collect()
        }
    }
}

/// One-sided magnitude spectrum of the DC-removed, Hann-windowed signal
///
/// Returns `N/2 + 1` bins; bin `k` sits at `k * sample_rate / N`.
pub fn magnitude_spectrum(samples: &[f64]) -> Vec<f64> {
    let len = samples.len();
    if len == 0 {
        return Vec::new();
    }

    let mean = samples.iter().sum::<f64>() / len as f64;
    let window = hann_window(len);
    let mut buffer: Vec<Complex<f64>> = samples
        .iter()
        .zip(&window)
        .map(|(&x, &w)| Complex::new((x - mean) * w, 0.0))
        .collect();

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(len);
    fft.process(&mut buffer);

    buffer[..len / 2 + 1].iter().map(|c| c.norm()).collect()
}

/// Frequency of the strongest non-DC spectral bin
///
/// `None` for empty or single-sample input, a non-positive sample rate, or a
/// flat spectrum (e.g. constant or zero-filled buffers).
pub fn dominant_frequency(samples: &[f64], sample_rate: f64) -> Option<f64> {
    if samples.len() < 2 || sample_rate.is_nan() || sample_rate <= 0.0 {
        return None;
    }

    let spectrum = magnitude_spectrum(samples);
    let (peak_idx, peak_mag) = spectrum
        .iter()
        .enumerate()
        .skip(1)
        .fold((0usize, 0.0f64), |(best_idx, best), (idx, &mag)| {
            if mag > best {
                (idx, mag)
            } else {
                (best_idx, best)
            }
        });

    // Rounding noise on a constant input sits many decades below any real tone
    let scale = samples.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    if peak_idx == 0 || !peak_mag.is_finite() || peak_mag <= scale * 1e-9 {
        return None;
    }

    Some(peak_idx as f64 * sample_rate / samples.len() as f64)
}

/// Vertical display range covering all buffers, padded by 10% of the span
///
/// Returns `None` when every buffer is empty.
pub fn display_range(buffers: &[&ChannelBuffer]) -> Option<(f64, f64)> {
    let (min, max) = buffers
        .iter()
        .flat_map(|b| b.samples.iter())
        .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })?;
    let padding = (max - min) * 0.1;
    Some((min - padding, max + padding))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::reader::Channel;
    use approx::assert_relative_eq;

    fn sine(freq: f64, amplitude: f64, sample_rate: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|n| amplitude * (2.0 * std::f64::consts::PI * freq * n as f64 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_constant_buffer() {
        let result = measure_samples(&[0.7; 256], 1e6);
        assert_relative_eq!(result.vpp, 0.0);
        assert_relative_eq!(result.vrms, 0.7, epsilon = 1e-12);
        assert_eq!(result.frequency_hz, None);

        let negative = measure_samples(&[-1.5; 64], 1e6);
        assert_relative_eq!(negative.vrms, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_buffer() {
        let result = measure_samples(&[], 125e6);
        assert_eq!(result.vpp, 0.0);
        assert_eq!(result.vrms, 0.0);
        assert_eq!(result.frequency_hz, None);
    }

    #[test]
    fn test_zero_filled_buffer_has_no_frequency() {
        let buf = ChannelBuffer::zeroed(Channel::One, 1024, 8e-9);
        let result = measure(&buf, Decimation::X1);
        assert_eq!(result.vpp, 0.0);
        assert_eq!(result.vrms, 0.0);
        assert!(result.frequency_hz.is_none());
    }

    #[test]
    fn test_sine_amplitude() {
        // Integer number of cycles so RMS is exactly A/sqrt(2)
        let samples = sine(1000.0, 2.0, 64000.0, 6400);
        let result = measure_samples(&samples, 64000.0);
        assert_relative_eq!(result.vpp, 4.0, epsilon = 1e-3);
        assert_relative_eq!(result.vrms, 2.0 / 2f64.sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn test_sine_frequency_within_one_bin() {
        let sample_rate = sample_rate_hz(Decimation::X64);
        let len = 1024;
        let bin_width = sample_rate / len as f64;

        for freq in [10e3, 37.3e3, 100e3, 250e3, 612e3] {
            let samples = sine(freq, 1.0, sample_rate, len);
            let estimate = dominant_frequency(&samples, sample_rate).unwrap();
            assert!(
                (estimate - freq).abs() <= bin_width,
                "{} Hz estimated as {} Hz (bin {} Hz)",
                freq,
                estimate,
                bin_width
            );
        }
    }

    #[test]
    fn test_dc_offset_ignored() {
        let sample_rate = 1e6;
        let samples: Vec<f64> = sine(50e3, 0.1, sample_rate, 2048)
            .into_iter()
            .map(|v| v + 5.0)
            .collect();
        let estimate = dominant_frequency(&samples, sample_rate).unwrap();
        assert!((estimate - 50e3).abs() <= sample_rate / 2048.0);
    }

    #[test]
    fn test_hann_window_shape() {
        let w = hann_window(5);
        assert_relative_eq!(w[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(w[2], 1.0, epsilon = 1e-12);
        assert_relative_eq!(w[4], 0.0, epsilon = 1e-12);
        assert_eq!(hann_window(1), vec![1.0]);
        assert!(hann_window(0).is_empty());
    }

    #[test]
    fn test_spectrum_length() {
        assert_eq!(magnitude_spectrum(&[0.0; 8]).len(), 5);
        assert_eq!(magnitude_spectrum(&[0.0; 9]).len(), 5);
        assert!(magnitude_spectrum(&[]).is_empty());
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(dominant_frequency(&[1.0], 1e6), None);
        assert_eq!(dominant_frequency(&[1.0, -1.0, 1.0, -1.0], 0.0), None);
    }

    #[test]
    fn test_display_range() {
        let a = ChannelBuffer::new(Channel::One, vec![-1.0, 0.0, 1.0], 1.0);
        let b = ChannelBuffer::new(Channel::Two, vec![0.5, 3.0], 1.0);
        let (lo, hi) = display_range(&[&a, &b]).unwrap();
        assert_relative_eq!(lo, -1.4, epsilon = 1e-12);
        assert_relative_eq!(hi, 3.4, epsilon = 1e-12);

        let empty = ChannelBuffer::new(Channel::One, vec![], 1.0);
        assert_eq!(display_range(&[&empty]), None);
    }
}
