//! Channel buffer retrieval
//!
//! Reads one channel's sample buffer with `ACQ:SOUR<n>:DATA?`. The response is a
//! brace-wrapped, comma-separated list of volts that may contain `ERR!` markers
//! when the instrument could not fill part of the buffer:
//!
//! ```text
//! {0.0123,0.0456,ERR!,-0.0312,...}
//! ```
//!
//! Reading never fails. A query failure is retried once after flushing the
//! transport; if that fails too, or nothing parses, the channel degrades to a
//! zero-filled buffer of the configured length.

use super::config::AcquisitionConfig;
use super::trigger::pause;
use crate::transport::Transport;
use std::fmt;
use std::time::Duration;

/// Marker the instrument embeds for samples it could not deliver
const ERROR_MARKER: &str = "ERR!";

/// Analog input channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    One,
    Two,
}

impl Channel {
    /// Both channels in read order
    pub const BOTH: [Channel; 2] = [Channel::One, Channel::Two];

    /// 1-based channel number used on the wire
    pub fn index(self) -> u8 {
        match self {
            Channel::One => 1,
            Channel::Two => 2,
        }
    }

    /// Data query for this channel
    pub fn data_query(self) -> String {
        format!("ACQ:SOUR{}:DATA?", self.index())
    }

    pub(crate) fn slot(self) -> usize {
        self.index() as usize - 1
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CH{}", self.index())
    }
}

/// One channel's captured waveform
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBuffer {
    pub channel: Channel,
    /// Sample values in volts
    pub samples: Vec<f64>,
    /// Sample times in seconds, `time_base[i] = i * sample_interval`
    pub time_base: Vec<f64>,
    /// True when the read failed and `samples` is a zero-filled placeholder
    pub zero_filled: bool,
}

impl ChannelBuffer {
    /// Build a buffer with its time base
    pub fn new(channel: Channel, samples: Vec<f64>, sample_interval: f64) -> Self {
        let time_base = time_base(samples.len(), sample_interval);
        Self {
            channel,
            samples,
            time_base,
            zero_filled: false,
        }
    }

    /// Zero-filled placeholder of `len` samples
    pub fn zeroed(channel: Channel, len: usize, sample_interval: f64) -> Self {
        Self {
            zero_filled: true,
            ..Self::new(channel, vec![0.0; len], sample_interval)
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration covered by the buffer in seconds
    pub fn duration(&self) -> f64 {
        match self.time_base.as_slice() {
            [first, .., last] => last - first,
            _ => 0.0,
        }
    }
}

/// Sample times for `len` samples spaced `sample_interval` seconds apart
pub fn time_base(len: usize, sample_interval: f64) -> Vec<f64> {
    (0..len).map(|i| i as f64 * sample_interval).collect()
}

/// Parse a raw data response into volts
///
/// Error markers and braces are removed, fields are split on commas and
/// trimmed, and fields that are not numbers are dropped.
///
/// # Example
/// ```
/// use pitayascope_core::acquisition::reader::parse_samples;
///
/// let values = parse_samples("{0.5, ERR!,-0.25,abc,1e-3}");
/// assert_eq!(values, vec![0.5, -0.25, 0.001]);
/// ```
pub fn parse_samples(raw: &str) -> Vec<f64> {
    raw.replace(ERROR_MARKER, "")
        .replace(['{', '}'], "")
        .split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .filter_map(|field| field.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .collect()
}

fn preview(raw: &str) -> &str {
    match raw.char_indices().nth(100) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}

/// Reads channel buffers with one retry and zero-fill fallback
///
/// A failed read yields `config.buffer_size` zeros, so both channels of a
/// capture always have the configured length.
#[derive(Debug, Clone)]
pub struct ChannelReader {
    /// Delay between a failed query and its retry
    retry_delay: Duration,
}

impl ChannelReader {
    /// Create a reader
    ///
    /// # Arguments
    /// * `retry_delay` - Pause after flushing the transport before retrying (500 ms on hardware)
    pub fn new(retry_delay: Duration) -> Self {
        Self { retry_delay }
    }

    /// Read and parse one channel
    ///
    /// Never fails: transport and parse failures degrade to a zero-filled buffer.
    pub fn read_channel<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        channel: Channel,
        config: &AcquisitionConfig,
    ) -> ChannelBuffer {
        let raw = match self.query_with_retry(transport, channel) {
            Some(raw) => raw,
            None => return self.fallback(channel, config, "query failed twice"),
        };

        let samples = parse_samples(&raw);
        if samples.is_empty() {
            tracing::debug!(channel = channel.index(), raw = preview(&raw), "Unparsable channel data");
            return self.fallback(channel, config, "no valid data points");
        }

        tracing::debug!(channel = channel.index(), samples = samples.len(), "Channel read");
        ChannelBuffer::new(channel, samples, config.sample_interval())
    }

    fn query_with_retry<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        channel: Channel,
    ) -> Option<String> {
        let query = channel.data_query();
        match transport.query(&query) {
            Ok(raw) => Some(raw),
            Err(first) => {
                tracing::warn!(channel = channel.index(), error = %first, "Data query failed, retrying");
                if let Err(e) = transport.clear() {
                    tracing::warn!(channel = channel.index(), error = %e, "Failed to clear transport");
                }
                pause(self.retry_delay);
                match transport.query(&query) {
                    Ok(raw) => Some(raw),
                    Err(second) => {
                        tracing::warn!(channel = channel.index(), error = %second, "Data query retry failed");
                        None
                    }
                }
            }
        }
    }

    fn fallback(&self, channel: Channel, config: &AcquisitionConfig, reason: &str) -> ChannelBuffer {
        let len = config.buffer_size;
        tracing::warn!(
            channel = channel.index(),
            len,
            reason,
            "Channel read failed, using zero-filled buffer"
        );
        ChannelBuffer::zeroed(channel, len, config.sample_interval())
    }
}

impl Default for ChannelReader {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::config::{Decimation, TriggerSource};
    use crate::transport::ScriptedTransport;
    use approx::assert_relative_eq;

    fn config(decimation: Decimation) -> AcquisitionConfig {
        AcquisitionConfig::new(decimation, 1024, 0, TriggerSource::Disabled, 0.0).unwrap()
    }

    #[test]
    fn test_parse_clean_buffer() {
        assert_eq!(parse_samples("{1.0,2.5,-3.25}"), vec![1.0, 2.5, -3.25]);
    }

    #[test]
    fn test_parse_drops_markers_and_junk() {
        let values = parse_samples("{ERR!0.1, 0.2 ,,ERR!, nan?, 0.3}");
        assert_eq!(values, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_parse_only_markers_is_empty() {
        assert!(parse_samples("{ERR!,ERR!,ERR!}").is_empty());
        assert!(parse_samples("").is_empty());
    }

    #[test]
    fn test_time_base_spacing() {
        for d in Decimation::ALL {
            let buf = ChannelBuffer::new(Channel::One, vec![0.0; 16], d.sample_interval());
            assert_eq!(buf.time_base.len(), buf.samples.len());
            assert_relative_eq!(buf.time_base[0], 0.0);
            assert_relative_eq!(
                buf.time_base[15],
                15.0 * 8e-9 * d.factor() as f64,
                max_relative = 1e-12
            );
        }
    }

    #[test]
    fn test_read_success() {
        let scope = ScriptedTransport::new();
        scope.respond("ACQ:SOUR2:DATA?", "{0.5,-0.5,0.25}");
        let mut link = scope.clone();
        let reader = ChannelReader::new(Duration::ZERO);

        let buf = reader.read_channel(&mut link, Channel::Two, &config(Decimation::X8));
        assert_eq!(buf.channel, Channel::Two);
        assert_eq!(buf.samples, vec![0.5, -0.5, 0.25]);
        assert!(!buf.zero_filled);
        assert_relative_eq!(buf.time_base[2], 2.0 * 64e-9, max_relative = 1e-12);
    }

    #[test]
    fn test_single_failure_is_retried() {
        let scope = ScriptedTransport::new();
        scope.fail_next("ACQ:SOUR1:DATA?");
        scope.respond("ACQ:SOUR1:DATA?", "{1.0,2.0}");
        let mut link = scope.clone();
        let reader = ChannelReader::new(Duration::ZERO);

        let buf = reader.read_channel(&mut link, Channel::One, &config(Decimation::X1));
        assert_eq!(buf.samples, vec![1.0, 2.0]);
        assert_eq!(scope.count("ACQ:SOUR1:DATA?"), 2);
        assert_eq!(scope.clears(), 1);
    }

    #[test]
    fn test_double_failure_zero_fills() {
        let scope = ScriptedTransport::new();
        scope.fail_next("ACQ:SOUR1:DATA?");
        scope.fail_next("ACQ:SOUR1:DATA?");
        let mut link = scope.clone();
        let reader = ChannelReader::new(Duration::ZERO);

        let buf = reader.read_channel(&mut link, Channel::One, &config(Decimation::X64));
        assert!(buf.zero_filled);
        assert_eq!(buf.len(), 1024);
        assert_eq!(buf.time_base.len(), 1024);
        assert!(buf.samples.iter().all(|&v| v == 0.0));
        assert_eq!(scope.count("ACQ:SOUR1:DATA?"), 2);
    }

    #[test]
    fn test_markers_only_zero_fills_configured_length() {
        let scope = ScriptedTransport::new();
        scope.respond("ACQ:SOUR2:DATA?", "{ERR!,ERR!}");
        let mut link = scope.clone();
        let reader = ChannelReader::new(Duration::ZERO);
        let cfg = AcquisitionConfig::new(Decimation::X8, 512, 0, TriggerSource::Disabled, 0.0)
            .unwrap();

        let buf = reader.read_channel(&mut link, Channel::Two, &cfg);
        assert!(buf.zero_filled);
        assert_eq!(buf.len(), 512);
        assert_eq!(buf.time_base.len(), 512);
        assert_eq!(scope.count("ACQ:SOUR2:DATA?"), 1, "Parse failure is not retried");
    }

    #[test]
    fn test_fallback_ignores_earlier_read_length() {
        let scope = ScriptedTransport::new();
        scope.respond("ACQ:SOUR1:DATA?", "{0.1,0.2,0.3,0.4,0.5}");
        scope.respond("ACQ:SOUR1:DATA?", "{ERR!}");
        let mut link = scope.clone();
        let reader = ChannelReader::new(Duration::ZERO);
        let cfg = AcquisitionConfig::new(Decimation::X1, 4096, 0, TriggerSource::Disabled, 0.0)
            .unwrap();

        assert_eq!(reader.read_channel(&mut link, Channel::One, &cfg).len(), 5);
        let degraded = reader.read_channel(&mut link, Channel::One, &cfg);
        assert!(degraded.zero_filled);
        assert_eq!(degraded.len(), 4096);
    }

    #[test]
    fn test_preview_truncates_long_responses() {
        let raw = "1,".repeat(200);
        assert_eq!(preview(&raw).len(), 100);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_duration() {
        let buf = ChannelBuffer::new(Channel::One, vec![0.0; 11], 1e-3);
        assert_relative_eq!(buf.duration(), 0.01, epsilon = 1e-12);
        assert_relative_eq!(ChannelBuffer::new(Channel::One, vec![], 1e-3).duration(), 0.0);
    }
}
