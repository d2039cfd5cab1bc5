//! Waveform analysis
//!
//! - Amplitude and dominant-frequency measurements ([`measure`])

pub mod measure;
