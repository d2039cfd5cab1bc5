//! Acquisition module
//!
//! This module contains the capture sequence:
//! - Capture parameters and validation ([`config`])
//! - Decimation to sample-rate table ([`rates`])
//! - Trigger arming and status polling ([`trigger`])
//! - Channel buffer retrieval and parsing ([`reader`])
//! - The single/continuous acquisition state machine ([`engine`])

pub mod config;
pub mod engine;
pub mod rates;
pub mod reader;
pub mod trigger;
