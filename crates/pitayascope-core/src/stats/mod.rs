//! Statistics module for tracking capture history

pub mod store;
