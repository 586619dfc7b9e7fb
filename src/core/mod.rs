//! Core activity detection for the HDD feedback agent.
//!
//! This module contains the sliding window that turns a stream of
//! filesystem notifications into a short/sustained classification.

pub mod activity;

// Re-export commonly used types
pub use activity::{
    ActivityClassification, ActivityEvent, ActivityPolicy, ActivityWindow,
    DEFAULT_BURST_THRESHOLD, DEFAULT_WINDOW_MS,
};
