//! Frame ingestion
//!
//! Turns raw camera frames into filtered stripe samples:
//! - Stripe detection with optional ambient subtraction
//! - Logical frame assembly
//! - Row bin low pass filtering

pub mod assembly;
pub mod detector;

pub use assembly::{
    FilterConfig, FrameAssembler, FrameFilter, RowBinning, compute_average, lowpass_filter,
    skip_next_frame,
};
pub use detector::{DetectorConfig, StripeDetector, StripeScoring};
