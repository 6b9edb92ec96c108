//! Block-gap and receipt-gap detection and recovery (spec §4.3).

pub mod detect;
pub mod error;
pub mod repair;

pub use detect::{detect_block_gaps, detect_receipt_gaps, GapRange, ReceiptGapInfo};
pub use error::GapError;
pub use repair::{fill_gap, fill_receipt_gap, run_with_gap_recovery, RepairConfig};
