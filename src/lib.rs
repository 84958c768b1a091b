//! OTN peripheral monitor
//!
//! Facade over [`otn_core`]. The daemon lives in the `otn-daemon` crate.

pub use otn_core::*;
