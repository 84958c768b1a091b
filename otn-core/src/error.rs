//! Error types, re-exported from `otn-error`

pub use otn_error::{PmonError, Result};
