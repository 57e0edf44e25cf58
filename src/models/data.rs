use std::collections::HashMap;

/// Label -> raw value mapping produced by field association.
///
/// Keys are exactly the declared labels of the document template; `None`
/// marks a field the scan never bound. Only the cleaning stage may drop or
/// derive keys.
pub type Association = HashMap<String, Option<String>>;

/// Final cleaned field -> value record returned to the caller.
pub type Record = HashMap<String, String>;

/// Parameters for the image-conditioning pipeline.
///
/// Constructed once at startup and shared read-only across requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionParams {
    /// Gamma correction exponent, must be finite and > 0.
    pub gamma: f64,
    /// Side of the adaptive-threshold blocks in pixels, must be > 0.
    pub block_size: u32,
    /// Distance from the block median still considered background, > 0.
    pub delta: f64,
}

impl Default for ConditionParams {
    fn default() -> Self {
        ConditionParams {
            gamma: 1.0,
            block_size: 80,
            delta: 50.0,
        }
    }
}
