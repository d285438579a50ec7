//! Chaos/failpoint hooks (feature: `failpoints`).
//!
//! Keep this extremely light: the macro expands to nothing unless the feature
//! is enabled. When enabled, it panics on points armed with [`arm`].
//!
//! Points: `preallocate` (inside the driver, right before the first suspend)
//! and `resume_cleanup` (after resume, right before the cleanup action).

#[cfg(feature = "failpoints")]
mod registry {
    use std::collections::HashSet;
    use std::sync::{Mutex, PoisonError};

    use once_cell::sync::Lazy;

    static ARMED: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

    pub fn arm(name: &str) {
        ARMED
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
    }

    pub fn disarm(name: &str) {
        ARMED
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    pub fn is_armed(name: &str) -> bool {
        ARMED
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }
}

#[cfg(feature = "failpoints")]
pub use registry::{arm, disarm, is_armed};

#[cfg(feature = "failpoints")]
#[macro_export]
macro_rules! fail_point {
    ($name:expr) => {{
        if $crate::failpoints::is_armed($name) {
            panic!("failpoint triggered: {}", $name);
        }
    }};
}

#[cfg(not(feature = "failpoints"))]
#[macro_export]
macro_rules! fail_point {
    ($name:expr) => {
        // no-op
        let _ = $name;
    };
}
