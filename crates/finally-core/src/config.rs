//! Configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::budget::{ResourceBudget, DEFAULT_MIN_CALL_FRAMES, DEFAULT_MIN_STACK_SLOTS};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinallyConfig {
    /// Local slots reserved for every cleanup action.
    pub min_stack_slots: i64,

    /// Call frames preallocated for every cleanup action.
    pub min_call_frames: i64,

    /// Run cleanups with the growth-rejecting allocator installed.
    pub calibrate: bool,

    /// Native stack given to the cleanup context regardless of frame count.
    pub base_stack_bytes: usize,

    /// Native stack added per preallocated call frame.
    pub frame_stack_bytes: usize,

    /// Optional hard cap for a heap built from this config. `None` = uncapped.
    pub heap_cap_bytes: Option<usize>,
}

impl Default for FinallyConfig {
    fn default() -> Self {
        Self {
            min_stack_slots: DEFAULT_MIN_STACK_SLOTS,
            min_call_frames: DEFAULT_MIN_CALL_FRAMES,
            calibrate: false,
            base_stack_bytes: 256 * 1024,
            frame_stack_bytes: 16 * 1024,
            heap_cap_bytes: None,
        }
    }
}

impl FinallyConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `FINALLY_MIN_STACK_SLOTS`: reserved local slots
    /// - `FINALLY_MIN_CALL_FRAMES`: preallocated call frames
    /// - `FINALLY_CALIBRATE`: `1`/`true` to enable calibration mode
    /// - `FINALLY_BASE_STACK_BYTES`: base native stack of the cleanup context
    /// - `FINALLY_FRAME_STACK_BYTES`: native stack per preallocated frame
    /// - `FINALLY_HEAP_CAP_BYTES`: hard cap for the managed heap
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("FINALLY_MIN_STACK_SLOTS") {
            if let Ok(v) = s.parse::<i64>() {
                cfg.min_stack_slots = v;
            }
        }

        if let Ok(s) = std::env::var("FINALLY_MIN_CALL_FRAMES") {
            if let Ok(v) = s.parse::<i64>() {
                cfg.min_call_frames = v;
            }
        }

        if let Ok(s) = std::env::var("FINALLY_CALIBRATE") {
            cfg.calibrate = parse_flag(&s);
        }

        if let Ok(s) = std::env::var("FINALLY_BASE_STACK_BYTES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.base_stack_bytes = v;
            }
        }

        if let Ok(s) = std::env::var("FINALLY_FRAME_STACK_BYTES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.frame_stack_bytes = v;
            }
        }

        if let Ok(s) = std::env::var("FINALLY_HEAP_CAP_BYTES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.heap_cap_bytes = Some(v);
            }
        }

        cfg
    }

    /// Budget snapshot used for each invocation (not yet validated).
    pub fn budget(&self) -> ResourceBudget {
        ResourceBudget {
            min_stack_slots: self.min_stack_slots,
            min_call_frames: self.min_call_frames,
            calibrate: self.calibrate,
        }
    }

    /// Native stack size for a cleanup context that builds `frames` frames.
    pub fn context_stack_bytes(&self, frames: usize) -> usize {
        self.base_stack_bytes
            .saturating_add(frames.saturating_mul(self.frame_stack_bytes))
    }
}

fn parse_flag(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budget() {
        let cfg = FinallyConfig::default();
        assert_eq!(cfg.budget(), ResourceBudget::default());
    }

    #[test]
    fn test_context_stack_bytes() {
        let cfg = FinallyConfig {
            base_stack_bytes: 1000,
            frame_stack_bytes: 10,
            ..FinallyConfig::default()
        };
        assert_eq!(cfg.context_stack_bytes(0), 1000);
        assert_eq!(cfg.context_stack_bytes(11), 1110);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag(" TRUE "));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("nope"));
    }

    #[test]
    fn test_config_roundtrip_json() {
        let cfg = FinallyConfig {
            heap_cap_bytes: Some(4096),
            ..FinallyConfig::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: FinallyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.heap_cap_bytes, Some(4096));
        assert_eq!(back.min_call_frames, cfg.min_call_frames);
    }
}
