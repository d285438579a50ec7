use thiserror::Error;

/// Result type local to finally-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("allocation of {bytes} bytes denied (tag '{tag}')")]
    AllocFailed { tag: &'static str, bytes: usize },

    #[error("backing storage for {bytes} bytes unavailable (tag '{tag}'): {reason}")]
    Reserve {
        tag: &'static str,
        bytes: usize,
        reason: String,
    },
}

/// True if `err` or anything in its source chain is a denied heap allocation.
pub fn is_alloc_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut cur = Some(err);
    while let Some(e) = cur {
        if matches!(e.downcast_ref::<Error>(), Some(Error::AllocFailed { .. })) {
            return true;
        }
        cur = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("wrapped")]
    struct Wrapped(#[source] Error);

    #[test]
    fn test_is_alloc_failure_walks_sources() {
        let direct = Error::AllocFailed { tag: "t", bytes: 1 };
        assert!(is_alloc_failure(&direct));

        let wrapped = Wrapped(Error::AllocFailed { tag: "t", bytes: 1 });
        assert!(is_alloc_failure(&wrapped));

        let other = Error::Reserve {
            tag: "t",
            bytes: 1,
            reason: "x".into(),
        };
        assert!(!is_alloc_failure(&other));
    }

    #[test]
    fn test_boxed_action_error() {
        let boxed: Box<dyn std::error::Error + Send + Sync> =
            Box::new(Error::AllocFailed { tag: "slots", bytes: 64 });
        assert!(is_alloc_failure(boxed.as_ref()));
    }
}
