//! Key layout for a named queue.
//!
//! All keys for one queue share a `{mq:<name>}` hash tag so they land on the
//! same node under cluster mode, keeping the move operations between lists
//! single-node.

/// Builds the keys for one named queue.
#[derive(Debug, Clone)]
pub struct QueueKeys {
    prefix: String,
}

impl QueueKeys {
    pub fn new(name: &str) -> Self {
        Self {
            prefix: format!("{{mq:{name}}}"),
        }
    }

    /// Jobs ready for immediate pickup. Producers LPUSH, the runner takes
    /// from the opposite end for FIFO order.
    pub fn ready(&self) -> String {
        format!("{}:ready", self.prefix)
    }

    /// Jobs scheduled for later, scored by due time in epoch millis.
    pub fn delayed(&self) -> String {
        format!("{}:delayed", self.prefix)
    }

    /// Jobs currently held by a runner. Drained back to ready on startup
    /// so a crash mid-job re-delivers instead of losing work.
    pub fn active(&self) -> String {
        format!("{}:active", self.prefix)
    }

    /// Capped history of completed deliveries.
    pub fn completed(&self) -> String {
        format!("{}:completed", self.prefix)
    }

    /// Capped history of deliveries that exhausted their attempts.
    pub fn failed(&self) -> String {
        format!("{}:failed", self.prefix)
    }

    /// Fixed-window rate limit counter for the given window index.
    pub fn rate_window(&self, window_index: i64) -> String {
        format!("{}:rate:{window_index}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_keys_share_one_hash_tag() {
        let keys = QueueKeys::new("image-generation");
        for key in [
            keys.ready(),
            keys.delayed(),
            keys.active(),
            keys.completed(),
            keys.failed(),
            keys.rate_window(12345),
        ] {
            assert!(
                key.starts_with("{mq:image-generation}:"),
                "unexpected key {key}"
            );
        }
    }
}
