//! Fan-in derivation for the image generation stage.
//!
//! A generation request fans out N independent image jobs; the pipeline may
//! only advance to image selection once every sibling has completed. Sibling
//! completions interleave arbitrarily across workers, so the caller must
//! re-query the current sibling states and reduce them here rather than
//! trusting an in-memory count.

/// True when every sibling image has completed.
///
/// `completed_flags` carries one entry per sibling image, `true` when that
/// image has reached its completed state. An empty set never counts as
/// complete: a request with no images has nothing to select from.
pub fn all_images_completed(completed_flags: &[bool]) -> bool {
    !completed_flags.is_empty() && completed_flags.iter().all(|c| *c)
}

/// How many siblings have completed, for progress reporting.
pub fn completed_count(completed_flags: &[bool]) -> usize {
    completed_flags.iter().filter(|c| **c).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_is_not_complete() {
        assert!(!all_images_completed(&[]));
    }

    #[test]
    fn partial_completion_is_not_complete() {
        assert!(!all_images_completed(&[true, false]));
        assert!(!all_images_completed(&[false, true, true, true]));
    }

    #[test]
    fn all_completed_is_complete() {
        assert!(all_images_completed(&[true]));
        assert!(all_images_completed(&[true, true, true, true]));
    }

    #[test]
    fn counts_completed_siblings() {
        assert_eq!(completed_count(&[true, false, true]), 2);
        assert_eq!(completed_count(&[]), 0);
    }
}
