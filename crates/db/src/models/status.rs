//! Status helper enums mapping to SMALLINT columns.
//!
//! Each enum variant's discriminant matches the values documented in the
//! initial migration. No magic numbers appear in repository SQL; every
//! status literal goes through these enums.

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Parse a database status ID back into the enum.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Overall status of a generation request across both pipeline stages.
    RequestStatus {
        ImagePending = 1,
        ImageGenerating = 2,
        AwaitingSelection = 3,
        ModelPending = 4,
        ModelGenerating = 5,
        Completed = 6,
        Failed = 7,
        Cancelled = 8,
    }
}

define_status_enum! {
    /// Coarse pipeline stage of a generation request. Transitions are
    /// monotonic: ImageGeneration → AwaitingSelection → ModelGeneration →
    /// Completed, never backwards.
    RequestPhase {
        ImageGeneration = 1,
        AwaitingSelection = 2,
        ModelGeneration = 3,
        Completed = 4,
    }
}

define_status_enum! {
    /// Lifecycle of a single candidate image.
    ImageStatus {
        Pending = 1,
        Generating = 2,
        Completed = 3,
        Failed = 4,
    }
}

define_status_enum! {
    /// Queue-tracking job state machine (spec: PENDING → RUNNING →
    /// {COMPLETED | RETRYING | FAILED | TIMEOUT}; RETRYING → RUNNING).
    JobStatus {
        Pending = 1,
        Running = 2,
        Retrying = 3,
        Completed = 4,
        Failed = 5,
        Cancelled = 6,
        Timeout = 7,
    }
}

define_status_enum! {
    /// Which pipeline stage a generation_jobs row belongs to.
    JobKind {
        Image = 1,
        Model = 2,
    }
}

define_status_enum! {
    /// Who may see a finished model.
    ModelVisibility {
        Private = 1,
        Public = 2,
    }
}

define_status_enum! {
    /// Slicing state of a finished model.
    SliceStatus {
        NotSliced = 1,
        Slicing = 2,
        Sliced = 3,
        SliceFailed = 4,
    }
}

define_status_enum! {
    /// Cleanup state of an orphaned storage object.
    OrphanStatus {
        Pending = 1,
        Deleted = 2,
    }
}

impl JobStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Timeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Retrying,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
            JobStatus::Timeout,
        ] {
            assert_eq!(JobStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(JobStatus::from_id(42), None);
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Timeout.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Retrying.is_terminal());
    }
}
