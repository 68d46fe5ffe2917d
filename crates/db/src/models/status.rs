//! Status helper enums mapping to SMALLINT status columns.
//!
//! Each enum variant's discriminant matches the 1-based lifecycle order
//! recorded in the corresponding `status_id` column.

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

            /// Map a database status ID back to the enum.
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
    /// Project lifecycle status.
    ProjectStatus {
        Draft = 1,
        Processing = 2,
        Completed = 3,
        Failed = 4,
    }
}

define_status_enum! {
    /// Remote task execution status.
    TaskStatus {
        Pending = 1,
        Queued = 2,
        Running = 3,
        Succeeded = 4,
        Failed = 5,
    }
}

impl ProjectStatus {
    /// Stable lowercase name used in API responses.
    pub fn name(self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Processing => "processing",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Failed => "failed",
        }
    }
}

impl TaskStatus {
    /// Stable lowercase name used in API responses.
    pub fn name(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        }
    }

    /// Terminal statuses are final; only usage enrichment may follow.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_status_ids_match_lifecycle_order() {
        assert_eq!(ProjectStatus::Draft.id(), 1);
        assert_eq!(ProjectStatus::Processing.id(), 2);
        assert_eq!(ProjectStatus::Completed.id(), 3);
        assert_eq!(ProjectStatus::Failed.id(), 4);
    }

    #[test]
    fn task_status_ids_match_lifecycle_order() {
        assert_eq!(TaskStatus::Pending.id(), 1);
        assert_eq!(TaskStatus::Queued.id(), 2);
        assert_eq!(TaskStatus::Running.id(), 3);
        assert_eq!(TaskStatus::Succeeded.id(), 4);
        assert_eq!(TaskStatus::Failed.id(), 5);
    }

    #[test]
    fn from_id_round_trips() {
        assert_eq!(TaskStatus::from_id(3), Some(TaskStatus::Running));
        assert_eq!(TaskStatus::from_id(99), None);
        let id: StatusId = ProjectStatus::Completed.into();
        assert_eq!(ProjectStatus::from_id(id), Some(ProjectStatus::Completed));
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }
}
