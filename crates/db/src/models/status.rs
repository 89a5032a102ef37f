//! Status helper enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` table.

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
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

            /// Lower-case name as seeded in the lookup table.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $label ),+
                }
            }

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
    /// Progress of a background task attached to a job application
    /// (resume generation, automated submission).
    ProcessingStatus {
        Pending = 1 => "pending",
        Processing = 2 => "processing",
        Completed = 3 => "completed",
        Failed = 4 => "failed",
    }
}

define_status_enum! {
    /// Where the user is in the hiring pipeline for an application.
    ApplicationStatus {
        Draft = 1 => "draft",
        Applied = 2 => "applied",
        Interviewing = 3 => "interviewing",
        Offer = 4 => "offer",
        Rejected = 5 => "rejected",
    }
}
