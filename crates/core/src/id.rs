//! Unique identifiers for LMS entities.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Ulid);

        impl $name {
            #[doc = concat!("Generate a new ", stringify!($name))]
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

define_id!(
    /// Unique identifier for a student (the user consuming lessons)
    StudentId
);

define_id!(
    /// Unique identifier for a Course
    CourseId
);

define_id!(
    /// Unique identifier for a Section
    SectionId
);

define_id!(
    /// Unique identifier for a Lesson
    LessonId
);

define_id!(
    /// Unique identifier for an Enrollment
    EnrollmentId
);

define_id!(
    /// Unique identifier for a LessonProgress record
    ProgressId
);

define_id!(
    /// Unique identifier for a Certificate
    CertificateId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_parses_its_display_form() {
        let id = LessonId::new();
        let parsed: LessonId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_id_rejects_garbage() {
        assert!("not-a-ulid".parse::<CourseId>().is_err());
    }
}
