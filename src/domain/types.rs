//! Identifier newtypes and ordering enumerations shared across layers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use plaza_api_types::{PostOrder, VoteDirection};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                value.parse().map($name)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                $name(value)
            }
        }
    };
}

id_type!(
    /// Time-sortable post identifier.
    PostId
);
id_type!(UserId);
id_type!(CommunityId);
id_type!(
    /// Time-sortable comment identifier, drawn from the same generator as posts.
    CommentId
);
