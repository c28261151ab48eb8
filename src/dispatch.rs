//! Request type dispatch.
//!
//! Requests name the record kind they act on with a `type` string. It is
//! resolved once into an [`EntityType`] and handlers match on the enum.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Record kinds served by the API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityType {
    Building,
    Room,
    Resident,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [EntityType::Building, EntityType::Room, EntityType::Resident];

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Building => "building",
            EntityType::Room => "room",
            EntityType::Resident => "resident",
        }
    }

    /// Capitalized name used in messages ("Room not found").
    pub fn label(&self) -> &'static str {
        match self {
            EntityType::Building => "Building",
            EntityType::Room => "Room",
            EntityType::Resident => "Resident",
        }
    }

    /// Resolve a required `type` value.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidType` when the value is missing or unknown.
    pub fn require(raw: Option<&str>) -> Result<Self> {
        raw.ok_or(Error::InvalidType)?.parse()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "building" => Ok(EntityType::Building),
            "room" => Ok(EntityType::Room),
            "resident" => Ok(EntityType::Resident),
            _ => Err(Error::InvalidType),
        }
    }
}

/// Evaluate `$body` with the type alias `$r` bound to the model of `$kind`.
///
/// ```ignore
/// let value = with_resource!(kind, |R| operations::retrieve_record::<R>(&store, id).await?);
/// ```
macro_rules! with_resource {
    ($kind:expr, |$r:ident| $body:expr) => {
        match $kind {
            $crate::dispatch::EntityType::Building => {
                type $r = $crate::models::Building;
                $body
            }
            $crate::dispatch::EntityType::Room => {
                type $r = $crate::models::Room;
                $body
            }
            $crate::dispatch::EntityType::Resident => {
                type $r = $crate::models::Resident;
                $body
            }
        }
    };
}

pub(crate) use with_resource;

/// Outcome of resolving the list endpoint's optional `type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListTarget {
    /// No type given: merged listing of every kind.
    All,
    /// One known kind.
    Kind(EntityType),
    /// A type was given but is not recognized: empty listing.
    Unknown,
}

impl ListTarget {
    pub fn resolve(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => ListTarget::All,
            Some(value) => value
                .parse()
                .map(ListTarget::Kind)
                .unwrap_or(ListTarget::Unknown),
        }
    }

    /// Name used in audit events.
    pub fn label(&self) -> &'static str {
        match self {
            ListTarget::All => "multiple",
            ListTarget::Kind(kind) => kind.as_str(),
            ListTarget::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Building".parse::<EntityType>().unwrap(), EntityType::Building);
        assert_eq!("ROOM".parse::<EntityType>().unwrap(), EntityType::Room);
        assert_eq!(" resident ".parse::<EntityType>().unwrap(), EntityType::Resident);
    }

    #[test]
    fn test_unknown_type_is_invalid() {
        assert!(matches!("floor".parse::<EntityType>(), Err(Error::InvalidType)));
        assert!(matches!(EntityType::require(None), Err(Error::InvalidType)));
    }

    #[test]
    fn test_round_trip_names() {
        for kind in EntityType::ALL {
            assert_eq!(kind.as_str().parse::<EntityType>().unwrap(), kind);
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }

    #[test]
    fn test_list_target_resolution() {
        assert_eq!(ListTarget::resolve(None), ListTarget::All);
        assert_eq!(ListTarget::resolve(Some("")), ListTarget::All);
        assert_eq!(
            ListTarget::resolve(Some("room")),
            ListTarget::Kind(EntityType::Room)
        );
        assert_eq!(ListTarget::resolve(Some("invalid")), ListTarget::Unknown);
    }
}
