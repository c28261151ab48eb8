//! Cross-entity consistency checks.
//!
//! These functions are pure: references are resolved against the store
//! first (see `repository::Resource::resolve`) and the checks only compare
//! ids.

use crate::error::{Error, Result};

/// A room together with the building that owns it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoomRef {
    pub id: i64,
    pub building: i64,
}

/// A resident together with the room that owns it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResidentRef {
    pub id: i64,
    pub room: i64,
}

/// References carried by one submitted item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelatedRefs {
    pub building: Option<i64>,
    pub room: Option<RoomRef>,
    pub resident: Option<ResidentRef>,
}

/// Check that every item's references agree with each other.
///
/// # Errors
///
/// Returns `Error::Validation` for the first item where a room does not
/// belong to the named building, or a resident does not live in the named
/// room.
pub fn validate_related_fields(items: &[RelatedRefs]) -> Result<()> {
    items.iter().try_for_each(validate_single_item)
}

fn validate_single_item(item: &RelatedRefs) -> Result<()> {
    if let (Some(room), Some(building)) = (item.room, item.building) {
        if room.building != building {
            return Err(Error::validation(
                "Room must belong to the specified building",
            ));
        }
    }

    if let (Some(resident), Some(room)) = (item.resident, item.room) {
        if resident.room != room.id {
            return Err(Error::validation("Resident must belong to the specified room"));
        }
    }

    Ok(())
}

/// Reject bulk requests larger than `max_size`.
///
/// # Errors
///
/// Returns `Error::BulkOperation` when `items.len() > max_size`.
pub fn validate_bulk_operation<T>(items: &[T], max_size: usize) -> Result<()> {
    if items.len() > max_size {
        return Err(Error::BulkOperation { max: max_size });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(id: i64, building: i64) -> Option<RoomRef> {
        Some(RoomRef { id, building })
    }

    #[test]
    fn test_room_matching_building_passes() {
        let item = RelatedRefs {
            building: Some(1),
            room: room(10, 1),
            resident: None,
        };
        assert!(validate_related_fields(&[item]).is_ok());
    }

    #[test]
    fn test_room_in_other_building_fails() {
        let item = RelatedRefs {
            building: Some(2),
            room: room(10, 1),
            resident: None,
        };
        let err = validate_related_fields(&[item]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("Room must belong to the specified building"));
    }

    #[test]
    fn test_resident_in_other_room_fails() {
        let item = RelatedRefs {
            building: None,
            room: room(10, 1),
            resident: Some(ResidentRef { id: 5, room: 11 }),
        };
        let err = validate_related_fields(&[item]).unwrap_err();
        assert!(err.to_string().contains("Resident must belong to the specified room"));
    }

    #[test]
    fn test_partial_references_are_not_checked() {
        let items = [
            RelatedRefs {
                building: Some(3),
                ..Default::default()
            },
            RelatedRefs {
                room: room(10, 1),
                ..Default::default()
            },
            RelatedRefs::default(),
        ];
        assert!(validate_related_fields(&items).is_ok());
    }

    #[test]
    fn test_any_bad_item_fails_the_list() {
        let items = [
            RelatedRefs {
                building: Some(1),
                room: room(10, 1),
                resident: None,
            },
            RelatedRefs {
                building: Some(1),
                room: room(11, 2),
                resident: None,
            },
        ];
        assert!(validate_related_fields(&items).is_err());
    }

    #[test]
    fn test_bulk_size_ceiling() {
        assert!(validate_bulk_operation(&[1, 2, 3], 3).is_ok());
        let err = validate_bulk_operation(&[1, 2, 3, 4], 3).unwrap_err();
        assert!(matches!(err, Error::BulkOperation { max: 3 }));
        assert!(validate_bulk_operation::<u8>(&[], 0).is_ok());
    }
}
