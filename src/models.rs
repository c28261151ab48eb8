//! Record kinds stored by the API.
//!
//! Foreign keys are exposed under the relation name (`building`, `room`) and
//! carry the owner's id, matching the JSON representation clients send back.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, FromRow)]
pub struct Building {
    pub id: i64,
    pub name: String,
    pub address: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, FromRow)]
pub struct Room {
    pub id: i64,
    pub number: String,
    #[sqlx(rename = "building_id")]
    pub building: i64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, FromRow)]
pub struct Resident {
    pub id: i64,
    pub name: String,
    #[sqlx(rename = "room_id")]
    pub room: i64,
    pub date_of_birth: NaiveDate,
}

/// Any record, used by the merged multi-type listing.
#[derive(Clone, Serialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum Record {
    Building(Building),
    Room(Room),
    Resident(Resident),
}

impl From<Building> for Record {
    fn from(b: Building) -> Self {
        Record::Building(b)
    }
}

impl From<Room> for Record {
    fn from(r: Room) -> Self {
        Record::Room(r)
    }
}

impl From<Resident> for Record {
    fn from(r: Resident) -> Self {
        Record::Resident(r)
    }
}
