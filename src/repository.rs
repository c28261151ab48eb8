//! Relational store for buildings, rooms and residents.
//!
//! [`Store`] owns the SQLite pool and the schema migration. The [`Resource`]
//! trait describes one record kind (table, columns, searchable and orderable
//! fields, how to insert and update it) so listing, lookup and deletion are
//! written once and shared by every kind.
//!
//! Query functions take a `&mut SqliteConnection` so callers decide whether
//! they run on a pooled connection or inside a transaction.
//!
//! # Invariants
//! - Foreign keys are enforced on every connection; deleting a building
//!   removes its rooms, deleting a room removes its residents.
//! - `(number, building)` is unique for rooms.
//! - Listing order is deterministic: requested or default ordering, then `id`.

use crate::dispatch::EntityType;
use crate::error::{Error, Result};
use crate::models::{Building, Resident, Room};
use crate::payload::{
    field_error, BuildingInput, FieldErrors, Payload, ResidentInput, RoomInput, NON_FIELD_ERRORS,
};
use crate::validators::{RelatedRefs, RoomRef};
use serde::Serialize;
use serde_json::json;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, QueryBuilder, SqliteConnection};
use std::str::FromStr;

const UNIQUE_ROOM: &str = "The fields number, building must make a unique set.";

/// Outcome of reference resolution: resolved refs, or field errors to report.
pub type Resolution = std::result::Result<RelatedRefs, FieldErrors>;

/// Handle to the relational store.
///
/// Cloning is cheap; the pool is reference-counted internally.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database at `url`.
    ///
    /// In-memory databases are pinned to a single long-lived connection so
    /// every query sees the same data.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the URL is invalid or the database cannot
    /// be opened.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { max_connections.max(1) })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        debug!("✓ Store connected to {}", url);
        Ok(Store { pool })
    }

    /// Apply embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns `Error::Migration` if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("✓ Store migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Health check - verify the database answers.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

/// Filtering, search and ordering for a listing.
#[derive(Clone, Debug, Default)]
pub struct ListQuery {
    /// Whitespace-separated terms; every term must match some search field.
    pub search: Option<String>,
    /// Comma-separated public field names, `-` prefix for descending.
    pub ordering: Option<String>,
    /// Exact-match filters by public field name.
    pub filters: Vec<(String, String)>,
}

/// One record kind in the store.
#[allow(async_fn_in_trait)]
pub trait Resource: Serialize + for<'r> FromRow<'r, SqliteRow> + Send + Unpin + Sized {
    const KIND: EntityType;
    const TABLE: &'static str;
    /// Select list producing the struct's columns.
    const COLUMNS: &'static str;
    /// Public field name → column, for ordering and filters.
    const FIELDS: &'static [(&'static str, &'static str)];
    /// Public fields usable as `?field=` filters.
    const FILTER_FIELDS: &'static [&'static str];
    /// Columns matched by `search`.
    const SEARCH_FIELDS: &'static [&'static str];
    /// Columns ordered by when no valid ordering is requested.
    const DEFAULT_ORDERING: &'static [&'static str];

    type Input: Payload;

    /// Check that referenced records exist and uniqueness holds, and return
    /// the resolved references for the cross-entity validators.
    ///
    /// `current` is the stored record when updating.
    async fn resolve(
        conn: &mut SqliteConnection,
        input: &Self::Input,
        current: Option<&Self>,
    ) -> Result<Resolution>;

    /// Insert a fully specified input.
    async fn insert(conn: &mut SqliteConnection, input: &Self::Input) -> Result<Self>;

    /// Apply the fields present in `input` to `current`.
    async fn update(conn: &mut SqliteConnection, current: &Self, input: &Self::Input)
        -> Result<Self>;
}

// ============================================================================
// Generic queries
// ============================================================================

fn column_for<R: Resource>(field: &str) -> Option<&'static str> {
    R::FIELDS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, column)| *column)
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn push_where<R: Resource>(qb: &mut QueryBuilder<'_, Sqlite>, query: &ListQuery) {
    qb.push(" WHERE 1 = 1");

    for (field, raw) in &query.filters {
        if !R::FILTER_FIELDS.contains(&field.as_str()) {
            continue;
        }
        let Some(column) = column_for::<R>(field) else {
            continue;
        };
        match raw.trim().parse::<i64>() {
            Ok(value) => {
                qb.push(" AND ").push(column).push(" = ").push_bind(value);
            }
            // A non-integer id can never match.
            Err(_) => {
                qb.push(" AND 0 = 1");
            }
        }
    }

    if let Some(search) = query.search.as_deref() {
        for term in search.split(|c: char| c.is_whitespace() || c == ',') {
            if term.is_empty() {
                continue;
            }
            let pattern = format!("%{}%", escape_like(term));
            qb.push(" AND (");
            for (i, column) in R::SEARCH_FIELDS.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push(*column)
                    .push(" LIKE ")
                    .push_bind(pattern.clone())
                    .push(" ESCAPE '\\'");
            }
            qb.push(")");
        }
    }
}

fn order_clause<R: Resource>(ordering: Option<&str>) -> String {
    let mut terms: Vec<String> = ordering
        .unwrap_or_default()
        .split(',')
        .filter_map(|term| {
            let term = term.trim();
            let (descending, field) = match term.strip_prefix('-') {
                Some(field) => (true, field),
                None => (false, term),
            };
            column_for::<R>(field)
                .map(|column| format!("{} {}", column, if descending { "DESC" } else { "ASC" }))
        })
        .collect();

    if terms.is_empty() {
        terms = R::DEFAULT_ORDERING
            .iter()
            .map(|column| format!("{} ASC", column))
            .collect();
    }
    terms.push("id ASC".to_string());

    format!(" ORDER BY {}", terms.join(", "))
}

/// Number of records matching `query`.
pub async fn count<R: Resource>(conn: &mut SqliteConnection, query: &ListQuery) -> Result<u64> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {}", R::TABLE));
    push_where::<R>(&mut qb, query);
    let total: i64 = qb.build_query_scalar().fetch_one(&mut *conn).await?;
    Ok(total.max(0) as u64)
}

/// One window of records matching `query`.
pub async fn fetch_page<R: Resource>(
    conn: &mut SqliteConnection,
    query: &ListQuery,
    limit: u64,
    offset: u64,
) -> Result<Vec<R>> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM {}", R::COLUMNS, R::TABLE));
    push_where::<R>(&mut qb, query);
    qb.push(order_clause::<R>(query.ordering.as_deref()));
    qb.push(" LIMIT ")
        .push_bind(limit as i64)
        .push(" OFFSET ")
        .push_bind(offset as i64);

    let rows = qb.build_query_as::<R>().fetch_all(&mut *conn).await?;
    Ok(rows)
}

/// Every record of a kind in default order.
pub async fn fetch_all<R: Resource>(conn: &mut SqliteConnection) -> Result<Vec<R>> {
    let sql = format!(
        "SELECT {} FROM {}{}",
        R::COLUMNS,
        R::TABLE,
        order_clause::<R>(None)
    );
    let rows = sqlx::query_as::<_, R>(&sql).fetch_all(&mut *conn).await?;
    Ok(rows)
}

pub async fn fetch_by_id<R: Resource>(conn: &mut SqliteConnection, id: i64) -> Result<Option<R>> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?", R::COLUMNS, R::TABLE);
    let row = sqlx::query_as::<_, R>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// Delete one record; dependents go with it. Returns whether it existed.
pub async fn delete<R: Resource>(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    let sql = format!("DELETE FROM {} WHERE id = ?", R::TABLE);
    let done = sqlx::query(&sql).bind(id).execute(&mut *conn).await?;
    Ok(done.rows_affected() > 0)
}

async fn exists(conn: &mut SqliteConnection, table: &str, id: i64) -> Result<bool> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?", table);
    let found: i64 = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(found > 0)
}

fn invalid_pk(id: i64) -> String {
    format!("Invalid pk \"{}\" - object does not exist.", id)
}

fn required<'a, T>(value: &'a Option<T>, field: &str) -> Result<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| Error::Validation(json!(field_error(field, "This field is required."))))
}

fn map_unique_room(e: sqlx::Error) -> Error {
    let unique = e
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
    if unique {
        Error::Validation(json!(field_error(NON_FIELD_ERRORS, UNIQUE_ROOM)))
    } else {
        Error::Database(e)
    }
}

// ============================================================================
// Record kinds
// ============================================================================

impl Resource for Building {
    const KIND: EntityType = EntityType::Building;
    const TABLE: &'static str = "buildings";
    const COLUMNS: &'static str = "id, name, address";
    const FIELDS: &'static [(&'static str, &'static str)] =
        &[("id", "id"), ("name", "name"), ("address", "address")];
    const FILTER_FIELDS: &'static [&'static str] = &["id"];
    const SEARCH_FIELDS: &'static [&'static str] = &["name", "address"];
    const DEFAULT_ORDERING: &'static [&'static str] = &["name"];

    type Input = BuildingInput;

    async fn resolve(
        _conn: &mut SqliteConnection,
        _input: &BuildingInput,
        _current: Option<&Self>,
    ) -> Result<Resolution> {
        Ok(Ok(RelatedRefs::default()))
    }

    async fn insert(conn: &mut SqliteConnection, input: &BuildingInput) -> Result<Self> {
        let name = required(&input.name, "name")?;
        let address = required(&input.address, "address")?;

        let building = sqlx::query_as::<_, Building>(
            "INSERT INTO buildings (name, address) VALUES (?, ?) RETURNING id, name, address",
        )
        .bind(name.as_str())
        .bind(address.as_str())
        .fetch_one(&mut *conn)
        .await?;
        Ok(building)
    }

    async fn update(
        conn: &mut SqliteConnection,
        current: &Self,
        input: &BuildingInput,
    ) -> Result<Self> {
        let name = input.name.as_ref().unwrap_or(&current.name);
        let address = input.address.as_ref().unwrap_or(&current.address);

        let building = sqlx::query_as::<_, Building>(
            "UPDATE buildings SET name = ?, address = ? WHERE id = ? RETURNING id, name, address",
        )
        .bind(name.as_str())
        .bind(address.as_str())
        .bind(current.id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(building)
    }
}

impl Resource for Room {
    const KIND: EntityType = EntityType::Room;
    const TABLE: &'static str = "rooms";
    const COLUMNS: &'static str = "id, number, building_id";
    const FIELDS: &'static [(&'static str, &'static str)] =
        &[("id", "id"), ("number", "number"), ("building", "building_id")];
    const FILTER_FIELDS: &'static [&'static str] = &["id", "building"];
    const SEARCH_FIELDS: &'static [&'static str] = &["number"];
    const DEFAULT_ORDERING: &'static [&'static str] = &["building_id", "number"];

    type Input = RoomInput;

    async fn resolve(
        conn: &mut SqliteConnection,
        input: &RoomInput,
        current: Option<&Self>,
    ) -> Result<Resolution> {
        let mut errors = FieldErrors::new();

        if let Some(building) = input.building {
            if !exists(conn, Building::TABLE, building).await? {
                errors.extend(field_error("building", invalid_pk(building)));
            }
        }

        let building = input.building.or(current.map(|room| room.building));
        let number = input.number.as_ref().or(current.map(|room| &room.number));

        if errors.is_empty() {
            if let (Some(number), Some(building)) = (number, building) {
                // Ids are positive, so -1 excludes nothing on insert.
                let exclude = current.map_or(-1, |room| room.id);
                let taken: Option<i64> = sqlx::query_scalar(
                    "SELECT id FROM rooms WHERE number = ? AND building_id = ? AND id != ?",
                )
                .bind(number.as_str())
                .bind(building)
                .bind(exclude)
                .fetch_optional(&mut *conn)
                .await?;
                if taken.is_some() {
                    errors.extend(field_error(NON_FIELD_ERRORS, UNIQUE_ROOM));
                }
            }
        }

        if !errors.is_empty() {
            return Ok(Err(errors));
        }
        Ok(Ok(RelatedRefs {
            building,
            ..Default::default()
        }))
    }

    async fn insert(conn: &mut SqliteConnection, input: &RoomInput) -> Result<Self> {
        let number = required(&input.number, "number")?;
        let building = required(&input.building, "building")?;

        sqlx::query_as::<_, Room>(
            "INSERT INTO rooms (number, building_id) VALUES (?, ?) RETURNING id, number, building_id",
        )
        .bind(number.as_str())
        .bind(*building)
        .fetch_one(&mut *conn)
        .await
        .map_err(map_unique_room)
    }

    async fn update(conn: &mut SqliteConnection, current: &Self, input: &RoomInput) -> Result<Self> {
        let number = input.number.as_ref().unwrap_or(&current.number);
        let building = input.building.unwrap_or(current.building);

        sqlx::query_as::<_, Room>(
            "UPDATE rooms SET number = ?, building_id = ? WHERE id = ? RETURNING id, number, building_id",
        )
        .bind(number.as_str())
        .bind(building)
        .bind(current.id)
        .fetch_one(&mut *conn)
        .await
        .map_err(map_unique_room)
    }
}

impl Resource for Resident {
    const KIND: EntityType = EntityType::Resident;
    const TABLE: &'static str = "residents";
    const COLUMNS: &'static str = "id, name, room_id, date_of_birth";
    const FIELDS: &'static [(&'static str, &'static str)] = &[
        ("id", "id"),
        ("name", "name"),
        ("room", "room_id"),
        ("date_of_birth", "date_of_birth"),
    ];
    const FILTER_FIELDS: &'static [&'static str] = &["id", "room"];
    const SEARCH_FIELDS: &'static [&'static str] = &["name"];
    const DEFAULT_ORDERING: &'static [&'static str] = &["name"];

    type Input = ResidentInput;

    async fn resolve(
        conn: &mut SqliteConnection,
        input: &ResidentInput,
        current: Option<&Self>,
    ) -> Result<Resolution> {
        let mut errors = FieldErrors::new();
        let mut refs = RelatedRefs::default();

        let room = match input.room.or(current.map(|resident| resident.room)) {
            Some(id) => fetch_by_id::<Room>(conn, id).await?,
            None => None,
        };
        if let (Some(id), None) = (input.room, &room) {
            errors.extend(field_error("room", invalid_pk(id)));
        }
        refs.room = room.map(|room| RoomRef {
            id: room.id,
            building: room.building,
        });

        if let Some(building) = input.building {
            if exists(conn, Building::TABLE, building).await? {
                refs.building = Some(building);
            } else {
                errors.extend(field_error("building", invalid_pk(building)));
            }
        }

        if !errors.is_empty() {
            return Ok(Err(errors));
        }
        Ok(Ok(refs))
    }

    async fn insert(conn: &mut SqliteConnection, input: &ResidentInput) -> Result<Self> {
        let name = required(&input.name, "name")?;
        let room = required(&input.room, "room")?;
        let date_of_birth = required(&input.date_of_birth, "date_of_birth")?;

        let resident = sqlx::query_as::<_, Resident>(
            "INSERT INTO residents (name, room_id, date_of_birth) VALUES (?, ?, ?) \
             RETURNING id, name, room_id, date_of_birth",
        )
        .bind(name.as_str())
        .bind(*room)
        .bind(*date_of_birth)
        .fetch_one(&mut *conn)
        .await?;
        Ok(resident)
    }

    async fn update(
        conn: &mut SqliteConnection,
        current: &Self,
        input: &ResidentInput,
    ) -> Result<Self> {
        let name = input.name.as_ref().unwrap_or(&current.name);
        let room = input.room.unwrap_or(current.room);
        let date_of_birth = input.date_of_birth.unwrap_or(current.date_of_birth);

        let resident = sqlx::query_as::<_, Resident>(
            "UPDATE residents SET name = ?, room_id = ?, date_of_birth = ? WHERE id = ? \
             RETURNING id, name, room_id, date_of_birth",
        )
        .bind(name.as_str())
        .bind(room)
        .bind(date_of_birth)
        .bind(current.id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(resident)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    async fn memory_store() -> Store {
        let store = Store::connect("sqlite::memory:", 1)
            .await
            .expect("Failed to open store");
        store.migrate().await.expect("Failed to migrate");
        store
    }

    async fn seed(conn: &mut SqliteConnection) -> (Building, Room, Resident) {
        let building = Building::insert(
            conn,
            &BuildingInput {
                name: Some("Test Building".into()),
                address: Some("123 Test St".into()),
            },
        )
        .await
        .expect("Failed to insert building");
        let room = Room::insert(
            conn,
            &RoomInput {
                number: Some("101".into()),
                building: Some(building.id),
            },
        )
        .await
        .expect("Failed to insert room");
        let resident = Resident::insert(
            conn,
            &ResidentInput {
                name: Some("John Doe".into()),
                room: Some(room.id),
                date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1),
                building: None,
            },
        )
        .await
        .expect("Failed to insert resident");
        (building, room, resident)
    }

    #[test]
    fn test_order_clause_whitelists_fields() {
        assert_eq!(
            order_clause::<Building>(Some("-name,bogus")),
            " ORDER BY name DESC, id ASC"
        );
        assert_eq!(
            order_clause::<Room>(Some("drop table")),
            " ORDER BY building_id ASC, number ASC, id ASC"
        );
        assert_eq!(
            order_clause::<Resident>(Some("room")),
            " ORDER BY room_id ASC, id ASC"
        );
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[tokio::test]
    async fn test_cascade_delete() {
        let store = memory_store().await;
        let mut conn = store.pool().acquire().await.unwrap();
        let (building, room, resident) = seed(&mut conn).await;

        assert!(delete::<Building>(&mut conn, building.id).await.unwrap());

        assert!(fetch_by_id::<Room>(&mut conn, room.id).await.unwrap().is_none());
        assert!(fetch_by_id::<Resident>(&mut conn, resident.id)
            .await
            .unwrap()
            .is_none());
        assert!(!delete::<Building>(&mut conn, building.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unique_room_per_building() {
        let store = memory_store().await;
        let mut conn = store.pool().acquire().await.unwrap();
        let (building, _, _) = seed(&mut conn).await;

        let duplicate = RoomInput {
            number: Some("101".into()),
            building: Some(building.id),
        };
        let resolution = Room::resolve(&mut conn, &duplicate, None).await.unwrap();
        assert_eq!(resolution.unwrap_err()[NON_FIELD_ERRORS], vec![UNIQUE_ROOM.to_string()]);

        let err = Room::insert(&mut conn, &duplicate).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_resolve_reports_missing_references() {
        let store = memory_store().await;
        let mut conn = store.pool().acquire().await.unwrap();

        let input = ResidentInput {
            name: Some("Ghost".into()),
            room: Some(99),
            date_of_birth: NaiveDate::from_ymd_opt(2000, 1, 1),
            building: Some(42),
        };
        let errors = Resident::resolve(&mut conn, &input, None)
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(errors["room"], vec![invalid_pk(99)]);
        assert_eq!(errors["building"], vec![invalid_pk(42)]);
    }

    #[tokio::test]
    async fn test_list_search_filter_and_paging() {
        let store = memory_store().await;
        let mut conn = store.pool().acquire().await.unwrap();
        for (name, address) in [("Oak", "1 Elm St"), ("Pine", "2 Oak Ave"), ("Birch", "3 Ash Rd")] {
            Building::insert(
                &mut conn,
                &BuildingInput {
                    name: Some(name.into()),
                    address: Some(address.into()),
                },
            )
            .await
            .unwrap();
        }

        let query = ListQuery {
            search: Some("oak".into()),
            ..Default::default()
        };
        assert_eq!(count::<Building>(&mut conn, &query).await.unwrap(), 2);
        let names: Vec<String> = fetch_page::<Building>(&mut conn, &query, 10, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["Oak", "Pine"]);

        let all = ListQuery::default();
        let page = fetch_page::<Building>(&mut conn, &all, 1, 1).await.unwrap();
        assert_eq!(page[0].name, "Oak");

        let bad_filter = ListQuery {
            filters: vec![("id".into(), "abc".into())],
            ..Default::default()
        };
        assert_eq!(count::<Building>(&mut conn, &bad_filter).await.unwrap(), 0);
    }
}
