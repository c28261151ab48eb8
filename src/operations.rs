//! Record operations shared by every kind.
//!
//! Each function is generic over [`Resource`] and owns its transaction:
//! either every row it touches is written or none is.

use crate::error::{Error, Result};
use crate::models::{Building, Record, Resident, Room};
use crate::pagination::{PageRequest, PageWindow};
use crate::payload::{entry_id, FieldErrors, Mode, Payload};
use crate::repository::{self, ListQuery, Resource, Store};
use crate::validators::{validate_bulk_operation, validate_related_fields};
use serde_json::{json, Value};

/// One resolved page of records.
#[derive(Clone, Debug)]
pub struct Listing<T> {
    pub window: PageWindow,
    pub count: u64,
    pub results: Vec<T>,
}

fn not_found<R: Resource>() -> Error {
    Error::NotFound(format!("{} not found", R::KIND.label()))
}

/// Create every item or none.
///
/// Items are parsed and checked first; if any fails, the error detail is a
/// list with one field map per submitted item (empty for valid ones).
///
/// # Errors
///
/// - `Error::BulkOperation` when `items` exceeds `max_bulk_size`
/// - `Error::Validation` for payload, reference or consistency failures
pub async fn create_records<R: Resource>(
    store: &Store,
    items: &[Value],
    max_bulk_size: usize,
) -> Result<Vec<R>> {
    validate_bulk_operation(items, max_bulk_size)?;

    let mut tx = store.pool().begin().await?;
    let mut inputs = Vec::with_capacity(items.len());
    let mut refs = Vec::with_capacity(items.len());
    let mut item_errors: Vec<FieldErrors> = Vec::with_capacity(items.len());
    let mut failed = false;

    for item in items {
        let input = match R::Input::from_json(item, Mode::Create) {
            Ok(input) => input,
            Err(errors) => {
                failed = true;
                item_errors.push(errors);
                continue;
            }
        };
        match R::resolve(&mut *tx, &input, None).await? {
            Ok(resolved) => {
                refs.push(resolved);
                inputs.push(input);
                item_errors.push(FieldErrors::new());
            }
            Err(errors) => {
                failed = true;
                item_errors.push(errors);
            }
        }
    }

    if failed {
        return Err(Error::Validation(json!(item_errors)));
    }
    validate_related_fields(&refs)?;

    let mut created = Vec::with_capacity(inputs.len());
    for input in &inputs {
        created.push(R::insert(&mut *tx, input).await?);
    }
    tx.commit().await?;

    debug!("Created {} {} record(s)", created.len(), R::KIND);
    Ok(created)
}

/// Partially update one record.
///
/// # Errors
///
/// - `Error::NotFound` when no record has `id`
/// - `Error::Validation` with a field map on invalid data
pub async fn update_record<R: Resource>(store: &Store, id: i64, item: &Value) -> Result<R> {
    let mut tx = store.pool().begin().await?;
    let updated = apply_update::<R>(&mut *tx, id, item, not_found::<R>).await?;
    tx.commit().await?;
    Ok(updated)
}

/// Partially update many records, each entry naming its own `id`.
///
/// The size ceiling is checked before anything is read. Entries are applied
/// in order inside one transaction; the first failure rolls back all of them.
///
/// # Errors
///
/// - `Error::BulkOperation` when `items` exceeds `max_bulk_size`
/// - `Error::NotFound` when an entry has no `id` or names a missing record
/// - `Error::Validation` when an entry carries invalid data
pub async fn bulk_update<R: Resource>(
    store: &Store,
    items: &[Value],
    max_bulk_size: usize,
) -> Result<Vec<R>> {
    validate_bulk_operation(items, max_bulk_size)?;

    let missing = || Error::NotFound(format!("{} not found or invalid data", R::KIND.label()));

    let mut tx = store.pool().begin().await?;
    let mut updated = Vec::with_capacity(items.len());
    for item in items {
        let id = entry_id(item).ok_or_else(missing)?;
        updated.push(apply_update::<R>(&mut *tx, id, item, missing).await?);
    }
    tx.commit().await?;

    debug!("Bulk updated {} {} record(s)", updated.len(), R::KIND);
    Ok(updated)
}

async fn apply_update<R: Resource>(
    conn: &mut sqlx::SqliteConnection,
    id: i64,
    item: &Value,
    missing: impl Fn() -> Error,
) -> Result<R> {
    let current = repository::fetch_by_id::<R>(conn, id)
        .await?
        .ok_or_else(missing)?;
    let input =
        R::Input::from_json(item, Mode::Update).map_err(|errors| Error::Validation(json!(errors)))?;
    let refs = R::resolve(conn, &input, Some(&current))
        .await?
        .map_err(|errors| Error::Validation(json!(errors)))?;
    validate_related_fields(&[refs])?;
    R::update(conn, &current, &input).await
}

/// Fetch one record.
///
/// # Errors
///
/// Returns `Error::NotFound` when no record has `id`.
pub async fn retrieve_record<R: Resource>(store: &Store, id: i64) -> Result<R> {
    let mut conn = store.pool().acquire().await?;
    repository::fetch_by_id::<R>(&mut *conn, id)
        .await?
        .ok_or_else(not_found::<R>)
}

/// Delete one record and its dependents.
///
/// # Errors
///
/// Returns `Error::NotFound` when no record has `id`.
pub async fn delete_record<R: Resource>(store: &Store, id: i64) -> Result<()> {
    let mut tx = store.pool().begin().await?;
    if !repository::delete::<R>(&mut *tx, id).await? {
        return Err(not_found::<R>());
    }
    tx.commit().await?;
    Ok(())
}

/// One page of a single kind, filtered, searched and ordered.
///
/// # Errors
///
/// Returns `Error::NotFound` when the requested page is out of range.
pub async fn list_page<R: Resource>(
    store: &Store,
    query: &ListQuery,
    page: &PageRequest,
) -> Result<Listing<R>> {
    let mut conn = store.pool().acquire().await?;
    let count = repository::count::<R>(&mut *conn, query).await?;
    let window = page.window(count)?;
    let results = repository::fetch_page::<R>(&mut *conn, query, window.limit(), window.offset())
        .await?;
    Ok(Listing {
        window,
        count,
        results,
    })
}

/// One page of every building, then every room, then every resident.
///
/// The three reads share one transaction so the listing is a consistent
/// snapshot.
pub async fn list_all(store: &Store, page: &PageRequest) -> Result<Listing<Record>> {
    let mut tx = store.pool().begin().await?;
    let mut records: Vec<Record> = Vec::new();
    records.extend(
        repository::fetch_all::<Building>(&mut *tx)
            .await?
            .into_iter()
            .map(Record::from),
    );
    records.extend(
        repository::fetch_all::<Room>(&mut *tx)
            .await?
            .into_iter()
            .map(Record::from),
    );
    records.extend(
        repository::fetch_all::<Resident>(&mut *tx)
            .await?
            .into_iter()
            .map(Record::from),
    );
    tx.commit().await?;

    let count = records.len() as u64;
    let window = page.window(count)?;
    Ok(Listing {
        window,
        count,
        results: window.slice(records),
    })
}
