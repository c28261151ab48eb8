//! HTTP handlers.
//!
//! One generic set of endpoints serves every record kind; the kind comes
//! from the `type` query parameter (reads, deletes) or body field (writes).
//! GET responses are served from and stored into the response cache; every
//! successful write clears it.

use crate::auth::Caller;
use crate::dispatch::{with_resource, EntityType, ListTarget};
use crate::error::{ApiError, Error, Result};
use crate::key::CacheKeyBuilder;
use crate::operations;
use crate::pagination::{Page, PageLinks, PageRequest};
use crate::repository::ListQuery;
use crate::service::Generation;
use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Instant;

/// Query parameters used as exact-match filters.
const FILTER_PARAMS: [&str; 3] = ["id", "building", "room"];

/// `?type=` on detail endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct TypeParam {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Body of POST and PUT requests.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DataRequest {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl DataRequest {
    /// Resolve the kind and require non-empty data.
    fn into_parts(self) -> Result<(EntityType, Value)> {
        let kind = self.kind.filter(|k| !k.trim().is_empty());
        let (Some(kind), false) = (kind, is_blank(&self.data)) else {
            return Err(Error::MissingPayload);
        };
        Ok((kind.parse()?, self.data))
    }
}

/// Falsy JSON: absent, null, false, zero or empty.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// A detail-path id; anything that is not an integer addresses nothing.
fn parse_id(raw: &str, kind: EntityType) -> Result<i64> {
    raw.trim()
        .parse()
        .map_err(|_| Error::NotFound(format!("{} not found", kind.label())))
}

async fn cache_response(state: &AppState, key: &str, body: &Value, seen: Generation) {
    if let Err(e) = state.cache.store(key, body, seen).await {
        warn!("Failed to cache response {}: {}", key, e);
    }
}

// ============================================================================
// Health Check
// ============================================================================

/// GET /health - unauthenticated liveness probe
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let database = state.store.health_check().await;
    let cache = state.cache.health_check().await;
    let body = json!({
        "status": if database && cache { "healthy" } else { "degraded" },
        "service": "residents-api",
        "database": database,
        "cache": cache,
        "cache_stats": state.cache.backend().stats(),
    });

    if database && cache {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

// ============================================================================
// Collection endpoints
// ============================================================================

/// GET /api/data/ - paginated listing of one kind, or of every kind
pub async fn list_records(
    req: HttpRequest,
    caller: Caller,
    state: web::Data<AppState>,
    params: web::Query<HashMap<String, String>>,
) -> std::result::Result<HttpResponse, ApiError> {
    let started = Instant::now();
    let outcome = list_inner(&req, &state, &caller, params.into_inner()).await;
    state
        .finish("GET /api/data/", &caller, started, outcome)
        .map(|body| HttpResponse::Ok().json(body))
}

async fn list_inner(
    req: &HttpRequest,
    state: &AppState,
    caller: &Caller,
    params: HashMap<String, String>,
) -> Result<Value> {
    let key = CacheKeyBuilder::response(req.path(), req.query_string());
    let seen = state.cache.generation();
    if let Some(body) = state.cache.fetch(&key).await {
        return Ok(body);
    }

    let param = |name: &str| params.get(name).map(String::as_str);
    let settings = &state.settings;
    let page = PageRequest::from_params(
        param("page"),
        param("page_size"),
        settings.page_size,
        settings.max_page_size,
    );
    let links = PageLinks::from_request(req);
    let target = ListTarget::resolve(param("type"));

    let body = match target {
        ListTarget::Unknown => serde_json::to_value(Page::<Value>::empty())?,
        ListTarget::All => {
            let listing = operations::list_all(&state.store, &page).await?;
            state.audit.log_operation(
                "GET_ALL",
                target.label(),
                &caller.username,
                Some(json!({ "total_items": listing.results.len() })),
            );
            serde_json::to_value(links.page(&listing.window, listing.count, listing.results))?
        }
        ListTarget::Kind(kind) => {
            let query = ListQuery {
                search: param("search").map(str::to_string),
                ordering: param("ordering").map(str::to_string),
                filters: FILTER_PARAMS
                    .iter()
                    .filter_map(|name| {
                        params
                            .get(*name)
                            .map(|value| (name.to_string(), value.clone()))
                    })
                    .collect(),
            };
            state
                .audit
                .log_operation("GET", kind.as_str(), &caller.username, None);
            with_resource!(kind, |R| {
                let listing = operations::list_page::<R>(&state.store, &query, &page).await?;
                serde_json::to_value(links.page(&listing.window, listing.count, listing.results))?
            })
        }
    };

    cache_response(state, &key, &body, seen).await;
    Ok(body)
}

/// POST /api/data/ - create one record or a batch
pub async fn create_records(
    caller: Caller,
    state: web::Data<AppState>,
    body: web::Json<DataRequest>,
) -> std::result::Result<HttpResponse, ApiError> {
    let started = Instant::now();
    let outcome = create_inner(&state, &caller, body.into_inner()).await;
    state
        .finish("POST /api/data/", &caller, started, outcome)
        .map(|created| HttpResponse::Created().json(created))
}

async fn create_inner(state: &AppState, caller: &Caller, body: DataRequest) -> Result<Value> {
    let (kind, data) = body.into_parts()?;
    let items = match data {
        Value::Array(items) => items,
        single => vec![single],
    };

    let max = state.settings.max_bulk_size;
    let created = with_resource!(kind, |R| {
        serde_json::to_value(operations::create_records::<R>(&state.store, &items, max).await?)?
    });
    state.cache.invalidate_all("CREATE").await?;

    state.audit.log_operation(
        "CREATE",
        kind.as_str(),
        &caller.username,
        Some(json!({ "count": items.len(), "data": items })),
    );
    Ok(created)
}

// ============================================================================
// Detail endpoints
// ============================================================================

/// GET /api/data/{id}/ - one record
pub async fn retrieve_record(
    req: HttpRequest,
    caller: Caller,
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<TypeParam>,
) -> std::result::Result<HttpResponse, ApiError> {
    let started = Instant::now();
    let outcome = retrieve_inner(&req, &state, &caller, &path, params.into_inner()).await;
    state
        .finish("GET /api/data/{id}/", &caller, started, outcome)
        .map(|body| HttpResponse::Ok().json(body))
}

async fn retrieve_inner(
    req: &HttpRequest,
    state: &AppState,
    caller: &Caller,
    raw_id: &str,
    params: TypeParam,
) -> Result<Value> {
    let kind = EntityType::require(params.kind.as_deref())?;
    let key = CacheKeyBuilder::response(req.path(), req.query_string());
    let seen = state.cache.generation();
    if let Some(body) = state.cache.fetch(&key).await {
        return Ok(body);
    }

    let id = parse_id(raw_id, kind)?;
    let body = with_resource!(kind, |R| {
        serde_json::to_value(operations::retrieve_record::<R>(&state.store, id).await?)?
    });
    state.audit.log_operation(
        "RETRIEVE",
        kind.as_str(),
        &caller.username,
        Some(json!({ "id": id })),
    );

    cache_response(state, &key, &body, seen).await;
    Ok(body)
}

/// PUT /api/data/{id}/ - partial update of one record, or bulk by id
pub async fn update_record(
    caller: Caller,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<DataRequest>,
) -> std::result::Result<HttpResponse, ApiError> {
    let started = Instant::now();
    let outcome = update_inner(&state, &caller, &path, body.into_inner()).await;
    state
        .finish("PUT /api/data/{id}/", &caller, started, outcome)
        .map(|body| HttpResponse::Ok().json(body))
}

async fn update_inner(
    state: &AppState,
    caller: &Caller,
    raw_id: &str,
    body: DataRequest,
) -> Result<Value> {
    let (kind, data) = body.into_parts()?;

    let (response, count) = match data {
        Value::Array(items) => {
            let max = state.settings.max_bulk_size;
            let results = with_resource!(kind, |R| {
                serde_json::to_value(operations::bulk_update::<R>(&state.store, &items, max).await?)?
            });
            (
                json!({ "status": "Bulk update successful", "results": results }),
                items.len(),
            )
        }
        item => {
            let id = parse_id(raw_id, kind)?;
            let updated = with_resource!(kind, |R| {
                serde_json::to_value(operations::update_record::<R>(&state.store, id, &item).await?)?
            });
            (updated, 1)
        }
    };
    state.cache.invalidate_all("UPDATE").await?;

    state.audit.log_operation(
        "UPDATE",
        kind.as_str(),
        &caller.username,
        Some(json!({ "count": count })),
    );
    Ok(response)
}

/// DELETE /api/data/{id}/ - delete one record and its dependents
pub async fn destroy_record(
    caller: Caller,
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<TypeParam>,
) -> std::result::Result<HttpResponse, ApiError> {
    let started = Instant::now();
    let outcome = destroy_inner(&state, &caller, &path, params.into_inner()).await;
    state
        .finish("DELETE /api/data/{id}/", &caller, started, outcome)
        .map(|()| HttpResponse::NoContent().finish())
}

async fn destroy_inner(
    state: &AppState,
    caller: &Caller,
    raw_id: &str,
    params: TypeParam,
) -> Result<()> {
    let kind = EntityType::require(params.kind.as_deref())?;
    let id = parse_id(raw_id, kind)?;
    with_resource!(kind, |R| operations::delete_record::<R>(&state.store, id).await?);
    state.cache.invalidate_all("DELETE").await?;

    state.audit.log_operation(
        "DELETE",
        kind.as_str(),
        &caller.username,
        Some(json!({ "id": id })),
    );
    Ok(())
}

// ============================================================================
// Wiring
// ============================================================================

fn bad_request(detail: String) -> actix_web::Error {
    ApiError::bad_request()
        .title("Malformed request")
        .detail(detail)
        .into()
}

/// Register extractor configs and routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| bad_request(err.to_string())))
        .app_data(web::QueryConfig::default().error_handler(|err, _req| bad_request(err.to_string())))
        .route("/health", web::get().to(health_check))
        .service(
            web::resource("/api/data/")
                .route(web::get().to(list_records))
                .route(web::post().to(create_records)),
        )
        .service(
            web::resource("/api/data/{id}/")
                .route(web::get().to(retrieve_record))
                .route(web::put().to(update_record))
                .route(web::delete().to(destroy_record)),
        );
}
