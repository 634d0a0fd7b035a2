//! Store route handlers: listing, detail, create, edit and rankings.

use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Path, State, multipart::Field},
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Redirect, Response},
};

use markets_core::StoreId;

use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{Store, StoreDetail, TopStore};
use crate::services::stores::{PageOutcome, StoreError, StoreInput, StoreService};
use crate::services::uploads::{discard_photo, photo_extension, save_photo};
use crate::state::AppState;

/// Maximum request body for store forms (photo included).
pub const STORE_FORM_LIMIT: usize = 10 * 1024 * 1024;

/// An uploaded photo awaiting validation and resizing.
struct PhotoUpload {
    content_type: String,
    bytes: Bytes,
}

/// A parsed multipart store form.
struct StoreForm {
    input: StoreInput,
    photo: Option<PhotoUpload>,
}

fn bad_multipart(e: &axum::extract::multipart::MultipartError) -> AppError {
    AppError::BadRequest(e.body_text())
}

async fn field_text(field: Field<'_>) -> Result<String> {
    field.text().await.map_err(|e| bad_multipart(&e))
}

fn parse_coordinate(value: &str) -> Result<Option<f64>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<f64>()
        .map(Some)
        .map_err(|_| AppError::BadRequest("Coordinates must be numbers!".to_string()))
}

/// Read the store fields and optional `photo` file from a multipart body.
///
/// Both flat names (`lng`, `lat`, `address`) and the bracketed form names
/// (`location[coordinates][0]`, `location[coordinates][1]`,
/// `location[address]`) are accepted. Tags may repeat.
async fn read_store_form(mut multipart: Multipart) -> Result<StoreForm> {
    let mut input = StoreInput::default();
    let mut photo = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| bad_multipart(&e))? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        match name.as_str() {
            "photo" => {
                let has_file = field.file_name().is_some_and(|f| !f.is_empty());
                let content_type = field.content_type().unwrap_or_default().to_owned();
                let bytes = field.bytes().await.map_err(|e| bad_multipart(&e))?;
                if has_file && !bytes.is_empty() {
                    photo = Some(PhotoUpload {
                        content_type,
                        bytes,
                    });
                }
            }
            "name" => input.name = field_text(field).await?,
            "description" => input.description = Some(field_text(field).await?),
            "tags" | "tags[]" => input.tags.push(field_text(field).await?),
            "lng" | "location[coordinates][0]" => {
                input.lng = parse_coordinate(&field_text(field).await?)?;
            }
            "lat" | "location[coordinates][1]" => {
                input.lat = parse_coordinate(&field_text(field).await?)?;
            }
            "address" | "location[address]" => input.address = field_text(field).await?,
            _ => {}
        }
    }

    Ok(StoreForm { input, photo })
}

/// Resize and store the photo, if one was uploaded.
async fn store_photo(state: &AppState, photo: Option<PhotoUpload>) -> Result<Option<String>> {
    let Some(photo) = photo else {
        return Ok(None);
    };
    let name = save_photo(&state.config().upload_dir, &photo.content_type, photo.bytes).await?;
    Ok(Some(name))
}

/// Remove a freshly stored photo if the write it belongs to failed.
async fn keep_photo_if_ok<T>(
    upload_dir: &std::path::Path,
    photo: Option<&str>,
    result: std::result::Result<T, StoreError>,
) -> Result<T> {
    if let (Err(_), Some(photo)) = (&result, photo) {
        discard_photo(upload_dir, photo).await;
    }
    Ok(result?)
}

async fn page_response(state: &AppState, page: u32) -> Result<Response> {
    match StoreService::new(state.pool()).page(page).await? {
        PageOutcome::Page(page) => Ok(Json(page).into_response()),
        PageOutcome::RedirectTo(last) => {
            Ok(Redirect::to(&format!("/stores/page/{last}")).into_response())
        }
    }
}

/// First page of stores.
pub async fn index(State(state): State<AppState>) -> Result<Response> {
    page_response(&state, 1).await
}

/// A page of stores; past-the-end pages redirect to the last page.
pub async fn page(State(state): State<AppState>, Path(page): Path<u32>) -> Result<Response> {
    page_response(&state, page).await
}

/// Create a store owned by the logged-in user.
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    multipart: Multipart,
) -> Result<Response> {
    let form = read_store_form(multipart).await?;
    if let Some(photo) = &form.photo {
        photo_extension(&photo.content_type)?;
    }
    let mut draft = form.input.into_draft(None)?;
    draft.photo = store_photo(&state, form.photo).await?;

    let created = StoreService::new(state.pool()).create(user.id, &draft).await;
    let store =
        keep_photo_if_ok(&state.config().upload_dir, draft.photo.as_deref(), created).await?;

    Ok((
        StatusCode::CREATED,
        [(LOCATION, format!("/store/{}", store.slug))],
        Json(store),
    )
        .into_response())
}

/// Fetch a store for editing (owner only).
pub async fn edit(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<i32>,
) -> Result<Json<Store>> {
    let store = StoreService::new(state.pool())
        .get_for_edit(user.id, StoreId::new(id))
        .await?;
    Ok(Json(store))
}

/// Update a store (owner only).
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> Result<Json<Store>> {
    let id = StoreId::new(id);
    let service = StoreService::new(state.pool());

    let form = read_store_form(multipart).await?;
    // Ownership is checked before the fields are validated or a file is written
    service.get_for_edit(user.id, id).await?;
    if let Some(photo) = &form.photo {
        photo_extension(&photo.content_type)?;
    }
    let mut draft = form.input.into_draft(None)?;
    draft.photo = store_photo(&state, form.photo).await?;

    let updated = service.update(user.id, id, &draft).await;
    let store =
        keep_photo_if_ok(&state.config().upload_dir, draft.photo.as_deref(), updated).await?;
    Ok(Json(store))
}

/// Store detail by slug.
pub async fn show(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<StoreDetail>> {
    let detail = StoreService::new(state.pool()).detail(&slug).await?;
    Ok(Json(detail))
}

/// Highest rated stores.
pub async fn top(State(state): State<AppState>) -> Result<Json<Vec<TopStore>>> {
    let stores = StoreService::new(state.pool()).top().await?;
    Ok(Json(stores))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn upload_dir_with(file_name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("markets-routes-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(file_name), b"photo").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_failed_write_discards_photo() {
        let dir = upload_dir_with("orphan.png");

        let result: Result<()> =
            keep_photo_if_ok(&dir, Some("orphan.png"), Err(StoreError::NotFound)).await;

        assert!(matches!(result, Err(AppError::Store(StoreError::NotFound))));
        assert!(!dir.join("orphan.png").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_successful_write_keeps_photo() {
        let dir = upload_dir_with("kept.png");

        let value = keep_photo_if_ok(&dir, Some("kept.png"), Ok(7)).await.unwrap();

        assert_eq!(value, 7);
        assert!(dir.join("kept.png").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_parse_coordinate() {
        assert_eq!(parse_coordinate(" -79.5 ").unwrap(), Some(-79.5));
        assert_eq!(parse_coordinate("  ").unwrap(), None);
        assert!(matches!(parse_coordinate("north"), Err(AppError::BadRequest(_))));
    }
}
