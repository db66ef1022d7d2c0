use std::io::Cursor;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::{error, instrument, warn};
use uuid::Uuid;

use super::dto::{GalleryDetails, GalleryItem, GalleryListQuery, GalleryRequest, ImageItem};
use super::repo::{Gallery, SortColumn, SortOrder};
use crate::{
    auth::{extractors::AuthUser, repo_types::User},
    error::{Error, Result as AppResult},
    state::AppState,
};

pub fn gallery_routes() -> Router<AppState> {
    Router::new()
        .route("/galleries", get(list_galleries).post(create_gallery))
        .route(
            "/galleries/:id",
            get(show_gallery).put(update_gallery).delete(delete_gallery),
        )
        .route("/galleries/:id/images", get(list_images).post(upload_images))
        .route(
            "/galleries/:id/images/:filename",
            get(serve_image).delete(delete_image),
        )
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

// Image I/O is blocking std::fs; keep it off the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, (StatusCode, String)>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(res) => res.map_err(Into::into),
        Err(e) => {
            error!(error = %e, "blocking image task failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong".into()))
        }
    }
}

async fn find_gallery(state: &AppState, id: Uuid) -> Result<Gallery, (StatusCode, String)> {
    Ok(Gallery::by_id(&state.db, id).await?.ok_or(Error::NotFound)?)
}

async fn owned_gallery(
    state: &AppState,
    id: Uuid,
    user: &User,
) -> Result<Gallery, (StatusCode, String)> {
    let gallery = find_gallery(state, id).await?;
    if gallery.user_id != user.id {
        warn!(gallery_id = %id, user_id = %user.id, "gallery access denied");
        return Err((
            StatusCode::FORBIDDEN,
            "You are not allowed to edit this gallery".into(),
        ));
    }
    Ok(gallery)
}

#[instrument(skip(state, user))]
pub async fn list_galleries(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(q): Query<GalleryListQuery>,
) -> Result<Json<Vec<GalleryItem>>, (StatusCode, String)> {
    let galleries = Gallery::by_user(
        &state.db,
        user.id,
        SortColumn::parse(q.sort.as_deref()),
        SortOrder::parse(q.order.as_deref()),
    )
    .await?;
    let items = galleries
        .into_iter()
        .map(|g| GalleryItem {
            id: g.id,
            title: g.title,
            created_at: g.created_at,
        })
        .collect();
    Ok(Json(items))
}

#[instrument(skip(state, user, body))]
pub async fn create_gallery(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<GalleryRequest>,
) -> Result<(StatusCode, Json<Gallery>), (StatusCode, String)> {
    let title = body.title.trim();
    if title.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "title is required".into()));
    }
    let gallery = Gallery::create(&state.db, user.id, title).await?;
    Ok((StatusCode::CREATED, Json(gallery)))
}

#[instrument(skip(state))]
pub async fn show_gallery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GalleryDetails>, (StatusCode, String)> {
    let gallery = find_gallery(&state, id).await?;
    let images = state.images.clone();
    let images = blocking(move || images.list(id)).await?;
    Ok(Json(GalleryDetails {
        id: gallery.id,
        user_id: gallery.user_id,
        title: gallery.title,
        images: images.into_iter().map(ImageItem::from).collect(),
    }))
}

#[instrument(skip(state, user, body))]
pub async fn update_gallery(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<GalleryRequest>,
) -> Result<Json<Gallery>, (StatusCode, String)> {
    owned_gallery(&state, id, &user).await?;
    let title = body.title.trim();
    if title.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "title is required".into()));
    }
    Ok(Json(Gallery::update_title(&state.db, id, title).await?))
}

#[instrument(skip(state, user))]
pub async fn delete_gallery(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    owned_gallery(&state, id, &user).await?;
    Gallery::delete(&state.db, id).await?;
    let images = state.images.clone();
    blocking(move || images.delete_all(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn list_images(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ImageItem>>, (StatusCode, String)> {
    find_gallery(&state, id).await?;
    let images = state.images.clone();
    let images = blocking(move || images.list(id)).await?;
    Ok(Json(images.into_iter().map(ImageItem::from).collect()))
}

/// POST /galleries/:id/images (multipart, field `files`)
#[instrument(skip(state, user, mp))]
pub async fn upload_images(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<Vec<ImageItem>>), (StatusCode, String)> {
    owned_gallery(&state, id, &user).await?;

    let mut stored = Vec::new();
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if !matches!(field.name(), Some("files") | Some("files[]")) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_owned) else {
            return Err((StatusCode::BAD_REQUEST, "file name is required".into()));
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

        let images = state.images.clone();
        let image = blocking(move || images.create(id, &filename, &mut Cursor::new(data))).await?;
        stored.push(ImageItem::from(image));
    }

    if stored.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "files[] is required".into()));
    }
    Ok((StatusCode::CREATED, Json(stored)))
}

#[instrument(skip(state))]
pub async fn serve_image(
    State(state): State<AppState>,
    Path((id, filename)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let images = state.images.clone();
    let (content_type, data) = blocking(move || {
        let image = images.get(id, &filename)?;
        let data = std::fs::read(&image.path)?;
        Ok((image.content_type(), data))
    })
    .await?;
    Ok(([(header::CONTENT_TYPE, content_type)], data))
}

#[instrument(skip(state, user))]
pub async fn delete_image(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, filename)): Path<(Uuid, String)>,
) -> Result<StatusCode, (StatusCode, String)> {
    owned_gallery(&state, id, &user).await?;
    let images = state.images.clone();
    blocking(move || images.delete(id, &filename)).await?;
    Ok(StatusCode::NO_CONTENT)
}
