use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::images::Image;

#[derive(Debug, Deserialize)]
pub struct GalleryRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct GalleryListQuery {
    pub sort: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GalleryItem {
    pub id: Uuid,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct GalleryDetails {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub images: Vec<ImageItem>,
}

#[derive(Debug, Serialize)]
pub struct ImageItem {
    pub filename: String,
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Image> for ImageItem {
    fn from(image: Image) -> Self {
        Self {
            url: format!(
                "/galleries/{}/images/{}",
                image.gallery_id,
                urlencoding::encode(&image.filename)
            ),
            filename: image.filename,
            created_at: image.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_url_escapes_filename() {
        let gallery_id = Uuid::new_v4();
        let item = ImageItem::from(Image {
            gallery_id,
            filename: "beach #1?.png".into(),
            path: "unused".into(),
            created_at: OffsetDateTime::now_utc(),
        });
        assert_eq!(
            item.url,
            format!("/galleries/{gallery_id}/images/beach%20%231%3F.png")
        );
        assert_eq!(item.filename, "beach #1?.png");
    }
}
