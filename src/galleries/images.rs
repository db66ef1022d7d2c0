//! Gallery images on disk, laid out as `{root}/gallery-{id}/{filename}`.
//!
//! The directory is the source of truth: there is no image table. Uploads are
//! accepted only when the leading bytes sniff as JPEG, PNG or GIF *and* the
//! file extension names that same format.

use std::ffi::OsStr;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use image::ImageFormat;
use serde::Serialize;
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];
const ALLOWED_FORMATS: [ImageFormat; 3] = [ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::Gif];

// Same window the usual content sniffers look at.
const SNIFF_LEN: u64 = 512;

#[derive(Debug, Clone, Serialize)]
pub struct Image {
    pub gallery_id: Uuid,
    pub filename: String,
    #[serde(skip)]
    pub path: PathBuf,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Image {
    pub fn content_type(&self) -> &'static str {
        allowed_format(&self.filename)
            .map(|f| f.to_mime_type())
            .unwrap_or("application/octet-stream")
    }
}

#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn gallery_dir(&self, gallery_id: Uuid) -> PathBuf {
        self.root.join(format!("gallery-{gallery_id}"))
    }

    /// Images of a gallery, newest first. A missing directory is an empty gallery.
    pub fn list(&self, gallery_id: Uuid) -> Result<Vec<Image>> {
        let dir = self.gallery_dir(gallery_id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut images = Vec::new();
        for entry in entries {
            // Files may vanish under a concurrent delete; the listing is allowed to be stale.
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let Some(filename) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if allowed_format(&filename).is_none() {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !meta.is_file() {
                continue;
            }
            images.push(Image {
                gallery_id,
                filename,
                path: entry.path(),
                created_at: created_at(&meta)?,
            });
        }

        // read_dir order is unspecified; fix it by name so ties are deterministic.
        images.sort_by(|a, b| a.filename.cmp(&b.filename));
        images.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(images)
    }

    pub fn get(&self, gallery_id: Uuid, filename: &str) -> Result<Image> {
        let filename = sanitize_filename(filename).ok_or(Error::NotFound)?;
        let path = self.gallery_dir(gallery_id).join(filename);
        let meta = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(Error::NotFound),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Error::NotFound),
            Err(e) => return Err(e.into()),
        };
        Ok(Image {
            gallery_id,
            filename: filename.to_string(),
            path,
            created_at: created_at(&meta)?,
        })
    }

    /// Validate and store an upload, replacing any file with the same name.
    ///
    /// Only the last path component of `filename` is used. `contents` is read
    /// from its current position; sniffing does not consume it.
    pub fn create<R: Read + Seek>(
        &self,
        gallery_id: Uuid,
        filename: &str,
        contents: &mut R,
    ) -> Result<Image> {
        let sniffed = sniff_format(contents)?;
        let Some(sniffed) = sniffed else {
            warn!(%gallery_id, %filename, "upload rejected: unrecognized content");
            return Err(Error::invalid_file(filename));
        };

        let Some(name) = sanitize_filename(filename) else {
            warn!(%gallery_id, %filename, "upload rejected: unusable filename");
            return Err(Error::invalid_file(filename));
        };
        match allowed_format(name) {
            Some(declared) if declared == sniffed => {}
            Some(declared) => {
                warn!(%gallery_id, %filename, ?declared, ?sniffed, "upload rejected: extension does not match content");
                return Err(Error::invalid_file(filename));
            }
            None => {
                warn!(%gallery_id, %filename, "upload rejected: extension not allowed");
                return Err(Error::invalid_file(filename));
            }
        }

        let dir = self.gallery_dir(gallery_id);
        fs::create_dir_all(&dir)?;
        let path = dir.join(name);

        // Stage next to the target so a failed copy never clobbers the old image.
        let mut staged = NamedTempFile::new_in(&dir)?;
        let written = io::copy(contents, &mut staged)?;
        let dst = staged.persist(&path).map_err(|e| e.error)?;
        info!(%gallery_id, filename = %name, bytes = written, "image stored");

        let meta = dst.metadata()?;
        Ok(Image {
            gallery_id,
            filename: name.to_string(),
            path,
            created_at: created_at(&meta)?,
        })
    }

    pub fn delete(&self, gallery_id: Uuid, filename: &str) -> Result<()> {
        let image = self.get(gallery_id, filename)?;
        match fs::remove_file(&image.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Error::NotFound),
            Err(e) => return Err(e.into()),
        }
        info!(%gallery_id, filename = %image.filename, "image deleted");
        Ok(())
    }

    /// Drop the whole gallery directory. Idempotent.
    pub fn delete_all(&self, gallery_id: Uuid) -> Result<()> {
        match fs::remove_dir_all(self.gallery_dir(gallery_id)) {
            Ok(()) => {
                debug!(%gallery_id, "gallery images removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Last path component of `filename`, or `None` if nothing usable is left.
pub fn sanitize_filename(filename: &str) -> Option<&str> {
    let base = filename.rsplit(['/', '\\']).next()?;
    match base {
        "" | "." | ".." => None,
        b if b.contains('\0') => None,
        b => Some(b),
    }
}

/// Format implied by the extension, if the extension is allow-listed.
fn allowed_format(filename: &str) -> Option<ImageFormat> {
    let ext = Path::new(filename)
        .extension()
        .and_then(OsStr::to_str)?
        .to_ascii_lowercase();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    ImageFormat::from_extension(ext)
}

fn sniff_format<R: Read + Seek>(contents: &mut R) -> io::Result<Option<ImageFormat>> {
    let start = contents.stream_position()?;
    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    contents.by_ref().take(SNIFF_LEN).read_to_end(&mut head)?;
    contents.seek(SeekFrom::Start(start))?;

    Ok(image::guess_format(&head)
        .ok()
        .filter(|f| ALLOWED_FORMATS.contains(f)))
}

// Birth time where the filesystem records it, otherwise last modification.
fn created_at(meta: &fs::Metadata) -> io::Result<OffsetDateTime> {
    let t = meta.created().or_else(|_| meta.modified())?;
    Ok(OffsetDateTime::from(t))
}
