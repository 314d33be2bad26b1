use image::ImageFormat;
use sha2::{Digest, Sha256};
use shared::{
    domain::{ItemId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{ActionPayload, ActionResponse},
};
use storage::{NewItem, StoredImage};
use thiserror::Error;
use tracing::{info, warn};

use crate::{internal, ApiContext, AI_NOT_CONFIGURED, DATABASE_NOT_CONFIGURED};

pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
pub const MAX_UPLOAD_FILES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    WebP,
}

impl ImageKind {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::WebP => "image/webp",
        }
    }

    fn accepts_declared(self, declared: &str) -> bool {
        let declared = declared.trim().to_ascii_lowercase();
        declared.is_empty()
            || declared == "application/octet-stream"
            || declared == self.mime_type()
            || (self == ImageKind::Jpeg && declared == "image/jpg")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadRejection {
    #[error("file is empty")]
    Empty,
    #[error("file is {size} bytes, the limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("unsupported image type; use JPEG, PNG or WebP")]
    UnsupportedType,
    #[error("declared type '{declared}' does not match the image content")]
    TypeMismatch { declared: String },
    #[error("at most {limit} files can be uploaded at once")]
    TooManyFiles { limit: usize },
    #[error("no files uploaded")]
    NoFiles,
}

#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Size and type gate applied to every photo before it goes anywhere else.
/// The type is sniffed from the bytes; a declared content type must agree.
pub fn validate_upload(bytes: &[u8], declared_mime: Option<&str>) -> Result<ImageKind, UploadRejection> {
    if bytes.is_empty() {
        return Err(UploadRejection::Empty);
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(UploadRejection::TooLarge {
            size: bytes.len(),
            limit: MAX_UPLOAD_BYTES,
        });
    }
    let kind = match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => ImageKind::Jpeg,
        Ok(ImageFormat::Png) => ImageKind::Png,
        Ok(ImageFormat::WebP) => ImageKind::WebP,
        _ => return Err(UploadRejection::UnsupportedType),
    };
    if let Some(declared) = declared_mime {
        if !kind.accepts_declared(declared) {
            return Err(UploadRejection::TypeMismatch {
                declared: declared.to_string(),
            });
        }
    }
    Ok(kind)
}

fn image_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Validates, de-duplicates, tags and stores a batch of photos for one user.
/// Individual file failures are counted, not fatal.
pub async fn upload_items(ctx: &ApiContext, user_id: &UserId, files: Vec<UploadFile>) -> ActionResponse {
    let Some(storage) = &ctx.storage else {
        return ActionResponse::failure(DATABASE_NOT_CONFIGURED);
    };
    let Some(advisor) = &ctx.advisor else {
        return ActionResponse::failure(AI_NOT_CONFIGURED);
    };
    if files.is_empty() {
        return ActionResponse::failure(UploadRejection::NoFiles.to_string());
    }
    if files.len() > MAX_UPLOAD_FILES {
        return ActionResponse::failure(
            UploadRejection::TooManyFiles {
                limit: MAX_UPLOAD_FILES,
            }
            .to_string(),
        );
    }

    let mut success_count = 0;
    let mut duplicate_count = 0;
    let mut fail_count = 0;
    let mut items = Vec::new();

    for file in files {
        let filename = file.filename.as_deref().unwrap_or("<unnamed>");
        let kind = match validate_upload(&file.bytes, file.content_type.as_deref()) {
            Ok(kind) => kind,
            Err(rejection) => {
                warn!(%filename, %rejection, "upload rejected");
                fail_count += 1;
                continue;
            }
        };

        let hash = image_hash(&file.bytes);
        match storage.find_item_by_image_hash(user_id, &hash).await {
            Ok(Some(existing)) => {
                info!(%filename, existing = %existing.name, "skipping duplicate image");
                duplicate_count += 1;
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(%filename, error = %e, "duplicate check failed");
                fail_count += 1;
                continue;
            }
        }

        let tags = match advisor.tag_item(&file.bytes, kind.mime_type()).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!(%filename, error = %e, "image tagging failed");
                fail_count += 1;
                continue;
            }
        };

        let stored = storage
            .insert_item(NewItem {
                user_id,
                tags: &tags,
                image_hash: &hash,
                image: &file.bytes,
                image_mime: kind.mime_type(),
            })
            .await;
        match stored {
            Ok(item) => {
                info!(%user_id, item_id = %item.item_id, "item stored");
                success_count += 1;
                items.push(tags);
            }
            Err(e) => {
                warn!(%filename, error = %e, "item insert failed");
                fail_count += 1;
            }
        }
    }

    ActionResponse::ok(ActionPayload::Uploaded {
        success_count,
        duplicate_count,
        fail_count,
        items,
    })
}

pub async fn item_image(
    ctx: &ApiContext,
    user_id: &UserId,
    item_id: &ItemId,
) -> Result<Option<StoredImage>, ApiError> {
    let storage = ctx
        .storage
        .as_ref()
        .ok_or_else(|| ApiError::new(ErrorCode::Unavailable, DATABASE_NOT_CONFIGURED))?;
    storage
        .load_item_image(user_id, item_id)
        .await
        .map_err(internal)
}

#[cfg(test)]
#[path = "tests/upload_tests.rs"]
mod tests;
