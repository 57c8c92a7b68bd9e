use std::path::Path;

use crate::error::{AppError, AppResult};

/// Picks a file extension for an upload: the original filename's extension
/// when present, else one guessed from the content type, else "bin".
fn pick_extension(original_name: Option<&str>, content_type: Option<&str>) -> String {
    if let Some(name) = original_name {
        if let Some(ext) = Path::new(name).extension().and_then(|e| e.to_str()) {
            if !ext.is_empty() {
                return ext.to_ascii_lowercase();
            }
        }
    }

    content_type
        .and_then(|ct| mime_guess::get_mime_extensions_str(ct))
        .and_then(|exts| exts.first())
        .map(|e| e.to_string())
        .unwrap_or_else(|| "bin".to_string())
}

/// Stores a profile image as `profiles/<email>-<uuid>.<ext>` under the
/// uploads directory and returns the relative path.
pub fn save_profile_image(
    uploads_dir: &Path,
    email: &str,
    original_name: Option<&str>,
    content_type: Option<&str>,
    data: &[u8],
) -> AppResult<String> {
    let ext = pick_extension(original_name, content_type);
    let relative = format!("profiles/{}-{}.{}", email, uuid::Uuid::now_v7(), ext);
    write_upload(uploads_dir, &relative, data)?;
    Ok(relative)
}

/// Stores a post image as `posts/<uuid>.<ext>` under the uploads directory
/// and returns the relative path.
pub fn save_post_image(
    uploads_dir: &Path,
    original_name: Option<&str>,
    content_type: Option<&str>,
    data: &[u8],
) -> AppResult<String> {
    let ext = pick_extension(original_name, content_type);
    let relative = format!("posts/{}.{}", uuid::Uuid::now_v7(), ext);
    write_upload(uploads_dir, &relative, data)?;
    Ok(relative)
}

fn write_upload(uploads_dir: &Path, relative: &str, data: &[u8]) -> AppResult<()> {
    let path = uploads_dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::Internal(format!("Failed to create uploads dir: {}", e)))?;
    }
    std::fs::write(&path, data)
        .map_err(|e| AppError::Internal(format!("Failed to write upload: {}", e)))?;
    Ok(())
}
