//! Writing grabbed frames to disk.

use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use image::{DynamicImage, ImageFormat};

use crate::error::ProbeError;

/// Write `image` as `<prefix>.jpg` and return the written path.
///
/// # Errors
///
/// Returns [`ProbeError::ImageError`] if encoding or writing fails.
///
/// # Example
///
/// ```no_run
/// use rtsp_timeout_probe::snapshot;
///
/// # let image = image::DynamicImage::new_rgb8(4, 4);
/// let path = snapshot::write_frame_to_file(&image, snapshot::timestamped_prefix("."))?;
/// println!("saved {}", path.display());
/// # Ok::<(), rtsp_timeout_probe::ProbeError>(())
/// ```
pub fn write_frame_to_file<P: AsRef<Path>>(
    image: &DynamicImage,
    prefix: P,
) -> Result<PathBuf, ProbeError> {
    let mut file_name = prefix.as_ref().as_os_str().to_owned();
    file_name.push(".jpg");
    let path = PathBuf::from(file_name);

    // JPEG has no alpha channel.
    let encodable = match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => image.clone(),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    };
    encodable.save_with_format(&path, ImageFormat::Jpeg)?;

    log::debug!("Wrote frame to {}", path.display());
    Ok(path)
}

/// `frame<unix-millis>` inside `directory`.
pub fn timestamped_prefix<P: AsRef<Path>>(directory: P) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0);
    directory.as_ref().join(format!("frame{millis}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_frame_and_millis() {
        let prefix = timestamped_prefix("out");
        let name = prefix
            .file_name()
            .and_then(|name| name.to_str())
            .expect("utf-8 file name");
        assert!(name.starts_with("frame"));
        assert!(name["frame".len()..].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(prefix.parent(), Some(Path::new("out")));
    }

    #[test]
    fn appends_jpg_extension() {
        let directory = tempfile::tempdir().expect("Failed to create temp dir");
        let image = DynamicImage::new_rgb8(8, 6);
        let path = write_frame_to_file(&image, directory.path().join("frame42"))
            .expect("Failed to write frame");
        assert_eq!(path, directory.path().join("frame42.jpg"));
        assert!(path.exists());
    }
}
