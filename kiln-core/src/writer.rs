use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::{ImageError, ImageFormat};
use tracing::{debug, warn};

use crate::{ImageArtifact, WriteError};

/// Encode `artifact` and store it at `output_path`, replacing any existing
/// file.
///
/// The format follows the path's extension and falls back to PNG. The image
/// is first written to a hidden sibling file and renamed into place, so a
/// failed write never leaves a truncated image at `output_path`. The pixel
/// buffer is consumed on every path.
pub fn write(artifact: ImageArtifact, output_path: &Path) -> Result<(), WriteError> {
    let format = ImageFormat::from_path(output_path).unwrap_or(ImageFormat::Png);
    let mut image = artifact.into_dynamic_image()?;
    if format == ImageFormat::Jpeg && image.color().has_alpha() {
        image = image::DynamicImage::ImageRgb8(image.to_rgb8());
    }

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| WriteError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let staging = staging_path(output_path)?;
    if let Err(err) = image.save_with_format(&staging, format) {
        discard(&staging);
        return Err(match err {
            ImageError::IoError(source) => WriteError::Io {
                path: staging,
                source,
            },
            source => WriteError::Encode {
                path: output_path.to_path_buf(),
                source,
            },
        });
    }

    if let Err(source) = fs::rename(&staging, output_path) {
        discard(&staging);
        return Err(WriteError::Io {
            path: output_path.to_path_buf(),
            source,
        });
    }

    debug!(path = %output_path.display(), ?format, "image written");
    Ok(())
}

fn staging_path(output_path: &Path) -> Result<PathBuf, WriteError> {
    let file_name = output_path.file_name().ok_or_else(|| WriteError::Io {
        path: output_path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "output path has no file name"),
    })?;
    let mut staged = OsString::from(".");
    staged.push(file_name);
    staged.push(".partial");
    Ok(output_path.with_file_name(staged))
}

fn discard(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "failed to remove partial image");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, channels: u32, value: u8) -> ImageArtifact {
        ImageArtifact::new(width, height, channels, vec![value; (width * height * channels) as usize])
    }

    #[test]
    fn writes_every_supported_channel_count_as_png() {
        let dir = tempfile::tempdir().unwrap();
        for channels in 1..=4 {
            let path = dir.path().join(format!("out-{channels}.png"));
            write(solid(16, 8, channels, 200), &path).unwrap();

            let decoded = image::open(&path).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (16, 8));
            assert_eq!(decoded.color().channel_count() as u32, channels);
        }
    }

    #[test]
    fn overwrites_existing_file_and_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.png");
        fs::write(&path, b"stale").unwrap();

        write(solid(8, 8, 3, 10), &path).unwrap();

        assert_eq!(image::open(&path).unwrap().width(), 8);
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/images/output.png");
        write(solid(8, 8, 4, 1), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn rejects_unsupported_channel_counts_and_short_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.png");

        let err = write(solid(8, 8, 5, 0), &path).unwrap_err();
        assert!(matches!(err, WriteError::InvalidArtifact(_)));

        let short = ImageArtifact::new(8, 8, 3, vec![0; 10]);
        let err = write(short, &path).unwrap_err();
        assert!(matches!(err, WriteError::InvalidArtifact(_)));
        assert!(!path.exists());
    }

    #[test]
    fn unwritable_destination_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"file, not a directory").unwrap();

        let err = write(solid(8, 8, 3, 0), &blocker.join("output.png")).unwrap_err();
        assert!(matches!(err, WriteError::Io { .. }));
    }
}
