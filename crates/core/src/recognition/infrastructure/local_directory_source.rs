use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::detection::domain::face_locator::FaceLocator;
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::identity::{IdentityId, IdentityRecord};
use crate::recognition::domain::registry_source::RegistrySource;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;
use crate::shared::source_error::SourceError;

/// Builds identities from reference photos in a local directory.
///
/// Only used while the backend registry is unreachable. Each image yields at
/// most one record, embedded from its most prominent face.
pub struct LocalDirectoryIdentitySource {
    dir: PathBuf,
    locator: Arc<dyn FaceLocator>,
    embedder: Arc<dyn FaceEmbedder>,
}

impl LocalDirectoryIdentitySource {
    pub fn new(dir: PathBuf, locator: Arc<dyn FaceLocator>, embedder: Arc<dyn FaceEmbedder>) -> Self {
        Self {
            dir,
            locator,
            embedder,
        }
    }

    fn record_for(&self, path: &Path) -> Result<Option<IdentityRecord>, Box<dyn std::error::Error>> {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return Ok(None);
        };
        let image = load_rgb(path)?;
        let Some(face_box) = self.locator.locate(&image)? else {
            return Ok(None);
        };
        let face = image.crop(&face_box);
        if face.width() == 0 || face.height() == 0 {
            return Ok(None);
        }
        let embedding = self.embedder.embed(&face)?;
        Ok(Some(IdentityRecord::new(
            IdentityId::new(format!("local:{stem}")),
            display_name_from_stem(stem),
            embedding,
        )))
    }
}

impl RegistrySource for LocalDirectoryIdentitySource {
    fn fetch(&self) -> Result<Vec<IdentityRecord>, SourceError> {
        let images = list_images(&self.dir)?;
        let mut records = Vec::new();
        for path in images {
            match self.record_for(&path) {
                Ok(Some(record)) => {
                    log::info!("Loaded {} from {}", record.display_name, path.display());
                    records.push(record);
                }
                Ok(None) => log::warn!("No face found in {}", path.display()),
                Err(e) => log::warn!("Skipping {}: {e}", path.display()),
            }
        }
        Ok(records)
    }

    fn name(&self) -> &str {
        "local directory"
    }

    fn is_degraded(&self) -> bool {
        true
    }
}

/// Image files directly inside `dir`, sorted by path for a stable order.
fn list_images(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    if !dir.is_dir() {
        return Err(SourceError::MissingDirectory(dir.to_path_buf()));
    }
    let entries = fs::read_dir(dir).map_err(|e| SourceError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut images: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_image_extension(path))
        .collect();
    images.sort();
    Ok(images)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

fn load_rgb(path: &Path) -> Result<Frame, Box<dyn std::error::Error>> {
    let img = image::open(path)?.to_rgb8();
    let (width, height) = img.dimensions();
    Ok(Frame::new(img.into_raw(), width, height, 3, 0))
}

/// "john_doe" -> "John Doe"
fn display_name_from_stem(stem: &str) -> String {
    stem.split(['_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
