//! Locates ONNX model files: the operator's models directory first, then
//! the user cache, then a one-time download into the cache.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// A model file and, when it is published, where to fetch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    pub file_name: &'static str,
    pub url: Option<&'static str>,
}

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("no cache directory on this platform")]
    NoCacheDir,
    #[error("model {0} is in neither the models directory nor the cache, and has no download URL")]
    NotFound(&'static str),
    #[error("download of {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct ModelResolver {
    models_dir: Option<PathBuf>,
    cache_dir: PathBuf,
}

impl ModelResolver {
    /// Caches downloads under `<platform cache>/facewatch/models`.
    pub fn new(models_dir: Option<PathBuf>) -> Result<Self, ModelResolveError> {
        let cache_dir = dirs::cache_dir()
            .ok_or(ModelResolveError::NoCacheDir)?
            .join("facewatch")
            .join("models");
        Ok(Self::with_cache_dir(models_dir, cache_dir))
    }

    pub fn with_cache_dir(models_dir: Option<PathBuf>, cache_dir: PathBuf) -> Self {
        Self {
            models_dir,
            cache_dir,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn resolve(&self, model: ModelSpec) -> Result<PathBuf, ModelResolveError> {
        let local = self
            .models_dir
            .iter()
            .chain(std::iter::once(&self.cache_dir))
            .map(|dir| dir.join(model.file_name))
            .find(|path| path.is_file());
        if let Some(path) = local {
            log::debug!("Model {} at {}", model.file_name, path.display());
            return Ok(path);
        }

        let url = model.url.ok_or(ModelResolveError::NotFound(model.file_name))?;
        fs::create_dir_all(&self.cache_dir).map_err(|source| io_error(&self.cache_dir, source))?;
        let dest = self.cache_dir.join(model.file_name);
        log::info!("Downloading {} from {url}", model.file_name);
        let bytes = download(url, &dest)?;
        log::info!("Saved {} ({bytes} bytes)", dest.display());
        Ok(dest)
    }
}

/// Streams `url` into `<dest>.part` and renames it into place once complete.
fn download(url: &str, dest: &Path) -> Result<u64, ModelResolveError> {
    let part = dest.with_extension("part");
    match fetch_to(url, &part) {
        Ok(bytes) => {
            fs::rename(&part, dest).map_err(|source| io_error(dest, source))?;
            Ok(bytes)
        }
        Err(e) => {
            let _ = fs::remove_file(&part);
            Err(e)
        }
    }
}

fn fetch_to(url: &str, path: &Path) -> Result<u64, ModelResolveError> {
    let download_error = |source| ModelResolveError::Download {
        url: url.to_string(),
        source,
    };
    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(download_error)?;
    let mut file = File::create(path).map_err(|source| io_error(path, source))?;
    let bytes = response.copy_to(&mut file).map_err(download_error)?;
    file.sync_all().map_err(|source| io_error(path, source))?;
    Ok(bytes)
}

fn io_error(path: &Path, source: std::io::Error) -> ModelResolveError {
    ModelResolveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LOCAL_ONLY: ModelSpec = ModelSpec {
        file_name: "detector.onnx",
        url: None,
    };

    fn resolver(tmp: &TempDir) -> ModelResolver {
        ModelResolver::with_cache_dir(
            Some(tmp.path().join("models")),
            tmp.path().join("cache"),
        )
    }

    fn put(dir: &Path, name: &str) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, b"onnx").unwrap();
        path
    }

    #[test]
    fn test_models_dir_wins_over_cache() {
        let tmp = TempDir::new().unwrap();
        let r = resolver(&tmp);
        let supplied = put(&tmp.path().join("models"), "detector.onnx");
        put(r.cache_dir(), "detector.onnx");

        assert_eq!(r.resolve(LOCAL_ONLY).unwrap(), supplied);
    }

    #[test]
    fn test_cached_model_is_used_without_models_dir() {
        let tmp = TempDir::new().unwrap();
        let r = ModelResolver::with_cache_dir(None, tmp.path().join("cache"));
        let cached = put(r.cache_dir(), "detector.onnx");

        assert_eq!(r.resolve(LOCAL_ONLY).unwrap(), cached);
    }

    #[test]
    fn test_missing_model_without_url_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let result = resolver(&tmp).resolve(LOCAL_ONLY);
        assert!(matches!(result, Err(ModelResolveError::NotFound("detector.onnx"))));
    }

    #[test]
    fn test_failed_download_leaves_nothing_behind() {
        let tmp = TempDir::new().unwrap();
        let r = resolver(&tmp);
        let result = r.resolve(ModelSpec {
            file_name: "embedder.onnx",
            url: Some("http://127.0.0.1:9/embedder.onnx"),
        });

        assert!(matches!(result, Err(ModelResolveError::Download { .. })));
        assert!(!r.cache_dir().join("embedder.onnx").exists());
        assert!(!r.cache_dir().join("embedder.part").exists());
    }

    #[test]
    fn test_default_cache_dir_is_namespaced() {
        // Hosts without HOME have no cache dir at all.
        if let Ok(r) = ModelResolver::new(None) {
            assert!(r.cache_dir().ends_with("facewatch/models"));
        }
    }
}
