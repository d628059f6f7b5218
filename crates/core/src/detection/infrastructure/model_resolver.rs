use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

const APP_DIR: &str = "LiveDetect";
const DOWNLOAD_CHUNK: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model file not found: {0}")]
    Missing(PathBuf),
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`; total is 0 when
/// the server sends no Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Finds a model by name in the user cache, then `bundled_dir`, and only
/// then downloads it from `url` into the cache.
pub fn resolve(
    name: &str,
    url: &str,
    bundled_dir: Option<&Path>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    resolve_in(&model_cache_dir()?, name, url, bundled_dir, progress)
}

/// [`resolve`] against an explicit cache directory.
pub fn resolve_in(
    cache_dir: &Path,
    name: &str,
    url: &str,
    bundled_dir: Option<&Path>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let cached_path = cache_dir.join(name);
    if cached_path.exists() {
        log::debug!("Model {name} found in cache");
        return Ok(cached_path);
    }

    if let Some(bundled_path) = bundled_dir.map(|dir| dir.join(name)) {
        if bundled_path.exists() {
            log::debug!("Model {name} found at {}", bundled_path.display());
            return Ok(bundled_path);
        }
    }

    fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;
    log::info!("Downloading model {name} from {url}");
    download(url, &cached_path, progress)?;
    Ok(cached_path)
}

/// An explicitly configured model file must already exist.
pub fn require_file(path: &Path) -> Result<PathBuf, ModelResolveError> {
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(ModelResolveError::Missing(path.to_path_buf()))
    }
}

/// Platform model cache directory.
///
/// - macOS: `~/Library/Application Support/LiveDetect/models/`
/// - Linux: `$XDG_CACHE_HOME/LiveDetect/models/` or `~/.cache/LiveDetect/models/`
/// - Windows: `%LOCALAPPDATA%/LiveDetect/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    let base = dirs::data_dir();
    #[cfg(not(target_os = "macos"))]
    let base = dirs::cache_dir();

    base.map(|d| d.join(APP_DIR).join("models"))
        .ok_or(ModelResolveError::NoCacheDir)
}

/// Streams `url` into `<dest>.part` and renames it into place, so a failed
/// download never leaves a truncated model behind.
fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");
    let result = stream_to(url, &temp_path, progress)
        .and_then(|()| fs::rename(&temp_path, dest).map_err(write_error(dest)));
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn stream_to(url: &str, path: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut file = fs::File::create(path).map_err(write_error(path))?;
    let mut buf = vec![0u8; DOWNLOAD_CHUNK];
    let mut downloaded: u64 = 0;
    loop {
        let n = response.read(&mut buf).map_err(write_error(path))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_error(path))?;
        downloaded += n as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }
    file.flush().map_err(write_error(path))
}

fn write_error(path: &Path) -> impl FnOnce(std::io::Error) -> ModelResolveError + '_ {
    move |source| ModelResolveError::Write {
        path: path.to_path_buf(),
        source,
    }
}
