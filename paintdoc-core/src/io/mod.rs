//! # Saving and loading
//!
//! Formats are chosen by file extension from a fixed table. Every failure is translated at this
//! boundary into a [`SaveLoadError`] with a message fit to show the user.

pub mod openraster;
pub mod raster;

use std::path::{Path, PathBuf};

use crate::{document::Document, state::layers::LayerError};

/// Failures from the codecs and filesystem, before translation.
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    PngEncoding(#[from] png::EncodingError),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Xml(#[from] roxmltree::Error),
    #[error("image of {0}x{1} pixels is larger than allowed")]
    TooLarge(u32, u32),
    /// The file parsed, but doesn't describe a usable document.
    #[error("{0}")]
    Structure(String),
    #[error(transparent)]
    Layer(#[from] LayerError),
}
impl CodecError {
    /// Pull out the filesystem error at the bottom of this, if there is one.
    fn into_io(self) -> Result<std::io::Error, Self> {
        match self {
            Self::Io(e)
            | Self::Image(image::ImageError::IoError(e))
            | Self::PngEncoding(png::EncodingError::IoError(e))
            | Self::Zip(zip::result::ZipError::Io(e)) => Ok(e),
            other => Err(other),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SaveLoadError {
    #[error("File does not exist: {}", .0.display())]
    NotFound(PathBuf),
    #[error("You do not have the necessary permissions to open file: {}", .0.display())]
    PermissionDenied(PathBuf),
    #[error("Unknown file format extension: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("{message}")]
    Io {
        message: String,
        /// The device ran out of space, which the underlying message tends not to make clear.
        hint_no_space: bool,
        #[source]
        source: std::io::Error,
    },
    #[error("{message}")]
    Codec {
        message: String,
        #[source]
        source: CodecError,
    },
    #[error("{0}")]
    Structural(String),
    #[error(transparent)]
    Layer(#[from] LayerError),
}

fn is_no_space(error: &std::io::Error) -> bool {
    // ENOSPC, or ERROR_HANDLE_DISK_FULL and ERROR_DISK_FULL.
    match error.raw_os_error() {
        Some(28) => !cfg!(windows),
        Some(39 | 112) => cfg!(windows),
        _ => false,
    }
}
pub(crate) fn saving_error(error: CodecError) -> SaveLoadError {
    let error = match error {
        CodecError::Structure(message) => return SaveLoadError::Structural(message),
        CodecError::Layer(e) => return SaveLoadError::Layer(e),
        other => other,
    };
    match error.into_io() {
        Ok(source) => {
            let hint_no_space = is_no_space(&source);
            let mut message = format!("Unable to save: {source}");
            if hint_no_space {
                message.push_str("\nDo you have enough space left on the device?");
            }
            SaveLoadError::Io {
                message,
                hint_no_space,
                source,
            }
        }
        Err(source) => SaveLoadError::Codec {
            message: format!("Unable to save: {source}"),
            source,
        },
    }
}
pub(crate) fn loading_error(error: CodecError) -> SaveLoadError {
    let error = match error {
        CodecError::Structure(message) => return SaveLoadError::Structural(message),
        CodecError::Layer(e) => return SaveLoadError::Layer(e),
        other => other,
    };
    match error.into_io() {
        Ok(source) => SaveLoadError::Io {
            message: format!("Error while loading: {source}"),
            hint_no_space: false,
            source,
        },
        Err(source) => SaveLoadError::Codec {
            message: format!("Error while loading: {source}"),
            source,
        },
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveOptions {
    /// For PNG, write one file per layer instead of the merged image.
    pub multifile: bool,
    /// For single PNGs, keep transparency. Otherwise flatten onto white.
    pub alpha: bool,
    /// JPEG quality, 1..=100. Defaults to the document's option.
    pub jpeg_quality: Option<u8>,
}
impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            multifile: false,
            alpha: true,
            jpeg_quality: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct LoadOptions {
    /// Refuse any single image with more pixels than this.
    pub max_pixels: Option<u64>,
}
impl LoadOptions {
    pub(crate) fn check_size(&self, width: u32, height: u32) -> Result<(), CodecError> {
        match self.max_pixels {
            Some(max) if u64::from(width) * u64::from(height) > max => {
                Err(CodecError::TooLarge(width, height))
            }
            _ => Ok(()),
        }
    }
}

type SaveFn =
    fn(&mut Document, &Path, &SaveOptions) -> Result<Option<image::RgbaImage>, CodecError>;
type LoadFn = fn(&mut Document, &Path, &LoadOptions) -> Result<(), CodecError>;

struct FormatHandler {
    /// Lowercase, without the dot.
    extensions: &'static [&'static str],
    save: SaveFn,
    load: LoadFn,
}

const FORMATS: &[FormatHandler] = &[
    FormatHandler {
        extensions: &["ora"],
        save: openraster::save,
        load: openraster::load,
    },
    FormatHandler {
        extensions: &["png"],
        save: raster::save_png,
        load: raster::load,
    },
    FormatHandler {
        extensions: &["jpg", "jpeg"],
        save: raster::save_jpeg,
        load: raster::load,
    },
];

fn handler_for(path: &Path) -> Result<&'static FormatHandler, SaveLoadError> {
    let ext = path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .map(str::to_ascii_lowercase);
    ext.and_then(|ext| {
        FORMATS
            .iter()
            .find(|format| format.extensions.contains(&ext.as_str()))
    })
    .ok_or_else(|| SaveLoadError::UnsupportedFormat(path.to_owned()))
}

/// Check that a file can be opened for reading, before any work is done on it.
pub(crate) fn check_readable(path: &Path) -> Result<(), SaveLoadError> {
    if !path.is_file() {
        return Err(SaveLoadError::NotFound(path.to_owned()));
    }
    match std::fs::File::open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(SaveLoadError::PermissionDenied(path.to_owned()))
        }
        Err(e) => Err(loading_error(e.into())),
    }
}

/// Write a file through a temporary in the same directory, replacing `path` only once `write`
/// has succeeded. The temporary is removed on failure.
pub(crate) fn write_via_tempfile<T>(
    path: &Path,
    write: impl FnOnce(&mut std::fs::File) -> Result<T, CodecError>,
) -> Result<T, CodecError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::Builder::new()
        .prefix(".paintdoc-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    let result = write(file.as_file_mut())?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(result)
}

fn file_size(path: &Path) -> String {
    use az::Az;
    std::fs::metadata(path).map_or_else(
        |_| "unknown size".to_owned(),
        |meta| human_bytes::human_bytes(meta.len().az::<f64>()),
    )
}

pub(crate) fn save(
    document: &mut Document,
    path: &Path,
    options: &SaveOptions,
) -> Result<Option<image::RgbaImage>, SaveLoadError> {
    let handler = handler_for(path)?;
    let started = std::time::Instant::now();
    log::info!("saving {}", path.display());
    let thumbnail = (handler.save)(document, path, options).map_err(|e| {
        log::error!("failed to save {}: {e}", path.display());
        saving_error(e)
    })?;
    log::info!(
        "saved {} ({}) in {:?}",
        path.display(),
        file_size(path),
        started.elapsed()
    );
    Ok(thumbnail)
}

pub(crate) fn load(
    document: &mut Document,
    path: &Path,
    options: &LoadOptions,
) -> Result<(), SaveLoadError> {
    check_readable(path)?;
    let handler = handler_for(path)?;
    let started = std::time::Instant::now();
    log::info!("loading {} ({})", path.display(), file_size(path));
    (handler.load)(document, path, options).map_err(|e| {
        log::error!("failed to load {}: {e}", path.display());
        loading_error(e)
    })?;
    log::info!("loaded {} in {:?}", path.display(), started.elapsed());
    Ok(())
}
