//! Catalog loading from local JSON files.

use crate::{
    catalog::Catalog,
    error::{CatalogError, Result},
    overlay::MetadataOverlay,
};
use kestrel_core::{CatalogConfig, SearchKind};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Loader for one local catalog file.
pub struct CatalogLoader {
    path: PathBuf,
}

impl CatalogLoader {
    /// Create a loader for the catalog at `path`.
    ///
    /// # Errors
    /// Returns [`CatalogError::NotFound`] if the file doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if !path.is_file() {
            return Err(CatalogError::NotFound {
                path: path.display().to_string(),
            });
        }

        Ok(Self { path })
    }

    /// Path of the catalog file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the catalog.
    ///
    /// Invalid rules are logged as warnings and excluded.
    ///
    /// # Errors
    /// Returns error if the file can't be read or is not a catalog document.
    pub fn load(&self) -> Result<Catalog> {
        let document = read_document(&self.path)?;
        let catalog = Catalog::from_document(self.path.display().to_string(), &document)?;

        info!(
            path = %self.path.display(),
            rules = catalog.len(),
            rejected = catalog.rejected().len(),
            hash = %catalog.content_hash(),
            "loaded catalog"
        );

        Ok(catalog)
    }

    /// Read the file as a metadata overlay.
    pub fn load_overlay(&self) -> Result<MetadataOverlay> {
        let document = read_document(&self.path)?;
        let overlay = MetadataOverlay::from_document(&self.path.display().to_string(), &document)?;

        debug!(
            path = %self.path.display(),
            entries = overlay.len(),
            "loaded metadata overlay"
        );

        Ok(overlay)
    }
}

/// Load the catalog for `kind` from the configured local paths, applying the
/// metadata overlay to the username catalog when one is configured.
///
/// A missing or unreadable overlay only costs metadata, so it is logged and
/// skipped; a missing main catalog is an error.
pub fn load_for_kind(config: &CatalogConfig, kind: SearchKind) -> Result<Catalog> {
    let catalog = CatalogLoader::new(&config.source(kind).local_path)?.load()?;

    let overlay_path = match (kind, &config.metadata) {
        (SearchKind::Username, Some(source)) => &source.local_path,
        _ => return Ok(catalog),
    };

    match CatalogLoader::new(overlay_path).and_then(|loader| loader.load_overlay()) {
        Ok(overlay) => Ok(catalog.with_metadata(&overlay)),
        Err(e) => {
            warn!(
                path = %overlay_path.display(),
                error = %e,
                "metadata overlay unavailable, continuing without it"
            );
            Ok(catalog)
        }
    }
}

/// Read a file and parse it as JSON.
pub(crate) fn read_document(path: &Path) -> Result<Value> {
    let contents = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            CatalogError::NotFound {
                path: path.display().to_string(),
            }
        } else {
            CatalogError::LoadError {
                path: path.display().to_string(),
                source,
            }
        }
    })?;

    serde_json::from_str(&contents).map_err(|source| CatalogError::ParseError {
        origin: path.display().to_string(),
        source,
    })
}
