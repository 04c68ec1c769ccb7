//! The template store: named templates loaded from a watched directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::error::{PolicyError, PolicyResult};
use crate::template::{Template, Validation, validate};

/// Holds the live set of templates, keyed by template name.
///
/// Snapshots are copy-on-write: `get` hands out an `Arc<Template>`, so a
/// reload never mutates a template an in-flight decision is reading.
#[derive(Debug, Default)]
pub struct TemplateStore {
    templates: RwLock<HashMap<String, Arc<Template>>>,
    /// Which file each template came from, for removal handling.
    files: RwLock<HashMap<PathBuf, String>>,
}

impl TemplateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `.yaml`/`.yml` file in a directory.
    ///
    /// Files that fail validation are skipped with a warning; the scan
    /// itself only fails if the directory cannot be read.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::TemplateIo`] if the directory is unreadable.
    pub fn load_dir(&self, dir: &Path) -> PolicyResult<usize> {
        let entries = std::fs::read_dir(dir).map_err(|e| PolicyError::TemplateIo {
            path: dir.display().to_string(),
            source: e,
        })?;

        let mut loaded = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_template_file(&path) {
                continue;
            }
            match self.reload_file(&path) {
                Ok(name) => {
                    info!(template = %name, file = %path.display(), "template loaded");
                    loaded = loaded.saturating_add(1);
                },
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping template file");
                },
            }
        }
        Ok(loaded)
    }

    /// Re-read one template file and swap it into the live set.
    ///
    /// On any failure the previously loaded template (if one exists for this
    /// file) remains in effect.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::TemplateIo`] if the file is unreadable, or
    /// [`PolicyError::InvalidTemplate`] if validation fails.
    pub fn reload_file(&self, path: &Path) -> PolicyResult<String> {
        let text = std::fs::read_to_string(path).map_err(|e| PolicyError::TemplateIo {
            path: path.display().to_string(),
            source: e,
        })?;

        let validation = validate(&text);
        for warning in &validation.warnings {
            warn!(file = %path.display(), "template warning: {warning}");
        }
        let Some(template) = validation.parsed else {
            return Err(PolicyError::InvalidTemplate(
                validation.errors.join("; "),
            ));
        };

        let name = template.name.clone();
        {
            let mut templates = self.templates.write().unwrap_or_else(|e| e.into_inner());
            let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());

            // A rename of the template inside the same file retires the old name.
            if let Some(old_name) = files.insert(path.to_path_buf(), name.clone()) {
                if old_name != name {
                    templates.remove(&old_name);
                }
            }
            templates.insert(name.clone(), Arc::new(template));
        }
        Ok(name)
    }

    /// Drop the template that came from a now-deleted file.
    pub fn remove_file(&self, path: &Path) {
        let mut templates = self.templates.write().unwrap_or_else(|e| e.into_inner());
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        if let Some(name) = files.remove(path) {
            templates.remove(&name);
            info!(template = %name, file = %path.display(), "template removed");
        }
    }

    /// Get a template by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Template>> {
        self.templates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// All templates, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<Template>> {
        let templates = self.templates.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = templates.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Number of loaded templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Whether the store holds no templates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validate a YAML body without touching the live set.
    #[must_use]
    pub fn validate_yaml(&self, yaml_text: &str) -> Validation {
        validate(yaml_text)
    }
}

/// Whether a path looks like a template file.
#[must_use]
pub(crate) fn is_template_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
}
