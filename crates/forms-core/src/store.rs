//! Saved-form persistence
//!
//! The collection is append-only apart from explicit deletes and keeps save
//! order, so `list` returns forms oldest first.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::config::FormsConfig;
use crate::domain::FormSchema;
use crate::{FormsError, Result};

/// Form repository trait
#[async_trait]
pub trait FormRepository: Send + Sync {
    /// All saved forms in save order
    async fn list(&self) -> Result<Vec<FormSchema>>;

    /// Get form by ID
    async fn get(&self, id: &str) -> Result<FormSchema>;

    /// Append a newly saved form
    async fn append(&self, form: &FormSchema) -> Result<()>;

    /// Delete form by ID
    async fn delete(&self, id: &str) -> Result<()>;
}

/// In-memory form repository (for testing and embedding)
#[derive(Default)]
pub struct InMemoryFormRepository {
    forms: RwLock<Vec<FormSchema>>,
}

impl InMemoryFormRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FormRepository for InMemoryFormRepository {
    async fn list(&self) -> Result<Vec<FormSchema>> {
        Ok(self.forms.read().clone())
    }

    async fn get(&self, id: &str) -> Result<FormSchema> {
        self.forms
            .read()
            .iter()
            .find(|f| f.id() == id)
            .cloned()
            .ok_or_else(|| FormsError::FormNotFound(id.to_string()))
    }

    async fn append(&self, form: &FormSchema) -> Result<()> {
        self.forms.write().push(form.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut forms = self.forms.write();
        let before = forms.len();
        forms.retain(|f| f.id() != id);
        if forms.len() == before {
            return Err(FormsError::FormNotFound(id.to_string()));
        }
        Ok(())
    }
}

/// Whole collection stored as one JSON array under the configured key.
///
/// Every write stages the whole collection in a sibling file and renames
/// it over the original. A missing file reads as an empty collection.
pub struct JsonFileFormRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileFormRepository {
    pub fn new(config: &FormsConfig) -> Self {
        Self {
            path: config.storage_path(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn load(&self) -> Result<Vec<FormSchema>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, forms: &[FormSchema]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }
        let json = serde_json::to_string_pretty(forms)?;
        let staging = self.staging_path();
        let storage_error =
            |e: std::io::Error| FormsError::StorageError(format!("{}: {}", self.path.display(), e));

        // Readers see either the previous collection or the new one
        tokio::fs::write(&staging, json).await.map_err(storage_error)?;
        if let Err(e) = tokio::fs::rename(&staging, &self.path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(storage_error(e));
        }
        Ok(())
    }

    /// Sibling of the storage file, so the final rename stays on one filesystem
    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl FormRepository for JsonFileFormRepository {
    async fn list(&self) -> Result<Vec<FormSchema>> {
        self.load().await
    }

    async fn get(&self, id: &str) -> Result<FormSchema> {
        self.load()
            .await?
            .into_iter()
            .find(|f| f.id() == id)
            .ok_or_else(|| FormsError::FormNotFound(id.to_string()))
    }

    async fn append(&self, form: &FormSchema) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut forms = self.load().await?;
        forms.push(form.clone());
        self.store(&forms).await?;
        tracing::info!(form_id = form.id(), total = forms.len(), path = %self.path.display(), "Form appended");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut forms = self.load().await?;
        let before = forms.len();
        forms.retain(|f| f.id() != id);
        if forms.len() == before {
            return Err(FormsError::FormNotFound(id.to_string()));
        }
        self.store(&forms).await?;
        tracing::info!(form_id = id, total = forms.len(), "Form deleted");
        Ok(())
    }
}
