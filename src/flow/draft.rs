//! Draft snapshots so a half-filled form survives a restart.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
};

pub const INTAKE_KEY: &str = "step1_data";
pub const CONTINUATION_KEY: &str = "step2_data";

/// Everything the user has typed so far.
///
/// In the continuation flow `details` holds the description. The audio path
/// returned by transcription is deliberately not part of the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DraftForm {
    pub selected_categories: Vec<String>,
    #[serde(alias = "customText")]
    pub free_text: String,
    pub company: String,
    #[serde(alias = "transcript")]
    pub details: String,
    pub email: String,
}

impl DraftForm {
    /// Add `item` if absent, remove it if present. Insertion order is kept.
    pub fn toggle(&mut self, item: &str) {
        if let Some(index) = self.selected_categories.iter().position(|c| c == item) {
            self.selected_categories.remove(index);
        } else {
            self.selected_categories.push(item.to_string());
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub trait DraftStore: Send + Sync {
    /// # Errors
    /// Returns an error if a stored snapshot exists but cannot be read.
    fn load(&self, key: &str) -> Result<Option<DraftForm>>;

    /// # Errors
    /// Returns an error if the snapshot cannot be written.
    fn save(&self, key: &str, form: &DraftForm) -> Result<()>;

    /// # Errors
    /// Returns an error if an existing snapshot cannot be removed.
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryDraftStore {
    drafts: Mutex<HashMap<String, DraftForm>>,
}

impl MemoryDraftStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DraftStore for MemoryDraftStore {
    fn load(&self, key: &str) -> Result<Option<DraftForm>> {
        let drafts = self
            .drafts
            .lock()
            .map_err(|_| anyhow!("draft store lock poisoned"))?;
        Ok(drafts.get(key).cloned())
    }

    fn save(&self, key: &str, form: &DraftForm) -> Result<()> {
        self.drafts
            .lock()
            .map_err(|_| anyhow!("draft store lock poisoned"))?
            .insert(key.to_string(), form.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.drafts
            .lock()
            .map_err(|_| anyhow!("draft store lock poisoned"))?
            .remove(key);
        Ok(())
    }
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileDraftStore {
    dir: PathBuf,
}

impl FileDraftStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl DraftStore for FileDraftStore {
    fn load(&self, key: &str) -> Result<Option<DraftForm>> {
        let path = self.path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        let form = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse draft {}", path.display()))?;
        Ok(Some(form))
    }

    fn save(&self, key: &str, form: &DraftForm) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(form)?;
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("Failed to replace {}", path.display()))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DraftForm {
        DraftForm {
            selected_categories: vec!["Cancel something".to_string()],
            free_text: "gym membership".to_string(),
            company: "Planet Fitness".to_string(),
            details: String::new(),
            email: "a@b.com".to_string(),
        }
    }

    #[test]
    fn toggle_twice_restores_selection() {
        let mut form = sample();
        let before = form.selected_categories.clone();
        form.toggle("Billing issue or dispute");
        assert_eq!(form.selected_categories.len(), 2);
        form.toggle("Billing issue or dispute");
        assert_eq!(form.selected_categories, before);

        form.toggle("Cancel something");
        assert!(form.selected_categories.is_empty());
    }

    #[test]
    fn memory_store_round_trip() -> Result<()> {
        let store = MemoryDraftStore::new();
        assert_eq!(store.load(INTAKE_KEY)?, None);
        store.save(INTAKE_KEY, &sample())?;
        assert_eq!(store.load(INTAKE_KEY)?, Some(sample()));
        assert_eq!(store.load(CONTINUATION_KEY)?, None);
        store.remove(INTAKE_KEY)?;
        assert_eq!(store.load(INTAKE_KEY)?, None);
        Ok(())
    }

    #[test]
    fn file_store_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileDraftStore::new(dir.path().join("drafts"));

        assert_eq!(store.load(INTAKE_KEY)?, None);
        store.remove(INTAKE_KEY)?;

        store.save(INTAKE_KEY, &sample())?;
        assert!(store.dir().join("step1_data.json").exists());
        assert_eq!(store.load(INTAKE_KEY)?, Some(sample()));

        store.remove(INTAKE_KEY)?;
        assert_eq!(store.load(INTAKE_KEY)?, None);
        Ok(())
    }

    #[test]
    fn file_store_reports_corrupt_snapshot() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("step2_data.json"), "{not json")?;
        let store = FileDraftStore::new(dir.path());
        assert!(store.load(CONTINUATION_KEY).is_err());
        Ok(())
    }

    #[test]
    fn reads_legacy_field_names() -> Result<()> {
        let form: DraftForm = serde_json::from_str(
            r#"{"selectedCategories":["Other"],"customText":"x","company":"Acme","transcript":"help"}"#,
        )?;
        assert_eq!(form.selected_categories, vec!["Other".to_string()]);
        assert_eq!(form.free_text, "x");
        assert_eq!(form.details, "help");
        assert!(form.email.is_empty());
        Ok(())
    }
}
