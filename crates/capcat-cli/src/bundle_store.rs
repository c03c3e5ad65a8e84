use std::collections::HashMap;
use std::path::{Path, PathBuf};

use capcat_core::Bundle;
use serde::{Deserialize, Serialize};

/// File-backed bundle storage: a single TOML document keyed by bundle
/// name. Lives in the CLI rather than the core (§1 treats bundle CRUD
/// and config file I/O as external collaborators); the core only ever
/// consumes the resolved `sources` list via `SourceRegistry::register_bundle`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct BundleFile {
    #[serde(default)]
    bundles: HashMap<String, StoredBundle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredBundle {
    #[serde(default)]
    description: String,
    #[serde(default = "default_count")]
    default_count: u32,
    sources: Vec<String>,
}

fn default_count() -> u32 {
    5
}

pub struct BundleStore {
    path: PathBuf,
    file: BundleFile,
}

impl BundleStore {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            toml::from_str(&text)?
        } else {
            BundleFile::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    fn save(&self) -> anyhow::Result<()> {
        let text = toml::to_string_pretty(&self.file)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Bundle> {
        self.file.bundles.get(name).map(|b| Bundle {
            name: name.to_string(),
            description: b.description.clone(),
            default_count: b.default_count,
            sources: b.sources.clone(),
        })
    }

    pub fn upsert(&mut self, name: &str, description: String, default_count: u32, sources: Vec<String>) -> anyhow::Result<()> {
        self.file.bundles.insert(
            name.to_string(),
            StoredBundle {
                description,
                default_count,
                sources,
            },
        );
        self.save()
    }

    pub fn remove(&mut self, name: &str) -> anyhow::Result<bool> {
        let removed = self.file.bundles.remove(name).is_some();
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn list(&self) -> Vec<Bundle> {
        let mut names: Vec<&String> = self.file.bundles.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| self.get(name).expect("key came from the map"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundles.toml");
        let mut store = BundleStore::load(&path).unwrap();
        store
            .upsert("morning", "Morning reads".to_string(), 5, vec!["a".to_string(), "b".to_string()])
            .unwrap();

        let reloaded = BundleStore::load(&path).unwrap();
        let bundle = reloaded.get("morning").unwrap();
        assert_eq!(bundle.sources, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(bundle.default_count, 5);
    }

    #[test]
    fn remove_missing_bundle_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundles.toml");
        let mut store = BundleStore::load(&path).unwrap();
        assert!(!store.remove("nope").unwrap());
    }

    #[test]
    fn list_is_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundles.toml");
        let mut store = BundleStore::load(&path).unwrap();
        store.upsert("zzz", "".to_string(), 5, vec![]).unwrap();
        store.upsert("aaa", "".to_string(), 5, vec![]).unwrap();
        let names: Vec<String> = store.list().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["aaa".to_string(), "zzz".to_string()]);
    }
}
