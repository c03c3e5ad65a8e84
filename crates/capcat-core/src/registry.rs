use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use crate::behavior::SourceBehavior;
use crate::models::{Bundle, SourceDescriptor, SourceKind};

/// Loads declarative source descriptors from a directory of TOML files
/// and holds custom-source behavior implementations registered
/// in-process. Discovery is idempotent (`reload`) and tolerant: a
/// descriptor that fails validation is logged and omitted, other
/// sources continue to load.
pub struct SourceRegistry {
    sources_dir: Option<PathBuf>,
    descriptors: HashMap<String, SourceDescriptor>,
    custom_behaviors: HashMap<String, Arc<dyn SourceBehavior>>,
    bundles: HashMap<String, Bundle>,
}

impl SourceRegistry {
    pub fn new(sources_dir: Option<PathBuf>) -> Self {
        Self {
            sources_dir,
            descriptors: HashMap::new(),
            custom_behaviors: HashMap::new(),
            bundles: HashMap::new(),
        }
    }

    /// (Re)scan `sources_dir` for `*.toml` descriptor files. Clears any
    /// previously loaded declarative descriptors first so this can be
    /// called repeatedly (e.g. in a long-lived process or a test).
    pub fn reload(&mut self) -> std::io::Result<()> {
        self.descriptors
            .retain(|_, d| d.kind != SourceKind::Declarative);

        let Some(dir) = self.sources_dir.clone() else {
            return Ok(());
        };
        if !dir.exists() {
            return Ok(());
        }

        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            match self.load_descriptor_file(&path) {
                Ok(descriptor) => self.register_descriptor(descriptor),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to load source descriptor"),
            }
        }
        Ok(())
    }

    fn load_descriptor_file(&self, path: &Path) -> Result<SourceDescriptor, String> {
        let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        toml::from_str(&text).map_err(|e| e.to_string())
    }

    /// Validate and register a descriptor directly (used by tests and
    /// by callers that parse descriptors some other way). Invalid
    /// descriptors are logged and dropped, never panicking the caller.
    pub fn register_descriptor(&mut self, descriptor: SourceDescriptor) {
        if let Err(errors) = descriptor.validate() {
            warn!(source_id = %descriptor.source_id, ?errors, "descriptor failed validation, omitting");
            return;
        }
        self.descriptors.insert(descriptor.source_id.clone(), descriptor);
    }

    /// Register a custom source's behavior implementation alongside a
    /// minimal descriptor for identity/category/rate-limit purposes.
    pub fn register_custom(&mut self, descriptor: SourceDescriptor, behavior: Arc<dyn SourceBehavior>) {
        if let Err(errors) = descriptor.validate() {
            warn!(source_id = %descriptor.source_id, ?errors, "custom descriptor failed validation, omitting");
            return;
        }
        self.custom_behaviors
            .insert(descriptor.source_id.clone(), behavior);
        self.descriptors.insert(descriptor.source_id.clone(), descriptor);
    }

    pub fn register_bundle(&mut self, bundle: Bundle) {
        self.bundles.insert(bundle.name.clone(), bundle);
    }

    pub fn get(&self, source_id: &str) -> Option<&SourceDescriptor> {
        self.descriptors.get(source_id)
    }

    pub fn custom_behavior(&self, source_id: &str) -> Option<Arc<dyn SourceBehavior>> {
        self.custom_behaviors.get(source_id).cloned()
    }

    pub fn all(&self) -> Vec<&SourceDescriptor> {
        let mut v: Vec<_> = self.descriptors.values().collect();
        v.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        v
    }

    /// Resolve a bundle name to its member source IDs, delegated to the
    /// (optional) bundle store. Returns `None` if no such bundle exists.
    pub fn bundle_members(&self, bundle_name: &str) -> Option<&[String]> {
        self.bundles.get(bundle_name).map(|b| b.sources.as_slice())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
