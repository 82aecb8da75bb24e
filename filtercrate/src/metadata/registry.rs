/*!
# Metadata Registry

Per-class index and case-sensitivity facts, built once from a catalog and
read-only afterwards.

A process normally installs one registry at startup (or builds it lazily on
first use through [`get_or_build`]). Building is a pure function of the
catalog, so two threads racing to build simply produce equal registries and
the loser's copy is dropped.
*/

use super::catalog::{AnnotationIndex, EntityCatalog, PropertyDescriptor};
use super::mapping::ClassMapping;
use crate::errors::CompileError;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

static GLOBAL_REGISTRY: LazyLock<RwLock<Option<Arc<MetadataRegistry>>>> =
    LazyLock::new(|| RwLock::new(None));

pub struct MetadataRegistry {
    mappings: HashMap<String, ClassMapping>,
    catalog: Arc<dyn EntityCatalog>,
}

impl std::fmt::Debug for MetadataRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataRegistry")
            .field("classes", &self.mappings.len())
            .finish_non_exhaustive()
    }
}

impl MetadataRegistry {
    pub fn build(catalog: impl EntityCatalog + 'static) -> Self {
        Self::build_shared(Arc::new(catalog))
    }

    /// Build mappings for every concrete class, then fold in annotation indexes
    pub fn build_shared(catalog: Arc<dyn EntityCatalog>) -> Self {
        let mut mappings = HashMap::new();
        for entity in catalog.entities().iter().filter(|e| !e.is_abstract) {
            let mapping = ClassMapping::build(entity, catalog.as_ref());
            mappings.insert(entity.name.clone(), mapping);
        }

        let mut registry = Self { mappings, catalog };
        registry.apply_annotation_indexes();
        registry
    }

    fn apply_annotation_indexes(&mut self) {
        let catalog = Arc::clone(&self.catalog);
        let annotations = catalog.annotation_indexes();

        let mut root_classes: Vec<String> = self.mappings.keys().cloned().collect();
        root_classes.sort();

        for index in annotations {
            if !index.sub_classes {
                match self.mappings.get_mut(&index.class) {
                    Some(mapping) => mapping.apply_annotation_index(index),
                    None => tracing::warn!(class = %index.class, "No class mapping for annotation index"),
                }
                continue;
            }

            let declared: Vec<&AnnotationIndex> = annotations
                .iter()
                .filter(|other| other.class == index.class)
                .collect();

            for sub in &root_classes {
                if !catalog.is_assignable(&index.class, sub) {
                    continue;
                }
                if let Some(mapping) = self.mappings.get_mut(sub) {
                    if mapping.has_index_properties(&declared) {
                        mapping.apply_annotation_index(index);
                    }
                }
            }
        }
    }

    /// Mapping for a class that must be registered
    ///
    /// # Errors
    ///
    /// Returns `CompileError::MetadataNotFound` if the class is unknown or abstract.
    pub fn get(&self, class: &str) -> Result<&ClassMapping, CompileError> {
        self.mappings
            .get(class)
            .ok_or_else(|| CompileError::metadata_not_found(class))
    }

    #[must_use]
    pub fn find(&self, class: &str) -> Option<&ClassMapping> {
        self.mappings.get(class)
    }

    #[must_use]
    pub fn catalog(&self) -> &dyn EntityCatalog {
        self.catalog.as_ref()
    }

    /// Navigation lookup, including inherited properties
    #[must_use]
    pub fn property(&self, class: &str, name: &str) -> Option<&PropertyDescriptor> {
        self.catalog.property(class, name)
    }

    #[must_use]
    pub fn inverse_property(&self, owner: &str, collection: &str) -> Option<String> {
        self.catalog.inverse_property(owner, collection)
    }

    #[must_use]
    pub fn is_known_class(&self, class: &str) -> bool {
        self.catalog.entity(class).is_some()
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.mappings.keys().map(String::as_str)
    }
}

// ============================================================================
// Process-wide registry slot
// ============================================================================

/// Install `registry` as the process-wide registry, replacing any previous one
pub fn install(registry: MetadataRegistry) -> Arc<MetadataRegistry> {
    let registry = Arc::new(registry);
    let mut slot = GLOBAL_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    *slot = Some(Arc::clone(&registry));
    registry
}

/// The installed registry, if any
#[must_use]
pub fn global() -> Option<Arc<MetadataRegistry>> {
    GLOBAL_REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// The installed registry, building and installing one first if needed
///
/// `build` runs without holding the lock. If another thread installs a
/// registry in the meantime, that one wins and this build is discarded.
pub fn get_or_build<F>(build: F) -> Arc<MetadataRegistry>
where
    F: FnOnce() -> MetadataRegistry,
{
    if let Some(existing) = global() {
        return existing;
    }

    let built = Arc::new(build());

    let mut slot = GLOBAL_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    match slot.as_ref() {
        Some(existing) => {
            tracing::debug!("Metadata registry already built by another thread, discarding duplicate");
            Arc::clone(existing)
        }
        None => {
            *slot = Some(Arc::clone(&built));
            built
        }
    }
}

/// Remove the installed registry; intended for tests
pub fn reset() {
    let mut slot = GLOBAL_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    *slot = None;
}
