// Feature Group 2: Metadata Registry
// Entity catalog, per-class index facts and live index introspection

pub mod catalog;
pub mod introspect;
pub mod mapping;
pub mod registry;

pub use catalog::{
    AnnotationIndex, Catalog, EntityCatalog, EntityDescriptor, IndexDecl, PropertyDescriptor,
    PropertyKind,
};
pub use introspect::{TableIndexes, apply_database_indexes, load_table_indexes};
pub use mapping::{ClassMapping, PropertyMapping};
pub use registry::MetadataRegistry;
