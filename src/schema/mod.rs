//! Type schemas, index mappings and the read-through cache in front of them

mod cache;
mod mapping;
mod provider;
mod types;

pub use cache::{SchemaCache, SchemaSnapshot};
pub use mapping::IndexMapping;
pub use provider::{
    schemas_from_profiles, DirectorySchemaProvider, HttpSchemaProvider, SchemaProvider,
    StaticSchemaProvider,
};
pub use types::{
    lookup_property, ColumnConfig, FacetConfig, PropertySchema, RangeBucket, TypeRegistry,
    TypeSchema, ROOT_TYPE,
};

/// `FileFormat` -> `file_format`
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;

    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else {
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
            out.push(ch);
        }
    }

    out
}
