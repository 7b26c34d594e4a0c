//! Canonicalization of raw search parameters

use super::error::{SearchError, SearchResult};
use super::params::{is_reserved, QueryParams};
use crate::schema::{TypeRegistry, ROOT_TYPE};
use tracing::debug;

/// Suffix that redirects link filters to the referenced document's label
pub const LINK_SUFFIX: &str = ".display_title";

/// Canonical parameters plus the resolved type list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    pub params: QueryParams,
    pub types: Vec<String>,
    pub query_string: String,
}

/// Resolve every requested type name, reporting all unknown names at once
fn resolve_types<'a>(
    registry: &TypeRegistry,
    names: impl IntoIterator<Item = &'a str>,
) -> SearchResult<Vec<String>> {
    let mut resolved = Vec::new();
    let mut invalid = Vec::new();

    for name in names {
        match registry.resolve(name) {
            Some(canonical) => {
                if !resolved.iter().any(|t| t == canonical) {
                    resolved.push(canonical.to_string());
                }
            }
            None => invalid.push(name.to_string()),
        }
    }

    if !invalid.is_empty() {
        return Err(SearchError::InvalidTypes(invalid));
    }

    Ok(resolved)
}

/// Field key with the link suffix applied when the field references another type.
///
/// A trailing negation marker stays at the very end (`lab!` -> `lab.display_title!`).
pub fn suffix_link_field(registry: &TypeRegistry, types: &[String], key: &str) -> String {
    let (base, negated) = match key.strip_suffix('!') {
        Some(base) => (base, true),
        None => (key, false),
    };

    let skip = base.ends_with(LINK_SUFFIX) || base.ends_with(".from") || base.ends_with(".to");
    let is_link = !skip
        && registry
            .property(types, base)
            .map(|p| p.is_link())
            .unwrap_or(false);

    if !is_link {
        return key.to_string();
    }

    let mut suffixed = format!("{}{}", base, LINK_SUFFIX);
    if negated {
        suffixed.push('!');
    }
    suffixed
}

/// Sort token with the link suffix applied; a leading `-` is kept
pub fn suffix_sort_token(registry: &TypeRegistry, types: &[String], token: &str) -> String {
    match token.strip_prefix('-') {
        Some(field) => format!("-{}", suffix_link_field(registry, types, field)),
        None => suffix_link_field(registry, types, token),
    }
}

/// Canonicalize `raw` for the given registry.
///
/// `forced_types` wins over any `type` parameter (collection-scoped searches);
/// the `type` parameters are rewritten to match it exactly.
pub fn normalize(
    raw: &QueryParams,
    forced_types: Option<&[String]>,
    registry: &TypeRegistry,
) -> SearchResult<NormalizedQuery> {
    let requested = raw.get_all("type");

    let types = match forced_types {
        Some(forced) if !forced.is_empty() => {
            let forced = resolve_types(registry, forced.iter().map(String::as_str))?;
            let requested_resolved: Vec<&str> = requested
                .iter()
                .filter_map(|t| registry.resolve(t))
                .collect();
            if !requested.is_empty() && requested_resolved != forced {
                debug!(
                    requested = ?requested,
                    forced = ?forced,
                    "Forced types override requested types"
                );
            }
            forced
        }
        _ if requested.is_empty() => vec![ROOT_TYPE.to_string()],
        _ => resolve_types(registry, requested.iter().copied())?,
    };

    let mut params = QueryParams::new();
    for t in &types {
        params.push("type", t.clone());
    }

    for (key, value) in raw.iter() {
        match key {
            "type" => {}
            "sort" => params.push(key, suffix_sort_token(registry, &types, value)),
            _ if is_reserved(key) => params.push(key, value),
            _ => params.push(suffix_link_field(registry, &types, key), value),
        }
    }

    let query_string = params.to_query_string();

    Ok(NormalizedQuery {
        params,
        types,
        query_string,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TypeSchema;
    use serde_json::json;

    fn registry() -> TypeRegistry {
        let sample: TypeSchema = serde_json::from_value(json!({
            "name": "Sample",
            "properties": {
                "status": {"type": "string"},
                "lab": {"type": "string", "linkTo": "Lab"},
                "files": {
                    "type": "array",
                    "items": {"type": "object", "properties": {"file": {"type": "string", "linkTo": "File"}}}
                }
            }
        }))
        .unwrap();
        let lab = TypeSchema {
            name: "Lab".to_string(),
            ..Default::default()
        };
        TypeRegistry::new(vec![sample, lab])
    }

    fn parse(q: &str) -> QueryParams {
        QueryParams::parse(q).unwrap()
    }

    #[test]
    fn test_type_aliases_resolve() {
        let normalized = normalize(&parse("type=sample&status=active"), None, &registry()).unwrap();
        assert_eq!(normalized.types, vec!["Sample"]);
        assert_eq!(normalized.query_string, "type=Sample&status=active");
    }

    #[test]
    fn test_missing_type_defaults_to_root() {
        let normalized = normalize(&parse("status=active"), None, &registry()).unwrap();
        assert_eq!(normalized.types, vec!["Item"]);
    }

    #[test]
    fn test_invalid_types_are_all_reported() {
        let err = normalize(&parse("type=Foo&type=Sample&type=Bar"), None, &registry()).unwrap_err();
        match err {
            SearchError::InvalidTypes(names) => assert_eq!(names, vec!["Foo", "Bar"]),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_forced_types_rewrite_type_params() {
        let forced = vec!["Lab".to_string()];
        let normalized =
            normalize(&parse("type=Sample&type=Sample&q=x"), Some(&forced), &registry()).unwrap();
        assert_eq!(normalized.types, vec!["Lab"]);
        assert_eq!(normalized.params.get_all("type"), vec!["Lab"]);
    }

    #[test]
    fn test_link_fields_get_label_suffix() {
        let normalized = normalize(
            &parse("type=Sample&lab=4DN&lab!=Other&files.file=abc&lab.display_title=x"),
            None,
            &registry(),
        )
        .unwrap();
        let keys: Vec<&str> = normalized.params.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                "type",
                "lab.display_title",
                "lab.display_title!",
                "files.file.display_title",
                "lab.display_title"
            ]
        );
    }

    #[test]
    fn test_sort_tokens_keep_descending_prefix() {
        let normalized = normalize(&parse("type=Sample&sort=-lab&sort=status"), None, &registry()).unwrap();
        assert_eq!(
            normalized.params.get_all("sort"),
            vec!["-lab.display_title", "status"]
        );
    }

    #[test]
    fn test_duplicate_values_are_preserved() {
        let normalized =
            normalize(&parse("type=Sample&status=a&status=a"), None, &registry()).unwrap();
        assert_eq!(normalized.params.get_all("status"), vec!["a", "a"]);
    }
}
