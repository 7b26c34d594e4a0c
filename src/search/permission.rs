//! Permission filter and the post-construction guard that verifies it

use super::error::{SearchError, SearchResult};
use super::query::{BoolQuery, QueryNode};
use serde_json::{json, Value};
use tracing::error;

/// Physical field listing the principals allowed to view a document
pub const PERMISSION_FIELD: &str = "principals_allowed.view";

/// Restriction of results to the caller's effective principals.
///
/// Kept as its own node type so tree-merging code has no way to fold it into
/// another clause; only the builder places it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionFilter {
    principals: Vec<String>,
}

impl PermissionFilter {
    pub fn new(principals: Vec<String>) -> Self {
        Self { principals }
    }

    pub fn principals(&self) -> &[String] {
        &self.principals
    }

    pub fn to_json(&self) -> Value {
        json!({ "terms": { PERMISSION_FIELD: self.principals } })
    }
}

/// Compiled single-search shape: `bool { filter: [bool { must: [...] }] }`
fn filter_must(node: &QueryNode) -> Option<&Vec<QueryNode>> {
    let QueryNode::Bool(outer) = node else {
        return None;
    };
    outer.filter.iter().find_map(|f| match f {
        QueryNode::Bool(inner) => Some(&inner.must),
        _ => None,
    })
}

fn check_branch(branch: &QueryNode, principals: &[String], label: &str) -> SearchResult<()> {
    let must = filter_must(branch).ok_or_else(|| {
        SearchError::PermissionViolation(format!("{}: no filter clause found", label))
    })?;

    let permissions: Vec<&PermissionFilter> = must
        .iter()
        .filter_map(|clause| match clause {
            QueryNode::Permission(p) => Some(p),
            _ => None,
        })
        .collect();

    match permissions.as_slice() {
        [] => Err(SearchError::PermissionViolation(format!(
            "{}: permission filter missing",
            label
        ))),
        [only] if only.principals() == principals => Ok(()),
        [only] => Err(SearchError::PermissionViolation(format!(
            "{}: permission filter altered ({} principals, expected {})",
            label,
            only.principals().len(),
            principals.len()
        ))),
        many => Err(SearchError::PermissionViolation(format!(
            "{}: permission filter duplicated {} times",
            label,
            many.len()
        ))),
    }
}

fn compound_branches(query: &BoolQuery) -> Option<&Vec<QueryNode>> {
    if !query.filter.is_empty() {
        return None;
    }
    match (query.should.is_empty(), query.must.is_empty()) {
        (false, true) => Some(&query.should),
        (true, false) => Some(&query.must),
        _ => None,
    }
}

/// Verify the compiled query still carries the caller's exact principal list.
///
/// Single searches are checked at the top-level filter; compound searches have
/// every block branch checked. Any mismatch is fatal.
pub fn verify_permissions(query: &QueryNode, principals: &[String]) -> SearchResult<()> {
    let result = match query {
        QueryNode::Bool(outer) if filter_must(query).is_none() => match compound_branches(outer) {
            Some(branches) if !branches.is_empty() => branches
                .iter()
                .enumerate()
                .try_for_each(|(i, branch)| check_branch(branch, principals, &format!("block {}", i))),
            _ => Err(SearchError::PermissionViolation(
                "query has no filter clause".to_string(),
            )),
        },
        _ => check_branch(query, principals, "query"),
    };

    if let Err(err) = &result {
        error!(error = %err, "Permission guard rejected compiled query");
    }

    result
}
