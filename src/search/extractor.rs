//! Field filter extraction from canonical parameters

use super::config::SearchConfig;
use super::error::{SearchError, SearchResult};
use super::normalizer::NormalizedQuery;
use super::params::{is_reserved, QueryParams, NO_VALUE};
use super::permission::PermissionFilter;
use crate::schema::TypeRegistry;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Physical field holding the type hierarchy
pub const TYPE_FIELD: &str = "embedded.@type.raw";

/// Physical field holding document status
pub const STATUS_FIELD: &str = "embedded.status.raw";

/// Engine date format used for range bounds
pub const DATE_FORMAT: &str = "yyyy-MM-dd HH:mm";

const CHRONO_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Keyword field used for term filters and terms aggregations
pub fn term_field(field: &str) -> String {
    if field == "type" || field == "@type" {
        TYPE_FIELD.to_string()
    } else {
        format!("embedded.{}.raw", field)
    }
}

/// Value field used for range filters and stats aggregations
pub fn range_field(field: &str) -> String {
    format!("embedded.{}", field)
}

/// How documents lacking the field are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Presence {
    #[default]
    Unset,
    /// Include documents missing the field (OR'd with the positive terms)
    RequireMissing,
    /// Exclude documents missing the field (besides the negative terms)
    ExcludeMissing,
}

/// Term constraints on one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub query_field: String,
    pub must_terms: BTreeSet<String>,
    pub must_not_terms: BTreeSet<String>,
    pub presence: Presence,
}

impl FieldFilter {
    pub fn new(query_field: impl Into<String>) -> Self {
        Self {
            query_field: query_field.into(),
            must_terms: BTreeSet::new(),
            must_not_terms: BTreeSet::new(),
            presence: Presence::Unset,
        }
    }
}

/// One bound of a range filter
#[derive(Debug, Clone, PartialEq)]
pub enum RangeValue {
    Number(f64),
    /// Normalized `yyyy-MM-dd HH:mm`
    Date(String),
}

impl RangeValue {
    pub fn to_json(&self) -> Value {
        match self {
            RangeValue::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => json!(*n as i64),
            RangeValue::Number(n) => json!(n),
            RangeValue::Date(d) => json!(d),
        }
    }

    fn compare(&self, other: &RangeValue) -> Option<Ordering> {
        match (self, other) {
            (RangeValue::Number(a), RangeValue::Number(b)) => a.partial_cmp(b),
            (RangeValue::Date(a), RangeValue::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Bounds on one numeric or date field
#[derive(Debug, Clone, PartialEq)]
pub struct RangeFilter {
    pub query_field: String,
    pub gte: Option<RangeValue>,
    pub lte: Option<RangeValue>,
    pub date_format: Option<String>,
}

impl RangeFilter {
    pub fn new(query_field: impl Into<String>) -> Self {
        Self {
            query_field: query_field.into(),
            gte: None,
            lte: None,
            date_format: None,
        }
    }

    /// Set the lower bound unless an existing one is already lower
    pub fn widen_lower(&mut self, value: RangeValue) {
        let replace = match &self.gte {
            Some(current) => value.compare(current) == Some(Ordering::Less),
            None => true,
        };
        if replace {
            self.gte = Some(value);
        }
    }

    /// Set the upper bound unless an existing one is already higher
    pub fn widen_upper(&mut self, value: RangeValue) {
        let replace = match &self.lte {
            Some(current) => value.compare(current) == Some(Ordering::Greater),
            None => true,
        };
        if replace {
            self.lte = Some(value);
        }
    }
}

/// An active user filter and the link that removes it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedFilter {
    pub field: String,
    pub term: String,
    pub remove: String,
}

/// Output of the extraction pass
#[derive(Debug, Clone)]
pub struct ExtractedFilters {
    pub permission: PermissionFilter,
    /// Exclusions applied to every search; kept apart from user filters on
    /// the same field
    pub baseline: Vec<FieldFilter>,
    /// Term filters; the type scope first, then user filters in parameter order
    pub fields: Vec<FieldFilter>,
    pub ranges: Vec<RangeFilter>,
    pub applied: Vec<AppliedFilter>,
    /// Free-text query
    pub text: Option<String>,
}

impl ExtractedFilters {
    fn field_mut(&mut self, query_field: &str) -> &mut FieldFilter {
        let index = match self.fields.iter().position(|f| f.query_field == query_field) {
            Some(index) => index,
            None => {
                self.fields.push(FieldFilter::new(query_field));
                self.fields.len() - 1
            }
        };
        &mut self.fields[index]
    }

    fn range_mut(&mut self, query_field: &str) -> &mut RangeFilter {
        let index = match self.ranges.iter().position(|r| r.query_field == query_field) {
            Some(index) => index,
            None => {
                self.ranges.push(RangeFilter::new(query_field));
                self.ranges.len() - 1
            }
        };
        &mut self.ranges[index]
    }

    pub fn field(&self, query_field: &str) -> Option<&FieldFilter> {
        self.fields.iter().find(|f| f.query_field == query_field)
    }

    pub fn baseline(&self, query_field: &str) -> Option<&FieldFilter> {
        self.baseline.iter().find(|f| f.query_field == query_field)
    }

    pub fn range(&self, query_field: &str) -> Option<&RangeFilter> {
        self.ranges.iter().find(|r| r.query_field == query_field)
    }
}

fn parse_date_bound(value: &str, upper: bool) -> SearchResult<String> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let time = if upper { "23:59" } else { "00:00" };
        return Ok(format!("{} {}", date.format("%Y-%m-%d"), time));
    }

    for format in [CHRONO_DATE_FORMAT, "%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed.format(CHRONO_DATE_FORMAT).to_string());
        }
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.naive_utc().format(CHRONO_DATE_FORMAT).to_string());
    }

    Err(SearchError::BadRequest(format!("Invalid date value '{}'", value)))
}

/// Type scope plus the hidden-type and hidden-status exclusions
fn seed_baseline(
    filters: &mut ExtractedFilters,
    params: &QueryParams,
    types: &[String],
    config: &SearchConfig,
) {
    filters
        .field_mut(TYPE_FIELD)
        .must_terms
        .extend(types.iter().cloned());

    let mut internal = FieldFilter::new(TYPE_FIELD);
    internal.must_not_terms.extend(
        config
            .internal_types
            .iter()
            .filter(|t| !types.contains(t))
            .cloned(),
    );

    let requested_statuses = params.get_all("status");
    let mut hidden = FieldFilter::new(STATUS_FIELD);
    hidden.must_not_terms.extend(
        config
            .excluded_statuses
            .iter()
            .filter(|s| !requested_statuses.contains(&s.as_str()))
            .cloned(),
    );

    filters.baseline = [internal, hidden]
        .into_iter()
        .filter(|f| !f.must_not_terms.is_empty())
        .collect();
}

/// Split canonical parameters into term and range filters
pub fn extract_filters(
    normalized: &NormalizedQuery,
    registry: &TypeRegistry,
    principals: &[String],
    config: &SearchConfig,
) -> SearchResult<ExtractedFilters> {
    let params = &normalized.params;
    let types = &normalized.types;

    let mut filters = ExtractedFilters {
        permission: PermissionFilter::new(principals.to_vec()),
        baseline: Vec::new(),
        fields: Vec::new(),
        ranges: Vec::new(),
        applied: Vec::new(),
        text: None,
    };

    seed_baseline(&mut filters, params, types, config);

    let mut text = Vec::new();

    for (key, value) in params.iter() {
        if key == "q" {
            if !value.trim().is_empty() {
                text.push(value.trim().to_string());
            }
            continue;
        }

        if key == "type" {
            if !value.eq_ignore_ascii_case(crate::schema::ROOT_TYPE) {
                filters.applied.push(AppliedFilter {
                    field: key.to_string(),
                    term: value.to_string(),
                    remove: format!("?{}", params.without_pair(key, value).to_query_string()),
                });
            }
            continue;
        }

        if is_reserved(key) {
            continue;
        }

        let (base, negated) = match key.strip_suffix('!') {
            Some(base) => (base, true),
            None => (key, false),
        };

        let range_bound = base
            .strip_suffix(".from")
            .map(|f| (f, false))
            .or_else(|| base.strip_suffix(".to").map(|f| (f, true)));

        let range_property = range_bound.and_then(|(field, upper)| {
            registry
                .property(types, field)
                .filter(|p| p.is_rangeable())
                .map(|p| (field, upper, p.is_date()))
        });

        if let Some((field, upper, is_date)) = range_property {
            let bound = if is_date {
                RangeValue::Date(parse_date_bound(value, upper)?)
            } else {
                let number: f64 = value.trim().parse().map_err(|_| {
                    SearchError::BadRequest(format!("Invalid numeric value '{}' for {}", value, key))
                })?;
                RangeValue::Number(number)
            };

            let range = filters.range_mut(&range_field(field));
            if is_date {
                range.date_format = Some(DATE_FORMAT.to_string());
            }
            if upper {
                range.widen_upper(bound);
            } else {
                range.widen_lower(bound);
            }
        } else {
            let field = filters.field_mut(&term_field(base));
            match (value == NO_VALUE, negated) {
                (true, false) => field.presence = Presence::RequireMissing,
                (true, true) => field.presence = Presence::ExcludeMissing,
                (false, false) => {
                    field.must_terms.insert(value.to_string());
                }
                (false, true) => {
                    field.must_not_terms.insert(value.to_string());
                }
            }
        }

        filters.applied.push(AppliedFilter {
            field: key.to_string(),
            term: value.to_string(),
            remove: format!("?{}", params.without_pair(key, value).to_query_string()),
        });
    }

    if !text.is_empty() {
        filters.text = Some(text.join(" "));
    }

    Ok(filters)
}
