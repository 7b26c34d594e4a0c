//! Compound searches: filter blocks, flags and their combination

use super::error::{SearchError, SearchResult};
use super::params::QueryParams;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::Validate;

/// Named, reusable query fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Flag {
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    pub query: String,
}

/// One independently compiled query fragment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterBlock {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub flags_applied: Vec<String>,
}

/// `limit` as sent by clients: a count or `"all"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Limit {
    Count(i64),
    Keyword(String),
}

impl Limit {
    pub fn as_param(&self) -> String {
        match self {
            Limit::Count(n) => n.to_string(),
            Limit::Keyword(s) => s.clone(),
        }
    }
}

/// Body of `POST /compound_search`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CompoundSearchRequest {
    #[serde(default)]
    pub global_flags: Option<String>,
    #[validate(length(min = 1))]
    pub search_type: String,
    #[serde(default)]
    #[validate(nested)]
    pub flags: Vec<Flag>,
    #[serde(default)]
    pub filter_blocks: Vec<FilterBlock>,
    #[serde(default)]
    pub sort: Vec<String>,
    #[serde(default)]
    pub from: Option<i64>,
    #[serde(default)]
    pub limit: Option<Limit>,
    #[serde(default)]
    pub return_generator: bool,
    #[serde(default)]
    pub intersect: bool,
}

/// Validated compound request: every applied flag exists and flag names are unique
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSet {
    search_type: String,
    filter_blocks: Vec<FilterBlock>,
    flags: Vec<Flag>,
    sort: Vec<String>,
    global_flags: Option<String>,
    intersect: bool,
}

/// How a filter set turns into engine queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompoundPlan {
    /// One regular search
    Single(QueryParams),
    /// One query per block, joined with OR (or AND when intersecting)
    Blocks {
        blocks: Vec<QueryParams>,
        intersect: bool,
    },
}

impl FilterSet {
    pub fn from_request(request: &CompoundSearchRequest) -> SearchResult<Self> {
        let mut names = HashSet::new();
        for flag in &request.flags {
            if !names.insert(flag.name.as_str()) {
                return Err(SearchError::DuplicateFlag(flag.name.clone()));
            }
        }

        for (index, block) in request.filter_blocks.iter().enumerate() {
            if let Some(unknown) = block
                .flags_applied
                .iter()
                .find(|name| !names.contains(name.as_str()))
            {
                return Err(SearchError::UnknownFlag {
                    block: index,
                    flag: unknown.clone(),
                });
            }
        }

        Ok(Self {
            search_type: request.search_type.clone(),
            filter_blocks: request.filter_blocks.clone(),
            flags: request.flags.clone(),
            sort: request.sort.clone(),
            global_flags: request
                .global_flags
                .clone()
                .filter(|flags| !flags.trim().is_empty()),
            intersect: request.intersect,
        })
    }

    pub fn search_type(&self) -> &str {
        &self.search_type
    }

    pub fn filter_blocks(&self) -> &[FilterBlock] {
        &self.filter_blocks
    }

    pub fn intersect(&self) -> bool {
        self.intersect
    }

    fn flag_query(&self, name: &str) -> SearchResult<&str> {
        self.flags
            .iter()
            .find(|flag| flag.name == name)
            .map(|flag| flag.query.as_str())
            .ok_or_else(|| SearchError::UnknownFlag {
                block: 0,
                flag: name.to_string(),
            })
    }

    /// Type, block query, applied flags in order, then global flags and sort
    fn block_params(&self, block: Option<&FilterBlock>) -> SearchResult<QueryParams> {
        let mut params = QueryParams::new();
        params.push("type", self.search_type.clone());

        if let Some(block) = block {
            params.extend(QueryParams::parse(&block.query)?);
            for name in &block.flags_applied {
                params.extend(QueryParams::parse(self.flag_query(name)?)?);
            }
        }

        if let Some(global) = &self.global_flags {
            params.extend(QueryParams::parse(global)?);
        }

        for token in &self.sort {
            params.push("sort", token.clone());
        }

        Ok(params)
    }

    /// Resolve the request into a single search or a set of block searches
    pub fn plan(&self) -> SearchResult<CompoundPlan> {
        match self.filter_blocks.as_slice() {
            [] => Ok(CompoundPlan::Single(self.block_params(None)?)),
            [only] => Ok(CompoundPlan::Single(self.block_params(Some(only))?)),
            blocks => {
                let blocks = blocks
                    .iter()
                    .map(|block| self.block_params(Some(block)))
                    .collect::<SearchResult<Vec<_>>>()?;
                Ok(CompoundPlan::Blocks {
                    blocks,
                    intersect: self.intersect,
                })
            }
        }
    }
}
