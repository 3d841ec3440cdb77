//! Schema and object exclusion rules

use regex::Regex;

use crate::error::DacpacDiffError;
use crate::model::{DatabaseModel, ModelId};

/// Objects to leave out of a comparison.
///
/// Schemas are matched by name (brackets optional, case-insensitive). Object
/// patterns are matched against full names with `*` standing for any run of
/// characters, so `*].[Audit*` matches `[dbo].[AuditLog]`. Excluding an object
/// also excludes everything it owns (a table's fields, constraints and indexes).
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    schemas: Vec<String>,
    objects: Vec<Regex>,
}

fn strip_brackets(name: &str) -> &str {
    name.trim().trim_start_matches('[').trim_end_matches(']')
}

/// Translate a wildcard pattern into an anchored, case-insensitive regex
fn wildcard_to_regex(pattern: &str) -> Result<Regex, DacpacDiffError> {
    let body = pattern
        .trim()
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("(?i)^{}$", body)).map_err(|source| {
        DacpacDiffError::InvalidExcludePattern {
            pattern: pattern.to_string(),
            source,
        }
    })
}

impl ExclusionRules {
    pub fn new<S, O>(exclude_schemas: S, exclude_objects: O) -> Result<Self, DacpacDiffError>
    where
        S: IntoIterator,
        S::Item: AsRef<str>,
        O: IntoIterator,
        O::Item: AsRef<str>,
    {
        let schemas = exclude_schemas
            .into_iter()
            .map(|s| strip_brackets(s.as_ref()).to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        let objects = exclude_objects
            .into_iter()
            .filter(|p| !p.as_ref().trim().is_empty())
            .map(|p| wildcard_to_regex(p.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(Self { schemas, objects })
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty() && self.objects.is_empty()
    }

    pub fn is_schema_excluded(&self, name: &str) -> bool {
        let name = strip_brackets(name);
        self.schemas.iter().any(|s| s.eq_ignore_ascii_case(name))
    }

    /// True when `id`, or any object owning it, is excluded
    pub fn is_excluded(&self, db: &DatabaseModel, id: ModelId) -> bool {
        if self.is_empty() {
            return false;
        }
        if self.is_schema_excluded(&db.schema(db.schema_of(id)).name) {
            return true;
        }
        if self.objects.is_empty() {
            return false;
        }

        let mut next = Some(id);
        while let Some(current) = next {
            let full_name = db.full_name(current);
            if self.objects.iter().any(|re| re.is_match(&full_name)) {
                return true;
            }
            next = db.owner_of(current);
        }
        false
    }
}
