//! Cascading side effects of alterations
//!
//! Expansion is a second pass over the complete list of primary differences.
//! Each difference is replaced by the changes it really needs: an index
//! alteration becomes a recreate, and altering a function or view first
//! recreates the unchanged objects bound to it. Knowing the whole primary set
//! up front is what keeps the cascade from recreating something that already
//! has its own change, or recreating the same object twice.

use std::collections::HashSet;

use crate::error::DacpacDiffError;
use crate::model::{is_similar, DatabaseModel, DependencyIndex, ModelId, ModelKind, ModuleKind};

use super::{find_counterpart, Difference, ExclusionRules};

/// Kinds that must be dropped and recreated when a module they use is altered
const CASCADE_KINDS: [ModelKind; 3] = [ModelKind::Default, ModelKind::Check, ModelKind::Module];

/// Shared state for expanding one run's differences
pub struct CascadeContext<'a> {
    current: &'a DatabaseModel,
    target_index: DependencyIndex<'a>,
    rules: ExclusionRules,
    /// Lowercased names of every object with a primary difference
    primary: HashSet<String>,
    /// Lowercased names already recreated by a cascade
    cascaded: HashSet<String>,
}

impl<'a> CascadeContext<'a> {
    pub fn new(
        current: &'a DatabaseModel,
        target: &'a DatabaseModel,
        primary: &[Difference<'a>],
    ) -> Self {
        let mut names = HashSet::new();
        for diff in primary {
            names.insert(diff.model().full_name().to_lowercase());
            if let Some(old) = diff.old_model() {
                names.insert(old.full_name().to_lowercase());
            }
        }

        Self {
            current,
            target_index: DependencyIndex::new(target),
            rules: ExclusionRules::default(),
            primary: names,
            cascaded: HashSet::new(),
        }
    }

    /// Leave excluded objects out of cascades
    pub fn with_rules(mut self, rules: &ExclusionRules) -> Self {
        self.rules = rules.clone();
        self
    }

    /// Recreates for the unchanged dependents of a target-side module
    fn dependents_to_recreate(&mut self, module: ModelId) -> Vec<Difference<'a>> {
        let target = self.target_index.db();
        let current = self.current;
        let mut diffs = Vec::new();

        for dep in self.target_index.find_all_dependents(module, &CASCADE_KINDS) {
            let dep_ref = target.get(dep);
            let name = dep_ref.full_name();
            let key = name.to_lowercase();

            if self.rules.is_excluded(target, dep) {
                tracing::warn!(dependent = %name, "Excluded dependent not recreated");
                continue;
            }

            // Only objects that exist unchanged before and after the run; anything
            // else already has its own drop, create or recreate
            let Some(cur_id) = find_counterpart(dep_ref, current) else {
                continue;
            };
            let cur_ref = current.get(cur_id);
            if !is_similar(dep_ref, cur_ref) || self.primary.contains(&key) {
                tracing::debug!(dependent = %name, "Dependent already changing");
                continue;
            }
            if !self.cascaded.insert(key) {
                continue;
            }

            tracing::debug!(dependent = %name, "Recreating dependent");
            diffs.push(Difference::Recreate {
                target: dep_ref,
                current: cur_ref,
            });
        }

        diffs
    }
}

/// Lazily computed follow-up changes of a difference
pub trait ChangeProvider<'a> {
    /// The changes that replace this one in the final script, in order
    fn additional_changes(
        &self,
        ctx: &mut CascadeContext<'a>,
    ) -> Result<Vec<Difference<'a>>, DacpacDiffError>;
}

impl<'a> ChangeProvider<'a> for Difference<'a> {
    fn additional_changes(
        &self,
        ctx: &mut CascadeContext<'a>,
    ) -> Result<Vec<Difference<'a>>, DacpacDiffError> {
        let (target, current) = match *self {
            Difference::Alter { target, current } => (target, current),
            Difference::Create(_) | Difference::Drop(_) | Difference::Recreate { .. } => {
                return Ok(vec![*self])
            }
        };

        match target.id() {
            ModelId::Field(_) => Ok(vec![*self]),
            ModelId::Module(m) => match target.db().module(m).kind {
                // No in-place alter exists for indexes
                ModuleKind::Index => Ok(vec![Difference::Recreate { target, current }]),
                ModuleKind::Function | ModuleKind::View => {
                    let mut diffs = ctx.dependents_to_recreate(target.id());
                    diffs.push(*self);
                    Ok(diffs)
                }
                ModuleKind::Procedure | ModuleKind::Trigger => Ok(vec![*self]),
            },
            ModelId::Schema(_)
            | ModelId::Table(_)
            | ModelId::Default(_)
            | ModelId::Check(_)
            | ModelId::Reference(_) => Err(DacpacDiffError::UnsupportedDifference {
                kind: target.kind_name(),
                action: self.action().to_string(),
                name: target.full_name(),
            }),
        }
    }
}

/// Replace every difference by its additional changes, keeping order
pub fn expand<'a>(
    diffs: &[Difference<'a>],
    ctx: &mut CascadeContext<'a>,
) -> Result<Vec<Difference<'a>>, DacpacDiffError> {
    let mut expanded = Vec::with_capacity(diffs.len());
    for diff in diffs {
        expanded.extend(diff.additional_changes(ctx)?);
    }
    Ok(expanded)
}
