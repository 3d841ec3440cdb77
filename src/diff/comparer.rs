//! Primary schema comparison
//!
//! Objects are matched by full name within each category. Categories are
//! independent, so they are compared in parallel and concatenated in a fixed
//! order; [`order_differences`](super::order_differences) decides the final
//! sequence.

use rayon::prelude::*;

use crate::model::{is_similar, DatabaseModel, ModelId, ModelKind, ModelRef};

use super::{Difference, ExclusionRules};

/// Categories in the order their results are concatenated
const CATEGORIES: [ModelKind; 7] = [
    ModelKind::Schema,
    ModelKind::Table,
    ModelKind::Field,
    ModelKind::Module,
    ModelKind::Default,
    ModelKind::Check,
    ModelKind::Reference,
];

/// Find the object in `db` that corresponds to `model`.
///
/// Defaults and references are matched through their field so that renaming
/// the constraint is seen as a change rather than a drop and a create.
pub fn find_counterpart(model: ModelRef<'_>, db: &DatabaseModel) -> Option<ModelId> {
    let source = model.db();
    match model.id() {
        ModelId::Default(f) => match db.try_get(&source.full_name(ModelId::Field(f)))? {
            ModelId::Field(other) if db.default_of(other).is_some() => Some(ModelId::Default(other)),
            _ => None,
        },
        ModelId::Reference(f) => match db.try_get(&source.full_name(ModelId::Field(f)))? {
            ModelId::Field(other) if db.reference_of(other).is_some() => {
                Some(ModelId::Reference(other))
            }
            _ => None,
        },
        id => db
            .try_get(&model.full_name())
            .filter(|other| other.kind() == id.kind()),
    }
}

fn ids_of_kind(db: &DatabaseModel, kind: ModelKind) -> Vec<ModelId> {
    match kind {
        ModelKind::Schema => db.schema_ids().map(ModelId::Schema).collect(),
        ModelKind::Table => db.table_ids().map(ModelId::Table).collect(),
        ModelKind::Field => db.field_ids().map(ModelId::Field).collect(),
        ModelKind::Module => db.module_ids().map(ModelId::Module).collect(),
        ModelKind::Default => db.default_ids().map(ModelId::Default).collect(),
        ModelKind::Check => db.check_ids().map(ModelId::Check).collect(),
        ModelKind::Reference => db.reference_ids().map(ModelId::Reference).collect(),
    }
}

/// True when `model`'s owning table has no counterpart in `other`
fn table_is_new(model: ModelRef<'_>, other: &DatabaseModel) -> bool {
    model
        .db()
        .table_of(model.id())
        .is_some_and(|t| find_counterpart(model.db().get(ModelId::Table(t)), other).is_none())
}

/// True when `model`'s owning field has no counterpart in `other`
fn field_is_new(model: ModelRef<'_>, other: &DatabaseModel) -> bool {
    match model.id() {
        ModelId::Default(f) | ModelId::Reference(f) => {
            find_counterpart(model.db().get(ModelId::Field(f)), other).is_none()
        }
        _ => false,
    }
}

/// Compares two models category by category
pub struct SchemaComparer<'r> {
    rules: &'r ExclusionRules,
}

impl<'r> SchemaComparer<'r> {
    pub fn new(rules: &'r ExclusionRules) -> Self {
        Self { rules }
    }

    /// Produce the primary (unexpanded, unordered) differences
    pub fn compare<'a>(
        &self,
        current: &'a DatabaseModel,
        target: &'a DatabaseModel,
    ) -> Vec<Difference<'a>> {
        let per_category: Vec<Vec<Difference<'a>>> = CATEGORIES
            .par_iter()
            .map(|kind| self.compare_category(*kind, current, target))
            .collect();

        let diffs: Vec<Difference<'a>> = per_category.into_iter().flatten().collect();
        tracing::debug!(count = diffs.len(), "Primary differences found");
        diffs
    }

    fn compare_category<'a>(
        &self,
        kind: ModelKind,
        current: &'a DatabaseModel,
        target: &'a DatabaseModel,
    ) -> Vec<Difference<'a>> {
        let mut diffs = Vec::new();

        for id in ids_of_kind(target, kind) {
            if self.rules.is_excluded(target, id) {
                continue;
            }
            let tgt = target.get(id);
            match find_counterpart(tgt, current) {
                None => {
                    if !is_created_inline(tgt, current) {
                        diffs.push(Difference::Create(tgt));
                    }
                }
                Some(cur_id) => {
                    let cur = current.get(cur_id);
                    if !is_similar(tgt, cur) {
                        changed(tgt, cur, &mut diffs);
                    }
                }
            }
        }

        for id in ids_of_kind(current, kind) {
            if self.rules.is_excluded(current, id) {
                continue;
            }
            let cur = current.get(id);
            if find_counterpart(cur, target).is_none() && !is_dropped_inline(cur, target) {
                diffs.push(Difference::Drop(cur));
            }
        }

        diffs
    }
}

/// Objects created as part of their owner's definition
fn is_created_inline(model: ModelRef<'_>, current: &DatabaseModel) -> bool {
    let db = model.db();
    match model.id() {
        // New tables are created with all their columns
        ModelId::Field(_) => table_is_new(model, current),
        // System-named constraints of new columns are part of the column definition
        ModelId::Default(f) => {
            field_is_new(model, current)
                && db.default_of(f).is_some_and(|d| d.name.is_none())
        }
        ModelId::Reference(f) => {
            field_is_new(model, current)
                && db.reference_of(f).is_some_and(|r| r.name.is_none())
        }
        ModelId::Schema(_) | ModelId::Table(_) | ModelId::Module(_) | ModelId::Check(_) => false,
    }
}

/// Objects that disappear with their owner's drop
fn is_dropped_inline(model: ModelRef<'_>, target: &DatabaseModel) -> bool {
    let db = model.db();
    match model.id() {
        ModelId::Field(_) | ModelId::Default(_) | ModelId::Check(_) => table_is_new(model, target),
        // Cross-table keys must go before the referenced table can be dropped
        ModelId::Reference(f) => {
            table_is_new(model, target)
                && db
                    .reference_of(f)
                    .is_some_and(|r| db.field(r.target).table == db.field(f).table)
        }
        ModelId::Module(m) => match db.module(m).index.as_ref() {
            Some(index) => find_counterpart(db.get(index.indexed_object), target).is_none(),
            None => false,
        },
        ModelId::Schema(_) | ModelId::Table(_) => false,
    }
}

/// Choose how to move a changed object from `cur` to `tgt`
fn changed<'a>(tgt: ModelRef<'a>, cur: ModelRef<'a>, diffs: &mut Vec<Difference<'a>>) {
    match (tgt.id(), cur.id()) {
        (ModelId::Field(t), ModelId::Field(c)) => {
            let (tf, cf) = (tgt.db().field(t), cur.db().field(c));
            if tf.is_computed() || cf.is_computed() {
                diffs.push(Difference::Recreate {
                    target: tgt,
                    current: cur,
                });
            } else {
                diffs.push(Difference::Alter {
                    target: tgt,
                    current: cur,
                });
            }
        }
        (ModelId::Module(_), ModelId::Module(_)) if tgt.module_kind() != cur.module_kind() => {
            diffs.push(Difference::Drop(cur));
            diffs.push(Difference::Create(tgt));
        }
        (ModelId::Module(_), ModelId::Module(_)) => diffs.push(Difference::Alter {
            target: tgt,
            current: cur,
        }),
        // Constraints cannot be altered in place
        (ModelId::Default(_), _) | (ModelId::Check(_), _) | (ModelId::Reference(_), _) => {
            diffs.push(Difference::Recreate {
                target: tgt,
                current: cur,
            })
        }
        // Schemas and tables have no state of their own to alter
        (ModelId::Schema(_), _) | (ModelId::Table(_), _) => {}
        (ModelId::Field(_), _) | (ModelId::Module(_), _) => {
            diffs.push(Difference::Drop(cur));
            diffs.push(Difference::Create(tgt));
        }
    }
}
