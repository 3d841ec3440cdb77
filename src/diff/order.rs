//! Dependency-aware ordering of differences
//!
//! Drops run first, removing referencing objects before the objects they
//! reference. Everything else (creates, alterations, recreates) follows in
//! the opposite direction so referenced objects exist before anything that
//! needs them. Every object of a model gets one position from a topological
//! walk over its references; unrelated objects keep owner-before-owned
//! order, then name order.

use std::collections::{HashMap, HashSet};

use crate::model::{references_of, resolved_ids, DatabaseModel, FieldId, ModelId, ModelKind};

use super::Difference;

/// Rank of a kind when no dependency decides: owners before owned, tables before modules
fn create_rank(kind: ModelKind) -> u8 {
    match kind {
        ModelKind::Schema => 0,
        ModelKind::Table => 1,
        ModelKind::Field => 2,
        ModelKind::Module => 3,
        ModelKind::Default => 4,
        ModelKind::Check => 5,
        ModelKind::Reference => 6,
    }
}

/// What a column definition uses when written in full.
///
/// Computed expressions, system-named defaults and foreign keys are written
/// with the column, so the column needs whatever they reference.
fn column_references(db: &DatabaseModel, field: FieldId, out: &mut Vec<ModelId>) {
    out.extend(resolved_ids(&db.field(field).dependencies));
    if let Some(default) = db.default_of(field) {
        out.extend(resolved_ids(&default.dependencies));
    }
    if let Some(reference) = db.reference_of(field) {
        out.push(ModelId::Table(db.field(reference.target).table));
    }
}

/// Objects that must exist before `id` is created
fn ordering_references(db: &DatabaseModel, id: ModelId) -> Vec<ModelId> {
    let mut refs = references_of(db, id);
    match id {
        ModelId::Table(t) => {
            for field in &db.table(t).fields {
                column_references(db, *field, &mut refs);
            }
            // Own columns are part of the CREATE TABLE
            refs.retain(|r| db.table_of(*r) != Some(t));
        }
        ModelId::Field(f) => {
            column_references(db, f, &mut refs);
            refs.retain(|r| *r != id);
        }
        _ => {}
    }
    refs
}

/// Position of every object such that what it references comes first.
///
/// Cycles are broken at the first object revisited, so walking roots in
/// kind order lets a table claim the functions its columns call.
pub fn object_positions(db: &DatabaseModel) -> HashMap<ModelId, usize> {
    fn visit(
        db: &DatabaseModel,
        id: ModelId,
        seen: &mut HashSet<ModelId>,
        positions: &mut HashMap<ModelId, usize>,
    ) {
        if !seen.insert(id) {
            return;
        }
        for dep in ordering_references(db, id) {
            visit(db, dep, seen, positions);
        }
        let next = positions.len();
        positions.insert(id, next);
    }

    let mut ids = db.all_ids();
    ids.sort_by_cached_key(|id| (create_rank(id.kind()), db.full_name(*id).to_lowercase()));

    let mut seen = HashSet::new();
    let mut positions = HashMap::with_capacity(ids.len());
    for id in ids {
        visit(db, id, &mut seen, &mut positions);
    }
    positions
}

/// Sort primary differences into execution order
pub fn order_differences<'a>(
    diffs: Vec<Difference<'a>>,
    current: &DatabaseModel,
    target: &DatabaseModel,
) -> Vec<Difference<'a>> {
    let current_positions = object_positions(current);
    let target_positions = object_positions(target);

    let mut keyed: Vec<((u8, usize), Difference<'a>)> = diffs
        .into_iter()
        .map(|diff| {
            let id = diff.model().id();
            let key = match diff {
                Difference::Drop(_) => {
                    let position = current_positions.get(&id).copied().unwrap_or(0);
                    (0, usize::MAX - position)
                }
                Difference::Create(_) | Difference::Alter { .. } | Difference::Recreate { .. } => {
                    (1, target_positions.get(&id).copied().unwrap_or(0))
                }
            };
            (key, diff)
        })
        .collect();

    keyed.sort_by_key(|(key, _)| *key);
    keyed.into_iter().map(|(_, diff)| diff).collect()
}
