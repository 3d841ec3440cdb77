//! Reverse dependency lookups
//!
//! Every object knows what it references (its schema, its table, the objects
//! named in its definition). [`DependencyIndex`] inverts those links once per
//! model so "who depends on X" is a map lookup.

use std::collections::{HashMap, HashSet, VecDeque};

use super::{index_key_column, DatabaseModel, Dependency, ModelId, ModelKind};

/// Reverse reference map for one [`DatabaseModel`]
#[derive(Debug)]
pub struct DependencyIndex<'a> {
    db: &'a DatabaseModel,
    dependents: HashMap<ModelId, Vec<ModelId>>,
}

/// Ids of the dependencies that resolved inside the model
pub fn resolved_ids(deps: &[Dependency]) -> impl Iterator<Item = ModelId> + '_ {
    deps.iter().filter_map(|d| match d {
        Dependency::Resolved(id) => Some(*id),
        Dependency::External(_) => None,
    })
}

fn push_resolved(out: &mut Vec<ModelId>, deps: &[Dependency]) {
    out.extend(resolved_ids(deps));
}

/// Objects directly referenced by `id`, by name or by structural link
pub fn references_of(db: &DatabaseModel, id: ModelId) -> Vec<ModelId> {
    let mut refs = Vec::new();
    match id {
        ModelId::Schema(_) => {}
        ModelId::Table(t) => refs.push(ModelId::Schema(db.table(t).schema)),
        ModelId::Field(f) => {
            let field = db.field(f);
            refs.push(ModelId::Table(field.table));
            push_resolved(&mut refs, &field.dependencies);
        }
        ModelId::Module(m) => {
            let module = db.module(m);
            refs.push(ModelId::Schema(module.schema));
            push_resolved(&mut refs, &module.dependencies);
            if let Some(index) = &module.index {
                if let ModelId::Table(t) = index.indexed_object {
                    let table = db.table(t);
                    for key in index.indexed_columns.iter().chain(&index.included_columns) {
                        let column = index_key_column(key);
                        if let Some(f) = table
                            .fields
                            .iter()
                            .find(|f| db.field(**f).name.eq_ignore_ascii_case(column))
                        {
                            refs.push(ModelId::Field(*f));
                        }
                    }
                }
            }
        }
        ModelId::Default(f) => {
            refs.push(ModelId::Field(f));
            if let Some(def) = db.default_of(f) {
                push_resolved(&mut refs, &def.dependencies);
            }
        }
        ModelId::Check(c) => {
            let check = db.check(c);
            refs.push(ModelId::Table(check.table));
            push_resolved(&mut refs, &check.dependencies);
        }
        ModelId::Reference(f) => {
            refs.push(ModelId::Field(f));
            if let Some(reference) = db.reference_of(f) {
                refs.push(ModelId::Field(reference.target));
            }
        }
    }
    refs.retain(|r| *r != id);
    refs.sort();
    refs.dedup();
    refs
}

impl<'a> DependencyIndex<'a> {
    pub fn new(db: &'a DatabaseModel) -> Self {
        let mut dependents: HashMap<ModelId, Vec<ModelId>> = HashMap::new();
        for id in db.all_ids() {
            for target in references_of(db, id) {
                dependents.entry(target).or_default().push(id);
            }
        }

        // Stable traversal order regardless of arena layout
        for list in dependents.values_mut() {
            list.sort_by_cached_key(|id| db.full_name(*id).to_lowercase());
        }

        Self { db, dependents }
    }

    pub fn db(&self) -> &'a DatabaseModel {
        self.db
    }

    /// Objects that reference `id` directly
    pub fn direct_dependents(&self, id: ModelId) -> &[ModelId] {
        self.dependents.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every object that depends on `model`, directly or transitively.
    ///
    /// When `kinds` is non-empty only objects of those kinds are returned and
    /// traversal only continues through them. `model` itself is never part of
    /// the result, and reference cycles simply end the walk.
    pub fn find_all_dependents(&self, model: ModelId, kinds: &[ModelKind]) -> Vec<ModelId> {
        let mut visited: HashSet<ModelId> = HashSet::new();
        visited.insert(model);
        let mut queue = VecDeque::from([model]);
        let mut found = Vec::new();

        while let Some(current) = queue.pop_front() {
            for dep in self.direct_dependents(current) {
                if !kinds.is_empty() && !kinds.contains(&dep.kind()) {
                    continue;
                }
                if visited.insert(*dep) {
                    found.push(*dep);
                    queue.push_back(*dep);
                }
            }
        }

        found
    }
}
