//! Schema differences
//!
//! A diff run compares a current model with a target model and produces an
//! ordered list of [`Difference`]s. Primary differences come from
//! [`comparer`]; [`order`] sorts them so referenced objects are created first
//! and dropped last; [`cascade`] then expands each difference into the changes
//! it actually needs (an index alteration becomes a recreate, a function
//! alteration drags its unchanged dependents along).

pub mod cascade;
pub mod comparer;
pub mod exclude;
pub mod order;

use std::fmt;

use anyhow::Result;

use crate::model::{DatabaseModel, ModelId, ModelRef};

pub use cascade::{expand, CascadeContext, ChangeProvider};
pub use comparer::{find_counterpart, SchemaComparer};
pub use exclude::ExclusionRules;
pub use order::order_differences;

/// What a difference does to its object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffAction {
    Create,
    Drop,
    Alter,
    Recreate,
}

impl fmt::Display for DiffAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiffAction::Create => "Create",
            DiffAction::Drop => "Drop",
            DiffAction::Alter => "Alter",
            DiffAction::Recreate => "Recreate",
        };
        f.write_str(name)
    }
}

/// One change needed to move the current schema towards the target.
///
/// `target` models belong to the target graph and `current` models to the
/// current graph, except for cascaded recreates where both sides describe the
/// same unchanged object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difference<'a> {
    /// Object only exists in the target
    Create(ModelRef<'a>),
    /// Object only exists in the current schema
    Drop(ModelRef<'a>),
    /// Object changes in place
    Alter {
        target: ModelRef<'a>,
        current: ModelRef<'a>,
    },
    /// Object is dropped and created again in one block
    Recreate {
        target: ModelRef<'a>,
        current: ModelRef<'a>,
    },
}

impl<'a> Difference<'a> {
    pub fn action(&self) -> DiffAction {
        match self {
            Difference::Create(_) => DiffAction::Create,
            Difference::Drop(_) => DiffAction::Drop,
            Difference::Alter { .. } => DiffAction::Alter,
            Difference::Recreate { .. } => DiffAction::Recreate,
        }
    }

    /// The model describing the end state (the dropped model for drops)
    pub fn model(&self) -> ModelRef<'a> {
        match self {
            Difference::Create(m) | Difference::Drop(m) => *m,
            Difference::Alter { target, .. } | Difference::Recreate { target, .. } => *target,
        }
    }

    /// The model being replaced, for alterations and recreates
    pub fn old_model(&self) -> Option<ModelRef<'a>> {
        match self {
            Difference::Create(_) | Difference::Drop(_) => None,
            Difference::Alter { current, .. } | Difference::Recreate { current, .. } => {
                Some(*current)
            }
        }
    }

    /// Table whose rows this difference could destroy
    fn data_loss_candidate(&self) -> Option<ModelRef<'a>> {
        match *self {
            Difference::Drop(model) => match model.id() {
                ModelId::Table(_) => Some(model),
                ModelId::Field(f) => Some(model.db().get(ModelId::Table(model.db().field(f).table))),
                _ => None,
            },
            Difference::Alter { target, current } => match (target.id(), current.id()) {
                (ModelId::Field(t), ModelId::Field(c)) => {
                    let (tf, cf) = (target.db().field(t), current.db().field(c));
                    (!tf.data_type.eq_ignore_ascii_case(&cf.data_type))
                        .then(|| current.db().get(ModelId::Table(cf.table)))
                }
                _ => None,
            },
            // Rebuilding a stored column drops its values
            Difference::Recreate { current, .. } => match current.id() {
                ModelId::Field(c) => {
                    let field = current.db().field(c);
                    (!field.is_computed()).then(|| current.db().get(ModelId::Table(field.table)))
                }
                _ => None,
            },
            Difference::Create(_) => None,
        }
    }
}

/// What the emission framework needs from a difference
pub trait Change {
    /// Human-readable description, used as the block comment
    fn title(&self) -> String;

    /// Stable name of the affected object
    fn name(&self) -> String;

    /// Data-loss information, for changes that can destroy data
    fn data_loss(&self) -> Option<&dyn DataLossChange> {
        None
    }
}

/// Capability of changes that may destroy table data
pub trait DataLossChange {
    /// The table at risk; None (or empty) when nothing is at risk
    fn data_loss_table(&self) -> Option<String>;
}

impl Change for Difference<'_> {
    fn title(&self) -> String {
        let model = self.model();
        format!("{} {} {}", self.action(), model.kind_name(), model.full_name())
    }

    fn name(&self) -> String {
        self.model().full_name()
    }

    fn data_loss(&self) -> Option<&dyn DataLossChange> {
        self.data_loss_candidate().map(|_| self as &dyn DataLossChange)
    }
}

impl DataLossChange for Difference<'_> {
    fn data_loss_table(&self) -> Option<String> {
        self.data_loss_candidate().map(|table| table.full_name())
    }
}

/// Compute the complete, ordered list of changes from `current` to `target`
pub fn diff_models<'a>(
    current: &'a DatabaseModel,
    target: &'a DatabaseModel,
    rules: &ExclusionRules,
) -> Result<Vec<Difference<'a>>> {
    let primary = SchemaComparer::new(rules).compare(current, target);
    let ordered = order_differences(primary, current, target);
    let mut ctx = CascadeContext::new(current, target, &ordered).with_rules(rules);
    let expanded = expand(&ordered, &mut ctx)?;
    tracing::info!(
        primary = ordered.len(),
        total = expanded.len(),
        "Computed schema differences"
    );
    Ok(expanded)
}
