//! Kind-specific similarity predicates
//!
//! Two objects with the same full name are "similar" when no script needs to
//! run to turn one into the other. Expressions are compared after
//! [`scrub_sql`] so formatting differences are ignored.

use crate::util::{eq_ci, reduce_brackets, scrub_sql};

use super::{FieldDefault, FieldElement, IndexDefinition, ModelId, ModelRef, ModuleElement};

fn same_name(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => eq_ci(a, b),
        _ => false,
    }
}

fn same_expression(a: &str, b: &str) -> bool {
    scrub_sql(reduce_brackets(a)) == scrub_sql(reduce_brackets(b))
}

fn same_columns(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| scrub_sql(x) == scrub_sql(y))
}

/// Compare two objects of possibly different models.
///
/// Objects of different kinds are never similar. Schemas and tables carry no
/// state of their own (their children are compared separately), so they are
/// similar whenever they match by name.
pub fn is_similar(a: ModelRef<'_>, b: ModelRef<'_>) -> bool {
    let (da, db) = (a.db(), b.db());
    match (a.id(), b.id()) {
        (ModelId::Schema(_), ModelId::Schema(_)) => true,
        (ModelId::Table(_), ModelId::Table(_)) => true,
        (ModelId::Field(x), ModelId::Field(y)) => is_field_similar(da.field(x), db.field(y)),
        (ModelId::Default(x), ModelId::Default(y)) => {
            match (da.default_of(x), db.default_of(y)) {
                (Some(x), Some(y)) => is_default_similar(x, y),
                (None, None) => true,
                _ => false,
            }
        }
        (ModelId::Check(x), ModelId::Check(y)) => {
            let (x, y) = (da.check(x), db.check(y));
            same_name(x.name.as_deref(), y.name.as_deref())
                && same_expression(&x.expression, &y.expression)
        }
        (ModelId::Reference(x), ModelId::Reference(y)) => {
            match (da.reference_of(x), db.reference_of(y)) {
                (Some(x), Some(y)) => {
                    same_name(x.name.as_deref(), y.name.as_deref())
                        && eq_ci(
                            &da.full_name(ModelId::Field(x.target)),
                            &db.full_name(ModelId::Field(y.target)),
                        )
                }
                (None, None) => true,
                _ => false,
            }
        }
        (ModelId::Module(x), ModelId::Module(y)) => {
            let (mx, my) = (da.module(x), db.module(y));
            if mx.kind != my.kind {
                return false;
            }
            match (&mx.index, &my.index) {
                (Some(ix), Some(iy)) => is_index_similar(a, ix, b, iy),
                (None, None) => is_definition_similar(mx, my),
                _ => false,
            }
        }
        _ => false,
    }
}

fn is_field_similar(a: &FieldElement, b: &FieldElement) -> bool {
    if a.is_computed() || b.is_computed() {
        return a.is_computed() == b.is_computed()
            && same_expression(
                a.computation.as_deref().unwrap_or_default(),
                b.computation.as_deref().unwrap_or_default(),
            );
    }

    eq_ci(a.data_type.trim(), b.data_type.trim())
        && a.nullable == b.nullable
        && same_name(a.collation.as_deref(), b.collation.as_deref())
}

fn is_default_similar(a: &FieldDefault, b: &FieldDefault) -> bool {
    same_name(a.name.as_deref(), b.name.as_deref()) && same_expression(&a.expression, &b.expression)
}

fn is_definition_similar(a: &ModuleElement, b: &ModuleElement) -> bool {
    scrub_sql(&a.definition) == scrub_sql(&b.definition)
}

fn is_index_similar(
    a: ModelRef<'_>,
    ia: &IndexDefinition,
    b: ModelRef<'_>,
    ib: &IndexDefinition,
) -> bool {
    ia.is_clustered == ib.is_clustered
        && ia.is_unique == ib.is_unique
        && eq_ci(
            &a.db().full_name(ia.indexed_object),
            &b.db().full_name(ib.indexed_object),
        )
        && same_columns(&ia.indexed_columns, &ib.indexed_columns)
        && same_columns(&ia.included_columns, &ib.included_columns)
        && ia.condition.as_deref().map(scrub_sql) == ib.condition.as_deref().map(scrub_sql)
}
