//! T-SQL for each kind of change

use std::sync::LazyLock;

use regex::Regex;

use crate::diff::Difference;
use crate::error::DacpacDiffError;
use crate::model::{bracket, DatabaseModel, FieldElement, ModelId, ModelRef, ModuleKind};
use crate::output::SqlFileBuilder;
use crate::util::{scrub_sql, sql_string_literal};

use super::block::{MssqlDiffBlock, STOP_IF_INACTIVE};

/// Leading `CREATE` (or `CREATE OR ALTER`) of a module definition
static CREATE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\s*)CREATE(\s+OR\s+ALTER)?\b").expect("valid CREATE regex")
});

/// A [`Difference`] formatted for SQL Server
#[derive(Debug, Clone, Copy)]
pub struct DiffBlock<'a> {
    diff: Difference<'a>,
}

impl<'a> DiffBlock<'a> {
    pub fn new(diff: Difference<'a>) -> Self {
        Self { diff }
    }
}

impl<'a> MssqlDiffBlock for DiffBlock<'a> {
    type Diff = Difference<'a>;

    fn diff(&self) -> &Difference<'a> {
        &self.diff
    }

    fn format_body<B: SqlFileBuilder>(&self, sb: &mut B) -> Result<(), DacpacDiffError> {
        match self.diff {
            Difference::Create(model) => write_create(sb, model),
            Difference::Drop(model) => write_drop(sb, model),
            Difference::Alter { target, current } => write_alter(sb, target, current)?,
            Difference::Recreate { target, current } => {
                write_drop(sb, current);
                // Module definitions must start their own batch, and a failed
                // drop has already rolled the transaction back
                if matches!(target.module_kind(), Some(kind) if kind != ModuleKind::Index) {
                    sb.ensure_line()
                        .append_line("GO")
                        .append_line(STOP_IF_INACTIVE)
                        .append_line("GO");
                }
                write_create(sb, target);
            }
        }
        sb.ensure_line();
        Ok(())
    }
}

fn table_name(db: &DatabaseModel, field: &FieldElement) -> String {
    db.full_name(ModelId::Table(field.table))
}

/// Column definition as used by `CREATE TABLE` and `ALTER TABLE ... ADD`.
///
/// A column added to an existing table cannot be `NOT NULL` without a
/// default, so it is written as nullable and flagged by the caller.
fn write_field_definition<B: SqlFileBuilder>(
    sb: &mut B,
    db: &DatabaseModel,
    field: &FieldElement,
    new_table: bool,
) {
    sb.append(&bracket(&field.name));

    if let Some(computation) = field.computation.as_deref().filter(|c| !c.is_empty()) {
        sb.append(&format!(" AS {}", computation));
        return;
    }

    let not_null = !field.nullable && (new_table || field.has_default());
    sb.append(&format!(" {}", field.data_type))
        .append_if(
            || format!(" COLLATE {}", field.collation.as_deref().unwrap_or_default()),
            field.collation.is_some(),
        )
        .append(if not_null { " NOT NULL" } else { " NULL" })
        .append_if(
            || {
                let expression = field.default.as_ref().map(|d| d.expression.as_str());
                format!(" DEFAULT ({})", expression.unwrap_or_default())
            },
            field.is_default_system_named(),
        );

    if let Some(reference) = field.reference.as_ref().filter(|r| r.name.is_none()) {
        let target = db.field(reference.target);
        sb.append(&format!(
            " REFERENCES {} ({})",
            table_name(db, target),
            bracket(&target.name)
        ));
    }
}

fn write_create<B: SqlFileBuilder>(sb: &mut B, model: ModelRef<'_>) {
    let db = model.db();
    match model.id() {
        ModelId::Schema(s) => {
            sb.append_line(&format!("CREATE SCHEMA {}", bracket(&db.schema(s).name)));
        }
        ModelId::Table(t) => {
            sb.append_line(&format!("CREATE TABLE {} (", model.full_name()));
            let fields = &db.table(t).fields;
            for (i, f) in fields.iter().enumerate() {
                sb.append("    ");
                write_field_definition(sb, db, db.field(*f), true);
                sb.append_line(if i + 1 < fields.len() { "," } else { "" });
            }
            sb.append_line(")");
        }
        ModelId::Field(f) => {
            let field = db.field(f);
            sb.append(&format!("ALTER TABLE {} ADD ", table_name(db, field)));
            write_field_definition(sb, db, field, false);
            sb.append_if(
                || " -- NOTE: Cannot create NOT NULL column".to_string(),
                !field.nullable && !field.has_default() && !field.is_computed(),
            )
            .append_line("");
        }
        ModelId::Module(m) => {
            let module = db.module(m);
            match &module.index {
                Some(index) => {
                    sb.append(&format!(
                        "CREATE {}{} INDEX {} ON {} ({})",
                        if index.is_unique { "UNIQUE " } else { "" },
                        if index.is_clustered { "CLUSTERED" } else { "NONCLUSTERED" },
                        bracket(&module.name),
                        db.full_name(index.indexed_object),
                        index.indexed_columns.join(", ")
                    ))
                    .append_if(
                        || format!(" INCLUDE ({})", index.included_columns.join(", ")),
                        !index.included_columns.is_empty(),
                    )
                    .append_if(
                        || format!(" WHERE {}", index.condition.as_deref().unwrap_or_default()),
                        index.condition.is_some(),
                    )
                    .append_line("");
                }
                None => {
                    sb.append(module.definition.trim_end()).ensure_line();
                }
            }
        }
        ModelId::Default(f) => {
            let field = db.field(f);
            if let Some(default) = &field.default {
                sb.append(&format!("ALTER TABLE {} ADD ", table_name(db, field)))
                    .append_if(
                        || format!("CONSTRAINT {} ", bracket(default.name.as_deref().unwrap_or_default())),
                        default.name.is_some(),
                    )
                    .append_line(&format!(
                        "DEFAULT ({}) FOR {}",
                        default.expression,
                        bracket(&field.name)
                    ));
            }
        }
        ModelId::Check(c) => {
            let check = db.check(c);
            sb.append(&format!(
                "ALTER TABLE {} ADD ",
                db.full_name(ModelId::Table(check.table))
            ))
            .append_if(
                || format!("CONSTRAINT {} ", bracket(check.name.as_deref().unwrap_or_default())),
                check.name.is_some(),
            )
            .append_line(&format!("CHECK ({})", check.expression));
        }
        ModelId::Reference(f) => {
            let field = db.field(f);
            if let Some(reference) = &field.reference {
                let target = db.field(reference.target);
                sb.append(&format!("ALTER TABLE {} ADD ", table_name(db, field)))
                    .append_if(
                        || format!("CONSTRAINT {} ", bracket(reference.name.as_deref().unwrap_or_default())),
                        reference.name.is_some(),
                    )
                    .append_line(&format!(
                        "FOREIGN KEY ({}) REFERENCES {} ({})",
                        bracket(&field.name),
                        table_name(db, target),
                        bracket(&target.name)
                    ));
            }
        }
    }
}

/// Drop a constraint whose name was generated by the server.
///
/// `lookup` selects the constraint name into `@name`.
fn write_system_named_drop<B: SqlFileBuilder>(sb: &mut B, table: &str, lookup: &str) {
    sb.append_line(&format!("DECLARE @name SYSNAME = ({})", lookup))
        .append_line(&format!(
            "IF (@name IS NOT NULL) EXEC ('ALTER TABLE {} DROP CONSTRAINT [' + @name + ']')",
            table.replace('\'', "''")
        ));
}

fn column_id_sql(table: &str, column: &str) -> String {
    format!(
        "COLUMNPROPERTY(OBJECT_ID({}), {}, 'ColumnId')",
        sql_string_literal(table),
        sql_string_literal(column)
    )
}

/// T-SQL that scrubs a definition the same way [`scrub_sql`] does
fn scrubbed_definition_sql(column: &str) -> String {
    let mut sql = column.to_string();
    for chr in ["' '", "'('", "')'", "'['", "']'", "CHAR(9)", "CHAR(10)", "CHAR(13)"] {
        sql = format!("REPLACE({}, {}, '')", sql, chr);
    }
    format!("LOWER({})", sql)
}

fn write_drop<B: SqlFileBuilder>(sb: &mut B, model: ModelRef<'_>) {
    let db = model.db();
    match model.id() {
        ModelId::Schema(_) => {
            sb.append_line(&format!("DROP SCHEMA {}", model.full_name()));
        }
        ModelId::Table(_) => {
            sb.append_line(&format!("DROP TABLE {}", model.full_name()));
        }
        ModelId::Field(f) => {
            let field = db.field(f);
            sb.append_line(&format!(
                "ALTER TABLE {} DROP COLUMN {}",
                table_name(db, field),
                bracket(&field.name)
            ));
        }
        ModelId::Module(m) => {
            let module = db.module(m);
            match &module.index {
                Some(index) => sb.append_line(&format!(
                    "DROP INDEX {} ON {}",
                    bracket(&module.name),
                    db.full_name(index.indexed_object)
                )),
                None => sb.append_line(&format!(
                    "DROP {} {}.{}",
                    module.kind.keyword(),
                    bracket(&db.schema(module.schema).name),
                    bracket(&module.name)
                )),
            };
        }
        ModelId::Default(f) => {
            let field = db.field(f);
            let table = table_name(db, field);
            match field.default.as_ref().and_then(|d| d.name.as_deref()) {
                Some(name) => {
                    sb.append_line(&format!("ALTER TABLE {} DROP CONSTRAINT {}", table, bracket(name)));
                }
                None => {
                    let lookup = format!(
                        "SELECT [name] FROM sys.default_constraints WHERE parent_object_id = OBJECT_ID({}) AND parent_column_id = {}",
                        sql_string_literal(&table),
                        column_id_sql(&table, &field.name)
                    );
                    write_system_named_drop(sb, &table, &lookup);
                }
            }
        }
        ModelId::Check(c) => {
            let check = db.check(c);
            let table = db.full_name(ModelId::Table(check.table));
            match &check.name {
                Some(name) => {
                    sb.append_line(&format!("ALTER TABLE {} DROP CONSTRAINT {}", table, bracket(name)));
                }
                None => {
                    let lookup = format!(
                        "SELECT TOP 1 [name] FROM sys.check_constraints WHERE parent_object_id = OBJECT_ID({}) AND {} = {}",
                        sql_string_literal(&table),
                        scrubbed_definition_sql("[definition]"),
                        sql_string_literal(&scrub_sql(&check.expression))
                    );
                    write_system_named_drop(sb, &table, &lookup);
                }
            }
        }
        ModelId::Reference(f) => {
            let field = db.field(f);
            let table = table_name(db, field);
            match field.reference.as_ref().and_then(|r| r.name.as_deref()) {
                Some(name) => {
                    sb.append_line(&format!("ALTER TABLE {} DROP CONSTRAINT {}", table, bracket(name)));
                }
                None => {
                    let lookup = format!(
                        "SELECT TOP 1 fk.[name] FROM sys.foreign_keys fk JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.[object_id] WHERE fk.parent_object_id = OBJECT_ID({}) AND fkc.parent_column_id = {}",
                        sql_string_literal(&table),
                        column_id_sql(&table, &field.name)
                    );
                    write_system_named_drop(sb, &table, &lookup);
                }
            }
        }
    }
}

fn write_alter<B: SqlFileBuilder>(
    sb: &mut B,
    target: ModelRef<'_>,
    current: ModelRef<'_>,
) -> Result<(), DacpacDiffError> {
    let db = target.db();
    match target.id() {
        ModelId::Field(f) => {
            let field = db.field(f);
            sb.append(&format!(
                "ALTER TABLE {} ALTER COLUMN {} {}",
                table_name(db, field),
                bracket(&field.name),
                field.data_type
            ))
            .append_if(
                || format!(" COLLATE {}", field.collation.as_deref().unwrap_or_default()),
                field.collation.is_some(),
            )
            .append_line(if field.nullable { " NULL" } else { " NOT NULL" });
            Ok(())
        }
        ModelId::Module(m) if db.module(m).index.is_none() => {
            let definition = db.module(m).definition.trim_end();
            sb.append(&CREATE_KEYWORD.replace(definition, "${1}ALTER"))
                .ensure_line();
            Ok(())
        }
        _ => Err(DacpacDiffError::UnsupportedDifference {
            kind: target.kind_name(),
            action: format!("Alter from {}", current.kind_name()),
            name: target.full_name(),
        }),
    }
}
