//! Database model representation
//!
//! A [`DatabaseModel`] owns every schema object in flat arenas. Objects link
//! to each other through ids, so back-references (field to table to schema)
//! and reverse dependency lookups never form ownership cycles. The model is
//! built once through the `add_*` methods and is read-only afterwards.

use std::collections::HashMap;
use std::fmt;

use crate::error::DacpacDiffError;
use crate::util::scrub_sql;

use super::{
    CheckId, Dependency, FieldDefault, FieldElement, FieldId, FieldReference, IndexDefinition,
    ModelId, ModelKind, ModuleElement, ModuleId, ModuleKind, SchemaElement, SchemaId,
    TableCheck, TableElement, TableId,
};

/// The complete schema graph of one database
#[derive(Debug, Clone, Default)]
pub struct DatabaseModel {
    schemas: Vec<SchemaElement>,
    tables: Vec<TableElement>,
    fields: Vec<FieldElement>,
    modules: Vec<ModuleElement>,
    checks: Vec<TableCheck>,
    /// Lowercased full name -> object
    names: HashMap<String, ModelId>,
}

/// Wrap a bare identifier in brackets
pub fn bracket(name: &str) -> String {
    format!("[{}]", name)
}

/// Column name of an index key such as `[Created] DESC`
pub fn index_key_column(key: &str) -> &str {
    let key = key.trim();
    let name = if let Some(rest) = key.strip_prefix('[') {
        rest.split(']').next().unwrap_or(rest)
    } else {
        key.split_whitespace().next().unwrap_or(key)
    };
    name.trim()
}

impl DatabaseModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, full_name: String, id: ModelId) -> Result<(), DacpacDiffError> {
        let key = full_name.to_lowercase();
        if self.names.contains_key(&key) {
            return Err(DacpacDiffError::DuplicateObject { name: full_name });
        }
        self.names.insert(key, id);
        Ok(())
    }

    pub fn add_schema(&mut self, name: &str) -> Result<SchemaId, DacpacDiffError> {
        let id = SchemaId(self.schemas.len());
        self.register(bracket(name), ModelId::Schema(id))?;
        self.schemas.push(SchemaElement {
            name: name.to_string(),
        });
        Ok(id)
    }

    /// Get a schema by name, adding it if it does not exist yet
    pub fn ensure_schema(&mut self, name: &str) -> Result<SchemaId, DacpacDiffError> {
        match self.try_get(&bracket(name)) {
            Some(ModelId::Schema(id)) => Ok(id),
            _ => self.add_schema(name),
        }
    }

    pub fn add_table(&mut self, schema: SchemaId, name: &str) -> Result<TableId, DacpacDiffError> {
        let id = TableId(self.tables.len());
        let full_name = format!("{}.{}", bracket(&self.schemas[schema.0].name), bracket(name));
        self.register(full_name, ModelId::Table(id))?;
        self.tables.push(TableElement {
            schema,
            name: name.to_string(),
            fields: Vec::new(),
            checks: Vec::new(),
        });
        Ok(id)
    }

    /// Add a typed column to a table
    pub fn add_field(
        &mut self,
        table: TableId,
        name: &str,
        data_type: &str,
        nullable: bool,
    ) -> Result<FieldId, DacpacDiffError> {
        self.push_field(FieldElement {
            table,
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable,
            collation: None,
            computation: None,
            default: None,
            reference: None,
            dependencies: Vec::new(),
        })
    }

    /// Add a computed column to a table
    pub fn add_computed_field(
        &mut self,
        table: TableId,
        name: &str,
        computation: &str,
    ) -> Result<FieldId, DacpacDiffError> {
        self.push_field(FieldElement {
            table,
            name: name.to_string(),
            data_type: String::new(),
            nullable: true,
            collation: None,
            computation: Some(computation.to_string()),
            default: None,
            reference: None,
            dependencies: Vec::new(),
        })
    }

    fn push_field(&mut self, field: FieldElement) -> Result<FieldId, DacpacDiffError> {
        let id = FieldId(self.fields.len());
        let full_name = format!(
            "{}.{}",
            self.full_name(ModelId::Table(field.table)),
            bracket(&field.name)
        );
        self.register(full_name, ModelId::Field(id))?;
        self.tables[field.table.0].fields.push(id);
        self.fields.push(field);
        Ok(id)
    }

    pub fn set_collation(&mut self, field: FieldId, collation: &str) {
        self.fields[field.0].collation = Some(collation.to_string());
    }

    /// Bind a default to a field; `name` is None for a system-named default
    pub fn set_default(
        &mut self,
        field: FieldId,
        name: Option<&str>,
        expression: &str,
    ) -> Result<(), DacpacDiffError> {
        if self.fields[field.0].default.is_some() {
            return Err(DacpacDiffError::DuplicateObject {
                name: self.full_name(ModelId::Default(field)),
            });
        }
        self.fields[field.0].default = Some(FieldDefault {
            name: name.map(str::to_string),
            expression: expression.to_string(),
            dependencies: Vec::new(),
        });
        let full_name = self.full_name(ModelId::Default(field));
        let registered = self.register(full_name, ModelId::Default(field));
        if registered.is_err() {
            self.fields[field.0].default = None;
        }
        registered
    }

    /// Add a foreign key from `field` to `target`
    pub fn set_reference(
        &mut self,
        field: FieldId,
        name: Option<&str>,
        target: FieldId,
    ) -> Result<(), DacpacDiffError> {
        if self.fields[field.0].reference.is_some() {
            return Err(DacpacDiffError::DuplicateObject {
                name: self.full_name(ModelId::Reference(field)),
            });
        }
        self.fields[field.0].reference = Some(FieldReference {
            name: name.map(str::to_string),
            target,
        });
        let full_name = self.full_name(ModelId::Reference(field));
        let registered = self.register(full_name, ModelId::Reference(field));
        if registered.is_err() {
            self.fields[field.0].reference = None;
        }
        registered
    }

    pub fn add_check(
        &mut self,
        table: TableId,
        name: Option<&str>,
        expression: &str,
    ) -> Result<CheckId, DacpacDiffError> {
        let id = CheckId(self.checks.len());
        self.checks.push(TableCheck {
            table,
            name: name.map(str::to_string),
            expression: expression.to_string(),
            dependencies: Vec::new(),
        });
        let full_name = self.full_name(ModelId::Check(id));
        if let Err(e) = self.register(full_name, ModelId::Check(id)) {
            self.checks.pop();
            return Err(e);
        }
        self.tables[table.0].checks.push(id);
        Ok(id)
    }

    /// Add a function, view, procedure or trigger from its `CREATE` text
    pub fn add_module(
        &mut self,
        schema: SchemaId,
        name: &str,
        kind: ModuleKind,
        definition: &str,
    ) -> Result<ModuleId, DacpacDiffError> {
        let id = ModuleId(self.modules.len());
        self.modules.push(ModuleElement {
            schema,
            name: name.to_string(),
            kind,
            definition: definition.to_string(),
            dependencies: Vec::new(),
            index: None,
        });
        let full_name = self.full_name(ModelId::Module(id));
        if let Err(e) = self.register(full_name, ModelId::Module(id)) {
            self.modules.pop();
            return Err(e);
        }
        Ok(id)
    }

    /// Add an index; every key and included column must exist on the indexed table
    pub fn add_index(
        &mut self,
        name: &str,
        index: IndexDefinition,
    ) -> Result<ModuleId, DacpacDiffError> {
        let schema = match index.indexed_object {
            ModelId::Table(t) => self.tables[t.0].schema,
            ModelId::Module(m) => self.modules[m.0].schema,
            other => {
                return Err(DacpacDiffError::UnknownObject {
                    owner: name.to_string(),
                    name: self.full_name(other),
                })
            }
        };

        if let ModelId::Table(table) = index.indexed_object {
            let columns = index.indexed_columns.iter().chain(&index.included_columns);
            for key in columns {
                let column = index_key_column(key);
                let exists = self.tables[table.0]
                    .fields
                    .iter()
                    .any(|f| self.fields[f.0].name.eq_ignore_ascii_case(column));
                if !exists {
                    return Err(DacpacDiffError::UnknownIndexColumn {
                        index: name.to_string(),
                        table: self.full_name(ModelId::Table(table)),
                        column: column.to_string(),
                    });
                }
            }
        }

        let indexed_object = index.indexed_object;
        let id = ModuleId(self.modules.len());
        self.modules.push(ModuleElement {
            schema,
            name: name.to_string(),
            kind: ModuleKind::Index,
            definition: String::new(),
            dependencies: vec![Dependency::Resolved(indexed_object)],
            index: Some(index),
        });
        let full_name = self.full_name(ModelId::Module(id));
        if let Err(e) = self.register(full_name, ModelId::Module(id)) {
            self.modules.pop();
            return Err(e);
        }
        Ok(id)
    }

    /// Record that `owner`'s definition references the object called `name`.
    ///
    /// Names are kept unresolved until [`resolve_dependencies`](Self::resolve_dependencies)
    /// so that objects may be added in any order.
    pub fn add_dependency(&mut self, owner: ModelId, name: &str) {
        let dep = Dependency::External(name.to_string());
        match owner {
            ModelId::Field(f) => self.fields[f.0].dependencies.push(dep),
            ModelId::Module(m) => self.modules[m.0].dependencies.push(dep),
            ModelId::Check(c) => self.checks[c.0].dependencies.push(dep),
            ModelId::Default(f) => {
                if let Some(def) = self.fields[f.0].default.as_mut() {
                    def.dependencies.push(dep);
                }
            }
            // Structural links only
            ModelId::Schema(_) | ModelId::Table(_) | ModelId::Reference(_) => {}
        }
    }

    /// Resolve dependency names against this model.
    ///
    /// Names that do not match any object remain external dependencies.
    /// Returns the number of dependencies left unresolved.
    pub fn resolve_dependencies(&mut self) -> usize {
        let names = &self.names;
        let mut unresolved = 0;
        let mut resolve = |deps: &mut Vec<Dependency>| {
            for dep in deps.iter_mut() {
                if let Dependency::External(name) = dep {
                    match names.get(&name.to_lowercase()) {
                        Some(id) => *dep = Dependency::Resolved(*id),
                        None => unresolved += 1,
                    }
                }
            }
        };

        for field in &mut self.fields {
            resolve(&mut field.dependencies);
            if let Some(def) = field.default.as_mut() {
                resolve(&mut def.dependencies);
            }
        }
        for module in &mut self.modules {
            resolve(&mut module.dependencies);
        }
        for check in &mut self.checks {
            resolve(&mut check.dependencies);
        }
        unresolved
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn schema(&self, id: SchemaId) -> &SchemaElement {
        &self.schemas[id.0]
    }

    pub fn table(&self, id: TableId) -> &TableElement {
        &self.tables[id.0]
    }

    pub fn field(&self, id: FieldId) -> &FieldElement {
        &self.fields[id.0]
    }

    pub fn module(&self, id: ModuleId) -> &ModuleElement {
        &self.modules[id.0]
    }

    pub fn check(&self, id: CheckId) -> &TableCheck {
        &self.checks[id.0]
    }

    pub fn default_of(&self, field: FieldId) -> Option<&FieldDefault> {
        self.fields[field.0].default.as_ref()
    }

    pub fn reference_of(&self, field: FieldId) -> Option<&FieldReference> {
        self.fields[field.0].reference.as_ref()
    }

    pub fn schema_ids(&self) -> impl Iterator<Item = SchemaId> {
        (0..self.schemas.len()).map(SchemaId)
    }

    pub fn table_ids(&self) -> impl Iterator<Item = TableId> {
        (0..self.tables.len()).map(TableId)
    }

    pub fn field_ids(&self) -> impl Iterator<Item = FieldId> {
        (0..self.fields.len()).map(FieldId)
    }

    pub fn module_ids(&self) -> impl Iterator<Item = ModuleId> {
        (0..self.modules.len()).map(ModuleId)
    }

    pub fn check_ids(&self) -> impl Iterator<Item = CheckId> {
        (0..self.checks.len()).map(CheckId)
    }

    /// Fields carrying a default
    pub fn default_ids(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.field_ids().filter(|f| self.fields[f.0].default.is_some())
    }

    /// Fields carrying a foreign-key reference
    pub fn reference_ids(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.field_ids().filter(|f| self.fields[f.0].reference.is_some())
    }

    /// Every object in the model
    pub fn all_ids(&self) -> Vec<ModelId> {
        let mut ids: Vec<ModelId> = Vec::with_capacity(self.names.len());
        ids.extend(self.schema_ids().map(ModelId::Schema));
        ids.extend(self.table_ids().map(ModelId::Table));
        ids.extend(self.field_ids().map(ModelId::Field));
        ids.extend(self.module_ids().map(ModelId::Module));
        ids.extend(self.default_ids().map(ModelId::Default));
        ids.extend(self.check_ids().map(ModelId::Check));
        ids.extend(self.reference_ids().map(ModelId::Reference));
        ids
    }

    /// Number of objects in the model
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Find an object by its full name (case-insensitive)
    pub fn try_get(&self, full_name: &str) -> Option<ModelId> {
        self.names.get(&full_name.to_lowercase()).copied()
    }

    /// Find a table by schema and table name
    pub fn find_table(&self, schema: &str, name: &str) -> Option<TableId> {
        match self.try_get(&format!("{}.{}", bracket(schema), bracket(name))) {
            Some(ModelId::Table(id)) => Some(id),
            _ => None,
        }
    }

    /// Borrow an object as a navigable handle
    pub fn get(&self, id: ModelId) -> ModelRef<'_> {
        ModelRef { db: self, id }
    }

    /// Schema that owns an object
    pub fn schema_of(&self, id: ModelId) -> SchemaId {
        match id {
            ModelId::Schema(s) => s,
            ModelId::Table(t) => self.tables[t.0].schema,
            ModelId::Field(f) | ModelId::Default(f) | ModelId::Reference(f) => {
                self.tables[self.fields[f.0].table.0].schema
            }
            ModelId::Module(m) => self.modules[m.0].schema,
            ModelId::Check(c) => self.tables[self.checks[c.0].table.0].schema,
        }
    }

    /// The object that structurally owns `id`, if any
    pub fn owner_of(&self, id: ModelId) -> Option<ModelId> {
        match id {
            ModelId::Schema(_) => None,
            ModelId::Table(t) => Some(ModelId::Schema(self.tables[t.0].schema)),
            ModelId::Field(f) => Some(ModelId::Table(self.fields[f.0].table)),
            ModelId::Default(f) | ModelId::Reference(f) => Some(ModelId::Field(f)),
            ModelId::Check(c) => Some(ModelId::Table(self.checks[c.0].table)),
            ModelId::Module(m) => match &self.modules[m.0].index {
                Some(index) => Some(index.indexed_object),
                None => Some(ModelId::Schema(self.modules[m.0].schema)),
            },
        }
    }

    /// Table that owns a field-level or table-level object
    pub fn table_of(&self, id: ModelId) -> Option<TableId> {
        match id {
            ModelId::Table(t) => Some(t),
            ModelId::Field(f) | ModelId::Default(f) | ModelId::Reference(f) => {
                Some(self.fields[f.0].table)
            }
            ModelId::Check(c) => Some(self.checks[c.0].table),
            ModelId::Module(m) => match self.modules[m.0].index.as_ref()?.indexed_object {
                ModelId::Table(t) => Some(t),
                _ => None,
            },
            ModelId::Schema(_) => None,
        }
    }

    /// Fully-qualified, bracketed name of an object.
    ///
    /// System-named constraints have no server-side name to use, so they are
    /// named after the object they belong to.
    pub fn full_name(&self, id: ModelId) -> String {
        match id {
            ModelId::Schema(s) => bracket(&self.schemas[s.0].name),
            ModelId::Table(t) => {
                let table = &self.tables[t.0];
                format!(
                    "{}.{}",
                    bracket(&self.schemas[table.schema.0].name),
                    bracket(&table.name)
                )
            }
            ModelId::Field(f) => {
                let field = &self.fields[f.0];
                format!(
                    "{}.{}",
                    self.full_name(ModelId::Table(field.table)),
                    bracket(&field.name)
                )
            }
            ModelId::Module(m) => {
                let module = &self.modules[m.0];
                match &module.index {
                    Some(index) => format!(
                        "{}.{}",
                        self.full_name(index.indexed_object),
                        bracket(&module.name)
                    ),
                    None => format!(
                        "{}.{}",
                        bracket(&self.schemas[module.schema.0].name),
                        bracket(&module.name)
                    ),
                }
            }
            ModelId::Default(f) => {
                match self.fields[f.0].default.as_ref().and_then(|d| d.name.as_ref()) {
                    Some(name) => self.schema_qualified(id, name),
                    None => format!("{}:DEFAULT", self.full_name(ModelId::Field(f))),
                }
            }
            ModelId::Reference(f) => {
                match self.fields[f.0].reference.as_ref().and_then(|r| r.name.as_ref()) {
                    Some(name) => self.schema_qualified(id, name),
                    None => format!("{}:REFERENCES", self.full_name(ModelId::Field(f))),
                }
            }
            ModelId::Check(c) => {
                let check = &self.checks[c.0];
                match &check.name {
                    Some(name) => self.schema_qualified(id, name),
                    None => format!(
                        "{}:CHECK({})",
                        self.full_name(ModelId::Table(check.table)),
                        scrub_sql(&check.expression)
                    ),
                }
            }
        }
    }

    fn schema_qualified(&self, id: ModelId, name: &str) -> String {
        format!(
            "{}.{}",
            bracket(&self.schemas[self.schema_of(id).0].name),
            bracket(name)
        )
    }
}

/// Borrowed handle to one object of a [`DatabaseModel`]
#[derive(Clone, Copy)]
pub struct ModelRef<'a> {
    db: &'a DatabaseModel,
    id: ModelId,
}

impl<'a> ModelRef<'a> {
    pub fn db(&self) -> &'a DatabaseModel {
        self.db
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn kind(&self) -> ModelKind {
        self.id.kind()
    }

    pub fn full_name(&self) -> String {
        self.db.full_name(self.id)
    }

    /// Module variant, for modules only
    pub fn module_kind(&self) -> Option<ModuleKind> {
        match self.id {
            ModelId::Module(m) => Some(self.db.module(m).kind),
            _ => None,
        }
    }

    /// Human-readable kind, e.g. `function` or `field`
    pub fn kind_name(&self) -> String {
        match self.module_kind() {
            Some(kind) => kind.to_string(),
            None => self.kind().to_string(),
        }
    }

    /// Handle to the owning object
    pub fn owner(&self) -> Option<ModelRef<'a>> {
        self.db.owner_of(self.id).map(|id| self.db.get(id))
    }
}

impl PartialEq for ModelRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.db, other.db) && self.id == other.id
    }
}

impl Eq for ModelRef<'_> {}

impl fmt::Debug for ModelRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind_name(), self.full_name())
    }
}
