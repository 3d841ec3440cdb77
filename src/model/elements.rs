//! Schema model element types
//!
//! Elements live in flat arenas owned by [`DatabaseModel`](super::DatabaseModel)
//! and refer to each other through the typed ids below.

use std::fmt;

/// Index of a schema in its model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaId(pub(crate) usize);

/// Index of a table in its model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId(pub(crate) usize);

/// Index of a field in its model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(pub(crate) usize);

/// Index of a module (function, view, procedure, trigger, index) in its model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(pub(crate) usize);

/// Index of a check constraint in its model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CheckId(pub(crate) usize);

/// Identifies any object in a model.
///
/// Defaults and foreign-key references are identified by the field that owns
/// them, since a field carries at most one of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelId {
    Schema(SchemaId),
    Table(TableId),
    Field(FieldId),
    Module(ModuleId),
    Default(FieldId),
    Check(CheckId),
    Reference(FieldId),
}

impl ModelId {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelId::Schema(_) => ModelKind::Schema,
            ModelId::Table(_) => ModelKind::Table,
            ModelId::Field(_) => ModelKind::Field,
            ModelId::Module(_) => ModelKind::Module,
            ModelId::Default(_) => ModelKind::Default,
            ModelId::Check(_) => ModelKind::Check,
            ModelId::Reference(_) => ModelKind::Reference,
        }
    }
}

/// The kinds of object a model can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelKind {
    Schema,
    Table,
    Field,
    Module,
    Default,
    Check,
    Reference,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::Schema => "schema",
            ModelKind::Table => "table",
            ModelKind::Field => "field",
            ModelKind::Module => "module",
            ModelKind::Default => "default",
            ModelKind::Check => "check",
            ModelKind::Reference => "reference",
        };
        f.write_str(name)
    }
}

/// Module variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    Function,
    View,
    Procedure,
    Trigger,
    Index,
}

impl ModuleKind {
    /// Keyword used in `DROP <keyword>` statements
    pub fn keyword(&self) -> &'static str {
        match self {
            ModuleKind::Function => "FUNCTION",
            ModuleKind::View => "VIEW",
            ModuleKind::Procedure => "PROCEDURE",
            ModuleKind::Trigger => "TRIGGER",
            ModuleKind::Index => "INDEX",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleKind::Function => "function",
            ModuleKind::View => "view",
            ModuleKind::Procedure => "procedure",
            ModuleKind::Trigger => "trigger",
            ModuleKind::Index => "index",
        };
        f.write_str(name)
    }
}

/// A reference from a definition to another object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// Resolved to an object in the same model
    Resolved(ModelId),
    /// Object outside this model (system objects, other databases)
    External(String),
}

/// Schema element
#[derive(Debug, Clone)]
pub struct SchemaElement {
    pub name: String,
}

/// Table element
#[derive(Debug, Clone)]
pub struct TableElement {
    pub schema: SchemaId,
    pub name: String,
    /// Fields in column order
    pub fields: Vec<FieldId>,
    pub checks: Vec<CheckId>,
}

/// Field (column) element
#[derive(Debug, Clone)]
pub struct FieldElement {
    pub table: TableId,
    pub name: String,
    /// Full type text, e.g. `varchar(50)` (ignored for computed fields)
    pub data_type: String,
    pub nullable: bool,
    pub collation: Option<String>,
    /// Computed column expression
    pub computation: Option<String>,
    pub default: Option<FieldDefault>,
    pub reference: Option<FieldReference>,
    /// Objects referenced by the computed expression
    pub dependencies: Vec<Dependency>,
}

impl FieldElement {
    pub fn is_computed(&self) -> bool {
        self.computation.as_deref().is_some_and(|c| !c.is_empty())
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// A system-named default is written inline with the column definition
    pub fn is_default_system_named(&self) -> bool {
        self.default.as_ref().is_some_and(|d| d.name.is_none())
    }
}

/// Default value bound to a field
#[derive(Debug, Clone)]
pub struct FieldDefault {
    /// None when the constraint name is generated by the server
    pub name: Option<String>,
    pub expression: String,
    pub dependencies: Vec<Dependency>,
}

/// Foreign-key reference from a field to a field of another table
#[derive(Debug, Clone)]
pub struct FieldReference {
    /// None when the constraint name is generated by the server
    pub name: Option<String>,
    pub target: FieldId,
}

/// Check constraint on a table
#[derive(Debug, Clone)]
pub struct TableCheck {
    pub table: TableId,
    /// None when the constraint name is generated by the server
    pub name: Option<String>,
    pub expression: String,
    pub dependencies: Vec<Dependency>,
}

/// Definable object with a body: function, view, procedure, trigger or index
#[derive(Debug, Clone)]
pub struct ModuleElement {
    pub schema: SchemaId,
    pub name: String,
    pub kind: ModuleKind,
    /// Full `CREATE ...` text (empty for indexes, which are rebuilt from `index`)
    pub definition: String,
    pub dependencies: Vec<Dependency>,
    /// Present only for [`ModuleKind::Index`]
    pub index: Option<IndexDefinition>,
}

/// Index-specific module data
#[derive(Debug, Clone)]
pub struct IndexDefinition {
    pub is_clustered: bool,
    pub is_unique: bool,
    /// Table or view the index is built on
    pub indexed_object: ModelId,
    /// Key columns in order, e.g. `[Id]` or `[Created] DESC`
    pub indexed_columns: Vec<String>,
    pub included_columns: Vec<String>,
    /// Filter predicate of a filtered index
    pub condition: Option<String>,
}
