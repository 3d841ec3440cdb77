//! Build a [`DatabaseModel`] from a dacpac's model.xml
//!
//! Only the element types the diff engine compares are read: schemas,
//! tables with their columns, defaults, checks, single-column foreign keys,
//! functions, views, procedures, DML triggers and indexes. Everything else in
//! the model (primary keys, users, permissions, options) is skipped.

use std::path::Path;

use roxmltree::{Document, Node};

use crate::error::DacpacDiffError;
use crate::model::{bracket, DatabaseModel, FieldId, IndexDefinition, ModelId, ModuleKind, SchemaId};

const NS: &str = "http://schemas.microsoft.com/sqlserver/dac/Serialization/2012/02";

/// Check if a node is an element with the given local name in the DAC namespace.
fn is_ns_element(node: &Node, local_name: &str) -> bool {
    node.is_element() && node.tag_name().name() == local_name && node.tag_name().namespace() == Some(NS)
}

fn find_child<'a, 'input>(parent: &Node<'a, 'input>, local_name: &str) -> Option<Node<'a, 'input>> {
    parent.children().find(|c| is_ns_element(c, local_name))
}

fn find_children<'a, 'input>(parent: &Node<'a, 'input>, local_name: &str) -> Vec<Node<'a, 'input>> {
    parent
        .children()
        .filter(|c| is_ns_element(c, local_name))
        .collect()
}

/// Value of a `<Property>`, from its `Value` attribute or its `<Value>` child
fn property(elem: &Node, name: &str) -> Option<String> {
    let prop = find_children(elem, "Property")
        .into_iter()
        .find(|p| p.attribute("Name") == Some(name))?;
    match prop.attribute("Value") {
        Some(v) => Some(v.to_string()),
        None => find_child(&prop, "Value").and_then(|v| v.text()).map(str::to_string),
    }
}

fn bool_property(elem: &Node, name: &str) -> Option<bool> {
    property(elem, name).map(|v| v.eq_ignore_ascii_case("true"))
}

fn relationship<'a, 'input>(elem: &Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    find_children(elem, "Relationship")
        .into_iter()
        .find(|r| r.attribute("Name") == Some(name))
}

/// Names referenced by a relationship, in order
fn relationship_refs(elem: &Node, name: &str) -> Vec<String> {
    let Some(rel) = relationship(elem, name) else {
        return Vec::new();
    };
    find_children(&rel, "Entry")
        .iter()
        .filter_map(|entry| find_child(entry, "References"))
        .filter_map(|refs| refs.attribute("Name").map(str::to_string))
        .collect()
}

/// Inline elements of a relationship, in order
fn relationship_elements<'a, 'input>(elem: &Node<'a, 'input>, name: &str) -> Vec<Node<'a, 'input>> {
    let Some(rel) = relationship(elem, name) else {
        return Vec::new();
    };
    find_children(&rel, "Entry")
        .iter()
        .filter_map(|entry| find_child(entry, "Element"))
        .collect()
}

/// Property of an attached `SysCommentsObjectAnnotation`
fn comment_annotation(elem: &Node, name: &str) -> Option<String> {
    elem.children()
        .filter(|c| is_ns_element(c, "Annotation") || is_ns_element(c, "AttachedAnnotation"))
        .find(|a| a.attribute("Type") == Some("SysCommentsObjectAnnotation"))
        .and_then(|a| property(&a, name))
}

/// Split a bracketed multi-part name such as `[dbo].[Users].[Id]`
pub fn split_name(full_name: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut chars = full_name.trim().chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '[' => {
                let mut part = String::new();
                while let Some(c) = chars.next() {
                    if c == ']' {
                        // `]]` escapes a bracket inside the name
                        if chars.peek() == Some(&']') {
                            chars.next();
                            part.push(']');
                        } else {
                            break;
                        }
                    } else {
                        part.push(c);
                    }
                }
                parts.push(part);
            }
            '.' => {}
            other => {
                let mut part = other.to_string();
                while let Some(&c) = chars.peek() {
                    if c == '.' {
                        break;
                    }
                    part.push(c);
                    chars.next();
                }
                parts.push(part);
            }
        }
    }
    parts
}

/// Column type text from an inline `SqlTypeSpecifier`
fn type_text(column: &Node) -> Option<String> {
    let spec = relationship_elements(column, "TypeSpecifier").into_iter().next()?;
    let type_ref = relationship_refs(&spec, "Type").into_iter().next()?;
    let parts = split_name(&type_ref);
    let name = match parts.as_slice() {
        [builtin] => builtin.to_lowercase(),
        _ => type_ref.clone(),
    };

    let args = if bool_property(&spec, "IsMax") == Some(true) {
        Some("max".to_string())
    } else if let Some(length) = property(&spec, "Length") {
        Some(length)
    } else if let Some(precision) = property(&spec, "Precision") {
        let scale = property(&spec, "Scale").unwrap_or_else(|| "0".to_string());
        Some(format!("{},{}", precision, scale))
    } else {
        property(&spec, "Scale")
    };

    Some(match args {
        Some(args) => format!("{}({})", name, args),
        None => name,
    })
}

fn module_kind(element_type: &str) -> Option<ModuleKind> {
    match element_type {
        "SqlScalarFunction"
        | "SqlInlineTableValuedFunction"
        | "SqlMultiStatementTableValuedFunction"
        | "SqlTableValuedFunction" => Some(ModuleKind::Function),
        "SqlView" => Some(ModuleKind::View),
        "SqlProcedure" => Some(ModuleKind::Procedure),
        "SqlDmlTrigger" => Some(ModuleKind::Trigger),
        _ => None,
    }
}

fn join_script(header: &str, body: &str) -> String {
    if header.ends_with(char::is_whitespace) {
        format!("{}{}", header, body)
    } else {
        format!("{}\n{}", header, body)
    }
}

/// `CREATE ...` text of a module
fn module_definition(elem: &Node, kind: ModuleKind, full_name: &str) -> String {
    let header = comment_annotation(elem, "HeaderContents");
    let body = match kind {
        ModuleKind::View => property(elem, "QueryScript"),
        _ => property(elem, "BodyScript"),
    }
    .unwrap_or_default();

    if let Some(header) = header {
        return join_script(&header, &body);
    }

    match kind {
        ModuleKind::Trigger => {
            let parent = relationship_refs(elem, "Parent").into_iter().next().unwrap_or_default();
            let timing = match property(elem, "SqlTriggerType").as_deref() {
                Some("3") => "INSTEAD OF",
                _ => "AFTER",
            };
            let events: Vec<&str> = [
                ("IsInsertTrigger", "INSERT"),
                ("IsUpdateTrigger", "UPDATE"),
                ("IsDeleteTrigger", "DELETE"),
            ]
            .into_iter()
            .filter(|(prop, _)| bool_property(elem, prop) == Some(true))
            .map(|(_, event)| event)
            .collect();
            format!(
                "CREATE TRIGGER {} ON {} {} {} AS\n{}",
                full_name,
                parent,
                timing,
                events.join(", "),
                body
            )
        }
        ModuleKind::View => format!("CREATE VIEW {}\nAS\n{}", full_name, body),
        ModuleKind::Procedure => format!("CREATE PROCEDURE {}\nAS\n{}", full_name, body),
        ModuleKind::Function | ModuleKind::Index => {
            tracing::warn!(name = full_name, "Module has no header, definition is incomplete");
            body
        }
    }
}

/// Objects referenced by an element's definition
fn dependency_refs(elem: &Node) -> Vec<String> {
    [
        "BodyDependencies",
        "QueryDependencies",
        "ExpressionDependencies",
        "CheckExpressionDependencies",
    ]
    .into_iter()
    .flat_map(|rel| relationship_refs(elem, rel))
    .collect()
}

/// Loads model.xml elements into a [`DatabaseModel`]
struct ModelLoader<'p> {
    path: &'p Path,
    db: DatabaseModel,
    dependencies: Vec<(ModelId, Vec<String>)>,
}

impl<'p> ModelLoader<'p> {
    fn error(&self, message: impl Into<String>) -> DacpacDiffError {
        DacpacDiffError::ModelXmlError {
            path: self.path.to_path_buf(),
            message: message.into(),
        }
    }

    fn schema_for(&mut self, parts: &[String]) -> Result<SchemaId, DacpacDiffError> {
        match parts.first() {
            Some(schema) => self.db.ensure_schema(schema),
            None => Err(self.error("Element has an empty name")),
        }
    }

    fn field(&self, name: &str) -> Option<FieldId> {
        match self.db.try_get(name)? {
            ModelId::Field(f) => Some(f),
            _ => None,
        }
    }

    /// Name of a named constraint; None when the server generates it
    fn constraint_name(elem: &Node) -> Option<String> {
        elem.attribute("Name")
            .and_then(|n| split_name(n).pop())
            .filter(|n| !n.is_empty())
    }

    fn load_schema(&mut self, elem: &Node) -> Result<(), DacpacDiffError> {
        if let Some(name) = elem.attribute("Name") {
            let parts = split_name(name);
            self.schema_for(&parts)?;
        }
        Ok(())
    }

    fn load_table(&mut self, elem: &Node) -> Result<(), DacpacDiffError> {
        let name = elem.attribute("Name").unwrap_or_default();
        let parts = split_name(name);
        let [_, table_name] = parts.as_slice() else {
            return Err(self.error(format!("Unexpected table name {}", name)));
        };
        let schema = self.schema_for(&parts)?;
        let table = self.db.add_table(schema, table_name)?;

        for column in relationship_elements(elem, "Columns") {
            let column_name = column
                .attribute("Name")
                .and_then(|n| split_name(n).pop())
                .unwrap_or_default();
            let field = match column.attribute("Type") {
                Some("SqlComputedColumn") => {
                    let expression = property(&column, "ExpressionScript").unwrap_or_default();
                    self.db.add_computed_field(table, &column_name, &expression)?
                }
                _ => {
                    let data_type = type_text(&column).unwrap_or_default();
                    let nullable = bool_property(&column, "IsNullable").unwrap_or(true);
                    let field = self.db.add_field(table, &column_name, &data_type, nullable)?;
                    if let Some(collation) = property(&column, "Collation") {
                        self.db.set_collation(field, &collation);
                    }
                    field
                }
            };
            let deps = dependency_refs(&column);
            if !deps.is_empty() {
                self.dependencies.push((ModelId::Field(field), deps));
            }
        }
        Ok(())
    }

    fn load_module(&mut self, elem: &Node, kind: ModuleKind) -> Result<(), DacpacDiffError> {
        let name = elem.attribute("Name").unwrap_or_default();
        let parts = split_name(name);
        let [_, module_name] = parts.as_slice() else {
            return Err(self.error(format!("Unexpected module name {}", name)));
        };
        let schema = self.schema_for(&parts)?;
        let full_name = format!("{}.{}", bracket(&parts[0]), bracket(module_name));
        let definition = module_definition(elem, kind, &full_name);
        let module = self.db.add_module(schema, module_name, kind, &definition)?;

        let mut deps = dependency_refs(elem);
        // A trigger needs its table
        deps.extend(relationship_refs(elem, "Parent"));
        if !deps.is_empty() {
            self.dependencies.push((ModelId::Module(module), deps));
        }
        Ok(())
    }

    fn load_default(&mut self, elem: &Node) -> Result<(), DacpacDiffError> {
        let column = relationship_refs(elem, "ForColumn").into_iter().next().unwrap_or_default();
        let Some(field) = self.field(&column) else {
            tracing::warn!(column = %column, "Default for unknown column skipped");
            return Ok(());
        };
        let expression = property(elem, "DefaultExpressionScript").unwrap_or_default();
        let name = Self::constraint_name(elem);
        self.db.set_default(field, name.as_deref(), &expression)?;

        let deps = dependency_refs(elem);
        if !deps.is_empty() {
            self.dependencies.push((ModelId::Default(field), deps));
        }
        Ok(())
    }

    fn load_check(&mut self, elem: &Node) -> Result<(), DacpacDiffError> {
        let table_name = relationship_refs(elem, "DefiningTable").into_iter().next().unwrap_or_default();
        let Some(ModelId::Table(table)) = self.db.try_get(&table_name) else {
            tracing::warn!(table = %table_name, "Check for unknown table skipped");
            return Ok(());
        };
        let expression = property(elem, "CheckExpressionScript").unwrap_or_default();
        let name = Self::constraint_name(elem);
        let check = self.db.add_check(table, name.as_deref(), &expression)?;

        let deps = dependency_refs(elem);
        if !deps.is_empty() {
            self.dependencies.push((ModelId::Check(check), deps));
        }
        Ok(())
    }

    fn load_foreign_key(&mut self, elem: &Node) -> Result<(), DacpacDiffError> {
        let columns = relationship_refs(elem, "Columns");
        let foreign = relationship_refs(elem, "ForeignColumns");
        let ([column], [target]) = (columns.as_slice(), foreign.as_slice()) else {
            tracing::warn!(
                name = elem.attribute("Name").unwrap_or("(unnamed)"),
                "Multi-column foreign key skipped"
            );
            return Ok(());
        };
        let (Some(field), Some(target)) = (self.field(column), self.field(target)) else {
            tracing::warn!(column = %column, "Foreign key between unknown columns skipped");
            return Ok(());
        };
        let name = Self::constraint_name(elem);
        self.db.set_reference(field, name.as_deref(), target)?;
        Ok(())
    }

    fn load_index(&mut self, elem: &Node) -> Result<(), DacpacDiffError> {
        let name = elem.attribute("Name").unwrap_or_default();
        let Some(index_name) = split_name(name).pop() else {
            return Err(self.error("Index without a name"));
        };
        let object_name = relationship_refs(elem, "IndexedObject").into_iter().next().unwrap_or_default();
        let Some(indexed_object) = self.db.try_get(&object_name) else {
            tracing::warn!(index = name, object = %object_name, "Index on unknown object skipped");
            return Ok(());
        };

        let indexed_columns = relationship_elements(elem, "ColumnSpecifications")
            .iter()
            .filter_map(|spec| {
                let column = relationship_refs(spec, "Column").into_iter().next()?;
                let column = bracket(&split_name(&column).pop()?);
                Some(if bool_property(spec, "IsAscending") == Some(false) {
                    format!("{} DESC", column)
                } else {
                    column
                })
            })
            .collect();
        let included_columns = relationship_refs(elem, "IncludedColumns")
            .iter()
            .filter_map(|c| split_name(c).pop())
            .map(|c| bracket(&c))
            .collect();

        let index = IndexDefinition {
            is_clustered: bool_property(elem, "IsClustered").unwrap_or(false),
            is_unique: bool_property(elem, "IsUnique").unwrap_or(false),
            indexed_object,
            indexed_columns,
            included_columns,
            condition: property(elem, "FilterPredicate"),
        };
        self.db.add_index(&index_name, index)?;
        Ok(())
    }
}

/// Parse model.xml text into a resolved [`DatabaseModel`]
pub fn parse_model_xml(xml: &str, path: &Path) -> Result<DatabaseModel, DacpacDiffError> {
    let doc = Document::parse(xml).map_err(|e| DacpacDiffError::ModelXmlError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let root = doc.root_element();
    let model = find_child(&root, "Model").ok_or_else(|| DacpacDiffError::ModelXmlError {
        path: path.to_path_buf(),
        message: "missing <Model> element".to_string(),
    })?;
    let elements = find_children(&model, "Element");
    let of_type = |types: &[&str]| {
        elements
            .iter()
            .filter(|e| e.attribute("Type").is_some_and(|t| types.contains(&t)))
            .copied()
            .collect::<Vec<_>>()
    };

    let mut loader = ModelLoader {
        path,
        db: DatabaseModel::new(),
        dependencies: Vec::new(),
    };

    // Owners before the objects that need them
    for elem in of_type(&["SqlSchema"]) {
        loader.load_schema(&elem)?;
    }
    for elem in of_type(&["SqlTable"]) {
        loader.load_table(&elem)?;
    }
    for elem in &elements {
        if let Some(kind) = elem.attribute("Type").and_then(module_kind) {
            loader.load_module(elem, kind)?;
        }
    }
    for elem in of_type(&["SqlDefaultConstraint"]) {
        loader.load_default(&elem)?;
    }
    for elem in of_type(&["SqlCheckConstraint"]) {
        loader.load_check(&elem)?;
    }
    for elem in of_type(&["SqlForeignKeyConstraint"]) {
        loader.load_foreign_key(&elem)?;
    }
    for elem in of_type(&["SqlIndex"]) {
        loader.load_index(&elem)?;
    }

    let ModelLoader {
        mut db,
        dependencies,
        ..
    } = loader;
    for (owner, names) in dependencies {
        for name in names {
            db.add_dependency(owner, &name);
        }
    }
    let unresolved = db.resolve_dependencies();
    tracing::debug!(
        path = %path.display(),
        objects = db.len(),
        unresolved,
        "Loaded schema model"
    );
    Ok(db)
}
