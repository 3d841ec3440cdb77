//! Common test utilities for dacpac-diff tests

use std::io::Write;
use std::path::PathBuf;

use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const NS: &str = "http://schemas.microsoft.com/sqlserver/dac/Serialization/2012/02";

/// Temporary directory holding the dacpacs and scripts of one test
pub struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.temp_dir.path().join(file_name)
    }

    /// Write a dacpac whose model.xml holds the given elements
    pub fn write_dacpac(&self, file_name: &str, model: &ModelXml) -> PathBuf {
        let path = self.path(file_name);
        let file = std::fs::File::create(&path).expect("Failed to create dacpac");
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        zip.start_file("model.xml", options).unwrap();
        zip.write_all(model.to_xml().as_bytes()).unwrap();
        zip.start_file("Origin.xml", options).unwrap();
        zip.write_all(b"<DacOrigin/>").unwrap();
        zip.finish().unwrap();
        path
    }
}

/// Builder for the elements of a model.xml document
#[derive(Default, Clone)]
pub struct ModelXml {
    elements: Vec<String>,
}

fn references(relationship: &str, names: &[&str]) -> String {
    let entries: String = names
        .iter()
        .map(|n| format!(r#"<Entry><References Name="{}"/></Entry>"#, n))
        .collect();
    format!(r#"<Relationship Name="{}">{}</Relationship>"#, relationship, entries)
}

fn cdata_property(name: &str, value: &str) -> String {
    format!(
        r#"<Property Name="{}"><Value><![CDATA[{}]]></Value></Property>"#,
        name, value
    )
}

fn header_annotation(header: &str) -> String {
    format!(
        r#"<Annotation Type="SysCommentsObjectAnnotation">{}</Annotation>"#,
        cdata_property("HeaderContents", header)
    )
}

impl ModelXml {
    pub fn new() -> Self {
        <Self as Default>::default()
    }

    pub fn to_xml(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<DataSchemaModel FileFormatVersion="1.2" SchemaVersion="2.9" xmlns="{}">
<Model>
{}
</Model>
</DataSchemaModel>"#,
            NS,
            self.elements.join("\n")
        )
    }

    pub fn schema(mut self, name: &str) -> Self {
        self.elements
            .push(format!(r#"<Element Type="SqlSchema" Name="[{}]"/>"#, name));
        self
    }

    /// Table with `(name, type, length, nullable)` columns
    pub fn table(mut self, name: &str, columns: &[(&str, &str, Option<u32>, bool)]) -> Self {
        let entries: String = columns
            .iter()
            .map(|(column, sql_type, length, nullable)| {
                let length = length
                    .map(|l| format!(r#"<Property Name="Length" Value="{}"/>"#, l))
                    .unwrap_or_default();
                format!(
                    r#"<Entry><Element Type="SqlSimpleColumn" Name="{name}.[{column}]">
<Property Name="IsNullable" Value="{nullable}"/>
<Relationship Name="TypeSpecifier"><Entry><Element Type="SqlTypeSpecifier">{length}
<Relationship Name="Type"><Entry><References ExternalSource="BuiltIns" Name="[{sql_type}]"/></Entry></Relationship>
</Element></Entry></Relationship>
</Element></Entry>"#,
                    nullable = if *nullable { "True" } else { "False" },
                )
            })
            .collect();
        self.elements.push(format!(
            r#"<Element Type="SqlTable" Name="{}"><Relationship Name="Columns">{}</Relationship></Element>"#,
            name, entries
        ));
        self
    }

    pub fn scalar_function(mut self, name: &str, header: &str, body: &str, uses: &[&str]) -> Self {
        self.elements.push(format!(
            r#"<Element Type="SqlScalarFunction" Name="{}">{}{}{}</Element>"#,
            name,
            cdata_property("BodyScript", body),
            references("BodyDependencies", uses),
            header_annotation(header)
        ));
        self
    }

    pub fn view(mut self, name: &str, header: &str, query: &str, uses: &[&str]) -> Self {
        self.elements.push(format!(
            r#"<Element Type="SqlView" Name="{}">{}{}{}</Element>"#,
            name,
            cdata_property("QueryScript", query),
            references("QueryDependencies", uses),
            header_annotation(header)
        ));
        self
    }

    pub fn procedure(mut self, name: &str, header: &str, body: &str, uses: &[&str]) -> Self {
        self.elements.push(format!(
            r#"<Element Type="SqlProcedure" Name="{}">{}{}{}</Element>"#,
            name,
            cdata_property("BodyScript", body),
            references("BodyDependencies", uses),
            header_annotation(header)
        ));
        self
    }

    /// Default on `column`; `name` is None for a system-named default
    pub fn default(
        mut self,
        name: Option<&str>,
        table: &str,
        column: &str,
        expression: &str,
        uses: &[&str],
    ) -> Self {
        let name_attr = name.map(|n| format!(r#" Name="{}""#, n)).unwrap_or_default();
        self.elements.push(format!(
            r#"<Element Type="SqlDefaultConstraint"{}>{}{}{}{}</Element>"#,
            name_attr,
            cdata_property("DefaultExpressionScript", expression),
            references("DefiningTable", &[table]),
            references("ExpressionDependencies", uses),
            references("ForColumn", &[column])
        ));
        self
    }

    pub fn check(
        mut self,
        name: Option<&str>,
        table: &str,
        expression: &str,
        uses: &[&str],
    ) -> Self {
        let name_attr = name.map(|n| format!(r#" Name="{}""#, n)).unwrap_or_default();
        self.elements.push(format!(
            r#"<Element Type="SqlCheckConstraint"{}>{}{}{}</Element>"#,
            name_attr,
            cdata_property("CheckExpressionScript", expression),
            references("CheckExpressionDependencies", uses),
            references("DefiningTable", &[table])
        ));
        self
    }

    pub fn foreign_key(mut self, name: &str, column: &str, foreign_column: &str) -> Self {
        self.elements.push(format!(
            r#"<Element Type="SqlForeignKeyConstraint" Name="{}">{}{}</Element>"#,
            name,
            references("Columns", &[column]),
            references("ForeignColumns", &[foreign_column])
        ));
        self
    }

    pub fn index(mut self, name: &str, object: &str, columns: &[&str], unique: bool) -> Self {
        let specs: String = columns
            .iter()
            .map(|c| {
                format!(
                    r#"<Entry><Element Type="SqlIndexedColumnSpecification">{}</Element></Entry>"#,
                    references("Column", &[c])
                )
            })
            .collect();
        self.elements.push(format!(
            r#"<Element Type="SqlIndex" Name="{}"><Property Name="IsUnique" Value="{}"/><Relationship Name="ColumnSpecifications">{}</Relationship>{}</Element>"#,
            name,
            if unique { "True" } else { "False" },
            specs,
            references("IndexedObject", &[object])
        ));
        self
    }
}

/// Users table shared by most fixtures
pub fn users_model() -> ModelXml {
    ModelXml::new().schema("dbo").table(
        "[dbo].[Users]",
        &[("Id", "int", None, false), ("Name", "nvarchar", Some(50), true)],
    )
}

/// Index of `needle` in `script`, panicking with the script when missing
pub fn position(script: &str, needle: &str) -> usize {
    script
        .find(needle)
        .unwrap_or_else(|| panic!("'{}' not found in script:\n{}", needle, script))
}

/// Titles of the numbered blocks of a script, in order
pub fn block_titles(script: &str) -> Vec<String> {
    script
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("-- [")?;
            let (_, title) = rest.split_once("] ")?;
            Some(title.to_string())
        })
        .collect()
}
