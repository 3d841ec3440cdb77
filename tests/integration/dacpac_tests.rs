//! Integration tests for loading dacpac files

use dacpac_diff::dacpac::load_dacpac;
use dacpac_diff::model::{Dependency, ModelId, ModuleKind};
use dacpac_diff::DacpacDiffError;
use pretty_assertions::assert_eq;

use crate::common::{users_model, TestContext};

#[test]
fn test_load_tables_and_columns() {
    let ctx = TestContext::new();
    let path = ctx.write_dacpac("db.dacpac", &users_model());

    let db = load_dacpac(&path).unwrap();
    let table = db.find_table("dbo", "Users").unwrap();
    let columns: Vec<(String, String, bool)> = db
        .table(table)
        .fields
        .iter()
        .map(|f| {
            let field = db.field(*f);
            (field.name.clone(), field.data_type.clone(), field.nullable)
        })
        .collect();

    assert_eq!(
        columns,
        vec![
            ("Id".to_string(), "int".to_string(), false),
            ("Name".to_string(), "nvarchar(50)".to_string(), true),
        ]
    );
}

#[test]
fn test_load_resolves_module_dependencies() {
    let ctx = TestContext::new();
    let model = users_model()
        .scalar_function(
            "[dbo].[fnCount]",
            "CREATE FUNCTION [dbo].[fnCount]() RETURNS INT AS",
            "BEGIN RETURN (SELECT COUNT(*) FROM [dbo].[Users]) END",
            &["[dbo].[Users]"],
        )
        .view(
            "[dbo].[vCount]",
            "CREATE VIEW [dbo].[vCount] AS",
            "SELECT [dbo].[fnCount]() AS [Total]",
            &["[dbo].[fnCount]", "[sys].[objects]"],
        );
    let path = ctx.write_dacpac("db.dacpac", &model);

    let db = load_dacpac(&path).unwrap();
    let Some(ModelId::Module(view)) = db.try_get("[dbo].[vCount]") else {
        panic!("view not loaded");
    };
    let view = db.module(view);
    assert_eq!(view.kind, ModuleKind::View);
    assert_eq!(
        view.definition,
        "CREATE VIEW [dbo].[vCount] AS\nSELECT [dbo].[fnCount]() AS [Total]"
    );

    let function = db.try_get("[dbo].[fnCount]").unwrap();
    assert!(view.dependencies.contains(&Dependency::Resolved(function)));
    assert!(view
        .dependencies
        .contains(&Dependency::External("[sys].[objects]".to_string())));
}

#[test]
fn test_load_constraints_and_indexes() {
    let ctx = TestContext::new();
    let model = users_model()
        .table(
            "[dbo].[Orders]",
            &[("Id", "int", None, false), ("UserId", "int", None, true)],
        )
        .default(None, "[dbo].[Users]", "[dbo].[Users].[Name]", "(N'')", &[])
        .check(Some("[dbo].[CK_Orders_Id]"), "[dbo].[Orders]", "([Id]>(0))", &[])
        .foreign_key(
            "[dbo].[FK_Orders_Users]",
            "[dbo].[Orders].[UserId]",
            "[dbo].[Users].[Id]",
        )
        .index(
            "[dbo].[Orders].[IX_Orders_UserId]",
            "[dbo].[Orders]",
            &["[dbo].[Orders].[UserId]"],
            false,
        );
    let path = ctx.write_dacpac("db.dacpac", &model);

    let db = load_dacpac(&path).unwrap();
    assert!(db.try_get("[dbo].[Users].[Name]:DEFAULT").is_some());
    assert!(db.try_get("[dbo].[CK_Orders_Id]").is_some());
    assert!(db.try_get("[dbo].[FK_Orders_Users]").is_some());

    let Some(ModelId::Module(ix)) = db.try_get("[dbo].[Orders].[IX_Orders_UserId]") else {
        panic!("index not loaded");
    };
    let index = db.module(ix).index.as_ref().unwrap();
    assert_eq!(index.indexed_columns, vec!["[UserId]"]);
}

#[test]
fn test_dacpac_without_model_is_an_error() {
    let ctx = TestContext::new();
    let path = ctx.path("empty.dacpac");
    let file = std::fs::File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    zip.start_file("Origin.xml", zip::write::SimpleFileOptions::default())
        .unwrap();
    zip.finish().unwrap();

    let err = load_dacpac(&path).unwrap_err();
    assert!(matches!(err, DacpacDiffError::ModelXmlError { .. }));
}

#[test]
fn test_missing_dacpac_is_an_error() {
    let ctx = TestContext::new();
    let err = load_dacpac(&ctx.path("missing.dacpac")).unwrap_err();
    assert!(matches!(err, DacpacDiffError::DacpacReadError { .. }));
}
