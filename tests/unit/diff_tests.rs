//! Tests for difference computation, ordering and cascades

use dacpac_diff::diff::DiffAction;
use dacpac_diff::model::{IndexDefinition, ModelId, ModuleKind};
use dacpac_diff::{diff_models, DatabaseModel, Difference, ExclusionRules};
use pretty_assertions::assert_eq;

const FN_V1: &str = "CREATE FUNCTION [dbo].[fnLabel]() RETURNS NVARCHAR(50) AS BEGIN RETURN N'a' END";
const FN_V2: &str = "CREATE FUNCTION [dbo].[fnLabel]() RETURNS NVARCHAR(50) AS BEGIN RETURN N'b' END";

/// Users table whose `Name` default and a check both call `fnLabel`
fn users_with_function(function: &str, check: &str) -> DatabaseModel {
    let mut db = DatabaseModel::new();
    let dbo = db.add_schema("dbo").unwrap();
    let users = db.add_table(dbo, "Users").unwrap();
    db.add_field(users, "Id", "int", false).unwrap();
    let name = db.add_field(users, "Name", "nvarchar(50)", true).unwrap();
    db.add_module(dbo, "fnLabel", ModuleKind::Function, function)
        .unwrap();

    db.set_default(name, None, "([dbo].[fnLabel]())").unwrap();
    db.add_dependency(ModelId::Default(name), "[dbo].[fnLabel]");
    let ck = db.add_check(users, Some("CK_Users_Name"), check).unwrap();
    db.add_dependency(ModelId::Check(ck), "[dbo].[fnLabel]");
    db.resolve_dependencies();
    db
}

fn summary(diffs: &[Difference<'_>]) -> Vec<(DiffAction, String)> {
    diffs
        .iter()
        .map(|d| (d.action(), d.model().full_name()))
        .collect()
}

fn diff(current: &DatabaseModel, target: &DatabaseModel) -> Vec<(DiffAction, String)> {
    summary(&diff_models(current, target, &ExclusionRules::default()).unwrap())
}

#[test]
fn test_identical_models_produce_nothing() {
    let a = users_with_function(FN_V1, "([Name]<>[dbo].[fnLabel]())");
    let b = users_with_function(FN_V1, "( [Name] <> [dbo].[fnLabel]() )");
    assert!(diff(&a, &b).is_empty());
}

#[test]
fn test_function_alter_recreates_dependents_first() {
    let current = users_with_function(FN_V1, "([Name]<>[dbo].[fnLabel]())");
    let target = users_with_function(FN_V2, "([Name]<>[dbo].[fnLabel]())");

    let diffs = diff(&current, &target);
    assert_eq!(diffs.len(), 3);

    let (recreates, alters): (Vec<_>, Vec<_>) = diffs
        .iter()
        .partition(|(action, _)| *action == DiffAction::Recreate);
    assert_eq!(recreates.len(), 2);
    assert_eq!(
        alters,
        vec![&(DiffAction::Alter, "[dbo].[fnLabel]".to_string())]
    );
    assert_eq!(diffs.last().unwrap().0, DiffAction::Alter);

    let names: Vec<&str> = recreates.iter().map(|(_, n)| n.as_str()).collect();
    assert!(names.contains(&"[dbo].[CK_Users_Name]"));
    assert!(names.contains(&"[dbo].[Users].[Name]:DEFAULT"));
}

#[test]
fn test_independently_changed_dependent_is_not_duplicated() {
    let current = users_with_function(FN_V1, "([Name]<>[dbo].[fnLabel]())");
    let target = users_with_function(FN_V2, "([Name]=[dbo].[fnLabel]())");

    let diffs = diff(&current, &target);
    let check_diffs = diffs
        .iter()
        .filter(|(_, name)| name == "[dbo].[CK_Users_Name]")
        .count();
    assert_eq!(check_diffs, 1);
    assert_eq!(diffs.len(), 3);
}

#[test]
fn test_dependent_being_dropped_is_not_recreated() {
    let current = users_with_function(FN_V1, "([Name]<>[dbo].[fnLabel]())");

    let mut target = DatabaseModel::new();
    let dbo = target.add_schema("dbo").unwrap();
    let users = target.add_table(dbo, "Users").unwrap();
    target.add_field(users, "Id", "int", false).unwrap();
    let name = target.add_field(users, "Name", "nvarchar(50)", true).unwrap();
    target
        .add_module(dbo, "fnLabel", ModuleKind::Function, FN_V2)
        .unwrap();
    target.set_default(name, None, "([dbo].[fnLabel]())").unwrap();
    target.add_dependency(ModelId::Default(name), "[dbo].[fnLabel]");
    target.resolve_dependencies();

    let diffs = diff(&current, &target);
    assert_eq!(
        diffs,
        vec![
            (DiffAction::Drop, "[dbo].[CK_Users_Name]".to_string()),
            (DiffAction::Recreate, "[dbo].[Users].[Name]:DEFAULT".to_string()),
            (DiffAction::Alter, "[dbo].[fnLabel]".to_string()),
        ]
    );
}

#[test]
fn test_excluded_dependent_is_left_alone() {
    let current = users_with_function(FN_V1, "([Name]<>[dbo].[fnLabel]())");
    let target = users_with_function(FN_V2, "([Name]<>[dbo].[fnLabel]())");
    let rules = ExclusionRules::new(Vec::<String>::new(), ["[dbo].[CK_*"]).unwrap();

    let diffs = summary(&diff_models(&current, &target, &rules).unwrap());
    assert_eq!(
        diffs,
        vec![
            (DiffAction::Recreate, "[dbo].[Users].[Name]:DEFAULT".to_string()),
            (DiffAction::Alter, "[dbo].[fnLabel]".to_string()),
        ]
    );
}

#[test]
fn test_procedure_alter_has_no_cascade() {
    let build = |body: &str| {
        let mut db = DatabaseModel::new();
        let dbo = db.add_schema("dbo").unwrap();
        db.add_module(dbo, "uspInner", ModuleKind::Procedure, body)
            .unwrap();
        let outer = db
            .add_module(
                dbo,
                "uspOuter",
                ModuleKind::Procedure,
                "CREATE PROCEDURE [dbo].[uspOuter] AS EXEC [dbo].[uspInner]",
            )
            .unwrap();
        db.add_dependency(ModelId::Module(outer), "[dbo].[uspInner]");
        db.resolve_dependencies();
        db
    };
    let current = build("CREATE PROCEDURE [dbo].[uspInner] AS SELECT 1");
    let target = build("CREATE PROCEDURE [dbo].[uspInner] AS SELECT 2");

    assert_eq!(
        diff(&current, &target),
        vec![(DiffAction::Alter, "[dbo].[uspInner]".to_string())]
    );
}

fn indexed(unique: bool, columns: &[&str]) -> DatabaseModel {
    let mut db = DatabaseModel::new();
    let dbo = db.add_schema("dbo").unwrap();
    let orders = db.add_table(dbo, "Orders").unwrap();
    db.add_field(orders, "Id", "int", false).unwrap();
    db.add_field(orders, "Placed", "datetime2", false).unwrap();
    db.add_index(
        "IX_Orders",
        IndexDefinition {
            is_clustered: false,
            is_unique: unique,
            indexed_object: ModelId::Table(orders),
            indexed_columns: columns.iter().map(|c| c.to_string()).collect(),
            included_columns: Vec::new(),
            condition: None,
        },
    )
    .unwrap();
    db.resolve_dependencies();
    db
}

#[test]
fn test_index_change_is_single_recreate() {
    let current = indexed(false, &["[Placed]"]);
    let target = indexed(true, &["[Placed] DESC", "[Id]"]);

    assert_eq!(
        diff(&current, &target),
        vec![(
            DiffAction::Recreate,
            "[dbo].[Orders].[IX_Orders]".to_string()
        )]
    );
}

#[test]
fn test_creates_follow_dependencies_and_drops_reverse_them() {
    let mut full = DatabaseModel::new();
    let dbo = full.add_schema("dbo").unwrap();
    full.add_module(
        dbo,
        "zBase",
        ModuleKind::Function,
        "CREATE FUNCTION [dbo].[zBase]() RETURNS INT AS BEGIN RETURN 1 END",
    )
    .unwrap();
    let view = full
        .add_module(
            dbo,
            "aTop",
            ModuleKind::View,
            "CREATE VIEW [dbo].[aTop] AS SELECT [dbo].[zBase]() AS [Value]",
        )
        .unwrap();
    full.add_dependency(ModelId::Module(view), "[dbo].[zBase]");
    full.resolve_dependencies();

    let mut empty = DatabaseModel::new();
    empty.add_schema("dbo").unwrap();

    assert_eq!(
        diff(&empty, &full),
        vec![
            (DiffAction::Create, "[dbo].[zBase]".to_string()),
            (DiffAction::Create, "[dbo].[aTop]".to_string()),
        ]
    );
    assert_eq!(
        diff(&full, &empty),
        vec![
            (DiffAction::Drop, "[dbo].[aTop]".to_string()),
            (DiffAction::Drop, "[dbo].[zBase]".to_string()),
        ]
    );
}

fn seeded(with_new_objects: bool) -> DatabaseModel {
    let mut db = DatabaseModel::new();
    let dbo = db.add_schema("dbo").unwrap();
    let users = db.add_table(dbo, "Users").unwrap();
    db.add_field(users, "Id", "int", false).unwrap();
    if !with_new_objects {
        return db;
    }

    let code = db.add_field(users, "Code", "int", true).unwrap();
    db.set_default(code, None, "([dbo].[zCode]())").unwrap();
    db.add_dependency(ModelId::Default(code), "[dbo].[zCode]");

    let accounts = db.add_table(dbo, "Accounts").unwrap();
    db.add_field(accounts, "Qty", "int", false).unwrap();
    let seed = db.add_field(accounts, "Seed", "int", false).unwrap();
    db.set_default(seed, None, "([dbo].[zSeed]())").unwrap();
    db.add_dependency(ModelId::Default(seed), "[dbo].[zSeed]");
    let total = db
        .add_computed_field(accounts, "Total", "([dbo].[zScale]([Qty]))")
        .unwrap();
    db.add_dependency(ModelId::Field(total), "[dbo].[zScale]");

    for (name, body) in [
        ("zCode", "CREATE FUNCTION [dbo].[zCode]() RETURNS INT AS BEGIN RETURN 1 END"),
        ("zSeed", "CREATE FUNCTION [dbo].[zSeed]() RETURNS INT AS BEGIN RETURN 2 END"),
        ("zScale", "CREATE FUNCTION [dbo].[zScale](@v INT) RETURNS INT AS BEGIN RETURN @v * 2 END"),
    ] {
        db.add_module(dbo, name, ModuleKind::Function, body).unwrap();
    }
    db.resolve_dependencies();
    db
}

#[test]
fn test_inline_column_definitions_follow_what_they_call() {
    let current = seeded(false);
    let target = seeded(true);

    let diffs = diff(&current, &target);
    assert_eq!(diffs.len(), 5);
    assert!(diffs.iter().all(|(action, _)| *action == DiffAction::Create));

    let position = |name: &str| diffs.iter().position(|(_, n)| n == name).unwrap();
    assert!(position("[dbo].[zSeed]") < position("[dbo].[Accounts]"));
    assert!(position("[dbo].[zScale]") < position("[dbo].[Accounts]"));
    assert!(position("[dbo].[zCode]") < position("[dbo].[Users].[Code]"));

    assert_eq!(
        diff(&target, &current),
        vec![
            (DiffAction::Drop, "[dbo].[Users].[Code]:DEFAULT".to_string()),
            (DiffAction::Drop, "[dbo].[Users].[Code]".to_string()),
            (DiffAction::Drop, "[dbo].[zCode]".to_string()),
            (DiffAction::Drop, "[dbo].[Accounts]".to_string()),
            (DiffAction::Drop, "[dbo].[zScale]".to_string()),
            (DiffAction::Drop, "[dbo].[zSeed]".to_string()),
        ]
    );
}

#[test]
fn test_each_object_is_created_or_dropped_once() {
    let mut target = DatabaseModel::new();
    let dbo = target.add_schema("dbo").unwrap();
    let sales = target.add_schema("sales").unwrap();
    let customers = target.add_table(sales, "Customers").unwrap();
    let id = target.add_field(customers, "Id", "int", false).unwrap();
    let orders = target.add_table(sales, "Orders").unwrap();
    let customer = target.add_field(orders, "CustomerId", "int", false).unwrap();
    target
        .set_reference(customer, Some("FK_Orders_Customers"), id)
        .unwrap();
    target
        .add_check(orders, None, "([CustomerId]>(0))")
        .unwrap();
    target
        .add_module(
            dbo,
            "vOrders",
            ModuleKind::View,
            "CREATE VIEW [dbo].[vOrders] AS SELECT * FROM [sales].[Orders]",
        )
        .unwrap();
    target.resolve_dependencies();

    let mut current = DatabaseModel::new();
    current.add_schema("dbo").unwrap();

    let diffs = diff(&current, &target);
    let mut names: Vec<&String> = diffs.iter().map(|(_, n)| n).collect();
    let total = names.len();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), total);
    assert!(diffs.iter().all(|(action, _)| *action == DiffAction::Create));

    let position = |name: &str| diffs.iter().position(|(_, n)| n == name).unwrap();
    assert!(position("[sales]") < position("[sales].[Customers]"));
    assert!(position("[sales].[Customers]") < position("[sales].[Orders]"));
    assert!(position("[sales].[Orders]") < position("[sales].[FK_Orders_Customers]"));
}
