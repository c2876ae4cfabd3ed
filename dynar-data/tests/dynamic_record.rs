use dynar_data::prelude::*;
use dynar_data::{DynamicError, IdentifierPolicy, ParamValue, PropertyRegistry, Row};
use std::sync::Arc;

struct Product;

impl Entity for Product {
    fn table_name() -> &'static str {
        "product"
    }
    fn id_column() -> &'static str {
        "id"
    }
    fn columns() -> &'static [&'static str] {
        &["id", "name", "details"]
    }
}

fn label(record: &DynamicRecord) -> DynValue {
    match (record.get("name"), record.get("color")) {
        (Some(DynValue::Str(name)), Some(DynValue::Str(color))) => DynValue::from(format!(
            "{} ({})",
            String::from_utf8_lossy(&name),
            String::from_utf8_lossy(&color)
        )),
        _ => DynValue::Null,
    }
}

impl DynamicEntity for Product {
    fn dynamic_column() -> Option<&'static str> {
        Some("details")
    }

    fn properties() -> PropertyRegistry {
        PropertyRegistry::new().read_only("label", label)
    }
}

struct Legacy;

impl Entity for Legacy {
    fn table_name() -> &'static str {
        "legacy"
    }
    fn id_column() -> &'static str {
        "id"
    }
    fn columns() -> &'static [&'static str] {
        &["id"]
    }
}

impl DynamicEntity for Legacy {}

fn text(s: &str) -> ParamValue {
    ParamValue::Text(s.to_string())
}

#[test]
fn test_before_save_scenario() {
    let mut record = DynamicRecord::new(Product::meta());
    record.set("color", "black").unwrap();
    record.set("price.retail", 12.99).unwrap();

    let expr = record.before_save().unwrap();
    assert_eq!(
        expr.sql,
        "COLUMN_CREATE(:dca1, :dca2, :dca3, COLUMN_CREATE(:dca4, 12.99))"
    );
    assert_eq!(expr.params.get(":dca1"), Some(&text("color")));
    assert_eq!(expr.params.get(":dca2"), Some(&text("black")));
    assert_eq!(expr.params.get(":dca3"), Some(&text("price")));
    assert_eq!(expr.params.get(":dca4"), Some(&text("retail")));
    assert_eq!(expr.params.len(), 4);
}

#[test]
fn test_before_save_postgres() {
    let meta = Arc::new(ModelMeta::of::<Product>().dialect(Dialect::Postgres));
    let mut record = DynamicRecord::new(meta);
    record.set("color", "black").unwrap();
    record.set("price.retail", 12.99).unwrap();
    let expr = record.before_save().unwrap();
    assert_eq!(
        expr.sql,
        "jsonb_build_object(:dca1, :dca2, :dca3, jsonb_build_object(:dca4, 12.99))"
    );
}

#[test]
fn test_missing_dynamic_column_aborts() {
    let record = DynamicRecord::new(Legacy::meta());
    let err = record.before_save().unwrap_err();
    assert!(matches!(err, DynamicError::MissingDynamicColumn { .. }));
    assert!(QueryRewriter::new(&Legacy::meta()).is_err());
    assert!(err.to_string().contains("Legacy"));
}

#[test]
fn test_every_marker_type_is_cast() {
    let types = [
        "binary", "binary(5)", "char", "char(5)", "time", "time(5)", "datetime",
        "datetime(5)", "date", "decimal", "decimal(5)", "decimal(5,6)", "double",
        "double(5,6)", "int", "integer", "signed", "signed int", "signed integer",
        "unsigned", "unsigned int", "unsigned integer",
    ];
    let meta = Product::meta();
    let rewriter = QueryRewriter::new(&meta).unwrap();
    for t in types {
        let marker = format!("(!test|{t}!)");
        let stmt = rewriter.rewrite(&format!("SELECT {marker} FROM product"), BoundParams::new());
        let upper = stmt.sql.to_uppercase();
        assert!(
            upper.contains(&format!("AS {})", t.to_uppercase())),
            "{t}: {}",
            stmt.sql
        );
        assert!(!stmt.sql.contains(&marker));
    }
}

#[test]
fn test_default_select_has_one_computed_column() {
    let meta = Product::meta();
    let rewriter = QueryRewriter::new(&meta).unwrap();
    for query in [
        QueryBuilder::new("product"),
        QueryBuilder::new("product").select(&["*"]),
    ] {
        let mut query = query;
        rewriter.prepare_select(&mut query);
        rewriter.prepare_select(&mut query);
        let stmt = rewriter.build(query).unwrap();
        assert_eq!(stmt.sql.matches("COLUMN_JSON(`details`) AS details").count(), 1);
        assert_eq!(stmt.sql.matches("details").count(), 2);
    }
}

#[test]
fn test_query_with_markers_everywhere() {
    let meta = Product::meta();
    let rewriter = QueryRewriter::new(&meta).unwrap();
    let query = QueryBuilder::new("product")
        .dialect(Dialect::MySql)
        .identifier_policy(IdentifierPolicy::Quote)
        .where_eq("(!color!)", "black")
        .where_gt("(!price.retail|decimal(6,2)!)", 10)
        .order_by("(!price.retail|decimal(6,2)!)", false)
        .limit(5);
    let stmt = rewriter.build_checked(query).unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT `id`, `name`, COLUMN_JSON(`details`) AS `details` FROM `product` \
         WHERE COLUMN_GET(`details`, :dcq1 AS CHAR) = :qp1 \
         AND COLUMN_GET(COLUMN_GET(`details`, :dcq2 AS CHAR), :dcq3 AS DECIMAL(6,2)) > :qp2 \
         ORDER BY COLUMN_GET(COLUMN_GET(`details`, :dcq4 AS CHAR), :dcq5 AS DECIMAL(6,2)) DESC LIMIT 5"
    );
    assert_eq!(stmt.params.get(":qp1"), Some(&text("black")));
    assert_eq!(stmt.params.get(":qp2"), Some(&ParamValue::Int(10)));
    assert_eq!(stmt.params.get(":dcq1"), Some(&text("color")));
    assert_eq!(stmt.params.get(":dcq5"), Some(&text("retail")));
    assert_eq!(stmt.params.len(), 7);
}

#[test]
fn test_hydrate_then_save_keeps_attributes() {
    let mut row = Row::new();
    row.insert("id".into(), DynValue::Int(1));
    row.insert("name".into(), "Shirt".into());
    row.insert(
        "details".into(),
        r#"{"color":"black","price":{"retail":12.99},"sizes":["S","M"]}"#.into(),
    );
    let mut record = DynamicRecord::hydrate(Product::meta(), row).unwrap();

    assert_eq!(record.get("sizes.1"), Some(DynValue::from("M")));
    assert_eq!(record.get("price.retail"), Some(DynValue::Float(12.99)));
    assert_eq!(record.get("label"), Some(DynValue::from("Shirt (black)")));
    assert!(matches!(
        record.set("label", "x"),
        Err(DynamicError::ReadOnlyProperty { .. })
    ));

    record.unset("sizes").unwrap();
    record.set("price.sale", 9.99).unwrap();
    let stmt = record.update_statement().unwrap();
    assert_eq!(
        stmt.sql,
        "UPDATE `product` SET `name` = :dca1, `details` = COLUMN_CREATE(:dca2, :dca3, :dca4, COLUMN_CREATE(:dca5, 12.99, :dca6, 9.99)) WHERE `id` = :dca7"
    );
    assert_eq!(stmt.params.get(":dca7"), Some(&ParamValue::Int(1)));
}

#[test]
fn test_isset_and_unset_semantics() {
    let mut record = DynamicRecord::new(Product::meta());
    assert!(!record.isset("never.written"));
    record.set("a.b", DynValue::Null).unwrap();
    assert!(record.isset("a.b"));
    record.unset("a.b").unwrap();
    assert!(!record.isset("a.b"));
    // The emptied parent stays.
    assert!(record.isset("a"));
    assert_eq!(record.get("a"), Some(DynValue::map()));
}
