#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use starlift::olap::{
        Attribute, Dimension, DimensionRef, EntityMapper, Fact, Hierarchy, HierarchyDimension,
        Measure, ModelExporter, ModelRegistry, OlapMapper,
    };
    use starlift::runtime::{Context, Message};
    use starlift::sql::{ColumnType, SqlBackend, StatsCollector};

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn exporter() -> ModelExporter {
        let registry = ModelRegistry::builder()
            .add(
                Dimension::new("year")
                    .with_attributes(vec![Attribute::new("year", ColumnType::Integer)]),
            )
            .add(
                Dimension::new("month")
                    .with_attributes(vec![Attribute::new("month", ColumnType::Integer)]),
            )
            .add(
                HierarchyDimension::new("date", vec!["year".to_string(), "month".to_string()])
                    .with_label("Date")
                    .with_role("date")
                    .with_hierarchies(vec![
                        Hierarchy::new("y", vec!["year".to_string()]),
                        Hierarchy::new("ym", vec!["year".to_string(), "month".to_string()]),
                    ]),
            )
            .add(
                Dimension::new("country")
                    .with_label("Country")
                    .with_attributes(vec![Attribute::new("country_code", ColumnType::String)]),
            )
            .add(
                Fact::new("sales")
                    .with_label("Sales")
                    .with_dimensions(vec![
                        DimensionRef::new("country"),
                        DimensionRef::new("date").with_name("order_date"),
                    ])
                    .with_measures(vec![
                        Measure::new("amount", ColumnType::Float).with_label("Amount")
                    ])
                    .with_attributes(vec![Attribute::new("order_ref", ColumnType::String)]),
            )
            .build()
            .unwrap();
        let mapper = Rc::new(
            OlapMapper::new(
                "main",
                Rc::new(registry),
                SqlBackend::in_memory(),
                StatsCollector::new(),
            )
            .with_mappers(vec![
                EntityMapper::embedded("year"),
                EntityMapper::embedded("month"),
                EntityMapper::embedded("date"),
                EntityMapper::embedded("country"),
                EntityMapper::table("sales", "sales"),
            ]),
        );
        ModelExporter::new("export", mapper)
    }

    #[test]
    fn test_document_top_level_shape() {
        init();
        let doc = exporter().model_document().unwrap();
        assert!(doc["dimensions"].is_array());
        assert!(doc["cubes"].is_array());
        assert_eq!(doc["cubes"].as_array().unwrap().len(), 1);
    }

    /// Facts never appear among the dimension documents; hierarchy
    /// dimensions flatten to their level list.
    #[test]
    fn test_dimension_documents() {
        init();
        let doc = exporter().model_document().unwrap();
        let dims = doc["dimensions"].as_array().unwrap();
        let names: Vec<&str> = dims.iter().map(|d| d["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["year", "month", "date", "country"]);

        let country = &dims[3];
        assert_eq!(country["label"], "Country");
        assert_eq!(country["levels"].as_array().unwrap().len(), 1);
        assert_eq!(
            country["levels"][0]["attributes"][0]["name"],
            "country_code"
        );

        let date = &dims[2];
        assert_eq!(date["levels"].as_array().unwrap().len(), 2);
        assert_eq!(date["levels"][1]["name"], "month");
        assert_eq!(date["hierarchies"][1]["name"], "ym");
    }

    /// A date-role hierarchy dimension advertises date filtering, keyed
    /// to its finest hierarchy.
    #[test]
    fn test_date_dimension_filter_metadata() {
        init();
        let doc = exporter().model_document().unwrap();
        let date = &doc["dimensions"][2];
        assert_eq!(date["role"], "date");
        assert_eq!(date["info"]["datefilter"], true);
        assert_eq!(date["info"]["datefilter_hierarchy"], "ym");
    }

    #[test]
    fn test_cube_document() {
        init();
        let doc = exporter().model_document().unwrap();
        let cube = &doc["cubes"][0];
        assert_eq!(cube["name"], "sales");
        assert_eq!(cube["label"], "Sales");
        assert_eq!(cube["table"], "sales");
        // no declared key, so the cube is keyed by the surrogate
        assert_eq!(cube["key"], "id");

        let dims = cube["dimensions"].as_array().unwrap();
        let dims: Vec<&str> = dims.iter().map(|d| d.as_str().unwrap()).collect();
        assert_eq!(dims, vec!["country", "order_date.year", "order_date.month"]);

        assert_eq!(cube["details"][0]["name"], "order_ref");
        // everything is embedded here, so the cube needs no joins
        assert!(cube["joins"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_cube_measures_carry_aggregations() {
        init();
        let doc = exporter().model_document().unwrap();
        let measures = doc["cubes"][0]["measures"].as_array().unwrap();
        assert_eq!(measures.len(), 2);
        assert_eq!(measures[0]["name"], "amount");
        assert_eq!(
            measures[0]["aggregations"],
            serde_json::json!(["sum", "avg", "max", "min"])
        );
        assert_eq!(measures[1]["name"], "record_count");
        assert_eq!(measures[1]["aggregations"], serde_json::json!(["count"]));
    }

    #[test]
    fn test_cube_mappings_point_at_physical_columns() {
        init();
        let doc = exporter().model_document().unwrap();
        let mappings = doc["cubes"][0]["mappings"].as_object().unwrap();
        assert_eq!(mappings["amount"], "sales.amount");
        assert_eq!(
            mappings["country.country_code"],
            "sales.country_country_code"
        );
        assert_eq!(
            mappings["order_date.year.year"],
            "sales.order_date_year"
        );
    }

    #[test]
    fn test_exporter_node_writes_file() {
        init();
        let path = std::env::temp_dir().join("starlift_export_test.json");
        let exporter = exporter().with_path(&path);
        let ctx = Context::new();
        ctx.initialize(&exporter).unwrap();
        let out = ctx.run(&exporter, Message::new()).unwrap();
        assert_eq!(out.len(), 1);

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(written["cubes"].is_array());
        std::fs::remove_file(&path).unwrap();
    }
}
