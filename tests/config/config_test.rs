#[cfg(test)]
mod tests {
    use starlift::config::ModelConfig;
    use starlift::olap::Store;
    use starlift::runtime::{message, Context, Value};
    use starlift::sql::{SqlBackend, StatsCollector};
    use starlift::EtlError;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    const SALES_MODEL: &str = r#"
        name = "sales_mart"

        [[dimension]]
        name = "country"
        label = "Country"
        attribute = [
            { name = "country_code", type = "string" },
            { name = "country_name", type = "string" },
        ]

        [[dimension]]
        name = "status"
        attribute = [{ name = "status", type = "string" }]

        [[fact]]
        name = "sales"
        label = "Sales"
        dimension = [{ entity = "country" }, { entity = "status" }]
        measure = [{ name = "amount", type = "float", label = "Amount" }]

        [[mapper]]
        entity = "country"
        kind = "table"
        table = "country"
        mapping = [{ path = ["country_code"], pk = true }]

        [[mapper]]
        entity = "status"
        kind = "embedded"

        [[mapper]]
        entity = "sales"
        kind = "table"
        table = "sales"
    "#;

    #[test]
    fn test_config_builds_registry_and_scope() {
        init();
        let config = ModelConfig::parse(SALES_MODEL).unwrap();
        let (registry, mapper) =
            config.build(SqlBackend::in_memory(), StatsCollector::new()).unwrap();

        assert_eq!(mapper.scope_name(), "sales_mart");
        let fact = registry.fact("sales").unwrap();
        assert_eq!(fact.label(), "Sales");
        assert_eq!(fact.dimensions.len(), 2);

        let country = mapper.resolve("country").unwrap();
        assert_eq!(country.table_name(), Some("country"));
        assert!(mapper.resolve("status").unwrap().table_name().is_none());
    }

    /// The configured model runs end to end: dimension rows dedupe on
    /// their declared key, the fact row carries the foreign key.
    #[test]
    fn test_configured_model_stores_messages() {
        init();
        let config = ModelConfig::parse(SALES_MODEL).unwrap();
        let (_, mapper) =
            config.build(SqlBackend::in_memory(), StatsCollector::new()).unwrap();

        let store = Store::new("store_sales", "sales", mapper.clone());
        let ctx = Context::new();
        ctx.initialize(&store).unwrap();
        for amount in [10.0, 20.0] {
            let msg = message([
                ("country_code", Value::String("ES".into())),
                ("country_name", Value::String("Spain".into())),
                ("status", Value::String("open".into())),
                ("amount", Value::Float(amount)),
            ]);
            ctx.run(&store, msg).unwrap();
        }
        ctx.finalize(&store).unwrap();

        let countries = mapper
            .resolve("country")
            .unwrap()
            .sql_table()
            .unwrap()
            .find(&Vec::new())
            .unwrap();
        assert_eq!(countries.len(), 1);

        let sales = mapper
            .resolve("sales")
            .unwrap()
            .sql_table()
            .unwrap()
            .find(&Vec::new())
            .unwrap();
        assert_eq!(sales.len(), 2);
        assert!(sales
            .iter()
            .all(|row| row.get("country_id") == Some(&Value::String("ES".into()))));
    }

    #[test]
    fn test_hierarchy_dimension_from_config() {
        init();
        let config = ModelConfig::parse(
            r#"
            [[dimension]]
            name = "year"
            attribute = [{ name = "year", type = "integer" }]

            [[dimension]]
            name = "month"
            attribute = [{ name = "month", type = "integer" }]

            [[hierarchy_dimension]]
            name = "date"
            label = "Date"
            role = "date"
            levels = ["year", "month"]
            hierarchy = [{ name = "ym", levels = ["year", "month"] }]

            [[fact]]
            name = "sales"
            dimension = [{ entity = "date", name = "order_date" }]

            [[mapper]]
            entity = "year"
            kind = "embedded"

            [[mapper]]
            entity = "month"
            kind = "embedded"

            [[mapper]]
            entity = "date"
            kind = "embedded"

            [[mapper]]
            entity = "sales"
            kind = "table"
            table = "sales"
            "#,
        )
        .unwrap();
        let (registry, mapper) =
            config.build(SqlBackend::in_memory(), StatsCollector::new()).unwrap();

        let fact = registry.fact("sales").unwrap();
        let flat = registry.dimensions_recursively(fact).unwrap();
        let urns: Vec<String> = flat.iter().map(|f| f.urn()).collect();
        assert_eq!(urns, vec!["order_date.year", "order_date.month"]);

        let mappings = mapper.sql_mappings("sales").unwrap();
        assert!(mappings.iter().any(|m| m.column == "order_date_year"));
    }

    #[test]
    fn test_store_mode_from_config() {
        init();
        let config = ModelConfig::parse(
            r#"
            [[fact]]
            name = "sales"
            attribute = [{ name = "order_ref", type = "string" }]
            measure = [{ name = "amount", type = "float" }]

            [[mapper]]
            entity = "sales"
            kind = "table"
            table = "sales"
            store_mode = "upsert"
            mapping = [{ path = ["order_ref"], pk = true }]
            "#,
        )
        .unwrap();
        let (_, mapper) =
            config.build(SqlBackend::in_memory(), StatsCollector::new()).unwrap();
        let ctx = Context::new();
        ctx.initialize(mapper.as_ref()).unwrap();

        for amount in [1.0, 2.0] {
            let mut msg = message([
                ("order_ref", Value::String("A-1".into())),
                ("amount", Value::Float(amount)),
            ]);
            mapper.store(&ctx, "sales", &mut msg).unwrap();
        }
        let rows = mapper
            .resolve("sales")
            .unwrap()
            .sql_table()
            .unwrap()
            .find(&Vec::new())
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("amount"), Some(&Value::Float(2.0)));
    }

    #[test]
    fn test_mapper_for_unknown_entity_rejected() {
        init();
        let config = ModelConfig::parse(
            r#"
            [[mapper]]
            entity = "nowhere"
            kind = "embedded"
            "#,
        )
        .unwrap();
        assert!(config
            .build(SqlBackend::in_memory(), StatsCollector::new())
            .is_err());
    }

    #[test]
    fn test_malformed_document_is_a_config_error() {
        init();
        let err = ModelConfig::parse("[[mapper]]\nkind = \"nonsense\"").unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        init();
        let path = std::env::temp_dir().join("starlift_config_test.toml");
        std::fs::write(&path, SALES_MODEL).unwrap();
        let config = ModelConfig::load(&path).unwrap();
        let (registry, _) =
            config.build(SqlBackend::in_memory(), StatsCollector::new()).unwrap();
        assert!(registry.fact("sales").is_ok());
        std::fs::remove_file(&path).unwrap();
    }
}
