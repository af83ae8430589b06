#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use chrono::NaiveDate;
    use starlift::olap::{
        Attribute, Dimension, DimensionRef, EntityMapper, Fact, MappingDecl, Measure,
        ModelRegistry, OlapMapper, Store, StoreMode,
    };
    use starlift::runtime::{message, Context, Value};
    use starlift::sql::{ColumnType, SqlBackend, StatsCollector};

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn scope_with(entities: Vec<starlift::olap::Entity>, mappers: Vec<EntityMapper>) -> Rc<OlapMapper> {
        let mut builder = ModelRegistry::builder();
        for entity in entities {
            builder = builder.add(entity);
        }
        Rc::new(
            OlapMapper::new(
                "main",
                Rc::new(builder.build().unwrap()),
                SqlBackend::in_memory(),
                StatsCollector::new(),
            )
            .with_mappers(mappers),
        )
    }

    #[test]
    fn test_store_node_attaches_entity_key() {
        init();
        let scope = scope_with(
            vec![Dimension::new("country")
                .with_attributes(vec![Attribute::new("country_code", ColumnType::String)])
                .into()],
            vec![EntityMapper::table("country", "country")],
        );
        let store = Store::new("store_country", "country", scope);
        let ctx = Context::new();
        ctx.initialize(&store).unwrap();

        let out = ctx.run(&store, message([("country_code", "ES")])).unwrap();
        assert_eq!(out.len(), 1);
        // surrogate key from the auto-increment pk
        assert_eq!(out[0].get("country_id"), Some(&Value::Int(1)));

        let out = ctx.run(&store, message([("country_code", "FR")])).unwrap();
        assert_eq!(out[0].get("country_id"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_store_node_expands_date_parts() {
        init();
        let scope = scope_with(
            vec![Fact::new("sales")
                .with_attributes(vec![
                    Attribute::new("order_date", ColumnType::Date),
                    Attribute::new("order_date_year", ColumnType::Integer),
                    Attribute::new("order_date_month", ColumnType::Integer),
                    Attribute::new("order_date_day", ColumnType::Integer),
                    Attribute::new("order_date_week", ColumnType::Integer),
                ])
                .with_measures(vec![Measure::new("amount", ColumnType::Float)])
                .into()],
            vec![EntityMapper::table("sales", "sales")],
        );
        let store = Store::new("store_sales", "sales", scope.clone())
            .with_date_parts("order_date");
        let ctx = Context::new();
        ctx.initialize(&store).unwrap();

        let msg = message([
            (
                "order_date",
                Value::Date(NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()),
            ),
            ("amount", Value::Float(5.0)),
        ]);
        let out = ctx.run(&store, msg).unwrap();
        assert_eq!(out[0].get("order_date_year"), Some(&Value::Int(2024)));
        assert_eq!(out[0].get("order_date_week"), Some(&Value::Int(10)));

        let mapper = scope.resolve("sales").unwrap();
        let rows = mapper.sql_table().unwrap().find(&Vec::new()).unwrap();
        assert_eq!(rows[0].get("order_date_month"), Some(&Value::Int(3)));
    }

    /// Facts insert by default: replaying the same message appends a
    /// second row.
    #[test]
    fn test_fact_default_mode_is_insert() {
        init();
        let scope = scope_with(
            vec![Fact::new("sales")
                .with_measures(vec![Measure::new("amount", ColumnType::Float)])
                .into()],
            vec![EntityMapper::table("sales", "sales")],
        );
        let store = Store::new("store_sales", "sales", scope.clone());
        let ctx = Context::new();
        ctx.initialize(&store).unwrap();

        ctx.run(&store, message([("amount", Value::Float(1.0))])).unwrap();
        ctx.run(&store, message([("amount", Value::Float(1.0))])).unwrap();

        let mapper = scope.resolve("sales").unwrap();
        let rows = mapper.sql_table().unwrap().find(&Vec::new()).unwrap();
        assert_eq!(rows.len(), 2);
    }

    /// An upsert-mode fact with a natural key keeps one row and takes
    /// the latest values.
    #[test]
    fn test_fact_upsert_mode() {
        init();
        let scope = scope_with(
            vec![Fact::new("sales")
                .with_attributes(vec![Attribute::new("order_ref", ColumnType::String)])
                .with_measures(vec![Measure::new("amount", ColumnType::Float)])
                .into()],
            vec![EntityMapper::table("sales", "sales")
                .with_mappings(vec![MappingDecl::new(["order_ref"]).with_pk(true)])
                .with_store_mode(StoreMode::Upsert)],
        );
        let store = Store::new("store_sales", "sales", scope.clone());
        let ctx = Context::new();
        ctx.initialize(&store).unwrap();

        ctx.run(
            &store,
            message([
                ("order_ref", Value::String("A-1".into())),
                ("amount", Value::Float(1.0)),
            ]),
        )
        .unwrap();
        ctx.run(
            &store,
            message([
                ("order_ref", Value::String("A-1".into())),
                ("amount", Value::Float(9.0)),
            ]),
        )
        .unwrap();

        let mapper = scope.resolve("sales").unwrap();
        let rows = mapper.sql_table().unwrap().find(&Vec::new()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("amount"), Some(&Value::Float(9.0)));
    }

    /// A fact store threads dimension keys through the message so the
    /// node's output carries both ids.
    #[test]
    fn test_fact_store_output_carries_dimension_keys() {
        init();
        let scope = scope_with(
            vec![
                Dimension::new("country")
                    .with_attributes(vec![Attribute::new("country_code", ColumnType::String)])
                    .into(),
                Fact::new("sales")
                    .with_dimensions(vec![DimensionRef::new("country")])
                    .with_measures(vec![Measure::new("amount", ColumnType::Float)])
                    .into(),
            ],
            vec![
                EntityMapper::table("country", "country").with_mappings(vec![MappingDecl::new(
                    ["country_code"],
                )
                .with_pk(true)]),
                EntityMapper::table("sales", "sales"),
            ],
        );
        let store = Store::new("store_sales", "sales", scope);
        let ctx = Context::new();
        ctx.initialize(&store).unwrap();

        let out = ctx
            .run(
                &store,
                message([
                    ("country_code", Value::String("ES".into())),
                    ("amount", Value::Float(3.0)),
                ]),
            )
            .unwrap();
        assert_eq!(out[0].get("country_id"), Some(&Value::String("ES".into())));
        assert_eq!(out[0].get("sales_id"), Some(&Value::Int(1)));
    }
}
