#[cfg(test)]
mod tests {
    use starlift::olap::{
        Attribute, Dimension, DimensionRef, Fact, FactDimension, Hierarchy, HierarchyDimension,
        ModelRegistry,
    };
    use starlift::sql::ColumnType;
    use starlift::ModelError;

    #[test]
    fn test_duplicate_declaration_rejected_in_first_pass() {
        let err = ModelRegistry::builder()
            .add(Dimension::new("country"))
            .add(Fact::new("country"))
            .build()
            .unwrap_err();
        assert_eq!(err, ModelError::DuplicateEntity("country".to_string()));
    }

    #[test]
    fn test_unknown_dimension_reference_rejected() {
        let err = ModelRegistry::builder()
            .add(Fact::new("sales").with_dimensions(vec![DimensionRef::new("nowhere")]))
            .build()
            .unwrap_err();
        assert_eq!(err, ModelError::UnknownEntity("nowhere".to_string()));
    }

    #[test]
    fn test_hierarchy_with_undeclared_level_rejected_at_build() {
        let err = ModelRegistry::builder()
            .add(Dimension::new("year"))
            .add(
                HierarchyDimension::new("date", vec!["year".to_string()]).with_hierarchies(vec![
                    Hierarchy::new("ym", vec!["year".to_string(), "month".to_string()]),
                ]),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::UnknownLevel { ref level, .. } if level == "month"));
    }

    #[test]
    fn test_hierarchy_level_must_be_plain_dimension() {
        let err = ModelRegistry::builder()
            .add(Fact::new("orders"))
            .add(HierarchyDimension::new("date", vec!["orders".to_string()]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidReference(_)));
    }

    #[test]
    fn test_fact_dimension_must_point_at_fact() {
        let err = ModelRegistry::builder()
            .add(Dimension::new("country"))
            .add(FactDimension::new("country_fd", "country"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidReference(_)));
    }

    #[test]
    fn test_reference_cycle_fails_fast() {
        let err = ModelRegistry::builder()
            .add(Fact::new("a").with_dimensions(vec![DimensionRef::new("b_link")]))
            .add(FactDimension::new("b_link", "b"))
            .add(Fact::new("b").with_dimensions(vec![DimensionRef::new("a_link")]))
            .add(FactDimension::new("a_link", "a"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::ModelCycle(_)));
    }

    #[test]
    fn test_valid_chain_is_a_dag() {
        // a -> b -> c is fine; only closed loops are rejected.
        let registry = ModelRegistry::builder()
            .add(Fact::new("a").with_dimensions(vec![DimensionRef::new("b_link")]))
            .add(FactDimension::new("b_link", "b"))
            .add(Fact::new("b").with_dimensions(vec![DimensionRef::new("c_link")]))
            .add(FactDimension::new("c_link", "c"))
            .add(Fact::new("c"))
            .build()
            .unwrap();
        assert!(registry.get("a").is_ok());
        assert!(registry.get("c_link").is_ok());
    }

    #[test]
    fn test_dimensions_recursively_expands_hierarchies() {
        let registry = ModelRegistry::builder()
            .add(
                Dimension::new("year")
                    .with_attributes(vec![Attribute::new("year", ColumnType::Integer)]),
            )
            .add(
                Dimension::new("month")
                    .with_attributes(vec![Attribute::new("month", ColumnType::Integer)]),
            )
            .add(HierarchyDimension::new(
                "date",
                vec!["year".to_string(), "month".to_string()],
            ))
            .add(
                Dimension::new("country")
                    .with_attributes(vec![Attribute::new("country_code", ColumnType::String)]),
            )
            .add(Fact::new("sales").with_dimensions(vec![
                DimensionRef::new("country"),
                DimensionRef::new("date").with_name("order_date"),
            ]))
            .build()
            .unwrap();

        let fact = registry.fact("sales").unwrap();
        let flat = registry.dimensions_recursively(fact).unwrap();
        let urns: Vec<String> = flat.iter().map(|f| f.urn()).collect();
        assert_eq!(urns, vec!["country", "order_date.year", "order_date.month"]);
    }
}
