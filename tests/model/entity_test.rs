#[cfg(test)]
mod tests {
    use starlift::olap::{
        Attribute, Dimension, DimensionRef, Fact, Hierarchy, HierarchyDimension, Measure,
    };
    use starlift::sql::ColumnType;

    #[test]
    fn test_labels_default_to_names() {
        let dim = Dimension::new("country");
        assert_eq!(dim.label(), "country");

        let fact = Fact::new("sales");
        assert_eq!(fact.label(), "sales");

        let attr = Attribute::new("country_code", ColumnType::String);
        assert_eq!(attr.label(), "country_code");
    }

    #[test]
    fn test_explicit_labels_win() {
        let dim = Dimension::new("country").with_label("Country");
        assert_eq!(dim.label(), "Country");

        let measure = Measure::new("amount", ColumnType::Float).with_label("Amount");
        assert_eq!(measure.label(), "Amount");
    }

    #[test]
    fn test_single_attribute_dimension_lends_its_label() {
        let dim = Dimension::new("status")
            .with_label("Order Status")
            .with_attributes(vec![Attribute::new("status", ColumnType::String)]);
        assert_eq!(dim.attribute_label(&dim.attributes[0]), "Order Status");
    }

    #[test]
    fn test_multi_attribute_dimension_keeps_attribute_labels() {
        let dim = Dimension::new("country")
            .with_label("Country")
            .with_attributes(vec![
                Attribute::new("country_code", ColumnType::String),
                Attribute::new("country_name", ColumnType::String).with_label("Name"),
            ]);
        assert_eq!(dim.attribute_label(&dim.attributes[0]), "country_code");
        assert_eq!(dim.attribute_label(&dim.attributes[1]), "Name");
    }

    #[test]
    fn test_fact_partitions_its_declarations() {
        let fact = Fact::new("sales")
            .with_dimensions(vec![DimensionRef::new("country")])
            .with_measures(vec![Measure::new("amount", ColumnType::Float)])
            .with_attributes(vec![Attribute::new("order_ref", ColumnType::String)]);
        assert_eq!(fact.dimensions.len(), 1);
        assert_eq!(fact.measures.len(), 1);
        assert_eq!(fact.attributes.len(), 1);
        assert_eq!(fact.dimensions[0].alias(), "country");
    }

    #[test]
    fn test_dimension_ref_alias_distinguishes_repeated_use() {
        let ship = DimensionRef::new("country").with_name("ship_country");
        let bill = DimensionRef::new("country").with_name("bill_country");
        assert_eq!(ship.alias(), "ship_country");
        assert_eq!(bill.alias(), "bill_country");
        assert_eq!(ship.entity, bill.entity);
    }

    #[test]
    fn test_hierarchy_validation_rejects_undeclared_level() {
        let dim = HierarchyDimension::new(
            "date",
            vec!["year".to_string(), "month".to_string()],
        )
        .with_hierarchies(vec![Hierarchy::new(
            "ymd",
            vec!["year".to_string(), "month".to_string(), "day".to_string()],
        )]);
        assert!(dim.validate().is_err());
    }

    #[test]
    fn test_finest_hierarchy_has_most_levels() {
        let dim = HierarchyDimension::new(
            "date",
            vec!["year".to_string(), "month".to_string(), "day".to_string()],
        )
        .with_hierarchies(vec![
            Hierarchy::new("ym", vec!["year".to_string(), "month".to_string()]),
            Hierarchy::new(
                "ymd",
                vec!["year".to_string(), "month".to_string(), "day".to_string()],
            ),
            Hierarchy::new("y", vec!["year".to_string()]),
        ]);
        assert_eq!(dim.finest_hierarchy().unwrap().name, "ymd");
    }
}
