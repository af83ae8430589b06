//! OLAP-to-relational star-schema lowering.
//!
//! A table mapper's column list is derived straight from its compiled
//! mappings: one column per own-table, non-derived mapping. Hierarchy
//! dimensions arrive here already flattened (their level attributes are
//! spliced into the referencing table), so a star schema trades join
//! count for denormalization by construction.

use crate::error::ModelResult;
use crate::olap::mapper::{OlapMapper, SqlMapping};
use crate::sql::table::SqlColumn;

/// Columns backing a table mapper.
///
/// Mappings on other tables (joined dimensions reached through aliases)
/// and derived date-part mappings are projections, not storage, and are
/// excluded.
pub fn columns_for(table: &str, mappings: &[SqlMapping]) -> Vec<SqlColumn> {
    mappings
        .iter()
        .filter(|m| m.table == table && m.function.is_none())
        .map(|m| {
            let mut col = SqlColumn::new(m.column.clone(), m.column_type)
                .with_pk(m.pk)
                .with_label(m.label.clone());
            if m.pk {
                col = col.not_null();
            }
            col
        })
        .collect()
}

/// The full star layout of a mapper scope: every local table mapper's
/// table with its columns, in declaration order.
pub fn star_schema(mapper: &OlapMapper) -> ModelResult<Vec<(String, Vec<SqlColumn>)>> {
    let mut out = Vec::new();
    for entity_mapper in mapper.mappers() {
        let table = match entity_mapper.table_name() {
            Some(t) => t.to_string(),
            None => continue,
        };
        let mappings = mapper.sql_mappings(entity_mapper.entity())?;
        out.push((table.clone(), columns_for(&table, &mappings)));
    }
    Ok(out)
}
