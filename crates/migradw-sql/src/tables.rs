//! The immigration star schema
//!
//! Two staging tables hold the raw CSV rows. Three dimensions and one fact
//! table are derived from them.

use migradw_core::{ColumnDef, ForeignKey, SqlType, TableDef, TableRole};

pub const STG_IMMIGRATION: &str = "stg_immigration_table";
pub const STG_DEMOGRAPHICS: &str = "stg_demographics_table";
pub const MIGRATION_FACT: &str = "migration_fact_table";
pub const RESPONDENT_DIM: &str = "respondent_dim_table";
pub const IMMI_FILE_DIM: &str = "immi_file_dim_table";
pub const DEMOGRAPHIC_DIM: &str = "demographic_dim_table";

/// Order tables are dropped in (referencing tables before referenced ones)
pub const DROP_ORDER: [&str; 6] = [
    STG_IMMIGRATION,
    STG_DEMOGRAPHICS,
    MIGRATION_FACT,
    RESPONDENT_DIM,
    IMMI_FILE_DIM,
    DEMOGRAPHIC_DIM,
];

/// Order tables are created in (dimensions before the fact table)
pub const CREATE_ORDER: [&str; 6] = [
    STG_IMMIGRATION,
    STG_DEMOGRAPHICS,
    RESPONDENT_DIM,
    IMMI_FILE_DIM,
    DEMOGRAPHIC_DIM,
    MIGRATION_FACT,
];

/// Staging tables, in bulk-load order
pub const COPY_ORDER: [&str; 2] = [STG_IMMIGRATION, STG_DEMOGRAPHICS];

/// Order derived tables are populated in (dimensions before the fact table)
pub const INSERT_ORDER: [&str; 4] = [RESPONDENT_DIM, IMMI_FILE_DIM, DEMOGRAPHIC_DIM, MIGRATION_FACT];

/// Raw I-94 immigration records
pub fn stg_immigration() -> TableDef {
    TableDef::new(STG_IMMIGRATION, TableRole::Staging).with_columns(vec![
        ColumnDef::text("i94port"),
        ColumnDef::text("i94addr"),
        ColumnDef::text("visapost"),
        ColumnDef::text("entdepa"),
        ColumnDef::text("entdepd"),
        ColumnDef::text("gender"),
        ColumnDef::text("airline"),
        ColumnDef::new("admnum", SqlType::Numeric),
        ColumnDef::text("fltno"),
        ColumnDef::text("visatype"),
        ColumnDef::text("month"),
        ColumnDef::text("year"),
        ColumnDef::text("cit"),
        ColumnDef::text("res"),
        ColumnDef::text("visa_code"),
        ColumnDef::new("age_respondent", SqlType::Int4),
        ColumnDef::text("birth_year"),
        ColumnDef::text("arrival_date"),
        ColumnDef::text("departure_date"),
        ColumnDef::text("arrival_type"),
        ColumnDef::text("date_form_added"),
        ColumnDef::text("admission_date"),
        ColumnDef::new("immi_id", SqlType::Int8),
    ])
}

/// Raw US city demographics, one row per state and race
pub fn stg_demographics() -> TableDef {
    TableDef::new(STG_DEMOGRAPHICS, TableRole::Staging).with_columns(vec![
        ColumnDef::new("race_count", SqlType::Int4),
        ColumnDef::new("male_population", SqlType::Int4),
        ColumnDef::new("female_population", SqlType::Int4),
        ColumnDef::new("total_population", SqlType::Int4),
        ColumnDef::new("total_veterans", SqlType::Int4),
        ColumnDef::new("total_foreign_born", SqlType::Int4),
        ColumnDef::text("state_code"),
        ColumnDef::text("race"),
        ColumnDef::new("avg_household_size", SqlType::Numeric),
        ColumnDef::new("median_age", SqlType::Numeric),
    ])
}

pub fn migration_fact() -> TableDef {
    TableDef::new(MIGRATION_FACT, TableRole::Fact)
        .with_columns(vec![
            ColumnDef::new("fact_id", SqlType::Int4),
            ColumnDef::new("immi_id", SqlType::Int8).not_null(),
            ColumnDef::new("admnum", SqlType::Numeric).not_null(),
            ColumnDef::text("state_code").not_null(),
            ColumnDef::text("race").not_null(),
            ColumnDef::new("total_population", SqlType::Int4),
        ])
        .with_identity("fact_id")
        .with_sort_key("fact_id")
        .with_primary_key(&["fact_id"])
        .with_foreign_key(ForeignKey::new(&["admnum"], RESPONDENT_DIM))
        .with_foreign_key(ForeignKey::new(&["immi_id"], IMMI_FILE_DIM))
        .with_foreign_key(ForeignKey::new(&["state_code", "race"], DEMOGRAPHIC_DIM))
}

/// One row per admission number
pub fn respondent_dim() -> TableDef {
    TableDef::new(RESPONDENT_DIM, TableRole::Dimension)
        .with_columns(vec![
            ColumnDef::new("admnum", SqlType::Numeric).not_null(),
            ColumnDef::text("cit"),
            ColumnDef::text("res"),
            ColumnDef::text("gender"),
            ColumnDef::new("age_respondent", SqlType::Int4),
            ColumnDef::text("birth_year"),
            ColumnDef::text("airline"),
            ColumnDef::text("fltno"),
            ColumnDef::text("arrival_date"),
            ColumnDef::text("departure_date"),
        ])
        .with_sort_key("admnum")
        .with_primary_key(&["admnum"])
}

/// One row per immigration file record
pub fn immi_file_dim() -> TableDef {
    TableDef::new(IMMI_FILE_DIM, TableRole::Dimension)
        .with_columns(vec![
            ColumnDef::new("immi_id", SqlType::Int8).not_null(),
            ColumnDef::text("i94port"),
            ColumnDef::text("i94addr"),
            ColumnDef::text("visapost"),
            ColumnDef::text("entdepa"),
            ColumnDef::text("entdepd"),
            ColumnDef::text("visatype"),
            ColumnDef::text("month"),
            ColumnDef::text("year"),
            ColumnDef::text("visa_code"),
            ColumnDef::text("arrival_type"),
            ColumnDef::text("date_form_added"),
            ColumnDef::text("admission_date"),
        ])
        .with_sort_key("immi_id")
        .with_primary_key(&["immi_id"])
}

/// One row per (state, race)
pub fn demographic_dim() -> TableDef {
    TableDef::new(DEMOGRAPHIC_DIM, TableRole::Dimension)
        .with_columns(vec![
            ColumnDef::text("state_code").not_null(),
            ColumnDef::text("race").not_null(),
            ColumnDef::new("race_count", SqlType::Int4),
            ColumnDef::new("male_population", SqlType::Int4),
            ColumnDef::new("female_population", SqlType::Int4),
            ColumnDef::new("total_veterans", SqlType::Int4),
            ColumnDef::new("total_foreign_born", SqlType::Int4),
            ColumnDef::new("avg_household_size", SqlType::Numeric),
            ColumnDef::new("median_age", SqlType::Numeric),
        ])
        .with_sort_key("state_code")
        .with_primary_key(&["state_code", "race"])
}

/// All six tables
pub fn star_schema() -> Vec<TableDef> {
    vec![
        stg_immigration(),
        stg_demographics(),
        respondent_dim(),
        immi_file_dim(),
        demographic_dim(),
        migration_fact(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_is_valid() {
        for table in star_schema() {
            table.validate().unwrap_or_else(|e| panic!("{}: {}", table.name, e));
        }
    }

    #[test]
    fn order_lists_cover_the_schema() {
        let mut names: Vec<_> = star_schema().into_iter().map(|t| t.name).collect();
        names.sort();

        let mut dropped: Vec<_> = DROP_ORDER.iter().map(|s| s.to_string()).collect();
        dropped.sort();
        let mut created: Vec<_> = CREATE_ORDER.iter().map(|s| s.to_string()).collect();
        created.sort();

        assert_eq!(names, dropped);
        assert_eq!(names, created);
    }

    #[test]
    fn fact_references_every_dimension() {
        let fact = migration_fact();
        assert_eq!(
            fact.referenced_tables(),
            vec![RESPONDENT_DIM, IMMI_FILE_DIM, DEMOGRAPHIC_DIM]
        );
    }
}
