//! Table definitions for the warehouse star schema

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

/// Column types used by the loader's tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SqlType {
    /// Variable-length string with maximum length
    Varchar { length: u16 },

    /// Arbitrary precision numeric
    Numeric,

    /// 32-bit integer
    Int4,

    /// 64-bit integer
    Int8,
}

impl SqlType {
    /// The `VARCHAR(256)` used for every text column
    pub const TEXT: SqlType = SqlType::Varchar { length: 256 };

    /// Whether the type can back an identity column
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Int4 | Self::Int8)
    }
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Varchar { length } => write!(f, "VARCHAR({})", length),
            Self::Numeric => write!(f, "NUMERIC"),
            Self::Int4 => write!(f, "int4"),
            Self::Int8 => write!(f, "int8"),
        }
    }
}

/// A column in a table definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name
    pub name: String,

    /// Column type
    pub sql_type: SqlType,

    /// Whether NULL is allowed
    pub nullable: bool,
}

impl ColumnDef {
    /// Create a new nullable column
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
        }
    }

    /// Shorthand for a `VARCHAR(256)` column
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::TEXT)
    }

    /// Mark the column NOT NULL
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// What a table is for in the star schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableRole {
    /// Raw rows bulk-loaded from object storage
    Staging,

    /// Deduplicated projection of staging data
    Dimension,

    /// One row per event, referencing the dimensions
    Fact,
}

/// Foreign key from one table to another
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referencing columns in this table
    pub columns: Vec<String>,

    /// Referenced table
    pub references: String,

    /// Referenced columns (same arity as `columns`)
    pub referenced_columns: Vec<String>,
}

impl ForeignKey {
    /// Foreign key whose column names match on both sides
    pub fn new(columns: &[&str], references: impl Into<String>) -> Self {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        Self {
            referenced_columns: columns.clone(),
            columns,
            references: references.into(),
        }
    }
}

/// A table definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name as created in the warehouse
    pub name: String,

    /// Role in the star schema
    pub role: TableRole,

    /// Ordered columns
    pub columns: Vec<ColumnDef>,

    /// Primary key columns (empty for staging tables)
    pub primary_key: Vec<String>,

    /// Redshift sort key column
    pub sort_key: Option<String>,

    /// Auto-incrementing surrogate key column
    pub identity: Option<String>,

    /// Foreign keys to other tables
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableDef {
    /// Create an empty table definition
    pub fn new(name: impl Into<String>, role: TableRole) -> Self {
        Self {
            name: name.into(),
            role,
            columns: Vec::new(),
            primary_key: Vec::new(),
            sort_key: None,
            identity: None,
            foreign_keys: Vec::new(),
        }
    }

    /// Set the columns
    pub fn with_columns(mut self, columns: Vec<ColumnDef>) -> Self {
        self.columns = columns;
        self
    }

    /// Set the primary key
    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Set the sort key
    pub fn with_sort_key(mut self, column: impl Into<String>) -> Self {
        self.sort_key = Some(column.into());
        self
    }

    /// Set the identity column
    pub fn with_identity(mut self, column: impl Into<String>) -> Self {
        self.identity = Some(column.into());
        self
    }

    /// Add a foreign key
    pub fn with_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Get column names
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Columns a load or insert must supply (everything but the identity)
    pub fn insertable_columns(&self) -> Vec<&ColumnDef> {
        self.columns
            .iter()
            .filter(|c| Some(&c.name) != self.identity.as_ref())
            .collect()
    }

    /// Tables this table references through foreign keys
    pub fn referenced_tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for fk in &self.foreign_keys {
            if !tables.contains(&fk.references.as_str()) {
                tables.push(&fk.references);
            }
        }
        tables
    }

    /// Check the definition is internally consistent
    ///
    /// Identifiers must be plain lowercase SQL names, and every key column
    /// must exist in the table.
    pub fn validate(&self) -> Result<(), SchemaError> {
        check_identifier(&self.name)?;

        if self.columns.is_empty() {
            return Err(SchemaError::NoColumns(self.name.clone()));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            check_identifier(&column.name)?;
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.name.clone(),
                });
            }
        }

        let key_columns = self
            .primary_key
            .iter()
            .chain(self.sort_key.iter())
            .chain(self.identity.iter())
            .chain(self.foreign_keys.iter().flat_map(|fk| fk.columns.iter()));
        for column in key_columns {
            if self.find_column(column).is_none() {
                return Err(SchemaError::UnknownColumn {
                    table: self.name.clone(),
                    column: column.clone(),
                });
            }
        }

        if let Some(identity) = &self.identity {
            let is_integer = self
                .find_column(identity)
                .map(|c| c.sql_type.is_integer())
                .unwrap_or(false);
            if !is_integer {
                return Err(SchemaError::IdentityNotInteger {
                    table: self.name.clone(),
                    column: identity.clone(),
                });
            }
        }

        for fk in &self.foreign_keys {
            check_identifier(&fk.references)?;
            if fk.columns.len() != fk.referenced_columns.len() {
                return Err(SchemaError::ForeignKeyArity {
                    table: self.name.clone(),
                    references: fk.references.clone(),
                });
            }
        }

        Ok(())
    }
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("identifier regex is valid"))
}

/// Check a name is a plain lowercase SQL identifier
pub fn check_identifier(name: &str) -> Result<(), SchemaError> {
    if identifier_pattern().is_match(name) {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(name.to_string()))
    }
}

/// Table definition errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    #[error("Table {0} has no columns")]
    NoColumns(String),

    #[error("Table {table} declares column {column} twice")]
    DuplicateColumn { table: String, column: String },

    #[error("Table {table} has no column {column}")]
    UnknownColumn { table: String, column: String },

    #[error("Identity column {table}.{column} must be an integer")]
    IdentityNotInteger { table: String, column: String },

    #[error("Foreign key from {table} to {references} has mismatched column counts")]
    ForeignKeyArity { table: String, references: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn orders() -> TableDef {
        TableDef::new("orders", TableRole::Fact)
            .with_columns(vec![
                ColumnDef::new("order_id", SqlType::Int4).not_null(),
                ColumnDef::new("customer_id", SqlType::Int8).not_null(),
                ColumnDef::new("total", SqlType::Numeric),
            ])
            .with_primary_key(&["order_id"])
            .with_identity("order_id")
            .with_sort_key("order_id")
            .with_foreign_key(ForeignKey::new(&["customer_id"], "customers"))
    }

    #[test]
    fn sql_type_display() {
        assert_eq!(SqlType::TEXT.to_string(), "VARCHAR(256)");
        assert_eq!(SqlType::Numeric.to_string(), "NUMERIC");
        assert_eq!(SqlType::Int8.to_string(), "int8");
    }

    #[test]
    fn valid_table() {
        let table = orders();
        assert!(table.validate().is_ok());
        assert_eq!(table.column_names(), vec!["order_id", "customer_id", "total"]);
        assert_eq!(table.referenced_tables(), vec!["customers"]);
    }

    #[test]
    fn insertable_columns_skip_identity() {
        let table = orders();
        let names: Vec<_> = table.insertable_columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["customer_id", "total"]);
    }

    #[test]
    fn rejects_unknown_key_column() {
        let table = orders().with_primary_key(&["missing"]);
        assert_eq!(
            table.validate(),
            Err(SchemaError::UnknownColumn {
                table: "orders".to_string(),
                column: "missing".to_string(),
            })
        );
    }

    #[test]
    fn rejects_bad_identifiers() {
        let table = TableDef::new("orders; drop table x", TableRole::Staging)
            .with_columns(vec![ColumnDef::text("a")]);
        assert!(matches!(table.validate(), Err(SchemaError::InvalidIdentifier(_))));

        assert!(check_identifier("Mixed").is_err());
        assert!(check_identifier("1abc").is_err());
        assert!(check_identifier("i94port").is_ok());
    }

    #[test]
    fn rejects_duplicate_columns() {
        let table = TableDef::new("t", TableRole::Staging)
            .with_columns(vec![ColumnDef::text("a"), ColumnDef::text("a")]);
        assert!(matches!(table.validate(), Err(SchemaError::DuplicateColumn { .. })));
    }

    #[test]
    fn rejects_text_identity() {
        let table = TableDef::new("t", TableRole::Fact)
            .with_columns(vec![ColumnDef::text("id")])
            .with_identity("id");
        assert!(matches!(table.validate(), Err(SchemaError::IdentityNotInteger { .. })));
    }
}
