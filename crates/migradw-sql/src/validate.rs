//! Statement validation using datafusion-sqlparser-rs
//!
//! DROP and INSERT statements are portable SQL and are parsed back after
//! rendering to confirm they are a single statement of the expected shape.
//! CREATE TABLE and COPY use vendor syntax (identity, sortkey, CREDENTIALS)
//! that no parser dialect accepts, so they are checked structurally instead.

use crate::statement::{Statement, StatementKind};
use migradw_core::Dialect;
use sqlparser::ast::{ObjectType, Statement as Ast};
use sqlparser::dialect::{Dialect as ParserDialect, PostgreSqlDialect, RedshiftSqlDialect};
use sqlparser::parser::Parser;

/// Parses rendered statements with the target's dialect
pub struct StatementValidator {
    dialect: Box<dyn ParserDialect>,
}

impl StatementValidator {
    /// Create a validator for the given target
    pub fn new(dialect: Dialect) -> Self {
        let dialect: Box<dyn ParserDialect> = match dialect {
            Dialect::Redshift => Box::new(RedshiftSqlDialect {}),
            Dialect::Postgres => Box::new(PostgreSqlDialect {}),
        };
        Self { dialect }
    }

    /// Validate one statement, returning a description of the problem on failure
    pub fn validate(&self, statement: &Statement) -> Result<(), String> {
        match statement.kind {
            StatementKind::DropTable | StatementKind::InsertSelect => self.validate_parsed(statement),
            StatementKind::CreateTable => expect_prefix(statement, "CREATE TABLE IF NOT EXISTS "),
            StatementKind::Copy => expect_prefix(statement, "COPY "),
        }
    }

    fn validate_parsed(&self, statement: &Statement) -> Result<(), String> {
        let parsed = Parser::parse_sql(&*self.dialect, &statement.sql).map_err(|e| e.to_string())?;

        let [ast] = parsed.as_slice() else {
            return Err(format!("expected exactly one statement, found {}", parsed.len()));
        };

        match (statement.kind, ast) {
            (
                StatementKind::DropTable,
                Ast::Drop {
                    object_type: ObjectType::Table,
                    if_exists: true,
                    names,
                    ..
                },
            ) => {
                if names.len() == 1 && names[0].to_string() == statement.table {
                    Ok(())
                } else {
                    Err(format!("drops the wrong table(s): {:?}", names.iter().map(|n| n.to_string()).collect::<Vec<_>>()))
                }
            }
            (StatementKind::DropTable, _) => Err("expected DROP TABLE IF EXISTS".to_string()),
            (StatementKind::InsertSelect, Ast::Insert(_)) => Ok(()),
            (StatementKind::InsertSelect, _) => Err("expected INSERT".to_string()),
            _ => Ok(()),
        }
    }
}

fn expect_prefix(statement: &Statement, prefix: &str) -> Result<(), String> {
    let expected = format!("{}{}", prefix, statement.table);
    if statement.sql.starts_with(&expected) {
        Ok(())
    } else {
        Err(format!("expected statement to start with '{}'", expected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> StatementValidator {
        StatementValidator::new(Dialect::Redshift)
    }

    #[test]
    fn accepts_drop() {
        let stmt = Statement::new(StatementKind::DropTable, "t", "DROP TABLE IF EXISTS t");
        assert!(validator().validate(&stmt).is_ok());
    }

    #[test]
    fn rejects_drop_of_other_table() {
        let stmt = Statement::new(StatementKind::DropTable, "t", "DROP TABLE IF EXISTS u");
        assert!(validator().validate(&stmt).is_err());
    }

    #[test]
    fn rejects_drop_without_if_exists() {
        let stmt = Statement::new(StatementKind::DropTable, "t", "DROP TABLE t");
        assert!(validator().validate(&stmt).is_err());
    }

    #[test]
    fn rejects_smuggled_second_statement() {
        let stmt = Statement::new(
            StatementKind::DropTable,
            "t",
            "DROP TABLE IF EXISTS t; DROP TABLE IF EXISTS u",
        );
        let err = validator().validate(&stmt).unwrap_err();
        assert!(err.contains("exactly one statement"));
    }

    #[test]
    fn accepts_insert_select() {
        let stmt = Statement::new(
            StatementKind::InsertSelect,
            "d",
            "INSERT INTO d (\na,\n\"month\"\n)\nSELECT DISTINCT\ns.a,\ns.\"month\"\nFROM s AS s;",
        );
        let validator = StatementValidator::new(Dialect::Postgres);
        assert!(validator.validate(&stmt).is_ok());
    }

    #[test]
    fn rejects_unparseable_insert() {
        let stmt = Statement::new(StatementKind::InsertSelect, "d", "INSERT INTO d SELEC x");
        assert!(validator().validate(&stmt).is_err());
    }

    #[test]
    fn structural_checks_for_vendor_statements() {
        let create = Statement::new(
            StatementKind::CreateTable,
            "t",
            "CREATE TABLE IF NOT EXISTS t (\nid int4 identity (1,1) sortkey\n);",
        );
        assert!(validator().validate(&create).is_ok());

        let copy = Statement::new(StatementKind::Copy, "t", "COPY u FROM 's3://x'");
        assert!(validator().validate(&copy).is_err());
    }
}
