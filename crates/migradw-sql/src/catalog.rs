//! Query catalog: the four ordered statement lists of a load run
//!
//! The catalog is built once from an explicit [`CatalogParams`] value. Every
//! statement is rendered and validated up front, so a bad configuration or a
//! broken table definition fails before any connection is opened.

use crate::statement::{
    render_copy, render_create, render_drop, BulkSource, InsertSelect, Statement, StatementKind,
};
use crate::tables::{self, COPY_ORDER, CREATE_ORDER, DROP_ORDER, INSERT_ORDER};
use crate::validate::StatementValidator;
use migradw_core::{Config, ConfigError, Dialect, Phase, SchemaError, TableDef};

/// Default region for bulk loads
pub const DEFAULT_REGION: &str = "ap-southeast-2";

/// Parameters interpolated into the catalog's statements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogParams {
    pub dialect: Dialect,

    /// Location of the immigration CSV
    pub immigration_source: String,

    /// Location of the demographics CSV
    pub demographics_source: String,

    /// IAM role for Redshift COPY authorization
    pub iam_role_arn: Option<String>,

    pub region: String,
    pub delimiter: char,
    pub ignore_header: u32,
}

impl CatalogParams {
    /// Read parameters from the `[s3]`, `[iam_role]` and `[copy]` sections
    ///
    /// The IAM role is only required for Redshift. Source locations may be
    /// wrapped in single quotes as they often are in hand-written configs.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let dialect = config.dialect()?;

        let immigration_source = literal_value(config, "s3", "immigration_data")?;
        let demographics_source = literal_value(config, "s3", "demographics_data")?;

        let iam_role_arn = match dialect {
            Dialect::Redshift => {
                let arn = literal_value(config, "iam_role", "arn")?;
                if !arn.starts_with("arn:") {
                    return Err(invalid("iam_role", "arn", format!("'{}' is not an ARN", arn)));
                }
                Some(arn)
            }
            Dialect::Postgres => None,
        };

        if dialect == Dialect::Redshift {
            for (key, location) in [
                ("immigration_data", &immigration_source),
                ("demographics_data", &demographics_source),
            ] {
                if !location.starts_with("s3://") {
                    return Err(invalid("s3", key, format!("'{}' is not an s3:// location", location)));
                }
            }
        }

        let region = config.get_or("copy", "region", DEFAULT_REGION).to_string();
        if let Some(reason) = literal_hazard(&region) {
            return Err(invalid("copy", "region", reason.to_string()));
        }

        let raw_delimiter = config.get_or("copy", "delimiter", ",");
        let mut chars = raw_delimiter.chars();
        let delimiter = match (chars.next(), chars.next()) {
            (Some(c), None) if c != '\'' && c != '\\' => c,
            _ => {
                return Err(invalid(
                    "copy",
                    "delimiter",
                    format!("'{}' is not a single character", raw_delimiter),
                ))
            }
        };

        let raw_header = config.get_or("copy", "ignore_header", "1");
        let ignore_header: u32 = raw_header.trim().parse().map_err(|_| {
            invalid("copy", "ignore_header", format!("'{}' is not a number", raw_header))
        })?;
        if dialect == Dialect::Postgres && ignore_header > 1 {
            return Err(invalid(
                "copy",
                "ignore_header",
                "postgres COPY can skip at most one header line".to_string(),
            ));
        }

        Ok(Self {
            dialect,
            immigration_source,
            demographics_source,
            iam_role_arn,
            region,
            delimiter,
            ignore_header,
        })
    }

    fn bulk_source(&self, location: &str) -> BulkSource {
        BulkSource {
            location: location.to_string(),
            iam_role_arn: self.iam_role_arn.clone(),
            region: self.region.clone(),
            delimiter: self.delimiter,
            ignore_header: self.ignore_header,
        }
    }
}

/// Read a value destined for a SQL string literal
fn literal_value(config: &Config, section: &str, key: &str) -> Result<String, ConfigError> {
    let raw = config.get(section, key)?.trim();
    let value = raw
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(raw);

    if value.is_empty() {
        return Err(invalid(section, key, "must not be empty".to_string()));
    }
    if let Some(reason) = literal_hazard(value) {
        return Err(invalid(section, key, reason.to_string()));
    }

    Ok(value.to_string())
}

/// Characters that could end a string literal early. Redshift treats a
/// backslash as an escape inside quotes.
fn literal_hazard(value: &str) -> Option<&'static str> {
    if value.contains('\'') {
        Some("must not contain quotes")
    } else if value.contains('\\') {
        Some("must not contain backslashes")
    } else {
        None
    }
}

fn invalid(section: &str, key: &str, reason: String) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        reason,
    }
}

/// Errors building the catalog
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid table definition: {0}")]
    Schema(#[from] SchemaError),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Insert into {target} selects {alias}.{column}, which is not in scope")]
    UnknownSourceColumn {
        target: String,
        alias: String,
        column: String,
    },

    #[error("{phase} phase runs {table} before {depends_on}, which it depends on")]
    DependencyOrder {
        phase: Phase,
        table: String,
        depends_on: String,
    },

    #[error("Invalid {kind} statement for {table}: {reason}")]
    InvalidStatement {
        kind: StatementKind,
        table: String,
        reason: String,
    },
}

/// Ordered drop, create, copy and insert statements
#[derive(Debug, Clone)]
pub struct QueryCatalog {
    dialect: Dialect,
    tables: Vec<TableDef>,
    drop: Vec<Statement>,
    create: Vec<Statement>,
    copy: Vec<Statement>,
    insert: Vec<Statement>,
}

impl QueryCatalog {
    /// Build the catalog from configuration
    pub fn from_config(config: &Config) -> Result<Self, CatalogError> {
        let params = CatalogParams::from_config(config)?;
        Self::new(&params)
    }

    /// Build the catalog from explicit parameters
    pub fn new(params: &CatalogParams) -> Result<Self, CatalogError> {
        let schema = tables::star_schema();
        for table in &schema {
            table.validate()?;
        }

        let drop = DROP_ORDER
            .iter()
            .map(|name| -> Result<Statement, CatalogError> {
                let table = lookup(&schema, name)?;
                Ok(Statement::new(StatementKind::DropTable, *name, render_drop(table)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let create = CREATE_ORDER
            .iter()
            .map(|name| -> Result<Statement, CatalogError> {
                let table = lookup(&schema, name)?;
                Ok(Statement::new(
                    StatementKind::CreateTable,
                    *name,
                    render_create(table, params.dialect),
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let copy = COPY_ORDER
            .iter()
            .map(|name| -> Result<Statement, CatalogError> {
                let table = lookup(&schema, name)?;
                let location = match *name {
                    tables::STG_IMMIGRATION => &params.immigration_source,
                    tables::STG_DEMOGRAPHICS => &params.demographics_source,
                    other => return Err(CatalogError::UnknownTable(other.to_string())),
                };
                let source = params.bulk_source(location);
                Ok(Statement::new(
                    StatementKind::Copy,
                    *name,
                    render_copy(table, &source, params.dialect),
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let insert = INSERT_ORDER
            .iter()
            .map(|name| -> Result<Statement, CatalogError> {
                let insert = insert_for(&schema, name)?;
                check_insert(&insert)?;
                Ok(Statement::new(StatementKind::InsertSelect, *name, insert.render()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let catalog = Self {
            dialect: params.dialect,
            tables: schema,
            drop,
            create,
            copy,
            insert,
        };

        catalog.check_dependency_order()?;
        catalog.check_statements()?;

        tracing::debug!(
            dialect = %catalog.dialect,
            statements = catalog.len(),
            "Built query catalog"
        );

        Ok(catalog)
    }

    /// Target dialect the statements were rendered for
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Table definitions
    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    /// Find a table definition by name
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Statements of one phase, in execution order
    pub fn statements(&self, phase: Phase) -> &[Statement] {
        match phase {
            Phase::Drop => &self.drop,
            Phase::Create => &self.create,
            Phase::Load => &self.copy,
            Phase::Insert => &self.insert,
        }
    }

    /// Every statement with its phase, in run order
    pub fn iter(&self) -> impl Iterator<Item = (Phase, &Statement)> + '_ {
        Phase::ALL
            .into_iter()
            .flat_map(move |phase| self.statements(phase).iter().map(move |s| (phase, s)))
    }

    /// Total number of statements
    pub fn len(&self) -> usize {
        Phase::ALL.iter().map(|p| self.statements(*p).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check creates and inserts run after the tables they reference, and
    /// drops run before the tables they are referenced by
    fn check_dependency_order(&self) -> Result<(), CatalogError> {
        for phase in [Phase::Create, Phase::Insert] {
            let order: Vec<&str> = self.statements(phase).iter().map(|s| s.table.as_str()).collect();
            for (position, name) in order.iter().enumerate() {
                let Some(table) = self.table(name) else {
                    continue;
                };
                for referenced in table.referenced_tables() {
                    let earlier = order[..position].contains(&referenced);
                    let in_phase = order.contains(&referenced);
                    if in_phase && !earlier {
                        return Err(CatalogError::DependencyOrder {
                            phase,
                            table: name.to_string(),
                            depends_on: referenced.to_string(),
                        });
                    }
                }
            }
        }

        let drops: Vec<&str> = self.drop.iter().map(|s| s.table.as_str()).collect();
        for (position, name) in drops.iter().enumerate() {
            let Some(table) = self.table(name) else {
                continue;
            };
            for referenced in table.referenced_tables() {
                if drops[..position].contains(&referenced) {
                    return Err(CatalogError::DependencyOrder {
                        phase: Phase::Drop,
                        table: referenced.to_string(),
                        depends_on: name.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    fn check_statements(&self) -> Result<(), CatalogError> {
        let validator = StatementValidator::new(self.dialect);
        for (_, statement) in self.iter() {
            validator
                .validate(statement)
                .map_err(|reason| CatalogError::InvalidStatement {
                    kind: statement.kind,
                    table: statement.table.clone(),
                    reason,
                })?;
        }
        Ok(())
    }
}

fn lookup<'a>(tables: &'a [TableDef], name: &str) -> Result<&'a TableDef, CatalogError> {
    tables
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| CatalogError::UnknownTable(name.to_string()))
}

/// The INSERT ... SELECT populating a derived table
fn insert_for(schema: &[TableDef], name: &str) -> Result<InsertSelect, CatalogError> {
    let immigration = lookup(schema, tables::STG_IMMIGRATION)?;
    let demographics = lookup(schema, tables::STG_DEMOGRAPHICS)?;
    let target = lookup(schema, name)?;

    let insert = match name {
        tables::RESPONDENT_DIM | tables::IMMI_FILE_DIM => InsertSelect::new(target, immigration, "i")
            .distinct()
            .all_columns_from("i"),
        tables::DEMOGRAPHIC_DIM => InsertSelect::new(target, demographics, "d")
            .distinct()
            .all_columns_from("d"),
        tables::MIGRATION_FACT => InsertSelect::new(target, immigration, "i")
            .join(demographics, "d", "i94addr", "state_code")
            .column("i", "immi_id")
            .column("i", "admnum")
            .column("d", "state_code")
            .column("d", "race")
            .column("d", "total_population"),
        other => return Err(CatalogError::UnknownTable(other.to_string())),
    };

    Ok(insert)
}

/// Every projected and joined column must exist in its source, and every
/// projection must land in a target column
fn check_insert(insert: &InsertSelect) -> Result<(), CatalogError> {
    let sources = insert.sources();
    let missing = |alias: &str, column: &str| CatalogError::UnknownSourceColumn {
        target: insert.target.clone(),
        alias: alias.to_string(),
        column: column.to_string(),
    };

    for projection in &insert.projections {
        let source = sources
            .iter()
            .find(|s| s.alias == projection.alias)
            .ok_or_else(|| missing(&projection.alias, &projection.column))?;
        if !source.columns.contains(&projection.column)
            || !insert.target_columns.contains(&projection.column)
        {
            return Err(missing(&projection.alias, &projection.column));
        }
    }

    if let Some(join) = &insert.join {
        if !insert.from.columns.contains(&join.left) {
            return Err(missing(&insert.from.alias, &join.left));
        }
        if !join.source.columns.contains(&join.right) {
            return Err(missing(&join.source.alias, &join.right));
        }
    }

    Ok(())
}
