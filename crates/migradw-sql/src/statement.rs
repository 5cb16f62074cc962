//! Typed statement templates and their SQL rendering

use migradw_core::{Dialect, Phase, TableDef};
use std::fmt::Write as _;

/// Words that must be double-quoted when used as column names
const RESERVED_WORDS: &[&str] = &[
    "month", "year", "user", "order", "group", "table", "select", "from", "where", "to",
];

/// Quote an identifier if it collides with a reserved word
pub fn quote_ident(name: &str) -> String {
    if RESERVED_WORDS.contains(&name) {
        format!("\"{}\"", name)
    } else {
        name.to_string()
    }
}

/// Render a single-quoted SQL string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// What a statement does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    DropTable,
    CreateTable,
    Copy,
    InsertSelect,
}

impl StatementKind {
    /// Phase the statement belongs to
    pub fn phase(&self) -> Phase {
        match self {
            Self::DropTable => Phase::Drop,
            Self::CreateTable => Phase::Create,
            Self::Copy => Phase::Load,
            Self::InsertSelect => Phase::Insert,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DropTable => "DROP TABLE",
            Self::CreateTable => "CREATE TABLE",
            Self::Copy => "COPY",
            Self::InsertSelect => "INSERT SELECT",
        }
    }
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered statement and the table it targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub kind: StatementKind,

    /// Table the statement mutates
    pub table: String,

    /// SQL text sent to the warehouse
    pub sql: String,
}

impl Statement {
    pub fn new(kind: StatementKind, table: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            sql: sql.into(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.kind.phase()
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.table)
    }
}

/// `DROP TABLE IF EXISTS`
pub fn render_drop(table: &TableDef) -> String {
    format!("DROP TABLE IF EXISTS {}", table.name)
}

/// `CREATE TABLE IF NOT EXISTS` with keys and constraints
pub fn render_create(table: &TableDef, dialect: Dialect) -> String {
    let mut lines: Vec<String> = Vec::new();

    for column in &table.columns {
        let mut line = format!("{} {}", quote_ident(&column.name), column.sql_type);

        let is_identity = table.identity.as_deref() == Some(column.name.as_str());
        if is_identity {
            match dialect {
                Dialect::Redshift => line.push_str(" identity (1,1)"),
                Dialect::Postgres => line.push_str(" GENERATED BY DEFAULT AS IDENTITY"),
            }
        }
        if !column.nullable {
            line.push_str(" NOT NULL");
        }
        if dialect == Dialect::Redshift && table.sort_key.as_deref() == Some(column.name.as_str()) {
            line.push_str(" sortkey");
        }

        lines.push(line);
    }

    if !table.primary_key.is_empty() {
        lines.push(format!(
            "CONSTRAINT {}_pkey PRIMARY KEY ({})",
            table.name,
            join_idents(&table.primary_key)
        ));
    }

    for fk in &table.foreign_keys {
        lines.push(format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            join_idents(&fk.columns),
            fk.references,
            join_idents(&fk.referenced_columns)
        ));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
        table.name,
        lines.join(",\n")
    )
}

/// Where a staging table's rows come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkSource {
    /// Object storage URI (Redshift) or server-side path (PostgreSQL)
    pub location: String,

    /// IAM role the warehouse assumes to read the source
    pub iam_role_arn: Option<String>,

    pub region: String,
    pub delimiter: char,

    /// Header lines to skip
    pub ignore_header: u32,
}

/// Bulk-load `COPY` for a staging table
pub fn render_copy(table: &TableDef, source: &BulkSource, dialect: Dialect) -> String {
    let delimiter = quote_literal(&source.delimiter.to_string());

    match dialect {
        Dialect::Redshift => {
            let mut sql = format!(
                "COPY {} FROM {}\n",
                table.name,
                quote_literal(&source.location)
            );
            if let Some(arn) = &source.iam_role_arn {
                let _ = writeln!(sql, "CREDENTIALS {}", quote_literal(&format!("aws_iam_role={}", arn)));
            }
            let _ = writeln!(sql, "REGION {}", quote_literal(&source.region));
            let _ = writeln!(sql, "IGNOREHEADER {}", source.ignore_header);
            let _ = write!(sql, "DELIMITER {};", delimiter);
            sql
        }
        Dialect::Postgres => format!(
            "COPY {} FROM {}\nWITH (FORMAT csv, HEADER {}, DELIMITER {});",
            table.name,
            quote_literal(&source.location),
            source.ignore_header > 0,
            delimiter
        ),
    }
}

/// A table referenced in the FROM clause of an insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub table: String,
    pub alias: String,

    /// Columns available from this source
    pub columns: Vec<String>,
}

impl SourceRef {
    pub fn new(table: &TableDef, alias: impl Into<String>) -> Self {
        Self {
            table: table.name.clone(),
            alias: alias.into(),
            columns: table.column_names().into_iter().map(String::from).collect(),
        }
    }
}

/// Equi-join against a second source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub source: SourceRef,

    /// Column on the primary source
    pub left: String,

    /// Column on the joined source
    pub right: String,
}

/// One selected column; the target column shares its name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub alias: String,
    pub column: String,
}

/// `INSERT INTO target (...) SELECT [DISTINCT] ... FROM source [JOIN ...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertSelect {
    pub target: String,

    /// Columns the target accepts (identity excluded)
    pub target_columns: Vec<String>,

    pub distinct: bool,
    pub from: SourceRef,
    pub join: Option<Join>,
    pub projections: Vec<Projection>,
}

impl InsertSelect {
    /// Start an insert into `target` reading from `from` under `alias`
    pub fn new(target: &TableDef, from: &TableDef, alias: &str) -> Self {
        Self {
            target: target.name.clone(),
            target_columns: target
                .insertable_columns()
                .into_iter()
                .map(|c| c.name.clone())
                .collect(),
            distinct: false,
            from: SourceRef::new(from, alias),
            join: None,
            projections: Vec::new(),
        }
    }

    /// Use `SELECT DISTINCT`
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Join a second source on `from.left = joined.right`
    pub fn join(mut self, table: &TableDef, alias: &str, left: &str, right: &str) -> Self {
        self.join = Some(Join {
            source: SourceRef::new(table, alias),
            left: left.to_string(),
            right: right.to_string(),
        });
        self
    }

    /// Select `alias.column` into the same-named target column
    pub fn column(mut self, alias: &str, column: &str) -> Self {
        self.projections.push(Projection {
            alias: alias.to_string(),
            column: column.to_string(),
        });
        self
    }

    /// Select every target column from the source under `alias`
    pub fn all_columns_from(mut self, alias: &str) -> Self {
        let columns = self.target_columns.clone();
        for column in columns {
            self = self.column(alias, &column);
        }
        self
    }

    /// Sources in scope, primary first
    pub fn sources(&self) -> Vec<&SourceRef> {
        let mut sources = vec![&self.from];
        if let Some(join) = &self.join {
            sources.push(&join.source);
        }
        sources
    }

    pub fn render(&self) -> String {
        let columns: Vec<String> = self.projections.iter().map(|p| quote_ident(&p.column)).collect();
        let selected: Vec<String> = self
            .projections
            .iter()
            .map(|p| format!("{}.{}", p.alias, quote_ident(&p.column)))
            .collect();

        let mut sql = format!(
            "INSERT INTO {} (\n{}\n)\nSELECT{}\n{}\nFROM {} AS {}",
            self.target,
            columns.join(",\n"),
            if self.distinct { " DISTINCT" } else { "" },
            selected.join(",\n"),
            self.from.table,
            self.from.alias
        );

        if let Some(join) = &self.join {
            let _ = write!(
                sql,
                "\nJOIN {} AS {}\nON ({}.{} = {}.{})",
                join.source.table,
                join.source.alias,
                self.from.alias,
                quote_ident(&join.left),
                join.source.alias,
                quote_ident(&join.right)
            );
        }

        sql.push(';');
        sql
    }
}

fn join_idents(names: &[String]) -> String {
    names.iter().map(|n| quote_ident(n)).collect::<Vec<_>>().join(", ")
}
