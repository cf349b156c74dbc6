//! SQL dialect settings
//!
//! Pure data describing how a target database spells identifiers, parameter
//! markers, a handful of string functions, and pagination. The translator never
//! branches on the database name; everything dialect-specific goes through here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How `(take, skip, order by)` is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginationStyle {
    /// `ORDER BY .. LIMIT n OFFSET m`. Some engines refuse `OFFSET` without a
    /// `LIMIT`; `unbounded_limit` is the limit spelled in that case.
    LimitOffset { unbounded_limit: Option<String> },
    /// `ORDER BY .. OFFSET m ROWS FETCH NEXT n ROWS ONLY`; `fallback_order` is
    /// used when the query has no ordering but the engine demands one.
    OffsetFetch { fallback_order: Option<String> },
    /// Windowed ranking with `ROW_NUMBER() OVER (ORDER BY ..)`.
    RowNumber,
    /// `SELECT TOP n`, falling back to ranking when rows are skipped.
    Top,
}

/// How string concatenation is spelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcatStyle {
    /// `CONCAT(a, b, ...)`
    Function,
    /// `a || b` or `a + b`
    Operator(String),
}

/// Known dialect presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DialectKind {
    #[default]
    Generic,
    Sqlite,
    Postgres,
    Mysql,
    SqlServer,
    Oracle,
}

impl DialectKind {
    pub fn settings(self) -> DialectSettings {
        match self {
            DialectKind::Generic => DialectSettings::generic(),
            DialectKind::Sqlite => DialectSettings::sqlite(),
            DialectKind::Postgres => DialectSettings::postgres(),
            DialectKind::Mysql => DialectSettings::mysql(),
            DialectKind::SqlServer => DialectSettings::sql_server(),
            DialectKind::Oracle => DialectSettings::oracle(),
        }
    }
}

impl FromStr for DialectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generic" => Ok(DialectKind::Generic),
            "sqlite" => Ok(DialectKind::Sqlite),
            "postgres" | "postgresql" => Ok(DialectKind::Postgres),
            "mysql" => Ok(DialectKind::Mysql),
            "sqlserver" | "sql_server" | "mssql" => Ok(DialectKind::SqlServer),
            "oracle" => Ok(DialectKind::Oracle),
            other => Err(format!("unknown dialect '{}'", other)),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DialectKind::Generic => "generic",
            DialectKind::Sqlite => "sqlite",
            DialectKind::Postgres => "postgres",
            DialectKind::Mysql => "mysql",
            DialectKind::SqlServer => "sql_server",
            DialectKind::Oracle => "oracle",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialectSettings {
    pub name: String,
    /// Opening and closing identifier quote; `None` leaves identifiers bare.
    pub identifier_quote: Option<(char, char)>,
    /// Prefix of a named parameter marker (`@`, `:`)
    pub parameter_prefix: String,
    pub length_function: String,
    pub substring_function: String,
    pub index_of_function: String,
    /// Index-of takes `(needle, haystack)` instead of `(haystack, needle)`.
    pub index_of_swap_places: bool,
    pub concat: ConcatStyle,
    pub pagination: PaginationStyle,
    pub true_literal: String,
    pub false_literal: String,
    pub except_keyword: String,
    /// Table required by engines that cannot `SELECT` without `FROM`.
    pub dummy_table: Option<String>,
}

impl DialectSettings {
    /// Unquoted identifiers, `@` parameters and `LIMIT/OFFSET`.
    pub fn generic() -> Self {
        Self {
            name: "generic".to_string(),
            identifier_quote: None,
            parameter_prefix: "@".to_string(),
            length_function: "LENGTH".to_string(),
            substring_function: "SUBSTR".to_string(),
            index_of_function: "INSTR".to_string(),
            index_of_swap_places: false,
            concat: ConcatStyle::Operator("||".to_string()),
            pagination: PaginationStyle::LimitOffset {
                unbounded_limit: None,
            },
            true_literal: "TRUE".to_string(),
            false_literal: "FALSE".to_string(),
            except_keyword: "EXCEPT".to_string(),
            dummy_table: None,
        }
    }

    pub fn sqlite() -> Self {
        Self {
            name: "sqlite".to_string(),
            identifier_quote: Some(('"', '"')),
            pagination: PaginationStyle::LimitOffset {
                unbounded_limit: Some("-1".to_string()),
            },
            true_literal: "1".to_string(),
            false_literal: "0".to_string(),
            ..Self::generic()
        }
    }

    pub fn postgres() -> Self {
        Self {
            name: "postgres".to_string(),
            identifier_quote: Some(('"', '"')),
            substring_function: "SUBSTRING".to_string(),
            index_of_function: "STRPOS".to_string(),
            ..Self::generic()
        }
    }

    pub fn mysql() -> Self {
        Self {
            name: "mysql".to_string(),
            identifier_quote: Some(('`', '`')),
            substring_function: "SUBSTRING".to_string(),
            index_of_function: "LOCATE".to_string(),
            index_of_swap_places: true,
            concat: ConcatStyle::Function,
            pagination: PaginationStyle::LimitOffset {
                unbounded_limit: Some("18446744073709551615".to_string()),
            },
            true_literal: "1".to_string(),
            false_literal: "0".to_string(),
            ..Self::generic()
        }
    }

    pub fn sql_server() -> Self {
        Self {
            name: "sql_server".to_string(),
            identifier_quote: Some(('[', ']')),
            length_function: "LEN".to_string(),
            substring_function: "SUBSTRING".to_string(),
            index_of_function: "CHARINDEX".to_string(),
            index_of_swap_places: true,
            concat: ConcatStyle::Operator("+".to_string()),
            pagination: PaginationStyle::OffsetFetch {
                fallback_order: Some("(SELECT NULL)".to_string()),
            },
            true_literal: "1".to_string(),
            false_literal: "0".to_string(),
            ..Self::generic()
        }
    }

    pub fn oracle() -> Self {
        Self {
            name: "oracle".to_string(),
            identifier_quote: Some(('"', '"')),
            parameter_prefix: ":".to_string(),
            pagination: PaginationStyle::RowNumber,
            true_literal: "1".to_string(),
            false_literal: "0".to_string(),
            except_keyword: "MINUS".to_string(),
            dummy_table: Some("DUAL".to_string()),
            ..Self::generic()
        }
    }

    pub fn quote(&self, identifier: &str) -> String {
        match self.identifier_quote {
            Some((open, close)) => format!("{}{}{}", open, identifier, close),
            None => identifier.to_string(),
        }
    }

    /// Quotes each segment of a dotted name (`schema.table`).
    pub fn quote_path(&self, path: &str) -> String {
        path.split('.')
            .map(|segment| self.quote(segment))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// `alias.column` with the column quoted.
    pub fn qualify(&self, alias: &str, column: &str) -> String {
        format!("{}.{}", alias, self.quote(column))
    }

    pub fn parameter_marker(&self, name: &str) -> String {
        format!("{}{}", self.parameter_prefix, name)
    }

    pub fn bool_literal(&self, value: bool) -> &str {
        if value {
            &self.true_literal
        } else {
            &self.false_literal
        }
    }

    /// Joiner placed between concatenated operands.
    pub fn concat_joiner(&self) -> String {
        match &self.concat {
            ConcatStyle::Function => ", ".to_string(),
            ConcatStyle::Operator(op) => format!(" {} ", op),
        }
    }

    /// Wrapper around the joined operands: `("CONCAT(", ")")` or `("(", ")")`.
    pub fn concat_wrapper(&self) -> (&'static str, &'static str) {
        match self.concat {
            ConcatStyle::Function => ("CONCAT(", ")"),
            ConcatStyle::Operator(_) => ("(", ")"),
        }
    }

    pub fn concat(&self, parts: &[String]) -> String {
        let (open, close) = self.concat_wrapper();
        format!("{}{}{}", open, parts.join(&self.concat_joiner()), close)
    }

    /// Index-of arguments in the order this engine expects.
    pub fn index_of_args<'a>(&self, haystack: &'a str, needle: &'a str) -> (&'a str, &'a str) {
        if self.index_of_swap_places {
            (needle, haystack)
        } else {
            (haystack, needle)
        }
    }

    /// Suffix for a `SELECT` without a `FROM` clause.
    pub fn from_dummy(&self) -> String {
        match &self.dummy_table {
            Some(table) => format!(" FROM {}", table),
            None => String::new(),
        }
    }

    /// Renders pagination for a complete `SELECT` statement.
    ///
    /// `sql` must not carry an `ORDER BY`; `order_by` is the bare ordering list
    /// (possibly empty). `take = None` means unbounded.
    pub fn paginate(&self, sql: &str, take: Option<u64>, skip: u64, order_by: &str) -> String {
        let order_clause = if order_by.is_empty() {
            String::new()
        } else {
            format!(" ORDER BY {}", order_by)
        };

        if take.is_none() && skip == 0 {
            return format!("{}{}", sql, order_clause);
        }

        match &self.pagination {
            PaginationStyle::LimitOffset { unbounded_limit } => {
                let mut out = format!("{}{}", sql, order_clause);
                match (take, unbounded_limit) {
                    (Some(n), _) => out.push_str(&format!(" LIMIT {}", n)),
                    (None, Some(limit)) => out.push_str(&format!(" LIMIT {}", limit)),
                    (None, None) => {}
                }
                if skip > 0 {
                    out.push_str(&format!(" OFFSET {}", skip));
                }
                out
            }
            PaginationStyle::OffsetFetch { fallback_order } => {
                let order_clause = match (order_by.is_empty(), fallback_order) {
                    (true, Some(fallback)) => format!(" ORDER BY {}", fallback),
                    _ => order_clause,
                };
                let mut out = format!("{}{} OFFSET {} ROWS", sql, order_clause, skip);
                if let Some(n) = take {
                    out.push_str(&format!(" FETCH NEXT {} ROWS ONLY", n));
                }
                out
            }
            PaginationStyle::Top if skip == 0 => {
                let n = take.unwrap_or(0);
                format!("{}{}", insert_after_select(sql, &format!("TOP {} ", n)), order_clause)
            }
            PaginationStyle::RowNumber | PaginationStyle::Top => {
                self.paginate_row_number(sql, take, skip, order_by)
            }
        }
    }

    fn paginate_row_number(&self, sql: &str, take: Option<u64>, skip: u64, order_by: &str) -> String {
        let window_order = if order_by.is_empty() {
            "(SELECT NULL)"
        } else {
            order_by
        };
        let ranked = insert_after_select(
            sql,
            &format!("ROW_NUMBER() OVER (ORDER BY {}) AS row_num, ", window_order),
        );
        let mut out = format!("SELECT * FROM ({}) paged WHERE paged.row_num > {}", ranked, skip);
        if let Some(n) = take {
            out.push_str(&format!(" AND paged.row_num <= {}", skip.saturating_add(n)));
        }
        out.push_str(" ORDER BY paged.row_num");
        out
    }
}

impl Default for DialectSettings {
    fn default() -> Self {
        Self::generic()
    }
}

/// Inserts `text` right after the leading `SELECT ` (and `DISTINCT `).
fn insert_after_select(sql: &str, text: &str) -> String {
    let mut head = if sql.starts_with("SELECT ") { 7 } else { 0 };
    if sql[head..].starts_with("DISTINCT ") {
        head += 9;
    }
    format!("{}{}{}", &sql[..head], text, &sql[head..])
}
