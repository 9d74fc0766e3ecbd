//! Content sanitation pre-commit hook.
//!
//! The hook scans configured `table.column` pairs inside the transaction and
//! rejects the commit when any non-null value fails [`is_acceptable`].
//!
//! Policy: a value passes if it is made only of ASCII letters, digits and
//! underscores, *or* if it contains at least one symbol character (Unicode
//! general category So or Sk, or an emoji-block code point). The second
//! branch lets arbitrary text through as long as one symbol is present; this
//! is a known gap in the policy and is kept as-is.

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use unicode_general_category::{get_general_category, GeneralCategory};

use crate::config::SanitizeRules;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::transaction::PrecommitHook;

pub struct SanitizeHook {
    rules: SanitizeRules,
}

impl SanitizeHook {
    /// Build a hook for `rules`. Table and column names must be plain SQL
    /// identifiers since they are interpolated into the scan query.
    pub fn new(rules: SanitizeRules) -> Result<Self> {
        for (table, columns) in &rules {
            check_identifier(table)?;
            for column in columns {
                check_identifier(column)?;
            }
        }
        Ok(Self { rules })
    }

    fn check_column(&self, conn: &Connection, table: &str, column: &str) -> Result<()> {
        let sql = format!(
            "SELECT rowid, \"{column}\" FROM \"{table}\" WHERE \"{column}\" IS NOT NULL"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            let row_id: i64 = row.get(0)?;
            let value = match row.get_ref(1)? {
                ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                    String::from_utf8_lossy(bytes).into_owned()
                }
                ValueRef::Integer(i) => i.to_string(),
                ValueRef::Real(f) => f.to_string(),
                ValueRef::Null => continue,
            };

            if !is_acceptable(&value) {
                tracing::debug!(table, column, row_id, "value failed sanitation");
                return Err(StoreError::SanitizationFailed {
                    table: table.to_string(),
                    column: column.to_string(),
                    row_id,
                });
            }
        }
        Ok(())
    }
}

impl PrecommitHook for SanitizeHook {
    fn name(&self) -> &str {
        "sanitize"
    }

    fn check(&self, conn: &Connection) -> Result<()> {
        for (table, columns) in &self.rules {
            for column in columns {
                self.check_column(conn, table, column)?;
            }
        }
        Ok(())
    }
}

impl Database {
    /// Build a sanitation hook; register it with [`Database::add_precommit_hook`].
    pub fn create_sanitize_hook(&self, rules: SanitizeRules) -> Result<SanitizeHook> {
        SanitizeHook::new(rules)
    }
}

/// Whether `s` passes the content policy.
pub fn is_acceptable(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') || s.chars().any(is_symbol)
}

/// Other-symbol (So) and modifier-symbol (Sk) code points, plus the emoji
/// blocks, which also cover variation selectors and regional indicators.
fn is_symbol(c: char) -> bool {
    matches!(
        get_general_category(c),
        GeneralCategory::OtherSymbol | GeneralCategory::ModifierSymbol
    ) || is_emoji(c)
}

fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F600..=0x1F64F // emoticons
        | 0x1F300..=0x1F5FF // misc symbols and pictographs
        | 0x1F680..=0x1F6FF // transport and map
        | 0x1F1E0..=0x1F1FF // regional indicators
        | 0x2600..=0x26FF // misc symbols
        | 0x2700..=0x27BF // dingbats
        | 0xFE00..=0xFE0F // variation selectors
        | 0x1F900..=0x1F9FF // supplemental symbols and pictographs
        | 0x1F018..=0x1F270
    )
}

fn check_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidSanitizeRule(name.to_string()))
    }
}
