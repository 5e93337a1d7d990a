//! Read-only query validation
//!
//! A denylist check, not a parser: it rejects any statement that mentions a
//! write or DDL keyword anywhere outside a `--` comment, and anything that
//! does not start with SELECT. Identifiers that merely contain a keyword
//! (`update_count`, `created_at`) are rejected too. It sits under
//! least-privilege database credentials, not in place of them.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

/// Keywords that disqualify a statement wherever they appear.
pub const DENIED_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "CREATE", "TRUNCATE",
];

lazy_static! {
    static ref LINE_COMMENT: Regex = Regex::new(r"(?m)--.*$").expect("valid comment pattern");
}

pub struct QueryValidator;

impl QueryValidator {
    pub fn is_safe(sql: &str) -> bool {
        Self::rejection_reason(sql).is_none()
    }

    /// Why `sql` is rejected, or `None` when it passes.
    pub fn rejection_reason(sql: &str) -> Option<String> {
        let cleaned = LINE_COMMENT.replace_all(sql, "");
        let cleaned = cleaned.trim().to_uppercase();

        if let Some(keyword) = DENIED_KEYWORDS.iter().find(|k| cleaned.contains(*k)) {
            warn!("Rejected query containing {}", keyword);
            return Some(format!("contains {}", keyword));
        }

        if !cleaned.starts_with("SELECT") {
            warn!("Rejected query not starting with SELECT");
            return Some("does not start with SELECT".to_string());
        }

        None
    }
}
