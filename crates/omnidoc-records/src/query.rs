//! WHERE-clause builder for filtered listings.

use rusqlite::types::ToSql;

/// Conjunction of SQL conditions with numbered parameters.
#[derive(Default)]
pub(crate) struct Clauses {
    parts: Vec<String>,
    values: Vec<Box<dyn ToSql>>,
}

impl Clauses {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds a condition; `{}` in `template` is replaced by the placeholder.
    pub(crate) fn push<T: ToSql + 'static>(&mut self, template: &str, value: T) {
        self.values.push(Box::new(value));
        let placeholder = format!("?{}", self.values.len());
        self.parts.push(template.replace("{}", &placeholder));
    }

    pub(crate) fn push_raw(&mut self, condition: &str) {
        self.parts.push(condition.to_string());
    }

    /// Case-insensitive substring match of `term` against any of `columns`.
    pub(crate) fn push_search(&mut self, columns: &[&str], term: &str) {
        self.values.push(Box::new(format!("%{}%", escape_like(&term.to_lowercase()))));
        let placeholder = format!("?{}", self.values.len());
        let alternatives: Vec<String> = columns
            .iter()
            .map(|c| format!("LOWER(COALESCE({}, '')) LIKE {} ESCAPE '\\'", c, placeholder))
            .collect();
        self.parts.push(format!("({})", alternatives.join(" OR ")));
    }

    pub(crate) fn where_sql(&self) -> String {
        if self.parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.parts.join(" AND "))
        }
    }

    pub(crate) fn params(&self) -> Vec<&dyn ToSql> {
        self.values.iter().map(|v| v.as_ref()).collect()
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
