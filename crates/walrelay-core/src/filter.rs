//! Two-tier event filter.
//!
//! The first tier is an allow-list of actions per table. A table without an
//! entry matches nothing. The second tier, configured per table, restricts
//! column values: every configured column that is present in the event's
//! post-image must render to one of its allowed values. A configured column
//! that is absent from the post-image does not drop the event.
//!
//! All comparisons (table names, column names, actions and values) use
//! Unicode simple case folding, so `ΟΔΟΣ` matches `οδος` and `ſ` matches `s`.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::event::Event;
use crate::types::{RowMap, Value};

/// Outcome of evaluating one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    /// Table not listed, or action not allowed for it.
    SkipTable,
    /// A column value is not in the column's allow-list.
    SkipColumn { column: String, value: String },
}

impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// Table/action and column-value allow-lists.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    /// Case-folded table name to allowed actions.
    tables: HashMap<String, Vec<String>>,
    /// Case-folded table name to column allow-lists, in column name order.
    column_filter: HashMap<String, BTreeMap<String, Vec<String>>>,
}

impl Filter {
    pub fn new(
        tables: HashMap<String, Vec<String>>,
        column_filter: HashMap<String, HashMap<String, Vec<String>>>,
    ) -> Self {
        let mut filter = Filter::default();
        for (table, actions) in tables {
            filter = filter.allow(&table, actions);
        }
        for (table, columns) in column_filter {
            for (column, values) in columns {
                filter = filter.with_column(&table, &column, values);
            }
        }
        filter
    }

    /// Allow the given actions for a table, in addition to any already allowed.
    pub fn allow<I, S>(mut self, table: &str, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables
            .entry(fold_case(table))
            .or_default()
            .extend(actions.into_iter().map(Into::into));
        self
    }

    /// Restrict a column of a table to the given values.
    pub fn with_column<I, S>(mut self, table: &str, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_filter
            .entry(fold_case(table))
            .or_default()
            .entry(column.to_string())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Whether the table/action tier lets this action through.
    pub fn allows(&self, table: &str, action: &str) -> bool {
        lookup_table(&self.tables, table).is_some_and(|actions| in_array(actions, action))
    }

    /// Evaluate both tiers against an event.
    pub fn evaluate(&self, event: &Event) -> Verdict {
        if !self.allows(&event.table, &event.action) {
            return Verdict::SkipTable;
        }

        let Some(columns) = lookup_table(&self.column_filter, &event.table) else {
            return Verdict::Pass;
        };

        for (column, allowed) in columns {
            let Some(value) = lookup_column(&event.data, column) else {
                debug!(
                    table = %event.table,
                    column = %column,
                    "column filter skipped: column not found in event"
                );
                continue;
            };

            let rendered = value.to_string();
            if !in_array(allowed, &rendered) {
                return Verdict::SkipColumn {
                    column: column.clone(),
                    value: rendered,
                };
            }
        }

        Verdict::Pass
    }
}

// Keys are already folded, so an exact hit is a folded hit.
fn lookup_table<'a, V>(map: &'a HashMap<String, V>, table: &str) -> Option<&'a V> {
    map.get(table).or_else(|| map.get(&fold_case(table)))
}

fn lookup_column<'a>(data: &'a RowMap, column: &str) -> Option<&'a Value> {
    data.get(column).or_else(|| {
        data.iter()
            .find(|(name, _)| fold_eq(name, column))
            .map(|(_, value)| value)
    })
}

/// Case-insensitive membership test.
///
/// Uses Unicode simple case folding, which does not depend on the locale.
pub fn in_array<S: AsRef<str>>(set: &[S], value: &str) -> bool {
    set.iter().any(|candidate| fold_eq(candidate.as_ref(), value))
}

/// Unicode simple case fold of `s`.
///
/// Two strings fold to the same value exactly when they are equal ignoring
/// case. Results are stable under a second fold.
pub fn fold_case(s: &str) -> String {
    folded(s).collect()
}

fn fold_eq(a: &str, b: &str) -> bool {
    folded(a).eq(folded(b))
}

fn folded(s: &str) -> impl Iterator<Item = char> + '_ {
    s.chars().flat_map(char::to_lowercase).map(fold_char)
}

// Lower-case letters whose fold is a different lower-case letter.
fn fold_char(c: char) -> char {
    match c {
        'ſ' => 's',
        '\u{0345}' | '\u{1FBE}' => 'ι',
        'ς' => 'σ',
        'ϐ' => 'β',
        'ϑ' => 'θ',
        'ϕ' => 'φ',
        'ϖ' => 'π',
        'ϰ' => 'κ',
        'ϱ' => 'ρ',
        'ϵ' => 'ε',
        'ẛ' => 'ṡ',
        '\u{1C80}' => 'в',
        '\u{1C81}' => 'д',
        '\u{1C82}' => 'о',
        '\u{1C83}' => 'с',
        '\u{1C84}' | '\u{1C85}' => 'т',
        '\u{1C86}' => 'ъ',
        '\u{1C87}' => 'ѣ',
        '\u{1C88}' => 'ꙋ',
        _ => c,
    }
}
