// blpdata/src/table.rs
// Optional tabular rendering of a ResultSet. Parsing never depends on this.

use crate::result::{FieldValue, ResultSet};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Column label; wide time-series tables use the two-level `(security, field)` form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ColumnLabel {
  pub group: Option<String>,
  pub name: String,
}

impl ColumnLabel {
  pub fn new(name: &str) -> Self {
    ColumnLabel { group: None, name: name.to_string() }
  }

  pub fn grouped(group: &str, name: &str) -> Self {
    ColumnLabel { group: Some(group.to_string()), name: name.to_string() }
  }
}

impl fmt::Display for ColumnLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.group {
      Some(group) => write!(f, "{}/{}", group, self.name),
      None => f.write_str(&self.name),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
  index_name: String,
  columns: Vec<ColumnLabel>,
  index: Vec<String>,
  cells: Vec<Vec<Option<String>>>,
}

fn render(value: &FieldValue) -> Option<String> {
  match value {
    FieldValue::Null => None,
    FieldValue::Value(v) => Some(v.to_string()),
    FieldValue::List(items) => Some(items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")),
    FieldValue::Table(rows) => Some(format!("[{} rows]", rows.len())),
    FieldValue::Series(points) => Some(format!("[{} points]", points.len())),
  }
}

impl Table {
  /// One row per result key, one column per field name seen in any row.
  pub fn from_records(index_name: &str, result: &ResultSet) -> Self {
    let names: BTreeSet<&str> = result.iter().flat_map(|(_, row)| row.keys().map(String::as_str)).collect();
    let columns: Vec<ColumnLabel> = names.iter().map(|n| ColumnLabel::new(n)).collect();
    let mut index = Vec::with_capacity(result.len());
    let mut cells = Vec::with_capacity(result.len());
    for (key, row) in result.iter() {
      index.push(key.to_string());
      cells.push(names.iter().map(|n| row.get(*n).and_then(render)).collect());
    }
    Table { index_name: index_name.to_string(), columns, index, cells }
  }

  /// Combines per-security series into one date-indexed table with
  /// `(security, field)` columns. Dates missing for a column are empty.
  pub fn from_time_series(result: &ResultSet) -> Self {
    let mut columns = Vec::new();
    let mut by_date: BTreeMap<NaiveDate, BTreeMap<usize, String>> = BTreeMap::new();
    for (security, row) in result.iter() {
      for (field, value) in row {
        let Some(series) = value.series() else { continue };
        let col = columns.len();
        columns.push(ColumnLabel::grouped(security, field));
        for (date, v) in series {
          by_date.entry(*date).or_default().insert(col, v.to_string());
        }
      }
    }
    let mut index = Vec::with_capacity(by_date.len());
    let mut cells = Vec::with_capacity(by_date.len());
    for (date, values) in by_date {
      index.push(date.to_string());
      cells.push((0..columns.len()).map(|c| values.get(&c).cloned()).collect());
    }
    Table { index_name: "date".to_string(), columns, index, cells }
  }

  /// Rewrites index labels, e.g. to normalize security keys.
  pub fn map_index<F: Fn(&str) -> String>(mut self, f: F) -> Self {
    self.index = self.index.iter().map(|k| f(k)).collect();
    self
  }

  pub fn columns(&self) -> &[ColumnLabel] { &self.columns }
  pub fn index(&self) -> &[String] { &self.index }
  pub fn num_rows(&self) -> usize { self.index.len() }

  pub fn cell(&self, row: &str, column: &ColumnLabel) -> Option<&str> {
    let r = self.index.iter().position(|k| k == row)?;
    let c = self.columns.iter().position(|l| l == column)?;
    self.cells[r][c].as_deref()
  }

  fn has_groups(&self) -> bool {
    self.columns.iter().any(|c| c.group.is_some())
  }
}

impl fmt::Display for Table {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let grouped = self.has_groups();
    let index_width = self.index.iter().map(String::len).chain([self.index_name.len()]).max().unwrap_or(0);
    let widths: Vec<usize> = self.columns.iter().enumerate().map(|(c, label)| {
      let header = label.name.len().max(label.group.as_ref().map_or(0, String::len));
      let body = self.cells.iter().map(|row| row[c].as_ref().map_or(0, String::len)).max().unwrap_or(0);
      header.max(body)
    }).collect();

    if grouped {
      write!(f, "{:w$}", "", w = index_width)?;
      for (label, w) in self.columns.iter().zip(&widths) {
        write!(f, "  {:w$}", label.group.as_deref().unwrap_or(""), w = *w)?;
      }
      writeln!(f)?;
    }
    write!(f, "{:w$}", self.index_name, w = index_width)?;
    for (label, w) in self.columns.iter().zip(&widths) {
      write!(f, "  {:w$}", label.name, w = *w)?;
    }
    writeln!(f)?;
    for (key, row) in self.index.iter().zip(&self.cells) {
      write!(f, "{:w$}", key, w = index_width)?;
      for (cell, w) in row.iter().zip(&widths) {
        write!(f, "  {:w$}", cell.as_deref().unwrap_or(""), w = *w)?;
      }
      writeln!(f)?;
    }
    Ok(())
  }
}
