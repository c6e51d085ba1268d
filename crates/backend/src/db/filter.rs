//! Typed payload filters.
//!
//! A small expression type covering what the pipeline needs from the store:
//! equality, set membership and conjunction over payload string fields. Each
//! backend compiles it: [`Filter::to_sql`] for LanceDB predicates (with
//! quote escaping) and [`Filter::matches`] for in-process evaluation.

use crate::domain::code::VectorPayload;

/// Payload fields that can be filtered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadField {
  FilePath,
  FileName,
  FileType,
  Project,
}

impl PayloadField {
  /// Column name in the stored schema
  pub fn column(&self) -> &'static str {
    match self {
      PayloadField::FilePath => "file_path",
      PayloadField::FileName => "file_name",
      PayloadField::FileType => "file_type",
      PayloadField::Project => "project",
    }
  }

  fn read<'a>(&self, payload: &'a VectorPayload) -> &'a str {
    match self {
      PayloadField::FilePath => &payload.file_path,
      PayloadField::FileName => &payload.file_name,
      PayloadField::FileType => &payload.file_type,
      PayloadField::Project => &payload.project,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
  Equals { field: PayloadField, value: String },
  AnyOf { field: PayloadField, values: Vec<String> },
  And(Vec<Filter>),
}

impl Filter {
  pub fn equals(field: PayloadField, value: impl Into<String>) -> Self {
    Filter::Equals {
      field,
      value: value.into(),
    }
  }

  pub fn any_of<I, S>(field: PayloadField, values: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Filter::AnyOf {
      field,
      values: values.into_iter().map(Into::into).collect(),
    }
  }

  pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
    Filter::And(filters.into_iter().collect())
  }

  /// All vectors of one file
  pub fn file_path(path: impl Into<String>) -> Self {
    Self::equals(PayloadField::FilePath, path)
  }

  /// Evaluate against a payload. An empty `AnyOf` matches nothing and an
  /// empty `And` matches everything.
  pub fn matches(&self, payload: &VectorPayload) -> bool {
    match self {
      Filter::Equals { field, value } => field.read(payload) == value,
      Filter::AnyOf { field, values } => {
        let actual = field.read(payload);
        values.iter().any(|v| v == actual)
      }
      Filter::And(filters) => filters.iter().all(|f| f.matches(payload)),
    }
  }

  /// Compile to a LanceDB/DataFusion SQL predicate
  pub fn to_sql(&self) -> String {
    match self {
      Filter::Equals { field, value } => format!("{} = '{}'", field.column(), escape_value(value)),
      Filter::AnyOf { field, values } => {
        if values.is_empty() {
          return "false".to_string();
        }
        let escaped: Vec<String> = values.iter().map(|v| format!("'{}'", escape_value(v))).collect();
        format!("{} IN ({})", field.column(), escaped.join(", "))
      }
      Filter::And(filters) => match filters.len() {
        0 => "true".to_string(),
        1 => filters[0].to_sql(),
        _ => filters
          .iter()
          .map(|f| format!("({})", f.to_sql()))
          .collect::<Vec<_>>()
          .join(" AND "),
      },
    }
  }
}

/// Escape a string value for use in SQL.
fn escape_value(value: &str) -> String {
  value.replace('\'', "''")
}
