//! Data tables
//!
//! The visual layer only reads tables: column ids and types, cell values and
//! table dimensions. [`MemoryTable`] is a plain in-memory implementation built
//! from the JSON table format:
//!
//! ```json
//! {
//!   "model": [{"name": "country", "type": "string"}, {"name": "sales", "type": "number"}],
//!   "rows": [{"c": ["PT", {"v": 1200, "f": "1.2k"}]}, ["ES", 800]]
//! }
//! ```

use std::fmt;

use pentype_core::{Error, Primitive, Result};
use pentype_model::{standard, Type};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Type of the values of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Text
    String,
    /// Numbers
    Number,
    /// Booleans
    Boolean,
    /// Dates
    Date,
}

impl ColumnType {
    /// The standard type of the values of the column
    pub fn value_type(&self) -> &'static Type {
        let std = standard();
        match self {
            ColumnType::String => &std.string,
            ColumnType::Number => &std.number,
            ColumnType::Boolean => &std.boolean,
            ColumnType::Date => &std.date,
        }
    }

    /// Whether values are measured rather than enumerated
    pub fn is_continuous(&self) -> bool {
        matches!(self, ColumnType::Number | ColumnType::Date)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::String => "string",
            ColumnType::Number => "number",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
        };
        f.write_str(name)
    }
}

/// Read-only tabular data
pub trait DataTable: Send + Sync {
    /// Number of rows
    fn number_of_rows(&self) -> usize;

    /// Number of columns
    fn number_of_columns(&self) -> usize;

    /// Id of a column
    fn column_id(&self, column: usize) -> Result<&str>;

    /// Type of a column
    fn column_type(&self, column: usize) -> Result<ColumnType>;

    /// Value of a cell; `None` for a null cell
    fn cell(&self, row: usize, column: usize) -> Result<Option<Primitive>>;

    /// Index of the column with the given id
    fn column_index(&self, id: &str) -> Option<usize> {
        (0..self.number_of_columns()).find(|&i| self.column_id(i).map_or(false, |c| c == id))
    }
}

// ============================================================================
// MemoryTable
// ============================================================================

/// Column of a [`MemoryTable`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column id
    pub name: String,
    /// Type of the values
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RowSpec {
    Wrapped { c: Vec<Json> },
    Plain(Vec<Json>),
}

#[derive(Deserialize)]
struct TableSpec {
    #[serde(default)]
    model: Vec<Column>,
    #[serde(default)]
    rows: Vec<RowSpec>,
}

#[derive(Debug, Clone, PartialEq)]
struct Cell {
    value: Option<Primitive>,
    formatted: Option<String>,
}

/// In-memory data table
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTable {
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
}

impl MemoryTable {
    /// Create an empty table with the given columns
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        for (i, column) in columns.iter().enumerate() {
            if column.name.is_empty() {
                return Err(Error::argument_required("name"));
            }
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(Error::argument_invalid(
                    "model",
                    format!("duplicate column '{}'", column.name),
                ));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// Create a table from its JSON form
    pub fn from_json(spec: &Json) -> Result<Self> {
        let spec = TableSpec::deserialize(spec)
            .map_err(|e| Error::argument_invalid("table", e.to_string()))?;
        let mut table = Self::new(spec.model)?;
        for row in spec.rows {
            let cells = match row {
                RowSpec::Wrapped { c } => c,
                RowSpec::Plain(cells) => cells,
            };
            table.add_row(&cells)?;
        }
        Ok(table)
    }

    /// Append a row of raw cells (`value` or `{"v": value, "f": formatted}`)
    pub fn add_row(&mut self, cells: &[Json]) -> Result<()> {
        if cells.len() != self.columns.len() {
            return Err(Error::argument_invalid(
                "row",
                format!(
                    "expected {} cells, got {}",
                    self.columns.len(),
                    cells.len()
                ),
            ));
        }
        let row = cells
            .iter()
            .zip(&self.columns)
            .map(|(raw, column)| parse_cell(raw, column))
            .collect::<Result<Vec<_>>>()?;
        self.rows.push(row);
        Ok(())
    }

    /// The columns
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Formatted text of a cell, if any
    pub fn formatted(&self, row: usize, column: usize) -> Result<Option<&str>> {
        Ok(self.cell_at(row, column)?.formatted.as_deref())
    }

    fn cell_at(&self, row: usize, column: usize) -> Result<&Cell> {
        self.rows
            .get(row)
            .ok_or_else(|| Error::argument_invalid("row", format!("row {} is out of range", row)))?
            .get(column)
            .ok_or_else(|| {
                Error::argument_invalid("column", format!("column {} is out of range", column))
            })
    }
}

fn parse_cell(raw: &Json, column: &Column) -> Result<Cell> {
    let (value, formatted) = match raw {
        Json::Object(map) if map.contains_key("v") => (
            map.get("v").unwrap_or(&Json::Null),
            map.get("f").and_then(Json::as_str).map(str::to_string),
        ),
        other => (other, None),
    };
    let value = if value.is_null() {
        None
    } else {
        Some(column.column_type.value_type().to_primitive(value)?)
    };
    Ok(Cell { value, formatted })
}

impl DataTable for MemoryTable {
    fn number_of_rows(&self) -> usize {
        self.rows.len()
    }

    fn number_of_columns(&self) -> usize {
        self.columns.len()
    }

    fn column_id(&self, column: usize) -> Result<&str> {
        self.columns
            .get(column)
            .map(|c| c.name.as_str())
            .ok_or_else(|| {
                Error::argument_invalid("column", format!("column {} is out of range", column))
            })
    }

    fn column_type(&self, column: usize) -> Result<ColumnType> {
        self.columns
            .get(column)
            .map(|c| c.column_type)
            .ok_or_else(|| {
                Error::argument_invalid("column", format!("column {} is out of range", column))
            })
    }

    fn cell(&self, row: usize, column: usize) -> Result<Option<Primitive>> {
        Ok(self.cell_at(row, column)?.value.clone())
    }
}
