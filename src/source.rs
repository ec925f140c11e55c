// Copyright 2021 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use eyre::{eyre, Result, WrapErr};
use getset::Getters;
use std::{collections::BTreeMap,
          fs,
          path::{Path, PathBuf}};


/// A single cell of a table as delivered by the data source.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
  Number(f64),
  Text(String),
  Null,
}

impl Value {
  /// Numeric coercion: numbers stay, text that parses as a float becomes
  /// that float, everything else becomes `NaN`.
  pub fn to_f64(&self) -> f64 {
    match self {
      Value::Number(number) => *number,
      Value::Text(text) => text.trim().parse::<f64>().unwrap_or(f64::NAN),
      Value::Null => f64::NAN,
    }
  }
}

impl From<f64> for Value {
  fn from(number: f64) -> Self {
    Value::Number(number)
  }
}

impl From<&str> for Value {
  fn from(text: &str) -> Self {
    Value::Text(text.to_string())
  }
}


/// A named column of a table.
#[derive(Clone, Debug, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct Column {
  name:   String,
  values: Vec<Value>,
}

impl Column {
  pub fn new(name: &str, values: Vec<Value>) -> Self {
    Self { name: name.to_string(),
           values }
  }

  /// Convenience constructor for purely numeric columns.
  pub fn numeric(name: &str, values: &[f64]) -> Self {
    Self::new(name, values.iter().map(|&value| Value::Number(value)).collect())
  }

  /// The column coerced to numbers, see `Value::to_f64`.
  pub fn to_f64(&self) -> Vec<f64> {
    self.values.iter().map(Value::to_f64).collect()
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
}


/// A table read in full, column by column.
#[derive(Clone, Debug, Default, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct Table {
  name:    String,
  columns: Vec<Column>,
}

impl Table {
  pub fn new(name: &str, columns: Vec<Column>) -> Self {
    Self { name: name.to_string(),
           columns }
  }

  /// Number of rows, i.e. the length of the longest column.
  pub fn row_count(&self) -> usize {
    self.columns.iter().map(Column::len).max().unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.row_count() == 0
  }

  pub fn column(&self, name: &str) -> Option<&Column> {
    self.columns.iter().find(|column| column.name == name)
  }
}


/// Table oriented access to recorded telemetry.
pub trait TableSource {
  /// Names of all tables, in a stable order.
  fn table_names(&self) -> Result<Vec<String>>;

  /// Reads table `name` with all its columns.
  fn read_table(&self, name: &str) -> Result<Table>;

  /// Reads column `column` of table `table` as numbers.
  fn read_series(&self, table: &str, column: &str) -> Result<Vec<f64>> {
    let table = self.read_table(table)?;
    table.column(column)
         .map(Column::to_f64)
         .ok_or_else(|| {
           eyre!("table '{}' has no column '{}'", table.name(), column)
         })
  }

  /// Number of rows of table `name`.
  fn row_count(&self, name: &str) -> Result<usize> {
    Ok(self.read_table(name)?.row_count())
  }
}


/// Source holding all tables in memory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemorySource {
  tables: BTreeMap<String, Table>,
}

impl MemorySource {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, table: Table) -> &mut Self {
    self.tables.insert(table.name().clone(), table);
    self
  }

  pub fn with(mut self, table: Table) -> Self {
    self.insert(table);
    self
  }
}

impl TableSource for MemorySource {
  fn table_names(&self) -> Result<Vec<String>> {
    Ok(self.tables.keys().cloned().collect())
  }

  fn read_table(&self, name: &str) -> Result<Table> {
    self.tables
        .get(name)
        .cloned()
        .ok_or_else(|| eyre!("no table '{}' found", name))
  }
}


/// Source reading a directory of CSV files, one table per file. The table
/// name is the file stem, column names come from the header row.
#[derive(Clone, Debug, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct CsvSource {
  dir: PathBuf,
}

impl CsvSource {
  pub fn open(dir: &Path) -> Result<Self> {
    eyre::ensure!(dir.is_dir(),
                  "path does not exist or is not a directory ({})",
                  dir.display());
    Ok(Self { dir: dir.to_owned() })
  }

  fn table_path(&self, name: &str) -> PathBuf {
    self.dir.join(format!("{}.csv", name))
  }
}

impl TableSource for CsvSource {
  fn table_names(&self) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let entries = fs::read_dir(&self.dir)
      .wrap_err_with(|| format!("could not list {}", self.dir.display()))?;
    for entry in entries {
      let path = entry?.path();
      let is_csv = path.extension()
                       .map(|extension| extension.eq_ignore_ascii_case("csv"))
                       .unwrap_or(false);
      if !is_csv {
        continue;
      }
      if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
        names.push(stem.to_string());
      }
    }
    names.sort();
    Ok(names)
  }

  fn read_table(&self, name: &str) -> Result<Table> {
    let path = self.table_path(name);
    let mut reader = csv::ReaderBuilder::new()
      .flexible(true)
      .from_path(&path)
      .wrap_err_with(|| format!("could not open {}", path.display()))?;

    let headers: Vec<String> =
      reader.headers()?.iter().map(|header| header.to_string()).collect();
    let mut columns: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
      let record =
        record.wrap_err_with(|| format!("malformed row in {}", path.display()))?;
      for (idx, values) in columns.iter_mut().enumerate() {
        values.push(match record.get(idx) {
                      Some(field) if !field.trim().is_empty() => {
                        Value::Text(field.to_string())
                      }
                      _ => Value::Null,
                    });
      }
    }

    Ok(Table::new(name,
                  headers.iter()
                         .zip(columns)
                         .map(|(header, values)| Column::new(header, values))
                         .collect()))
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;


  #[test]
  fn value_test() {
    assert_eq!(1.5, Value::Number(1.5).to_f64());
    assert_eq!(42.0, Value::from(" 42 ").to_f64());
    assert!(Value::from("warbl").to_f64().is_nan());
    assert!(Value::Null.to_f64().is_nan());
  }

  #[test]
  fn memory_source_test() {
    let source =
      MemorySource::new().with(Table::new("Speed",
                                          vec![Column::numeric("value",
                                                               &[1.0, 2.0])]))
                         .with(Table::new("Gear", vec![]));

    assert_eq!(vec!["Gear".to_string(), "Speed".to_string()],
               source.table_names().unwrap());
    assert_eq!(2, source.row_count("Speed").unwrap());
    assert_eq!(0, source.row_count("Gear").unwrap());
    assert_eq!(true, source.read_table("Gear").unwrap().is_empty());
    assert_eq!(vec![1.0, 2.0], source.read_series("Speed", "value").unwrap());
    assert!(source.read_series("Speed", "nope").is_err());
    assert!(source.read_table("nope").is_err());
  }

  #[test]
  fn csv_source_test() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Tyre Temp.csv"),
              "value1,value2\n80.5,81\n82,\nhot,83\n").unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let source = CsvSource::open(dir.path()).unwrap();
    assert_eq!(vec!["Tyre Temp".to_string()], source.table_names().unwrap());

    let table = source.read_table("Tyre Temp").unwrap();
    assert_eq!(3, table.row_count());
    assert_eq!("value2", table.columns()[1].name());

    let value1 = source.read_series("Tyre Temp", "value1").unwrap();
    assert_eq!(80.5, value1[0]);
    assert_eq!(82.0, value1[1]);
    assert!(value1[2].is_nan());

    let value2 = table.column("value2").unwrap();
    assert_eq!(&Value::Null, &value2.values()[1]);

    assert!(CsvSource::open(&dir.path().join("missing")).is_err());
  }
}
