//! Column data read from redirected engine output.
//!
//! List commands print a banner of varying length before their columns.
//! Where the data starts is found by shape: once enough consecutive lines have
//! the same length and field count, those lines are taken to be rows.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value::ScalarValue;
use crate::driver::Session;
use crate::error::{ExtractError, Result};

/// Scratch file for [`Session::get_output`] when the output need not persist.
pub const OUTPUT_FILE: &str = "out.out";

/// Default number of uniform lines that confirm the start of the data.
pub const DEFAULT_RUN_LENGTH: usize = 5;

/// How [`Session::get_list`] reads a listing.
#[derive(Debug, Clone)]
pub struct ListOptions {
    skip_rows: Option<usize>,
    run_length: usize,
    delimiter: Option<char>,
    header: bool,
}

impl ListOptions {
    pub fn new() -> Self {
        Self {
            skip_rows: None,
            run_length: DEFAULT_RUN_LENGTH,
            delimiter: None,
            header: true,
        }
    }

    /// Skip exactly `rows` lines instead of detecting the header.
    pub fn skip_rows(mut self, rows: usize) -> Self {
        self.skip_rows = Some(rows);
        self
    }

    /// Uniform lines needed to confirm the data region (default 5).
    pub fn run_length(mut self, lines: usize) -> Self {
        self.run_length = lines;
        self
    }

    /// Split fields on `delimiter` instead of runs of whitespace.
    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Whether the last skipped line names the columns (default true).
    pub fn header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }
}

impl Default for ListOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Split `line` into fields. A blank line has none.
fn fields(line: &str, delimiter: Option<char>) -> Vec<&str> {
    match delimiter {
        None => line.split_whitespace().collect(),
        Some(_) if line.trim().is_empty() => Vec::new(),
        Some(delimiter) => line.split(delimiter).map(str::trim).collect(),
    }
}

/// Shape of a line: character count and field count.
fn shape(line: &str, delimiter: Option<char>) -> (usize, usize) {
    let line = line.trim_end_matches(['\r', '\n']);
    (line.chars().count(), fields(line, delimiter).len())
}

/// Number of lines before the column data in `text`.
///
/// The data starts at the first run of `run_length` consecutive lines sharing
/// one shape. Lines without fields never belong to a run. When no such run
/// exists the trailing non-blank lines are tried with shorter runs, down to a
/// single line. `None` means the text has no non-blank line at all.
pub fn detect_skip_rows(text: &str, run_length: usize, delimiter: Option<char>) -> Option<usize> {
    let run_length = run_length.max(1);
    let shapes: Vec<(usize, usize)> = text.lines().map(|line| shape(line, delimiter)).collect();

    let mut run = 0;
    let mut previous = None;
    for (index, &current) in shapes.iter().enumerate() {
        if current.1 == 0 {
            run = 0;
            previous = None;
            continue;
        }
        if previous == Some(current) {
            run += 1;
        } else {
            run = 1;
            previous = Some(current);
        }
        if run == run_length {
            return Some(index + 1 - run_length);
        }
    }

    let filled: Vec<usize> = shapes
        .iter()
        .enumerate()
        .filter(|(_, shape)| shape.1 > 0)
        .map(|(index, _)| index)
        .collect();
    for length in (1..run_length).rev() {
        if filled.len() < length {
            continue;
        }
        let tail = &filled[filled.len() - length..];
        let first = shapes[tail[0]];
        if tail.iter().all(|&index| shapes[index] == first) {
            debug!("no run of {} uniform lines, using the last {}", run_length, length);
            return Some(tail[0]);
        }
    }
    None
}

/// Number of header lines in the listing at `path`, split on whitespace.
pub fn calculate_skip_rows(path: &Path, run_length: usize) -> Result<usize> {
    let text = std::fs::read_to_string(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    detect_skip_rows(&text, run_length, None).ok_or_else(|| {
        ExtractError::HeaderDetectionFailure {
            path: path.to_path_buf(),
        }
        .into()
    })
}

/// Named columns of coerced values, in listing order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table {
    columns: IndexMap<String, Vec<ScalarValue>>,
}

impl Table {
    /// Parse the rows that follow the first `skip_rows` lines of `text`.
    ///
    /// Blank lines, and rows whose field count differs from the first row,
    /// are left out. Columns are named by the last non-blank skipped line when
    /// it has one name per column, otherwise by position.
    pub fn parse(text: &str, skip_rows: usize, options: &ListOptions) -> Self {
        let delimiter = options.delimiter;
        let lines: Vec<&str> = text.lines().collect();
        let (head, body) = lines.split_at(skip_rows.min(lines.len()));

        let mut rows = body
            .iter()
            .map(|line| fields(line, delimiter))
            .filter(|row| !row.is_empty());
        let Some(first) = rows.next() else {
            return Self::default();
        };
        let width = first.len();

        let names: Vec<String> = head
            .iter()
            .rev()
            .find(|line| !line.trim().is_empty())
            .map(|line| fields(line, delimiter))
            .filter(|names| options.header && names.len() == width)
            .map(|names| names.into_iter().map(str::to_string).collect())
            .unwrap_or_else(|| (0..width).map(|index| index.to_string()).collect());

        let mut columns: Vec<Vec<ScalarValue>> = vec![Vec::new(); width];
        for row in std::iter::once(first).chain(rows) {
            if row.len() != width {
                debug!("skipping row with {} fields, expected {}", row.len(), width);
                continue;
            }
            for (column, field) in columns.iter_mut().zip(row) {
                column.push(ScalarValue::coerce(field));
            }
        }

        Self {
            columns: dedupe(names).into_iter().zip(columns).collect(),
        }
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Option<&[ScalarValue]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Value at `row` in column `name`.
    pub fn get(&self, row: usize, name: &str) -> Option<&ScalarValue> {
        self.columns.get(name)?.get(row)
    }

    /// One row, in column order.
    pub fn row(&self, index: usize) -> Option<Vec<&ScalarValue>> {
        self.columns.values().map(|column| column.get(index)).collect()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.columns.values().next().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

/// Make repeated names unique by suffixing `.1`, `.2`, ...
fn dedupe(names: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let mut candidate = name.clone();
        let mut suffix = 0;
        while unique.contains(&candidate) {
            suffix += 1;
            candidate = format!("{name}.{suffix}");
        }
        unique.push(candidate);
    }
    unique
}

impl Session {
    /// Run `command` with its output redirected to a file in the working
    /// directory, and return that file's path.
    ///
    /// Output goes to [`OUTPUT_FILE`], overwritten on every call, unless
    /// `persist` is set, in which case a uniquely named file is used.
    /// Redirection is switched off again even when `command` fails.
    pub async fn get_output(&mut self, command: &str, persist: bool) -> Result<PathBuf> {
        let file = if persist {
            format!("{}.out", Uuid::new_v4())
        } else {
            OUTPUT_FILE.to_string()
        };

        self.send(&format!("/output,{file}")).await?;
        let result = self.send(command).await;
        self.send("/output").await?;
        result?;

        Ok(self.working_dir().join(file))
    }

    /// Run a list command and parse its columns.
    ///
    /// ```rust,no_run
    /// # use mapdl_session::extract::ListOptions;
    /// # async fn example(session: &mut mapdl_session::Session) -> Result<(), mapdl_session::Error> {
    /// let nodes = session.get_list("nlist", &ListOptions::new()).await?;
    /// for x in nodes.column("X").unwrap_or_default() {
    ///     println!("{x}");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_list(&mut self, command: &str, options: &ListOptions) -> Result<Table> {
        let path = self.get_output(command, false).await?;
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ExtractError::Io {
                path: path.clone(),
                source,
            })?;

        let skip_rows = match options.skip_rows {
            Some(rows) => rows,
            None => detect_skip_rows(&text, options.run_length, options.delimiter)
                .ok_or(ExtractError::HeaderDetectionFailure { path })?,
        };
        debug!("'{}': skipping {} header lines", command, skip_rows);

        Ok(Table::parse(&text, skip_rows, options))
    }
}
