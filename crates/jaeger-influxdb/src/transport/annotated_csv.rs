//! Flux annotated CSV.
//!
//! A response is a sequence of blocks separated by blank lines. Each block
//! carries `#datatype`, `#group` and `#default` annotation rows, a header
//! row, then data rows whose `table` column numbers the tables in the block:
//!
//! ```text
//! #datatype,string,long,string,string
//! #group,false,false,true,false
//! #default,_result,,,
//! ,result,table,trace_id,span_id
//! ,,0,abc,1
//! ,,1,def,2
//! ```
//!
//! An engine error is reported in-band as a block with `error` and
//! `reference` columns.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::codec::{timestamp, Datum, ResultTable};
use crate::error::TransportError;
use crate::schema;

/// Decode an annotated CSV body into tables.
pub fn parse(body: &str) -> Result<Vec<ResultTable>, TransportError> {
    let mut parser = Parser::default();
    for record in records(body)? {
        parser.push(record)?;
    }
    parser.finish_table();
    Ok(parser.tables)
}

#[derive(Default)]
struct Parser {
    datatypes: Vec<String>,
    groups: Vec<bool>,
    defaults: Vec<String>,
    header: Option<Vec<String>>,
    current: Option<(String, ResultTable)>,
    tables: Vec<ResultTable>,
}

impl Parser {
    fn push(&mut self, record: Option<Vec<String>>) -> Result<(), TransportError> {
        let Some(record) = record else {
            self.end_block();
            return Ok(());
        };
        let first = record.first().map(String::as_str).unwrap_or_default();

        if first.starts_with('#') {
            if self.header.is_some() {
                self.end_block();
            }
            let values = record[1..].to_vec();
            match first {
                "#datatype" => self.datatypes = values,
                "#group" => self.groups = values.iter().map(|v| v == "true").collect(),
                "#default" => self.defaults = values,
                _ => {}
            }
            return Ok(());
        }

        let Some(header) = &self.header else {
            self.header = Some(record[1..].to_vec());
            return Ok(());
        };
        let cells = &record[1..];

        if let (Some(error), Some(_)) = (position(header, "error"), position(header, "reference")) {
            let message = cells.get(error).cloned().unwrap_or_default();
            return Err(TransportError::Query(message));
        }

        let table_id = position(header, schema::TABLE)
            .and_then(|i| cells.get(i))
            .cloned()
            .unwrap_or_default();
        if self.current.as_ref().map(|(id, _)| id) != Some(&table_id) {
            if let Some((_, table)) = self.current.take() {
                self.tables.push(table);
            }
            self.current = Some((table_id.clone(), self.new_table(header, cells)?));
        }

        let row = self.row(header, cells)?;
        if let Some((_, table)) = &mut self.current {
            table.push_row(row);
        }
        Ok(())
    }

    fn end_block(&mut self) {
        self.finish_table();
        self.header = None;
        self.datatypes.clear();
        self.groups.clear();
        self.defaults.clear();
    }

    fn finish_table(&mut self) {
        if let Some((_, table)) = self.current.take() {
            self.tables.push(table);
        }
    }

    /// Columns that are carried into the table, with their index in the record.
    fn kept_columns<'a>(header: &'a [String]) -> impl Iterator<Item = (usize, &'a String)> {
        header
            .iter()
            .enumerate()
            .filter(|(_, name)| !matches!(name.as_str(), schema::RESULT | schema::TABLE))
    }

    fn new_table(&self, header: &[String], cells: &[String]) -> Result<ResultTable, TransportError> {
        let columns = Self::kept_columns(header).map(|(_, name)| name.clone()).collect();
        let mut table = ResultTable::new(columns);
        let mut group_key = BTreeMap::new();
        for (i, name) in Self::kept_columns(header) {
            if self.groups.get(i).copied().unwrap_or(false) {
                if let Datum::String(value) = self.cell(i, cells)? {
                    group_key.insert(name.clone(), value);
                }
            }
        }
        table.group_key = group_key;
        Ok(table)
    }

    fn row(&self, header: &[String], cells: &[String]) -> Result<Vec<Datum>, TransportError> {
        Self::kept_columns(header)
            .map(|(i, _)| self.cell(i, cells))
            .collect()
    }

    /// Typed value of cell `i`, using the annotations of that column.
    fn cell(&self, i: usize, cells: &[String]) -> Result<Datum, TransportError> {
        let raw = cells.get(i).map(String::as_str).unwrap_or_default();
        let raw = if raw.is_empty() {
            self.defaults.get(i).map(String::as_str).unwrap_or_default()
        } else {
            raw
        };
        if raw.is_empty() {
            return Ok(Datum::Null);
        }
        let datatype = self.datatypes.get(i).map(String::as_str).unwrap_or("string");
        typed(datatype, raw)
    }
}

fn typed(datatype: &str, raw: &str) -> Result<Datum, TransportError> {
    let invalid = || TransportError::Response(format!("invalid {datatype} value {raw:?}"));
    Ok(match datatype {
        "long" => Datum::Int(raw.parse().map_err(|_| invalid())?),
        "unsignedLong" => Datum::UInt(raw.parse().map_err(|_| invalid())?),
        "double" => Datum::Float(match raw {
            "+Inf" => f64::INFINITY,
            "-Inf" => f64::NEG_INFINITY,
            _ => raw.parse().map_err(|_| invalid())?,
        }),
        "boolean" => match raw {
            "true" => Datum::Bool(true),
            "false" => Datum::Bool(false),
            _ => return Err(invalid()),
        },
        "dateTime:RFC3339" | "dateTime:RFC3339Nano" => {
            let time = DateTime::parse_from_rfc3339(raw).map_err(|_| invalid())?;
            Datum::Time(timestamp::unix_nanos(time.with_timezone(&Utc)))
        }
        _ => Datum::String(raw.to_string()),
    })
}

fn position(header: &[String], name: &str) -> Option<usize> {
    header.iter().position(|h| h == name)
}

/// Split CSV text into records. A blank line yields `None`.
fn records(body: &str) -> Result<Vec<Option<Vec<String>>>, TransportError> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line_has_content = false;
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                c => field.push(c),
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                line_has_content = true;
            }
            ',' => {
                fields.push(std::mem::take(&mut field));
                line_has_content = true;
            }
            '\r' => {}
            '\n' => {
                if line_has_content {
                    fields.push(std::mem::take(&mut field));
                    records.push(Some(std::mem::take(&mut fields)));
                } else {
                    records.push(None);
                }
                line_has_content = false;
            }
            c => {
                field.push(c);
                line_has_content = true;
            }
        }
    }

    if in_quotes {
        return Err(TransportError::Response("unterminated quoted field".to_string()));
    }
    if line_has_content {
        fields.push(field);
        records.push(Some(fields));
    }
    Ok(records)
}
