use crate::infrastructure::error::InfraError;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use std::path::Path;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");
const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn format_date_time(value: NaiveDateTime) -> String {
    value.format(DATE_TIME_FORMAT).to_string()
}

pub(crate) fn parse_date(raw: &str, column: &str) -> Result<NaiveDate, InfraError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid {column} '{raw}': {error}")))
}

pub(crate) fn parse_date_time(raw: &str, column: &str) -> Result<NaiveDateTime, InfraError> {
    NaiveDateTime::parse_from_str(raw, DATE_TIME_FORMAT)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid {column} '{raw}': {error}")))
}
