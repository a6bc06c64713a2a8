//! Replay - CSV order event streams into book commands.
//!
//! Expected header: `type,order_id,side,price,quantity,timestamp`.
//! `type` is one of `add`, `modify`, `cancel` or `trade`; trade prints are
//! informational for a passive book and are skipped.

use std::io;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::command::{AddOrder, CancelOrder, Command, ModifyOrder, Side};
use crate::engine::Engine;
use crate::error::BookError;

/// Failures while reading or applying an event stream.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("row {row}: unknown event type {kind:?}")]
    UnknownEventType { row: u64, kind: String },

    #[error("row {row}: missing {field}")]
    MissingField { row: u64, field: &'static str },

    #[error("row {row}: invalid {field} {value:?}")]
    InvalidNumber {
        row: u64,
        field: &'static str,
        value: String,
    },

    #[error("row {row}: invalid side {value:?}")]
    InvalidSide { row: u64, value: String },

    #[error("row {row}: timestamp out of range")]
    TimestampOutOfRange { row: u64 },

    #[error("row {row}: {source}")]
    Rejected {
        row: u64,
        #[source]
        source: BookError,
    },
}

/// One raw CSV row of the event stream.
#[derive(Debug, Deserialize)]
pub struct EventRow {
    pub r#type: String,
    pub order_id: Option<String>,
    pub side: Option<String>,
    pub price: Option<String>,
    pub quantity: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl EventRow {
    /// Convert the raw row into a command.
    ///
    /// `row` is the 1-based data row, used in error messages. Returns
    /// `Ok(None)` for trade rows.
    pub fn to_command(&self, row: u64) -> Result<Option<Command>, ReplayError> {
        let kind = self.r#type.trim().to_ascii_lowercase();

        let command = match kind.as_str() {
            "add" => {
                let timestamp_ns = match self.timestamp {
                    Some(ts) => ts
                        .timestamp_nanos_opt()
                        .ok_or(ReplayError::TimestampOutOfRange { row })?,
                    None => 0,
                };
                Command::Add(AddOrder {
                    order_id: self.order_id(row)?,
                    side: self.side(row)?,
                    price: decimal_field(row, "price", self.price.as_deref())?,
                    quantity: decimal_field(row, "quantity", self.quantity.as_deref())?,
                    timestamp_ns,
                })
            }
            "modify" => Command::Modify(ModifyOrder {
                order_id: self.order_id(row)?,
                new_quantity: decimal_field(row, "quantity", self.quantity.as_deref())?,
            }),
            "cancel" => Command::Cancel(CancelOrder {
                order_id: self.order_id(row)?,
            }),
            "trade" => return Ok(None),
            _ => {
                return Err(ReplayError::UnknownEventType {
                    row,
                    kind: self.r#type.clone(),
                })
            }
        };

        Ok(Some(command))
    }

    fn order_id(&self, row: u64) -> Result<String, ReplayError> {
        self.order_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or(ReplayError::MissingField { row, field: "order_id" })
    }

    fn side(&self, row: u64) -> Result<Side, ReplayError> {
        let raw = self
            .side
            .as_deref()
            .ok_or(ReplayError::MissingField { row, field: "side" })?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "buy" | "bid" | "b" => Ok(Side::Bid),
            "sell" | "ask" | "s" => Ok(Side::Ask),
            _ => Err(ReplayError::InvalidSide {
                row,
                value: raw.to_string(),
            }),
        }
    }
}

fn decimal_field(row: u64, field: &'static str, raw: Option<&str>) -> Result<Decimal, ReplayError> {
    let raw = raw
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ReplayError::MissingField { row, field })?;
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| ReplayError::InvalidNumber {
            row,
            field,
            value: raw.to_string(),
        })
}

/// A parsed event with its 1-based data row number.
pub type NumberedCommand = (u64, Command);

/// Lazily parse every command in a CSV stream, skipping trade rows.
pub fn read_commands<R: io::Read>(
    reader: R,
) -> impl Iterator<Item = Result<NumberedCommand, ReplayError>> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader)
        .into_deserialize::<EventRow>()
        .zip(1u64..)
        .filter_map(|(record, row)| {
            let parsed = record
                .map_err(ReplayError::from)
                .and_then(|event| event.to_command(row));
            match parsed {
                Ok(Some(command)) => Some(Ok((row, command))),
                Ok(None) => None,
                Err(err) => Some(Err(err)),
            }
        })
}

/// Counters from one replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Commands the book accepted
    pub applied: u64,
    /// Commands the book rejected (lenient mode only)
    pub rejected: u64,
}

/// Feed a command stream into `engine` in delivery order.
///
/// In strict mode the first rejected command aborts the replay; otherwise
/// rejections are counted and skipped. Malformed input always aborts.
pub fn replay<I>(engine: &mut Engine, commands: I, strict: bool) -> Result<ReplaySummary, ReplayError>
where
    I: IntoIterator<Item = Result<NumberedCommand, ReplayError>>,
{
    let mut summary = ReplaySummary::default();

    for item in commands {
        let (row, command) = item?;
        match engine.process_command(command) {
            Ok(_) => summary.applied += 1,
            Err(source) if strict => return Err(ReplayError::Rejected { row, source }),
            Err(_) => summary.rejected += 1,
        }
    }

    tracing::info!(
        symbol = %engine.book.symbol(),
        applied = summary.applied,
        rejected = summary.rejected,
        "replay finished"
    );
    Ok(summary)
}
