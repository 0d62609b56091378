//! Picklist - one dispense instruction per transfer
//!
//! Rows are grouped by destination plate. Within a plate they are ordered by
//! source plate, then source row, column, and plate label; the order flips on
//! every other destination plate so the dispenser sweeps back and forth.

use std::io::Write;

use csv::WriterBuilder;

use crate::core::numeric::trim_decimal;
use crate::export::ExportError;
use crate::production::{ProductionResult, ProductionTransfer};

pub const HEADER: [&str; 6] = [
    "Source Label",
    "Source Well",
    "Destination Label",
    "Destination Well",
    "Volume",
    "Volume Unit",
];

pub const SAMPLE_ID_HEADER: &str = "Sample ID";

/// One line of the picklist
#[derive(Debug, Clone, PartialEq)]
pub struct PicklistRow {
    pub source_label: String,
    pub source_well: String,
    pub destination_label: String,
    pub destination_well: String,
    pub volume: f64,
    pub unit: &'static str,
    pub sample_id: String,

    source_key: (usize, usize, usize),
}

fn source_is_stock(result: &ProductionResult, transfer: &ProductionTransfer) -> bool {
    transfer
        .source_plate_index
        .and_then(|i| result.plates.iter().find(|p| p.index == i))
        .is_some_and(|p| p.is_stock())
}

/// Picklist rows of `result` in dispense order
pub fn picklist_rows(result: &ProductionResult) -> Vec<PicklistRow> {
    let mut destinations: Vec<_> = result.plates.iter().collect();
    destinations.sort_by_key(|p| p.index);

    let mut rows = Vec::new();
    for plate in destinations {
        let mut plate_rows: Vec<PicklistRow> = plate
            .wells
            .iter()
            .flat_map(|well| well.transfers.iter().map(move |t| (well, t)))
            .map(|(well, transfer)| {
                let (volume, unit) = if source_is_stock(result, transfer) {
                    (transfer.volume * 1e6, "uL")
                } else {
                    (transfer.volume * 1e9, "nL")
                };
                PicklistRow {
                    source_label: transfer.source_plate.clone(),
                    source_well: transfer.source_well.clone(),
                    destination_label: plate.label.clone(),
                    destination_well: well.label.clone(),
                    volume,
                    unit,
                    sample_id: transfer.sample_id.clone(),
                    source_key: (
                        transfer.source_plate_index.unwrap_or(usize::MAX),
                        transfer.source_row.unwrap_or(usize::MAX),
                        transfer.source_column.unwrap_or(usize::MAX),
                    ),
                }
            })
            .collect();

        plate_rows.sort_by(|a, b| {
            (a.source_key, &a.source_label).cmp(&(b.source_key, &b.source_label))
        });
        if plate.index % 2 == 1 {
            plate_rows.reverse();
        }
        rows.extend(plate_rows);
    }
    rows
}

/// Write the picklist as CSV
pub fn write_picklist<W: Write>(
    result: &ProductionResult,
    writer: W,
    include_sample_ids: bool,
) -> Result<(), ExportError> {
    let mut csv = WriterBuilder::new().from_writer(writer);

    let mut header: Vec<&str> = HEADER.to_vec();
    if include_sample_ids {
        header.push(SAMPLE_ID_HEADER);
    }
    csv.write_record(&header)?;

    for row in picklist_rows(result) {
        let volume = trim_decimal(row.volume, 3);
        let mut record = vec![
            row.source_label.as_str(),
            row.source_well.as_str(),
            row.destination_label.as_str(),
            row.destination_well.as_str(),
            volume.as_str(),
            row.unit,
        ];
        if include_sample_ids {
            record.push(row.sample_id.as_str());
        }
        csv.write_record(&record)?;
    }

    csv.flush()?;
    Ok(())
}

/// Picklist CSV as a string
pub fn picklist_to_string(
    result: &ProductionResult,
    include_sample_ids: bool,
) -> Result<String, ExportError> {
    super::to_string(|buffer| write_picklist(result, buffer, include_sample_ids))
}
