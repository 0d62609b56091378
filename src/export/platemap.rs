//! Platemap - one record per physical well of every plate

use std::io::Write;

use csv::WriterBuilder;

use crate::core::numeric::trim_decimal;
use crate::export::ExportError;
use crate::production::{ProductionPlate, ProductionResult};

pub const HEADER: [&str; 8] = [
    "Plate Label",
    "Well Label",
    "Sample ID",
    "Sample Kind",
    "Volume",
    "Volume Unit",
    "Concentration",
    "Concentration Unit",
];

#[derive(Debug, Clone, PartialEq)]
pub struct PlatemapRow {
    pub plate_label: String,
    pub well_label: String,
    pub sample_id: String,
    pub kind: String,
    pub volume: f64,
    pub volume_unit: &'static str,

    /// Concentration in micromolar
    pub concentration: f64,
}

fn plate_rows(plate: &ProductionPlate) -> impl Iterator<Item = PlatemapRow> + '_ {
    let (scale, volume_unit) = if plate.is_stock() {
        (1e6, "uL")
    } else {
        (1e9, "nL")
    };

    let mut wells: Vec<_> = plate.wells.iter().collect();
    wells.sort_by_key(|w| (w.column, w.row));

    wells.into_iter().map(move |well| PlatemapRow {
        plate_label: plate.label.clone(),
        well_label: well.label.clone(),
        sample_id: well.sample_id.clone(),
        kind: well.kind.clone(),
        volume: well.volume * scale,
        volume_unit,
        concentration: well.concentration * 1e6,
    })
}

/// Every well of every plate, plates in index order, wells column-major
pub fn platemap_rows(result: &ProductionResult) -> Vec<PlatemapRow> {
    let mut plates: Vec<_> = result.plates.iter().collect();
    plates.sort_by_key(|p| p.index);
    plates.into_iter().flat_map(plate_rows).collect()
}

pub fn write_platemap<W: Write>(result: &ProductionResult, writer: W) -> Result<(), ExportError> {
    let mut csv = WriterBuilder::new().from_writer(writer);
    csv.write_record(HEADER)?;

    for row in platemap_rows(result) {
        let volume = trim_decimal(row.volume, 3);
        let concentration = trim_decimal(row.concentration, 6);
        csv.write_record([
            row.plate_label.as_str(),
            row.well_label.as_str(),
            row.sample_id.as_str(),
            row.kind.as_str(),
            volume.as_str(),
            row.volume_unit,
            concentration.as_str(),
            "uM",
        ])?;
    }

    csv.flush()?;
    Ok(())
}

/// Platemap CSV as a string
pub fn platemap_to_string(result: &ProductionResult) -> Result<String, ExportError> {
    super::to_string(|buffer| write_platemap(result, buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::production::{Labware, PlateRole, ProductionWell};
    use chrono::Utc;

    fn well(label: &str, row: usize, column: usize, volume: f64, concentration: f64) -> ProductionWell {
        ProductionWell {
            label: label.to_string(),
            row,
            column,
            sample_id: "S1".to_string(),
            kind: "stock".to_string(),
            volume,
            concentration,
            transfers: Vec::new(),
        }
    }

    #[test]
    fn test_units_and_order() {
        let result = ProductionResult {
            errors: Vec::new(),
            warnings: Vec::new(),
            plates: vec![
                ProductionPlate {
                    index: 1,
                    label: "INT1".to_string(),
                    role: PlateRole::Intermediate,
                    depth: Some(1),
                    labware: Labware::source_384ldv(),
                    wells: vec![
                        well("A2", 0, 1, 11e-6, 1e-4),
                        well("A1", 0, 0, 10.5e-6, 5e-4),
                    ],
                },
                ProductionPlate {
                    index: 0,
                    label: "NARP".to_string(),
                    role: PlateRole::Stock,
                    depth: Some(0),
                    labware: Labware::source_384pp(),
                    wells: vec![well("A1", 0, 0, 16.25e-6, 10e-3)],
                },
            ],
            created: Utc::now(),
        };

        let rows = platemap_rows(&result);
        assert_eq!(rows[0].plate_label, "NARP");
        assert_eq!(rows[0].volume_unit, "uL");
        assert!((rows[0].volume - 16.25).abs() < 1e-9);
        assert_eq!(rows[1].well_label, "A1");
        assert_eq!(rows[2].well_label, "A2");
        assert_eq!(rows[2].volume_unit, "nL");

        let text = platemap_to_string(&result).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], HEADER.join(","));
        assert_eq!(lines[1], "NARP,A1,S1,stock,16.25,uL,10000,uM");
        assert_eq!(lines[3], "INT1,A2,S1,stock,11000,nL,100,uM");
    }
}
