//! Recoverable allocation problems
//!
//! These never abort a run. They are rendered to text and collected in a
//! [`Report`](crate::core::report::Report).

use thiserror::Error;

use crate::core::report::Report;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AllocationIssue {
    #[error("Sample kind '{kind}' has no curve assigned")]
    MissingCurve { kind: String },

    #[error("Sample kind '{kind}' refers to curve '{curve}', which the bucket does not define")]
    UnknownCurve { kind: String, curve: String },

    #[error("Template refers to unknown sample kind '{kind}'")]
    UnknownKind { kind: String },

    #[error(
        "Curve '{curve}' needs {volume_ul} uL intermediate wells but {labware} holds {capacity_ul} uL"
    )]
    IntermediateVolume {
        curve: String,
        labware: String,
        volume_ul: String,
        capacity_ul: String,
    },

    #[error("Template well {well} asks for point {point} of kind '{kind}', whose curve has {points} points")]
    PointOutOfRange {
        well: String,
        kind: String,
        point: usize,
        points: usize,
    },

    #[error("Template well {well} lies outside the {labware} assay plate")]
    TemplateOutOfBounds { well: String, labware: String },

    #[error("Control kind '{kind}' was supplied {count} samples; only '{used}' is used")]
    DuplicateControl {
        kind: String,
        count: usize,
        used: String,
    },

    #[error("Control kind '{kind}' is used by the template but no sample was supplied")]
    MissingControl { kind: String },

    #[error("Sample '{sample}' has no kind used by the template")]
    UnusedSample { sample: String },

    #[error("Sample '{sample}': no source at {concentration} M to draw from; transfer skipped")]
    MissingParent { sample: String, concentration: String },

    #[error("Sample '{sample}': a {volume_nl} nL draw exceeds the usable volume of one well")]
    OversizedUse { sample: String, volume_nl: String },

    #[error("Plate {label} needs {wells} wells but {labware} holds {capacity}; plate dropped")]
    PlateOverflow {
        label: String,
        labware: String,
        wells: usize,
        capacity: usize,
    },
}

impl AllocationIssue {
    /// Whether the issue is reported as a warning rather than an error
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            AllocationIssue::MissingControl { .. } | AllocationIssue::UnusedSample { .. }
        )
    }

    /// Add the issue to `report` under the matching severity
    pub fn record(self, report: &mut Report) {
        if self.is_warning() {
            report.warning(self);
        } else {
            report.error(self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let issue = AllocationIssue::PlateOverflow {
            label: "INT1".to_string(),
            labware: "384LDV".to_string(),
            wells: 400,
            capacity: 384,
        };
        assert_eq!(
            issue.to_string(),
            "Plate INT1 needs 400 wells but 384LDV holds 384; plate dropped"
        );
        assert!(!issue.is_warning());
    }

    #[test]
    fn test_missing_control_is_warning() {
        let issue = AllocationIssue::MissingControl {
            kind: "pos".to_string(),
        };
        assert!(issue.is_warning());

        let mut report = Report::new();
        issue.record(&mut report);
        assert!(!report.has_errors());
        assert_eq!(report.warnings().len(), 1);
    }
}
