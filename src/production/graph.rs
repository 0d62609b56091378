//! Sample source graph
//!
//! Every distinct liquid the protocol needs (a stock, an intermediate
//! dilution, the solvent) is a [`SampleSource`]. Sources, the physical wells
//! that hold them, and the volume draws ("uses") between them live in owning
//! vectors and refer to each other by index. Sources are deduplicated per
//! sample id by concentration and well volume.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::core::numeric::{is_close, VOLUME_EPSILON, SOURCE_MATCH_TOLERANCE};
use crate::core::report::Report;
use crate::curve::{DilutionCurve, DilutionPoint, DilutionTransfer};
use crate::production::issue::AllocationIssue;
use crate::production::model::Bucket;

/// Index of a source in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceId(pub usize);

/// Index of a physical well in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WellId(pub usize);

/// Index of a volume draw in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UseId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceRole {
    /// Original stock, delivered on the nARP plate
    Stock,
    /// Dilution made from other sources
    Intermediate,
    /// Pure solvent for normalization padding
    Solvent,
}

impl std::fmt::Display for SourceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceRole::Stock => write!(f, "stock"),
            SourceRole::Intermediate => write!(f, "intermediate"),
            SourceRole::Solvent => write!(f, "solvent"),
        }
    }
}

/// What a draw of liquid goes into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumer {
    /// A well of an assay-ready plate
    Arp { plate: usize, well: usize },
    /// A source well being made
    Well(WellId),
}

/// One parent draw needed to make a well of a source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlueprintEntry {
    pub parent: SourceId,
    pub volume: f64,
}

/// A volume drawn from a source into a consumer
#[derive(Debug, Clone, PartialEq)]
pub struct SourceUse {
    /// `None` when the parent could not be resolved
    pub source: Option<SourceId>,
    pub consumer: Consumer,
    pub volume: f64,

    /// Concentration the draw was asked for
    pub concentration: f64,

    /// Well the draw is served from, once packed
    pub well: Option<WellId>,
}

/// A distinct liquid: one sample at one concentration
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSource {
    pub sample_id: String,
    pub concentration: f64,

    /// Volume of one well of this source
    pub volume: f64,
    pub dead_volume: f64,
    pub depth: usize,
    pub role: SourceRole,

    /// Parent draws that make one well
    pub blueprint: Vec<BlueprintEntry>,

    /// Draws from this source, in arrival order
    pub uses: Vec<UseId>,

    /// Wells packed for this source
    pub wells: Vec<WellId>,
}

impl SampleSource {
    /// Volume one well can give before hitting dead volume
    pub fn usable_volume(&self) -> f64 {
        (self.volume - self.dead_volume).max(0.0)
    }
}

/// A physical well holding one source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceWell {
    pub source: SourceId,
    pub volume: f64,
    pub dead_volume: f64,

    /// Volume committed to draws
    pub used: f64,

    /// Draws that make this well
    pub consumes: Vec<UseId>,

    /// Draws served from this well
    pub serves: Vec<UseId>,
}

impl SourceWell {
    /// Volume still free for draws
    pub fn available(&self) -> f64 {
        self.volume - self.dead_volume - self.used
    }
}

/// Well volumes the graph gives new sources
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceVolumes {
    pub stock_volume: f64,
    pub stock_dead_volume: f64,
    pub intermediate_dead_volume: f64,
    pub solvent_volume: f64,
}

impl SourceVolumes {
    pub fn from_bucket(bucket: &Bucket) -> Self {
        Self {
            stock_volume: bucket.narp_labware.well_volume,
            stock_dead_volume: bucket.narp_labware.dead_volume,
            intermediate_dead_volume: bucket.intermediate_labware.dead_volume,
            solvent_volume: bucket.intermediate_labware.well_volume,
        }
    }
}

/// Arena of sources, wells, and uses for one allocation run
#[derive(Debug, Clone)]
pub struct SourceGraph {
    volumes: SourceVolumes,
    solvent_name: String,
    pub(crate) sources: Vec<SampleSource>,
    pub(crate) wells: Vec<SourceWell>,
    pub(crate) uses: Vec<SourceUse>,
    by_sample: HashMap<String, Vec<SourceId>>,
    solvent: Option<SourceId>,
}

impl SourceGraph {
    pub fn new(volumes: SourceVolumes, solvent_name: impl Into<String>) -> Self {
        Self {
            volumes,
            solvent_name: solvent_name.into(),
            sources: Vec::new(),
            wells: Vec::new(),
            uses: Vec::new(),
            by_sample: HashMap::new(),
            solvent: None,
        }
    }

    pub fn source(&self, id: SourceId) -> &SampleSource {
        &self.sources[id.0]
    }

    pub fn well(&self, id: WellId) -> &SourceWell {
        &self.wells[id.0]
    }

    pub fn usage(&self, id: UseId) -> &SourceUse {
        &self.uses[id.0]
    }

    pub fn sources(&self) -> impl Iterator<Item = (SourceId, &SampleSource)> {
        self.sources.iter().enumerate().map(|(i, s)| (SourceId(i), s))
    }

    pub fn wells(&self) -> impl Iterator<Item = (WellId, &SourceWell)> {
        self.wells.iter().enumerate().map(|(i, w)| (WellId(i), w))
    }

    pub fn uses(&self) -> impl Iterator<Item = (UseId, &SourceUse)> {
        self.uses.iter().enumerate().map(|(i, u)| (UseId(i), u))
    }

    /// The solvent source, if any well needed padding
    pub fn solvent(&self) -> Option<SourceId> {
        self.solvent
    }

    /// Existing source of `sample_id` at `concentration` (and `volume`, if given)
    pub fn find_source(
        &self,
        sample_id: &str,
        concentration: f64,
        volume: Option<f64>,
    ) -> Option<SourceId> {
        self.by_sample.get(sample_id)?.iter().copied().find(|&id| {
            let source = &self.sources[id.0];
            is_close(source.concentration, concentration, SOURCE_MATCH_TOLERANCE)
                && volume.map_or(true, |v| is_close(source.volume, v, SOURCE_MATCH_TOLERANCE))
        })
    }

    /// Parent source of a `curve` transfer drawn from `concentration`.
    ///
    /// Matches the well volume the curve implies for that concentration, so
    /// curves sharing a concentration at different volumes stay apart.
    fn find_parent(
        &self,
        sample_id: &str,
        curve: &DilutionCurve,
        concentration: f64,
    ) -> Option<SourceId> {
        let volume = if is_close(concentration, curve.source_concentration, SOURCE_MATCH_TOLERANCE) {
            Some(self.volumes.stock_volume)
        } else {
            curve
                .find_intermediate(concentration)
                .map(|(_, point)| curve.well_volume(point, self.volumes.stock_volume))
        };
        self.find_source(sample_id, concentration, volume)
    }

    fn push_source(&mut self, source: SampleSource) -> SourceId {
        let id = SourceId(self.sources.len());
        self.by_sample
            .entry(source.sample_id.clone())
            .or_default()
            .push(id);
        self.sources.push(source);
        id
    }

    /// Source realizing `point` of `curve` for one sample.
    ///
    /// Returns an existing source when one matches; otherwise resolves each
    /// transfer to a parent source and creates a new one. Unresolvable
    /// transfers are recorded and left out of the blueprint.
    pub fn init_point(
        &mut self,
        sample_id: &str,
        point: &DilutionPoint,
        curve: &DilutionCurve,
        report: &mut Report,
    ) -> SourceId {
        let volume = curve.well_volume(point, self.volumes.stock_volume);
        if let Some(existing) = self.find_source(sample_id, point.actual, Some(volume)) {
            return existing;
        }

        let mut blueprint = Vec::with_capacity(point.transfers.len());
        for transfer in &point.transfers {
            match self.find_parent(sample_id, curve, transfer.source_concentration) {
                Some(parent) => blueprint.push(BlueprintEntry {
                    parent,
                    volume: transfer.volume,
                }),
                None => missing_parent(sample_id, transfer, report),
            }
        }

        let depth = blueprint
            .iter()
            .map(|entry| self.sources[entry.parent.0].depth + 1)
            .max()
            .unwrap_or(0);
        let (role, dead_volume) = if point.transfers.is_empty() {
            (SourceRole::Stock, self.volumes.stock_dead_volume)
        } else {
            (SourceRole::Intermediate, self.volumes.intermediate_dead_volume)
        };

        let id = self.push_source(SampleSource {
            sample_id: sample_id.to_string(),
            concentration: point.actual,
            volume,
            dead_volume,
            depth,
            role,
            blueprint,
            uses: Vec::new(),
            wells: Vec::new(),
        });
        debug!(sample = sample_id, concentration = point.actual, depth, "source created");
        id
    }

    /// Seed the stock and every intermediate of `curve` for one sample.
    ///
    /// Returns the stock source.
    pub fn init_curve(
        &mut self,
        sample_id: &str,
        curve: &DilutionCurve,
        report: &mut Report,
    ) -> SourceId {
        let stock = self.init_point(sample_id, &curve.top_point(), curve, report);
        for plate in &curve.intermediate_points {
            for point in plate {
                self.init_point(sample_id, point, curve, report);
            }
        }
        stock
    }

    /// Record a draw from `source` (or from nowhere) into `consumer`
    pub(crate) fn add_use(
        &mut self,
        source: Option<SourceId>,
        consumer: Consumer,
        volume: f64,
        concentration: f64,
    ) -> UseId {
        let id = UseId(self.uses.len());
        self.uses.push(SourceUse {
            source,
            consumer,
            volume,
            concentration,
            well: None,
        });
        if let Some(source) = source {
            self.sources[source.0].uses.push(id);
        }
        id
    }

    fn solvent_source(&mut self) -> SourceId {
        if let Some(id) = self.solvent {
            return id;
        }
        let name = self.solvent_name.clone();
        let id = self.push_source(SampleSource {
            sample_id: name,
            concentration: 0.0,
            volume: self.volumes.solvent_volume,
            dead_volume: self.volumes.intermediate_dead_volume,
            depth: 1,
            role: SourceRole::Solvent,
            blueprint: Vec::new(),
            uses: Vec::new(),
            wells: Vec::new(),
        });
        self.solvent = Some(id);
        id
    }

    /// Move the solvent source to the plate depth hosting it
    pub(crate) fn set_solvent_depth(&mut self, depth: usize) {
        if let Some(id) = self.solvent {
            self.sources[id.0].depth = depth;
        }
    }

    /// Resolve the transfers of one assay well of `curve` into draws.
    ///
    /// A draw whose parent is missing is recorded and kept without a source
    /// so the well still shows it. A positive `solvent_volume` adds a draw
    /// from the solvent source.
    pub fn use_arp_point(
        &mut self,
        sample_id: &str,
        curve: &DilutionCurve,
        consumer: Consumer,
        transfers: &[DilutionTransfer],
        solvent_volume: f64,
        report: &mut Report,
    ) -> Vec<UseId> {
        let mut added = Vec::with_capacity(transfers.len() + 1);

        for transfer in transfers {
            let parent = self.find_parent(sample_id, curve, transfer.source_concentration);
            if parent.is_none() {
                missing_parent(sample_id, transfer, report);
            }
            added.push(self.add_use(
                parent,
                consumer,
                transfer.volume,
                transfer.source_concentration,
            ));
        }

        if solvent_volume > VOLUME_EPSILON {
            let solvent = self.solvent_source();
            added.push(self.add_use(Some(solvent), consumer, solvent_volume, 0.0));
        }
        added
    }

    /// Deepest source depth, ignoring the solvent
    pub fn max_depth(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| s.role != SourceRole::Solvent)
            .map(|s| s.depth)
            .max()
            .unwrap_or(0)
    }
}

fn missing_parent(sample_id: &str, transfer: &DilutionTransfer, report: &mut Report) {
    AllocationIssue::MissingParent {
        sample: sample_id.to_string(),
        concentration: format!("{:.4e}", transfer.source_concentration),
    }
    .record(report);
}
