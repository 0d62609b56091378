//! Well packer - greedy bin packing of draws into source wells

use tracing::debug;

use crate::core::numeric::VOLUME_EPSILON;
use crate::core::report::Report;
use crate::production::graph::{Consumer, SourceGraph, SourceId, SourceWell, UseId, WellId};
use crate::production::issue::AllocationIssue;

/// Open a new well for `source`, drawing its blueprint from the parents
fn open_well(graph: &mut SourceGraph, source: SourceId) -> WellId {
    let id = WellId(graph.wells.len());
    let s = &graph.sources[source.0];
    let blueprint = s.blueprint.clone();
    graph.wells.push(SourceWell {
        source,
        volume: s.volume,
        dead_volume: s.dead_volume,
        used: 0.0,
        consumes: Vec::with_capacity(blueprint.len()),
        serves: Vec::new(),
    });
    graph.sources[source.0].wells.push(id);

    for entry in blueprint {
        let concentration = graph.sources[entry.parent.0].concentration;
        let draw = graph.add_use(
            Some(entry.parent),
            Consumer::Well(id),
            entry.volume,
            concentration,
        );
        graph.wells[id.0].consumes.push(draw);
    }
    id
}

fn commit(graph: &mut SourceGraph, well: WellId, draw: UseId) {
    let volume = graph.uses[draw.0].volume;
    graph.uses[draw.0].well = Some(well);
    let w = &mut graph.wells[well.0];
    w.used += volume;
    w.serves.push(draw);
}

/// Pack the draws of `source` into wells in arrival order.
///
/// Draws go into the newest well until one no longer fits, then a new well
/// is opened. A draw larger than a whole well is recorded and left unserved.
pub fn pack(graph: &mut SourceGraph, source: SourceId, report: &mut Report) -> Vec<WellId> {
    let draws = graph.sources[source.0].uses.clone();
    let capacity = graph.sources[source.0].usable_volume();
    let mut current: Option<WellId> = None;

    for draw in draws {
        let volume = graph.uses[draw.0].volume;
        let well = match current {
            Some(w) if graph.wells[w.0].available() + VOLUME_EPSILON >= volume => w,
            _ => {
                if volume > capacity + VOLUME_EPSILON {
                    AllocationIssue::OversizedUse {
                        sample: graph.sources[source.0].sample_id.clone(),
                        volume_nl: format!("{}", volume * 1e9),
                    }
                    .record(report);
                    continue;
                }
                let w = open_well(graph, source);
                current = Some(w);
                w
            }
        };
        commit(graph, well, draw);
    }

    graph.sources[source.0].wells.clone()
}

/// Pack every source, deepest first, so each well's parent draws exist
/// before its parents are packed.
pub fn pack_all(graph: &mut SourceGraph, report: &mut Report) {
    let mut order: Vec<SourceId> = graph.sources().map(|(id, _)| id).collect();
    order.sort_by_key(|id| std::cmp::Reverse(graph.source(*id).depth));

    for source in order {
        let wells = pack(graph, source, report);
        debug!(
            sample = %graph.source(source).sample_id,
            depth = graph.source(source).depth,
            wells = wells.len(),
            "source packed"
        );
    }
}
