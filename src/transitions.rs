//! SOI transitions and frame stitching
//!
//! A trajectory that crosses sphere-of-influence boundaries is a sequence
//! of runs, each expressed relative to a different body. For display the
//! runs are split apart and joined by short connector segments whose two
//! endpoints are expressed in the frame of the nearest body both sides
//! share, using body positions at the crossing time.

use crate::bodies::{BodyHierarchy, BodyId, EphemerisSnapshot};
use crate::error::{EngineError, Result};
use crate::propagation::state::TrajectorySample;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Dominant-body change between two consecutive samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoiTransition {
    /// Index of the first sample relative to `to`
    pub index: usize,

    /// Elapsed time of that sample
    pub time: f64,

    pub from: BodyId,
    pub to: BodyId,
}

/// Every place where consecutive samples change dominant body
pub fn find_transitions(samples: &[TrajectorySample]) -> Vec<SoiTransition> {
    samples
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[0].dominant_body != pair[1].dominant_body)
        .map(|(i, pair)| SoiTransition {
            index: i + 1,
            time: pair[1].time,
            from: pair[0].dominant_body,
            to: pair[1].dominant_body,
        })
        .collect()
}

/// First body shared by the parent chains of `a` and `b`
///
/// A body counts as its own ancestor, so `common_ancestor(moon, earth)`
/// in a tree where the Moon hangs off Earth is Earth.
pub fn common_ancestor<H: BodyHierarchy + ?Sized>(a: BodyId, b: BodyId, hierarchy: &H) -> Option<BodyId> {
    let chain_b = hierarchy.lineage(b);
    hierarchy.lineage(a).into_iter().find(|id| chain_b.contains(id))
}

/// Contiguous run of samples relative to one body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub body: BodyId,

    /// Sample indices covered
    pub range: Range<usize>,
}

impl Segment {
    pub fn samples<'a>(&self, all: &'a [TrajectorySample]) -> &'a [TrajectorySample] {
        &all[self.range.clone()]
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Cut the sample sequence at each transition (N transitions → N + 1 segments)
pub fn split_segments(samples: &[TrajectorySample], transitions: &[SoiTransition]) -> Vec<Segment> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };

    let mut segments = Vec::with_capacity(transitions.len() + 1);
    let mut start = 0;
    let mut body = first.dominant_body;
    for transition in transitions {
        let cut = transition.index.min(samples.len());
        segments.push(Segment {
            body,
            range: start..cut,
        });
        start = cut;
        body = transition.to;
    }
    segments.push(Segment {
        body,
        range: start..samples.len(),
    });
    segments
}

/// Output of [`stitch`]
#[derive(Debug, Clone, PartialEq)]
pub enum StitchedSegment {
    /// Original samples, still relative to `body`
    Trajectory { body: BodyId, range: Range<usize> },

    /// Bridge across an SOI boundary, endpoints relative to `frame`
    Connector {
        frame: BodyId,
        from_body: BodyId,
        to_body: BodyId,
        start: Vector3<f64>,
        end: Vector3<f64>,
        start_time: f64,
        end_time: f64,
    },
}

impl StitchedSegment {
    pub fn is_connector(&self) -> bool {
        matches!(self, StitchedSegment::Connector { .. })
    }
}

/// Interleave segments with connectors (S segments → 2S − 1 outputs)
///
/// `epoch` is the absolute simulation time of elapsed time zero. Body
/// positions for each connector are taken from `snapshot` extrapolated to
/// the crossing.
pub fn stitch(
    samples: &[TrajectorySample],
    segments: &[Segment],
    snapshot: &EphemerisSnapshot,
    epoch: f64,
) -> Result<Vec<StitchedSegment>> {
    let mut output = Vec::with_capacity(segments.len() * 2);

    for (i, segment) in segments.iter().enumerate() {
        output.push(StitchedSegment::Trajectory {
            body: segment.body,
            range: segment.range.clone(),
        });

        let Some(next) = segments.get(i + 1) else {
            break;
        };
        let (Some(last), Some(first)) = (
            segment.range.end.checked_sub(1).and_then(|k| samples.get(k)),
            samples.get(next.range.start),
        ) else {
            return Err(EngineError::InvalidRequest(format!(
                "segment boundary {} outside {} samples",
                next.range.start,
                samples.len()
            )));
        };

        let frame = common_ancestor(segment.body, next.body, snapshot).ok_or_else(|| {
            EngineError::InvalidRequest(format!("{} and {} share no ancestor", segment.body, next.body))
        })?;

        let at_crossing = snapshot.advanced(epoch + first.time - snapshot.sim_time);
        let frame_pos = at_crossing.global_position(frame)?;
        let start = last.position + at_crossing.global_position(segment.body)? - frame_pos;
        let end = first.position + at_crossing.global_position(next.body)? - frame_pos;

        output.push(StitchedSegment::Connector {
            frame,
            from_body: segment.body,
            to_body: next.body,
            start,
            end,
            start_time: last.time,
            end_time: first.time,
        });
    }

    Ok(output)
}
