//! Event extraction
//!
//! Pulls per-side heel strikes and stride durations out of an [`EventSet`],
//! optionally restricted to one segment window of the trial.

use crate::error::ComputeError;
use crate::types::{EventSet, SegmentWindow, Side, SideTable};

/// Heel strikes and stride durations for one side of one segment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideEvents {
    /// Heel-strike frames inside the segment
    pub heel_strikes: Vec<usize>,
    /// Stride durations in frames, one per stride starting at `heel_strikes[i]`
    pub durations: Vec<f64>,
    /// True when durations were derived from heel-strike differences
    pub durations_derived: bool,
}

impl SideEvents {
    /// Number of strides this side can produce
    pub fn stride_count(&self) -> usize {
        self.heel_strikes
            .len()
            .saturating_sub(1)
            .min(self.durations.len())
    }

    /// Fail with `InsufficientEvents` when fewer than two heel strikes remain
    pub fn require_strides(&self, side: Side) -> Result<(), ComputeError> {
        if self.heel_strikes.len() < 2 {
            return Err(ComputeError::InsufficientEvents(format!(
                "{} heel strikes for {} side",
                self.heel_strikes.len(),
                side.as_str()
            )));
        }
        Ok(())
    }
}

/// Event extractor for heel strikes and stride durations
pub struct EventExtractor;

impl EventExtractor {
    /// Segment windows to process; `None` stands for the whole trial
    pub fn segments(events: &EventSet) -> Vec<Option<&SegmentWindow>> {
        if events.segments.is_empty() {
            vec![None]
        } else {
            events.segments.iter().map(Some).collect()
        }
    }

    /// Extract both sides, filtered to `window` when given
    pub fn extract(events: &EventSet, window: Option<&SegmentWindow>) -> SideTable<SideEvents> {
        SideTable::new(
            extract_side(events, Side::Left, window),
            extract_side(events, Side::Right, window),
        )
    }
}

fn extract_side(events: &EventSet, side: Side, window: Option<&SegmentWindow>) -> SideEvents {
    let strikes = &events.heel_strikes[side];
    let in_window =
        |frame: usize| window.map_or(true, |w| frame >= w.start && frame <= w.end);

    let kept: Vec<usize> = (0..strikes.len())
        .filter(|&i| in_window(strikes[i]))
        .collect();
    let heel_strikes: Vec<usize> = kept.iter().map(|&i| strikes[i]).collect();

    // Precomputed durations are paired by index with the unfiltered heel strikes
    let aligned = events.stride_durations[side].as_ref().filter(|d| {
        !strikes.is_empty() && (d.len() == strikes.len() || d.len() + 1 == strikes.len())
    });

    match aligned {
        Some(durations) => {
            let mut selected: Vec<f64> = kept
                .iter()
                .filter_map(|&i| durations.get(i).copied())
                .collect();
            selected.truncate(heel_strikes.len().saturating_sub(1));
            SideEvents {
                heel_strikes,
                durations: selected,
                durations_derived: false,
            }
        }
        None => {
            if events.stride_durations[side].is_some() {
                tracing::debug!(
                    side = side.as_str(),
                    "stride durations do not align with heel strikes, deriving from differences"
                );
            }
            let durations = heel_strikes
                .windows(2)
                .map(|w| (w[1] - w[0]) as f64)
                .collect();
            SideEvents {
                heel_strikes,
                durations,
                durations_derived: true,
            }
        }
    }
}
