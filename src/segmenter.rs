//! Stride segmentation
//!
//! Cuts a trial into stride windows between consecutive heel strikes of one
//! reference side. Ipsilateral and contralateral channels are both read over
//! the same absolute window, so whatever phase offset exists between the legs
//! is preserved rather than assumed.

use crate::error::ComputeError;
use crate::events::SideEvents;
use crate::types::{GaitCycle, Side};
use std::ops::Range;

/// Stride segmenter for one reference side
pub struct StrideSegmenter;

impl StrideSegmenter {
    /// Build the stride windows for `side`
    pub fn segment(side: Side, events: &SideEvents, segment: usize) -> Vec<GaitCycle> {
        (0..events.stride_count())
            .map(|i| GaitCycle {
                reference_side: side,
                start_frame: events.heel_strikes[i],
                end_frame: events.heel_strikes[i + 1],
                duration_frames: events.durations[i],
                stride_index: i,
                segment,
            })
            .collect()
    }
}

/// Map a stride window onto a channel sampled at `channel_rate_hz`
///
/// Returns the half-open sample range covering `[start_frame, end_frame]`,
/// clipped to `channel_len`. The range may hold fewer than two samples.
pub fn remap_window(
    cycle: &GaitCycle,
    event_rate_hz: f64,
    channel_rate_hz: f64,
    channel_len: usize,
) -> Range<usize> {
    let scale = channel_rate_hz / event_rate_hz;
    let end = remap_frame(cycle.end_frame, scale)
        .saturating_add(1)
        .min(channel_len);
    let start = remap_frame(cycle.start_frame, scale).min(end);
    start..end
}

/// Like [`remap_window`], rejecting windows with fewer than two samples
pub fn channel_window(
    cycle: &GaitCycle,
    event_rate_hz: f64,
    channel_rate_hz: f64,
    channel_len: usize,
) -> Result<Range<usize>, ComputeError> {
    let window = remap_window(cycle, event_rate_hz, channel_rate_hz, channel_len);
    if window.len() < 2 {
        return Err(ComputeError::DegenerateStrideWindow(format!(
            "frames [{}, {}] leave {} samples of {}",
            cycle.start_frame,
            cycle.end_frame,
            window.len(),
            channel_len
        )));
    }
    Ok(window)
}

fn remap_frame(frame: usize, scale: f64) -> usize {
    if scale == 1.0 {
        frame
    } else {
        (frame as f64 * scale).round() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventExtractor;
    use crate::types::{EventSet, SideTable};
    use pretty_assertions::assert_eq;

    fn make_events() -> EventSet {
        EventSet {
            heel_strikes: SideTable::new(vec![50, 150, 252], vec![0, 100, 205, 300]),
            ..Default::default()
        }
    }

    #[test]
    fn test_left_reference_windows() {
        let sides = EventExtractor::extract(&make_events(), None);
        let strides = StrideSegmenter::segment(Side::Left, &sides.left, 0);

        assert_eq!(strides.len(), 2);
        assert_eq!((strides[0].start_frame, strides[0].end_frame), (50, 150));
        assert_eq!((strides[1].start_frame, strides[1].end_frame), (150, 252));
        assert_eq!(strides[1].duration_frames, 102.0);
        assert!(strides.iter().all(|s| s.reference_side == Side::Left));
    }

    #[test]
    fn test_right_reference_windows() {
        let sides = EventExtractor::extract(&make_events(), None);
        let strides = StrideSegmenter::segment(Side::Right, &sides.right, 0);

        assert_eq!(strides.len(), 3);
        let windows: Vec<(usize, usize)> = strides
            .iter()
            .map(|s| (s.start_frame, s.end_frame))
            .collect();
        assert_eq!(windows, vec![(0, 100), (100, 205), (205, 300)]);
        let durations: Vec<f64> = strides.iter().map(|s| s.duration_frames).collect();
        assert_eq!(durations, vec![100.0, 105.0, 95.0]);
        let indices: Vec<usize> = strides.iter().map(|s| s.stride_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_stride_count_limited_by_durations() {
        let mut events = make_events();
        events.stride_durations.right = Some(vec![100.0, 105.0, 95.0, 99.0]);
        let sides = EventExtractor::extract(&events, None);
        assert_eq!(
            StrideSegmenter::segment(Side::Right, &sides.right, 0).len(),
            3
        );
    }

    fn cycle(start: usize, end: usize) -> GaitCycle {
        GaitCycle {
            reference_side: Side::Right,
            start_frame: start,
            end_frame: end,
            duration_frames: (end - start) as f64,
            stride_index: 0,
            segment: 0,
        }
    }

    #[test]
    fn test_channel_window_same_rate() {
        assert_eq!(channel_window(&cycle(0, 100), 100.0, 100.0, 500).unwrap(), 0..101);
    }

    #[test]
    fn test_channel_window_remaps_rate() {
        assert_eq!(
            channel_window(&cycle(100, 205), 100.0, 1000.0, 5000).unwrap(),
            1000..2051
        );
    }

    #[test]
    fn test_channel_window_clips_to_length() {
        assert_eq!(channel_window(&cycle(100, 205), 100.0, 100.0, 150).unwrap(), 100..150);
    }

    #[test]
    fn test_degenerate_window_rejected() {
        assert!(matches!(
            channel_window(&cycle(100, 205), 100.0, 100.0, 101),
            Err(ComputeError::DegenerateStrideWindow(_))
        ));
        assert!(channel_window(&cycle(300, 400), 100.0, 100.0, 200).is_err());
        assert_eq!(remap_window(&cycle(300, 400), 100.0, 100.0, 200), 200..200);
    }
}
