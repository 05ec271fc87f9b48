//! Pipeline orchestration
//!
//! This module provides the public API for Gait Flux.
//! It runs trial recordings through the full pipeline and returns the
//! phase-normalized table along with every unit of work that was skipped.
//!
//! Per-stride stages:
//! 1. EventExtractor - Filter heel strikes and stride durations per segment
//! 2. StrideSegmenter - Cut stride windows for each reference side
//! 3. Resampler - Remap the window to each channel rate and resample to N
//! 4. Corrections - Foot angle and incline ankle offset/sign fixes
//! 5. KinematicChain - Derive segment angles
//! 6. VelocityEstimator - Angular velocities
//! 7. RowAssembler - Write the stride block
//!
//! Trials, and the strides within a trial, are processed in parallel. Results
//! are collected in input order: trial, then the left pass, then the right
//! pass, each in segment and stride order.

use crate::assembler::{
    OutputChannel, PhaseTable, RowAssembler, StrideBlock, StrideSource, TableSchema,
};
use crate::config::PipelineConfig;
use crate::corrections::{correct_foot_angle, correct_incline_ankle};
use crate::error::ComputeError;
use crate::events::{EventExtractor, SideEvents};
use crate::kinematics::{ChainInputs, KinematicChain};
use crate::resample::resample;
use crate::schema::{RawTrial, TrialAdapter};
use crate::segmenter::{channel_window, remap_window, StrideSegmenter};
use crate::types::{
    ChannelKind, GaitCycle, Role, Side, SideTable, SignalGroup, SkipReason, SkippedUnit,
    TrialRecording, Unit,
};
use crate::velocity::VelocityEstimator;
use rayon::prelude::*;
use std::ops::Range;
use std::sync::Arc;

/// Standard gravity used for body-weight normalization (m/s²)
pub const GRAVITY: f64 = 9.81;

const MOMENT_CHANNELS: [(ChannelKind, OutputChannel); 3] = [
    (ChannelKind::HipFlexionMoment, OutputChannel::HipFlexionMoment),
    (ChannelKind::KneeFlexionMoment, OutputChannel::KneeFlexionMoment),
    (
        ChannelKind::AnkleDorsiflexionMoment,
        OutputChannel::AnkleDorsiflexionMoment,
    ),
];

const FORCE_CHANNELS: [(ChannelKind, OutputChannel); 3] = [
    (ChannelKind::VerticalForce, OutputChannel::GrfVertical),
    (ChannelKind::AnteriorForce, OutputChannel::GrfAnterior),
    (ChannelKind::LateralForce, OutputChannel::GrfLateral),
];

/// Rows produced by a run, with the units of work that were skipped
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub table: PhaseTable,
    pub skipped: Vec<SkippedUnit>,
}

/// Stride blocks and skips produced by one trial
#[derive(Debug, Clone, Default)]
pub struct TrialOutput {
    pub blocks: Vec<StrideBlock>,
    pub skipped: Vec<SkippedUnit>,
}

/// Run typed trial recordings through the pipeline.
///
/// # Example
/// ```ignore
/// let output = process_trials(&trials, &PipelineConfig::default())?;
/// println!("{} rows", output.table.row_count());
/// ```
pub fn process_trials(
    trials: &[TrialRecording],
    config: &PipelineConfig,
) -> Result<PipelineOutput, ComputeError> {
    GaitProcessor::new(config.clone())?.process(trials)
}

/// Parse gait.trial.v1 JSON (array or NDJSON) and run it through the pipeline.
///
/// Trials rejected by schema validation are reported as skipped, not as errors.
pub fn transform_json(input: &str, config: &PipelineConfig) -> Result<PipelineOutput, ComputeError> {
    GaitProcessor::new(config.clone())?.process_json(input)
}

/// Processor bound to one configuration and its output schema
pub struct GaitProcessor {
    config: PipelineConfig,
    schema: TableSchema,
}

impl GaitProcessor {
    pub fn new(config: PipelineConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        let schema = TableSchema::new(&config);
        Ok(Self { config, schema })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Parse and process gait.trial.v1 JSON
    pub fn process_json(&self, input: &str) -> Result<PipelineOutput, ComputeError> {
        let raws = TrialAdapter::parse(input)?;
        self.process_raw(&raws)
    }

    /// Process parsed trials; trials failing conversion are listed first as skips
    pub fn process_raw(&self, raws: &[RawTrial]) -> Result<PipelineOutput, ComputeError> {
        let mut recordings = Vec::with_capacity(raws.len());
        let mut rejected = Vec::new();
        for raw in raws {
            match TrialAdapter::to_recording(raw) {
                Ok(recording) => recordings.push(recording),
                Err(e) => {
                    tracing::warn!(
                        subject = %raw.subject,
                        task_id = %raw.task.task_id,
                        error = %e,
                        "rejecting trial"
                    );
                    rejected.push(SkippedUnit::new(
                        raw.subject.as_str(),
                        raw.task.task_id.as_str(),
                        SkipReason::InvalidTrial {
                            message: e.to_string(),
                        },
                    ));
                }
            }
        }

        let mut output = self.process(&recordings)?;
        rejected.append(&mut output.skipped);
        output.skipped = rejected;
        Ok(output)
    }

    /// Process a batch of trials
    pub fn process(&self, trials: &[TrialRecording]) -> Result<PipelineOutput, ComputeError> {
        let outputs = if self.config.workers > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.workers)
                .build()
                .map_err(|e| {
                    ComputeError::InvalidConfig(format!("Failed to create worker pool: {e}"))
                })?;
            pool.install(|| self.process_all(trials))
        } else {
            self.process_all(trials)
        };

        let mut assembler = RowAssembler::new(self.schema.clone());
        let mut skipped = Vec::new();
        for output in outputs {
            assembler.extend(output.blocks);
            skipped.extend(output.skipped);
        }
        let table = assembler.finish();

        tracing::info!(
            trials = trials.len(),
            strides = table.stride_count(),
            rows = table.row_count(),
            skipped = skipped.len(),
            "pipeline run complete"
        );
        Ok(PipelineOutput { table, skipped })
    }

    fn process_all(&self, trials: &[TrialRecording]) -> Vec<TrialOutput> {
        trials
            .par_iter()
            .map(|trial| self.process_trial(trial))
            .collect()
    }

    /// Process one trial; failures never escape as errors
    pub fn process_trial(&self, trial: &TrialRecording) -> TrialOutput {
        if let Err(e) = trial.validate() {
            tracing::warn!(
                subject = %trial.subject,
                task_id = %trial.task.task_id,
                error = %e,
                "skipping invalid trial"
            );
            return TrialOutput {
                blocks: Vec::new(),
                skipped: vec![SkippedUnit::trial(
                    trial,
                    SkipReason::InvalidTrial {
                        message: e.to_string(),
                    },
                )],
            };
        }

        let mut skipped = Vec::new();
        let cycles = self.segment_trial(trial, &mut skipped);

        let source = Arc::new(StrideSource {
            subject: trial.subject.clone(),
            task: trial.task.clone(),
        });
        let results: Vec<StrideResult> = cycles
            .par_iter()
            .map(|cycle| StrideJob::new(self, trial, cycle).run(&source))
            .collect();

        let mut blocks = Vec::with_capacity(results.len());
        let mut missing: Vec<String> = Vec::new();
        for result in results {
            for channel in result.notes.missing {
                if !missing.contains(&channel) {
                    missing.push(channel);
                }
            }
            skipped.extend(result.notes.skipped);
            match result.block {
                Ok(block) => blocks.push(block),
                Err(skip) => skipped.push(skip),
            }
        }

        for channel in missing {
            tracing::warn!(
                subject = %trial.subject,
                task_id = %trial.task.task_id,
                channel = %channel,
                "missing channel, outputs left empty"
            );
            skipped.push(SkippedUnit::trial(
                trial,
                SkipReason::MissingChannel { channel },
            ));
        }

        tracing::debug!(
            subject = %trial.subject,
            task_id = %trial.task.task_id,
            strides = blocks.len(),
            "trial processed"
        );
        TrialOutput { blocks, skipped }
    }

    /// Stride windows of a trial: left pass, then right pass
    fn segment_trial(
        &self,
        trial: &TrialRecording,
        skipped: &mut Vec<SkippedUnit>,
    ) -> Vec<GaitCycle> {
        let extracted: Vec<SideTable<SideEvents>> = EventExtractor::segments(&trial.events)
            .into_iter()
            .map(|window| EventExtractor::extract(&trial.events, window))
            .collect();

        let mut cycles = Vec::new();
        for side in Side::BOTH {
            for (segment, sides) in extracted.iter().enumerate() {
                let events = &sides[side];
                if let Err(e) = events.require_strides(side) {
                    tracing::warn!(
                        subject = %trial.subject,
                        task_id = %trial.task.task_id,
                        segment,
                        error = %e,
                        "skipping segment"
                    );
                    skipped.push(
                        SkippedUnit::trial(
                            trial,
                            SkipReason::InsufficientEvents {
                                heel_strikes: events.heel_strikes.len(),
                            },
                        )
                        .with_segment(segment)
                        .with_side(side),
                    );
                    continue;
                }
                cycles.extend(StrideSegmenter::segment(side, events, segment));
            }
        }
        cycles
    }
}

/// Missing channels and partial skips noted while building one stride
#[derive(Debug, Default)]
struct StrideNotes {
    missing: Vec<String>,
    skipped: Vec<SkippedUnit>,
}

impl StrideNotes {
    fn missing(&mut self, channel: String) {
        if !self.missing.contains(&channel) {
            self.missing.push(channel);
        }
    }
}

struct StrideResult {
    block: Result<StrideBlock, SkippedUnit>,
    notes: StrideNotes,
}

/// A channel window in output units, raw and resampled
struct Loaded {
    raw: Vec<f64>,
    resampled: Vec<f64>,
}

/// One `(trial, reference side, stride)` unit of work
struct StrideJob<'a> {
    config: &'a PipelineConfig,
    schema: &'a TableSchema,
    trial: &'a TrialRecording,
    cycle: &'a GaitCycle,
    duration_s: f64,
    estimator: VelocityEstimator,
}

impl<'a> StrideJob<'a> {
    fn new(processor: &'a GaitProcessor, trial: &'a TrialRecording, cycle: &'a GaitCycle) -> Self {
        let config = &processor.config;
        Self {
            config,
            schema: &processor.schema,
            trial,
            cycle,
            duration_s: cycle.duration_s(trial.event_rate_hz()),
            estimator: VelocityEstimator::new(config.velocity_strategy, config.samples_per_stride),
        }
    }

    fn run(&self, source: &Arc<StrideSource>) -> StrideResult {
        let mut notes = StrideNotes::default();
        let block = self.build(source, &mut notes).map_err(|reason| {
            tracing::warn!(
                subject = %self.trial.subject,
                side = self.cycle.reference_side.as_str(),
                step = self.cycle.stride_index,
                reason = ?reason,
                "dropping stride"
            );
            self.skip(reason)
        });
        StrideResult { block, notes }
    }

    fn skip(&self, reason: SkipReason) -> SkippedUnit {
        SkippedUnit::trial(self.trial, reason)
            .with_segment(self.cycle.segment)
            .with_side(self.cycle.reference_side)
            .with_step(self.cycle.stride_index)
    }

    fn build(
        &self,
        source: &Arc<StrideSource>,
        notes: &mut StrideNotes,
    ) -> Result<StrideBlock, SkipReason> {
        let window = self.window(&self.trial.kinematics)?;

        let mut block = StrideBlock::new(
            Arc::clone(source),
            self.schema,
            self.cycle.segment,
            self.cycle.reference_side,
            self.cycle.stride_index,
            self.cycle.start_frame,
            self.duration_s,
        );

        for role in Role::BOTH {
            self.fill_kinematics(&mut block, role, &window, notes)?;
        }
        let kinetics = self.trial.kinetics.as_ref();
        self.fill_resampled(&mut block, kinetics, "kinetics", &MOMENT_CHANNELS, notes);
        let forceplates = self.trial.forceplates.as_ref();
        self.fill_resampled(&mut block, forceplates, "forceplates", &FORCE_CHANNELS, notes);

        tracing::debug!(
            subject = %self.trial.subject,
            side = self.cycle.reference_side.as_str(),
            step = self.cycle.stride_index,
            start_frame = self.cycle.start_frame,
            phase_rate = block.phase_rate,
            "stride assembled"
        );
        Ok(block)
    }

    /// Sample range of the stride in `group`
    fn window(&self, group: &SignalGroup) -> Result<Range<usize>, SkipReason> {
        let event_rate = self.trial.event_rate_hz();
        channel_window(self.cycle, event_rate, group.rate_hz, group.frames()).map_err(|e| {
            tracing::debug!(error = %e, "degenerate stride window");
            SkipReason::DegenerateStrideWindow {
                start_frame: self.cycle.start_frame,
                end_frame: self.cycle.end_frame,
                samples: remap_window(self.cycle, event_rate, group.rate_hz, group.frames()).len(),
            }
        })
    }

    /// Scale factor from a group's unit to the output unit, `None` when the mass is needed but unknown
    fn unit_scale(&self, unit: Unit) -> Option<f64> {
        let mass = self.trial.subject_mass_kg;
        let normalize = self.config.normalize_moments_by_mass;
        match unit {
            Unit::Degrees => Some(std::f64::consts::PI / 180.0),
            Unit::Radians | Unit::BodyWeight => Some(1.0),
            Unit::NewtonMeters if normalize => mass.map(|m| 1.0 / m),
            Unit::NewtonMeters => Some(1.0),
            Unit::NewtonMetersPerKg if normalize => Some(1.0),
            Unit::NewtonMetersPerKg => mass,
            Unit::Newtons => mass.map(|m| 1.0 / (m * GRAVITY)),
        }
    }

    /// Like [`Self::read`], noting the channel as missing when absent
    fn load(
        &self,
        group: &SignalGroup,
        window: &Range<usize>,
        kind: ChannelKind,
        side: Side,
        scale: f64,
        notes: &mut StrideNotes,
    ) -> Option<Loaded> {
        let loaded = self.read(group, window, kind, side, scale);
        if loaded.is_none() {
            notes.missing(channel_name(kind, side));
        }
        loaded
    }

    fn read(
        &self,
        group: &SignalGroup,
        window: &Range<usize>,
        kind: ChannelKind,
        side: Side,
        scale: f64,
    ) -> Option<Loaded> {
        let samples = group.channel(kind, side)?.get(window.clone())?;
        let raw: Vec<f64> = samples.iter().map(|v| v * scale).collect();
        let resampled = resample(&raw, self.config.samples_per_stride);
        Some(Loaded { raw, resampled })
    }

    fn velocity(&self, channel: &Loaded, rate_hz: f64) -> Vec<f64> {
        self.estimator
            .estimate(&channel.resampled, &channel.raw, rate_hz, self.duration_s)
    }

    fn set(&self, block: &mut StrideBlock, channel: OutputChannel, role: Role, series: &[f64]) {
        block.set_column(self.schema.index(channel, role), series);
    }

    fn fill_kinematics(
        &self,
        block: &mut StrideBlock,
        role: Role,
        window: &Range<usize>,
        notes: &mut StrideNotes,
    ) -> Result<(), SkipReason> {
        let side = role.side(self.cycle.reference_side);
        let group = &self.trial.kinematics;
        let rate_hz = group.rate_hz;
        let scale = self.unit_scale(group.unit).unwrap_or(1.0);
        let policy = &self.config.corrections;
        let max_iterations = self.config.max_offset_iterations;

        let hip = self.load(group, window, ChannelKind::HipFlexionAngle, side, scale, notes);
        let knee = self.load(group, window, ChannelKind::KneeFlexionAngle, side, scale, notes);
        let mut ankle =
            self.load(group, window, ChannelKind::AnkleDorsiflexionAngle, side, scale, notes);
        let mut foot = self.load(group, window, ChannelKind::FootAngle, side, scale, notes);
        let measured_pelvis = if policy.measured_pelvis_active() {
            self.read(group, window, ChannelKind::PelvisTiltAngle, side, scale)
        } else {
            None
        };

        if let Some(ankle) = ankle.as_mut() {
            correct_incline_ankle(&mut ankle.resampled, &self.trial.task, policy, max_iterations)
                .map_err(|e| not_converged(ChannelKind::AnkleDorsiflexionAngle, side, e))?;
        }
        if let Some(foot) = foot.as_mut() {
            correct_foot_angle(&mut foot.resampled, role, policy, max_iterations)
                .map_err(|e| not_converged(ChannelKind::FootAngle, side, e))?;
        }

        if let Some(hip) = &hip {
            self.set(block, OutputChannel::HipFlexionAngle, role, &hip.resampled);
            self.set(block, OutputChannel::HipFlexionVelocity, role, &self.velocity(hip, rate_hz));
        }
        if let Some(knee) = &knee {
            let sign = self.config.knee_angle_output;
            self.set(block, OutputChannel::KneeFlexionAngle, role, &sign.to_output(&knee.resampled));
            let velocity = sign.to_output(&self.velocity(knee, rate_hz));
            self.set(block, OutputChannel::KneeFlexionVelocity, role, &velocity);
        }
        if let Some(ankle) = &ankle {
            self.set(block, OutputChannel::AnkleDorsiflexionAngle, role, &ankle.resampled);
            let velocity = self.velocity(ankle, rate_hz);
            self.set(block, OutputChannel::AnkleDorsiflexionVelocity, role, &velocity);
        }

        let mut pelvis = None;
        if let (Some(foot), Some(ankle), Some(knee)) = (&foot, &ankle, &knee) {
            let angles = KinematicChain::compute(ChainInputs {
                foot: &foot.resampled,
                ankle_dorsiflexion: &ankle.resampled,
                knee_flexion: &knee.resampled,
                hip_flexion: hip.as_ref().map(|h| h.resampled.as_slice()),
                measured_pelvis: measured_pelvis.as_ref().map(|p| p.resampled.as_slice()),
            })
            .map_err(|e| SkipReason::InvalidTrial {
                message: e.to_string(),
            })?;

            let segments = [
                (OutputChannel::FootAngle, OutputChannel::FootVelocity, &angles.foot),
                (OutputChannel::ShankAngle, OutputChannel::ShankVelocity, &angles.shank),
                (OutputChannel::ThighAngle, OutputChannel::ThighVelocity, &angles.thigh),
            ];
            for (angle, velocity, series) in segments {
                self.set(block, angle, role, series);
                let derived = self.estimator.estimate_derived(series, self.duration_s);
                self.set(block, velocity, role, &derived);
            }
            pelvis = angles.pelvis;
        }

        // Chain pelvis (measured or reconstructed), else the measured channel alone
        match pelvis.or_else(|| measured_pelvis.map(|p| p.resampled)) {
            Some(series) => {
                self.set(block, OutputChannel::PelvisAngle, role, &series);
                let derived = self.estimator.estimate_derived(&series, self.duration_s);
                self.set(block, OutputChannel::PelvisVelocity, role, &derived);
            }
            None if policy.measured_pelvis_active() => {
                notes.missing(channel_name(ChannelKind::PelvisTiltAngle, side));
            }
            None => {}
        }
        Ok(())
    }

    /// Resample a kinetic or force plate group without further transforms
    fn fill_resampled(
        &self,
        block: &mut StrideBlock,
        group: Option<&SignalGroup>,
        group_name: &str,
        channels: &[(ChannelKind, OutputChannel)],
        notes: &mut StrideNotes,
    ) {
        let Some(group) = group else {
            notes.missing(group_name.to_string());
            return;
        };
        let Some(scale) = self.unit_scale(group.unit) else {
            notes.missing("subject_mass_kg".to_string());
            return;
        };
        let window = match self.window(group) {
            Ok(window) => window,
            Err(reason) => {
                notes.skipped.push(self.skip(reason));
                return;
            }
        };

        for role in Role::BOTH {
            let side = role.side(self.cycle.reference_side);
            for &(kind, output) in channels {
                if let Some(loaded) = self.load(group, &window, kind, side, scale, notes) {
                    self.set(block, output, role, &loaded.resampled);
                }
            }
        }
    }
}

fn channel_name(kind: ChannelKind, side: Side) -> String {
    format!("{}_{}", kind.as_str(), side.as_str())
}

fn not_converged(kind: ChannelKind, side: Side, error: ComputeError) -> SkipReason {
    match error {
        ComputeError::CorrectionDidNotConverge { iterations, .. } => {
            SkipReason::CorrectionDidNotConverge {
                channel: channel_name(kind, side),
                iterations,
            }
        }
        other => SkipReason::InvalidTrial {
            message: other.to_string(),
        },
    }
}
