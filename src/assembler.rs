//! Row assembly
//!
//! Every stride is written into a pre-sized columnar block of `N` phase rows.
//! Blocks from both reference-side passes, and from every trial, are then
//! concatenated into a [`PhaseTable`] that can be walked row by row.
//!
//! Channel columns follow `<joint_or_segment>_<motion>_<measurement>_<side>_<unit>`,
//! e.g. `knee_flexion_angle_ipsi_rad`.

use crate::config::{PipelineConfig, VelocityStrategy};
use crate::types::{Role, Side, TaskInfo};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Derived quantities written to the output table, once per role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputChannel {
    HipFlexionAngle,
    KneeFlexionAngle,
    AnkleDorsiflexionAngle,
    HipFlexionVelocity,
    KneeFlexionVelocity,
    AnkleDorsiflexionVelocity,
    FootAngle,
    ShankAngle,
    ThighAngle,
    PelvisAngle,
    FootVelocity,
    ShankVelocity,
    ThighVelocity,
    PelvisVelocity,
    HipFlexionMoment,
    KneeFlexionMoment,
    AnkleDorsiflexionMoment,
    GrfVertical,
    GrfAnterior,
    GrfLateral,
}

impl OutputChannel {
    pub const ALL: [OutputChannel; 20] = [
        OutputChannel::HipFlexionAngle,
        OutputChannel::KneeFlexionAngle,
        OutputChannel::AnkleDorsiflexionAngle,
        OutputChannel::HipFlexionVelocity,
        OutputChannel::KneeFlexionVelocity,
        OutputChannel::AnkleDorsiflexionVelocity,
        OutputChannel::FootAngle,
        OutputChannel::ShankAngle,
        OutputChannel::ThighAngle,
        OutputChannel::PelvisAngle,
        OutputChannel::FootVelocity,
        OutputChannel::ShankVelocity,
        OutputChannel::ThighVelocity,
        OutputChannel::PelvisVelocity,
        OutputChannel::HipFlexionMoment,
        OutputChannel::KneeFlexionMoment,
        OutputChannel::AnkleDorsiflexionMoment,
        OutputChannel::GrfVertical,
        OutputChannel::GrfAnterior,
        OutputChannel::GrfLateral,
    ];

    /// `(joint_or_segment, motion, measurement)`
    pub fn parts(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            OutputChannel::HipFlexionAngle => ("hip", "flexion", "angle"),
            OutputChannel::KneeFlexionAngle => ("knee", "flexion", "angle"),
            OutputChannel::AnkleDorsiflexionAngle => ("ankle", "dorsiflexion", "angle"),
            OutputChannel::HipFlexionVelocity => ("hip", "flexion", "velocity"),
            OutputChannel::KneeFlexionVelocity => ("knee", "flexion", "velocity"),
            OutputChannel::AnkleDorsiflexionVelocity => ("ankle", "dorsiflexion", "velocity"),
            OutputChannel::FootAngle => ("foot", "sagittal", "angle"),
            OutputChannel::ShankAngle => ("shank", "sagittal", "angle"),
            OutputChannel::ThighAngle => ("thigh", "sagittal", "angle"),
            OutputChannel::PelvisAngle => ("pelvis", "sagittal", "angle"),
            OutputChannel::FootVelocity => ("foot", "sagittal", "velocity"),
            OutputChannel::ShankVelocity => ("shank", "sagittal", "velocity"),
            OutputChannel::ThighVelocity => ("thigh", "sagittal", "velocity"),
            OutputChannel::PelvisVelocity => ("pelvis", "sagittal", "velocity"),
            OutputChannel::HipFlexionMoment => ("hip", "flexion", "moment"),
            OutputChannel::KneeFlexionMoment => ("knee", "flexion", "moment"),
            OutputChannel::AnkleDorsiflexionMoment => ("ankle", "dorsiflexion", "moment"),
            OutputChannel::GrfVertical => ("grf", "vertical", "force"),
            OutputChannel::GrfAnterior => ("grf", "anterior", "force"),
            OutputChannel::GrfLateral => ("grf", "lateral", "force"),
        }
    }

    fn unit(&self, config: &PipelineConfig) -> &'static str {
        match self.parts().2 {
            "angle" => "rad",
            "velocity" => "rad_s",
            "moment" if config.normalize_moments_by_mass => "Nm_kg",
            "moment" => "Nm",
            _ => "BW",
        }
    }

    /// Temporal domain the column is differentiated in, for velocity columns
    fn velocity_strategy(&self, config: &PipelineConfig) -> Option<VelocityStrategy> {
        match self {
            OutputChannel::HipFlexionVelocity
            | OutputChannel::KneeFlexionVelocity
            | OutputChannel::AnkleDorsiflexionVelocity => Some(config.velocity_strategy),
            // Segment angles, pelvis included, are differentiated on the phase grid
            OutputChannel::FootVelocity
            | OutputChannel::ShankVelocity
            | OutputChannel::ThighVelocity
            | OutputChannel::PelvisVelocity => Some(VelocityStrategy::PostResample),
            _ => None,
        }
    }
}

/// One channel column of the output table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub channel: OutputChannel,
    pub role: Role,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity_strategy: Option<VelocityStrategy>,
}

/// Fixed column layout shared by every stride block of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub samples_per_stride: usize,
    pub columns: Vec<ColumnSpec>,
}

/// Metadata columns that precede the channel columns of every row
pub const METADATA_COLUMNS: [&str; 8] = [
    "subject",
    "task",
    "task_id",
    "task_info",
    "step",
    "phase",
    "phase_rate",
    "time_s",
];

impl TableSchema {
    pub fn new(config: &PipelineConfig) -> Self {
        let columns = OutputChannel::ALL
            .iter()
            .flat_map(|&channel| {
                Role::BOTH.into_iter().map(move |role| {
                    let (segment, motion, measurement) = channel.parts();
                    let unit = channel.unit(config);
                    ColumnSpec {
                        name: format!("{segment}_{motion}_{measurement}_{}_{unit}", role.as_str()),
                        channel,
                        role,
                        unit: unit.to_string(),
                        velocity_strategy: channel.velocity_strategy(config),
                    }
                })
            })
            .collect();
        Self {
            samples_per_stride: config.samples_per_stride,
            columns,
        }
    }

    /// Column position of a channel for a role
    pub fn index(&self, channel: OutputChannel, role: Role) -> usize {
        let base = OutputChannel::ALL
            .iter()
            .position(|c| *c == channel)
            .unwrap_or_default();
        base * Role::BOTH.len() + usize::from(role == Role::Contra)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Phase value (%) of sample `k` on an inclusive grid of `n` samples
pub fn phase_at(k: usize, n: usize) -> f64 {
    if n < 2 {
        0.0
    } else {
        100.0 * k as f64 / (n - 1) as f64
    }
}

/// The full phase grid `[0, 100]` with `n` samples
pub fn phase_grid(n: usize) -> Vec<f64> {
    (0..n).map(|k| phase_at(k, n)).collect()
}

/// Identity of the trial a stride came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrideSource {
    pub subject: String,
    pub task: TaskInfo,
}

/// A phase-normalized stride: `N` rows of channel values in one buffer
#[derive(Debug, Clone, PartialEq)]
pub struct StrideBlock {
    pub source: Arc<StrideSource>,
    pub segment: usize,
    pub reference_side: Side,
    pub step: usize,
    pub start_frame: usize,
    pub duration_s: f64,
    pub phase_rate: f64,
    samples: usize,
    columns: usize,
    /// Row-major `(phase_index, column)` values; NaN marks a missing channel
    values: Vec<f64>,
}

impl StrideBlock {
    pub fn new(
        source: Arc<StrideSource>,
        schema: &TableSchema,
        segment: usize,
        reference_side: Side,
        step: usize,
        start_frame: usize,
        duration_s: f64,
    ) -> Self {
        let samples = schema.samples_per_stride;
        let columns = schema.columns.len();
        Self {
            source,
            segment,
            reference_side,
            step,
            start_frame,
            duration_s,
            phase_rate: 100.0 / duration_s,
            samples,
            columns,
            values: vec![f64::NAN; samples * columns],
        }
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Write a full N-sample series into one column
    pub fn set_column(&mut self, column: usize, series: &[f64]) {
        debug_assert_eq!(series.len(), self.samples);
        for (k, v) in series.iter().enumerate().take(self.samples) {
            self.values[k * self.columns + column] = *v;
        }
    }

    pub fn column(&self, column: usize) -> Vec<f64> {
        (0..self.samples)
            .map(|k| self.values[k * self.columns + column])
            .collect()
    }

    pub fn row(&self, k: usize) -> &[f64] {
        &self.values[k * self.columns..(k + 1) * self.columns]
    }

    pub fn phase(&self, k: usize) -> f64 {
        phase_at(k, self.samples)
    }

    /// Elapsed seconds since the stride's first heel strike
    pub fn time_s(&self, k: usize) -> f64 {
        self.phase(k) / self.phase_rate
    }
}

/// One output row, borrowed from its stride block
#[derive(Debug, Clone, Copy)]
pub struct PhaseRow<'a> {
    pub block: &'a StrideBlock,
    pub index: usize,
}

impl<'a> PhaseRow<'a> {
    pub fn subject(&self) -> &'a str {
        &self.block.source.subject
    }

    pub fn task(&self) -> &'a TaskInfo {
        &self.block.source.task
    }

    pub fn step(&self) -> usize {
        self.block.step
    }

    pub fn phase(&self) -> f64 {
        self.block.phase(self.index)
    }

    pub fn phase_rate(&self) -> f64 {
        self.block.phase_rate
    }

    pub fn time_s(&self) -> f64 {
        self.block.time_s(self.index)
    }

    pub fn values(&self) -> &'a [f64] {
        self.block.row(self.index)
    }
}

/// The concatenated phase-normalized output table
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseTable {
    pub schema: TableSchema,
    pub blocks: Vec<StrideBlock>,
}

impl PhaseTable {
    pub fn row_count(&self) -> usize {
        self.blocks.len() * self.schema.samples_per_stride
    }

    pub fn stride_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn rows(&self) -> impl Iterator<Item = PhaseRow<'_>> {
        self.blocks
            .iter()
            .flat_map(|block| (0..block.samples()).map(move |index| PhaseRow { block, index }))
    }

    /// All values of a named channel column, in row order
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let position = self.schema.position(name)?;
        Some(self.blocks.iter().flat_map(|b| b.column(position)).collect())
    }
}

/// Row assembler collecting stride blocks in order
pub struct RowAssembler {
    schema: TableSchema,
    blocks: Vec<StrideBlock>,
}

impl RowAssembler {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            blocks: Vec::new(),
        }
    }

    pub fn push(&mut self, block: StrideBlock) {
        self.blocks.push(block);
    }

    pub fn extend(&mut self, blocks: impl IntoIterator<Item = StrideBlock>) {
        self.blocks.extend(blocks);
    }

    pub fn finish(self) -> PhaseTable {
        PhaseTable {
            schema: self.schema,
            blocks: self.blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn make_source() -> Arc<StrideSource> {
        Arc::new(StrideSource {
            subject: "AB01".to_string(),
            task: TaskInfo {
                task: "level_walking".to_string(),
                task_id: "level_1.2".to_string(),
                task_info: "speed_m_s:1.2".to_string(),
                incline_deg: None,
            },
        })
    }

    #[test]
    fn test_column_naming() {
        let schema = TableSchema::new(&PipelineConfig::default());
        assert_eq!(schema.columns.len(), 40);
        let names: Vec<&str> = schema.column_names().collect();
        assert!(names.contains(&"knee_flexion_angle_ipsi_rad"));
        assert!(names.contains(&"knee_flexion_angle_contra_rad"));
        assert!(names.contains(&"foot_sagittal_velocity_ipsi_rad_s"));
        assert!(names.contains(&"ankle_dorsiflexion_moment_contra_Nm_kg"));
        assert!(names.contains(&"grf_vertical_force_ipsi_BW"));
    }

    #[test]
    fn test_index_matches_position() {
        let schema = TableSchema::new(&PipelineConfig::default());
        for channel in OutputChannel::ALL {
            for role in Role::BOTH {
                let column = &schema.columns[schema.index(channel, role)];
                assert_eq!((column.channel, column.role), (channel, role));
            }
        }
    }

    #[test]
    fn test_unnormalized_moment_unit() {
        let config = PipelineConfig {
            normalize_moments_by_mass: false,
            ..Default::default()
        };
        let schema = TableSchema::new(&config);
        assert!(schema.position("hip_flexion_moment_ipsi_Nm").is_some());
    }

    #[test]
    fn test_velocity_strategy_documented_per_column() {
        let config = PipelineConfig::default().with_velocity_strategy(VelocityStrategy::NativeRate);
        let schema = TableSchema::new(&config);
        let strategy = |name: &str| schema.columns[schema.position(name).unwrap()].velocity_strategy;
        assert_eq!(
            strategy("knee_flexion_velocity_ipsi_rad_s"),
            Some(VelocityStrategy::NativeRate)
        );
        assert_eq!(
            strategy("thigh_sagittal_velocity_ipsi_rad_s"),
            Some(VelocityStrategy::PostResample)
        );
        assert_eq!(
            strategy("pelvis_sagittal_velocity_contra_rad_s"),
            Some(VelocityStrategy::PostResample)
        );
        assert_eq!(strategy("knee_flexion_angle_ipsi_rad"), None);
    }

    #[test]
    fn test_phase_grid_inclusive() {
        let grid = phase_grid(150);
        assert_eq!(grid.len(), 150);
        assert_eq!(grid[0], 0.0);
        assert!((grid[149] - 100.0).abs() < 1e-12);
        let spacing = 100.0 / 149.0;
        assert!(grid.windows(2).all(|w| (w[1] - w[0] - spacing).abs() < 1e-9));
    }

    #[test]
    fn test_block_rows_and_columns() {
        let schema = TableSchema::new(&PipelineConfig::default().with_samples_per_stride(5));
        let mut block = StrideBlock::new(make_source(), &schema, 0, Side::Right, 3, 100, 1.25);
        let col = schema.index(OutputChannel::KneeFlexionAngle, Role::Ipsi);
        block.set_column(col, &[1.0, 2.0, 3.0, 4.0, 5.0]);

        assert_eq!(block.column(col), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(block.row(2)[col], 3.0);
        assert!(block.row(2)[col + 1].is_nan());
        assert!((block.phase_rate - 80.0).abs() < 1e-12);
        assert!((block.time_s(4) - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_table_concatenation() {
        let schema = TableSchema::new(&PipelineConfig::default().with_samples_per_stride(4));
        let mut assembler = RowAssembler::new(schema.clone());
        for step in 0..3 {
            let mut block = StrideBlock::new(make_source(), &schema, 0, Side::Left, step, 0, 1.0);
            block.set_column(0, &[step as f64; 4]);
            assembler.push(block);
        }
        let table = assembler.finish();

        assert_eq!(table.row_count(), 12);
        assert_eq!(table.rows().count(), 12);
        let steps: Vec<usize> = table.rows().map(|r| r.step()).collect();
        assert_eq!(steps, vec![0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2]);
        let first = table.column(&schema.columns[0].name).unwrap();
        assert_eq!(first[4..8], [1.0; 4]);
        assert!(table.column("no_such_column").is_none());
    }
}
