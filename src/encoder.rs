//! Table encoding
//!
//! This module encodes a pipeline run into JSON, either as one NDJSON object
//! per phase row or as a single columnar document. Missing values (NaN) are
//! written as `null`.

use crate::assembler::{PhaseRow, PhaseTable, TableSchema};
use crate::error::ComputeError;
use crate::pipeline::PipelineOutput;
use crate::types::{Side, SkippedUnit};
use crate::{GAIT_FLUX_VERSION, PRODUCER_NAME};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use uuid::Uuid;

/// Current output table format version
pub const TABLE_FORMAT_VERSION: &str = "gait.table.v1";

/// Producer metadata attached to every encoded run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableProducer {
    pub name: String,
    pub version: String,
    pub run_id: String,
}

/// Run-level metadata, skip list included
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub format_version: String,
    pub producer: TableProducer,
    pub computed_at_utc: String,
    pub samples_per_stride: usize,
    pub strides: usize,
    pub rows: usize,
    pub skipped: Vec<SkippedUnit>,
}

/// Metadata columns of a columnar table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataColumns {
    pub subject: Vec<String>,
    pub task: Vec<String>,
    pub task_id: Vec<String>,
    pub task_info: Vec<String>,
    pub step: Vec<usize>,
    pub phase: Vec<f64>,
    pub phase_rate: Vec<f64>,
    pub time_s: Vec<f64>,
    pub ipsi_side: Vec<Side>,
    pub segment: Vec<usize>,
}

/// A whole run as one document of named columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnarTable {
    #[serde(flatten)]
    pub report: RunReport,
    pub schema: TableSchema,
    pub metadata: MetadataColumns,
    pub channels: BTreeMap<String, Vec<Option<f64>>>,
}

/// Table encoder stamping each run with a unique id
pub struct TableEncoder {
    run_id: String,
}

impl Default for TableEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableEncoder {
    /// Create a new encoder with a fresh run ID
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific run ID
    pub fn with_run_id(run_id: String) -> Self {
        Self { run_id }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run metadata and skip list for an output
    pub fn report(&self, output: &PipelineOutput) -> RunReport {
        RunReport {
            format_version: TABLE_FORMAT_VERSION.to_string(),
            producer: TableProducer {
                name: PRODUCER_NAME.to_string(),
                version: GAIT_FLUX_VERSION.to_string(),
                run_id: self.run_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            samples_per_stride: output.table.schema.samples_per_stride,
            strides: output.table.stride_count(),
            rows: output.table.row_count(),
            skipped: output.skipped.clone(),
        }
    }

    /// Encode one phase row as a flat JSON object
    pub fn encode_row(&self, row: &PhaseRow<'_>, schema: &TableSchema) -> Map<String, Value> {
        let task = row.task();
        let mut object = Map::new();
        object.insert("subject".to_string(), Value::from(row.subject()));
        object.insert("task".to_string(), Value::from(task.task.as_str()));
        object.insert("task_id".to_string(), Value::from(task.task_id.as_str()));
        object.insert("task_info".to_string(), Value::from(task.task_info.as_str()));
        object.insert("step".to_string(), Value::from(row.step()));
        object.insert("phase".to_string(), number(row.phase()));
        object.insert("phase_rate".to_string(), number(row.phase_rate()));
        object.insert("time_s".to_string(), number(row.time_s()));
        object.insert(
            "ipsi_side".to_string(),
            Value::from(row.block.reference_side.as_str()),
        );
        object.insert("segment".to_string(), Value::from(row.block.segment));

        for (column, value) in schema.columns.iter().zip(row.values()) {
            object.insert(column.name.clone(), number(*value));
        }
        object
    }

    /// Stream the table as NDJSON, one row per line
    pub fn write_ndjson<W: Write>(&self, table: &PhaseTable, writer: &mut W) -> Result<(), ComputeError> {
        for row in table.rows() {
            let object = self.encode_row(&row, &table.schema);
            serde_json::to_writer(&mut *writer, &object)?;
            writer
                .write_all(b"\n")
                .map_err(|e| ComputeError::EncodingError(e.to_string()))?;
        }
        Ok(())
    }

    /// Encode the table as an NDJSON string
    pub fn encode_ndjson(&self, table: &PhaseTable) -> Result<String, ComputeError> {
        let mut buffer = Vec::new();
        self.write_ndjson(table, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| ComputeError::EncodingError(e.to_string()))
    }

    /// Encode a run as named columns
    pub fn encode_columnar(&self, output: &PipelineOutput) -> ColumnarTable {
        let table = &output.table;
        let rows = table.row_count();

        let mut metadata = MetadataColumns::default();
        for row in table.rows() {
            let task = row.task();
            metadata.subject.push(row.subject().to_string());
            metadata.task.push(task.task.clone());
            metadata.task_id.push(task.task_id.clone());
            metadata.task_info.push(task.task_info.clone());
            metadata.step.push(row.step());
            metadata.phase.push(row.phase());
            metadata.phase_rate.push(row.phase_rate());
            metadata.time_s.push(row.time_s());
            metadata.ipsi_side.push(row.block.reference_side);
            metadata.segment.push(row.block.segment);
        }

        let mut channels = BTreeMap::new();
        for (position, column) in table.schema.columns.iter().enumerate() {
            let mut values = Vec::with_capacity(rows);
            for block in &table.blocks {
                values.extend(
                    block
                        .column(position)
                        .into_iter()
                        .map(|v| v.is_finite().then_some(v)),
                );
            }
            channels.insert(column.name.clone(), values);
        }

        ColumnarTable {
            report: self.report(output),
            schema: table.schema.clone(),
            metadata,
            channels,
        }
    }

    /// Encode a run as a pretty-printed columnar JSON document
    pub fn encode_columnar_json(&self, output: &PipelineOutput) -> Result<String, ComputeError> {
        let table = self.encode_columnar(output);
        serde_json::to_string_pretty(&table).map_err(ComputeError::JsonError)
    }
}

fn number(value: f64) -> Value {
    if value.is_finite() {
        Value::from(value)
    } else {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{OutputChannel, RowAssembler, StrideBlock, StrideSource};
    use crate::config::PipelineConfig;
    use crate::types::{Role, SkipReason, TaskInfo};
    use std::sync::Arc;

    fn make_output() -> PipelineOutput {
        let config = PipelineConfig::default().with_samples_per_stride(3);
        let schema = TableSchema::new(&config);
        let source = Arc::new(StrideSource {
            subject: "AB01".to_string(),
            task: TaskInfo {
                task: "level_walking".to_string(),
                task_id: "level_1.2".to_string(),
                task_info: "speed_m_s:1.2".to_string(),
                incline_deg: None,
            },
        });

        let mut block = StrideBlock::new(source, &schema, 0, Side::Right, 1, 100, 1.25);
        let knee = schema.index(OutputChannel::KneeFlexionAngle, Role::Ipsi);
        block.set_column(knee, &[0.1, 0.2, 0.3]);

        let mut assembler = RowAssembler::new(schema);
        assembler.push(block);
        PipelineOutput {
            table: assembler.finish(),
            skipped: vec![SkippedUnit::new(
                "AB02",
                "level_1.2",
                SkipReason::InsufficientEvents { heel_strikes: 1 },
            )],
        }
    }

    #[test]
    fn test_encode_ndjson_rows() {
        let output = make_output();
        let encoder = TableEncoder::with_run_id("test-run".to_string());
        let ndjson = encoder.encode_ndjson(&output.table).unwrap();

        let rows: Vec<Value> = ndjson
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["subject"], "AB01");
        assert_eq!(rows[0]["task_id"], "level_1.2");
        assert_eq!(rows[1]["step"], 1);
        assert_eq!(rows[2]["phase"], 100.0);
        assert_eq!(rows[0]["phase_rate"], 80.0);
        assert_eq!(rows[2]["time_s"], 1.25);
        assert_eq!(rows[0]["ipsi_side"], "right");
        assert_eq!(rows[1]["knee_flexion_angle_ipsi_rad"], 0.2);
        assert!(rows[1]["knee_flexion_angle_contra_rad"].is_null());
    }

    #[test]
    fn test_encode_columnar() {
        let output = make_output();
        let encoder = TableEncoder::with_run_id("test-run".to_string());
        let table = encoder.encode_columnar(&output);

        assert_eq!(table.report.producer.name, PRODUCER_NAME);
        assert_eq!(table.report.producer.version, GAIT_FLUX_VERSION);
        assert_eq!(table.report.producer.run_id, "test-run");
        assert_eq!(table.report.rows, 3);
        assert_eq!(table.report.skipped.len(), 1);
        assert_eq!(table.metadata.phase, vec![0.0, 50.0, 100.0]);
        assert_eq!(
            table.channels["knee_flexion_angle_ipsi_rad"],
            vec![Some(0.1), Some(0.2), Some(0.3)]
        );
        assert_eq!(table.channels["hip_flexion_angle_ipsi_rad"], vec![None; 3]);
        assert_eq!(table.channels.len(), 40);
    }

    #[test]
    fn test_encode_columnar_json() {
        let output = make_output();
        let json = TableEncoder::new().encode_columnar_json(&output).unwrap();

        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["format_version"], TABLE_FORMAT_VERSION);
        assert!(parsed.get("producer").is_some());
        assert!(parsed.get("computed_at_utc").is_some());
        assert!(parsed["schema"]["columns"].is_array());
        assert_eq!(parsed["skipped"][0]["reason"]["kind"], "insufficient_events");
        assert_eq!(parsed["metadata"]["ipsi_side"][0], "right");
    }
}
