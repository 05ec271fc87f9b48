//! Gait Flux CLI - Command-line interface for Gait Flux
//!
//! Commands:
//! - transform: Process gait trials into a phase-normalized table
//! - validate: Validate trial input schema
//! - schema: Print input and output schema information

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use gait_flux::assembler::{TableSchema, METADATA_COLUMNS};
use gait_flux::schema::{TrialAdapter, SCHEMA_VERSION};
use gait_flux::types::ChannelKind;
use gait_flux::{
    GaitProcessor, PipelineConfig, PipelineOutput, TableEncoder, VelocityStrategy,
    GAIT_FLUX_VERSION,
};

/// Gait Flux - Stride segmentation and phase normalization for gait trials
#[derive(Parser)]
#[command(name = "gaitflux")]
#[command(version = GAIT_FLUX_VERSION)]
#[command(about = "Transform gait trials into phase-normalized stride tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform trials into a phase-normalized table
    Transform {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Pipeline configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Phase samples per stride
        #[arg(long)]
        samples: Option<usize>,

        /// Disable every data-fix correction
        #[arg(long)]
        no_data_fixes: bool,

        /// Velocity differentiation strategy
        #[arg(long)]
        velocity: Option<VelocityArg>,

        /// Worker threads (0 uses all cores)
        #[arg(long)]
        workers: Option<usize>,

        /// Write the run report (metadata and skipped units) to a file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Validate trial input schema
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Pipeline configuration file used for output column names
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one trial per line)
    Ndjson,
    /// JSON array of trials
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one phase row per line)
    Ndjson,
    /// Columnar JSON document with run metadata
    Columnar,
    /// Pretty-printed columnar JSON
    ColumnarPretty,
}

#[derive(Clone, Copy, ValueEnum)]
enum VelocityArg {
    /// Differentiate the resampled series
    PostResample,
    /// Differentiate at the native rate, then resample
    NativeRate,
}

impl From<VelocityArg> for VelocityStrategy {
    fn from(arg: VelocityArg) -> Self {
        match arg {
            VelocityArg::PostResample => VelocityStrategy::PostResample,
            VelocityArg::NativeRate => VelocityStrategy::NativeRate,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (gait.trial.v1)
    Input,
    /// Output table columns
    Output,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` when set and valid, otherwise `info`
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn run(cli: Cli) -> Result<(), GaitCliError> {
    match cli.command {
        Commands::Transform {
            input,
            output,
            input_format,
            output_format,
            config,
            samples,
            no_data_fixes,
            velocity,
            workers,
            report,
        } => {
            let overrides = ConfigOverrides {
                samples,
                no_data_fixes,
                velocity,
                workers,
            };
            let config = load_config(config.as_deref(), &overrides)?;
            cmd_transform(
                &input,
                &output,
                input_format,
                output_format,
                config,
                report.as_deref(),
            )
        }

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Schema {
            schema_type,
            json,
            config,
        } => {
            let config = load_config(config.as_deref(), &ConfigOverrides::default())?;
            cmd_schema(schema_type, json, &config)
        }
    }
}

/// Command-line settings that take precedence over the config file
#[derive(Default)]
struct ConfigOverrides {
    samples: Option<usize>,
    no_data_fixes: bool,
    velocity: Option<VelocityArg>,
    workers: Option<usize>,
}

fn load_config(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<PipelineConfig, GaitCliError> {
    let mut config = match path {
        Some(path) => PipelineConfig::from_json(&fs::read_to_string(path)?)?,
        None => PipelineConfig::default(),
    };
    if let Some(samples) = overrides.samples {
        config.samples_per_stride = samples;
    }
    if overrides.no_data_fixes {
        config.corrections.enable_data_fixes = false;
    }
    if let Some(velocity) = overrides.velocity {
        config.velocity_strategy = velocity.into();
    }
    if let Some(workers) = overrides.workers {
        config.workers = workers;
    }
    config.validate()?;
    Ok(config)
}

fn read_input(input: &Path) -> Result<String, GaitCliError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(GaitCliError::NoInput);
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_trials(
    input_data: &str,
    input_format: InputFormat,
) -> Result<Vec<gait_flux::RawTrial>, GaitCliError> {
    let trials = match input_format {
        InputFormat::Ndjson => TrialAdapter::parse_ndjson(input_data)?,
        InputFormat::Json => TrialAdapter::parse_array(input_data)?,
    };
    if trials.is_empty() {
        return Err(GaitCliError::NoTrials);
    }
    Ok(trials)
}

fn cmd_transform(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    config: PipelineConfig,
    report_path: Option<&Path>,
) -> Result<(), GaitCliError> {
    let input_data = read_input(input)?;
    let raws = parse_trials(&input_data, input_format)?;

    let processor = GaitProcessor::new(config)?;
    let result = processor.process_raw(&raws)?;
    let encoder = TableEncoder::new();

    // Written even when the run yields no strides
    if let Some(path) = report_path {
        write_report(&encoder, &result, path)?;
    }

    if result.table.stride_count() == 0 {
        return Err(GaitCliError::NoStrides(result.skipped.len()));
    }

    tracing::info!(
        run_id = encoder.run_id(),
        strides = result.table.stride_count(),
        rows = result.table.row_count(),
        skipped = result.skipped.len(),
        "writing table"
    );

    let mut writer: Box<dyn Write> = if output.to_string_lossy() == "-" {
        Box::new(BufWriter::new(io::stdout().lock()))
    } else {
        Box::new(BufWriter::new(fs::File::create(output)?))
    };

    match output_format {
        OutputFormat::Ndjson => encoder.write_ndjson(&result.table, &mut writer)?,
        OutputFormat::Columnar => {
            serde_json::to_writer(&mut writer, &encoder.encode_columnar(&result))?;
            writeln!(writer)?;
        }
        OutputFormat::ColumnarPretty => {
            writeln!(writer, "{}", encoder.encode_columnar_json(&result)?)?;
        }
    }
    writer.flush()?;

    Ok(())
}

fn write_report(
    encoder: &TableEncoder,
    result: &PipelineOutput,
    path: &Path,
) -> Result<(), GaitCliError> {
    let report = encoder.report(result);
    fs::write(path, serde_json::to_string_pretty(&report)?)?;
    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), GaitCliError> {
    let input_data = read_input(input)?;
    let trials = parse_trials(&input_data, input_format)?;

    let results = TrialAdapter::validate_trials(&trials);

    let report = ValidationReport {
        total_trials: trials.len(),
        valid_trials: trials.len() - results.len(),
        invalid_trials: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                subject: r.subject.clone(),
                task_id: r.task_id.clone(),
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total trials:   {}", report.total_trials);
        println!("Valid trials:   {}", report.valid_trials);
        println!("Invalid trials: {}", report.invalid_trials);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Trial {}/{} (index {}): {}",
                    err.subject, err.task_id, err.index, err.error
                );
            }
        }
    }

    if report.invalid_trials > 0 {
        Err(GaitCliError::ValidationFailed(report.invalid_trials))
    } else {
        Ok(())
    }
}

fn cmd_schema(
    schema_type: SchemaType,
    json: bool,
    config: &PipelineConfig,
) -> Result<(), GaitCliError> {
    match schema_type {
        SchemaType::Input => {
            let channels: Vec<&str> = ChannelKind::ALL.iter().map(|k| k.as_str()).collect();
            if json {
                let schema = serde_json::json!({
                    "schema_version": SCHEMA_VERSION,
                    "required": ["schema_version", "subject", "task", "events", "kinematics"],
                    "groups": ["kinematics", "kinetics", "forceplates"],
                    "units": {
                        "kinematics": ["deg", "rad"],
                        "kinetics": ["Nm", "Nm_kg"],
                        "forceplates": ["N", "BW"]
                    },
                    "channels": channels,
                });
                println!("{}", serde_json::to_string_pretty(&schema)?);
            } else {
                println!("Input Schema: {}", SCHEMA_VERSION);
                println!();
                println!("One record per subject and task condition:");
                println!("- subject, task {{ task, task_id, task_info, incline_deg }}, subject_mass_kg");
                println!("- events: left/right_heel_strike, left/right_stride_duration, segments");
                println!("- kinematics, kinetics, forceplates: {{ rate_hz, unit, channels }}");
                println!("  channels map a name to {{ left, right }} or {{ both }} sample arrays");
                println!();
                println!("Channels:");
                for channel in channels {
                    println!("  - {}", channel);
                }
            }
        }
        SchemaType::Output => {
            let schema = TableSchema::new(config);
            if json {
                let output = serde_json::json!({
                    "metadata_columns": METADATA_COLUMNS,
                    "extra_columns": ["ipsi_side", "segment"],
                    "schema": schema,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("Output Table ({} rows per stride)", schema.samples_per_stride);
                println!();
                println!("Metadata: {}, ipsi_side, segment", METADATA_COLUMNS.join(", "));
                println!();
                println!("Channels:");
                for column in &schema.columns {
                    match column.velocity_strategy {
                        Some(strategy) => println!("  - {} ({})", column.name, strategy.as_str()),
                        None => println!("  - {}", column.name),
                    }
                }
            }
        }
    }

    Ok(())
}

// Error types

#[derive(Debug)]
enum GaitCliError {
    Io(io::Error),
    Compute(gait_flux::ComputeError),
    Json(serde_json::Error),
    NoInput,
    NoTrials,
    NoStrides(usize),
    ValidationFailed(usize),
}

impl From<io::Error> for GaitCliError {
    fn from(e: io::Error) -> Self {
        GaitCliError::Io(e)
    }
}

impl From<gait_flux::ComputeError> for GaitCliError {
    fn from(e: gait_flux::ComputeError) -> Self {
        GaitCliError::Compute(e)
    }
}

impl From<serde_json::Error> for GaitCliError {
    fn from(e: serde_json::Error) -> Self {
        GaitCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<GaitCliError> for CliError {
    fn from(e: GaitCliError) -> Self {
        match e {
            GaitCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            GaitCliError::Compute(gait_flux::ComputeError::InvalidConfig(message)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message,
                hint: Some("Check the configuration file and command-line overrides".to_string()),
            },
            GaitCliError::Compute(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(format!("Ensure input matches {} schema", SCHEMA_VERSION)),
            },
            GaitCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            GaitCliError::NoInput => CliError {
                code: "NO_INPUT".to_string(),
                message: "stdin is a terminal".to_string(),
                hint: Some("Pipe trials into stdin or pass --input <file>".to_string()),
            },
            GaitCliError::NoTrials => CliError {
                code: "NO_TRIALS".to_string(),
                message: "No trials found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            GaitCliError::NoStrides(skipped) => CliError {
                code: "NO_STRIDES".to_string(),
                message: format!("No strides produced, {} units skipped", skipped),
                hint: Some("Rerun with --report to see why each unit was skipped".to_string()),
            },
            GaitCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} trials failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_trials: usize,
    valid_trials: usize,
    invalid_trials: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    subject: String,
    task_id: String,
    error: String,
}
