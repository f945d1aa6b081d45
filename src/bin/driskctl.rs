//! driskctl - Command-line interface for the drive-risk engine
//!
//! Commands:
//! - replay: Score recorded sensor events (batch mode)
//! - run: Score sensor events streamed on stdin (streaming mode)
//! - validate: Validate sensor event input
//! - doctor: Diagnose model, configuration and environment
//! - schema: Print input/output formats

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use drive_risk::events::{self, IntervalReplay};
use drive_risk::{
    InferenceAdapter, MemorySink, NdjsonSink, RiskEngine, RiskRecord, ScoringConfig, ScoringError,
    SensorEvent, DRIVE_RISK_VERSION, PRODUCER_NAME,
};

/// driskctl - On-device driving-risk scoring engine
#[derive(Parser)]
#[command(name = "driskctl")]
#[command(author = "Synheart AI Inc")]
#[command(version = DRIVE_RISK_VERSION)]
#[command(about = "Score driving risk from accelerometer and gyroscope events", long_about = None)]
struct Cli {
    /// Log level written to stderr (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by the scoring commands
#[derive(clap::Args)]
struct EngineArgs {
    /// ONNX classifier model; without it scoring runs degraded
    #[arg(long)]
    model: Option<PathBuf>,

    /// Scoring configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the smoothing history length
    #[arg(long)]
    history_capacity: Option<usize>,

    /// Override the maximum change per update
    #[arg(long)]
    max_change: Option<f32>,

    /// User identifier written into each record
    #[arg(long)]
    user_id: Option<String>,

    /// Tick interval in milliseconds of event time
    #[arg(long, default_value = "1000")]
    interval_ms: i64,
}

#[derive(Subcommand)]
enum Commands {
    /// Score recorded sensor events (batch mode)
    Replay {
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

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Score sensor events streamed on stdin (streaming mode)
    Run {
        #[command(flatten)]
        engine: EngineArgs,

        /// Flush output after each record
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// Validate sensor event input
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

    /// Diagnose model, configuration and environment
    Doctor {
        /// Model file to test-load
        #[arg(long)]
        model: Option<PathBuf>,

        /// Configuration file to check
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (sensor events)
    Input,
    /// Output schema (risk records)
    Output,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

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

fn run(cli: Cli) -> Result<(), DriskCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            input_format,
            output_format,
            engine,
        } => cmd_replay(&input, &output, input_format, output_format, &engine),

        Commands::Run { engine, flush } => cmd_run(&engine, flush),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor {
            model,
            config,
            json,
        } => cmd_doctor(model.as_deref(), config.as_deref(), json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn load_config(args: &EngineArgs) -> Result<ScoringConfig, DriskCliError> {
    let mut config = match &args.config {
        Some(path) => ScoringConfig::from_file(path)?,
        None => ScoringConfig::default(),
    };
    if let Some(capacity) = args.history_capacity {
        config = config.with_history_capacity(capacity);
    }
    if let Some(max_change) = args.max_change {
        config = config.with_max_change(max_change);
    }
    Ok(config)
}

fn build_engine(args: &EngineArgs) -> Result<RiskEngine, DriskCliError> {
    let config = load_config(args)?;
    let engine = match &args.model {
        Some(path) => RiskEngine::from_model_file(config, path)?,
        None => RiskEngine::degraded(config, "no model provided")?,
    };
    info!(status = ?engine.status(), "Engine initialised");
    Ok(engine)
}

fn user_id(args: &EngineArgs) -> String {
    args.user_id
        .clone()
        .unwrap_or_else(|| format!("anonymous-{}", uuid::Uuid::new_v4()))
}

fn read_input(input: &Path) -> Result<String, DriskCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_events(data: &str, format: &InputFormat) -> Result<Vec<SensorEvent>, DriskCliError> {
    let events = match format {
        InputFormat::Ndjson => events::parse_ndjson(data)?,
        InputFormat::Json => events::parse_array(data)?,
    };
    Ok(events)
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    args: &EngineArgs,
) -> Result<(), DriskCliError> {
    let input_data = read_input(input)?;
    let events = parse_events(&input_data, &input_format)?;

    if events.is_empty() {
        return Err(DriskCliError::NoEvents);
    }

    let mut engine = build_engine(args)?;
    let user_id = user_id(args);
    let mut replay = IntervalReplay::new(args.interval_ms)?;
    let mut sink = MemorySink::default();

    for event in &events {
        replay.feed(&mut engine, event, &user_id, &mut sink)?;
    }
    replay.finish(&mut engine, &user_id, &mut sink);
    engine.shutdown();

    if sink.records.is_empty() {
        return Err(DriskCliError::NoRecords);
    }

    let output_data = format_output(&sink.records, &output_format)?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_run(args: &EngineArgs, flush: bool) -> Result<(), DriskCliError> {
    let mut engine = build_engine(args)?;
    let user_id = user_id(args);
    let mut replay = IntervalReplay::new(args.interval_ms)?;

    let stdout = io::stdout();
    let mut sink = NdjsonSink::new(stdout.lock());
    if flush {
        sink = sink.flushing();
    }

    for line in io::stdin().lock().lines() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let event: SensorEvent = serde_json::from_str(trimmed).map_err(|e| {
            DriskCliError::ParseError(format!("Failed to parse event: {}", e))
        })?;

        replay.feed(&mut engine, &event, &user_id, &mut sink)?;
    }

    replay.finish(&mut engine, &user_id, &mut sink);
    sink.into_inner().flush()?;
    engine.shutdown();

    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), DriskCliError> {
    let input_data = read_input(input)?;
    let events = parse_events(&input_data, &input_format)?;

    let failures = events::validate_events(&events);

    let report = ValidationReport {
        total_events: events.len(),
        valid_events: events.len() - failures.len(),
        invalid_events: failures.len(),
        errors: failures
            .iter()
            .map(|f| ValidationErrorDetail {
                index: f.index,
                sensor: events[f.index].sensor.as_str().to_string(),
                error: f.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total events:   {}", report.total_events);
        println!("Valid events:   {}", report.valid_events);
        println!("Invalid events: {}", report.invalid_events);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - {} event (index {}): {}", err.sensor, err.index, err.error);
            }
        }
    }

    if report.invalid_events > 0 {
        Err(DriskCliError::ValidationFailed(report.invalid_events))
    } else {
        Ok(())
    }
}

fn cmd_doctor(model: Option<&Path>, config: Option<&Path>, json: bool) -> Result<(), DriskCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("drive-risk version {}", DRIVE_RISK_VERSION),
    });

    checks.push(DoctorCheck {
        name: "onnx_runtime".to_string(),
        status: if cfg!(feature = "onnx") {
            CheckStatus::Ok
        } else {
            CheckStatus::Warning
        },
        message: if cfg!(feature = "onnx") {
            "ONNX Runtime backend compiled in".to_string()
        } else {
            "Built without the onnx feature; models cannot be loaded".to_string()
        },
    });

    match config {
        Some(path) => match ScoringConfig::from_file(path) {
            Ok(cfg) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Config valid (history {}, alpha {}, max change {})",
                    cfg.history_capacity, cfg.smoothing_factor, cfg.max_change
                ),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            }),
        },
        None => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "Using built-in defaults".to_string(),
        }),
    }

    match model {
        Some(path) => match InferenceAdapter::load_file(path) {
            Ok(adapter) => checks.push(DoctorCheck {
                name: "model".to_string(),
                status: CheckStatus::Ok,
                message: format!("Model loaded ({} backend)", adapter.backend_name()),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "model".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            }),
        },
        None => checks.push(DoctorCheck {
            name: "model".to_string(),
            status: CheckStatus::Warning,
            message: "No model given; scoring would run degraded at the neutral score".to_string(),
        }),
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: DRIVE_RISK_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("driskctl Doctor Report");
        println!("======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(DriskCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), DriskCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input: sensor events");
                println!();
                println!("One event per line (ndjson) or a JSON array:");
                println!("  {{ \"sensor\": \"accelerometer\" | \"gyroscope\",");
                println!("    \"values\": [x, y, z],");
                println!("    \"timestamp_ms\": <milliseconds since epoch> }}");
                println!();
                println!("Each event overwrites the latest reading of its sensor.");
                println!("A scoring tick fires every --interval-ms of event time.");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Output: risk records");
                println!();
                println!("- userId: user identifier (--user-id)");
                println!("- timestamp: tick time, milliseconds since epoch");
                println!("- risk: published risk score (0-100)");
            }
        }
    }

    Ok(())
}

// Helper functions

fn format_output(records: &[RiskRecord], format: &OutputFormat) -> Result<String, DriskCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}

fn get_input_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "drive-risk sensor event",
        "type": "object",
        "required": ["sensor", "values"],
        "properties": {
            "sensor": { "type": "string", "enum": ["accelerometer", "gyroscope"] },
            "values": {
                "type": "array",
                "items": { "type": "number" },
                "minItems": 3,
                "maxItems": 3
            },
            "timestamp_ms": { "type": "integer", "minimum": 0 }
        }
    })
    .to_string()
}

fn get_output_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "drive-risk record",
        "type": "object",
        "required": ["userId", "timestamp", "risk"],
        "properties": {
            "userId": { "type": "string" },
            "timestamp": { "type": "integer" },
            "risk": { "type": "number", "minimum": 0, "maximum": 100 }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum DriskCliError {
    Io(io::Error),
    Scoring(ScoringError),
    Json(serde_json::Error),
    NoEvents,
    NoRecords,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for DriskCliError {
    fn from(e: io::Error) -> Self {
        DriskCliError::Io(e)
    }
}

impl From<ScoringError> for DriskCliError {
    fn from(e: ScoringError) -> Self {
        DriskCliError::Scoring(e)
    }
}

impl From<serde_json::Error> for DriskCliError {
    fn from(e: serde_json::Error) -> Self {
        DriskCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<DriskCliError> for CliError {
    fn from(e: DriskCliError) -> Self {
        match e {
            DriskCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            DriskCliError::Scoring(e @ ScoringError::Config(_)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the configuration file and overrides".to_string()),
            },
            DriskCliError::Scoring(e) => CliError {
                code: "SCORING_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'driskctl validate' on the input".to_string()),
            },
            DriskCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            DriskCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            DriskCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No risk scores were published".to_string(),
                hint: Some("Input must contain non-zero sensor readings".to_string()),
            },
            DriskCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} events failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            DriskCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            DriskCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_events: usize,
    valid_events: usize,
    invalid_events: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    sensor: String,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
