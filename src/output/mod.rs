//! Output formatting and result sinks

use colored::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::SinkError;
use crate::scanner::ResultSet;

/// Column header of the CSV report. `conf` is reserved and always written empty.
pub const CSV_HEADER: [&str; 10] = [
    "host",
    "port",
    "protocol",
    "service_name",
    "state",
    "product",
    "extrainfo",
    "reason",
    "version",
    "conf",
];

/// Destination for a finished result set
pub trait ResultSink: Send + Sync {
    fn write(&self, results: &ResultSet) -> Result<(), SinkError>;

    /// Where the results end up, for the operator summary
    fn destination(&self) -> String;
}

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::Text => "txt",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            "text" | "txt" => Ok(OutputFormat::Text),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Default report file name: `192.168.1.0/24` becomes `192.168.1.0_24_port_scan.csv`
pub fn default_output_path(target: &str, format: OutputFormat) -> PathBuf {
    PathBuf::from(format!(
        "{}_port_scan.{}",
        target.trim().replace('/', "_"),
        format.extension()
    ))
}

/// Build the sink for `format`. Text output goes to stdout and ignores `path`.
pub fn sink_for(format: OutputFormat, path: impl Into<PathBuf>, colored: bool) -> Box<dyn ResultSink> {
    match format {
        OutputFormat::Csv => Box::new(CsvSink::new(path)),
        OutputFormat::Json => Box::new(JsonSink::new(path)),
        OutputFormat::Text => Box::new(TextSink::new(colored)),
    }
}

/// Write `results` as CSV rows under [`CSV_HEADER`].
pub fn write_csv<W: Write>(writer: W, results: &ResultSet) -> Result<(), SinkError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CSV_HEADER)?;

    for row in results {
        csv_writer.write_record([
            row.host.to_string().as_str(),
            row.port.to_string().as_str(),
            row.protocol.as_str(),
            row.service_name.as_str(),
            row.state.as_str(),
            row.product.as_str(),
            row.extra_info.as_str(),
            row.reason.as_str(),
            row.version.as_str(),
            "",
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// CSV file sink
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for CsvSink {
    fn write(&self, results: &ResultSet) -> Result<(), SinkError> {
        let file = File::create(&self.path)?;
        write_csv(BufWriter::new(file), results)
    }

    fn destination(&self) -> String {
        self.path.display().to_string()
    }
}

/// JSON array file sink
#[derive(Debug, Clone)]
pub struct JsonSink {
    path: PathBuf,
}

impl JsonSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ResultSink for JsonSink {
    fn write(&self, results: &ResultSet) -> Result<(), SinkError> {
        let mut writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(&mut writer, results)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn destination(&self) -> String {
        self.path.display().to_string()
    }
}

/// Aligned table on stdout
#[derive(Debug, Clone)]
pub struct TextSink {
    colored: bool,
}

impl TextSink {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    /// Render the table without writing it anywhere
    pub fn render(&self, results: &ResultSet) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "{:<16} {:>9} {:<10} {:<16} {}\n",
            "HOST", "PORT", "STATE", "SERVICE", "VERSION"
        ));

        let mut rows = results.clone();
        rows.sort();
        for row in &rows {
            let port = format!("{}/{}", row.port, row.protocol);
            let state = format!("{:<10}", row.state.as_str());
            let state = if self.colored {
                match row.state {
                    crate::network::PortState::Open => state.bright_green().to_string(),
                    crate::network::PortState::Closed => state.bright_red().to_string(),
                    _ => state.bright_yellow().to_string(),
                }
            } else {
                state
            };
            let version = [row.product.as_str(), row.version.as_str(), row.extra_info.as_str()]
                .iter()
                .filter(|s| !s.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join(" ");

            output.push_str(&format!(
                "{:<16} {:>9} {} {:<16} {}\n",
                row.host.to_string(),
                port,
                state,
                row.service_name,
                version
            ));
        }
        output
    }
}

impl ResultSink for TextSink {
    fn write(&self, results: &ResultSet) -> Result<(), SinkError> {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(self.render(results).as_bytes())?;
        handle.flush()?;
        Ok(())
    }

    fn destination(&self) -> String {
        "stdout".to_string()
    }
}
