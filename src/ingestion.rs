//! Fetching published sheet exports and parsing them into [`Dataset`]s.
//!
//! Parsing is strict about structure and lenient about content: an
//! unterminated quoted field or a missing header row fails the whole source,
//! while blank rows are dropped and short rows are padded.

use crate::error::SourceError;
use crate::record::{Columns, Dataset, Record};
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Where a dataset comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "location", rename_all = "snake_case")]
pub enum SourceRef {
    /// A published-sheet CSV endpoint.
    Url(String),
    /// A CSV file on disk.
    Path(String),
    /// CSV text held in memory.
    Inline(String),
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Url(url) => write!(f, "{}", url),
            SourceRef::Path(path) => write!(f, "{}", path),
            SourceRef::Inline(text) => write!(f, "<inline, {} bytes>", text.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CsvOptions {
    /// Field separator. Must be an ASCII character.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Strip surrounding whitespace from header names.
    #[serde(default = "default_trim_headers")]
    pub trim_headers: bool,
}

fn default_delimiter() -> char {
    ','
}

fn default_trim_headers() -> bool {
    true
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            trim_headers: default_trim_headers(),
        }
    }
}

/// Retrieves the raw text behind a [`SourceRef`].
pub trait Fetch {
    fn fetch(&self, source: &SourceRef) -> impl Future<Output = Result<String, SourceError>> + Send;
}

/// Serves inline text and local files. URLs are reported unreachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFetcher;

impl Fetch for LocalFetcher {
    async fn fetch(&self, source: &SourceRef) -> Result<String, SourceError> {
        match source {
            SourceRef::Inline(text) => Ok(text.clone()),
            SourceRef::Path(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| SourceError::unreachable(path.as_str(), e))?;
                String::from_utf8(bytes).map_err(|e| SourceError::malformed(path.as_str(), e))
            }
            SourceRef::Url(url) => Err(SourceError::unreachable(
                url.as_str(),
                "no HTTP client available (enable the `http` feature)",
            )),
        }
    }
}

#[cfg(feature = "http")]
pub use http::HttpFetcher;

#[cfg(feature = "http")]
mod http {
    use super::{Fetch, LocalFetcher, SourceRef};
    use crate::error::{BudgetError, Result, SourceError};
    use log::debug;
    use reqwest::Client;
    use std::time::Duration;

    /// Fetches published-sheet URLs over HTTP; paths and inline text are
    /// served like [`LocalFetcher`].
    #[derive(Clone)]
    pub struct HttpFetcher {
        client: Client,
    }

    impl HttpFetcher {
        pub fn new() -> Self {
            Self {
                client: Client::new(),
            }
        }

        pub fn with_timeout(timeout: Duration) -> Result<Self> {
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| BudgetError::InvalidConfig(e.to_string()))?;
            Ok(Self { client })
        }
    }

    impl Default for HttpFetcher {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Fetch for HttpFetcher {
        async fn fetch(&self, source: &SourceRef) -> std::result::Result<String, SourceError> {
            let url = match source {
                SourceRef::Url(url) => url,
                other => return LocalFetcher.fetch(other).await,
            };

            debug!("GET {}", url);
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| SourceError::unreachable(url.as_str(), e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(SourceError::unreachable(
                    url.as_str(),
                    format!("HTTP status {}", status),
                ));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| SourceError::unreachable(url.as_str(), e))?;
            String::from_utf8(bytes.to_vec()).map_err(|e| SourceError::malformed(url.as_str(), e))
        }
    }
}

/// Fetches `source` and parses it. Never returns a partial dataset.
pub async fn load<F: Fetch>(
    fetcher: &F,
    source: &SourceRef,
    options: &CsvOptions,
) -> Result<Dataset, SourceError> {
    let text = fetcher.fetch(source).await?;
    let dataset = parse_csv(&source.to_string(), &text, options)?;
    info!(
        "Loaded {} records ({} columns) from {}",
        dataset.len(),
        dataset.columns().len(),
        source
    );
    Ok(dataset)
}

/// Parses delimited text whose first row names the columns.
pub fn parse_csv(source_ref: &str, text: &str, options: &CsvOptions) -> Result<Dataset, SourceError> {
    if !options.delimiter.is_ascii() {
        return Err(SourceError::malformed(
            source_ref,
            format!("delimiter {:?} is not an ASCII character", options.delimiter),
        ));
    }
    let delimiter = options.delimiter as u8;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    if let Some(line) = unterminated_quote_line(text, delimiter) {
        return Err(SourceError::malformed(
            source_ref,
            format!("quoted field opened on line {} is never closed", line),
        ));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let header = reader
        .headers()
        .map_err(|e| SourceError::malformed(source_ref, e))?
        .clone();
    let names: Vec<String> = header
        .iter()
        .map(|name| {
            if options.trim_headers {
                name.trim().to_string()
            } else {
                name.to_string()
            }
        })
        .collect();
    if names.iter().all(|name| name.trim().is_empty()) {
        return Err(SourceError::malformed(source_ref, "missing header row"));
    }

    let columns = Arc::new(Columns::new(names));
    let mut records = Vec::new();
    let mut dropped = 0usize;

    for row in reader.records() {
        let row = row.map_err(|e| SourceError::malformed(source_ref, e))?;
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        let record = Record::new(
            Arc::clone(&columns),
            row.iter().map(str::to_string).collect(),
            line,
        );
        if record.is_blank() {
            dropped += 1;
            continue;
        }
        records.push(record);
    }

    if dropped > 0 {
        debug!("{}: dropped {} blank rows", source_ref, dropped);
    }

    Ok(Dataset::new(source_ref, columns, records))
}

/// Returns the line of a quoted field that runs to the end of the text.
///
/// A quote only opens a quoted field at the start of a field; quotes in the
/// middle of an unquoted field are literal, as the csv reader treats them.
fn unterminated_quote_line(text: &str, delimiter: u8) -> Option<u64> {
    #[derive(Clone, Copy)]
    enum State {
        FieldStart,
        Unquoted,
        Quoted,
        QuoteInQuoted,
    }

    let mut state = State::FieldStart;
    let mut line = 1u64;
    let mut opened_on = 1u64;

    for &byte in text.as_bytes() {
        let is_break = byte == b'\n' || byte == b'\r';
        state = match state {
            State::FieldStart | State::Unquoted if byte == delimiter || is_break => State::FieldStart,
            State::FieldStart if byte == b'"' => {
                opened_on = line;
                State::Quoted
            }
            State::FieldStart | State::Unquoted => State::Unquoted,
            State::Quoted if byte == b'"' => State::QuoteInQuoted,
            State::Quoted => State::Quoted,
            State::QuoteInQuoted if byte == b'"' => State::Quoted,
            State::QuoteInQuoted if byte == delimiter || is_break => State::FieldStart,
            State::QuoteInQuoted => State::Unquoted,
        };
        if byte == b'\n' {
            line += 1;
        }
    }

    match state {
        State::Quoted => Some(opened_on),
        _ => None,
    }
}
