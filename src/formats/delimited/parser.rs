use crate::config::{LayoutName, PREAMBLE_LINES};
use crate::error::ParseError;
use crate::formats::table::{ParsedTable, TableBuilder};
use crate::io::RunBlock;

/// Line index of the column header within a block
const HEADER_LINE: usize = 1;

/// Configuration for delimited report lines (CSV, TSV, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelimitedConfig {
    pub delimiter: u8,
    pub quote: u8,
}

impl DelimitedConfig {
    pub fn csv() -> Self {
        Self::default()
    }

    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            quote: b'"',
        }
    }

    /// Convert delimiter byte to string representation
    pub(crate) fn delimiter_as_string(&self) -> String {
        if self.delimiter == b'\t' {
            "\\t".to_string()
        } else {
            String::from_utf8(vec![self.delimiter])
                .unwrap_or_else(|_| format!("\\x{:02x}", self.delimiter))
        }
    }
}

impl Default for DelimitedConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
        }
    }
}

/// How the fields of one report line are separated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLayout {
    Delimited(DelimitedConfig),
    /// Runs of ASCII whitespace separate fields
    Whitespace,
}

impl Default for FieldLayout {
    fn default() -> Self {
        FieldLayout::Delimited(DelimitedConfig::csv())
    }
}

impl From<LayoutName> for FieldLayout {
    fn from(name: LayoutName) -> Self {
        match name {
            LayoutName::Csv => FieldLayout::Delimited(DelimitedConfig::csv()),
            LayoutName::Tsv => FieldLayout::Delimited(DelimitedConfig::tsv()),
            LayoutName::Whitespace => FieldLayout::Whitespace,
        }
    }
}

impl FieldLayout {
    pub fn describe(&self) -> String {
        match self {
            FieldLayout::Delimited(config) => {
                format!("delimited '{}'", config.delimiter_as_string())
            }
            FieldLayout::Whitespace => "whitespace".to_string(),
        }
    }

    /// Split one line into trimmed fields. A blank line has no fields.
    fn tokenize(&self, line: &str) -> Result<Vec<String>, String> {
        match self {
            FieldLayout::Whitespace => Ok(line.split_ascii_whitespace().map(str::to_string).collect()),
            FieldLayout::Delimited(config) => {
                if line.trim().is_empty() {
                    return Ok(Vec::new());
                }

                let mut reader = csv::ReaderBuilder::new()
                    .delimiter(config.delimiter)
                    .quote(config.quote)
                    .has_headers(false) // Headers are handled at the block level
                    .flexible(true)
                    .trim(csv::Trim::All)
                    .from_reader(line.as_bytes());

                let mut record = csv::StringRecord::new();
                match reader.read_record(&mut record) {
                    Ok(true) => Ok(record.iter().map(str::to_string).collect()),
                    Ok(false) => Ok(Vec::new()),
                    Err(e) => Err(e.to_string()),
                }
            }
        }
    }
}

/// Parses fetched blocks into typed tables
///
/// A block is laid out as one free-text preamble line, one header line and
/// any number of data lines. Types are inferred per block.
#[derive(Debug, Clone, Default)]
pub struct BlockParser {
    layout: FieldLayout,
}

impl BlockParser {
    pub fn new(layout: FieldLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> FieldLayout {
        self.layout
    }

    pub fn parse(&self, block: &RunBlock) -> Result<ParsedTable, ParseError> {
        let run = block.run();
        let lines = block.significant_lines();

        if lines.len() < PREAMBLE_LINES {
            return Err(ParseError::Truncated {
                run,
                lines: lines.len(),
                expected: PREAMBLE_LINES,
            });
        }

        let preamble = lines[0].trim().to_string();

        let header = self
            .layout
            .tokenize(lines[HEADER_LINE])
            .map_err(|message| ParseError::Tokenize {
                run,
                line: HEADER_LINE,
                message,
            })?;
        if header.iter().all(|name| name.is_empty()) {
            return Err(ParseError::EmptyHeader {
                run,
                line: HEADER_LINE,
            });
        }

        let width = header.len();
        let mut builder = TableBuilder::new(header);

        for (line, text) in lines.iter().enumerate().skip(PREAMBLE_LINES) {
            let fields = self
                .layout
                .tokenize(text)
                .map_err(|message| ParseError::Tokenize { run, line, message })?;

            if fields.len() != width {
                return Err(ParseError::FieldCount {
                    run,
                    line,
                    expected: width,
                    found: fields.len(),
                });
            }

            builder.push_row(fields);
        }

        Ok(ParsedTable::new(run, preamble, builder.finish()))
    }
}
