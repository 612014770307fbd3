//! Tab-separated metric line output.
//!
//! Each metric is one `<name>\t<value>\t<unix_timestamp>` line.

use std::fmt;
use std::io::{self, Write};

/// A metric value. Counters print as integers, ratios with six decimals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Int(u64),
    Float(f64),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(v) => write!(f, "{}", v),
            MetricValue::Float(v) => write!(f, "{:.6}", v),
        }
    }
}

/// Writes metric lines to a sink in call order.
pub struct MetricEmitter<W: Write> {
    sink: W,
    emitted: usize,
}

impl<W: Write> MetricEmitter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink, emitted: 0 }
    }

    pub fn emit(&mut self, name: &str, value: MetricValue, timestamp: i64) -> io::Result<()> {
        writeln!(self.sink, "{}\t{}\t{}", name, value, timestamp)?;
        self.emitted += 1;
        Ok(())
    }

    /// Number of lines written so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}
