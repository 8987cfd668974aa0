//! Plain-text result reporter

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::debug;

/// Accumulates one row per measure case and serializes a plain-text table
/// with Name / Result / Description columns.
#[derive(Debug)]
pub struct Reporter {
    rows: Vec<(String, String, String)>,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter {
    /// Reporter with the header row in place.
    pub fn new() -> Self {
        Self {
            rows: vec![(
                "Name".to_owned(),
                "Result".to_owned(),
                "Description".to_owned(),
            )],
        }
    }

    /// Record a completed case.
    pub fn report_case(&mut self, name: &str, description: &str, result: f64, unit: &str) {
        debug!(name, result, unit, "case finished");
        self.rows
            .push((name.to_owned(), format!("{result:.2} {unit}"), description.to_owned()));
    }

    /// Record a failed case. Incomplete cases never report a partial or
    /// estimated number, only the literal `failed`.
    pub fn report_failure(&mut self, name: &str, description: &str) {
        debug!(name, "case failed");
        self.rows
            .push((name.to_owned(), "failed".to_owned(), description.to_owned()));
    }

    /// Recorded result rows, excluding the header.
    pub fn rows(&self) -> &[(String, String, String)] {
        &self.rows[1..]
    }

    /// Write the table to any writer.
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for (name, result, description) in &self.rows {
            writeln!(writer, "{name:<20}    {result:<30}    {description}")?;
        }
        Ok(())
    }

    /// Write the table to a file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_formatting() {
        let mut reporter = Reporter::new();
        reporter.report_case("select", "SELECT an applet", 50.0, "INS/S");
        reporter.report_failure("load", "load a package");

        let mut out = Vec::new();
        reporter.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Name"));
        assert!(lines[1].starts_with("select"));
        assert!(lines[1].contains("50.00 INS/S"));
        assert!(lines[2].contains("failed"));

        assert_eq!(reporter.rows().len(), 2);
    }
}
