//! NDJSON (newline-delimited JSON) reading and writing.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufRead, Write};

use crate::error::WriterError;

/// NDJSON writer
///
/// Writes values as NDJSON, one JSON object per line.
pub struct NdjsonWriter<W: Write> {
    writer: W,
    lines: usize,
}

impl<W: Write> NdjsonWriter<W> {
    /// Create a new NDJSON writer
    pub fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    /// Write a single value as an NDJSON line
    pub fn write<T: Serialize>(&mut self, value: &T) -> Result<(), WriterError> {
        let json = serde_json::to_string(value)?;
        writeln!(self.writer, "{}", json)?;
        self.lines += 1;
        Ok(())
    }

    /// Write multiple values
    pub fn write_all<T: Serialize>(&mut self, values: &[T]) -> Result<(), WriterError> {
        for value in values {
            self.write(value)?;
        }
        Ok(())
    }

    /// Flush the underlying writer
    pub fn flush(&mut self) -> Result<(), WriterError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Number of lines written so far
    pub fn lines(&self) -> usize {
        self.lines
    }
}

/// Parse every non-blank line of an NDJSON stream.
pub fn read_ndjson<T: DeserializeOwned, R: BufRead>(reader: R) -> Result<Vec<T>, WriterError> {
    let mut values = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        values.push(serde_json::from_str(&line)?);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestEntity {
        name: String,
        value: i32,
    }

    #[test]
    fn test_ndjson_writer() {
        let mut buf = Vec::new();
        let mut writer = NdjsonWriter::new(&mut buf);

        let entity1 = TestEntity {
            name: "Alice".to_string(),
            value: 42,
        };
        let entity2 = TestEntity {
            name: "Bob".to_string(),
            value: 24,
        };

        writer.write(&entity1).unwrap();
        writer.write(&entity2).unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.lines(), 2);

        let output = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Alice"));
        assert!(lines[1].contains("Bob"));
    }

    #[test]
    fn test_read_ndjson_skips_blank_lines() {
        let input = "{\"name\":\"Alice\",\"value\":1}\n\n{\"name\":\"Bob\",\"value\":2}\n";
        let parsed: Vec<TestEntity> = read_ndjson(input.as_bytes()).unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].name, "Bob");
    }
}
