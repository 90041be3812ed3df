//! Ingest configuration loaded from YAML.
//!
//! One file declares one source: its tags and their input files, how those
//! files are laid out, and the parameters and mapping tables its hooks read.
//!
//! ```yaml
//! name: ctd_chemical_disease
//! source_version: "2024-05"
//! tags:
//!   - tag: default
//!     files: [data/CTD_chemicals_diseases.tsv.gz]
//!     format: tsv
//!     header_prefix: "# "
//!     required_columns: [ChemicalID, DiseaseID]
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::error::IngestError;
use crate::record::RecordSchema;
use crate::runner::{ErrorPolicy, TagInput};
use crate::source::delimited::split_fields;
use crate::source::{
    open_lines, ColumnFilter, DelimitedOptions, DelimitedSource, JsonLinesSource, SourceOptions,
};
use crate::state::MappingTable;

/// Top-level ingest configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Source name, used as the output file stem
    pub name: String,

    /// Catalog entry implementing the source; defaults to `name`
    #[serde(default)]
    pub ingest: Option<String>,

    #[serde(default)]
    pub source_version: Option<String>,

    #[serde(default)]
    pub schema_version: Option<String>,

    #[serde(default)]
    pub error_policy: ErrorPolicy,

    #[serde(default)]
    pub min_node_count: Option<usize>,

    #[serde(default)]
    pub min_edge_count: Option<usize>,

    /// Free-form values exposed to hooks through `TransformState::parameter`
    #[serde(default)]
    pub parameters: IndexMap<String, serde_json::Value>,

    #[serde(default)]
    pub mappings: IndexMap<String, MappingSpec>,

    pub tags: Vec<TagConfig>,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Input file layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    #[default]
    Tsv,
    Csv,
    Jsonl,
}

/// One tag: a named input stream with its own hooks
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TagConfig {
    pub tag: String,
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub format: InputFormat,
    /// Overrides the format's delimiter
    #[serde(default)]
    pub delimiter: Option<char>,
    /// Overrides the format's quote character
    #[serde(default)]
    pub quote: Option<char>,
    #[serde(default)]
    pub skip_lines: usize,
    #[serde(default = "default_header")]
    pub header: bool,
    #[serde(default)]
    pub header_prefix: Option<String>,
    #[serde(default)]
    pub comment_char: Option<String>,
    /// Column names for files without a header
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub required_columns: Vec<String>,
    #[serde(default)]
    pub filters: Vec<ColumnFilter>,
    #[serde(default)]
    pub row_limit: Option<usize>,
    /// Overrides the source's error policy for this tag
    #[serde(default)]
    pub error_policy: Option<ErrorPolicy>,
}

fn default_header() -> bool {
    true
}

/// Two-column lookup table read from a delimited file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MappingSpec {
    pub file: PathBuf,
    #[serde(default)]
    pub key_column: usize,
    #[serde(default = "default_value_column")]
    pub value_column: usize,
    #[serde(default = "default_mapping_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_mapping_comment")]
    pub comment_char: String,
    /// What to do with a key listed on more than one line
    #[serde(default)]
    pub duplicates: DuplicateKeys,
}

/// Merge rule for repeated mapping keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateKeys {
    /// Keep every distinct value, joined with `|`
    #[default]
    Join,
    /// Keep the first value only
    First,
}

fn default_value_column() -> usize {
    1
}

fn default_mapping_delimiter() -> char {
    '\t'
}

fn default_mapping_comment() -> String {
    "#".to_string()
}

impl IngestConfig {
    /// Load and validate an ingest configuration.
    ///
    /// Relative input and mapping paths are resolved against the directory
    /// containing `path`.
    ///
    /// # Errors
    /// Returns error if the file can't be read, isn't valid YAML for this
    /// schema, or fails [`validate`](Self::validate)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, IngestError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            IngestError::io(format!("Failed to read config file {}", path.display()), e)
        })?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        tracing::debug!("Loading ingest config from {}", path.display());
        Self::from_yaml_str(&contents, base_dir)
    }

    /// Parse and validate configuration text.
    pub fn from_yaml_str(contents: &str, base_dir: impl Into<PathBuf>) -> Result<Self, IngestError> {
        let mut config: IngestConfig = serde_yaml::from_str(contents)?;
        config.base_dir = base_dir.into();
        config.resolve_paths();
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self) {
        let base = self.base_dir.clone();
        for tag in &mut self.tags {
            for file in &mut tag.files {
                if file.is_relative() {
                    *file = base.join(&*file);
                }
            }
        }
        for mapping in self.mappings.values_mut() {
            if mapping.file.is_relative() {
                mapping.file = base.join(&mapping.file);
            }
        }
    }

    /// Structural checks that need no file access.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.name.trim().is_empty() {
            return Err(IngestError::config("Ingest name must not be empty"));
        }
        if self.tags.is_empty() {
            return Err(IngestError::config(format!(
                "Ingest '{}' declares no tags",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for tag in &self.tags {
            if tag.tag.trim().is_empty() {
                return Err(IngestError::config(format!(
                    "Ingest '{}' has a tag with an empty name",
                    self.name
                )));
            }
            if !seen.insert(tag.tag.as_str()) {
                return Err(IngestError::config(format!(
                    "Tag '{}' is declared more than once",
                    tag.tag
                )));
            }
            if tag.files.is_empty() {
                return Err(IngestError::config(format!(
                    "Tag '{}' declares no input files",
                    tag.tag
                )));
            }
            if tag.format != InputFormat::Jsonl && !tag.header && tag.columns.is_empty() {
                return Err(IngestError::config(format!(
                    "Tag '{}' has no header and no columns",
                    tag.tag
                )));
            }
            for filter in &tag.filters {
                filter.validate()?;
            }
        }

        for (name, mapping) in &self.mappings {
            if mapping.key_column == mapping.value_column {
                return Err(IngestError::config(format!(
                    "Mapping '{}' uses column {} as both key and value",
                    name, mapping.key_column
                )));
            }
        }

        Ok(())
    }

    /// Catalog entry name.
    pub fn ingest_name(&self) -> &str {
        self.ingest.as_deref().unwrap_or(&self.name)
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.tag.clone()).collect()
    }

    /// Apply command-line overrides to the source and every tag.
    pub fn apply_overrides(&mut self, row_limit: Option<usize>, error_policy: Option<ErrorPolicy>) {
        if let Some(limit) = row_limit {
            for tag in &mut self.tags {
                tag.row_limit = Some(limit);
            }
        }
        if let Some(policy) = error_policy {
            self.error_policy = policy;
            for tag in &mut self.tags {
                tag.error_policy = None;
            }
        }
    }

    /// Record sources for every tag, in declaration order.
    pub fn build_inputs(&self) -> IndexMap<String, TagInput> {
        self.tags
            .iter()
            .map(|tag| (tag.tag.clone(), tag.input()))
            .collect()
    }

    /// Load every mapping table.
    pub fn load_mappings(&self) -> Result<IndexMap<String, MappingTable>, IngestError> {
        self.mappings
            .iter()
            .map(|(name, spec)| {
                let table = spec.load()?;
                tracing::info!("Loaded mapping '{}' with {} entries", name, table.len());
                Ok((name.clone(), table))
            })
            .collect()
    }
}

impl TagConfig {
    fn source_options(&self) -> SourceOptions {
        SourceOptions {
            schema: RecordSchema::new(self.required_columns.clone()),
            filters: self.filters.clone(),
            row_limit: self.row_limit,
        }
    }

    fn delimited_options(&self) -> DelimitedOptions {
        let mut options = match self.format {
            InputFormat::Csv => DelimitedOptions::csv(),
            _ => DelimitedOptions::tsv(),
        };
        if let Some(delimiter) = self.delimiter {
            options.delimiter = delimiter;
        }
        if self.quote.is_some() {
            options.quote = self.quote;
        }
        options.skip_lines = self.skip_lines;
        options.header = self.header;
        options.header_prefix = self.header_prefix.clone();
        options.columns = self.columns.clone();
        options.comment_char = self.comment_char.clone();
        options
    }

    /// Record source for this tag.
    pub fn input(&self) -> TagInput {
        let mut input = match self.format {
            InputFormat::Jsonl => {
                TagInput::new(JsonLinesSource::new(self.files.clone(), self.source_options()))
            }
            InputFormat::Tsv | InputFormat::Csv => TagInput::new(DelimitedSource::new(
                self.files.clone(),
                self.delimited_options(),
                self.source_options(),
            )),
        };
        input.error_policy = self.error_policy;
        input
    }
}

impl MappingSpec {
    /// Read the table, merging repeated keys per [`DuplicateKeys`].
    pub fn load(&self) -> Result<MappingTable, IngestError> {
        let reader = open_lines(&self.file)?;
        let mut table = MappingTable::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| {
                IngestError::io(format!("Failed to read {}", self.file.display()), e)
            })?;
            if line.trim().is_empty()
                || (!self.comment_char.is_empty() && line.starts_with(&self.comment_char))
            {
                continue;
            }

            let fields = split_fields(line.trim_end_matches(&['\r', '\n'][..]), self.delimiter, None);
            let (key, value) = match (fields.get(self.key_column), fields.get(self.value_column)) {
                (Some(key), Some(value)) => (key.trim(), value.trim()),
                _ => {
                    return Err(IngestError::config(format!(
                        "{}:{}: mapping line has {} fields, needs columns {} and {}",
                        self.file.display(),
                        index + 1,
                        fields.len(),
                        self.key_column,
                        self.value_column
                    )))
                }
            };
            if key.is_empty() || value.is_empty() {
                continue;
            }
            match table.get_mut(key) {
                None => {
                    table.insert(key.to_string(), value.to_string());
                }
                Some(existing) => {
                    if self.duplicates == DuplicateKeys::Join
                        && !existing.split('|').any(|v| v == value)
                    {
                        existing.push('|');
                        existing.push_str(value);
                    }
                }
            }
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FilterOp;
    use tempfile::TempDir;

    const CTD_CONFIG: &str = r##"
name: ctd_chemical_disease
source_version: "2024-05"
error_policy: skip
min_edge_count: 1
parameters:
  combined_score_threshold: 700
tags:
  - tag: default
    files: [data/CTD_chemicals_diseases.tsv.gz]
    header_prefix: "# "
    comment_char: "#"
    required_columns: [ChemicalID, DiseaseID]
    filters:
      - { column: DirectEvidence, op: in, value: [therapeutic] }
"##;

    #[test]
    fn test_parse_and_resolve_paths() {
        let config = IngestConfig::from_yaml_str(CTD_CONFIG, "/srv/ingests").unwrap();

        assert_eq!(config.ingest_name(), "ctd_chemical_disease");
        assert_eq!(config.error_policy, ErrorPolicy::Skip);
        assert_eq!(config.min_edge_count, Some(1));
        assert_eq!(
            config.parameters.get("combined_score_threshold"),
            Some(&serde_json::json!(700))
        );

        let tag = &config.tags[0];
        assert_eq!(tag.format, InputFormat::Tsv);
        assert!(tag.header);
        assert_eq!(
            tag.files[0],
            PathBuf::from("/srv/ingests/data/CTD_chemicals_diseases.tsv.gz")
        );
        assert_eq!(tag.filters[0].op, FilterOp::In);
        assert_eq!(config.tag_names(), vec!["default".to_string()]);
    }

    #[test]
    fn test_rejects_duplicate_and_empty_tags() {
        let duplicate = r#"
name: x
tags:
  - { tag: a, files: [a.tsv] }
  - { tag: a, files: [b.tsv] }
"#;
        let err = IngestConfig::from_yaml_str(duplicate, ".").unwrap_err();
        assert!(err.to_string().contains("more than once"));

        let no_files = "name: x\ntags:\n  - { tag: a, files: [] }\n";
        assert!(IngestConfig::from_yaml_str(no_files, ".").is_err());

        let no_tags = "name: x\ntags: []\n";
        assert!(IngestConfig::from_yaml_str(no_tags, ".").is_err());
    }

    #[test]
    fn test_rejects_headerless_tag_without_columns() {
        let yaml = "name: x\ntags:\n  - { tag: a, files: [a.tsv], header: false }\n";
        assert!(IngestConfig::from_yaml_str(yaml, ".").is_err());

        let jsonl = "name: x\ntags:\n  - { tag: a, files: [a.jsonl], format: jsonl, header: false }\n";
        assert!(IngestConfig::from_yaml_str(jsonl, ".").is_ok());
    }

    #[test]
    fn test_rejects_bad_filter_value() {
        let yaml = r#"
name: x
tags:
  - tag: a
    files: [a.tsv]
    filters: [{ column: score, op: gt, value: high }]
"#;
        assert!(IngestConfig::from_yaml_str(yaml, ".").is_err());
    }

    #[test]
    fn test_overrides_replace_tag_settings() {
        let yaml = r#"
name: x
tags:
  - { tag: a, files: [a.tsv], row_limit: 5, error_policy: skip }
  - { tag: b, files: [b.tsv] }
"#;
        let mut config = IngestConfig::from_yaml_str(yaml, ".").unwrap();
        config.apply_overrides(Some(2), Some(ErrorPolicy::Abort));

        assert!(config.tags.iter().all(|t| t.row_limit == Some(2)));
        assert!(config.tags.iter().all(|t| t.error_policy.is_none()));
        assert_eq!(config.error_policy, ErrorPolicy::Abort);
    }

    #[test]
    fn test_load_mapping_table() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("entrez_2_string.tsv"),
            "#NCBI taxid\tentrez\tSTRING\n9606\t7157\t9606.ENSP00000269305\n9606\t672\t9606.ENSP00000418960\n9606\t999\t9606.ENSP00000269305\n",
        )
        .unwrap();

        let yaml = r#"
name: string
mappings:
  entrez_2_string: { file: entrez_2_string.tsv, key_column: 2, value_column: 1 }
tags:
  - { tag: links, files: [links.txt] }
"#;
        let config = IngestConfig::from_yaml_str(yaml, dir.path()).unwrap();
        let mappings = config.load_mappings().unwrap();
        let table = &mappings["entrez_2_string"];

        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get("9606.ENSP00000269305").map(String::as_str),
            Some("7157|999")
        );
    }

    #[test]
    fn test_mapping_keeps_first_value_when_asked() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("ids.tsv");
        std::fs::write(&file, "a\t1\na\t2\na\t1\nb\t3\n").unwrap();

        let mut spec = MappingSpec {
            file,
            key_column: 0,
            value_column: 1,
            delimiter: '\t',
            comment_char: "#".to_string(),
            duplicates: DuplicateKeys::Join,
        };
        assert_eq!(spec.load().unwrap().get("a").map(String::as_str), Some("1|2"));

        spec.duplicates = DuplicateKeys::First;
        let table = spec.load().unwrap();
        assert_eq!(table.get("a").map(String::as_str), Some("1"));
        assert_eq!(table.get("b").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_mapping_line_too_short_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("map.tsv"), "only_one_column\n").unwrap();

        let yaml = "name: x\nmappings:\n  m: { file: map.tsv }\ntags:\n  - { tag: a, files: [a.tsv] }\n";
        let config = IngestConfig::from_yaml_str(yaml, dir.path()).unwrap();
        assert!(config.load_mappings().is_err());
    }
}
