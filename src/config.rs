use crate::error::{AppError, Result};
use crate::ml::forest::ForestConfig;
use crate::profile::TrafficBand;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

/// Explicit configuration record for one pipeline run.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub data: DataConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub forest: ForestConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default = "default_traffic_levels")]
    pub traffic_levels: Vec<TrafficBand>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub sensors: PathBuf,
    pub weather: PathBuf,
    pub gps: PathBuf,
    pub events: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub processed: PathBuf,
    pub schema: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SchemaConfig {
    /// Encode against the persisted schema instead of deriving a new one
    #[serde(default)]
    pub freeze: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SplitConfig {
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    #[serde(default = "default_seed", deserialize_with = "deserialize_seed")]
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    #[serde(default = "default_top_features")]
    pub top_features: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_features: default_top_features(),
        }
    }
}

fn default_test_fraction() -> f64 {
    0.2
}

pub(crate) fn default_seed() -> u64 {
    42
}

fn default_top_features() -> usize {
    5
}

fn default_traffic_levels() -> Vec<TrafficBand> {
    vec![
        TrafficBand::new(0.0, "Low"),
        TrafficBand::new(50.0, "Medium"),
        TrafficBand::new(100.0, "High"),
    ]
}

/// Custom deserializer that handles a seed as both number and string
///
/// Accepts:
/// - `seed: 42` (number)
/// - `seed: "42"` (string that parses to number)
/// - `seed: ${PIPELINE_SEED}` (env var substituted to either)
pub(crate) fn deserialize_seed<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SeedValue {
        Number(u64),
        String(String),
    }

    match SeedValue::deserialize(deserializer)? {
        SeedValue::Number(n) => Ok(n),
        SeedValue::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom(format!("Invalid seed: '{}'", s))),
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        // Substitute environment variables
        let expanded = expand_env_vars(content)?;

        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Checks for:
    /// - Empty paths
    /// - Split fraction inside (0, 1)
    /// - Forest sizes and leaf limits
    /// - Ordered, non-empty traffic bands
    fn validate(&self) -> Result<()> {
        let paths = [
            ("data.sensors", &self.data.sensors),
            ("data.weather", &self.data.weather),
            ("data.gps", &self.data.gps),
            ("data.events", &self.data.events),
            ("output.processed", &self.output.processed),
            ("output.schema", &self.output.schema),
        ];

        for (field_name, path) in &paths {
            if path.as_os_str().is_empty() {
                return Err(AppError::Config(format!("{} cannot be empty", field_name)));
            }
        }

        if !(self.split.test_fraction > 0.0 && self.split.test_fraction < 1.0) {
            return Err(AppError::Config(format!(
                "split.test_fraction must be between 0 and 1 (exclusive), got {}",
                self.split.test_fraction
            )));
        }

        if self.forest.n_trees == 0 {
            return Err(AppError::Config(
                "forest.n_trees must be at least 1".to_string(),
            ));
        }

        if self.forest.min_samples_split < 2 {
            return Err(AppError::Config(
                "forest.min_samples_split must be at least 2".to_string(),
            ));
        }

        if self.forest.min_samples_leaf == 0 {
            return Err(AppError::Config(
                "forest.min_samples_leaf must be at least 1".to_string(),
            ));
        }

        if self.forest.max_features == Some(0) {
            return Err(AppError::Config(
                "forest.max_features must be at least 1 when set".to_string(),
            ));
        }

        if self.forest.n_trees > 1000 {
            tracing::warn!(
                "forest.n_trees of {} is very large, fitting will be slow",
                self.forest.n_trees
            );
        }

        if self.report.top_features == 0 {
            return Err(AppError::Config(
                "report.top_features must be at least 1".to_string(),
            ));
        }

        if self.traffic_levels.is_empty() {
            return Err(AppError::Config(
                "traffic_levels must define at least one band".to_string(),
            ));
        }

        for pair in self.traffic_levels.windows(2) {
            if pair[1].lower_bound <= pair[0].lower_bound {
                return Err(AppError::Config(format!(
                    "traffic_levels lower bounds must be strictly increasing: '{}' ({}) follows '{}' ({})",
                    pair[1].label, pair[1].lower_bound, pair[0].label, pair[0].lower_bound
                )));
            }
        }

        Ok(())
    }
}

/// Expand `${VAR}` references; text inside `#` comments is left alone.
fn expand_env_vars(content: &str) -> Result<String> {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| AppError::Config(format!("Invalid env var pattern: {}", e)))?;

    let mut result = String::with_capacity(content.len());
    let mut missing_vars = Vec::new();

    for line in content.split_inclusive('\n') {
        let (code, comment) = line.split_at(comment_start(line).unwrap_or(line.len()));

        let mut expanded = code.to_string();
        for cap in re.captures_iter(code) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    expanded = expanded.replace(&cap[0], &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }

        result.push_str(&expanded);
        result.push_str(comment);
    }

    if !missing_vars.is_empty() {
        return Err(AppError::Config(format!(
            "Missing required environment variable{}: {}\n\n\
             To fix this:\n\
             1. Create a .env file in the project root\n\
             2. Set the missing variable{}: export {}=<value>\n\
             3. Or set {} in your environment before running",
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars.join(", "),
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars[0],
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Byte offset of a YAML comment: a `#` at line start or after whitespace,
/// outside single or double quotes.
fn comment_start(line: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut prev_is_space = true;

    for (i, c) in line.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '#' && prev_is_space => return Some(i),
            None => {}
        }
        prev_is_space = c.is_whitespace();
    }
    None
}
