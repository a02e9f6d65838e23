use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// A metric keyword plus the question words that refer to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynonymGroup {
    /// Matched against lowercased metric column names.
    pub keyword: String,
    pub aliases: Vec<String>,
}

impl SynonymGroup {
    pub fn new(keyword: &str, aliases: &[&str]) -> Self {
        Self {
            keyword: keyword.to_lowercase(),
            aliases: aliases.iter().map(|a| a.to_lowercase()).collect(),
        }
    }
}

pub fn default_synonyms() -> Vec<SynonymGroup> {
    vec![
        SynonymGroup::new("rainfall", &["rainfall", "rain", "precipitation", "rains"]),
        SynonymGroup::new("temp", &["temperature", "temp", "hot", "cold"]),
    ]
}

/// Parse `keyword=alias,alias;keyword=alias`.
pub fn parse_synonyms(raw: &str) -> anyhow::Result<Vec<SynonymGroup>> {
    raw.split(';')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(|group| -> anyhow::Result<SynonymGroup> {
            let (keyword, aliases) = group
                .split_once('=')
                .with_context(|| format!("synonym group '{}' needs keyword=aliases", group))?;
            let keyword = keyword.trim().to_lowercase();
            anyhow::ensure!(!keyword.is_empty(), "empty keyword in synonym group '{}'", group);
            let mut aliases: Vec<String> = aliases
                .split(',')
                .map(|a| a.trim().to_lowercase())
                .filter(|a| !a.is_empty())
                .collect();
            if !aliases.contains(&keyword) {
                aliases.push(keyword.clone());
            }
            Ok(SynonymGroup { keyword, aliases })
        })
        .collect()
}

/// Indian states and union territories. Questions naming one that the
/// dataset lacks resolve to an empty filter instead of being ignored.
const INDIAN_REGIONS: &[&str] = &[
    "Andhra Pradesh", "Arunachal Pradesh", "Assam", "Bihar", "Chhattisgarh", "Goa", "Gujarat",
    "Haryana", "Himachal Pradesh", "Jharkhand", "Karnataka", "Kerala", "Madhya Pradesh",
    "Maharashtra", "Manipur", "Meghalaya", "Mizoram", "Nagaland", "Odisha", "Punjab",
    "Rajasthan", "Sikkim", "Tamil Nadu", "Telangana", "Tripura", "Uttar Pradesh", "Uttarakhand",
    "West Bengal", "Andaman and Nicobar Islands", "Chandigarh",
    "Dadra and Nagar Haveli and Daman and Diu", "Delhi", "Jammu and Kashmir", "Ladakh",
    "Lakshadweep", "Puducherry",
];

pub fn default_gazetteer() -> Vec<String> {
    INDIAN_REGIONS.iter().map(|s| s.to_string()).collect()
}

/// What the entity extractor knows beyond the table itself.
#[derive(Debug, Clone, PartialEq)]
pub struct LexiconConfig {
    pub synonyms: Vec<SynonymGroup>,
    pub gazetteer: Vec<String>,
}

impl Default for LexiconConfig {
    fn default() -> Self {
        Self { synonyms: default_synonyms(), gazetteer: default_gazetteer() }
    }
}

/// Rendering knobs for numbers in answers and citations.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatConfig {
    pub precision: u32,
    /// Used when a metric column name carries no recognisable unit.
    pub default_unit: String,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self { precision: 2, default_unit: String::new() }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub dataset: Option<PathBuf>,
    pub format: FormatConfig,
    pub lexicon: LexiconConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            dataset: None,
            format: FormatConfig::default(),
            lexicon: LexiconConfig::default(),
        }
    }
}

impl AppConfig {
    /// Read `QA_*` variables, after loading `.env` if present.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut cfg = Self::default();

        if let Ok(addr) = env::var("QA_BIND_ADDR") {
            cfg.bind_addr = addr
                .parse()
                .with_context(|| format!("QA_BIND_ADDR '{}' is not a socket address", addr))?;
        }
        if let Ok(path) = env::var("QA_DATASET") {
            cfg.dataset = Some(PathBuf::from(path));
        }
        if let Ok(p) = env::var("QA_PRECISION") {
            let precision: u32 = p
                .parse()
                .with_context(|| format!("QA_PRECISION '{}' is not a number", p))?;
            anyhow::ensure!(precision <= 10, "QA_PRECISION must be at most 10");
            cfg.format.precision = precision;
        }
        if let Ok(unit) = env::var("QA_DEFAULT_UNIT") {
            cfg.format.default_unit = unit.trim().to_string();
        }
        if let Ok(raw) = env::var("QA_METRIC_SYNONYMS") {
            cfg.lexicon.synonyms = parse_synonyms(&raw)?;
        }
        if let Ok(raw) = env::var("QA_GAZETTEER") {
            cfg.lexicon.gazetteer.extend(
                raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from),
            );
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_synonym_groups() {
        let groups = parse_synonyms("rainfall = rain, Precipitation ; humidity=moisture").unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].keyword, "rainfall");
        assert_eq!(groups[0].aliases, vec!["rain", "precipitation", "rainfall"]);
        assert_eq!(groups[1].aliases, vec!["moisture", "humidity"]);
    }

    #[test]
    fn rejects_group_without_equals() {
        assert!(parse_synonyms("rainfall").is_err());
        assert!(parse_synonyms("=rain").is_err());
    }

    #[test]
    fn defaults_cover_rainfall() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.format.precision, 2);
        assert!(cfg.lexicon.synonyms.iter().any(|g| g.keyword == "rainfall"));
        assert!(cfg.lexicon.gazetteer.iter().any(|g| g == "Kerala"));
    }
}
