use crate::error::PipelineError;
use crate::types::SourceKey;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub datasets: BTreeMap<String, DatasetConfig>,
    pub warehouse: Option<WarehouseConfig>,
    #[serde(default)]
    pub pages: PagesConfig,
    /// Directory relative dataset paths resolve against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    /// Session caches kept before the least recently used one is dropped.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_max_sessions() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            static_dir: None,
            max_sessions: default_max_sessions(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AggregationConfig {
    pub top_n: usize,
    pub all_label: String,
    pub all_states_label: String,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            all_label: "All".to_string(),
            all_states_label: "All States".to_string(),
        }
    }
}

impl AggregationConfig {
    pub fn sentinels(&self) -> [&str; 2] {
        [self.all_label.as_str(), self.all_states_label.as_str()]
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    /// [latitude, longitude]
    pub national_center: [f64; 2],
    pub closest_zoom: u8,
    pub medium_zoom: u8,
    pub widest_zoom: u8,
    pub description_chars: usize,
    pub ellipsis: String,
    pub default_colour: String,
    pub colours: HashMap<String, String>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            national_center: [22.9734, 78.6569],
            closest_zoom: 10,
            medium_zoom: 5,
            widest_zoom: 4,
            description_chars: 150,
            ellipsis: "...".to_string(),
            default_colour: "blue".to_string(),
            colours: HashMap::from([
                ("Temples".to_string(), "red".to_string()),
                ("Forts".to_string(), "green".to_string()),
            ]),
        }
    }
}

/// A dataset is either a CSV file or a warehouse table.
#[derive(Debug, Deserialize, Clone)]
pub struct DatasetConfig {
    pub path: Option<PathBuf>,
    pub table: Option<String>,
    /// Display name in dataset pickers; defaults to the key.
    pub label: Option<String>,
}

#[derive(Deserialize, Clone)]
pub struct WarehouseConfig {
    pub user: String,
    pub password: String,
    pub account: String,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    pub role: Option<String>,
    /// Local directory of `<TABLE>.csv` exports standing in for the live connection.
    pub mirror_dir: Option<PathBuf>,
}

impl fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("account", &self.account)
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("role", &self.role)
            .field("mirror_dir", &self.mirror_dir)
            .finish()
    }
}

/// Which dataset key backs each page panel.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PagesConfig {
    pub heritage_sites: String,
    pub footfall: String,
    pub art_forms: String,
    pub culture_budget: String,
    pub temples: String,
    pub forts: String,
    pub festivals: String,
    pub monthly_footfall: String,
    pub budget_split: String,
    /// Per-state yearly tourist totals joined against the state budget.
    pub tourism_growth: String,
    pub tips: String,
    /// Datasets offered by the budget explorer, in picker order.
    pub explorer: Vec<String>,
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            heritage_sites: "heritage_sites".to_string(),
            footfall: "footfall".to_string(),
            art_forms: "art_forms".to_string(),
            culture_budget: "culture_budget".to_string(),
            temples: "temples".to_string(),
            forts: "forts".to_string(),
            festivals: "festivals".to_string(),
            monthly_footfall: "monthly_footfall".to_string(),
            budget_split: "budget_split".to_string(),
            tourism_growth: "tourism_growth".to_string(),
            tips: "tips".to_string(),
            explorer: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_toml_str(&content, base_dir)
    }

    pub fn from_toml_str(content: &str, base_dir: PathBuf) -> Result<Self> {
        let mut config: AppConfig =
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;
        if let Some(mirror) = config.warehouse.as_mut().and_then(|w| w.mirror_dir.as_mut()) {
            if mirror.is_relative() {
                *mirror = base_dir.join(&*mirror);
            }
        }
        config.base_dir = base_dir;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (key, dataset) in &self.datasets {
            match (&dataset.path, &dataset.table) {
                (Some(_), None) | (None, Some(_)) => {}
                _ => anyhow::bail!("dataset '{key}' must set exactly one of `path` or `table`"),
            }
        }
        if self.aggregation.top_n == 0 {
            anyhow::bail!("aggregation.top_n must be at least 1");
        }
        if self.server.max_sessions == 0 {
            anyhow::bail!("server.max_sessions must be at least 1");
        }
        Ok(())
    }

    pub fn source_key(&self, dataset: &str) -> Result<SourceKey, PipelineError> {
        let entry = self
            .datasets
            .get(dataset)
            .ok_or_else(|| PipelineError::UnknownDataset(dataset.to_string()))?;
        Ok(match (&entry.path, &entry.table) {
            (Some(path), _) if path.is_absolute() => SourceKey::File(path.clone()),
            (Some(path), _) => SourceKey::File(self.base_dir.join(path)),
            (None, Some(table)) => SourceKey::Table(table.clone()),
            (None, None) => return Err(PipelineError::UnknownDataset(dataset.to_string())),
        })
    }

    pub fn dataset_label<'a>(&'a self, dataset: &'a str) -> &'a str {
        self.datasets
            .get(dataset)
            .and_then(|d| d.label.as_deref())
            .unwrap_or(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [server]
        port = 9000

        [aggregation]
        top_n = 5

        [datasets.footfall]
        path = "data/footfall.csv"
        label = "Footfall in Tourism"

        [datasets.heritage_sites]
        table = "HERITAGE_SITES"

        [warehouse]
        user = "analyst"
        password = "hunter2"
        account = "acme-1"
        warehouse = "COMPUTE_WH"
        database = "CULTURE"
        schema = "PUBLIC"
    "#;

    #[test]
    fn parses_and_resolves_sources() {
        let config = AppConfig::from_toml_str(SAMPLE, PathBuf::from("/srv/vista")).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.max_sessions, 256);
        assert_eq!(config.aggregation.top_n, 5);
        assert_eq!(config.aggregation.all_states_label, "All States");
        assert_eq!(config.map.closest_zoom, 10);
        assert_eq!(
            config.source_key("footfall").unwrap(),
            SourceKey::File(PathBuf::from("/srv/vista/data/footfall.csv"))
        );
        assert_eq!(
            config.source_key("heritage_sites").unwrap(),
            SourceKey::Table("HERITAGE_SITES".into())
        );
        assert!(matches!(
            config.source_key("nope"),
            Err(PipelineError::UnknownDataset(_))
        ));
        assert_eq!(config.dataset_label("footfall"), "Footfall in Tourism");
        assert_eq!(config.dataset_label("heritage_sites"), "heritage_sites");
    }

    #[test]
    fn password_is_not_printed() {
        let config = AppConfig::from_toml_str(SAMPLE, PathBuf::new()).unwrap();
        let printed = format!("{:?}", config.warehouse.unwrap());
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn dataset_needs_exactly_one_source() {
        let bad = r#"
            [datasets.both]
            path = "a.csv"
            table = "A"
        "#;
        assert!(AppConfig::from_toml_str(bad, PathBuf::new()).is_err());
    }

    #[test]
    fn relative_mirror_dir_follows_the_config_file() {
        let toml = r#"
            [warehouse]
            user = "u"
            password = "p"
            account = "a"
            warehouse = "w"
            database = "d"
            schema = "s"
            mirror_dir = "mirror"
        "#;
        let config = AppConfig::from_toml_str(toml, PathBuf::from("/srv/vista")).unwrap();
        assert_eq!(
            config.warehouse.unwrap().mirror_dir,
            Some(PathBuf::from("/srv/vista/mirror"))
        );
    }
}
