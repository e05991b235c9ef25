use crate::config::WarehouseConfig;
use crate::error::{PipelineError, WarehouseError};
use crate::normalize;
use crate::types::{Dataset, SourceKey};
use csv::ReaderBuilder;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Untyped rows exactly as a source returned them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn push_constant_column(&mut self, name: &str, value: &str) {
        let cells = vec![Some(value.to_string()); self.rows.len()];
        self.push_column(name, cells);
    }

    /// Appends a column; `cells` holds one entry per row.
    pub fn push_column(&mut self, name: &str, cells: Vec<Option<String>>) {
        debug_assert_eq!(cells.len(), self.rows.len());
        let width = self.headers.len();
        self.headers.push(name.to_string());
        for (row, cell) in self.rows.iter_mut().zip(cells) {
            row.resize(width, None);
            row.push(cell);
        }
    }

    /// Stacks tables, taking the union of their headers in first-seen order.
    /// Cells for columns a table lacks are empty.
    pub fn concat(tables: Vec<RawTable>) -> RawTable {
        let mut headers: Vec<String> = Vec::new();
        for table in &tables {
            for header in &table.headers {
                if !headers.contains(header) {
                    headers.push(header.clone());
                }
            }
        }

        let mut rows = Vec::new();
        for table in tables {
            let mapping: Vec<usize> = table
                .headers
                .iter()
                .map(|h| headers.iter().position(|x| x == h).unwrap_or_default())
                .collect();
            for row in table.rows {
                let mut out = vec![None; headers.len()];
                for (cell, &target) in row.into_iter().zip(&mapping) {
                    out[target] = cell;
                }
                rows.push(out);
            }
        }

        RawTable { headers, rows }
    }
}

pub fn read_csv(path: &Path) -> Result<RawTable, PipelineError> {
    let key = SourceKey::File(path.to_path_buf());
    let file = File::open(path).map_err(|e| PipelineError::unavailable(&key, e))?;
    read_csv_from(file).map_err(|e| PipelineError::unavailable(&key, e))
}

pub fn read_csv_from<R: Read>(reader: R) -> Result<RawTable, csv::Error> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let headers = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(
            record
                .iter()
                .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                .collect(),
        );
    }

    Ok(RawTable { headers, rows })
}

/// Read-only access to named tables in a remote warehouse.
pub trait Warehouse: Send + Sync {
    fn fetch_table(&self, table: &str) -> Result<RawTable, WarehouseError>;
}

/// Table names are interpolated into queries by warehouse clients, so only
/// plain identifiers are accepted.
pub fn validate_table_name(name: &str) -> Result<(), WarehouseError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(WarehouseError::InvalidTableName(name.to_string()))
    }
}

/// Where warehouse tables live, as named by the `[warehouse]` settings.
#[derive(Clone, PartialEq, Eq)]
pub struct WarehouseConnection {
    pub account: String,
    pub user: String,
    pub password: String,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    pub role: Option<String>,
}

impl WarehouseConnection {
    /// `DATABASE.SCHEMA.TABLE`
    pub fn qualify(&self, table: &str) -> String {
        format!("{}.{}.{}", self.database, self.schema, table)
    }
}

impl From<&WarehouseConfig> for WarehouseConnection {
    fn from(config: &WarehouseConfig) -> Self {
        Self {
            account: config.account.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            warehouse: config.warehouse.clone(),
            database: config.database.clone(),
            schema: config.schema.clone(),
            role: config.role.clone(),
        }
    }
}

impl fmt::Display for WarehouseConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} warehouse={} schema={}.{}",
            self.user, self.account, self.warehouse, self.database, self.schema
        )?;
        if let Some(role) = &self.role {
            write!(f, " role={role}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for WarehouseConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseConnection")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("role", &self.role)
            .finish()
    }
}

/// Serves warehouse tables from a local directory of CSV exports,
/// one `<TABLE>.csv` per table.
#[derive(Debug, Clone)]
pub struct MirrorWarehouse {
    root: PathBuf,
    connection: Option<WarehouseConnection>,
}

impl MirrorWarehouse {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            connection: None,
        }
    }

    /// `None` when no `mirror_dir` is configured.
    pub fn from_config(config: &WarehouseConfig) -> Option<Self> {
        let root = config.mirror_dir.as_ref()?;
        let connection = WarehouseConnection::from(config);
        info!(%connection, mirror = %root.display(), "warehouse tables served from mirror");
        Some(Self {
            root: root.clone(),
            connection: Some(connection),
        })
    }

    pub fn connection(&self) -> Option<&WarehouseConnection> {
        self.connection.as_ref()
    }

    fn qualify(&self, table: &str) -> String {
        match &self.connection {
            Some(connection) => connection.qualify(table),
            None => table.to_string(),
        }
    }
}

impl Warehouse for MirrorWarehouse {
    fn fetch_table(&self, table: &str) -> Result<RawTable, WarehouseError> {
        validate_table_name(table)?;
        let path = self.root.join(format!("{table}.csv"));
        if !path.is_file() {
            return Err(WarehouseError::TableNotFound(self.qualify(table)));
        }
        debug!(table = %self.qualify(table), path = %path.display(), "reading mirrored table");
        let file = File::open(&path).map_err(|e| WarehouseError::Query(e.to_string()))?;
        read_csv_from(file).map_err(|e| WarehouseError::Query(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Session-scoped memo of loaded datasets.
///
/// Repeated calls with the same key return the same `Arc`. Failed loads are
/// not remembered, so the next interaction tries the source again. There is
/// no retry within a single call.
#[derive(Default)]
pub struct DatasetCache {
    warehouse: Option<Arc<dyn Warehouse>>,
    entries: HashMap<SourceKey, Arc<Dataset>>,
    hits: u64,
    misses: u64,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_warehouse(warehouse: Arc<dyn Warehouse>) -> Self {
        Self {
            warehouse: Some(warehouse),
            ..Self::default()
        }
    }

    pub fn get(&mut self, key: &SourceKey) -> Result<Arc<Dataset>, PipelineError> {
        if let Some(dataset) = self.entries.get(key) {
            self.hits += 1;
            debug!(source = %key, "dataset cache hit");
            return Ok(Arc::clone(dataset));
        }

        self.misses += 1;
        let dataset = match self.fetch(key) {
            Ok(dataset) => Arc::new(dataset),
            Err(e) => {
                warn!(source = %key, error = %e, "dataset unavailable");
                return Err(e);
            }
        };
        info!(source = %key, rows = dataset.len(), columns = dataset.schema().len(), "dataset loaded");
        self.entries.insert(key.clone(), Arc::clone(&dataset));
        Ok(dataset)
    }

    fn fetch(&self, key: &SourceKey) -> Result<Dataset, PipelineError> {
        let raw = match key {
            SourceKey::File(path) => read_csv(path)?,
            SourceKey::Table(table) => {
                let warehouse = self
                    .warehouse
                    .as_ref()
                    .ok_or_else(|| PipelineError::unavailable(key, "no warehouse connection configured"))?;
                warehouse
                    .fetch_table(table)
                    .map_err(|e| PipelineError::unavailable(key, e))?
            }
            SourceKey::Derived(_) => {
                return Err(PipelineError::unavailable(key, "derived datasets cannot be fetched"))
            }
        };
        Ok(normalize::build_dataset(key.clone(), raw))
    }

    /// Memoizes a dataset built from other cached datasets under
    /// `SourceKey::Derived(name)`. Sources never change within a session, so
    /// neither does the derived result.
    pub fn derive<F>(&mut self, name: &str, build: F) -> Result<Arc<Dataset>, PipelineError>
    where
        F: FnOnce(&mut Self) -> Result<Dataset, PipelineError>,
    {
        let key = SourceKey::Derived(name.to_string());
        if let Some(dataset) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(Arc::clone(dataset));
        }
        self.misses += 1;
        let dataset = Arc::new(build(self)?);
        debug!(source = %key, rows = dataset.len(), "derived dataset built");
        self.entries.insert(key, Arc::clone(&dataset));
        Ok(dataset)
    }

    pub fn contains(&self, key: &SourceKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingWarehouse {
        calls: AtomicUsize,
    }

    impl Warehouse for CountingWarehouse {
        fn fetch_table(&self, table: &str) -> Result<RawTable, WarehouseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match table {
                "HERITAGE_SITES" => Ok(RawTable {
                    headers: vec!["SITE NAME".into(), "YEAR LISTED".into()],
                    rows: vec![vec![Some("Hampi".into()), Some("1986".into())]],
                }),
                other => Err(WarehouseError::TableNotFound(other.to_string())),
            }
        }
    }

    #[test]
    fn csv_headers_are_trimmed_and_empty_cells_are_none() {
        let raw = read_csv_from(" State ,Visitors\nOdisha,\n".as_bytes()).unwrap();
        assert_eq!(raw.headers, vec!["State", "Visitors"]);
        assert_eq!(raw.rows, vec![vec![Some("Odisha".to_string()), None]]);
    }

    #[test]
    fn same_key_returns_same_dataset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "State,Metric\nOdisha,100").unwrap();
        let key = SourceKey::File(file.path().to_path_buf());

        let mut cache = DatasetCache::new();
        let first = cache.get(&key).unwrap();
        let second = cache.get(&key).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            CacheStats {
                entries: 1,
                hits: 1,
                misses: 1
            }
        );
    }

    #[test]
    fn missing_file_is_unavailable_and_not_cached() {
        let key = SourceKey::File(PathBuf::from("/definitely/not/here.csv"));
        let mut cache = DatasetCache::new();
        assert!(matches!(
            cache.get(&key),
            Err(PipelineError::DataUnavailable { .. })
        ));
        assert!(!cache.contains(&key));
    }

    #[test]
    fn tables_go_through_the_warehouse_once() {
        let warehouse = Arc::new(CountingWarehouse {
            calls: AtomicUsize::new(0),
        });
        let mut cache = DatasetCache::with_warehouse(warehouse.clone());
        let key = SourceKey::Table("HERITAGE_SITES".into());

        cache.get(&key).unwrap();
        cache.get(&key).unwrap();
        assert_eq!(warehouse.calls.load(Ordering::SeqCst), 1);

        let missing = SourceKey::Table("NOPE".into());
        assert!(cache.get(&missing).is_err());
        assert!(cache.get(&missing).is_err());
        assert_eq!(warehouse.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn tables_without_warehouse_are_unavailable() {
        let mut cache = DatasetCache::new();
        let err = cache
            .get(&SourceKey::Table("HERITAGE_SITES".into()))
            .unwrap_err();
        assert!(err.to_string().contains("no warehouse"));
    }

    #[test]
    fn derived_datasets_are_built_once() {
        let mut cache = DatasetCache::new();
        let mut builds = 0;
        for _ in 0..2 {
            cache
                .derive("combined", |_| {
                    builds += 1;
                    Ok(normalize::build_dataset(
                        SourceKey::Derived("combined".into()),
                        RawTable::default(),
                    ))
                })
                .unwrap();
        }
        assert_eq!(builds, 1);
        assert!(cache.contains(&SourceKey::Derived("combined".into())));
    }

    #[test]
    fn mirror_rejects_odd_table_names() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = MirrorWarehouse::new(dir.path());
        assert!(matches!(
            mirror.fetch_table("x; DROP TABLE y"),
            Err(WarehouseError::InvalidTableName(_))
        ));
        assert!(matches!(
            mirror.fetch_table("ABSENT"),
            Err(WarehouseError::TableNotFound(_))
        ));
    }

    #[test]
    fn mirror_carries_the_configured_connection() {
        let dir = tempfile::tempdir().unwrap();
        let config: WarehouseConfig = toml::from_str(&format!(
            r#"
            user = "analyst"
            password = "hunter2"
            account = "acme-1"
            warehouse = "COMPUTE_WH"
            database = "CULTURE"
            schema = "PUBLIC"
            role = "READER"
            mirror_dir = {:?}
            "#,
            dir.path().display().to_string()
        ))
        .unwrap();
        let mirror = MirrorWarehouse::from_config(&config).unwrap();

        let connection = mirror.connection().unwrap();
        assert_eq!(connection.qualify("DATASET_FORTS"), "CULTURE.PUBLIC.DATASET_FORTS");
        assert_eq!(
            connection.to_string(),
            "analyst@acme-1 warehouse=COMPUTE_WH schema=CULTURE.PUBLIC role=READER"
        );
        assert!(!format!("{connection:?}").contains("hunter2"));

        match mirror.fetch_table("ABSENT") {
            Err(WarehouseError::TableNotFound(name)) => assert_eq!(name, "CULTURE.PUBLIC.ABSENT"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn no_mirror_dir_means_no_warehouse() {
        let config: WarehouseConfig = toml::from_str(
            r#"
            user = "u"
            password = "p"
            account = "a"
            warehouse = "w"
            database = "d"
            schema = "s"
            "#,
        )
        .unwrap();
        assert!(MirrorWarehouse::from_config(&config).is_none());
    }

    #[test]
    fn concat_takes_header_union() {
        let temples = RawTable {
            headers: vec!["Name".into(), "State".into()],
            rows: vec![vec![Some("Konark".into()), Some("Odisha".into())]],
        };
        let mut forts = RawTable {
            headers: vec!["Name".into(), "Built".into()],
            rows: vec![vec![Some("Amber".into()), Some("1592".into())]],
        };
        forts.push_constant_column("Type", "Forts");

        let merged = RawTable::concat(vec![temples, forts]);
        assert_eq!(merged.headers, vec!["Name", "State", "Built", "Type"]);
        assert_eq!(merged.rows[0], vec![Some("Konark".into()), Some("Odisha".into()), None, None]);
        assert_eq!(
            merged.rows[1],
            vec![Some("Amber".into()), None, Some("1592".into()), Some("Forts".into())]
        );
    }
}
