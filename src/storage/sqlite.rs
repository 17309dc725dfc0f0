use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use super::{Invocation, Storage};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult, TreeError};
use crate::evidence::{FileRef, MaterialEvidence};
use crate::fragments::{Fragment, FragmentCategory};
use crate::tree::{CauseNode, CauseTree, PreventiveMeasure};
use crate::workflow::{Accident, AnalysisStage, Severity, Witness};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create an in-memory database, for tests.
    ///
    /// A single connection is kept open for the lifetime of the pool, since
    /// every new connection to `:memory:` would see an empty database.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn decode_error(what: &str, err: impl std::fmt::Display) -> StorageError {
    StorageError::Decode {
        message: format!("{}: {}", what, err),
    }
}

fn not_found(entity: &str, id: &str) -> StorageError {
    StorageError::Query {
        message: format!("No {} with id {}", entity, id),
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_accident(&self, accident: &Accident) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accidents (id, accident_number, date, time, location, establishment,
                description, severity, victim_name, victim_first_name, victim_position,
                is_anonymized, stage, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&accident.id)
        .bind(&accident.accident_number)
        .bind(accident.date.format(DATE_FORMAT).to_string())
        .bind(&accident.time)
        .bind(&accident.location)
        .bind(&accident.establishment)
        .bind(&accident.description)
        .bind(accident.severity.map(|s| s.as_str()))
        .bind(&accident.victim_name)
        .bind(&accident.victim_first_name)
        .bind(&accident.victim_position)
        .bind(accident.is_anonymized)
        .bind(accident.stage.as_str())
        .bind(timestamp(&accident.created_at))
        .bind(timestamp(&accident.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_accident(&self, id: &str) -> StorageResult<Option<Accident>> {
        let row: Option<AccidentRow> = sqlx::query_as(
            r#"
            SELECT id, accident_number, date, time, location, establishment, description,
                severity, victim_name, victim_first_name, victim_position, is_anonymized,
                stage, created_at, updated_at
            FROM accidents
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Accident::try_from).transpose()
    }

    async fn update_accident(&self, accident: &Accident) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE accidents
            SET date = ?, time = ?, location = ?, establishment = ?, description = ?,
                severity = ?, victim_name = ?, victim_first_name = ?, victim_position = ?,
                is_anonymized = ?, stage = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(accident.date.format(DATE_FORMAT).to_string())
        .bind(&accident.time)
        .bind(&accident.location)
        .bind(&accident.establishment)
        .bind(&accident.description)
        .bind(accident.severity.map(|s| s.as_str()))
        .bind(&accident.victim_name)
        .bind(&accident.victim_first_name)
        .bind(&accident.victim_position)
        .bind(accident.is_anonymized)
        .bind(accident.stage.as_str())
        .bind(timestamp(&accident.updated_at))
        .bind(&accident.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(not_found("accident", &accident.id));
        }

        Ok(())
    }

    async fn list_accidents(&self) -> StorageResult<Vec<Accident>> {
        let rows: Vec<AccidentRow> = sqlx::query_as(
            r#"
            SELECT id, accident_number, date, time, location, establishment, description,
                severity, victim_name, victim_first_name, victim_position, is_anonymized,
                stage, created_at, updated_at
            FROM accidents
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Accident::try_from).collect()
    }

    async fn count_accidents_for_year(&self, year: i32) -> StorageResult<u32> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM accidents WHERE accident_number LIKE ?")
                .bind(format!("ACC-{}-%", year))
                .fetch_one(&self.pool)
                .await?;

        u32::try_from(count).map_err(|e| decode_error("accident count", e))
    }

    async fn create_witness(&self, witness: &Witness) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO witnesses (id, accident_id, first_name, last_name, position, testimony, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&witness.id)
        .bind(&witness.accident_id)
        .bind(&witness.first_name)
        .bind(&witness.last_name)
        .bind(&witness.position)
        .bind(&witness.testimony)
        .bind(timestamp(&witness.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_witness(&self, id: &str) -> StorageResult<Option<Witness>> {
        let row: Option<WitnessRow> = sqlx::query_as(
            r#"
            SELECT id, accident_id, first_name, last_name, position, testimony, created_at
            FROM witnesses
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn list_witnesses(&self, accident_id: &str) -> StorageResult<Vec<Witness>> {
        let rows: Vec<WitnessRow> = sqlx::query_as(
            r#"
            SELECT id, accident_id, first_name, last_name, position, testimony, created_at
            FROM witnesses
            WHERE accident_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(accident_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn create_fragment(&self, fragment: &Fragment) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO fragments (id, accident_id, witness_id, content, category, is_unusual, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&fragment.id)
        .bind(&fragment.accident_id)
        .bind(&fragment.witness_id)
        .bind(&fragment.content)
        .bind(fragment.category.as_str())
        .bind(fragment.is_unusual)
        .bind(timestamp(&fragment.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_fragment(&self, id: &str) -> StorageResult<Option<Fragment>> {
        let row: Option<FragmentRow> = sqlx::query_as(
            r#"
            SELECT id, accident_id, witness_id, content, category, is_unusual, created_at
            FROM fragments
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Fragment::try_from).transpose()
    }

    async fn update_fragment(&self, fragment: &Fragment) -> StorageResult<()> {
        // Content and owner are immutable once recorded.
        let result = sqlx::query("UPDATE fragments SET category = ?, is_unusual = ? WHERE id = ?")
            .bind(fragment.category.as_str())
            .bind(fragment.is_unusual)
            .bind(&fragment.id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found("fragment", &fragment.id));
        }

        Ok(())
    }

    async fn list_fragments(&self, accident_id: &str) -> StorageResult<Vec<Fragment>> {
        let rows: Vec<FragmentRow> = sqlx::query_as(
            r#"
            SELECT id, accident_id, witness_id, content, category, is_unusual, created_at
            FROM fragments
            WHERE accident_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(accident_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Fragment::try_from).collect()
    }

    async fn create_evidence(&self, evidence: &MaterialEvidence) -> StorageResult<()> {
        let (file_name, file_url) = file_columns(evidence);

        sqlx::query(
            r#"
            INSERT INTO material_evidence (id, accident_id, description, is_useful, file_name, file_url, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&evidence.id)
        .bind(&evidence.accident_id)
        .bind(&evidence.description)
        .bind(evidence.is_useful)
        .bind(file_name)
        .bind(file_url)
        .bind(timestamp(&evidence.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_evidence(&self, id: &str) -> StorageResult<Option<MaterialEvidence>> {
        let row: Option<EvidenceRow> = sqlx::query_as(
            r#"
            SELECT id, accident_id, description, is_useful, file_name, file_url, created_at
            FROM material_evidence
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn update_evidence(&self, evidence: &MaterialEvidence) -> StorageResult<()> {
        let (file_name, file_url) = file_columns(evidence);

        let result = sqlx::query(
            r#"
            UPDATE material_evidence
            SET description = ?, is_useful = ?, file_name = ?, file_url = ?
            WHERE id = ?
            "#,
        )
        .bind(&evidence.description)
        .bind(evidence.is_useful)
        .bind(file_name)
        .bind(file_url)
        .bind(&evidence.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(not_found("evidence", &evidence.id));
        }

        Ok(())
    }

    async fn list_evidence(&self, accident_id: &str) -> StorageResult<Vec<MaterialEvidence>> {
        let rows: Vec<EvidenceRow> = sqlx::query_as(
            r#"
            SELECT id, accident_id, description, is_useful, file_name, file_url, created_at
            FROM material_evidence
            WHERE accident_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(accident_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn save_cause_tree(&self, tree: &CauseTree) -> StorageResult<()> {
        let nodes = serde_json::to_string(tree.nodes()).map_err(|e| StorageError::Query {
            message: format!("Failed to encode tree nodes: {}", e),
        })?;
        let measures = serde_json::to_string(tree.measures()).map_err(|e| StorageError::Query {
            message: format!("Failed to encode preventive measures: {}", e),
        })?;
        let now = timestamp(&Utc::now());

        sqlx::query(
            r#"
            INSERT INTO cause_trees (accident_id, tree_data, preventive_measures, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(accident_id) DO UPDATE SET
                tree_data = excluded.tree_data,
                preventive_measures = excluded.preventive_measures,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(tree.accident_id())
        .bind(&nodes)
        .bind(&measures)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(
            accident_id = %tree.accident_id(),
            nodes = tree.nodes().len(),
            measures = tree.measures().len(),
            "Cause tree saved"
        );
        Ok(())
    }

    async fn get_cause_tree(&self, accident_id: &str) -> StorageResult<Option<CauseTree>> {
        let row: Option<CauseTreeRow> = sqlx::query_as(
            "SELECT accident_id, tree_data, preventive_measures FROM cause_trees WHERE accident_id = ?",
        )
        .bind(accident_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CauseTree::try_from).transpose()
    }

    async fn log_invocation(&self, invocation: &Invocation) -> StorageResult<()> {
        let input = serde_json::to_string(&invocation.input).unwrap_or_default();
        let output = invocation
            .output
            .as_ref()
            .map(|o| serde_json::to_string(o).unwrap_or_default());

        sqlx::query(
            r#"
            INSERT INTO invocations (id, accident_id, service, input, output, pipe_name, latency_ms, success, error, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&invocation.id)
        .bind(&invocation.accident_id)
        .bind(&invocation.service)
        .bind(&input)
        .bind(&output)
        .bind(&invocation.pipe_name)
        .bind(invocation.latency_ms)
        .bind(invocation.success)
        .bind(&invocation.error)
        .bind(timestamp(&invocation.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn file_columns(evidence: &MaterialEvidence) -> (Option<&str>, Option<&str>) {
    match &evidence.file_ref {
        Some(file) => (Some(file.file_name.as_str()), Some(file.file_url.as_str())),
        None => (None, None),
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct AccidentRow {
    id: String,
    accident_number: String,
    date: String,
    time: String,
    location: String,
    establishment: String,
    description: Option<String>,
    severity: Option<String>,
    victim_name: Option<String>,
    victim_first_name: Option<String>,
    victim_position: Option<String>,
    is_anonymized: bool,
    stage: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<AccidentRow> for Accident {
    type Error = StorageError;

    fn try_from(row: AccidentRow) -> Result<Self, Self::Error> {
        let stage = AnalysisStage::from_str(&row.stage).map_err(|e| decode_error("accident stage", e))?;
        let severity = row
            .severity
            .as_deref()
            .map(Severity::from_str)
            .transpose()
            .map_err(|e| decode_error("accident severity", e))?;

        Ok(Self {
            date: NaiveDate::parse_from_str(&row.date, DATE_FORMAT)
                .map_err(|e| decode_error("accident date", e))?,
            id: row.id,
            accident_number: row.accident_number,
            time: row.time,
            location: row.location,
            establishment: row.establishment,
            description: row.description,
            severity,
            victim_name: row.victim_name,
            victim_first_name: row.victim_first_name,
            victim_position: row.victim_position,
            is_anonymized: row.is_anonymized,
            stage,
            status: stage.status(),
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct WitnessRow {
    id: String,
    accident_id: String,
    first_name: String,
    last_name: String,
    position: Option<String>,
    testimony: Option<String>,
    created_at: String,
}

impl From<WitnessRow> for Witness {
    fn from(row: WitnessRow) -> Self {
        Self {
            id: row.id,
            accident_id: row.accident_id,
            first_name: row.first_name,
            last_name: row.last_name,
            position: row.position,
            testimony: row.testimony,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct FragmentRow {
    id: String,
    accident_id: String,
    witness_id: Option<String>,
    content: String,
    category: String,
    is_unusual: bool,
    created_at: String,
}

impl TryFrom<FragmentRow> for Fragment {
    type Error = StorageError;

    fn try_from(row: FragmentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            category: FragmentCategory::from_str(&row.category)
                .map_err(|e| decode_error("fragment category", e))?,
            id: row.id,
            accident_id: row.accident_id,
            witness_id: row.witness_id,
            content: row.content,
            is_unusual: row.is_unusual,
            created_at: parse_timestamp(&row.created_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct EvidenceRow {
    id: String,
    accident_id: String,
    description: String,
    is_useful: bool,
    file_name: Option<String>,
    file_url: Option<String>,
    created_at: String,
}

impl From<EvidenceRow> for MaterialEvidence {
    fn from(row: EvidenceRow) -> Self {
        let file_ref = match (row.file_name, row.file_url) {
            (Some(file_name), Some(file_url)) => Some(FileRef {
                file_name,
                file_url,
            }),
            _ => None,
        };

        Self {
            id: row.id,
            accident_id: row.accident_id,
            description: row.description,
            is_useful: row.is_useful,
            file_ref,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CauseTreeRow {
    accident_id: String,
    tree_data: String,
    preventive_measures: String,
}

impl TryFrom<CauseTreeRow> for CauseTree {
    type Error = StorageError;

    fn try_from(row: CauseTreeRow) -> Result<Self, Self::Error> {
        let nodes: Vec<CauseNode> =
            serde_json::from_str(&row.tree_data).map_err(|e| decode_error("tree nodes", e))?;
        let measures: Vec<PreventiveMeasure> = serde_json::from_str(&row.preventive_measures)
            .map_err(|e| decode_error("preventive measures", e))?;

        // Any structural violation in stored data is a malformed tree.
        CauseTree::from_parts(row.accident_id, nodes, measures).map_err(|e| match e {
            TreeError::MalformedTree { .. } => StorageError::MalformedTree(e),
            other => StorageError::MalformedTree(TreeError::MalformedTree {
                message: other.to_string(),
            }),
        })
    }
}
