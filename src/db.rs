// 💾 Policy Database - per-type SQLite tables, CSV import, store adapter
// Each policy type keeps its own table shape; lookups go through `binding`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::error::LookupError;
use crate::normalize::canonicalize;
use crate::policy::{PolicyRecord, PolicyTypeTag, UserId};
use crate::store::PolicyStore;

// ============================================================================
// TABLE BINDINGS
// Each policy type lives in its own table with its own shape.
// ============================================================================

/// Where a policy type is stored and which columns hold the matchable fields
#[derive(Debug, Clone, Copy)]
pub struct TableBinding {
    pub table: &'static str,
    pub number_column: &'static str,
    pub insurer_column: &'static str,
}

pub fn binding(policy_type: PolicyTypeTag) -> TableBinding {
    match policy_type {
        PolicyTypeTag::Health => TableBinding {
            table: "health_policies",
            number_column: "policy_number",
            insurer_column: "insurer_name",
        },
        PolicyTypeTag::MotorPrivate => TableBinding {
            table: "motor_private_policies",
            number_column: "policy_number",
            insurer_column: "insurer_name",
        },
        PolicyTypeTag::MotorCommercial => TableBinding {
            table: "motor_commercial_policies",
            number_column: "certificate_number",
            insurer_column: "insurer_name",
        },
        PolicyTypeTag::Life => TableBinding {
            table: "life_policies",
            number_column: "policy_number",
            insurer_column: "insurer_name",
        },
        PolicyTypeTag::Home => TableBinding {
            table: "home_policies",
            number_column: "policy_number",
            insurer_column: "insurer_name",
        },
        PolicyTypeTag::Travel => TableBinding {
            table: "travel_policies",
            number_column: "policy_number",
            insurer_column: "provider",
        },
    }
}

/// Type-specific columns, all nullable
fn extra_columns(policy_type: PolicyTypeTag) -> &'static str {
    match policy_type {
        PolicyTypeTag::Health => "sum_insured REAL, members_covered INTEGER",
        PolicyTypeTag::MotorPrivate => "registration_number TEXT, vehicle_make TEXT",
        PolicyTypeTag::MotorCommercial => "registration_number TEXT, fleet_size INTEGER",
        PolicyTypeTag::Life => "sum_assured REAL, nominee TEXT",
        PolicyTypeTag::Home => "property_address TEXT, rebuild_value REAL",
        PolicyTypeTag::Travel => "destination TEXT, trip_start TEXT, trip_end TEXT",
    }
}

// ============================================================================
// NEW POLICY (write side, used by import)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPolicy {
    pub id: String,
    pub owner: UserId,
    pub policy_type: PolicyTypeTag,
    pub policy_number: String,
    pub insurer_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewPolicy {
    pub fn new(
        owner: UserId,
        policy_type: PolicyTypeTag,
        policy_number: impl Into<String>,
        insurer_name: Option<String>,
    ) -> Self {
        NewPolicy {
            id: uuid::Uuid::new_v4().to_string(),
            owner,
            policy_type,
            policy_number: policy_number.into(),
            insurer_name,
            created_at: Utc::now(),
        }
    }

    /// Same user, type and canonical number → same hash.
    /// NOTE: this is for import idempotency, not identity (that's `id`).
    pub fn compute_idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}",
            self.owner,
            self.policy_type,
            canonicalize(&self.policy_number)
        ));
        format!("{:x}", hasher.finalize())
    }
}

/// One CSV row: user_id,policy_type,policy_number,insurer_name
#[derive(Debug, Deserialize)]
struct CsvPolicyRow {
    user_id: String,
    policy_type: String,
    policy_number: String,
    #[serde(default)]
    insurer_name: Option<String>,
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    for policy_type in PolicyTypeTag::ALL {
        let b = binding(policy_type);

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    idempotency_hash TEXT UNIQUE NOT NULL,
                    {number} TEXT NOT NULL,
                    {insurer} TEXT,
                    {extra},
                    created_at TEXT NOT NULL
                )",
                table = b.table,
                number = b.number_column,
                insurer = b.insurer_column,
                extra = extra_columns(policy_type),
            ),
            [],
        )
        .with_context(|| format!("Failed to create table {}", b.table))?;

        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_user ON {table}(user_id)",
                table = b.table
            ),
            [],
        )?;
    }

    Ok(())
}

// ============================================================================
// IMPORT
// ============================================================================

pub fn load_csv(csv_path: &Path) -> Result<Vec<NewPolicy>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;

    let mut policies = Vec::new();

    for (index, result) in rdr.deserialize().enumerate() {
        let row: CsvPolicyRow = result.context("Failed to deserialize policy row")?;

        let policy_type: PolicyTypeTag = row
            .policy_type
            .parse()
            .with_context(|| format!("Row {}: bad policy type", index + 2))?;

        let insurer_name = row.insurer_name.filter(|name| !name.trim().is_empty());

        policies.push(NewPolicy::new(
            UserId::new(row.user_id.trim()),
            policy_type,
            row.policy_number,
            insurer_name,
        ));
    }

    Ok(policies)
}

/// Insert policies, skipping any already present (same idempotency hash).
/// Returns the number inserted.
pub fn insert_policies(conn: &Connection, policies: &[NewPolicy]) -> Result<usize> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for policy in policies {
        let b = binding(policy.policy_type);
        let hash = policy.compute_idempotency_hash();

        let result = conn.execute(
            &format!(
                "INSERT INTO {} (id, user_id, idempotency_hash, {}, {}, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                b.table, b.number_column, b.insurer_column
            ),
            params![
                policy.id,
                policy.owner.as_str(),
                hash,
                policy.policy_number,
                policy.insurer_name,
                policy.created_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                debug!(
                    user = %policy.owner,
                    policy_type = %policy.policy_type,
                    policy_number = %policy.policy_number,
                    "skipping policy already on record"
                );
                duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(inserted, duplicates, "policy import finished");

    Ok(inserted)
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn get_policies_for_user(
    conn: &Connection,
    user: &UserId,
    policy_type: PolicyTypeTag,
) -> Result<Vec<PolicyRecord>> {
    let b = binding(policy_type);
    let mut stmt = conn.prepare(&format!(
        "SELECT id, user_id, {}, {}
         FROM {}
         WHERE user_id = ?1
         ORDER BY created_at, id",
        b.number_column, b.insurer_column, b.table
    ))?;

    let policies = stmt
        .query_map([user.as_str()], |row| {
            Ok(PolicyRecord {
                id: row.get(0)?,
                owner: UserId::new(row.get::<_, String>(1)?),
                policy_type,
                policy_number: row.get(2)?,
                insurer_name: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(policies)
}

pub fn get_policy(
    conn: &Connection,
    policy_type: PolicyTypeTag,
    id: &str,
) -> Result<Option<PolicyRecord>> {
    let b = binding(policy_type);

    let policy = conn
        .query_row(
            &format!(
                "SELECT id, user_id, {}, {} FROM {} WHERE id = ?1",
                b.number_column, b.insurer_column, b.table
            ),
            [id],
            |row| {
                Ok(PolicyRecord {
                    id: row.get(0)?,
                    owner: UserId::new(row.get::<_, String>(1)?),
                    policy_type,
                    policy_number: row.get(2)?,
                    insurer_name: row.get(3)?,
                })
            },
        )
        .optional()?;

    Ok(policy)
}

/// Total policies across all type tables
pub fn verify_count(conn: &Connection) -> Result<i64> {
    let mut total = 0;

    for policy_type in PolicyTypeTag::ALL {
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", binding(policy_type).table),
            [],
            |row| row.get(0),
        )?;
        total += count;
    }

    Ok(total)
}

// ============================================================================
// SQLITE POLICY STORE
// ============================================================================

/// Policy Store Adapter backed by the per-type SQLite tables
#[derive(Clone)]
pub struct SqlitePolicyStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePolicyStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        SqlitePolicyStore { conn }
    }

    /// Open (or create) the database file and make sure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {:?}", path))?;
        setup_database(&conn)?;
        Ok(Self::new(Arc::new(Mutex::new(conn))))
    }

    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }
}

#[async_trait]
impl PolicyStore for SqlitePolicyStore {
    async fn list_policies(
        &self,
        user: &UserId,
        policy_type: PolicyTypeTag,
    ) -> Result<Vec<PolicyRecord>, LookupError> {
        let conn = self.conn.clone();
        let user = user.clone();

        // rusqlite blocks; keep it off the async workers
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| LookupError::new(policy_type, "database lock poisoned"))?;

            get_policies_for_user(&conn, &user, policy_type)
                .map_err(|e| LookupError::new(policy_type, format!("{:#}", e)))
        })
        .await
        .map_err(|e| LookupError::new(policy_type, format!("lookup task failed: {}", e)))?
    }
}
