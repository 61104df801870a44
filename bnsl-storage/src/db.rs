use crate::{LedgerError, PlanLedger};
use async_trait::async_trait;
use bnsl_types::{Plan, PlanId};
use chrono::NaiveDate;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::sync::Mutex;
use tracing::{debug, info, warn};

const PLAN_PREFIX: &str = "plan_";
const USER_PREFIX: &str = "user_";

/// RocksDB-backed ledger. Rows are bincode-encoded plans keyed `plan_<hex id>`;
/// `user_<user>_<hex id>` keys index plans by holder.
pub struct RocksPlanLedger {
    db: DB,
    // serialises the version check with the write that follows it
    write_lock: Mutex<()>,
}

fn plan_key(id: &PlanId) -> String {
    format!("{}{}", PLAN_PREFIX, hex::encode(id.0))
}

fn user_prefix(user_id: &str) -> String {
    format!("{}{}_", USER_PREFIX, hex::encode(user_id.as_bytes()))
}

fn backend(e: rocksdb::Error) -> LedgerError {
    LedgerError::Backend(e.to_string())
}

fn encode(plan: &Plan) -> Result<Vec<u8>, LedgerError> {
    bincode::serialize(plan).map_err(|e| LedgerError::Codec(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Plan, LedgerError> {
    bincode::deserialize(bytes).map_err(|e| LedgerError::Codec(e.to_string()))
}

impl RocksPlanLedger {
    pub fn open(path: &str) -> Result<Self, LedgerError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path).map_err(backend)?;
        info!("Plan ledger opened at {}", path);
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn get(&self, id: &PlanId) -> Result<Option<Plan>, LedgerError> {
        match self.db.get(plan_key(id).as_bytes()).map_err(backend)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>, LedgerError> {
        let mut rows = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(backend)?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            rows.push((key, value));
        }
        Ok(rows)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, LedgerError> {
        self.write_lock
            .lock()
            .map_err(|_| LedgerError::Backend("ledger write lock poisoned".to_string()))
    }
}

#[async_trait]
impl PlanLedger for RocksPlanLedger {
    async fn insert(&self, plan: &Plan) -> Result<(), LedgerError> {
        let _guard = self.lock()?;
        if self.get(&plan.id)?.is_some() {
            return Err(LedgerError::AlreadyExists(plan.id));
        }
        let mut stored = plan.clone();
        stored.version = 0;

        let mut batch = WriteBatch::default();
        batch.put(plan_key(&plan.id).as_bytes(), encode(&stored)?);
        let index_key = format!("{}{}", user_prefix(&plan.user_id), hex::encode(plan.id.0));
        batch.put(index_key.as_bytes(), b"");
        self.db.write(batch).map_err(backend)?;
        debug!(plan = %plan.id, user = %plan.user_id, "Plan inserted");
        Ok(())
    }

    async fn load(&self, id: &PlanId) -> Result<Plan, LedgerError> {
        self.get(id)?.ok_or(LedgerError::NotFound(*id))
    }

    async fn save(&self, plan: &Plan) -> Result<u64, LedgerError> {
        let _guard = self.lock()?;
        let stored = self.get(&plan.id)?.ok_or(LedgerError::NotFound(plan.id))?;
        if stored.version != plan.version {
            warn!(plan = %plan.id, expected = plan.version, found = stored.version, "Stale plan save refused");
            return Err(LedgerError::VersionConflict {
                plan_id: plan.id,
                expected: plan.version,
                found: stored.version,
            });
        }
        let mut next = plan.clone();
        next.version = plan.version + 1;
        self.db
            .put(plan_key(&plan.id).as_bytes(), encode(&next)?)
            .map_err(backend)?;
        debug!(plan = %plan.id, version = next.version, status = ?plan.status, "Plan saved");
        Ok(next.version)
    }

    async fn find_due_plans(&self, today: NaiveDate) -> Result<Vec<Plan>, LedgerError> {
        let mut due = Vec::new();
        for (_, value) in self.scan_prefix(PLAN_PREFIX)? {
            let plan = decode(&value)?;
            if plan.is_due(today) {
                due.push(plan);
            }
        }
        due.sort_by_key(|p| p.created_at);
        Ok(due)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Plan>, LedgerError> {
        let prefix = user_prefix(user_id);
        let mut plans = Vec::new();
        for (key, _) in self.scan_prefix(&prefix)? {
            let id_hex = String::from_utf8_lossy(&key[prefix.len()..]).to_string();
            let id: PlanId = id_hex
                .parse()
                .map_err(|e: bnsl_types::PlanError| LedgerError::Codec(e.to_string()))?;
            plans.push(self.load(&id).await?);
        }
        plans.sort_by_key(|p| p.created_at);
        Ok(plans)
    }
}
