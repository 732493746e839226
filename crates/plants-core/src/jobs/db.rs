//! Persistent storage for background jobs using redb.
//!
//! # Table design
//!
//! A single `JOBS` table uses a 24-byte composite key:
//! ```text
//! [ run_at_ms: u64 big-endian (8 bytes) | uuid: 16 bytes ]
//! ```
//!
//! Byte order equals `run_at` order, so one range scan up to
//! `due_upper_bound(now)` yields every job due by `now`. Rescheduling a job
//! moves it to a new key.

use std::{path::Path, time::Duration};

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::error::{PlantsError, Result};

use super::job::{Job, JobStatus};

// ---------------------------------------------------------------------------
// Table definition
// ---------------------------------------------------------------------------

/// Key: 24-byte composite (run_at_ms big-endian ++ uuid bytes)
/// Value: JSON-encoded Job
const JOBS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("jobs");

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn job_key(ts: DateTime<Utc>, id: Uuid) -> [u8; 24] {
    let mut key = [0u8; 24];
    let ms = ts.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key[8..].copy_from_slice(id.as_bytes());
    key
}

/// Upper bound for a range scan returning all jobs due by `now`. The
/// `0xff` suffix sorts after any uuid.
fn due_upper_bound(now: DateTime<Utc>) -> [u8; 24] {
    let mut key = [0u8; 24];
    let ms = now.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key[8..].fill(0xff);
    key
}

fn db_err(e: impl std::fmt::Display) -> PlantsError {
    PlantsError::JobDb(e.to_string())
}

// ---------------------------------------------------------------------------
// JobDb
// ---------------------------------------------------------------------------

pub struct JobDb {
    db: Database,
}

impl JobDb {
    /// Open or create the database at `path`, creating the table if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(JOBS).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    pub fn insert(&self, job: &Job) -> Result<()> {
        let key = job_key(job.run_at, job.id);
        let value = serde_json::to_vec(job).map_err(db_err)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(JOBS).map_err(db_err)?;
            table
                .insert(key.as_slice(), value.as_slice())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        tracing::debug!(job = %job.label, run_at = %job.run_at, "job queued");
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Result<Job> {
        self.list_all()?
            .into_iter()
            .find(|j| j.id == id)
            .ok_or_else(|| PlantsError::JobNotFound(id.to_string()))
    }

    /// Replace the stored record for `old_run_at`/`job.id` with `job`,
    /// keyed by its (possibly new) `run_at`.
    fn replace(&self, old_run_at: DateTime<Utc>, job: &Job) -> Result<()> {
        let old_key = job_key(old_run_at, job.id);
        let new_key = job_key(job.run_at, job.id);
        let value = serde_json::to_vec(job).map_err(db_err)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(JOBS).map_err(db_err)?;
            table.remove(old_key.as_slice()).map_err(db_err)?;
            table
                .insert(new_key.as_slice(), value.as_slice())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    pub fn set_status(&self, id: Uuid, status: JobStatus) -> Result<Job> {
        let mut job = self.get(id)?;
        if matches!(status, JobStatus::Running) {
            job.attempts += 1;
        }
        job.status = status;
        job.updated_at = Utc::now();
        self.replace(job.run_at, &job)?;
        Ok(job)
    }

    /// Put a job back to `Pending` at a new time, keeping its attempt count.
    pub fn reschedule(&self, id: Uuid, run_at: DateTime<Utc>) -> Result<Job> {
        let mut job = self.get(id)?;
        let old_run_at = job.run_at;
        job.run_at = run_at;
        job.status = JobStatus::Pending;
        job.updated_at = Utc::now();
        self.replace(old_run_at, &job)?;
        Ok(job)
    }

    /// All `Pending` jobs with `run_at <= now`, oldest first.
    pub fn range_due(&self, now: DateTime<Utc>) -> Result<Vec<Job>> {
        let upper = due_upper_bound(now);
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(JOBS).map_err(db_err)?;

        let mut result = Vec::new();
        for entry in table.range(..=upper.as_slice()).map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            let job: Job = serde_json::from_slice(v.value()).map_err(db_err)?;
            if matches!(job.status, JobStatus::Pending) {
                result.push(job);
            }
        }
        Ok(result)
    }

    /// Put any `Running` job not touched for `max_age` back to `Pending` at
    /// its original `run_at`. The attempt count is kept, so the retry ceiling
    /// still applies. Returns the number recovered.
    pub fn startup_recovery(&self, max_age: Duration) -> Result<u32> {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).map_err(db_err)?;
        let mut count = 0u32;
        for job in self.list_all()? {
            if matches!(job.status, JobStatus::Running) && job.updated_at <= cutoff {
                self.reschedule(job.id, job.run_at)?;
                count += 1;
            }
        }
        if count > 0 {
            tracing::warn!(count, "recovered interrupted jobs");
        }
        Ok(count)
    }

    /// All jobs, newest `created_at` first.
    pub fn list_all(&self) -> Result<Vec<Job>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(JOBS).map_err(db_err)?;

        let mut result = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            let job: Job = serde_json::from_slice(v.value()).map_err(db_err)?;
            result.push(job);
        }
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    /// Whether a pending job of the given kind name exists.
    pub fn has_pending(&self, kind_name: &str) -> Result<bool> {
        Ok(self
            .list_all()?
            .iter()
            .any(|j| matches!(j.status, JobStatus::Pending) && j.kind.name() == kind_name))
    }

    /// Whether a pending job with exactly this label exists.
    pub fn has_pending_label(&self, label: &str) -> Result<bool> {
        Ok(self
            .list_all()?
            .iter()
            .any(|j| matches!(j.status, JobStatus::Pending) && j.label == label))
    }

    /// Delete finished jobs last updated before `before`. Returns the number
    /// removed.
    pub fn prune_finished(&self, before: DateTime<Utc>) -> Result<u32> {
        let stale: Vec<Job> = self
            .list_all()?
            .into_iter()
            .filter(|j| j.status.is_finished() && j.updated_at < before)
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(JOBS).map_err(db_err)?;
            for job in &stale {
                table
                    .remove(job_key(job.run_at, job.id).as_slice())
                    .map_err(db_err)?;
            }
        }
        wt.commit().map_err(db_err)?;
        Ok(stale.len() as u32)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::JobKind;
    use chrono::Duration as CDur;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, JobDb) {
        let dir = TempDir::new().unwrap();
        let db = JobDb::open(&dir.path().join("jobs.redb")).unwrap();
        (dir, db)
    }

    fn welcome_at(plant: &str, ts: DateTime<Utc>) -> Job {
        Job::new(
            JobKind::SendWelcome {
                plant_id: plant.into(),
            },
            ts,
        )
    }

    /// Rewrite a stored job directly, bypassing `updated_at` bookkeeping.
    fn backdate(db: &JobDb, id: Uuid, updated_at: DateTime<Utc>) {
        let mut job = db.get(id).unwrap();
        job.updated_at = updated_at;
        let key = job_key(job.run_at, job.id);
        let wt = db.db.begin_write().unwrap();
        {
            let mut table = wt.open_table(JOBS).unwrap();
            table.remove(key.as_slice()).unwrap();
            table
                .insert(key.as_slice(), serde_json::to_vec(&job).unwrap().as_slice())
                .unwrap();
        }
        wt.commit().unwrap();
    }

    #[test]
    fn range_due_returns_only_past_jobs_in_order() {
        let (_dir, db) = open_tmp();
        let now = Utc::now();
        db.insert(&welcome_at("late", now + CDur::seconds(60))).unwrap();
        db.insert(&welcome_at("second", now - CDur::milliseconds(50))).unwrap();
        db.insert(&welcome_at("first", now - CDur::milliseconds(200))).unwrap();

        let due = db.range_due(now).unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].label, "welcome:first");
        assert_eq!(due[1].label, "welcome:second");
    }

    #[test]
    fn running_jobs_are_not_due_and_count_attempts() {
        let (_dir, db) = open_tmp();
        let now = Utc::now();
        let job = welcome_at("p1", now - CDur::seconds(1));
        db.insert(&job).unwrap();
        let running = db.set_status(job.id, JobStatus::Running).unwrap();
        assert_eq!(running.attempts, 1);
        assert!(db.range_due(now).unwrap().is_empty());
    }

    #[test]
    fn reschedule_moves_job_and_keeps_attempts() {
        let (_dir, db) = open_tmp();
        let now = Utc::now();
        let job = welcome_at("p1", now - CDur::seconds(1));
        db.insert(&job).unwrap();
        db.set_status(job.id, JobStatus::Running).unwrap();

        let later = now + CDur::seconds(30);
        let moved = db.reschedule(job.id, later).unwrap();
        assert_eq!(moved.status, JobStatus::Pending);
        assert_eq!(moved.attempts, 1);
        assert!(db.range_due(now).unwrap().is_empty());
        assert_eq!(db.range_due(later).unwrap().len(), 1);
        assert_eq!(db.list_all().unwrap().len(), 1);
    }

    #[test]
    fn unknown_job_is_not_found() {
        let (_dir, db) = open_tmp();
        assert!(matches!(
            db.set_status(Uuid::new_v4(), JobStatus::Running),
            Err(PlantsError::JobNotFound(_))
        ));
    }

    #[test]
    fn startup_recovery_requeues_only_stale_running_jobs() {
        let (_dir, db) = open_tmp();
        let stale = welcome_at("stale", Utc::now() - CDur::minutes(1));
        let fresh = welcome_at("fresh", Utc::now() - CDur::minutes(1));
        db.insert(&stale).unwrap();
        db.insert(&fresh).unwrap();
        db.set_status(stale.id, JobStatus::Running).unwrap();
        db.set_status(fresh.id, JobStatus::Running).unwrap();
        backdate(&db, stale.id, Utc::now() - CDur::minutes(10));

        assert_eq!(db.startup_recovery(Duration::from_secs(120)).unwrap(), 1);
        let recovered = db.get(stale.id).unwrap();
        assert_eq!(recovered.status, JobStatus::Pending);
        assert_eq!(recovered.attempts, 1);
        assert_eq!(recovered.run_at, stale.run_at);
        assert_eq!(db.range_due(Utc::now()).unwrap().len(), 1);
        assert_eq!(db.get(fresh.id).unwrap().status, JobStatus::Running);
    }

    #[test]
    fn has_pending_matches_kind_and_label() {
        let (_dir, db) = open_tmp();
        assert!(!db.has_pending("daily_sweep").unwrap());
        let sweep = Job::recurring(JobKind::DailySweep, Utc::now(), Duration::from_secs(86_400));
        db.insert(&sweep).unwrap();
        assert!(db.has_pending("daily_sweep").unwrap());
        assert!(db.has_pending_label("daily-sweep").unwrap());
        assert!(!db.has_pending("send_welcome").unwrap());

        db.set_status(
            sweep.id,
            JobStatus::Completed {
                note: "ok".into(),
            },
        )
        .unwrap();
        assert!(!db.has_pending("daily_sweep").unwrap());
    }

    #[test]
    fn prune_removes_old_finished_jobs() {
        let (_dir, db) = open_tmp();
        let done = welcome_at("done", Utc::now() - CDur::days(40));
        let pending = welcome_at("pending", Utc::now() + CDur::days(1));
        db.insert(&done).unwrap();
        db.insert(&pending).unwrap();
        db.set_status(
            done.id,
            JobStatus::Completed {
                note: "sent".into(),
            },
        )
        .unwrap();
        backdate(&db, done.id, Utc::now() - CDur::days(40));

        assert_eq!(db.prune_finished(Utc::now() - CDur::days(30)).unwrap(), 1);
        let left = db.list_all().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, pending.id);
    }

    #[test]
    fn empty_db_is_quiet() {
        let (_dir, db) = open_tmp();
        assert!(db.range_due(Utc::now()).unwrap().is_empty());
        assert_eq!(db.startup_recovery(Duration::from_secs(60)).unwrap(), 0);
        assert_eq!(db.prune_finished(Utc::now()).unwrap(), 0);
    }
}
