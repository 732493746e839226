//! Job data model.
//!
//! A `Job` pairs a `JobKind` (what to do) with a `run_at` instant (when).
//! Reminders are never cancelled in place: a `SendReminder` carries the due
//! date it was scheduled for, and the worker skips it if the plant's schedule
//! has moved on by the time it fires.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    /// First message from a newly claimed plant.
    SendWelcome { plant_id: String },
    /// Watering reminder for the due date the plant had when scheduled.
    SendReminder { plant_id: String, due_on: NaiveDate },
    /// Interpret a stored inbound WhatsApp message and reply.
    ProcessInbound { message_id: String },
    /// Catch-up pass over every active plant.
    DailySweep,
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::SendWelcome { .. } => "send_welcome",
            JobKind::SendReminder { .. } => "send_reminder",
            JobKind::ProcessInbound { .. } => "process_inbound",
            JobKind::DailySweep => "daily_sweep",
        }
    }

    fn label(&self) -> String {
        match self {
            JobKind::SendWelcome { plant_id } => format!("welcome:{plant_id}"),
            JobKind::SendReminder { plant_id, due_on } => format!("reminder:{plant_id}:{due_on}"),
            JobKind::ProcessInbound { message_id } => format!("inbound:{message_id}"),
            JobKind::DailySweep => "daily-sweep".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Transitions: `Pending → Running → Completed | Failed`, with
/// `Running → Pending` when a failed attempt is retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed { note: String },
    Failed { reason: String },
}

impl JobStatus {
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed { .. } => "completed",
            JobStatus::Failed { .. } => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed { .. } | JobStatus::Failed { .. })
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub label: String,
    pub kind: JobKind,
    pub run_at: DateTime<Utc>,
    pub status: JobStatus,
    /// Number of times the job has been started.
    #[serde(default)]
    pub attempts: u32,
    /// When set, completing the job queues the next occurrence at
    /// `run_at + recurrence`.
    #[serde(
        serialize_with = "serialize_duration_opt",
        deserialize_with = "deserialize_duration_opt",
        default
    )]
    pub recurrence: Option<Duration>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(kind: JobKind, run_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            label: kind.label(),
            kind,
            run_at,
            status: JobStatus::Pending,
            attempts: 0,
            recurrence: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn recurring(kind: JobKind, run_at: DateTime<Utc>, every: Duration) -> Self {
        Self {
            recurrence: Some(every),
            ..Self::new(kind, run_at)
        }
    }

    /// The pending job that follows this one, for recurring jobs. Occurrences
    /// missed while the server was down are skipped so the next one lands
    /// after `now`.
    pub fn next_occurrence(&self, now: DateTime<Utc>) -> Option<Job> {
        let every = chrono::Duration::from_std(self.recurrence?).ok()?;
        if every <= chrono::Duration::zero() {
            return None;
        }
        let mut next = self.run_at + every;
        while next <= now {
            next += every;
        }
        Some(Job::recurring(self.kind.clone(), next, self.recurrence?))
    }
}

// ---------------------------------------------------------------------------
// Serde helpers for Duration (serialized as seconds: u64)
// ---------------------------------------------------------------------------

fn serialize_duration_opt<S>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match d {
        Some(dur) => s.serialize_some(&dur.as_secs()),
        None => s.serialize_none(),
    }
}

fn deserialize_duration_opt<'de, D>(d: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<u64> = Option::deserialize(d)?;
    Ok(opt.map(Duration::from_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn kind_serializes_with_type_tag() {
        let kind = JobKind::SendReminder {
            plant_id: "p1".into(),
            due_on: NaiveDate::from_ymd_opt(2026, 5, 11).unwrap(),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "send_reminder");
        assert_eq!(json["due_on"], "2026-05-11");
        assert_eq!(kind.name(), "send_reminder");
        assert_eq!(Job::new(kind, Utc::now()).label, "reminder:p1:2026-05-11");
    }

    #[test]
    fn recurrence_round_trips_as_seconds() {
        let job = Job::recurring(JobKind::DailySweep, Utc::now(), Duration::from_secs(86_400));
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["recurrence"], 86_400);
        let back: Job = serde_json::from_value(json).unwrap();
        assert_eq!(back.recurrence, Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn next_occurrence_skips_missed_runs() {
        let run_at = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        let job = Job::recurring(JobKind::DailySweep, run_at, Duration::from_secs(86_400));
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap();
        let next = job.next_occurrence(now).unwrap();
        assert_eq!(next.run_at, Utc.with_ymd_and_hms(2026, 5, 5, 8, 0, 0).unwrap());
        assert_eq!(next.status, JobStatus::Pending);
        assert_ne!(next.id, job.id);

        let once = Job::new(JobKind::DailySweep, run_at);
        assert!(once.next_occurrence(now).is_none());
    }
}
