//! Background jobs.
//!
//! A single loop wakes every `reminders.tick_seconds`, runs every pending job
//! whose `run_at` has passed, and records the outcome in the job queue.
//! Failed attempts are retried with exponential backoff. Reminders are never
//! cancelled: a `SendReminder` re-checks the plant when it fires and skips
//! itself if the schedule has moved on. An inbound reply is stamped in the
//! same transaction as the watering or feedback it carries, so a retry only
//! re-sends the answer.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use plants_core::dates::reminder_instant;
use plants_core::inbound::{parse_intent, resolve_plant, Intent, PlantName};
use plants_core::jobs::{Job, JobKind, JobStatus};
use plants_core::personality::{render, MessageContext, MessageKind};
use plants_core::store::{PlantDetail, ReplyEffect, User};
use plants_core::types::MessageDirection;

use crate::messaging::deliver;
use crate::state::AppState;

const SWEEP_EVERY: Duration = Duration::from_secs(24 * 60 * 60);
/// How recent a reminder must be for a bare "watered" to count for that plant.
const REPLY_WINDOW_HOURS: i64 = 48;
/// Minimum gap between overdue nudges for the same plant.
const NUDGE_GAP_HOURS: i64 = 24;
const FINISHED_JOB_RETENTION_DAYS: i64 = 14;

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Recover jobs interrupted by a restart and make sure the daily sweep is
/// queued.
pub async fn startup(state: &AppState) -> anyhow::Result<()> {
    let recovered = state
        .with_jobs(|db| db.startup_recovery(Duration::ZERO))
        .await?;
    if recovered > 0 {
        tracing::info!(recovered, "worker recovered interrupted jobs");
    }
    ensure_daily_sweep(state, Utc::now()).await?;
    Ok(())
}

pub fn spawn(state: AppState) -> tokio::task::JoinHandle<()> {
    let every = Duration::from_secs(state.config.reminders.tick_seconds.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = tick(&state, Utc::now()).await {
                tracing::error!(error = %e, "worker tick failed");
            }
        }
    })
}

/// Run every job due at `now`. Returns how many were started.
pub async fn tick(state: &AppState, now: DateTime<Utc>) -> anyhow::Result<u32> {
    let due = state.with_jobs(move |db| db.range_due(now)).await?;
    Ok(run_batch(state, due, now).await)
}

/// A job whose queue bookkeeping fails is logged and the rest of the batch
/// still runs.
async fn run_batch(state: &AppState, due: Vec<Job>, now: DateTime<Utc>) -> u32 {
    let mut started = 0u32;
    for job in due {
        let (id, kind) = (job.id, job.kind.name());
        match run_job(state, job, now).await {
            Ok(()) => started += 1,
            Err(e) => tracing::error!(job_id = %id, kind, error = %e, "job bookkeeping failed"),
        }
    }
    started
}

async fn run_job(state: &AppState, job: Job, now: DateTime<Utc>) -> anyhow::Result<()> {
    let id = job.id;
    let job = state
        .with_jobs(move |db| db.set_status(id, JobStatus::Running))
        .await?;
    let kind = job.kind.name();
    let attempt = job.attempts;
    tracing::info!(job_id = %id, kind, attempt, "job started");

    let finished = match dispatch(state, &job.kind, now).await {
        Ok(note) => {
            tracing::info!(job_id = %id, kind, attempt, note = %note, "job completed");
            state
                .with_jobs(move |db| db.set_status(id, JobStatus::Completed { note }))
                .await?;
            true
        }
        Err(e) if attempt < state.config.reminders.max_attempts => {
            let delay = retry_delay(state.config.reminders.retry_base_seconds, attempt);
            let run_at = now + chrono::Duration::seconds(delay as i64);
            tracing::warn!(job_id = %id, kind, attempt, error = %e, retry_at = %run_at, "job failed, retrying");
            state.with_jobs(move |db| db.reschedule(id, run_at)).await?;
            false
        }
        Err(e) => {
            tracing::error!(job_id = %id, kind, attempt, error = %e, "job failed");
            let reason = format!("{e:#}");
            state
                .with_jobs(move |db| db.set_status(id, JobStatus::Failed { reason }))
                .await?;
            true
        }
    };

    if finished {
        if let Some(next) = job.next_occurrence(now) {
            tracing::debug!(kind, run_at = %next.run_at, "queued next occurrence");
            state.with_jobs(move |db| db.insert(&next)).await?;
        }
    }
    Ok(())
}

/// Seconds to wait before retry number `attempt` (1-based).
pub fn retry_delay(base_seconds: u64, attempt: u32) -> u64 {
    let exp = attempt.saturating_sub(1).min(16);
    base_seconds.saturating_mul(1u64 << exp)
}

async fn dispatch(state: &AppState, kind: &JobKind, now: DateTime<Utc>) -> anyhow::Result<String> {
    match kind {
        JobKind::SendWelcome { plant_id } => send_welcome(state, plant_id).await,
        JobKind::SendReminder { plant_id, due_on } => send_reminder(state, plant_id, *due_on, now).await,
        JobKind::ProcessInbound { message_id } => process_inbound(state, message_id, now).await,
        JobKind::DailySweep => daily_sweep(state, now).await,
    }
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

fn next_sweep_at(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let today = now.date_naive();
    let at = |date: chrono::NaiveDate| {
        date.and_hms_opt(hour.min(23), 0, 0)
            .map(|dt| Utc.from_utc_datetime(&dt))
            .unwrap_or(now)
    };
    let candidate = at(today);
    if candidate > now {
        candidate
    } else {
        at(today + chrono::Days::new(1))
    }
}

/// Queue the recurring daily sweep unless one is already pending.
pub async fn ensure_daily_sweep(state: &AppState, now: DateTime<Utc>) -> anyhow::Result<Option<Job>> {
    let run_at = next_sweep_at(now, state.config.reminders.daily_sweep_hour);
    let job = state
        .with_jobs(move |db| {
            if db.has_pending(JobKind::DailySweep.name())? {
                return Ok(None);
            }
            let job = Job::recurring(JobKind::DailySweep, run_at, SWEEP_EVERY);
            db.insert(&job)?;
            Ok(Some(job))
        })
        .await?;
    if let Some(j) = &job {
        tracing::info!(run_at = %j.run_at, "daily sweep scheduled");
    }
    Ok(job)
}

/// Queue a `SendWelcome` to run right away.
pub async fn queue_welcome(state: &AppState, plant_id: &str) -> anyhow::Result<Job> {
    let job = Job::new(
        JobKind::SendWelcome {
            plant_id: plant_id.to_string(),
        },
        Utc::now(),
    );
    let queued = job.clone();
    state.with_jobs(move |db| db.insert(&queued)).await?;
    Ok(job)
}

/// Queue processing of a stored inbound message.
pub async fn queue_inbound(state: &AppState, message_id: &str) -> anyhow::Result<Job> {
    let job = Job::new(
        JobKind::ProcessInbound {
            message_id: message_id.to_string(),
        },
        Utc::now(),
    );
    let queued = job.clone();
    state.with_jobs(move |db| db.insert(&queued)).await?;
    Ok(job)
}

/// Queue the reminder for the plant's current due date at the owner's
/// reminder hour. Nothing is queued when that moment has already passed (the
/// daily sweep catches up) or an identical reminder is already pending.
pub async fn schedule_reminder(
    state: &AppState,
    plant_id: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<Job>> {
    let (detail, owner) = load_plant(state, plant_id).await?;
    if !detail.plant.is_active() || owner.reminders_paused {
        return Ok(None);
    }
    let schedule = detail.schedule(&owner, now);
    let run_at = reminder_instant(schedule.next_due, owner.reminder_hour, owner.utc_offset_minutes);
    if run_at <= now {
        return Ok(None);
    }
    let job = Job::new(
        JobKind::SendReminder {
            plant_id: plant_id.to_string(),
            due_on: schedule.next_due,
        },
        run_at,
    );
    let queued = job.clone();
    let inserted = state
        .with_jobs(move |db| {
            if db.has_pending_label(&queued.label)? {
                return Ok(false);
            }
            db.insert(&queued)?;
            Ok(true)
        })
        .await?;
    if !inserted {
        return Ok(None);
    }
    tracing::debug!(plant_id, due_on = %schedule.next_due, run_at = %run_at, "reminder scheduled");
    Ok(Some(job))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn load_plant(state: &AppState, plant_id: &str) -> anyhow::Result<(PlantDetail, User)> {
    let plant_id = plant_id.to_string();
    state
        .with_store(move |s| {
            let detail = s.get_plant_detail(&plant_id)?;
            let owner = s.get_user(&detail.plant.user_id)?;
            Ok((detail, owner))
        })
        .await
}

fn context(owner: &User, voice: Option<&PlantDetail>) -> MessageContext {
    MessageContext {
        plant: voice.map(|d| d.plant.nickname.clone()).unwrap_or_default(),
        species: voice.map(|d| d.species.common_name.clone()).unwrap_or_default(),
        owner: owner.first_name(),
        days: None,
        plants: None,
    }
}

/// Render `kind` in the plant's voice and send it.
async fn speak(
    state: &AppState,
    owner: &User,
    voice: Option<&PlantDetail>,
    kind: MessageKind,
    ctx: MessageContext,
    variant: usize,
) -> anyhow::Result<()> {
    let personality = voice.map(|d| d.plant.personality).unwrap_or_default();
    let body = render(personality, kind, &ctx, variant);
    deliver(state, owner, voice.map(|d| &d.plant), &body).await?;
    Ok(())
}

async fn send_welcome(state: &AppState, plant_id: &str) -> anyhow::Result<String> {
    let (detail, owner) = load_plant(state, plant_id).await?;
    if !detail.plant.is_active() {
        return Ok("skipped: plant archived".into());
    }
    if owner.reminders_paused {
        return Ok("skipped: messages paused".into());
    }
    let ctx = context(&owner, Some(&detail));
    speak(state, &owner, Some(&detail), MessageKind::Welcome, ctx, 0).await?;
    Ok("welcome sent".into())
}

/// Send the reminder (or overdue nudge) for the plant's current due date and
/// remember that it went out.
async fn remind(
    state: &AppState,
    owner: &User,
    detail: &PlantDetail,
    now: DateTime<Utc>,
) -> anyhow::Result<MessageKind> {
    let schedule = detail.schedule(owner, now);
    let overdue = schedule.status.days_overdue();
    let kind = if overdue >= state.config.reminders.overdue_nudge_days.max(1) {
        MessageKind::Overdue
    } else {
        MessageKind::Reminder
    };
    let mut ctx = context(owner, Some(detail));
    ctx.days = Some(i64::from(overdue));
    speak(state, owner, Some(detail), kind, ctx, detail.watering_count as usize).await?;

    let plant_id = detail.plant.id.clone();
    let due_on = schedule.next_due;
    state
        .with_store(move |s| s.mark_reminded(&plant_id, due_on, now))
        .await?;
    Ok(kind)
}

async fn send_reminder(
    state: &AppState,
    plant_id: &str,
    due_on: chrono::NaiveDate,
    now: DateTime<Utc>,
) -> anyhow::Result<String> {
    let (detail, owner) = load_plant(state, plant_id).await?;
    if !detail.plant.is_active() {
        return Ok("skipped: plant archived".into());
    }
    if owner.reminders_paused {
        return Ok("skipped: reminders paused".into());
    }
    let schedule = detail.schedule(&owner, now);
    if schedule.next_due != due_on {
        return Ok(format!("skipped: now due {}", schedule.next_due));
    }
    if detail.plant.last_reminded_on == Some(due_on) {
        return Ok("skipped: already reminded".into());
    }
    remind(state, &owner, &detail, now).await?;
    Ok(format!("reminded for {due_on}"))
}

async fn process_inbound(state: &AppState, message_id: &str, now: DateTime<Utc>) -> anyhow::Result<String> {
    let message_id = message_id.to_string();
    let (message, owner, details, last_reminder) = state
        .with_store(move |s| {
            let message = s.get_message(&message_id)?;
            let owner = s.get_user(&message.user_id)?;
            let details = s.list_plant_details(&owner.id)?;
            let last = s.last_outbound_reminder(&owner.id)?;
            Ok((message, owner, details, last))
        })
        .await?;
    if message.direction != MessageDirection::Inbound {
        return Ok("skipped: not an inbound message".into());
    }

    let intent = parse_intent(&message.body);
    let names: Vec<PlantName> = details
        .iter()
        .map(|d| PlantName {
            id: d.plant.id.clone(),
            nickname: d.plant.nickname.clone(),
        })
        .collect();
    let window = chrono::Duration::hours(REPLY_WINDOW_HOURS);
    let recent = last_reminder
        .filter(|m| now - m.created_at <= window)
        .and_then(|m| m.plant_id);
    let target = resolve_plant(&message.body, &names, recent.as_deref())
        .and_then(|id| details.iter().find(|d| d.plant.id == id));

    if let Some(t) = target {
        let (msg_id, plant_id) = (message.id.clone(), t.plant.id.clone());
        state
            .with_store(move |s| s.set_message_plant(&msg_id, &plant_id))
            .await?;
    }
    let voice = target.or_else(|| details.first());
    tracing::info!(user_id = %owner.id, message_id = %message.id, ?intent, "inbound message");

    match intent {
        Intent::Pause | Intent::Resume => {
            let paused = intent == Intent::Pause;
            let user_id = owner.id.clone();
            state
                .with_store(move |s| s.set_paused(&user_id, paused, now))
                .await?;
            let kind = if paused {
                MessageKind::Paused
            } else {
                for d in &details {
                    schedule_reminder(state, &d.plant.id, now).await?;
                }
                MessageKind::Resumed
            };
            speak(state, &owner, voice, kind, context(&owner, voice), 0).await?;
            Ok(if paused { "paused" } else { "resumed" }.into())
        }
        Intent::Help | Intent::Unknown => {
            speak(state, &owner, voice, MessageKind::Help, context(&owner, voice), 0).await?;
            Ok("sent help".into())
        }
        Intent::Watered | Intent::Feedback(_) if details.is_empty() => {
            speak(state, &owner, None, MessageKind::Help, context(&owner, None), 0).await?;
            Ok("no plants".into())
        }
        Intent::Watered | Intent::Feedback(_) => {
            let Some(target) = target else {
                let mut ctx = context(&owner, voice);
                ctx.plants = Some(
                    details
                        .iter()
                        .map(|d| d.plant.nickname.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                );
                speak(state, &owner, voice, MessageKind::WhichPlant, ctx, 0).await?;
                return Ok("asked which plant".into());
            };
            let effect = match intent {
                Intent::Feedback(kind) => ReplyEffect::Feedback(kind),
                _ => ReplyEffect::Watered,
            };
            let (msg_id, plant_id) = (message.id.clone(), target.plant.id.clone());
            let pid = plant_id.clone();
            let (applied, bias) = state
                .with_store(move |s| {
                    let applied = s.apply_reply(&msg_id, &pid, effect, now)?;
                    Ok((applied, s.get_plant(&pid)?.moisture_bias))
                })
                .await?;
            let (kind, mut note) = match effect {
                ReplyEffect::Feedback(feedback) => {
                    (MessageKind::FeedbackAck, format!("feedback {feedback}, bias {bias}"))
                }
                ReplyEffect::Watered => (MessageKind::Thanks, "watering recorded".to_string()),
            };
            if !applied {
                note.push_str(" earlier");
            }
            schedule_reminder(state, &plant_id, now).await?;
            let variant = target.watering_count as usize;
            speak(state, &owner, Some(target), kind, context(&owner, Some(target)), variant).await?;
            Ok(note)
        }
    }
}

async fn daily_sweep(state: &AppState, now: DateTime<Utc>) -> anyhow::Result<String> {
    let plants = state
        .with_store(|s| {
            let mut out = Vec::new();
            for plant in s.list_all_active_plants()? {
                let owner = s.get_user(&plant.user_id)?;
                if owner.reminders_paused {
                    continue;
                }
                out.push((s.get_plant_detail(&plant.id)?, owner));
            }
            Ok(out)
        })
        .await?;

    let nudge_days = state.config.reminders.overdue_nudge_days.max(1);
    let nudge_gap = chrono::Duration::hours(NUDGE_GAP_HOURS);
    let (mut sent, mut failed) = (0u32, 0u32);
    for (detail, owner) in &plants {
        let schedule = detail.schedule(owner, now);
        let plant_id = detail.plant.id.as_str();
        if !schedule.status.needs_water() {
            schedule_reminder(state, plant_id, now).await?;
            continue;
        }
        let reminded_for_due = detail.plant.last_reminded_on == Some(schedule.next_due);
        let send = if !reminded_for_due {
            // Due today but the owner's hour has not come yet: the queued
            // reminder handles it.
            let at = reminder_instant(schedule.next_due, owner.reminder_hour, owner.utc_offset_minutes);
            if schedule.status.days_overdue() == 0 && at > now {
                schedule_reminder(state, plant_id, now).await?;
                false
            } else {
                true
            }
        } else {
            schedule.status.days_overdue() >= nudge_days
                && detail
                    .plant
                    .last_reminded_at
                    .map_or(true, |at| now - at >= nudge_gap)
        };
        if !send {
            continue;
        }
        match remind(state, owner, detail, now).await {
            Ok(kind) => {
                tracing::debug!(plant_id, ?kind, "sweep reminder sent");
                sent += 1;
            }
            Err(e) => {
                tracing::warn!(plant_id, error = %e, "sweep reminder failed");
                failed += 1;
            }
        }
    }

    let cutoff = now - chrono::Duration::days(FINISHED_JOB_RETENTION_DAYS);
    let pruned = state.with_jobs(move |db| db.prune_finished(cutoff)).await?;
    Ok(format!(
        "checked {} plants, sent {sent}, failed {failed}, pruned {pruned} jobs",
        plants.len()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::testing::RecordingMessenger;
    use crate::state::test_support::{state_with, user_with_phone};
    use plants_core::store::{NewMessage, ProfileUpdate};
    use plants_core::types::WateringSource;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    async fn water(state: &AppState, plant_id: &str, at: DateTime<Utc>) {
        let pid = plant_id.to_string();
        state
            .with_store(move |s| s.record_watering(&pid, at, WateringSource::Web))
            .await
            .unwrap();
    }

    async fn reminder_hour_midnight(state: &AppState, user_id: &str) {
        let uid = user_id.to_string();
        let update = ProfileUpdate {
            reminder_hour: Some(0),
            ..Default::default()
        };
        state
            .with_store(move |s| s.update_profile(&uid, &update, Utc::now()))
            .await
            .unwrap();
    }

    async fn inbound(state: &AppState, user_id: &str, text: &str) -> String {
        let record = NewMessage::inbound(user_id, text, None);
        let msg = state
            .with_store(move |s| s.insert_message(&record, Utc::now()))
            .await
            .unwrap();
        msg.id
    }

    #[test]
    fn retry_delay_doubles() {
        assert_eq!(retry_delay(30, 1), 30);
        assert_eq!(retry_delay(30, 2), 60);
        assert_eq!(retry_delay(30, 4), 240);
    }

    #[test]
    fn sweep_runs_at_next_configured_hour() {
        let before = Utc.with_ymd_and_hms(2026, 5, 4, 7, 30, 0).unwrap();
        assert_eq!(
            next_sweep_at(before, 8),
            Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap()
        );
        let after = Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap();
        assert_eq!(
            next_sweep_at(after, 8),
            Utc.with_ymd_and_hms(2026, 5, 5, 8, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn startup_queues_a_single_daily_sweep() {
        let (_dir, state) = state_with(Arc::new(RecordingMessenger::default()));
        startup(&state).await.unwrap();
        startup(&state).await.unwrap();
        let jobs = state.with_jobs(|db| db.list_all()).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].kind, JobKind::DailySweep);
        assert!(jobs[0].recurrence.is_some());
    }

    #[tokio::test]
    async fn schedule_reminder_targets_next_due_at_reminder_hour() {
        let (_dir, state) = state_with(Arc::new(RecordingMessenger::default()));
        let (_user, plant) = user_with_phone(&state, "owner").await;
        let now = Utc::now();
        water(&state, &plant.id, now).await;

        let job = schedule_reminder(&state, &plant.id, now).await.unwrap().unwrap();
        let JobKind::SendReminder { due_on, .. } = &job.kind else {
            panic!("unexpected kind {:?}", job.kind);
        };
        assert!(*due_on > now.date_naive());
        assert_eq!(job.run_at, reminder_instant(*due_on, 9, 0));

        // Same due date again is not queued twice.
        assert!(schedule_reminder(&state, &plant.id, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reminder_sends_once_and_marks_plant() {
        let messenger = Arc::new(RecordingMessenger::default());
        let (_dir, state) = state_with(messenger.clone());
        let (_user, plant) = user_with_phone(&state, "owner").await;
        let now = Utc::now();
        let kind = JobKind::SendReminder {
            plant_id: plant.id.clone(),
            due_on: plant.claimed_on,
        };

        let note = dispatch(&state, &kind, now).await.unwrap();
        assert!(note.starts_with("reminded"), "{note}");
        assert_eq!(messenger.sent_bodies().len(), 1);
        let reloaded = load_plant(&state, &plant.id).await.unwrap().0;
        assert_eq!(reloaded.plant.last_reminded_on, Some(plant.claimed_on));

        let again = dispatch(&state, &kind, now).await.unwrap();
        assert_eq!(again, "skipped: already reminded");
        assert_eq!(messenger.sent_bodies().len(), 1);
    }

    #[tokio::test]
    async fn reminder_skips_when_plant_was_watered_since() {
        let messenger = Arc::new(RecordingMessenger::default());
        let (_dir, state) = state_with(messenger.clone());
        let (_user, plant) = user_with_phone(&state, "owner").await;
        let now = Utc::now();
        water(&state, &plant.id, now).await;

        let kind = JobKind::SendReminder {
            plant_id: plant.id.clone(),
            due_on: plant.claimed_on,
        };
        let note = dispatch(&state, &kind, now).await.unwrap();
        assert!(note.starts_with("skipped: now due"), "{note}");
        assert!(messenger.calls().is_empty());
    }

    #[tokio::test]
    async fn inbound_watered_records_and_thanks() {
        let messenger = Arc::new(RecordingMessenger::default());
        let (_dir, state) = state_with(messenger.clone());
        let (user, plant) = user_with_phone(&state, "owner").await;
        let msg_id = inbound(&state, &user.id, "Watered!").await;

        let note = dispatch(&state, &JobKind::ProcessInbound { message_id: msg_id.clone() }, Utc::now())
            .await
            .unwrap();
        assert_eq!(note, "watering recorded");

        let pid = plant.id.clone();
        let (waterings, message) = state
            .with_store(move |s| Ok((s.list_waterings(&pid)?, s.get_message(&msg_id)?)))
            .await
            .unwrap();
        assert_eq!(waterings.len(), 1);
        assert_eq!(waterings[0].source, WateringSource::Whatsapp);
        assert_eq!(message.plant_id.as_deref(), Some(plant.id.as_str()));
        assert_eq!(messenger.sent_bodies().len(), 1);

        let jobs = state.with_jobs(|db| db.list_all()).await.unwrap();
        assert!(jobs.iter().any(|j| j.kind.name() == "send_reminder"));
    }

    #[tokio::test]
    async fn inbound_feedback_adjusts_bias() {
        let (_dir, state) = state_with(Arc::new(RecordingMessenger::default()));
        let (user, plant) = user_with_phone(&state, "owner").await;
        let msg_id = inbound(&state, &user.id, "soil feels soggy").await;

        dispatch(&state, &JobKind::ProcessInbound { message_id: msg_id }, Utc::now())
            .await
            .unwrap();
        let reloaded = load_plant(&state, &plant.id).await.unwrap().0;
        assert_eq!(reloaded.plant.moisture_bias, 1);
    }

    #[tokio::test]
    async fn inbound_stop_pauses_and_start_resumes() {
        let messenger = Arc::new(RecordingMessenger::default());
        let (_dir, state) = state_with(messenger.clone());
        let (user, _plant) = user_with_phone(&state, "owner").await;

        let stop = inbound(&state, &user.id, "STOP").await;
        dispatch(&state, &JobKind::ProcessInbound { message_id: stop }, Utc::now())
            .await
            .unwrap();
        let uid = user.id.clone();
        let paused = state.with_store(move |s| s.get_user(&uid)).await.unwrap();
        assert!(paused.reminders_paused);

        let start = inbound(&state, &user.id, "start").await;
        dispatch(&state, &JobKind::ProcessInbound { message_id: start }, Utc::now())
            .await
            .unwrap();
        let uid = user.id.clone();
        let resumed = state.with_store(move |s| s.get_user(&uid)).await.unwrap();
        assert!(!resumed.reminders_paused);
        assert_eq!(messenger.sent_bodies().len(), 2);
    }

    #[tokio::test]
    async fn tick_retries_failed_jobs_with_backoff() {
        let messenger = Arc::new(RecordingMessenger::default());
        messenger.fail_conversation.store(true, Ordering::SeqCst);
        messenger.fail_direct.store(true, Ordering::SeqCst);
        let (_dir, state) = state_with(messenger.clone());
        let (_user, plant) = user_with_phone(&state, "owner").await;
        let job = queue_welcome(&state, &plant.id).await.unwrap();

        let now = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(tick(&state, now).await.unwrap(), 1);
        let id = job.id;
        let retried = state.with_jobs(move |db| db.get(id)).await.unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert_eq!(retried.attempts, 1);
        assert_eq!(retried.run_at, now + chrono::Duration::seconds(30));

        // Not due yet.
        assert_eq!(tick(&state, now).await.unwrap(), 0);

        messenger.fail_direct.store(false, Ordering::SeqCst);
        assert_eq!(tick(&state, retried.run_at).await.unwrap(), 1);
        let done = state.with_jobs(move |db| db.get(id)).await.unwrap();
        assert!(matches!(done.status, JobStatus::Completed { .. }));
        assert_eq!(done.attempts, 2);
    }

    #[tokio::test]
    async fn failed_inbound_replies_apply_their_effect_once() {
        let messenger = Arc::new(RecordingMessenger::default());
        messenger.fail_conversation.store(true, Ordering::SeqCst);
        messenger.fail_direct.store(true, Ordering::SeqCst);
        let (_dir, state) = state_with(messenger.clone());
        let (user, plant) = user_with_phone(&state, "owner").await;
        let dry = inbound(&state, &user.id, "too dry").await;
        let done = inbound(&state, &user.id, "watered").await;
        queue_inbound(&state, &dry).await.unwrap();
        queue_inbound(&state, &done).await.unwrap();

        let start = Utc::now();
        for hour in 1..=10 {
            tick(&state, start + chrono::Duration::hours(hour)).await.unwrap();
        }

        let pid = plant.id.clone();
        let (waterings, bias) = state
            .with_store(move |s| Ok((s.list_waterings(&pid)?.len(), s.get_plant(&pid)?.moisture_bias)))
            .await
            .unwrap();
        assert_eq!(waterings, 1);
        assert_eq!(bias, -1);

        let jobs = state.with_jobs(|db| db.list_all()).await.unwrap();
        let replies: Vec<_> = jobs.iter().filter(|j| j.kind.name() == "process_inbound").collect();
        assert_eq!(replies.len(), 2);
        for job in replies {
            assert!(matches!(job.status, JobStatus::Failed { .. }), "{:?}", job.status);
            assert_eq!(job.attempts, state.config.reminders.max_attempts);
        }
    }

    #[tokio::test]
    async fn interrupted_inbound_job_runs_after_restart() {
        let (_dir, state) = state_with(Arc::new(RecordingMessenger::default()));
        let (user, plant) = user_with_phone(&state, "owner").await;
        let msg_id = inbound(&state, &user.id, "watered").await;
        let job = queue_inbound(&state, &msg_id).await.unwrap();
        let id = job.id;
        state
            .with_jobs(move |db| db.set_status(id, JobStatus::Running))
            .await
            .unwrap();

        startup(&state).await.unwrap();
        let recovered = state.with_jobs(move |db| db.get(id)).await.unwrap();
        assert_eq!(recovered.status, JobStatus::Pending);
        assert_eq!(recovered.attempts, 1);

        tick(&state, Utc::now() + chrono::Duration::seconds(1)).await.unwrap();
        let finished = state.with_jobs(move |db| db.get(id)).await.unwrap();
        assert!(matches!(finished.status, JobStatus::Completed { .. }), "{:?}", finished.status);
        assert_eq!(finished.attempts, 2);

        let pid = plant.id.clone();
        let (waterings, message) = state
            .with_store(move |s| Ok((s.list_waterings(&pid)?.len(), s.get_message(&msg_id)?)))
            .await
            .unwrap();
        assert_eq!(waterings, 1);
        assert!(message.processed_at.is_some());
    }

    #[tokio::test]
    async fn batch_continues_past_a_missing_job() {
        let (_dir, state) = state_with(Arc::new(RecordingMessenger::default()));
        let (_user, plant) = user_with_phone(&state, "owner").await;
        let vanished = Job::new(
            JobKind::SendWelcome {
                plant_id: plant.id.clone(),
            },
            Utc::now(),
        );
        let queued = queue_welcome(&state, &plant.id).await.unwrap();

        let started = run_batch(&state, vec![vanished, queued.clone()], Utc::now()).await;
        assert_eq!(started, 1);
        let id = queued.id;
        let done = state.with_jobs(move |db| db.get(id)).await.unwrap();
        assert!(matches!(done.status, JobStatus::Completed { .. }), "{:?}", done.status);
    }

    #[tokio::test]
    async fn tick_requeues_recurring_sweep() {
        let (_dir, state) = state_with(Arc::new(RecordingMessenger::default()));
        let run_at = Utc::now() - chrono::Duration::minutes(1);
        let sweep = Job::recurring(JobKind::DailySweep, run_at, SWEEP_EVERY);
        let queued = sweep.clone();
        state.with_jobs(move |db| db.insert(&queued)).await.unwrap();

        assert_eq!(tick(&state, Utc::now()).await.unwrap(), 1);
        let jobs = state.with_jobs(|db| db.list_all()).await.unwrap();
        let pending: Vec<_> = jobs.iter().filter(|j| j.status == JobStatus::Pending).collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].run_at, run_at + chrono::Duration::days(1));
    }

    #[tokio::test]
    async fn sweep_nudges_overdue_plants_once_a_day() {
        let messenger = Arc::new(RecordingMessenger::default());
        let (_dir, state) = state_with(messenger.clone());
        let (user, plant) = user_with_phone(&state, "owner").await;
        reminder_hour_midnight(&state, &user.id).await;
        let now = Utc::now();
        water(&state, &plant.id, now - chrono::Duration::days(20)).await;

        let note = daily_sweep(&state, now).await.unwrap();
        assert!(note.contains("sent 1"), "{note}");
        let reloaded = load_plant(&state, &plant.id).await.unwrap().0;
        assert!(reloaded.plant.last_reminded_on.is_some());

        let note = daily_sweep(&state, now + chrono::Duration::hours(1)).await.unwrap();
        assert!(note.contains("sent 0"), "{note}");

        let note = daily_sweep(&state, now + chrono::Duration::hours(25)).await.unwrap();
        assert!(note.contains("sent 1"), "{note}");
        assert_eq!(messenger.sent_bodies().len(), 2);
    }

    #[tokio::test]
    async fn sweep_skips_paused_owners() {
        let messenger = Arc::new(RecordingMessenger::default());
        let (_dir, state) = state_with(messenger.clone());
        let (user, plant) = user_with_phone(&state, "owner").await;
        water(&state, &plant.id, Utc::now() - chrono::Duration::days(20)).await;
        let uid = user.id.clone();
        state
            .with_store(move |s| s.set_paused(&uid, true, Utc::now()))
            .await
            .unwrap();

        let note = daily_sweep(&state, Utc::now()).await.unwrap();
        assert!(note.starts_with("checked 0 plants"), "{note}");
        assert!(messenger.calls().is_empty());
    }
}
