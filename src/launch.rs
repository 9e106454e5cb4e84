use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[default]
    Pending,
    Granted,
    Denied,
}

/// Flags that survive restarts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchFlags {
    #[serde(default)]
    pub notification_permission: Permission,
    #[serde(default)]
    pub launch_notification_sent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchStatus {
    pub launch_at: DateTime<Utc>,
    pub launched: bool,
    pub countdown: Countdown,
    pub permission: Permission,
    pub launch_notification_sent: bool,
    pub latest_notification: Option<Notification>,
}

/// Countdown and notification opt-in for the hashtag generator launch.
/// Pure state; writing it back is [`Launch`]'s job.
#[derive(Debug)]
pub struct LaunchNotice {
    launch_at: DateTime<Utc>,
    flags: LaunchFlags,
    latest: Option<Notification>,
}

impl LaunchNotice {
    pub fn new(launch_at: DateTime<Utc>, flags: LaunchFlags) -> Self {
        Self {
            launch_at,
            flags,
            latest: None,
        }
    }

    pub fn flags(&self) -> &LaunchFlags {
        &self.flags
    }

    pub fn countdown(&self, now: DateTime<Utc>) -> Countdown {
        let left = (self.launch_at - now).num_seconds().max(0);
        Countdown {
            days: left / 86_400,
            hours: (left / 3_600) % 24,
            minutes: (left / 60) % 60,
            seconds: left % 60,
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> LaunchStatus {
        LaunchStatus {
            launch_at: self.launch_at,
            launched: now >= self.launch_at,
            countdown: self.countdown(now),
            permission: self.flags.notification_permission,
            launch_notification_sent: self.flags.launch_notification_sent,
            latest_notification: self.latest.clone(),
        }
    }

    /// Records the user's answer. A grant before launch yields the "you're all set" notice.
    pub fn request_permission(&mut self, decision: Permission, now: DateTime<Utc>) -> Option<Notification> {
        self.flags.notification_permission = decision;
        if decision != Permission::Granted || now >= self.launch_at {
            return None;
        }
        let days = (self.launch_at - now).num_days();
        Some(self.notify(
            "✅ You're all set!",
            format!("We'll notify you when Hashtag Generator launches in {days} days."),
            "/notify-icon.png",
            now,
        ))
    }

    /// Yields the launch notification at most once, ever.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<Notification> {
        if now < self.launch_at
            || self.flags.notification_permission != Permission::Granted
            || self.flags.launch_notification_sent
        {
            return None;
        }
        self.flags.launch_notification_sent = true;
        Some(self.notify(
            "🚀 Hashtag Generator is Live!",
            "Our new hashtag generator is now available. Click here to check it out!".to_string(),
            "/launch-icon.png",
            now,
        ))
    }

    fn notify(&mut self, title: &str, body: String, icon: &str, now: DateTime<Utc>) -> Notification {
        let note = Notification {
            title: title.to_string(),
            body,
            icon: icon.to_string(),
            created_at: now,
        };
        info!("🔔 {}: {}", note.title, note.body);
        self.latest = Some(note.clone());
        note
    }
}

/// Process-wide launch state plus the JSON file its flags live in.
/// Flags are read once at startup and written back on every change, outside the state lock.
#[derive(Debug)]
pub struct Launch {
    notice: Mutex<LaunchNotice>,
    path: PathBuf,
    writes: tokio::sync::Mutex<()>,
}

impl Launch {
    pub fn load(path: impl Into<PathBuf>, launch_at: DateTime<Utc>) -> Self {
        let path = path.into();
        let flags = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("⚠️ Ignoring unreadable launch state {}: {}", path.display(), e);
                LaunchFlags::default()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => LaunchFlags::default(),
            Err(e) => {
                warn!("⚠️ Could not read launch state {}: {}", path.display(), e);
                LaunchFlags::default()
            }
        };
        info!(
            permission = ?flags.notification_permission,
            sent = flags.launch_notification_sent,
            "Launch notice loaded, launching at {}",
            launch_at
        );
        Self {
            notice: Mutex::new(LaunchNotice::new(launch_at, flags)),
            path,
            writes: tokio::sync::Mutex::new(()),
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> LaunchStatus {
        self.notice.lock().status(now)
    }

    pub async fn request_permission(
        &self,
        decision: Permission,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Notification>> {
        let note = self.notice.lock().request_permission(decision, now);
        self.persist().await?;
        Ok(note)
    }

    /// Called periodically by the housekeeping task.
    pub async fn tick(&self, now: DateTime<Utc>) -> anyhow::Result<Option<Notification>> {
        let Some(note) = self.notice.lock().tick(now) else {
            return Ok(None);
        };
        self.persist().await?;
        Ok(Some(note))
    }

    async fn persist(&self) -> anyhow::Result<()> {
        // Writers queue here; each one writes the flags as they are once its turn comes.
        let _turn = self.writes.lock().await;
        let raw = serde_json::to_string_pretty(self.notice.lock().flags())?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&self.path, raw)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}
