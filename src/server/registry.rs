use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    common::{GuildId, SessionId},
    player::{CloseReason, GuildSession, SessionDeps, SessionStatus},
};

/// Owns every live guild session. At most one session per guild.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, GuildSession>,
    deps: SessionDeps,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            sessions: DashMap::new(),
            deps,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn deps(&self) -> &SessionDeps {
        &self.deps
    }

    /// Returns the live session for `guild_id`, creating it if needed.
    /// Concurrent callers for the same guild get the same session.
    pub fn get_or_create(&self, guild_id: &GuildId) -> GuildSession {
        match self.sessions.entry(guild_id.clone()) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_closed() {
                    return entry.get().clone();
                }
                debug!("[{}] replacing closed session {}", guild_id, entry.get().id());
                let session = self.spawn(guild_id);
                entry.insert(session.clone());
                session
            }
            Entry::Vacant(entry) => entry.insert(self.spawn(guild_id)).clone(),
        }
    }

    fn spawn(&self, guild_id: &GuildId) -> GuildSession {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        GuildSession::spawn(id, guild_id.clone(), self.deps.clone())
    }

    pub fn get(&self, guild_id: &GuildId) -> Option<GuildSession> {
        self.sessions
            .get(guild_id)
            .map(|entry| entry.value().clone())
            .filter(|session| !session.is_closed())
    }

    /// Removes the session and waits for it to release its stream and voice
    /// connection. Returns `false` if there was none.
    pub async fn remove(&self, guild_id: &GuildId) -> bool {
        let Some((_, session)) = self.sessions.remove(guild_id) else {
            return false;
        };
        let was_live = !session.is_closed();
        session.shutdown(CloseReason::Left).await;
        was_live
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn statuses(&self) -> Vec<SessionStatus> {
        let mut statuses: Vec<SessionStatus> =
            self.sessions.iter().map(|entry| entry.value().status()).collect();
        statuses.sort_by_key(|s| s.session_id);
        statuses
    }

    /// Closes sessions that have been idle past their grace period. Each
    /// candidate re-checks itself, so a command racing the sweep wins.
    pub async fn reap_idle(&self) -> usize {
        let now = Instant::now();
        let candidates: Vec<GuildSession> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_closed() || entry.value().status().is_reapable(now))
            .map(|entry| entry.value().clone())
            .collect();

        let mut reaped = 0;
        for session in candidates {
            if session.reap_if_idle().await {
                let removed = self
                    .sessions
                    .remove_if(session.guild_id(), |_, current| current.id() == session.id());
                if removed.is_some() {
                    info!("[{}] reaped idle session {}", session.guild_id(), session.id());
                    reaped += 1;
                }
            }
        }
        reaped
    }

    pub fn spawn_reaper(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = self.deps.config.reap_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let reaped = registry.reap_idle().await;
                        if reaped > 0 {
                            debug!("reaper closed {} sessions, {} left", reaped, registry.len());
                        }
                    }
                }
            }
            debug!("session reaper stopped");
        })
    }

    /// Closes every session, waiting for each to release its resources.
    pub async fn shutdown_all(&self) {
        let guilds: Vec<GuildId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let sessions: Vec<GuildSession> = guilds
            .iter()
            .filter_map(|guild_id| self.sessions.remove(guild_id).map(|(_, s)| s))
            .collect();

        info!("closing {} sessions", sessions.len());
        futures::future::join_all(
            sessions
                .iter()
                .map(|session| session.shutdown(CloseReason::Shutdown)),
        )
        .await;
    }
}
