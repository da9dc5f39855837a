use std::sync::Arc;

use tracing::debug;

use crate::{
    common::{ChannelId, CommandRejection, GuildId},
    player::{GuildSession, JoinOutcome, NowPlaying, PlayAccepted, Track},
    server::registry::SessionRegistry,
};

/// Turns user actions into session calls. Every method returns a
/// human-readable message or the reason the action was refused.
#[derive(Clone)]
pub struct CommandDispatcher {
    registry: Arc<SessionRegistry>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    fn existing(&self, guild_id: &GuildId) -> Result<GuildSession, CommandRejection> {
        self.registry
            .get(guild_id)
            .ok_or(CommandRejection::SessionNotFound)
    }

    pub async fn play(
        &self,
        guild_id: &GuildId,
        channel_id: ChannelId,
        track: Track,
    ) -> Result<String, CommandRejection> {
        if track.uri().trim().is_empty() {
            return Err(CommandRejection::EmptySource);
        }
        let title = track.title().to_owned();

        let session = self.registry.get_or_create(guild_id);
        let accepted = match session.play(channel_id, track.clone()).await {
            // Lost a race with the reaper; the next lookup creates a fresh session.
            Err(CommandRejection::SessionClosed) => {
                debug!("[{}] session closed under play, retrying", guild_id);
                self.registry
                    .get_or_create(guild_id)
                    .play(channel_id, track)
                    .await?
            }
            other => other?,
        };

        Ok(match accepted {
            PlayAccepted::Started => format!("Now playing: {title}"),
            PlayAccepted::Queued { position } => {
                format!("Queued {title} at position {position}")
            }
        })
    }

    pub async fn join(
        &self,
        guild_id: &GuildId,
        channel_id: ChannelId,
    ) -> Result<String, CommandRejection> {
        let session = self.registry.get_or_create(guild_id);
        let outcome = match session.join(channel_id).await {
            Err(CommandRejection::SessionClosed) => {
                self.registry.get_or_create(guild_id).join(channel_id).await?
            }
            other => other?,
        };

        Ok(match outcome {
            JoinOutcome::Joined => format!("Joined channel {channel_id}"),
            JoinOutcome::AlreadyConnected => format!("Already connected to channel {channel_id}"),
            JoinOutcome::Moved { from } => format!("Moved from channel {from} to {channel_id}"),
        })
    }

    pub async fn skip(&self, guild_id: &GuildId) -> Result<String, CommandRejection> {
        let skipped = self.existing(guild_id)?.skip().await?;
        Ok(format!("Skipped {skipped}"))
    }

    pub async fn pause(&self, guild_id: &GuildId) -> Result<String, CommandRejection> {
        self.existing(guild_id)?.pause().await?;
        Ok("Paused".to_string())
    }

    pub async fn resume(&self, guild_id: &GuildId) -> Result<String, CommandRejection> {
        self.existing(guild_id)?.resume().await?;
        Ok("Resumed".to_string())
    }

    pub async fn stop(&self, guild_id: &GuildId) -> Result<String, CommandRejection> {
        self.existing(guild_id)?.stop().await?;
        Ok("Stopped playback and cleared the queue".to_string())
    }

    pub async fn leave(&self, guild_id: &GuildId) -> Result<String, CommandRejection> {
        if self.registry.remove(guild_id).await {
            Ok("Left the voice channel".to_string())
        } else {
            Err(CommandRejection::SessionNotFound)
        }
    }

    pub async fn queue_list(&self, guild_id: &GuildId) -> Result<Vec<Track>, CommandRejection> {
        self.existing(guild_id)?.queue().await
    }

    pub async fn now_playing(&self, guild_id: &GuildId) -> Result<NowPlaying, CommandRejection> {
        self.existing(guild_id)?.now_playing().await
    }

    pub async fn set_volume(
        &self,
        guild_id: &GuildId,
        percent: u16,
    ) -> Result<String, CommandRejection> {
        let volume = self.existing(guild_id)?.set_volume(percent).await?;
        Ok(format!("Volume set to {volume}%"))
    }
}
