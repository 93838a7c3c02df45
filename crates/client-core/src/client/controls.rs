// Mute control operations for the client-core library
//
// Each toggle applies optimistically, records a pending mutation, and fires
// the wire command; the authoritative event for the local user's id is what
// actually confirms or reverts it.

use chrono::Utc;
use tracing::{debug, info};

use crate::call::MutationField;
use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEvent, EventPriority, MuteStatusInfo};
use calldesk_signal_core::{ClientCommand, MutePayload};

/// Mute control operations implementation for CallClient
impl super::manager::CallClient {
    /// Mute local audio on the current call
    pub async fn mute_audio(&self) -> ClientResult<()> {
        self.set_mute(MutationField::AudioMuted, true).await
    }

    /// Unmute local audio on the current call
    pub async fn unmute_audio(&self) -> ClientResult<()> {
        self.set_mute(MutationField::AudioMuted, false).await
    }

    /// Mute local video on the current call
    pub async fn mute_video(&self) -> ClientResult<()> {
        self.set_mute(MutationField::VideoMuted, true).await
    }

    /// Unmute local video on the current call
    pub async fn unmute_video(&self) -> ClientResult<()> {
        self.set_mute(MutationField::VideoMuted, false).await
    }

    /// Optimistically flip a mute flag and fire the matching command
    ///
    /// Rejected synchronously when no session exists, or while an outbound
    /// dial has no call id yet (there is no wire address to target).
    async fn set_mute(&self, field: MutationField, desired: bool) -> ClientResult<()> {
        let (call_id, prior) = {
            let mut guard = self.session.write().await;
            let session = guard.as_mut().ok_or(ClientError::NoActiveCall)?;

            let call_id = session.call_id.clone().ok_or_else(|| {
                ClientError::InvalidCallState {
                    expected: "call with an assigned id".to_string(),
                    actual: format!("{} (id pending)", session.state),
                }
            })?;

            let prior = session.mute_flag(field);
            if prior == desired {
                debug!(call_id = %call_id, field = %field, "mute flag already at desired value");
                return Ok(());
            }

            session.set_mute_flag(field, desired);
            (call_id, prior)
        };

        self.reconciler.record(
            call_id.clone(),
            field,
            desired,
            prior,
            self.connection.last_seq(),
        );

        let payload = MutePayload {
            call_id: call_id.clone(),
            muted: desired,
        };
        let command = match field {
            MutationField::AudioMuted => ClientCommand::MuteAudio(payload),
            MutationField::VideoMuted => ClientCommand::MuteVideo(payload),
        };
        self.send_lossy(&command);

        info!(call_id = %call_id, field = %field, muted = desired, "mute toggled (pending)");

        self.signal_handler
            .emit(ClientEvent::MuteStateChanged {
                info: MuteStatusInfo {
                    call_id,
                    field,
                    muted: desired,
                    confirmed: false,
                    timestamp: Utc::now(),
                },
                priority: EventPriority::Normal,
            })
            .await;

        Ok(())
    }
}
