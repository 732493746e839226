//! WhatsApp delivery.
//!
//! Each owner gets one group conversation on the provider. Their phone joins
//! as a WhatsApp participant and every plant joins under its own identity, so
//! messages read as coming from the plant. When the conversation path fails
//! the message goes out as a plain WhatsApp text prefixed with the plant's
//! name.

use std::future::Future;
use std::pin::Pin;

use chrono::Utc;
use plants_core::store::{Conversation, Message, NewMessage, Participant, Plant, User};
use plants_core::types::{MessageChannel, MessageStatus, ParticipantKind};
use plants_core::PlantsError;
use serde::Deserialize;

use crate::state::AppState;

pub type MessengerFut<'a, T> = Pin<Box<dyn Future<Output = plants_core::Result<T>> + Send + 'a>>;

/// Outbound side of the messaging provider. Every call returns the remote
/// sid of what it created.
pub trait Messenger: Send + Sync {
    /// True when messages are only logged, never sent.
    fn is_log(&self) -> bool {
        false
    }

    fn create_conversation<'a>(&'a self, friendly_name: &'a str) -> MessengerFut<'a, String>;

    fn add_whatsapp_participant<'a>(
        &'a self,
        conversation_sid: &'a str,
        phone: &'a str,
    ) -> MessengerFut<'a, String>;

    fn add_plant_participant<'a>(
        &'a self,
        conversation_sid: &'a str,
        identity: &'a str,
        display_name: &'a str,
    ) -> MessengerFut<'a, String>;

    fn send_conversation_message<'a>(
        &'a self,
        conversation_sid: &'a str,
        author: &'a str,
        body: &'a str,
    ) -> MessengerFut<'a, String>;

    fn send_direct<'a>(&'a self, phone: &'a str, body: &'a str) -> MessengerFut<'a, String>;
}

/// Conversation identity a plant speaks under.
pub fn plant_identity(plant_id: &str) -> String {
    format!("plant:{plant_id}")
}

// ---------------------------------------------------------------------------
// LogMessenger
// ---------------------------------------------------------------------------

/// Writes messages to the log. Used when no provider is configured.
pub struct LogMessenger;

impl LogMessenger {
    fn fake_sid(prefix: &str) -> String {
        format!("{prefix}-log-{}", uuid::Uuid::new_v4().simple())
    }
}

impl Messenger for LogMessenger {
    fn is_log(&self) -> bool {
        true
    }

    fn create_conversation<'a>(&'a self, friendly_name: &'a str) -> MessengerFut<'a, String> {
        Box::pin(async move {
            tracing::info!(friendly_name, "log messenger: create conversation");
            Ok(Self::fake_sid("CH"))
        })
    }

    fn add_whatsapp_participant<'a>(
        &'a self,
        conversation_sid: &'a str,
        phone: &'a str,
    ) -> MessengerFut<'a, String> {
        Box::pin(async move {
            tracing::info!(conversation_sid, phone, "log messenger: add whatsapp participant");
            Ok(Self::fake_sid("MB"))
        })
    }

    fn add_plant_participant<'a>(
        &'a self,
        conversation_sid: &'a str,
        identity: &'a str,
        _display_name: &'a str,
    ) -> MessengerFut<'a, String> {
        Box::pin(async move {
            tracing::info!(conversation_sid, identity, "log messenger: add plant participant");
            Ok(Self::fake_sid("MB"))
        })
    }

    fn send_conversation_message<'a>(
        &'a self,
        conversation_sid: &'a str,
        author: &'a str,
        body: &'a str,
    ) -> MessengerFut<'a, String> {
        Box::pin(async move {
            tracing::info!(conversation_sid, author, body, "log messenger: conversation message");
            Ok(Self::fake_sid("IM"))
        })
    }

    fn send_direct<'a>(&'a self, phone: &'a str, body: &'a str) -> MessengerFut<'a, String> {
        Box::pin(async move {
            tracing::info!(to = phone, body, "log messenger: direct message");
            Ok(Self::fake_sid("SM"))
        })
    }
}

// ---------------------------------------------------------------------------
// TwilioMessenger
// ---------------------------------------------------------------------------

/// Twilio Conversations for the group thread, Programmable Messaging for
/// direct WhatsApp texts. Form-encoded requests with basic auth.
pub struct TwilioMessenger {
    http: reqwest::Client,
    account_sid: String,
    auth_token: String,
    whatsapp_from: String,
    api_base: String,
    messages_api_base: String,
}

#[derive(Deserialize)]
struct SidResponse {
    sid: String,
}

impl TwilioMessenger {
    pub fn new(
        http: reqwest::Client,
        account_sid: String,
        auth_token: String,
        whatsapp_from: String,
        api_base: String,
        messages_api_base: String,
    ) -> Self {
        Self {
            http,
            account_sid,
            auth_token,
            whatsapp_from,
            api_base: api_base.trim_end_matches('/').to_string(),
            messages_api_base: messages_api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn post_form(&self, url: String, form: &[(&str, &str)]) -> plants_core::Result<String> {
        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
            .send()
            .await
            .map_err(|e| PlantsError::Messaging(format!("POST {url}: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PlantsError::Messaging(format!("POST {url} returned {status}: {body}")));
        }
        let parsed: SidResponse = resp
            .json()
            .await
            .map_err(|e| PlantsError::Messaging(format!("POST {url}: bad response: {e}")))?;
        Ok(parsed.sid)
    }

    fn whatsapp(number: &str) -> String {
        format!("whatsapp:{number}")
    }
}

impl Messenger for TwilioMessenger {
    fn create_conversation<'a>(&'a self, friendly_name: &'a str) -> MessengerFut<'a, String> {
        Box::pin(async move {
            let url = format!("{}/v1/Conversations", self.api_base);
            self.post_form(url, &[("FriendlyName", friendly_name)]).await
        })
    }

    fn add_whatsapp_participant<'a>(
        &'a self,
        conversation_sid: &'a str,
        phone: &'a str,
    ) -> MessengerFut<'a, String> {
        Box::pin(async move {
            let url = format!("{}/v1/Conversations/{conversation_sid}/Participants", self.api_base);
            let address = Self::whatsapp(phone);
            let proxy = Self::whatsapp(&self.whatsapp_from);
            self.post_form(
                url,
                &[
                    ("MessagingBinding.Address", address.as_str()),
                    ("MessagingBinding.ProxyAddress", proxy.as_str()),
                ],
            )
            .await
        })
    }

    fn add_plant_participant<'a>(
        &'a self,
        conversation_sid: &'a str,
        identity: &'a str,
        display_name: &'a str,
    ) -> MessengerFut<'a, String> {
        Box::pin(async move {
            let url = format!("{}/v1/Conversations/{conversation_sid}/Participants", self.api_base);
            let attributes = serde_json::json!({ "display_name": display_name }).to_string();
            self.post_form(
                url,
                &[("Identity", identity), ("Attributes", attributes.as_str())],
            )
            .await
        })
    }

    fn send_conversation_message<'a>(
        &'a self,
        conversation_sid: &'a str,
        author: &'a str,
        body: &'a str,
    ) -> MessengerFut<'a, String> {
        Box::pin(async move {
            let url = format!("{}/v1/Conversations/{conversation_sid}/Messages", self.api_base);
            self.post_form(url, &[("Author", author), ("Body", body)]).await
        })
    }

    fn send_direct<'a>(&'a self, phone: &'a str, body: &'a str) -> MessengerFut<'a, String> {
        Box::pin(async move {
            let url = format!(
                "{}/2010-04-01/Accounts/{}/Messages.json",
                self.messages_api_base, self.account_sid
            );
            let to = Self::whatsapp(phone);
            let from = Self::whatsapp(&self.whatsapp_from);
            self.post_form(
                url,
                &[("To", to.as_str()), ("From", from.as_str()), ("Body", body)],
            )
            .await
        })
    }
}

// ---------------------------------------------------------------------------
// Conversation glue
// ---------------------------------------------------------------------------

/// Reuse the owner's conversation or create it, then make sure their phone
/// and every active plant are participants. Remote state is mirrored in the
/// store so each participant is only added once.
pub async fn ensure_conversation(state: &AppState, user: &User) -> anyhow::Result<Conversation> {
    let phone = user
        .phone
        .clone()
        .ok_or_else(|| anyhow::anyhow!("user {} has no phone number", user.id))?;

    let user_id = user.id.clone();
    let (existing, plants) = state
        .with_store(move |s| Ok((s.get_conversation(&user_id)?, s.list_plants(&user_id)?)))
        .await?;

    let conversation = match existing {
        Some(c) => c,
        None => {
            let sid = state
                .messenger
                .create_conversation(&format!("plants-{}", user.id))
                .await?;
            let user_id = user.id.clone();
            let now = Utc::now();
            state
                .with_store(move |s| s.save_conversation(&user_id, &sid, now))
                .await?
        }
    };

    let conversation_id = conversation.id.clone();
    let present: Vec<String> = state
        .with_store(move |s| s.list_participants(&conversation_id))
        .await?
        .into_iter()
        .map(|p| p.identity)
        .collect();

    let mut added = Vec::new();
    if !present.contains(&phone) {
        let sid = state
            .messenger
            .add_whatsapp_participant(&conversation.remote_sid, &phone)
            .await?;
        added.push(Participant {
            conversation_id: conversation.id.clone(),
            identity: phone.clone(),
            kind: ParticipantKind::Whatsapp,
            remote_sid: Some(sid),
        });
    }
    for plant in &plants {
        let identity = plant_identity(&plant.id);
        if present.contains(&identity) {
            continue;
        }
        let sid = state
            .messenger
            .add_plant_participant(&conversation.remote_sid, &identity, &plant.nickname)
            .await?;
        added.push(Participant {
            conversation_id: conversation.id.clone(),
            identity,
            kind: ParticipantKind::Plant,
            remote_sid: Some(sid),
        });
    }
    if !added.is_empty() {
        state
            .with_store(move |s| {
                for p in &added {
                    s.add_participant(p)?;
                }
                Ok(())
            })
            .await?;
    }
    Ok(conversation)
}

/// Send `body` to the owner as `plant` (or as the service when `None`) and
/// record the outcome.
///
/// A user without a phone gets a `failed` record and `Ok`. If both the
/// conversation and the direct fallback fail, the message is recorded as
/// `failed` and the error is returned so the caller can retry.
pub async fn deliver(
    state: &AppState,
    user: &User,
    plant: Option<&Plant>,
    body: &str,
) -> anyhow::Result<Message> {
    let record = NewMessage::outbound(&user.id, plant.map(|p| p.id.as_str()), body);
    let now = Utc::now();
    let message = state
        .with_store(move |s| s.insert_message(&record, now))
        .await?;

    let Some(phone) = user.phone.clone() else {
        let reason = "no phone number on file".to_string();
        return finish(state, &message.id, MessageStatus::Failed, None, None, Some(reason)).await;
    };

    if state.messenger.is_log() {
        let sid = state.messenger.send_direct(&phone, body).await?;
        let channel = Some(MessageChannel::Log);
        return finish(state, &message.id, MessageStatus::Sent, channel, Some(sid), None).await;
    }

    let author = plant
        .map(|p| plant_identity(&p.id))
        .unwrap_or_else(|| state.config.app.name.clone());
    let via_conversation = async {
        let conversation = ensure_conversation(state, user).await?;
        let sid = state
            .messenger
            .send_conversation_message(&conversation.remote_sid, &author, body)
            .await?;
        Ok::<_, anyhow::Error>(sid)
    }
    .await;

    let conversation_err = match via_conversation {
        Ok(sid) => {
            let channel = Some(MessageChannel::Conversation);
            return finish(state, &message.id, MessageStatus::Sent, channel, Some(sid), None).await;
        }
        Err(e) => e,
    };
    tracing::warn!(
        user_id = %user.id,
        error = %conversation_err,
        "conversation send failed, falling back to direct message"
    );
    let direct_body = match plant {
        Some(p) => format!("{}: {body}", p.nickname),
        None => body.to_string(),
    };
    match state.messenger.send_direct(&phone, &direct_body).await {
        Ok(sid) => {
            let channel = Some(MessageChannel::Direct);
            finish(state, &message.id, MessageStatus::Sent, channel, Some(sid), None).await
        }
        Err(direct_err) => {
            let reason = format!("conversation: {conversation_err}; direct: {direct_err}");
            finish(state, &message.id, MessageStatus::Failed, None, None, Some(reason.clone())).await?;
            Err(anyhow::anyhow!("message delivery failed: {reason}"))
        }
    }
}

async fn finish(
    state: &AppState,
    message_id: &str,
    status: MessageStatus,
    channel: Option<MessageChannel>,
    remote_sid: Option<String>,
    error: Option<String>,
) -> anyhow::Result<Message> {
    let message_id = message_id.to_string();
    state
        .with_store(move |s| {
            s.update_message_status(&message_id, status, channel, remote_sid.as_deref(), error.as_deref())
        })
        .await
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------
