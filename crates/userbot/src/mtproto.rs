//! MTProto backend for user sessions, built on grammers.
//!
//! Sessions are stored as base64 of grammers' serialized session. Chat ids use
//! the Bot API "marked" form (`-100…` for channels and supergroups) so rules
//! written for bots and for user sessions look the same.

use std::{collections::HashMap, sync::RwLock};

use {
    async_trait::async_trait,
    base64::{Engine, engine::general_purpose::STANDARD},
    ferry_channels::MessageHandle,
    ferry_common::ChatId,
    grammers_client::{
        Client, Config, InitParams, SignInError, Update,
        types::{LoginToken, PasswordToken as RemotePasswordToken},
    },
    grammers_mtsender::InvocationError,
    grammers_session::{PackedChat, PackedType, Session},
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, info},
};

use crate::{
    client::{ApiCredentials, ClientError, UserClient},
    login::{CodeToken, LoginClient, PasswordToken, SignIn},
};

const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// Bot API style id of a chat.
#[must_use]
pub fn marked_id(chat: &PackedChat) -> ChatId {
    match chat.ty {
        PackedType::User | PackedType::Bot => chat.id,
        PackedType::Chat => -chat.id,
        _ => -(CHANNEL_ID_OFFSET + chat.id),
    }
}

fn rpc_error(code: i32, name: &str, value: Option<u32>) -> ClientError {
    match name {
        "FLOOD_WAIT" => ClientError::FloodWait(value.unwrap_or_default()),
        "PHONE_CODE_EXPIRED" => ClientError::CodeExpired,
        "PHONE_CODE_INVALID" | "PHONE_CODE_EMPTY" => ClientError::InvalidCode,
        "PASSWORD_HASH_INVALID" => ClientError::InvalidPassword,
        _ if code == 401 => ClientError::Unauthorized(name.to_string()),
        _ => ClientError::Rpc(format!("{code} {name}")),
    }
}

fn invocation_error(err: InvocationError) -> ClientError {
    match err {
        InvocationError::Rpc(rpc) => rpc_error(rpc.code, &rpc.name, rpc.value),
        other => ClientError::Connection(other.to_string()),
    }
}

fn sign_in_error(err: SignInError) -> ClientError {
    match err {
        SignInError::InvalidCode => ClientError::InvalidCode,
        SignInError::InvalidPassword => ClientError::InvalidPassword,
        SignInError::Other(e) => invocation_error(e),
        _ => ClientError::Unauthorized("phone number is not registered".into()),
    }
}

async fn open(credentials: &ApiCredentials, session: Session) -> Result<Client, ClientError> {
    Client::connect(Config {
        session,
        api_id: credentials.api_id,
        api_hash: credentials.api_hash.expose_secret().clone(),
        params: InitParams::default(),
    })
    .await
    .map_err(|e| ClientError::Connection(e.to_string()))
}

fn export_session(client: &Client) -> Secret<String> {
    Secret::new(STANDARD.encode(client.session().save()))
}

/// Connected user session.
///
/// Remembers every chat it has seen so messages can be forwarded without a
/// lookup; unknown destinations are resolved from the dialog list.
#[derive(Default)]
pub struct MtprotoClient {
    client: Option<Client>,
    chats: RwLock<HashMap<ChatId, PackedChat>>,
}

impl MtprotoClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn connected(&self) -> Result<&Client, ClientError> {
        self.client
            .as_ref()
            .ok_or_else(|| ClientError::Connection("session is not started".into()))
    }

    fn remember(&self, chat: &PackedChat) -> ChatId {
        let id = marked_id(chat);
        if let Ok(mut chats) = self.chats.write() {
            chats.insert(id, chat.clone());
        }
        id
    }

    fn known(&self, id: ChatId) -> Option<PackedChat> {
        self.chats.read().ok().and_then(|c| c.get(&id).cloned())
    }

    async fn resolve(&self, client: &Client, id: ChatId) -> Result<PackedChat, ClientError> {
        if let Some(chat) = self.known(id) {
            return Ok(chat);
        }
        debug!(chat_id = id, "resolving chat from dialogs");
        let mut dialogs = client.iter_dialogs();
        while let Some(dialog) = dialogs.next().await.map_err(invocation_error)? {
            let chat = dialog.chat().pack();
            if self.remember(&chat) == id {
                return Ok(chat);
            }
        }
        Err(ClientError::Rpc(format!("chat {id} is not reachable from this session")))
    }
}

#[async_trait]
impl UserClient for MtprotoClient {
    async fn start(
        &mut self,
        credentials: &ApiCredentials,
        session: Secret<String>,
    ) -> Result<(), ClientError> {
        let raw = STANDARD
            .decode(session.expose_secret().trim())
            .map_err(|_| ClientError::Unauthorized("stored session is not base64".into()))?;
        let session = Session::load(&raw)
            .map_err(|_| ClientError::Unauthorized("stored session is malformed".into()))?;

        let client = open(credentials, session).await?;
        if !client.is_authorized().await.map_err(invocation_error)? {
            return Err(ClientError::Unauthorized("session is signed out".into()));
        }
        self.client = Some(client);
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<MessageHandle>, ClientError> {
        let Some(client) = self.client.as_ref() else {
            return Ok(None);
        };
        loop {
            let update = client.next_update().await.map_err(invocation_error)?;
            if let Update::NewMessage(message) = update {
                let chat_id = self.remember(&message.chat().pack());
                return Ok(Some(MessageHandle {
                    chat_id,
                    message_id: message.id(),
                }));
            }
        }
    }

    async fn forward(
        &self,
        destination: ChatId,
        message: &MessageHandle,
    ) -> Result<(), ClientError> {
        let client = self.connected()?;
        let source = self.resolve(client, message.chat_id).await?;
        let target = self.resolve(client, destination).await?;
        client
            .forward_messages(target, &[message.message_id], source)
            .await
            .map_err(invocation_error)?;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ClientError> {
        if self.client.take().is_some() {
            info!("mtproto session closed");
        }
        if let Ok(mut chats) = self.chats.write() {
            chats.clear();
        }
        Ok(())
    }
}

/// Sign-in client for a fresh session.
///
/// grammers keeps the code and password challenges as in-memory values, so
/// the tokens handed to [`crate::LoginFlow`] only name the pending challenge.
pub struct MtprotoLogin {
    client: Client,
    code: Option<LoginToken>,
    password: Option<RemotePasswordToken>,
}

impl MtprotoLogin {
    pub async fn connect(credentials: &ApiCredentials) -> Result<Self, ClientError> {
        Ok(Self {
            client: open(credentials, Session::new()).await?,
            code: None,
            password: None,
        })
    }
}

#[async_trait]
impl LoginClient for MtprotoLogin {
    async fn send_code(&mut self, phone: &str) -> Result<CodeToken, ClientError> {
        let token = self
            .client
            .request_login_code(phone)
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?;
        self.code = Some(token);
        self.password = None;
        Ok(CodeToken(phone.to_string()))
    }

    async fn sign_in(
        &mut self,
        _phone: &str,
        _token: &CodeToken,
        code: &str,
    ) -> Result<SignIn, ClientError> {
        let token = self
            .code
            .as_ref()
            .ok_or_else(|| ClientError::Rpc("no confirmation code was requested".into()))?;
        match self.client.sign_in(token, code).await {
            Ok(_) => Ok(SignIn::Authorized {
                session: export_session(&self.client),
            }),
            Err(SignInError::PasswordRequired(password)) => {
                let hint = password.hint().map(|h| h.to_string());
                self.password = Some(password);
                Ok(SignIn::PasswordRequired {
                    hint,
                    token: PasswordToken("2fa".into()),
                })
            },
            Err(e) => Err(sign_in_error(e)),
        }
    }

    async fn check_password(
        &mut self,
        _token: &PasswordToken,
        password: &str,
    ) -> Result<Secret<String>, ClientError> {
        // The server challenge is single use; a wrong password ends the flow.
        let challenge = self
            .password
            .take()
            .ok_or_else(|| ClientError::Rpc("password challenge already used".into()))?;
        self.client
            .check_password(challenge, password.as_bytes())
            .await
            .map_err(sign_in_error)?;
        Ok(export_session(&self.client))
    }
}
