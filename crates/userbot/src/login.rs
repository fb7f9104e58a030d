//! Interactive sign-in for user sessions.
//!
//! ```text
//! Idle ─start─► AwaitingCode ─submit_code─► Success
//!                    │  ▲ invalid code            ▲
//!                    │  └─────────┘               │
//!                    └──► AwaitingPassword ─submit_password
//! ```
//!
//! Any unrecoverable client error, or exhausting the attempt limit, moves the
//! flow to `Failed`. A failed or finished flow can be restarted with
//! [`LoginFlow::start`].

use {
    async_trait::async_trait,
    secrecy::Secret,
    tracing::{info, warn},
};

use crate::client::ClientError;

/// Server handle for an issued confirmation code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeToken(pub String);

/// Server handle for a pending two-factor password check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordToken(pub String);

/// Result of submitting a confirmation code.
#[derive(Debug)]
pub enum SignIn {
    Authorized { session: Secret<String> },
    PasswordRequired {
        hint: Option<String>,
        token: PasswordToken,
    },
}

/// Sign-in surface of an MTProto client.
#[async_trait]
pub trait LoginClient: Send {
    async fn send_code(&mut self, phone: &str) -> Result<CodeToken, ClientError>;

    async fn sign_in(
        &mut self,
        phone: &str,
        token: &CodeToken,
        code: &str,
    ) -> Result<SignIn, ClientError>;

    /// Complete two-factor sign-in, returning the serialized session.
    async fn check_password(
        &mut self,
        token: &PasswordToken,
        password: &str,
    ) -> Result<Secret<String>, ClientError>;
}

/// Where the flow stands after a call.
#[derive(Debug)]
pub enum LoginStep {
    AwaitingCode { attempts_left: u32 },
    AwaitingPassword { hint: Option<String>, attempts_left: u32 },
    /// Signed in. The session must be encrypted before it is stored.
    Success { session: Secret<String> },
    Failed { reason: String },
}

/// Calls made in the wrong step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
    #[error("cannot {action} while {state}")]
    WrongStep {
        action: &'static str,
        state: &'static str,
    },

    #[error("phone number must not be empty")]
    EmptyPhone,
}

enum State {
    Idle,
    AwaitingCode {
        phone: String,
        token: CodeToken,
        attempts: u32,
    },
    AwaitingPassword {
        hint: Option<String>,
        token: PasswordToken,
        attempts: u32,
    },
    Done,
    Failed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingCode { .. } => "awaiting code",
            Self::AwaitingPassword { .. } => "awaiting password",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// Drives one sign-in attempt against a [`LoginClient`].
pub struct LoginFlow<C: LoginClient> {
    client: C,
    max_attempts: u32,
    state: State,
}

impl<C: LoginClient> LoginFlow<C> {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    pub fn new(client: C) -> Self {
        Self::with_max_attempts(client, Self::DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(client: C, max_attempts: u32) -> Self {
        Self {
            client,
            max_attempts: max_attempts.max(1),
            state: State::Idle,
        }
    }

    #[must_use]
    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    pub fn into_client(self) -> C {
        self.client
    }

    /// Request a confirmation code for `phone`.
    pub async fn start(&mut self, phone: &str) -> Result<LoginStep, LoginError> {
        if matches!(
            self.state,
            State::AwaitingCode { .. } | State::AwaitingPassword { .. }
        ) {
            return Err(self.wrong_step("start"));
        }
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(LoginError::EmptyPhone);
        }

        match self.client.send_code(phone).await {
            Ok(token) => {
                info!("confirmation code sent");
                self.state = State::AwaitingCode {
                    phone: phone.to_string(),
                    token,
                    attempts: 0,
                };
                Ok(LoginStep::AwaitingCode {
                    attempts_left: self.max_attempts,
                })
            },
            Err(e) => Ok(self.fail(e)),
        }
    }

    /// Submit the confirmation code the user received.
    pub async fn submit_code(&mut self, code: &str) -> Result<LoginStep, LoginError> {
        let State::AwaitingCode {
            phone,
            token,
            attempts,
        } = &mut self.state
        else {
            return Err(self.wrong_step("submit a code"));
        };

        match self.client.sign_in(phone, token, code.trim()).await {
            Ok(SignIn::Authorized { session }) => {
                info!("user session signed in");
                self.state = State::Done;
                Ok(LoginStep::Success { session })
            },
            Ok(SignIn::PasswordRequired { hint, token }) => {
                info!("two-factor password required");
                self.state = State::AwaitingPassword {
                    hint: hint.clone(),
                    token,
                    attempts: 0,
                };
                Ok(LoginStep::AwaitingPassword {
                    hint,
                    attempts_left: self.max_attempts,
                })
            },
            Err(ClientError::InvalidCode) => {
                *attempts += 1;
                let attempts_left = self.max_attempts.saturating_sub(*attempts);
                warn!(attempts_left, "invalid confirmation code");
                if attempts_left == 0 {
                    Ok(self.fail(ClientError::InvalidCode))
                } else {
                    Ok(LoginStep::AwaitingCode { attempts_left })
                }
            },
            Err(e) => Ok(self.fail(e)),
        }
    }

    /// Submit the two-factor password.
    pub async fn submit_password(&mut self, password: &str) -> Result<LoginStep, LoginError> {
        let State::AwaitingPassword {
            hint,
            token,
            attempts,
        } = &mut self.state
        else {
            return Err(self.wrong_step("submit a password"));
        };

        match self.client.check_password(token, password).await {
            Ok(session) => {
                info!("user session signed in with password");
                self.state = State::Done;
                Ok(LoginStep::Success { session })
            },
            Err(ClientError::InvalidPassword) => {
                *attempts += 1;
                let attempts_left = self.max_attempts.saturating_sub(*attempts);
                warn!(attempts_left, "invalid two-factor password");
                if attempts_left == 0 {
                    Ok(self.fail(ClientError::InvalidPassword))
                } else {
                    Ok(LoginStep::AwaitingPassword {
                        hint: hint.clone(),
                        attempts_left,
                    })
                }
            },
            Err(e) => Ok(self.fail(e)),
        }
    }

    fn fail(&mut self, err: ClientError) -> LoginStep {
        warn!(error = %err, "user session login failed");
        self.state = State::Failed;
        LoginStep::Failed {
            reason: err.to_string(),
        }
    }

    fn wrong_step(&self, action: &'static str) -> LoginError {
        LoginError::WrongStep {
            action,
            state: self.state.name(),
        }
    }
}
