//! Record management: tenants, resources, tasks and routing rules.

use {
    anyhow::{Context, Result},
    clap::Subcommand,
    ferry_common::{ChatId, ConnectionKind, ForwardMode, ResourceId, RuleId, TaskId},
    ferry_config::UserbotConfig,
    ferry_store::{NewResource, NewRule, NewTask, Resource, RoutingTask, SqliteConfigStore},
    ferry_userbot::{ApiCredentials, LoginClient, LoginFlow, LoginStep, MtprotoLogin},
    ferry_vault::Vault,
    secrecy::{ExposeSecret, Secret},
};

use crate::read_secret;

#[derive(Subcommand)]
pub enum TenantAction {
    /// Register a tenant by Telegram user id (no-op if it exists).
    Add {
        telegram_user_id: i64,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        timezone: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ResourceAction {
    /// Register a gateway bot or user session. The secret is read from stdin.
    Add {
        /// Telegram user id of the owning tenant.
        #[arg(long)]
        tenant: i64,
        /// `bot` or `user`.
        #[arg(long)]
        kind: ConnectionKind,
        #[arg(long)]
        label: Option<String>,
    },
    /// Sign in a personal account and store the resulting user session.
    Login {
        /// Telegram user id of the owning tenant.
        #[arg(long)]
        tenant: i64,
        /// Phone number in international format.
        #[arg(long)]
        phone: String,
        #[arg(long)]
        label: Option<String>,
    },
    List {
        /// Only resources of this tenant (Telegram user id).
        #[arg(long)]
        tenant: Option<i64>,
    },
    Enable { id: ResourceId },
    Disable { id: ResourceId },
    Remove { id: ResourceId },
}

#[derive(Subcommand)]
pub enum TaskAction {
    Add {
        #[arg(long)]
        resource: ResourceId,
        #[arg(long)]
        name: String,
    },
    List {
        #[arg(long)]
        resource: ResourceId,
    },
    Rename { id: TaskId, name: String },
    Enable { id: TaskId },
    Disable { id: TaskId },
    Remove { id: TaskId },
}

#[derive(Subcommand)]
pub enum RuleAction {
    Add {
        #[arg(long)]
        task: TaskId,
        /// Source chat id.
        #[arg(long, allow_negative_numbers = true)]
        from: ChatId,
        /// Destination chat id.
        #[arg(long, allow_negative_numbers = true)]
        to: ChatId,
        /// `copy` (default) or `forward`.
        #[arg(long, default_value = "copy")]
        mode: ForwardMode,
    },
    List {
        #[arg(long)]
        task: TaskId,
    },
    Remove { id: RuleId },
}

pub async fn handle_tenants(action: TenantAction, store: &SqliteConfigStore) -> Result<()> {
    match action {
        TenantAction::Add {
            telegram_user_id,
            language,
            timezone,
        } => {
            let mut tenant = store.get_or_create_tenant(telegram_user_id).await?;
            if language.is_some() || timezone.is_some() {
                tenant = store
                    .update_tenant_preferences(tenant.id, language.as_deref(), timezone.as_deref())
                    .await?;
            }
            println!(
                "tenant {} (telegram user {}) language={} timezone={}",
                tenant.id,
                tenant.telegram_user_id,
                tenant.language_code.as_deref().unwrap_or("-"),
                tenant.timezone.as_deref().unwrap_or("-"),
            );
        },
    }
    Ok(())
}

pub async fn handle_resources(
    action: ResourceAction,
    store: &SqliteConfigStore,
    userbot: &UserbotConfig,
    vault: impl FnOnce() -> Result<Vault>,
) -> Result<()> {
    match action {
        ResourceAction::Add {
            tenant,
            kind,
            label,
        } => {
            let vault = vault()?;
            let tenant = store.get_or_create_tenant(tenant).await?;
            let prompt = match kind {
                ConnectionKind::GatewayBot => "Bot token",
                ConnectionKind::UserSession => "Session string",
            };
            let secret = read_secret(prompt)?;
            let resource = store
                .create_resource(&vault, NewResource {
                    tenant_id: tenant.id,
                    kind,
                    label,
                    secret,
                })
                .await?;
            print_resource(&resource);
        },
        ResourceAction::Login {
            tenant,
            phone,
            label,
        } => {
            let vault = vault()?;
            let credentials = ApiCredentials::from_config(userbot)?;
            let client = MtprotoLogin::connect(&credentials)
                .await
                .context("connecting to Telegram")?;
            let session = sign_in(LoginFlow::new(client), &phone, read_secret).await?;

            let tenant = store.get_or_create_tenant(tenant).await?;
            let resource = store
                .create_resource(&vault, NewResource {
                    tenant_id: tenant.id,
                    kind: ConnectionKind::UserSession,
                    label: label.or(Some(phone)),
                    secret: session,
                })
                .await?;
            print_resource(&resource);
        },
        ResourceAction::List { tenant } => {
            let tenant_id = match tenant {
                Some(user) => Some(store.get_or_create_tenant(user).await?.id),
                None => None,
            };
            let resources = store.list_resources(tenant_id).await?;
            if resources.is_empty() {
                println!("No resources.");
            }
            for r in &resources {
                print_resource(r);
            }
        },
        ResourceAction::Enable { id } => print_resource(&store.set_resource_active(id, true).await?),
        ResourceAction::Disable { id } => {
            print_resource(&store.set_resource_active(id, false).await?);
        },
        ResourceAction::Remove { id } => removed("resource", id, store.delete_resource(id).await?)?,
    }
    Ok(())
}

pub async fn handle_tasks(action: TaskAction, store: &SqliteConfigStore) -> Result<()> {
    match action {
        TaskAction::Add { resource, name } => {
            print_task(&store.create_task(NewTask::new(resource, name)).await?);
        },
        TaskAction::List { resource } => {
            let tasks = store.list_tasks(resource).await?;
            if tasks.is_empty() {
                println!("No tasks.");
            }
            for t in &tasks {
                print_task(t);
            }
        },
        TaskAction::Rename { id, name } => print_task(&store.rename_task(id, &name).await?),
        TaskAction::Enable { id } => print_task(&store.set_task_active(id, true).await?),
        TaskAction::Disable { id } => print_task(&store.set_task_active(id, false).await?),
        TaskAction::Remove { id } => removed("task", id, store.delete_task(id).await?)?,
    }
    Ok(())
}

pub async fn handle_rules(action: RuleAction, store: &SqliteConfigStore) -> Result<()> {
    match action {
        RuleAction::Add {
            task,
            from,
            to,
            mode,
        } => {
            let rule = store
                .add_rule(NewRule::new(task, from, to, mode))
                .await
                .with_context(|| format!("adding rule to task {task}"))?;
            println!(
                "rule {}: {} -> {} ({})",
                rule.id, rule.source_chat_id, rule.destination_chat_id, rule.forward_mode
            );
        },
        RuleAction::List { task } => {
            let rules = store.list_rules(task).await?;
            if rules.is_empty() {
                println!("No rules.");
            }
            for r in &rules {
                println!(
                    "  {:>5}  {:>16} -> {:<16} {}",
                    r.id, r.source_chat_id, r.destination_chat_id, r.forward_mode
                );
            }
        },
        RuleAction::Remove { id } => removed("rule", id, store.delete_rule(id).await?)?,
    }
    Ok(())
}

/// Drive a login to completion, asking for each code or password.
async fn sign_in<C: LoginClient>(
    mut flow: LoginFlow<C>,
    phone: &str,
    mut ask: impl FnMut(&str) -> Result<Secret<String>>,
) -> Result<Secret<String>> {
    let mut step = flow.start(phone).await?;
    loop {
        step = match step {
            LoginStep::AwaitingCode { attempts_left } => {
                eprintln!("Code sent to {phone} ({attempts_left} attempt(s) left).");
                let code = ask("Confirmation code")?;
                flow.submit_code(code.expose_secret()).await?
            },
            LoginStep::AwaitingPassword {
                hint,
                attempts_left,
            } => {
                eprintln!(
                    "Two-factor password required (hint: {}, {attempts_left} attempt(s) left).",
                    hint.as_deref().unwrap_or("none")
                );
                let password = ask("Password")?;
                flow.submit_password(password.expose_secret()).await?
            },
            LoginStep::Success { session } => return Ok(session),
            LoginStep::Failed { reason } => anyhow::bail!("sign-in failed: {reason}"),
        };
    }
}

fn print_resource(r: &Resource) {
    println!(
        "  {:>5}  {:<12} tenant={:<5} {:<8} {}{}",
        r.id,
        r.kind,
        r.tenant_id,
        if r.is_active { "active" } else { "inactive" },
        r.label.as_deref().unwrap_or("-"),
        if r.has_secret { "" } else { " (no secret)" },
    );
}

fn print_task(t: &RoutingTask) {
    println!(
        "  {:>5}  resource={:<5} {:<12} {:<8} {}",
        t.id,
        t.resource_id,
        t.kind,
        if t.is_active { "active" } else { "inactive" },
        t.name,
    );
}

fn removed(what: &str, id: i64, found: bool) -> Result<()> {
    anyhow::ensure!(found, "{what} {id} not found");
    println!("{what} {id} removed");
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::VecDeque, rc::Rc};

    use {
        super::*,
        async_trait::async_trait,
        ferry_userbot::{ClientError, CodeToken, PasswordToken, SignIn},
    };

    /// Accepts code `22222` and, when `password` is set, requires it next.
    struct Account {
        password: Option<&'static str>,
    }

    #[async_trait]
    impl LoginClient for Account {
        async fn send_code(&mut self, phone: &str) -> Result<CodeToken, ClientError> {
            Ok(CodeToken(format!("hash-{phone}")))
        }

        async fn sign_in(
            &mut self,
            _phone: &str,
            _token: &CodeToken,
            code: &str,
        ) -> Result<SignIn, ClientError> {
            match (code, self.password) {
                ("22222", None) => Ok(SignIn::Authorized {
                    session: Secret::new("session-a".into()),
                }),
                ("22222", Some(_)) => Ok(SignIn::PasswordRequired {
                    hint: Some("pet".into()),
                    token: PasswordToken("srp".into()),
                }),
                _ => Err(ClientError::InvalidCode),
            }
        }

        async fn check_password(
            &mut self,
            _token: &PasswordToken,
            password: &str,
        ) -> Result<Secret<String>, ClientError> {
            if Some(password) == self.password {
                Ok(Secret::new("session-b".into()))
            } else {
                Err(ClientError::InvalidPassword)
            }
        }
    }

    fn answers(
        script: &[&str],
    ) -> (
        impl FnMut(&str) -> Result<Secret<String>>,
        Rc<RefCell<Vec<String>>>,
    ) {
        let prompts = Rc::new(RefCell::new(Vec::new()));
        let seen = prompts.clone();
        let mut queue: VecDeque<String> = script.iter().map(|s| s.to_string()).collect();
        let ask = move |prompt: &str| {
            seen.borrow_mut().push(prompt.to_string());
            queue
                .pop_front()
                .map(Secret::new)
                .ok_or_else(|| anyhow::anyhow!("no more input"))
        };
        (ask, prompts)
    }

    #[tokio::test]
    async fn retries_code_then_signs_in() {
        let (ask, prompts) = answers(&["11111", "22222"]);
        let flow = LoginFlow::new(Account { password: None });

        let session = sign_in(flow, "+100", ask).await.unwrap();

        assert_eq!(session.expose_secret(), "session-a");
        assert_eq!(*prompts.borrow(), vec!["Confirmation code", "Confirmation code"]);
    }

    #[tokio::test]
    async fn asks_for_two_factor_password() {
        let (ask, prompts) = answers(&["22222", "wrong", "hunter2"]);
        let flow = LoginFlow::new(Account {
            password: Some("hunter2"),
        });

        let session = sign_in(flow, "+100", ask).await.unwrap();

        assert_eq!(session.expose_secret(), "session-b");
        assert_eq!(*prompts.borrow(), vec!["Confirmation code", "Password", "Password"]);
    }

    #[tokio::test]
    async fn exhausted_attempts_fail_the_login() {
        let (ask, _) = answers(&["1", "2", "3"]);
        let flow = LoginFlow::new(Account { password: None });

        let err = sign_in(flow, "+100", ask).await.unwrap_err();
        assert!(err.to_string().starts_with("sign-in failed"));
    }
}
