//! Sudo orchestration.
//!
//! ```text
//! sudo(request)
//!   │
//!   ├─ user_info ───────────────── not in policy ──► CommandNotAllowed
//!   ├─ authenticate (credentials cache) ───────────► InvalidLogon / TooManyInvalidLogons / LockedOut
//!   ├─ quote `/package x.msi`
//!   ├─ verify_command ──────────── denied ─────────► CommandNotAllowed
//!   ├─ grant lease (privileges group) ─────────────► GroupNotFound / UsernameNotFound / GenericError
//!   ├─ synchronous: spawn, wait, release
//!   │  deferred:    release after the fixed delay
//!   └─ audit ──────────────────────────────────────► Ok | OkAdded
//! ```
//!
//! Each invocation runs on its own task, so a caller that stops waiting
//! does not cut the revoke or the audit short. Policy lookups,
//! authentication and process waits are blocking calls and run on the
//! blocking pool. Every outcome is audited once.

use crate::audit::AuditLogger;
use crate::config::{GrantConfig, RevokeStrategy, ServiceConfig};
use crate::credentials::{CredentialPolicy, CredentialsCache};
use crate::error::ServiceError;
use crate::grant::{GrantManager, UnsudoOutcome};
use crate::phase::{Elevation, ElevationPhase};
use elevate_auth::{
    AuthError, AuthenticationProvider, AuthorizationEngine, AuthorizationProvider, DenyReason,
    DirectoryProvider, HostInfo, LaunchError, LaunchRequest, LocalFiles, Membership,
    ProcessLauncher, SudoError, UserInfo, Verdict,
};
use elevate_policy::PolicyStore;
use elevate_types::{GroupName, InvocationId, LoggingLevel, ResultCode, UserName};
use regex::Regex;
use secrecy::SecretString;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::Instrument;

static MSI_PACKAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(.*)/package (.*.msi)(.*)").expect("static regex")
});

/// Quotes the package path of `/package <file>.msi` arguments.
#[must_use]
pub fn quote_msi_package(arguments: &str) -> Cow<'_, str> {
    if !arguments.contains("/package ") || !arguments.contains(".msi") {
        return Cow::Borrowed(arguments);
    }
    MSI_PACKAGE.replace(arguments, r#"${1}/package "${2}"${3}"#)
}

/// One elevation request from an authenticated channel.
pub struct SudoRequest {
    pub user: UserName,
    pub secret: SecretString,
    pub command: String,
    pub arguments: String,
}

impl SudoRequest {
    pub fn new(
        user: UserName,
        secret: SecretString,
        command: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            user,
            secret,
            command: command.into(),
            arguments: arguments.into(),
        }
    }
}

impl std::fmt::Debug for SudoRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SudoRequest")
            .field("user", &self.user)
            .field("command", &self.command)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

/// What the caller gets back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SudoOutcome {
    pub invocation: InvocationId,
    pub result: ResultCode,
    /// Human-readable reason for a failure.
    pub message: Option<String>,
    /// Exit code of the elevated process (synchronous strategy only).
    pub exit_code: Option<i32>,
}

impl SudoOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }
}

/// OS-facing collaborators of the service.
#[derive(Clone)]
pub struct Backends {
    pub directory: Arc<dyn DirectoryProvider>,
    pub authenticator: Arc<dyn AuthenticationProvider>,
    pub launcher: Arc<dyn ProcessLauncher>,
    pub host: Arc<dyn HostInfo>,
}

/// Where an invocation is audited: the level resolved so far and the
/// command path as resolved so far.
#[derive(Debug)]
struct AuditScope {
    level: LoggingLevel,
    command_path: PathBuf,
}

impl AuditScope {
    fn new(command: &str) -> Self {
        Self {
            level: LoggingLevel::default(),
            command_path: PathBuf::from(command),
        }
    }
}

/// The sudo server core.
///
/// Cloning is cheap and shares every collaborator.
#[derive(Clone)]
pub struct SudoService {
    authorization: Arc<dyn AuthorizationProvider>,
    credentials: Arc<CredentialsCache>,
    grants: Arc<GrantManager>,
    launcher: Arc<dyn ProcessLauncher>,
    audit: AuditLogger,
    grant: GrantConfig,
}

impl std::fmt::Debug for SudoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SudoService")
            .field("grants", &self.grants)
            .field("audit", &self.audit)
            .field("grant", &self.grant)
            .finish_non_exhaustive()
    }
}

impl SudoService {
    pub fn new(
        grant: GrantConfig,
        authorization: Arc<dyn AuthorizationProvider>,
        credentials: CredentialsCache,
        membership: Membership,
        launcher: Arc<dyn ProcessLauncher>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            authorization,
            credentials: Arc::new(credentials),
            grants: GrantManager::new(membership),
            launcher,
            audit,
            grant,
        }
    }

    /// Wires the document-backed engine, credentials cache and audit
    /// sinks described by `config` around `backends`.
    ///
    /// The policy is not loaded here; the first request loads it.
    ///
    /// # Errors
    ///
    /// Unsupported policy URI or an audit file that cannot be opened.
    pub fn from_config(config: &ServiceConfig, backends: Backends) -> Result<Self, ServiceError> {
        let machine = backends.host.machine_name();
        let store = Arc::new(PolicyStore::new(config.policy.clone(), machine.clone())?);
        let engine = AuthorizationEngine::new(
            store,
            backends.directory,
            backends.host,
            Arc::new(LocalFiles::new()),
        );
        let membership = engine.membership().clone();
        let credentials = CredentialsCache::new(
            backends.authenticator,
            machine,
            config.credentials.cache_enabled,
        );
        let audit = AuditLogger::from_config(&config.audit)?;

        Ok(Self::new(
            config.grant.clone(),
            Arc::new(engine),
            credentials,
            membership,
            backends.launcher,
            audit,
        ))
    }

    #[must_use]
    pub fn grants(&self) -> &Arc<GrantManager> {
        &self.grants
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialsCache {
        &self.credentials
    }

    /// Runs `request.command` elevated for `request.user`.
    ///
    /// The invocation runs on its own task. Dropping the returned future
    /// stops the wait but not the invocation: the grant is still revoked
    /// after the elevated process exits and the outcome is still audited.
    pub async fn sudo(&self, request: SudoRequest) -> SudoOutcome {
        let invocation = InvocationId::new();
        let span = tracing::info_span!("sudo", %invocation, user = %request.user);
        let (user, command, arguments) = (
            request.user.clone(),
            request.command.clone(),
            request.arguments.clone(),
        );

        let service = self.clone();
        let task = tokio::spawn(
            async move { service.sudo_inner(invocation, request).await }.instrument(span.clone()),
        );
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let _guard = span.enter();
                let scope = AuditScope::new(&command);
                let error = SudoError::internal(format!("sudo task failed: {e}"));
                self.finish(invocation, &user, &scope, &arguments, Err(error), None)
            }
        }
    }

    async fn sudo_inner(&self, invocation: InvocationId, request: SudoRequest) -> SudoOutcome {
        let SudoRequest {
            user,
            secret,
            command,
            arguments,
        } = request;
        let arguments = quote_msi_package(&arguments).into_owned();
        tracing::debug!(command = %command, arguments = %arguments, "sudo requested");

        let authorization = Arc::clone(&self.authorization);
        let credentials = Arc::clone(&self.credentials);
        let (u, c, a) = (user.clone(), command.clone(), arguments.clone());
        let checked = tokio::task::spawn_blocking(move || {
            let mut scope = AuditScope::new(&c);
            let group = authorize(authorization.as_ref(), &credentials, &u, secret, &c, &a, &mut scope);
            (scope, group)
        })
        .await;
        let (scope, group) = match checked {
            Ok(checked) => checked,
            Err(e) => (
                AuditScope::new(&command),
                Err(AuthError::Unavailable(format!("authorization task failed: {e}")).into()),
            ),
        };
        let group = match group {
            Ok(group) => group,
            Err(e) => return self.finish(invocation, &user, &scope, &arguments, Err(e), None),
        };

        let mut elevation = Elevation::new();
        if let Err(e) = elevation.advance(ElevationPhase::Granting) {
            return self.finish(invocation, &user, &scope, &arguments, Err(e.into()), None);
        }
        let lease = match self.grants.acquire(&user, &group).await {
            Ok(lease) => lease,
            Err(e) => {
                elevation.fail();
                return self.finish(invocation, &user, &scope, &arguments, Err(e), None);
            }
        };
        if let Err(e) = elevation.advance(ElevationPhase::Granted) {
            lease.release().await;
            elevation.fail();
            return self.finish(invocation, &user, &scope, &arguments, Err(e.into()), None);
        }
        let granted = if lease.is_temporary() {
            ResultCode::OkAdded
        } else {
            ResultCode::Ok
        };

        let result = match self.grant.strategy {
            RevokeStrategy::Deferred => {
                let _revoke = lease.release_after(self.grant.deferred_delay());
                elevation
                    .advance(ElevationPhase::Done)
                    .map(|()| None)
                    .map_err(SudoError::from)
            }
            RevokeStrategy::Synchronous => {
                let run = match elevation.advance(ElevationPhase::Running) {
                    Ok(()) => self.run(&user, &scope.command_path, &arguments).await,
                    Err(e) => Err(e.into()),
                };
                let revoking = elevation.advance(ElevationPhase::Revoking);
                lease.release().await;
                run.and_then(|exit_code| {
                    revoking?;
                    elevation.advance(ElevationPhase::Done)?;
                    Ok(Some(exit_code))
                })
            }
        };
        match result {
            Ok(exit_code) => self.finish(invocation, &user, &scope, &arguments, Ok(granted), exit_code),
            Err(e) => {
                elevation.fail();
                self.finish(invocation, &user, &scope, &arguments, Err(e), None)
            }
        }
    }

    /// Starts the elevated process and waits for it to exit.
    async fn run(&self, user: &UserName, command: &Path, arguments: &str) -> Result<i32, SudoError> {
        let launcher = Arc::clone(&self.launcher);
        let request = LaunchRequest {
            user: user.clone(),
            command: command.to_path_buf(),
            arguments: arguments.to_string(),
        };
        let exit_code = tokio::task::spawn_blocking(move || -> Result<i32, LaunchError> {
            let handle = launcher.spawn_as_user(&request)?;
            tracing::info!(pid = handle.pid, command = %request.command.display(), "elevated process started");
            launcher.wait_for_exit(handle)
        })
        .await
        .map_err(|e| LaunchError::spawn(command, format!("launch task failed: {e}")))??;
        tracing::info!(exit_code, "elevated process exited");
        Ok(exit_code)
    }

    fn finish(
        &self,
        invocation: InvocationId,
        user: &UserName,
        scope: &AuditScope,
        arguments: &str,
        result: Result<ResultCode, SudoError>,
        exit_code: Option<i32>,
    ) -> SudoOutcome {
        let (code, message) = match result {
            Ok(code) => (code, None),
            Err(e) => {
                match e.result_code() {
                    ResultCode::GenericError => tracing::error!(error = %e, "sudo failed"),
                    code => tracing::info!(error = %e, %code, "sudo refused"),
                }
                (e.result_code(), Some(e.user_message()))
            }
        };
        let result = self.audit.log_result(
            invocation,
            user,
            &scope.command_path,
            arguments,
            scope.level,
            code,
        );
        SudoOutcome {
            invocation,
            result,
            message,
            exit_code,
        }
    }

    /// Removes `user` from their privileges group.
    ///
    /// Deferred until the last live elevation of `user` ends.
    pub async fn unsudo(&self, user: &UserName) -> SudoOutcome {
        let invocation = InvocationId::new();
        let span = tracing::info_span!("unsudo", %invocation, user = %user);
        let result = self.unsudo_inner(user).instrument(span).await;
        match result {
            Ok(outcome) => {
                tracing::info!(user = %user, ?outcome, "unsudo");
                SudoOutcome {
                    invocation,
                    result: ResultCode::Ok,
                    message: None,
                    exit_code: None,
                }
            }
            Err(e) => {
                tracing::info!(user = %user, error = %e, "unsudo refused");
                SudoOutcome {
                    invocation,
                    result: e.result_code(),
                    message: Some(e.user_message()),
                    exit_code: None,
                }
            }
        }
    }

    async fn unsudo_inner(&self, user: &UserName) -> Result<UnsudoOutcome, SudoError> {
        let authorization = Arc::clone(&self.authorization);
        let u = user.clone();
        let info = tokio::task::spawn_blocking(move || authorization.user_info(&u))
            .await
            .map_err(|e| AuthError::Unavailable(format!("authorization task failed: {e}")))??
            .ok_or_else(|| SudoError::denied(DenyReason::UserNotInPolicy))?;
        let group = privileges_group(&info)?;
        self.grants.unsudo(user, &group).await
    }

    /// Runs pending deferred revokes now; returns how many ran.
    ///
    /// Call before the runtime stops so no deferred grant outlives the
    /// service.
    pub async fn shutdown(&self) -> usize {
        let revoked = self.grants.revoke_scheduled().await;
        tracing::info!(revoked, "sudo service stopped");
        revoked
    }

    /// Logon and elevation settings for `user`.
    ///
    /// # Errors
    ///
    /// Policy load failures and account lookup errors.
    pub fn user_info(&self, user: &UserName) -> Result<Option<UserInfo>, SudoError> {
        self.authorization.user_info(user)
    }

    /// Reloads the policy; returns whether a new document was published.
    pub fn update_policy(&self, force: bool) -> bool {
        self.authorization.update(force)
    }
}

fn privileges_group(info: &UserInfo) -> Result<GroupName, SudoError> {
    info.privileges_group
        .clone()
        .ok_or_else(|| SudoError::group_not_found("(no privileges group configured)"))
}

/// Everything before the grant: policy membership, logon, command
/// check. Fills `scope` as the user and command get resolved.
fn authorize(
    authorization: &dyn AuthorizationProvider,
    credentials: &CredentialsCache,
    user: &UserName,
    secret: SecretString,
    command: &str,
    arguments: &str,
    scope: &mut AuditScope,
) -> Result<GroupName, SudoError> {
    let Some(info) = authorization.user_info(user)? else {
        return Err(SudoError::denied(DenyReason::UserNotInPolicy));
    };
    scope.level = info.logging_level;

    credentials.authenticate(user, secret, &CredentialPolicy::from(&info))?;

    let decision = authorization.verify_command(user, command, arguments)?;
    scope.command_path = decision.command_path.clone();
    if let Some(level) = decision.logging_level {
        scope.level = level;
    }
    if let Verdict::Denied(reason) = decision.verdict {
        return Err(SudoError::denied(reason));
    }
    privileges_group(&info)
}
