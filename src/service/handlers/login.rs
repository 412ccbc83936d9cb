use tracing::{debug, info};

use crate::admission::Requirements;
use crate::auth::{validate_login, AuthHeader, AuthenticationRequest};
use crate::connection::{Endpoint, LoginIdentity, NodeDescriptor};
use crate::error::{codes, Result, TxnError};
use crate::protocol::options::{AcceptableFeatureVersion, ApplicationName, DbName, SqlRequest};
use crate::protocol::{Event, EventType, OptionSet, Request, Response};
use crate::service::context::EventContext;
use crate::service::handler::{Outcome, StatementHandler};
use crate::types::{
    RequestType, RoleType, UserType, AUTHENTICATION_PARTITION, PUBLIC_DB_ID, PUBLIC_DB_NAME,
    SYSTEM_DB_ID, SYSTEM_DB_NAME,
};

/// LOGIN: start the authentication handshake
///
/// Body: `user | digest | txn timeout (4) | immediate consistency (1)`.
/// Database name, application name, feature version and SQL origin travel
/// as options.
pub struct LoginHandler;

struct LoginRequest {
    user_name: String,
    digest: String,
    db_name: String,
    application_name: String,
    txn_timeout_interval_ms: u64,
    immediate_consistency: bool,
    is_sql: bool,
}

impl LoginRequest {
    fn decode(request: &Request) -> Result<Self> {
        let mut body = request.body();
        let user_name = body.read_string("user name")?;
        let digest = body.read_string("digest")?;
        let txn_timeout = body.read_i32("transaction timeout")?;
        let immediate_consistency = body.read_bool("immediate consistency")?;

        Ok(Self {
            user_name,
            digest,
            db_name: request.options.get::<DbName>(),
            application_name: request.options.get::<ApplicationName>(),
            txn_timeout_interval_ms: txn_timeout.max(0) as u64,
            immediate_consistency,
            is_sql: request.options.get::<SqlRequest>(),
        })
    }
}

impl StatementHandler for LoginHandler {
    fn requirements(&self) -> Requirements {
        Requirements::connection()
    }

    fn execute(&self, ec: &mut EventContext<'_>, ev: &Event, request: &Request) -> Result<Outcome> {
        // Step 1: shape of the request
        let login = LoginRequest::decode(request)?;
        validate_login(
            &login.user_name,
            &login.digest,
            &login.db_name,
            &login.application_name,
        )?;

        // Step 2: identity, still unauthenticated
        let admin = ec.config().admin_user(&login.user_name).cloned();
        let user_type = if admin.is_some() {
            UserType::Admin
        } else {
            UserType::Normal
        };
        let feature_version = request.options.get::<AcceptableFeatureVersion>();
        if let Some(mut option) = ec.connection_option(ev) {
            option.set_before_auth(LoginIdentity {
                user_name: login.user_name.clone(),
                db_name: login.db_name.clone(),
                application_name: login.application_name.clone(),
                user_type,
                request_type: if login.is_sql {
                    RequestType::Sql
                } else {
                    RequestType::NoSql
                },
                txn_timeout_interval_ms: login.txn_timeout_interval_ms,
                immediate_consistency: login.immediate_consistency,
                acceptable_feature_version: feature_version,
            });
        }

        // Step 3: administrators are verified here
        if let Some(admin) = admin {
            if admin.digest != login.digest {
                return Err(TxnError::deny(
                    codes::AUTH_FAILED,
                    format!("Invalid user name or password (user={})", login.user_name),
                ));
            }
            if let Some(db_id) = builtin_db_id(&login.db_name) {
                if let Some(mut option) = ec.connection_option(ev) {
                    option.set_after_auth(db_id, ec.now, RoleType::All);
                }
                info!(user = %login.user_name, db_id, "administrator authenticated");
                return Ok(Outcome::Reply(Response {
                    role: Some(RoleType::All),
                    database_id: Some(db_id),
                    ..Response::new()
                }));
            }
        }

        // Step 4: ask the authority node
        let authority = ec
            .shared
            .partitions
            .owner(AUTHENTICATION_PARTITION)
            .ok_or_else(|| {
                TxnError::System(format!(
                    "No owner of authentication partition {}",
                    AUTHENTICATION_PARTITION
                ))
            })?;

        let sink = ec.reply_sink(ev, request);
        let key = ec.worker.auth.put(request.clone(), sink, login.is_sql, ec.now);

        let mut options = OptionSet::new();
        options.set::<AcceptableFeatureVersion>(feature_version);
        let message = AuthenticationRequest {
            header: AuthHeader {
                cluster_version: ec.shared.partitions.cluster_version(),
                auth_id: key.1,
                auth_pid: key.0,
            },
            user_name: login.user_name,
            digest: login.digest,
            db_name: login.db_name,
            user_type,
            is_sql: login.is_sql,
            options,
        };

        let sent = message.encode().and_then(|payload| {
            let event = Event::new(
                AUTHENTICATION_PARTITION,
                EventType::Authentication,
                NodeDescriptor::Server(ec.shared.self_node()),
                payload,
            );
            ec.transport().send(
                Endpoint::Transaction,
                &NodeDescriptor::Server(authority),
                event,
            )
        });
        if let Err(e) = sent {
            ec.worker.auth.take(key);
            return Err(e);
        }

        debug!(
            pid = key.0,
            auth_id = key.1,
            user = %message.user_name,
            authority,
            "authentication requested"
        );
        Ok(Outcome::Deferred)
    }
}

fn builtin_db_id(db_name: &str) -> Option<i64> {
    match db_name {
        "" | PUBLIC_DB_NAME => Some(PUBLIC_DB_ID),
        SYSTEM_DB_NAME => Some(SYSTEM_DB_ID),
        _ => None,
    }
}

/// LOGOUT: drop authentication, keep the connection
pub struct LogoutHandler;

impl StatementHandler for LogoutHandler {
    fn requirements(&self) -> Requirements {
        Requirements::connection()
    }

    fn execute(&self, ec: &mut EventContext<'_>, ev: &Event, _request: &Request) -> Result<Outcome> {
        if let Some(mut option) = ec.connection_option(ev) {
            debug!(user = %option.user_name, "logout");
            option.logout();
        }
        Ok(Outcome::Reply(Response::new()))
    }
}
