//! Identity resolution on the authority node
//!
//! Pure lookups against the users and databases tables. A failed
//! resolution becomes an undefined database id in the ack; errors never
//! cross the node boundary.

use tracing::{debug, warn};

use crate::error::{codes, Result, TxnError};
use crate::protocol::options::AcceptableFeatureVersion;
use crate::store::{database_row_key, UserRow, UserStore};
use crate::types::{
    DatabaseId, RoleType, UserType, FEATURE_V4_3, PUBLIC_DB_ID, PUBLIC_DB_NAME, SYSTEM_DB_ID,
    SYSTEM_DB_NAME, UNDEF_DBID,
};

use super::message::AuthenticationRequest;

/// Owner row of every database
const DB_OWNER: &str = "admin";

/// Resolved database and role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub db_id: DatabaseId,
    pub role: RoleType,
}

impl Resolution {
    pub fn denied() -> Self {
        Self {
            db_id: UNDEF_DBID,
            role: RoleType::Read,
        }
    }

    pub fn is_denied(&self) -> bool {
        self.db_id == UNDEF_DBID
    }
}

/// Resolve a login; any failure yields [`Resolution::denied`]
pub fn resolve(store: &dyn UserStore, req: &AuthenticationRequest) -> Resolution {
    match resolve_inner(store, req) {
        Ok(resolution) => {
            debug!(
                user = %req.user_name,
                db = %req.db_name,
                db_id = resolution.db_id,
                role = resolution.role.as_privilege(),
                "authentication resolved"
            );
            resolution
        }
        Err(e) => {
            warn!(user = %req.user_name, db = %req.db_name, "authentication denied: {}", e);
            Resolution::denied()
        }
    }
}

fn resolve_inner(store: &dyn UserStore, req: &AuthenticationRequest) -> Result<Resolution> {
    // Step 1: credentials; administrators were verified by the origin node
    if req.user_type == UserType::Normal {
        verify_credentials(store, &req.user_name, &req.digest)?;
    }

    // Step 2: built-in databases
    let db_name = if req.db_name.is_empty() {
        PUBLIC_DB_NAME
    } else {
        req.db_name.as_str()
    };
    let resolution = if db_name == PUBLIC_DB_NAME {
        Resolution {
            db_id: PUBLIC_DB_ID,
            role: RoleType::All,
        }
    } else if db_name == SYSTEM_DB_NAME {
        // No privilege rows exist for the system database
        Resolution {
            db_id: SYSTEM_DB_ID,
            role: RoleType::All,
        }
    } else {
        // Step 3: privilege row, then the owner row for the database id
        resolve_user_database(store, db_name, &req.user_name, req.user_type)?
    };

    // Step 4: read-only access needs a client that understands it
    let feature_version = req.options.get::<AcceptableFeatureVersion>();
    if resolution.role == RoleType::Read && feature_version < FEATURE_V4_3 {
        return Err(TxnError::deny(
            codes::CLIENT_VERSION_NOT_ACCEPTABLE,
            format!(
                "Read-only access requires feature version {} (client={})",
                FEATURE_V4_3, feature_version
            ),
        ));
    }
    Ok(resolution)
}

fn verify_credentials(store: &dyn UserStore, user_name: &str, digest: &str) -> Result<()> {
    let matched = store.count_users(&|row: &UserRow| row.name == user_name && row.digest == digest)?;
    if matched != 1 {
        return Err(TxnError::deny(
            codes::AUTH_FAILED,
            format!("Invalid user name or password (user={})", user_name),
        ));
    }
    Ok(())
}

fn resolve_user_database(
    store: &dyn UserStore,
    db_name: &str,
    user_name: &str,
    user_type: UserType,
) -> Result<Resolution> {
    let owner_row = store
        .get_database_row(&database_row_key(db_name, DB_OWNER))?
        .ok_or_else(|| {
            TxnError::deny(
                codes::AUTH_FAILED,
                format!("Database not found (db={})", db_name),
            )
        })?;

    let privilege = match user_type {
        UserType::Admin => owner_row.privilege.clone(),
        UserType::Normal => store
            .get_database_row(&database_row_key(db_name, user_name))?
            .map(|row| row.privilege)
            .ok_or_else(|| {
                TxnError::deny(
                    codes::AUTH_FAILED,
                    format!("No privilege on database (db={}, user={})", db_name, user_name),
                )
            })?,
    };

    Ok(Resolution {
        db_id: owner_row.row_id + store.reserved_range(),
        role: RoleType::from_privilege(&privilege),
    })
}
