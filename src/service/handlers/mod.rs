//! Statement and internal event handlers
//!
//! | event                              | handler                    | gate        |
//! |------------------------------------|----------------------------|-------------|
//! | CONNECT / DISCONNECT               | [`ConnectHandler`] ...     | connection  |
//! | LOGIN / LOGOUT                     | [`LoginHandler`] ...       | connection  |
//! | CREATE_SESSION / CLOSE_SESSION     | [`CreateSessionHandler`]   | write       |
//! | COMMIT / ABORT_TRANSACTION         | [`EndTransactionHandler`]  | write       |
//! | GET_ROW                            | [`GetRowHandler`]          | read        |
//! | PUT_ROW / REMOVE_ROW               | [`PutRowHandler`] ...      | write       |
//! | REPLICATION_LOG(2)                 | [`ReplicationLogHandler`]  | backup      |
//! | REPLICATION_ACK(2)                 | [`ReplicationAckHandler`]  | internal    |
//! | AUTHENTICATION                     | [`AuthenticationHandler`]  | master/follower, pId 0 |
//! | AUTHENTICATION_ACK                 | [`AuthenticationAckHandler`] | internal  |
//! | CHECK_TIMEOUT                      | [`CheckTimeoutHandler`]    | internal    |

mod authentication;
mod connect;
mod login;
mod replication;
mod row;
mod session;
mod timeout;

pub use authentication::{AuthenticationAckHandler, AuthenticationHandler};
pub use connect::{ConnectHandler, DisconnectHandler};
pub use login::{LoginHandler, LogoutHandler};
pub use replication::{ReplicationAckHandler, ReplicationLogHandler};
pub use row::{GetRowHandler, PutRowHandler, RemoveRowHandler};
pub use session::{CloseSessionHandler, CreateSessionHandler, EndTransactionHandler};
pub use timeout::CheckTimeoutHandler;
