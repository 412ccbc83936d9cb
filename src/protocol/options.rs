//! Request options
//!
//! Optional, extensible key/value entries carried after the fixed request
//! part. Each option type is declared once in [`define_options!`] with its tag,
//! value kind and default; the value kind owns the byte encoding.
//!
//! ## Option block
//! ```text
//! ┌────────────────┬──────────────────────────────────────────────────┐
//! │ block len (4)  │ entries...                                       │
//! └────────────────┴──────────────────────────────────────────────────┘
//!
//! entry: ┌─────────┬────────────────┬──────────────┐
//!        │ tag (2) │ value len (var)│ value bytes  │
//!        └─────────┴────────────────┴──────────────┘
//! ```
//!
//! Entries with unknown tags are skipped using their length prefix.

use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::error::{CodecCause, Result, TxnError};
use crate::types::ClientId;

use super::stream::{ByteIn, ByteOut};

pub type OptionTag = u16;

// =============================================================================
// Value kinds
// =============================================================================

/// Encoding family of an option value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Bool,
    Int,
    Long,
    Text,
    Client,
}

/// A decoded option value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Bool(bool),
    Int(i32),
    Long(i64),
    Text(String),
    Client(ClientId),
}

impl OptionValue {
    pub fn kind(&self) -> OptionKind {
        match self {
            OptionValue::Bool(_) => OptionKind::Bool,
            OptionValue::Int(_) => OptionKind::Int,
            OptionValue::Long(_) => OptionKind::Long,
            OptionValue::Text(_) => OptionKind::Text,
            OptionValue::Client(_) => OptionKind::Client,
        }
    }

    fn encode(&self, out: &mut ByteOut) -> Result<()> {
        match self {
            OptionValue::Bool(v) => out.put_bool(*v),
            OptionValue::Int(v) => out.put_i32(*v),
            OptionValue::Long(v) => out.put_i64(*v),
            OptionValue::Text(v) => out.put_string(v, "option text")?,
            OptionValue::Client(v) => out.put_client_id(v),
        }
        Ok(())
    }

    fn decode(kind: OptionKind, input: &mut ByteIn<'_>) -> Result<Self> {
        Ok(match kind {
            OptionKind::Bool => OptionValue::Bool(input.read_bool("option bool")?),
            OptionKind::Int => OptionValue::Int(input.read_i32("option int")?),
            OptionKind::Long => OptionValue::Long(input.read_i64("option long")?),
            OptionKind::Text => OptionValue::Text(input.read_string("option text")?),
            OptionKind::Client => OptionValue::Client(input.read_client_id("option client id")?),
        })
    }
}

// =============================================================================
// Option types
// =============================================================================

/// A typed option: its tag, value type and default
pub trait OptionCoder {
    const TAG: OptionTag;
    const NAME: &'static str;
    type Value: Clone + PartialEq + Debug;

    fn default_value() -> Self::Value;

    fn into_value(value: Self::Value) -> OptionValue;

    fn from_value(value: &OptionValue) -> Option<Self::Value>;
}

macro_rules! define_options {
    ($(
        $(#[$meta:meta])*
        $name:ident = $tag:literal : $kind:ident($ty:ty) = $default:expr;
    )+) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy)]
            pub struct $name;

            impl OptionCoder for $name {
                const TAG: OptionTag = $tag;
                const NAME: &'static str = stringify!($name);
                type Value = $ty;

                fn default_value() -> $ty {
                    $default
                }

                fn into_value(value: $ty) -> OptionValue {
                    OptionValue::$kind(value)
                }

                fn from_value(value: &OptionValue) -> Option<$ty> {
                    match value {
                        OptionValue::$kind(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }
        )+

        /// Registry of every option type known to this node
        pub const REGISTERED_OPTIONS: &[(OptionTag, &str, OptionKind)] = &[
            $(($tag, stringify!($name), OptionKind::$kind)),+
        ];
    };
}

define_options! {
    /// Read for update (takes the container lock)
    ForUpdate = 1: Bool(bool) = false;

    /// Request issued by a system component
    SystemMode = 2: Bool(bool) = false;

    /// Database to log in to; empty means the public database
    DbName = 3: Text(String) = String::new();

    ApplicationName = 4: Text(String) = String::new();

    /// Per-statement timeout in milliseconds; negative means none
    StatementTimeoutInterval = 5: Int(i32) = -1;

    /// Client id echoed in the reply
    ReplyClientId = 6: Client(ClientId) = ClientId::EMPTY;

    /// Time of the first lock conflict of a re-queued request; negative means none
    LockConflictStartTime = 7: Long(i64) = -1;

    /// Highest feature version the client understands
    AcceptableFeatureVersion = 8: Int(i32) = 0;

    /// Partition id echoed in the reply; negative means none
    ReplyPartitionId = 9: Long(i64) = -1;

    /// Request submitted by the SQL front end
    SqlRequest = 10: Bool(bool) = false;
}

/// Value kind registered for `tag`
pub fn registered_kind(tag: OptionTag) -> Option<OptionKind> {
    REGISTERED_OPTIONS
        .iter()
        .find(|(t, _, _)| *t == tag)
        .map(|(_, _, kind)| *kind)
}

// =============================================================================
// Option set
// =============================================================================

/// Options of one request, keyed by tag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSet {
    entries: BTreeMap<OptionTag, OptionValue>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of option `T`, or its default when absent
    pub fn get<T: OptionCoder>(&self) -> T::Value {
        self.entries
            .get(&T::TAG)
            .and_then(T::from_value)
            .unwrap_or_else(T::default_value)
    }

    pub fn set<T: OptionCoder>(&mut self, value: T::Value) {
        self.entries.insert(T::TAG, T::into_value(value));
    }

    pub fn with<T: OptionCoder>(mut self, value: T::Value) -> Self {
        self.set::<T>(value);
        self
    }

    pub fn contains<T: OptionCoder>(&self) -> bool {
        self.entries.contains_key(&T::TAG)
    }

    pub fn remove<T: OptionCoder>(&mut self) -> Option<T::Value> {
        self.entries.remove(&T::TAG).as_ref().and_then(T::from_value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the option block
    pub fn encode(&self, out: &mut ByteOut) -> Result<()> {
        let mut entries = ByteOut::new();
        for (tag, value) in &self.entries {
            let mut raw = ByteOut::new();
            value.encode(&mut raw)?;

            entries.put_u16(*tag);
            entries.put_var_size(raw.len() as u64, "option value size")?;
            entries.put_slice(raw.as_slice());
        }

        let block_len = u32::try_from(entries.len()).map_err(|_| {
            TxnError::encode(
                "option block",
                CodecCause::Oversized {
                    size: entries.len(),
                    limit: u32::MAX as usize,
                },
            )
        })?;
        out.put_u32(block_len);
        out.put_slice(entries.as_slice());
        Ok(())
    }

    /// Read an option block
    pub fn decode(input: &mut ByteIn<'_>) -> Result<Self> {
        let block_len = input.read_u32("option block size")? as usize;
        let mut block = ByteIn::new(input.read_slice(block_len, "option block")?);

        let mut set = OptionSet::new();
        while !block.is_empty() {
            let tag = block.read_u16("option tag")?;
            let size = block.read_var_size("option value size")? as usize;
            let raw = block.read_slice(size, "option value")?;

            let Some(kind) = registered_kind(tag) else {
                // Unknown to this build; the length prefix lets us skip it
                continue;
            };

            let mut value_in = ByteIn::new(raw);
            let value = OptionValue::decode(kind, &mut value_in)
                .map_err(|e| e.with_context(&format!("option {}", tag)))?;
            set.entries.insert(tag, value);
        }
        Ok(set)
    }
}
