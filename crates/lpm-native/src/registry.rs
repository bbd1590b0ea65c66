//! The capability registry: the fixed table of named operations the
//! orchestrator calls, taking and returning dynamic [`Value`]s.
//!
//! Two outcome shapes coexist on purpose. Every capability signals failure
//! with `Err`, except `stat`, which returns `[Nil, message]` for a path it
//! cannot stat so that existence checks never raise.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::fs::{self, StatOutcome};
use crate::git::{self, ResetMode};
use crate::hash::{self, HashInput, HashMode};
use crate::http::{ResponseMetadata, TransferConfig, TransferHandle};
use crate::trust::{TrustStore, TrustStoreKind};
use crate::{archive, Error, Result};

/// A dynamically typed argument or result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    String(String),
    Bytes(#[serde(serialize_with = "serialize_lossy")] Vec<u8>),
    List(Vec<Value>),
    Table(IndexMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::String(_) | Value::Bytes(_) => "string",
            Value::List(_) | Value::Table(_) => "table",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Bytes(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(s) => Some(s.as_bytes()),
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Integers, and strings that read as decimal or `0x` hex integers.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::String(_) | Value::Bytes(_) => {
                let text = self.as_str()?.trim();
                let (negative, digits) = match text.strip_prefix('-') {
                    Some(rest) => (true, rest),
                    None => (false, text),
                };
                let magnitude = match digits
                    .strip_prefix("0x")
                    .or_else(|| digits.strip_prefix("0X"))
                {
                    Some(hex) => i64::from_str_radix(hex, 16).ok()?,
                    None => digits.parse::<i64>().ok()?,
                };
                Some(if negative { -magnitude } else { magnitude })
            }
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }
}

fn serialize_lossy<S: Serializer>(
    bytes: &[u8],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Nil, Into::into)
    }
}

impl From<ResponseMetadata> for Value {
    fn from(metadata: ResponseMetadata) -> Self {
        let headers = metadata
            .headers
            .into_iter()
            .map(|(name, value)| (name, Value::String(value)))
            .collect();
        let mut table = IndexMap::new();
        table.insert("status".to_string(), Value::Integer(i64::from(metadata.status)));
        table.insert("url".to_string(), Value::String(metadata.url));
        table.insert("headers".to_string(), Value::Table(headers));
        Value::Table(table)
    }
}

static NIL: Value = Value::Nil;

/// Positional arguments of one capability call.
struct Args<'a> {
    op: &'static str,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    fn get(&self, index: usize) -> &'a Value {
        self.values.get(index).unwrap_or(&NIL)
    }

    fn bad(&self, index: usize, expected: &str) -> Error {
        Error::invalid_argument(
            self.op,
            format!(
                "#{} ({} expected, got {})",
                index + 1,
                expected,
                self.get(index).type_name()
            ),
        )
    }

    fn string(&self, index: usize) -> Result<&'a str> {
        self.get(index).as_str().ok_or_else(|| self.bad(index, "string"))
    }

    fn optional_string(&self, index: usize) -> Result<Option<&'a str>> {
        match self.get(index) {
            Value::Nil => Ok(None),
            _ => self.string(index).map(Some),
        }
    }

    fn bytes(&self, index: usize) -> Result<&'a [u8]> {
        self.get(index).as_bytes().ok_or_else(|| self.bad(index, "string"))
    }

    fn integer(&self, index: usize) -> Result<i64> {
        self.get(index).as_integer().ok_or_else(|| self.bad(index, "number"))
    }
}

type CapabilityFn = fn(&mut TransferHandle, &Args<'_>) -> Result<Vec<Value>>;

/// One entry of the registry table.
pub struct Capability {
    pub name: &'static str,
    pub usage: &'static str,
    call: CapabilityFn,
}

/// The complete capability table, fixed at compile time.
pub const CAPABILITIES: &[Capability] = &[
    Capability {
        name: "list",
        usage: "list(path) -> names",
        call: list,
    },
    Capability {
        name: "stat",
        usage: "stat(path) -> entry | nil, message",
        call: stat,
    },
    Capability {
        name: "make_directory",
        usage: "make_directory(path)",
        call: make_directory,
    },
    Capability {
        name: "remove_directory",
        usage: "remove_directory(path)",
        call: remove_directory,
    },
    Capability {
        name: "hash",
        usage: "hash(data, [\"string\"|\"file\"]) -> hex",
        call: hash,
    },
    Capability {
        name: "symlink",
        usage: "symlink(target, link_path)",
        call: symlink,
    },
    Capability {
        name: "chmod",
        usage: "chmod(path, mode)",
        call: chmod,
    },
    Capability {
        name: "git_init",
        usage: "git_init(path, remote_url)",
        call: git_init,
    },
    Capability {
        name: "git_fetch",
        usage: "git_fetch(path)",
        call: git_fetch,
    },
    Capability {
        name: "git_reset",
        usage: "git_reset(path, revision, \"soft\"|\"mixed\"|\"hard\")",
        call: git_reset,
    },
    Capability {
        name: "http_get",
        usage: "http_get(url, [destination]) -> body | nil, metadata",
        call: http_get,
    },
    Capability {
        name: "extract",
        usage: "extract(archive, [destination])",
        call: extract,
    },
    Capability {
        name: "set_trust_store",
        usage: "set_trust_store(\"dir\"|\"file\", path)",
        call: set_trust_store,
    },
];

/// Owns the process-wide transfer handle and dispatches capability calls.
pub struct Registry {
    transfer: TransferHandle,
}

impl Registry {
    /// Build the transfer handle, applying any configured trust store to both
    /// transports.
    pub fn install(config: TransferConfig) -> Result<Self> {
        let transfer = TransferHandle::with_config(config)?;
        Ok(Self { transfer })
    }

    pub fn capabilities() -> &'static [Capability] {
        CAPABILITIES
    }

    pub fn lookup(name: &str) -> Option<&'static Capability> {
        CAPABILITIES.iter().find(|capability| capability.name == name)
    }

    pub fn invoke(&mut self, name: &str, args: &[Value]) -> Result<Vec<Value>> {
        let capability = Self::lookup(name)
            .ok_or_else(|| Error::invalid_argument(name, "no such capability"))?;
        log::debug!("{} ({} arguments)", capability.name, args.len());
        (capability.call)(
            &mut self.transfer,
            &Args {
                op: capability.name,
                values: args,
            },
        )
    }

    pub fn transfer_config(&self) -> &TransferConfig {
        self.transfer.config()
    }
}

fn list(_: &mut TransferHandle, args: &Args<'_>) -> Result<Vec<Value>> {
    let names = fs::list(args.string(0)?)?;
    Ok(vec![Value::List(names.into_iter().map(Value::String).collect())])
}

fn stat(_: &mut TransferHandle, args: &Args<'_>) -> Result<Vec<Value>> {
    let entry = match fs::stat(args.string(0)?) {
        StatOutcome::Found(entry) => entry,
        StatOutcome::Missing { message } => return Ok(vec![Value::Nil, Value::String(message)]),
    };

    let mut table = IndexMap::new();
    table.insert("abs_path".to_string(), Value::String(entry.absolute_path));
    table.insert("path".to_string(), Value::String(entry.path));
    if let Some(target) = entry.symlink_target {
        table.insert("symlink".to_string(), Value::String(target));
    }
    table.insert("modified".to_string(), Value::Integer(entry.modified.timestamp()));
    table.insert("size".to_string(), Value::Integer(entry.size as i64));
    if let Some(label) = entry.kind.label() {
        table.insert("type".to_string(), Value::from(label));
    }
    Ok(vec![Value::Table(table)])
}

fn make_directory(_: &mut TransferHandle, args: &Args<'_>) -> Result<Vec<Value>> {
    fs::make_directory(args.string(0)?)?;
    Ok(Vec::new())
}

fn remove_directory(_: &mut TransferHandle, args: &Args<'_>) -> Result<Vec<Value>> {
    fs::remove_directory(args.string(0)?)?;
    Ok(Vec::new())
}

fn hash(_: &mut TransferHandle, args: &Args<'_>) -> Result<Vec<Value>> {
    let mode = HashMode::parse(args.optional_string(1)?.unwrap_or("string"));
    let digest = match mode {
        HashMode::String => hash::hash(HashInput::Bytes(args.bytes(0)?))?,
        HashMode::File => hash::hash(HashInput::File(Path::new(args.string(0)?)))?,
    };
    Ok(vec![Value::String(digest.to_hex())])
}

fn symlink(_: &mut TransferHandle, args: &Args<'_>) -> Result<Vec<Value>> {
    fs::symlink(args.string(0)?, args.string(1)?)?;
    Ok(Vec::new())
}

fn chmod(_: &mut TransferHandle, args: &Args<'_>) -> Result<Vec<Value>> {
    let path = args.string(0)?;
    let mode = u32::try_from(args.integer(1)?).map_err(|_| args.bad(1, "non-negative mode"))?;
    fs::chmod(path, mode)?;
    Ok(Vec::new())
}

fn git_init(_: &mut TransferHandle, args: &Args<'_>) -> Result<Vec<Value>> {
    git::init(args.string(0)?, args.string(1)?)?;
    Ok(Vec::new())
}

fn git_fetch(_: &mut TransferHandle, args: &Args<'_>) -> Result<Vec<Value>> {
    git::fetch(args.string(0)?)?;
    Ok(Vec::new())
}

fn git_reset(_: &mut TransferHandle, args: &Args<'_>) -> Result<Vec<Value>> {
    let mode = ResetMode::parse(args.string(2)?);
    git::reset(args.string(0)?, args.string(1)?, mode)?;
    Ok(Vec::new())
}

fn http_get(transfer: &mut TransferHandle, args: &Args<'_>) -> Result<Vec<Value>> {
    let url = args.string(0)?;
    let destination = args.optional_string(1)?.map(Path::new);
    let retrieved = transfer.get(url, destination)?;
    Ok(vec![Value::from(retrieved.body), Value::from(retrieved.metadata)])
}

fn extract(_: &mut TransferHandle, args: &Args<'_>) -> Result<Vec<Value>> {
    let destination = args
        .optional_string(1)?
        .unwrap_or(archive::DEFAULT_DESTINATION);
    archive::extract(args.string(0)?, destination)?;
    Ok(Vec::new())
}

fn set_trust_store(transfer: &mut TransferHandle, args: &Args<'_>) -> Result<Vec<Value>> {
    let store = TrustStore::new(TrustStoreKind::parse(args.string(0)?), args.string(1)?);
    transfer.set_trust_store(store)?;
    Ok(Vec::new())
}
