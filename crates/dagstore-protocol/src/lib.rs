// SPDX-License-Identifier: Apache-2.0
//! Request/response framing for the dagstore wire protocol, plus the
//! per-connection server dispatch loop.
//!
//! Every request begins with a 1-byte [`Opcode`], followed by
//! opcode-specific arguments encoded with [`dagstore_codec::Wire`]. The
//! server replies with a 1-byte status (`OK`/`ERR`) and an opcode-specific
//! body, or an error string on `ERR`. `WATCH` is the one exception: after an
//! initial acknowledgement the connection becomes a server-push stream of
//! `(tags, graph)` events until the client closes it — see [`server`].
//!
//! Responses return in request order: a single connection never pipelines
//! out-of-order, so the client always knows which [`Opcode`] it is decoding
//! a reply for.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions
)]

pub mod server;

pub use server::Server;

use dagstore_codec::{CodecError, ReadWindow, Wire};
use dagstore_key::Key;
use dagstore_model::{Graph, Tag, Value};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Errors raised at the protocol layer: malformed framing that the codec
/// didn't already catch, or an opcode/argument shape the server doesn't
/// recognize.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The underlying codec failed to decode a frame.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A request's opcode byte did not match any known [`Opcode`].
    #[error("unknown opcode byte: {0:#04x}")]
    UnknownOpcode(u8),
    /// The server returned an `ERR` status; the sync engine treats this as a
    /// terminal failure of the operation.
    #[error("server error: {0}")]
    Server(String),
    /// A reply body did not match the shape expected for the request that
    /// produced it — indicates a desynchronized or incompatible peer.
    #[error("unexpected reply shape for opcode {0:?}")]
    UnexpectedReplyShape(Opcode),
    /// A store integrity violation or I/O fault; fatal for the connection.
    #[error(transparent)]
    Store(#[from] dagstore_storage::StoreError),
}

/// The 1-byte opcode that begins every request frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// `KEY_ADD`
    KeyAdd = 1,
    /// `KEY_REL`
    KeyRel = 2,
    /// `KEY_LIST`
    KeyList = 3,
    /// `KEY_PRED`
    KeyPred = 4,
    /// `KEY_SUCC`
    KeySucc = 5,
    /// `VAL_WRITE`
    ValWrite = 6,
    /// `VAL_READ`
    ValRead = 7,
    /// `TAG_UPDATE`
    TagUpdate = 8,
    /// `TAG_REMOVE`
    TagRemove = 9,
    /// `TAG_READ`
    TagRead = 10,
    /// `TAG_LIST`
    TagList = 11,
    /// `SYNC_PULL_KEYS`
    SyncPullKeys = 12,
    /// `SYNC_PULL_TAGS`
    SyncPullTags = 13,
    /// `SYNC_PUSH_KEYS`
    SyncPushKeys = 14,
    /// `SYNC_PUSH_TAGS`
    SyncPushTags = 15,
    /// `WATCH`
    Watch = 16,
}

impl Opcode {
    fn from_byte(b: u8) -> Result<Self, ProtocolError> {
        Ok(match b {
            1 => Self::KeyAdd,
            2 => Self::KeyRel,
            3 => Self::KeyList,
            4 => Self::KeyPred,
            5 => Self::KeySucc,
            6 => Self::ValWrite,
            7 => Self::ValRead,
            8 => Self::TagUpdate,
            9 => Self::TagRemove,
            10 => Self::TagRead,
            11 => Self::TagList,
            12 => Self::SyncPullKeys,
            13 => Self::SyncPullTags,
            14 => Self::SyncPushKeys,
            15 => Self::SyncPushTags,
            16 => Self::Watch,
            other => return Err(ProtocolError::UnknownOpcode(other)),
        })
    }
}

/// A fully-decoded request: the opcode plus its arguments.
#[derive(Debug, Clone)]
pub enum Request {
    /// `KEY_ADD(k)`
    KeyAdd(Key),
    /// `KEY_REL(pred, succ)`
    KeyRel(Key, Key),
    /// `KEY_LIST()`
    KeyList,
    /// `KEY_PRED(k)`
    KeyPred(Key),
    /// `KEY_SUCC(k)`
    KeySucc(Key),
    /// `VAL_WRITE(v)`
    ValWrite(Value),
    /// `VAL_READ(k)`
    ValRead(Key),
    /// `TAG_UPDATE(t, k)`
    TagUpdate(Tag, Key),
    /// `TAG_REMOVE(t)`
    TagRemove(Tag),
    /// `TAG_READ(t)`
    TagRead(Tag),
    /// `TAG_LIST()`
    TagList,
    /// `SYNC_PULL_KEYS(roots, sinks)`
    SyncPullKeys {
        /// Root keys that cut the closure.
        roots: Vec<Key>,
        /// Tag names whose bound keys seed the closure.
        sinks: Vec<Tag>,
    },
    /// `SYNC_PULL_TAGS()`
    SyncPullTags,
    /// `SYNC_PUSH_KEYS(graph, tags)`
    SyncPushKeys {
        /// The subgraph of keys/edges to insert.
        graph: Graph,
        /// Tags to advance once the graph is inserted.
        tags: Vec<(Tag, Key)>,
    },
    /// `SYNC_PUSH_TAGS(tags)`
    SyncPushTags(Vec<(Tag, Key)>),
    /// `WATCH(sinks)`
    Watch(Vec<Tag>),
}

impl Request {
    /// The opcode this request carries.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::KeyAdd(_) => Opcode::KeyAdd,
            Self::KeyRel(_, _) => Opcode::KeyRel,
            Self::KeyList => Opcode::KeyList,
            Self::KeyPred(_) => Opcode::KeyPred,
            Self::KeySucc(_) => Opcode::KeySucc,
            Self::ValWrite(_) => Opcode::ValWrite,
            Self::ValRead(_) => Opcode::ValRead,
            Self::TagUpdate(_, _) => Opcode::TagUpdate,
            Self::TagRemove(_) => Opcode::TagRemove,
            Self::TagRead(_) => Opcode::TagRead,
            Self::TagList => Opcode::TagList,
            Self::SyncPullKeys { .. } => Opcode::SyncPullKeys,
            Self::SyncPullTags => Opcode::SyncPullTags,
            Self::SyncPushKeys { .. } => Opcode::SyncPushKeys,
            Self::SyncPushTags(_) => Opcode::SyncPushTags,
            Self::Watch(_) => Opcode::Watch,
        }
    }

    /// Write the opcode byte followed by the wire encoding of this
    /// request's arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on a stream failure.
    pub async fn write<W>(&self, w: &mut W) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        w.write_all(&[self.opcode() as u8]).await.map_err(|e| {
            ProtocolError::Codec(CodecError::Io(e))
        })?;
        match self {
            Self::KeyAdd(k) | Self::KeyPred(k) | Self::KeySucc(k) | Self::ValRead(k) => {
                k.write(w).await?;
            }
            Self::KeyRel(a, b) => {
                a.write(w).await?;
                b.write(w).await?;
            }
            Self::KeyList | Self::TagList | Self::SyncPullTags => {}
            Self::ValWrite(v) => v.write(w).await?,
            Self::TagUpdate(t, k) => {
                t.write(w).await?;
                k.write(w).await?;
            }
            Self::TagRemove(t) | Self::TagRead(t) => t.write(w).await?,
            Self::SyncPullKeys { roots, sinks } => {
                roots.write(w).await?;
                sinks.write(w).await?;
            }
            Self::SyncPushKeys { graph, tags } => {
                graph.write(w).await?;
                tags.write(w).await?;
            }
            Self::SyncPushTags(tags) => tags.write(w).await?,
            Self::Watch(sinks) => sinks.write(w).await?,
        }
        Ok(())
    }

    /// Read one opcode byte and its arguments from `win`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownOpcode`] on an unrecognized opcode
    /// byte, or [`ProtocolError::Codec`] on malformed arguments.
    pub async fn read<R>(win: &mut ReadWindow<R>) -> Result<Self, ProtocolError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let byte = u8::decode(win).await?;
        let opcode = Opcode::from_byte(byte)?;
        Ok(match opcode {
            Opcode::KeyAdd => Self::KeyAdd(Key::decode(win).await?),
            Opcode::KeyRel => {
                let a = Key::decode(win).await?;
                let b = Key::decode(win).await?;
                Self::KeyRel(a, b)
            }
            Opcode::KeyList => Self::KeyList,
            Opcode::KeyPred => Self::KeyPred(Key::decode(win).await?),
            Opcode::KeySucc => Self::KeySucc(Key::decode(win).await?),
            Opcode::ValWrite => Self::ValWrite(Value::decode(win).await?),
            Opcode::ValRead => Self::ValRead(Key::decode(win).await?),
            Opcode::TagUpdate => {
                let t = Tag::decode(win).await?;
                let k = Key::decode(win).await?;
                Self::TagUpdate(t, k)
            }
            Opcode::TagRemove => Self::TagRemove(Tag::decode(win).await?),
            Opcode::TagRead => Self::TagRead(Tag::decode(win).await?),
            Opcode::TagList => Self::TagList,
            Opcode::SyncPullKeys => {
                let roots = Vec::<Key>::decode(win).await?;
                let sinks = Vec::<Tag>::decode(win).await?;
                Self::SyncPullKeys { roots, sinks }
            }
            Opcode::SyncPullTags => Self::SyncPullTags,
            Opcode::SyncPushKeys => {
                let graph = Graph::decode(win).await?;
                let tags = Vec::<(Tag, Key)>::decode(win).await?;
                Self::SyncPushKeys { graph, tags }
            }
            Opcode::SyncPushTags => Self::SyncPushTags(Vec::<(Tag, Key)>::decode(win).await?),
            Opcode::Watch => Self::Watch(Vec::<Tag>::decode(win).await?),
        })
    }
}

/// The 1-byte status prefixing every non-watch reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyStatus {
    Ok = 0,
    Err = 1,
}

/// The body of a successful reply, shaped per the opcode it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyBody {
    /// No payload (`KEY_ADD`, `KEY_REL`, `TAG_UPDATE`, `TAG_REMOVE`,
    /// `SYNC_PUSH_KEYS`, `SYNC_PUSH_TAGS`).
    Unit,
    /// A single key (`VAL_WRITE`).
    Key(Key),
    /// A list of keys (`KEY_LIST`, `KEY_PRED`, `KEY_SUCC`).
    Keys(Vec<Key>),
    /// A list of tags (`TAG_LIST`).
    Tags(Vec<Tag>),
    /// An optional value (`VAL_READ`).
    OptionValue(Option<Value>),
    /// An optional key (`TAG_READ`).
    OptionKey(Option<Key>),
    /// A subgraph (`SYNC_PULL_KEYS`).
    Graph(Graph),
    /// A list of tag-key bindings (`SYNC_PULL_TAGS`).
    TagKeys(Vec<(Tag, Key)>),
}

impl ReplyBody {
    async fn write<W>(&self, w: &mut W) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match self {
            Self::Unit => {}
            Self::Key(k) => k.write(w).await?,
            Self::Keys(ks) => ks.write(w).await?,
            Self::Tags(ts) => ts.write(w).await?,
            Self::OptionValue(v) => v.write(w).await?,
            Self::OptionKey(k) => k.write(w).await?,
            Self::Graph(g) => g.write(w).await?,
            Self::TagKeys(tk) => tk.write(w).await?,
        }
        Ok(())
    }

    async fn read<R>(opcode: Opcode, win: &mut ReadWindow<R>) -> Result<Self, ProtocolError>
    where
        R: AsyncRead + Unpin + Send,
    {
        Ok(match opcode {
            Opcode::KeyAdd
            | Opcode::KeyRel
            | Opcode::TagUpdate
            | Opcode::TagRemove
            | Opcode::SyncPushKeys
            | Opcode::SyncPushTags => Self::Unit,
            Opcode::KeyList | Opcode::KeyPred | Opcode::KeySucc => {
                Self::Keys(Vec::<Key>::decode(win).await?)
            }
            Opcode::ValWrite => Self::Key(Key::decode(win).await?),
            Opcode::ValRead => Self::OptionValue(Option::<Value>::decode(win).await?),
            Opcode::TagRead => Self::OptionKey(Option::<Key>::decode(win).await?),
            Opcode::TagList => Self::Tags(Vec::<Tag>::decode(win).await?),
            Opcode::SyncPullKeys => Self::Graph(Graph::decode(win).await?),
            Opcode::SyncPullTags => Self::TagKeys(Vec::<(Tag, Key)>::decode(win).await?),
            Opcode::Watch => Self::Unit,
        })
    }
}

/// A fully-decoded reply: success with an opcode-shaped body, or a server
/// error string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `OK` status with a body shaped per the request's opcode.
    Ok(ReplyBody),
    /// `ERR` status with a human-readable message; the connection stays
    /// open.
    Err(String),
}

impl Reply {
    /// Write the status byte and body.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on a stream failure.
    pub async fn write<W>(&self, w: &mut W) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match self {
            Self::Ok(body) => {
                w.write_all(&[ReplyStatus::Ok as u8])
                    .await
                    .map_err(|e| ProtocolError::Codec(CodecError::Io(e)))?;
                body.write(w).await
            }
            Self::Err(msg) => {
                w.write_all(&[ReplyStatus::Err as u8])
                    .await
                    .map_err(|e| ProtocolError::Codec(CodecError::Io(e)))?;
                msg.clone().write(w).await?;
                Ok(())
            }
        }
    }

    /// Read a reply for a request that carried `opcode`.
    ///
    /// The reply's body shape is opcode-dependent, which is why the caller
    /// must supply the opcode it is awaiting a reply for rather than the
    /// wire format self-describing it — consistent with the protocol's
    /// non-pipelined, request-order guarantee.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on malformed framing.
    pub async fn read<R>(opcode: Opcode, win: &mut ReadWindow<R>) -> Result<Self, ProtocolError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let status = u8::decode(win).await?;
        if status == ReplyStatus::Err as u8 {
            return Ok(Self::Err(String::decode(win).await?));
        }
        Ok(Self::Ok(ReplyBody::read(opcode, win).await?))
    }
}
