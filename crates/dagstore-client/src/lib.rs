// SPDX-License-Identifier: Apache-2.0
//! A TCP-connecting client for dagstore's wire protocol.
//!
//! [`RemoteClient`] drives the non-pipelined request/response cycle directly
//! (one [`Request`] out, one opcode-matched [`Reply`] back) and exposes a
//! typed method per opcode. [`RemoteClient::watch`] is the one operation
//! that consumes the client: `WATCH` upgrades the connection into a
//! push-only stream for the rest of its life, mirroring the server side in
//! `dagstore-protocol`.
//!
//! Push minimization — deciding which vertices are worth sending at all — is
//! not this crate's job either: it is computed locally against the caller's
//! own graph store by [`dagstore_sync::push_subgraph`], the same pure
//! closure algorithm the server uses to answer `SYNC_PULL_KEYS`. This crate
//! only carries the result over the wire.
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

use dagstore_codec::{ReadWindow, Wire};
use dagstore_key::Key;
use dagstore_model::{Graph, Tag, Value};
use dagstore_protocol::{Opcode, ProtocolError, Reply, ReplyBody, Request};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;

/// A connection to a dagstore server, driving one request at a time.
pub struct RemoteClient {
    reader: ReadWindow<ReadHalf<TcpStream>>,
    writer: WriteHalf<TcpStream>,
}

impl RemoteClient {
    /// Dial `addr` and return a ready client.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Codec`] (wrapping the `io::Error`) if the
    /// connection cannot be established.
    pub async fn connect(addr: &str) -> Result<Self, ProtocolError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ProtocolError::Codec(dagstore_codec::CodecError::Io(e)))?;
        let (read_half, writer) = tokio::io::split(stream);
        Ok(Self {
            reader: ReadWindow::new(read_half),
            writer,
        })
    }

    async fn request(&mut self, req: Request) -> Result<ReplyBody, ProtocolError> {
        let opcode = req.opcode();
        req.write(&mut self.writer).await?;
        match Reply::read(opcode, &mut self.reader).await? {
            Reply::Ok(body) => Ok(body),
            Reply::Err(msg) => Err(ProtocolError::Server(msg)),
        }
    }

    /// `KEY_ADD`
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on a stream failure or server error.
    pub async fn key_add(&mut self, k: Key) -> Result<(), ProtocolError> {
        self.request(Request::KeyAdd(k)).await.map(drop)
    }

    /// `KEY_REL`
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on a stream failure or server error.
    pub async fn key_rel(&mut self, pred: Key, succ: Key) -> Result<(), ProtocolError> {
        self.request(Request::KeyRel(pred, succ)).await.map(drop)
    }

    /// `KEY_LIST`
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on a stream failure, server error, or an
    /// unexpected reply shape.
    pub async fn key_list(&mut self) -> Result<Vec<Key>, ProtocolError> {
        match self.request(Request::KeyList).await? {
            ReplyBody::Keys(keys) => Ok(keys),
            _ => Err(ProtocolError::UnexpectedReplyShape(Opcode::KeyList)),
        }
    }

    /// `KEY_PRED`
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on a stream failure, server error, or an
    /// unexpected reply shape.
    pub async fn key_pred(&mut self, k: Key) -> Result<Vec<Key>, ProtocolError> {
        match self.request(Request::KeyPred(k)).await? {
            ReplyBody::Keys(keys) => Ok(keys),
            _ => Err(ProtocolError::UnexpectedReplyShape(Opcode::KeyPred)),
        }
    }

    /// `KEY_SUCC`
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on a stream failure, server error, or an
    /// unexpected reply shape.
    pub async fn key_succ(&mut self, k: Key) -> Result<Vec<Key>, ProtocolError> {
        match self.request(Request::KeySucc(k)).await? {
            ReplyBody::Keys(keys) => Ok(keys),
            _ => Err(ProtocolError::UnexpectedReplyShape(Opcode::KeySucc)),
        }
    }

    /// `VAL_WRITE`
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on a stream failure, server error, or an
    /// unexpected reply shape.
    pub async fn val_write(&mut self, v: Value) -> Result<Key, ProtocolError> {
        match self.request(Request::ValWrite(v)).await? {
            ReplyBody::Key(k) => Ok(k),
            _ => Err(ProtocolError::UnexpectedReplyShape(Opcode::ValWrite)),
        }
    }

    /// `VAL_READ`
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on a stream failure, server error, or an
    /// unexpected reply shape.
    pub async fn val_read(&mut self, k: Key) -> Result<Option<Value>, ProtocolError> {
        match self.request(Request::ValRead(k)).await? {
            ReplyBody::OptionValue(v) => Ok(v),
            _ => Err(ProtocolError::UnexpectedReplyShape(Opcode::ValRead)),
        }
    }

    /// `TAG_UPDATE`
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on a stream failure or server error.
    pub async fn tag_update(&mut self, t: Tag, k: Key) -> Result<(), ProtocolError> {
        self.request(Request::TagUpdate(t, k)).await.map(drop)
    }

    /// `TAG_REMOVE`
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on a stream failure or server error.
    pub async fn tag_remove(&mut self, t: Tag) -> Result<(), ProtocolError> {
        self.request(Request::TagRemove(t)).await.map(drop)
    }

    /// `TAG_READ`
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on a stream failure, server error, or an
    /// unexpected reply shape.
    pub async fn tag_read(&mut self, t: Tag) -> Result<Option<Key>, ProtocolError> {
        match self.request(Request::TagRead(t)).await? {
            ReplyBody::OptionKey(k) => Ok(k),
            _ => Err(ProtocolError::UnexpectedReplyShape(Opcode::TagRead)),
        }
    }

    /// `TAG_LIST`
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on a stream failure, server error, or an
    /// unexpected reply shape.
    pub async fn tag_list(&mut self) -> Result<Vec<Tag>, ProtocolError> {
        match self.request(Request::TagList).await? {
            ReplyBody::Tags(tags) => Ok(tags),
            _ => Err(ProtocolError::UnexpectedReplyShape(Opcode::TagList)),
        }
    }

    /// `SYNC_PULL_KEYS`
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on a stream failure, server error (e.g. a
    /// vertex-cap overflow reported as `ERR`), or an unexpected reply shape.
    pub async fn sync_pull_keys(
        &mut self,
        roots: Vec<Key>,
        sinks: Vec<Tag>,
    ) -> Result<Graph, ProtocolError> {
        match self.request(Request::SyncPullKeys { roots, sinks }).await? {
            ReplyBody::Graph(g) => Ok(g),
            _ => Err(ProtocolError::UnexpectedReplyShape(Opcode::SyncPullKeys)),
        }
    }

    /// `SYNC_PULL_TAGS`
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on a stream failure, server error, or an
    /// unexpected reply shape.
    pub async fn sync_pull_tags(&mut self) -> Result<Vec<(Tag, Key)>, ProtocolError> {
        match self.request(Request::SyncPullTags).await? {
            ReplyBody::TagKeys(tk) => Ok(tk),
            _ => Err(ProtocolError::UnexpectedReplyShape(Opcode::SyncPullTags)),
        }
    }

    /// `SYNC_PUSH_KEYS`
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on a stream failure or server error.
    pub async fn sync_push_keys(
        &mut self,
        graph: Graph,
        tags: Vec<(Tag, Key)>,
    ) -> Result<(), ProtocolError> {
        self.request(Request::SyncPushKeys { graph, tags })
            .await
            .map(drop)
    }

    /// `SYNC_PUSH_TAGS`
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on a stream failure or server error.
    pub async fn sync_push_tags(&mut self, tags: Vec<(Tag, Key)>) -> Result<(), ProtocolError> {
        self.request(Request::SyncPushTags(tags)).await.map(drop)
    }

    /// `WATCH`: upgrade this connection to a push-only stream of
    /// `(changed_tags, delta)` events. Consumes the client, matching the
    /// server's one-way lifetime for the connection once this opcode is
    /// sent.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the initial acknowledgement is
    /// malformed.
    pub async fn watch(mut self, tags: Vec<Tag>) -> Result<WatchStream, ProtocolError> {
        let opcode = Opcode::Watch;
        Request::Watch(tags).write(&mut self.writer).await?;
        match Reply::read(opcode, &mut self.reader).await? {
            Reply::Ok(ReplyBody::Unit) => Ok(WatchStream {
                reader: self.reader,
            }),
            Reply::Ok(_) => Err(ProtocolError::UnexpectedReplyShape(opcode)),
            Reply::Err(msg) => Err(ProtocolError::Server(msg)),
        }
    }
}

/// The push-only phase of a `WATCH` subscription.
pub struct WatchStream {
    reader: ReadWindow<ReadHalf<TcpStream>>,
}

impl WatchStream {
    /// Read the next `(changed_tags, delta)` event. Blocks until the server
    /// pushes one or the connection closes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Codec`] if the stream ends or a frame is
    /// malformed.
    pub async fn next(&mut self) -> Result<(Vec<Tag>, Graph), ProtocolError> {
        let tags = Vec::<Tag>::decode(&mut self.reader).await?;
        let graph = Graph::decode(&mut self.reader).await?;
        Ok((tags, graph))
    }
}
