// SPDX-License-Identifier: Apache-2.0
//! The per-connection server dispatch loop.
//!
//! [`Server`] is a single-threaded cooperative state machine per connection,
//! matching `echo-session-service::handle_client`'s one-task-per-connection
//! model: read one full request, dispatch it against the bound
//! `{KeyGraphStore, ValueStore, TagStore}` trio, write one full response,
//! loop. `WATCH` is the one opcode that exits this loop into a dedicated
//! push-only phase for the remainder of the connection's life.

use crate::{Opcode, ProtocolError, Reply, ReplyBody, Request};
use dagstore_codec::{ReadWindow, Wire};
use dagstore_model::Tag;
use dagstore_storage::{KeyGraphStore, StoreError, TagStore, ValueStore};
use dagstore_sync::{SyncError, Watcher};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tracing::warn;

const TAG_CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// Server state shared across connections: the three stores plus the
/// broadcast channel that fans out tag changes to `WATCH` subscribers.
pub struct Server<G, V, T> {
    graph: Arc<G>,
    values: Arc<V>,
    tags: Arc<T>,
    tag_changes: broadcast::Sender<Tag>,
    max_pull_vertices: usize,
}

impl<G, V, T> Server<G, V, T>
where
    G: KeyGraphStore,
    V: ValueStore,
    T: TagStore,
{
    /// Wire a server around the three stores.
    #[must_use]
    pub fn new(graph: Arc<G>, values: Arc<V>, tags: Arc<T>, max_pull_vertices: usize) -> Self {
        let (tag_changes, _) = broadcast::channel(TAG_CHANGE_CHANNEL_CAPACITY);
        Self {
            graph,
            values,
            tags,
            tag_changes,
            max_pull_vertices,
        }
    }

    /// Drive a single connection to completion: request/response loop until
    /// the stream closes, a fatal error occurs, or the connection is
    /// upgraded by `WATCH` into the push-only phase (which runs until the
    /// client disconnects).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on malformed framing, an unrecoverable
    /// store fault, or a stream I/O failure. A client-caused `ERR` (unknown
    /// opcode) does not end the loop.
    pub async fn serve_connection<S>(&self, stream: S) -> Result<(), ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut win = ReadWindow::new(reader);

        loop {
            let request = match Request::read(&mut win).await {
                Ok(req) => req,
                Err(ProtocolError::UnknownOpcode(byte)) => {
                    let reply = Reply::Err(format!("unknown opcode byte: {byte:#04x}"));
                    reply.write(&mut writer).await?;
                    continue;
                }
                Err(err) => return Err(err),
            };

            if let Request::Watch(sinks) = request {
                Reply::Ok(ReplyBody::Unit).write(&mut writer).await?;
                return self.watch_loop(sinks, &mut writer).await;
            }

            let opcode = request.opcode();
            let reply = match self.dispatch(request).await {
                Ok(body) => Reply::Ok(body),
                Err(DispatchError::Recoverable(msg)) => Reply::Err(msg),
                Err(DispatchError::Fatal(err)) => return Err(err.into()),
            };
            debug_assert!(reply_opcode_matches(&reply, opcode));
            reply.write(&mut writer).await?;
        }
    }

    async fn dispatch(&self, request: Request) -> Result<ReplyBody, DispatchError> {
        match request {
            Request::KeyAdd(k) => {
                self.graph.add_key(k).await?;
                Ok(ReplyBody::Unit)
            }
            Request::KeyRel(pred, succ) => {
                self.graph.add_relation(pred, succ).await?;
                Ok(ReplyBody::Unit)
            }
            Request::KeyList => Ok(ReplyBody::Keys(self.graph.list().await?)),
            Request::KeyPred(k) => Ok(ReplyBody::Keys(self.graph.pred(k).await?)),
            Request::KeySucc(k) => Ok(ReplyBody::Keys(self.graph.succ(k).await?)),
            Request::ValWrite(v) => Ok(ReplyBody::Key(self.values.write(v).await?)),
            Request::ValRead(k) => Ok(ReplyBody::OptionValue(self.values.read(k).await?)),
            Request::TagUpdate(t, k) => {
                self.tags.update(t.clone(), k).await?;
                let _ignored_if_no_watchers = self.tag_changes.send(t);
                Ok(ReplyBody::Unit)
            }
            Request::TagRemove(t) => {
                self.tags.remove(&t).await?;
                let _ignored_if_no_watchers = self.tag_changes.send(t);
                Ok(ReplyBody::Unit)
            }
            Request::TagRead(t) => Ok(ReplyBody::OptionKey(self.tags.read(&t).await?)),
            Request::TagList => Ok(ReplyBody::Tags(self.tags.list().await?)),
            Request::SyncPullKeys { roots, sinks } => {
                let graph = dagstore_sync::pull_closure(
                    &*self.graph,
                    &*self.tags,
                    roots,
                    sinks,
                    self.max_pull_vertices,
                )
                .await
                .map_err(sync_error_to_dispatch)?;
                Ok(ReplyBody::Graph(graph))
            }
            Request::SyncPullTags => {
                let names = self.tags.list().await?;
                let mut out = Vec::with_capacity(names.len());
                for name in names {
                    if let Some(k) = self.tags.read(&name).await? {
                        out.push((name, k));
                    }
                }
                Ok(ReplyBody::TagKeys(out))
            }
            Request::SyncPushKeys { graph, tags } => {
                for k in &graph.vertices {
                    self.graph.add_key(*k).await?;
                }
                for (pred, succ) in &graph.edges {
                    self.graph.add_relation(*pred, *succ).await?;
                }
                for (t, k) in tags {
                    self.tags.update(t.clone(), k).await?;
                    let _ignored_if_no_watchers = self.tag_changes.send(t);
                }
                Ok(ReplyBody::Unit)
            }
            Request::SyncPushTags(tags) => {
                for (t, k) in tags {
                    self.tags.update(t.clone(), k).await?;
                    let _ignored_if_no_watchers = self.tag_changes.send(t);
                }
                Ok(ReplyBody::Unit)
            }
            // `WATCH` is intercepted by `serve_connection` before `dispatch`
            // is ever called; this arm is unreachable in practice.
            Request::Watch(_) => Ok(ReplyBody::Unit),
        }
    }

    async fn watch_loop<W>(&self, subscribed: Vec<Tag>, writer: &mut W) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut rx = self.tag_changes.subscribe();
        let mut watcher = Watcher::new();

        self.emit_watch_delta(&mut watcher, &subscribed, writer)
            .await?;

        loop {
            match rx.recv().await {
                Ok(changed) => {
                    if subscribed.contains(&changed) {
                        self.emit_watch_delta(&mut watcher, &subscribed, writer)
                            .await?;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    self.emit_watch_delta(&mut watcher, &subscribed, writer)
                        .await?;
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }

    async fn emit_watch_delta<W>(
        &self,
        watcher: &mut Watcher,
        subscribed: &[Tag],
        writer: &mut W,
    ) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match watcher
            .diff(&*self.graph, &*self.tags, subscribed, self.max_pull_vertices)
            .await
        {
            Ok(Some((changed_tags, delta))) => {
                changed_tags.write(writer).await?;
                delta.write(writer).await?;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(SyncError::TooManyVertices { cap }) => {
                warn!(cap, "watch delta exceeded vertex cap, skipping event");
                Ok(())
            }
            Err(SyncError::Store(err)) => Err(err.into()),
        }
    }
}

fn reply_opcode_matches(reply: &Reply, opcode: Opcode) -> bool {
    matches!(
        (reply, opcode),
        (Reply::Err(_), _)
            | (
                Reply::Ok(ReplyBody::Unit),
                Opcode::KeyAdd
                    | Opcode::KeyRel
                    | Opcode::TagUpdate
                    | Opcode::TagRemove
                    | Opcode::SyncPushKeys
                    | Opcode::SyncPushTags
            )
            | (Reply::Ok(ReplyBody::Keys(_)), Opcode::KeyList | Opcode::KeyPred | Opcode::KeySucc)
            | (Reply::Ok(ReplyBody::Key(_)), Opcode::ValWrite)
            | (Reply::Ok(ReplyBody::OptionValue(_)), Opcode::ValRead)
            | (Reply::Ok(ReplyBody::OptionKey(_)), Opcode::TagRead)
            | (Reply::Ok(ReplyBody::Tags(_)), Opcode::TagList)
            | (Reply::Ok(ReplyBody::Graph(_)), Opcode::SyncPullKeys)
            | (Reply::Ok(ReplyBody::TagKeys(_)), Opcode::SyncPullTags)
    )
}

fn sync_error_to_dispatch(err: SyncError) -> DispatchError {
    match err {
        SyncError::TooManyVertices { cap } => {
            DispatchError::Recoverable(format!("pull closure exceeded the {cap}-vertex cap"))
        }
        SyncError::Store(store_err) => DispatchError::Fatal(store_err),
    }
}

enum DispatchError {
    /// The client's request cannot be satisfied but the connection stays
    /// open — becomes an `ERR` reply.
    Recoverable(String),
    /// A store integrity or I/O fault; the connection is torn down.
    Fatal(StoreError),
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        Self::Fatal(err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use dagstore_key::Key;
    use dagstore_model::Value;
    use dagstore_storage::{MemoryKeyGraph, MemoryTagStore, MemoryValueStore};
    use tokio::io::duplex;

    fn make_server() -> Server<MemoryKeyGraph, MemoryValueStore, MemoryTagStore> {
        Server::new(
            Arc::new(MemoryKeyGraph::new()),
            Arc::new(MemoryValueStore::new()),
            Arc::new(MemoryTagStore::new()),
            1_000,
        )
    }

    #[tokio::test]
    async fn key_add_then_list_round_trips_over_loopback() {
        let server = make_server();
        let (client, conn) = duplex(4096);
        let serve = tokio::spawn(async move { server.serve_connection(conn).await });

        let (reader, mut writer) = tokio::io::split(client);
        let mut win = ReadWindow::new(reader);

        let key = Key::of_bytes(b"a");
        Request::KeyAdd(key).write(&mut writer).await.unwrap();
        let reply = Reply::read(Opcode::KeyAdd, &mut win).await.unwrap();
        assert_eq!(reply, Reply::Ok(ReplyBody::Unit));

        Request::KeyList.write(&mut writer).await.unwrap();
        let reply = Reply::read(Opcode::KeyList, &mut win).await.unwrap();
        assert_eq!(reply, Reply::Ok(ReplyBody::Keys(vec![key])));

        drop(writer);
        serve.abort();
    }

    #[tokio::test]
    async fn value_write_then_read_round_trips() {
        let server = make_server();
        let (client, conn) = duplex(4096);
        let serve = tokio::spawn(async move { server.serve_connection(conn).await });

        let (reader, mut writer) = tokio::io::split(client);
        let mut win = ReadWindow::new(reader);

        let value = Value::new(dagstore_model::Payload::Blob(b"hello".to_vec()), vec![]);
        let key = value.key();
        Request::ValWrite(value.clone()).write(&mut writer).await.unwrap();
        let reply = Reply::read(Opcode::ValWrite, &mut win).await.unwrap();
        assert_eq!(reply, Reply::Ok(ReplyBody::Key(key)));

        Request::ValRead(key).write(&mut writer).await.unwrap();
        let reply = Reply::read(Opcode::ValRead, &mut win).await.unwrap();
        assert_eq!(reply, Reply::Ok(ReplyBody::OptionValue(Some(value))));

        drop(writer);
        serve.abort();
    }

    #[tokio::test]
    async fn unknown_opcode_gets_err_and_connection_stays_open() {
        let server = make_server();
        let (client, conn) = duplex(4096);
        let serve = tokio::spawn(async move { server.serve_connection(conn).await });

        let (reader, mut writer) = tokio::io::split(client);
        let mut win = ReadWindow::new(reader);

        writer.write_all(&[0xFFu8]).await.unwrap();
        let reply = Reply::read(Opcode::KeyList, &mut win).await.unwrap();
        assert!(matches!(reply, Reply::Err(_)));

        Request::KeyList.write(&mut writer).await.unwrap();
        let reply = Reply::read(Opcode::KeyList, &mut win).await.unwrap();
        assert_eq!(reply, Reply::Ok(ReplyBody::Keys(vec![])));

        drop(writer);
        serve.abort();
    }

    #[tokio::test]
    async fn watch_reports_a_tag_update_made_on_another_connection() {
        let server = Arc::new(make_server());

        let (watch_client, watch_conn) = duplex(4096);
        let watch_server = Arc::clone(&server);
        let watch_task =
            tokio::spawn(async move { watch_server.serve_connection(watch_conn).await });

        let (watch_reader, mut watch_writer) = tokio::io::split(watch_client);
        let mut watch_win = ReadWindow::new(watch_reader);

        let tag = Tag::new("main");
        Request::Watch(vec![tag.clone()])
            .write(&mut watch_writer)
            .await
            .unwrap();
        let ack = Reply::read(Opcode::Watch, &mut watch_win).await.unwrap();
        assert_eq!(ack, Reply::Ok(ReplyBody::Unit));

        let (update_client, update_conn) = duplex(4096);
        let update_server = Arc::clone(&server);
        let update_task =
            tokio::spawn(async move { update_server.serve_connection(update_conn).await });
        let (update_reader, mut update_writer) = tokio::io::split(update_client);
        let mut update_win = ReadWindow::new(update_reader);

        let key = Key::of_bytes(b"v");
        Request::TagUpdate(tag.clone(), key)
            .write(&mut update_writer)
            .await
            .unwrap();
        let reply = Reply::read(Opcode::TagUpdate, &mut update_win)
            .await
            .unwrap();
        assert_eq!(reply, Reply::Ok(ReplyBody::Unit));

        let tags = Vec::<Tag>::decode(&mut watch_win).await.unwrap();
        let graph = dagstore_model::Graph::decode(&mut watch_win).await.unwrap();
        assert_eq!(tags, vec![tag]);
        assert_eq!(graph.vertices, vec![key]);

        drop(watch_writer);
        drop(update_writer);
        watch_task.abort();
        update_task.abort();
    }
}
