// SPDX-License-Identifier: Apache-2.0
//! [`Wire`] implementations for primitive and domain types.

use crate::{key_from_slice, CodecError, ReadWindow, Wire, MAX_FRAME_LEN};
use dagstore_key::{Key, KEY_WIDTH};
use dagstore_model::{Graph, Payload, Tag, Value};
use tokio::io::AsyncRead;

impl Wire for u8 {
    fn sizeof(&self) -> usize {
        1
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(*self);
    }

    async fn decode<R>(win: &mut ReadWindow<R>) -> Result<Self, CodecError>
    where
        R: AsyncRead + Unpin + Send,
    {
        win.ensure(1).await?;
        Ok(win.take(1)[0])
    }
}

impl Wire for u32 {
    fn sizeof(&self) -> usize {
        4
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    async fn decode<R>(win: &mut ReadWindow<R>) -> Result<Self, CodecError>
    where
        R: AsyncRead + Unpin + Send,
    {
        win.ensure(4).await?;
        let bytes = win.take(4);
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl Wire for u64 {
    fn sizeof(&self) -> usize {
        8
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    async fn decode<R>(win: &mut ReadWindow<R>) -> Result<Self, CodecError>
    where
        R: AsyncRead + Unpin + Send,
    {
        win.ensure(8).await?;
        let bytes = win.take(8);
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(arr))
    }
}

impl Wire for bool {
    fn sizeof(&self) -> usize {
        1
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }

    async fn decode<R>(win: &mut ReadWindow<R>) -> Result<Self, CodecError>
    where
        R: AsyncRead + Unpin + Send,
    {
        match u8::decode(win).await? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidTag(other)),
        }
    }
}

impl Wire for String {
    fn sizeof(&self) -> usize {
        4 + self.len()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        (self.len() as u32).encode(out);
        out.extend_from_slice(self.as_bytes());
    }

    async fn decode<R>(win: &mut ReadWindow<R>) -> Result<Self, CodecError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let len = read_checked_len(win).await?;
        win.ensure(len).await?;
        let bytes = win.take(len).to_vec();
        Ok(String::from_utf8(bytes)?)
    }
}

impl<T: Wire + Send + Sync> Wire for Vec<T> {
    fn sizeof(&self) -> usize {
        4 + self.iter().map(Wire::sizeof).sum::<usize>()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        (self.len() as u32).encode(out);
        for item in self {
            item.encode(out);
        }
    }

    async fn decode<R>(win: &mut ReadWindow<R>) -> Result<Self, CodecError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let len = read_checked_len(win).await?;
        let mut out = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            out.push(T::decode(win).await?);
        }
        Ok(out)
    }
}

impl<T: Wire + Send + Sync> Wire for Option<T> {
    fn sizeof(&self) -> usize {
        1 + self.as_ref().map_or(0, Wire::sizeof)
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            None => out.push(0),
            Some(v) => {
                out.push(1);
                v.encode(out);
            }
        }
    }

    async fn decode<R>(win: &mut ReadWindow<R>) -> Result<Self, CodecError>
    where
        R: AsyncRead + Unpin + Send,
    {
        match u8::decode(win).await? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(win).await?)),
            other => Err(CodecError::InvalidTag(other)),
        }
    }
}

impl Wire for Key {
    fn sizeof(&self) -> usize {
        KEY_WIDTH
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }

    async fn decode<R>(win: &mut ReadWindow<R>) -> Result<Self, CodecError>
    where
        R: AsyncRead + Unpin + Send,
    {
        win.ensure(KEY_WIDTH).await?;
        Ok(key_from_slice(win.take(KEY_WIDTH)))
    }
}

impl Wire for Tag {
    fn sizeof(&self) -> usize {
        4 + self.as_str().len()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        let bytes = self.as_str().as_bytes();
        (bytes.len() as u32).encode(out);
        out.extend_from_slice(bytes);
    }

    async fn decode<R>(win: &mut ReadWindow<R>) -> Result<Self, CodecError>
    where
        R: AsyncRead + Unpin + Send,
    {
        Ok(Tag::new(String::decode(win).await?))
    }
}

impl Wire for Payload {
    fn sizeof(&self) -> usize {
        1 + match self {
            Payload::Blob(bytes) => 4 + bytes.len(),
            Payload::Node(children) => {
                4 + children
                    .iter()
                    .map(|(label, key)| label.sizeof() + key.sizeof())
                    .sum::<usize>()
            }
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Payload::Blob(bytes) => {
                out.push(0);
                (bytes.len() as u32).encode(out);
                out.extend_from_slice(bytes);
            }
            Payload::Node(children) => {
                out.push(1);
                (children.len() as u32).encode(out);
                for (label, key) in children {
                    label.encode(out);
                    key.encode(out);
                }
            }
        }
    }

    async fn decode<R>(win: &mut ReadWindow<R>) -> Result<Self, CodecError>
    where
        R: AsyncRead + Unpin + Send,
    {
        match u8::decode(win).await? {
            0 => {
                let len = read_checked_len(win).await?;
                win.ensure(len).await?;
                Ok(Payload::Blob(win.take(len).to_vec()))
            }
            1 => {
                let len = read_checked_len(win).await?;
                let mut children = Vec::with_capacity(len.min(4096));
                for _ in 0..len {
                    let label = String::decode(win).await?;
                    let key = Key::decode(win).await?;
                    children.push((label, key));
                }
                Ok(Payload::node(children))
            }
            other => Err(CodecError::InvalidTag(other)),
        }
    }
}

impl Wire for Value {
    fn sizeof(&self) -> usize {
        self.payload().sizeof() + 4 + self.pred().iter().map(Wire::sizeof).sum::<usize>()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.payload().encode(out);
        (self.pred().len() as u32).encode(out);
        for key in self.pred() {
            key.encode(out);
        }
    }

    async fn decode<R>(win: &mut ReadWindow<R>) -> Result<Self, CodecError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let payload = Payload::decode(win).await?;
        let pred = Vec::<Key>::decode(win).await?;
        Ok(Value::new(payload, pred))
    }
}

impl Wire for Graph {
    fn sizeof(&self) -> usize {
        self.vertices.sizeof() + self.edges.sizeof()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.vertices.encode(out);
        self.edges.encode(out);
    }

    async fn decode<R>(win: &mut ReadWindow<R>) -> Result<Self, CodecError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let vertices = Vec::<Key>::decode(win).await?;
        let edges = Vec::<(Key, Key)>::decode(win).await?;
        Ok(Graph { vertices, edges })
    }
}

impl Wire for (Key, Key) {
    fn sizeof(&self) -> usize {
        self.0.sizeof() + self.1.sizeof()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.0.encode(out);
        self.1.encode(out);
    }

    async fn decode<R>(win: &mut ReadWindow<R>) -> Result<Self, CodecError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let a = Key::decode(win).await?;
        let b = Key::decode(win).await?;
        Ok((a, b))
    }
}

impl Wire for (Tag, Key) {
    fn sizeof(&self) -> usize {
        self.0.sizeof() + self.1.sizeof()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.0.encode(out);
        self.1.encode(out);
    }

    async fn decode<R>(win: &mut ReadWindow<R>) -> Result<Self, CodecError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let tag = Tag::decode(win).await?;
        let key = Key::decode(win).await?;
        Ok((tag, key))
    }
}

async fn read_checked_len<R>(win: &mut ReadWindow<R>) -> Result<usize, CodecError>
where
    R: AsyncRead + Unpin + Send,
{
    let len = u32::decode(win).await?;
    if u64::from(len) > MAX_FRAME_LEN {
        return Err(CodecError::LengthTooLarge(u64::from(len)));
    }
    Ok(len as usize)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    async fn round_trip<T>(x: T) -> T
    where
        T: Wire + Send + Sync,
    {
        let mut buf = Vec::new();
        x.encode(&mut buf);
        assert_eq!(buf.len(), x.sizeof());
        let mut win = ReadWindow::new(Cursor::new(buf));
        T::decode(&mut win).await.unwrap()
    }

    #[tokio::test]
    async fn u32_round_trips() {
        assert_eq!(round_trip(42u32).await, 42u32);
    }

    #[tokio::test]
    async fn string_round_trips() {
        assert_eq!(round_trip(String::from("hello")).await, "hello");
    }

    #[tokio::test]
    async fn bool_round_trips() {
        assert!(round_trip(true).await);
        assert!(!round_trip(false).await);
    }

    #[tokio::test]
    async fn option_round_trips() {
        assert_eq!(round_trip(Some(7u32)).await, Some(7u32));
        assert_eq!(round_trip(None::<u32>).await, None);
    }

    #[tokio::test]
    async fn vec_round_trips() {
        let v = vec![1u32, 2, 3];
        assert_eq!(round_trip(v.clone()).await, v);
    }

    #[tokio::test]
    async fn key_round_trips() {
        let k = Key::of_bytes(b"wire me");
        assert_eq!(round_trip(k).await, k);
    }

    #[tokio::test]
    async fn tag_round_trips() {
        let t = Tag::new("main");
        assert_eq!(round_trip(t.clone()).await, t);
    }

    #[tokio::test]
    async fn tag_key_pair_round_trips() {
        let t = Tag::new("main");
        let k = Key::of_bytes(b"pair me");
        let (back_t, back_k) = round_trip((t.clone(), k)).await;
        assert_eq!(back_t, t);
        assert_eq!(back_k, k);
    }

    #[tokio::test]
    async fn blob_value_round_trips() {
        let v = Value::blob(*b"hello");
        let back = round_trip(v.clone()).await;
        assert_eq!(back.key(), v.key());
    }

    #[tokio::test]
    async fn node_value_round_trips() {
        let k = Key::of_bytes(b"child");
        let v = Value::node(vec![("label".into(), k)]);
        let back = round_trip(v.clone()).await;
        assert_eq!(back.key(), v.key());
        assert_eq!(back.pred(), v.pred());
    }

    #[tokio::test]
    async fn graph_round_trips() {
        let k1 = Key::of_bytes(b"a");
        let k2 = Key::of_bytes(b"b");
        let g = Graph {
            vertices: vec![k1, k2],
            edges: vec![(k1, k2)],
        };
        let back = round_trip(g.clone()).await;
        assert_eq!(back, g);
    }

    #[tokio::test]
    async fn json_mirror_round_trips_key() {
        let k = Key::of_bytes(b"json mirror");
        let json = crate::to_json(&k).unwrap();
        let back: Key = crate::of_json(json).unwrap();
        assert_eq!(back, k);
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let mut buf = Vec::new();
        (MAX_FRAME_LEN as u32 + 1).encode(&mut buf);
        let mut win = ReadWindow::new(Cursor::new(buf));
        let err = String::decode(&mut win).await.unwrap_err();
        assert!(matches!(err, CodecError::LengthTooLarge(_)));
    }
}
