use std::io;

use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use futures_util::{SinkExt as _, StreamExt as _};
use jsonrpsee::{
    core::{
        client::{ReceivedMessage, TransportReceiverT, TransportSenderT},
        RpcResult,
    },
    proc_macros::rpc,
    types::{ErrorCode, ErrorObject, ErrorObjectOwned},
};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};

use crate::{framework::ResourceProvider, schema::v0};

#[rpc(client, server, namespace = "resource")]
pub trait ResourceProviderRpc {
    #[method(name = "metadata")]
    async fn metadata(&self) -> RpcResult<v0::ProviderMetadata>;

    #[method(name = "create")]
    async fn create(
        &self,
        #[argument(rename = "type")] type_: String,
        input_properties: serde_json::Map<String, Value>,
    ) -> RpcResult<v0::CreateResourceResponse>;

    #[method(name = "read")]
    async fn read(&self, resource: v0::ExtantResource) -> RpcResult<v0::ReadResourceResponse>;

    #[method(name = "update")]
    async fn update(
        &self,
        resource: v0::ExtantResource,
        input_properties: serde_json::Map<String, Value>,
    ) -> RpcResult<v0::UpdateResourceResponse>;

    #[method(name = "delete")]
    async fn delete(&self, resource: v0::ExtantResource)
        -> RpcResult<v0::DeleteResourceResponse>;
}

#[async_trait]
impl<T> ResourceProviderRpcServer for T
where
    T: ResourceProvider,
{
    async fn metadata(&self) -> RpcResult<v0::ProviderMetadata> {
        Ok(ResourceProvider::metadata(self))
    }

    async fn create(
        &self,
        type_: String,
        inputs: serde_json::Map<String, Value>,
    ) -> RpcResult<v0::CreateResourceResponse> {
        let req = v0::CreateResourceRequest {
            input_properties: v0::InputProperties(inputs),
            type_: v0::ResourceType(type_),
        };

        ResourceProvider::create(self, req)
            .await
            .map_err(handle_error)
    }

    async fn read(&self, resource: v0::ExtantResource) -> RpcResult<v0::ReadResourceResponse> {
        let req = v0::ReadResourceRequest { resource };

        ResourceProvider::read(self, req).await.map_err(handle_error)
    }

    async fn update(
        &self,
        resource: v0::ExtantResource,
        inputs: serde_json::Map<String, Value>,
    ) -> RpcResult<v0::UpdateResourceResponse> {
        let req = v0::UpdateResourceRequest {
            resource,
            input_properties: v0::InputProperties(inputs),
        };

        ResourceProvider::update(self, req)
            .await
            .map_err(handle_error)
    }

    async fn delete(
        &self,
        resource: v0::ExtantResource,
    ) -> RpcResult<v0::DeleteResourceResponse> {
        let req = v0::DeleteResourceRequest { resource };

        ResourceProvider::delete(self, req)
            .await
            .map_err(handle_error)
    }
}

/// Turn a provider error into a JSON-RPC error object.
///
/// A [`v0::ResourceError`] anywhere in the chain is passed on with its own
/// code and as structured data, so the orchestrator can tell the kinds
/// apart. Anything else is an internal error.
fn handle_error(error: anyhow::Error) -> ErrorObjectOwned {
    match error.downcast_ref::<v0::ResourceError>() {
        Some(e) => {
            tracing::warn!(kind = %e.kind, location = ?e.location, "{}", e.cause);
            ErrorObject::owned(e.kind.code(), e.to_string(), Some(e))
        }
        None => {
            tracing::error!("{:?}", error);
            ErrorObject::owned(
                ErrorCode::InternalError.code(),
                "Resource provider encountered an error",
                Some(format!("{:#}", error)),
            )
        }
    }
}

/// Recover a [`v0::ResourceError`] from a JSON-RPC error object, if it
/// carries one.
pub fn resource_error_from_object(error: &ErrorObjectOwned) -> Option<v0::ResourceError> {
    error
        .data()
        .and_then(|raw| serde_json::from_str::<v0::ResourceError>(raw.get()).ok())
}

const CONTENT_LENGTH: &str = "Content-Length:";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Largest message body we accept. A longer Content-Length is a framing
/// error rather than an allocation.
pub const MAX_FRAME: usize = 64 * 1024 * 1024;

/// Frames messages as `Content-Length: N\r\n\r\n` followed by N bytes of
/// JSON.
#[derive(Debug, Default)]
pub struct ContentLengthCodec {
    /// Length of the body we're waiting for, once its header has been read.
    pending: Option<usize>,
}

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

impl Decoder for ContentLengthCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<String>> {
        let len = match self.pending {
            Some(len) => len,
            None => {
                let Some(end) = src.windows(HEADER_END.len()).position(|w| w == HEADER_END)
                else {
                    return Ok(None);
                };
                let header = std::str::from_utf8(&src[..end])
                    .map_err(|e| invalid_data(format!("header is not UTF-8: {}", e)))?;
                let len = header
                    .lines()
                    .find_map(|line| line.strip_prefix(CONTENT_LENGTH))
                    .ok_or_else(|| invalid_data(format!("missing {} header", CONTENT_LENGTH)))?
                    .trim()
                    .parse::<usize>()
                    .map_err(|e| invalid_data(format!("bad {} header: {}", CONTENT_LENGTH, e)))?;
                if len > MAX_FRAME {
                    return Err(invalid_data(format!(
                        "message of {} bytes exceeds the limit of {} bytes",
                        len, MAX_FRAME
                    )));
                }
                src.advance(end + HEADER_END.len());
                self.pending = Some(len);
                len
            }
        };

        if src.len() < len {
            return Ok(None);
        }
        self.pending = None;
        let body = src.split_to(len);
        String::from_utf8(body.to_vec())
            .map(Some)
            .map_err(|e| invalid_data(format!("message is not UTF-8: {}", e)))
    }
}

impl Encoder<String> for ContentLengthCodec {
    type Error = io::Error;

    fn encode(&mut self, msg: String, dst: &mut BytesMut) -> io::Result<()> {
        let header = format!("{} {}\r\n\r\n", CONTENT_LENGTH, msg.len());
        dst.reserve(header.len() + msg.len());
        dst.put_slice(header.as_bytes());
        dst.put_slice(msg.as_bytes());
        Ok(())
    }
}

/// Client-side sending half of a Content-Length framed channel.
pub struct ContentLengthSender<W> {
    inner: FramedWrite<W, ContentLengthCodec>,
}

impl<W: AsyncWrite + Unpin> ContentLengthSender<W> {
    pub fn new(writer: W) -> Self {
        ContentLengthSender {
            inner: FramedWrite::new(writer, ContentLengthCodec::default()),
        }
    }
}

impl<W> TransportSenderT for ContentLengthSender<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Error = io::Error;

    fn send(&mut self, msg: String) -> impl std::future::Future<Output = io::Result<()>> + Send {
        async move { self.inner.send(msg).await }
    }

    fn close(&mut self) -> impl std::future::Future<Output = io::Result<()>> + Send {
        async move { self.inner.close().await }
    }
}

/// Client-side receiving half of a Content-Length framed channel.
pub struct ContentLengthReceiver<R> {
    inner: FramedRead<R, ContentLengthCodec>,
}

impl<R: AsyncRead + Unpin> ContentLengthReceiver<R> {
    pub fn new(reader: R) -> Self {
        ContentLengthReceiver {
            inner: FramedRead::new(reader, ContentLengthCodec::default()),
        }
    }
}

impl<R> TransportReceiverT for ContentLengthReceiver<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    type Error = io::Error;

    fn receive(&mut self) -> impl std::future::Future<Output = io::Result<ReceivedMessage>> + Send {
        async move {
            match self.inner.next().await {
                Some(msg) => Ok(ReceivedMessage::Text(msg?)),
                None => Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "resource provider closed its output",
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut ContentLengthCodec, buf: &mut BytesMut) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(msg) = codec.decode(buf).unwrap() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn encode_writes_header_and_body() {
        let mut codec = ContentLengthCodec::default();
        let mut buf = BytesMut::new();
        codec.encode("{}".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"Content-Length: 2\r\n\r\n{}");
    }

    #[test]
    fn decode_two_messages_in_one_buffer() {
        let mut codec = ContentLengthCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(r#"{"a":1}"#.to_string(), &mut buf).unwrap();
        codec.encode(r#"{"b":"é"}"#.to_string(), &mut buf).unwrap();
        assert_eq!(
            decode_all(&mut codec, &mut buf),
            vec![r#"{"a":1}"#.to_string(), r#"{"b":"é"}"#.to_string()]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_waits_for_partial_input() {
        let mut codec = ContentLengthCodec::default();
        let mut buf = BytesMut::from(&b"Content-Length: 7\r\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"\r\n{\"a\"");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b":1}");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(r#"{"a":1}"#.to_string()));
    }

    #[test]
    fn decode_rejects_missing_length() {
        let mut codec = ContentLengthCodec::default();
        let mut buf = BytesMut::from(&b"Content-Type: json\r\n\r\n{}"[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn decode_rejects_huge_length() {
        for header in [
            "Content-Length: 18446744073709551000\r\n\r\n".to_string(),
            "Content-Length: 99999999999999999999999\r\n\r\n".to_string(),
            format!("Content-Length: {}\r\n\r\n", MAX_FRAME + 1),
        ] {
            let mut codec = ContentLengthCodec::default();
            let mut buf = BytesMut::from(header.as_bytes());
            let err = codec.decode(&mut buf).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidData, "{}", header);
        }
    }

    #[test]
    fn resource_error_survives_error_object() {
        let e = v0::ResourceError {
            kind: v0::ResourceErrorKind::DeleteFailure,
            location: Some("/srv/x".to_string()),
            cause: "Is a directory (os error 21)".to_string(),
        };
        let obj = handle_error(anyhow::Error::new(e.clone()));
        assert_eq!(obj.code(), v0::ResourceErrorKind::DeleteFailure.code());
        assert_eq!(resource_error_from_object(&obj), Some(e));
    }

    #[test]
    fn other_errors_are_internal() {
        let obj = handle_error(anyhow::anyhow!("boom"));
        assert_eq!(obj.code(), ErrorCode::InternalError.code());
        assert_eq!(resource_error_from_object(&obj), None);
    }
}
