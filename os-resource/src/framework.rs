use std::os::fd::{AsRawFd, FromRawFd};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt as _, StreamExt as _};
use nix::unistd::{dup, dup2};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::{
    rpc::{ContentLengthCodec, ResourceProviderRpcServer as _},
    schema::v0,
};

/// The operations a resource provider implements.
///
/// Errors that the orchestrator should be able to tell apart are returned as
/// a [`v0::ResourceError`] inside the [`anyhow::Error`]; everything else is
/// reported as an internal error.
#[async_trait]
pub trait ResourceProvider: Send + Sync + 'static {
    fn metadata(&self) -> v0::ProviderMetadata;

    async fn create(&self, request: v0::CreateResourceRequest)
        -> Result<v0::CreateResourceResponse>;

    /// Refresh the outputs of an existing resource. Returning
    /// `output_properties: None` tells the orchestrator that the resource is
    /// gone.
    async fn read(&self, request: v0::ReadResourceRequest) -> Result<v0::ReadResourceResponse>;

    async fn update(&self, request: v0::UpdateResourceRequest)
        -> Result<v0::UpdateResourceResponse>;

    /// Remove a resource. Removing a resource that is already gone succeeds.
    async fn delete(&self, request: v0::DeleteResourceRequest)
        -> Result<v0::DeleteResourceResponse>;
}

/// Serve `provider` on the process's stdin/stdout until the orchestrator
/// closes the channel.
pub async fn run_main(provider: impl ResourceProvider) {
    serve(provider).await.unwrap_or_exit()
}

async fn serve(provider: impl ResourceProvider) -> Result<()> {
    let pipe = {
        let pipe = init_stdio()?;
        pipe_fds_to_files(pipe)
    };

    let module = provider.into_rpc();

    let mut requests = FramedRead::new(
        tokio::fs::File::from_std(pipe.in_),
        ContentLengthCodec::default(),
    );
    let mut responses = FramedWrite::new(
        tokio::fs::File::from_std(pipe.out),
        ContentLengthCodec::default(),
    );

    while let Some(request) = requests.next().await {
        let request = request.context("Could not read request message")?;
        tracing::trace!(%request, "received");
        let (response, _subscription) = module
            .raw_json_request(&request, 1)
            .await
            .with_context(|| "Could not process request message")?;
        let response = response.to_string();
        tracing::trace!(%response, "sending");
        responses
            .send(response)
            .await
            .context("Could not write response message")?;
    }

    tracing::debug!("orchestrator closed the channel");
    Ok(())
}

/// A pair of `T` values: one for input and one for output.
struct InOut<T> {
    in_: T,
    out: T,
}

/// A file descriptor
type Fd = i32;

/// Configure the standard input/output streams for the process.
/// This returns the communication channels with the orchestrator, and
/// reconfigures the stdio file descriptors as follows:
///
/// ```text
/// 0: /dev/null
/// 1: stderr
/// 2: stderr
/// ```
fn init_stdio() -> Result<InOut<Fd>> {
    let r = InOut {
        in_: dup(0).context("dup(0)")?,
        out: dup(1).context("dup(1)")?,
    };

    // 0: dev/null
    {
        let dev_null =
            std::fs::File::open("/dev/null").context("Could not open /dev/null")?;
        dup2(dev_null.as_raw_fd(), 0).context("Could not dup2(/dev/null, 0)")?;
    }

    // 1: stderr
    dup2(2, 1).context("Could not dup2(2, 1)")?;

    // 2: stderr is left as is

    Ok(r)
}

fn pipe_fds_to_files(pipe: InOut<Fd>) -> InOut<std::fs::File> {
    // SAFETY: both descriptors were just created by dup() and nothing else
    // owns them.
    InOut {
        in_: unsafe { std::fs::File::from_raw_fd(pipe.in_) },
        out: unsafe { std::fs::File::from_raw_fd(pipe.out) },
    }
}

trait OsResourceMainError<T> {
    type V;
    fn unwrap_or_exit(self) -> Self::V;
}
impl<T> OsResourceMainError<Result<T>> for Result<T> {
    type V = T;
    fn unwrap_or_exit(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Error: {:?}", e);
                std::process::exit(1);
            }
        }
    }
}
