use anyhow::{Context, Result};
use jsonrpsee::async_client::{Client, ClientBuilder};
use os_resource::rpc::{ContentLengthReceiver, ContentLengthSender};
use tokio::process;

pub(crate) fn build_rpc_client_from_child(process: &mut process::Child) -> Result<Client> {
    let stdin = process
        .stdin
        .take()
        .context("provider process has no stdin pipe")?;
    let stdout = process
        .stdout
        .take()
        .context("provider process has no stdout pipe")?;
    let sender = ContentLengthSender::new(stdin);
    let receiver = ContentLengthReceiver::new(stdout);

    Ok(ClientBuilder::new().build_with_tokio(sender, receiver))
}
