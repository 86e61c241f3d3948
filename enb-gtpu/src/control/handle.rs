use super::{NodeEndpoint, StackTask};
use crate::PdcpInterface;
use anyhow::{Context, Result, anyhow};
use async_channel::Sender;

/// Cloneable access to a running node from other tasks.  Each call is queued behind the
/// datagrams and ticks already waiting, and runs to completion on the stack-processing task.
pub struct GtpuHandle<P> {
    pub(crate) sender: Sender<StackTask<P>>,
}

impl<P> Clone for GtpuHandle<P> {
    fn clone(&self) -> Self {
        GtpuHandle {
            sender: self.sender.clone(),
        }
    }
}

impl<P: PdcpInterface + Send + 'static> GtpuHandle<P> {
    pub(crate) fn new(sender: Sender<StackTask<P>>) -> Self {
        GtpuHandle { sender }
    }

    /// Run `f` against the endpoint and return its result.
    pub async fn call<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut NodeEndpoint<P>) -> R + Send + 'static,
    {
        let (reply_sender, reply_receiver) = async_channel::bounded(1);
        self.sender
            .send(StackTask::Call(Box::new(move |endpoint| {
                let _ = reply_sender.try_send(f(endpoint));
            })))
            .await
            .map_err(|_| anyhow!("GTP-U stack has shut down"))?;
        reply_receiver
            .recv()
            .await
            .context("GTP-U stack stopped before replying")
    }
}
