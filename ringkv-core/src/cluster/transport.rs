use crate::error::Result;
use crate::rpc::RpcReply;
use async_trait::async_trait;

/// Moves one text request to a named node and returns its reply, including
/// the replicas the peer could not reach while serving it.
///
/// A call blocks its caller until the peer answers or the call fails.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, node: &str, message: &str) -> Result<RpcReply>;
}
