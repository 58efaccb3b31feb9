use crate::{
    device::ManagedSession,
    error::{ReportError, RpcError},
    registry::ReportTypeDescriptor,
    tree::RpcTree,
};
use std::time::Instant;
use tracing::debug;

/// Issues the descriptor's RPC once. A reply that arrives after the
/// descriptor's timeout is reported as a timeout.
pub fn invoke(
    session: &mut ManagedSession,
    descriptor: &ReportTypeDescriptor,
) -> Result<RpcTree, RpcError> {
    let timeout = descriptor.timeout();
    debug!(
        "rpc {} args={:?} timeout={}s target={}",
        descriptor.rpc,
        descriptor.rpc_args,
        descriptor.timeout_seconds,
        session.target()
    );
    let started = Instant::now();
    let tree = session.call(&descriptor.rpc, &descriptor.rpc_args, timeout)?;
    let elapsed = started.elapsed();
    if elapsed > timeout {
        return Err(RpcError::Timeout {
            rpc: descriptor.rpc.clone(),
            timeout,
        });
    }
    debug!("rpc {} replied in {:?}", descriptor.rpc, elapsed);
    Ok(tree)
}

/// Runs one report type: RPC, then the descriptor's parser.
pub fn generate(
    session: &mut ManagedSession,
    descriptor: &ReportTypeDescriptor,
) -> Result<serde_json::Value, ReportError> {
    let tree = invoke(session, descriptor)?;
    Ok(descriptor.parser.parse(&tree)?)
}
