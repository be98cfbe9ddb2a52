//! Gate-then-execute step shared by single and batch loads

use tracing::{error, info, warn};

use crate::module::registry::StateRegistry;
use crate::module::security::{GateDecision, SecurityGate};
use crate::module::traits::{ExecutionOutput, ModuleDescriptor, ModuleError, ModuleRunner};

/// Run one module through the security gate and the runner
///
/// The caller must already have moved the module into `Loading`. The module
/// always leaves this function in a terminal state.
pub(crate) async fn gate_and_run(
    registry: &StateRegistry,
    gate: &SecurityGate,
    runner: &dyn ModuleRunner,
    descriptor: &ModuleDescriptor,
    force: bool,
) -> Result<ExecutionOutput, ModuleError> {
    let warnings = match gate.inspect(descriptor, force) {
        GateDecision::Accept { warnings } => warnings,
        GateDecision::Reject(reason) => {
            warn!("{}", reason);
            registry
                .mark_rejected(
                    &descriptor.name,
                    reason.clone(),
                    descriptor.security_fingerprint(),
                )
                .await;
            return Err(reason);
        }
    };

    match runner.run(descriptor).await {
        Ok(output) => {
            info!(
                "Module {} loaded in {:?}",
                descriptor.name, output.duration
            );
            registry.mark_loaded(&descriptor.name, warnings).await;
            Ok(output)
        }
        Err(detail) => {
            let reason = ModuleError::ExecutionFailure {
                module: descriptor.name.clone(),
                detail,
            };
            error!("{}", reason);
            registry.mark_failed(&descriptor.name, reason.clone()).await;
            Err(reason)
        }
    }
}
