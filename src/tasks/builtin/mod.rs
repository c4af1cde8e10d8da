mod checkpoint_task;
mod heartbeat_task;
mod unread_reports_task;

use std::sync::Arc;
use crate::tasks::TaskRegistry;

/// Register all built-in tasks into the registry.
pub fn register_all(registry: &mut TaskRegistry) {
    registry.register(Arc::new(heartbeat_task::HeartbeatTask));
    registry.register(Arc::new(unread_reports_task::UnreadReportsTask));
    registry.register(Arc::new(checkpoint_task::CheckpointTask));
}
