use super::EventPayload;

/// One-way sink for dashboard status changes.
///
/// Implementations must return immediately and swallow their own failures;
/// the orchestrator calls this on the webhook response path.
pub trait DashboardNotifier: Send + Sync {
    fn notify(&self, event: EventPayload);
}
