//! Request dispatcher in front of the ledger.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use earnzy_common::{LedgerError, Result};
use earnzy_ledger::{InMemoryStore, Ledger, NotificationCenter, PayoutDestination};

use crate::config::ServiceConfig;
use crate::metrics::{Metrics, SharedMetrics};
use crate::protocol::{Request, RequestEnvelope, Response};
use crate::state::ServiceState;

/// The ledger service: owns the ledger, its store and the notification inbox.
pub struct LedgerService {
    config: ServiceConfig,
    state: Arc<RwLock<ServiceState>>,
    ledger: Arc<Ledger>,
    notifications: Arc<NotificationCenter>,
    metrics: SharedMetrics,
}

impl LedgerService {
    /// Create a service over a fresh in-memory store.
    pub fn new(config: ServiceConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let notifications = Arc::new(NotificationCenter::new());
        let ledger = Arc::new(Ledger::new(
            config.ledger.clone(),
            store,
            notifications.clone(),
        ));

        Self {
            config,
            state: Arc::new(RwLock::new(ServiceState::Starting)),
            ledger,
            notifications,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Start the service.
    #[instrument(skip(self))]
    pub fn start(&self) {
        info!("Starting ledger service");

        let lock_manager = self.ledger.lock_manager();
        tokio::spawn(async move {
            lock_manager.run_cleanup_loop().await;
        });

        *self.state.write() = ServiceState::Running;
        info!("Ledger service started");
    }

    /// Stop the service, waiting for in-flight requests.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        info!("Stopping ledger service");
        *self.state.write() = ServiceState::ShuttingDown;

        self.drain_active_requests().await;

        *self.state.write() = ServiceState::Stopped;
        info!("Ledger service stopped");
    }

    /// Check if the service is accepting requests.
    pub fn is_accepting_requests(&self) -> bool {
        self.state.read().accepts_requests()
    }

    /// Get the current service state.
    pub fn state(&self) -> ServiceState {
        *self.state.read()
    }

    /// The ledger behind this service.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Service metrics.
    pub fn metrics(&self) -> SharedMetrics {
        self.metrics.clone()
    }

    /// Service configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Handle one request line and produce one response line.
    pub async fn handle_line(&self, line: &str) -> String {
        let response = if line.len() > self.config.max_request_bytes {
            self.oversized()
        } else {
            match serde_json::from_str::<RequestEnvelope>(line) {
                Ok(envelope) => self.handle_envelope(envelope).await,
                Err(e) => {
                    self.metrics.request_malformed();
                    debug!(error = %e, "Malformed request");
                    Response::malformed(e.to_string())
                }
            }
        };

        encode_response(&response)
    }

    /// Response line for a request longer than `max_request_bytes`.
    pub(crate) fn oversized_line(&self) -> String {
        encode_response(&self.oversized())
    }

    fn oversized(&self) -> Response {
        self.metrics.request_malformed();
        Response::malformed(format!(
            "Request exceeds {} bytes",
            self.config.max_request_bytes
        ))
    }

    /// Handle a decoded request.
    pub async fn handle_envelope(&self, envelope: RequestEnvelope) -> Response {
        let RequestEnvelope { id, request } = envelope;
        let method = request.method();

        self.metrics.request_started();
        match self.handle(request).await {
            Ok(result) => {
                self.metrics.request_succeeded();
                Response::success(id, result)
            }
            Err(e) => {
                self.metrics.request_errored(&e);
                match &e {
                    LedgerError::Storage(_) => {
                        error!(method, error = %e, "Request failed in storage")
                    }
                    _ => debug!(method, code = e.error_code(), "Request rejected"),
                }
                Response::failure(id, &e)
            }
        }
    }

    /// Dispatch a request to the ledger.
    #[instrument(skip(self, request), fields(method = request.method()))]
    pub async fn handle(&self, request: Request) -> Result<Value> {
        if !self.is_accepting_requests() {
            return Err(LedgerError::invalid_state(
                "Service is not accepting requests",
            ));
        }

        let ledger = &self.ledger;
        match request {
            Request::Register(account) => encode(ledger.register(account).await?),
            Request::GetAccount { email } => encode(ledger.account(&email)?),
            Request::UpdateRole { admin, email, role } => {
                encode(ledger.update_role(&admin, &email, role).await?)
            }
            Request::RemoveAccount { admin, email } => {
                encode(ledger.remove_account(&admin, &email).await?)
            }

            Request::CreateTask { buyer, task } => encode(ledger.create_task(&buyer, task).await?),
            Request::EditTask {
                task_id,
                buyer,
                edit,
            } => encode(ledger.edit_task(task_id, &buyer, edit).await?),
            Request::DeleteTask { task_id, caller } => {
                encode(ledger.delete_task(task_id, &caller).await?)
            }
            Request::GetTask { task_id } => encode(ledger.task(task_id)?),
            Request::TasksByBuyer { buyer } => encode(ledger.tasks_by_buyer(&buyer)),
            Request::OpenTasks => encode(ledger.open_tasks()),

            Request::Submit {
                task_id,
                worker,
                details,
            } => encode(ledger.submit(task_id, &worker, details).await?),
            Request::ApproveSubmission {
                submission_id,
                buyer,
            } => encode(ledger.approve_submission(submission_id, &buyer).await?),
            Request::RejectSubmission {
                submission_id,
                buyer,
            } => encode(ledger.reject_submission(submission_id, &buyer).await?),
            Request::SubmissionsForTask { task_id } => {
                encode(ledger.submissions_for_task(task_id)?)
            }
            Request::SubmissionsByWorker { worker } => {
                encode(ledger.submissions_by_worker(&worker))
            }
            Request::ReviewQueue { buyer } => encode(ledger.review_queue(&buyer)),

            Request::RequestWithdrawal {
                worker,
                coins,
                payment_system,
                account_number,
            } => {
                let destination = PayoutDestination::new(payment_system, account_number);
                encode(ledger.request_withdrawal(&worker, coins, destination).await?)
            }
            Request::DecideWithdrawal {
                withdrawal_id,
                admin,
                decision,
                reason,
            } => encode(
                ledger
                    .decide_withdrawal(withdrawal_id, &admin, decision, reason)
                    .await?,
            ),
            Request::WithdrawalsByWorker { worker } => {
                encode(ledger.withdrawals_by_worker(&worker))
            }
            Request::PendingWithdrawals => encode(ledger.pending_withdrawals()),

            Request::Notifications { email } => encode(NotificationList {
                unread: self.notifications.unread_count(&email),
                notifications: self.notifications.list(&email),
            }),
            Request::MarkNotificationRead {
                email,
                notification_id,
            } => encode(self.notifications.mark_read(&email, notification_id)?),
            Request::DeleteNotification {
                email,
                notification_id,
            } => {
                self.notifications.delete(&email, notification_id)?;
                Ok(Value::Null)
            }

            Request::Journal { email } => encode(ledger.journal(&email)),
            Request::Totals => encode(ledger.totals()),
            Request::PlatformStats => encode(ledger.platform_stats()),
            Request::Metrics => encode(self.metrics.snapshot()),
        }
    }

    async fn drain_active_requests(&self) {
        use tokio::time::{timeout, Duration};

        let drained = timeout(self.config.drain_timeout, async {
            loop {
                // The drain itself is never counted as a request.
                let active = self.metrics.snapshot().requests_active;
                if active == 0 {
                    break;
                }
                info!(active, "Waiting for in-flight requests");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        if drained.is_err() {
            warn!("Drain timed out with requests still in flight");
        }
    }
}

#[derive(Serialize)]
struct NotificationList {
    unread: usize,
    notifications: Vec<earnzy_ledger::Notification>,
}

fn encode_response(response: &Response) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        error!(error = %e, "Failed to encode response");
        r#"{"ok":false,"error":{"code":"INTERNAL","message":"response encoding failed"}}"#
            .to_string()
    })
}

fn encode<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| LedgerError::storage(format!("Failed to encode result: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_service() -> LedgerService {
        let service = LedgerService::new(ServiceConfig::default());
        *service.state.write() = ServiceState::Running;
        service
    }

    async fn call(service: &LedgerService, line: &str) -> Value {
        serde_json::from_str(&service.handle_line(line).await).unwrap()
    }

    #[tokio::test]
    async fn test_service_start_stop() {
        let service = LedgerService::new(ServiceConfig::default());
        assert_eq!(service.state(), ServiceState::Starting);

        service.start();
        assert!(service.is_accepting_requests());

        service.stop().await;
        assert_eq!(service.state(), ServiceState::Stopped);
        assert!(service.state().is_terminal());

        let reply = call(&service, r#"{"method": "totals"}"#).await;
        assert_eq!(reply["error"]["code"], "INVALID_STATE");
    }

    #[test]
    fn test_requests_refused_before_start() {
        let service = LedgerService::new(ServiceConfig::default());

        let reply: Value =
            serde_json::from_str(&tokio_test::block_on(service.handle_line(r#"{"id": 1, "method": "totals"}"#)))
                .unwrap();
        assert_eq!(reply["id"], 1);
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"]["code"], "INVALID_STATE");
    }

    #[tokio::test]
    async fn test_task_lifecycle_over_the_wire() {
        let service = create_test_service();

        let reply = call(
            &service,
            r#"{"method": "register", "email": "b@x.io", "role": "buyer"}"#,
        )
        .await;
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["result"]["outcome"], "created");
        assert_eq!(reply["result"]["account"]["balance"], 50);

        call(&service, r#"{"method": "register", "email": "w@x.io", "role": "worker"}"#).await;

        let reply = call(
            &service,
            r#"{"id": "t1", "method": "create_task", "buyer": "b@x.io",
                "task": {"title": "Follow", "required_workers": 3, "payable_amount": 5,
                         "completion_date": "2026-12-31"}}"#,
        )
        .await;
        assert_eq!(reply["id"], "t1");
        assert_eq!(reply["result"]["total_payable"], 15);
        let task_id = reply["result"]["id"].as_str().unwrap().to_string();

        let reply = call(
            &service,
            &format!(
                r#"{{"method": "submit", "task_id": "{task_id}", "worker": "w@x.io", "details": "done"}}"#
            ),
        )
        .await;
        let submission_id = reply["result"]["id"].as_str().unwrap().to_string();

        let reply = call(
            &service,
            &format!(
                r#"{{"method": "approve_submission", "submission_id": "{submission_id}", "buyer": "b@x.io"}}"#
            ),
        )
        .await;
        assert_eq!(reply["result"]["status"], "approved");

        let reply = call(&service, r#"{"method": "get_account", "email": "w@x.io"}"#).await;
        assert_eq!(reply["result"]["balance"], 15);

        let reply = call(&service, r#"{"method": "notifications", "email": "w@x.io"}"#).await;
        assert_eq!(reply["result"]["unread"], 1);

        let reply = call(&service, r#"{"method": "totals"}"#).await;
        assert_eq!(reply["result"]["escrow"], 10);
    }

    #[tokio::test]
    async fn test_errors_carry_codes() {
        let service = create_test_service();
        call(&service, r#"{"method": "register", "email": "w@x.io", "role": "worker"}"#).await;

        let reply = call(
            &service,
            r#"{"method": "request_withdrawal", "worker": "w@x.io", "coins": 500,
                "payment_system": "bkash", "account_number": "017"}"#,
        )
        .await;
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"]["code"], "INSUFFICIENT_FUNDS");

        let reply = call(&service, r#"{"method": "get_account", "email": "nobody@x.io"}"#).await;
        assert_eq!(reply["error"]["code"], "NOT_FOUND");

        let reply = call(
            &service,
            r#"{"method": "create_task", "buyer": "w@x.io",
                "task": {"title": "x", "required_workers": 0, "payable_amount": 5,
                         "completion_date": "2026-12-31"}}"#,
        )
        .await;
        assert_eq!(reply["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(reply["error"]["field"], "required_workers");

        let reply = call(&service, "not json").await;
        assert_eq!(reply["error"]["code"], "BAD_REQUEST");

        let snapshot = service.metrics().snapshot();
        assert_eq!(snapshot.requests_malformed, 1);
        assert_eq!(snapshot.insufficient_funds, 1);
        assert_eq!(snapshot.requests_active, 0);
    }

    #[tokio::test]
    async fn test_oversized_line_rejected() {
        let mut config = ServiceConfig::default();
        config.max_request_bytes = 16;
        let service = LedgerService::new(config);
        service.start();

        let reply = call(&service, r#"{"method": "platform_stats"}"#).await;
        assert_eq!(reply["error"]["code"], "BAD_REQUEST");
    }
}
