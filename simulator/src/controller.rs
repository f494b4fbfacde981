//! Simulation controller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use earnzy_common::{Coins, Decision, Email, LedgerError, TaskId};
use earnzy_ledger::{
    InMemoryStore, Ledger, LedgerConfig, LedgerTotals, NewTask, NotificationCenter,
    PayoutDestination, TaskEdit,
};

use crate::metrics::SimulationMetrics;
use crate::population::Population;
use crate::scenario::{AssertCondition, Scenario, ScenarioStep};

/// One randomly chosen user action.
#[derive(Debug, Clone)]
enum Action {
    PostTask {
        buyer: Email,
        required_workers: i64,
        payable_amount: i64,
    },
    EditTask {
        buyer: Email,
        pick: usize,
        required_workers: i64,
    },
    DeleteTask {
        buyer: Email,
        pick: usize,
    },
    Submit {
        worker: Email,
        pick: usize,
    },
    Review {
        buyer: Email,
        approve: bool,
    },
    Withdraw {
        worker: Email,
        coins: u64,
    },
    DecideWithdrawal {
        admin: Email,
        approve: bool,
    },
}

impl Action {
    fn kind(&self) -> &'static str {
        match self {
            Action::PostTask { .. } => "post_task",
            Action::EditTask { .. } => "edit_task",
            Action::DeleteTask { .. } => "delete_task",
            Action::Submit { .. } => "submit",
            Action::Review { approve: true, .. } => "approve",
            Action::Review { approve: false, .. } => "reject",
            Action::Withdraw { .. } => "request_withdrawal",
            Action::DecideWithdrawal { .. } => "decide_withdrawal",
        }
    }
}

/// Outcome of the end-of-run consistency checks.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    /// Coins created by registrations.
    pub issued: Coins,
    /// Where the remaining coins sit.
    pub totals: LedgerTotals,
    /// Coins paid out through approved withdrawals.
    pub paid_out: Coins,
    /// Accounts whose journal does not replay to their balance.
    pub journal_mismatches: Vec<Email>,
}

impl VerificationReport {
    /// Check that no coin was created or lost.
    pub fn is_conserved(&self) -> bool {
        self.totals.total().checked_add(self.paid_out) == Some(self.issued)
    }

    /// Check every invariant.
    pub fn is_consistent(&self) -> bool {
        self.is_conserved() && self.journal_mismatches.is_empty()
    }
}

/// Controls the simulation.
pub struct SimulationController {
    /// Ledger under test.
    ledger: Arc<Ledger>,
    /// Simulated users.
    population: Population,
    /// Actions issued per tick.
    concurrency: usize,
    /// Simulation speed multiplier.
    speed: f64,
    /// Random number generator.
    rng: Arc<RwLock<StdRng>>,
    /// Simulation metrics.
    metrics: Arc<RwLock<SimulationMetrics>>,
    /// Running flag.
    running: Arc<RwLock<bool>>,
    /// Coins issued at registration.
    issued: Coins,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(
        buyers: usize,
        workers: usize,
        concurrency: usize,
        speed: f64,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let ledger = Ledger::new(
            LedgerConfig::default(),
            Arc::new(InMemoryStore::new()),
            Arc::new(NotificationCenter::new()),
        );

        Self {
            ledger: Arc::new(ledger),
            population: Population::create(buyers, workers),
            concurrency: concurrency.max(1),
            speed,
            rng: Arc::new(RwLock::new(rng)),
            metrics: Arc::new(RwLock::new(SimulationMetrics::new())),
            running: Arc::new(RwLock::new(false)),
            issued: Coins::ZERO,
        }
    }

    /// Initialize the simulation.
    pub async fn initialize(&mut self) -> anyhow::Result<()> {
        info!(
            buyers = self.population.buyers.len(),
            workers = self.population.workers.len(),
            "Registering simulated users"
        );

        self.population.register_all(&self.ledger).await?;
        self.issued = self.ledger.totals().total();

        info!(issued = %self.issued, "Simulation initialized");
        Ok(())
    }

    /// Run a scenario.
    pub async fn run_scenario(&self, scenario: Scenario) -> anyhow::Result<()> {
        info!("Running scenario: {} - {}", scenario.name, scenario.description);

        *self.running.write().await = true;
        let mut tasks = Vec::new();

        for step in &scenario.steps {
            if !*self.running.read().await {
                break;
            }

            self.execute_step(step, &mut tasks).await?;
        }

        *self.running.write().await = false;

        Ok(())
    }

    /// Run a random workload until `duration` passes or Ctrl+C.
    pub async fn run(&self, duration: Option<Duration>) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.population.buyers.is_empty() && !self.population.workers.is_empty(),
            "A random workload needs at least one buyer and one worker"
        );
        info!(concurrency = self.concurrency, "Running random workload");

        *self.running.write().await = true;

        let ledger = self.ledger.clone();
        let population = self.population.clone();
        let metrics = self.metrics.clone();
        let rng = self.rng.clone();
        let running = self.running.clone();
        let concurrency = self.concurrency;
        let speed = self.speed;

        let handle = tokio::spawn(async move {
            loop {
                if !*running.read().await {
                    break;
                }

                let actions: Vec<Action> = {
                    let mut rng_guard = rng.write().await;
                    (0..concurrency)
                        .map(|_| random_action(&mut *rng_guard, &population))
                        .collect()
                };

                let outcomes = join_all(actions.into_iter().map(|action| {
                    let ledger = ledger.clone();
                    async move {
                        let kind = action.kind();
                        let started = Instant::now();
                        let result = execute_action(&ledger, action).await;
                        (kind, started.elapsed(), result)
                    }
                }))
                .await;

                {
                    let mut metrics = metrics.write().await;
                    for (kind, elapsed, result) in outcomes {
                        match result {
                            Ok(()) => metrics.record_success(kind, elapsed.as_micros() as u64),
                            Err(e) => {
                                debug!(kind, code = e.error_code(), "Action refused");
                                metrics.record_rejection(e.error_code());
                            }
                        }
                    }
                }

                // Wait based on speed
                let delay = Duration::from_millis((100.0 / speed) as u64);
                tokio::time::sleep(delay).await;
            }
        });

        // Wait for duration or Ctrl+C
        match duration {
            Some(d) => {
                tokio::time::sleep(d).await;
            }
            None => {
                tokio::signal::ctrl_c().await?;
            }
        }

        *self.running.write().await = false;
        handle.await?;

        Ok(())
    }

    /// Check conservation and journal consistency.
    pub fn verify(&self) -> VerificationReport {
        let journal_mismatches = self
            .population
            .emails()
            .filter(|email| {
                let Ok(account) = self.ledger.account(email) else {
                    return false;
                };
                let replayed: i128 = self
                    .ledger
                    .journal(email)
                    .iter()
                    .map(|e| e.signed_amount())
                    .sum();
                replayed != i128::from(account.balance.value())
            })
            .cloned()
            .collect();

        VerificationReport {
            issued: self.issued,
            totals: self.ledger.totals(),
            paid_out: self.ledger.platform_stats().coins_paid_out,
            journal_mismatches,
        }
    }

    /// Execute a single scenario step.
    async fn execute_step(&self, step: &ScenarioStep, tasks: &mut Vec<TaskId>) -> anyhow::Result<()> {
        match step {
            ScenarioStep::Wait { millis } => {
                let adjusted = (*millis as f64 / self.speed) as u64;
                tokio::time::sleep(Duration::from_millis(adjusted)).await;
            }
            ScenarioStep::PostTask {
                buyer,
                required_workers,
                payable_amount,
            } => {
                let buyer = self.user(buyer)?;
                let task = self
                    .ledger
                    .create_task(&buyer, task_request(*required_workers, *payable_amount))
                    .await?;
                info!(task_id = %task.id, buyer = %buyer, escrow = %task.escrow, "Task posted");
                tasks.push(task.id);
            }
            ScenarioStep::SubmitAll { task, workers } => {
                let task_id = task_at(tasks, *task)?;
                let mut submitters = Vec::new();
                for handle in workers {
                    submitters.push(self.user(handle)?);
                }
                let results = join_all(
                    submitters
                        .iter()
                        .map(|worker| self.ledger.submit(task_id, worker, "simulated proof")),
                )
                .await;
                self.tally("submit", results).await;
            }
            ScenarioStep::ReviewAll { task, approve } => {
                let task_id = task_at(tasks, *task)?;
                let buyer = self.ledger.task(task_id)?.buyer_email;
                let pending: Vec<_> = self
                    .ledger
                    .submissions_for_task(task_id)?
                    .into_iter()
                    .filter(|s| s.is_pending())
                    .collect();

                let results = join_all(pending.iter().map(|s| {
                    let ledger = self.ledger.clone();
                    let buyer = buyer.clone();
                    let id = s.id;
                    let approve = *approve;
                    async move {
                        if approve {
                            ledger.approve_submission(id, &buyer).await
                        } else {
                            ledger.reject_submission(id, &buyer).await
                        }
                    }
                }))
                .await;
                self.tally(if *approve { "approve" } else { "reject" }, results)
                    .await;
            }
            ScenarioStep::DeleteTask { task, caller } => {
                let task_id = task_at(tasks, *task)?;
                let caller = self.user(caller)?;
                let removal = self.ledger.delete_task(task_id, &caller).await?;
                info!(task_id = %task_id, refund = %removal.refund, "Task deleted");
            }
            ScenarioStep::RequestWithdrawal { worker, coins } => {
                let worker = self.user(worker)?;
                let withdrawal = self
                    .ledger
                    .request_withdrawal(&worker, Coins::new(*coins), sim_destination())
                    .await?;
                info!(withdrawal_id = %withdrawal.id, amount = %withdrawal.amount, "Withdrawal requested");
            }
            ScenarioStep::DecideWithdrawals { approve } => {
                let decision = if *approve {
                    Decision::Approve
                } else {
                    Decision::Reject
                };
                for withdrawal in self.ledger.pending_withdrawals() {
                    self.ledger
                        .decide_withdrawal(withdrawal.id, &self.population.admin.email, decision, None)
                        .await?;
                }
            }
            ScenarioStep::Assert { condition } => self.check(condition, tasks)?,
        }

        Ok(())
    }

    fn check(&self, condition: &AssertCondition, tasks: &[TaskId]) -> anyhow::Result<()> {
        match condition {
            AssertCondition::BalanceEquals { user, coins } => {
                let balance = self.ledger.account(&self.user(user)?)?.balance;
                anyhow::ensure!(
                    balance == Coins::new(*coins),
                    "{user} holds {balance}, expected {coins} coins"
                );
            }
            AssertCondition::EscrowEquals { task, coins } => {
                let escrow = self.ledger.task(task_at(tasks, *task)?)?.escrow;
                anyhow::ensure!(
                    escrow == Coins::new(*coins),
                    "task {task} holds {escrow}, expected {coins} coins"
                );
            }
            AssertCondition::Conserved => {
                let report = self.verify();
                anyhow::ensure!(report.is_consistent(), "ledger inconsistent: {report:?}");
            }
        }
        info!(?condition, "Assertion held");
        Ok(())
    }

    async fn tally<T>(&self, kind: &'static str, results: Vec<Result<T, LedgerError>>) {
        let mut metrics = self.metrics.write().await;
        for result in results {
            match result {
                Ok(_) => metrics.record_success(kind, 0),
                Err(e) => {
                    warn!(kind, error = %e, "Step action refused");
                    metrics.record_rejection(e.error_code());
                }
            }
        }
    }

    fn user(&self, handle: &str) -> anyhow::Result<Email> {
        self.population
            .find(handle)
            .map(|u| u.email.clone())
            .ok_or_else(|| anyhow::anyhow!("Unknown user handle: {}", handle))
    }

    /// Get simulation metrics.
    pub async fn metrics(&self) -> SimulationMetrics {
        self.metrics.read().await.clone()
    }
}

fn random_action(rng: &mut StdRng, population: &Population) -> Action {
    let buyer = population.buyers[rng.gen_range(0..population.buyers.len())]
        .email
        .clone();
    let worker = population.workers[rng.gen_range(0..population.workers.len())]
        .email
        .clone();

    match rng.gen_range(0..100) {
        0..=14 => Action::PostTask {
            buyer,
            required_workers: rng.gen_range(1..6),
            payable_amount: rng.gen_range(1..12),
        },
        15..=19 => Action::EditTask {
            buyer,
            pick: rng.gen(),
            required_workers: rng.gen_range(1..8),
        },
        20..=23 => Action::DeleteTask {
            buyer,
            pick: rng.gen(),
        },
        24..=59 => Action::Submit {
            worker,
            pick: rng.gen(),
        },
        60..=84 => Action::Review {
            buyer,
            approve: rng.gen_bool(0.8),
        },
        85..=92 => Action::Withdraw {
            worker,
            coins: rng.gen_range(150..300),
        },
        _ => Action::DecideWithdrawal {
            admin: population.admin.email.clone(),
            approve: rng.gen_bool(0.5),
        },
    }
}

async fn execute_action(ledger: &Ledger, action: Action) -> Result<(), LedgerError> {
    match action {
        Action::PostTask {
            buyer,
            required_workers,
            payable_amount,
        } => {
            ledger
                .create_task(&buyer, task_request(required_workers, payable_amount))
                .await?;
        }
        Action::EditTask {
            buyer,
            pick,
            required_workers,
        } => {
            let task = pick_one(ledger.tasks_by_buyer(&buyer), pick)?;
            let edit = TaskEdit {
                required_workers: Some(required_workers),
                ..TaskEdit::default()
            };
            ledger.edit_task(task.id, &buyer, edit).await?;
        }
        Action::DeleteTask { buyer, pick } => {
            let task = pick_one(ledger.tasks_by_buyer(&buyer), pick)?;
            ledger.delete_task(task.id, &buyer).await?;
        }
        Action::Submit { worker, pick } => {
            let task = pick_one(ledger.open_tasks(), pick)?;
            ledger.submit(task.id, &worker, "simulated proof").await?;
        }
        Action::Review { buyer, approve } => {
            let submission = pick_one(ledger.review_queue(&buyer), 0)?;
            if approve {
                ledger.approve_submission(submission.id, &buyer).await?;
            } else {
                ledger.reject_submission(submission.id, &buyer).await?;
            }
        }
        Action::Withdraw { worker, coins } => {
            ledger
                .request_withdrawal(&worker, Coins::new(coins), sim_destination())
                .await?;
        }
        Action::DecideWithdrawal { admin, approve } => {
            let withdrawal = pick_one(ledger.pending_withdrawals(), 0)?;
            let decision = if approve {
                Decision::Approve
            } else {
                Decision::Reject
            };
            ledger
                .decide_withdrawal(withdrawal.id, &admin, decision, None)
                .await?;
        }
    }
    Ok(())
}

fn pick_one<T>(mut items: Vec<T>, pick: usize) -> Result<T, LedgerError> {
    if items.is_empty() {
        return Err(LedgerError::invalid_state("nothing to act on"));
    }
    let idx = pick % items.len();
    Ok(items.swap_remove(idx))
}

fn task_at(tasks: &[TaskId], index: usize) -> anyhow::Result<TaskId> {
    tasks
        .get(index)
        .copied()
        .ok_or_else(|| anyhow::anyhow!("No task posted at index {}", index))
}

fn task_request(required_workers: i64, payable_amount: i64) -> NewTask {
    NewTask {
        title: "Simulated task".to_string(),
        detail: "Generated by the simulator".to_string(),
        required_workers,
        payable_amount,
        completion_date: "2030-01-01".to_string(),
        submission_info: "Any text".to_string(),
        image_url: None,
    }
}

fn sim_destination() -> PayoutDestination {
    PayoutDestination::new("stripe", "acct_simulated")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builtin_scenarios_pass() {
        for name in ["escrow-basics", "withdrawal-cycle", "rush"] {
            let scenario = Scenario::load(name).unwrap();
            let mut controller =
                SimulationController::new(scenario.buyers, scenario.workers, 1, 100.0, Some(7));
            controller.initialize().await.unwrap();
            controller.run_scenario(scenario).await.unwrap();
            assert!(controller.verify().is_consistent(), "{name} left the ledger inconsistent");
        }
    }

    #[tokio::test]
    async fn test_random_workload_stays_consistent() {
        let mut controller = SimulationController::new(3, 6, 8, 100.0, Some(42));
        controller.initialize().await.unwrap();

        controller
            .run(Some(Duration::from_millis(200)))
            .await
            .unwrap();

        let metrics = controller.metrics().await;
        assert!(metrics.total_operations > 0);
        let report = controller.verify();
        assert!(report.is_consistent(), "{report:?}");
    }
}
