//! Simulation scenarios.
//!
//! Users are referred to by handle (`buyer1`, `worker2`, `admin`) and tasks
//! by the order they were posted in, starting at 0.

use serde::{Deserialize, Serialize};

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Buyers the scenario needs.
    pub buyers: usize,
    /// Workers the scenario needs.
    pub workers: usize,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

/// A step in a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Wait for a duration.
    Wait { millis: u64 },
    /// Post a task.
    PostTask {
        buyer: String,
        required_workers: i64,
        payable_amount: i64,
    },
    /// Every listed worker submits to a task at once.
    SubmitAll { task: usize, workers: Vec<String> },
    /// The owner reviews every pending submission on a task.
    ReviewAll { task: usize, approve: bool },
    /// Delete a task.
    DeleteTask { task: usize, caller: String },
    /// A worker asks for a payout.
    RequestWithdrawal { worker: String, coins: u64 },
    /// The admin decides every pending withdrawal.
    DecideWithdrawals { approve: bool },
    /// Assert a condition.
    Assert { condition: AssertCondition },
}

/// Conditions that can be asserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum AssertCondition {
    /// A user's balance equals `coins`.
    BalanceEquals { user: String, coins: u64 },
    /// A task holds exactly `coins` in escrow.
    EscrowEquals { task: usize, coins: u64 },
    /// Coins in the system match what was issued minus what was paid out.
    Conserved,
}

impl Scenario {
    /// Load a built-in scenario by name, or a JSON file by path.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "escrow-basics" => Ok(Self::escrow_basics()),
            "withdrawal-cycle" => Ok(Self::withdrawal_cycle()),
            "rush" => Ok(Self::rush()),
            path if path.ends_with(".json") => {
                let text = std::fs::read_to_string(path)?;
                Ok(serde_json::from_str(&text)?)
            }
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    /// Post, approve one, reject one, delete.
    fn escrow_basics() -> Self {
        Self {
            name: "escrow-basics".to_string(),
            description: "Escrow on post, payout on approval, refund on delete".to_string(),
            buyers: 1,
            workers: 2,
            steps: vec![
                ScenarioStep::PostTask {
                    buyer: "buyer1".to_string(),
                    required_workers: 3,
                    payable_amount: 5,
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::BalanceEquals {
                        user: "buyer1".to_string(),
                        coins: 35,
                    },
                },
                ScenarioStep::SubmitAll {
                    task: 0,
                    workers: vec!["worker1".to_string()],
                },
                ScenarioStep::ReviewAll {
                    task: 0,
                    approve: true,
                },
                ScenarioStep::SubmitAll {
                    task: 0,
                    workers: vec!["worker2".to_string()],
                },
                ScenarioStep::ReviewAll {
                    task: 0,
                    approve: false,
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::EscrowEquals { task: 0, coins: 10 },
                },
                ScenarioStep::DeleteTask {
                    task: 0,
                    caller: "buyer1".to_string(),
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::BalanceEquals {
                        user: "buyer1".to_string(),
                        coins: 45,
                    },
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::BalanceEquals {
                        user: "worker1".to_string(),
                        coins: 15,
                    },
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::Conserved,
                },
            ],
        }
    }

    /// Earn enough for a payout, get rejected, try again.
    fn withdrawal_cycle() -> Self {
        // Each buyer can afford exactly one 50-coin task.
        let mut steps: Vec<ScenarioStep> = (1..=5)
            .map(|i| ScenarioStep::PostTask {
                buyer: format!("buyer{i}"),
                required_workers: 1,
                payable_amount: 50,
            })
            .collect();
        for task in 0..5 {
            steps.push(ScenarioStep::SubmitAll {
                task,
                workers: vec!["worker1".to_string()],
            });
            steps.push(ScenarioStep::ReviewAll {
                task,
                approve: true,
            });
        }
        steps.extend([
            ScenarioStep::RequestWithdrawal {
                worker: "worker1".to_string(),
                coins: 200,
            },
            ScenarioStep::DecideWithdrawals { approve: false },
            ScenarioStep::Assert {
                condition: AssertCondition::BalanceEquals {
                    user: "worker1".to_string(),
                    coins: 260,
                },
            },
            ScenarioStep::RequestWithdrawal {
                worker: "worker1".to_string(),
                coins: 240,
            },
            ScenarioStep::DecideWithdrawals { approve: true },
            ScenarioStep::Assert {
                condition: AssertCondition::BalanceEquals {
                    user: "worker1".to_string(),
                    coins: 20,
                },
            },
            ScenarioStep::Assert {
                condition: AssertCondition::Conserved,
            },
        ]);

        Self {
            name: "withdrawal-cycle".to_string(),
            description: "Hold on request, refund on rejection, payout on approval".to_string(),
            buyers: 5,
            workers: 1,
            steps,
        }
    }

    /// Many workers race for a small task.
    fn rush() -> Self {
        let workers: Vec<String> = (1..=10).map(|i| format!("worker{i}")).collect();
        Self {
            name: "rush".to_string(),
            description: "Ten workers submit at once, the buyer approves them all".to_string(),
            buyers: 1,
            workers: 10,
            steps: vec![
                ScenarioStep::PostTask {
                    buyer: "buyer1".to_string(),
                    required_workers: 4,
                    payable_amount: 10,
                },
                ScenarioStep::SubmitAll { task: 0, workers },
                ScenarioStep::Wait { millis: 50 },
                ScenarioStep::ReviewAll {
                    task: 0,
                    approve: true,
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::EscrowEquals { task: 0, coins: 0 },
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::Conserved,
                },
            ],
        }
    }
}
