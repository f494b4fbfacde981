//! Simulated marketplace users.

use earnzy_common::{Email, Role};
use earnzy_ledger::{Ledger, NewAccount};

/// A simulated user.
#[derive(Debug, Clone)]
pub struct SimulatedUser {
    /// Account key.
    pub email: Email,
    /// Display name.
    pub name: String,
    pub role: Role,
}

impl SimulatedUser {
    /// Create a simulated user.
    pub fn new(email: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            email: Email::new(email),
            name: name.into(),
            role,
        }
    }

    /// Register this user with the ledger.
    pub async fn register(&self, ledger: &Ledger) -> anyhow::Result<()> {
        ledger
            .register(NewAccount {
                email: self.email.clone(),
                name: self.name.clone(),
                profile_pic: None,
                role: Some(self.role),
            })
            .await?;
        Ok(())
    }
}

/// Everyone taking part in a simulation.
#[derive(Debug, Clone)]
pub struct Population {
    pub admin: SimulatedUser,
    pub buyers: Vec<SimulatedUser>,
    pub workers: Vec<SimulatedUser>,
}

impl Population {
    /// Create `buyers` buyers, `workers` workers and one admin.
    pub fn create(buyers: usize, workers: usize) -> Self {
        let buyer_names = [
            "Aurora Studio",
            "Bluefin Apps",
            "Cobalt Media",
            "Driftwood Games",
            "Ember Labs",
        ];
        let worker_names = [
            "Amina", "Bilal", "Chen", "Dara", "Elif", "Farid", "Grace", "Hana", "Ivan", "Joy",
        ];

        let buyers = (0..buyers)
            .map(|i| {
                let name = buyer_names
                    .get(i)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| format!("Buyer {}", i + 1));
                SimulatedUser::new(format!("buyer{}@sim.earnzy.io", i + 1), name, Role::Buyer)
            })
            .collect();

        let workers = (0..workers)
            .map(|i| {
                let name = worker_names
                    .get(i)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| format!("Worker {}", i + 1));
                SimulatedUser::new(format!("worker{}@sim.earnzy.io", i + 1), name, Role::Worker)
            })
            .collect();

        Self {
            admin: SimulatedUser::new("admin@sim.earnzy.io", "Admin", Role::Admin),
            buyers,
            workers,
        }
    }

    /// Register every user.
    pub async fn register_all(&self, ledger: &Ledger) -> anyhow::Result<()> {
        self.admin.register(ledger).await?;
        for user in self.buyers.iter().chain(&self.workers) {
            user.register(ledger).await?;
        }
        Ok(())
    }

    /// Look up a user by the short handle used in scenarios (`buyer1`, `worker3`, `admin`).
    pub fn find(&self, handle: &str) -> Option<&SimulatedUser> {
        if handle == "admin" {
            return Some(&self.admin);
        }
        self.buyers
            .iter()
            .chain(&self.workers)
            .find(|u| u.email.as_str().split('@').next() == Some(handle))
    }

    /// Every account email.
    pub fn emails(&self) -> impl Iterator<Item = &Email> {
        std::iter::once(&self.admin.email)
            .chain(self.buyers.iter().map(|u| &u.email))
            .chain(self.workers.iter().map(|u| &u.email))
    }
}
