//! Start-up bootstrap of the storage backend.
//!
//! A small state machine: probe the bucket with a test write; if the bucket is
//! missing, create it and poll until the backend reports it. Every path ends
//! in `Ready` or `Failed`, and a hard step budget bounds the whole run.

use crate::services::{
    backend::ClientOptions,
    preview_store::{PreviewStore, StoreError, StoreResult},
};
use std::time::Duration;
use tracing::{info, warn};

/// Retry budgets and delays for each bootstrap phase.
#[derive(Clone, Copy, Debug)]
pub struct BootstrapPolicy {
    /// Client used for the availability probe.
    pub probe: ClientOptions,
    /// Client used to create a missing bucket.
    pub create: ClientOptions,
    /// Maximum number of existence polls after creating the bucket.
    pub wait_attempts: u32,
    /// Fixed delay between existence polls.
    pub wait_delay: Duration,
    /// Hard cap on state transitions.
    pub max_steps: u32,
}

impl Default for BootstrapPolicy {
    fn default() -> Self {
        // Start-up connection problems usually clear out fast, so probe
        // attempts are many and short.
        Self {
            probe: ClientOptions::new(20, Duration::from_secs(1), Duration::from_secs(1)),
            create: ClientOptions::new(5, Duration::from_secs(5), Duration::from_secs(5)),
            wait_attempts: 5,
            wait_delay: Duration::from_secs(5),
            max_steps: 16,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BootstrapState {
    Probing,
    Creating,
    /// `attempt` existence polls have come back negative so far.
    Waiting { attempt: u32 },
    Ready,
    Failed(String),
}

impl BootstrapState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BootstrapState::Ready | BootstrapState::Failed(_))
    }
}

pub struct Bootstrap {
    store: PreviewStore,
    policy: BootstrapPolicy,
    state: BootstrapState,
    steps: u32,
}

impl Bootstrap {
    pub fn new(store: PreviewStore, policy: BootstrapPolicy) -> Self {
        Self {
            store,
            policy,
            state: BootstrapState::Probing,
            steps: 0,
        }
    }

    pub fn state(&self) -> &BootstrapState {
        &self.state
    }

    /// Advance by one transition. Terminal states are sticky.
    pub async fn step(&mut self) -> &BootstrapState {
        if self.state.is_terminal() {
            return &self.state;
        }
        if self.steps >= self.policy.max_steps {
            warn!("bootstrap step budget of {} exhausted", self.policy.max_steps);
            self.state = BootstrapState::Failed("step budget exhausted".into());
            return &self.state;
        }
        self.steps += 1;

        let next = match &self.state {
            BootstrapState::Probing => match self.store.probe(self.policy.probe).await {
                Ok(()) => {
                    info!("storage service is already available");
                    BootstrapState::Ready
                }
                Err(StoreError::NoSuchBucket(bucket)) => {
                    info!("bucket {} does not exist; creating", bucket);
                    BootstrapState::Creating
                }
                Err(err) => BootstrapState::Failed(format!("store is not available: {}", err)),
            },
            BootstrapState::Creating => match self.store.create_bucket(self.policy.create).await {
                Ok(()) => {
                    info!("wait for bucket to be available");
                    BootstrapState::Waiting { attempt: 0 }
                }
                Err(err) => BootstrapState::Failed(format!("could not create bucket: {}", err)),
            },
            BootstrapState::Waiting { attempt } => {
                let attempt = attempt + 1;
                match self.store.bucket_exists().await {
                    Ok(true) => {
                        info!("bucket is available after {} poll(s)", attempt);
                        BootstrapState::Ready
                    }
                    Ok(false) if attempt >= self.policy.wait_attempts => BootstrapState::Failed(
                        format!("bucket not available after {} polls", attempt),
                    ),
                    Ok(false) => {
                        tokio::time::sleep(self.policy.wait_delay).await;
                        BootstrapState::Waiting { attempt }
                    }
                    Err(err) => {
                        BootstrapState::Failed(format!("could not check bucket: {}", err))
                    }
                }
            }
            terminal => terminal.clone(),
        };

        self.state = next;
        &self.state
    }

    /// Drive the machine to a terminal state.
    pub async fn run(mut self) -> StoreResult<()> {
        loop {
            self.step().await;
            match self.state() {
                BootstrapState::Ready => return Ok(()),
                BootstrapState::Failed(reason) => {
                    return Err(StoreError::InitializationFailed(reason.clone()));
                }
                _ => {}
            }
        }
    }
}
