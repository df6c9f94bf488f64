//! Shared test fixtures: an in-memory Consul cluster that records every call.

#![allow(dead_code, reason = "Each test binary uses a different subset")]

use async_trait::async_trait;
use gossip_key_rotator::config::RetryConfig;
use gossip_key_rotator::detector::ChangeDetector;
use gossip_key_rotator::keyring::{
    KeyringClient, KeyringError, KeyringPool, KeyringSnapshot, LeaderSource,
};
use gossip_key_rotator::leadership::LeadershipGate;
use gossip_key_rotator::rotation::{RetryPolicy, RotationOrchestrator};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const KEY_A: &str = "pUqJrVyVRj5jsiYEkM/tFQYfWyJIv4s3XkvDwy7Cu5s=";
pub const KEY_B: &str = "H6bKx2kYdQ7Sg2ipYcu1m8WBUq6qvZRDmF4tdD3HmJk=";
pub const KEY_C: &str = "ZGVmZ2hpamtsbW5vcHFyc3R1dnd4eXp7fH1+f4CBgoM=";

pub const POD_IP: &str = "10.0.0.5";
pub const LEADER_SELF: &str = "10.0.0.5:8300";
pub const LEADER_OTHER: &str = "10.0.0.6:8300";

/// A call observed by the fake cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Leader,
    /// Keys every member reported in the returned snapshot
    List { fully_installed: Vec<String> },
    Install(String),
    Promote(String),
    Remove(String),
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(self, Call::Install(_) | Call::Promote(_) | Call::Remove(_))
    }
}

/// How a freshly installed key spreads across members
#[derive(Debug, Clone, Copy)]
pub enum Propagation {
    Immediate,
    /// Fully installed once this many further `list()` calls observed it
    AfterPolls(u32),
    Never,
}

#[derive(Debug)]
struct State {
    members: u32,
    keys: BTreeMap<String, u32>,
    pending: HashMap<String, u32>,
    primary: Option<String>,
    propagation: Propagation,
    leader: Result<String, KeyringError>,
    leader_script: VecDeque<Result<String, KeyringError>>,
    install_errors: VecDeque<KeyringError>,
    promote_errors: VecDeque<KeyringError>,
    list_errors: VecDeque<KeyringError>,
    list_failures_at: HashMap<usize, KeyringError>,
    list_calls: usize,
    broken_removals: HashMap<String, KeyringError>,
    calls: Vec<Call>,
}

/// In-memory keyring of a single LAN pool
#[derive(Debug)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    /// `members` nodes, all using `primary`
    pub fn new(members: u32, primary: &str) -> Arc<Self> {
        let mut keys = BTreeMap::new();
        keys.insert(primary.to_string(), members);
        Arc::new(Self {
            state: Mutex::new(State {
                members,
                keys,
                pending: HashMap::new(),
                primary: Some(primary.to_string()),
                propagation: Propagation::Immediate,
                leader: Ok(LEADER_SELF.to_string()),
                leader_script: VecDeque::new(),
                install_errors: VecDeque::new(),
                promote_errors: VecDeque::new(),
                list_errors: VecDeque::new(),
                list_failures_at: HashMap::new(),
                list_calls: 0,
                broken_removals: HashMap::new(),
                calls: Vec::new(),
            }),
        })
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Install `key` on every member without making it primary
    pub fn preinstall(&self, key: &str) {
        self.with(|s| {
            let members = s.members;
            s.keys.insert(key.to_string(), members);
        });
    }

    pub fn set_propagation(&self, propagation: Propagation) {
        self.with(|s| s.propagation = propagation);
    }

    pub fn set_leader(&self, leader: Result<String, KeyringError>) {
        self.with(|s| s.leader = leader);
    }

    /// Answers for the next leader queries, before falling back to the default
    pub fn script_leader(&self, answers: Vec<Result<String, KeyringError>>) {
        self.with(|s| s.leader_script = answers.into());
    }

    pub fn fail_installs(&self, errors: Vec<KeyringError>) {
        self.with(|s| s.install_errors = errors.into());
    }

    pub fn fail_promotes(&self, errors: Vec<KeyringError>) {
        self.with(|s| s.promote_errors = errors.into());
    }

    pub fn fail_lists(&self, errors: Vec<KeyringError>) {
        self.with(|s| s.list_errors = errors.into());
    }

    /// The `nth` list call (1-based, counted from creation) fails with `error`
    pub fn fail_nth_list(&self, nth: usize, error: KeyringError) {
        self.with(|s| {
            s.list_failures_at.insert(nth, error);
        });
    }

    /// Every removal of `key` fails with `error`
    pub fn break_removal(&self, key: &str, error: KeyringError) {
        self.with(|s| {
            s.broken_removals.insert(key.to_string(), error);
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with(|s| s.calls.clone())
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn count(&self, wanted: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| wanted(c)).count()
    }

    pub fn primary(&self) -> Option<String> {
        self.with(|s| s.primary.clone())
    }

    pub fn installed(&self) -> Vec<String> {
        self.with(|s| s.keys.keys().cloned().collect())
    }

    pub fn member_count(&self, key: &str) -> u32 {
        self.with(|s| s.keys.get(key).copied().unwrap_or(0))
    }

    pub fn snapshot(&self) -> KeyringSnapshot {
        self.with(|s| snapshot_of(s))
    }
}

fn snapshot_of(state: &State) -> KeyringSnapshot {
    let mut primary_keys = BTreeMap::new();
    if let Some(primary) = &state.primary {
        primary_keys.insert(primary.clone(), state.members);
    }
    KeyringSnapshot::new(vec![KeyringPool {
        wan: false,
        datacenter: "dc1".to_string(),
        segment: String::new(),
        keys: state.keys.clone(),
        primary_keys,
        num_nodes: state.members,
    }])
}

fn server_error(message: &str) -> KeyringError {
    KeyringError::Status {
        status: 500,
        message: message.to_string(),
    }
}

#[async_trait]
impl KeyringClient for FakeCluster {
    async fn list(&self) -> Result<KeyringSnapshot, KeyringError> {
        self.with(|s| {
            s.list_calls += 1;
            let scripted = s.list_failures_at.remove(&s.list_calls);
            if let Some(error) = scripted.or_else(|| s.list_errors.pop_front()) {
                s.calls.push(Call::List {
                    fully_installed: Vec::new(),
                });
                return Err(error);
            }

            let members = s.members;
            let mut done = Vec::new();
            for (key, remaining) in &mut s.pending {
                if *remaining == 0 {
                    done.push(key.clone());
                } else {
                    *remaining -= 1;
                }
            }
            for key in done {
                s.pending.remove(&key);
                s.keys.insert(key, members);
            }

            let snapshot = snapshot_of(s);
            let fully_installed = s
                .keys
                .iter()
                .filter(|(_, n)| **n == members)
                .map(|(k, _)| k.clone())
                .collect();
            s.calls.push(Call::List { fully_installed });
            Ok(snapshot)
        })
    }

    async fn install(&self, key: &str) -> Result<(), KeyringError> {
        self.with(|s| {
            s.calls.push(Call::Install(key.to_string()));
            if let Some(error) = s.install_errors.pop_front() {
                return Err(error);
            }
            if s.keys.contains_key(key) {
                return Ok(());
            }
            let members = s.members;
            match s.propagation {
                Propagation::Immediate => {
                    s.keys.insert(key.to_string(), members);
                }
                Propagation::AfterPolls(polls) => {
                    s.keys.insert(key.to_string(), 1);
                    s.pending.insert(key.to_string(), polls);
                }
                Propagation::Never => {
                    s.keys.insert(key.to_string(), members.saturating_sub(1).max(1));
                }
            }
            Ok(())
        })
    }

    async fn promote(&self, key: &str) -> Result<(), KeyringError> {
        self.with(|s| {
            s.calls.push(Call::Promote(key.to_string()));
            if let Some(error) = s.promote_errors.pop_front() {
                return Err(error);
            }
            if s.keys.get(key).copied() != Some(s.members) {
                return Err(server_error("key not installed on every member"));
            }
            s.primary = Some(key.to_string());
            Ok(())
        })
    }

    async fn remove(&self, key: &str) -> Result<(), KeyringError> {
        self.with(|s| {
            s.calls.push(Call::Remove(key.to_string()));
            if let Some(error) = s.broken_removals.get(key) {
                return Err(error.clone());
            }
            if s.primary.as_deref() == Some(key) {
                return Err(server_error("Removing the primary key is not allowed"));
            }
            s.keys.remove(key);
            s.pending.remove(key);
            Ok(())
        })
    }
}

#[async_trait]
impl LeaderSource for FakeCluster {
    async fn leader(&self) -> Result<String, KeyringError> {
        self.with(|s| {
            s.calls.push(Call::Leader);
            s.leader_script
                .pop_front()
                .unwrap_or_else(|| s.leader.clone())
        })
    }
}

/// Small budgets so exhaustion tests stay short in virtual time
pub fn fast_retry() -> RetryConfig {
    let policy = |attempts| RetryPolicy::fixed(attempts, Duration::from_secs(1));
    RetryConfig {
        install: policy(5),
        propagation: policy(5),
        promote: policy(5),
        remove: policy(3),
    }
}

pub fn orchestrator(cluster: &Arc<FakeCluster>, cancel: CancellationToken) -> RotationOrchestrator {
    let gate = LeadershipGate::new(
        Arc::clone(cluster) as Arc<dyn LeaderSource>,
        POD_IP.parse().unwrap(),
        Duration::from_secs(5),
    );
    RotationOrchestrator::new(
        Arc::clone(cluster) as Arc<dyn KeyringClient>,
        gate,
        fast_retry(),
        Duration::from_secs(5),
        cancel,
    )
}

pub fn write_key(dir: &Path, key: &str) -> PathBuf {
    let path = dir.join("gossip.key");
    std::fs::write(&path, format!("{key}\n")).unwrap();
    path
}

/// Detector whose baseline is `committed` while the file holds `current`
pub fn detector(dir: &Path, committed: &str, current: &str) -> ChangeDetector {
    let path = write_key(dir, current);
    ChangeDetector::new(
        path,
        Some(gossip_key_rotator::detector::Fingerprint::of(committed)),
    )
}

/// Index of the first call matching `wanted`
pub fn position(calls: &[Call], wanted: impl Fn(&Call) -> bool) -> Option<usize> {
    calls.iter().position(wanted)
}
