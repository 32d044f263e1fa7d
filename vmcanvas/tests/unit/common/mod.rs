//! Shared test helpers: a scripted process runner and machine fixtures

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use vmcanvas::deploy::bootstrap::BootstrapOptions;
use vmcanvas::deploy::orchestrator::{Orchestrator, OrchestratorOptions};
use vmcanvas::deploy::process::{
    CommandSpec, ExitKind, ProcessFailure, ProcessOutput, ProcessRunner,
};
use vmcanvas::models::machine::{Application, InstanceSize, MachineConfiguration, Region};

pub const PUBLIC_IP: &str = "1.2.3.4";

/// Records every command and answers from a script instead of spawning.
///
/// Commands are matched by `"<program> <first arg>"` first (e.g.
/// `"terraform apply"`), then by program alone (e.g. `"scp"`). Key generation
/// writes empty key files unless told otherwise.
pub struct ScriptedRunner {
    calls: Mutex<Vec<CommandSpec>>,
    failing: Mutex<HashSet<String>>,
    stdout: Mutex<HashMap<String, String>>,
    delays: Mutex<HashMap<String, Duration>>,
    keygen_writes_keys: AtomicBool,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        let runner = Self {
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            stdout: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            keygen_writes_keys: AtomicBool::new(true),
        };
        runner.set_stdout("terraform output", &format!("{PUBLIC_IP}\n"));
        Arc::new(runner)
    }

    pub fn fail(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    pub fn set_stdout(&self, key: &str, stdout: &str) {
        self.stdout
            .lock()
            .unwrap()
            .insert(key.to_string(), stdout.to_string());
    }

    pub fn delay(&self, key: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(key.to_string(), delay);
    }

    pub fn keygen_writes_keys(&self, enabled: bool) {
        self.keygen_writes_keys.store(enabled, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Match keys of every recorded call, in order
    pub fn call_keys(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| match c.args.first() {
                Some(sub) if c.program == "terraform" => format!("terraform {sub}"),
                _ => c.program.clone(),
            })
            .collect()
    }

    pub fn count(&self, key: &str) -> usize {
        self.call_keys().iter().filter(|k| *k == key).count()
    }

    fn lookup<T: Clone>(map: &Mutex<HashMap<String, T>>, spec: &CommandSpec) -> Option<T> {
        let map = map.lock().unwrap();
        spec.args
            .first()
            .and_then(|sub| map.get(&format!("{} {}", spec.program, sub)))
            .or_else(|| map.get(&spec.program))
            .cloned()
    }

    fn is_failing(&self, spec: &CommandSpec) -> bool {
        let failing = self.failing.lock().unwrap();
        let sub_key = spec
            .args
            .first()
            .map(|sub| format!("{} {}", spec.program, sub));
        failing.contains(&spec.program) || sub_key.is_some_and(|k| failing.contains(&k))
    }

    fn write_keys(spec: &CommandSpec) {
        let key_path = spec
            .args
            .iter()
            .position(|a| a == "-f")
            .and_then(|i| spec.args.get(i + 1));
        if let Some(path) = key_path {
            std::fs::write(path, "PRIVATE").unwrap();
            std::fs::write(format!("{path}.pub"), "ssh-rsa AAAA test").unwrap();
        }
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, ProcessFailure> {
        self.calls.lock().unwrap().push(spec.clone());

        if let Some(delay) = Self::lookup(&self.delays, spec) {
            tokio::time::sleep(delay).await;
        }

        if spec.program == "ssh-keygen" && self.keygen_writes_keys.load(Ordering::SeqCst) {
            Self::write_keys(spec);
        }

        if self.is_failing(spec) {
            return Err(ProcessFailure::new(spec, ExitKind::Code(1))
                .with_output("", "Error: scripted failure"));
        }

        Ok(ProcessOutput {
            stdout: Self::lookup(&self.stdout, spec).unwrap_or_default(),
            stderr: String::new(),
        })
    }
}

pub fn orchestrator_options(deployments_dir: &Path) -> OrchestratorOptions {
    OrchestratorOptions {
        deployments_dir: deployments_dir.to_path_buf(),
        bootstrap: BootstrapOptions {
            settle_delay: Duration::ZERO,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn orchestrator(deployments_dir: &Path, runner: Arc<ScriptedRunner>) -> Orchestrator {
    Orchestrator::new(orchestrator_options(deployments_dir), runner)
}

pub fn machine(id: &str) -> MachineConfiguration {
    MachineConfiguration::new(
        id,
        "A",
        Region::UsWest1,
        InstanceSize::T2Micro,
        Application::Vscode,
    )
}
