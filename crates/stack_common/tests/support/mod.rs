//! Shared test doubles: a scripted orchestration boundary and probes.

#![allow(dead_code)]

use stack_common::runtime::{CopyDirection, DbCredentials, ServiceRuntime, ServiceSet};
use stack_common::{ReadinessProbe, Result, StackError};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// One recorded call against the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start(Vec<String>),
    Stop(Vec<String>),
    IsRunning(String),
    Dump(PathBuf),
    Restore(PathBuf),
    CopyState {
        service: String,
        direction: CopyDirection,
    },
    DbReady,
    Pull,
}

/// Scripted in-memory boundary. `start`/`stop` keep the running set
/// consistent so orchestrator sequences behave like the real stack.
pub struct MockRuntime {
    /// Service names `start(All)` expands to.
    pub all_services: Vec<String>,
    pub calls: RefCell<Vec<Call>>,
    pub running: RefCell<BTreeSet<String>>,
    pub dump_bytes: Vec<u8>,
    pub fail_dump: bool,
    pub fail_outbound_copy: bool,
}

impl MockRuntime {
    pub fn new(all_services: &[&str], running: &[&str]) -> Self {
        Self {
            all_services: all_services.iter().map(|s| s.to_string()).collect(),
            calls: RefCell::new(Vec::new()),
            running: RefCell::new(running.iter().map(|s| s.to_string()).collect()),
            dump_bytes: b"PGDMP-fake-custom-format".to_vec(),
            fail_dump: false,
            fail_outbound_copy: false,
        }
    }

    pub fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    pub fn taken_calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn names(&self, services: ServiceSet<'_>) -> Vec<String> {
        match services {
            ServiceSet::All => self.all_services.clone(),
            ServiceSet::Only(names) => names.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ServiceRuntime for MockRuntime {
    fn start(&self, services: ServiceSet<'_>) -> Result<()> {
        let names = self.names(services);
        self.running.borrow_mut().extend(names.iter().cloned());
        self.record(Call::Start(names));
        Ok(())
    }

    fn stop(&self, services: ServiceSet<'_>) -> Result<()> {
        let names = self.names(services);
        for name in &names {
            self.running.borrow_mut().remove(name);
        }
        self.record(Call::Stop(names));
        Ok(())
    }

    fn is_running(&self, service: &str) -> Result<bool> {
        self.record(Call::IsRunning(service.to_string()));
        Ok(self.running.borrow().contains(service))
    }

    fn exec_dump(&self, _creds: &DbCredentials, out: &Path) -> Result<()> {
        self.record(Call::Dump(out.to_path_buf()));
        if self.fail_dump {
            return Err(StackError::DumpFailed("pg_dump exited with 1".into()));
        }
        fs::write(out, &self.dump_bytes).map_err(|e| StackError::io("writing mock dump", e))
    }

    fn exec_restore(&self, _creds: &DbCredentials, dump: &Path) -> Result<()> {
        self.record(Call::Restore(dump.to_path_buf()));
        assert!(dump.is_file(), "restore must receive an extracted dump");
        Ok(())
    }

    fn copy_state(
        &self,
        service: &str,
        _remote_path: &str,
        direction: CopyDirection,
        local: &Path,
    ) -> Result<()> {
        self.record(Call::CopyState {
            service: service.to_string(),
            direction,
        });
        match direction {
            CopyDirection::FromService => {
                if self.fail_outbound_copy {
                    return Err(StackError::io(
                        "copying state",
                        std::io::Error::other("no such container"),
                    ));
                }
                fs::create_dir_all(local).map_err(|e| StackError::io("mock state dir", e))?;
                fs::write(local.join("state.json"), format!("{{\"service\":\"{}\"}}", service))
                    .map_err(|e| StackError::io("mock state file", e))
            }
            CopyDirection::ToService => {
                assert!(local.is_dir(), "inbound copy must receive extracted state");
                Ok(())
            }
        }
    }

    fn db_ready(&self, _creds: &DbCredentials) -> Result<bool> {
        self.record(Call::DbReady);
        Ok(true)
    }

    fn pull_images(&self) -> Result<()> {
        self.record(Call::Pull);
        Ok(())
    }
}

/// Probe answering from a fixed script, then `false` forever.
pub struct ScriptedProbe {
    answers: Vec<bool>,
    pub probes: u32,
}

impl ScriptedProbe {
    pub fn ready() -> Self {
        Self {
            answers: vec![true; 64],
            probes: 0,
        }
    }

    pub fn never_ready() -> Self {
        Self {
            answers: Vec::new(),
            probes: 0,
        }
    }
}

impl ReadinessProbe for ScriptedProbe {
    fn name(&self) -> &str {
        "scripted"
    }

    fn check(&mut self) -> bool {
        let i = self.probes as usize;
        self.probes += 1;
        self.answers.get(i).copied().unwrap_or(false)
    }
}

/// Confirmation gate that records invocations.
pub struct CountingGate {
    pub approve: bool,
    pub invocations: RefCell<u32>,
}

impl CountingGate {
    pub fn new(approve: bool) -> Self {
        Self {
            approve,
            invocations: RefCell::new(0),
        }
    }
}

impl stack_common::ConfirmGate for &CountingGate {
    fn confirm(&mut self, _prompt: &str) -> bool {
        *self.invocations.borrow_mut() += 1;
        self.approve
    }
}

/// Write a loadable stack configuration into `dir` and return its path.
pub fn write_test_config(dir: &Path, extra: &str) -> PathBuf {
    let backup_dir = dir.join("backups");
    let contents = format!(
        "APP_VERSION=1.64.0\n\
         DB_VERSION=15.4\n\
         PROTOCOL=http\n\
         DB_NAME=flows\n\
         DB_USER=flows\n\
         DB_PASSWORD=secret\n\
         ENCRYPTION_KEY=0123456789abcdef0123456789abcdef\n\
         TIMEZONE=Europe/Oslo\n\
         BACKUP_DIR={}\n\
         PROBE_MAX_ATTEMPTS=3\n\
         PROBE_INTERVAL_SECS=0\n\
         {}",
        backup_dir.display(),
        extra
    );
    let path = dir.join("stack.env");
    fs::write(&path, contents).unwrap();
    path
}
