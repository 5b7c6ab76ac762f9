// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use kiln::container::{ExecOutcome, Executor, SandboxInvocation, Termination};
use kiln::recipe::{parse_recipe, Kitchen, KitchenConfig, Recipe};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

type FailWhen = Box<dyn Fn(&SandboxInvocation) -> bool + Send + Sync>;

/// Executor that records every invocation instead of running it
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<SandboxInvocation>>,
    fail_when: Mutex<Option<FailWhen>>,
}

impl RecordingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make matching invocations exit with status 2
    pub fn fail_when(&self, predicate: impl Fn(&SandboxInvocation) -> bool + Send + Sync + 'static) {
        *self.fail_when.lock().unwrap() = Some(Box::new(predicate));
    }

    pub fn succeed_always(&self) {
        *self.fail_when.lock().unwrap() = None;
    }

    pub fn calls(&self) -> Vec<SandboxInvocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Command lines recorded so far
    pub fn commands(&self) -> Vec<String> {
        self.calls().iter().map(SandboxInvocation::command_line).collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl Executor for RecordingExecutor {
    fn execute(&self, invocation: &SandboxInvocation) -> kiln::Result<ExecOutcome> {
        self.calls.lock().unwrap().push(invocation.clone());
        let failed = self
            .fail_when
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|f| f(invocation));
        if failed {
            return Ok(ExecOutcome {
                termination: Termination::Exited(2),
                stdout: String::new(),
                stderr: "make: *** [all] Error 2".to_string(),
            });
        }
        Ok(ExecOutcome::ok())
    }
}

/// A kitchen rooted in a temp dir, routing commands to a recorder
///
/// Returns the TempDir too; keep it alive for the duration of the test.
pub fn recording_kitchen() -> (TempDir, Kitchen, Arc<RecordingExecutor>) {
    let temp_dir = tempfile::tempdir().unwrap();
    let executor = RecordingExecutor::new();
    let kitchen =
        Kitchen::new(KitchenConfig::under(temp_dir.path())).with_executor(executor.clone());
    (temp_dir, kitchen, executor)
}

/// Recipe with the given extra TOML appended to a minimal header
pub fn recipe(name: &str, extra: &str) -> Recipe {
    parse_recipe(&format!(
        r#"
[package]
name = "{name}"
version = "1.2.4"
description = "Test package"
license = "MIT"

{extra}
"#
    ))
    .unwrap()
}
