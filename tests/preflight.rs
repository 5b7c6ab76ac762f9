// tests/preflight.rs

//! The host gate must stop the process before any build state exists.

mod common;

use common::{recipe, recording_kitchen};
use kiln::config::KilnConfig;
use kiln::preflight::{self, HostProbe, PreflightError};
use kiln::Error;
use std::path::PathBuf;

struct Host {
    root: bool,
    kernel: &'static str,
}

impl HostProbe for Host {
    fn kernel_release(&self) -> Result<String, String> {
        Ok(self.kernel.to_string())
    }

    fn find_program(&self, name: &str) -> Option<PathBuf> {
        Some(PathBuf::from("/usr/bin").join(name))
    }

    fn is_superuser(&self) -> bool {
        self.root
    }
}

#[test]
fn test_root_leaves_no_trace() {
    let (_temp_dir, kitchen, executor) = recording_kitchen();
    let recipe = recipe("zlib", "[build]\nstyle = \"gnu_configure\"\n");
    let host = Host {
        root: true,
        kernel: "6.6.8",
    };

    let result = preflight::gate(&host, |_| kitchen.cook(&recipe));
    assert!(matches!(
        result,
        Err(Error::Preflight(PreflightError::RunningAsRoot))
    ));

    assert!(executor.calls().is_empty());
    assert!(kitchen.stamps().list(&recipe.package_id()).unwrap().is_empty());
    assert!(!kitchen.config().stamp_dir.exists());
    assert!(!kitchen.config().build_root.exists());
}

#[test]
fn test_old_kernel_refused() {
    let host = Host {
        root: false,
        kernel: "3.2.0-4-amd64",
    };
    let err = preflight::check(&host).unwrap_err();
    assert!(matches!(err, PreflightError::KernelTooOld { .. }));
    assert!(err.to_string().contains("3.8"));
}

#[test]
fn test_healthy_host_runs_body() {
    let (_temp_dir, kitchen, executor) = recording_kitchen();
    let recipe = recipe("zlib", "[build]\nstyle = \"makefile\"\n");
    let host = Host {
        root: false,
        kernel: "6.1.0-13-amd64",
    };

    let result = preflight::gate(&host, |_| kitchen.cook(&recipe)).unwrap();
    assert_eq!(result.package.name, "zlib");
    assert_eq!(executor.calls().len(), 4);
}

#[test]
fn test_gate_hands_resolved_programs_to_the_sandbox() {
    let host = Host {
        root: false,
        kernel: "6.6.8",
    };

    let bwrap = preflight::gate(&host, |preflight| -> anyhow::Result<PathBuf> {
        let mut config = KilnConfig::default();
        config.adopt_host(preflight);
        Ok(config.kitchen_config()?.container.bwrap)
    })
    .unwrap();
    assert_eq!(bwrap, PathBuf::from("/usr/bin/bwrap"));

    let root = Host {
        root: true,
        kernel: "6.6.8",
    };
    let err = preflight::gate(&root, |_| -> anyhow::Result<()> { panic!("body ran as root") })
        .unwrap_err();
    assert!(err.downcast_ref::<PreflightError>().is_some());
}
