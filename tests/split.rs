// tests/split.rs

//! Subpackage splitting through the full lifecycle.

mod common;

use common::{recipe, recording_kitchen};
use kiln::recipe::{BuildContext, HookSet, Stage};
use kiln::Error;
use std::fs;
use std::path::PathBuf;

fn install_libc(ctx: &mut BuildContext<'_>) -> kiln::Result<()> {
    let root = ctx.install_dir().host;
    fs::create_dir_all(root.join("usr/lib"))?;
    fs::create_dir_all(root.join("usr/bin"))?;
    fs::write(root.join("usr/lib/libc.a"), b"!<arch>\n")?;
    fs::write(root.join("usr/lib/libc.so"), b"\x7fELF")?;
    fs::write(root.join("usr/bin/tool"), b"#!/bin/sh\n")?;
    Ok(())
}

fn file_list(files: &std::collections::BTreeSet<PathBuf>) -> Vec<String> {
    files.iter().map(|p| p.display().to_string()).collect()
}

#[test]
fn test_static_archives_go_to_subpackage() {
    let (_temp_dir, kitchen, _executor) = recording_kitchen();
    let recipe = recipe(
        "libc",
        r#"
[[subpackage]]
name = "libc-static"
description = "Static archives"
paths = ["usr/lib/*.a"]
pull = false
"#,
    );
    let mut hooks = HookSet::empty();
    hooks.set(Stage::Install, install_libc);

    let result = kitchen.cook_with_hooks(&recipe, &hooks).unwrap();
    assert_eq!(result.outputs.len(), 2);

    let main = &result.outputs[0];
    assert_eq!(main.name, "libc");
    assert_eq!(file_list(&main.files), vec!["usr/bin/tool", "usr/lib/libc.so"]);

    let static_pkg = &result.outputs[1];
    assert_eq!(static_pkg.name, "libc-static");
    assert_eq!(static_pkg.description.as_deref(), Some("Static archives"));
    assert_eq!(file_list(&static_pkg.files), vec!["usr/lib/libc.a"]);

    assert!(static_pkg.root.join("usr/lib/libc.a").is_file());
    assert!(!static_pkg.root.join("usr/lib/libc.so").exists());
    assert!(main.root.join("usr/bin/tool").is_file());
    assert!(static_pkg.root.parent().unwrap().join("manifest.json").is_file());

    let paths = kitchen.build_paths(&recipe);
    assert!(paths.destdir.host.join("usr/lib/libc.a").is_file());
}

#[test]
fn test_overlapping_claims_fail_before_emitting() {
    let (_temp_dir, kitchen, _executor) = recording_kitchen();
    let recipe = recipe(
        "libc",
        r#"
[[subpackage]]
name = "libc-devel"
paths = ["usr/lib"]

[[subpackage]]
name = "libc-static"
paths = ["usr/lib/*.a"]
"#,
    );
    let mut hooks = HookSet::empty();
    hooks.set(Stage::Install, install_libc);

    let err = kitchen.cook_with_hooks(&recipe, &hooks).unwrap_err();
    let Error::StageFailed { stage, source, .. } = err else {
        panic!("expected a stage failure");
    };
    assert_eq!(stage, "package");
    match *source {
        Error::OverlappingClaims {
            first,
            second,
            paths,
            ..
        } => {
            assert_eq!(first, "libc-devel");
            assert_eq!(second, "libc-static");
            assert_eq!(paths, vec!["usr/lib/libc.a"]);
        }
        other => panic!("unexpected error: {other}"),
    }

    let outputs = kitchen.build_paths(&recipe).outputs;
    assert!(!outputs.join("libc").exists());
    assert!(!outputs.join("libc-devel").exists());
}

fn install_cross(ctx: &mut BuildContext<'_>) -> kiln::Result<()> {
    let lib = ctx.install_dir().host.join("usr/lib");
    fs::create_dir_all(&lib)?;
    fs::write(lib.join("libc.a"), ctx.profile().triplet())?;
    Ok(())
}

#[test]
fn test_per_target_subpackages_follow_built_profiles() {
    let (_temp_dir, kitchen, _executor) = recording_kitchen();
    let recipe = recipe(
        "musl-cross",
        r#"
[cross]
targets = ["aarch64", "riscv64"]

[[subpackage]]
name = "musl-cross-%(arch)s"
for_each_target = true
paths = ["usr/%(triplet)s"]
pull = true
"#,
    );
    let mut hooks = HookSet::empty();
    hooks.set(Stage::Install, install_cross);

    let result = kitchen.cook_with_hooks(&recipe, &hooks).unwrap();
    let names: Vec<&str> = result.outputs.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["musl-cross", "musl-cross-aarch64", "musl-cross-riscv64"]
    );
    assert!(result.outputs[0].files.is_empty());
    assert_eq!(result.outputs[1].files.len(), 1);

    let runtime = &result.dependencies.get("musl-cross").unwrap().runtime;
    assert!(runtime.contains("musl-cross-aarch64=1.2.4-r0"));
    assert!(runtime.contains("musl-cross-riscv64=1.2.4-r0"));
    assert!(result.dependencies.names("musl-cross").contains("musl-cross-aarch64"));
}
