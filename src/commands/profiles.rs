// src/commands/profiles.rs

//! Profiles command - list the architecture registry

use anyhow::{Context, Result};
use kiln::config::KilnConfig;
use kiln::profile::Profile;

fn print_profile(profile: &Profile) {
    let roots = profile.roots();
    println!(
        "{:10} {:24} build={:16} install={}",
        profile.name(),
        profile.triplet(),
        roots.build.display(),
        if roots.install.as_os_str().is_empty() {
            "(destdir)".to_string()
        } else {
            roots.install.display().to_string()
        }
    );
}

pub fn cmd_profiles(config: &KilnConfig) -> Result<()> {
    let registry = config.registry().context("Invalid profile configuration")?;
    print_profile(registry.host());
    for profile in registry.targets() {
        print_profile(profile);
    }
    Ok(())
}
