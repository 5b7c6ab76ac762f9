// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: recipe file
fn recipe_arg() -> Arg {
    Arg::new("recipe")
        .required(true)
        .value_name("RECIPE")
        .help("Path to the recipe file")
}

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .action(ArgAction::SetTrue)
        .help(help)
}

fn build_cli() -> Command {
    Command::new("kiln")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Kiln Contributors")
        .about("Cross-compilation aware package builder with resumable, sandboxed builds")
        .subcommand_required(false)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Configuration file (default: $XDG_CONFIG_HOME/kiln/kiln.toml)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Enable debug logging"),
        )
        .subcommand(
            Command::new("build")
                .about("Build a package from a recipe, resuming where a previous run stopped")
                .arg(recipe_arg())
                .arg(flag("no-check", "Skip the check stage"))
                .arg(flag("allow-network", "Allow network access inside the sandbox"))
                .arg(flag("force", "Clear the package's stamps and rebuild from scratch"))
                .arg(
                    Arg::new("output-dir")
                        .short('o')
                        .long("output-dir")
                        .value_name("DIR")
                        .help("Output directory for emitted packages"),
                )
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .value_name("N")
                        .help("Number of parallel jobs"),
                ),
        )
        .subcommand(
            Command::new("clean")
                .about("Remove a package's build tree, outputs and stamps")
                .arg(recipe_arg()),
        )
        .subcommand(
            Command::new("status")
                .about("Show which stages are done for a package")
                .arg(recipe_arg()),
        )
        .subcommand(
            Command::new("deps")
                .about("Show the dependencies of every output package")
                .arg(recipe_arg())
                .arg(flag("json", "Print as JSON")),
        )
        .subcommand(Command::new("profiles").about("List the architecture profiles"))
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(Arg::new("shell").required(true).help("Target shell")),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("kiln.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
