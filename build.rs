// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Mirrors the argument list of `src/main.rs` for the man page
fn build_cli() -> Command {
    Command::new("rezpip")
        .version(env!("CARGO_PKG_VERSION"))
        .author("rezpip Contributors")
        .about("Convert pip-resolved Python packages into rez packages")
        .arg(
            Arg::new("packages")
                .num_args(0..)
                .value_name("PACKAGES")
                .help("Packages to install, in pip requirement syntax"),
        )
        .arg(
            Arg::new("requirement")
                .short('r')
                .long("requirement")
                .value_name("FILE")
                .action(ArgAction::Append)
                .help("Install from the given requirements file"),
        )
        .arg(
            Arg::new("constraint")
                .short('c')
                .long("constraint")
                .value_name("FILE")
                .action(ArgAction::Append)
                .help("Constrain versions using the given constraints file"),
        )
        .arg(
            Arg::new("prefix")
                .short('p')
                .long("prefix")
                .value_name("PREFIX")
                .help("Install packages into this repository"),
        )
        .arg(
            Arg::new("release")
                .long("release")
                .action(ArgAction::SetTrue)
                .help("Install into the release packages path"),
        )
        .arg(
            Arg::new("python")
                .long("python")
                .value_name("PATH")
                .action(ArgAction::Append)
                .help("Python interpreter to resolve for (repeatable, default python3)"),
        )
        .arg(
            Arg::new("pip")
                .long("pip")
                .value_name("PATH")
                .help("Path to the pip.pyz to resolve with"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Configuration file"),
        )
        .arg(
            Arg::new("log_level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .default_value("info")
                .help("Log level when RUST_LOG is not set"),
        )
        .arg(
            Arg::new("keep_tmp_dirs")
                .long("keep-tmp-dirs")
                .action(ArgAction::SetTrue)
                .help("Keep the work area after the run"),
        )
        .arg(
            Arg::new("list_hooks")
                .long("list-hooks")
                .action(ArgAction::SetTrue)
                .help("List registered hooks and exit"),
        )
        .arg(
            Arg::new("debug_info")
                .long("debug-info")
                .action(ArgAction::SetTrue)
                .help("Print version, host and interpreter details for bug reports and exit"),
        )
        .arg(
            Arg::new("pip_args")
                .last(true)
                .num_args(0..)
                .value_name("PIP_ARGS")
                .help("Extra arguments passed to pip"),
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

    let man_path = man_dir.join("rezpip.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
