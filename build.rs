// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("pkgdeploy")
        .version(env!("CARGO_PKG_VERSION"))
        .author("pkgdeploy Contributors")
        .about("Build, reconcile and deploy package indexes")
        .arg(
            Arg::new("roots")
                .value_name("ROOT")
                .num_args(1..)
                .help("Directories scanned for package definitions"),
        )
        .arg(
            Arg::new("package_index")
                .long("package-index")
                .value_name("PATH")
                .default_value("package-index.xml")
                .help("Package index file to read and write"),
        )
        .arg(
            Arg::new("package_index_policy")
                .long("package-index-policy")
                .value_parser(["overwrite", "append", "update", "update-keep-old-packages"])
                .help("What to do with an existing package index"),
        )
        .arg(
            Arg::new("deploy")
                .long("deploy")
                .value_name("PATH")
                .help("Distribution folder to deploy to"),
        )
        .arg(
            Arg::new("deploy_policy")
                .long("deploy-policy")
                .value_parser(["wipe", "update"])
                .default_value("update")
                .help("How the distribution folder is brought up to date"),
        )
        .arg(
            Arg::new("retry_delay_ms")
                .long("retry-delay-ms")
                .value_name("MS")
                .default_value("1000")
                .help("Delay between retries of a failed copy, move or delete"),
        )
        .arg(
            Arg::new("wipe_delay_secs")
                .long("wipe-delay-secs")
                .value_name("SECS")
                .default_value("10")
                .help("Seconds to wait before wiping the distribution folder"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log per-file detail"),
        )
        .arg(
            Arg::new("completions")
                .long("completions")
                .value_name("SHELL")
                .help("Print a shell completion script and exit"),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("pkgdeploy.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
