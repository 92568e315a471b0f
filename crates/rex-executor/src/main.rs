//! `rexctl`: apply resource values from the command line
//!
//! ```text
//! rexctl update --kind memory.min --parent kubepods --value 1073741824 --merge
//! rexctl write-file --dir /proc/sys/vm --file min_free_kbytes --value 90000
//! rexctl kinds --json
//! ```

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use rex_executor::{new_common_default_updater, ExecutorConfig, UpdaterFactory};
use rex_system::ResourceType;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
struct UpdateReport {
    kind: String,
    path: PathBuf,
    requested: String,
    effective: String,
    written: bool,
}

fn cli() -> Command {
    Command::new("rexctl")
        .version(rex_executor::VERSION)
        .about("Apply cgroup and system resource values")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("cgroup-root")
                .long("cgroup-root")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Cgroup hierarchy root (overrides config)"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Output as JSON"),
        )
        .subcommand(
            Command::new("update")
                .about("Update one cgroup resource")
                .arg(
                    Arg::new("kind")
                        .long("kind")
                        .required(true)
                        .help("Resource type, e.g. memory.min"),
                )
                .arg(
                    Arg::new("parent")
                        .long("parent")
                        .required(true)
                        .help("Cgroup directory relative to the root"),
                )
                .arg(Arg::new("value").long("value").required(true).help("Value to apply"))
                .arg(
                    Arg::new("merge")
                        .long("merge")
                        .action(ArgAction::SetTrue)
                        .help("Only widen the stored value"),
                ),
        )
        .subcommand(
            Command::new("write-file")
                .about("Write a plain system file if its value differs")
                .arg(
                    Arg::new("dir")
                        .long("dir")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(Arg::new("file").long("file").required(true))
                .arg(Arg::new("value").long("value").required(true)),
        )
        .subcommand(Command::new("kinds").about("List resource types with a registered updater"))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(matches: &ArgMatches) -> Result<ExecutorConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => ExecutorConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ExecutorConfig::default(),
    };
    if let Some(root) = matches.get_one::<PathBuf>("cgroup-root") {
        config = config.with_cgroup_root(root);
    }
    Ok(config)
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a String> {
    args.get_one::<String>(name)
        .with_context(|| format!("missing --{name}"))
}

fn print_report(report: &UpdateReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("{} {}", report.kind, report.path.display());
    println!("  Requested: {}", report.requested);
    println!("  Effective: {}", report.effective);
    println!("  Written:   {}", report.written);
    Ok(())
}

fn run(matches: &ArgMatches) -> Result<()> {
    let json = matches.get_flag("json");
    let config = load_config(matches)?;
    let env = config.build_env().context("building updater environment")?;

    match matches.subcommand() {
        Some(("update", args)) => {
            let kind = ResourceType::new(required(args, "kind")?.as_str());
            let parent = required(args, "parent")?;
            let value = required(args, "value")?;

            let factory = UpdaterFactory::with_defaults(env);
            let updater = factory
                .new_updater(&kind, parent, value)
                .with_context(|| format!("creating updater for {kind}"))?;

            let (effective, written) = if args.get_flag("merge") {
                let outcome = updater
                    .merge_update()
                    .with_context(|| format!("merging {kind} in {parent}"))?;
                (outcome.value().to_string(), outcome.written)
            } else {
                let written = updater
                    .update()
                    .with_context(|| format!("updating {kind} in {parent}"))?;
                (updater.value().to_string(), written)
            };

            print_report(
                &UpdateReport {
                    kind: kind.to_string(),
                    path: updater.path().to_path_buf(),
                    requested: value.clone(),
                    effective,
                    written,
                },
                json,
            )
        }
        Some(("write-file", args)) => {
            let dir = args
                .get_one::<PathBuf>("dir")
                .context("missing --dir")?;
            let file = required(args, "file")?;
            let value = required(args, "value")?;

            let updater = new_common_default_updater(&env, file, dir.clone(), value);
            let written = updater
                .update()
                .with_context(|| format!("writing {}", updater.path().display()))?;

            print_report(
                &UpdateReport {
                    kind: updater.resource_type().to_string(),
                    path: updater.path().to_path_buf(),
                    requested: value.clone(),
                    effective: value.clone(),
                    written,
                },
                json,
            )
        }
        Some(("kinds", _)) => {
            let factory = UpdaterFactory::with_defaults(env);
            let kinds: Vec<String> = factory.kinds().iter().map(ToString::to_string).collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&kinds)?);
            } else {
                for kind in kinds {
                    println!("{kind}");
                }
            }
            Ok(())
        }
        Some((other, _)) => anyhow::bail!("unknown subcommand {other}"),
        None => anyhow::bail!("no subcommand given"),
    }
}

fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("verbose"));

    match run(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn cli_parses_update() {
        let matches = cli()
            .try_get_matches_from([
                "rexctl",
                "--cgroup-root",
                "/tmp/cg",
                "update",
                "--kind",
                "memory.min",
                "--parent",
                "kubepods",
                "--value",
                "100",
                "--merge",
            ])
            .unwrap();

        let config = load_config(&matches).unwrap();
        assert_eq!(config.cgroup_root, PathBuf::from("/tmp/cg"));

        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "update");
        assert_eq!(required(args, "kind").unwrap(), "memory.min");
        assert!(args.get_flag("merge"));
    }

    #[test]
    fn cli_requires_subcommand() {
        assert!(cli().try_get_matches_from(["rexctl"]).is_err());
    }
}
