use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use hotswap_kernel::test_harness::{run_simulator, SimulatorConfig, TestHarness};
use hotswap_kernel::{RuntimeConfig, UpgradeLog};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("hotswap-kernel")
        .version(hotswap_kernel::VERSION)
        .about("Upgradeable dispatch runtime")
        .subcommand_required(true)
        .subcommand(
            Command::new("simulate")
                .about("Run the invariant simulator")
                .arg(
                    Arg::new("operations")
                        .long("ops")
                        .default_value("10000")
                        .value_parser(value_parser!(u64))
                        .help("Number of operations to simulate"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("followers")
                        .long("followers")
                        .default_value("3")
                        .value_parser(value_parser!(usize))
                        .help("Dispatchers following the shared beacon"),
                )
                .arg(
                    Arg::new("stop-on-violation")
                        .long("stop-on-violation")
                        .action(ArgAction::SetTrue)
                        .help("Stop simulation on first violation"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("certify")
                .about("Run the simulator across many seeds")
                .arg(
                    Arg::new("seeds")
                        .long("seeds")
                        .default_value("10")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("operations")
                        .long("ops")
                        .default_value("5000")
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("validate-log")
                .about("Verify the hash chain of an exported upgrade log")
                .arg(
                    Arg::new("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Load, validate and print a runtime configuration")
                .arg(
                    Arg::new("path")
                        .help("TOML file; defaults are printed when omitted")
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let config = SimulatorConfig {
                seed: args.get_one::<u64>("seed").copied().unwrap_or(42),
                total_operations: args.get_one::<u64>("operations").copied().unwrap_or(10_000),
                beacon_followers: args.get_one::<usize>("followers").copied().unwrap_or(3),
                stop_on_first_violation: args.get_flag("stop-on-violation"),
            };
            let report = run_simulator(config)?;

            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.generate_text());
            }
            if !report.passed() {
                bail!("{} violation(s) found", report.violations.len());
            }
        }
        Some(("certify", args)) => {
            let seeds = args.get_one::<u64>("seeds").copied().unwrap_or(10);
            let operations = args.get_one::<u64>("operations").copied().unwrap_or(5_000);

            let report = TestHarness::run_certification(seeds, operations)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.passed {
                bail!("certification failed for seeds {:?}", report.failed_seeds);
            }
        }
        Some(("validate-log", args)) => {
            let path = args
                .get_one::<PathBuf>("path")
                .context("missing log path")?;
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let log: UpgradeLog = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;

            log.verify_integrity()?;
            println!("Log integrity: VALID");
            println!("Records checked: {}", log.len());
        }
        Some(("config", args)) => {
            let config = match args.get_one::<PathBuf>("path") {
                Some(path) => RuntimeConfig::from_file(path)?,
                None => RuntimeConfig::default(),
            };
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        _ => unreachable!("subcommand_required"),
    }

    Ok(())
}
