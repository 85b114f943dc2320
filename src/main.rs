//! Binary entry point for the `otc-machine` CLI.

mod cli;

use std::fmt::Display;
use std::io::{self, Write};
use std::process;

use clap::{ArgMatches, FromArgMatches};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use otc_machine::flags::{self, FlagKind};
use otc_machine::{
    CloudConnector, ConfigError, Driver, DriverConfig, DriverError, FileMachineStore,
    FlagValues, KeyStore, MachineStore, OtcConnector, RuntimeConfig, SshKeygenStore, StoreError,
};

use cli::{Cli, NAME_ARG};

const LOG_ENV: &str = "OTC_MACHINE_LOG";
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("machine store error: {0}")]
    Store(#[from] StoreError),
    #[error("machine {0} already exists")]
    AlreadyExists(String),
    #[error("invalid arguments: {0}")]
    Arguments(#[from] clap::Error),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let matches = cli::command().get_matches();
    let exit_code = match dispatch(&matches).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Collects driver flag values from parsed arguments. Values from the
/// subcommand's matches take precedence because global flags propagate there.
fn flag_values(matches: &ArgMatches) -> FlagValues {
    let scoped = matches.subcommand().map_or(matches, |(_, sub)| sub);
    let mut values = FlagValues::new();
    for spec in flags::CREATE_FLAGS {
        match spec.kind {
            FlagKind::Bool => values.set(spec.name, scoped.get_flag(spec.name)),
            FlagKind::Int => {
                if let Some(value) = scoped.get_one::<i64>(spec.name) {
                    values.set(spec.name, *value);
                }
            }
            FlagKind::Text => {
                if let Some(value) = scoped.get_one::<String>(spec.name) {
                    values.set(spec.name, value.as_str());
                }
            }
        }
    }
    values
}

async fn dispatch(matches: &ArgMatches) -> Result<(), CliError> {
    let command = Cli::from_arg_matches(matches)?;
    let name = matches
        .get_one::<String>(NAME_ARG)
        .map(String::as_str)
        .unwrap_or_default();
    let options = flag_values(matches);

    let runtime = RuntimeConfig::load_without_cli_args()?;
    let store = FileMachineStore::new(runtime.storage_path.as_str());
    let mut driver = Driver::new(
        name,
        store.machine_dir(name)?,
        OtcConnector::new(runtime.wait_policy()),
        SshKeygenStore::with_process_runner(),
    );

    if matches!(command, Cli::Create) {
        if store.exists(name)? {
            return Err(CliError::AlreadyExists(name.to_owned()));
        }
        driver.set_config_from_flags(&options)?;
        let outcome = driver.create().await;
        store.save(driver.record())?;
        return outcome.map_err(CliError::from);
    }

    let record = store.load(name)?;
    driver.restore(DriverConfig::bind(&options)?, record);
    run_existing(&mut driver, &store, command).await
}

async fn run_existing<C, K>(
    driver: &mut Driver<C, K>,
    store: &impl MachineStore,
    command: Cli,
) -> Result<(), CliError>
where
    C: CloudConnector,
    K: KeyStore,
{
    let outcome = match command {
        Cli::Create => Ok(()),
        Cli::Start => driver.start().await,
        Cli::Stop => driver.stop().await,
        Cli::Restart => driver.restart().await,
        Cli::Kill => driver.kill().await,
        Cli::Rm => {
            let outcome = driver.remove().await;
            if outcome.is_ok() {
                store.remove(driver.machine_name())?;
                return Ok(());
            }
            outcome
        }
        Cli::Status => {
            let state = driver.state().await?;
            return emit(&state);
        }
        Cli::Ip => {
            return emit(&driver.ip()?);
        }
        Cli::Url => {
            return emit(&driver.url().unwrap_or_default());
        }
        Cli::SshHostname => {
            return emit(&driver.ssh_hostname()?);
        }
    };
    store.save(driver.record())?;
    outcome.map_err(CliError::from)
}

fn emit(line: &impl Display) -> Result<(), CliError> {
    writeln!(io::stdout().lock(), "{line}")?;
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
