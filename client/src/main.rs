mod shell;

use std::{
    fs, io,
    path::PathBuf,
    process::ExitCode,
};

use clap::Parser;
use directories::ProjectDirs;
use executor::{Executor, ExecutorError};
use log::{error, info};
use thiserror::Error;

use crate::shell::Shell;

const APPLICATION_NAME: &str = "jsondb";

#[derive(Parser)]
#[command(name = APPLICATION_NAME)]
#[command(about = "Executes JSON statements against a local data directory", long_about = None)]
struct Args {
    /// Directory holding the catalog and row files, created if missing.
    /// Defaults to the platform data directory.
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Single statement to execute. Without it statements are read from stdin, one per line.
    #[arg(short, long)]
    query: Option<String>,

    /// Print all tables with their columns and exit
    #[arg(long)]
    list_tables: bool,
}

#[derive(Debug, Error)]
enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("no valid data directory found, use --data-dir")]
    NoDataDirectory,

    #[error("cannot open data directory: {0}")]
    Executor(#[from] ExecutorError),

    #[error("{0} statements failed")]
    StatementsFailed(usize),
}

fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), ClientError> {
    let data_dir = match args.data_dir {
        Some(data_dir) => data_dir,
        None => default_data_dir()?,
    };
    fs::create_dir_all(&data_dir)?;
    info!("using data directory {}", data_dir.display());

    let executor = Executor::open(&data_dir)?;
    let shell = Shell::new(&executor);
    let stdout = io::stdout().lock();

    if args.list_tables {
        shell.list_tables(stdout)?;
        return Ok(());
    }

    let failed = match args.query {
        Some(query) => usize::from(!shell.execute_line(&query, stdout)?),
        None => shell.run(io::stdin().lock(), stdout)?,
    };
    match failed {
        0 => Ok(()),
        n => Err(ClientError::StatementsFailed(n)),
    }
}

fn default_data_dir() -> Result<PathBuf, ClientError> {
    match ProjectDirs::from("", "", APPLICATION_NAME) {
        None => Err(ClientError::NoDataDirectory),
        Some(project_dir) => Ok(project_dir.data_local_dir().to_path_buf()),
    }
}
