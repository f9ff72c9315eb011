//! Command dispatch: bridges CLI args -> core controllers -> output formatting.

pub mod cameras;
pub mod config_cmd;
pub mod incidents;
pub mod users;
pub mod util;
pub mod watch;

use sivmon_config::Config;
use sivmon_core::SivClient;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a backend-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    cfg: &Config,
    client: SivClient,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(args, cfg, client, global).await,
        Command::Cameras(args) => cameras::handle(args, cfg, client, global).await,
        Command::Incidents(args) => incidents::handle(args, cfg, client, global).await,
        Command::Users(args) => users::handle(args, cfg, client, global).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "config and completions are handled before dispatch".into(),
        )),
    }
}
