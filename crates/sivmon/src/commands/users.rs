//! User directory handlers.

use tabled::Tabled;

use sivmon_config::Config;
use sivmon_core::{IncidentBoard, SivClient, User};

use crate::cli::{GlobalOpts, UsersArgs, UsersCommand};
use crate::error::CliError;
use crate::output;

use super::util::Render;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct UserRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Username")]
    username: String,
    #[tabled(rename = "Role")]
    role: String,
}

impl From<&User> for UserRow {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            role: u.role.to_string(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    args: UsersArgs,
    cfg: &Config,
    client: SivClient,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let render = Render::new(global, cfg);

    match args.command {
        UsersCommand::List => {
            let board = IncidentBoard::new(&cfg.to_monitor_config()?, client)?;
            let users = board.refresh_users().await?;
            let out = output::render_list(
                &render.format,
                &users,
                |u| UserRow::from(u),
                |u| u.username.clone(),
            )?;
            output::print_output(&out, render.quiet);
            Ok(())
        }
    }
}
