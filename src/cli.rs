//! Minimal CLI parsing and one-shot command execution.

use std::env;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::json;
use uuid::Uuid;

use crate::app::AppState;
use crate::db::{MediaItemFilter, MediaItemOrder};
use crate::services::{MediaAction, TaskState};

const DEFAULT_PAGE_SIZE: i64 = 50;

pub const USAGE: &str = "\
Usage: mediawarden [COMMAND]

Commands:
  serve                         Run scheduled jobs until interrupted (default)
  libraries                     List configured libraries
  items <library-id> [--missing|--present] [--trashed|--live]
        [--sort path|name|size|modified|watched] [--limit N] [--offset N]
                                List one page of a library's items
  scan <library-id>             Scan a library now
  sync <library-id>             Sync torrent attribution for a library now
  clear-missing <library-id>    Delete missing items of a library
  purge                         Purge expired trash entries
  trash <media-item-id>         Move a media item to the trash
  restore <trash-entry-id>      Restore a trash entry
  restore-all <library-id>      Restore every trashed item of a library
  purge-all <library-id>        Purge every trashed item of a library now
  action <media-item-id> <media_only|torrent_only|both> [--dry-run]
                                Plan or execute a media action
  help                          Show this message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Serve,
    Libraries,
    Items {
        library_id: Uuid,
        filter: MediaItemFilter,
        order: MediaItemOrder,
        limit: i64,
        offset: i64,
    },
    Scan(Uuid),
    Sync(Uuid),
    ClearMissing(Uuid),
    Purge,
    Trash(Uuid),
    Restore(Uuid),
    RestoreAll(Uuid),
    PurgeAll(Uuid),
    Action {
        media_item_id: Uuid,
        action: MediaAction,
        dry_run: bool,
    },
    Help,
}

#[derive(Debug)]
pub struct CliOptions {
    pub command: Command,
}

impl CliOptions {
    pub fn from_args() -> Result<Self> {
        Self::parse(env::args().skip(1))
    }

    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let Some(name) = args.next() else {
            return Ok(Self { command: Command::Serve });
        };

        let mut id = |what: &str| -> Result<Uuid> {
            let raw = args
                .next()
                .ok_or_else(|| anyhow!("Missing {} for '{}'\n\n{}", what, name, USAGE))?;
            Uuid::parse_str(&raw).with_context(|| format!("Invalid {} '{}'", what, raw))
        };

        let command = match name.as_str() {
            "serve" => Command::Serve,
            "libraries" => Command::Libraries,
            "scan" => Command::Scan(id("library id")?),
            "sync" => Command::Sync(id("library id")?),
            "clear-missing" => Command::ClearMissing(id("library id")?),
            "purge" => Command::Purge,
            "trash" => Command::Trash(id("media item id")?),
            "restore" => Command::Restore(id("trash entry id")?),
            "restore-all" => Command::RestoreAll(id("library id")?),
            "purge-all" => Command::PurgeAll(id("library id")?),
            "items" => {
                let library_id = id("library id")?;
                parse_items(library_id, args)?
            }
            "action" => {
                let media_item_id = id("media item id")?;
                let action = args
                    .next()
                    .ok_or_else(|| anyhow!("Missing action for 'action'\n\n{}", USAGE))?
                    .parse::<MediaAction>()?;
                let dry_run = args.any(|a| a == "--dry-run");
                Command::Action {
                    media_item_id,
                    action,
                    dry_run,
                }
            }
            "help" | "--help" | "-h" => Command::Help,
            other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
        };

        Ok(Self { command })
    }
}

fn parse_items(library_id: Uuid, mut args: impl Iterator<Item = String>) -> Result<Command> {
    let mut filter = MediaItemFilter::default();
    let mut order = MediaItemOrder::default();
    let mut limit = DEFAULT_PAGE_SIZE;
    let mut offset = 0;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--missing" => filter.is_missing = Some(true),
            "--present" => filter.is_missing = Some(false),
            "--trashed" => filter.is_in_trash = Some(true),
            "--live" => filter.is_in_trash = Some(false),
            "--sort" => {
                let value = args.next().context("--sort requires a value")?;
                order = parse_order(&value)?;
            }
            "--limit" => {
                let value = args.next().context("--limit requires a value")?;
                limit = value
                    .parse::<i64>()
                    .ok()
                    .filter(|n| *n > 0)
                    .with_context(|| format!("Invalid limit '{}'", value))?;
            }
            "--offset" => {
                let value = args.next().context("--offset requires a value")?;
                offset = value
                    .parse::<i64>()
                    .ok()
                    .filter(|n| *n >= 0)
                    .with_context(|| format!("Invalid offset '{}'", value))?;
            }
            other => bail!("Unknown option '{}' for 'items'", other),
        }
    }

    Ok(Command::Items {
        library_id,
        filter,
        order,
        limit,
        offset,
    })
}

fn parse_order(value: &str) -> Result<MediaItemOrder> {
    Ok(match value {
        "path" => MediaItemOrder::Path,
        "name" => MediaItemOrder::Name,
        "size" => MediaItemOrder::SizeDesc,
        "modified" => MediaItemOrder::ModifiedDesc,
        "watched" => MediaItemOrder::LastWatchedAsc,
        other => bail!("Unknown sort '{}'", other),
    })
}

/// Run a one-shot command and return its JSON output
pub async fn run_command(state: &AppState, command: &Command) -> Result<serde_json::Value> {
    let output = match command {
        Command::Serve | Command::Help => bail!("'{:?}' is not a one-shot command", command),
        Command::Libraries => serde_json::to_value(state.db.libraries().list().await?)?,
        Command::Items {
            library_id,
            filter,
            order,
            limit,
            offset,
        } => {
            let media_items = state.db.media_items();
            let items = media_items
                .list_page(*library_id, *filter, *order, *limit, *offset)
                .await?;
            let total = media_items.count(*library_id, *filter).await?;
            json!({ "total": total, "limit": limit, "offset": offset, "items": items })
        }
        Command::Scan(library_id) => {
            let status = state
                .tasks
                .run_scan(*library_id)
                .await
                .context("A scan is already running for this library")?;
            ensure_done(&status.state, status.error.as_deref())?;
            serde_json::to_value(status)?
        }
        Command::Sync(library_id) => {
            let status = state
                .tasks
                .run_torrent_sync(*library_id)
                .await
                .context("A torrent sync is already running for this library")?;
            ensure_done(&status.state, status.error.as_deref())?;
            json!({ "updated": status.updated_count })
        }
        Command::ClearMissing(library_id) => {
            let deleted = state.db.media_items().clear_missing(*library_id).await?;
            json!({ "deleted": deleted })
        }
        Command::Purge => serde_json::to_value(state.trash.purge_expired().await?)?,
        Command::Trash(media_item_id) => {
            serde_json::to_value(state.trash.move_to_trash(*media_item_id).await?)?
        }
        Command::Restore(entry_id) => {
            let restored_path = state.trash.restore(*entry_id).await?;
            json!({ "restored": true, "restored_path": restored_path })
        }
        Command::RestoreAll(library_id) => {
            serde_json::to_value(state.trash.restore_all(*library_id).await?)?
        }
        Command::PurgeAll(library_id) => {
            serde_json::to_value(state.trash.purge_all(*library_id).await?)?
        }
        Command::Action {
            media_item_id,
            action,
            dry_run: true,
        } => serde_json::to_value(state.actions.plan(*media_item_id, *action).await?)?,
        Command::Action {
            media_item_id,
            action,
            dry_run: false,
        } => serde_json::to_value(state.actions.execute(*media_item_id, *action).await?)?,
    };

    Ok(output)
}

fn ensure_done(state: &TaskState, error: Option<&str>) -> Result<()> {
    match state {
        TaskState::Error => bail!("{}", error.unwrap_or("task failed")),
        _ => Ok(()),
    }
}
