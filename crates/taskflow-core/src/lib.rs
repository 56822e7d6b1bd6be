pub mod board;
pub mod calendar;
pub mod config;
pub mod datetime;
pub mod error;
pub mod filter;
pub mod logging;
pub mod mutator;
pub mod stats;
pub mod storage;
pub mod store;
pub mod task;

use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use tracing::info;

pub use board::{ActiveView, PriorityRow, StatusRow, TaskBoard};
pub use error::TaskError;
pub use filter::{FilterState, PriorityFilter, StatusFilter};
pub use mutator::TaskInput;
pub use stats::TaskStats;
pub use storage::{FileStorage, KeyValueStore, MemoryStorage};
pub use store::TaskStore;
pub use task::{Priority, StoredEntry, Task, TaskId};

/// Startup path: config, logging, data directory, then the persisted board.
#[tracing::instrument(skip_all)]
pub fn open_board(
  config_override: Option<&Path>
) -> anyhow::Result<TaskBoard<FileStorage>> {
  let cfg = config::Config::load(
    config_override
  )?;
  logging::init_tracing(
    cfg.log_level.as_deref()
  )?;

  let data_dir =
    config::resolve_data_dir(&cfg)
      .context(
        "failed to resolve data \
         directory"
      )?;
  let storage =
    FileStorage::open(&data_dir)
      .with_context(|| {
        format!(
          "failed to open storage at \
           {}",
          data_dir.display()
        )
      })?;

  let board = TaskBoard::open(
    storage,
    &cfg,
    Utc::now()
  );
  info!(
    tasks = board.entries().len(),
    timezone = %board.timezone(),
    "board ready"
  );
  Ok(board)
}
