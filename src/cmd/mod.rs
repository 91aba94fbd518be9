//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled                                  |
//! |------------|---------------------------------------------------|
//! | `project`  | `Init`, `Start`, `Abort`                          |
//! | `phase`    | `Status`, `CompletePhase`                         |
//! | `tasks`    | `Tasks`, `Dispatch`, `RecordCompletion`           |
//! | `review`   | `Review`, `SpecCheck`                             |
//! | `wave`     | `Wave`                                            |
//! | `hook`     | `Hook`                                            |
//! | `config`   | `Config`                                          |

pub mod config;
pub mod hook;
pub mod phase;
pub mod project;
pub mod review;
pub mod tasks;
pub mod wave;

pub use config::cmd_config;
pub use hook::cmd_hook;
pub use phase::{cmd_complete_phase, cmd_status};
pub use project::{cmd_abort, cmd_init, cmd_start};
pub use review::{cmd_review, cmd_spec_check};
pub use tasks::{cmd_dispatch, cmd_record_completion, cmd_tasks_load};
pub use wave::{cmd_wave_advance, cmd_wave_check};

use anyhow::Result;
use conductor::config::Config;
use conductor::errors::StoreError;
use conductor::state::{StateStore, TaskGraph};

/// Latest snapshot, or an error telling the user to start a workflow.
fn require_graph(store: &StateStore) -> Result<TaskGraph> {
    store.load()?.ok_or_else(|| {
        StoreError::NoActiveWorkflow {
            path: store.path().to_path_buf(),
        }
        .into()
    })
}

fn open_store(config: &Config) -> StateStore {
    StateStore::for_project(config)
}
