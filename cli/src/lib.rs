// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Command-line front end for the `cardamom-carddav` engine.

mod cli;
mod cmd_discover;
mod cmd_query;
mod cmd_sync;
mod config;
mod util;

pub use crate::cli::{Cli, Commands, run};
pub use crate::cmd_discover::CmdDiscover;
pub use crate::cmd_query::CmdQuery;
pub use crate::cmd_sync::{CmdSync, SyncState};
pub use crate::config::{Overrides, parse_config};
pub use crate::util::ArgOutputFormat;
