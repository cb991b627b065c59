#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app_constants;
mod app_helpers;
mod app_runtime;
mod app_types;
mod desktop_bridge;
mod desktop_bridge_commands;
mod desktop_options;
mod error;
mod error_page;
mod fonts;
mod ipc_dispatch;
mod ipc_message;
mod launch_context;
mod logging;
mod main_window;
mod native_services;
mod page_bridge;
mod pending_quit;
mod reachability;
mod runtime_paths;
mod session_launcher;
mod session_process;
mod session_status;
mod shell_host;
mod window_actions;
mod window_registry;

pub(crate) use app_constants::*;
pub(crate) use app_helpers::{
    append_desktop_log, append_restart_log, append_shutdown_log, append_startup_log,
    build_debug_command,
};
pub(crate) use app_types::DesktopState;

fn main() {
    app_runtime::run();
}
