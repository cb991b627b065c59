use std::time::Duration;

pub const APP_NAME: &str = "Workbench";
pub const MAIN_WINDOW_LABEL: &str = "main";
pub const DEFAULT_SESSION_HOST: &str = "127.0.0.1";
pub const LOADING_PAGE: &str = "loading.html";
pub const CONNECT_ERROR_PAGE: &str = "connect.html";

pub const DESKTOP_ROOT_ENV: &str = "WORKBENCH_DESKTOP_ROOT";
pub const DESKTOP_LOG_FILTER_ENV: &str = "WORKBENCH_DESKTOP_LOG";
pub const SESSION_PATH_ENV: &str = "WORKBENCH_SESSION_PATH";
pub const CONFIG_FILE_ENV: &str = "WORKBENCH_CONFIG_FILE";
pub const SESSION_ARGS_ENV: &str = "WORKBENCH_SESSION_ARGS";

// Contract with the session server.
pub const SHARED_SECRET_ENV: &str = "RS_SHARED_SECRET";
pub const SHARED_SECRET_HEADER: &str = "X-Shared-Secret";
pub const SESSION_HOME_ENV: &str = "R_HOME";
pub const INITIAL_PROJECT_ENV: &str = "RS_INITIAL_PROJECT";
pub const INITIAL_WORKING_DIR_ENV: &str = "RS_INITIAL_WD";

pub const DIAGNOSTIC_ENV_VARS: &[&str] = &[
    "R_HOME",
    "R_DOC_DIR",
    "R_INCLUDE_DIR",
    "R_SHARE_DIR",
    "R_LIBS",
    "R_LIBS_USER",
    "DYLD_LIBRARY_PATH",
    "DYLD_FALLBACK_LIBRARY_PATH",
    "LD_LIBRARY_PATH",
    "PATH",
    "HOME",
];

pub const DESKTOP_LOG_FILE: &str = "desktop.log";
pub const DESKTOP_LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
pub const LOG_BACKUP_COUNT: usize = 5;

pub const EXIT_FAILURE: i32 = 1;
pub const STDERR_TAIL_LINES: usize = 50;
pub const QUIT_HOOK_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const SESSION_KILL_TIMEOUT: Duration = Duration::from_secs(3);
pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub const BLANK_WINDOW_NAME: &str = "_blank";
pub const ZOOM_WINDOW_NAME: &str = "_workbench_zoom";
