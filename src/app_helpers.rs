use std::{env, path::PathBuf};

use crate::{
    logging::{log_message, DesktopLogCategory},
    DIAGNOSTIC_ENV_VARS, INITIAL_PROJECT_ENV, INITIAL_WORKING_DIR_ENV,
};

pub fn append_desktop_log(message: &str) {
    log_message(DesktopLogCategory::Runtime, message);
}

pub fn append_startup_log(message: &str) {
    log_message(DesktopLogCategory::Startup, message);
}

pub fn append_restart_log(message: &str) {
    log_message(DesktopLogCategory::Restart, message);
}

pub fn append_shutdown_log(message: &str) {
    log_message(DesktopLogCategory::Shutdown, message);
}

pub fn build_debug_command(program: &str, args: &[String]) -> String {
    let parts = std::iter::once(program).chain(args.iter().map(String::as_str));
    shlex::try_join(parts.clone())
        .unwrap_or_else(|_| parts.collect::<Vec<_>>().join(" "))
}

/// Expands a leading `~` against the user's home directory.
pub fn expand_home_path(raw: &str) -> PathBuf {
    let rest = if raw == "~" {
        Some("")
    } else {
        raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\"))
    };
    match (rest, home::home_dir()) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}

pub fn log_session_environment() {
    for key in DIAGNOSTIC_ENV_VARS {
        let value = env::var(key).unwrap_or_else(|_| "(unset)".to_string());
        append_startup_log(&format!("{key}={value}"));
    }
}

/// Turns `--project <path>` and `--working-dir <dir>` from the shell's own
/// command line into environment for the session process.
pub fn session_env_from_args<I>(args: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = String>,
{
    let mut env = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let key = match arg.as_str() {
            "--project" => INITIAL_PROJECT_ENV,
            "--working-dir" => INITIAL_WORKING_DIR_ENV,
            _ => continue,
        };
        match args.next() {
            Some(value) if !value.trim().is_empty() => {
                env.push((key.to_string(), expand_home_path(&value).to_string_lossy().into_owned()))
            }
            _ => append_startup_log(&format!("ignoring {arg} without a value")),
        }
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn build_debug_command_quotes_arguments_with_spaces() {
        let command = build_debug_command(
            "/opt/workbench/rsession",
            &strings(&["--config-file", "/tmp/my conf", "--www-port", "8787"]),
        );
        assert!(command.starts_with("/opt/workbench/rsession --config-file "));
        assert!(command.contains("'/tmp/my conf'"));
        assert!(command.ends_with("--www-port 8787"));
    }

    #[test]
    fn expand_home_path_only_touches_leading_tilde() {
        let home = home::home_dir().expect("home dir");
        assert_eq!(expand_home_path("~"), home);
        assert_eq!(expand_home_path("~/projects"), home.join("projects"));
        assert_eq!(expand_home_path("/tmp/~/x"), PathBuf::from("/tmp/~/x"));
        assert_eq!(expand_home_path("~other"), PathBuf::from("~other"));
    }

    #[test]
    fn session_env_from_args_maps_project_and_working_dir() {
        let env = session_env_from_args(strings(&[
            "workbench",
            "--project",
            "/work/survey.Rproj",
            "--verbose",
            "--working-dir",
            "/work",
        ]));
        assert_eq!(
            env,
            vec![
                (
                    INITIAL_PROJECT_ENV.to_string(),
                    "/work/survey.Rproj".to_string()
                ),
                (INITIAL_WORKING_DIR_ENV.to_string(), "/work".to_string()),
            ]
        );
    }

    #[test]
    fn session_env_from_args_skips_dangling_flag() {
        assert!(session_env_from_args(strings(&["workbench", "--project"])).is_empty());
    }
}
