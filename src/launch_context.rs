//! Builds the command line and URL for each session launch.

use std::{io, net::TcpListener, path::PathBuf};

use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchContext {
    pub host: String,
    pub port: u16,
    pub url: String,
    pub args: Vec<String>,
}

pub trait PortAllocator {
    fn allocate(&mut self, host: &str) -> io::Result<u16>;
}

/// Asks the OS for a free port by binding port 0 and releasing it again.
#[derive(Debug, Default)]
pub struct EphemeralPortAllocator;

impl PortAllocator for EphemeralPortAllocator {
    fn allocate(&mut self, host: &str) -> io::Result<u16> {
        let listener = TcpListener::bind((host, 0))?;
        Ok(listener.local_addr()?.port())
    }
}

pub fn generate_launcher_token() -> String {
    let mut token = uuid::Uuid::new_v4().simple().to_string();
    token.truncate(8);
    token
}

pub struct LaunchContextBuilder<P> {
    host: String,
    config_file: Option<PathBuf>,
    extra_args: Vec<String>,
    launcher_token: String,
    port: Option<u16>,
    ports: P,
}

impl<P: PortAllocator> LaunchContextBuilder<P> {
    pub fn new(
        host: impl Into<String>,
        config_file: Option<PathBuf>,
        extra_args: Vec<String>,
        ports: P,
    ) -> Self {
        Self {
            host: host.into(),
            config_file,
            extra_args,
            launcher_token: generate_launcher_token(),
            port: None,
            ports,
        }
    }

    pub fn launcher_token(&self) -> &str {
        &self.launcher_token
    }

    #[cfg(test)]
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Produces the context for the next launch. The previous port is kept
    /// when `reuse_port` is set and one was already allocated.
    pub fn build(&mut self, reuse_port: bool) -> Result<LaunchContext, SessionError> {
        let port = match self.port {
            Some(port) if reuse_port => port,
            _ => self
                .ports
                .allocate(&self.host)
                .map_err(SessionError::PortAllocation)?,
        };
        self.port = Some(port);

        let config_file = self
            .config_file
            .as_ref()
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|| "none".to_string());

        let mut args = vec![
            "--config-file".to_string(),
            config_file,
            "--program-mode".to_string(),
            "desktop".to_string(),
            "--www-port".to_string(),
            port.to_string(),
            "--launcher-token".to_string(),
            self.launcher_token.clone(),
        ];
        args.extend(self.extra_args.iter().cloned());

        Ok(LaunchContext {
            host: self.host.clone(),
            port,
            url: format!("http://{}:{}", self.host, port),
            args,
        })
    }
}
