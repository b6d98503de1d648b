// Startup configuration: command-line flags with environment fallbacks

use clap::Parser;
use hard_chat_engine::settings::{
    DEFAULT_MAX_INPUT_TOKENS, DEFAULT_MAX_NEW_TOKENS, DEFAULT_MODEL_PATH, DEFAULT_SYSTEM_PROMPT,
};
use hard_chat_engine::{ChatSettings, SettingsError};
use log::LevelFilter;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

pub const DEFAULT_HOST_FILE: &str = "/run/alexon/env/host";
pub const DEFAULT_PORT: u16 = 7860;
pub const DEFAULT_QUEUE_SIZE: usize = 20;
const FALLBACK_HOST: &str = "0.0.0.0";

#[derive(Debug, Parser)]
#[command(name = "hard_chat_web", version, about = "Streaming Llama 3 chat server")]
pub struct Cli {
    /// GGUF model file
    #[arg(long, env = "CHAT_MODEL_PATH", default_value = DEFAULT_MODEL_PATH)]
    pub model_path: PathBuf,

    /// Maximum prompt length in tokens
    #[arg(long, env = "CHAT_MAX_INPUT", default_value_t = DEFAULT_MAX_INPUT_TOKENS)]
    pub max_input: usize,

    /// Upper bound for max_new_tokens per request
    #[arg(long, env = "CHAT_MAX_NEW_TOKENS", default_value_t = DEFAULT_MAX_NEW_TOKENS)]
    pub max_new_tokens: u32,

    /// Default system prompt
    #[arg(long, env = "CHAT_PROMPT")]
    pub system_prompt: Option<String>,

    /// llama context size (defaults to max input + max new tokens)
    #[arg(long, env = "CHAT_CONTEXT_SIZE")]
    pub context_size: Option<u32>,

    #[arg(long, env = "CHAT_GPU_LAYERS", default_value_t = 0)]
    pub gpu_layers: u32,

    /// Replay earlier turns into the prompt
    #[arg(long, env = "CHAT_INCLUDE_HISTORY")]
    pub include_history: bool,

    /// Bind address when the host file is absent or empty
    #[arg(long, env = "DOMAIN_NAME")]
    pub host: Option<String>,

    /// File whose contents override the bind host
    #[arg(long, env = "CHAT_HOST_FILE", default_value = DEFAULT_HOST_FILE)]
    pub host_file: PathBuf,

    #[arg(long, env = "CHAT_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Pending turns accepted before new ones get 503
    #[arg(long, env = "CHAT_QUEUE_SIZE", default_value_t = DEFAULT_QUEUE_SIZE)]
    pub queue_size: usize,

    #[arg(long, env = "CHAT_LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    #[arg(long, env = "CHAT_LOG_LEVEL", default_value = "info", value_parser = parse_level)]
    pub log_level: LevelFilter,
}

fn parse_level(s: &str) -> Result<LevelFilter, String> {
    s.parse()
        .map_err(|_| format!("unknown log level `{s}` (off, error, warn, info, debug, trace)"))
}

/// Transport-side settings. Nothing here reaches the chat engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub queue_size: usize,
    pub log_dir: PathBuf,
    pub log_level: LevelFilter,
}

impl ServerSettings {
    /// Socket address to bind. Hostnames that are not IP literals fall back to all interfaces.
    pub fn bind_addr(&self) -> SocketAddr {
        let ip = self.host.parse::<IpAddr>().unwrap_or_else(|_| {
            log::warn!("Host `{}` is not an IP address, binding 0.0.0.0", self.host);
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        });
        SocketAddr::new(ip, self.port)
    }
}

impl Cli {
    /// Split into engine and server settings, rejecting unusable values.
    pub fn into_settings(self) -> Result<(ChatSettings, ServerSettings), SettingsError> {
        if self.queue_size == 0 {
            return Err(SettingsError::Zero("queue_size"));
        }

        let host = resolve_host(&self.host_file, self.host.as_deref());
        let default_system_prompt = self
            .system_prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        let chat = ChatSettings {
            model_path: self.model_path,
            max_input_tokens: self.max_input,
            max_new_tokens_ceiling: self.max_new_tokens,
            default_system_prompt,
            include_history: self.include_history,
            context_size: self.context_size,
            gpu_layers: self.gpu_layers,
        };
        chat.validate()?;

        let server = ServerSettings {
            host,
            port: self.port,
            queue_size: self.queue_size,
            log_dir: self.log_dir,
            log_level: self.log_level,
        };
        Ok((chat, server))
    }
}

/// Host file contents win, then the configured host, then all interfaces.
pub fn resolve_host(host_file: &Path, configured: Option<&str>) -> String {
    if let Ok(contents) = std::fs::read_to_string(host_file) {
        let trimmed = contents.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    configured
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or(FALLBACK_HOST)
        .to_string()
}
