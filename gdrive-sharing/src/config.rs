use crate::batch::DEFAULT_BATCH_CAPACITY;
use crate::orchestrator::EngineSettings;
use crate::permissions::DEFAULT_PAGE_SIZE;

pub const DEFAULT_FOLDER: &str = "WE Bots";

/// Settings read from the environment. Command-line flags are applied on
/// top by the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub default_folder: String,
    pub engine: EngineSettings,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthConfig {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_base: Option<String>,
    pub oauth_base: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<L>(lookup: L) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        let default_folder = read_string_env(&lookup, "GDRIVE_DEFAULT_FOLDER")
            .unwrap_or_else(|| DEFAULT_FOLDER.to_string());
        let batch_capacity = read_u64_env(
            &lookup,
            "GDRIVE_BATCH_CAPACITY",
            DEFAULT_BATCH_CAPACITY as u64,
        );
        let page_size = read_u64_env(&lookup, "GDRIVE_PAGE_SIZE", u64::from(DEFAULT_PAGE_SIZE));
        let engine = EngineSettings {
            batch_capacity: usize::try_from(batch_capacity).unwrap_or(DEFAULT_BATCH_CAPACITY),
            page_size: u32::try_from(page_size).unwrap_or(DEFAULT_PAGE_SIZE),
        };
        let auth = AuthConfig {
            access_token: read_string_env(&lookup, "GDRIVE_TOKEN"),
            refresh_token: read_string_env(&lookup, "GDRIVE_REFRESH_TOKEN"),
            client_id: read_string_env(&lookup, "GDRIVE_CLIENT_ID"),
            client_secret: read_string_env(&lookup, "GDRIVE_CLIENT_SECRET"),
            api_base: read_string_env(&lookup, "GDRIVE_API_BASE"),
            oauth_base: read_string_env(&lookup, "GDRIVE_OAUTH_BASE"),
        };
        Self {
            default_folder,
            engine,
            auth,
        }
    }
}

fn read_string_env<L>(lookup: &L, name: &str) -> Option<String>
where
    L: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_u64_env<L>(lookup: &L, name: &str, default: u64) -> u64
where
    L: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
