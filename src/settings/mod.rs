//! 호스트 프로세스 설정입니다. TOML 파일 또는 `MESH_*` 환경 변수에서 읽습니다.

use std::{env, path::{Path, PathBuf}};

use serde::Deserialize;
use tracing::debug;

mod error;
pub mod logging;

pub use error::SettingsError;
pub use logging::{LogFormat, LogOutput, LogSettings};

pub type Result<T> = std::result::Result<T, SettingsError>;

pub fn parse_env_var<T: std::str::FromStr, F: FnOnce() -> T>(name: &str, default: F) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val.parse().map_err(|e: T::Err| SettingsError::EnvVarInvalid {
            var_name: name.to_string(),
            value: val,
            reason: e.to_string(),
        }),
        Err(env::VarError::NotPresent) => Ok(default()),
        Err(e) => Err(SettingsError::EnvVarInvalid {
            var_name: name.to_string(),
            value: "".to_string(),
            reason: e.to_string(),
        }),
    }
}

fn default_watch() -> bool {
    true
}

/// 메시 구성 파일 위치와 감시 여부
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConfigFileSettings {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_watch")]
    pub watch: bool,
}

impl Default for ConfigFileSettings {
    fn default() -> Self {
        Self {
            path: None,
            watch: default_watch(),
        }
    }
}

impl ConfigFileSettings {
    pub fn from_env() -> Result<Self> {
        let path = match env::var("MESH_CONFIG_FILE") {
            Ok(value) if value.trim().is_empty() => {
                return Err(SettingsError::EnvVarInvalid {
                    var_name: "MESH_CONFIG_FILE".to_string(),
                    value,
                    reason: "경로가 비어 있음".to_string(),
                })
            }
            Ok(value) => Some(PathBuf::from(value)),
            Err(_) => None,
        };

        Ok(Self {
            path,
            watch: parse_env_var("MESH_CONFIG_WATCH", default_watch)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Settings {
    // 로깅 설정
    #[serde(default)]
    pub logging: LogSettings,

    // 메시 구성 파일
    #[serde(default)]
    pub config: ConfigFileSettings,
}

impl Settings {
    pub async fn load() -> Result<Self> {
        if let Ok(settings_path) = env::var("MESH_SETTINGS_FILE") {
            Self::from_toml_file(&settings_path).await
        } else {
            Self::from_env().await
        }
    }

    pub async fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| SettingsError::FileError {
            path: path.as_ref().to_string_lossy().to_string(),
            error: e,
        })?;

        let settings: Self = toml::from_str(&content)
            .map_err(|e| SettingsError::ParseError { source: e })?;

        settings.validate()?;
        debug!(path = %path.as_ref().display(), "TOML 설정 로드 완료");
        Ok(settings)
    }

    pub async fn from_env() -> Result<Self> {
        let settings = Self {
            logging: LogSettings::from_env()?,
            config: ConfigFileSettings::from_env()?,
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.config.path {
            if path.as_os_str().is_empty() {
                return Err(SettingsError::InvalidConfig("구성 파일 경로가 비어 있음".to_string()));
            }
        }
        if self.config.watch && self.config.path.is_none() {
            debug!("구성 파일이 지정되지 않아 감시는 사용되지 않음");
        }
        Ok(())
    }
}
