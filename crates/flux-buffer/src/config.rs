use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// 缓冲适配器的声明式配置。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 设备驱动通常以配置文件给出“缓冲多大、应答等多久”，而不是在代码里硬编码；
/// - 缺省值取自串口协议的常见取值：1 KiB 字节缓冲、64 条报文、2 秒应答超时。
///
/// ## 契约说明（What）
/// - 所有字段均可省略，省略时取 [`Default`]；未知字段视为配置错误；
/// - [`BufferConfig::validate`] 拒绝任何为 0 的容量或超时。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BufferConfig {
    /// 字节缓冲容量（字节）。
    pub data_capacity: usize,
    /// 报文缓冲容量（条）。
    pub message_capacity: usize,
    /// 字节流适配器等待首字节的上限（毫秒）。
    pub read_timeout_ms: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            data_capacity: 1024,
            message_capacity: 64,
            read_timeout_ms: 2_000,
        }
    }
}

/// 配置解析或校验失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse buffer config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid buffer config: {field} must be greater than zero")]
    Invalid { field: &'static str },
}

impl BufferConfig {
    /// 解析 TOML 文本并校验。
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: BufferConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "data_capacity",
            });
        }
        if self.message_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "message_capacity",
            });
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "read_timeout_ms",
            });
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = BufferConfig::from_toml_str("").expect("空配置应全部取缺省值");
        assert_eq!(config, BufferConfig::default());
        assert_eq!(config.read_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config = BufferConfig::from_toml_str("data_capacity = 64\nread_timeout_ms = 250\n")
            .expect("解析失败");
        assert_eq!(config.data_capacity, 64);
        assert_eq!(config.message_capacity, 64);
        assert_eq!(config.read_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let error = BufferConfig::from_toml_str("message_capacity = 0")
            .expect_err("容量 0 必须被拒绝");
        assert!(matches!(
            error,
            ConfigError::Invalid {
                field: "message_capacity"
            }
        ));
    }

    #[test]
    fn malformed_document_reports_parse_error() {
        let error = BufferConfig::from_toml_str("data_capacity = \"large\"")
            .expect_err("类型错误必须被拒绝");
        assert!(matches!(error, ConfigError::Parse(_)));
        assert!(BufferConfig::from_toml_str("packet = 4").is_err(), "未知字段应被拒绝");
    }
}
