//! 启动配置：一个 JSON 文件，列齐远端与挂载点。

use std::fs::File;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot open config: {0}")]
    Open(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// 字段一个不多一个不少；认不得的键一律报错
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// 远端供应商的区域标识
    pub region: String,
    /// 对象桶名
    pub bucket: String,
    /// 键值表名
    pub table: String,
    /// 凭证 profile 标识
    pub credentials: String,
    /// 挂载点的绝对路径
    pub mountpoint: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_config() {
        let config: Config = serde_json::from_str(
            r#"{
                "region": "us-east-1",
                "bucket": "cloud-fs-blocks",
                "table": "cloud-fs-cache",
                "credentials": "default",
                "mountpoint": "/mnt/cloud"
            }"#,
        )
        .unwrap();
        assert_eq!(config.bucket, "cloud-fs-blocks");
        assert_eq!(config.mountpoint, "/mnt/cloud");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = serde_json::from_str::<Config>(
            r#"{
                "region": "r", "bucket": "b", "table": "t",
                "credentials": "c", "mountpoint": "/m",
                "surprise": true
            }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn missing_keys_are_rejected() {
        assert!(serde_json::from_str::<Config>(r#"{"region": "r"}"#).is_err());
    }
}
