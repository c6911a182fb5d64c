//! 工厂配置
//!
//! 控制循环引用、定义覆盖、元数据缓存等行为的开关，可以从 TOML 加载：
//!
//! ```toml
//! allow-circular-references = true
//! allow-raw-injection-despite-wrapping = false
//! ignored-dependency-types = ["Clock"]
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::logging::LoggingConfig;

/// Bean 工厂配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FactoryConfig {
    /// 是否允许单例之间的循环引用（通过早期引用解决）
    pub allow_circular_references: bool,

    /// 早期引用被注入后，最终实例被包装成另一个对象时是否仍然允许
    pub allow_raw_injection_despite_wrapping: bool,

    /// 同名定义是否允许覆盖
    pub allow_bean_definition_overriding: bool,

    /// 是否缓存合并定义
    pub cache_bean_metadata: bool,

    /// 自动装配与依赖检查忽略的类型名称
    pub ignored_dependency_types: HashSet<String>,

    /// 日志配置（可选）
    pub logging: Option<LoggingConfig>,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            allow_circular_references: true,
            allow_raw_injection_despite_wrapping: false,
            allow_bean_definition_overriding: true,
            cache_bean_metadata: true,
            ignored_dependency_types: HashSet::new(),
            logging: None,
        }
    }
}

impl FactoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse factory configuration")
    }

    /// 从 TOML 文件加载
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml_str(&content)
    }

    pub fn with_circular_references(mut self, allow: bool) -> Self {
        self.allow_circular_references = allow;
        self
    }

    pub fn with_raw_injection_despite_wrapping(mut self, allow: bool) -> Self {
        self.allow_raw_injection_despite_wrapping = allow;
        self
    }

    pub fn with_bean_definition_overriding(mut self, allow: bool) -> Self {
        self.allow_bean_definition_overriding = allow;
        self
    }

    pub fn with_cache_bean_metadata(mut self, cache: bool) -> Self {
        self.cache_bean_metadata = cache;
        self
    }

    /// 忽略某个类型的自动装配和依赖检查
    pub fn ignore_dependency_type(mut self, type_name: impl Into<String>) -> Self {
        self.ignored_dependency_types.insert(type_name.into());
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn is_ignored_dependency_type(&self, type_name: &str) -> bool {
        self.ignored_dependency_types.contains(type_name)
    }
}
