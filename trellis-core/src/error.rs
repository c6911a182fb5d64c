//! 错误类型
//!
//! Bean 生命周期引擎对外暴露的统一错误类型。用户回调（构造器、setter、
//! 工厂方法、init/destroy 方法、后置处理器）返回 `anyhow::Result`，
//! 引擎负责把这些原因包装进 [`BeansError`]，并附带 Bean 名称和属性路径。

use std::error::Error as StdError;
use thiserror::Error;

/// 包装在错误中的底层原因
pub type ErrorCause = Box<dyn StdError + Send + Sync>;

/// 引擎统一的 Result 类型
pub type BeansResult<T> = std::result::Result<T, BeansError>;

/// Bean 工厂错误
#[derive(Debug, Error)]
pub enum BeansError {
    /// 声明式元数据非法或无法满足
    #[error("Invalid bean definition with name '{bean_name}': {message}{}", nested(.source))]
    DefinitionStore {
        bean_name: String,
        message: String,
        #[source]
        source: Option<ErrorCause>,
    },

    /// 创建管线中的任何失败
    #[error("Error creating bean with name '{bean_name}': {message}{}", nested(.source))]
    BeanCreation {
        bean_name: String,
        message: String,
        #[source]
        source: Option<ErrorCause>,
    },

    /// 构造器 / 工厂方法调用失败
    #[error("Failed to instantiate bean '{bean_name}' using {executable}: {message}{}", nested(.source))]
    BeanInstantiation {
        bean_name: String,
        executable: String,
        message: String,
        #[source]
        source: Option<ErrorCause>,
    },

    /// 作用域不允许的自引用循环
    #[error("Error creating bean with name '{bean_name}': {message}")]
    CurrentlyInCreation { bean_name: String, message: String },

    /// 依赖无法满足
    #[error("Error creating bean with name '{bean_name}': Unsatisfied dependency expressed through {injection_point}: {message}{}", nested(.source))]
    UnsatisfiedDependency {
        bean_name: String,
        injection_point: String,
        message: String,
        #[source]
        source: Option<ErrorCause>,
    },

    /// 找不到 Bean
    #[error("No bean named '{name}' available{}", detail(.message))]
    NoSuchBean { name: String, message: String },

    /// 按类型查找时存在多个候选
    #[error("No qualifying bean of type '{required_type}' available: expected single matching bean but found {}: {}", .candidates.len(), .candidates.join(","))]
    NoUniqueBean {
        required_type: String,
        candidates: Vec<String>,
    },

    /// 工厂方法重载存在歧义
    #[error("Error creating bean with name '{bean_name}': Ambiguous factory method '{factory_method}' matches found: {}", .candidates.join(", "))]
    AmbiguousFactoryMethod {
        bean_name: String,
        factory_method: String,
        candidates: Vec<String>,
    },

    /// 抽象定义不能被实例化
    #[error("Error creating bean with name '{bean_name}': Bean definition is abstract")]
    BeanIsAbstract { bean_name: String },

    /// `&name` 指向的不是 FactoryBean
    #[error("Bean named '{bean_name}' is expected to be a FactoryBean but is not")]
    BeanIsNotAFactory { bean_name: String },

    /// 属性不可写
    #[error("Invalid property '{property}' of bean '{bean_name}': Bean property '{property}' is not writable or has an invalid setter method{}", suggestion(.suggestions))]
    NotWritableProperty {
        bean_name: String,
        property: String,
        suggestions: Vec<String>,
    },

    /// 类型转换失败
    #[error("Failed to convert value of type '{value_type}' to required type '{required_type}'{}", detail(.message))]
    TypeMismatch {
        value_type: String,
        required_type: String,
        message: String,
    },

    /// 定义校验失败（如 destroy 方法签名非法）
    #[error("Invalid bean definition for bean '{bean_name}': {message}")]
    DefinitionValidation { bean_name: String, message: String },

    /// 类型名称无法解析
    #[error("Cannot resolve bean class '{class_name}' for bean with name '{bean_name}'")]
    CannotLoadBeanClass {
        bean_name: String,
        class_name: String,
    },

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),
}

fn nested(source: &Option<ErrorCause>) -> String {
    match source {
        Some(cause) => format!("; nested exception is {}", cause),
        None => String::new(),
    }
}

fn detail(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {}", message)
    }
}

fn suggestion(suggestions: &[String]) -> String {
    match suggestions {
        [] => String::new(),
        [only] => format!(": Did you mean '{}'?", only),
        many => format!(": Did you mean one of [{}]?", many.join(", ")),
    }
}

impl BeansError {
    pub fn creation(bean_name: impl Into<String>, message: impl Into<String>) -> Self {
        BeansError::BeanCreation {
            bean_name: bean_name.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn creation_caused(
        bean_name: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<ErrorCause>,
    ) -> Self {
        BeansError::BeanCreation {
            bean_name: bean_name.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn definition_store(bean_name: impl Into<String>, message: impl Into<String>) -> Self {
        BeansError::DefinitionStore {
            bean_name: bean_name.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn currently_in_creation(bean_name: impl Into<String>) -> Self {
        BeansError::CurrentlyInCreation {
            bean_name: bean_name.into(),
            message: "Requested bean is currently in creation: Is there an unresolvable circular reference?"
                .to_string(),
        }
    }

    pub fn no_such_bean(name: impl Into<String>) -> Self {
        BeansError::NoSuchBean {
            name: name.into(),
            message: String::new(),
        }
    }

    /// 错误直接关联的 Bean 名称
    pub fn bean_name(&self) -> Option<&str> {
        match self {
            BeansError::DefinitionStore { bean_name, .. }
            | BeansError::BeanCreation { bean_name, .. }
            | BeansError::BeanInstantiation { bean_name, .. }
            | BeansError::CurrentlyInCreation { bean_name, .. }
            | BeansError::UnsatisfiedDependency { bean_name, .. }
            | BeansError::AmbiguousFactoryMethod { bean_name, .. }
            | BeansError::BeanIsAbstract { bean_name }
            | BeansError::BeanIsNotAFactory { bean_name }
            | BeansError::NotWritableProperty { bean_name, .. }
            | BeansError::DefinitionValidation { bean_name, .. }
            | BeansError::CannotLoadBeanClass { bean_name, .. } => Some(bean_name),
            BeansError::NoSuchBean { name, .. } => Some(name),
            _ => None,
        }
    }

    /// 沿 source 链查找第一个满足条件的 `BeansError`（包含自身）
    pub fn find_cause<F>(&self, predicate: F) -> Option<&BeansError>
    where
        F: Fn(&BeansError) -> bool,
    {
        let mut current: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(err) = current {
            if let Some(beans_err) = err.downcast_ref::<BeansError>() {
                if predicate(beans_err) {
                    return Some(beans_err);
                }
            }
            current = err.source();
        }
        None
    }

    /// 错误链中是否包含 `CurrentlyInCreation`
    pub fn is_currently_in_creation(&self) -> bool {
        self.find_cause(|e| matches!(e, BeansError::CurrentlyInCreation { .. }))
            .is_some()
    }

    /// 错误链末端的根本原因
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        let mut current: &(dyn StdError + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }

    /// 完整错误链中出现过的所有 Bean 名称（按出现顺序，去重）
    pub fn bean_names_in_chain(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut current: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(err) = current {
            if let Some(name) = err.downcast_ref::<BeansError>().and_then(|e| e.bean_name()) {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
            current = err.source();
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_error_embeds_nested_cause() {
        let inner = BeansError::currently_in_creation("a");
        let outer = BeansError::creation_caused("b", "Cannot resolve reference to bean 'a'", inner);

        let message = outer.to_string();
        assert!(message.contains("'b'"));
        assert!(message.contains("'a'"));
        assert!(message.contains("nested exception is"));
    }

    #[test]
    fn test_find_cause_walks_chain() {
        let inner = BeansError::currently_in_creation("a");
        let middle = BeansError::creation_caused("b", "middle", inner);
        let outer = BeansError::creation_caused("c", "outer", middle);

        assert!(outer.is_currently_in_creation());
        assert_eq!(outer.bean_names_in_chain(), vec!["c", "b", "a"]);
        assert!(outer.root_cause().to_string().contains("currently in creation"));
    }

    #[test]
    fn test_anyhow_cause_is_kept_as_source() {
        let err = BeansError::creation_caused("a", "Init failed", anyhow::anyhow!("boom"));

        assert!(err.source().is_some());
        assert!(err.to_string().contains("boom"));
        assert!(!err.is_currently_in_creation());
    }

    #[test]
    fn test_not_writable_property_suggestions() {
        let err = BeansError::NotWritableProperty {
            bean_name: "a".to_string(),
            property: "nmae".to_string(),
            suggestions: vec!["name".to_string()],
        };
        assert!(err.to_string().ends_with("Did you mean 'name'?"));
    }
}
