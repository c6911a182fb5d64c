//! 类型转换与表达式求值
//!
//! [`TypeConverter`] 把外部提供的值转换为目标声明类型；[`ExpressionEvaluator`]
//! 对字符串字面量做动态求值。两者都是引擎消费的协作接口，这里提供默认实现。

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::class::TypeResolver;
use crate::error::{BeansError, BeansResult};
use crate::value::{TypeRef, Value};

/// 类型转换服务
pub trait TypeConverter: Send + Sync {
    fn convert(&self, value: Value, target: &TypeRef) -> BeansResult<Value>;
}

/// 自定义转换函数
pub type CustomConverter = Arc<dyn Fn(Value) -> anyhow::Result<Value> + Send + Sync>;

/// 默认的类型转换器
///
/// 支持字符串与基本类型之间的转换、集合之间的拓宽，以及对象类型的
/// 可赋值性检查（配置了类型解析器时）。可以按目标类型名注册自定义转换函数，
/// 自定义转换优先于内置规则。
#[derive(Default)]
pub struct SimpleTypeConverter {
    types: Option<Arc<dyn TypeResolver>>,
    custom: RwLock<HashMap<String, CustomConverter>>,
}

impl SimpleTypeConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type_resolver(types: Arc<dyn TypeResolver>) -> Self {
        Self {
            types: Some(types),
            custom: RwLock::new(HashMap::new()),
        }
    }

    /// 为目标类型注册自定义转换函数
    pub fn register_custom_converter<F>(&self, target: &TypeRef, converter: F)
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.custom
            .write()
            .insert(target.type_name().to_string(), Arc::new(converter));
    }

    fn mismatch(value: &Value, target: &TypeRef, message: impl Into<String>) -> BeansError {
        BeansError::TypeMismatch {
            value_type: value.kind().to_string(),
            required_type: target.type_name().to_string(),
            message: message.into(),
        }
    }

    fn parse_bool(s: &str) -> Option<bool> {
        match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }

    fn dedupe(items: Vec<Value>) -> Vec<Value> {
        let mut unique: Vec<Value> = Vec::with_capacity(items.len());
        for item in items {
            if !unique.contains(&item) {
                unique.push(item);
            }
        }
        unique
    }
}

impl TypeConverter for SimpleTypeConverter {
    fn convert(&self, value: Value, target: &TypeRef) -> BeansResult<Value> {
        let custom = self.custom.read().get(target.type_name()).cloned();
        if let Some(converter) = custom {
            let kind = value.kind();
            return converter(value).map_err(|e| BeansError::TypeMismatch {
                value_type: kind.to_string(),
                required_type: target.type_name().to_string(),
                message: e.to_string(),
            });
        }

        match (target, value) {
            (TypeRef::Any, v) => Ok(v),
            (t, Value::Null) if t.is_primitive() => Err(Self::mismatch(
                &Value::Null,
                t,
                "null cannot be assigned to a primitive type",
            )),
            (_, Value::Null) => Ok(Value::Null),

            (TypeRef::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (TypeRef::Bool, Value::Int(i)) if i == 0 || i == 1 => Ok(Value::Bool(i == 1)),
            (TypeRef::Bool, Value::Str(s)) => Self::parse_bool(&s)
                .map(Value::Bool)
                .ok_or_else(|| Self::mismatch(&Value::Str(s.clone()), target, format!("invalid boolean value [{}]", s))),

            (TypeRef::Int, Value::Int(i)) => Ok(Value::Int(i)),
            (TypeRef::Int, Value::Float(f)) if f.fract() == 0.0 => Ok(Value::Int(f as i64)),
            (TypeRef::Int, Value::Str(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| Self::mismatch(&Value::Str(s.clone()), target, e.to_string())),

            (TypeRef::Float, Value::Float(f)) => Ok(Value::Float(f)),
            (TypeRef::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (TypeRef::Float, Value::Str(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| Self::mismatch(&Value::Str(s.clone()), target, e.to_string())),

            (TypeRef::Str, Value::Str(s)) => Ok(Value::Str(s)),
            (TypeRef::Str, v @ (Value::Bool(_) | Value::Int(_) | Value::Float(_))) => {
                Ok(Value::Str(v.to_string()))
            }

            (TypeRef::List, Value::List(items)) | (TypeRef::List, Value::Set(items)) => {
                Ok(Value::List(items))
            }
            (TypeRef::Set, Value::Set(items)) | (TypeRef::Set, Value::List(items)) => {
                Ok(Value::Set(Self::dedupe(items)))
            }
            (TypeRef::Map, Value::Map(entries)) => Ok(Value::Map(entries)),
            (TypeRef::List, v @ (Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) | Value::Bean(_))) => {
                Ok(Value::List(vec![v]))
            }
            (TypeRef::Set, v @ (Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) | Value::Bean(_))) => {
                Ok(Value::Set(vec![v]))
            }

            (TypeRef::Object(name), Value::Bean(bean)) => match &self.types {
                Some(types) => match types.class_of(&bean) {
                    Some(class) if !class.is_assignable_to(name) => Err(Self::mismatch(
                        &Value::Bean(bean.clone()),
                        target,
                        format!("bean of type '{}' is not assignable", class.name()),
                    )),
                    _ => Ok(Value::Bean(bean)),
                },
                None => Ok(Value::Bean(bean)),
            },

            (t, v) => Err(Self::mismatch(&v, t, "no matching conversion found")),
        }
    }
}

/// 字符串求值服务
pub trait ExpressionEvaluator: Send + Sync {
    /// 对字符串求值；`bean_name` 为正在求值的所属 Bean
    fn evaluate(&self, expression: &str, bean_name: Option<&str>) -> anyhow::Result<Value>;
}

/// 占位符求值器：把 `${key}` 和 `${key:default}` 替换为属性值
#[derive(Debug, Default)]
pub struct PlaceholderEvaluator {
    properties: HashMap<String, String>,
    ignore_unresolvable: bool,
}

impl PlaceholderEvaluator {
    pub fn new(properties: HashMap<String, String>) -> Self {
        Self {
            properties,
            ignore_unresolvable: false,
        }
    }

    /// 无法解析的占位符保留原样而不是报错
    pub fn ignore_unresolvable(mut self, ignore: bool) -> Self {
        self.ignore_unresolvable = ignore;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    fn resolve_placeholders(&self, text: &str, visiting: &mut Vec<String>) -> anyhow::Result<String> {
        let mut result = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                result.push_str(&rest[start..]);
                return Ok(result);
            };

            let placeholder = &after[..end];
            let (key, default) = match placeholder.split_once(':') {
                Some((key, default)) => (key, Some(default)),
                None => (placeholder, None),
            };

            if visiting.iter().any(|k| k == key) {
                anyhow::bail!("Circular placeholder reference '{}' in property definitions", key);
            }

            match self.properties.get(key) {
                Some(value) => {
                    visiting.push(key.to_string());
                    let resolved = self.resolve_placeholders(value, visiting)?;
                    visiting.pop();
                    result.push_str(&resolved);
                }
                None => match default {
                    Some(default) => result.push_str(default),
                    None if self.ignore_unresolvable => {
                        result.push_str(&rest[start..start + 2 + end + 1]);
                    }
                    None => anyhow::bail!("Could not resolve placeholder '{}' in value \"{}\"", key, text),
                },
            }

            rest = &after[end + 1..];
        }

        result.push_str(rest);
        Ok(result)
    }
}

impl ExpressionEvaluator for PlaceholderEvaluator {
    fn evaluate(&self, expression: &str, _bean_name: Option<&str>) -> anyhow::Result<Value> {
        if !expression.contains("${") {
            return Ok(Value::Str(expression.to_string()));
        }
        let mut visiting = Vec::new();
        self.resolve_placeholders(expression, &mut visiting).map(Value::Str)
    }
}
