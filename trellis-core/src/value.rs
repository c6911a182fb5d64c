//! 运行时值模型
//!
//! 依赖值解析器的输出、构造器/工厂方法的实参，以及属性 setter 的输入
//! 都使用 [`Value`] 表示。Bean 实例本身以 [`BeanRef`] 共享。

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 共享的 Bean 实例
pub type BeanRef = Arc<dyn Any + Send + Sync>;

/// 表示 "null" 的哨兵 Bean
///
/// 工厂方法或 FactoryBean 返回空值时，注册表中保存的就是它；
/// 依赖值解析器在注入前会把它还原为 [`Value::Null`]。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullBean;

impl NullBean {
    pub fn bean_ref() -> BeanRef {
        Arc::new(NullBean)
    }

    pub fn is_null_bean(bean: &BeanRef) -> bool {
        bean.is::<NullBean>()
    }
}

/// 运行时值
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bean(BeanRef),
    List(Vec<Value>),
    /// 保持插入顺序的集合，元素按 [`PartialEq`] 去重
    Set(Vec<Value>),
    /// 保持插入顺序的映射，键按 [`PartialEq`] 去重
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// 把任意实例包装为 Bean 值
    pub fn bean<T: Any + Send + Sync>(instance: T) -> Self {
        Value::Bean(Arc::new(instance))
    }

    pub fn str(value: impl Into<String>) -> Self {
        Value::Str(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// List 或 Set 的元素
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// 按键查找映射中的值
    pub fn map_get(&self, key: &Value) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn as_bean_ref(&self) -> Option<&BeanRef> {
        match self {
            Value::Bean(bean) => Some(bean),
            _ => None,
        }
    }

    /// 把 Bean 值向下转型为具体类型
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Value::Bean(bean) => Arc::clone(bean).downcast::<T>().ok(),
            _ => None,
        }
    }

    /// 把 Bean 值向下转型为具体类型，失败时返回描述性错误
    pub fn into_bean<T: Any + Send + Sync>(self) -> anyhow::Result<Arc<T>> {
        match self {
            Value::Bean(bean) => bean.downcast::<T>().map_err(|_| {
                anyhow::anyhow!(
                    "Bean is not of required type '{}'",
                    std::any::type_name::<T>()
                )
            }),
            other => Err(anyhow::anyhow!(
                "Expected a bean of type '{}' but got {}",
                std::any::type_name::<T>(),
                other.kind()
            )),
        }
    }

    /// 值的种类名称，用于错误信息
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bean(_) => "bean",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
        }
    }

    /// 把解析后的值转换为可存入注册表的 Bean
    ///
    /// Bean 原样返回，null 变为 [`NullBean`]，其他值整体装箱。
    pub fn into_bean_ref(self) -> BeanRef {
        match self {
            Value::Bean(bean) => bean,
            Value::Null => NullBean::bean_ref(),
            other => Arc::new(other),
        }
    }

    /// [`Value::into_bean_ref`] 的逆操作
    pub fn from_bean_ref(bean: BeanRef) -> Value {
        if NullBean::is_null_bean(&bean) {
            return Value::Null;
        }
        match bean.downcast_ref::<Value>() {
            Some(boxed) => boxed.clone(),
            None => Value::Bean(bean),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bean(a), Value::Bean(b)) => Arc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) | (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Bean(bean) => write!(f, "Bean({:p})", Arc::as_ptr(bean)),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Set(items) => f.debug_tuple("Set").field(items).finish(),
            Value::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Bean(bean) => write!(f, "bean@{:p}", Arc::as_ptr(bean)),
            Value::List(items) | Value::Set(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Map(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<BeanRef> for Value {
    fn from(v: BeanRef) -> Self {
        Value::Bean(v)
    }
}

/// 参数或属性声明的类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Bool,
    Int,
    Float,
    Str,
    List,
    Set,
    Map,
    /// 按名称引用的对象类型，由类型解析器判断可赋值性
    Object(String),
    Any,
}

impl TypeRef {
    pub fn object(name: impl Into<String>) -> Self {
        TypeRef::Object(name.into())
    }

    /// 按名称解析：内置类型名映射到对应变体，其余视为对象类型
    pub fn parse(name: &str) -> Self {
        match name {
            "bool" | "boolean" => TypeRef::Bool,
            "int" | "i64" | "long" => TypeRef::Int,
            "float" | "f64" | "double" => TypeRef::Float,
            "string" | "str" | "String" => TypeRef::Str,
            "list" => TypeRef::List,
            "set" => TypeRef::Set,
            "map" => TypeRef::Map,
            "any" => TypeRef::Any,
            other => TypeRef::Object(other.to_string()),
        }
    }

    /// 基本类型：未提供值时以零值填充，不能接受 null
    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeRef::Bool | TypeRef::Int | TypeRef::Float)
    }

    /// 简单类型：基本类型和字符串，不参与自动装配
    pub fn is_simple(&self) -> bool {
        self.is_primitive() || matches!(self, TypeRef::Str)
    }

    pub fn zero_value(&self) -> Option<Value> {
        match self {
            TypeRef::Bool => Some(Value::Bool(false)),
            TypeRef::Int => Some(Value::Int(0)),
            TypeRef::Float => Some(Value::Float(0.0)),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            TypeRef::Bool => "bool",
            TypeRef::Int => "int",
            TypeRef::Float => "float",
            TypeRef::Str => "string",
            TypeRef::List => "list",
            TypeRef::Set => "set",
            TypeRef::Map => "map",
            TypeRef::Object(name) => name,
            TypeRef::Any => "any",
        }
    }

    /// 值的种类是否已与该类型一致（不做转换）
    pub fn accepts_kind(&self, value: &Value) -> bool {
        match (self, value) {
            (TypeRef::Any, _) => true,
            (TypeRef::Bool, Value::Bool(_)) => true,
            (TypeRef::Int, Value::Int(_)) => true,
            (TypeRef::Float, Value::Float(_)) => true,
            (TypeRef::Str, Value::Str(_)) => true,
            (TypeRef::List, Value::List(_)) => true,
            (TypeRef::Set, Value::Set(_)) => true,
            (TypeRef::Map, Value::Map(_)) => true,
            (TypeRef::Object(_), Value::Bean(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}
