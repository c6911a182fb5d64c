//! 声明式值
//!
//! 定义中的属性值和构造器参数以 [`MetadataValue`] 描述：字面量、对其他
//! Bean 的引用、匿名内部定义，以及由它们组成的集合。依赖值解析器把这些
//! 声明转换为运行时的 [`Value`](crate::value::Value)。

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use crate::bean::BeanDefinition;
use crate::error::{BeansError, BeansResult};
use crate::value::{TypeRef, Value};

/// 对其他 Bean 的引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeanReference {
    pub bean_name: String,
    /// 只在父工厂中查找
    pub to_parent: bool,
}

impl BeanReference {
    pub fn new(bean_name: impl Into<String>) -> Self {
        Self {
            bean_name: bean_name.into(),
            to_parent: false,
        }
    }

    pub fn to_parent(bean_name: impl Into<String>) -> Self {
        Self {
            bean_name: bean_name.into(),
            to_parent: true,
        }
    }
}

/// 带目标类型的字符串值，解析时经过求值与类型转换
#[derive(Debug, Clone, PartialEq)]
pub struct TypedStringValue {
    pub value: String,
    pub target_type: Option<TypeRef>,
}

impl TypedStringValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            target_type: None,
        }
    }

    pub fn with_type(value: impl Into<String>, target_type: TypeRef) -> Self {
        Self {
            value: value.into(),
            target_type: Some(target_type),
        }
    }
}

static NEXT_INNER_TOKEN: AtomicU64 = AtomicU64::new(0);

/// 匿名（或命名）内部 Bean 定义
///
/// 标识在构造时分配一次，克隆（包括合并定义时的复制）保持不变，
/// 因此同一声明多次创建得到同一个生成名称。
#[derive(Debug, Clone)]
pub struct InnerBean {
    pub name: Option<String>,
    pub definition: Box<BeanDefinition>,
    token: u64,
}

impl InnerBean {
    pub fn new(name: Option<String>, definition: BeanDefinition) -> Self {
        Self {
            name,
            definition: Box::new(definition),
            token: NEXT_INNER_TOKEN.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn token(&self) -> u64 {
        self.token
    }
}

/// 声明了元素类型名的集合共享的元素类型缓存
///
/// 类型名在第一次解析时解析并缓存在集合值自身上。
#[derive(Debug, Clone, Default)]
pub struct ElementType {
    name: Option<String>,
    resolved: OnceLock<TypeRef>,
}

impl ElementType {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            resolved: OnceLock::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn resolved(&self) -> Option<&TypeRef> {
        self.resolved.get()
    }

    /// 解析一次元素类型；后续调用直接返回缓存
    pub fn resolve_with<F>(&self, resolve: F) -> BeansResult<Option<TypeRef>>
    where
        F: FnOnce(&str) -> BeansResult<TypeRef>,
    {
        if let Some(resolved) = self.resolved.get() {
            return Ok(Some(resolved.clone()));
        }
        match &self.name {
            None => Ok(None),
            Some(name) => {
                let ty = resolve(name)?;
                Ok(Some(self.resolved.get_or_init(|| ty).clone()))
            }
        }
    }
}

/// 有序集合
#[derive(Debug, Clone, Default)]
pub struct ManagedList {
    pub elements: Vec<MetadataValue>,
    pub element_type: ElementType,
    pub merge_enabled: bool,
}

impl ManagedList {
    pub fn new(elements: Vec<MetadataValue>) -> Self {
        Self {
            elements,
            ..Self::default()
        }
    }

    pub fn mergeable(mut self) -> Self {
        self.merge_enabled = true;
        self
    }

    pub fn element_type(mut self, name: impl Into<String>) -> Self {
        self.element_type = ElementType::named(name);
        self
    }
}

/// 去重集合（保持插入顺序）
#[derive(Debug, Clone, Default)]
pub struct ManagedSet {
    pub elements: Vec<MetadataValue>,
    pub element_type: ElementType,
    pub merge_enabled: bool,
}

impl ManagedSet {
    pub fn new(elements: Vec<MetadataValue>) -> Self {
        Self {
            elements,
            ..Self::default()
        }
    }

    pub fn mergeable(mut self) -> Self {
        self.merge_enabled = true;
        self
    }

    pub fn element_type(mut self, name: impl Into<String>) -> Self {
        self.element_type = ElementType::named(name);
        self
    }
}

/// 有序映射
#[derive(Debug, Clone, Default)]
pub struct ManagedMap {
    pub entries: Vec<(MetadataValue, MetadataValue)>,
    pub key_type: ElementType,
    pub value_type: ElementType,
    pub merge_enabled: bool,
}

impl ManagedMap {
    pub fn new(entries: Vec<(MetadataValue, MetadataValue)>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }

    pub fn mergeable(mut self) -> Self {
        self.merge_enabled = true;
        self
    }

    pub fn key_type(mut self, name: impl Into<String>) -> Self {
        self.key_type = ElementType::named(name);
        self
    }

    pub fn value_type(mut self, name: impl Into<String>) -> Self {
        self.value_type = ElementType::named(name);
        self
    }
}

/// 声明了元素类型的数组；元素逐一转换为该类型
#[derive(Debug, Clone)]
pub struct ManagedArray {
    pub elements: Vec<MetadataValue>,
    pub element_type: ElementType,
    pub merge_enabled: bool,
}

impl ManagedArray {
    pub fn new(element_type: impl Into<String>, elements: Vec<MetadataValue>) -> Self {
        Self {
            elements,
            element_type: ElementType::named(element_type),
            merge_enabled: false,
        }
    }

    pub fn mergeable(mut self) -> Self {
        self.merge_enabled = true;
        self
    }
}

/// 声明式值
#[derive(Debug, Clone)]
pub enum MetadataValue {
    Null,
    /// 已经是运行时值，原样传递
    Literal(Value),
    Typed(TypedStringValue),
    Reference(BeanReference),
    /// 只校验存在性并注入名称本身
    NameReference(String),
    Inner(InnerBean),
    List(ManagedList),
    Set(ManagedSet),
    Map(ManagedMap),
    Array(ManagedArray),
}

impl MetadataValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        MetadataValue::Literal(value.into())
    }

    pub fn reference(bean_name: impl Into<String>) -> Self {
        MetadataValue::Reference(BeanReference::new(bean_name))
    }

    pub fn parent_reference(bean_name: impl Into<String>) -> Self {
        MetadataValue::Reference(BeanReference::to_parent(bean_name))
    }

    pub fn typed(value: impl Into<String>, target_type: TypeRef) -> Self {
        MetadataValue::Typed(TypedStringValue::with_type(value, target_type))
    }

    pub fn inner(definition: BeanDefinition) -> Self {
        MetadataValue::Inner(InnerBean::new(None, definition))
    }

    pub fn named_inner(name: impl Into<String>, definition: BeanDefinition) -> Self {
        MetadataValue::Inner(InnerBean::new(Some(name.into()), definition))
    }

    pub fn list(elements: Vec<MetadataValue>) -> Self {
        MetadataValue::List(ManagedList::new(elements))
    }

    pub fn set(elements: Vec<MetadataValue>) -> Self {
        MetadataValue::Set(ManagedSet::new(elements))
    }

    pub fn map(entries: Vec<(MetadataValue, MetadataValue)>) -> Self {
        MetadataValue::Map(ManagedMap::new(entries))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MetadataValue::Null => "null",
            MetadataValue::Literal(_) => "literal",
            MetadataValue::Typed(_) => "typed string",
            MetadataValue::Reference(_) => "bean reference",
            MetadataValue::NameReference(_) => "bean name reference",
            MetadataValue::Inner(_) => "inner bean",
            MetadataValue::List(_) => "list",
            MetadataValue::Set(_) => "set",
            MetadataValue::Map(_) => "map",
            MetadataValue::Array(_) => "array",
        }
    }

    /// 集合值是否声明了与父定义合并
    pub fn is_merge_enabled(&self) -> bool {
        match self {
            MetadataValue::List(l) => l.merge_enabled,
            MetadataValue::Set(s) => s.merge_enabled,
            MetadataValue::Map(m) => m.merge_enabled,
            MetadataValue::Array(a) => a.merge_enabled,
            _ => false,
        }
    }

    /// 与父定义中的同名值合并：父条目在前，子条目在后；映射键冲突时子条目生效
    pub fn merge_with_parent(&self, parent: &MetadataValue) -> BeansResult<MetadataValue> {
        if !self.is_merge_enabled() {
            return Err(BeansError::IllegalState(
                "Not allowed to merge when the 'merge' property is set to 'false'".to_string(),
            ));
        }

        match (self, parent) {
            (_, MetadataValue::Null) => Ok(self.clone()),
            (MetadataValue::List(child), MetadataValue::List(p)) => {
                let mut merged = child.clone();
                merged.elements = p.elements.iter().chain(&child.elements).cloned().collect();
                Ok(MetadataValue::List(merged))
            }
            (MetadataValue::Set(child), MetadataValue::Set(p)) => {
                let mut merged = child.clone();
                merged.elements = p.elements.iter().chain(&child.elements).cloned().collect();
                Ok(MetadataValue::Set(merged))
            }
            (MetadataValue::Array(child), MetadataValue::Array(p)) => {
                let mut merged = child.clone();
                merged.elements = p.elements.iter().chain(&child.elements).cloned().collect();
                Ok(MetadataValue::Array(merged))
            }
            (MetadataValue::Map(child), MetadataValue::Map(p)) => {
                let mut merged = child.clone();
                let mut entries = p.entries.clone();
                for (key, value) in &child.entries {
                    match entries.iter_mut().find(|(k, _)| k.same_key(key)) {
                        Some(existing) => existing.1 = value.clone(),
                        None => entries.push((key.clone(), value.clone())),
                    }
                }
                merged.entries = entries;
                Ok(MetadataValue::Map(merged))
            }
            (child, parent) => Err(BeansError::IllegalArgument(format!(
                "Cannot merge {} with object of type {}",
                child.kind(),
                parent.kind()
            ))),
        }
    }

    /// 映射键比较：只有可直接比较的声明（字面量、类型化字符串、引用）才可能相等
    pub fn same_key(&self, other: &MetadataValue) -> bool {
        match (self, other) {
            (MetadataValue::Null, MetadataValue::Null) => true,
            (MetadataValue::Literal(a), MetadataValue::Literal(b)) => a == b,
            (MetadataValue::Typed(a), MetadataValue::Typed(b)) => a == b,
            (MetadataValue::Literal(Value::Str(a)), MetadataValue::Typed(b))
            | (MetadataValue::Typed(b), MetadataValue::Literal(Value::Str(a))) => {
                b.target_type.is_none() && *a == b.value
            }
            (MetadataValue::Reference(a), MetadataValue::Reference(b)) => a == b,
            (MetadataValue::NameReference(a), MetadataValue::NameReference(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Null => write!(f, "null"),
            MetadataValue::Literal(v) => write!(f, "{}", v),
            MetadataValue::Typed(t) => write!(f, "{}", t.value),
            MetadataValue::Reference(r) => write!(f, "<{}>", r.bean_name),
            MetadataValue::NameReference(n) => write!(f, "<idref {}>", n),
            MetadataValue::Inner(inner) => match &inner.name {
                Some(name) => write!(f, "inner bean '{}'", name),
                None => write!(f, "inner bean"),
            },
            other => write!(f, "{}", other.kind()),
        }
    }
}

impl From<Value> for MetadataValue {
    fn from(value: Value) -> Self {
        MetadataValue::Literal(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<MetadataValue> {
        values.iter().map(|v| MetadataValue::literal(*v)).collect()
    }

    fn literal_ints(value: &MetadataValue) -> Vec<i64> {
        let elements = match value {
            MetadataValue::List(l) => &l.elements,
            MetadataValue::Set(s) => &s.elements,
            _ => panic!("not a collection"),
        };
        elements
            .iter()
            .map(|e| match e {
                MetadataValue::Literal(Value::Int(i)) => *i,
                _ => panic!("not an int literal"),
            })
            .collect()
    }

    #[test]
    fn test_list_merge_parent_first() {
        let parent = MetadataValue::list(ints(&[1, 2]));
        let child = MetadataValue::List(ManagedList::new(ints(&[3])).mergeable());

        let merged = child.merge_with_parent(&parent).unwrap();
        assert_eq!(literal_ints(&merged), vec![1, 2, 3]);
    }

    #[test]
    fn test_map_merge_child_wins_on_collision() {
        let parent = MetadataValue::map(vec![
            (MetadataValue::literal("a"), MetadataValue::literal(1)),
            (MetadataValue::literal("b"), MetadataValue::literal(2)),
        ]);
        let child = MetadataValue::Map(
            ManagedMap::new(vec![
                (MetadataValue::literal("b"), MetadataValue::literal(20)),
                (MetadataValue::literal("c"), MetadataValue::literal(30)),
            ])
            .mergeable(),
        );

        let MetadataValue::Map(merged) = child.merge_with_parent(&parent).unwrap() else {
            panic!("expected a map");
        };
        let rendered: Vec<String> = merged
            .entries
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        assert_eq!(rendered, vec!["a=1", "b=20", "c=30"]);
    }

    #[test]
    fn test_merge_requires_flag_and_matching_kind() {
        let parent = MetadataValue::list(ints(&[1]));
        assert!(MetadataValue::list(ints(&[2])).merge_with_parent(&parent).is_err());

        let set = MetadataValue::Set(ManagedSet::new(ints(&[2])).mergeable());
        assert!(set.merge_with_parent(&parent).is_err());

        let merged = set.merge_with_parent(&MetadataValue::Null).unwrap();
        assert_eq!(literal_ints(&merged), vec![2]);
    }

    #[test]
    fn test_element_type_resolved_once() {
        let element_type = ElementType::named("int");
        let mut calls = 0;

        let first = element_type
            .resolve_with(|name| {
                calls += 1;
                Ok(TypeRef::parse(name))
            })
            .unwrap();
        let second = element_type
            .resolve_with(|_| panic!("resolved twice"))
            .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(first, Some(TypeRef::Int));
        assert_eq!(second, Some(TypeRef::Int));
        assert_eq!(ElementType::default().resolve_with(|_| panic!()).unwrap(), None);
    }

    #[test]
    fn test_same_key_literal_and_typed_string() {
        let literal = MetadataValue::literal("k");
        let typed = MetadataValue::Typed(TypedStringValue::new("k"));
        assert!(literal.same_key(&typed));
        assert!(!literal.same_key(&MetadataValue::reference("k")));
    }
}
