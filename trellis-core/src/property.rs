//! 属性值与构造器参数
//!
//! [`PropertyValues`] 保存按名称声明的属性（保持声明顺序），
//! [`ConstructorArgumentValues`] 保存按索引或泛型声明的构造器参数。

use std::collections::BTreeMap;

use crate::metadata::MetadataValue;
use crate::value::TypeRef;

/// 单个属性声明
#[derive(Debug, Clone)]
pub struct PropertyValue {
    pub name: String,
    pub value: MetadataValue,
}

impl PropertyValue {
    pub fn new(name: impl Into<String>, value: MetadataValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// 有序的属性声明集合
#[derive(Debug, Clone, Default)]
pub struct PropertyValues {
    values: Vec<PropertyValue>,
}

impl PropertyValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加属性；同名属性被替换，新值声明可合并时与旧值合并
    pub fn add(&mut self, name: impl Into<String>, value: MetadataValue) -> &mut Self {
        self.add_property_value(PropertyValue::new(name, value));
        self
    }

    pub fn add_property_value(&mut self, pv: PropertyValue) {
        match self.values.iter_mut().find(|existing| existing.name == pv.name) {
            Some(existing) => {
                let value = if pv.value.is_merge_enabled() {
                    pv.value
                        .merge_with_parent(&existing.value)
                        .unwrap_or(pv.value)
                } else {
                    pv.value
                };
                existing.value = value;
            }
            None => self.values.push(pv),
        }
    }

    /// 以覆盖语义并入另一组属性
    pub fn add_all(&mut self, other: &PropertyValues) {
        for pv in &other.values {
            self.add_property_value(pv.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.iter().find(|pv| pv.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<PropertyValue> {
        let index = self.values.iter().position(|pv| pv.name == name)?;
        Some(self.values.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyValue> {
        self.values.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.values.iter().map(|pv| pv.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 单个构造器参数声明
#[derive(Debug, Clone)]
pub struct ValueHolder {
    pub value: MetadataValue,
    /// 声明的参数类型，用于泛型参数的匹配
    pub ty: Option<TypeRef>,
    /// 声明的参数名称，用于泛型参数的匹配
    pub name: Option<String>,
}

impl ValueHolder {
    pub fn new(value: MetadataValue) -> Self {
        Self {
            value,
            ty: None,
            name: None,
        }
    }

    pub fn typed(value: MetadataValue, ty: TypeRef) -> Self {
        Self {
            value,
            ty: Some(ty),
            name: None,
        }
    }

    pub fn named(value: MetadataValue, name: impl Into<String>) -> Self {
        Self {
            value,
            ty: None,
            name: Some(name.into()),
        }
    }
}

/// 构造器参数声明
#[derive(Debug, Clone, Default)]
pub struct ConstructorArgumentValues {
    indexed: BTreeMap<usize, ValueHolder>,
    generic: Vec<ValueHolder>,
}

impl ConstructorArgumentValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_indexed(&mut self, index: usize, value: MetadataValue) -> &mut Self {
        self.add_indexed_holder(index, ValueHolder::new(value));
        self
    }

    /// 同一索引的旧声明被替换，新值声明可合并时与旧值合并
    pub fn add_indexed_holder(&mut self, index: usize, mut holder: ValueHolder) {
        if let Some(existing) = self.indexed.get(&index) {
            if holder.value.is_merge_enabled() {
                if let Ok(merged) = holder.value.merge_with_parent(&existing.value) {
                    holder.value = merged;
                }
            }
        }
        self.indexed.insert(index, holder);
    }

    pub fn add_generic(&mut self, value: MetadataValue) -> &mut Self {
        self.generic.push(ValueHolder::new(value));
        self
    }

    pub fn add_generic_holder(&mut self, holder: ValueHolder) {
        self.generic.push(holder);
    }

    /// 以覆盖语义并入另一组参数
    pub fn add_all(&mut self, other: &ConstructorArgumentValues) {
        for (index, holder) in &other.indexed {
            self.add_indexed_holder(*index, holder.clone());
        }
        for holder in &other.generic {
            self.generic.push(holder.clone());
        }
    }

    pub fn indexed(&self) -> &BTreeMap<usize, ValueHolder> {
        &self.indexed
    }

    pub fn indexed_value(&self, index: usize) -> Option<&ValueHolder> {
        self.indexed.get(&index)
    }

    pub fn generic(&self) -> &[ValueHolder] {
        &self.generic
    }

    /// 声明的参数数量
    pub fn argument_count(&self) -> usize {
        self.indexed.len() + self.generic.len()
    }

    /// 构造器至少需要的参数数量：最大索引 + 1 与参数总数中的较大者
    pub fn min_argument_count(&self) -> usize {
        let by_index = self.indexed.keys().next_back().map_or(0, |max| max + 1);
        by_index.max(self.argument_count())
    }

    pub fn is_empty(&self) -> bool {
        self.indexed.is_empty() && self.generic.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ManagedList;
    use crate::value::Value;

    #[test]
    fn test_add_replaces_existing_property() {
        let mut pvs = PropertyValues::new();
        pvs.add("x", MetadataValue::literal(1))
            .add("y", MetadataValue::literal(2))
            .add("x", MetadataValue::literal(10));

        assert_eq!(pvs.len(), 2);
        assert_eq!(pvs.names(), vec!["x", "y"]);
        assert!(matches!(
            pvs.get("x").unwrap().value,
            MetadataValue::Literal(Value::Int(10))
        ));
    }

    #[test]
    fn test_add_merges_mergeable_collection() {
        let mut pvs = PropertyValues::new();
        pvs.add("items", MetadataValue::list(vec![MetadataValue::literal(1)]));
        pvs.add(
            "items",
            MetadataValue::List(ManagedList::new(vec![MetadataValue::literal(2)]).mergeable()),
        );

        let MetadataValue::List(list) = &pvs.get("items").unwrap().value else {
            panic!("expected a list");
        };
        assert_eq!(list.elements.len(), 2);
    }

    #[test]
    fn test_remove_property() {
        let mut pvs = PropertyValues::new();
        pvs.add("x", MetadataValue::literal(1));
        assert!(pvs.remove("x").is_some());
        assert!(pvs.remove("x").is_none());
        assert!(pvs.is_empty());
    }

    #[test]
    fn test_constructor_argument_counts() {
        let mut args = ConstructorArgumentValues::new();
        assert!(args.is_empty());

        args.add_indexed(2, MetadataValue::literal("c"))
            .add_generic(MetadataValue::literal("g"));

        assert_eq!(args.argument_count(), 2);
        assert_eq!(args.min_argument_count(), 3);
        assert!(args.indexed_value(2).is_some());
        assert!(args.indexed_value(0).is_none());
    }

    #[test]
    fn test_constructor_arguments_override() {
        let mut parent = ConstructorArgumentValues::new();
        parent.add_indexed(0, MetadataValue::literal("parent"));
        let mut child = ConstructorArgumentValues::new();
        child.add_indexed(0, MetadataValue::literal("child"));

        parent.add_all(&child);
        assert!(matches!(
            &parent.indexed_value(0).unwrap().value,
            MetadataValue::Literal(Value::Str(s)) if s == "child"
        ));
    }
}
