//! 声明式值解析
//!
//! 把定义中的 [`MetadataValue`] 解析为运行时 [`Value`]：引用按名称取 Bean 并
//! 登记依赖边，内部 Bean 就地创建，集合逐个元素递归解析并按元素类型转换。

use super::DefaultListableBeanFactory;
use crate::bean::BeanDefinition;
use crate::creation::CreationContext;
use crate::error::{BeansError, BeansResult};
use crate::merged::MergedBeanDefinition;
use crate::metadata::{BeanReference, ElementType, InnerBean, MetadataValue, TypedStringValue};
use crate::utils::naming::{inner_bean_name, transformed_bean_name, unique_inner_bean_name};
use crate::value::{TypeRef, Value};
use crate::BeanFactory;

/// 某个 Bean 的值解析器
pub(super) struct ValueResolver<'a> {
    factory: &'a DefaultListableBeanFactory,
    bean_name: &'a str,
    definition: &'a MergedBeanDefinition,
}

impl<'a> ValueResolver<'a> {
    pub(super) fn new(
        factory: &'a DefaultListableBeanFactory,
        bean_name: &'a str,
        definition: &'a MergedBeanDefinition,
    ) -> Self {
        Self {
            factory,
            bean_name,
            definition,
        }
    }

    /// 解析一个值；`arg_name` 描述注入点，用于错误信息
    pub(super) fn resolve(
        &self,
        ctx: &mut CreationContext,
        arg_name: &str,
        value: &MetadataValue,
    ) -> BeansResult<Value> {
        match value {
            MetadataValue::Null => Ok(Value::Null),
            MetadataValue::Literal(literal) => Ok(literal.clone()),
            MetadataValue::Typed(typed) => self.resolve_typed(arg_name, typed),
            MetadataValue::Reference(reference) => self.resolve_reference(ctx, arg_name, reference),
            MetadataValue::NameReference(name) => {
                let name = self.evaluate_name(name)?;
                if !self.factory.contains_bean(&name) {
                    return Err(BeansError::creation(
                        self.bean_name,
                        format!("Invalid bean name '{}' in bean reference for {}", name, arg_name),
                    ));
                }
                Ok(Value::Str(name))
            }
            MetadataValue::Inner(inner) => self.resolve_inner(ctx, arg_name, inner),
            MetadataValue::List(list) => {
                let ty = self.element_type(&list.element_type)?;
                let elements = self.resolve_elements(ctx, arg_name, &list.elements, ty.as_ref())?;
                Ok(Value::List(elements))
            }
            MetadataValue::Array(array) => {
                let ty = self.element_type(&array.element_type)?;
                let elements = self.resolve_elements(ctx, arg_name, &array.elements, ty.as_ref())?;
                Ok(Value::List(elements))
            }
            MetadataValue::Set(set) => {
                let ty = self.element_type(&set.element_type)?;
                let mut unique: Vec<Value> = Vec::with_capacity(set.elements.len());
                for element in self.resolve_elements(ctx, arg_name, &set.elements, ty.as_ref())? {
                    if !unique.contains(&element) {
                        unique.push(element);
                    }
                }
                Ok(Value::Set(unique))
            }
            MetadataValue::Map(map) => {
                let key_type = self.element_type(&map.key_type)?;
                let value_type = self.element_type(&map.value_type)?;
                let mut entries: Vec<(Value, Value)> = Vec::with_capacity(map.entries.len());
                for (key, value) in &map.entries {
                    let key = self.resolve(ctx, arg_name, key)?;
                    let key = self.convert_element(arg_name, key, key_type.as_ref())?;
                    let value_arg = format!("{} with key [{}]", arg_name, key);
                    let value = self.resolve(ctx, &value_arg, value)?;
                    let value = self.convert_element(&value_arg, value, value_type.as_ref())?;
                    match entries.iter_mut().find(|(k, _)| *k == key) {
                        Some(entry) => entry.1 = value,
                        None => entries.push((key, value)),
                    }
                }
                Ok(Value::Map(entries))
            }
        }
    }

    fn resolve_typed(&self, arg_name: &str, typed: &TypedStringValue) -> BeansResult<Value> {
        let evaluated = self.factory.evaluate(&typed.value, self.bean_name)?;
        match &typed.target_type {
            Some(ty) => self.factory.converter.convert(evaluated, ty).map_err(|e| {
                BeansError::creation_caused(
                    self.bean_name,
                    format!("Error converting typed String value for {}", arg_name),
                    e,
                )
            }),
            None => Ok(evaluated),
        }
    }

    fn evaluate_name(&self, name: &str) -> BeansResult<String> {
        let evaluated = self.factory.evaluate(name, self.bean_name)?;
        Ok(match evaluated.as_str() {
            Some(name) => name.to_string(),
            None => evaluated.to_string(),
        })
    }

    fn resolve_reference(
        &self,
        ctx: &mut CreationContext,
        arg_name: &str,
        reference: &BeanReference,
    ) -> BeansResult<Value> {
        let ref_name = self.evaluate_name(&reference.bean_name)?;

        let bean = if reference.to_parent {
            match &self.factory.parent {
                Some(parent) => parent.get_bean(&ref_name),
                None => {
                    return Err(BeansError::creation(
                        self.bean_name,
                        format!(
                            "Cannot resolve reference to bean '{}' in parent factory: no parent factory available",
                            ref_name
                        ),
                    ))
                }
            }
        } else {
            self.factory
                .do_get_bean(&ref_name, None, None, false, ctx)
                .map(|bean| {
                    let target = self.factory.canonical_name(transformed_bean_name(&ref_name));
                    self.factory
                        .singletons
                        .register_dependent_bean(&target, self.bean_name);
                    bean
                })
        };

        bean.map(Value::from_bean_ref).map_err(|e| {
            BeansError::creation_caused(
                self.bean_name,
                format!("Cannot resolve reference to bean '{}' while setting {}", ref_name, arg_name),
                e,
            )
        })
    }

    fn resolve_inner(
        &self,
        ctx: &mut CreationContext,
        arg_name: &str,
        inner: &InnerBean,
    ) -> BeansResult<Value> {
        let inner_name = match &inner.name {
            Some(name) => self.unique_inner_name(name),
            None => inner_bean_name(inner.token()),
        };

        self.create_inner_bean(ctx, &inner_name, &inner.definition)
            .map_err(|e| {
                BeansError::creation_caused(
                    self.bean_name,
                    format!("Cannot create inner bean '{}' while setting {}", inner_name, arg_name),
                    e,
                )
            })
    }

    /// 命名内部 Bean 在名称已被其他 Bean 占用时追加序号；
    /// 只被当前外部 Bean 持有的名称直接复用
    fn unique_inner_name(&self, name: &str) -> String {
        let mut counter = 0;
        loop {
            let candidate = unique_inner_bean_name(name, counter);
            let in_use = self.factory.definitions.contains_bean_definition(&candidate)
                || self.factory.definitions.is_alias(&candidate)
                || self
                    .factory
                    .singletons
                    .dependent_beans(&candidate)
                    .iter()
                    .any(|holder| holder != self.bean_name);
            if !in_use {
                return candidate;
            }
            counter += 1;
        }
    }

    fn create_inner_bean(
        &self,
        ctx: &mut CreationContext,
        inner_name: &str,
        raw: &BeanDefinition,
    ) -> BeansResult<Value> {
        let mbd = self
            .factory
            .merge_inner_definition(inner_name, raw, self.definition)?;

        for dep in &mbd.depends_on {
            let dep_name = self.factory.canonical_name(transformed_bean_name(dep));
            self.factory
                .singletons
                .register_dependent_bean(&dep_name, inner_name);
            self.factory.do_get_bean(dep, None, None, false, ctx)?;
        }

        tracing::trace!("Creating inner bean '{}' of bean '{}'", inner_name, self.bean_name);
        let inner_bean = self.factory.create_bean(inner_name, &mbd, None, ctx)?;
        self.factory
            .singletons
            .register_contained_bean(inner_name, self.bean_name);

        // 内部 FactoryBean 直接取产品，不缓存
        if let Some(class) = self
            .factory
            .types
            .class_of(&inner_bean)
            .filter(|class| class.is_factory_bean())
        {
            if let Some(factory) = class.as_factory_bean(&inner_bean) {
                let product = self
                    .factory
                    .object_from_factory_bean(factory, inner_name, !mbd.synthetic)?;
                return Ok(Value::from_bean_ref(product));
            }
        }
        Ok(Value::from_bean_ref(inner_bean))
    }

    fn element_type(&self, element_type: &ElementType) -> BeansResult<Option<TypeRef>> {
        element_type.resolve_with(|name| self.factory.resolve_type_name(self.bean_name, name))
    }

    fn resolve_elements(
        &self,
        ctx: &mut CreationContext,
        arg_name: &str,
        elements: &[MetadataValue],
        element_type: Option<&TypeRef>,
    ) -> BeansResult<Vec<Value>> {
        let mut resolved = Vec::with_capacity(elements.len());
        for (index, element) in elements.iter().enumerate() {
            let element_arg = format!("{} with key [{}]", arg_name, index);
            let value = self.resolve(ctx, &element_arg, element)?;
            resolved.push(self.convert_element(&element_arg, value, element_type)?);
        }
        Ok(resolved)
    }

    fn convert_element(
        &self,
        arg_name: &str,
        value: Value,
        element_type: Option<&TypeRef>,
    ) -> BeansResult<Value> {
        let Some(ty) = element_type else {
            return Ok(value);
        };
        self.factory.converter.convert(value, ty).map_err(|e| {
            BeansError::creation_caused(
                self.bean_name,
                format!("Cannot convert value of {} to required type [{}]", arg_name, ty),
                e,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ManagedList, ManagedMap, ManagedSet};
    use crate::ConfigurableBeanFactory;
    use std::sync::Arc;

    fn owner() -> MergedBeanDefinition {
        MergedBeanDefinition::from_root(&BeanDefinition::new())
    }

    fn resolve(factory: &DefaultListableBeanFactory, value: &MetadataValue) -> BeansResult<Value> {
        let definition = owner();
        let resolver = ValueResolver::new(factory, "owner", &definition);
        resolver.resolve(&mut CreationContext::new(), "bean property 'value'", value)
    }

    #[test]
    fn test_literals_pass_through() {
        let factory = DefaultListableBeanFactory::new();
        assert_eq!(resolve(&factory, &MetadataValue::Null).unwrap(), Value::Null);
        assert_eq!(
            resolve(&factory, &MetadataValue::literal(42i64)).unwrap(),
            Value::Int(42)
        );
    }

    #[test]
    fn test_typed_value_is_converted() {
        let factory = DefaultListableBeanFactory::new();
        let value = MetadataValue::typed("17", TypeRef::Int);
        assert_eq!(resolve(&factory, &value).unwrap(), Value::Int(17));

        let bad = MetadataValue::typed("seventeen", TypeRef::Int);
        let err = resolve(&factory, &bad).unwrap_err();
        assert!(err.to_string().contains("Error converting typed String value"));
    }

    #[test]
    fn test_list_elements_converted_to_element_type() {
        let factory = DefaultListableBeanFactory::new();
        let list = MetadataValue::List(
            ManagedList::new(vec![
                MetadataValue::literal("1"),
                MetadataValue::literal(2i64),
            ])
            .element_type("int"),
        );
        assert_eq!(
            resolve(&factory, &list).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_set_removes_duplicates() {
        let factory = DefaultListableBeanFactory::new();
        let set = MetadataValue::Set(ManagedSet::new(vec![
            MetadataValue::literal("a"),
            MetadataValue::literal("b"),
            MetadataValue::literal("a"),
        ]));
        assert_eq!(
            resolve(&factory, &set).unwrap(),
            Value::Set(vec![Value::str("a"), Value::str("b")])
        );
    }

    #[test]
    fn test_map_later_key_wins() {
        let factory = DefaultListableBeanFactory::new();
        let map = MetadataValue::Map(ManagedMap::new(vec![
            (MetadataValue::literal("k"), MetadataValue::literal(1i64)),
            (MetadataValue::literal("j"), MetadataValue::literal(2i64)),
            (MetadataValue::literal("k"), MetadataValue::literal(3i64)),
        ]));
        let resolved = resolve(&factory, &map).unwrap();
        assert_eq!(resolved.as_map().unwrap().len(), 2);
        assert_eq!(resolved.map_get(&Value::str("k")), Some(&Value::Int(3)));
    }

    #[test]
    fn test_reference_registers_dependent() {
        let factory = DefaultListableBeanFactory::new();
        let shared: Arc<String> = Arc::new("shared".to_string());
        factory.register_singleton("target", shared.clone()).unwrap();

        let resolved = resolve(&factory, &MetadataValue::reference("target")).unwrap();
        let bean = resolved.downcast::<String>().unwrap();
        assert!(Arc::ptr_eq(&bean, &shared));
        assert_eq!(factory.dependent_beans("target"), vec!["owner".to_string()]);
    }

    #[test]
    fn test_missing_reference_names_injection_point() {
        let factory = DefaultListableBeanFactory::new();
        let err = resolve(&factory, &MetadataValue::reference("ghost")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Cannot resolve reference to bean 'ghost'"));
        assert!(message.contains("bean property 'value'"));
        assert!(err
            .find_cause(|e| matches!(e, BeansError::NoSuchBean { .. }))
            .is_some());
    }

    #[test]
    fn test_parent_reference_without_parent_fails() {
        let factory = DefaultListableBeanFactory::new();
        let err = resolve(&factory, &MetadataValue::parent_reference("target")).unwrap_err();
        assert!(err.to_string().contains("no parent factory available"));
    }

    #[test]
    fn test_name_reference_requires_existing_bean() {
        let factory = DefaultListableBeanFactory::new();
        factory.register_singleton("present", Arc::new(1u8)).unwrap();
        assert_eq!(
            resolve(&factory, &MetadataValue::NameReference("present".into())).unwrap(),
            Value::str("present")
        );
        assert!(resolve(&factory, &MetadataValue::NameReference("absent".into())).is_err());
    }
}
