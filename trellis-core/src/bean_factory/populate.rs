//! 属性填充与初始化
//!
//! 实例构造完成之后的两个阶段：
//!
//! 1. 填充：实例化后钩子、按名称 / 按类型自动装配、属性钩子、依赖检查、
//!    属性写入
//! 2. 初始化：初始化前钩子、`after_properties_set`、自定义 init 方法、
//!    初始化后钩子

use super::{DefaultListableBeanFactory, DependencyDescriptor};
use crate::bean::{AutowireMode, DependencyCheck};
use crate::class::{BeanClass, PropertyDescriptor};
use crate::constants::AFTER_PROPERTIES_SET_METHOD_NAME;
use crate::creation::CreationContext;
use crate::error::{BeansError, BeansResult};
use crate::merged::MergedBeanDefinition;
use crate::metadata::MetadataValue;
use crate::post_processor::{Flow, InitStep};
use crate::property::PropertyValues;
use crate::utils::naming::property_matches;
use crate::value::{BeanRef, TypeRef, Value};
use crate::BeanFactory;

use super::value_resolver::ValueResolver;

impl DefaultListableBeanFactory {
    /// 用定义中的属性值填充实例
    ///
    /// 返回 [`Flow::Halt`] 表示某个实例化后钩子要求跳过其余填充和初始化步骤。
    pub(super) fn populate_bean(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
        class: Option<&BeanClass>,
        bean: &BeanRef,
        ctx: &mut CreationContext,
    ) -> BeansResult<Flow> {
        let processors = if mbd.synthetic {
            None
        } else {
            Some(self.post_processors.snapshot())
        };

        if let Some(processors) = &processors {
            for processor in processors.iter() {
                let Some(hook) = processor.as_instantiation_hook() else {
                    continue;
                };
                let flow = hook.after_instantiation(bean, bean_name).map_err(|e| {
                    BeansError::creation_caused(
                        bean_name,
                        format!("Post-processor '{}' failed after instantiation", processor.name()),
                        e,
                    )
                })?;
                if flow == Flow::Halt {
                    tracing::debug!(
                        "Post-processor '{}' skipped property population of bean '{}'",
                        processor.name(),
                        bean_name
                    );
                    return Ok(Flow::Halt);
                }
            }
        }

        let mut pvs = mbd.property_values.clone();

        if let Some(class) = class {
            match mbd.autowire_mode {
                AutowireMode::ByName => self.autowire_by_name(bean_name, class, &mut pvs, ctx)?,
                AutowireMode::ByType => self.autowire_by_type(bean_name, class, &mut pvs, ctx)?,
                AutowireMode::No | AutowireMode::Constructor => {}
            }
        }

        if let Some(processors) = &processors {
            for processor in processors.iter() {
                let Some(hook) = processor.as_property_hook() else {
                    continue;
                };
                let processed = hook
                    .post_process_properties(pvs, bean, bean_name)
                    .map_err(|e| {
                        BeansError::creation_caused(
                            bean_name,
                            format!("Post-processor '{}' failed processing property values", processor.name()),
                            e,
                        )
                    })?;
                match processed {
                    Some(processed) => pvs = processed,
                    None => return Ok(Flow::Continue),
                }
            }
        }

        if let Some(class) = class {
            self.check_dependencies(bean_name, mbd, class, &pvs)?;
        }

        if !pvs.is_empty() {
            self.apply_property_values(bean_name, mbd, class, bean, &pvs, ctx)?;
        }
        Ok(Flow::Continue)
    }

    /// 可写、非简单类型、未声明且未被忽略的属性
    fn unsatisfied_non_simple_properties<'c>(
        &self,
        class: &'c BeanClass,
        pvs: &PropertyValues,
    ) -> Vec<&'c PropertyDescriptor> {
        class
            .writable_properties()
            .filter(|property| !property.ty().is_simple())
            .filter(|property| !pvs.contains(property.name()))
            .filter(|property| !self.config.is_ignored_dependency_type(property.ty().type_name()))
            .collect()
    }

    fn autowire_by_name(
        &self,
        bean_name: &str,
        class: &BeanClass,
        pvs: &mut PropertyValues,
        ctx: &mut CreationContext,
    ) -> BeansResult<()> {
        for property in self.unsatisfied_non_simple_properties(class, pvs) {
            let name = property.name();
            if !self.contains_bean(name) {
                tracing::trace!(
                    "Not autowiring property '{}' of bean '{}' by name: no matching bean found",
                    name,
                    bean_name
                );
                continue;
            }
            let target = self.do_get_bean(name, None, None, false, ctx)?;
            pvs.add(name, MetadataValue::Literal(Value::from_bean_ref(target)));
            self.singletons
                .register_dependent_bean(&self.canonical_name(name), bean_name);
            tracing::trace!(
                "Added autowiring by name from bean name '{}' via property '{}' to bean named '{}'",
                bean_name,
                name,
                name
            );
        }
        Ok(())
    }

    fn autowire_by_type(
        &self,
        bean_name: &str,
        class: &BeanClass,
        pvs: &mut PropertyValues,
        ctx: &mut CreationContext,
    ) -> BeansResult<()> {
        for property in self.unsatisfied_non_simple_properties(class, pvs) {
            let TypeRef::Object(type_name) = property.ty() else {
                continue;
            };
            let descriptor = DependencyDescriptor::new(type_name.as_str())
                .with_name(property.name())
                .optional();
            let resolved = self
                .resolve_dependency_in(&descriptor, Some(bean_name), ctx)
                .map_err(|e| BeansError::UnsatisfiedDependency {
                    bean_name: bean_name.to_string(),
                    injection_point: format!("bean property '{}'", property.name()),
                    message: e.to_string(),
                    source: Some(Box::new(e)),
                })?;
            if let Some(target) = resolved {
                pvs.add(property.name(), MetadataValue::Literal(Value::from_bean_ref(target)));
            }
        }
        Ok(())
    }

    /// 依赖检查：策略覆盖的可写属性必须都有值
    fn check_dependencies(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
        class: &BeanClass,
        pvs: &PropertyValues,
    ) -> BeansResult<()> {
        if mbd.dependency_check == DependencyCheck::None {
            return Ok(());
        }

        for property in class.writable_properties() {
            if property.is_excluded_from_dependency_check()
                || self.config.is_ignored_dependency_type(property.ty().type_name())
                || pvs.contains(property.name())
            {
                continue;
            }
            let simple = property.ty().is_simple();
            let unsatisfied = match mbd.dependency_check {
                DependencyCheck::All => true,
                DependencyCheck::Simple => simple,
                DependencyCheck::Objects => !simple,
                DependencyCheck::None => false,
            };
            if unsatisfied {
                return Err(BeansError::UnsatisfiedDependency {
                    bean_name: bean_name.to_string(),
                    injection_point: format!("bean property '{}'", property.name()),
                    message: "Set this property value or disable dependency checking for this bean."
                        .to_string(),
                    source: None,
                });
            }
        }
        Ok(())
    }

    fn apply_property_values(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
        class: Option<&BeanClass>,
        bean: &BeanRef,
        pvs: &PropertyValues,
        ctx: &mut CreationContext,
    ) -> BeansResult<()> {
        // 工厂方法产出的实例可能没有类型描述
        let runtime_class = self.types.class_of(bean);
        let Some(class) = runtime_class.as_deref().or(class) else {
            return Err(BeansError::creation(
                bean_name,
                format!(
                    "Cannot apply property values: no type metadata for instance of bean '{}'",
                    bean_name
                ),
            ));
        };

        let resolver = ValueResolver::new(self, bean_name, mbd);
        for pv in pvs.iter() {
            let property = match class.property(&pv.name) {
                Some(property) if property.is_writable() => property,
                _ => {
                    let names = class.properties().iter().map(PropertyDescriptor::name);
                    return Err(BeansError::NotWritableProperty {
                        bean_name: bean_name.to_string(),
                        property: pv.name.clone(),
                        suggestions: property_matches(&pv.name, names),
                    });
                }
            };

            let arg_name = format!("bean property '{}'", pv.name);
            let resolved = resolver.resolve(ctx, &arg_name, &pv.value)?;
            let converted = self.converter.convert(resolved, property.ty()).map_err(|e| {
                BeansError::creation_caused(bean_name, "Error setting property values", e)
            })?;
            property.write(bean, converted).map_err(|e| {
                BeansError::creation_caused(
                    bean_name,
                    "Error setting property values",
                    e.context(format!("Failed to write {}", arg_name)),
                )
            })?;
        }
        Ok(())
    }

    /// 初始化：初始化前钩子、初始化回调、初始化后钩子
    pub(super) fn initialize_bean(
        &self,
        bean_name: &str,
        bean: BeanRef,
        mbd: &MergedBeanDefinition,
        class: Option<&BeanClass>,
    ) -> BeansResult<BeanRef> {
        let mut current = bean;

        if !mbd.synthetic {
            let processors = self.post_processors.snapshot();
            for processor in processors.iter() {
                let Some(hook) = processor.as_init_hook() else {
                    continue;
                };
                let step = hook.before_initialization(current, bean_name).map_err(|e| {
                    BeansError::creation_caused(
                        bean_name,
                        format!("Post-processor '{}' failed before initialization", processor.name()),
                        e,
                    )
                })?;
                current = match step {
                    InitStep::Continue(bean) => bean,
                    InitStep::Halt(bean) => {
                        tracing::debug!(
                            "Post-processor '{}' short-circuited initialization of bean '{}'",
                            processor.name(),
                            bean_name
                        );
                        return Ok(bean);
                    }
                };
            }
        }

        let runtime_class = self.types.class_of(&current);
        self.invoke_init_methods(bean_name, &current, mbd, runtime_class.as_deref().or(class))?;

        if mbd.synthetic {
            return Ok(current);
        }
        self.apply_after_initialization(current, bean_name)
    }

    fn invoke_init_methods(
        &self,
        bean_name: &str,
        bean: &BeanRef,
        mbd: &MergedBeanDefinition,
        class: Option<&BeanClass>,
    ) -> BeansResult<()> {
        let initializing = class
            .and_then(BeanClass::initializing_callback)
            .filter(|_| !mbd.is_externally_managed_init_method(AFTER_PROPERTIES_SET_METHOD_NAME));
        if let Some(callback) = initializing {
            tracing::trace!("Invoking after_properties_set() on bean with name '{}'", bean_name);
            callback(bean).map_err(|e| {
                BeansError::creation_caused(bean_name, "Invocation of after_properties_set failed", e)
            })?;
        }

        let Some(init_method) = mbd.init_method_name.as_deref() else {
            return Ok(());
        };
        let duplicates_protocol = init_method == AFTER_PROPERTIES_SET_METHOD_NAME
            && class.map_or(false, BeanClass::is_initializing_bean);
        if duplicates_protocol || mbd.is_externally_managed_init_method(init_method) {
            return Ok(());
        }

        let Some(method) = class.and_then(|class| class.find_method_with_minimal_params(init_method))
        else {
            if mbd.enforce_init_method {
                return Err(BeansError::DefinitionValidation {
                    bean_name: bean_name.to_string(),
                    message: format!(
                        "Could not find an init method named '{}' on bean with name '{}'",
                        init_method, bean_name
                    ),
                });
            }
            tracing::trace!(
                "No default init method named '{}' found on bean with name '{}'",
                init_method,
                bean_name
            );
            return Ok(());
        };

        if method.param_count() > 0 {
            return Err(BeansError::DefinitionValidation {
                bean_name: bean_name.to_string(),
                message: format!("Init method '{}' must not have parameters", init_method),
            });
        }

        tracing::trace!("Invoking init method '{}' on bean with name '{}'", init_method, bean_name);
        method.invoke(Some(bean), Vec::new()).map_err(|e| {
            BeansError::creation_caused(bean_name, "Invocation of init method failed", e)
        })?;
        Ok(())
    }
}
