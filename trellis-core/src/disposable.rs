//! 销毁适配器
//!
//! [`DisposableBeanAdapter`] 在注册时就决定好一个实例的销毁方式：需要参与的
//! 销毁钩子、`DisposableBean` 回调、声明的或按约定推断的 destroy 方法。
//! 方法签名在注册时校验；销毁时的失败只记录日志，不向上传播。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::class::{BeanClass, LifecycleFn, MethodDescriptor, Signature};
use crate::constants::{CLOSE_METHOD_NAME, DESTROY_METHOD_NAME, INFER_METHOD, SHUTDOWN_METHOD_NAME};
use crate::error::{BeansError, BeansResult};
use crate::merged::MergedBeanDefinition;
use crate::post_processor::BeanPostProcessor;
use crate::value::{BeanRef, NullBean, TypeRef, Value};

/// 单个实例的销毁决定
pub struct DisposableBeanAdapter {
    bean: BeanRef,
    bean_name: String,
    disposable_callback: Option<LifecycleFn>,
    destroy_method: Option<MethodDescriptor>,
    processors: Vec<Arc<dyn BeanPostProcessor>>,
    destroyed: AtomicBool,
}

impl DisposableBeanAdapter {
    /// 为实例构造适配器；没有任何销毁动作时返回 `None`
    pub fn for_bean(
        bean: &BeanRef,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
        bean_class: Option<&BeanClass>,
        processors: &[Arc<dyn BeanPostProcessor>],
    ) -> BeansResult<Option<Self>> {
        if NullBean::is_null_bean(bean) {
            return Ok(None);
        }

        let disposable_callback = bean_class
            .and_then(|class| class.disposable_callback())
            .filter(|_| !mbd.is_externally_managed_destroy_method(DESTROY_METHOD_NAME))
            .cloned();

        let destroy_method = match Self::infer_destroy_method_name(mbd, bean_class) {
            Some(name)
                if !(disposable_callback.is_some() && name == DESTROY_METHOD_NAME)
                    && !mbd.is_externally_managed_destroy_method(&name) =>
            {
                Self::resolve_destroy_method(&name, bean_name, mbd, bean_class)?
            }
            _ => None,
        };

        let processors: Vec<Arc<dyn BeanPostProcessor>> = processors
            .iter()
            .filter(|p| {
                p.as_destruction_hook()
                    .map_or(false, |hook| hook.requires_destruction(bean))
            })
            .cloned()
            .collect();

        if disposable_callback.is_none() && destroy_method.is_none() && processors.is_empty() {
            return Ok(None);
        }

        Ok(Some(Self {
            bean: Arc::clone(bean),
            bean_name: bean_name.to_string(),
            disposable_callback,
            destroy_method,
            processors,
            destroyed: AtomicBool::new(false),
        }))
    }

    /// 声明的 destroy 方法名；`(inferred)` 或可关闭类型未声明时按约定推断
    fn infer_destroy_method_name(
        mbd: &MergedBeanDefinition,
        bean_class: Option<&BeanClass>,
    ) -> Option<String> {
        let declared = mbd.destroy_method_name.as_deref();
        let wants_inference = declared == Some(INFER_METHOD)
            || (declared.is_none() && bean_class.map_or(false, BeanClass::is_auto_closeable));

        if !wants_inference {
            return declared.filter(|name| !name.is_empty()).map(str::to_string);
        }

        let class = bean_class?;
        if class.is_disposable_bean() {
            return None;
        }
        [CLOSE_METHOD_NAME, SHUTDOWN_METHOD_NAME]
            .into_iter()
            .find(|name| class.find_method_with_minimal_params(name).is_some())
            .map(str::to_string)
    }

    fn resolve_destroy_method(
        name: &str,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
        bean_class: Option<&BeanClass>,
    ) -> BeansResult<Option<MethodDescriptor>> {
        let Some(method) = bean_class.and_then(|class| class.find_method_with_minimal_params(name))
        else {
            if mbd.enforce_destroy_method {
                return Err(BeansError::DefinitionValidation {
                    bean_name: bean_name.to_string(),
                    message: format!(
                        "Could not find a destroy method named '{}' on bean with name '{}'",
                        name, bean_name
                    ),
                });
            }
            tracing::trace!(
                "Could not find a destroy method named '{}' on bean with name '{}'",
                name,
                bean_name
            );
            return Ok(None);
        };

        match method.params() {
            [] => {}
            [param] if param.ty == TypeRef::Bool => {}
            [_] => {
                return Err(BeansError::DefinitionValidation {
                    bean_name: bean_name.to_string(),
                    message: format!(
                        "Method '{}' of bean '{}' has a non-boolean parameter - not supported as destroy method",
                        name, bean_name
                    ),
                })
            }
            _ => {
                return Err(BeansError::DefinitionValidation {
                    bean_name: bean_name.to_string(),
                    message: format!(
                        "Method '{}' of bean '{}' has more than one parameter - not supported as destroy method",
                        name, bean_name
                    ),
                })
            }
        }
        Ok(Some(method.clone()))
    }

    pub fn bean_name(&self) -> &str {
        &self.bean_name
    }

    pub fn bean(&self) -> &BeanRef {
        &self.bean
    }

    pub fn has_destroy_method(&self) -> bool {
        self.destroy_method.is_some()
    }

    pub fn destroy_method_name(&self) -> Option<&str> {
        self.destroy_method.as_ref().map(MethodDescriptor::name)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// 执行销毁：销毁钩子、`DisposableBean` 回调、destroy 方法。最多执行一次。
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            tracing::trace!("Bean '{}' has already been destroyed", self.bean_name);
            return;
        }

        for processor in &self.processors {
            if let Some(hook) = processor.as_destruction_hook() {
                if let Err(e) = hook.before_destruction(&self.bean, &self.bean_name) {
                    tracing::warn!(
                        "Destruction hook '{}' failed on bean with name '{}': {:#}",
                        processor.name(),
                        self.bean_name,
                        e
                    );
                }
            }
        }

        if let Some(callback) = &self.disposable_callback {
            tracing::trace!("Invoking destroy() on bean with name '{}'", self.bean_name);
            if let Err(e) = callback(&self.bean) {
                tracing::warn!(
                    "Invocation of destroy method failed on bean with name '{}': {:#}",
                    self.bean_name,
                    e
                );
            }
        }

        if let Some(method) = &self.destroy_method {
            let args = if method.param_count() == 1 {
                vec![Value::Bool(true)]
            } else {
                Vec::new()
            };
            tracing::trace!(
                "Invoking custom destroy method '{}' on bean with name '{}'",
                method.name(),
                self.bean_name
            );
            if let Err(e) = method.invoke(Some(&self.bean), args) {
                tracing::warn!(
                    "Custom destroy method '{}' on bean with name '{}' threw an exception: {:#}",
                    method.name(),
                    self.bean_name,
                    e
                );
            }
        }
    }
}

impl std::fmt::Debug for DisposableBeanAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposableBeanAdapter")
            .field("bean_name", &self.bean_name)
            .field("disposable", &self.disposable_callback.is_some())
            .field("destroy_method", &self.destroy_method_name())
            .field("processors", &self.processors.len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::BeanDefinition;
    use crate::class::{DisposableBean, Param};
    use crate::post_processor::DestructionHook;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Resource {
        log: Mutex<Vec<String>>,
    }

    impl Resource {
        fn record(&self, entry: impl Into<String>) {
            self.log.lock().push(entry.into());
        }
    }

    impl DisposableBean for Resource {
        fn destroy(&self) -> anyhow::Result<()> {
            self.record("destroy");
            Ok(())
        }
    }

    fn closeable_class() -> BeanClass {
        BeanClass::builder::<Resource>("Resource")
            .default_constructor()
            .method("close", vec![], |r: &Resource, _| {
                r.record("close");
                Ok(Value::Null)
            })
            .method("stop", vec![Param::unnamed(TypeRef::Bool)], |r: &Resource, args| {
                r.record(format!("stop({})", args[0]));
                Ok(Value::Null)
            })
            .method("halt", vec![Param::unnamed(TypeRef::Int)], |_r: &Resource, _| Ok(Value::Null))
            .auto_closeable()
            .build()
    }

    fn log_of(bean: &BeanRef) -> Vec<String> {
        bean.downcast_ref::<Resource>().unwrap().log.lock().clone()
    }

    struct RecordingHook;

    impl DestructionHook for RecordingHook {
        fn before_destruction(&self, bean: &BeanRef, _bean_name: &str) -> anyhow::Result<()> {
            bean.downcast_ref::<Resource>().unwrap().record("hook");
            anyhow::bail!("hook failure is only logged")
        }
    }

    impl BeanPostProcessor for RecordingHook {
        fn name(&self) -> &str {
            "recordingHook"
        }

        fn as_destruction_hook(&self) -> Option<&dyn DestructionHook> {
            Some(self)
        }
    }

    #[test]
    fn test_inferred_close_for_auto_closeable() {
        let class = closeable_class();
        let bean: BeanRef = Arc::new(Resource::default());
        let mbd = MergedBeanDefinition::from_root(&BeanDefinition::of_class("Resource"));

        let adapter = DisposableBeanAdapter::for_bean(&bean, "res", &mbd, Some(&class), &[])
            .unwrap()
            .unwrap();
        assert_eq!(adapter.destroy_method_name(), Some("close"));

        adapter.destroy();
        adapter.destroy();
        assert_eq!(log_of(&bean), vec!["close"]);
        assert!(adapter.is_destroyed());
    }

    #[test]
    fn test_hooks_then_protocol_then_custom_method() {
        let class = BeanClass::builder::<Resource>("Resource")
            .method("stop", vec![Param::unnamed(TypeRef::Bool)], |r: &Resource, args| {
                r.record(format!("stop({})", args[0]));
                Ok(Value::Null)
            })
            .disposable()
            .build();
        let bean: BeanRef = Arc::new(Resource::default());
        let mbd = MergedBeanDefinition::from_root(
            &BeanDefinition::of_class("Resource").with_destroy_method("stop"),
        );
        let processors: Vec<Arc<dyn BeanPostProcessor>> = vec![Arc::new(RecordingHook)];

        let adapter = DisposableBeanAdapter::for_bean(&bean, "res", &mbd, Some(&class), &processors)
            .unwrap()
            .unwrap();
        adapter.destroy();

        assert_eq!(log_of(&bean), vec!["hook", "destroy", "stop(true)"]);
    }

    #[test]
    fn test_invalid_destroy_signature_rejected_at_registration() {
        let class = closeable_class();
        let bean: BeanRef = Arc::new(Resource::default());
        let mbd = MergedBeanDefinition::from_root(
            &BeanDefinition::of_class("Resource").with_destroy_method("halt"),
        );

        let err = DisposableBeanAdapter::for_bean(&bean, "res", &mbd, Some(&class), &[]).unwrap_err();
        assert!(matches!(err, BeansError::DefinitionValidation { .. }));
        assert!(err.to_string().contains("non-boolean parameter"));
    }

    #[test]
    fn test_missing_destroy_method_respects_enforce_flag() {
        let class = closeable_class();
        let bean: BeanRef = Arc::new(Resource::default());

        let enforced = MergedBeanDefinition::from_root(
            &BeanDefinition::of_class("Resource").with_destroy_method("missing"),
        );
        assert!(DisposableBeanAdapter::for_bean(&bean, "res", &enforced, Some(&class), &[]).is_err());

        let lenient = MergedBeanDefinition::from_root(
            &BeanDefinition::of_class("Resource")
                .with_destroy_method("missing")
                .with_enforce_destroy_method(false),
        );
        assert!(DisposableBeanAdapter::for_bean(&bean, "res", &lenient, Some(&class), &[])
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_externally_managed_destroy_is_skipped() {
        let class = BeanClass::builder::<Resource>("Resource").disposable().build();
        let bean: BeanRef = Arc::new(Resource::default());
        let mbd = MergedBeanDefinition::from_root(&BeanDefinition::of_class("Resource"));
        mbd.register_externally_managed_destroy_method(DESTROY_METHOD_NAME);

        assert!(DisposableBeanAdapter::for_bean(&bean, "res", &mbd, Some(&class), &[])
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_null_bean_needs_no_adapter() {
        let mbd = MergedBeanDefinition::from_root(&BeanDefinition::new().with_destroy_method("close"));
        assert!(DisposableBeanAdapter::for_bean(&NullBean::bean_ref(), "n", &mbd, None, &[])
            .unwrap()
            .is_none());
    }
}
