//! Bean 后置处理器
//!
//! 提供在 Bean 创建管线各阶段进行拦截的钩子，类似 Spring 的 BeanPostProcessor。
//!
//! 一个处理器通过 [`BeanPostProcessor`] 注册，按需实现若干能力接口：
//!
//! - [`InstantiationHook`]：实例化前（可短路构造）、实例化后（可跳过属性填充）、
//!   早期引用暴露
//! - [`PropertyHook`]：属性值应用之前
//! - [`InitHook`]：初始化回调之前 / 之后
//! - [`DestructionHook`]：销毁之前
//! - [`DefinitionHook`]：合并定义的后置处理
//!
//! 管线按顺序遍历列表，只调用各处理器实际提供的能力。
//!
//! # 示例
//!
//! ```
//! use trellis_core::post_processor::{BeanPostProcessor, InitHook};
//! use trellis_core::value::BeanRef;
//!
//! struct TracingProcessor;
//!
//! impl InitHook for TracingProcessor {
//!     fn after_initialization(&self, bean: BeanRef, bean_name: &str) -> anyhow::Result<BeanRef> {
//!         tracing::info!("After initialization: {}", bean_name);
//!         Ok(bean)
//!     }
//! }
//!
//! impl BeanPostProcessor for TracingProcessor {
//!     fn name(&self) -> &str {
//!         "tracingProcessor"
//!     }
//!
//!     fn as_init_hook(&self) -> Option<&dyn InitHook> {
//!         Some(self)
//!     }
//! }
//! ```

use parking_lot::RwLock;
use std::sync::Arc;

use crate::class::BeanClass;
use crate::merged::MergedBeanDefinition;
use crate::property::PropertyValues;
use crate::value::BeanRef;

/// 默认顺序；数值越小越先执行
pub const DEFAULT_ORDER: i32 = 1000;

/// 实例化后钩子的决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// 跳过属性填充和初始化，实例按原样返回
    Halt,
}

/// 初始化前钩子的决定
pub enum InitStep {
    /// 以（可能被替换的）实例继续
    Continue(BeanRef),
    /// 跳过剩余的初始化步骤，直接以该实例作为结果
    Halt(BeanRef),
}

/// 实例化阶段
pub trait InstantiationHook: Send + Sync {
    /// 实例化之前调用；返回 `Some` 时跳过正常构造，只再执行初始化后钩子
    fn before_instantiation(
        &self,
        _bean_class: Option<&BeanClass>,
        _bean_name: &str,
    ) -> anyhow::Result<Option<BeanRef>> {
        Ok(None)
    }

    /// 构造之后、属性填充之前调用
    fn after_instantiation(&self, _bean: &BeanRef, _bean_name: &str) -> anyhow::Result<Flow> {
        Ok(Flow::Continue)
    }

    /// 循环引用时暴露给其他 Bean 的早期引用（例如提前创建包装）
    fn early_bean_reference(&self, bean: BeanRef, _bean_name: &str) -> anyhow::Result<BeanRef> {
        Ok(bean)
    }
}

/// 属性应用阶段
pub trait PropertyHook: Send + Sync {
    /// 在属性值应用之前调整它们；返回 `None` 表示跳过属性应用
    fn post_process_properties(
        &self,
        values: PropertyValues,
        bean: &BeanRef,
        bean_name: &str,
    ) -> anyhow::Result<Option<PropertyValues>>;
}

/// 初始化阶段
pub trait InitHook: Send + Sync {
    /// 在初始化回调（`after_properties_set`、init 方法）之前调用
    fn before_initialization(&self, bean: BeanRef, _bean_name: &str) -> anyhow::Result<InitStep> {
        Ok(InitStep::Continue(bean))
    }

    /// 在初始化回调之后调用，可以返回包装后的实例
    fn after_initialization(&self, bean: BeanRef, _bean_name: &str) -> anyhow::Result<BeanRef> {
        Ok(bean)
    }
}

/// 销毁阶段
pub trait DestructionHook: Send + Sync {
    /// 该实例是否需要本处理器参与销毁
    fn requires_destruction(&self, _bean: &BeanRef) -> bool {
        true
    }

    fn before_destruction(&self, bean: &BeanRef, bean_name: &str) -> anyhow::Result<()>;
}

/// 合并定义后置处理
///
/// 每个合并定义只执行一次。合并定义本身只读，处理器可以通过
/// `register_externally_managed_*` 接管 init / destroy 方法的调用。
pub trait DefinitionHook: Send + Sync {
    fn post_process_merged_definition(
        &self,
        definition: &MergedBeanDefinition,
        bean_class: Option<&BeanClass>,
        bean_name: &str,
    ) -> anyhow::Result<()>;
}

/// 后置处理器
pub trait BeanPostProcessor: Send + Sync {
    /// 处理器标识；重复注册同名处理器时后注册者生效
    fn name(&self) -> &str;

    /// 执行顺序，数值越小越先执行
    fn order(&self) -> i32 {
        DEFAULT_ORDER
    }

    fn as_instantiation_hook(&self) -> Option<&dyn InstantiationHook> {
        None
    }

    fn as_property_hook(&self) -> Option<&dyn PropertyHook> {
        None
    }

    fn as_init_hook(&self) -> Option<&dyn InitHook> {
        None
    }

    fn as_destruction_hook(&self) -> Option<&dyn DestructionHook> {
        None
    }

    fn as_definition_hook(&self) -> Option<&dyn DefinitionHook> {
        None
    }
}

/// 处理器列表快照
pub type ProcessorList = Arc<Vec<Arc<dyn BeanPostProcessor>>>;

/// 有序的后置处理器列表
///
/// 读多写少：读取方拿到一份不可变快照，注册时整体替换。
#[derive(Default)]
pub struct PostProcessors {
    processors: RwLock<ProcessorList>,
}

impl PostProcessors {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器；同名处理器被移除后重新按顺序插入
    pub fn add(&self, processor: Arc<dyn BeanPostProcessor>) {
        let mut guard = self.processors.write();
        let mut list: Vec<Arc<dyn BeanPostProcessor>> = guard
            .iter()
            .filter(|p| p.name() != processor.name())
            .cloned()
            .collect();
        tracing::debug!(
            "Registering bean post processor '{}' with order {}",
            processor.name(),
            processor.order()
        );
        list.push(processor);
        list.sort_by_key(|p| p.order());
        *guard = Arc::new(list);
    }

    pub fn remove(&self, name: &str) -> bool {
        let mut guard = self.processors.write();
        let before = guard.len();
        let list: Vec<_> = guard.iter().filter(|p| p.name() != name).cloned().collect();
        let removed = list.len() != before;
        *guard = Arc::new(list);
        removed
    }

    pub fn snapshot(&self) -> ProcessorList {
        Arc::clone(&self.processors.read())
    }

    pub fn names(&self) -> Vec<String> {
        self.processors.read().iter().map(|p| p.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.processors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.read().is_empty()
    }

    pub fn has_instantiation_hooks(&self) -> bool {
        self.processors
            .read()
            .iter()
            .any(|p| p.as_instantiation_hook().is_some())
    }

    pub fn has_destruction_hooks(&self) -> bool {
        self.processors
            .read()
            .iter()
            .any(|p| p.as_destruction_hook().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        name: &'static str,
        order: i32,
    }

    impl InitHook for Named {}

    impl BeanPostProcessor for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn order(&self) -> i32 {
            self.order
        }

        fn as_init_hook(&self) -> Option<&dyn InitHook> {
            Some(self)
        }
    }

    fn named(name: &'static str, order: i32) -> Arc<dyn BeanPostProcessor> {
        Arc::new(Named { name, order })
    }

    #[test]
    fn test_processors_sorted_by_order() {
        let processors = PostProcessors::new();
        processors.add(named("late", 2000));
        processors.add(named("early", 10));
        processors.add(named("default", DEFAULT_ORDER));

        assert_eq!(processors.names(), vec!["early", "default", "late"]);
        assert!(!processors.has_instantiation_hooks());
        assert!(!processors.has_destruction_hooks());
    }

    #[test]
    fn test_duplicate_name_last_registration_wins() {
        let processors = PostProcessors::new();
        processors.add(named("a", 1));
        processors.add(named("b", 2));
        processors.add(named("a", 3));

        assert_eq!(processors.names(), vec!["b", "a"]);
        assert_eq!(processors.len(), 2);
    }

    #[test]
    fn test_snapshot_is_not_affected_by_later_registration() {
        let processors = PostProcessors::new();
        processors.add(named("a", 1));
        let snapshot = processors.snapshot();
        processors.add(named("b", 2));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(processors.len(), 2);
        assert!(processors.remove("a"));
        assert!(!processors.remove("a"));
    }
}
