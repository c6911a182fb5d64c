// trellis-core: Bean 生命周期引擎
//
// 按声明式定义构造、装配、初始化并销毁托管对象：
// - 单例、原型和自定义作用域
// - 父子定义合并、集合合并
// - 构造器 / 工厂方法解析，按名称、按类型、按构造器自动装配
// - 单例之间的循环引用（早期引用）
// - 后置处理器管线与销毁回调

pub mod bean;
pub mod bean_factory;
pub mod class;
pub mod config;
pub mod constants;
pub mod convert;
pub mod creation;
pub mod definition_registry;
pub mod disposable;
pub mod error;
pub mod factory_bean;
pub mod logging;
pub mod merged;
pub mod metadata;
pub mod post_processor;
pub mod property;
pub mod registry;
pub mod scope;
pub mod utils;
pub mod value;

#[cfg(test)]
mod test_support;

// 重新导出常用类型
pub use bean::{AutowireMode, BeanDefinition, DependencyCheck};
pub use bean_factory::{
    select_candidate, BeanFactory, BeanFactoryBuilder, BeanFactoryExt, ConfigurableBeanFactory,
    ConfigurableListableBeanFactory, DefaultListableBeanFactory, DependencyDescriptor,
    HierarchicalBeanFactory, ListableBeanFactory, Selection,
};
pub use class::{
    BeanClass, ClassRegistry, DisposableBean, InitializingBean, Param, Signature, TypeResolver,
};
pub use config::FactoryConfig;
pub use constants::*;
pub use convert::{ExpressionEvaluator, PlaceholderEvaluator, SimpleTypeConverter, TypeConverter};
pub use creation::CreationContext;
pub use definition_registry::{BeanDefinitionRegistry, SimpleBeanDefinitionRegistry};
pub use error::{BeansError, BeansResult};
pub use factory_bean::FactoryBean;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use merged::MergedBeanDefinition;
pub use metadata::{
    BeanReference, InnerBean, ManagedArray, ManagedList, ManagedMap, ManagedSet, MetadataValue,
    TypedStringValue,
};
pub use post_processor::{
    BeanPostProcessor, DefinitionHook, DestructionHook, Flow, InitHook, InitStep,
    InstantiationHook, PropertyHook,
};
pub use property::{ConstructorArgumentValues, PropertyValues, ValueHolder};
pub use scope::{Scope, SimpleScope};
pub use value::{BeanRef, NullBean, TypeRef, Value};

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::bean::{AutowireMode, BeanDefinition, DependencyCheck};
    pub use crate::bean_factory::{
        BeanFactory, BeanFactoryExt, ConfigurableBeanFactory, ConfigurableListableBeanFactory,
        DefaultListableBeanFactory, HierarchicalBeanFactory, ListableBeanFactory,
    };
    pub use crate::class::{BeanClass, ClassRegistry, DisposableBean, InitializingBean, Param};
    pub use crate::config::FactoryConfig;
    pub use crate::error::{BeansError, BeansResult};
    pub use crate::factory_bean::FactoryBean;
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::metadata::MetadataValue;
    pub use crate::post_processor::{
        BeanPostProcessor, DestructionHook, Flow, InitHook, InitStep, InstantiationHook,
        PropertyHook,
    };
    pub use crate::scope::{Scope, SimpleScope};
    pub use crate::utils;
    pub use crate::value::{BeanRef, TypeRef, Value};
    // Re-export anyhow for convenience
    pub use anyhow::{anyhow, Context};
}
