use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::metadata::MetadataValue;
use crate::property::{ConstructorArgumentValues, PropertyValues, ValueHolder};
use crate::value::BeanRef;

/// 实例提供者：直接产生原始实例，跳过构造器解析
pub type InstanceSupplier = Arc<dyn Fn() -> anyhow::Result<BeanRef> + Send + Sync>;

/// 自动装配模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutowireMode {
    #[default]
    No,
    ByName,
    ByType,
    Constructor,
}

/// 依赖检查策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyCheck {
    #[default]
    None,
    /// 只检查简单类型（基本类型与字符串）
    Simple,
    /// 只检查对象类型
    Objects,
    All,
}

/// Bean 定义 - 描述如何创建和管理 Bean
///
/// 原始定义由定义源持有，可以随时修改；工厂只读取它，并在合并后缓存
/// 一份 [`MergedBeanDefinition`](crate::merged::MergedBeanDefinition)。
/// `Option` 字段为 `None` 表示"未声明"，合并时从父定义继承。
#[derive(Clone, Default)]
pub struct BeanDefinition {
    /// 父定义名称
    pub parent_name: Option<String>,

    /// 具体类型名称，由类型解析器解析
    pub class_name: Option<String>,

    /// 作用域（默认：单例）
    pub scope: Option<String>,

    /// 抽象定义只能作为父定义使用，不会被实例化
    pub is_abstract: bool,

    /// 是否延迟初始化（仅对单例有效）
    pub lazy_init: Option<bool>,

    /// 必须先于本 Bean 初始化的 Bean
    pub depends_on: Vec<String>,

    pub autowire_mode: Option<AutowireMode>,

    pub dependency_check: Option<DependencyCheck>,

    /// 是否可作为按类型自动装配的候选
    pub autowire_candidate: Option<bool>,

    /// 多个候选时优先选择
    pub primary: Option<bool>,

    pub property_values: PropertyValues,

    pub constructor_args: ConstructorArgumentValues,

    /// 工厂 Bean 名称（实例工厂方法）
    pub factory_bean_name: Option<String>,

    /// 工厂方法名称
    pub factory_method_name: Option<String>,

    pub init_method_name: Option<String>,

    /// destroy 方法名称，`(inferred)` 表示按约定推断
    pub destroy_method_name: Option<String>,

    /// 声明的 init 方法不存在时是否报错
    pub enforce_init_method: bool,

    /// 声明的 destroy 方法不存在时是否报错
    pub enforce_destroy_method: bool,

    /// 由容器自身合成的定义，不经过后置处理器
    pub synthetic: bool,

    pub instance_supplier: Option<InstanceSupplier>,

    pub description: Option<String>,
}

impl BeanDefinition {
    pub fn new() -> Self {
        Self {
            enforce_init_method: true,
            enforce_destroy_method: true,
            ..Self::default()
        }
    }

    /// 指定类型的定义
    pub fn of_class(class_name: impl Into<String>) -> Self {
        Self::new().with_class(class_name)
    }

    /// 继承父定义的子定义
    pub fn child_of(parent_name: impl Into<String>) -> Self {
        Self::new().with_parent(parent_name)
    }

    pub fn with_parent(mut self, parent_name: impl Into<String>) -> Self {
        self.parent_name = Some(parent_name.into());
        self
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    /// 设置作用域
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_abstract(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    /// 设置延迟初始化
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy_init = Some(lazy);
        self
    }

    /// 设置依赖列表
    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn with_autowire(mut self, mode: AutowireMode) -> Self {
        self.autowire_mode = Some(mode);
        self
    }

    pub fn with_dependency_check(mut self, check: DependencyCheck) -> Self {
        self.dependency_check = Some(check);
        self
    }

    pub fn with_autowire_candidate(mut self, candidate: bool) -> Self {
        self.autowire_candidate = Some(candidate);
        self
    }

    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = Some(primary);
        self
    }

    /// 添加属性值
    pub fn with_property(mut self, name: impl Into<String>, value: MetadataValue) -> Self {
        self.property_values.add(name, value);
        self
    }

    /// 添加按索引的构造器参数
    pub fn with_constructor_arg(mut self, index: usize, value: MetadataValue) -> Self {
        self.constructor_args.add_indexed(index, value);
        self
    }

    /// 添加泛型构造器参数（按类型/名称匹配参数位置）
    pub fn with_generic_arg(mut self, holder: ValueHolder) -> Self {
        self.constructor_args.add_generic_holder(holder);
        self
    }

    /// 使用实例工厂方法：`factory_bean.factory_method(..)`
    pub fn with_factory_bean(
        mut self,
        factory_bean_name: impl Into<String>,
        factory_method_name: impl Into<String>,
    ) -> Self {
        self.factory_bean_name = Some(factory_bean_name.into());
        self.factory_method_name = Some(factory_method_name.into());
        self
    }

    /// 使用本类型上的静态工厂方法
    pub fn with_factory_method(mut self, factory_method_name: impl Into<String>) -> Self {
        self.factory_method_name = Some(factory_method_name.into());
        self
    }

    /// 设置 init 方法
    pub fn with_init_method(mut self, name: impl Into<String>) -> Self {
        self.init_method_name = Some(name.into());
        self
    }

    /// 设置 destroy 方法
    pub fn with_destroy_method(mut self, name: impl Into<String>) -> Self {
        self.destroy_method_name = Some(name.into());
        self
    }

    pub fn with_enforce_init_method(mut self, enforce: bool) -> Self {
        self.enforce_init_method = enforce;
        self
    }

    pub fn with_enforce_destroy_method(mut self, enforce: bool) -> Self {
        self.enforce_destroy_method = enforce;
        self
    }

    pub fn with_synthetic(mut self, synthetic: bool) -> Self {
        self.synthetic = synthetic;
        self
    }

    /// 设置实例提供者
    pub fn with_instance_supplier<F>(mut self, supplier: F) -> Self
    where
        F: Fn() -> anyhow::Result<BeanRef> + Send + Sync + 'static,
    {
        self.instance_supplier = Some(Arc::new(supplier));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn has_constructor_args(&self) -> bool {
        !self.constructor_args.is_empty()
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("parent_name", &self.parent_name)
            .field("class_name", &self.class_name)
            .field("scope", &self.scope)
            .field("is_abstract", &self.is_abstract)
            .field("lazy_init", &self.lazy_init)
            .field("depends_on", &self.depends_on)
            .field("autowire_mode", &self.autowire_mode)
            .field("property_values", &self.property_values.names())
            .field("constructor_args", &self.constructor_args.argument_count())
            .field("factory_bean_name", &self.factory_bean_name)
            .field("factory_method_name", &self.factory_method_name)
            .field("instance_supplier", &self.instance_supplier.is_some())
            .finish()
    }
}
