//! Bean Factory - 核心容器接口
//!
//! 参考 Spring 的 BeanFactory 架构设计：
//!
//! - [`BeanFactory`]：按名称获取 Bean 的最小接口（可作为 trait object）
//! - [`HierarchicalBeanFactory`]：父子工厂
//! - [`ListableBeanFactory`]：按类型列举
//! - [`ConfigurableBeanFactory`]：作用域、后置处理器、依赖关系、销毁
//! - [`ConfigurableListableBeanFactory`]：定义注册、预实例化、依赖解析
//!
//! [`DefaultListableBeanFactory`] 是唯一的实现，创建管线分布在子模块中：
//! 构造器 / 工厂方法选择、声明式值解析、属性填充与初始化。

mod constructor_resolver;
mod populate;
mod value_resolver;

use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use crate::bean::{AutowireMode, BeanDefinition};
use crate::class::{BeanClass, ClassRegistry, Signature, TypeResolver};
use crate::config::FactoryConfig;
use crate::constants::{FACTORY_BEAN_PREFIX, RESERVED_SCOPE_NAMES};
use crate::convert::{ExpressionEvaluator, SimpleTypeConverter, TypeConverter};
use crate::creation::CreationContext;
use crate::definition_registry::{BeanDefinitionRegistry, SimpleBeanDefinitionRegistry};
use crate::disposable::DisposableBeanAdapter;
use crate::error::{BeansError, BeansResult};
use crate::factory_bean::{FactoryBean, FactoryBeanObjectCache};
use crate::merged::{DefinitionMerger, MergedBeanDefinition};
use crate::post_processor::{BeanPostProcessor, Flow, PostProcessors};
use crate::registry::{EarlyReferenceFactory, SingletonRegistry};
use crate::scope::Scope;
use crate::utils::dependency::{validate_dependency_graph, DependencyValidationError};
use crate::utils::naming::{is_factory_dereference, original_bean_name, transformed_bean_name};
use crate::value::{BeanRef, NullBean, TypeRef, Value};

pub use constructor_resolver::{select_candidate, Selection};

/// BeanFactory - 最基础的容器接口
///
/// 注意：此 trait 不包含泛型方法，因此可以作为 trait object 使用
pub trait BeanFactory: Send + Sync {
    /// 通过名称（或别名、`&` 前缀名称）获取 Bean
    fn get_bean(&self, name: &str) -> BeansResult<BeanRef>;

    /// 使用显式构造参数获取 Bean（仅对非单例有意义）
    fn get_bean_with_args(&self, name: &str, args: Vec<Value>) -> BeansResult<BeanRef>;

    /// 获取 Bean 并转换为要求的类型
    fn get_bean_of_type(&self, name: &str, required_type: &TypeRef) -> BeansResult<BeanRef>;

    fn contains_bean(&self, name: &str) -> bool;

    fn is_singleton(&self, name: &str) -> BeansResult<bool>;

    fn is_prototype(&self, name: &str) -> BeansResult<bool>;

    /// 该名称的 Bean 是否可以赋值给指定类型
    fn is_type_match(&self, name: &str, type_name: &str) -> BeansResult<bool>;

    fn aliases(&self, name: &str) -> Vec<String>;
}

/// BeanFactoryExt - BeanFactory 的扩展 trait
///
/// 提供泛型方法，不能作为 trait object 使用
pub trait BeanFactoryExt: BeanFactory {
    /// 获取 Bean 并向下转型为具体类型
    fn get_bean_typed<T: Any + Send + Sync>(&self, name: &str) -> BeansResult<Arc<T>> {
        let bean = self.get_bean(name)?;
        bean.downcast::<T>().map_err(|_| BeansError::TypeMismatch {
            value_type: "bean".to_string(),
            required_type: std::any::type_name::<T>().to_string(),
            message: format!("Bean named '{}' is not of the required type", name),
        })
    }
}

impl<F: BeanFactory + ?Sized> BeanFactoryExt for F {}

/// 父子工厂
pub trait HierarchicalBeanFactory: BeanFactory {
    fn parent_bean_factory(&self) -> Option<Arc<dyn ConfigurableBeanFactory>>;

    /// 只在本工厂中查找，不询问父工厂
    fn contains_local_bean(&self, name: &str) -> bool;
}

/// ListableBeanFactory - 可列举的 Bean 工厂
pub trait ListableBeanFactory: BeanFactory {
    fn contains_bean_definition(&self, name: &str) -> bool;

    fn bean_definition_count(&self) -> usize;

    fn bean_definition_names(&self) -> Vec<String>;

    /// 可以赋值给指定类型的 Bean 名称
    ///
    /// FactoryBean 按其产品类型匹配；`allow_eager_init` 为 false 时不会为了
    /// 判断类型而创建尚未创建的 FactoryBean。
    fn bean_names_for_type(
        &self,
        type_name: &str,
        include_non_singletons: bool,
        allow_eager_init: bool,
    ) -> Vec<String>;

    /// 指定类型的所有 Bean（按定义注册顺序）
    fn beans_of_type(&self, type_name: &str) -> BeansResult<Vec<(String, BeanRef)>>;

    /// 唯一匹配指定类型的 Bean
    fn get_bean_by_type(&self, type_name: &str) -> BeansResult<BeanRef>;
}

/// 按类型解析依赖时的描述
#[derive(Debug, Clone)]
pub struct DependencyDescriptor {
    pub type_name: String,
    /// 注入点名称（参数名或属性名），多个候选时用于按名称消歧
    pub name: Option<String>,
    pub required: bool,
}

impl DependencyDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: None,
            required: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// ConfigurableBeanFactory - 可配置的 Bean 工厂
pub trait ConfigurableBeanFactory: HierarchicalBeanFactory {
    /// 注册自定义作用域；`singleton` 与 `prototype` 不能被替换
    fn register_scope(&self, name: &str, scope: Arc<dyn Scope>) -> BeansResult<()>;

    fn registered_scope_names(&self) -> Vec<String>;

    fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>);

    fn register_alias(&self, name: &str, alias: &str) -> BeansResult<()>;

    /// 直接注册一个完成的单例实例
    fn register_singleton(&self, name: &str, bean: BeanRef) -> BeansResult<()>;

    /// 合并后的定义（本地没有时询问父工厂）
    fn merged_bean_definition(&self, name: &str) -> BeansResult<Arc<MergedBeanDefinition>>;

    fn is_factory_bean(&self, name: &str) -> BeansResult<bool>;

    fn is_currently_in_creation(&self, name: &str) -> bool;

    /// 登记依赖边：`dependent_bean_name` 依赖 `bean_name`
    fn register_dependent_bean(&self, bean_name: &str, dependent_bean_name: &str);

    fn dependent_beans(&self, bean_name: &str) -> Vec<String>;

    fn dependencies_for_bean(&self, bean_name: &str) -> Vec<String>;

    /// 按类型解析依赖；`requesting_bean` 不为空时登记依赖边并排除自引用
    fn resolve_dependency(
        &self,
        descriptor: &DependencyDescriptor,
        requesting_bean: Option<&str>,
    ) -> BeansResult<Option<BeanRef>>;

    /// 按定义执行给定实例的销毁回调
    fn destroy_bean(&self, name: &str, bean: BeanRef) -> BeansResult<()>;

    /// 从自定义作用域中移除并销毁实例
    fn destroy_scoped_bean(&self, name: &str) -> BeansResult<()>;

    fn destroy_singletons(&self);

    fn destroy_singleton(&self, name: &str);
}

/// ConfigurableListableBeanFactory - 可配置且可列举的 Bean 工厂
pub trait ConfigurableListableBeanFactory: ListableBeanFactory + ConfigurableBeanFactory {
    fn register_bean_definition(&self, name: &str, definition: BeanDefinition) -> BeansResult<()>;

    fn remove_bean_definition(&self, name: &str) -> BeansResult<()>;

    fn bean_definition(&self, name: &str) -> BeansResult<Arc<BeanDefinition>>;

    /// 预实例化所有非延迟单例
    fn preinstantiate_singletons(&self) -> BeansResult<()>;

    /// 冻结配置：之后按类型查找的结果可以缓存
    fn freeze_configuration(&self);

    fn is_configuration_frozen(&self) -> bool;

    /// 校验 depends-on 图：缺失的 Bean 与循环
    fn validate_dependencies(&self) -> BeansResult<()>;
}

/// DefaultListableBeanFactory - ConfigurableListableBeanFactory 的默认实现
pub struct DefaultListableBeanFactory {
    config: FactoryConfig,

    /// 原始定义与别名
    definitions: Arc<dyn BeanDefinitionRegistry>,

    merger: DefinitionMerger,

    singletons: SingletonRegistry,

    /// FactoryBean 产出的单例对象
    factory_bean_objects: FactoryBeanObjectCache,

    post_processors: PostProcessors,

    scopes: RwLock<HashMap<String, Arc<dyn Scope>>>,

    types: Arc<dyn TypeResolver>,

    converter: Arc<dyn TypeConverter>,

    evaluator: Option<Arc<dyn ExpressionEvaluator>>,

    parent: Option<Arc<dyn ConfigurableBeanFactory>>,

    /// 各线程上正在创建的非单例 Bean；覆盖经由公开 `get_bean` 的重入
    prototypes_in_creation: Mutex<HashSet<(ThreadId, String)>>,

    configuration_frozen: AtomicBool,

    /// 冻结后按类型查找的结果：(类型名, 是否包含非单例) -> 名称
    names_by_type: RwLock<HashMap<(String, bool), Vec<String>>>,
}

/// [`DefaultListableBeanFactory`] 构建器
#[derive(Default)]
pub struct BeanFactoryBuilder {
    config: Option<FactoryConfig>,
    definitions: Option<Arc<dyn BeanDefinitionRegistry>>,
    types: Option<Arc<dyn TypeResolver>>,
    converter: Option<Arc<dyn TypeConverter>>,
    evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    parent: Option<Arc<dyn ConfigurableBeanFactory>>,
}

impl BeanFactoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: FactoryConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 使用外部提供的定义源（默认是内存注册表）
    pub fn with_definition_registry(mut self, definitions: Arc<dyn BeanDefinitionRegistry>) -> Self {
        self.definitions = Some(definitions);
        self
    }

    pub fn with_type_resolver(mut self, types: Arc<dyn TypeResolver>) -> Self {
        self.types = Some(types);
        self
    }

    pub fn with_type_converter(mut self, converter: Arc<dyn TypeConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn with_expression_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn with_parent(mut self, parent: Arc<dyn ConfigurableBeanFactory>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn build(self) -> DefaultListableBeanFactory {
        let config = self.config.unwrap_or_default();

        if let Some(logging) = &config.logging {
            if let Err(e) = logging.clone().init() {
                tracing::debug!("Skipping logging initialization: {:#}", e);
            }
        }

        let types = self
            .types
            .unwrap_or_else(|| Arc::new(ClassRegistry::new()) as Arc<dyn TypeResolver>);
        let converter = self.converter.unwrap_or_else(|| {
            Arc::new(SimpleTypeConverter::with_type_resolver(Arc::clone(&types))) as Arc<dyn TypeConverter>
        });
        let definitions = self.definitions.unwrap_or_else(|| {
            Arc::new(SimpleBeanDefinitionRegistry::with_overriding(
                config.allow_bean_definition_overriding,
            )) as Arc<dyn BeanDefinitionRegistry>
        });

        tracing::debug!(
            "Creating bean factory (circular references: {}, parent: {})",
            config.allow_circular_references,
            self.parent.is_some()
        );

        DefaultListableBeanFactory {
            merger: DefinitionMerger::new(config.cache_bean_metadata),
            config,
            definitions,
            singletons: SingletonRegistry::new(),
            factory_bean_objects: FactoryBeanObjectCache::new(),
            post_processors: PostProcessors::new(),
            scopes: RwLock::new(HashMap::new()),
            types,
            converter,
            evaluator: self.evaluator,
            parent: self.parent,
            prototypes_in_creation: Mutex::new(HashSet::new()),
            configuration_frozen: AtomicBool::new(false),
            names_by_type: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for DefaultListableBeanFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultListableBeanFactory {
    pub fn new() -> Self {
        BeanFactoryBuilder::new().build()
    }

    pub fn builder() -> BeanFactoryBuilder {
        BeanFactoryBuilder::new()
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn type_resolver(&self) -> &Arc<dyn TypeResolver> {
        &self.types
    }

    pub fn post_processor_count(&self) -> usize {
        self.post_processors.len()
    }

    /// 单例槽位状态（`early-factory` / `early-exposed` / `finished`）
    pub fn singleton_state(&self, name: &str) -> Option<&'static str> {
        self.singletons.slot_state(&self.canonical_name(name))
    }

    /// 已完成的单例名称（注册顺序）
    pub fn singleton_names(&self) -> Vec<String> {
        self.singletons.singleton_names()
    }

    pub(crate) fn canonical_name(&self, name: &str) -> String {
        self.definitions.canonical_name(name)
    }

    fn scope(&self, name: &str) -> Option<Arc<dyn Scope>> {
        self.scopes.read().get(name).cloned()
    }

    fn no_scope_registered(scope_name: &str) -> BeansError {
        BeansError::IllegalState(format!("No Scope registered for scope name '{}'", scope_name))
    }

    // ---- 获取 Bean ----

    /// 获取 Bean 的完整流程
    ///
    /// `type_check_only` 为 true 时不标记“已创建”，用于类型判断。
    pub(crate) fn do_get_bean(
        &self,
        name: &str,
        required_type: Option<&TypeRef>,
        args: Option<Vec<Value>>,
        type_check_only: bool,
        ctx: &mut CreationContext,
    ) -> BeansResult<BeanRef> {
        let bean_name = self.canonical_name(transformed_bean_name(name));
        tracing::trace!("Requesting bean '{}'", bean_name);

        let shared = match args {
            None => self.singletons.get_singleton(&bean_name, true, ctx)?,
            Some(_) => None,
        };
        if let Some(shared) = shared {
            tracing::trace!("Returning cached instance of singleton bean '{}'", bean_name);
            let bean = self.object_for_bean_instance(shared, name, &bean_name, None)?;
            return self.adapt_bean_instance(name, bean, required_type);
        }

        if self.is_prototype_in_creation(&bean_name, ctx) {
            return Err(BeansError::currently_in_creation(&bean_name));
        }

        if !self.definitions.contains_bean_definition(&bean_name) {
            if let Some(parent) = &self.parent {
                let original = original_bean_name(name, &bean_name);
                tracing::trace!("Delegating lookup of bean '{}' to parent factory", original);
                let bean = match args {
                    Some(args) => parent.get_bean_with_args(&original, args)?,
                    None => parent.get_bean(&original)?,
                };
                return self.adapt_bean_instance(name, bean, required_type);
            }
        }

        if !type_check_only {
            self.merger.mark_bean_as_created(&bean_name);
        }
        let bean = match self.create_in_scope(name, &bean_name, args, ctx) {
            Ok(bean) => bean,
            Err(e) => {
                if !type_check_only {
                    self.merger.cleanup_after_bean_creation_failure(&bean_name);
                }
                return Err(e);
            }
        };
        self.adapt_bean_instance(name, bean, required_type)
    }

    /// 按作用域分派创建
    fn create_in_scope(
        &self,
        name: &str,
        bean_name: &str,
        args: Option<Vec<Value>>,
        ctx: &mut CreationContext,
    ) -> BeansResult<BeanRef> {
        let mbd = self.merged_local_bean_definition(bean_name)?;
        if mbd.is_abstract {
            return Err(BeansError::BeanIsAbstract {
                bean_name: bean_name.to_string(),
            });
        }

        self.initialize_depends_on(bean_name, &mbd, ctx)?;

        let instance = if mbd.is_singleton() {
            self.singletons.get_or_create(bean_name, ctx, |ctx| {
                self.create_bean(bean_name, &mbd, args, ctx).map_err(|e| {
                    // 移除可能已经暴露的早期引用，并级联销毁依赖它的 Bean
                    self.singletons.destroy_singleton(bean_name);
                    e
                })
            })?
        } else if mbd.is_prototype() {
            if !self.begin_prototype(bean_name, ctx) {
                return Err(BeansError::currently_in_creation(bean_name));
            }
            tracing::debug!("Creating new instance of prototype bean '{}'", bean_name);
            let created = self.create_bean(bean_name, &mbd, args, ctx);
            self.end_prototype(bean_name, ctx);
            created?
        } else {
            let scope = self
                .scope(&mbd.scope)
                .ok_or_else(|| Self::no_scope_registered(&mbd.scope))?;
            let mut args = args;
            scope.get(bean_name, &mut || {
                if !self.begin_prototype(bean_name, ctx) {
                    return Err(BeansError::currently_in_creation(bean_name));
                }
                let created = self.create_bean(bean_name, &mbd, args.take(), ctx);
                self.end_prototype(bean_name, ctx);
                created
            })?
        };

        self.object_for_bean_instance(instance, name, bean_name, Some(&mbd))
    }

    /// 标记非单例 Bean 开始创建；同一线程上已在创建时返回 `false`
    fn begin_prototype(&self, bean_name: &str, ctx: &mut CreationContext) -> bool {
        let key = (ctx.thread(), bean_name.to_string());
        if !self.prototypes_in_creation.lock().insert(key) {
            return false;
        }
        if !ctx.begin_prototype(bean_name) {
            self.prototypes_in_creation
                .lock()
                .remove(&(ctx.thread(), bean_name.to_string()));
            return false;
        }
        true
    }

    fn end_prototype(&self, bean_name: &str, ctx: &mut CreationContext) {
        ctx.end_prototype(bean_name);
        self.prototypes_in_creation
            .lock()
            .remove(&(ctx.thread(), bean_name.to_string()));
    }

    fn is_prototype_in_creation(&self, bean_name: &str, ctx: &CreationContext) -> bool {
        ctx.is_prototype_in_creation(bean_name)
            || self
                .prototypes_in_creation
                .lock()
                .contains(&(ctx.thread(), bean_name.to_string()))
    }

    /// 先创建 depends-on 声明的 Bean
    fn initialize_depends_on(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
        ctx: &mut CreationContext,
    ) -> BeansResult<()> {
        for dep in &mbd.depends_on {
            let dep_name = self.canonical_name(transformed_bean_name(dep));
            if self.singletons.is_dependent(bean_name, &dep_name) {
                return Err(BeansError::creation(
                    bean_name,
                    format!(
                        "Circular depends-on relationship between '{}' and '{}'",
                        bean_name, dep
                    ),
                ));
            }
            self.singletons.register_dependent_bean(&dep_name, bean_name);

            if let Err(e) = self.do_get_bean(dep, None, None, false, ctx) {
                let message = if matches!(e, BeansError::NoSuchBean { .. }) {
                    format!("'{}' depends on missing bean '{}'", bean_name, dep)
                } else {
                    format!("Failed to initialize dependency '{}' of bean '{}'", dep, bean_name)
                };
                return Err(BeansError::creation_caused(bean_name, message, e));
            }
        }
        Ok(())
    }

    /// 按要求的类型适配实例
    fn adapt_bean_instance(
        &self,
        name: &str,
        bean: BeanRef,
        required_type: Option<&TypeRef>,
    ) -> BeansResult<BeanRef> {
        let Some(required) = required_type else {
            return Ok(bean);
        };
        if self.instance_has_type(&bean, required) {
            return Ok(bean);
        }

        let value = Value::from_bean_ref(bean);
        let kind = value.kind();
        self.converter
            .convert(value, required)
            .map(Value::into_bean_ref)
            .map_err(|e| BeansError::TypeMismatch {
                value_type: kind.to_string(),
                required_type: required.to_string(),
                message: format!("Bean named '{}' is not of the required type: {}", name, e),
            })
    }

    fn instance_has_type(&self, bean: &BeanRef, ty: &TypeRef) -> bool {
        match ty {
            TypeRef::Any => true,
            TypeRef::Object(type_name) => self.types.is_instance_of(bean, type_name),
            other => other.accepts_kind(&Value::from_bean_ref(Arc::clone(bean))),
        }
    }

    // ---- 创建 Bean ----

    /// 创建 Bean 实例：实例化前钩子、实例化、填充、初始化
    pub(crate) fn create_bean(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
        args: Option<Vec<Value>>,
        ctx: &mut CreationContext,
    ) -> BeansResult<BeanRef> {
        tracing::trace!("Creating instance of bean '{}'", bean_name);
        let class = self.resolve_bean_class(mbd, bean_name)?;

        if let Some(bean) = self.resolve_before_instantiation(bean_name, mbd, class.as_deref())? {
            tracing::debug!("Bean '{}' was short-circuited by a post-processor", bean_name);
            return Ok(bean);
        }

        ctx.push_creating(bean_name);
        let result = self.do_create_bean(bean_name, mbd, class, args, ctx);
        ctx.pop_creating();

        if result.is_ok() {
            tracing::trace!("Finished creating instance of bean '{}'", bean_name);
        }
        result
    }

    fn resolve_before_instantiation(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
        class: Option<&BeanClass>,
    ) -> BeansResult<Option<BeanRef>> {
        if mbd.synthetic
            || mbd.before_instantiation_resolved() == Some(false)
            || !self.post_processors.has_instantiation_hooks()
        {
            return Ok(None);
        }

        let processors = self.post_processors.snapshot();
        let mut bean = None;
        for processor in processors.iter() {
            let Some(hook) = processor.as_instantiation_hook() else {
                continue;
            };
            let candidate = hook.before_instantiation(class, bean_name).map_err(|e| {
                BeansError::creation_caused(
                    bean_name,
                    format!("Post-processor '{}' failed before instantiation", processor.name()),
                    e,
                )
            })?;
            if candidate.is_some() {
                bean = candidate;
                break;
            }
        }

        let bean = match bean {
            Some(bean) => Some(self.apply_after_initialization(bean, bean_name)?),
            None => None,
        };
        mbd.set_before_instantiation_resolved(bean.is_some());
        Ok(bean)
    }

    fn do_create_bean(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
        class: Option<Arc<BeanClass>>,
        args: Option<Vec<Value>>,
        ctx: &mut CreationContext,
    ) -> BeansResult<BeanRef> {
        let raw = self.create_bean_instance(bean_name, mbd, class.as_deref(), args, ctx)?;
        if NullBean::is_null_bean(&raw) {
            return Ok(raw);
        }

        // 工厂方法产出的实例以其运行时类型为准
        let bean_class = self.types.class_of(&raw).or(class);
        let bean_class = bean_class.as_deref();

        mbd.post_process_once(|| self.apply_definition_hooks(bean_name, mbd, bean_class))?;

        let early_exposure = mbd.is_singleton()
            && self.config.allow_circular_references
            && self.singletons.is_currently_in_creation_by(bean_name, ctx);
        if early_exposure {
            tracing::trace!(
                "Eagerly caching bean '{}' to allow for resolving potential circular references",
                bean_name
            );
            self.singletons
                .add_singleton_factory(bean_name, self.early_reference_factory(bean_name, mbd, &raw))?;
        }

        let exposed = self
            .populate_bean(bean_name, mbd, bean_class, &raw, ctx)
            .and_then(|flow| match flow {
                Flow::Halt => Ok(Arc::clone(&raw)),
                Flow::Continue => {
                    self.initialize_bean(bean_name, Arc::clone(&raw), mbd, bean_class)
                }
            })
            .map_err(|e| Self::wrap_creation_failure(bean_name, e))?;

        let exposed = if early_exposure {
            self.reconcile_early_reference(bean_name, &raw, exposed)?
        } else {
            exposed
        };

        self.register_disposable_bean_if_necessary(bean_name, &raw, mbd, bean_class)?;
        Ok(exposed)
    }

    fn wrap_creation_failure(bean_name: &str, e: BeansError) -> BeansError {
        if e.bean_name() == Some(bean_name) {
            e
        } else {
            BeansError::creation_caused(bean_name, "Initialization of bean failed", e)
        }
    }

    /// 早期引用工厂：对原始实例依次应用早期引用钩子
    fn early_reference_factory(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
        raw: &BeanRef,
    ) -> EarlyReferenceFactory {
        let processors = if mbd.synthetic {
            Arc::new(Vec::new())
        } else {
            self.post_processors.snapshot()
        };
        let raw = Arc::clone(raw);
        let name = bean_name.to_string();
        Arc::new(move || {
            let mut exposed = Arc::clone(&raw);
            for processor in processors.iter() {
                if let Some(hook) = processor.as_instantiation_hook() {
                    exposed = hook.early_bean_reference(exposed, &name).map_err(|e| {
                        BeansError::creation_caused(&name, "Failed to obtain early bean reference", e)
                    })?;
                }
            }
            Ok(exposed)
        })
    }

    /// 已暴露的早期引用与最终实例的一致性检查
    fn reconcile_early_reference(
        &self,
        bean_name: &str,
        raw: &BeanRef,
        exposed: BeanRef,
    ) -> BeansResult<BeanRef> {
        let Some(early) = self.singletons.early_singleton(bean_name) else {
            return Ok(exposed);
        };
        if Arc::ptr_eq(&exposed, raw) {
            return Ok(early);
        }
        if self.config.allow_raw_injection_despite_wrapping {
            return Ok(exposed);
        }

        let observers = self.singletons.early_observers(bean_name);
        if observers.is_empty() {
            return Ok(exposed);
        }
        Err(BeansError::CurrentlyInCreation {
            bean_name: bean_name.to_string(),
            message: format!(
                "Bean with name '{}' has been injected into other beans [{}] in its raw version as part of a circular reference, but has eventually been wrapped. This means that said other beans do not use the final version of the bean.",
                bean_name,
                observers.join(",")
            ),
        })
    }

    fn apply_definition_hooks(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
        class: Option<&BeanClass>,
    ) -> BeansResult<()> {
        let processors = self.post_processors.snapshot();
        for processor in processors.iter() {
            if let Some(hook) = processor.as_definition_hook() {
                hook.post_process_merged_definition(mbd, class, bean_name)
                    .map_err(|e| {
                        BeansError::creation_caused(
                            bean_name,
                            "Post-processing of merged bean definition failed",
                            e,
                        )
                    })?;
            }
        }
        Ok(())
    }

    /// 初始化后钩子链
    pub(crate) fn apply_after_initialization(&self, bean: BeanRef, bean_name: &str) -> BeansResult<BeanRef> {
        let processors = self.post_processors.snapshot();
        let mut current = bean;
        for processor in processors.iter() {
            if let Some(hook) = processor.as_init_hook() {
                current = hook.after_initialization(current, bean_name).map_err(|e| {
                    BeansError::creation_caused(
                        bean_name,
                        format!("Post-processor '{}' failed after initialization", processor.name()),
                        e,
                    )
                })?;
            }
        }
        Ok(current)
    }

    fn register_disposable_bean_if_necessary(
        &self,
        bean_name: &str,
        bean: &BeanRef,
        mbd: &MergedBeanDefinition,
        class: Option<&BeanClass>,
    ) -> BeansResult<()> {
        if mbd.is_prototype() {
            return Ok(());
        }

        let processors = self.post_processors.snapshot();
        let Some(adapter) = DisposableBeanAdapter::for_bean(bean, bean_name, mbd, class, &processors)?
        else {
            return Ok(());
        };

        if mbd.is_singleton() {
            self.singletons
                .register_disposable_bean(bean_name, Arc::new(adapter));
        } else {
            let scope = self
                .scope(&mbd.scope)
                .ok_or_else(|| Self::no_scope_registered(&mbd.scope))?;
            scope.register_destruction_callback(bean_name, Box::new(move || adapter.destroy()));
        }
        Ok(())
    }

    /// 实例化：实例提供者、工厂方法、构造器（带自动装配）、默认构造器
    fn create_bean_instance(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
        class: Option<&BeanClass>,
        args: Option<Vec<Value>>,
        ctx: &mut CreationContext,
    ) -> BeansResult<BeanRef> {
        if let Some(supplier) = &mbd.instance_supplier {
            return supplier().map_err(|e| BeansError::BeanInstantiation {
                bean_name: bean_name.to_string(),
                executable: "instance supplier".to_string(),
                message: "Instance supplier threw exception".to_string(),
                source: Some(e.into()),
            });
        }

        if mbd.factory_method_name.is_some() {
            return self.instantiate_using_factory_method(bean_name, mbd, args, ctx);
        }

        let class = class.ok_or_else(|| {
            BeansError::creation(bean_name, "Bean definition has no bean class to instantiate")
        })?;

        let needs_resolution = args.is_some()
            || mbd.autowire_mode == AutowireMode::Constructor
            || mbd.has_constructor_args();
        match class.default_constructor() {
            Some(ctor) if !needs_resolution => {
                ctor.invoke(Vec::new()).map_err(|e| BeansError::BeanInstantiation {
                    bean_name: bean_name.to_string(),
                    executable: ctor.describe(),
                    message: "Constructor threw exception".to_string(),
                    source: Some(e.into()),
                })
            }
            _ => self.autowire_constructor(bean_name, mbd, class, args, ctx),
        }
    }

    // ---- FactoryBean ----

    /// 把取到的实例转换为调用方要的对象：FactoryBean 本身或其产品
    fn object_for_bean_instance(
        &self,
        instance: BeanRef,
        name: &str,
        bean_name: &str,
        mbd: Option<&MergedBeanDefinition>,
    ) -> BeansResult<BeanRef> {
        if is_factory_dereference(name) {
            if NullBean::is_null_bean(&instance) || self.is_factory_bean_instance(&instance) {
                return Ok(instance);
            }
            return Err(BeansError::BeanIsNotAFactory {
                bean_name: transformed_bean_name(name).to_string(),
            });
        }

        let Some(class) = self.types.class_of(&instance).filter(|c| c.is_factory_bean()) else {
            return Ok(instance);
        };
        let Some(factory) = class.as_factory_bean(&instance) else {
            return Ok(instance);
        };

        if let Some(cached) = self.factory_bean_objects.get(bean_name) {
            return Ok(cached);
        }
        let synthetic = match mbd {
            Some(mbd) => mbd.synthetic,
            None => self.definitions.contains_bean_definition(bean_name)
                && self
                    .merged_local_bean_definition(bean_name)
                    .map_or(false, |mbd| mbd.synthetic),
        };
        self.object_from_factory_bean(factory, bean_name, !synthetic)
    }

    pub(crate) fn is_factory_bean_instance(&self, bean: &BeanRef) -> bool {
        self.types
            .class_of(bean)
            .map_or(false, |class| class.is_factory_bean())
    }

    /// 取 FactoryBean 的产品；单例产品在工厂本身完成后缓存
    pub(crate) fn object_from_factory_bean(
        &self,
        factory: &dyn FactoryBean,
        bean_name: &str,
        should_post_process: bool,
    ) -> BeansResult<BeanRef> {
        if factory.is_singleton() && self.singletons.contains_singleton(bean_name) {
            return self
                .factory_bean_objects
                .get_or_produce::<_, BeansError>(bean_name, || {
                    let object = self.produce_factory_bean_object(factory, bean_name)?;
                    if !should_post_process || NullBean::is_null_bean(&object) {
                        return Ok((object, self.singletons.contains_singleton(bean_name)));
                    }
                    if self.singletons.is_currently_in_creation(bean_name) {
                        return Ok((object, false));
                    }
                    let object = self.apply_after_initialization(object, bean_name)?;
                    Ok((object, self.singletons.contains_singleton(bean_name)))
                });
        }

        let object = self.produce_factory_bean_object(factory, bean_name)?;
        if should_post_process && !NullBean::is_null_bean(&object) {
            self.apply_after_initialization(object, bean_name)
        } else {
            Ok(object)
        }
    }

    fn produce_factory_bean_object(
        &self,
        factory: &dyn FactoryBean,
        bean_name: &str,
    ) -> BeansResult<BeanRef> {
        let object = factory.get_object().map_err(|e| {
            BeansError::creation_caused(bean_name, "FactoryBean threw exception on object creation", e)
        })?;
        match object {
            Some(object) => Ok(object),
            None if self.singletons.is_currently_in_creation(bean_name) => {
                Err(BeansError::CurrentlyInCreation {
                    bean_name: bean_name.to_string(),
                    message: "FactoryBean which is currently in creation returned null from get_object"
                        .to_string(),
                })
            }
            None => Ok(NullBean::bean_ref()),
        }
    }

    // ---- 合并定义 ----

    pub(crate) fn merged_local_bean_definition(
        &self,
        bean_name: &str,
    ) -> BeansResult<Arc<MergedBeanDefinition>> {
        if let Some(merged) = self.merger.cached(bean_name) {
            return Ok(merged);
        }
        let mut visiting = Vec::new();
        self.merge_definition(bean_name, &mut visiting)
    }

    fn merge_definition(
        &self,
        bean_name: &str,
        visiting: &mut Vec<String>,
    ) -> BeansResult<Arc<MergedBeanDefinition>> {
        let raw = self
            .definitions
            .bean_definition(bean_name)
            .ok_or_else(|| BeansError::no_such_bean(bean_name))?;

        visiting.push(bean_name.to_string());
        let merged = self.merger.merge(bean_name, &raw, None, |parent_name| {
            self.resolve_parent_definition(bean_name, parent_name, visiting)
        });
        visiting.pop();
        merged
    }

    /// 内部 Bean 的合并：不进入缓存，作用域随外部 Bean
    pub(crate) fn merge_inner_definition(
        &self,
        inner_bean_name: &str,
        raw: &BeanDefinition,
        containing: &MergedBeanDefinition,
    ) -> BeansResult<Arc<MergedBeanDefinition>> {
        let mut visiting = vec![inner_bean_name.to_string()];
        self.merger
            .merge(inner_bean_name, raw, Some(containing), |parent_name| {
                self.resolve_parent_definition(inner_bean_name, parent_name, &mut visiting)
            })
    }

    fn resolve_parent_definition(
        &self,
        bean_name: &str,
        parent_name: &str,
        visiting: &mut Vec<String>,
    ) -> BeansResult<Arc<MergedBeanDefinition>> {
        let parent_bean_name = self.canonical_name(transformed_bean_name(parent_name));

        if parent_bean_name != bean_name {
            if visiting.iter().any(|n| *n == parent_bean_name) {
                return Err(BeansError::definition_store(
                    bean_name,
                    format!(
                        "Circular parent relationship: {} -> {}",
                        visiting.join(" -> "),
                        parent_bean_name
                    ),
                ));
            }
            if self.definitions.contains_bean_definition(&parent_bean_name) {
                if let Some(cached) = self.merger.cached(&parent_bean_name) {
                    return Ok(cached);
                }
                return self.merge_definition(&parent_bean_name, visiting);
            }
        }

        match &self.parent {
            Some(parent) => parent.merged_bean_definition(&parent_bean_name),
            None if parent_bean_name == bean_name => Err(BeansError::definition_store(
                bean_name,
                format!(
                    "Parent name '{}' is equal to bean name '{}': cannot be resolved without a parent bean factory",
                    parent_name, bean_name
                ),
            )),
            None => Err(BeansError::no_such_bean(parent_bean_name)),
        }
    }

    /// 解析定义的 Bean 类型，首次解析后缓存在合并定义上
    pub(crate) fn resolve_bean_class(
        &self,
        mbd: &MergedBeanDefinition,
        bean_name: &str,
    ) -> BeansResult<Option<Arc<BeanClass>>> {
        if let Some(class) = mbd.resolved_class() {
            return Ok(Some(Arc::clone(class)));
        }
        let Some(class_name) = mbd.class_name.as_deref() else {
            return Ok(None);
        };
        let class = self
            .types
            .resolve(class_name)
            .ok_or_else(|| BeansError::CannotLoadBeanClass {
                bean_name: bean_name.to_string(),
                class_name: class_name.to_string(),
            })?;
        Ok(Some(mbd.cache_resolved_class(class)))
    }

    /// 解析类型名称；对象类型必须能被类型解析服务识别
    pub(crate) fn resolve_type_name(&self, bean_name: &str, type_name: &str) -> BeansResult<TypeRef> {
        match TypeRef::parse(type_name) {
            TypeRef::Object(name) => {
                if self.types.resolve(&name).is_some() {
                    Ok(TypeRef::Object(name))
                } else {
                    Err(BeansError::CannotLoadBeanClass {
                        bean_name: bean_name.to_string(),
                        class_name: name,
                    })
                }
            }
            other => Ok(other),
        }
    }

    /// 对字符串求值；没有配置求值器时原样返回
    pub(crate) fn evaluate(&self, value: &str, bean_name: &str) -> BeansResult<Value> {
        match &self.evaluator {
            Some(evaluator) => evaluator.evaluate(value, Some(bean_name)).map_err(|e| {
                BeansError::creation_caused(
                    bean_name,
                    format!("Failed to evaluate expression [{}]", value),
                    e,
                )
            }),
            None => Ok(Value::str(value)),
        }
    }

    // ---- 类型判断 ----

    fn type_matches(&self, ty: &TypeRef, type_name: &str) -> bool {
        match ty {
            TypeRef::Object(name) => {
                name == type_name
                    || self
                        .types
                        .resolve(name)
                        .map_or(false, |class| class.is_assignable_to(type_name))
            }
            TypeRef::Any => false,
            other => other.type_name() == type_name,
        }
    }

    /// 已有实例的类型判断；`dereference` 为 true 时判断 FactoryBean 本身
    fn instance_matches(&self, instance: &BeanRef, type_name: &str, dereference: bool) -> bool {
        match self.types.class_of(instance) {
            Some(class) if class.is_factory_bean() && !dereference => class
                .as_factory_bean(instance)
                .and_then(|factory| factory.object_type())
                .map_or(false, |ty| self.type_matches(&ty, type_name)),
            Some(class) => class.is_assignable_to(type_name),
            None => false,
        }
    }

    fn is_type_match_internal(
        &self,
        name: &str,
        type_name: &str,
        ctx: &mut CreationContext,
    ) -> BeansResult<bool> {
        let bean_name = self.canonical_name(transformed_bean_name(name));
        let dereference = is_factory_dereference(name);

        if let Some(instance) = self.singletons.singleton(&bean_name) {
            if !dereference {
                if let Some(product) = self.factory_bean_objects.get(&bean_name) {
                    if self.types.is_instance_of(&product, type_name) {
                        return Ok(true);
                    }
                }
            }
            return Ok(self.instance_matches(&instance, type_name, dereference));
        }

        if !self.definitions.contains_bean_definition(&bean_name) {
            return match &self.parent {
                Some(parent) => parent.is_type_match(&original_bean_name(name, &bean_name), type_name),
                None => Ok(false),
            };
        }

        let mbd = self.merged_local_bean_definition(&bean_name)?;
        let Some(class) = self.predict_bean_class(&bean_name, &mbd)? else {
            return Ok(false);
        };

        if class.is_factory_bean() && !dereference {
            let factory_name = format!("{}{}", FACTORY_BEAN_PREFIX, bean_name);
            let factory = self.do_get_bean(&factory_name, None, None, true, ctx)?;
            return Ok(self.instance_matches(&factory, type_name, false));
        }
        Ok(class.is_assignable_to(type_name))
    }

    /// 预测定义产出的类型（不创建实例）
    fn predict_bean_class(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
    ) -> BeansResult<Option<Arc<BeanClass>>> {
        let Some(method) = mbd.factory_method_name.as_deref() else {
            return self.resolve_bean_class(mbd, bean_name);
        };

        let predicted = mbd.target_type_or_init(|| {
            self.predict_factory_method_type(bean_name, mbd, method)
                .ok()
                .flatten()
        });
        Ok(match predicted {
            Some(TypeRef::Object(name)) => self.types.resolve(&name),
            _ => None,
        })
    }

    /// 同名工厂方法声明的返回类型唯一时返回该类型
    fn predict_factory_method_type(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
        method: &str,
    ) -> BeansResult<Option<TypeRef>> {
        let factory_class = match mbd.factory_bean_name.as_deref() {
            Some(factory_bean_name) => {
                let factory_bean_name = self.canonical_name(factory_bean_name);
                if factory_bean_name == bean_name {
                    return Ok(None);
                }
                match self.singletons.singleton(&factory_bean_name) {
                    Some(instance) => self.types.class_of(&instance),
                    None if self.definitions.contains_bean_definition(&factory_bean_name) => {
                        let factory_mbd = self.merged_local_bean_definition(&factory_bean_name)?;
                        self.predict_bean_class(&factory_bean_name, &factory_mbd)?
                    }
                    None => None,
                }
            }
            None => self.resolve_bean_class(mbd, bean_name)?,
        };

        let Some(factory_class) = factory_class else {
            return Ok(None);
        };
        let static_only = mbd.factory_bean_name.is_none();
        let mut return_types = factory_class
            .methods_named(method)
            .filter(|m| m.is_static() == static_only)
            .filter_map(|m| m.return_type().cloned());
        let Some(first) = return_types.next() else {
            return Ok(None);
        };
        if return_types.all(|ty| ty == first) {
            Ok(Some(first))
        } else {
            Ok(None)
        }
    }

    fn do_bean_names_for_type(
        &self,
        type_name: &str,
        include_non_singletons: bool,
        allow_eager_init: bool,
        ctx: &mut CreationContext,
    ) -> Vec<String> {
        let mut result = Vec::new();

        for bean_name in self.definitions.bean_definition_names() {
            let mbd = match self.merged_local_bean_definition(&bean_name) {
                Ok(mbd) => mbd,
                Err(e) => {
                    tracing::trace!("Ignoring bean definition '{}' during type matching: {}", bean_name, e);
                    continue;
                }
            };
            if mbd.is_abstract || (!include_non_singletons && !mbd.is_singleton()) {
                continue;
            }

            let is_factory_bean = match self.singletons.singleton(&bean_name) {
                Some(instance) => self.is_factory_bean_instance(&instance),
                None => self
                    .predict_bean_class(&bean_name, &mbd)
                    .ok()
                    .flatten()
                    .map_or(false, |class| class.is_factory_bean()),
            };

            let matched = if is_factory_bean
                && !allow_eager_init
                && !self.singletons.contains_singleton(&bean_name)
            {
                Ok(false)
            } else {
                self.is_type_match_internal(&bean_name, type_name, ctx)
            };

            match matched {
                Ok(true) => result.push(bean_name),
                Ok(false) if is_factory_bean => {
                    let factory_name = format!("{}{}", FACTORY_BEAN_PREFIX, bean_name);
                    if let Ok(true) = self.is_type_match_internal(&factory_name, type_name, ctx) {
                        result.push(factory_name);
                    }
                }
                Ok(false) => {}
                Err(e) if e.is_currently_in_creation() => {
                    tracing::warn!(
                        "Ignoring bean '{}' during type matching: it is currently in creation: {}",
                        bean_name,
                        e
                    );
                }
                Err(e) => {
                    tracing::debug!("Ignoring bean '{}' during type matching: {}", bean_name, e);
                }
            }
        }

        for bean_name in self.singletons.singleton_names() {
            if self.definitions.contains_bean_definition(&bean_name) {
                continue;
            }
            let Some(instance) = self.singletons.singleton(&bean_name) else {
                continue;
            };
            if self.instance_matches(&instance, type_name, false) {
                result.push(bean_name);
            } else if self.is_factory_bean_instance(&instance)
                && self.instance_matches(&instance, type_name, true)
            {
                result.push(format!("{}{}", FACTORY_BEAN_PREFIX, bean_name));
            }
        }

        result
    }

    // ---- 依赖解析 ----

    /// 按类型解析依赖，并登记 `requesting_bean` 对结果的依赖
    pub(crate) fn resolve_dependency_in(
        &self,
        descriptor: &DependencyDescriptor,
        requesting_bean: Option<&str>,
        ctx: &mut CreationContext,
    ) -> BeansResult<Option<BeanRef>> {
        if self.config.is_ignored_dependency_type(&descriptor.type_name) {
            return Ok(None);
        }

        let candidates: Vec<String> = self
            .do_bean_names_for_type(&descriptor.type_name, true, true, ctx)
            .into_iter()
            .filter(|candidate| {
                let plain = transformed_bean_name(candidate);
                Some(plain) != requesting_bean && self.is_autowire_candidate(plain)
            })
            .collect();

        let chosen = match candidates.as_slice() {
            [] => {
                if let Some(parent) = &self.parent {
                    return parent.resolve_dependency(descriptor, requesting_bean);
                }
                if descriptor.required {
                    return Err(BeansError::NoSuchBean {
                        name: descriptor.type_name.clone(),
                        message: "expected at least 1 bean which qualifies as autowire candidate"
                            .to_string(),
                    });
                }
                return Ok(None);
            }
            [only] => only.clone(),
            many => self
                .determine_autowire_candidate(many, descriptor)?
                .ok_or_else(|| BeansError::NoUniqueBean {
                    required_type: descriptor.type_name.clone(),
                    candidates: many.to_vec(),
                })?,
        };

        tracing::trace!(
            "Autowiring by type from bean name '{}' to bean named '{}'",
            requesting_bean.unwrap_or("<none>"),
            chosen
        );
        let bean = self.do_get_bean(&chosen, None, None, false, ctx)?;
        if let Some(requesting) = requesting_bean {
            let target = self.canonical_name(transformed_bean_name(&chosen));
            self.singletons.register_dependent_bean(&target, requesting);
        }
        Ok(Some(bean))
    }

    fn is_autowire_candidate(&self, bean_name: &str) -> bool {
        if !self.definitions.contains_bean_definition(bean_name) {
            return true;
        }
        self.merged_local_bean_definition(bean_name)
            .map_or(true, |mbd| mbd.autowire_candidate)
    }

    fn is_primary(&self, bean_name: &str) -> bool {
        self.definitions.contains_bean_definition(bean_name)
            && self
                .merged_local_bean_definition(bean_name)
                .map_or(false, |mbd| mbd.primary)
    }

    /// 多个候选：唯一的 primary 优先，其次按注入点名称匹配
    fn determine_autowire_candidate(
        &self,
        candidates: &[String],
        descriptor: &DependencyDescriptor,
    ) -> BeansResult<Option<String>> {
        let primaries: Vec<&String> = candidates
            .iter()
            .filter(|candidate| self.is_primary(transformed_bean_name(candidate)))
            .collect();
        match primaries.as_slice() {
            [only] => return Ok(Some((*only).clone())),
            [] => {}
            many => {
                return Err(BeansError::NoUniqueBean {
                    required_type: descriptor.type_name.clone(),
                    candidates: many.iter().map(|name| (*name).clone()).collect(),
                })
            }
        }

        if let Some(name) = &descriptor.name {
            let matched = candidates.iter().find(|candidate| {
                let plain = transformed_bean_name(candidate);
                plain == name || self.definitions.aliases(plain).iter().any(|alias| alias == name)
            });
            if let Some(matched) = matched {
                return Ok(Some(matched.clone()));
            }
        }
        Ok(None)
    }

    // ---- 定义变更 ----

    fn validate_bean_definition(&self, name: &str, definition: &BeanDefinition) -> BeansResult<()> {
        if definition.parent_name.is_none()
            && definition.class_name.is_none()
            && definition.factory_method_name.is_none()
            && definition.instance_supplier.is_none()
            && !definition.is_abstract
        {
            return Err(BeansError::DefinitionValidation {
                bean_name: name.to_string(),
                message: "Bean definition has neither a class, a factory method nor an instance supplier"
                    .to_string(),
            });
        }
        if definition.factory_bean_name.is_some() && definition.factory_method_name.is_none() {
            return Err(BeansError::DefinitionValidation {
                bean_name: name.to_string(),
                message: "A factory bean name requires a factory method name".to_string(),
            });
        }
        if let Some(scope) = definition.scope.as_deref() {
            if scope.is_empty() {
                return Err(BeansError::DefinitionValidation {
                    bean_name: name.to_string(),
                    message: "Scope name must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// 定义变化后重置：失效合并定义、销毁单例、递归重置子定义
    fn reset_bean_definition(&self, bean_name: &str, visited: &mut HashSet<String>) {
        if !visited.insert(bean_name.to_string()) {
            return;
        }
        self.merger.invalidate(bean_name);
        self.destroy_singleton(bean_name);

        for other in self.definitions.bean_definition_names() {
            if other == bean_name {
                continue;
            }
            let Some(definition) = self.definitions.bean_definition(&other) else {
                continue;
            };
            let is_child = definition
                .parent_name
                .as_deref()
                .map_or(false, |parent| self.canonical_name(parent) == bean_name);
            if is_child {
                self.reset_bean_definition(&other, visited);
            }
        }
    }

    fn clear_type_cache(&self) {
        self.names_by_type.write().clear();
    }
}

impl BeanFactory for DefaultListableBeanFactory {
    fn get_bean(&self, name: &str) -> BeansResult<BeanRef> {
        let mut ctx = CreationContext::new();
        self.do_get_bean(name, None, None, false, &mut ctx)
    }

    fn get_bean_with_args(&self, name: &str, args: Vec<Value>) -> BeansResult<BeanRef> {
        let mut ctx = CreationContext::new();
        self.do_get_bean(name, None, Some(args), false, &mut ctx)
    }

    fn get_bean_of_type(&self, name: &str, required_type: &TypeRef) -> BeansResult<BeanRef> {
        let mut ctx = CreationContext::new();
        self.do_get_bean(name, Some(required_type), None, false, &mut ctx)
    }

    fn contains_bean(&self, name: &str) -> bool {
        let bean_name = self.canonical_name(transformed_bean_name(name));
        if self.singletons.contains_singleton(&bean_name)
            || self.definitions.contains_bean_definition(&bean_name)
        {
            return !is_factory_dereference(name)
                || ConfigurableBeanFactory::is_factory_bean(self, name).unwrap_or(false);
        }
        self.parent
            .as_ref()
            .map_or(false, |parent| parent.contains_bean(&original_bean_name(name, &bean_name)))
    }

    fn is_singleton(&self, name: &str) -> BeansResult<bool> {
        let bean_name = self.canonical_name(transformed_bean_name(name));
        let dereference = is_factory_dereference(name);

        if let Some(instance) = self.singletons.singleton(&bean_name) {
            if let Some(class) = self.types.class_of(&instance).filter(|c| c.is_factory_bean()) {
                return Ok(dereference
                    || class
                        .as_factory_bean(&instance)
                        .map_or(false, |factory| factory.is_singleton()));
            }
            return Ok(!dereference);
        }

        if !self.definitions.contains_bean_definition(&bean_name) {
            return match &self.parent {
                Some(parent) => parent.is_singleton(&original_bean_name(name, &bean_name)),
                None => Err(BeansError::no_such_bean(name)),
            };
        }

        let mbd = self.merged_local_bean_definition(&bean_name)?;
        if !mbd.is_singleton() {
            return Ok(false);
        }
        if ConfigurableBeanFactory::is_factory_bean(self, &bean_name)? {
            if dereference {
                return Ok(true);
            }
            let factory = self.get_bean(&format!("{}{}", FACTORY_BEAN_PREFIX, bean_name))?;
            return Ok(self
                .types
                .class_of(&factory)
                .and_then(|class| class.as_factory_bean(&factory).map(|f| f.is_singleton()))
                .unwrap_or(false));
        }
        Ok(!dereference)
    }

    fn is_prototype(&self, name: &str) -> BeansResult<bool> {
        let bean_name = self.canonical_name(transformed_bean_name(name));
        let dereference = is_factory_dereference(name);

        if !self.definitions.contains_bean_definition(&bean_name) {
            if self.singletons.contains_singleton(&bean_name) {
                return Ok(false);
            }
            return match &self.parent {
                Some(parent) => parent.is_prototype(&original_bean_name(name, &bean_name)),
                None => Err(BeansError::no_such_bean(name)),
            };
        }

        let mbd = self.merged_local_bean_definition(&bean_name)?;
        let is_factory_bean = ConfigurableBeanFactory::is_factory_bean(self, &bean_name)?;
        if mbd.is_prototype() {
            return Ok(!dereference || is_factory_bean);
        }
        if dereference || !is_factory_bean {
            return Ok(false);
        }
        let factory = self.get_bean(&format!("{}{}", FACTORY_BEAN_PREFIX, bean_name))?;
        Ok(self
            .types
            .class_of(&factory)
            .and_then(|class| class.as_factory_bean(&factory).map(|f| !f.is_singleton()))
            .unwrap_or(false))
    }

    fn is_type_match(&self, name: &str, type_name: &str) -> BeansResult<bool> {
        let mut ctx = CreationContext::new();
        self.is_type_match_internal(name, type_name, &mut ctx)
    }

    fn aliases(&self, name: &str) -> Vec<String> {
        let bean_name = self.canonical_name(transformed_bean_name(name));
        let prefix = if is_factory_dereference(name) {
            FACTORY_BEAN_PREFIX
        } else {
            ""
        };

        let mut result = Vec::new();
        let full_name = format!("{}{}", prefix, bean_name);
        if full_name != name {
            result.push(full_name);
        }
        for alias in self.definitions.aliases(&bean_name) {
            let alias = format!("{}{}", prefix, alias);
            if alias != name {
                result.push(alias);
            }
        }

        if !self.contains_local_bean(name) {
            if let Some(parent) = &self.parent {
                result.extend(parent.aliases(&original_bean_name(name, &bean_name)));
            }
        }
        result
    }
}

impl HierarchicalBeanFactory for DefaultListableBeanFactory {
    fn parent_bean_factory(&self) -> Option<Arc<dyn ConfigurableBeanFactory>> {
        self.parent.clone()
    }

    fn contains_local_bean(&self, name: &str) -> bool {
        let bean_name = self.canonical_name(transformed_bean_name(name));
        (self.singletons.contains_singleton(&bean_name)
            || self.definitions.contains_bean_definition(&bean_name))
            && (!is_factory_dereference(name)
                || ConfigurableBeanFactory::is_factory_bean(self, &bean_name).unwrap_or(false))
    }
}

impl ListableBeanFactory for DefaultListableBeanFactory {
    fn contains_bean_definition(&self, name: &str) -> bool {
        self.definitions.contains_bean_definition(name)
    }

    fn bean_definition_count(&self) -> usize {
        self.definitions.bean_definition_count()
    }

    fn bean_definition_names(&self) -> Vec<String> {
        self.definitions.bean_definition_names()
    }

    fn bean_names_for_type(
        &self,
        type_name: &str,
        include_non_singletons: bool,
        allow_eager_init: bool,
    ) -> Vec<String> {
        let cacheable = allow_eager_init && self.is_configuration_frozen();
        let key = (type_name.to_string(), include_non_singletons);
        if cacheable {
            if let Some(cached) = self.names_by_type.read().get(&key) {
                return cached.clone();
            }
        }

        let mut ctx = CreationContext::new();
        let names =
            self.do_bean_names_for_type(type_name, include_non_singletons, allow_eager_init, &mut ctx);
        if cacheable {
            self.names_by_type.write().insert(key, names.clone());
        }
        names
    }

    fn beans_of_type(&self, type_name: &str) -> BeansResult<Vec<(String, BeanRef)>> {
        let mut beans = Vec::new();
        for name in self.bean_names_for_type(type_name, true, true) {
            match self.get_bean(&name) {
                Ok(bean) => beans.push((name, bean)),
                Err(e) if e.is_currently_in_creation() => {
                    tracing::debug!("Ignoring match to currently created bean '{}': {}", name, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(beans)
    }

    fn get_bean_by_type(&self, type_name: &str) -> BeansResult<BeanRef> {
        let descriptor = DependencyDescriptor::new(type_name);
        let mut ctx = CreationContext::new();
        self.resolve_dependency_in(&descriptor, None, &mut ctx)?
            .ok_or_else(|| BeansError::no_such_bean(type_name))
    }
}

impl ConfigurableBeanFactory for DefaultListableBeanFactory {
    fn register_scope(&self, name: &str, scope: Arc<dyn Scope>) -> BeansResult<()> {
        if RESERVED_SCOPE_NAMES.contains(&name) {
            return Err(BeansError::IllegalArgument(
                "Cannot replace existing scopes 'singleton' and 'prototype'".to_string(),
            ));
        }
        if self.scopes.write().insert(name.to_string(), scope).is_some() {
            tracing::debug!("Replacing scope '{}'", name);
        } else {
            tracing::debug!("Registered scope '{}'", name);
        }
        Ok(())
    }

    fn registered_scope_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.scopes.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>) {
        self.post_processors.add(processor);
    }

    fn register_alias(&self, name: &str, alias: &str) -> BeansResult<()> {
        self.definitions.register_alias(name, alias)
    }

    fn register_singleton(&self, name: &str, bean: BeanRef) -> BeansResult<()> {
        self.singletons.register_singleton(name, bean)?;
        self.clear_type_cache();
        Ok(())
    }

    fn merged_bean_definition(&self, name: &str) -> BeansResult<Arc<MergedBeanDefinition>> {
        let bean_name = self.canonical_name(transformed_bean_name(name));
        if !self.definitions.contains_bean_definition(&bean_name) {
            if let Some(parent) = &self.parent {
                return parent.merged_bean_definition(&bean_name);
            }
        }
        self.merged_local_bean_definition(&bean_name)
    }

    fn is_factory_bean(&self, name: &str) -> BeansResult<bool> {
        let bean_name = self.canonical_name(transformed_bean_name(name));
        if let Some(instance) = self.singletons.singleton(&bean_name) {
            return Ok(self.is_factory_bean_instance(&instance));
        }
        if !self.definitions.contains_bean_definition(&bean_name) {
            return match &self.parent {
                Some(parent) => parent.is_factory_bean(&bean_name),
                None => Ok(false),
            };
        }
        let mbd = self.merged_local_bean_definition(&bean_name)?;
        Ok(self
            .predict_bean_class(&bean_name, &mbd)?
            .map_or(false, |class| class.is_factory_bean()))
    }

    fn is_currently_in_creation(&self, name: &str) -> bool {
        self.singletons
            .is_currently_in_creation(&self.canonical_name(transformed_bean_name(name)))
    }

    fn register_dependent_bean(&self, bean_name: &str, dependent_bean_name: &str) {
        let bean_name = self.canonical_name(bean_name);
        self.singletons
            .register_dependent_bean(&bean_name, dependent_bean_name);
    }

    fn dependent_beans(&self, bean_name: &str) -> Vec<String> {
        self.singletons.dependent_beans(&self.canonical_name(bean_name))
    }

    fn dependencies_for_bean(&self, bean_name: &str) -> Vec<String> {
        self.singletons
            .dependencies_for_bean(&self.canonical_name(bean_name))
    }

    fn resolve_dependency(
        &self,
        descriptor: &DependencyDescriptor,
        requesting_bean: Option<&str>,
    ) -> BeansResult<Option<BeanRef>> {
        let mut ctx = CreationContext::new();
        self.resolve_dependency_in(descriptor, requesting_bean, &mut ctx)
    }

    fn destroy_bean(&self, name: &str, bean: BeanRef) -> BeansResult<()> {
        let mbd = self.merged_bean_definition(name)?;
        let class = self.types.class_of(&bean);
        let processors = self.post_processors.snapshot();
        if let Some(adapter) =
            DisposableBeanAdapter::for_bean(&bean, name, &mbd, class.as_deref(), &processors)?
        {
            adapter.destroy();
        }
        Ok(())
    }

    fn destroy_scoped_bean(&self, name: &str) -> BeansResult<()> {
        let bean_name = self.canonical_name(name);
        let mbd = self.merged_local_bean_definition(&bean_name)?;
        if mbd.is_singleton() || mbd.is_prototype() {
            return Err(BeansError::IllegalArgument(format!(
                "Bean name '{}' does not correspond to an object in a mutable scope",
                name
            )));
        }
        let scope = self
            .scope(&mbd.scope)
            .ok_or_else(|| Self::no_scope_registered(&mbd.scope))?;
        if let Some(bean) = scope.remove(&bean_name) {
            tracing::debug!("Destroying scoped bean '{}' in scope '{}'", bean_name, mbd.scope);
            self.destroy_bean(&bean_name, bean)?;
        }
        Ok(())
    }

    fn destroy_singletons(&self) {
        self.singletons.destroy_singletons();
        self.factory_bean_objects.clear();
        self.clear_type_cache();
    }

    fn destroy_singleton(&self, name: &str) {
        self.singletons.destroy_singleton(name);
        self.factory_bean_objects.remove(name);
    }
}

impl ConfigurableListableBeanFactory for DefaultListableBeanFactory {
    fn register_bean_definition(&self, name: &str, definition: BeanDefinition) -> BeansResult<()> {
        self.validate_bean_definition(name, &definition)?;

        let existed = self.definitions.contains_bean_definition(name);
        self.definitions.register_bean_definition(name, definition)?;

        if existed || self.singletons.contains_singleton(name) {
            tracing::debug!("Overriding bean definition for bean '{}'", name);
            self.reset_bean_definition(name, &mut HashSet::new());
        } else {
            tracing::debug!("Registered bean definition for bean named '{}'", name);
        }
        self.clear_type_cache();
        Ok(())
    }

    fn remove_bean_definition(&self, name: &str) -> BeansResult<()> {
        self.definitions.remove_bean_definition(name)?;
        self.reset_bean_definition(name, &mut HashSet::new());
        self.clear_type_cache();
        tracing::debug!("Removed bean definition '{}'", name);
        Ok(())
    }

    fn bean_definition(&self, name: &str) -> BeansResult<Arc<BeanDefinition>> {
        self.definitions
            .bean_definition(&self.canonical_name(name))
            .ok_or_else(|| BeansError::no_such_bean(name))
    }

    fn preinstantiate_singletons(&self) -> BeansResult<()> {
        let names = self.definitions.bean_definition_names();
        tracing::info!("Pre-instantiating singletons: {} bean definitions", names.len());

        for name in names {
            let mbd = self.merged_local_bean_definition(&name)?;
            if mbd.is_abstract || !mbd.is_singleton() || mbd.lazy_init {
                continue;
            }

            if ConfigurableBeanFactory::is_factory_bean(self, &name)? {
                let factory = self.get_bean(&format!("{}{}", FACTORY_BEAN_PREFIX, name))?;
                let eager = self
                    .types
                    .class_of(&factory)
                    .and_then(|class| class.as_factory_bean(&factory).map(|f| f.is_eager_init()))
                    .unwrap_or(false);
                if eager {
                    self.get_bean(&name)?;
                }
            } else {
                self.get_bean(&name)?;
            }
        }

        tracing::info!(
            "Pre-instantiation completed: {} singletons",
            self.singletons.singleton_count()
        );
        Ok(())
    }

    fn freeze_configuration(&self) {
        self.configuration_frozen.store(true, Ordering::Release);
        tracing::debug!("Bean factory configuration frozen");
    }

    fn is_configuration_frozen(&self) -> bool {
        self.configuration_frozen.load(Ordering::Acquire)
    }

    fn validate_dependencies(&self) -> BeansResult<()> {
        let mut graph = BTreeMap::new();
        for name in self.definitions.bean_definition_names() {
            let mbd = self.merged_local_bean_definition(&name)?;
            let deps = mbd
                .depends_on
                .iter()
                .map(|dep| self.canonical_name(transformed_bean_name(dep)))
                .collect();
            graph.insert(name, deps);
        }

        validate_dependency_graph(&graph, |name| self.contains_bean(name)).map_err(|e| {
            let bean_name = match &e {
                DependencyValidationError::CircularDependency { cycle } => {
                    cycle.first().cloned().unwrap_or_default()
                }
                DependencyValidationError::MissingDependency { bean, .. } => bean.clone(),
            };
            BeansError::definition_store(bean_name, e.to_string())
        })
    }
}
