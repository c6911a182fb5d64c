//! 合并后的 Bean 定义
//!
//! [`DefinitionMerger`] 把带父链的原始定义展开为不可变的
//! [`MergedBeanDefinition`] 并按名称缓存。合并定义还承载创建过程中的
//! 元数据缓存：解析出的类型、选中的构造器/工厂方法、后置处理是否已执行。

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::bean::{AutowireMode, BeanDefinition, DependencyCheck, InstanceSupplier};
use crate::class::{BeanClass, MethodDescriptor};
use crate::constants::{SCOPE_PROTOTYPE, SCOPE_SINGLETON};
use crate::error::{BeansError, BeansResult};
use crate::property::{ConstructorArgumentValues, PropertyValues};
use crate::value::TypeRef;

/// 缓存的实例化方式
#[derive(Debug, Clone)]
pub enum ResolvedExecutable {
    /// 类型上构造器的下标
    Constructor(usize),
    FactoryMethod(MethodDescriptor),
}

/// 合并后的 Bean 定义
///
/// 展开了父链的快照，创建后通过 `Arc` 共享，声明字段不再修改。
pub struct MergedBeanDefinition {
    pub class_name: Option<String>,
    pub scope: String,
    pub is_abstract: bool,
    pub lazy_init: bool,
    pub depends_on: Vec<String>,
    pub autowire_mode: AutowireMode,
    pub dependency_check: DependencyCheck,
    pub autowire_candidate: bool,
    pub primary: bool,
    pub property_values: PropertyValues,
    pub constructor_args: ConstructorArgumentValues,
    pub factory_bean_name: Option<String>,
    pub factory_method_name: Option<String>,
    pub init_method_name: Option<String>,
    pub destroy_method_name: Option<String>,
    pub enforce_init_method: bool,
    pub enforce_destroy_method: bool,
    pub synthetic: bool,
    pub instance_supplier: Option<InstanceSupplier>,
    pub description: Option<String>,

    resolved_class: OnceLock<Arc<BeanClass>>,
    target_type: OnceLock<Option<TypeRef>>,
    resolved_executable: Mutex<Option<ResolvedExecutable>>,
    before_instantiation_resolved: Mutex<Option<bool>>,
    post_processed: Mutex<bool>,
    externally_managed_init_methods: RwLock<HashSet<String>>,
    externally_managed_destroy_methods: RwLock<HashSet<String>>,
    stale: AtomicBool,
}

impl MergedBeanDefinition {
    /// 没有父定义时直接复制原始定义
    pub fn from_root(raw: &BeanDefinition) -> Self {
        Self {
            class_name: raw.class_name.clone(),
            scope: raw
                .scope
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| SCOPE_SINGLETON.to_string()),
            is_abstract: raw.is_abstract,
            lazy_init: raw.lazy_init.unwrap_or(false),
            depends_on: raw.depends_on.clone(),
            autowire_mode: raw.autowire_mode.unwrap_or_default(),
            dependency_check: raw.dependency_check.unwrap_or_default(),
            autowire_candidate: raw.autowire_candidate.unwrap_or(true),
            primary: raw.primary.unwrap_or(false),
            property_values: raw.property_values.clone(),
            constructor_args: raw.constructor_args.clone(),
            factory_bean_name: raw.factory_bean_name.clone(),
            factory_method_name: raw.factory_method_name.clone(),
            init_method_name: raw.init_method_name.clone(),
            destroy_method_name: raw.destroy_method_name.clone(),
            enforce_init_method: raw.enforce_init_method,
            enforce_destroy_method: raw.enforce_destroy_method,
            synthetic: raw.synthetic,
            instance_supplier: raw.instance_supplier.clone(),
            description: raw.description.clone(),
            resolved_class: OnceLock::new(),
            target_type: OnceLock::new(),
            resolved_executable: Mutex::new(None),
            before_instantiation_resolved: Mutex::new(None),
            post_processed: Mutex::new(false),
            externally_managed_init_methods: RwLock::new(HashSet::new()),
            externally_managed_destroy_methods: RwLock::new(HashSet::new()),
            stale: AtomicBool::new(false),
        }
    }

    /// 以父定义为底，应用子定义声明的字段
    ///
    /// 子定义声明的字段覆盖父定义，未声明的字段继承；可合并的集合属性
    /// 与父定义中的同名集合合并。`is_abstract` 和 `synthetic` 不继承。
    pub fn from_parent(parent: &MergedBeanDefinition, child: &BeanDefinition) -> Self {
        let mut merged = Self {
            class_name: parent.class_name.clone(),
            scope: parent.scope.clone(),
            is_abstract: false,
            lazy_init: parent.lazy_init,
            depends_on: parent.depends_on.clone(),
            autowire_mode: parent.autowire_mode,
            dependency_check: parent.dependency_check,
            autowire_candidate: parent.autowire_candidate,
            primary: parent.primary,
            property_values: parent.property_values.clone(),
            constructor_args: parent.constructor_args.clone(),
            factory_bean_name: parent.factory_bean_name.clone(),
            factory_method_name: parent.factory_method_name.clone(),
            init_method_name: parent.init_method_name.clone(),
            destroy_method_name: parent.destroy_method_name.clone(),
            enforce_init_method: parent.enforce_init_method,
            enforce_destroy_method: parent.enforce_destroy_method,
            synthetic: false,
            instance_supplier: parent.instance_supplier.clone(),
            description: parent.description.clone(),
            resolved_class: OnceLock::new(),
            target_type: OnceLock::new(),
            resolved_executable: Mutex::new(None),
            before_instantiation_resolved: Mutex::new(None),
            post_processed: Mutex::new(false),
            externally_managed_init_methods: RwLock::new(HashSet::new()),
            externally_managed_destroy_methods: RwLock::new(HashSet::new()),
            stale: AtomicBool::new(false),
        };
        merged.override_from(child);
        merged
    }

    fn override_from(&mut self, child: &BeanDefinition) {
        if let Some(class_name) = child.class_name.as_ref().filter(|c| !c.is_empty()) {
            self.class_name = Some(class_name.clone());
        }
        if let Some(scope) = child.scope.as_ref().filter(|s| !s.is_empty()) {
            self.scope = scope.clone();
        }
        self.is_abstract = child.is_abstract;
        if let Some(lazy) = child.lazy_init {
            self.lazy_init = lazy;
        }
        if !child.depends_on.is_empty() {
            self.depends_on = child.depends_on.clone();
        }
        if let Some(mode) = child.autowire_mode {
            self.autowire_mode = mode;
        }
        if let Some(check) = child.dependency_check {
            self.dependency_check = check;
        }
        if let Some(candidate) = child.autowire_candidate {
            self.autowire_candidate = candidate;
        }
        if let Some(primary) = child.primary {
            self.primary = primary;
        }
        self.property_values.add_all(&child.property_values);
        self.constructor_args.add_all(&child.constructor_args);
        if child.factory_bean_name.is_some() {
            self.factory_bean_name = child.factory_bean_name.clone();
        }
        if child.factory_method_name.is_some() {
            self.factory_method_name = child.factory_method_name.clone();
        }
        if child.init_method_name.is_some() {
            self.init_method_name = child.init_method_name.clone();
            self.enforce_init_method = child.enforce_init_method;
        }
        if child.destroy_method_name.is_some() {
            self.destroy_method_name = child.destroy_method_name.clone();
            self.enforce_destroy_method = child.enforce_destroy_method;
        }
        if child.instance_supplier.is_some() {
            self.instance_supplier = child.instance_supplier.clone();
        }
        if child.description.is_some() {
            self.description = child.description.clone();
        }
        self.synthetic = child.synthetic;
    }

    pub fn is_singleton(&self) -> bool {
        self.scope == SCOPE_SINGLETON
    }

    pub fn is_prototype(&self) -> bool {
        self.scope == SCOPE_PROTOTYPE
    }

    pub fn has_constructor_args(&self) -> bool {
        !self.constructor_args.is_empty()
    }

    pub fn resolved_class(&self) -> Option<&Arc<BeanClass>> {
        self.resolved_class.get()
    }

    /// 缓存解析出的类型；已缓存时返回已有值
    pub fn cache_resolved_class(&self, class: Arc<BeanClass>) -> Arc<BeanClass> {
        Arc::clone(self.resolved_class.get_or_init(|| class))
    }

    /// 预测的 Bean 类型（只计算一次）
    pub fn target_type_or_init<F>(&self, predict: F) -> Option<TypeRef>
    where
        F: FnOnce() -> Option<TypeRef>,
    {
        self.target_type.get_or_init(predict).clone()
    }

    pub fn cached_executable(&self) -> Option<ResolvedExecutable> {
        self.resolved_executable.lock().clone()
    }

    pub fn cache_executable(&self, executable: ResolvedExecutable) {
        *self.resolved_executable.lock() = Some(executable);
    }

    /// `None` 表示尚未判断过实例化前短路
    pub fn before_instantiation_resolved(&self) -> Option<bool> {
        *self.before_instantiation_resolved.lock()
    }

    pub fn set_before_instantiation_resolved(&self, resolved: bool) {
        *self.before_instantiation_resolved.lock() = Some(resolved);
    }

    /// 合并定义后置处理只执行一次；失败时下次仍会重试
    pub fn post_process_once<F>(&self, process: F) -> BeansResult<()>
    where
        F: FnOnce() -> BeansResult<()>,
    {
        let mut done = self.post_processed.lock();
        if *done {
            return Ok(());
        }
        process()?;
        *done = true;
        Ok(())
    }

    pub fn is_post_processed(&self) -> bool {
        *self.post_processed.lock()
    }

    /// 标记 init 方法已由外部（后置处理器）负责调用
    pub fn register_externally_managed_init_method(&self, name: impl Into<String>) {
        self.externally_managed_init_methods.write().insert(name.into());
    }

    pub fn is_externally_managed_init_method(&self, name: &str) -> bool {
        self.externally_managed_init_methods.read().contains(name)
    }

    /// 标记 destroy 方法已由外部负责调用，销毁适配器会跳过它
    pub fn register_externally_managed_destroy_method(&self, name: impl Into<String>) {
        self.externally_managed_destroy_methods
            .write()
            .insert(name.into());
    }

    pub fn is_externally_managed_destroy_method(&self, name: &str) -> bool {
        self.externally_managed_destroy_methods.read().contains(name)
    }

    /// 原始定义已变化，需要重新合并
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for MergedBeanDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergedBeanDefinition")
            .field("class_name", &self.class_name)
            .field("scope", &self.scope)
            .field("is_abstract", &self.is_abstract)
            .field("lazy_init", &self.lazy_init)
            .field("depends_on", &self.depends_on)
            .field("autowire_mode", &self.autowire_mode)
            .field("property_values", &self.property_values.names())
            .field("factory_bean_name", &self.factory_bean_name)
            .field("factory_method_name", &self.factory_method_name)
            .field("stale", &self.is_stale())
            .finish()
    }
}

/// 定义合并器
///
/// 合并在一把可重入锁内进行（递归解析父定义时会重入），已缓存的结果
/// 可以无锁并发读取。
pub struct DefinitionMerger {
    cache: RwLock<HashMap<String, Arc<MergedBeanDefinition>>>,
    merge_lock: ReentrantMutex<()>,
    already_created: RwLock<HashSet<String>>,
    cache_bean_metadata: bool,
}

impl DefinitionMerger {
    pub fn new(cache_bean_metadata: bool) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            merge_lock: ReentrantMutex::new(()),
            already_created: RwLock::new(HashSet::new()),
            cache_bean_metadata,
        }
    }

    /// 快速路径：已缓存且未失效的合并定义
    pub fn cached(&self, bean_name: &str) -> Option<Arc<MergedBeanDefinition>> {
        self.cache
            .read()
            .get(bean_name)
            .filter(|mbd| !mbd.is_stale())
            .cloned()
    }

    /// 合并定义
    ///
    /// `resolve_parent` 负责按名称取得父定义的合并结果（可能来自父工厂）。
    /// `containing` 不为空时表示这是内部 Bean 的合并，结果不会进入缓存。
    pub fn merge<F>(
        &self,
        bean_name: &str,
        raw: &BeanDefinition,
        containing: Option<&MergedBeanDefinition>,
        resolve_parent: F,
    ) -> BeansResult<Arc<MergedBeanDefinition>>
    where
        F: FnOnce(&str) -> BeansResult<Arc<MergedBeanDefinition>>,
    {
        let _guard = self.merge_lock.lock();

        if containing.is_none() {
            if let Some(cached) = self.cached(bean_name) {
                return Ok(cached);
            }
        }

        let mut merged = match raw.parent_name.as_deref() {
            None => MergedBeanDefinition::from_root(raw),
            Some(parent_name) => {
                let parent = resolve_parent(parent_name).map_err(|e| BeansError::DefinitionStore {
                    bean_name: bean_name.to_string(),
                    message: format!("Could not resolve parent bean definition '{}'", parent_name),
                    source: Some(e.into()),
                })?;
                MergedBeanDefinition::from_parent(&parent, raw)
            }
        };

        if let Some(containing) = containing {
            if !containing.is_singleton() && merged.is_singleton() {
                merged.scope = containing.scope.clone();
            }
        }

        let merged = Arc::new(merged);
        if containing.is_none() && self.cache_bean_metadata {
            tracing::trace!("Caching merged bean definition for '{}'", bean_name);
            self.cache
                .write()
                .insert(bean_name.to_string(), Arc::clone(&merged));
        }
        Ok(merged)
    }

    /// 首次创建时使合并定义失效，以便拾取创建前对元数据的修改
    pub fn mark_bean_as_created(&self, bean_name: &str) {
        if self.already_created.read().contains(bean_name) {
            return;
        }
        let _guard = self.merge_lock.lock();
        if self.already_created.read().contains(bean_name) {
            return;
        }
        self.invalidate(bean_name);
        self.already_created.write().insert(bean_name.to_string());
    }

    /// 创建失败后允许重新创建
    pub fn cleanup_after_bean_creation_failure(&self, bean_name: &str) {
        self.already_created.write().remove(bean_name);
    }

    pub fn is_already_created(&self, bean_name: &str) -> bool {
        self.already_created.read().contains(bean_name)
    }

    pub fn has_bean_creation_started(&self) -> bool {
        !self.already_created.read().is_empty()
    }

    /// 原始定义变化时失效
    pub fn invalidate(&self, bean_name: &str) {
        let _guard = self.merge_lock.lock();
        if let Some(old) = self.cache.write().remove(bean_name) {
            old.mark_stale();
        }
    }

    /// 清除尚未开始创建的 Bean 的合并定义
    pub fn clear_metadata_cache(&self) {
        let _guard = self.merge_lock.lock();
        let created = self.already_created.read();
        self.cache.write().retain(|name, mbd| {
            let keep = created.contains(name);
            if !keep {
                mbd.mark_stale();
            }
            keep
        });
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

impl Default for DefinitionMerger {
    fn default() -> Self {
        Self::new(true)
    }
}
