//! 单例注册表
//!
//! 每个单例名称对应一个槽位，按 `EarlyFactory -> EarlyExposed -> Finished`
//! 单调迁移（没有槽位即为空）。`get_or_create` 保证同一名称同时最多只有
//! 一次创建：同一调用链的重入说明存在构造器循环，其他调用链等待创建完成；
//! 等待会形成跨链死锁时改为返回早期引用。
//!
//! 注册表同时维护依赖边（用于级联销毁）、包含关系（内部 Bean）以及按注册
//! 顺序排列的销毁适配器。

use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use crate::creation::{ChainId, CreationContext};
use crate::disposable::DisposableBeanAdapter;
use crate::error::{BeansError, BeansResult};
use crate::value::BeanRef;

/// 早期引用工厂：对半成品实例应用早期引用钩子
pub type EarlyReferenceFactory = Arc<dyn Fn() -> BeansResult<BeanRef> + Send + Sync>;

/// 单例槽位
#[derive(Clone)]
pub enum SingletonSlot {
    /// 正在创建，尚未有人请求早期引用
    EarlyFactory(EarlyReferenceFactory),
    /// 早期引用已经暴露给其他 Bean
    EarlyExposed(BeanRef),
    /// 创建完成
    Finished(BeanRef),
}

impl SingletonSlot {
    fn rank(&self) -> u8 {
        match self {
            SingletonSlot::EarlyFactory(_) => 1,
            SingletonSlot::EarlyExposed(_) => 2,
            SingletonSlot::Finished(_) => 3,
        }
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            SingletonSlot::EarlyFactory(_) => "early-factory",
            SingletonSlot::EarlyExposed(_) => "early-exposed",
            SingletonSlot::Finished(_) => "finished",
        }
    }

    /// 已暴露或已完成的实例
    pub fn value(&self) -> Option<&BeanRef> {
        match self {
            SingletonSlot::EarlyFactory(_) => None,
            SingletonSlot::EarlyExposed(bean) | SingletonSlot::Finished(bean) => Some(bean),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, SingletonSlot::Finished(_))
    }
}

impl fmt::Debug for SingletonSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state_name())
    }
}

/// 槽位迁移函数
///
/// 空槽位可以进入任何状态；之后只能向更靠后的状态迁移，`Finished` 是终态。
/// 移除槽位只发生在创建失败回滚或销毁时，不经过这里。
pub fn transition(
    bean_name: &str,
    current: Option<&SingletonSlot>,
    next: SingletonSlot,
) -> BeansResult<SingletonSlot> {
    match current {
        None => Ok(next),
        Some(current) if next.rank() > current.rank() => Ok(next),
        Some(current) => Err(BeansError::IllegalState(format!(
            "Illegal singleton state transition for bean '{}': {} -> {}",
            bean_name,
            current.state_name(),
            next.state_name()
        ))),
    }
}

#[derive(Debug, Clone, Copy)]
struct Owner {
    chain: ChainId,
    thread: ThreadId,
}

#[derive(Default)]
struct CreationState {
    /// 正在创建的名称及其所属调用链
    in_flight: HashMap<String, Owner>,
    /// 正在等待的调用链 -> 等待的名称
    waiting: HashMap<ChainId, String>,
}

impl CreationState {
    /// `me` 等待 `owner` 是否会形成环
    fn would_deadlock(&self, me: ChainId, owner: ChainId) -> bool {
        let mut current = owner;
        let mut visited = HashSet::new();
        loop {
            if current == me {
                return true;
            }
            if !visited.insert(current) {
                return false;
            }
            let next = self
                .waiting
                .get(&current)
                .and_then(|name| self.in_flight.get(name))
                .map(|o| o.chain);
            match next {
                Some(chain) => current = chain,
                None => return false,
            }
        }
    }
}

/// 单例注册表
pub struct SingletonRegistry {
    slots: RwLock<HashMap<String, SingletonSlot>>,
    /// 完成的单例的注册顺序
    registration_order: Mutex<Vec<String>>,
    creation: Mutex<CreationState>,
    creation_done: Condvar,
    /// 名称 -> 拿到过它早期引用的 Bean
    early_observers: Mutex<HashMap<String, Vec<String>>>,
    /// 名称 -> 依赖它的 Bean
    dependent_beans: RwLock<HashMap<String, Vec<String>>>,
    /// 名称 -> 它依赖的 Bean
    dependencies_for_bean: RwLock<HashMap<String, Vec<String>>>,
    /// 外部 Bean -> 它包含的内部 Bean
    contained_beans: RwLock<HashMap<String, Vec<String>>>,
    disposables: Mutex<Vec<(String, Arc<DisposableBeanAdapter>)>>,
    in_destruction: AtomicBool,
}

/// 创建期间持有的在途标记；离开作用域时（包括 panic）清除标记并唤醒等待者
struct InFlightGuard<'a> {
    registry: &'a SingletonRegistry,
    bean_name: &'a str,
    completed: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.registry.remove_singleton(self.bean_name);
        }
        self.registry.creation.lock().in_flight.remove(self.bean_name);
        self.registry.creation_done.notify_all();
    }
}

impl SingletonRegistry {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            registration_order: Mutex::new(Vec::new()),
            creation: Mutex::new(CreationState::default()),
            creation_done: Condvar::new(),
            early_observers: Mutex::new(HashMap::new()),
            dependent_beans: RwLock::new(HashMap::new()),
            dependencies_for_bean: RwLock::new(HashMap::new()),
            contained_beans: RwLock::new(HashMap::new()),
            disposables: Mutex::new(Vec::new()),
            in_destruction: AtomicBool::new(false),
        }
    }

    fn finished(&self, bean_name: &str) -> Option<BeanRef> {
        match self.slots.read().get(bean_name) {
            Some(SingletonSlot::Finished(bean)) => Some(Arc::clone(bean)),
            _ => None,
        }
    }

    fn apply(&self, bean_name: &str, next: SingletonSlot) -> BeansResult<()> {
        let mut slots = self.slots.write();
        let slot = transition(bean_name, slots.get(bean_name), next)?;
        let finished = slot.is_finished();
        slots.insert(bean_name.to_string(), slot);
        drop(slots);
        if finished {
            let mut order = self.registration_order.lock();
            if !order.iter().any(|n| n == bean_name) {
                order.push(bean_name.to_string());
            }
        }
        Ok(())
    }

    /// 查找单例
    ///
    /// 完成的单例直接返回。未完成的实例只对正在创建它的调用链可见：
    /// 已暴露的早期引用直接返回，`allow_early_reference` 时还会调用早期引用
    /// 工厂。拿到早期引用的 Bean（上下文中的当前 Bean）被记录下来。
    pub fn get_singleton(
        &self,
        bean_name: &str,
        allow_early_reference: bool,
        ctx: &CreationContext,
    ) -> BeansResult<Option<BeanRef>> {
        let exposed = match self.slots.read().get(bean_name) {
            None => return Ok(None),
            Some(SingletonSlot::Finished(bean)) => return Ok(Some(Arc::clone(bean))),
            Some(SingletonSlot::EarlyExposed(bean)) => Some(Arc::clone(bean)),
            Some(SingletonSlot::EarlyFactory(_)) => None,
        };

        if !self.is_currently_in_creation_by(bean_name, ctx) {
            return Ok(None);
        }

        let early = match exposed {
            Some(bean) => Some(bean),
            None if allow_early_reference => self.resolve_early_reference(bean_name)?,
            None => None,
        };
        if early.is_some() {
            tracing::trace!(
                "Returning eagerly cached instance of singleton bean '{}' that is not fully initialized yet - a consequence of a circular reference",
                bean_name
            );
            self.record_early_observer(bean_name, ctx);
        }
        Ok(early)
    }

    /// 把早期引用工厂兑现为已暴露的早期引用
    fn resolve_early_reference(&self, bean_name: &str) -> BeansResult<Option<BeanRef>> {
        let factory = match self.slots.read().get(bean_name) {
            None => return Ok(None),
            Some(SingletonSlot::EarlyFactory(factory)) => Arc::clone(factory),
            Some(slot) => return Ok(slot.value().cloned()),
        };

        let early = factory()?;
        let mut slots = self.slots.write();
        match slots.get(bean_name) {
            Some(SingletonSlot::EarlyFactory(_)) => {
                let next = transition(
                    bean_name,
                    slots.get(bean_name),
                    SingletonSlot::EarlyExposed(Arc::clone(&early)),
                )?;
                slots.insert(bean_name.to_string(), next);
                Ok(Some(early))
            }
            Some(slot) => Ok(slot.value().cloned()),
            None => Ok(None),
        }
    }

    fn record_early_observer(&self, bean_name: &str, ctx: &CreationContext) {
        if let Some(observer) = ctx.current_bean() {
            let mut observers = self.early_observers.lock();
            let list = observers.entry(bean_name.to_string()).or_default();
            if !list.iter().any(|n| n == observer) {
                list.push(observer.to_string());
            }
        }
    }

    /// 拿到过该 Bean 早期引用的 Bean
    pub fn early_observers(&self, bean_name: &str) -> Vec<String> {
        self.early_observers
            .lock()
            .get(bean_name)
            .cloned()
            .unwrap_or_default()
    }

    /// 已暴露的早期引用（不会触发早期引用工厂）
    pub fn early_singleton(&self, bean_name: &str) -> Option<BeanRef> {
        match self.slots.read().get(bean_name) {
            Some(SingletonSlot::EarlyExposed(bean)) => Some(Arc::clone(bean)),
            _ => None,
        }
    }

    /// 获取或创建单例
    ///
    /// `create` 在持有该名称的在途标记时运行，失败时回滚槽位。
    pub fn get_or_create<F>(
        &self,
        bean_name: &str,
        ctx: &mut CreationContext,
        create: F,
    ) -> BeansResult<BeanRef>
    where
        F: FnOnce(&mut CreationContext) -> BeansResult<BeanRef>,
    {
        {
            let mut state = self.creation.lock();
            loop {
                if let Some(bean) = self.finished(bean_name) {
                    return Ok(bean);
                }
                if self.in_destruction.load(Ordering::Acquire) {
                    return Err(BeansError::creation(
                        bean_name,
                        "Singleton bean creation not allowed while singletons of this factory are in destruction",
                    ));
                }

                let owner = state.in_flight.get(bean_name).copied();
                match owner {
                    None => {
                        state.in_flight.insert(
                            bean_name.to_string(),
                            Owner {
                                chain: ctx.chain(),
                                thread: ctx.thread(),
                            },
                        );
                        break;
                    }
                    Some(owner) if owner.chain == ctx.chain() || owner.thread == ctx.thread() => {
                        return Err(BeansError::currently_in_creation(bean_name));
                    }
                    Some(owner) => {
                        if state.would_deadlock(ctx.chain(), owner.chain) {
                            drop(state);
                            tracing::debug!(
                                "Waiting for singleton '{}' would deadlock; falling back to its early reference",
                                bean_name
                            );
                            return match self.resolve_early_reference(bean_name)? {
                                Some(early) => {
                                    self.record_early_observer(bean_name, ctx);
                                    Ok(early)
                                }
                                None => Err(BeansError::currently_in_creation(bean_name)),
                            };
                        }
                        tracing::trace!("Waiting for singleton '{}' created by another thread", bean_name);
                        state.waiting.insert(ctx.chain(), bean_name.to_string());
                        self.creation_done.wait(&mut state);
                        state.waiting.remove(&ctx.chain());
                    }
                }
            }
        }

        let mut guard = InFlightGuard {
            registry: self,
            bean_name,
            completed: false,
        };
        tracing::debug!("Creating shared instance of singleton bean '{}'", bean_name);
        ctx.begin_singleton(bean_name);
        let result = create(ctx);
        ctx.end_singleton(bean_name);

        let bean = result?;
        self.apply(bean_name, SingletonSlot::Finished(Arc::clone(&bean)))?;
        self.early_observers.lock().remove(bean_name);
        guard.completed = true;
        Ok(bean)
    }

    /// 登记早期引用工厂（仅在该名称正在创建时调用）
    pub fn add_singleton_factory(
        &self,
        bean_name: &str,
        factory: EarlyReferenceFactory,
    ) -> BeansResult<()> {
        if self.slots.read().contains_key(bean_name) {
            return Ok(());
        }
        self.apply(bean_name, SingletonSlot::EarlyFactory(factory))
    }

    /// 直接注册一个完成的单例
    pub fn register_singleton(&self, bean_name: &str, bean: BeanRef) -> BeansResult<()> {
        let _state = self.creation.lock();
        if self.finished(bean_name).is_some() {
            return Err(BeansError::IllegalState(format!(
                "Could not register object under bean name '{}': there is already an object bound",
                bean_name
            )));
        }
        self.apply(bean_name, SingletonSlot::Finished(bean))?;
        tracing::debug!("Registered singleton '{}'", bean_name);
        Ok(())
    }

    /// 移除槽位（回滚或销毁）
    pub fn remove_singleton(&self, bean_name: &str) {
        self.slots.write().remove(bean_name);
        self.registration_order.lock().retain(|n| n != bean_name);
        self.early_observers.lock().remove(bean_name);
    }

    pub fn contains_singleton(&self, bean_name: &str) -> bool {
        self.finished(bean_name).is_some()
    }

    pub fn singleton(&self, bean_name: &str) -> Option<BeanRef> {
        self.finished(bean_name)
    }

    pub fn slot_state(&self, bean_name: &str) -> Option<&'static str> {
        self.slots.read().get(bean_name).map(SingletonSlot::state_name)
    }

    /// 完成的单例名称（注册顺序）
    pub fn singleton_names(&self) -> Vec<String> {
        self.registration_order.lock().clone()
    }

    pub fn singleton_count(&self) -> usize {
        self.registration_order.lock().len()
    }

    pub fn is_currently_in_creation(&self, bean_name: &str) -> bool {
        self.creation.lock().in_flight.contains_key(bean_name)
    }

    /// 是否由该调用链（或同一线程上的另一条链）正在创建
    pub fn is_currently_in_creation_by(&self, bean_name: &str, ctx: &CreationContext) -> bool {
        self.creation
            .lock()
            .in_flight
            .get(bean_name)
            .map_or(false, |o| o.chain == ctx.chain() || o.thread == ctx.thread())
    }

    pub fn is_in_destruction(&self) -> bool {
        self.in_destruction.load(Ordering::Acquire)
    }

    /// 登记依赖边：`dependent_bean_name` 依赖 `bean_name`
    pub fn register_dependent_bean(&self, bean_name: &str, dependent_bean_name: &str) {
        {
            let mut dependents = self.dependent_beans.write();
            let list = dependents.entry(bean_name.to_string()).or_default();
            if list.iter().any(|n| n == dependent_bean_name) {
                return;
            }
            list.push(dependent_bean_name.to_string());
        }
        let mut dependencies = self.dependencies_for_bean.write();
        let list = dependencies
            .entry(dependent_bean_name.to_string())
            .or_default();
        if !list.iter().any(|n| n == bean_name) {
            list.push(bean_name.to_string());
        }
    }

    /// `dependent_bean_name` 是否（直接或传递地）依赖 `bean_name`
    pub fn is_dependent(&self, bean_name: &str, dependent_bean_name: &str) -> bool {
        let dependents = self.dependent_beans.read();
        let mut visited = HashSet::new();
        Self::is_dependent_in(&dependents, bean_name, dependent_bean_name, &mut visited)
    }

    fn is_dependent_in(
        dependents: &HashMap<String, Vec<String>>,
        bean_name: &str,
        dependent_bean_name: &str,
        visited: &mut HashSet<String>,
    ) -> bool {
        if !visited.insert(bean_name.to_string()) {
            return false;
        }
        let Some(direct) = dependents.get(bean_name) else {
            return false;
        };
        direct.iter().any(|d| {
            d == dependent_bean_name
                || Self::is_dependent_in(dependents, d, dependent_bean_name, visited)
        })
    }

    pub fn has_dependent_bean(&self, bean_name: &str) -> bool {
        self.dependent_beans
            .read()
            .get(bean_name)
            .map_or(false, |l| !l.is_empty())
    }

    /// 依赖该 Bean 的 Bean
    pub fn dependent_beans(&self, bean_name: &str) -> Vec<String> {
        self.dependent_beans
            .read()
            .get(bean_name)
            .cloned()
            .unwrap_or_default()
    }

    /// 该 Bean 依赖的 Bean
    pub fn dependencies_for_bean(&self, bean_name: &str) -> Vec<String> {
        self.dependencies_for_bean
            .read()
            .get(bean_name)
            .cloned()
            .unwrap_or_default()
    }

    /// 登记内部 Bean：外部 Bean 销毁时级联销毁内部 Bean
    pub fn register_contained_bean(&self, contained_bean_name: &str, containing_bean_name: &str) {
        {
            let mut contained = self.contained_beans.write();
            let list = contained.entry(containing_bean_name.to_string()).or_default();
            if list.iter().any(|n| n == contained_bean_name) {
                return;
            }
            list.push(contained_bean_name.to_string());
        }
        self.register_dependent_bean(contained_bean_name, containing_bean_name);
    }

    pub fn contained_beans(&self, containing_bean_name: &str) -> Vec<String> {
        self.contained_beans
            .read()
            .get(containing_bean_name)
            .cloned()
            .unwrap_or_default()
    }

    /// 登记销毁适配器；同名的旧适配器被替换且保持原位置
    pub fn register_disposable_bean(&self, bean_name: &str, adapter: Arc<DisposableBeanAdapter>) {
        let mut disposables = self.disposables.lock();
        match disposables.iter_mut().find(|(n, _)| n == bean_name) {
            Some(entry) => entry.1 = adapter,
            None => disposables.push((bean_name.to_string(), adapter)),
        }
    }

    pub fn disposable_bean_names(&self) -> Vec<String> {
        self.disposables.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    fn take_disposable(&self, bean_name: &str) -> Option<Arc<DisposableBeanAdapter>> {
        let mut disposables = self.disposables.lock();
        let index = disposables.iter().position(|(n, _)| n == bean_name)?;
        Some(disposables.remove(index).1)
    }

    /// 销毁所有单例：按注册的逆序销毁登记了适配器的 Bean，再清空注册表
    pub fn destroy_singletons(&self) {
        self.in_destruction.store(true, Ordering::Release);
        let names = self.disposable_bean_names();
        tracing::info!("Destroying singletons: {} disposable beans", names.len());

        for name in names.iter().rev() {
            self.destroy_singleton(name);
        }

        self.contained_beans.write().clear();
        self.dependent_beans.write().clear();
        self.dependencies_for_bean.write().clear();
        self.slots.write().clear();
        self.registration_order.lock().clear();
        self.early_observers.lock().clear();
        self.in_destruction.store(false, Ordering::Release);
        tracing::info!("Singleton beans destruction completed");
    }

    /// 销毁单个单例：移除槽位并执行销毁（先销毁依赖它的 Bean）
    pub fn destroy_singleton(&self, bean_name: &str) {
        self.remove_singleton(bean_name);
        let adapter = self.take_disposable(bean_name);
        self.destroy_bean(bean_name, adapter);
    }

    fn destroy_bean(&self, bean_name: &str, adapter: Option<Arc<DisposableBeanAdapter>>) {
        let dependents = self.dependent_beans.write().remove(bean_name);
        if let Some(dependents) = dependents {
            tracing::debug!(
                "Destroying dependent beans of '{}' first: {:?}",
                bean_name,
                dependents
            );
            for dependent in dependents {
                self.destroy_singleton(&dependent);
            }
        }

        if let Some(adapter) = adapter {
            tracing::debug!("Invoking destroy callbacks of bean '{}'", bean_name);
            adapter.destroy();
        }

        let contained = self.contained_beans.write().remove(bean_name);
        if let Some(contained) = contained {
            for inner in contained {
                self.destroy_singleton(&inner);
            }
        }

        {
            let mut dependents = self.dependent_beans.write();
            for list in dependents.values_mut() {
                list.retain(|n| n != bean_name);
            }
            dependents.retain(|_, list| !list.is_empty());
        }
        self.dependencies_for_bean.write().remove(bean_name);
    }
}

impl Default for SingletonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::BeanDefinition;
    use crate::class::{BeanClass, DisposableBean};
    use crate::merged::MergedBeanDefinition;
    use std::sync::atomic::AtomicUsize;

    fn bean(value: u32) -> BeanRef {
        Arc::new(value)
    }

    #[test]
    fn test_transition_is_monotonic() {
        let factory: EarlyReferenceFactory = Arc::new(|| Ok(bean(1)));
        let early = SingletonSlot::EarlyFactory(factory);
        let exposed = SingletonSlot::EarlyExposed(bean(1));
        let finished = SingletonSlot::Finished(bean(1));

        assert!(transition("a", None, early.clone()).is_ok());
        assert!(transition("a", Some(&early), exposed.clone()).is_ok());
        assert!(transition("a", Some(&early), finished.clone()).is_ok());
        assert!(transition("a", Some(&exposed), finished.clone()).is_ok());

        assert!(transition("a", Some(&exposed), early.clone()).is_err());
        assert!(transition("a", Some(&finished), exposed).is_err());
        assert!(transition("a", Some(&finished), finished.clone()).is_err());
        assert!(transition("a", Some(&early), early.clone()).is_err());
    }

    #[test]
    fn test_get_or_create_caches_result() {
        let registry = SingletonRegistry::new();
        let mut ctx = CreationContext::new();
        let created = registry.get_or_create("a", &mut ctx, |_| Ok(bean(7))).unwrap();
        let again = registry
            .get_or_create("a", &mut ctx, |_| panic!("must not create twice"))
            .unwrap();

        assert!(Arc::ptr_eq(&created, &again));
        assert!(registry.contains_singleton("a"));
        assert_eq!(registry.singleton_names(), vec!["a"]);
        assert!(!registry.is_currently_in_creation("a"));
    }

    #[test]
    fn test_reentrant_creation_is_currently_in_creation() {
        let registry = SingletonRegistry::new();
        let mut ctx = CreationContext::new();
        let err = registry
            .get_or_create("a", &mut ctx, |ctx| {
                registry.get_or_create("a", ctx, |_| Ok(bean(1)))
            })
            .unwrap_err();

        assert!(err.is_currently_in_creation());
        assert!(!registry.contains_singleton("a"));
        assert!(registry.slot_state("a").is_none());
    }

    #[test]
    fn test_failure_rolls_back_slot() {
        let registry = SingletonRegistry::new();
        let mut ctx = CreationContext::new();
        let result = registry.get_or_create("a", &mut ctx, |_| {
            registry
                .add_singleton_factory("a", Arc::new(|| Ok(bean(1))))
                .unwrap();
            Err(BeansError::creation("a", "boom"))
        });

        assert!(result.is_err());
        assert!(registry.slot_state("a").is_none());

        let retried = registry.get_or_create("a", &mut ctx, |_| Ok(bean(2))).unwrap();
        assert_eq!(*retried.downcast_ref::<u32>().unwrap(), 2);
    }

    #[test]
    fn test_early_reference_visible_only_to_creating_chain() {
        let registry = SingletonRegistry::new();
        let mut ctx = CreationContext::new();
        let raw = bean(1);
        let raw_for_factory = Arc::clone(&raw);

        registry
            .get_or_create("a", &mut ctx, |ctx| {
                registry.add_singleton_factory(
                    "a",
                    Arc::new(move || Ok(Arc::clone(&raw_for_factory))),
                )?;
                assert_eq!(registry.slot_state("a"), Some("early-factory"));

                ctx.push_creating("b");
                let early = registry.get_singleton("a", true, ctx)?.unwrap();
                ctx.pop_creating();
                assert!(Arc::ptr_eq(&early, &raw));
                assert_eq!(registry.slot_state("a"), Some("early-exposed"));
                assert_eq!(registry.early_observers("a"), vec!["b"]);

                let other = std::thread::scope(|s| {
                    s.spawn(|| {
                        let other_ctx = CreationContext::new();
                        registry.get_singleton("a", true, &other_ctx).map(|b| b.is_some())
                    })
                    .join()
                    .unwrap()
                });
                assert_eq!(other.unwrap(), false);
                Ok(Arc::clone(&raw))
            })
            .unwrap();

        assert_eq!(registry.slot_state("a"), Some("finished"));
        assert!(registry.early_observers("a").is_empty());
    }

    #[test]
    fn test_concurrent_get_or_create_constructs_once() {
        let registry = SingletonRegistry::new();
        let constructed = AtomicUsize::new(0);

        let beans: Vec<BeanRef> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        let mut ctx = CreationContext::new();
                        registry
                            .get_or_create("shared", &mut ctx, |_| {
                                constructed.fetch_add(1, Ordering::SeqCst);
                                std::thread::sleep(std::time::Duration::from_millis(20));
                                Ok(bean(42))
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(constructed.load(Ordering::SeqCst), 1);
        assert!(beans.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_cross_thread_cycle_falls_back_to_early_reference() {
        let registry = SingletonRegistry::new();
        let barrier = std::sync::Barrier::new(2);

        // 各自持有自己的在途标记后再请求对方
        let run = |own: &'static str, other: &'static str, value: u32| {
            let mut ctx = CreationContext::new();
            let mut peer = None;
            let created = registry
                .get_or_create(own, &mut ctx, |ctx| {
                    let raw = bean(value);
                    let early = Arc::clone(&raw);
                    registry.add_singleton_factory(own, Arc::new(move || Ok(Arc::clone(&early))))?;
                    barrier.wait();
                    peer = Some(registry.get_or_create(other, ctx, |_| {
                        panic!("'{}' must be created by its own thread", other)
                    })?);
                    Ok(raw)
                })
                .unwrap();
            (created, peer.unwrap())
        };

        let ((a, peer_of_a), (b, peer_of_b)) = std::thread::scope(|s| {
            let first = s.spawn(|| run("a", "b", 1));
            let second = s.spawn(|| run("b", "a", 2));
            (first.join().unwrap(), second.join().unwrap())
        });

        assert!(Arc::ptr_eq(&peer_of_a, &b));
        assert!(Arc::ptr_eq(&peer_of_b, &a));
        assert_eq!(registry.slot_state("a"), Some("finished"));
        assert_eq!(registry.slot_state("b"), Some("finished"));
        assert!(!registry.is_currently_in_creation("a"));
        assert!(!registry.is_currently_in_creation("b"));
    }

    #[test]
    fn test_register_singleton_twice_fails() {
        let registry = SingletonRegistry::new();
        registry.register_singleton("a", bean(1)).unwrap();
        assert!(registry.register_singleton("a", bean(2)).is_err());
    }

    #[test]
    fn test_transitive_dependency_edges() {
        let registry = SingletonRegistry::new();
        registry.register_dependent_bean("c", "b");
        registry.register_dependent_bean("b", "a");

        assert!(registry.is_dependent("c", "b"));
        assert!(registry.is_dependent("c", "a"));
        assert!(!registry.is_dependent("a", "c"));
        assert_eq!(registry.dependencies_for_bean("a"), vec!["b"]);
        assert_eq!(registry.dependent_beans("c"), vec!["b"]);
    }

    struct Tracked {
        name: &'static str,
        log: Arc<parking_lot::Mutex<Vec<&'static str>>>,
    }

    impl DisposableBean for Tracked {
        fn destroy(&self) -> anyhow::Result<()> {
            self.log.lock().push(self.name);
            Ok(())
        }
    }

    fn register_tracked(
        registry: &SingletonRegistry,
        class: &BeanClass,
        name: &'static str,
        log: &Arc<parking_lot::Mutex<Vec<&'static str>>>,
    ) {
        let instance: BeanRef = Arc::new(Tracked {
            name,
            log: Arc::clone(log),
        });
        registry.register_singleton(name, Arc::clone(&instance)).unwrap();
        let mbd = MergedBeanDefinition::from_root(&BeanDefinition::of_class("Tracked"));
        let adapter = DisposableBeanAdapter::for_bean(&instance, name, &mbd, Some(class), &[])
            .unwrap()
            .unwrap();
        registry.register_disposable_bean(name, Arc::new(adapter));
    }

    #[test]
    fn test_destroy_order_dependents_first_then_reverse_registration() {
        let registry = SingletonRegistry::new();
        let class = BeanClass::builder::<Tracked>("Tracked").disposable().build();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        register_tracked(&registry, &class, "a", &log);
        register_tracked(&registry, &class, "b", &log);
        register_tracked(&registry, &class, "c", &log);
        // b depends on c: destroying c must destroy b first
        registry.register_dependent_bean("c", "b");

        registry.destroy_singletons();
        assert_eq!(*log.lock(), vec!["b", "c", "a"]);
        assert_eq!(registry.singleton_count(), 0);
        assert!(registry.disposable_bean_names().is_empty());
    }

    #[test]
    fn test_destroy_singleton_cascades_to_contained_beans() {
        let registry = SingletonRegistry::new();
        let class = BeanClass::builder::<Tracked>("Tracked").disposable().build();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        register_tracked(&registry, &class, "outer", &log);
        register_tracked(&registry, &class, "(inner bean)#1", &log);
        registry.register_contained_bean("(inner bean)#1", "outer");

        registry.destroy_singleton("outer");
        assert_eq!(*log.lock(), vec!["outer", "(inner bean)#1"]);
        assert!(!registry.contains_singleton("outer"));
        assert!(!registry.contains_singleton("(inner bean)#1"));
    }

    #[test]
    fn test_creation_refused_during_destruction() {
        let registry = SingletonRegistry::new();
        registry.in_destruction.store(true, Ordering::Release);
        let mut ctx = CreationContext::new();
        let err = registry.get_or_create("a", &mut ctx, |_| Ok(bean(1))).unwrap_err();
        assert!(err.to_string().contains("in destruction"));
    }
}
