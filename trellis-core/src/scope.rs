//! 自定义作用域
//!
//! `singleton` 和 `prototype` 由工厂内置处理；其他作用域名称通过
//! [`Scope`] 实现注册。作用域决定实例缓存在哪里、何时销毁。

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::BeansResult;
use crate::value::BeanRef;

/// 作用域结束时执行的销毁回调
pub type DestructionCallback = Box<dyn FnOnce() + Send + Sync>;

/// 作用域
pub trait Scope: Send + Sync {
    /// 返回作用域中的实例；不存在时调用 `object_factory` 创建
    fn get(
        &self,
        name: &str,
        object_factory: &mut dyn FnMut() -> BeansResult<BeanRef>,
    ) -> BeansResult<BeanRef>;

    /// 从作用域中移除实例，同时丢弃其销毁回调
    fn remove(&self, name: &str) -> Option<BeanRef>;

    /// 注册在作用域结束时执行的销毁回调
    fn register_destruction_callback(&self, name: &str, callback: DestructionCallback);

    /// 作用域会话标识（没有会话概念时返回 `None`）
    fn conversation_id(&self) -> Option<String> {
        None
    }
}

/// 基于映射的简单作用域
///
/// 适合线程外显式管理生命周期的场景（例如一次请求、一个任务）：
/// 调用方在作用域结束时调用 [`SimpleScope::close`]。
pub struct SimpleScope {
    id: String,
    objects: Mutex<HashMap<String, BeanRef>>,
    callbacks: Mutex<Vec<(String, DestructionCallback)>>,
}

impl SimpleScope {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            objects: Mutex::new(HashMap::new()),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    /// 结束作用域：清空实例，按注册的逆序执行销毁回调
    pub fn close(&self) {
        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        self.objects.lock().clear();
        tracing::debug!(
            "Closing scope '{}' with {} destruction callbacks",
            self.id,
            callbacks.len()
        );
        for (name, callback) in callbacks.into_iter().rev() {
            tracing::trace!("Running destruction callback for scoped bean '{}'", name);
            callback();
        }
    }
}

impl Scope for SimpleScope {
    fn get(
        &self,
        name: &str,
        object_factory: &mut dyn FnMut() -> BeansResult<BeanRef>,
    ) -> BeansResult<BeanRef> {
        if let Some(existing) = self.objects.lock().get(name) {
            return Ok(existing.clone());
        }

        // 创建期间不持有锁：创建过程可能从同一作用域获取其他 Bean
        let created = object_factory()?;
        let mut objects = self.objects.lock();
        Ok(objects
            .entry(name.to_string())
            .or_insert(created)
            .clone())
    }

    fn remove(&self, name: &str) -> Option<BeanRef> {
        self.callbacks.lock().retain(|(n, _)| n != name);
        self.objects.lock().remove(name)
    }

    fn register_destruction_callback(&self, name: &str, callback: DestructionCallback) {
        self.callbacks.lock().push((name.to_string(), callback));
    }

    fn conversation_id(&self) -> Option<String> {
        Some(self.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_get_caches_within_scope() {
        let scope = SimpleScope::new("request-1");
        let mut calls = 0;
        let mut factory = || {
            calls += 1;
            Ok(Arc::new(calls) as BeanRef)
        };

        let first = scope.get("a", &mut factory).unwrap();
        let second = scope.get("a", &mut factory).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls, 1);
        assert_eq!(scope.conversation_id().as_deref(), Some("request-1"));
    }

    #[test]
    fn test_close_runs_callbacks_in_reverse_order() {
        let scope = SimpleScope::new("s");
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b"] {
            let order = Arc::clone(&order);
            scope.register_destruction_callback(
                name,
                Box::new(move || order.lock().push(name.to_string())),
            );
        }

        scope.close();
        assert_eq!(*order.lock(), vec!["b", "a"]);
        assert!(scope.is_empty());
    }

    #[test]
    fn test_remove_drops_callback() {
        let scope = SimpleScope::new("s");
        let ran = Arc::new(Mutex::new(false));
        scope
            .get("a", &mut || Ok(Arc::new(1_u8) as BeanRef))
            .unwrap();
        let flag = Arc::clone(&ran);
        scope.register_destruction_callback("a", Box::new(move || *flag.lock() = true));

        assert!(scope.remove("a").is_some());
        scope.close();
        assert!(!*ran.lock());
    }
}
