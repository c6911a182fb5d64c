//! FactoryBean 支持
//!
//! FactoryBean 是用来生产其他对象的 Bean。按名称获取时默认返回其产品，
//! 使用 `&name` 获取工厂本身。

use parking_lot::{ReentrantMutex, RwLock};
use std::collections::HashMap;

use crate::value::{BeanRef, TypeRef};

/// 生产对象的 Bean
pub trait FactoryBean: Send + Sync {
    /// 生产对象；`None` 表示 null 产品
    fn get_object(&self) -> anyhow::Result<Option<BeanRef>>;

    /// 产品类型，未知时返回 `None`
    fn object_type(&self) -> Option<TypeRef> {
        None
    }

    /// 产品是否为单例（由工厂缓存）
    fn is_singleton(&self) -> bool {
        true
    }

    /// 预实例化时是否同时创建产品
    fn is_eager_init(&self) -> bool {
        false
    }
}

/// 单例 FactoryBean 产品的缓存
#[derive(Default)]
pub struct FactoryBeanObjectCache {
    objects: RwLock<HashMap<String, BeanRef>>,
    creation_lock: ReentrantMutex<()>,
}

impl FactoryBeanObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, bean_name: &str) -> Option<BeanRef> {
        self.objects.read().get(bean_name).cloned()
    }

    /// 在创建锁内获取或生产产品（同一线程可重入，产品创建可以嵌套获取其他产品）
    ///
    /// `produce` 只在缓存未命中时调用；返回的第二个值表示产品是否应当缓存
    /// （例如工厂本身仍在创建中时产品不会被缓存）。
    pub fn get_or_produce<F, E>(&self, bean_name: &str, produce: F) -> Result<BeanRef, E>
    where
        F: FnOnce() -> Result<(BeanRef, bool), E>,
    {
        if let Some(cached) = self.get(bean_name) {
            return Ok(cached);
        }

        let _guard = self.creation_lock.lock();
        if let Some(cached) = self.get(bean_name) {
            return Ok(cached);
        }

        let (object, cacheable) = produce()?;
        if cacheable {
            self.objects
                .write()
                .insert(bean_name.to_string(), object.clone());
        }
        Ok(object)
    }

    pub fn remove(&self, bean_name: &str) -> Option<BeanRef> {
        self.objects.write().remove(bean_name)
    }

    pub fn clear(&self) {
        self.objects.write().clear();
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}
