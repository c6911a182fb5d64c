//! Bean 定义注册表
//!
//! 定义源协作接口：按名称提供原始定义、维护别名。工厂只读取原始定义，
//! 合并后的快照由 [`DefinitionMerger`](crate::merged::DefinitionMerger) 缓存。

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::bean::BeanDefinition;
use crate::error::{BeansError, BeansResult};

/// 定义源
pub trait BeanDefinitionRegistry: Send + Sync {
    /// 注册定义；名称已存在且不允许覆盖时失败
    fn register_bean_definition(&self, name: &str, definition: BeanDefinition) -> BeansResult<()>;

    fn remove_bean_definition(&self, name: &str) -> BeansResult<Arc<BeanDefinition>>;

    fn bean_definition(&self, name: &str) -> Option<Arc<BeanDefinition>>;

    fn contains_bean_definition(&self, name: &str) -> bool;

    /// 按注册顺序列出定义名称
    fn bean_definition_names(&self) -> Vec<String>;

    fn bean_definition_count(&self) -> usize {
        self.bean_definition_names().len()
    }

    fn register_alias(&self, name: &str, alias: &str) -> BeansResult<()>;

    fn remove_alias(&self, alias: &str) -> BeansResult<()>;

    fn is_alias(&self, name: &str) -> bool;

    /// 直接或间接指向 `name` 的所有别名
    fn aliases(&self, name: &str) -> Vec<String>;

    /// 沿别名链解析到规范名称
    fn canonical_name(&self, name: &str) -> String;
}

/// 默认的内存定义注册表
pub struct SimpleBeanDefinitionRegistry {
    definitions: RwLock<HashMap<String, Arc<BeanDefinition>>>,
    names: RwLock<Vec<String>>,
    /// alias -> name
    aliases: RwLock<HashMap<String, String>>,
    allow_overriding: bool,
}

impl SimpleBeanDefinitionRegistry {
    pub fn new() -> Self {
        Self::with_overriding(true)
    }

    pub fn with_overriding(allow_overriding: bool) -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
            names: RwLock::new(Vec::new()),
            aliases: RwLock::new(HashMap::new()),
            allow_overriding,
        }
    }

    pub fn is_overriding_allowed(&self) -> bool {
        self.allow_overriding
    }

    /// 别名 `alias` 是否（直接或间接）指向 `name`
    fn has_alias(aliases: &HashMap<String, String>, name: &str, alias: &str) -> bool {
        aliases.iter().any(|(registered_alias, registered_name)| {
            registered_name == name
                && (registered_alias == alias || Self::has_alias(aliases, registered_alias, alias))
        })
    }

    fn collect_aliases(aliases: &HashMap<String, String>, name: &str, result: &mut Vec<String>) {
        for (alias, target) in aliases {
            if target == name && !result.contains(alias) {
                result.push(alias.clone());
                Self::collect_aliases(aliases, alias, result);
            }
        }
    }
}

impl Default for SimpleBeanDefinitionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BeanDefinitionRegistry for SimpleBeanDefinitionRegistry {
    fn register_bean_definition(&self, name: &str, definition: BeanDefinition) -> BeansResult<()> {
        if name.is_empty() {
            return Err(BeansError::IllegalArgument(
                "Bean name must not be empty".to_string(),
            ));
        }

        let mut definitions = self.definitions.write();
        if definitions.contains_key(name) {
            if !self.allow_overriding {
                return Err(BeansError::definition_store(
                    name,
                    format!(
                        "Cannot register bean definition [{:?}] for bean '{}': There is already a bound definition",
                        definition.class_name, name
                    ),
                ));
            }
            tracing::debug!("Overriding bean definition for bean '{}'", name);
        } else {
            self.names.write().push(name.to_string());
        }

        self.aliases.write().remove(name);
        definitions.insert(name.to_string(), Arc::new(definition));
        tracing::trace!("Registered bean definition '{}'", name);
        Ok(())
    }

    fn remove_bean_definition(&self, name: &str) -> BeansResult<Arc<BeanDefinition>> {
        let removed = self
            .definitions
            .write()
            .remove(name)
            .ok_or_else(|| BeansError::no_such_bean(name))?;
        self.names.write().retain(|n| n != name);
        tracing::debug!("Removed bean definition '{}'", name);
        Ok(removed)
    }

    fn bean_definition(&self, name: &str) -> Option<Arc<BeanDefinition>> {
        self.definitions.read().get(name).cloned()
    }

    fn contains_bean_definition(&self, name: &str) -> bool {
        self.definitions.read().contains_key(name)
    }

    fn bean_definition_names(&self) -> Vec<String> {
        self.names.read().clone()
    }

    fn bean_definition_count(&self) -> usize {
        self.definitions.read().len()
    }

    fn register_alias(&self, name: &str, alias: &str) -> BeansResult<()> {
        if name.is_empty() || alias.is_empty() {
            return Err(BeansError::IllegalArgument(
                "Name and alias must not be empty".to_string(),
            ));
        }

        let mut aliases = self.aliases.write();
        if alias == name {
            aliases.remove(alias);
            return Ok(());
        }
        if let Some(existing) = aliases.get(alias) {
            if existing == name {
                return Ok(());
            }
            if !self.allow_overriding {
                return Err(BeansError::IllegalState(format!(
                    "Cannot define alias '{}' for name '{}': It is already registered for name '{}'.",
                    alias, name, existing
                )));
            }
        }
        if Self::has_alias(&aliases, alias, name) {
            return Err(BeansError::IllegalState(format!(
                "Cannot register alias '{}' for name '{}': Circular reference - '{}' is a direct or indirect alias for '{}' already",
                alias, name, name, alias
            )));
        }

        aliases.insert(alias.to_string(), name.to_string());
        tracing::trace!("Alias '{}' registered for bean '{}'", alias, name);
        Ok(())
    }

    fn remove_alias(&self, alias: &str) -> BeansResult<()> {
        self.aliases
            .write()
            .remove(alias)
            .map(|_| ())
            .ok_or_else(|| BeansError::IllegalState(format!("No alias '{}' registered", alias)))
    }

    fn is_alias(&self, name: &str) -> bool {
        self.aliases.read().contains_key(name)
    }

    fn aliases(&self, name: &str) -> Vec<String> {
        let aliases = self.aliases.read();
        let mut result = Vec::new();
        Self::collect_aliases(&aliases, name, &mut result);
        result.sort();
        result
    }

    fn canonical_name(&self, name: &str) -> String {
        let aliases = self.aliases.read();
        let mut canonical = name;
        while let Some(target) = aliases.get(canonical) {
            canonical = target;
        }
        canonical.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_list_in_order() {
        let registry = SimpleBeanDefinitionRegistry::new();
        registry
            .register_bean_definition("b", BeanDefinition::of_class("B"))
            .unwrap();
        registry
            .register_bean_definition("a", BeanDefinition::of_class("A"))
            .unwrap();

        assert_eq!(registry.bean_definition_names(), vec!["b", "a"]);
        assert_eq!(registry.bean_definition_count(), 2);
        assert!(registry.contains_bean_definition("a"));
        assert_eq!(
            registry.bean_definition("a").unwrap().class_name.as_deref(),
            Some("A")
        );
    }

    #[test]
    fn test_overriding_disallowed() {
        let registry = SimpleBeanDefinitionRegistry::with_overriding(false);
        registry
            .register_bean_definition("a", BeanDefinition::of_class("A"))
            .unwrap();
        let err = registry
            .register_bean_definition("a", BeanDefinition::of_class("B"))
            .unwrap_err();
        assert!(matches!(err, BeansError::DefinitionStore { .. }));
    }

    #[test]
    fn test_overriding_keeps_position() {
        let registry = SimpleBeanDefinitionRegistry::new();
        registry.register_bean_definition("a", BeanDefinition::of_class("A")).unwrap();
        registry.register_bean_definition("b", BeanDefinition::of_class("B")).unwrap();
        registry.register_bean_definition("a", BeanDefinition::of_class("C")).unwrap();

        assert_eq!(registry.bean_definition_names(), vec!["a", "b"]);
        assert_eq!(registry.bean_definition("a").unwrap().class_name.as_deref(), Some("C"));
    }

    #[test]
    fn test_alias_chain_resolves_to_canonical_name() {
        let registry = SimpleBeanDefinitionRegistry::new();
        registry.register_alias("service", "svc").unwrap();
        registry.register_alias("svc", "s").unwrap();

        assert_eq!(registry.canonical_name("s"), "service");
        assert_eq!(registry.canonical_name("service"), "service");
        assert_eq!(registry.aliases("service"), vec!["s", "svc"]);
        assert!(registry.is_alias("svc"));
    }

    #[test]
    fn test_alias_cycle_rejected() {
        let registry = SimpleBeanDefinitionRegistry::new();
        registry.register_alias("a", "b").unwrap();
        registry.register_alias("b", "c").unwrap();

        let err = registry.register_alias("c", "a").unwrap_err();
        assert!(err.to_string().contains("Circular reference"));
    }

    #[test]
    fn test_remove_definition_and_alias() {
        let registry = SimpleBeanDefinitionRegistry::new();
        registry.register_bean_definition("a", BeanDefinition::of_class("A")).unwrap();
        registry.register_alias("a", "alpha").unwrap();

        registry.remove_alias("alpha").unwrap();
        assert!(registry.remove_alias("alpha").is_err());

        registry.remove_bean_definition("a").unwrap();
        assert!(registry.bean_definition_names().is_empty());
        assert!(matches!(
            registry.remove_bean_definition("a"),
            Err(BeansError::NoSuchBean { .. })
        ));
    }
}
