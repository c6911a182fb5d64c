//! 创建上下文
//!
//! 一次顶层 `get_bean` 调用及其递归触发的所有创建共享同一个
//! [`CreationContext`]。"正在创建"的关系由这个显式值承载，而不是线程局部
//! 状态：并发的、互不相关的请求各有自己的上下文，不会互相误判为循环。

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

static NEXT_CHAIN_ID: AtomicU64 = AtomicU64::new(1);

/// 调用链标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(u64);

impl ChainId {
    fn next() -> Self {
        ChainId(NEXT_CHAIN_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// 一条调用链上的创建状态
#[derive(Debug)]
pub struct CreationContext {
    chain: ChainId,
    thread: ThreadId,
    /// 本链正在创建的单例（按进入顺序）
    singletons: Vec<String>,
    /// 本链正在创建的原型
    prototypes: Vec<String>,
    /// 正在被创建的 Bean 栈（任意作用域），栈顶是当前 Bean
    creating: Vec<String>,
}

impl CreationContext {
    pub fn new() -> Self {
        Self {
            chain: ChainId::next(),
            thread: thread::current().id(),
            singletons: Vec::new(),
            prototypes: Vec::new(),
            creating: Vec::new(),
        }
    }

    pub fn chain(&self) -> ChainId {
        self.chain
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn begin_singleton(&mut self, bean_name: &str) {
        self.singletons.push(bean_name.to_string());
    }

    pub fn end_singleton(&mut self, bean_name: &str) {
        if let Some(pos) = self.singletons.iter().rposition(|n| n == bean_name) {
            self.singletons.remove(pos);
        }
    }

    pub fn is_singleton_in_creation(&self, bean_name: &str) -> bool {
        self.singletons.iter().any(|n| n == bean_name)
    }

    /// 标记原型开始创建；已在创建中时返回 `false`
    pub fn begin_prototype(&mut self, bean_name: &str) -> bool {
        if self.is_prototype_in_creation(bean_name) {
            return false;
        }
        self.prototypes.push(bean_name.to_string());
        true
    }

    pub fn end_prototype(&mut self, bean_name: &str) {
        if let Some(pos) = self.prototypes.iter().rposition(|n| n == bean_name) {
            self.prototypes.remove(pos);
        }
    }

    pub fn is_prototype_in_creation(&self, bean_name: &str) -> bool {
        self.prototypes.iter().any(|n| n == bean_name)
    }

    pub fn push_creating(&mut self, bean_name: &str) {
        self.creating.push(bean_name.to_string());
    }

    pub fn pop_creating(&mut self) -> Option<String> {
        self.creating.pop()
    }

    /// 当前正在创建（填充属性、解析参数）的 Bean
    pub fn current_bean(&self) -> Option<&str> {
        self.creating.last().map(String::as_str)
    }

    /// 从外到内的创建路径，用于错误信息与日志
    pub fn creation_path(&self) -> String {
        self.creating.join(" -> ")
    }

    pub fn depth(&self) -> usize {
        self.creating.len()
    }
}

impl Default for CreationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_have_distinct_chains() {
        let a = CreationContext::new();
        let b = CreationContext::new();
        assert_ne!(a.chain(), b.chain());
        assert_eq!(a.thread(), b.thread());
    }

    #[test]
    fn test_prototype_reentry_is_detected() {
        let mut ctx = CreationContext::new();
        assert!(ctx.begin_prototype("p"));
        assert!(!ctx.begin_prototype("p"));
        ctx.end_prototype("p");
        assert!(!ctx.is_prototype_in_creation("p"));
        assert!(ctx.begin_prototype("p"));
    }

    #[test]
    fn test_creating_stack_tracks_current_bean() {
        let mut ctx = CreationContext::new();
        assert!(ctx.current_bean().is_none());

        ctx.push_creating("a");
        ctx.push_creating("b");
        assert_eq!(ctx.current_bean(), Some("b"));
        assert_eq!(ctx.creation_path(), "a -> b");
        assert_eq!(ctx.depth(), 2);

        assert_eq!(ctx.pop_creating().as_deref(), Some("b"));
        assert_eq!(ctx.current_bean(), Some("a"));
    }

    #[test]
    fn test_singleton_marks_are_scoped_to_context() {
        let mut a = CreationContext::new();
        let b = CreationContext::new();
        a.begin_singleton("x");
        assert!(a.is_singleton_in_creation("x"));
        assert!(!b.is_singleton_in_creation("x"));
        a.end_singleton("x");
        assert!(!a.is_singleton_in_creation("x"));
    }
}
