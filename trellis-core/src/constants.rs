/// 容器常量定义
///
/// 作用域名称、FactoryBean 解引用前缀、生成名称分隔符等在定义、工厂
/// 和工具函数之间共享的标识符

/// 单例作用域
pub const SCOPE_SINGLETON: &str = "singleton";

/// 原型作用域
pub const SCOPE_PROTOTYPE: &str = "prototype";

/// 区分 FactoryBean 本身与其产品的前缀：`&myFactory` 返回工厂本身
pub const FACTORY_BEAN_PREFIX: &str = "&";

/// 生成 Bean 名称时使用的分隔符
pub const GENERATED_BEAN_NAME_SEPARATOR: &str = "#";

/// 匿名内部 Bean 的名称前缀
pub const INNER_BEAN_MARKER: &str = "(inner bean)";

/// destroy 方法名设为该值时，按约定推断 `close` / `shutdown`
pub const INFER_METHOD: &str = "(inferred)";

/// 约定的关闭方法名
pub const CLOSE_METHOD_NAME: &str = "close";

/// 约定的关闭方法名（备选）
pub const SHUTDOWN_METHOD_NAME: &str = "shutdown";

/// `InitializingBean` 协议方法名
pub const AFTER_PROPERTIES_SET_METHOD_NAME: &str = "afterPropertiesSet";

/// `DisposableBean` 协议方法名
pub const DESTROY_METHOD_NAME: &str = "destroy";

/// 内置作用域，不允许覆盖
pub const RESERVED_SCOPE_NAMES: &[&str] = &[SCOPE_SINGLETON, SCOPE_PROTOTYPE];
