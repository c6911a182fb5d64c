//! 类型元数据
//!
//! 引擎不依赖反射：每个可构造的类型通过 [`BeanClass`] 描述自己的构造器签名、
//! 方法、可写属性以及实现的生命周期协议。[`TypeResolver`] 负责按名称或按实例
//! 查找这些描述，是引擎与外部类型解析服务之间的接缝。

use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::factory_bean::FactoryBean;
use crate::value::{BeanRef, TypeRef, Value};

/// 构造器调用
pub type ConstructorFn = Arc<dyn Fn(Vec<Value>) -> anyhow::Result<BeanRef> + Send + Sync>;

/// 方法调用：实例方法接收目标 Bean，静态方法接收 `None`
pub type MethodFn =
    Arc<dyn Fn(Option<&BeanRef>, Vec<Value>) -> anyhow::Result<Value> + Send + Sync>;

/// 属性写入
pub type SetterFn = Arc<dyn Fn(&BeanRef, Value) -> anyhow::Result<()> + Send + Sync>;

/// 生命周期协议回调（`after_properties_set` / `destroy`）
pub type LifecycleFn = Arc<dyn Fn(&BeanRef) -> anyhow::Result<()> + Send + Sync>;

/// 把实例视为 FactoryBean
pub type FactoryBeanCaster = fn(&BeanRef) -> Option<&dyn FactoryBean>;

/// 属性设置完成后的初始化协议
pub trait InitializingBean: Send + Sync {
    fn after_properties_set(&self) -> anyhow::Result<()>;
}

/// 销毁协议
pub trait DisposableBean: Send + Sync {
    fn destroy(&self) -> anyhow::Result<()>;
}

/// 参数声明
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Option<String>,
    pub ty: TypeRef,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: Some(name.into()),
            ty,
        }
    }

    pub fn unnamed(ty: TypeRef) -> Self {
        Self { name: None, ty }
    }
}

/// 可被构造器解析算法处理的签名
pub trait Signature {
    fn params(&self) -> &[Param];

    /// 用于错误信息的签名描述
    fn describe(&self) -> String;
}

fn describe_params(params: &[Param]) -> String {
    params
        .iter()
        .map(|p| p.ty.type_name().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// 构造器描述
#[derive(Clone)]
pub struct ConstructorDescriptor {
    owner: String,
    params: Vec<Param>,
    invoker: ConstructorFn,
}

impl ConstructorDescriptor {
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn invoke(&self, args: Vec<Value>) -> anyhow::Result<BeanRef> {
        (self.invoker)(args)
    }
}

impl Signature for ConstructorDescriptor {
    fn params(&self) -> &[Param] {
        &self.params
    }

    fn describe(&self) -> String {
        format!("constructor {}({})", self.owner, describe_params(&self.params))
    }
}

impl fmt::Debug for ConstructorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// 方法描述
#[derive(Clone)]
pub struct MethodDescriptor {
    owner: String,
    name: String,
    params: Vec<Param>,
    is_static: bool,
    return_type: Option<TypeRef>,
    invoker: MethodFn,
}

impl MethodDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn return_type(&self) -> Option<&TypeRef> {
        self.return_type.as_ref()
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn invoke(&self, target: Option<&BeanRef>, args: Vec<Value>) -> anyhow::Result<Value> {
        (self.invoker)(target, args)
    }
}

impl Signature for MethodDescriptor {
    fn params(&self) -> &[Param] {
        &self.params
    }

    fn describe(&self) -> String {
        format!(
            "{}method {}.{}({})",
            if self.is_static { "static " } else { "" },
            self.owner,
            self.name,
            describe_params(&self.params)
        )
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// 属性描述
#[derive(Clone)]
pub struct PropertyDescriptor {
    name: String,
    ty: TypeRef,
    setter: Option<SetterFn>,
    excluded_from_dependency_check: bool,
}

impl PropertyDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    pub fn is_excluded_from_dependency_check(&self) -> bool {
        self.excluded_from_dependency_check
    }

    pub fn write(&self, bean: &BeanRef, value: Value) -> anyhow::Result<()> {
        match &self.setter {
            Some(setter) => setter(bean, value),
            None => Err(anyhow::anyhow!("Property '{}' is read-only", self.name)),
        }
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// 可构造类型的完整描述
pub struct BeanClass {
    name: String,
    type_id: TypeId,
    supertypes: Vec<String>,
    constructors: Vec<ConstructorDescriptor>,
    methods: Vec<MethodDescriptor>,
    properties: Vec<PropertyDescriptor>,
    initializing: Option<LifecycleFn>,
    disposable: Option<LifecycleFn>,
    auto_closeable: bool,
    factory_bean: Option<FactoryBeanCaster>,
}

impl BeanClass {
    /// 为类型 `T` 创建描述构建器
    pub fn builder<T: Any + Send + Sync>(name: impl Into<String>) -> BeanClassBuilder<T> {
        BeanClassBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// 该类型是否可以赋值给指定名称的类型（自身或声明的父类型）
    pub fn is_assignable_to(&self, type_name: &str) -> bool {
        self.name == type_name || self.supertypes.iter().any(|s| s == type_name)
    }

    pub fn constructors(&self) -> &[ConstructorDescriptor] {
        &self.constructors
    }

    pub fn default_constructor(&self) -> Option<&ConstructorDescriptor> {
        self.constructors.iter().find(|c| c.params.is_empty())
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn methods_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a MethodDescriptor> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m.name == name)
    }

    /// 同名实例方法中参数最少的一个
    pub fn find_method_with_minimal_params(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods
            .iter()
            .filter(|m| m.name == name && !m.is_static)
            .min_by_key(|m| m.params.len())
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn writable_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter().filter(|p| p.is_writable())
    }

    pub fn initializing_callback(&self) -> Option<&LifecycleFn> {
        self.initializing.as_ref()
    }

    pub fn is_initializing_bean(&self) -> bool {
        self.initializing.is_some()
    }

    pub fn disposable_callback(&self) -> Option<&LifecycleFn> {
        self.disposable.as_ref()
    }

    pub fn is_disposable_bean(&self) -> bool {
        self.disposable.is_some()
    }

    pub fn is_auto_closeable(&self) -> bool {
        self.auto_closeable
    }

    pub fn is_factory_bean(&self) -> bool {
        self.factory_bean.is_some()
    }

    /// 把实例视为 FactoryBean；类型不匹配或未声明该能力时返回 `None`
    pub fn as_factory_bean<'a>(&self, bean: &'a BeanRef) -> Option<&'a dyn FactoryBean> {
        self.factory_bean.and_then(|cast| cast(bean))
    }
}

impl fmt::Debug for BeanClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanClass")
            .field("name", &self.name)
            .field("supertypes", &self.supertypes)
            .field("constructors", &self.constructors.len())
            .field("methods", &self.methods)
            .field("properties", &self.properties)
            .finish()
    }
}

fn cast_factory_bean<T: FactoryBean + 'static>(bean: &BeanRef) -> Option<&dyn FactoryBean> {
    bean.downcast_ref::<T>().map(|fb| fb as &dyn FactoryBean)
}

fn downcast_target<'a, T: Any + Send + Sync>(
    bean: &'a BeanRef,
    class_name: &str,
) -> anyhow::Result<&'a T> {
    bean.downcast_ref::<T>()
        .ok_or_else(|| anyhow::anyhow!("Target object is not an instance of '{}'", class_name))
}

/// [`BeanClass`] 构建器
///
/// 所有回调都以具体类型 `T` 编写，构建器负责与 [`BeanRef`] 之间的转换。
pub struct BeanClassBuilder<T> {
    class: BeanClass,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> BeanClassBuilder<T> {
    fn new(name: impl Into<String>) -> Self {
        Self {
            class: BeanClass {
                name: name.into(),
                type_id: TypeId::of::<T>(),
                supertypes: Vec::new(),
                constructors: Vec::new(),
                methods: Vec::new(),
                properties: Vec::new(),
                initializing: None,
                disposable: None,
                auto_closeable: false,
                factory_bean: None,
            },
            _marker: PhantomData,
        }
    }

    /// 声明可赋值的父类型 / 接口名称
    pub fn supertype(mut self, name: impl Into<String>) -> Self {
        self.class.supertypes.push(name.into());
        self
    }

    pub fn constructor<F>(mut self, params: Vec<Param>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.class.constructors.push(ConstructorDescriptor {
            owner: self.class.name.clone(),
            params,
            invoker: Arc::new(move |args| f(args).map(|instance| Arc::new(instance) as BeanRef)),
        });
        self
    }

    pub fn default_constructor(self) -> Self
    where
        T: Default,
    {
        self.constructor(Vec::new(), |_| Ok(T::default()))
    }

    /// 可写属性
    pub fn property<F>(mut self, name: impl Into<String>, ty: TypeRef, setter: F) -> Self
    where
        F: Fn(&T, Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let class_name = self.class.name.clone();
        self.class.properties.push(PropertyDescriptor {
            name: name.into(),
            ty,
            setter: Some(Arc::new(move |bean: &BeanRef, value| {
                setter(downcast_target::<T>(bean, &class_name)?, value)
            })),
            excluded_from_dependency_check: false,
        });
        self
    }

    /// 只读属性：参与属性名建议，但不能被写入
    pub fn read_only_property(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.class.properties.push(PropertyDescriptor {
            name: name.into(),
            ty,
            setter: None,
            excluded_from_dependency_check: false,
        });
        self
    }

    /// 把最近声明的属性排除在依赖检查之外
    pub fn exclude_from_dependency_check(mut self) -> Self {
        if let Some(last) = self.class.properties.last_mut() {
            last.excluded_from_dependency_check = true;
        }
        self
    }

    /// 实例方法
    pub fn method<F>(mut self, name: impl Into<String>, params: Vec<Param>, f: F) -> Self
    where
        F: Fn(&T, Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let class_name = self.class.name.clone();
        self.class.methods.push(MethodDescriptor {
            owner: self.class.name.clone(),
            name: name.into(),
            params,
            is_static: false,
            return_type: None,
            invoker: Arc::new(move |target: Option<&BeanRef>, args| {
                let target = target
                    .ok_or_else(|| anyhow::anyhow!("Instance method invoked without a target"))?;
                f(downcast_target::<T>(target, &class_name)?, args)
            }),
        });
        self
    }

    /// 实例工厂方法：声明返回类型，以便按类型预测产品
    pub fn factory_method<F>(
        mut self,
        name: impl Into<String>,
        params: Vec<Param>,
        returns: TypeRef,
        f: F,
    ) -> Self
    where
        F: Fn(&T, Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self = self.method(name, params, f);
        if let Some(last) = self.class.methods.last_mut() {
            last.return_type = Some(returns);
        }
        self
    }

    /// 静态方法（通常用作静态工厂方法）
    pub fn static_method<F>(
        mut self,
        name: impl Into<String>,
        params: Vec<Param>,
        returns: TypeRef,
        f: F,
    ) -> Self
    where
        F: Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.class.methods.push(MethodDescriptor {
            owner: self.class.name.clone(),
            name: name.into(),
            params,
            is_static: true,
            return_type: Some(returns),
            invoker: Arc::new(move |_target: Option<&BeanRef>, args| f(args)),
        });
        self
    }

    pub fn initializing(mut self) -> Self
    where
        T: InitializingBean,
    {
        let class_name = self.class.name.clone();
        self.class.initializing = Some(Arc::new(move |bean: &BeanRef| {
            downcast_target::<T>(bean, &class_name)?.after_properties_set()
        }));
        self
    }

    pub fn disposable(mut self) -> Self
    where
        T: DisposableBean,
    {
        let class_name = self.class.name.clone();
        self.class.disposable = Some(Arc::new(move |bean: &BeanRef| {
            downcast_target::<T>(bean, &class_name)?.destroy()
        }));
        self
    }

    /// 标记为可关闭资源：未声明 destroy 方法时推断 `close` / `shutdown`
    pub fn auto_closeable(mut self) -> Self {
        self.class.auto_closeable = true;
        self
    }

    pub fn factory_bean(mut self) -> Self
    where
        T: FactoryBean + 'static,
    {
        self.class.factory_bean = Some(cast_factory_bean::<T>);
        self
    }

    pub fn build(self) -> BeanClass {
        self.class
    }
}

/// 类型解析服务
pub trait TypeResolver: Send + Sync {
    /// 按类型名称查找
    fn resolve(&self, type_name: &str) -> Option<Arc<BeanClass>>;

    /// 按实例的运行时类型查找
    fn class_of(&self, bean: &BeanRef) -> Option<Arc<BeanClass>>;

    /// 实例是否可以赋值给指定类型
    fn is_instance_of(&self, bean: &BeanRef, type_name: &str) -> bool {
        self.class_of(bean)
            .map(|class| class.is_assignable_to(type_name))
            .unwrap_or(false)
    }
}

/// 默认的类型注册表
#[derive(Default)]
pub struct ClassRegistry {
    by_name: RwLock<HashMap<String, Arc<BeanClass>>>,
    by_type: RwLock<HashMap<TypeId, Arc<BeanClass>>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册类型描述；同名或同类型的旧描述被替换
    pub fn register(&self, class: BeanClass) -> Arc<BeanClass> {
        let class = Arc::new(class);
        tracing::trace!("Registering bean class '{}'", class.name());
        self.by_name
            .write()
            .insert(class.name().to_string(), Arc::clone(&class));
        self.by_type
            .write()
            .insert(BeanClass::type_id(&class), Arc::clone(&class));
        class
    }

    pub fn len(&self) -> usize {
        self.by_name.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.read().is_empty()
    }
}

impl TypeResolver for ClassRegistry {
    fn resolve(&self, type_name: &str) -> Option<Arc<BeanClass>> {
        self.by_name.read().get(type_name).cloned()
    }

    fn class_of(&self, bean: &BeanRef) -> Option<Arc<BeanClass>> {
        let type_id = (**bean).type_id();
        self.by_type.read().get(&type_id).cloned()
    }
}
