//! 测试夹具：示例类型、事件记录、记录型后置处理器

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::bean_factory::DefaultListableBeanFactory;
use crate::class::{BeanClass, ClassRegistry, DisposableBean, InitializingBean, Param};
use crate::factory_bean::FactoryBean;
use crate::post_processor::{BeanPostProcessor, DestructionHook, Flow, InitHook, InstantiationHook};
use crate::value::{BeanRef, TypeRef, Value};

pub(crate) type EventLog = Arc<Mutex<Vec<String>>>;

pub(crate) fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn events(log: &EventLog) -> Vec<String> {
    log.lock().clone()
}

fn record(log: &EventLog, event: String) {
    log.lock().push(event);
}

#[derive(Default)]
pub(crate) struct Gadget {
    pub label: Mutex<String>,
}

#[derive(Default)]
pub(crate) struct Widget {
    pub name: Mutex<String>,
    pub size: Mutex<i64>,
    pub dep: Mutex<Option<Arc<Gadget>>>,
    pub tags: Mutex<Vec<Value>>,
}

impl Widget {
    pub fn dep(&self) -> Option<Arc<Gadget>> {
        self.dep.lock().clone()
    }
}

#[derive(Default)]
pub(crate) struct Left {
    pub right: Mutex<Option<Arc<Right>>>,
}

#[derive(Default)]
pub(crate) struct Right {
    pub left: Mutex<Option<Arc<Left>>>,
}

/// 记录生命周期回调的类型
pub(crate) struct Tracked {
    pub id: String,
    log: EventLog,
}

impl InitializingBean for Tracked {
    fn after_properties_set(&self) -> anyhow::Result<()> {
        record(&self.log, format!("after-properties-set:{}", self.id));
        Ok(())
    }
}

impl DisposableBean for Tracked {
    fn destroy(&self) -> anyhow::Result<()> {
        record(&self.log, format!("destroy:{}", self.id));
        Ok(())
    }
}

/// 只能通过约定的 `close` 方法销毁的资源
pub(crate) struct Pool {
    log: EventLog,
}

pub(crate) struct Connection {
    pub url: String,
}

/// 产出 [`Connection`] 的 FactoryBean
#[derive(Default)]
pub(crate) struct ConnectionFactory {
    pub url: Mutex<String>,
    pub prototype: Mutex<bool>,
    pub produced: AtomicUsize,
}

impl FactoryBean for ConnectionFactory {
    fn get_object(&self) -> anyhow::Result<Option<BeanRef>> {
        self.produced.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Arc::new(Connection {
            url: self.url.lock().clone(),
        })))
    }

    fn object_type(&self) -> Option<TypeRef> {
        Some(TypeRef::object("Connection"))
    }

    fn is_singleton(&self) -> bool {
        !*self.prototype.lock()
    }
}

fn bean_arg<T: std::any::Any + Send + Sync>(value: &Value, what: &str) -> anyhow::Result<Arc<T>> {
    value
        .downcast::<T>()
        .ok_or_else(|| anyhow::anyhow!("expected {} but got {}", what, value.kind()))
}

fn string_arg(value: &Value) -> anyhow::Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("expected a string but got {}", value.kind()))
}

/// 注册所有夹具类型
pub(crate) fn fixture_classes(log: &EventLog) -> Arc<ClassRegistry> {
    let classes = ClassRegistry::new();

    classes.register(
        BeanClass::builder::<Gadget>("Gadget")
            .supertype("Device")
            .default_constructor()
            .property("label", TypeRef::Str, |gadget: &Gadget, value| {
                *gadget.label.lock() = string_arg(&value)?;
                Ok(())
            })
            .static_method(
                "create",
                vec![Param::new("label", TypeRef::Str)],
                TypeRef::object("Gadget"),
                |args| {
                    let gadget = Gadget::default();
                    *gadget.label.lock() = string_arg(&args[0])?;
                    Ok(Value::bean(gadget))
                },
            )
            .static_method(
                "numbered",
                vec![Param::new("label", TypeRef::Str), Param::new("count", TypeRef::Int)],
                TypeRef::object("Gadget"),
                |args| {
                    let count = args[1]
                        .as_i64()
                        .ok_or_else(|| anyhow::anyhow!("expected an int but got {}", args[1].kind()))?;
                    let gadget = Gadget::default();
                    *gadget.label.lock() = format!("{}#{}", string_arg(&args[0])?, count);
                    Ok(Value::bean(gadget))
                },
            )
            .static_method(
                "named",
                vec![Param::new("label", TypeRef::Str)],
                TypeRef::object("Gadget"),
                |args| {
                    let gadget = Gadget::default();
                    *gadget.label.lock() = string_arg(&args[0])?;
                    Ok(Value::bean(gadget))
                },
            )
            .static_method(
                "named",
                vec![Param::new("alias", TypeRef::Str)],
                TypeRef::object("Gadget"),
                |args| {
                    let gadget = Gadget::default();
                    *gadget.label.lock() = format!("alias:{}", string_arg(&args[0])?);
                    Ok(Value::bean(gadget))
                },
            )
            .factory_method("spawn", Vec::new(), TypeRef::object("Widget"), |gadget: &Gadget, _| {
                let widget = Widget::default();
                *widget.name.lock() = gadget.label.lock().clone();
                Ok(Value::bean(widget))
            })
            .build(),
    );

    classes.register(
        BeanClass::builder::<Widget>("Widget")
            .default_constructor()
            .constructor(
                vec![Param::new("name", TypeRef::Str), Param::new("size", TypeRef::Int)],
                |args| {
                    let widget = Widget::default();
                    *widget.name.lock() = string_arg(&args[0])?;
                    *widget.size.lock() = args[1].as_i64().unwrap_or_default();
                    Ok(widget)
                },
            )
            .constructor(vec![Param::new("dep", TypeRef::object("Gadget"))], |args| {
                let widget = Widget::default();
                *widget.dep.lock() = Some(bean_arg::<Gadget>(&args[0], "Gadget")?);
                Ok(widget)
            })
            .property("name", TypeRef::Str, |widget: &Widget, value| {
                *widget.name.lock() = string_arg(&value)?;
                Ok(())
            })
            .property("size", TypeRef::Int, |widget: &Widget, value| {
                *widget.size.lock() = value.as_i64().unwrap_or_default();
                Ok(())
            })
            .property("dep", TypeRef::object("Gadget"), |widget: &Widget, value| {
                *widget.dep.lock() = value.downcast::<Gadget>();
                Ok(())
            })
            .property("tags", TypeRef::List, |widget: &Widget, value| {
                *widget.tags.lock() = value.as_list().map(<[Value]>::to_vec).unwrap_or_default();
                Ok(())
            })
            .read_only_property("id", TypeRef::Int)
            .build(),
    );

    classes.register(
        BeanClass::builder::<Left>("Left")
            .default_constructor()
            .constructor(vec![Param::new("right", TypeRef::object("Right"))], |args| {
                Ok(Left {
                    right: Mutex::new(Some(bean_arg::<Right>(&args[0], "Right")?)),
                })
            })
            .property("right", TypeRef::object("Right"), |left: &Left, value| {
                *left.right.lock() = value.downcast::<Right>();
                Ok(())
            })
            .build(),
    );

    classes.register(
        BeanClass::builder::<Right>("Right")
            .default_constructor()
            .constructor(vec![Param::new("left", TypeRef::object("Left"))], |args| {
                Ok(Right {
                    left: Mutex::new(Some(bean_arg::<Left>(&args[0], "Left")?)),
                })
            })
            .property("left", TypeRef::object("Left"), |right: &Right, value| {
                *right.left.lock() = value.downcast::<Left>();
                Ok(())
            })
            .build(),
    );

    let tracked_log = log.clone();
    let init_log = log.clone();
    let cleanup_log = log.clone();
    classes.register(
        BeanClass::builder::<Tracked>("Tracked")
            .constructor(vec![Param::new("id", TypeRef::Str)], move |args| {
                Ok(Tracked {
                    id: string_arg(&args[0])?,
                    log: tracked_log.clone(),
                })
            })
            .method("init", Vec::new(), move |tracked: &Tracked, _| {
                record(&init_log, format!("init:{}", tracked.id));
                Ok(Value::Null)
            })
            .method("cleanup", Vec::new(), move |tracked: &Tracked, _| {
                record(&cleanup_log, format!("cleanup:{}", tracked.id));
                Ok(Value::Null)
            })
            .initializing()
            .disposable()
            .build(),
    );

    let pool_log = log.clone();
    classes.register(
        BeanClass::builder::<Pool>("Pool")
            .constructor(Vec::new(), move |_| Ok(Pool { log: pool_log.clone() }))
            .method("close", Vec::new(), |pool: &Pool, _| {
                record(&pool.log, "close:pool".to_string());
                Ok(Value::Null)
            })
            .auto_closeable()
            .build(),
    );

    classes.register(BeanClass::builder::<Connection>("Connection").build());

    classes.register(
        BeanClass::builder::<ConnectionFactory>("ConnectionFactory")
            .default_constructor()
            .property("url", TypeRef::Str, |factory: &ConnectionFactory, value| {
                *factory.url.lock() = string_arg(&value)?;
                Ok(())
            })
            .property("prototype", TypeRef::Bool, |factory: &ConnectionFactory, value| {
                *factory.prototype.lock() = value.as_bool().unwrap_or_default();
                Ok(())
            })
            .factory_bean()
            .build(),
    );

    Arc::new(classes)
}

pub(crate) fn test_factory(log: &EventLog) -> DefaultListableBeanFactory {
    DefaultListableBeanFactory::builder()
        .with_type_resolver(fixture_classes(log))
        .build()
}

/// 记录初始化与销毁钩子的后置处理器
pub(crate) struct RecordingProcessor {
    pub log: EventLog,
}

impl InitHook for RecordingProcessor {
    fn before_initialization(
        &self,
        bean: BeanRef,
        bean_name: &str,
    ) -> anyhow::Result<crate::post_processor::InitStep> {
        record(&self.log, format!("before-init:{}", bean_name));
        Ok(crate::post_processor::InitStep::Continue(bean))
    }

    fn after_initialization(&self, bean: BeanRef, bean_name: &str) -> anyhow::Result<BeanRef> {
        record(&self.log, format!("after-init:{}", bean_name));
        Ok(bean)
    }
}

impl DestructionHook for RecordingProcessor {
    fn before_destruction(&self, _bean: &BeanRef, bean_name: &str) -> anyhow::Result<()> {
        record(&self.log, format!("hook-destroy:{}", bean_name));
        Ok(())
    }
}

impl BeanPostProcessor for RecordingProcessor {
    fn name(&self) -> &str {
        "recording"
    }

    fn as_init_hook(&self) -> Option<&dyn InitHook> {
        Some(self)
    }

    fn as_destruction_hook(&self) -> Option<&dyn DestructionHook> {
        Some(self)
    }
}

/// 把指定 Bean 的最终实例替换为另一个对象
pub(crate) struct WrappingProcessor {
    pub target: String,
}

impl InitHook for WrappingProcessor {
    fn after_initialization(&self, bean: BeanRef, bean_name: &str) -> anyhow::Result<BeanRef> {
        if bean_name == self.target {
            return Ok(Arc::new(format!("wrapped:{}", bean_name)));
        }
        Ok(bean)
    }
}

impl BeanPostProcessor for WrappingProcessor {
    fn name(&self) -> &str {
        "wrapping"
    }

    fn as_init_hook(&self) -> Option<&dyn InitHook> {
        Some(self)
    }
}

/// 对指定 Bean 跳过属性填充
pub(crate) struct SkipPopulationProcessor {
    pub target: String,
}

impl InstantiationHook for SkipPopulationProcessor {
    fn after_instantiation(&self, _bean: &BeanRef, bean_name: &str) -> anyhow::Result<Flow> {
        Ok(if bean_name == self.target {
            Flow::Halt
        } else {
            Flow::Continue
        })
    }
}

impl BeanPostProcessor for SkipPopulationProcessor {
    fn name(&self) -> &str {
        "skip-population"
    }

    fn as_instantiation_hook(&self) -> Option<&dyn InstantiationHook> {
        Some(self)
    }
}
