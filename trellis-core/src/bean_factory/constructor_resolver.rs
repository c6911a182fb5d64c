//! 构造器与工厂方法解析
//!
//! 候选选择是纯函数 [`select_candidate`]：参数多的候选优先，参数个数相同的
//! 候选按类型差异权重比较。参数值来自定义中的构造参数（按下标，或按类型 /
//! 名称匹配的通用参数）；构造器自动装配时，缺失的对象参数按类型解析。

use std::collections::{BTreeMap, HashMap};

use super::value_resolver::ValueResolver;
use super::{DefaultListableBeanFactory, DependencyDescriptor};
use crate::bean::AutowireMode;
use crate::class::{BeanClass, MethodDescriptor, Param, Signature};
use crate::creation::CreationContext;
use crate::error::{BeansError, BeansResult};
use crate::merged::{MergedBeanDefinition, ResolvedExecutable};
use crate::property::ValueHolder;
use crate::value::{BeanRef, TypeRef, Value};

/// 候选选择结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Selected(usize),
    /// 权重与参数个数都相同的多个候选；`chosen` 是声明顺序中的第一个
    Ambiguous { chosen: usize, candidates: Vec<usize> },
    Unmatched,
}

/// 贪婪地选择候选
///
/// 候选按参数个数降序（个数相同保持声明顺序）依次评估：
///
/// - 参数少于 `min_args` 的候选被跳过
/// - 已经选中一个候选后，遇到参数更少的候选即停止
/// - `weigh` 返回 `None` 表示参数无法满足；权重越低越匹配
pub fn select_candidate<S, F>(candidates: &[S], min_args: usize, mut weigh: F) -> Selection
where
    S: Signature,
    F: FnMut(usize, &S) -> Option<u32>,
{
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|a, b| {
        candidates[*b]
            .params()
            .len()
            .cmp(&candidates[*a].params().len())
    });

    let mut best: Option<(usize, u32)> = None;
    let mut ties: Vec<usize> = Vec::new();

    for index in order {
        let count = candidates[index].params().len();
        if let Some((chosen, _)) = best {
            if candidates[chosen].params().len() > count {
                break;
            }
        }
        if count < min_args {
            continue;
        }
        let Some(weight) = weigh(index, &candidates[index]) else {
            continue;
        };

        match best {
            None => best = Some((index, weight)),
            Some((_, best_weight)) if weight < best_weight => {
                best = Some((index, weight));
                ties.clear();
            }
            Some((chosen, best_weight)) if weight == best_weight => {
                if ties.is_empty() {
                    ties.push(chosen);
                }
                ties.push(index);
            }
            Some(_) => {}
        }
    }

    match best {
        None => Selection::Unmatched,
        Some((chosen, _)) if ties.is_empty() => Selection::Selected(chosen),
        Some((chosen, _)) => Selection::Ambiguous {
            chosen,
            candidates: ties,
        },
    }
}

/// 解析完成的构造参数
struct ResolvedArgument {
    value: Value,
    ty: Option<TypeRef>,
    name: Option<String>,
}

impl ResolvedArgument {
    fn from_holder(holder: &ValueHolder, value: Value) -> Self {
        Self {
            value,
            ty: holder.ty.clone(),
            name: holder.name.clone(),
        }
    }

    /// 声明了类型或名称的参数只能用于对应的形参
    fn fits(&self, param: &Param) -> bool {
        let type_fits = self.ty.as_ref().map_or(true, |ty| *ty == param.ty);
        let name_fits = match (&self.name, &param.name) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => true,
        };
        type_fits && name_fits
    }
}

#[derive(Default)]
struct ResolvedArguments {
    indexed: BTreeMap<usize, ResolvedArgument>,
    generic: Vec<ResolvedArgument>,
}

impl ResolvedArguments {
    /// 调用方显式传入的参数按位置匹配
    fn explicit(args: Vec<Value>) -> Self {
        let indexed = args
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                (
                    index,
                    ResolvedArgument {
                        value,
                        ty: None,
                        name: None,
                    },
                )
            })
            .collect();
        Self {
            indexed,
            generic: Vec::new(),
        }
    }
}

impl DefaultListableBeanFactory {
    /// 选择构造器并实例化
    pub(super) fn autowire_constructor(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
        class: &BeanClass,
        args: Option<Vec<Value>>,
        ctx: &mut CreationContext,
    ) -> BeansResult<BeanRef> {
        let constructors = class.constructors();
        if constructors.is_empty() {
            return Err(BeansError::creation(
                bean_name,
                format!("No constructors declared on bean class '{}'", class.name()),
            ));
        }

        let autowiring = mbd.autowire_mode == AutowireMode::Constructor;
        let explicit = args.is_some();
        let (resolved, min_args) = match args {
            Some(args) => {
                let count = args.len();
                (ResolvedArguments::explicit(args), count)
            }
            None => (
                self.resolve_constructor_arguments(bean_name, mbd, ctx)?,
                mbd.constructor_args.min_argument_count(),
            ),
        };
        let cached = match mbd.cached_executable() {
            Some(ResolvedExecutable::Constructor(index)) if !explicit && index < constructors.len() => {
                Some(index)
            }
            _ => None,
        };

        let mut prepared: HashMap<usize, Vec<Value>> = HashMap::new();
        let mut last_error = None;
        let selection = select_candidate(constructors, min_args, |index, ctor| {
            if cached.map_or(false, |cached| cached != index) {
                return None;
            }
            if explicit && ctor.params().len() != min_args {
                return None;
            }
            match self.match_arguments(bean_name, ctor, &resolved, autowiring, ctx) {
                Ok((values, weight)) => {
                    prepared.insert(index, values);
                    Some(weight)
                }
                Err(e) => {
                    tracing::trace!("Ignoring {} for bean '{}': {}", ctor.describe(), bean_name, e);
                    last_error = Some(e);
                    None
                }
            }
        });

        let index = match selection {
            Selection::Selected(index) => index,
            Selection::Ambiguous { chosen, candidates } => {
                tracing::debug!(
                    "Ambiguous constructor matches found in bean '{}' (hint: specify index/type/name arguments for simple parameters to avoid type ambiguities): {}",
                    bean_name,
                    candidates
                        .iter()
                        .map(|i| constructors[*i].describe())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                chosen
            }
            Selection::Unmatched => {
                return Err(last_error.unwrap_or_else(|| {
                    BeansError::creation(
                        bean_name,
                        format!(
                            "Could not resolve matching constructor on bean class '{}' (hint: specify index/type/name arguments for simple parameters to avoid type ambiguities)",
                            class.name()
                        ),
                    )
                }))
            }
        };

        if !explicit {
            mbd.cache_executable(ResolvedExecutable::Constructor(index));
        }
        let ctor = &constructors[index];
        let values = prepared.remove(&index).unwrap_or_default();
        tracing::trace!("Instantiating bean '{}' using {}", bean_name, ctor.describe());
        ctor.invoke(values).map_err(|e| BeansError::BeanInstantiation {
            bean_name: bean_name.to_string(),
            executable: ctor.describe(),
            message: "Constructor threw exception".to_string(),
            source: Some(e.into()),
        })
    }

    /// 通过静态工厂方法或实例工厂方法实例化
    pub(super) fn instantiate_using_factory_method(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
        args: Option<Vec<Value>>,
        ctx: &mut CreationContext,
    ) -> BeansResult<BeanRef> {
        let Some(method_name) = mbd.factory_method_name.as_deref() else {
            return Err(BeansError::creation(bean_name, "No factory method declared"));
        };

        let (factory_bean, factory_class, is_static) = match mbd.factory_bean_name.as_deref() {
            Some(factory_bean_name) => {
                let canonical = self.canonical_name(factory_bean_name);
                if canonical == bean_name {
                    return Err(BeansError::definition_store(
                        bean_name,
                        "factory-bean reference points back to the same bean definition",
                    ));
                }
                let factory_bean = self.do_get_bean(factory_bean_name, None, None, false, ctx)?;
                if mbd.is_singleton() && self.singletons.contains_singleton(bean_name) {
                    return Err(BeansError::IllegalState(format!(
                        "Singleton '{}' implicitly appeared while its factory bean '{}' was created",
                        bean_name, factory_bean_name
                    )));
                }
                self.singletons.register_dependent_bean(&canonical, bean_name);
                let class = self.types.class_of(&factory_bean).ok_or_else(|| {
                    BeansError::creation(
                        bean_name,
                        format!("Cannot determine the type of factory bean '{}'", factory_bean_name),
                    )
                })?;
                (Some(factory_bean), class, false)
            }
            None => {
                let class = self.resolve_bean_class(mbd, bean_name)?.ok_or_else(|| {
                    BeansError::definition_store(
                        bean_name,
                        "bean definition declares neither a bean class nor a factory-bean reference",
                    )
                })?;
                (None, class, true)
            }
        };

        let explicit = args.is_some();
        let candidates: Vec<MethodDescriptor> = match mbd.cached_executable() {
            Some(ResolvedExecutable::FactoryMethod(method)) if !explicit => vec![method],
            _ => factory_class
                .methods_named(method_name)
                .filter(|m| m.is_static() == is_static)
                .cloned()
                .collect(),
        };
        if candidates.is_empty() {
            return Err(BeansError::creation(
                bean_name,
                format!(
                    "No matching factory method found on class '{}': factory method '{}'. Check that a method with the specified name exists and that it is {}",
                    factory_class.name(),
                    method_name,
                    if is_static { "static" } else { "non-static" }
                ),
            ));
        }

        let (resolved, min_args) = match args {
            Some(args) => {
                let count = args.len();
                (ResolvedArguments::explicit(args), count)
            }
            None => (
                self.resolve_constructor_arguments(bean_name, mbd, ctx)?,
                mbd.constructor_args.min_argument_count(),
            ),
        };
        let autowiring = mbd.autowire_mode == AutowireMode::Constructor;

        let mut prepared: HashMap<usize, Vec<Value>> = HashMap::new();
        let mut last_error = None;
        let selection = select_candidate(&candidates, min_args, |index, method| {
            if explicit && method.params().len() != min_args {
                return None;
            }
            match self.match_arguments(bean_name, method, &resolved, autowiring, ctx) {
                Ok((values, weight)) => {
                    prepared.insert(index, values);
                    Some(weight)
                }
                Err(e) => {
                    last_error = Some(e);
                    None
                }
            }
        });

        let index = match selection {
            Selection::Selected(index) => index,
            Selection::Ambiguous { candidates: ties, .. } => {
                return Err(BeansError::AmbiguousFactoryMethod {
                    bean_name: bean_name.to_string(),
                    factory_method: method_name.to_string(),
                    candidates: ties.iter().map(|i| candidates[*i].describe()).collect(),
                })
            }
            Selection::Unmatched => {
                return Err(last_error.unwrap_or_else(|| {
                    BeansError::creation(
                        bean_name,
                        format!(
                            "No matching factory method found on class '{}': factory method '{}' with {} argument(s)",
                            factory_class.name(),
                            method_name,
                            min_args
                        ),
                    )
                }))
            }
        };

        let method = &candidates[index];
        if !explicit {
            mbd.cache_executable(ResolvedExecutable::FactoryMethod(method.clone()));
        }
        let values = prepared.remove(&index).unwrap_or_default();
        tracing::trace!("Instantiating bean '{}' using {}", bean_name, method.describe());
        let product = method
            .invoke(factory_bean.as_ref(), values)
            .map_err(|e| BeansError::BeanInstantiation {
                bean_name: bean_name.to_string(),
                executable: method.describe(),
                message: "Factory method threw exception".to_string(),
                source: Some(e.into()),
            })?;
        Ok(product.into_bean_ref())
    }

    /// 解析定义中的构造参数（每次实例化只解析一次，所有候选共用）
    fn resolve_constructor_arguments(
        &self,
        bean_name: &str,
        mbd: &MergedBeanDefinition,
        ctx: &mut CreationContext,
    ) -> BeansResult<ResolvedArguments> {
        let resolver = ValueResolver::new(self, bean_name, mbd);
        let mut resolved = ResolvedArguments::default();

        for (index, holder) in mbd.constructor_args.indexed() {
            let arg_name = format!("constructor argument with index {}", index);
            let value = resolver.resolve(ctx, &arg_name, &holder.value)?;
            resolved
                .indexed
                .insert(*index, ResolvedArgument::from_holder(holder, value));
        }
        for holder in mbd.constructor_args.generic() {
            let value = resolver.resolve(ctx, "constructor argument", &holder.value)?;
            resolved
                .generic
                .push(ResolvedArgument::from_holder(holder, value));
        }
        Ok(resolved)
    }

    /// 为一个候选准备实参，返回实参与类型差异权重
    fn match_arguments<S: Signature>(
        &self,
        bean_name: &str,
        executable: &S,
        resolved: &ResolvedArguments,
        autowiring: bool,
        ctx: &mut CreationContext,
    ) -> BeansResult<(Vec<Value>, u32)> {
        let params = executable.params();
        let mut used = vec![false; resolved.generic.len()];
        let mut values = Vec::with_capacity(params.len());
        let mut weight = 0;

        for (index, param) in params.iter().enumerate() {
            let mut supplied = resolved.indexed.get(&index).filter(|arg| arg.fits(param));
            if supplied.is_none() {
                if let Some(position) = self.find_generic_argument(param, resolved, &used) {
                    used[position] = true;
                    supplied = Some(&resolved.generic[position]);
                }
            }

            match supplied {
                Some(arg) => {
                    let (value, diff) =
                        self.convert_argument(bean_name, index, executable, param, arg.value.clone())?;
                    weight += diff;
                    values.push(value);
                }
                None if autowiring => {
                    let bean = self.autowire_argument(bean_name, index, executable, param, ctx)?;
                    values.push(Value::from_bean_ref(bean));
                }
                None => {
                    return Err(BeansError::UnsatisfiedDependency {
                        bean_name: bean_name.to_string(),
                        injection_point: Self::parameter_point(index, executable),
                        message: format!(
                            "Ambiguous argument values for parameter of type [{}] - did you specify the correct bean references as arguments?",
                            param.ty
                        ),
                        source: None,
                    })
                }
            }
        }

        Ok((values, weight))
    }

    /// 未使用的通用参数：优先选择值的类型已经一致的
    fn find_generic_argument(
        &self,
        param: &Param,
        resolved: &ResolvedArguments,
        used: &[bool],
    ) -> Option<usize> {
        let available = |i: &usize| !used[*i] && resolved.generic[*i].fits(param);
        (0..resolved.generic.len())
            .filter(available)
            .find(|i| self.value_has_type(&resolved.generic[*i].value, &param.ty))
            .or_else(|| (0..resolved.generic.len()).find(available))
    }

    fn value_has_type(&self, value: &Value, ty: &TypeRef) -> bool {
        match (ty, value) {
            (TypeRef::Object(name), Value::Bean(bean)) => self.types.is_instance_of(bean, name),
            (ty, value) => ty.accepts_kind(value),
        }
    }

    /// 转换实参；权重 0 为完全一致，1 需要转换或为父类型，2 为任意类型
    fn convert_argument<S: Signature>(
        &self,
        bean_name: &str,
        index: usize,
        executable: &S,
        param: &Param,
        value: Value,
    ) -> BeansResult<(Value, u32)> {
        let ty = &param.ty;
        if value.is_null() {
            return Ok(match ty.zero_value() {
                Some(zero) => (zero, 1),
                None => (Value::Null, 0),
            });
        }

        let diff = match (ty, &value) {
            (TypeRef::Any, _) => return Ok((value, 2)),
            (TypeRef::Object(name), Value::Bean(bean)) => match self.types.class_of(bean) {
                Some(class) if class.name() == name => 0,
                _ => 1,
            },
            (ty, value) if ty.accepts_kind(value) => 0,
            _ => 1,
        };

        let kind = value.kind();
        let converted = self
            .converter
            .convert(value, ty)
            .map_err(|e| BeansError::UnsatisfiedDependency {
                bean_name: bean_name.to_string(),
                injection_point: Self::parameter_point(index, executable),
                message: format!(
                    "Could not convert argument value of type [{}] to required type [{}]",
                    kind, ty
                ),
                source: Some(e.into()),
            })?;
        Ok((converted, diff))
    }

    fn autowire_argument<S: Signature>(
        &self,
        bean_name: &str,
        index: usize,
        executable: &S,
        param: &Param,
        ctx: &mut CreationContext,
    ) -> BeansResult<BeanRef> {
        let unsatisfied = |message: String, source: Option<BeansError>| BeansError::UnsatisfiedDependency {
            bean_name: bean_name.to_string(),
            injection_point: Self::parameter_point(index, executable),
            message,
            source: source.map(Into::into),
        };

        let TypeRef::Object(type_name) = &param.ty else {
            return Err(unsatisfied(
                format!("Cannot autowire parameter of simple type [{}]", param.ty),
                None,
            ));
        };

        let mut descriptor = DependencyDescriptor::new(type_name.clone());
        if let Some(name) = &param.name {
            descriptor = descriptor.with_name(name.clone());
        }
        match self.resolve_dependency_in(&descriptor, Some(bean_name), ctx) {
            Ok(Some(bean)) => Ok(bean),
            Ok(None) => Err(unsatisfied(
                format!("No qualifying bean of type '{}' available", type_name),
                None,
            )),
            Err(e) => Err(unsatisfied(
                format!("Could not autowire parameter of type '{}'", type_name),
                Some(e),
            )),
        }
    }

    fn parameter_point<S: Signature>(index: usize, executable: &S) -> String {
        format!("parameter {} of {}", index, executable.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sig {
        params: Vec<Param>,
    }

    impl Sig {
        fn of(types: &[TypeRef]) -> Self {
            Self {
                params: types.iter().cloned().map(Param::unnamed).collect(),
            }
        }
    }

    impl Signature for Sig {
        fn params(&self) -> &[Param] {
            &self.params
        }

        fn describe(&self) -> String {
            format!("sig({})", self.params.len())
        }
    }

    #[test]
    fn test_prefers_most_parameters() {
        let candidates = vec![
            Sig::of(&[]),
            Sig::of(&[TypeRef::Str, TypeRef::Int]),
            Sig::of(&[TypeRef::Str]),
        ];
        let selection = select_candidate(&candidates, 0, |_, _| Some(0));
        assert_eq!(selection, Selection::Selected(1));
    }

    #[test]
    fn test_stops_after_longer_match() {
        let candidates = vec![Sig::of(&[TypeRef::Str]), Sig::of(&[TypeRef::Str, TypeRef::Int])];
        let mut weighed = Vec::new();
        let selection = select_candidate(&candidates, 0, |index, _| {
            weighed.push(index);
            Some(5)
        });
        assert_eq!(selection, Selection::Selected(1));
        assert_eq!(weighed, vec![1]);
    }

    #[test]
    fn test_falls_back_when_longer_unsatisfiable() {
        let candidates = vec![Sig::of(&[TypeRef::Str]), Sig::of(&[TypeRef::Str, TypeRef::Int])];
        let selection = select_candidate(&candidates, 0, |index, _| (index == 0).then_some(0));
        assert_eq!(selection, Selection::Selected(0));
    }

    #[test]
    fn test_lowest_weight_wins_among_equal_counts() {
        let candidates = vec![
            Sig::of(&[TypeRef::Any]),
            Sig::of(&[TypeRef::Str]),
            Sig::of(&[TypeRef::Int]),
        ];
        let weights = [2, 0, 1];
        let selection = select_candidate(&candidates, 0, |index, _| Some(weights[index]));
        assert_eq!(selection, Selection::Selected(1));
    }

    #[test]
    fn test_equal_weights_are_ambiguous() {
        let candidates = vec![Sig::of(&[TypeRef::Str]), Sig::of(&[TypeRef::Int])];
        let selection = select_candidate(&candidates, 0, |_, _| Some(1));
        assert_eq!(
            selection,
            Selection::Ambiguous {
                chosen: 0,
                candidates: vec![0, 1]
            }
        );
    }

    #[test]
    fn test_min_args_skips_short_candidates() {
        let candidates = vec![Sig::of(&[]), Sig::of(&[TypeRef::Str])];
        assert_eq!(
            select_candidate(&candidates, 2, |_, _| Some(0)),
            Selection::Unmatched
        );
        assert_eq!(
            select_candidate(&candidates, 1, |_, _| Some(0)),
            Selection::Selected(1)
        );
    }
}
