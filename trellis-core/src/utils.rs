//! Utility functions for the bean factory
//!
//! Bean-name helpers shared by the factory, the value resolver and the
//! registries, plus depends-on graph validation.

/// Naming utilities for bean names
pub mod naming {
    use crate::constants::{FACTORY_BEAN_PREFIX, GENERATED_BEAN_NAME_SEPARATOR, INNER_BEAN_MARKER};

    /// Returns whether the name asks for the factory itself rather than its product.
    ///
    /// # Examples
    ///
    /// ```
    /// use trellis_core::utils::naming::is_factory_dereference;
    ///
    /// assert!(is_factory_dereference("&connectionFactory"));
    /// assert!(!is_factory_dereference("connectionFactory"));
    /// ```
    pub fn is_factory_dereference(name: &str) -> bool {
        name.starts_with(FACTORY_BEAN_PREFIX)
    }

    /// Strips every leading factory dereference prefix.
    ///
    /// # Examples
    ///
    /// ```
    /// use trellis_core::utils::naming::transformed_bean_name;
    ///
    /// assert_eq!(transformed_bean_name("&&factory"), "factory");
    /// assert_eq!(transformed_bean_name("plain"), "plain");
    /// ```
    pub fn transformed_bean_name(name: &str) -> &str {
        name.trim_start_matches(FACTORY_BEAN_PREFIX)
    }

    /// Re-applies the dereference prefix when the requested name carried one.
    pub fn original_bean_name(requested: &str, canonical: &str) -> String {
        if is_factory_dereference(requested) {
            format!("{}{}", FACTORY_BEAN_PREFIX, canonical)
        } else {
            canonical.to_string()
        }
    }

    /// Generated name for an anonymous inner bean: `(inner bean)#<token>`
    pub fn inner_bean_name(token: u64) -> String {
        format!("{}{}{:x}", INNER_BEAN_MARKER, GENERATED_BEAN_NAME_SEPARATOR, token)
    }

    /// Makes an inner bean name unique within its containing bean.
    pub fn unique_inner_bean_name(name: &str, counter: usize) -> String {
        if counter == 0 {
            name.to_string()
        } else {
            format!("{}{}{}", name, GENERATED_BEAN_NAME_SEPARATOR, counter)
        }
    }

    /// Levenshtein distance between two property names
    fn edit_distance(a: &str, b: &str) -> usize {
        let b: Vec<char> = b.chars().collect();
        let mut previous: Vec<usize> = (0..=b.len()).collect();
        let mut current = vec![0; b.len() + 1];

        for (i, ca) in a.chars().enumerate() {
            current[0] = i + 1;
            for (j, cb) in b.iter().enumerate() {
                let cost = usize::from(ca != *cb);
                current[j + 1] = (previous[j] + cost)
                    .min(previous[j + 1] + 1)
                    .min(current[j] + 1);
            }
            std::mem::swap(&mut previous, &mut current);
        }
        previous[b.len()]
    }

    /// Property names close enough to the misspelled one to be suggested.
    ///
    /// # Examples
    ///
    /// ```
    /// use trellis_core::utils::naming::property_matches;
    ///
    /// let known = ["name", "age", "address"];
    /// assert_eq!(property_matches("nmae", known), vec!["name"]);
    /// assert!(property_matches("zzzzzz", known).is_empty());
    /// ```
    pub fn property_matches<'a, I>(property: &str, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        const MAX_DISTANCE: usize = 2;
        let mut matches: Vec<(usize, String)> = candidates
            .into_iter()
            .filter(|candidate| *candidate != property)
            .filter_map(|candidate| {
                let distance = edit_distance(property, candidate);
                (distance <= MAX_DISTANCE).then(|| (distance, candidate.to_string()))
            })
            .collect();
        matches.sort();
        matches.into_iter().map(|(_, name)| name).collect()
    }
}

/// Depends-on graph validation
pub mod dependency {
    use std::collections::{BTreeMap, HashSet};

    /// Dependency graph analysis result
    #[derive(Debug, PartialEq, Eq)]
    pub enum DependencyValidationError {
        /// Circular depends-on detected
        CircularDependency {
            /// The dependency chain forming the cycle
            cycle: Vec<String>,
        },
        /// Depends-on names a bean that is not registered
        MissingDependency {
            /// The bean that declares the dependency
            bean: String,
            /// The missing dependency
            missing: String,
        },
    }

    impl std::fmt::Display for DependencyValidationError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::CircularDependency { cycle } => {
                    write!(f, "Circular depends-on relationship: {}", cycle.join(" -> "))
                }
                Self::MissingDependency { bean, missing } => {
                    write!(f, "Bean '{}' depends on missing bean '{}'", bean, missing)
                }
            }
        }
    }

    impl std::error::Error for DependencyValidationError {}

    /// Validates the depends-on graph for missing beans and cycles.
    ///
    /// `is_known` answers whether a dependency name exists outside the map
    /// (aliases, manual singletons, a parent factory). Beans are visited in
    /// name order so the reported issue is deterministic.
    pub fn validate_dependency_graph<F>(
        dependencies: &BTreeMap<String, Vec<String>>,
        is_known: F,
    ) -> Result<(), DependencyValidationError>
    where
        F: Fn(&str) -> bool,
    {
        for (bean_name, deps) in dependencies {
            for dep in deps {
                if !dependencies.contains_key(dep) && !is_known(dep) {
                    return Err(DependencyValidationError::MissingDependency {
                        bean: bean_name.clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }

        let mut visited = HashSet::new();
        let mut rec_stack = Vec::new();
        for bean_name in dependencies.keys() {
            if !visited.contains(bean_name) {
                if let Some(cycle) =
                    detect_cycle_dfs(bean_name, dependencies, &mut visited, &mut rec_stack)
                {
                    return Err(DependencyValidationError::CircularDependency { cycle });
                }
            }
        }

        Ok(())
    }

    fn detect_cycle_dfs(
        node: &str,
        graph: &BTreeMap<String, Vec<String>>,
        visited: &mut HashSet<String>,
        rec_stack: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        rec_stack.push(node.to_string());

        if let Some(deps) = graph.get(node) {
            for dep in deps {
                if let Some(start_idx) = rec_stack.iter().position(|x| x == dep) {
                    let mut cycle = rec_stack[start_idx..].to_vec();
                    cycle.push(dep.to_string());
                    return Some(cycle);
                }
                if !visited.contains(dep) {
                    if let Some(cycle) = detect_cycle_dfs(dep, graph, visited, rec_stack) {
                        return Some(cycle);
                    }
                }
            }
        }

        rec_stack.pop();
        None
    }
}
