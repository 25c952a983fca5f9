//! Definition registry
//!
//! Every node of a definition tree is addressable by its own name. Lookups
//! return the node's ancestor chain, root first. Reads are lock-free loads of
//! an immutable snapshot; registration serialises on a mutex and publishes a
//! new snapshot.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use assetgate_core::models::{ParameterDefinition, PathDefinition, StorageMetadataDefaults};
use assetgate_core::{AppError, AppResult};

use crate::render::pattern_tokens;

/// A registered definition together with its ancestors.
#[derive(Debug, Clone)]
pub struct DefinitionChain {
    root: Arc<PathDefinition>,
    depth: usize,
}

impl DefinitionChain {
    /// Nodes from the root down to the addressed definition.
    pub fn nodes(&self) -> Vec<&PathDefinition> {
        let mut nodes = Vec::with_capacity(self.depth + 1);
        let mut current = Some(self.root.as_ref());
        while let Some(node) = current {
            nodes.push(node);
            if nodes.len() > self.depth {
                break;
            }
            current = node.child.as_deref();
        }
        nodes
    }

    /// The addressed definition.
    pub fn target(&self) -> &PathDefinition {
        let mut node = self.root.as_ref();
        for _ in 0..self.depth {
            match node.child.as_deref() {
                Some(child) => node = child,
                None => break,
            }
        }
        node
    }

    pub fn parent(&self) -> Option<&PathDefinition> {
        let nodes = self.nodes();
        nodes.len().checked_sub(2).map(|idx| nodes[idx])
    }

    pub fn name(&self) -> &str {
        &self.target().name
    }

    /// Parameters of the whole chain, root first.
    pub fn parameters(&self) -> Vec<&ParameterDefinition> {
        self.nodes()
            .into_iter()
            .flat_map(|node| node.parameters.iter())
            .collect()
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters().into_iter().find(|p| p.name == name)
    }

    /// Storage defaults of the nearest node that declares them.
    pub fn storage_metadata(&self) -> Option<&StorageMetadataDefaults> {
        self.nodes()
            .into_iter()
            .rev()
            .find_map(|node| node.default_storage_metadata.as_ref())
    }
}

#[derive(Default)]
struct Snapshot {
    roots: Vec<Arc<PathDefinition>>,
    /// name -> (root index, depth)
    index: HashMap<String, (usize, usize)>,
    order: Vec<String>,
}

impl Snapshot {
    fn chain(&self, name: &str) -> Option<DefinitionChain> {
        self.index.get(name).map(|&(root, depth)| DefinitionChain {
            root: self.roots[root].clone(),
            depth,
        })
    }
}

/// Registry of path definitions
pub struct DefinitionRegistry {
    snapshot: ArcSwap<Snapshot>,
    write_lock: Mutex<()>,
}

impl Default for DefinitionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            write_lock: Mutex::new(()),
        }
    }

    /// Register a definition tree. Each node becomes addressable by name.
    pub fn register(&self, definition: PathDefinition) -> AppResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot.load_full();

        let names = validate_tree(&definition, &current.index)?;
        let root_name = definition.name.clone();

        let root_idx = current.roots.len();
        let mut roots = current.roots.clone();
        roots.push(Arc::new(definition));
        let mut index = current.index.clone();
        let mut order = current.order.clone();
        for (depth, name) in names.into_iter().enumerate() {
            index.insert(name.clone(), (root_idx, depth));
            order.push(name);
        }

        self.snapshot.store(Arc::new(Snapshot {
            roots,
            index,
            order,
        }));

        tracing::debug!(definition = %root_name, "Path definition registered");
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> AppResult<DefinitionChain> {
        self.snapshot
            .load()
            .chain(name)
            .ok_or_else(|| AppError::DefinitionNotFound(name.to_string()))
    }

    /// All definitions in registration order, parents before children.
    pub fn list_all(&self) -> Vec<DefinitionChain> {
        let snapshot = self.snapshot.load();
        snapshot
            .order
            .iter()
            .filter_map(|name| snapshot.chain(name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Check a definition tree and return its node names, root first.
fn validate_tree(
    root: &PathDefinition,
    existing: &HashMap<String, (usize, usize)>,
) -> AppResult<Vec<String>> {
    let mut names: Vec<String> = Vec::new();
    let mut declared: HashSet<&str> = HashSet::new();
    let mut current = Some(root);

    while let Some(node) = current {
        let invalid = |reason: String| AppError::InvalidDefinition {
            definition: node.name.clone(),
            reason,
        };

        if node.name.trim().is_empty() {
            return Err(invalid("definition name is empty".to_string()));
        }
        if existing.contains_key(&node.name) || names.contains(&node.name) {
            return Err(AppError::DuplicateDefinition(node.name.clone()));
        }
        if node.allowed_scopes.is_empty() {
            return Err(invalid("no allowed scopes".to_string()));
        }

        for parameter in &node.parameters {
            if !declared.insert(parameter.name.as_str()) {
                return Err(invalid(format!(
                    "parameter '{}' is declared more than once in the chain",
                    parameter.name
                )));
            }
        }

        for (provider, by_scope) in &node.patterns {
            for (scope, pattern) in by_scope {
                let tokens = pattern_tokens(&pattern.pattern).map_err(&invalid)?;
                if let Some(token) = tokens.iter().find(|t| !declared.contains(*t)) {
                    return Err(invalid(format!(
                        "pattern for {}/{} uses undeclared parameter '{}'",
                        provider, scope, token
                    )));
                }
            }
        }

        names.push(node.name.clone());
        current = node.child.as_deref();
    }

    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetgate_core::models::PathPattern;
    use assetgate_core::{ProviderName, ScopeType};

    fn tree(root: &str, child: &str) -> PathDefinition {
        PathDefinition::new(root, "Root")
            .with_scopes(&[ScopeType::Global])
            .with_parameter(ParameterDefinition::new("env", "Environment"))
            .with_pattern(
                ProviderName::R2,
                ScopeType::Global,
                PathPattern::signed("{env}/root/"),
            )
            .with_child(
                PathDefinition::new(child, "Child")
                    .with_scopes(&[ScopeType::Global])
                    .with_parameter(ParameterDefinition::new("id", "Id"))
                    .with_pattern(
                        ProviderName::R2,
                        ScopeType::Global,
                        PathPattern::signed("{id}.bin"),
                    ),
            )
    }

    #[test]
    fn nested_definitions_are_addressable() {
        let registry = DefinitionRegistry::new();
        registry.register(tree("roots", "leaf")).unwrap();

        let leaf = registry.lookup("leaf").unwrap();
        assert_eq!(leaf.name(), "leaf");
        assert_eq!(leaf.parent().map(|p| p.name.as_str()), Some("roots"));
        let params: Vec<_> = leaf.parameters().iter().map(|p| p.name.clone()).collect();
        assert_eq!(params, vec!["env", "id"]);

        let root = registry.lookup("roots").unwrap();
        assert_eq!(root.nodes().len(), 1);
        assert!(root.parent().is_none());
    }

    #[test]
    fn list_all_keeps_registration_order() {
        let registry = DefinitionRegistry::new();
        registry.register(tree("b_root", "b_leaf")).unwrap();
        registry.register(tree("a_root", "a_leaf")).unwrap();

        let names: Vec<_> = registry
            .list_all()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["b_root", "b_leaf", "a_root", "a_leaf"]);
    }

    #[test]
    fn duplicate_names_are_rejected_at_any_depth() {
        let registry = DefinitionRegistry::new();
        registry.register(tree("roots", "leaf")).unwrap();

        let err = registry.register(tree("other", "leaf")).unwrap_err();
        assert!(matches!(err, AppError::DuplicateDefinition(ref n) if n == "leaf"));
        assert!(matches!(
            registry.lookup("other"),
            Err(AppError::DefinitionNotFound(_))
        ));

        let err = registry.register(tree("same", "same")).unwrap_err();
        assert!(matches!(err, AppError::DuplicateDefinition(_)));
    }

    #[test]
    fn lookup_of_unknown_name_fails() {
        let registry = DefinitionRegistry::new();
        assert!(matches!(
            registry.lookup("nope"),
            Err(AppError::DefinitionNotFound(_))
        ));
    }

    #[test]
    fn undeclared_tokens_are_rejected() {
        let definition = PathDefinition::new("bad", "Bad")
            .with_scopes(&[ScopeType::Global])
            .with_pattern(
                ProviderName::Gcs,
                ScopeType::Global,
                PathPattern::signed("{missing}/"),
            );
        let err = DefinitionRegistry::new().register(definition).unwrap_err();
        assert!(matches!(err, AppError::InvalidDefinition { .. }));
    }

    #[test]
    fn parent_patterns_cannot_use_child_parameters() {
        let definition = PathDefinition::new("parent", "Parent")
            .with_scopes(&[ScopeType::Global])
            .with_pattern(
                ProviderName::R2,
                ScopeType::Global,
                PathPattern::signed("{id}/"),
            )
            .with_child(
                PathDefinition::new("child", "Child")
                    .with_scopes(&[ScopeType::Global])
                    .with_parameter(ParameterDefinition::new("id", "Id")),
            );
        assert!(DefinitionRegistry::new().register(definition).is_err());
    }

    #[test]
    fn repeated_parameters_are_rejected() {
        let definition = tree("roots", "leaf");
        let mut child = *definition.child.clone().unwrap();
        child
            .parameters
            .push(ParameterDefinition::new("env", "Shadowing"));
        let definition = PathDefinition {
            child: Some(Box::new(child)),
            ..definition
        };
        assert!(matches!(
            DefinitionRegistry::new().register(definition),
            Err(AppError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn empty_scopes_are_rejected() {
        let definition = PathDefinition::new("none", "None");
        assert!(DefinitionRegistry::new().register(definition).is_err());
    }
}
