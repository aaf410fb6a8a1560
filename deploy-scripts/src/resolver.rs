//! The dependency resolver: computes the order in which a target contract
//! and its transitive dependencies must deploy

use std::collections::HashSet;

use crate::{errors::ScriptError, registry::ManifestRegistry};

/// Computes the deployment order for the named contract.
///
/// Depth-first traversal over `dependencies`, accumulating in
/// first-discovery order: every dependency of a contract appears strictly
/// before the contract itself, repeated dependencies are emitted once, and
/// a dependency cycle is reported as an error naming the cycle path.
pub fn resolve_deployment_order(
    registry: &ManifestRegistry,
    target: &str,
) -> Result<Vec<String>, ScriptError> {
    let mut order = Vec::new();
    let mut added = HashSet::new();
    let mut path = Vec::new();
    visit(registry, target, &mut order, &mut added, &mut path)?;
    Ok(order)
}

/// Visits one contract, emitting its dependencies before the contract
/// itself
fn visit(
    registry: &ManifestRegistry,
    name: &str,
    order: &mut Vec<String>,
    added: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Result<(), ScriptError> {
    if added.contains(name) {
        return Ok(());
    }
    if path.iter().any(|ancestor| ancestor == name) {
        let mut cycle = path.clone();
        cycle.push(name.to_string());
        return Err(ScriptError::CyclicDependency(cycle.join(" -> ")));
    }

    let entry = registry.get(name)?;
    path.push(name.to_string());
    for dependency in &entry.dependencies {
        visit(registry, dependency, order, added, path)?;
    }
    path.pop();

    added.insert(name.to_string());
    order.push(name.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use deploy_common::types::{ChainProfile, ContractManifestEntry, NetworkType};

    use crate::{errors::ScriptError, registry::ManifestRegistry};

    use super::resolve_deployment_order;

    /// A chain profile for an in-memory manifest
    fn test_profile() -> ChainProfile {
        ChainProfile {
            name: "testchain".to_string(),
            chain_id: 31337,
            network_type: NetworkType::Testnet,
            rpc_url: "http://localhost:8545".to_string(),
            currency: "ETH".to_string(),
            explorer_base_url: "https://explorer.invalid".to_string(),
        }
    }

    /// A minimal manifest entry with the given dependencies
    fn entry(name: &str, dependencies: &[&str]) -> ContractManifestEntry {
        ContractManifestEntry {
            name: name.to_string(),
            implementation_file_name: name.to_string(),
            contract_type: name.to_uppercase(),
            chain: "testchain".to_string(),
            network_type: NetworkType::Testnet,
            tenants: vec!["default".to_string()],
            upgradable: false,
            verify: false,
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            constructor_args: Vec::new(),
            post_deploy_calls: Vec::new(),
            proxy_file_name: None,
            extensions: Vec::new(),
        }
    }

    /// Builds a registry from entries
    fn registry(entries: Vec<ContractManifestEntry>) -> ManifestRegistry {
        ManifestRegistry::from_parts(test_profile(), entries).unwrap()
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let registry = registry(vec![
            entry("Marketplace", &["Items", "PaymentRouter"]),
            entry("Items", &["Registry"]),
            entry("PaymentRouter", &["Registry"]),
            entry("Registry", &[]),
        ]);

        let order = resolve_deployment_order(&registry, "Marketplace").unwrap();
        for (i, name) in order.iter().enumerate() {
            for dependency in &registry.get(name).unwrap().dependencies {
                let dep_position = order.iter().position(|n| n == dependency).unwrap();
                assert!(dep_position < i, "{dependency} must precede {name}");
            }
        }

        // Repeated dependencies appear exactly once
        assert_eq!(order.len(), 4);
        assert_eq!(order.last().unwrap(), "Marketplace");
    }

    #[test]
    fn test_cycle_detected() {
        let registry = registry(vec![
            entry("Items", &["Avatars"]),
            entry("Avatars", &["Items"]),
        ]);

        let err = resolve_deployment_order(&registry, "Items").unwrap_err();
        match err {
            ScriptError::CyclicDependency(cycle) => {
                assert!(cycle.contains("Items") && cycle.contains("Avatars"));
            }
            other => panic!("expected cycle error, got {other}"),
        }
    }

    #[test]
    fn test_unknown_dependency_is_fatal() {
        let registry = registry(vec![entry("Items", &["DoesNotExist"])]);

        let err = resolve_deployment_order(&registry, "Items").unwrap_err();
        assert!(matches!(err, ScriptError::ContractNotFound(name) if name == "DoesNotExist"));
    }
}
