//! Pure, synchronous diff computation between two [`CatalogSummary`]s.
//!
//! Grounded on the `compute_diff`/`ConfigPatch` pattern: partition entries
//! into added/removed/modified buckets by comparing two name-keyed maps,
//! then classify the global runtime config's changed fields into the
//! dynamic/restart-required buckets the scheduler needs.

use mcpctl_domain::diff::{CatalogDiff, RuntimeFieldClass, SpecDiffKind};
use mcpctl_domain::runtime_config::RuntimeConfig;
use mcpctl_domain::spec::ServerSpec;
use mcpctl_domain::CatalogSummary;

/// Compute the structural diff between two catalog summaries.
///
/// `replaced_spec_keys` carries the *old* key of any logical name whose
/// identity fields changed; the corresponding new key lands in
/// `added_spec_keys` since, by specKey identity, it never existed before.
pub fn compute_diff(old: &CatalogSummary, new: &CatalogSummary) -> CatalogDiff {
    let mut diff = CatalogDiff::default();

    for (name, new_key) in &new.server_spec_keys {
        match old.server_spec_keys.get(name) {
            None => {
                diff.added_spec_keys.insert(new_key.clone());
            }
            Some(old_key) if old_key != new_key => {
                diff.replaced_spec_keys.insert(old_key.clone());
                diff.added_spec_keys.insert(new_key.clone());
            }
            Some(old_key) => {
                let old_spec = old.spec_registry.get(old_key);
                let new_spec = new.spec_registry.get(new_key);
                if old_spec != new_spec {
                    diff.updated_spec_keys.insert(new_key.clone());
                    if let (Some(o), Some(n)) = (old_spec, new_spec) {
                        if o.tags != n.tags {
                            diff.tags_changed.insert(new_key.clone());
                        }
                        diff.updated_spec_kinds.insert(new_key.clone(), classify_spec_diff(o, n));
                    }
                }
            }
        }
    }

    for (name, old_key) in &old.server_spec_keys {
        if !new.server_spec_keys.contains_key(name) {
            diff.removed_spec_keys.insert(old_key.clone());
        }
    }

    diff.runtime_fields = classify_runtime_diff(&old.runtime, &new.runtime);
    diff.runtime_changed = !diff.runtime_fields.is_empty();

    diff
}

/// A same-identity spec diff is `ToolsOnly` if `name`/`tags`/`exposeTools`
/// are the only fields that changed — the scheduler can update the pool's
/// spec in place with no further action. Anything else (`maxConcurrent`,
/// `minReady`, `idleSeconds`, `drainTimeoutSeconds`, `activationMode`) is
/// `RestartRequired`: the hint swap still happens in place (identity is
/// unchanged, so no new instances are forced), but the pool's instance
/// count may now be wrong against the new hints and needs reconciling.
fn classify_spec_diff(old: &ServerSpec, new: &ServerSpec) -> SpecDiffKind {
    let mut old_sans_tools_fields = old.clone();
    old_sans_tools_fields.name = new.name.clone();
    old_sans_tools_fields.tags = new.tags.clone();
    old_sans_tools_fields.expose_tools = new.expose_tools;

    if &old_sans_tools_fields == new {
        SpecDiffKind::ToolsOnly
    } else {
        SpecDiffKind::RestartRequired
    }
}

/// `dynamic = {routeTimeout, pingInterval, toolRefresh*, clientCheck*,
/// serverInitRetry*, reloadMode, exposeTools, toolNamespaceStrategy,
/// observability}`; `restart-required = {rpc, subAgent, bootstrapMode,
/// bootstrapConcurrency, bootstrapTimeout, defaultActivationMode}`.
///
/// `idleCheckInterval` has no corresponding entry in either named bucket; it
/// is reprogrammed the same way `pingInterval` is, so it is treated as
/// dynamic too.
fn classify_runtime_diff(old: &RuntimeConfig, new: &RuntimeConfig) -> RuntimeFieldClass {
    let mut class = RuntimeFieldClass::default();

    macro_rules! dyn_field {
        ($name:literal, $field:ident) => {
            if old.$field != new.$field {
                class.dynamic_fields.push($name.to_string());
            }
        };
    }
    macro_rules! restart_field {
        ($name:literal, $field:ident) => {
            if old.$field != new.$field {
                class.restart_required_fields.push($name.to_string());
            }
        };
    }

    dyn_field!("routeTimeout", route_timeout_seconds);
    dyn_field!("pingInterval", ping_interval_seconds);
    dyn_field!("idleCheckInterval", idle_check_interval_seconds);
    dyn_field!("toolRefreshInterval", tool_refresh_interval_seconds);
    dyn_field!("toolRefreshConcurrency", tool_refresh_concurrency);
    dyn_field!("clientCheckSeconds", client_check_seconds);
    dyn_field!("clientInactiveSeconds", client_inactive_seconds);
    dyn_field!("serverInitRetryBaseMs", init_retry_base_ms);
    dyn_field!("serverInitRetryMaxMs", init_retry_max_ms);
    dyn_field!("serverInitRetryCount", init_retry_count);
    dyn_field!("exposeTools", expose_tools_default);
    dyn_field!("toolNamespaceStrategy", tool_namespace_strategy);
    if old.reload_mode != new.reload_mode {
        class.dynamic_fields.push("reloadMode".to_string());
    }
    if old.observability != new.observability {
        class.dynamic_fields.push("observability".to_string());
    }

    restart_field!("bootstrapMode", bootstrap_mode);
    restart_field!("bootstrapConcurrency", bootstrap_concurrency);
    restart_field!("bootstrapTimeout", bootstrap_timeout_seconds);
    restart_field!("defaultActivationMode", default_activation_mode);
    if old.rpc != new.rpc {
        class.restart_required_fields.push("rpc".to_string());
    }
    if old.sub_agent != new.sub_agent {
        class.restart_required_fields.push("subAgent".to_string());
    }

    class
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpctl_domain::spec::{ActivationMode, ServerSpec, TransportConfig};
    use mcpctl_domain::{fingerprint, Catalog};
    use std::collections::HashMap;

    fn spec(name: &str, cmd: &str) -> ServerSpec {
        ServerSpec {
            name: name.to_string(),
            transport: TransportConfig::Stdio {
                cmd: vec![cmd.to_string()],
                env: HashMap::new(),
                cwd: None,
            },
            protocol_version: "2025-06-18".into(),
            idle_seconds: 600,
            max_concurrent: 1,
            min_ready: 0,
            drain_timeout_seconds: 30,
            activation_mode: ActivationMode::OnDemand,
            expose_tools: false,
            tags: vec![],
            disabled: false,
        }
    }

    fn summary_of(specs: Vec<ServerSpec>) -> CatalogSummary {
        let mut catalog = Catalog::default();
        for s in specs {
            catalog.specs.insert(s.name.clone(), s);
        }
        CatalogSummary::from_catalog(&catalog)
    }

    #[test]
    fn identical_catalogs_produce_empty_diff() {
        let a = summary_of(vec![spec("calc", "calc-srv")]);
        let b = summary_of(vec![spec("calc", "calc-srv")]);
        let diff = compute_diff(&a, &b);
        assert!(diff.is_empty());
    }

    #[test]
    fn new_name_is_added() {
        let old = summary_of(vec![]);
        let new = summary_of(vec![spec("calc", "calc-srv")]);
        let diff = compute_diff(&old, &new);
        assert_eq!(diff.added_spec_keys.len(), 1);
        assert!(diff.removed_spec_keys.is_empty());
    }

    #[test]
    fn removed_name_is_removed() {
        let old = summary_of(vec![spec("calc", "calc-srv")]);
        let new = summary_of(vec![]);
        let diff = compute_diff(&old, &new);
        assert_eq!(diff.removed_spec_keys.len(), 1);
        assert!(diff.added_spec_keys.is_empty());
    }

    #[test]
    fn identity_change_is_replaced_not_removed_plus_added() {
        let old = summary_of(vec![spec("calc", "calc-srv")]);
        let new = summary_of(vec![spec("calc", "calc-srv-v2")]);
        let diff = compute_diff(&old, &new);
        assert_eq!(diff.replaced_spec_keys.len(), 1);
        assert_eq!(diff.added_spec_keys.len(), 1);
        assert!(diff.removed_spec_keys.is_empty());

        let old_key = fingerprint::fingerprint(&spec("calc", "calc-srv"));
        assert!(diff.replaced_spec_keys.contains(&old_key));
    }

    #[test]
    fn hint_only_change_is_updated_not_replaced() {
        let old = summary_of(vec![spec("calc", "calc-srv")]);
        let mut changed = spec("calc", "calc-srv");
        changed.idle_seconds = 5;
        let new = summary_of(vec![changed]);
        let diff = compute_diff(&old, &new);
        assert_eq!(diff.updated_spec_keys.len(), 1);
        assert!(diff.replaced_spec_keys.is_empty());
        assert!(diff.added_spec_keys.is_empty());
    }

    #[test]
    fn tags_only_change_is_flagged_separately() {
        let old = summary_of(vec![spec("calc", "calc-srv")]);
        let mut changed = spec("calc", "calc-srv");
        changed.tags = vec!["beta".to_string()];
        let new = summary_of(vec![changed]);
        let diff = compute_diff(&old, &new);
        assert_eq!(diff.updated_spec_keys.len(), 1);
        assert_eq!(diff.tags_changed.len(), 1);
    }

    #[test]
    fn name_tags_or_expose_tools_only_change_is_tools_only() {
        let old = summary_of(vec![spec("calc", "calc-srv")]);
        let mut changed = spec("calc", "calc-srv");
        changed.tags = vec!["beta".to_string()];
        changed.expose_tools = true;
        let new = summary_of(vec![changed]);
        let new_key = new.server_spec_keys.get("calc").unwrap();

        let diff = compute_diff(&old, &new);
        assert_eq!(diff.updated_spec_kinds.get(new_key), Some(&SpecDiffKind::ToolsOnly));
    }

    #[test]
    fn min_ready_only_change_is_restart_required() {
        let old = summary_of(vec![spec("calc", "calc-srv")]);
        let mut changed = spec("calc", "calc-srv");
        changed.min_ready = 2;
        let new = summary_of(vec![changed]);
        let new_key = new.server_spec_keys.get("calc").unwrap();

        let diff = compute_diff(&old, &new);
        assert_eq!(
            diff.updated_spec_kinds.get(new_key),
            Some(&SpecDiffKind::RestartRequired)
        );
    }

    #[test]
    fn disabled_spec_is_invisible_and_treated_as_removed() {
        let old = summary_of(vec![spec("calc", "calc-srv")]);
        let mut disabled = spec("calc", "calc-srv");
        disabled.disabled = true;
        let new = summary_of(vec![disabled]);
        let diff = compute_diff(&old, &new);
        assert_eq!(diff.removed_spec_keys.len(), 1);
    }

    #[test]
    fn runtime_route_timeout_change_is_dynamic() {
        let old = summary_of(vec![]);
        let mut new = summary_of(vec![]);
        new.runtime.route_timeout_seconds = old.runtime.route_timeout_seconds + 5;
        let diff = compute_diff(&old, &new);
        assert!(diff.runtime_changed);
        assert!(diff
            .runtime_fields
            .dynamic_fields
            .contains(&"routeTimeout".to_string()));
    }

    #[test]
    fn runtime_bootstrap_mode_change_is_restart_required() {
        use mcpctl_domain::runtime_config::BootstrapMode;
        let old = summary_of(vec![]);
        let mut new = summary_of(vec![]);
        new.runtime.bootstrap_mode = match old.runtime.bootstrap_mode {
            BootstrapMode::Parallel => BootstrapMode::Sequential,
            BootstrapMode::Sequential => BootstrapMode::Parallel,
        };
        let diff = compute_diff(&old, &new);
        assert!(diff
            .runtime_fields
            .restart_required_fields
            .contains(&"bootstrapMode".to_string()));
    }

    #[test]
    fn mixed_add_remove_replace_in_one_diff() {
        let old = summary_of(vec![spec("a", "a-bin"), spec("b", "b-bin")]);
        let new = summary_of(vec![spec("b", "b-bin-v2"), spec("c", "c-bin")]);
        let diff = compute_diff(&old, &new);
        assert_eq!(diff.removed_spec_keys.len(), 1); // a
        assert_eq!(diff.replaced_spec_keys.len(), 1); // b old key
        assert_eq!(diff.added_spec_keys.len(), 2); // b new key + c
    }
}
