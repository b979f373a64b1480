//! Turning a resource graph into realized resources.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use sitedeck_core::{
    AttrRef, EngineError, EngineResult, OutputMap, OutputValue, ResourceChanges, ResourceDecl,
    ResourceGraph, REGION_CONFIG_KEY,
};

use crate::checkpoint::ResourceState;
use crate::provider::SimulatedProvider;
use crate::workspace::OutputSink;

/// Desired state after a successful deploy.
#[derive(Debug)]
pub(crate) struct Deployment {
    pub resources: Vec<ResourceState>,
    pub outputs: OutputMap,
    pub changes: ResourceChanges,
}

/// Realize `graph` on top of `previous`, reporting each change to `sink`.
///
/// Declarations are resolved in order, so a reference to a resource that is
/// not declared earlier fails the whole deploy before anything is committed.
pub(crate) fn apply(
    graph: &ResourceGraph,
    previous: &[ResourceState],
    region: Option<&str>,
    sink: &OutputSink,
) -> EngineResult<Deployment> {
    let region = match region {
        Some(region) => region,
        None if graph.resources().is_empty() => "",
        None => {
            return Err(EngineError::Provider(format!(
                "missing required configuration key \"{REGION_CONFIG_KEY}\""
            )))
        }
    };
    let provider = SimulatedProvider::new(region);

    let mut seen: HashSet<&str> = HashSet::new();
    let mut realized: HashMap<&str, BTreeMap<String, Value>> = HashMap::new();
    let mut resources = Vec::with_capacity(graph.resources().len());
    let mut changes = ResourceChanges::default();

    for decl in graph.resources() {
        if !seen.insert(decl.name.as_str()) {
            return Err(EngineError::Program(format!(
                "duplicate resource name '{}'",
                decl.name
            )));
        }

        if let Some(dep) = decl
            .dependencies()
            .find(|dep| !realized.contains_key(dep.resource.as_str()))
        {
            return Err(EngineError::Program(format!(
                "resource '{}' depends on '{}', which is not declared before it",
                decl.name, dep.resource
            )));
        }
        let inputs = resolve_inputs(decl, &realized)?;
        let prior = previous.iter().find(|p| p.name == decl.name);
        let (id, outputs) = provider.realize(&decl.name, decl.kind, &inputs, prior)?;

        let step = match prior {
            None => {
                changes.create += 1;
                Some(("+", "created"))
            }
            Some(p) if p.kind == decl.kind && p.id == id && p.inputs == inputs => {
                changes.same += 1;
                None
            }
            Some(_) => {
                changes.update += 1;
                Some(("~", "updated"))
            }
        };
        if let Some((symbol, verb)) = step {
            emit(sink, format!("{symbol} {} {} {verb}", decl.kind, decl.name));
        }

        realized.insert(decl.name.as_str(), outputs.clone());
        resources.push(ResourceState {
            name: decl.name.clone(),
            kind: decl.kind,
            id,
            inputs,
            outputs,
        });
    }

    for stale in previous
        .iter()
        .rev()
        .filter(|p| !seen.contains(p.name.as_str()))
    {
        changes.delete += 1;
        emit(sink, format!("- {} {} deleted", stale.kind, stale.name));
    }

    let lookup = |r: &AttrRef| {
        realized
            .get(r.resource.as_str())
            .and_then(|attrs| attrs.get(&r.attribute))
            .cloned()
    };
    let outputs = graph
        .outputs()
        .iter()
        .map(|(name, input)| {
            let value = input.resolve(&lookup).map_err(|missing| {
                EngineError::Program(format!("output '{name}' references unresolved {missing}"))
            })?;
            Ok((
                name.clone(),
                OutputValue {
                    value,
                    secret: false,
                },
            ))
        })
        .collect::<EngineResult<OutputMap>>()?;

    emit(sink, describe(&changes));

    Ok(Deployment {
        resources,
        outputs,
        changes,
    })
}

/// Delete every resource in reverse declaration order.
pub(crate) fn teardown(previous: &[ResourceState], sink: &OutputSink) -> ResourceChanges {
    for resource in previous.iter().rev() {
        emit(sink, format!("- {} {} deleted", resource.kind, resource.name));
    }
    let changes = ResourceChanges {
        delete: previous.len(),
        ..Default::default()
    };
    emit(sink, describe(&changes));
    changes
}

fn resolve_inputs(
    decl: &ResourceDecl,
    realized: &HashMap<&str, BTreeMap<String, Value>>,
) -> EngineResult<BTreeMap<String, Value>> {
    decl.inputs
        .iter()
        .map(|(key, input)| {
            let value = input
                .resolve(|r| {
                    realized
                        .get(r.resource.as_str())
                        .and_then(|attrs| attrs.get(&r.attribute))
                        .cloned()
                })
                .map_err(|missing| {
                    EngineError::Program(format!(
                        "resource '{}' input '{key}' references unresolved {missing}",
                        decl.name
                    ))
                })?;
            Ok((key.clone(), value))
        })
        .collect()
}

fn describe(changes: &ResourceChanges) -> String {
    format!(
        "Resources: {} created, {} updated, {} unchanged, {} deleted",
        changes.create, changes.update, changes.same, changes.delete
    )
}

/// Progress is a side channel; a closed receiver is not an error.
pub(crate) fn emit(sink: &OutputSink, line: String) {
    let _ = sink.send(line);
}
