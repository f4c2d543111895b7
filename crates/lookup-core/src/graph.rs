// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::{HashMap, HashSet};

use crate::{ConfigError, FieldConfig, FieldId, ParamSource};

/// Gate and reset relations between fields, validated to be acyclic.
///
/// An edge `upstream -> downstream` exists when `downstream` is gated by
/// `upstream` or when `upstream` lists `downstream` as a reset target.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    ids: Vec<FieldId>,
    index: HashMap<FieldId, usize>,
    gates: Vec<Vec<usize>>,
    resets: Vec<Vec<usize>>,
    edges: Vec<Vec<usize>>,
    topo: Vec<usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl DependencyGraph {
    pub fn build(configs: &[FieldConfig]) -> Result<Self, ConfigError> {
        let mut index = HashMap::with_capacity(configs.len());
        for (position, config) in configs.iter().enumerate() {
            config.validate()?;
            if index.insert(config.id.clone(), position).is_some() {
                return Err(ConfigError::DuplicateField {
                    field: config.id.clone(),
                });
            }
        }

        let resolve = |config: &FieldConfig, reference: &FieldId, context: &'static str| {
            index
                .get(reference)
                .copied()
                .ok_or_else(|| ConfigError::UnknownReference {
                    field: config.id.clone(),
                    reference: reference.clone(),
                    context,
                })
        };

        let mut gates = Vec::with_capacity(configs.len());
        let mut resets = Vec::with_capacity(configs.len());
        let mut edges = vec![Vec::new(); configs.len()];
        for (position, config) in configs.iter().enumerate() {
            let mut field_gates = Vec::with_capacity(config.required_gates.len());
            for gate in &config.required_gates {
                let upstream = resolve(config, gate, "required_gates")?;
                field_gates.push(upstream);
                push_unique(&mut edges[upstream], position);
            }

            let mut field_resets = Vec::with_capacity(config.reset_targets.len());
            for target in &config.reset_targets {
                let downstream = resolve(config, target, "reset_targets")?;
                field_resets.push(downstream);
                push_unique(&mut edges[position], downstream);
            }

            for source in config.params.values() {
                if let ParamSource::Field(reference) = source {
                    resolve(config, reference, "params")?;
                }
            }

            gates.push(field_gates);
            resets.push(field_resets);
        }

        let ids: Vec<FieldId> = configs.iter().map(|config| config.id.clone()).collect();
        let topo = topological_order(&ids, &edges)?;

        Ok(Self {
            ids,
            index,
            gates,
            resets,
            edges,
            topo,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.index.contains_key(field)
    }

    pub fn gates(&self, field: &str) -> Vec<&FieldId> {
        self.lookup(field, &self.gates)
    }

    pub fn reset_targets(&self, field: &str) -> Vec<&FieldId> {
        self.lookup(field, &self.resets)
    }

    /// Fields ordered so that every field comes after all of its upstreams.
    pub fn topological_order(&self) -> impl Iterator<Item = &FieldId> {
        self.topo.iter().map(|position| &self.ids[*position])
    }

    /// Every field reachable from `field` through gate or reset edges.
    pub fn downstream(&self, field: &str) -> Vec<&FieldId> {
        let Some(&start) = self.index.get(field) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        let mut out = Vec::new();
        while let Some(node) = stack.pop() {
            for &next in self.edges[node].iter().rev() {
                if seen.insert(next) {
                    out.push(&self.ids[next]);
                    stack.push(next);
                }
            }
        }
        out
    }

    /// Order in which resets run when `field` changes: depth-first through
    /// reset targets in declaration order, each field at most once.
    pub fn cascade_order(&self, field: &str) -> Vec<&FieldId> {
        let Some(&start) = self.index.get(field) else {
            return Vec::new();
        };
        let mut seen = HashSet::from([start]);
        let mut out = Vec::new();
        self.walk_resets(start, &mut seen, &mut out);
        out
    }

    fn walk_resets<'a>(&'a self, node: usize, seen: &mut HashSet<usize>, out: &mut Vec<&'a FieldId>) {
        for &target in &self.resets[node] {
            if seen.insert(target) {
                out.push(&self.ids[target]);
                self.walk_resets(target, seen, out);
            }
        }
    }

    fn lookup<'a>(&'a self, field: &str, table: &'a [Vec<usize>]) -> Vec<&'a FieldId> {
        self.index
            .get(field)
            .map(|&position| {
                table[position]
                    .iter()
                    .map(|&other| &self.ids[other])
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn push_unique(list: &mut Vec<usize>, value: usize) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn topological_order(ids: &[FieldId], edges: &[Vec<usize>]) -> Result<Vec<usize>, ConfigError> {
    let mut marks = vec![Mark::Unvisited; ids.len()];
    let mut postorder = Vec::with_capacity(ids.len());
    let mut path = Vec::new();
    for root in 0..ids.len() {
        visit(root, ids, edges, &mut marks, &mut path, &mut postorder)?;
    }
    postorder.reverse();
    Ok(postorder)
}

fn visit(
    node: usize,
    ids: &[FieldId],
    edges: &[Vec<usize>],
    marks: &mut [Mark],
    path: &mut Vec<usize>,
    postorder: &mut Vec<usize>,
) -> Result<(), ConfigError> {
    match marks[node] {
        Mark::Done => return Ok(()),
        Mark::InProgress => {
            let start = path.iter().position(|&step| step == node).unwrap_or(0);
            let mut cycle: Vec<FieldId> = path[start..].iter().map(|&step| ids[step].clone()).collect();
            cycle.push(ids[node].clone());
            return Err(ConfigError::Cycle { path: cycle });
        }
        Mark::Unvisited => {}
    }

    marks[node] = Mark::InProgress;
    path.push(node);
    for &next in &edges[node] {
        visit(next, ids, edges, marks, path, postorder)?;
    }
    path.pop();
    marks[node] = Mark::Done;
    postorder.push(node);
    Ok(())
}
