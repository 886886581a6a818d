//! Dependency-graph analytics: rendering, cycle detection (Tarjan),
//! critical path, and transitive reachability.
//!
//! Insert-time checking keeps the `blocks` graph acyclic; `find_cycles`
//! exists so the UI can highlight corruption (e.g. a hand-imported store)
//! rather than trusting it blindly.

use std::collections::{HashMap, HashSet, VecDeque};

use gonogo_core::dependency::EpicDependency;
use gonogo_core::enums::DependencyKind;
use gonogo_store::traits::Storage;

use crate::Result;
use crate::viewmodel::{CriticalPath, DependencyGraphView, GraphEdge, GraphNode};

/// Renders the dependency graph restricted to the given kinds (default
/// `blocks`), with cycles detected over the `blocks` subset.
pub fn dependency_graph(
    store: &dyn Storage,
    kinds: Option<&[DependencyKind]>,
) -> Result<DependencyGraphView> {
    let kinds = kinds.unwrap_or(&[DependencyKind::Blocks]);
    let epics = store.list_epics()?;
    let edges = store.list_dependencies(Some(kinds))?;

    let nodes: Vec<GraphNode> = epics
        .iter()
        .filter(|e| !e.archived)
        .map(|e| GraphNode {
            id: e.id.clone(),
            label: e.title.clone(),
            status: e.status,
        })
        .collect();

    let blocks_edges: Vec<&EpicDependency> =
        edges.iter().filter(|e| e.kind.is_blocking()).collect();
    let cycles = find_cycles(&blocks_edges);

    Ok(DependencyGraphView {
        nodes,
        edges: edges
            .iter()
            .map(|e| GraphEdge {
                from: e.from_epic.clone(),
                to: e.to_epic.clone(),
                kind: e.kind,
            })
            .collect(),
        cycles,
    })
}

/// Finds cycles by strongly-connected components (Tarjan). Only
/// components with more than one node are cycles; a healthy store
/// returns an empty list.
pub fn find_cycles(edges: &[&EpicDependency]) -> Vec<Vec<String>> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut nodes: Vec<&str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for edge in edges {
        adjacency
            .entry(edge.from_epic.as_str())
            .or_default()
            .push(edge.to_epic.as_str());
        for node in [edge.from_epic.as_str(), edge.to_epic.as_str()] {
            if seen.insert(node) {
                nodes.push(node);
            }
        }
    }

    let mut state = TarjanState {
        adjacency: &adjacency,
        index: 0,
        indices: HashMap::new(),
        lowlinks: HashMap::new(),
        on_stack: HashSet::new(),
        stack: Vec::new(),
        components: Vec::new(),
    };
    for node in nodes {
        if !state.indices.contains_key(node) {
            state.strongconnect(node);
        }
    }

    let mut cycles: Vec<Vec<String>> = state
        .components
        .into_iter()
        .filter(|c| c.len() > 1)
        .map(|mut c| {
            c.sort();
            c
        })
        .collect();
    cycles.sort();
    cycles
}

struct TarjanState<'a> {
    adjacency: &'a HashMap<&'a str, Vec<&'a str>>,
    index: u32,
    indices: HashMap<&'a str, u32>,
    lowlinks: HashMap<&'a str, u32>,
    on_stack: HashSet<&'a str>,
    stack: Vec<&'a str>,
    components: Vec<Vec<String>>,
}

impl<'a> TarjanState<'a> {
    fn strongconnect(&mut self, v: &'a str) {
        self.indices.insert(v, self.index);
        self.lowlinks.insert(v, self.index);
        self.index += 1;
        self.stack.push(v);
        self.on_stack.insert(v);

        if let Some(neighbours) = self.adjacency.get(v) {
            for &w in neighbours {
                if !self.indices.contains_key(w) {
                    self.strongconnect(w);
                    let low = self.lowlinks[w].min(self.lowlinks[v]);
                    self.lowlinks.insert(v, low);
                } else if self.on_stack.contains(w) {
                    let low = self.indices[w].min(self.lowlinks[v]);
                    self.lowlinks.insert(v, low);
                }
            }
        }

        if self.lowlinks[v] == self.indices[v] {
            let mut component = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack.remove(w);
                component.push(w.to_string());
                if w == v {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}

/// Computes the longest weighted path from any root to `target` on the
/// `blocks` DAG. Each Epic's weight is the sum of its stories' points;
/// ties break toward the earliest-created predecessor.
pub fn critical_path_to(store: &dyn Storage, target: &str) -> Result<CriticalPath> {
    // Weight per epic: sum of its stories' points.
    let mut weights: HashMap<String, u64> = HashMap::new();
    let mut created: HashMap<String, chrono::DateTime<chrono::Utc>> = HashMap::new();
    for epic in store.list_epics()? {
        weights.insert(epic.id.clone(), 0);
        created.insert(epic.id.clone(), epic.created_at);
    }
    for story in store.list_stories()? {
        if let Some(ref epic) = story.epic_id {
            if let Some(weight) = weights.get_mut(epic) {
                *weight += story.story_points as u64;
            }
        }
    }

    if !weights.contains_key(target) {
        return Err(gonogo_store::StoreError::not_found("epic", target));
    }

    let edges = store.list_dependencies(Some(&[DependencyKind::Blocks]))?;
    // predecessors[n] = epics blocking n.
    let mut predecessors: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    for id in weights.keys() {
        in_degree.insert(id.as_str(), 0);
    }
    for edge in &edges {
        predecessors
            .entry(edge.to_epic.as_str())
            .or_default()
            .push(edge.from_epic.as_str());
        successors
            .entry(edge.from_epic.as_str())
            .or_default()
            .push(edge.to_epic.as_str());
        *in_degree.entry(edge.to_epic.as_str()).or_insert(0) += 1;
    }

    // Longest-path DP over a topological order (Kahn).
    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|&(_, &d)| d == 0)
        .map(|(&n, _)| n)
        .collect();
    let mut distance: HashMap<&str, u64> = HashMap::new();
    let mut best_pred: HashMap<&str, &str> = HashMap::new();

    while let Some(node) = queue.pop_front() {
        let own = weights.get(node).copied().unwrap_or(0);
        let incoming = predecessors.get(node).cloned().unwrap_or_default();
        let mut best: Option<(&str, u64)> = None;
        for pred in incoming {
            let d = distance.get(pred).copied().unwrap_or(0);
            let better = match best {
                None => true,
                Some((current, current_d)) => {
                    d > current_d || (d == current_d && created[pred] < created[current])
                }
            };
            if better {
                best = Some((pred, d));
            }
        }
        let through = best.map(|(_, d)| d).unwrap_or(0);
        distance.insert(node, through + own);
        if let Some((pred, _)) = best {
            best_pred.insert(node, pred);
        }

        for &next in successors.get(node).map(Vec::as_slice).unwrap_or(&[]) {
            let degree = in_degree.get_mut(next).expect("edge endpoint known");
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(next);
            }
        }
    }

    // A node missed by the topological sweep sits on a cycle; the insert
    // check should make this unreachable.
    let total_points = distance.get(target).copied().unwrap_or(0);

    let mut path = vec![target.to_string()];
    let mut cursor = target;
    while let Some(&pred) = best_pred.get(cursor) {
        path.push(pred.to_string());
        cursor = pred;
    }
    path.reverse();

    Ok(CriticalPath {
        target: target.to_string(),
        path,
        total_points,
    })
}

/// The `blocks*` closure: everything transitively blocked by `epic_id`.
pub fn reachable_from(store: &dyn Storage, epic_id: &str) -> Result<Vec<String>> {
    let edges = store.list_dependencies(Some(&[DependencyKind::Blocks]))?;
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &edges {
        adjacency
            .entry(edge.from_epic.as_str())
            .or_default()
            .push(edge.to_epic.as_str());
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    queue.push_back(epic_id);
    while let Some(node) = queue.pop_front() {
        for &next in adjacency.get(node).map(Vec::as_slice).unwrap_or(&[]) {
            if visited.insert(next) {
                queue.push_back(next);
            }
        }
    }

    let mut reachable: Vec<String> = visited.into_iter().map(String::from).collect();
    reachable.sort();
    Ok(reachable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use gonogo_core::epic::EpicBuilder;
    use gonogo_core::story::UserStory;
    use gonogo_store::SqliteStore;
    use gonogo_store::traits::Transaction;

    /// Diamond fixture: A->B, A->C, B->D, C->D with weights A=3, B=5,
    /// C=2, D=1.
    fn diamond_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .run_in_transaction(&|tx: &dyn Transaction| {
                let points = [("EP-00001", 3), ("EP-00002", 5), ("EP-00003", 2), ("EP-00004", 1)];
                for (i, (id, pts)) in points.iter().enumerate() {
                    tx.create_epic(&EpicBuilder::new(*id, format!("Epic {id}")).build(), "admin")?;
                    let story_id = format!("US-{:05}", i + 1);
                    let mut story = UserStory::new(&story_id, format!("Story for {id}"), &story_id);
                    story.epic_id = Some(id.to_string());
                    story.story_points = *pts;
                    tx.create_story(&story, "sync")?;
                }
                for (from, to) in [
                    ("EP-00001", "EP-00002"),
                    ("EP-00001", "EP-00003"),
                    ("EP-00002", "EP-00004"),
                    ("EP-00003", "EP-00004"),
                ] {
                    tx.add_dependency(&EpicDependency::blocks(from, to), "admin")?;
                }
                Ok(())
            })
            .unwrap();
        store
    }

    #[test]
    fn critical_path_diamond() {
        let store = diamond_store();
        let cp = critical_path_to(&store, "EP-00004").unwrap();
        assert_eq!(cp.path, vec!["EP-00001", "EP-00002", "EP-00004"]);
        assert_eq!(cp.total_points, 9);
    }

    #[test]
    fn critical_path_of_root_is_itself() {
        let store = diamond_store();
        let cp = critical_path_to(&store, "EP-00001").unwrap();
        assert_eq!(cp.path, vec!["EP-00001"]);
        assert_eq!(cp.total_points, 3);
    }

    #[test]
    fn critical_path_unknown_target_errors() {
        let store = diamond_store();
        assert!(critical_path_to(&store, "EP-09999").is_err());
    }

    #[test]
    fn healthy_graph_has_no_cycles() {
        let store = diamond_store();
        let view = dependency_graph(&store, None).unwrap();
        assert_eq!(view.nodes.len(), 4);
        assert_eq!(view.edges.len(), 4);
        assert!(view.cycles.is_empty());
    }

    #[test]
    fn tarjan_reports_injected_cycle() {
        // find_cycles works on raw edges, so a corrupt graph can be
        // simulated without going through the insert check.
        let edges = vec![
            EpicDependency::blocks("EP-00001", "EP-00002"),
            EpicDependency::blocks("EP-00002", "EP-00003"),
            EpicDependency::blocks("EP-00003", "EP-00001"),
            EpicDependency::blocks("EP-00003", "EP-00004"),
        ];
        let refs: Vec<&EpicDependency> = edges.iter().collect();
        let cycles = find_cycles(&refs);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["EP-00001", "EP-00002", "EP-00003"]);
    }

    #[test]
    fn reachability_closure() {
        let store = diamond_store();
        assert_eq!(
            reachable_from(&store, "EP-00001").unwrap(),
            vec!["EP-00002", "EP-00003", "EP-00004"]
        );
        assert_eq!(
            reachable_from(&store, "EP-00004").unwrap(),
            Vec::<String>::new()
        );
    }

    #[test]
    fn tie_breaks_toward_earliest_created() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .run_in_transaction(&|tx: &dyn Transaction| {
                let early = chrono::Utc::now() - chrono::Duration::days(10);
                let late = chrono::Utc::now() - chrono::Duration::days(1);
                tx.create_epic(
                    &EpicBuilder::new("EP-00001", "Early").created_at(early).build(),
                    "admin",
                )?;
                tx.create_epic(
                    &EpicBuilder::new("EP-00002", "Late").created_at(late).build(),
                    "admin",
                )?;
                tx.create_epic(&EpicBuilder::new("EP-00003", "Target").build(), "admin")?;
                // Equal weights (no stories), both block the target.
                tx.add_dependency(&EpicDependency::blocks("EP-00001", "EP-00003"), "admin")?;
                tx.add_dependency(&EpicDependency::blocks("EP-00002", "EP-00003"), "admin")?;
                Ok(())
            })
            .unwrap();

        let cp = critical_path_to(&store, "EP-00003").unwrap();
        assert_eq!(cp.path, vec!["EP-00001", "EP-00003"]);
    }
}
