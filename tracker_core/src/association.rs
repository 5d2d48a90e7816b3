//! Cross-cycle data association: which of this cycle's detections is the
//! same physical object as one of last cycle's objects.
//!
//! # Algorithm pipeline
//! 1. Predict every prior object forward (constant velocity, done by the caller).
//! 2. Gate: for each prediction, query a k-d tree over the detections for
//!    candidates within `gate_m`; each candidate becomes an edge of a sparse
//!    bipartite graph with cost = squared distance.
//! 3. Partition the graph into **connected components** (union-find).
//!    Components are independent and solved in parallel.
//! 4. Solve each component with the **Hungarian algorithm** (O(n³)).

use crate::spatial::KdTree;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};

// ---------------------------------------------------------------------------
// Bipartite graph
// ---------------------------------------------------------------------------

/// A gate-passing (prior, detection) candidate pair.
#[derive(Clone, Debug)]
pub struct AssignEdge {
    pub prior_idx: usize,
    pub detection_idx: usize,
    /// Squared distance between prediction and detection
    pub cost: f64,
}

/// Sparse bipartite graph between prior objects and detections.
#[derive(Clone, Debug, Default)]
pub struct BipartiteGraph {
    pub edges: Vec<AssignEdge>,
    pub n_priors: usize,
    pub n_detections: usize,
}

impl BipartiteGraph {
    pub fn new(n_priors: usize, n_detections: usize) -> Self {
        Self {
            edges: Vec::new(),
            n_priors,
            n_detections,
        }
    }

    pub fn add_edge(&mut self, prior_idx: usize, detection_idx: usize, cost: f64) {
        self.edges.push(AssignEdge {
            prior_idx,
            detection_idx,
            cost,
        });
    }
}

// ---------------------------------------------------------------------------
// Disjoint sets (path compression + union by size)
// ---------------------------------------------------------------------------

struct DisjointSets {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSets {
    fn with_len(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            size: vec![1; len],
        }
    }

    fn root(&mut self, node: usize) -> usize {
        let mut root = node;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Point the whole walked path straight at the root.
        let mut cur = node;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn join(&mut self, a: usize, b: usize) {
        let (mut big, mut small) = (self.root(a), self.root(b));
        if big == small {
            return;
        }
        if self.size[big] < self.size[small] {
            std::mem::swap(&mut big, &mut small);
        }
        self.parent[small] = big;
        self.size[big] += self.size[small];
    }
}

/// One connected cluster of priors and detections.
#[derive(Clone, Debug, Default)]
pub struct Component {
    pub prior_indices: Vec<usize>,
    pub detection_indices: Vec<usize>,
    pub edges: Vec<AssignEdge>,
}

/// Partition the graph into connected components, ordered by their lowest
/// prior index.
///
/// Priors are nodes `0..n_priors`, detection `j` is node `n_priors + j`.
pub fn partition_components(graph: &BipartiteGraph) -> Vec<Component> {
    let offset = graph.n_priors;
    let mut sets = DisjointSets::with_len(graph.n_priors + graph.n_detections);
    for edge in &graph.edges {
        sets.join(edge.prior_idx, offset + edge.detection_idx);
    }

    let mut clusters: BTreeMap<usize, Component> = BTreeMap::new();
    for edge in &graph.edges {
        let root = sets.root(edge.prior_idx);
        clusters.entry(root).or_default().edges.push(edge.clone());
    }

    let mut components: Vec<Component> = clusters
        .into_values()
        .map(|mut comp| {
            let priors: BTreeSet<usize> = comp.edges.iter().map(|e| e.prior_idx).collect();
            let detections: BTreeSet<usize> = comp.edges.iter().map(|e| e.detection_idx).collect();
            comp.prior_indices = priors.into_iter().collect();
            comp.detection_indices = detections.into_iter().collect();
            comp
        })
        .collect();
    components.sort_unstable_by_key(|c| c.prior_indices[0]);
    components
}

// ---------------------------------------------------------------------------
// Per-component optimal assignment
// ---------------------------------------------------------------------------

/// Matched pairs plus the leftovers on both sides.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Assignment {
    /// (prior_idx, detection_idx)
    pub pairs: Vec<(usize, usize)>,
    /// Priors not observed this cycle
    pub unmatched_priors: Vec<usize>,
    /// Detections with no prior: new objects
    pub unmatched_detections: Vec<usize>,
}

/// Solve one component. Cells without a gated edge cost `dummy_cost` and are
/// never reported as a pair, so `dummy_cost` must exceed every edge cost.
pub fn hungarian_solve(component: &Component, dummy_cost: f64) -> Assignment {
    let np = component.prior_indices.len();
    let nd = component.detection_indices.len();

    if np == 0 || nd == 0 {
        return Assignment {
            pairs: vec![],
            unmatched_priors: component.prior_indices.clone(),
            unmatched_detections: component.detection_indices.clone(),
        };
    }

    let n = np.max(nd);
    let mut cost = vec![dummy_cost; n * n];
    let mut gated = vec![false; n * n];

    let prior_local: HashMap<usize, usize> = component
        .prior_indices
        .iter()
        .enumerate()
        .map(|(i, &p)| (p, i))
        .collect();
    let detection_local: HashMap<usize, usize> = component
        .detection_indices
        .iter()
        .enumerate()
        .map(|(j, &d)| (d, j))
        .collect();

    for e in &component.edges {
        if let (Some(&ri), Some(&ci)) = (
            prior_local.get(&e.prior_idx),
            detection_local.get(&e.detection_idx),
        ) {
            cost[ri * n + ci] = e.cost;
            gated[ri * n + ci] = true;
        }
    }

    let row_assign = run_hungarian(&cost, n);

    let mut pairs = Vec::new();
    let mut unmatched_priors = Vec::new();
    let mut matched_detection = vec![false; nd];

    for (ri, &ci) in row_assign.iter().enumerate().take(np) {
        if ci < nd && gated[ri * n + ci] {
            pairs.push((component.prior_indices[ri], component.detection_indices[ci]));
            matched_detection[ci] = true;
        } else {
            unmatched_priors.push(component.prior_indices[ri]);
        }
    }

    let unmatched_detections = (0..nd)
        .filter(|&j| !matched_detection[j])
        .map(|j| component.detection_indices[j])
        .collect();

    Assignment {
        pairs,
        unmatched_priors,
        unmatched_detections,
    }
}

/// Shortest-augmenting-path Kuhn-Munkres on a square `n × n` row-major cost
/// matrix. Returns the column assigned to each row.
fn run_hungarian(cost: &[f64], n: usize) -> Vec<usize> {
    // Index 0 of the column arrays is a virtual column used as the root of
    // each augmenting search; real columns are 1..=n, real rows 1..=n.
    let mut row_pot = vec![0.0f64; n + 1];
    let mut col_pot = vec![0.0f64; n + 1];
    let mut owner = vec![0usize; n + 1];
    let mut prev_col = vec![0usize; n + 1];

    for row in 1..=n {
        owner[0] = row;
        let mut slack = vec![f64::INFINITY; n + 1];
        let mut visited = vec![false; n + 1];
        let mut col = 0usize;

        // Grow the alternating tree until it reaches a free column.
        while owner[col] != 0 {
            visited[col] = true;
            let r = owner[col];
            let mut step = f64::INFINITY;
            let mut next = 0usize;
            for c in (1..=n).filter(|&c| !visited[c]) {
                let reduced = cost[(r - 1) * n + (c - 1)] - row_pot[r] - col_pot[c];
                if reduced < slack[c] {
                    slack[c] = reduced;
                    prev_col[c] = col;
                }
                if slack[c] < step {
                    step = slack[c];
                    next = c;
                }
            }
            for c in 0..=n {
                if visited[c] {
                    row_pot[owner[c]] += step;
                    col_pot[c] -= step;
                } else {
                    slack[c] -= step;
                }
            }
            col = next;
        }

        // Flip the path back to the virtual root.
        while col != 0 {
            let back = prev_col[col];
            owner[col] = owner[back];
            col = back;
        }
    }

    let mut assignment = vec![0usize; n];
    for (c, &r) in owner.iter().enumerate().skip(1) {
        if r != 0 {
            assignment[r - 1] = c - 1;
        }
    }
    assignment
}

// ---------------------------------------------------------------------------
// Gated global-nearest-neighbour association
// ---------------------------------------------------------------------------

/// Dummy cost above the summed cost of any full matching in `comp`, so one
/// more real pair always beats a cheaper but smaller matching.
fn cardinality_cost(comp: &Component, gate_m: f64) -> f64 {
    let n = comp.prior_indices.len().max(comp.detection_indices.len());
    (n as f64 + 1.0) * gate_m * gate_m + 1.0
}

/// Match predicted prior positions to detection positions.
///
/// A pair is only eligible when the distance is at most `gate_m`; among
/// eligible pairs the assignment maximises the number of matches and then
/// minimises the summed squared distance. Pairs are ordered by detection
/// index, unmatched lists ascending.
pub fn associate(predicted: &[[f64; 3]], detections: &[[f64; 3]], gate_m: f64) -> Assignment {
    let tree = KdTree::build(detections);

    let edges: Vec<(usize, usize, f64)> = predicted
        .par_iter()
        .enumerate()
        .flat_map_iter(|(pi, p)| {
            tree.within(p, gate_m)
                .into_iter()
                .map(move |(di, d)| (pi, di, d * d))
        })
        .collect();

    let mut graph = BipartiteGraph::new(predicted.len(), detections.len());
    for (pi, di, cost) in edges {
        graph.add_edge(pi, di, cost);
    }

    let components = partition_components(&graph);
    let solved: Vec<Assignment> = components
        .par_iter()
        .map(|comp| hungarian_solve(comp, cardinality_cost(comp, gate_m)))
        .collect();

    let mut pairs = Vec::new();
    let mut matched_prior = vec![false; predicted.len()];
    let mut matched_detection = vec![false; detections.len()];
    for a in solved {
        for (pi, di) in a.pairs {
            matched_prior[pi] = true;
            matched_detection[di] = true;
            pairs.push((pi, di));
        }
    }
    pairs.sort_unstable_by_key(|&(_, di)| di);

    Assignment {
        pairs,
        unmatched_priors: (0..predicted.len()).filter(|&i| !matched_prior[i]).collect(),
        unmatched_detections: (0..detections.len())
            .filter(|&j| !matched_detection[j])
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
