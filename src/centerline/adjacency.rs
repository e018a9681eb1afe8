/// Undirected graph over centerline point indices with a per-node visited flag.
#[derive(Debug, Clone, Default)]
pub struct AdjacencyGraph {
    nodes: Vec<Vec<usize>>,
    visited: Vec<bool>,
}

impl AdjacencyGraph {
    /// Creates a graph with `n_nodes` isolated, unvisited nodes.
    pub fn new(n_nodes: usize) -> Self {
        Self {
            nodes: vec![Vec::new(); n_nodes],
            visited: vec![false; n_nodes],
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Marks `a` and `b` as neighbours of each other.
    pub fn add_edge(&mut self, a: usize, b: usize) {
        self.nodes[a].push(b);
        self.nodes[b].push(a);
    }

    pub fn visit(&mut self, node: usize) {
        self.visited[node] = true;
    }

    pub fn is_visited(&self, node: usize) -> bool {
        self.visited[node]
    }

    pub fn degree(&self, node: usize) -> usize {
        self.nodes[node].len()
    }

    pub fn neighbors(&self, node: usize) -> &[usize] {
        &self.nodes[node]
    }

    /// First neighbour of `node` that has not been visited yet.
    pub fn find_next(&self, node: usize) -> Option<usize> {
        self.nodes[node]
            .iter()
            .copied()
            .find(|&n| !self.visited[n])
    }

    /// All unvisited neighbours of `node`, in insertion order.
    pub fn find_all_next(&self, node: usize) -> Vec<usize> {
        self.nodes[node]
            .iter()
            .copied()
            .filter(|&n| !self.visited[n])
            .collect()
    }

    /// Lowest-index node of degree 1.
    pub fn find_first(&self) -> Option<usize> {
        (0..self.nodes.len()).find(|&i| self.nodes[i].len() == 1)
    }

    /// Every node of degree 1 (path endpoints), ascending.
    pub fn find_all_first(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&i| self.nodes[i].len() == 1)
            .collect()
    }
}
