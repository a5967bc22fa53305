use std::{
    borrow::Borrow,
    collections::{HashMap, VecDeque},
    hash::Hash,
};

/// Which way a walk follows hierarchy edges.
///
/// `Up` goes from a member group to the groups containing it, `Down` goes
/// from a parent group to the groups nested inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Arena of group nodes with index based adjacency in both directions.
///
/// Built once per transaction from the hierarchy rows and then only read.
#[derive(Debug, Clone)]
pub struct Graph<K> {
    index: HashMap<K, usize>,
    keys: Vec<K>,
    up: Vec<Vec<usize>>,
    down: Vec<Vec<usize>>,
    edges: usize,
}

impl<K> Default for Graph<K> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            keys: Vec::new(),
            up: Vec::new(),
            down: Vec::new(),
            edges: 0,
        }
    }
}

impl<K> Graph<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from `(parent, member)` pairs.
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (K, K)>,
    {
        let mut graph = Self::new();
        for (parent, member) in edges {
            graph.link(parent, member);
        }
        graph
    }

    pub fn intern(&mut self, key: K) -> usize {
        if let Some(index) = self.index.get(&key) {
            return *index;
        }
        let index = self.keys.len();
        self.index.insert(key.clone(), index);
        self.keys.push(key);
        self.up.push(Vec::new());
        self.down.push(Vec::new());
        index
    }

    /// Records that `member` is nested in `parent`. Returns false when the
    /// edge was already present.
    pub fn link(&mut self, parent: K, member: K) -> bool {
        let parent = self.intern(parent);
        let member = self.intern(member);
        if self.down[parent].contains(&member) {
            return false;
        }
        self.down[parent].push(member);
        self.up[member].push(parent);
        self.edges += 1;
        true
    }

    pub fn get<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(key).copied()
    }

    pub fn key(&self, index: usize) -> &K {
        &self.keys[index]
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges
    }

    pub fn neighbours(&self, index: usize, direction: Direction) -> &[usize] {
        match direction {
            Direction::Up => &self.up[index],
            Direction::Down => &self.down[index],
        }
    }

    /// Breadth-first walk from `start`, `start` included. Each node is
    /// visited at most once, so a corrupt cyclic graph still terminates.
    pub fn walk(&self, start: usize, direction: Direction) -> Vec<usize> {
        let mut visited = vec![false; self.keys.len()];
        let mut order = Vec::new();
        let mut queue = VecDeque::from([start]);
        visited[start] = true;
        while let Some(current) = queue.pop_front() {
            order.push(current);
            for &next in self.neighbours(current, direction) {
                if !visited[next] {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }
        order
    }

    /// Keys reachable from `key`, `key` itself first. Empty for unknown keys.
    pub fn reachable<Q>(&self, key: &Q, direction: Direction) -> Vec<&K>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.get(key) {
            Some(start) => self
                .walk(start, direction)
                .into_iter()
                .map(|index| &self.keys[index])
                .collect(),
            None => Vec::new(),
        }
    }

    /// Shortest path from `from` to `to`, both ends included.
    pub fn path(
        &self,
        from: usize,
        to: usize,
        direction: Direction,
    ) -> Option<Vec<usize>> {
        let mut previous: Vec<Option<usize>> = vec![None; self.keys.len()];
        let mut visited = vec![false; self.keys.len()];
        let mut queue = VecDeque::from([from]);
        visited[from] = true;
        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![to];
                let mut cursor = to;
                while let Some(prev) = previous[cursor] {
                    path.push(prev);
                    cursor = prev;
                }
                path.reverse();
                return Some(path);
            }
            for &next in self.neighbours(current, direction) {
                if !visited[next] {
                    visited[next] = true;
                    previous[next] = Some(current);
                    queue.push_back(next);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> Graph<&'static str> {
        // top contains left and right, both contain bottom
        Graph::from_edges([
            ("top", "left"),
            ("top", "right"),
            ("left", "bottom"),
            ("right", "bottom"),
        ])
    }

    #[test]
    fn link_deduplicates() {
        let mut graph = Graph::new();
        assert!(graph.link("a", "b"));
        assert!(!graph.link("a", "b"));
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn walk_visits_diamond_once() {
        let graph = diamond();
        let up = graph.reachable("bottom", Direction::Up);
        assert_eq!(up.len(), 4);
        assert_eq!(*up[0], "bottom");
        assert_eq!(*up[3], "top");

        let down = graph.reachable("left", Direction::Down);
        assert_eq!(down, vec![&"left", &"bottom"]);
        assert!(graph.reachable("missing", Direction::Up).is_empty());
    }

    #[test]
    fn walk_terminates_on_corrupt_cycle() {
        let graph = Graph::from_edges([("a", "b"), ("b", "c"), ("c", "a")]);
        let start = graph.get("a").unwrap();
        assert_eq!(graph.walk(start, Direction::Down).len(), 3);
        assert_eq!(graph.walk(start, Direction::Up).len(), 3);
    }

    #[test]
    fn shortest_path() {
        let graph = diamond();
        let top = graph.get("top").unwrap();
        let bottom = graph.get("bottom").unwrap();
        let path = graph.path(top, bottom, Direction::Down).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path[0], top);
        assert_eq!(path[2], bottom);
        assert!(graph.path(bottom, top, Direction::Down).is_none());
    }
}
