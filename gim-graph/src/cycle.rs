use std::{borrow::Borrow, hash::Hash};

use tracing::debug;

use crate::{Direction, Graph};

/// Whether linking `member` under `parent` would close a loop.
///
/// True when `parent == member` or when `parent` is already nested, directly
/// or transitively, inside `member`.
pub fn would_create_cycle<K, Q>(graph: &Graph<K>, parent: &Q, member: &Q) -> bool
where
    K: Eq + Hash + Clone + Borrow<Q>,
    Q: Hash + Eq + ?Sized,
{
    if parent == member {
        return true;
    }
    let (Some(parent), Some(member)) = (graph.get(parent), graph.get(member))
    else {
        return false;
    };
    let found = graph.walk(member, Direction::Down).contains(&parent);
    debug!(nodes = graph.len(), edges = graph.edge_count(), found, "cycle check");
    found
}

/// The loop the proposed edge would close, as `parent, member, .., parent`.
pub fn cycle_path<K, Q>(graph: &Graph<K>, parent: &Q, member: &Q) -> Option<Vec<K>>
where
    K: Eq + Hash + Clone + Borrow<Q>,
    Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
{
    if parent == member {
        return Some(vec![parent.to_owned(), member.to_owned()]);
    }
    let parent_index = graph.get(parent)?;
    let member_index = graph.get(member)?;
    let existing = graph.path(member_index, parent_index, Direction::Down)?;
    let mut path = Vec::with_capacity(existing.len() + 1);
    path.push(graph.key(parent_index).clone());
    path.extend(existing.into_iter().map(|index| graph.key(index).clone()));
    Some(path)
}

#[cfg(test)]
mod tests {
    use rand::{seq::SliceRandom, Rng, SeedableRng};

    use super::*;

    #[test]
    fn self_reference_is_a_cycle() {
        let graph: Graph<String> = Graph::new();
        assert!(would_create_cycle(&graph, "a", "a"));
        assert_eq!(
            cycle_path(&graph, "a", "a"),
            Some(vec!["a".to_owned(), "a".to_owned()])
        );
    }

    #[test]
    fn chain() {
        // a contains b contains c contains d
        let graph = Graph::from_edges(
            [("a", "b"), ("b", "c"), ("c", "d")]
                .map(|(p, m)| (p.to_owned(), m.to_owned())),
        );
        assert!(would_create_cycle(&graph, "d", "a"));
        assert!(would_create_cycle(&graph, "c", "b"));
        assert!(!would_create_cycle(&graph, "a", "d"));
        assert!(!would_create_cycle(&graph, "a", "e"));
        assert!(!would_create_cycle(&graph, "e", "a"));
        assert_eq!(
            cycle_path(&graph, "d", "a").unwrap(),
            vec!["d", "a", "b", "c", "d"]
        );
        assert!(cycle_path(&graph, "a", "d").is_none());
    }

    #[test]
    fn diamond_allows_shortcuts_but_not_back_edges() {
        let graph = Graph::from_edges(
            [
                ("top", "left"),
                ("top", "right"),
                ("left", "bottom"),
                ("right", "bottom"),
            ]
            .map(|(p, m)| (p.to_owned(), m.to_owned())),
        );
        assert!(!would_create_cycle(&graph, "top", "bottom"));
        assert!(!would_create_cycle(&graph, "left", "right"));
        assert!(would_create_cycle(&graph, "bottom", "top"));
        assert!(would_create_cycle(&graph, "right", "top"));
    }

    fn has_cycle(graph: &Graph<usize>) -> bool {
        (0..graph.len()).any(|index| {
            graph
                .neighbours(index, Direction::Down)
                .iter()
                .any(|&member| graph.path(member, index, Direction::Down).is_some())
        })
    }

    #[test]
    fn accepted_insertions_stay_acyclic() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let nodes = rng.gen_range(2..16usize);
            let mut candidates = Vec::new();
            for parent in 0..nodes {
                for member in 0..nodes {
                    candidates.push((parent, member));
                }
            }
            candidates.shuffle(&mut rng);

            let mut graph = Graph::new();
            for node in 0..nodes {
                graph.intern(node);
            }
            for (parent, member) in candidates {
                if would_create_cycle(&graph, &parent, &member) {
                    let mut candidate = graph.clone();
                    candidate.link(parent, member);
                    assert!(has_cycle(&candidate), "rejected {parent}->{member}");
                    continue;
                }
                graph.link(parent, member);
                assert!(!has_cycle(&graph));
            }
        }
    }
}
