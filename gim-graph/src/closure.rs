use std::{
    borrow::Borrow,
    collections::{BTreeSet, HashMap},
    hash::Hash,
};

use crate::{Direction, Graph};

/// One `(user, group)` element of the effective membership relation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Effective<U, G> {
    pub user: U,
    pub group: G,
}

/// The flattened effective membership relation. Provenance is not kept: a
/// pair reached through several paths appears once.
pub type Closure<U, G> = BTreeSet<Effective<U, G>>;

/// Propagates every direct `(user, group)` edge upward through `graph`.
///
/// Ancestor sets are computed once per distinct group, so the cost is
/// bounded by the direct edges times the average ancestor count.
pub fn closure<U, G, I>(direct: I, graph: &Graph<G>) -> Closure<U, G>
where
    U: Ord + Clone,
    G: Ord + Eq + Hash + Clone,
    I: IntoIterator<Item = (U, G)>,
{
    let mut ancestors: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut out = BTreeSet::new();
    for (user, group) in direct {
        let Some(start) = graph.get(&group) else {
            out.insert(Effective { user, group });
            continue;
        };
        let reach = ancestors
            .entry(start)
            .or_insert_with(|| graph.walk(start, Direction::Up));
        for &index in reach.iter() {
            out.insert(Effective {
                user: user.clone(),
                group: graph.key(index).clone(),
            });
        }
    }
    out
}

/// Groups `user` effectively belongs to.
pub fn groups_of<U, G, Q>(closure: &Closure<U, G>, user: &Q) -> BTreeSet<G>
where
    U: Ord + Borrow<Q>,
    G: Ord + Clone,
    Q: Eq + ?Sized,
{
    closure
        .iter()
        .filter(|item| Borrow::<Q>::borrow(&item.user) == user)
        .map(|item| item.group.clone())
        .collect()
}

/// Users effectively belonging to `group`, walking down from it rather than
/// building the whole closure.
pub fn members_of<U, G, I, Q>(direct: I, graph: &Graph<G>, group: &Q) -> BTreeSet<U>
where
    U: Ord,
    G: Ord + Eq + Hash + Clone + Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    I: IntoIterator<Item = (U, G)>,
{
    let nested: BTreeSet<&G> = graph.reachable(group, Direction::Down).into_iter().collect();
    direct
        .into_iter()
        .filter(|(_, g)| {
            if nested.is_empty() {
                Borrow::<Q>::borrow(g) == group
            } else {
                nested.contains(g)
            }
        })
        .map(|(user, _)| user)
        .collect()
}
