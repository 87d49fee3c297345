//! Rendezvous (highest-random-weight) hashing for key placement (spec §4.4.1).

use dsys_runtime::Address;

/// Picks `argmax_{a in alive} H(key || a)`, ties broken by lexicographic comparison
/// of the full digest (spec §4.4.1) so placement stays deterministic even in the
/// astronomically unlikely case of a collision.
pub fn target_node<'a>(key: &str, alive: impl IntoIterator<Item = &'a Address>) -> Option<&'a Address> {
    alive
        .into_iter()
        .map(|addr| (md5::compute(format!("{key}{}", addr.as_str())), addr))
        .max_by(|(da, _), (db, _)| weight(da).cmp(&weight(db)).then_with(|| da.0.cmp(&db.0)))
        .map(|(_, addr)| addr)
}

fn weight(digest: &md5::Digest) -> u128 {
    u128::from_le_bytes(digest.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn picks_a_single_deterministic_target_among_several_nodes() {
        let nodes = vec![addr("127.0.0.1:1"), addr("127.0.0.1:2"), addr("127.0.0.1:3")];
        let a = target_node("mykey", &nodes).cloned();
        let b = target_node("mykey", &nodes).cloned();
        assert_eq!(a, b);
        assert!(a.is_some());
    }

    #[test]
    fn empty_alive_set_has_no_target() {
        let nodes: Vec<Address> = vec![];
        assert!(target_node("mykey", &nodes).is_none());
    }

    #[test]
    fn different_keys_can_map_to_different_nodes() {
        let nodes: Vec<Address> = (0..8).map(|i| addr(&format!("127.0.0.1:{}", 10000 + i))).collect();
        let targets: std::collections::HashSet<_> = (0..50)
            .map(|i| target_node(&format!("key-{i}"), &nodes).cloned().unwrap())
            .collect();
        assert!(targets.len() > 1, "50 keys over 8 nodes should not all land on one node");
    }
}
