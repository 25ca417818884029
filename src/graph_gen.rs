pub mod concrete_examples {
    use crate::base::*;

    fn from_edges(edges: &[(&str, &str, f64)]) -> Graph {
        let mut g = Graph::default();
        for &(s, t, w) in edges {
            let s = g.request(s);
            let t = g.request(t);
            g.digraph.add_weight(s, t, w);
        }
        g
    }

    /// `A -> B` with weight 1.
    pub fn single_edge() -> Graph {
        from_edges(&[("A", "B", 1.0)])
    }

    /// `A -> B` and `C -> D`, both with weight 5.
    pub fn two_disjoint_edges() -> Graph {
        from_edges(&[("A", "B", 5.0), ("C", "D", 5.0)])
    }

    /// `X` is tied to `A` and to `B` with weight 3 each; `X` is interned first.
    pub fn split_bridge_graph() -> Graph {
        from_edges(&[("X", "A", 3.0), ("B", "X", 3.0)])
    }

    /// `X` is tied to each of `A`, `B` and `C` with weight 3; `X` is interned first.
    pub fn split_three_way_graph() -> Graph {
        from_edges(&[("X", "A", 3.0), ("B", "X", 3.0), ("X", "C", 3.0)])
    }

    /// Two directed 3-cycles `a1 -> a2 -> a3 -> a1` and `b1 -> b2 -> b3 -> b1`
    /// joined by the single edge `a3 -> b1`.
    pub fn two_triangles_with_bridge() -> Graph {
        from_edges(&[
            ("a1", "a2", 1.0),
            ("a2", "a3", 1.0),
            ("a3", "a1", 1.0),
            ("b1", "b2", 1.0),
            ("b2", "b3", 1.0),
            ("b3", "b1", 1.0),
            ("a3", "b1", 1.0),
        ])
    }

    /// Two dense groups `{p*}` and `{q*}` plus a hub `h` heavily attached to both.
    pub fn two_groups_with_shared_hub() -> Graph {
        from_edges(&[
            ("p1", "p2", 4.0),
            ("p2", "p3", 4.0),
            ("p3", "p1", 4.0),
            ("q1", "q2", 4.0),
            ("q2", "q3", 4.0),
            ("q3", "q1", 4.0),
            ("h", "p1", 3.0),
            ("p2", "h", 3.0),
            ("h", "q1", 3.0),
            ("q2", "h", 3.0),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::concrete_examples;

    #[test]
    pub fn fixtures_have_expected_sizes() {
        let g = concrete_examples::two_triangles_with_bridge();
        assert_eq!(6, g.n());
        assert_eq!(7, g.num_edges());
        assert_eq!(7.0, g.total_weight());
        let g = concrete_examples::split_bridge_graph();
        assert_eq!(Some(0), g.retrieve("X"));
        assert_eq!(6.0, g.total_weight());
        let g = concrete_examples::split_three_way_graph();
        assert_eq!(Some(0), g.retrieve("X"));
        assert_eq!(9.0, g.total_weight());
        let g = concrete_examples::two_groups_with_shared_hub();
        assert_eq!(7, g.n());
        assert_eq!(36.0, g.total_weight());
    }
}
