use nalgebra::Point3;

use super::adjacency::AdjacencyGraph;
use crate::io::input::CenterlineData;
use crate::spline::Curve3D;

/// Splits a centerline point/line soup into unbranched curves.
///
/// Traversal is a depth-first walk started from every degree-1 point, lowest
/// index first. A branch ends at a leaf or at a node with several unvisited
/// neighbours; each neighbour then starts a new branch seeded with the fork
/// point so consecutive branches share it. Branches with fewer than two points
/// are dropped, as are components without any degree-1 point (pure loops).
pub fn build_branches(data: &CenterlineData) -> Vec<Curve3D> {
    let n_points = data.points.len();
    let mut graph = AdjacencyGraph::new(n_points);
    for &[a, b] in &data.lines {
        if a != b && a < n_points && b < n_points {
            graph.add_edge(a, b);
        }
    }

    let mut stack: Vec<(usize, Option<usize>)> = graph
        .find_all_first()
        .into_iter()
        .rev()
        .map(|node| (node, None))
        .collect();

    let mut branches: Vec<Vec<Point3<f64>>> = Vec::new();
    let mut current: Vec<Point3<f64>> = Vec::new();

    while let Some((node, parent)) = stack.pop() {
        if graph.is_visited(node) {
            continue;
        }
        if current.is_empty() {
            if let Some(parent) = parent {
                current.push(data.points[parent]);
            }
        }
        current.push(data.points[node]);
        graph.visit(node);

        let children = graph.find_all_next(node);
        if children.len() == 1 {
            stack.push((children[0], Some(node)));
            continue;
        }
        branches.push(std::mem::take(&mut current));
        stack.extend(children.into_iter().rev().map(|child| (child, Some(node))));
    }
    if !current.is_empty() {
        branches.push(current);
    }

    branches
        .into_iter()
        .filter(|points| points.len() >= 2)
        .map(|points| Curve3D::from_points(&points))
        .collect()
}

#[cfg(test)]
mod builder_tests {
    use super::*;
    use crate::utils::test_utils::{fork_centerline, straight_centerline};

    #[test]
    fn test_straight_path_is_one_branch() {
        let data = straight_centerline(6, 5.0);
        let branches = build_branches(&data);
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].points(), data.points);
    }

    #[test]
    fn test_fork_gives_three_branches_sharing_fork_point() {
        let data = fork_centerline();
        let branches = build_branches(&data);
        assert_eq!(branches.len(), 3);

        let fork = Point3::new(0.0, 0.0, 0.0);
        for branch in &branches {
            assert_eq!(branch.len(), 3);
            assert!(branch.points().contains(&fork));
        }

        // every input point is covered
        for p in &data.points {
            assert!(branches.iter().any(|b| b.points().contains(p)));
        }
        // the leaves end up at a branch end
        for leaf in [0, 4, 6] {
            let p = data.points[leaf];
            assert!(branches
                .iter()
                .any(|b| b.point(0) == p || b.point(b.len() - 1) == p));
        }
    }

    #[test]
    fn test_edge_order_does_not_matter() {
        let mut data = straight_centerline(5, 4.0);
        data.lines.reverse();
        for line in data.lines.iter_mut() {
            line.swap(0, 1);
        }
        let branches = build_branches(&data);
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].len(), 5);
    }

    #[test]
    fn test_degenerate_inputs() {
        // single isolated point and a pure loop yield nothing
        let single = CenterlineData::new(vec![Point3::origin()], vec![[0, 0]]);
        assert!(build_branches(&single).is_empty());

        let ring = CenterlineData::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1], [1, 2], [2, 0]],
        );
        assert!(build_branches(&ring).is_empty());

        let pair = straight_centerline(2, 1.0);
        assert_eq!(build_branches(&pair).len(), 1);
    }

    #[test]
    fn test_branches_are_not_initialized() {
        let branches = build_branches(&straight_centerline(3, 2.0));
        assert!(!branches[0].is_initialized());
        assert!(branches[0].intersections().is_empty());
    }
}
