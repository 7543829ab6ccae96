#![allow(dead_code)]

use pegtree::{Node, Span};

/// Check that the children of every node in a preorder listing sit end to
/// end across their parent.
pub fn check_tiling(nodes: &[Node]) -> Result<(), String> {
    for (idx, parent) in nodes.iter().enumerate() {
        if parent.leaf {
            continue;
        }
        let mut at = parent.begin;
        let mut children = 0;
        for child in nodes[idx + 1..]
            .iter()
            .take_while(|n| n.depth > parent.depth)
            .filter(|n| n.depth == parent.depth + 1)
        {
            if child.begin != at {
                return Err(format!(
                    "child {:?} of {:?} should start at {}",
                    child, parent, at
                ));
            }
            at = child.end;
            children += 1;
        }
        if children == 0 {
            return Err(format!("{:?} isn't a leaf but has no children", parent));
        }
        if at != parent.end {
            return Err(format!("children of {:?} stop at {}", parent, at));
        }
    }
    Ok(())
}

/// Check that no two spans partly overlap.
pub fn check_nesting(spans: &[Span]) -> Result<(), String> {
    for (idx, a) in spans.iter().enumerate() {
        for b in &spans[idx + 1..] {
            if !a.disjoint_or_nested(b) {
                return Err(format!("{:?} and {:?} overlap", a, b));
            }
        }
    }
    Ok(())
}
